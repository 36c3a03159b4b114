use std::path::PathBuf;

use crate::filter::SspFilter;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// What to do with a record whose departure or arrival time does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedTimePolicy {
    /// Write a `malformed_time` diagnostic and move on.
    #[default]
    Skip,
    /// Stop the run with an error.
    Abort,
}

/// Locations of the three reference files. Route stop patterns are
/// optional; without them every record falls back to the route geometry.
#[derive(Debug, Clone)]
pub struct ReferencePaths {
    pub stops: PathBuf,
    pub routes: PathBuf,
    pub route_stop_patterns: Option<PathBuf>,
}

impl ReferencePaths {
    pub fn new(stops: impl Into<PathBuf>, routes: impl Into<PathBuf>) -> Self {
        Self {
            stops: stops.into(),
            routes: routes.into(),
            route_stop_patterns: None,
        }
    }

    pub fn with_route_stop_patterns(mut self, path: impl Into<PathBuf>) -> Self {
        self.route_stop_patterns = Some(path.into());
        self
    }
}

/// Settings for one pipeline run, passed explicitly to the engine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Record fields copied into each output feature's properties.
    pub allowed_properties: Vec<String>,
    pub malformed_time_policy: MalformedTimePolicy,
    pub filter: SspFilter,
    /// Report records whose two cutting strategies disagree by more than
    /// this many meters at either end.
    pub cross_check_meters: Option<f64>,
    /// Worker threads; 0 or 1 processes records on the calling thread.
    pub threads: usize,
    /// Records handed to the worker pool at a time.
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_properties: Vec::new(),
            malformed_time_policy: MalformedTimePolicy::Skip,
            filter: SspFilter::default(),
            cross_check_meters: None,
            threads: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn with_allowed_properties<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_properties = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_malformed_time_policy(mut self, policy: MalformedTimePolicy) -> Self {
        self.malformed_time_policy = policy;
        self
    }

    pub fn with_filter(mut self, filter: SspFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_cross_check_meters(mut self, meters: f64) -> Self {
        self.cross_check_meters = Some(meters);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}
