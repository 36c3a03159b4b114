pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod filter;
pub mod interpolate;
pub mod linref;
pub mod matcher;
pub mod notice;
pub mod progress;
pub mod reproject;
pub mod speed;
pub mod store;

pub use config::{MalformedTimePolicy, PipelineConfig, ReferencePaths, DEFAULT_CHUNK_SIZE};
pub use emitter::{write_feature, write_notice, Emitted, FeatureEmitter};
pub use engine::{Pipeline, RecordOutcome, RunSummary};
pub use error::CoreError;
pub use filter::SspFilter;
pub use interpolate::{interpolate, interpolate_span, TimeSpan, TimedCoord, TimedLine};
pub use linref::{substring, Substring};
pub use matcher::{CutLine, MatchResult, Matcher, Strategy, StrategyDiscrepancy, Unmatched};
pub use notice::{Notice, NoticeSeverity};
pub use progress::{NoOpProgressHandler, ProgressHandler};
pub use reproject::{
    transform, utm_epsg, ReprojectError, Reprojector, UtmZone, UtmZones, EPSG_WGS84,
};
pub use speed::{run_speed_check, SegmentSpeed, SpeedSummary};
pub use store::{GeometryStore, ReferenceKind, StoreError};
