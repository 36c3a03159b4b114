use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use compact_str::CompactString;
use geo_types::{Coord, LineString, MultiLineString};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use ssp_trajectory_model::{ReferenceGeometry, Route, RouteGeometry, RouteStopPattern, Stop};
use tracing::{debug, warn};

use crate::config::ReferencePaths;
use crate::progress::ProgressHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Stop,
    Route,
    RouteStopPattern,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Stop => "stop",
            ReferenceKind::Route => "route",
            ReferenceKind::RouteStopPattern => "route_stop_pattern",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed json in {file} at line {line}: {source}")]
    Json {
        file: String,
        line: u64,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawReference {
    id: CompactString,
    #[serde(default)]
    geometry: Option<geojson::Geometry>,
}

/// Id-indexed stops, routes and route stop patterns.
///
/// Built once and only read afterwards, so a `&GeometryStore` can be shared
/// across worker threads. Lookups return `None` for unknown ids; reference
/// dumps are routinely incomplete.
#[derive(Debug, Default)]
pub struct GeometryStore {
    stops: FxHashMap<CompactString, Stop>,
    routes: FxHashMap<CompactString, Route>,
    route_stop_patterns: FxHashMap<CompactString, RouteStopPattern>,
}

impl GeometryStore {
    /// Builds a store from already classified records. A later record
    /// replaces an earlier one with the same id.
    pub fn new(
        stops: impl IntoIterator<Item = Stop>,
        routes: impl IntoIterator<Item = Route>,
        route_stop_patterns: impl IntoIterator<Item = RouteStopPattern>,
    ) -> Self {
        Self {
            stops: stops.into_iter().map(|stop| (stop.id.clone(), stop)).collect(),
            routes: routes
                .into_iter()
                .map(|route| (route.id.clone(), route))
                .collect(),
            route_stop_patterns: route_stop_patterns
                .into_iter()
                .map(|rsp| (rsp.id.clone(), rsp))
                .collect(),
        }
    }

    pub fn from_paths(
        paths: &ReferencePaths,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Self, StoreError> {
        let stops = load_file(&paths.stops, progress, read_stops)?;
        let routes = load_file(&paths.routes, progress, read_routes)?;
        let route_stop_patterns = match &paths.route_stop_patterns {
            Some(path) => load_file(path, progress, read_route_stop_patterns)?,
            None => Vec::new(),
        };
        Ok(Self::new(stops, routes, route_stop_patterns))
    }

    pub fn from_readers<S, R, P>(
        stops: S,
        routes: R,
        route_stop_patterns: Option<P>,
    ) -> Result<Self, StoreError>
    where
        S: BufRead,
        R: BufRead,
        P: BufRead,
    {
        let stops = read_stops(stops, "stops")?;
        let routes = read_routes(routes, "routes")?;
        let route_stop_patterns = match route_stop_patterns {
            Some(reader) => read_route_stop_patterns(reader, "route_stop_patterns")?,
            None => Vec::new(),
        };
        Ok(Self::new(stops, routes, route_stop_patterns))
    }

    pub fn stop(&self, id: &str) -> Option<&Stop> {
        self.stops.get(id)
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn route_stop_pattern(&self, id: &str) -> Option<&RouteStopPattern> {
        self.route_stop_patterns.get(id)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn route_stop_pattern_count(&self) -> usize {
        self.route_stop_patterns.len()
    }
}

fn load_file<T>(
    path: &Path,
    progress: Option<&dyn ProgressHandler>,
    read: fn(BufReader<File>, &str) -> Result<Vec<T>, StoreError>,
) -> Result<Vec<T>, StoreError> {
    let file_name = path.display().to_string();
    if let Some(progress) = progress {
        progress.on_start_reference_load(&file_name);
    }
    let file = File::open(path).map_err(|source| StoreError::Io {
        file: file_name.clone(),
        source,
    })?;
    let records = read(BufReader::new(file), &file_name)?;
    if let Some(progress) = progress {
        progress.on_finish_reference_load(&file_name, records.len());
    }
    Ok(records)
}

fn read_stops<R: BufRead>(reader: R, file: &str) -> Result<Vec<Stop>, StoreError> {
    read_records(reader, file, ReferenceKind::Stop, |id, geometry| match geometry {
        ReferenceGeometry::Point(location) => Ok(Stop { id, location }),
        other => Err(other.kind()),
    })
}

fn read_routes<R: BufRead>(reader: R, file: &str) -> Result<Vec<Route>, StoreError> {
    read_records(reader, file, ReferenceKind::Route, |id, geometry| match geometry {
        ReferenceGeometry::Line(line) => Ok(Route {
            id,
            geometry: RouteGeometry::Line(line),
        }),
        ReferenceGeometry::MultiLine(lines) if !lines.0.is_empty() => Ok(Route {
            id,
            geometry: RouteGeometry::MultiLine(lines),
        }),
        other => Err(other.kind()),
    })
}

fn read_route_stop_patterns<R: BufRead>(
    reader: R,
    file: &str,
) -> Result<Vec<RouteStopPattern>, StoreError> {
    read_records(
        reader,
        file,
        ReferenceKind::RouteStopPattern,
        |id, geometry| match geometry {
            ReferenceGeometry::Line(geometry) => Ok(RouteStopPattern { id, geometry }),
            ReferenceGeometry::MultiLine(mut lines) if lines.0.len() == 1 => {
                let geometry = lines.0.remove(0);
                Ok(RouteStopPattern { id, geometry })
            }
            other => Err(other.kind()),
        },
    )
}

/// Reads one reference file. Records whose geometry is missing or of the
/// wrong shape are logged and left out; malformed JSON fails the load.
fn read_records<R, T, F>(
    reader: R,
    file: &str,
    kind: ReferenceKind,
    classify: F,
) -> Result<Vec<T>, StoreError>
where
    R: BufRead,
    F: Fn(CompactString, ReferenceGeometry) -> Result<T, &'static str>,
{
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_number = index as u64 + 1;
        let line = line.map_err(|source| StoreError::Io {
            file: file.to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawReference =
            serde_json::from_str(&line).map_err(|source| StoreError::Json {
                file: file.to_string(),
                line: line_number,
                source,
            })?;
        let Some(geometry) = raw.geometry.as_ref() else {
            warn!("{} {} in {} has no geometry", kind, raw.id, file);
            continue;
        };
        let geometry = match reference_geometry(geometry) {
            Ok(geometry) => geometry,
            Err(reason) => {
                warn!("skipping {} {} in {}: {}", kind, raw.id, file, reason);
                continue;
            }
        };
        match classify(raw.id.clone(), geometry) {
            Ok(record) => records.push(record),
            Err(found) => warn!(
                "skipping {} {} in {}: unexpected {} geometry",
                kind, raw.id, file, found
            ),
        }
    }
    debug!("loaded {} {} records from {}", records.len(), kind, file);
    Ok(records)
}

/// Classifies a GeoJSON geometry into the shapes reference records use.
pub fn reference_geometry(geometry: &geojson::Geometry) -> Result<ReferenceGeometry, String> {
    match &geometry.value {
        geojson::Value::Point(position) => position_coord(position).map(ReferenceGeometry::Point),
        geojson::Value::LineString(positions) => line_string(positions).map(ReferenceGeometry::Line),
        geojson::Value::MultiLineString(parts) => multi_line_string(parts),
        geojson::Value::MultiPoint(_) => Err("unsupported MultiPoint geometry".to_string()),
        geojson::Value::Polygon(_) => Err("unsupported Polygon geometry".to_string()),
        geojson::Value::MultiPolygon(_) => Err("unsupported MultiPolygon geometry".to_string()),
        geojson::Value::GeometryCollection(_) => {
            Err("unsupported GeometryCollection geometry".to_string())
        }
    }
}

fn position_coord(position: &[f64]) -> Result<Coord<f64>, String> {
    match position {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        _ => Err(format!("invalid position {:?}", position)),
    }
}

/// Keeps the usable parts of a multi-line; only a multi-line with no
/// usable part is an error.
fn multi_line_string(parts: &[Vec<Vec<f64>>]) -> Result<ReferenceGeometry, String> {
    let mut lines = Vec::with_capacity(parts.len());
    for (index, positions) in parts.iter().enumerate() {
        match line_string(positions) {
            Ok(line) => lines.push(line),
            Err(reason) => debug!("dropping part {} of multi-line: {}", index, reason),
        }
    }
    if lines.is_empty() {
        return Err(format!("multi-line with no usable part out of {}", parts.len()));
    }
    Ok(ReferenceGeometry::MultiLine(MultiLineString::new(lines)))
}

fn line_string(positions: &[Vec<f64>]) -> Result<LineString<f64>, String> {
    if positions.len() < 2 {
        return Err(format!("line with {} vertices", positions.len()));
    }
    positions
        .iter()
        .map(|position| position_coord(position))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}
