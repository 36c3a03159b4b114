//! Cuts the reference geometry between an SSP's origin and destination stops.
//!
//! Two strategies exist. The distance strategy cuts the record's route stop
//! pattern at its `*_dist_traveled` values, measured in meters in the UTM
//! zone of the origin stop. The nearest-point strategy snaps both stops
//! onto the route geometry and cuts between the snapped positions in
//! degree space.

use std::fmt;

use compact_str::CompactString;
use geo_types::{Coord, LineString};
use ssp_trajectory_model::{Route, RouteGeometry, RouteStopPattern, ScheduleStopPair, Stop};
use tracing::debug;

use crate::linref::{self, cmp_f64, Substring};
use crate::reproject::{ReprojectError, UtmZone, UtmZones};
use crate::speed::haversine_meters;
use crate::store::{GeometryStore, ReferenceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Distance,
    NearestPoint,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Distance => "distance",
            Strategy::NearestPoint => "nearest_point",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geodetic line with at least two vertices, running from the origin stop
/// towards the destination stop.
#[derive(Debug, Clone, PartialEq)]
pub struct CutLine {
    pub line: LineString<f64>,
    pub strategy: Strategy,
}

impl CutLine {
    pub fn start(&self) -> Option<Coord<f64>> {
        self.line.0.first().copied()
    }

    pub fn end(&self) -> Option<Coord<f64>> {
        self.line.0.last().copied()
    }
}

/// Why a record produced no cut. None of these stop the stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Unmatched {
    #[error("{kind} {id} not found in reference data")]
    ReferenceNotFound {
        kind: ReferenceKind,
        id: CompactString,
    },
    #[error("no route stop pattern or route geometry for route {route_id}")]
    NoReferenceGeometry { route_id: CompactString },
    #[error("{strategy} cut is not a line with two or more vertices: {detail}")]
    DegenerateGeometry {
        strategy: Strategy,
        detail: &'static str,
    },
    #[error("route stop pattern {rsp_id} cannot be projected to EPSG:{epsg}: {detail}")]
    UnprojectableGeometry {
        rsp_id: CompactString,
        epsg: u32,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched(CutLine),
    Unmatched(Unmatched),
}

/// Endpoint offsets between the distance cut and the nearest-point cut of the
/// same record, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyDiscrepancy {
    pub start_offset_m: f64,
    pub end_offset_m: f64,
}

impl StrategyDiscrepancy {
    pub fn exceeds(&self, threshold_m: f64) -> bool {
        self.start_offset_m > threshold_m || self.end_offset_m > threshold_m
    }
}

pub struct Matcher<'a> {
    store: &'a GeometryStore,
    zones: UtmZones,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a GeometryStore) -> Self {
        Self {
            store,
            zones: UtmZones::default(),
        }
    }

    /// Only a projection that cannot be set up is an error; every data
    /// problem, including a vertex outside the projection's range, comes
    /// back as [`MatchResult::Unmatched`].
    pub fn match_ssp(&self, ssp: &ScheduleStopPair) -> Result<MatchResult, ReprojectError> {
        let origin = match self.stop(&ssp.origin_onestop_id) {
            Ok(stop) => stop,
            Err(reason) => return Ok(MatchResult::Unmatched(reason)),
        };
        let destination = match self.stop(&ssp.destination_onestop_id) {
            Ok(stop) => stop,
            Err(reason) => return Ok(MatchResult::Unmatched(reason)),
        };

        if let Some(rsp) = self.distance_reference(ssp) {
            if let Some((origin_dist, destination_dist)) = ssp.dist_traveled() {
                let zone = self
                    .zones
                    .for_location(origin.location.x, origin.location.y)?;
                return Ok(cut_by_distance(zone, rsp, origin_dist, destination_dist));
            }
            debug!(
                "{} -> {} names route stop pattern {} without distances, using route geometry",
                ssp.origin_onestop_id, ssp.destination_onestop_id, rsp.id
            );
        }

        match self.store.route(&ssp.route_onestop_id) {
            Some(route) => Ok(cut_by_nearest_point(origin, destination, route)),
            None => Ok(MatchResult::Unmatched(Unmatched::NoReferenceGeometry {
                route_id: ssp.route_onestop_id.clone(),
            })),
        }
    }

    /// Cuts the record with the nearest-point strategy as well and measures
    /// how far its endpoints land from `primary`. Only distance cuts are
    /// compared, and only when the route resolves and cuts cleanly.
    pub fn cross_check(
        &self,
        ssp: &ScheduleStopPair,
        primary: &CutLine,
    ) -> Option<StrategyDiscrepancy> {
        if primary.strategy != Strategy::Distance {
            return None;
        }
        let origin = self.store.stop(&ssp.origin_onestop_id)?;
        let destination = self.store.stop(&ssp.destination_onestop_id)?;
        let route = self.store.route(&ssp.route_onestop_id)?;
        let MatchResult::Matched(other) = cut_by_nearest_point(origin, destination, route) else {
            return None;
        };
        Some(StrategyDiscrepancy {
            start_offset_m: haversine_meters(primary.start()?, other.start()?),
            end_offset_m: haversine_meters(primary.end()?, other.end()?),
        })
    }

    fn stop(&self, id: &CompactString) -> Result<&'a Stop, Unmatched> {
        self.store.stop(id).ok_or_else(|| Unmatched::ReferenceNotFound {
            kind: ReferenceKind::Stop,
            id: id.clone(),
        })
    }

    fn distance_reference(&self, ssp: &ScheduleStopPair) -> Option<&'a RouteStopPattern> {
        let id = ssp.route_stop_pattern_id()?;
        let rsp = self.store.route_stop_pattern(id);
        if rsp.is_none() {
            debug!("route stop pattern {} not in reference data, using route geometry", id);
        }
        rsp
    }
}

/// Cuts `rsp` between two distances in meters, measured in `zone` (the UTM
/// zone of the origin stop).
pub fn cut_by_distance(
    zone: &UtmZone,
    rsp: &RouteStopPattern,
    origin_dist: f64,
    destination_dist: f64,
) -> MatchResult {
    let projected = match zone.forward.transform_line(&rsp.geometry) {
        Ok(line) => line,
        Err(err) => return unprojectable(zone, rsp, err),
    };
    let cut = match linref::substring(&projected, origin_dist, destination_dist, false) {
        Substring::Line(line) => match zone.inverse.transform_line(&line) {
            Ok(line) => Substring::Line(line),
            Err(err) => return unprojectable(zone, rsp, err),
        },
        other => other,
    };
    finish(Strategy::Distance, cut)
}

fn unprojectable(zone: &UtmZone, rsp: &RouteStopPattern, err: ReprojectError) -> MatchResult {
    MatchResult::Unmatched(Unmatched::UnprojectableGeometry {
        rsp_id: rsp.id.clone(),
        epsg: zone.epsg,
        detail: err.to_string(),
    })
}

/// Snaps both stops onto the route and cuts between the snapped positions.
pub fn cut_by_nearest_point(origin: &Stop, destination: &Stop, route: &Route) -> MatchResult {
    let parts = match &route.geometry {
        RouteGeometry::Line(line) => std::slice::from_ref(line),
        RouteGeometry::MultiLine(lines) => lines.0.as_slice(),
    };
    let (Some(origin_near), Some(destination_near)) = (
        nearest_on_parts(parts, origin.location),
        nearest_on_parts(parts, destination.location),
    ) else {
        return no_usable_line();
    };
    let line = match &route.geometry {
        RouteGeometry::Line(line) => Some(line),
        RouteGeometry::MultiLine(_) => closest_part(parts, origin_near, destination_near),
    };
    let Some(line) = line else {
        return no_usable_line();
    };

    let start = linref::locate_point(line, origin_near);
    let end = linref::locate_point(line, destination_near);
    finish(Strategy::NearestPoint, linref::substring(line, start, end, false))
}

fn no_usable_line() -> MatchResult {
    MatchResult::Unmatched(Unmatched::DegenerateGeometry {
        strategy: Strategy::NearestPoint,
        detail: "route has no usable line",
    })
}

/// Closest point on any part of the route.
fn nearest_on_parts(parts: &[LineString<f64>], point: Coord<f64>) -> Option<Coord<f64>> {
    parts
        .iter()
        .filter_map(|part| {
            linref::closest_point(part, point)
                .map(|near| (near, linref::segment_length(near, point)))
        })
        .min_by(|a, b| cmp_f64(a.1, b.1))
        .map(|(near, _)| near)
}

/// The part minimising the summed distance to both snapped stops. The first
/// part wins a tie.
fn closest_part(
    parts: &[LineString<f64>],
    origin_near: Coord<f64>,
    destination_near: Coord<f64>,
) -> Option<&LineString<f64>> {
    parts
        .iter()
        .filter(|part| !part.0.is_empty())
        .map(|part| {
            let score = linref::distance_to_line(part, origin_near)
                + linref::distance_to_line(part, destination_near);
            (part, score)
        })
        .min_by(|a, b| cmp_f64(a.1, b.1))
        .map(|(part, _)| part)
}

fn finish(strategy: Strategy, cut: Substring) -> MatchResult {
    match cut {
        Substring::Line(line) if line.0.len() >= 2 => MatchResult::Matched(CutLine { line, strategy }),
        Substring::Line(_) | Substring::Point(_) => MatchResult::Unmatched(Unmatched::DegenerateGeometry {
            strategy,
            detail: "both stops resolve to the same position",
        }),
        Substring::Empty => MatchResult::Unmatched(Unmatched::DegenerateGeometry {
            strategy,
            detail: "reference line has no vertices",
        }),
    }
}
