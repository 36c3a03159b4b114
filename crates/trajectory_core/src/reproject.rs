//! Conversions between WGS84 longitude/latitude and the UTM zones.
//!
//! Only EPSG:4326 and the WGS84 UTM codes (326zz north, 327zz south) are
//! known. Anything else is an error rather than a silent pass-through.

use std::sync::OnceLock;

use geo_types::{Coord, LineString, MultiLineString};
use proj4rs::proj::Proj;
use ssp_trajectory_model::ReferenceGeometry;

pub const EPSG_WGS84: u32 = 4326;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReprojectError {
    #[error("unsupported EPSG code {0}")]
    UnsupportedEpsg(u32),
    #[error("invalid projection for EPSG:{code}: {message}")]
    Definition { code: u32, message: String },
    #[error("cannot transform ({x}, {y}) from EPSG:{from} to EPSG:{to}: {message}")]
    Transform {
        from: u32,
        to: u32,
        x: f64,
        y: f64,
        message: String,
    },
}

/// EPSG code of the WGS84 UTM zone containing (`lon`, `lat`).
///
/// Longitudes at or past the antimeridian wrap back into zones 1..=60.
pub fn utm_epsg(lon: f64, lat: f64) -> u32 {
    let base: u32 = if lat >= 0.0 { 326 } else { 327 };
    let zone = ((183.0 + lon) / 6.0).round_ties_even() as i64;
    let zone = (zone - 1).rem_euclid(60) + 1;
    base * 100 + zone as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Crs {
    Geographic,
    Utm { zone: u32, south: bool },
}

impl Crs {
    fn from_epsg(code: u32) -> Result<Self, ReprojectError> {
        match code {
            EPSG_WGS84 => Ok(Crs::Geographic),
            32601..=32660 => Ok(Crs::Utm {
                zone: code - 32600,
                south: false,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: code - 32700,
                south: true,
            }),
            other => Err(ReprojectError::UnsupportedEpsg(other)),
        }
    }

    fn proj_string(&self) -> String {
        match self {
            Crs::Geographic => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
            Crs::Utm { zone, south } => format!(
                "+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs",
                zone,
                if *south { " +south" } else { "" }
            ),
        }
    }
}

/// A prepared transformation from one EPSG code to another.
pub struct Reprojector {
    from_epsg: u32,
    to_epsg: u32,
    from_geographic: bool,
    to_geographic: bool,
    from: Proj,
    to: Proj,
}

impl Reprojector {
    pub fn new(from_epsg: u32, to_epsg: u32) -> Result<Self, ReprojectError> {
        let from_crs = Crs::from_epsg(from_epsg)?;
        let to_crs = Crs::from_epsg(to_epsg)?;
        Ok(Self {
            from_epsg,
            to_epsg,
            from_geographic: from_crs == Crs::Geographic,
            to_geographic: to_crs == Crs::Geographic,
            from: build_proj(from_epsg, from_crs)?,
            to: build_proj(to_epsg, to_crs)?,
        })
    }

    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>, ReprojectError> {
        if self.from_epsg == self.to_epsg {
            return Ok(coord);
        }
        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(&self.from, &self.to, &mut point).map_err(|err| {
            ReprojectError::Transform {
                from: self.from_epsg,
                to: self.to_epsg,
                x: coord.x,
                y: coord.y,
                message: err.to_string(),
            }
        })?;
        let (x, y) = if self.to_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(ReprojectError::Transform {
                from: self.from_epsg,
                to: self.to_epsg,
                x: coord.x,
                y: coord.y,
                message: "result is not finite".to_string(),
            });
        }
        Ok(Coord { x, y })
    }

    /// Transforms every vertex, keeping vertex count and order.
    pub fn transform_line(&self, line: &LineString<f64>) -> Result<LineString<f64>, ReprojectError> {
        line.0
            .iter()
            .map(|coord| self.transform_coord(*coord))
            .collect::<Result<Vec<_>, _>>()
            .map(LineString::new)
    }

    pub fn transform_geometry(
        &self,
        geometry: &ReferenceGeometry,
    ) -> Result<ReferenceGeometry, ReprojectError> {
        Ok(match geometry {
            ReferenceGeometry::Point(coord) => ReferenceGeometry::Point(self.transform_coord(*coord)?),
            ReferenceGeometry::Line(line) => ReferenceGeometry::Line(self.transform_line(line)?),
            ReferenceGeometry::MultiLine(lines) => ReferenceGeometry::MultiLine(MultiLineString::new(
                lines
                    .0
                    .iter()
                    .map(|line| self.transform_line(line))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        })
    }
}

/// Both directions between WGS84 and one UTM zone.
pub struct UtmZone {
    pub epsg: u32,
    pub forward: Reprojector,
    pub inverse: Reprojector,
}

impl UtmZone {
    pub fn new(epsg: u32) -> Result<Self, ReprojectError> {
        Ok(Self {
            epsg,
            forward: Reprojector::new(EPSG_WGS84, epsg)?,
            inverse: Reprojector::new(epsg, EPSG_WGS84)?,
        })
    }
}

const UTM_ZONE_SLOTS: usize = 120;

/// UTM zones prepared on first use and shared between threads.
pub struct UtmZones {
    zones: Vec<OnceLock<Result<UtmZone, ReprojectError>>>,
}

impl Default for UtmZones {
    fn default() -> Self {
        Self {
            zones: (0..UTM_ZONE_SLOTS).map(|_| OnceLock::new()).collect(),
        }
    }
}

impl UtmZones {
    /// The zone containing (`lon`, `lat`).
    pub fn for_location(&self, lon: f64, lat: f64) -> Result<&UtmZone, ReprojectError> {
        self.get(utm_epsg(lon, lat))
    }

    pub fn get(&self, epsg: u32) -> Result<&UtmZone, ReprojectError> {
        let slot = match epsg {
            32601..=32660 => epsg - 32601,
            32701..=32760 => epsg - 32701 + 60,
            other => return Err(ReprojectError::UnsupportedEpsg(other)),
        };
        let cell = self
            .zones
            .get(slot as usize)
            .ok_or(ReprojectError::UnsupportedEpsg(epsg))?;
        cell.get_or_init(|| UtmZone::new(epsg))
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// One-shot transformation of a geometry between two EPSG codes.
pub fn transform(
    geometry: &ReferenceGeometry,
    from_epsg: u32,
    to_epsg: u32,
) -> Result<ReferenceGeometry, ReprojectError> {
    Reprojector::new(from_epsg, to_epsg)?.transform_geometry(geometry)
}

fn build_proj(code: u32, crs: Crs) -> Result<Proj, ReprojectError> {
    Proj::from_proj_string(&crs.proj_string()).map_err(|err| ReprojectError::Definition {
        code,
        message: err.to_string(),
    })
}
