use std::io::{self, Write};

use geojson::{Feature, Geometry, Value as GeometryValue};
use serde_json::Map;
use ssp_trajectory_model::ScheduleStopPair;

use crate::interpolate::TimedLine;
use crate::matcher::Unmatched;
use crate::notice::Notice;

/// What one matched or unmatched record turns into.
#[derive(Debug, Clone)]
pub enum Emitted {
    Feature(Feature),
    Skipped(Notice),
}

/// Builds output features, keeping only allow-listed record fields as
/// properties.
#[derive(Debug, Clone, Default)]
pub struct FeatureEmitter {
    allowed_properties: Vec<String>,
}

impl FeatureEmitter {
    pub fn new<I, S>(allowed_properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_properties: allowed_properties.into_iter().map(Into::into).collect(),
        }
    }

    pub fn emit(&self, ssp: &ScheduleStopPair, timed: Result<&TimedLine, &Unmatched>) -> Emitted {
        match timed {
            Ok(timed) => Emitted::Feature(self.feature(ssp, timed)),
            Err(reason) => Emitted::Skipped(Notice::unmatched(reason).for_record(ssp)),
        }
    }

    /// Keys missing from the record are left out rather than written as null.
    pub fn feature(&self, ssp: &ScheduleStopPair, timed: &TimedLine) -> Feature {
        let mut properties = Map::new();
        for key in &self.allowed_properties {
            if let Some(value) = ssp.property(key) {
                properties.insert(key.clone(), value);
            }
        }
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(GeometryValue::LineString(timed.positions()))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Writes a feature as one compact JSON line.
pub fn write_feature<W: Write>(writer: &mut W, feature: &Feature) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, feature)?;
    writer.write_all(b"\n")
}

pub fn write_notice<W: Write>(writer: &mut W, notice: &Notice) -> io::Result<()> {
    writeln!(writer, "{}", notice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::TimedCoord;
    use crate::notice::NOTICE_CODE_NO_REFERENCE_GEOMETRY;
    use compact_str::CompactString;
    use serde_json::{json, Value};

    fn sample() -> ScheduleStopPair {
        serde_json::from_value(json!({
            "origin_onestop_id": "s-a",
            "destination_onestop_id": "s-b",
            "route_onestop_id": "r-x",
            "origin_departure_time": "08:00:00",
            "destination_arrival_time": "08:10:00",
            "trip": "t-1"
        }))
        .unwrap()
    }

    fn timed() -> TimedLine {
        TimedLine(vec![
            TimedCoord {
                x: -122.0,
                y: 37.0,
                time: 28_800.0,
            },
            TimedCoord {
                x: -121.0,
                y: 37.0,
                time: 29_400.0,
            },
        ])
    }

    #[test]
    fn writes_compact_feature_with_allowed_properties() {
        let emitter = FeatureEmitter::new(["trip", "origin_onestop_id", "not_there"]);
        let Emitted::Feature(feature) = emitter.emit(&sample(), Ok(&timed())) else {
            panic!("expected a feature");
        };
        let mut out = Vec::new();
        write_feature(&mut out, &feature).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.ends_with('\n'));
        assert!(!text.trim_end().contains(' '));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value["geometry"]["coordinates"],
            json!([[-122.0, 37.0, 28800.0], [-121.0, 37.0, 29400.0]])
        );
        assert_eq!(
            value["properties"],
            json!({"trip": "t-1", "origin_onestop_id": "s-a"})
        );
    }

    #[test]
    fn unmatched_record_becomes_a_notice() {
        let emitter = FeatureEmitter::new(Vec::<String>::new());
        let reason = Unmatched::NoReferenceGeometry {
            route_id: CompactString::from("r-x"),
        };
        let Emitted::Skipped(notice) = emitter.emit(&sample(), Err(&reason)) else {
            panic!("expected a notice");
        };
        assert_eq!(notice.code, NOTICE_CODE_NO_REFERENCE_GEOMETRY);

        let mut out = Vec::new();
        write_notice(&mut out, &notice).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("route_onestop_id=r-x"));
    }
}
