//! Travel speed along emitted trajectories, used to spot implausible cuts.

use std::io::{BufRead, Write};

use geo_types::Coord;
use geojson::Feature;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::CoreError;

const MEAN_EARTH_RADIUS_METERS: f64 = 6_371_008.8;

pub fn haversine_meters(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1_rad = a.y.to_radians();
    let lat2_rad = b.y.to_radians();
    let delta_lat = (b.y - a.y).to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    MEAN_EARTH_RADIUS_METERS * c
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpeed {
    /// Path length in meters.
    pub dist: f64,
    /// Seconds between the first and last vertex.
    pub duration: f64,
    /// Meters per second; `None` when the duration is not positive.
    pub speed: Option<f64>,
}

/// Measures a timed line given as `[lon, lat, seconds]` positions.
pub fn measure(positions: &[Vec<f64>]) -> Option<SegmentSpeed> {
    let first = positions.first()?;
    let last = positions.last()?;
    let (first_time, last_time) = (*first.get(2)?, *last.get(2)?);

    let mut dist = 0.0;
    for pair in positions.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.len() < 2 || b.len() < 2 {
            return None;
        }
        dist += haversine_meters(Coord { x: a[0], y: a[1] }, Coord { x: b[0], y: b[1] });
    }

    let duration = last_time - first_time;
    let speed = if duration > 0.0 {
        Some(dist / duration)
    } else {
        None
    };
    Some(SegmentSpeed {
        dist,
        duration,
        speed,
    })
}

/// Adds `dist` and `speed` properties to a trajectory feature. Features that
/// are not timed line strings are left untouched and `None` is returned.
pub fn annotate_feature(feature: &mut Feature) -> Option<SegmentSpeed> {
    let measured = match feature.geometry.as_ref().map(|geometry| &geometry.value) {
        Some(geojson::Value::LineString(positions)) => measure(positions)?,
        _ => return None,
    };
    let properties = feature.properties.get_or_insert_with(Map::new);
    properties.insert("dist".to_string(), Value::from(measured.dist));
    properties.insert(
        "speed".to_string(),
        measured.speed.map(Value::from).unwrap_or(Value::Null),
    );
    Some(measured)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeedSummary {
    pub read: u64,
    pub measured: u64,
    pub zero_duration: u64,
    pub unmeasured: u64,
}

/// Reads one feature per line and writes it back with speed properties.
pub fn run_speed_check<R: BufRead, W: Write>(
    input: R,
    output: &mut W,
) -> Result<SpeedSummary, CoreError> {
    let mut summary = SpeedSummary::default();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.read += 1;
        let mut feature: Feature =
            serde_json::from_str(&line).map_err(|source| CoreError::Json {
                line: index as u64 + 1,
                source,
            })?;
        match annotate_feature(&mut feature) {
            Some(measured) if measured.speed.is_none() => {
                summary.zero_duration += 1;
                warn!(
                    "feature on line {} covers {:.1} m in {} s",
                    index + 1,
                    measured.dist,
                    measured.duration
                );
            }
            Some(_) => summary.measured += 1,
            None => {
                summary.unmeasured += 1;
                warn!("feature on line {} is not a timed line string", index + 1);
            }
        }
        serde_json::to_writer(&mut *output, &feature).map_err(|source| CoreError::Json {
            line: index as u64 + 1,
            source,
        })?;
        output.write_all(b"\n")?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is about 111.2 km.
        let meters = haversine_meters(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 1.0 });
        assert!((meters - 111_195.0).abs() < 1.0, "{meters}");
    }

    #[test]
    fn measures_speed_over_the_whole_line() {
        let positions = vec![
            vec![0.0, 0.0, 100.0],
            vec![0.0, 0.5, 150.0],
            vec![0.0, 1.0, 200.0],
        ];
        let measured = measure(&positions).unwrap();
        assert!((measured.dist - 111_195.0).abs() < 1.0);
        assert_eq!(measured.duration, 100.0);
        assert!((measured.speed.unwrap() - 1_111.95).abs() < 0.01);
    }

    #[test]
    fn zero_duration_has_no_speed() {
        let positions = vec![vec![0.0, 0.0, 100.0], vec![0.0, 1.0, 100.0]];
        assert_eq!(measure(&positions).unwrap().speed, None);
        assert!(measure(&[vec![0.0, 0.0]]).is_none());
    }

    #[test]
    fn annotates_features_line_by_line() {
        let input = concat!(
            r#"{"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0,0],[0,1,100]]},"properties":{"trip":"t"}}"#,
            "\n",
            r#"{"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0,5],[0,1,5]]},"properties":null}"#,
            "\n",
            r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[0,0]},"properties":{}}"#,
            "\n"
        );
        let mut output = Vec::new();
        let summary = run_speed_check(Cursor::new(input), &mut output).unwrap();
        assert_eq!(
            summary,
            SpeedSummary {
                read: 3,
                measured: 1,
                zero_duration: 1,
                unmeasured: 1
            }
        );

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["properties"]["trip"], "t");
        assert!(first["properties"]["speed"].as_f64().unwrap() > 1_000.0);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second["properties"]["speed"].is_null());
        let third: Value = serde_json::from_str(lines[2]).unwrap();
        assert!(third["properties"].get("speed").is_none());
    }

    #[test]
    fn malformed_feature_stops_the_check() {
        let mut output = Vec::new();
        let err = run_speed_check(Cursor::new("not json\n"), &mut output).unwrap_err();
        assert!(matches!(err, CoreError::Json { line: 1, .. }));
    }
}
