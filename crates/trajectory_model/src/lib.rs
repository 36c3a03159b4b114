use std::fmt;

use chrono::NaiveDate;
use compact_str::CompactString;
use geo_types::{Coord, LineString, MultiLineString};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Schedules encode trips that run past midnight as hours 24..=29 of the
/// previous service day.
pub const MAX_SCHEDULE_HOUR: i32 = 29;

#[derive(Debug, thiserror::Error)]
pub enum ModelParseError {
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScheduleTime {
    total_seconds: i32,
}

impl ScheduleTime {
    pub fn from_seconds(total_seconds: i32) -> Self {
        Self { total_seconds }
    }

    pub fn parse(value: &str) -> Result<Self, ModelParseError> {
        let trimmed = value.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        if parts.len() != 3
            || parts
                .iter()
                .any(|part| part.is_empty() || !part.chars().all(|ch| ch.is_ascii_digit()))
        {
            return Err(ModelParseError::InvalidTimeFormat(value.to_string()));
        }

        let hours: i32 = parts[0]
            .parse()
            .map_err(|_| ModelParseError::InvalidTimeFormat(value.to_string()))?;
        let minutes: i32 = parts[1]
            .parse()
            .map_err(|_| ModelParseError::InvalidTimeFormat(value.to_string()))?;
        let seconds: i32 = parts[2]
            .parse()
            .map_err(|_| ModelParseError::InvalidTimeFormat(value.to_string()))?;

        if !(0..=MAX_SCHEDULE_HOUR).contains(&hours)
            || !(0..=59).contains(&minutes)
            || !(0..=59).contains(&seconds)
        {
            return Err(ModelParseError::InvalidTimeValue(value.to_string()));
        }

        Ok(Self {
            total_seconds: hours * 3600 + minutes * 60 + seconds,
        })
    }

    pub fn total_seconds(&self) -> i32 {
        self.total_seconds
    }

    pub fn hours(&self) -> i32 {
        self.total_seconds / 3600
    }

    pub fn minutes(&self) -> i32 {
        (self.total_seconds % 3600) / 60
    }

    pub fn seconds(&self) -> i32 {
        self.total_seconds % 60
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScheduleTimeVisitor;

        impl<'de> Visitor<'de> for ScheduleTimeVisitor {
            type Value = ScheduleTime;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a schedule time in HH:MM:SS format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ScheduleTime, E> {
                ScheduleTime::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(ScheduleTimeVisitor)
    }
}

/// Parses the `YYYY-MM-DD` dates used by service calendars.
pub fn parse_service_date(value: &str) -> Result<NaiveDate, ModelParseError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ModelParseError::InvalidDateFormat(value.to_string()))
}

/// Geometry as it appears in reference files, before it is classified into
/// the shape a stop, route or route-stop-pattern needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceGeometry {
    Point(Coord<f64>),
    Line(LineString<f64>),
    MultiLine(MultiLineString<f64>),
}

impl ReferenceGeometry {
    pub fn kind(&self) -> &'static str {
        match self {
            ReferenceGeometry::Point(_) => "Point",
            ReferenceGeometry::Line(_) => "LineString",
            ReferenceGeometry::MultiLine(_) => "MultiLineString",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: CompactString,
    pub location: Coord<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteGeometry {
    Line(LineString<f64>),
    MultiLine(MultiLineString<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: CompactString,
    pub geometry: RouteGeometry,
}

/// A stop-sequence variant of a route. Its length in meters is the frame of
/// reference for `*_dist_traveled` on the schedule stop pairs that name it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStopPattern {
    pub id: CompactString,
    pub geometry: LineString<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleStopPair {
    pub origin_onestop_id: CompactString,
    pub destination_onestop_id: CompactString,
    pub route_onestop_id: CompactString,
    #[serde(default)]
    pub route_stop_pattern_onestop_id: Option<CompactString>,
    #[serde(default)]
    pub origin_departure_time: Option<String>,
    #[serde(default)]
    pub destination_arrival_time: Option<String>,
    #[serde(default)]
    pub origin_dist_traveled: Option<f64>,
    #[serde(default)]
    pub destination_dist_traveled: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScheduleStopPair {
    pub fn route_stop_pattern_id(&self) -> Option<&str> {
        self.route_stop_pattern_onestop_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn departure_time(&self) -> Result<ScheduleTime, ModelParseError> {
        ScheduleTime::parse(self.origin_departure_time.as_deref().unwrap_or(""))
    }

    pub fn arrival_time(&self) -> Result<ScheduleTime, ModelParseError> {
        ScheduleTime::parse(self.destination_arrival_time.as_deref().unwrap_or(""))
    }

    /// Both distances, when the record carries them.
    pub fn dist_traveled(&self) -> Option<(f64, f64)> {
        Some((self.origin_dist_traveled?, self.destination_dist_traveled?))
    }

    /// Looks up a field by its wire name. Typed fields that are absent or
    /// null yield `None`; extra fields are returned as they were read.
    pub fn property(&self, key: &str) -> Option<Value> {
        match key {
            "origin_onestop_id" => Some(Value::from(self.origin_onestop_id.as_str())),
            "destination_onestop_id" => Some(Value::from(self.destination_onestop_id.as_str())),
            "route_onestop_id" => Some(Value::from(self.route_onestop_id.as_str())),
            "route_stop_pattern_onestop_id" => self
                .route_stop_pattern_onestop_id
                .as_deref()
                .map(Value::from),
            "origin_departure_time" => self.origin_departure_time.as_deref().map(Value::from),
            "destination_arrival_time" => {
                self.destination_arrival_time.as_deref().map(Value::from)
            }
            "origin_dist_traveled" => self.origin_dist_traveled.map(Value::from),
            "destination_dist_traveled" => self.destination_dist_traveled.map(Value::from),
            _ => self.extra.get(key).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schedule_time() {
        let time = ScheduleTime::parse("08:10:05").unwrap();
        assert_eq!(time.total_seconds(), 8 * 3600 + 10 * 60 + 5);
        assert_eq!(time.to_string(), "08:10:05");
    }

    #[test]
    fn parses_post_midnight_hours() {
        let time = ScheduleTime::parse("29:59:59").unwrap();
        assert_eq!(time.total_seconds(), 29 * 3600 + 59 * 60 + 59);
        assert_eq!(time.hours(), 29);
    }

    #[test]
    fn parses_schedule_time_with_whitespace() {
        let time = ScheduleTime::parse(" 25:10:05 ").unwrap();
        assert_eq!(time.to_string(), "25:10:05");
    }

    #[test]
    fn rejects_invalid_time() {
        assert!(matches!(
            ScheduleTime::parse("30:00:00"),
            Err(ModelParseError::InvalidTimeValue(_))
        ));
        assert!(ScheduleTime::parse("25:99:00").is_err());
        assert!(ScheduleTime::parse("08:00").is_err());
        assert!(ScheduleTime::parse("+8:00:00").is_err());
        assert!(ScheduleTime::parse("aa:bb:cc").is_err());
        assert!(ScheduleTime::parse("").is_err());
    }

    #[test]
    fn parses_service_date() {
        let date = parse_service_date("2019-06-30").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2019, 6, 30).unwrap());
        assert!(parse_service_date("20190630").is_err());
    }

    #[test]
    fn deserializes_schedule_stop_pair_with_extra_fields() {
        let ssp: ScheduleStopPair = serde_json::from_str(
            r#"{"origin_onestop_id":"s-a","destination_onestop_id":"s-b",
                "route_onestop_id":"r-x","route_stop_pattern_onestop_id":null,
                "origin_departure_time":"08:00:00","destination_arrival_time":"08:10:00",
                "origin_dist_traveled":0,"destination_dist_traveled":1200.5,
                "trip":"t-1","service_days_of_week":[true,false]}"#,
        )
        .unwrap();

        assert_eq!(ssp.origin_onestop_id, "s-a");
        assert_eq!(ssp.route_stop_pattern_id(), None);
        assert_eq!(ssp.dist_traveled(), Some((0.0, 1200.5)));
        assert_eq!(ssp.property("trip"), Some(Value::from("t-1")));
        assert_eq!(ssp.property("route_onestop_id"), Some(Value::from("r-x")));
        assert_eq!(ssp.property("route_stop_pattern_onestop_id"), None);
        assert_eq!(ssp.property("missing"), None);
        assert_eq!(ssp.departure_time().unwrap().total_seconds(), 28_800);
    }

    #[test]
    fn blank_route_stop_pattern_id_is_absent() {
        let ssp = ScheduleStopPair {
            route_stop_pattern_onestop_id: Some(CompactString::from("  ")),
            ..Default::default()
        };
        assert_eq!(ssp.route_stop_pattern_id(), None);
    }

    #[test]
    fn missing_time_is_malformed() {
        let ssp = ScheduleStopPair::default();
        assert!(matches!(
            ssp.departure_time(),
            Err(ModelParseError::InvalidTimeFormat(_))
        ));
    }
}
