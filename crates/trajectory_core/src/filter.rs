use chrono::NaiveDate;
use serde_json::Value;
use ssp_trajectory_model::{parse_service_date, ScheduleStopPair};

/// Pre-match selection of schedule stop pairs. Every clause that is set must
/// hold for a record to be kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SspFilter {
    /// Day of week, 0 for Monday through 6 for Sunday.
    pub day: Option<usize>,
    /// Keep departures at or after this hour.
    pub start_hour: Option<i32>,
    /// Keep departures before this hour.
    pub end_hour: Option<i32>,
    /// Keep records whose service window contains this date.
    pub service_date: Option<NaiveDate>,
}

impl SspFilter {
    pub fn is_empty(&self) -> bool {
        self.day.is_none()
            && self.start_hour.is_none()
            && self.end_hour.is_none()
            && self.service_date.is_none()
    }

    pub fn accepts(&self, ssp: &ScheduleStopPair) -> bool {
        if let Some(day) = self.day {
            let runs = ssp
                .extra
                .get("service_days_of_week")
                .and_then(Value::as_array)
                .and_then(|days| days.get(day))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !runs {
                return false;
            }
        }

        if self.start_hour.is_some() || self.end_hour.is_some() {
            // An unparseable time is left for the malformed-time policy.
            if let Ok(departure) = ssp.departure_time() {
                let hour = departure.hours();
                if self.start_hour.is_some_and(|start| hour < start) {
                    return false;
                }
                if self.end_hour.is_some_and(|end| hour >= end) {
                    return false;
                }
            }
        }

        if let Some(date) = self.service_date {
            let window = (
                service_date_field(ssp, "service_start_date"),
                service_date_field(ssp, "service_end_date"),
            );
            match window {
                (Some(start), Some(end)) if start <= date && date < end => {}
                _ => return false,
            }
        }

        true
    }
}

fn service_date_field(ssp: &ScheduleStopPair, key: &str) -> Option<NaiveDate> {
    ssp.extra
        .get(key)
        .and_then(Value::as_str)
        .and_then(|value| parse_service_date(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ScheduleStopPair {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> ScheduleStopPair {
        record(json!({
            "origin_onestop_id": "s-a",
            "destination_onestop_id": "s-b",
            "route_onestop_id": "r-x",
            "origin_departure_time": "08:30:00",
            "destination_arrival_time": "08:40:00",
            "service_days_of_week": [true, true, true, true, true, false, false],
            "service_start_date": "2019-01-01",
            "service_end_date": "2019-06-30"
        }))
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let filter = SspFilter::default();
        assert!(filter.is_empty());
        assert!(filter.accepts(&sample()));
        assert!(filter.accepts(&ScheduleStopPair::default()));
    }

    #[test]
    fn filters_by_service_day() {
        let weekday = SspFilter {
            day: Some(0),
            ..Default::default()
        };
        let sunday = SspFilter {
            day: Some(6),
            ..Default::default()
        };
        let out_of_range = SspFilter {
            day: Some(9),
            ..Default::default()
        };
        assert!(weekday.accepts(&sample()));
        assert!(!sunday.accepts(&sample()));
        assert!(!out_of_range.accepts(&sample()));
        assert!(!weekday.accepts(&ScheduleStopPair::default()));
    }

    #[test]
    fn hour_window_is_half_open() {
        let filter = |start, end| SspFilter {
            start_hour: start,
            end_hour: end,
            ..Default::default()
        };
        assert!(filter(Some(8), None).accepts(&sample()));
        assert!(!filter(Some(9), None).accepts(&sample()));
        assert!(filter(None, Some(9)).accepts(&sample()));
        assert!(!filter(None, Some(8)).accepts(&sample()));
        assert!(filter(Some(7), Some(9)).accepts(&sample()));
    }

    #[test]
    fn unparseable_departure_passes_hour_filter() {
        let mut ssp = sample();
        ssp.origin_departure_time = Some("late".to_string());
        let filter = SspFilter {
            start_hour: Some(23),
            ..Default::default()
        };
        assert!(filter.accepts(&ssp));
    }

    #[test]
    fn service_date_inside_window() {
        let on = |date: &str| SspFilter {
            service_date: Some(parse_service_date(date).unwrap()),
            ..Default::default()
        };
        assert!(on("2019-01-01").accepts(&sample()));
        assert!(on("2019-03-15").accepts(&sample()));
        assert!(!on("2019-06-30").accepts(&sample()));
        assert!(!on("2018-12-31").accepts(&sample()));
        assert!(!on("2019-03-15").accepts(&ScheduleStopPair::default()));
    }

    #[test]
    fn clauses_combine_with_and() {
        let filter = SspFilter {
            day: Some(0),
            start_hour: Some(9),
            ..Default::default()
        };
        assert!(!filter.accepts(&sample()));
    }
}
