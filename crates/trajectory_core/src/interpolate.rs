use geo_types::LineString;
use ssp_trajectory_model::{ModelParseError, ScheduleTime};

use crate::linref::{cumulative_distances, line_length};

/// A departure/arrival pair in seconds past midnight of the service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: ScheduleTime,
    pub end: ScheduleTime,
}

impl TimeSpan {
    pub fn parse(start: &str, end: &str) -> Result<Self, ModelParseError> {
        Ok(Self {
            start: ScheduleTime::parse(start)?,
            end: ScheduleTime::parse(end)?,
        })
    }

    /// Time at a fraction of the way through the span, rounded to a tenth of
    /// a second with ties to even.
    pub fn at(&self, proportion: f64) -> f64 {
        let start = f64::from(self.start.total_seconds());
        let end = f64::from(self.end.total_seconds());
        round_tenths(start + proportion * (end - start))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedCoord {
    pub x: f64,
    pub y: f64,
    pub time: f64,
}

/// A cut line with an interpolated time on every vertex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimedLine(pub Vec<TimedCoord>);

impl TimedLine {
    pub fn positions(&self) -> Vec<Vec<f64>> {
        self.0
            .iter()
            .map(|coord| vec![coord.x, coord.y, coord.time])
            .collect()
    }
}

pub fn interpolate(
    cut_line: &LineString<f64>,
    start_time: &str,
    end_time: &str,
) -> Result<TimedLine, ModelParseError> {
    Ok(interpolate_span(cut_line, TimeSpan::parse(start_time, end_time)?))
}

/// Assigns each vertex the time at its share of the line's length. Vertex
/// count and order are unchanged; a zero-length line gets the start time
/// throughout.
pub fn interpolate_span(cut_line: &LineString<f64>, span: TimeSpan) -> TimedLine {
    let total = line_length(cut_line);
    let coords = cut_line
        .0
        .iter()
        .zip(cumulative_distances(cut_line))
        .map(|(coord, travelled)| {
            let proportion = if total > 0.0 { travelled / total } else { 0.0 };
            TimedCoord {
                x: coord.x,
                y: coord.y,
                time: span.at(proportion),
            }
        })
        .collect();
    TimedLine(coords)
}

/// Rounds to one decimal place on the exact decimal value of `value`, so
/// 28800.35 (stored just below the tie) becomes 28800.3. Exact ties go to
/// the even digit.
pub fn round_tenths(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.1}", value).parse().unwrap_or(value)
}
