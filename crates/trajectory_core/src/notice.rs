use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use ssp_trajectory_model::{ModelParseError, ScheduleStopPair};

use crate::matcher::{StrategyDiscrepancy, Unmatched};

pub const NOTICE_CODE_REFERENCE_NOT_FOUND: &str = "reference_not_found";
pub const NOTICE_CODE_NO_REFERENCE_GEOMETRY: &str = "no_reference_geometry";
pub const NOTICE_CODE_DEGENERATE_GEOMETRY: &str = "degenerate_geometry";
pub const NOTICE_CODE_UNPROJECTABLE_GEOMETRY: &str = "unprojectable_geometry";
pub const NOTICE_CODE_MALFORMED_TIME: &str = "malformed_time";
pub const NOTICE_CODE_MALFORMED_RECORD: &str = "malformed_record";
pub const NOTICE_CODE_STRATEGY_MISMATCH: &str = "strategy_mismatch";

const RECORD_ID_FIELDS: [&str; 4] = [
    "origin_onestop_id",
    "destination_onestop_id",
    "route_onestop_id",
    "route_stop_pattern_onestop_id",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

impl NoticeSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeSeverity::Error => "error",
            NoticeSeverity::Warning => "warning",
            NoticeSeverity::Info => "info",
        }
    }
}

/// A diagnostic about one input record. Notices never go to the data
/// stream; each one renders as a single line on the diagnostics writer.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub code: String,
    pub severity: NoticeSeverity,
    pub message: String,
    /// 1-based line of the record in the input stream.
    pub line: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,
}

impl Notice {
    pub fn new(
        code: impl Into<String>,
        severity: NoticeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            line: None,
            context: BTreeMap::new(),
            field_order: Vec::new(),
        }
    }

    pub fn unmatched(reason: &Unmatched) -> Self {
        let code = match reason {
            Unmatched::ReferenceNotFound { .. } => NOTICE_CODE_REFERENCE_NOT_FOUND,
            Unmatched::NoReferenceGeometry { .. } => NOTICE_CODE_NO_REFERENCE_GEOMETRY,
            Unmatched::DegenerateGeometry { .. } => NOTICE_CODE_DEGENERATE_GEOMETRY,
            Unmatched::UnprojectableGeometry { .. } => NOTICE_CODE_UNPROJECTABLE_GEOMETRY,
        };
        let mut notice = Notice::new(code, NoticeSeverity::Warning, reason.to_string());
        match reason {
            Unmatched::ReferenceNotFound { kind, id } => {
                notice.insert_context_field("missing_kind", kind.as_str());
                notice.insert_context_field("missing_id", id.as_str());
            }
            Unmatched::NoReferenceGeometry { route_id } => {
                notice.insert_context_field("missing_id", route_id.as_str());
            }
            Unmatched::DegenerateGeometry { strategy, .. } => {
                notice.insert_context_field("strategy", strategy.as_str());
            }
            Unmatched::UnprojectableGeometry { rsp_id, epsg, .. } => {
                notice.insert_context_field("route_stop_pattern", rsp_id.as_str());
                notice.insert_context_field("epsg", epsg);
            }
        }
        return notice;
    }

    pub fn malformed_time(error: &ModelParseError) -> Self {
        Notice::new(
            NOTICE_CODE_MALFORMED_TIME,
            NoticeSeverity::Warning,
            error.to_string(),
        )
    }

    pub fn malformed_record(line: u64, error: &serde_json::Error) -> Self {
        let mut notice = Notice::new(
            NOTICE_CODE_MALFORMED_RECORD,
            NoticeSeverity::Error,
            format!("not a schedule stop pair: {}", error),
        );
        notice.line = Some(line);
        return notice;
    }

    pub fn strategy_mismatch(discrepancy: &StrategyDiscrepancy, threshold_m: f64) -> Self {
        Notice::new(
            NOTICE_CODE_STRATEGY_MISMATCH,
            NoticeSeverity::Info,
            format!(
                "distance and nearest-point cuts disagree by more than {} m",
                threshold_m
            ),
        )
        .with_context_field("start_offset_m", round_centimeters(discrepancy.start_offset_m))
        .with_context_field("end_offset_m", round_centimeters(discrepancy.end_offset_m))
    }

    /// Attaches the identifiers of the record the notice is about.
    pub fn for_record(mut self, ssp: &ScheduleStopPair) -> Self {
        for field in RECORD_ID_FIELDS {
            if let Some(value) = ssp.property(field) {
                self.insert_context_field(field, value);
            }
        }
        self
    }

    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let key = name.into();
        let serialized = serde_json::to_value(value).unwrap_or_else(|_| Value::Null);
        if !self.field_order.iter().any(|item| item == &key) {
            self.field_order.push(key.clone());
        }
        self.context.insert(key, serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity.as_str(), self.code)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        write!(f, ": {}", self.message)?;
        let mut first = true;
        for key in &self.field_order {
            let Some(value) = self.context.get(key) else {
                continue;
            };
            f.write_str(if first { " [" } else { " " })?;
            first = false;
            match value {
                Value::String(text) => write!(f, "{}={}", key, text)?,
                other => write!(f, "{}={}", key, other)?,
            }
        }
        if !first {
            f.write_str("]")?;
        }
        Ok(())
    }
}

fn round_centimeters(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
