use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use geojson::Feature;
use ssp_trajectory_model::{ModelParseError, ScheduleStopPair};
use tracing::debug;

use crate::config::{MalformedTimePolicy, PipelineConfig};
use crate::emitter::{write_feature, write_notice, Emitted, FeatureEmitter};
use crate::error::CoreError;
use crate::interpolate::{interpolate_span, TimeSpan, TimedLine};
use crate::matcher::{MatchResult, Matcher, Unmatched};
use crate::notice::Notice;
use crate::progress::ProgressHandler;
use crate::store::GeometryStore;

/// What became of one input line.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// A trajectory for the data stream, with any informational notices.
    Emitted {
        feature: Feature,
        notices: Vec<Notice>,
    },
    Skipped(Notice),
    /// Dropped by the record filter; nothing is written.
    Filtered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub read: u64,
    pub emitted: u64,
    pub skipped: u64,
    pub filtered: u64,
    pub notices_by_code: BTreeMap<String, u64>,
}

impl RunSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        self.read += 1;
        match outcome {
            RecordOutcome::Emitted { notices, .. } => {
                self.emitted += 1;
                for notice in notices {
                    self.count_notice(notice);
                }
            }
            RecordOutcome::Skipped(notice) => {
                self.skipped += 1;
                self.count_notice(notice);
            }
            RecordOutcome::Filtered => self.filtered += 1,
        }
    }

    fn count_notice(&mut self, notice: &Notice) {
        *self.notices_by_code.entry(notice.code.clone()).or_insert(0) += 1;
    }
}

/// Turns schedule stop pairs into timed trajectories against one store.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    matcher: Matcher<'a>,
    emitter: FeatureEmitter,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a GeometryStore, config: &'a PipelineConfig) -> Self {
        Self {
            config,
            matcher: Matcher::new(store),
            emitter: FeatureEmitter::new(config.allowed_properties.iter().cloned()),
        }
    }

    /// `line_number` is 1-based and only used to label diagnostics.
    pub fn process_line(&self, line_number: u64, line: &str) -> Result<RecordOutcome, CoreError> {
        match serde_json::from_str::<ScheduleStopPair>(line) {
            Ok(ssp) => self.process_record(line_number, &ssp),
            Err(err) => Ok(RecordOutcome::Skipped(Notice::malformed_record(
                line_number,
                &err,
            ))),
        }
    }

    pub fn process_record(
        &self,
        line_number: u64,
        ssp: &ScheduleStopPair,
    ) -> Result<RecordOutcome, CoreError> {
        if !self.config.filter.accepts(ssp) {
            return Ok(RecordOutcome::Filtered);
        }

        let cut = match self.matcher.match_ssp(ssp)? {
            MatchResult::Matched(cut) => cut,
            MatchResult::Unmatched(reason) => {
                return Ok(self.outcome(line_number, ssp, Err(&reason), Vec::new()));
            }
        };

        let span = match time_span(ssp) {
            Ok(span) => span,
            Err(source) => match self.config.malformed_time_policy {
                MalformedTimePolicy::Skip => {
                    return Ok(RecordOutcome::Skipped(
                        Notice::malformed_time(&source)
                            .for_record(ssp)
                            .at_line(line_number),
                    ));
                }
                MalformedTimePolicy::Abort => {
                    return Err(CoreError::MalformedTime {
                        line: line_number,
                        source,
                    });
                }
            },
        };
        let timed = interpolate_span(&cut.line, span);

        let mut notices = Vec::new();
        if let Some(threshold) = self.config.cross_check_meters {
            if let Some(discrepancy) = self.matcher.cross_check(ssp, &cut) {
                if discrepancy.exceeds(threshold) {
                    notices.push(
                        Notice::strategy_mismatch(&discrepancy, threshold)
                            .for_record(ssp)
                            .at_line(line_number),
                    );
                }
            }
        }
        Ok(self.outcome(line_number, ssp, Ok(&timed), notices))
    }

    /// Streams newline-delimited records from `input`, writing features to
    /// `output` and notices to `diagnostics`, in input order. Blank lines are
    /// ignored.
    pub fn run<R, W, D>(
        &self,
        input: R,
        output: &mut W,
        diagnostics: &mut D,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<RunSummary, CoreError>
    where
        R: BufRead,
        W: Write,
        D: Write,
    {
        #[cfg(feature = "parallel")]
        {
            if self.config.threads > 1 {
                return self.run_parallel(input, output, diagnostics, progress);
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            if self.config.threads > 1 {
                tracing::warn!("built without the parallel feature, using one thread");
            }
        }

        let mut summary = RunSummary::default();
        for (index, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let outcome = self.process_line(index as u64 + 1, &line)?;
            summary.record(&outcome);
            write_outcome(&outcome, output, diagnostics)?;
            if let Some(progress) = progress {
                progress.on_record_processed();
            }
        }
        finish_run(output, diagnostics, progress)?;
        debug!("processed {} records on one thread", summary.read);
        Ok(summary)
    }

    /// Reads `chunk_size` records at a time and matches each chunk on a
    /// worker pool. Results are collected by index, so output order matches
    /// input order.
    #[cfg(feature = "parallel")]
    fn run_parallel<R, W, D>(
        &self,
        input: R,
        output: &mut W,
        diagnostics: &mut D,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<RunSummary, CoreError>
    where
        R: BufRead,
        W: Write,
        D: Write,
    {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|err| CoreError::WorkerPool(err.to_string()))?;
        let chunk_size = self.config.chunk_size.max(1);

        let mut summary = RunSummary::default();
        let mut lines = input.lines().enumerate();
        let mut chunk: Vec<(u64, String)> = Vec::with_capacity(chunk_size);
        loop {
            chunk.clear();
            for (index, line) in lines.by_ref() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                chunk.push((index as u64 + 1, line));
                if chunk.len() >= chunk_size {
                    break;
                }
            }
            if chunk.is_empty() {
                break;
            }

            let outcomes: Vec<Result<RecordOutcome, CoreError>> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|(line_number, line)| self.process_line(*line_number, line))
                    .collect()
            });
            for outcome in outcomes {
                let outcome = outcome?;
                summary.record(&outcome);
                write_outcome(&outcome, output, diagnostics)?;
                if let Some(progress) = progress {
                    progress.on_record_processed();
                }
            }
        }
        finish_run(output, diagnostics, progress)?;
        debug!(
            "processed {} records on {} threads",
            summary.read, self.config.threads
        );
        Ok(summary)
    }

    fn outcome(
        &self,
        line_number: u64,
        ssp: &ScheduleStopPair,
        timed: Result<&TimedLine, &Unmatched>,
        notices: Vec<Notice>,
    ) -> RecordOutcome {
        match self.emitter.emit(ssp, timed) {
            Emitted::Feature(feature) => RecordOutcome::Emitted { feature, notices },
            Emitted::Skipped(notice) => RecordOutcome::Skipped(notice.at_line(line_number)),
        }
    }
}

fn time_span(ssp: &ScheduleStopPair) -> Result<TimeSpan, ModelParseError> {
    Ok(TimeSpan {
        start: ssp.departure_time()?,
        end: ssp.arrival_time()?,
    })
}

fn write_outcome<W: Write, D: Write>(
    outcome: &RecordOutcome,
    output: &mut W,
    diagnostics: &mut D,
) -> io::Result<()> {
    match outcome {
        RecordOutcome::Emitted { feature, notices } => {
            write_feature(output, feature)?;
            for notice in notices {
                write_notice(diagnostics, notice)?;
            }
        }
        RecordOutcome::Skipped(notice) => write_notice(diagnostics, notice)?,
        RecordOutcome::Filtered => {}
    }
    Ok(())
}

fn finish_run<W: Write, D: Write>(
    output: &mut W,
    diagnostics: &mut D,
    progress: Option<&dyn ProgressHandler>,
) -> io::Result<()> {
    output.flush()?;
    diagnostics.flush()?;
    if let Some(progress) = progress {
        progress.on_finish_stream();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::{
        NOTICE_CODE_MALFORMED_RECORD, NOTICE_CODE_MALFORMED_TIME, NOTICE_CODE_REFERENCE_NOT_FOUND,
        NOTICE_CODE_UNPROJECTABLE_GEOMETRY,
    };
    use compact_str::CompactString;
    use geo_types::{Coord, LineString};
    use ssp_trajectory_model::{Route, RouteGeometry, RouteStopPattern, Stop};
    use std::io::Cursor;

    fn store() -> GeometryStore {
        store_with_patterns(Vec::new())
    }

    fn store_with_patterns(patterns: Vec<RouteStopPattern>) -> GeometryStore {
        GeometryStore::new(
            vec![
                Stop {
                    id: CompactString::from("s-a"),
                    location: Coord { x: -122.0, y: 37.0 },
                },
                Stop {
                    id: CompactString::from("s-b"),
                    location: Coord { x: -121.0, y: 37.0 },
                },
            ],
            vec![Route {
                id: CompactString::from("r-x"),
                geometry: RouteGeometry::Line(LineString::from(vec![
                    (-122.0, 37.0),
                    (-121.0, 37.0),
                    (-120.0, 37.0),
                ])),
            }],
            patterns,
        )
    }

    const GOOD: &str = r#"{"origin_onestop_id":"s-a","destination_onestop_id":"s-b","route_onestop_id":"r-x","origin_departure_time":"08:00:00","destination_arrival_time":"08:10:00"}"#;

    #[test]
    fn counts_every_outcome() {
        let store = store();
        let config = PipelineConfig::default();
        let pipeline = Pipeline::new(&store, &config);
        let input = format!(
            "{GOOD}\nnot json\n\n{}\n{}\n",
            GOOD.replace("s-b", "s-missing"),
            GOOD.replace("08:10:00", "8:10")
        );

        let mut output = Vec::new();
        let mut diagnostics = Vec::new();
        let summary = pipeline
            .run(Cursor::new(input), &mut output, &mut diagnostics, None)
            .unwrap();

        assert_eq!(summary.read, 4);
        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.notices_by_code[NOTICE_CODE_MALFORMED_RECORD], 1);
        assert_eq!(summary.notices_by_code[NOTICE_CODE_REFERENCE_NOT_FOUND], 1);
        assert_eq!(summary.notices_by_code[NOTICE_CODE_MALFORMED_TIME], 1);

        let diagnostics = String::from_utf8(diagnostics).unwrap();
        assert_eq!(diagnostics.lines().count(), 3);
        assert!(diagnostics.lines().nth(1).unwrap().contains("(line 4)"));
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 1);
    }

    #[test]
    fn filtered_records_are_silent() {
        let store = store();
        let config = PipelineConfig::default().with_filter(crate::filter::SspFilter {
            start_hour: Some(9),
            ..Default::default()
        });
        let pipeline = Pipeline::new(&store, &config);
        let outcome = pipeline.process_line(1, GOOD).unwrap();
        assert!(matches!(outcome, RecordOutcome::Filtered));
    }

    #[test]
    fn unprojectable_pattern_does_not_stop_the_stream() {
        let store = store_with_patterns(vec![RouteStopPattern {
            id: CompactString::from("rsp-bad"),
            geometry: LineString::from(vec![(-122.0, 37.0), (-121.0, 37.0), (58.0, 95.0)]),
        }]);
        let config = PipelineConfig::default();
        let pipeline = Pipeline::new(&store, &config);
        let bad = GOOD.replace(
            "\"route_onestop_id\":\"r-x\"",
            "\"route_onestop_id\":\"r-x\",\"route_stop_pattern_onestop_id\":\"rsp-bad\",\"origin_dist_traveled\":0,\"destination_dist_traveled\":10000",
        );
        let input = format!("{bad}\n{GOOD}\n");

        let mut output = Vec::new();
        let mut diagnostics = Vec::new();
        let summary = pipeline
            .run(Cursor::new(input), &mut output, &mut diagnostics, None)
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.notices_by_code[NOTICE_CODE_UNPROJECTABLE_GEOMETRY], 1);
        let diagnostics = String::from_utf8(diagnostics).unwrap();
        assert!(diagnostics.starts_with("warning unprojectable_geometry (line 1)"));
        assert!(diagnostics.contains("route_stop_pattern=rsp-bad"));
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 1);
    }
}
