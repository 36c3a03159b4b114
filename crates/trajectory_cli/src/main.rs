use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use ssp_trajectory_core::progress::ProgressHandler;
use ssp_trajectory_core::{
    run_speed_check, GeometryStore, MalformedTimePolicy, Pipeline, PipelineConfig,
    ReferencePaths, SspFilter, DEFAULT_CHUNK_SIZE,
};
use ssp_trajectory_model::{parse_service_date, MAX_SCHEDULE_HOUR};

#[derive(Debug, Parser)]
#[command(name = "ssp-geom")]
#[command(about = "Timed trajectories for transit schedule stop pairs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Cut route geometry between each pair's stops and interpolate times
    Match(MatchArgs),
    /// Add distance and speed properties to trajectory features
    Speed(SpeedArgs),
}

#[derive(Debug, clap::Args)]
struct MatchArgs {
    /// Stops, one JSON object with `id` and Point `geometry` per line
    #[arg(long = "stops")]
    stops: PathBuf,

    /// Routes, with LineString or MultiLineString geometry
    #[arg(long = "routes")]
    routes: PathBuf,

    /// Route stop patterns, needed for distance-based cuts
    #[arg(long = "route-stop-patterns", alias = "rsp")]
    route_stop_patterns: Option<PathBuf>,

    /// Schedule stop pair field to copy into feature properties (repeatable)
    #[arg(short = 'k', long = "property")]
    properties: Vec<String>,

    /// Schedule stop pairs, one JSON object per line; `-` reads stdin
    #[arg(short = 'i', long = "input", default_value = "-")]
    input: PathBuf,

    /// Write skipped-record diagnostics here instead of stderr
    #[arg(long = "diagnostics")]
    diagnostics: Option<PathBuf>,

    /// Stop at the first malformed departure or arrival time
    #[arg(long = "strict-times")]
    strict_times: bool,

    #[arg(long = "threads", default_value_t = 1)]
    threads: usize,

    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Keep pairs running on this day of week; 0 is Monday, 6 is Sunday
    #[arg(short = 'd', long = "day", value_parser = clap::value_parser!(u8).range(0..=6))]
    day: Option<u8>,

    /// Keep departures at or after this hour
    #[arg(short = 's', long = "start-hour")]
    start_hour: Option<i32>,

    /// Keep departures before this hour
    #[arg(short = 'e', long = "end-hour")]
    end_hour: Option<i32>,

    /// Keep pairs whose service window contains this YYYY-MM-DD date
    #[arg(long = "service-date")]
    service_date: Option<String>,

    /// Report pairs whose distance and nearest-point cuts differ by more than this many meters
    #[arg(long = "cross-check-meters")]
    cross_check_meters: Option<f64>,

    /// Show progress bars on stderr
    #[arg(long = "progress")]
    progress: bool,
}

#[derive(Debug, clap::Args)]
struct SpeedArgs {
    /// Trajectory features, one per line; `-` reads stdin
    #[arg(short = 'i', long = "input", default_value = "-")]
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Match(args) => run_match(args),
        Command::Speed(args) => run_speed(args),
    }
}

fn run_match(args: &MatchArgs) -> anyhow::Result<()> {
    let config = pipeline_config(args)?;
    let started_at = Instant::now();

    let mut paths = ReferencePaths::new(&args.stops, &args.routes);
    if let Some(path) = &args.route_stop_patterns {
        paths = paths.with_route_stop_patterns(path);
    }
    let progress_handler = args.progress.then(IndicatifHandler::new);
    let progress = progress_handler
        .as_ref()
        .map(|handler| handler as &dyn ProgressHandler);

    let store = GeometryStore::from_paths(&paths, progress).context("load reference geometry")?;
    info!(
        "loaded {} stops, {} routes, {} route stop patterns",
        store.stop_count(),
        store.route_count(),
        store.route_stop_pattern_count()
    );

    let input = open_input(&args.input)?;
    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());
    let mut diagnostics = open_diagnostics(args.diagnostics.as_deref())?;

    let summary = Pipeline::new(&store, &config)
        .run(input, &mut output, &mut diagnostics, progress)
        .context("process schedule stop pairs")?;

    info!(
        "read {} records: {} emitted, {} skipped, {} filtered in {:.2}s",
        summary.read,
        summary.emitted,
        summary.skipped,
        summary.filtered,
        started_at.elapsed().as_secs_f64()
    );
    for (code, count) in &summary.notices_by_code {
        info!("{}: {}", code, count);
    }
    Ok(())
}

fn run_speed(args: &SpeedArgs) -> anyhow::Result<()> {
    let input = open_input(&args.input)?;
    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());
    let summary = run_speed_check(input, &mut output).context("measure trajectory speeds")?;
    output.flush()?;
    info!(
        "measured {} of {} features ({} without elapsed time, {} not timed lines)",
        summary.measured, summary.read, summary.zero_duration, summary.unmeasured
    );
    Ok(())
}

fn pipeline_config(args: &MatchArgs) -> anyhow::Result<PipelineConfig> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    for (flag, hour) in [("--start-hour", args.start_hour), ("--end-hour", args.end_hour)] {
        if let Some(hour) = hour {
            if !(0..=MAX_SCHEDULE_HOUR + 1).contains(&hour) {
                bail!("{} must be between 0 and {}", flag, MAX_SCHEDULE_HOUR + 1);
            }
        }
    }
    let service_date = match args.service_date.as_deref() {
        Some(value) => Some(
            parse_service_date(value)
                .with_context(|| format!("invalid --service-date {}", value))?,
        ),
        None => None,
    };

    let mut config = PipelineConfig::default()
        .with_allowed_properties(args.properties.iter().cloned())
        .with_malformed_time_policy(if args.strict_times {
            MalformedTimePolicy::Abort
        } else {
            MalformedTimePolicy::Skip
        })
        .with_filter(SspFilter {
            day: args.day.map(usize::from),
            start_hour: args.start_hour,
            end_hour: args.end_hour,
            service_date,
        })
        .with_threads(args.threads)
        .with_chunk_size(args.chunk_size);
    if let Some(meters) = args.cross_check_meters {
        if !meters.is_finite() || meters < 0.0 {
            bail!("--cross-check-meters must be a non-negative number");
        }
        config = config.with_cross_check_meters(meters);
    }
    Ok(config)
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("open input {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_diagnostics(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("create diagnostics file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stderr())),
    }
}

struct IndicatifHandler {
    _multi: MultiProgress,
    loading_pb: ProgressBar,
    records_pb: ProgressBar,
}

impl IndicatifHandler {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let loading_pb = multi.add(ProgressBar::new_spinner());
        loading_pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        loading_pb.set_message("Waiting to load reference files...");

        let records_pb = multi.add(ProgressBar::new_spinner());
        records_pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.magenta} [{elapsed_precise}] {human_pos} records ({per_sec}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        Self {
            _multi: multi,
            loading_pb,
            records_pb,
        }
    }
}

impl ProgressHandler for IndicatifHandler {
    fn on_start_reference_load(&self, file: &str) {
        self.loading_pb.set_message(format!("Loading {}", file));
    }

    fn on_finish_reference_load(&self, file: &str, records: usize) {
        self.loading_pb
            .set_message(format!("Loaded {} records from {}", records, file));
    }

    fn on_record_processed(&self) {
        self.records_pb.inc(1);
    }

    fn on_finish_stream(&self) {
        self.loading_pb.finish();
        self.records_pb.finish_with_message("done");
    }
}
