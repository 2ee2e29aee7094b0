//! Stage position logger
//!
//! Usage:
//!   stage_logger [OUTPUT_PATH] [INTERVAL_SECONDS]
//!   stage_logger --config stage_logger.toml --max-samples 600
//!   stage_logger --print-config > stage_logger.toml

use anyhow::{Context, Result};
use clap::Parser;
use instrument_adapters::build_instrument;
use record_sink::{CsvFileSink, OpenMode, RecordSink};
use stage_config::LoggerConfig;
use stage_logger::{
    resolve_initial, ConfigurationError, Console, LogSession, Outcome, SamplerSettings, SamplingLoop, SessionArgs,
    SessionLimits, ShutdownController, StopHandle,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stage_logger")]
#[command(about = "Log microscope stage positions to a CSV file")]
#[command(version)]
struct Args {
    /// Output CSV file (appended to if it exists)
    output_path: Option<String>,

    /// Seconds between samples
    #[arg(allow_hyphen_values = true)]
    interval: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Stop after this many samples
    #[arg(long)]
    max_samples: Option<u64>,

    /// Stop after this many seconds of sampling
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = LoggerConfig::load(args.config.as_deref()).map_err(ConfigurationError::Load);
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&args, &config)?;

    println!("TEM Stage Position Logger");
    println!("=========================\n");

    let session_args = SessionArgs {
        output_path: args.output_path.clone(),
        interval: args.interval.clone(),
    };
    let (draft, notices) = resolve_initial(&session_args, &config);

    let stdin = io::stdin();
    let confirmed = Console::new(stdin.lock(), io::stdout())
        .run(draft, notices)
        .context("Failed to run configuration menu")?;
    let Some(draft) = confirmed else {
        println!("Logging aborted by operator.");
        return Ok(());
    };

    let limits = SessionLimits {
        max_samples: args.max_samples,
        max_duration: args.duration_secs.map(Duration::from_secs),
    };
    let stop = StopHandle::new();
    let mut session = LogSession::new(&draft.output_path, draft.interval, stop.clone())?
        .with_limits(limits);

    let mut sink = match CsvFileSink::open(&draft.output_path) {
        Ok(sink) => sink,
        Err(e) => {
            error!("❌ Failed to set up log file: {}", e);
            println!("Logging failed: could not open {}", draft.output_path.display());
            std::process::exit(1);
        }
    };
    if sink.mode() == OpenMode::Continued {
        info!("📋 Continuing existing log, header kept");
    }

    let mut instrument = match build_instrument(&config.instrument) {
        Ok(instrument) => instrument,
        Err(e) => {
            error!("❌ {}", e);
            if let Err(close_error) = sink.close() {
                error!("❌ Failed to close log file: {}", close_error);
            }
            println!("Logging failed: {}", e);
            std::process::exit(1);
        }
    };

    info!("🚀 Starting stage position logger");
    info!("   Output file: {}", draft.output_path.display());
    info!("   Interval: {:?}", draft.interval);
    if !limits.is_unbounded() {
        info!("   Limits: {:?}", limits);
    }
    println!("\nLogging... press Ctrl+C to stop.\n");

    let listener = ShutdownController::install(stop);

    let mut sampler = SamplingLoop::new(SamplerSettings::from_config(&config));
    let report = sampler
        .run(&mut session, instrument.as_mut(), &mut sink)
        .await;
    listener.abort();

    info!(
        "📊 Final stats: {} written, {} read failures, {} incomplete, {} write failures, {:?} elapsed",
        report.stats.samples_written,
        report.stats.read_failures,
        report.stats.incomplete_readings,
        report.stats.write_failures,
        report.elapsed
    );
    info!(
        "   Sink {} ({}): {} records, {} failed, state {:?}, last error {:?}",
        report.sink.name,
        report.sink.endpoint.as_deref().unwrap_or("-"),
        report.sink.records_written,
        report.sink.records_failed,
        report.sink.state,
        report.sink.last_error
    );

    match &report.outcome {
        Outcome::Completed | Outcome::StoppedByRequest => {
            println!(
                "Logging {} ({} samples written).",
                report.outcome,
                report.samples_written()
            );
        }
        outcome => {
            error!("🔥 Session ended: {}", outcome);
            println!(
                "Logging failed: {} ({} samples written).",
                outcome,
                report.samples_written()
            );
        }
    }

    std::process::exit(report.outcome.exit_code());
}

fn init_logging(args: &Args, config: &LoggerConfig) -> Result<()> {
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if args.json_logs || config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}
