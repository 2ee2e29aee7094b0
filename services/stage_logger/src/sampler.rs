//! # Sampling Loop
//!
//! Paces acquisition at the session interval, hands every complete reading to
//! the sink and owns the run/stop lifecycle:
//!
//! ```text
//! Idle → Connecting → Sampling → Draining → Stopped
//! ```
//!
//! Every exit path, including a panic inside the instrument or sink, ends in
//! `Stopped` with the sink closed first and the instrument disconnected second.

use crate::session::LogSession;
use chrono::{DateTime, FixedOffset, Local};
use futures::FutureExt;
use instrument_adapters::{AdapterError, InstrumentAdapter};
use record_sink::{RecordSink, SinkMetadata};
use stage_config::LoggerConfig;
use stage_types::PositionSample;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle of a sampling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Connecting,
    Sampling,
    Draining,
    Stopped,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A configured sample or duration limit was reached
    Completed,
    /// The stop flag was cleared
    StoppedByRequest,
    /// `connect` failed or timed out; no samples were attempted
    ConnectionFailed(String),
    /// Too many consecutive appends failed, or the sink can no longer accept records
    WriteFailuresExceeded { consecutive: u32, last_error: String },
    /// A panic escaped the instrument or sink
    Faulted(String),
}

impl Outcome {
    /// Whether the session ended without an error
    pub fn is_clean(&self) -> bool {
        matches!(self, Outcome::Completed | Outcome::StoppedByRequest)
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::StoppedByRequest => write!(f, "stopped by request"),
            Outcome::ConnectionFailed(reason) => write!(f, "connection failed: {}", reason),
            Outcome::WriteFailuresExceeded {
                consecutive,
                last_error,
            } => write!(
                f,
                "aborted after {} consecutive write failures: {}",
                consecutive, last_error
            ),
            Outcome::Faulted(reason) => write!(f, "faulted: {}", reason),
        }
    }
}

/// Loop tuning taken from the `[sampling]` and `[instrument]` config sections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub report_every: u64,
    pub max_consecutive_write_failures: u32,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self::from_config(&LoggerConfig::default())
    }
}

impl SamplerSettings {
    pub fn from_config(config: &LoggerConfig) -> Self {
        Self {
            report_every: config.sampling.report_every.max(1),
            max_consecutive_write_failures: config.sampling.max_consecutive_write_failures.max(1),
            read_timeout: config.sampling.read_timeout(),
            connect_timeout: config.instrument.connect_timeout(),
        }
    }
}

/// Live counters, readable from any task while the loop runs
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    samples_written: AtomicU64,
    read_failures: AtomicU64,
    incomplete_readings: AtomicU64,
    write_failures: AtomicU64,
    rate_bits: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub samples_written: u64,
    pub read_failures: u64,
    pub incomplete_readings: u64,
    pub write_failures: u64,
    /// Samples per second at the last throughput report
    pub rate_per_sec: f64,
}

impl SessionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_written: self.inner.samples_written.load(Ordering::Relaxed),
            read_failures: self.inner.read_failures.load(Ordering::Relaxed),
            incomplete_readings: self.inner.incomplete_readings.load(Ordering::Relaxed),
            write_failures: self.inner.write_failures.load(Ordering::Relaxed),
            rate_per_sec: f64::from_bits(self.inner.rate_bits.load(Ordering::Relaxed)),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn publish_rate(&self, rate: f64) {
        self.inner.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }
}

/// Result of the close-then-disconnect sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeardownReport {
    pub sink_closed: bool,
    pub sink_error: Option<String>,
    pub disconnect_error: Option<String>,
}

/// Everything the caller needs to report a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub stats: StatsSnapshot,
    pub teardown: TeardownReport,
    /// Sink state after teardown
    pub sink: SinkMetadata,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn samples_written(&self) -> u64 {
        self.stats.samples_written
    }
}

/// Interval-paced acquisition loop
///
/// The stop flag is checked at the top of each iteration, so a stop request
/// takes effect within one interval plus one read (itself bounded by
/// `read_timeout`).
#[derive(Debug)]
pub struct SamplingLoop {
    settings: SamplerSettings,
    state: LoopState,
    stats: SessionStats,
}

impl SamplingLoop {
    pub fn new(settings: SamplerSettings) -> Self {
        Self {
            settings,
            state: LoopState::Idle,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Shared handle to the live counters
    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    /// Run one session to completion
    ///
    /// Never returns early and never propagates a panic: the outcome is always
    /// reported after teardown.
    pub async fn run(
        &mut self,
        session: &mut LogSession,
        instrument: &mut dyn InstrumentAdapter,
        sink: &mut dyn RecordSink,
    ) -> SessionReport {
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(self.connect_and_sample(session, instrument, sink))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!("🔥 Sampling loop panicked: {}", reason);
                Outcome::Faulted(reason)
            }
        };

        self.state = LoopState::Draining;
        let teardown = self.teardown(instrument, sink).await;
        self.state = LoopState::Stopped;

        SessionReport {
            outcome,
            stats: self.stats.snapshot(),
            teardown,
            sink: sink.metadata(),
            elapsed: started.elapsed(),
        }
    }

    async fn connect_and_sample(
        &mut self,
        session: &mut LogSession,
        instrument: &mut dyn InstrumentAdapter,
        sink: &mut dyn RecordSink,
    ) -> Outcome {
        self.state = LoopState::Connecting;
        info!("🔌 Connecting to {}...", instrument.describe());

        let connected = match timeout(self.settings.connect_timeout, instrument.connect()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout {
                operation: "connect",
                timeout: self.settings.connect_timeout,
            }),
        };
        if let Err(e) = connected {
            error!("❌ Could not connect to instrument: {}", e);
            return Outcome::ConnectionFailed(e.to_string());
        }

        self.state = LoopState::Sampling;
        info!(
            "✅ Logging started: every {:?} to {}",
            session.interval(),
            session.output_path().display()
        );
        self.sample(session, instrument, sink).await
    }

    async fn sample(
        &mut self,
        session: &mut LogSession,
        instrument: &mut dyn InstrumentAdapter,
        sink: &mut dyn RecordSink,
    ) -> Outcome {
        let sampling_started = Instant::now();
        session.started_at = Some(Local::now());

        let mut last_timestamp: Option<DateTime<FixedOffset>> = None;
        let mut consecutive_write_failures = 0u32;

        loop {
            if !session.is_running() {
                info!("⏹️ Stop requested, draining");
                return Outcome::StoppedByRequest;
            }
            if limit_reached(session, sampling_started) {
                info!("Session limit reached after {} samples", session.sample_count);
                return Outcome::Completed;
            }

            let iteration_start = Instant::now();

            let reading = match timeout(self.settings.read_timeout, instrument.read_position()).await
            {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout {
                    operation: "read_position",
                    timeout: self.settings.read_timeout,
                }),
            };

            match reading {
                Err(e) => {
                    SessionStats::bump(&self.stats.inner.read_failures);
                    warn!("⚠️ Position read failed: {}", e);
                }
                Ok(reading) => {
                    let now = Local::now().fixed_offset();
                    let sample = PositionSample::from_reading(now, &reading).map(|sample| {
                        match last_timestamp {
                            Some(previous) if sample.timestamp < previous => {
                                sample.with_timestamp(previous)
                            }
                            _ => sample,
                        }
                    });

                    match sample {
                        Err(e) => {
                            SessionStats::bump(&self.stats.inner.incomplete_readings);
                            warn!("⚠️ Discarding incomplete reading: {}", e);
                        }
                        Ok(sample) => match sink.append(&sample) {
                            Ok(()) => {
                                consecutive_write_failures = 0;
                                last_timestamp = Some(sample.timestamp);
                                session.sample_count += 1;
                                SessionStats::bump(&self.stats.inner.samples_written);
                                debug!("Sample {}: {}", session.sample_count, sample.to_record());

                                if session.sample_count % self.settings.report_every == 0 {
                                    self.report_rate(session.sample_count, sampling_started);
                                }
                            }
                            Err(e) => {
                                consecutive_write_failures += 1;
                                SessionStats::bump(&self.stats.inner.write_failures);

                                if !e.is_recoverable()
                                    || consecutive_write_failures
                                        >= self.settings.max_consecutive_write_failures
                                {
                                    error!(
                                        "❌ {} consecutive write failures, aborting: {}",
                                        consecutive_write_failures, e
                                    );
                                    return Outcome::WriteFailuresExceeded {
                                        consecutive: consecutive_write_failures,
                                        last_error: e.to_string(),
                                    };
                                }
                                warn!(
                                    "⚠️ Sample lost, write failed ({}/{}): {}",
                                    consecutive_write_failures,
                                    self.settings.max_consecutive_write_failures,
                                    e
                                );
                            }
                        },
                    }
                }
            }

            if limit_reached(session, sampling_started) {
                continue;
            }

            let remaining = session.interval().saturating_sub(iteration_start.elapsed());
            tokio::time::sleep(remaining).await;
        }
    }

    fn report_rate(&self, count: u64, since: Instant) {
        let elapsed = since.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let rate = count as f64 / elapsed;
            self.stats.publish_rate(rate);
            info!("📊 Logged {} samples ({:.2} samples/sec)", count, rate);
        }
    }

    async fn teardown(
        &mut self,
        instrument: &mut dyn InstrumentAdapter,
        sink: &mut dyn RecordSink,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();

        match std::panic::catch_unwind(AssertUnwindSafe(|| sink.close())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to close sink: {}", e);
                report.sink_error = Some(e.to_string());
            }
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!("Sink panicked while closing: {}", reason);
                report.sink_error = Some(reason);
            }
        }
        report.sink_closed = sink.is_closed();

        let disconnect = AssertUnwindSafe(timeout(
            self.settings.connect_timeout,
            instrument.disconnect(),
        ))
        .catch_unwind()
        .await;
        report.disconnect_error = match disconnect {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e.to_string()),
            Ok(Err(_)) => Some(
                AdapterError::Timeout {
                    operation: "disconnect",
                    timeout: self.settings.connect_timeout,
                }
                .to_string(),
            ),
            Err(panic) => Some(panic_message(&*panic)),
        };
        if let Some(e) = &report.disconnect_error {
            warn!("Instrument disconnect failed: {}", e);
        } else {
            info!("Instrument disconnected");
        }

        report
    }
}

fn limit_reached(session: &LogSession, sampling_started: Instant) -> bool {
    let limits = session.limits();
    limits
        .max_samples
        .is_some_and(|max| session.sample_count >= max)
        || limits
            .max_duration
            .is_some_and(|max| sampling_started.elapsed() >= max)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
