//! # Simulated Stage
//!
//! Random-walk goniometer used when no vendor driver is available. Reads take
//! `latency_ms`, fail with probability `failure_rate` and lose trailing axes
//! with probability `partial_rate`. A fixed `seed` makes runs reproducible.

use crate::instrument::{ConnectionState, InstrumentAdapter};
use crate::{AdapterError, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stage_config::SimulatedStageConfig;
use stage_types::{StageReading, AXIS_COUNT};
use std::time::Duration;
use tracing::{debug, info};

/// Per-read step size for each axis (linear in µm, tilts in degrees)
const STEP: [f64; AXIS_COUNT] = [0.5, 0.5, 0.1, 0.05, 0.05];

/// Travel limits for each axis
const LIMIT: [f64; AXIS_COUNT] = [1000.0, 1000.0, 200.0, 70.0, 30.0];

/// Random-walk stage
#[derive(Debug)]
pub struct SimulatedStage {
    config: SimulatedStageConfig,
    rng: StdRng,
    state: ConnectionState,
    position: [f64; AXIS_COUNT],
    reads: u64,
}

impl SimulatedStage {
    /// Create a stage at the origin
    pub fn new(config: SimulatedStageConfig) -> Result<Self> {
        for (name, rate) in [
            ("failure_rate", config.failure_rate),
            ("partial_rate", config.partial_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AdapterError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, rate
                )));
            }
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            rng,
            state: ConnectionState::Disconnected,
            position: [0.0; AXIS_COUNT],
            reads: 0,
        })
    }

    /// Reads served since construction
    pub fn reads(&self) -> u64 {
        self.reads
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn advance(&mut self) {
        for ((value, step), limit) in self.position.iter_mut().zip(STEP).zip(LIMIT) {
            *value = (*value + self.rng.gen_range(-step..=step)).clamp(-limit, limit);
        }
    }
}

#[async_trait]
impl InstrumentAdapter for SimulatedStage {
    async fn connect(&mut self) -> Result<()> {
        self.simulate_latency().await;
        self.state = ConnectionState::Connected;
        info!("🔌 Connected to {}", self.describe());
        Ok(())
    }

    async fn read_position(&mut self) -> Result<StageReading> {
        if self.state != ConnectionState::Connected {
            return Err(AdapterError::NotConnected(self.describe()));
        }

        self.simulate_latency().await;
        self.reads += 1;

        if self.rng.gen_bool(self.config.failure_rate) {
            return Err(AdapterError::ReadFailed(format!(
                "simulated fault on read {}",
                self.reads
            )));
        }

        self.advance();

        if self.rng.gen_bool(self.config.partial_rate) {
            let kept = self.rng.gen_range(0..AXIS_COUNT);
            debug!("Simulated stage dropping axes after {}", kept);
            return Ok(StageReading(self.position[..kept].to_vec()));
        }

        Ok(StageReading::from(self.position))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            info!("Disconnected from {} after {} reads", self.describe(), self.reads);
        }
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn describe(&self) -> String {
        match self.config.seed {
            Some(seed) => format!("simulated stage (seed {})", seed),
            None => "simulated stage".to_string(),
        }
    }
}
