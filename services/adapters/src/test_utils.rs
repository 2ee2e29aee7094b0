//! Scripted instrument for exercising the sampling loop without hardware

use crate::instrument::{ConnectionState, InstrumentAdapter};
use crate::{AdapterError, Result};
use async_trait::async_trait;
use stage_types::StageReading;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One scripted response to `read_position`
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return these values immediately
    Reading(Vec<f64>),
    /// Return `ReadFailed` with this message
    Fail(String),
    /// Take `Duration` before returning the values
    Slow(Duration, Vec<f64>),
    /// Never complete
    Hang,
    /// Panic inside the read
    Panic(String),
}

type ReadHook = Box<dyn FnMut(u64) + Send>;

/// Instrument that replays a script and records every call
///
/// Once the script runs out, each read returns a complete reading whose `x`
/// is the 1-based read number.
pub struct ScriptedInstrument {
    script: VecDeque<ScriptStep>,
    connect_error: Option<String>,
    state: ConnectionState,
    connect_calls: u32,
    disconnect_calls: u32,
    read_calls: u64,
    read_instants: Vec<Instant>,
    on_read: Option<ReadHook>,
}

impl ScriptedInstrument {
    pub fn new(script: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            script: script.into_iter().collect(),
            connect_error: None,
            state: ConnectionState::Disconnected,
            connect_calls: 0,
            disconnect_calls: 0,
            read_calls: 0,
            read_instants: Vec::new(),
            on_read: None,
        }
    }

    /// Instrument whose `connect` always fails
    pub fn unreachable(reason: impl Into<String>) -> Self {
        let mut instrument = Self::new([]);
        instrument.connect_error = Some(reason.into());
        instrument
    }

    /// Run `hook` with the 1-based read number at the start of every read
    pub fn with_read_hook(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_read = Some(Box::new(hook));
        self
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls
    }

    pub fn read_calls(&self) -> u64 {
        self.read_calls
    }

    /// Instant at which each read started, in call order
    pub fn read_instants(&self) -> &[Instant] {
        &self.read_instants
    }
}

/// Complete reading with `x` set and the other axes zeroed
pub fn reading(x: f64) -> Vec<f64> {
    vec![x, 0.0, 0.0, 0.0, 0.0]
}

#[async_trait]
impl InstrumentAdapter for ScriptedInstrument {
    async fn connect(&mut self) -> Result<()> {
        self.connect_calls += 1;
        if let Some(reason) = &self.connect_error {
            self.state = ConnectionState::Failed;
            return Err(AdapterError::ConnectionFailed {
                instrument: self.describe(),
                reason: reason.clone(),
            });
        }
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn read_position(&mut self) -> Result<StageReading> {
        self.read_calls += 1;
        self.read_instants.push(Instant::now());
        if let Some(hook) = self.on_read.as_mut() {
            hook(self.read_calls);
        }

        if self.state != ConnectionState::Connected {
            return Err(AdapterError::NotConnected(self.describe()));
        }

        match self.script.pop_front() {
            Some(ScriptStep::Reading(values)) => Ok(StageReading(values)),
            Some(ScriptStep::Fail(message)) => Err(AdapterError::ReadFailed(message)),
            Some(ScriptStep::Slow(delay, values)) => {
                tokio::time::sleep(delay).await;
                Ok(StageReading(values))
            }
            Some(ScriptStep::Hang) => std::future::pending().await,
            Some(ScriptStep::Panic(message)) => panic!("{}", message),
            None => Ok(StageReading(reading(self.read_calls as f64))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.disconnect_calls += 1;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn describe(&self) -> String {
        "scripted instrument".to_string()
    }
}
