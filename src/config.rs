//! Startup configuration, read once before any stage starts.

use crate::buffer::{ShutdownMode, MAX_CAPACITY};
use crate::channel::ChannelCapacity;
use crate::error::{PipelineError, Result};
use std::io::{BufRead, Write};
use std::time::Duration;

/// Everything the coordinator needs to build a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Circular buffer capacity, always positive
    pub capacity: usize,
    /// Time between two buffer drains, always at least one second
    pub interval: Duration,
    /// Storage of the conduits between source and stages
    pub channel_capacity: ChannelCapacity,
    /// What the buffer does with retained values on shutdown
    pub shutdown_mode: ShutdownMode,
}

impl PipelineConfig {
    /// Build a config from raw signed inputs, rejecting non-positive values
    pub fn from_raw(capacity: i64, interval_secs: i64) -> Result<Self> {
        if capacity <= 0 {
            return Err(PipelineError::InvalidCapacity(capacity));
        }
        if interval_secs <= 0 {
            return Err(PipelineError::InvalidInterval(interval_secs));
        }
        let capacity = usize::try_from(capacity)
            .ok()
            .filter(|&c| c <= MAX_CAPACITY)
            .ok_or_else(|| {
                PipelineError::ConfigError(format!(
                    "capacity {capacity} exceeds the maximum of {MAX_CAPACITY}"
                ))
            })?;
        Ok(Self {
            capacity,
            interval: Duration::from_secs(interval_secs.unsigned_abs()),
            channel_capacity: ChannelCapacity::Rendezvous,
            shutdown_mode: ShutdownMode::Discard,
        })
    }

    pub fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: ChannelCapacity) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check invariants of a config assembled by hand
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PipelineError::InvalidCapacity(0));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(PipelineError::ConfigError(format!(
                "capacity {} exceeds the maximum of {MAX_CAPACITY}",
                self.capacity
            )));
        }
        if self.interval.is_zero() {
            return Err(PipelineError::InvalidInterval(0));
        }
        if self.channel_capacity == ChannelCapacity::Bounded(0) {
            return Err(PipelineError::ConfigError(
                "bounded channel capacity must be positive, use Rendezvous instead".into(),
            ));
        }
        Ok(())
    }

    /// Ask for capacity and interval interactively.
    /// `capacity` and `interval_secs` skip their prompt when already known.
    pub fn prompt<R: BufRead, W: Write>(
        reader: &mut R,
        writer: &mut W,
        capacity: Option<i64>,
        interval_secs: Option<i64>,
    ) -> Result<Self> {
        let capacity = match capacity {
            Some(c) => c,
            None => ask(reader, writer, "Buffer size: ")?,
        };
        let interval_secs = match interval_secs {
            Some(i) => i,
            None => ask(reader, writer, "Buffer drain interval in seconds: ")?,
        };
        Self::from_raw(capacity, interval_secs)
    }
}

fn ask<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, question: &str) -> Result<i64> {
    write!(writer, "{question}")?;
    writer.flush()?;

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(PipelineError::ConfigError(format!(
            "input ended before answering {:?}",
            question.trim_end_matches([':', ' '])
        )));
    }
    let answer = line.trim();
    answer
        .parse::<i64>()
        .map_err(|_| PipelineError::ConfigError(format!("expected an integer, got {answer:?}")))
}
