use crate::channel::{send_or_shutdown, Value};
use crate::error::Result;
use crate::metrics::StageMetrics;
use crate::shutdown::Shutdown;
use crossbeam::channel::{select, Receiver, Sender};

/// Trait for a processing stage in the pipeline
pub trait Stage: Send + 'static {
    /// Process one input value.
    /// `Ok(None)` drops the value; an error drops it and is logged.
    fn process(&mut self, value: Value) -> Result<Option<Value>>;

    /// Called before the stage starts processing
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after the stage has closed its output
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "stage"
    }
}

/// Runs a stage by receiving from its input conduit, processing, and
/// forwarding to its output conduit until shutdown or until the input is
/// closed and drained.
pub struct StageRunner {
    input: Receiver<Value>,
    output: Sender<Value>,
    metrics: StageMetrics,
    shutdown: Shutdown,
}

impl StageRunner {
    /// Create a new stage runner
    pub fn new(input: Receiver<Value>, output: Sender<Value>, shutdown: Shutdown) -> Self {
        Self {
            input,
            output,
            metrics: StageMetrics::new(),
            shutdown,
        }
    }

    /// Share an existing metrics collector instead of a fresh one
    pub fn with_metrics(mut self, metrics: StageMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get a reference to the metrics
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Run the stage with the provided implementation.
    /// Blocks until shutdown fires or the input conduit is closed; the output
    /// conduit is closed before returning.
    pub fn run(self, mut stage: Box<dyn Stage>) -> Result<()> {
        let StageRunner {
            input,
            output,
            metrics,
            shutdown,
        } = self;

        stage.on_start()?;
        tracing::info!(stage = stage.name(), "stage started");

        loop {
            let next = select! {
                recv(input) -> msg => msg.ok(),
                recv(shutdown.signal()) -> _ => None,
            };
            let Some(value) = next else {
                break;
            };

            metrics.record_received();
            tracing::debug!(stage = stage.name(), value, "stage received value");

            match stage.process(value) {
                Ok(Some(result)) => {
                    if send_or_shutdown(&output, result, &shutdown).is_err() {
                        metrics.record_dropped();
                        break;
                    }
                    metrics.record_forwarded();
                }
                Ok(None) => metrics.record_dropped(),
                Err(e) => {
                    tracing::warn!(stage = stage.name(), value, "stage error: {e}");
                    metrics.record_dropped();
                }
            }
        }

        drop(output);
        stage.on_shutdown()?;
        tracing::info!(
            stage = stage.name(),
            "stage stopped: {}",
            metrics.snapshot().format()
        );
        Ok(())
    }
}

/// Forwards every value unchanged
#[derive(Debug)]
pub struct PassthroughStage;

impl Stage for PassthroughStage {
    fn process(&mut self, value: Value) -> Result<Option<Value>> {
        Ok(Some(value))
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// `v > 0`
pub fn is_positive(value: Value) -> bool {
    value > 0
}

/// `v != 0 && v % 3 == 0`
pub fn is_nonzero_multiple_of_three(value: Value) -> bool {
    value != 0 && value % 3 == 0
}

/// A filtering stage that passes through values matching a predicate
#[derive(Debug)]
pub struct FilterStage<F>
where
    F: Fn(Value) -> bool + Send + 'static,
{
    name: String,
    predicate: F,
}

impl<F> FilterStage<F>
where
    F: Fn(Value) -> bool + Send + 'static,
{
    /// Create a new filter stage
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl FilterStage<fn(Value) -> bool> {
    /// Forwards strictly positive values
    pub fn positive() -> Self {
        Self::new("positive_filter", is_positive)
    }

    /// Forwards nonzero multiples of three
    pub fn multiple_of_three() -> Self {
        Self::new("multiple_of_three_filter", is_nonzero_multiple_of_three)
    }
}

impl<F> Stage for FilterStage<F>
where
    F: Fn(Value) -> bool + Send + 'static,
{
    fn process(&mut self, value: Value) -> Result<Option<Value>> {
        Ok((self.predicate)(value).then_some(value))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A mapping stage that transforms each value
#[derive(Debug)]
pub struct MapStage<F>
where
    F: Fn(Value) -> Result<Value> + Send + 'static,
{
    name: String,
    mapper: F,
}

impl<F> MapStage<F>
where
    F: Fn(Value) -> Result<Value> + Send + 'static,
{
    /// Create a new map stage
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<F> Stage for MapStage<F>
where
    F: Fn(Value) -> Result<Value> + Send + 'static,
{
    fn process(&mut self, value: Value) -> Result<Option<Value>> {
        Ok(Some((self.mapper)(value)?))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
