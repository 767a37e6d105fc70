use crate::buffer::CircularBuffer;
use crate::channel::{conduit, send_or_shutdown, Value};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::output::Sink;
use crate::shutdown::Shutdown;
use crate::stage::{FilterStage, Stage, StageRunner};
use crossbeam::channel::{after, bounded, select, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Builder for constructing pipelines
pub struct PipelineBuilder {
    config: PipelineConfig,
    stages: Vec<Box<dyn Stage>>,
    ticker: Option<Receiver<Instant>>,
}

impl PipelineBuilder {
    /// Create a builder with no stages: the source feeds the buffer directly
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            ticker: None,
        }
    }

    /// Source → positivity filter → multiple-of-three filter → buffer
    pub fn filter_chain(config: PipelineConfig) -> Self {
        Self::new(config)
            .add_stage(FilterStage::positive())
            .add_stage(FilterStage::multiple_of_three())
    }

    /// Append a stage to the chain, upstream of the buffer
    pub fn add_stage<S: Stage>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Drain the buffer once per message on `ticks` instead of on the
    /// configured interval
    pub fn with_ticker(mut self, ticks: Receiver<Instant>) -> Self {
        self.ticker = Some(ticks);
        self
    }

    /// Validate the configuration and build the pipeline. Nothing runs yet.
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        let buffer = CircularBuffer::new(self.config.capacity)?
            .with_shutdown_mode(self.config.shutdown_mode);

        Ok(Pipeline {
            stage_names: self.stages.iter().map(|s| s.name().to_string()).collect(),
            metrics: self.stages.iter().map(|_| StageMetrics::new()).collect(),
            stages: self.stages,
            buffer,
            ticker: self.ticker,
            config: self.config,
            shutdown: Shutdown::new(),
        })
    }
}

/// A configured pipeline that has not been started
pub struct Pipeline {
    stage_names: Vec<String>,
    metrics: Vec<StageMetrics>,
    stages: Vec<Box<dyn Stage>>,
    buffer: CircularBuffer,
    ticker: Option<Receiver<Instant>>,
    config: PipelineConfig,
    shutdown: Shutdown,
}

impl Pipeline {
    /// Handle to the signal every stage observes
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Get metrics for a specific stage
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.metrics.get(index)
    }

    /// Buffer counters: writes, emissions, overwrites
    pub fn buffer_metrics(&self) -> StageMetrics {
        self.buffer.metrics()
    }

    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// Start every stage, the buffer loop and the sink on their own threads
    pub fn start<K: Sink>(self, mut sink: K) -> Result<RunningPipeline> {
        let Pipeline {
            stage_names,
            metrics,
            stages,
            buffer,
            ticker,
            config,
            shutdown,
        } = self;

        let (done_tx, done_rx) = bounded::<()>(0);
        let buffer_metrics = buffer.metrics();
        let output = buffer.output();
        let mut handles = Vec::with_capacity(stages.len() + 2);

        let source = if stages.is_empty() {
            buffer.input_sender()
        } else {
            let (source, mut upstream) = conduit(config.channel_capacity);
            let last = stages.len() - 1;

            for (idx, stage) in stages.into_iter().enumerate() {
                let (tx, next) = if idx == last {
                    (buffer.input_sender(), None)
                } else {
                    let (tx, rx) = conduit(config.channel_capacity);
                    (tx, Some(rx))
                };

                let runner = StageRunner::new(upstream, tx, shutdown.clone())
                    .with_metrics(metrics[idx].clone());
                let name = format!("stage-{idx}-{}", stage_names[idx]);
                let done = done_tx.clone();
                let handle = thread::Builder::new().name(name.clone()).spawn(move || {
                    let _done = done;
                    runner.run(stage)
                })?;
                handles.push((name, handle));

                match next {
                    Some(rx) => upstream = rx,
                    None => break,
                }
            }
            source
        };

        let buffer_handle = {
            let done = done_tx.clone();
            let ticks = ticker.unwrap_or_else(|| crossbeam::channel::tick(config.interval));
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("circular-buffer".into())
                .spawn(move || {
                    let _done = done;
                    buffer.run(&shutdown, ticks)
                })?
        };
        handles.push(("circular-buffer".to_string(), buffer_handle));

        let sink_handle = {
            let done = done_tx;
            let shutdown = shutdown.clone();
            thread::Builder::new().name("sink".into()).spawn(move || {
                let _done = done;
                for value in output.iter() {
                    if let Err(e) = sink.emit(value) {
                        tracing::error!("sink failed, shutting down: {e}");
                        shutdown.fire();
                        return Err(e);
                    }
                }
                sink.finish()
            })?
        };
        handles.push(("sink".to_string(), sink_handle));

        tracing::info!(
            stages = ?stage_names,
            capacity = config.capacity,
            interval_secs = config.interval.as_secs(),
            "pipeline started"
        );

        Ok(RunningPipeline {
            input: Some(PipelineInput {
                tx: source,
                shutdown: shutdown.clone(),
            }),
            stage_names,
            metrics,
            buffer_metrics,
            handles,
            done: done_rx,
            shutdown,
        })
    }
}

/// The single producer end of a running pipeline
#[derive(Debug)]
pub struct PipelineInput {
    tx: Sender<Value>,
    shutdown: Shutdown,
}

impl PipelineInput {
    /// Send a value into the first stage, waiting for it to be accepted.
    /// Fails with `PipelineError::ShutDown` once the pipeline is stopping.
    pub fn send(&self, value: Value) -> Result<()> {
        send_or_shutdown(&self.tx, value, &self.shutdown)
    }

    /// Fire the pipeline-wide shutdown signal
    pub fn shutdown(self) {
        self.shutdown.fire();
    }

    /// Close the source without firing shutdown; downstream stages drain
    /// and stop on their own
    pub fn close(self) {
        drop(self);
    }
}

/// A running pipeline that can be controlled and monitored
pub struct RunningPipeline {
    input: Option<PipelineInput>,
    stage_names: Vec<String>,
    metrics: Vec<StageMetrics>,
    buffer_metrics: StageMetrics,
    handles: Vec<(String, JoinHandle<Result<()>>)>,
    done: Receiver<()>,
    shutdown: Shutdown,
}

impl RunningPipeline {
    /// Take the producer end. Only one exists, so later calls return `None`.
    pub fn take_input(&mut self) -> Option<PipelineInput> {
        self.input.take()
    }

    /// Handle to the signal every stage observes
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Get metrics for a stage
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.metrics.get(index)
    }

    /// Buffer counters: writes, emissions, overwrites
    pub fn buffer_metrics(&self) -> &StageMetrics {
        &self.buffer_metrics
    }

    /// Whether every pipeline thread has stopped
    pub fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Wait for every thread to stop. An input that was never taken is
    /// closed first so the pipeline can drain.
    pub fn wait(mut self) -> Result<()> {
        self.input.take();
        self.join_all()
    }

    /// Wait up to `timeout`, then fire shutdown if the pipeline is still running
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<()> {
        self.input.take();
        let finished = select! {
            recv(self.done) -> _ => true,
            recv(after(timeout)) -> _ => false,
        };
        if !finished {
            tracing::info!(?timeout, "pipeline still running after timeout");
            self.shutdown.fire();
        }
        self.join_all()
    }

    /// Fire shutdown and wait for every thread to stop
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown.fire();
        self.input.take();
        self.join_all()
    }

    /// Get a summary of all metrics
    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (i, (name, metrics)) in self.stage_names.iter().zip(&self.metrics).enumerate() {
            summary.push_str(&format!(
                "  Stage {} ({}): {}\n",
                i,
                name,
                metrics.snapshot().format()
            ));
        }
        summary.push_str(&format!(
            "  Buffer: {}\n",
            self.buffer_metrics.snapshot().format()
        ));
        summary
    }

    fn join_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (name, handle) in self.handles.drain(..) {
            let result = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(PipelineError::ThreadError(format!("{name} panicked"))),
            };
            if let Err(e) = result {
                tracing::error!(thread = %name, "pipeline thread failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        tracing::info!("{}", self.metrics_summary().trim_end());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
