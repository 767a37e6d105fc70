use crate::channel::{send_or_shutdown, Value};
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::shutdown::Shutdown;
use crossbeam::channel::{bounded, never, select, tick, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Largest capacity a ring or circular buffer accepts
pub const MAX_CAPACITY: usize = 1 << 20;

/// Fixed-capacity ring storage with overwrite-on-full semantics.
///
/// `start` is the oldest unread slot, `end` the next write slot. The explicit
/// `len` tells a full ring apart from an empty one, since both have
/// `start == end`.
#[derive(Debug, Clone)]
pub struct Ring {
    slots: Box<[Value]>,
    start: usize,
    end: usize,
    len: usize,
}

impl Ring {
    /// Create an empty ring. Fails if `capacity` is zero or above `MAX_CAPACITY`.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidCapacity(0));
        }
        if capacity > MAX_CAPACITY {
            return Err(PipelineError::ConfigError(format!(
                "capacity {capacity} exceeds the maximum of {MAX_CAPACITY}"
            )));
        }
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            PipelineError::ConfigError(format!("cannot allocate {capacity} slots: {e}"))
        })?;
        slots.resize(capacity, 0);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            start: 0,
            end: 0,
            len: 0,
        })
    }

    /// Store `value` at `end`. If the ring was full the oldest unread value
    /// is discarded and returned.
    pub fn push(&mut self, value: Value) -> Option<Value> {
        let capacity = self.slots.len();
        let overwritten = if self.len == capacity {
            let oldest = self.slots[self.start];
            self.start = (self.start + 1) % capacity;
            Some(oldest)
        } else {
            self.len += 1;
            None
        };
        self.slots[self.end] = value;
        self.end = (self.end + 1) % capacity;
        overwritten
    }

    /// Remove and return the oldest unread value
    pub fn pop(&mut self) -> Option<Value> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.start];
        self.start = (self.start + 1) % self.slots.len();
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the oldest unread slot
    pub fn start(&self) -> usize {
        self.start
    }

    /// Index of the next write slot
    pub fn end(&self) -> usize {
        self.end
    }
}

/// What the buffer does with retained values when the shutdown signal fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Close the output immediately; retained values are lost
    #[default]
    Discard,
    /// Move retained values into the output conduit while it has room, then close
    Flush,
}

/// Producer handle for a circular buffer.
///
/// Writes rendezvous with the processing loop: a write returns once the loop
/// has accepted the value, never waiting for ring space.
#[derive(Debug)]
pub struct BufferWriter {
    tx: Sender<Value>,
    shutdown: Shutdown,
}

impl BufferWriter {
    /// Hand `value` to the buffer's processing loop
    pub fn write(&self, value: Value) -> Result<()> {
        send_or_shutdown(&self.tx, value, &self.shutdown)
    }
}

enum Event {
    Write(Value),
    WriterClosed,
    Tick,
    TickerClosed,
    Shutdown,
}

enum Emit {
    Sent,
    Interrupted(Value),
    SinkGone,
}

/// A circular buffer decoupling an irregular writer from a timer-paced reader
pub struct CircularBuffer {
    ring: Ring,
    input_tx: Sender<Value>,
    input_rx: Receiver<Value>,
    output_tx: Sender<Value>,
    output_rx: Receiver<Value>,
    mode: ShutdownMode,
    metrics: StageMetrics,
}

impl CircularBuffer {
    /// Create a buffer holding at most `capacity` values. The output conduit
    /// is bounded to the same capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        let ring = Ring::new(capacity)?;
        let (input_tx, input_rx) = bounded(0);
        let (output_tx, output_rx) = bounded(capacity);
        Ok(Self {
            ring,
            input_tx,
            input_rx,
            output_tx,
            output_rx,
            mode: ShutdownMode::Discard,
            metrics: StageMetrics::new(),
        })
    }

    /// Choose what happens to retained values on shutdown
    pub fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Producer handle that gives up when `shutdown` fires
    pub fn writer(&self, shutdown: &Shutdown) -> BufferWriter {
        BufferWriter {
            tx: self.input_tx.clone(),
            shutdown: shutdown.clone(),
        }
    }

    /// Raw input side, for wiring the last pipeline stage straight in
    pub(crate) fn input_sender(&self) -> Sender<Value> {
        self.input_tx.clone()
    }

    /// Output side. Disconnects once the processing loop stops.
    pub fn output(&self) -> Receiver<Value> {
        self.output_rx.clone()
    }

    /// Counters: writes received, values emitted, values overwritten
    pub fn metrics(&self) -> StageMetrics {
        self.metrics.clone()
    }

    /// Start the processing loop on its own thread, draining every `interval`
    pub fn spawn(self, shutdown: Shutdown, interval: Duration) -> Result<JoinHandle<Result<()>>> {
        self.spawn_with_ticker(shutdown, tick(interval))
    }

    /// Start the processing loop on its own thread, draining once per
    /// message on `ticks`
    pub fn spawn_with_ticker(
        self,
        shutdown: Shutdown,
        ticks: Receiver<Instant>,
    ) -> Result<JoinHandle<Result<()>>> {
        let handle = thread::Builder::new()
            .name("circular-buffer".into())
            .spawn(move || self.run(&shutdown, ticks))?;
        Ok(handle)
    }

    /// Run the processing loop on the current thread until shutdown, or
    /// until the writer side is closed and every retained value is emitted.
    pub fn run(self, shutdown: &Shutdown, ticks: Receiver<Instant>) -> Result<()> {
        let CircularBuffer {
            mut ring,
            input_tx,
            input_rx,
            output_tx,
            output_rx,
            mode,
            metrics,
        } = self;
        // Only external writers and the sink keep these conduits open.
        drop(input_tx);
        drop(output_rx);

        let mut input = input_rx;
        let mut ticks = ticks;
        let mut writer_open = true;

        tracing::info!(capacity = ring.capacity(), "circular buffer started");

        loop {
            // A fired signal wins over any write or tick that is also ready.
            let event = if shutdown.is_fired() {
                Event::Shutdown
            } else {
                select! {
                    recv(input) -> msg => match msg {
                        Ok(value) => Event::Write(value),
                        Err(_) => Event::WriterClosed,
                    },
                    recv(ticks) -> msg => match msg {
                        Ok(_) => Event::Tick,
                        Err(_) => Event::TickerClosed,
                    },
                    recv(shutdown.signal()) -> _ => Event::Shutdown,
                }
            };

            match event {
                Event::Write(value) => {
                    metrics.record_received();
                    tracing::debug!(value, "buffer received input");
                    if let Some(oldest) = ring.push(value) {
                        metrics.record_dropped();
                        tracing::debug!(value = oldest, "buffer full, overwrote oldest value");
                    }
                }
                Event::WriterClosed => {
                    tracing::debug!(retained = ring.len(), "buffer writer closed");
                    input = never();
                    writer_open = false;
                    if ring.is_empty() {
                        break;
                    }
                }
                Event::Tick => {
                    if let Some(value) = ring.pop() {
                        tracing::debug!(value, "buffer emitting output");
                        match emit(&output_tx, value, shutdown) {
                            Emit::Sent => metrics.record_forwarded(),
                            Emit::Interrupted(value) => {
                                if mode == ShutdownMode::Flush {
                                    flush(Some(value), &mut ring, &output_tx, &metrics);
                                }
                                break;
                            }
                            Emit::SinkGone => {
                                tracing::warn!("buffer output has no reader, stopping");
                                break;
                            }
                        }
                    }
                    if !writer_open && ring.is_empty() {
                        break;
                    }
                }
                Event::TickerClosed => {
                    tracing::warn!("buffer ticker closed, draining suspended");
                    ticks = never();
                }
                Event::Shutdown => {
                    if mode == ShutdownMode::Flush {
                        flush(None, &mut ring, &output_tx, &metrics);
                    }
                    break;
                }
            }
        }

        drop(output_tx);
        tracing::info!(
            discarded = ring.len(),
            "buffer processing stopped: {}",
            metrics.snapshot().format()
        );
        Ok(())
    }
}

fn emit(output: &Sender<Value>, value: Value, shutdown: &Shutdown) -> Emit {
    select! {
        send(output, value) -> res => match res {
            Ok(()) => Emit::Sent,
            Err(_) => Emit::SinkGone,
        },
        recv(shutdown.signal()) -> _ => Emit::Interrupted(value),
    }
}

fn flush(pending: Option<Value>, ring: &mut Ring, output: &Sender<Value>, metrics: &StageMetrics) {
    let mut next = pending.or_else(|| ring.pop());
    while let Some(value) = next {
        if output.try_send(value).is_err() {
            break;
        }
        metrics.record_forwarded();
        next = ring.pop();
    }
}
