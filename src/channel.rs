use crate::error::{PipelineError, Result};
use crate::shutdown::Shutdown;
use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};

/// The single numeric kind carried through the pipeline
pub type Value = i64;

/// Intermediate storage of a stage channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelCapacity {
    /// No storage: the sender waits until the receiver takes the value
    #[default]
    Rendezvous,
    /// Up to `n` values in flight
    Bounded(usize),
    /// No limit on values in flight
    Unbounded,
}

/// Create a point-to-point conduit between two stages
pub fn conduit(capacity: ChannelCapacity) -> (Sender<Value>, Receiver<Value>) {
    match capacity {
        ChannelCapacity::Rendezvous => bounded(0),
        ChannelCapacity::Bounded(n) => bounded(n),
        ChannelCapacity::Unbounded => unbounded(),
    }
}

/// Send `value`, giving up as soon as the shutdown signal fires.
///
/// Returns `PipelineError::ShutDown` if the signal fired first or the
/// receiver is gone; the value is not delivered in either case.
pub fn send_or_shutdown(tx: &Sender<Value>, value: Value, shutdown: &Shutdown) -> Result<()> {
    if shutdown.is_fired() {
        return Err(PipelineError::ShutDown);
    }
    select! {
        send(tx, value) -> res => res.map_err(|_| PipelineError::ShutDown),
        recv(shutdown.signal()) -> _ => Err(PipelineError::ShutDown),
    }
}
