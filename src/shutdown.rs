//! One-shot broadcast shutdown signal.
//!
//! The signal is a zero-capacity channel on which nothing is ever sent.
//! Firing drops the only sender, which disconnects the channel and wakes
//! every `select!` that has a `recv(shutdown.signal())` arm.

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ShutdownInner {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    fired: AtomicBool,
}

/// Cloneable handle to the shared shutdown signal
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

impl Shutdown {
    /// Create a new, unfired signal
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(ShutdownInner {
                trigger: Mutex::new(Some(trigger)),
                signal,
                fired: AtomicBool::new(false),
            }),
        }
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        let trigger = self.inner.trigger.lock().take();
        match trigger {
            Some(sender) => {
                self.inner.fired.store(true, Ordering::Release);
                drop(sender);
                tracing::info!("shutdown signal fired");
                true
            }
            None => false,
        }
    }

    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once the signal fires.
    /// Meant for use inside `crossbeam::select!`.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Block until the signal fires
    pub fn wait(&self) {
        let _ = self.inner.signal.recv();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("fired", &self.is_fired())
            .finish()
    }
}
