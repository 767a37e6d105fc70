//! A concurrent integer pipeline that ends in a timer-paced circular buffer.
//!
//! Values flow from a single source through a chain of filter stages, each on
//! its own thread, into a fixed-capacity ring. The ring accepts writes at any
//! rate, overwrites its oldest unread value when full, and releases one value
//! per timer tick to a sink. One shared shutdown signal stops every stage.
//!
//! # Features
//!
//! - Conduits built on crossbeam channels (rendezvous, bounded or unbounded)
//! - A generic filter stage; the positivity and multiple-of-three filters are
//!   two instances of it
//! - Overwrite-on-full ring with an explicit fill count
//! - Every blocking receive, send and tick multiplexed with the shutdown signal
//! - Per-stage metrics for received, forwarded and dropped values
//!
//! # Example
//!
//! ```ignore
//! use ring_pipeline::{PipelineBuilder, PipelineConfig, ConsoleSink};
//!
//! let config = PipelineConfig::from_raw(3, 1)?;
//! let mut running = PipelineBuilder::filter_chain(config)
//!     .build()?
//!     .start(ConsoleSink::stdout())?;
//!
//! let input = running.take_input().unwrap();
//! input.send(9)?;
//! input.shutdown();
//! running.wait()?;
//! ```

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod shutdown;
pub mod stage;

// Re-exports for convenience
pub use buffer::{BufferWriter, CircularBuffer, Ring, ShutdownMode, MAX_CAPACITY};
pub use channel::{conduit, ChannelCapacity, Value};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use input::{parse_token, ConsoleReader, ReadOutcome, Token};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use output::{ConsoleSink, Sink};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineInput, RunningPipeline};
pub use shutdown::Shutdown;
pub use stage::{FilterStage, MapStage, PassthroughStage, Stage, StageRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
