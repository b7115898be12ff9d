//! # PulseKit Queue
//!
//! The end of the acquisition chain: turns raw per-cycle signals into the
//! exchange-data events that get persisted.
//!
//! - [`CncDataQueueOutput`]: change tracking, cycle detection, machine-mode
//!   flicker collapsing and backpressure
//! - [`VariableChangeTracker`]: last-value cache with a per-variable disk fallback
//! - [`CncDataQueue`]: the queue contract, with memory and JSON-lines backends
//! - [`QueueDrain`]: async mover from the queue to a persistent sink

pub mod detection;
pub mod drain;
pub mod error;
pub mod output;
pub mod queue;
pub mod tracker;

pub use detection::DetectionMethod;
pub use drain::{ExchangeDataSink, JsonLinesSink, QueueDrain};
pub use error::{DetectionError, DetectionResult};
pub use output::{CncDataQueueOutput, OutputOptions};
pub use queue::{
    shared_queue, CncDataQueue, FileCncDataQueue, MemoryCncDataQueue, SharedCncDataQueue,
};
pub use tracker::{sanitize_key, Change, VariableChangeTracker};
