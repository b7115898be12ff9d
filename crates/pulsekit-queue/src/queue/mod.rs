//! Exchange-data queue
//!
//! The output module commits [`ExchangeData`] records to a queue that a
//! persistence layer drains asynchronously. The queue itself is an external
//! collaborator; this module defines its contract and ships two
//! implementations:
//! - [`MemoryCncDataQueue`]: volatile, optionally bounded
//! - [`FileCncDataQueue`]: JSON-lines file that survives restarts

mod file;
mod memory;

pub use file::FileCncDataQueue;
pub use memory::MemoryCncDataQueue;

use pulsekit_core::{thread_safe, ExchangeData, Result, ThreadSafe};

/// FIFO queue of exchange data
///
/// Records are returned in the order they were enqueued. `peek` never
/// removes anything so a consumer can persist a batch before acknowledging
/// it with `pop`.
pub trait CncDataQueue: Send {
    /// Append a record at the back of the queue
    fn enqueue(&mut self, data: ExchangeData) -> Result<()>;

    /// Number of queued records
    fn len(&self) -> Result<usize>;

    /// Whether the queue holds no record
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy up to `n` records from the front of the queue
    fn peek(&self, n: usize) -> Result<Vec<ExchangeData>>;

    /// Remove up to `n` records from the front, returning how many were removed
    fn pop(&mut self, n: usize) -> Result<usize>;

    /// Remove every record
    fn clear(&mut self) -> Result<()>;
}

/// A queue shared between the output module and the drain task
pub type SharedCncDataQueue = ThreadSafe<Box<dyn CncDataQueue>>;

/// Wrap a queue so it can be shared
pub fn shared_queue(queue: impl CncDataQueue + 'static) -> SharedCncDataQueue {
    thread_safe(Box::new(queue))
}
