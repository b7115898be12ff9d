//! Type aliases for shared state.
//!
//! The acquisition loop owns its modules, but the exchange-data queue is
//! shared between the output module (producer) and the drain task
//! (consumer). These aliases keep that sharing spelled the same way in
//! every crate.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pulsekit_core::types::*;
//!
//! let queue: ThreadSafe<MemoryCncDataQueue> = thread_safe(MemoryCncDataQueue::new());
//! queue.lock().len();
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex`: no lock poisoning, so callers need not
/// handle a poisoned queue after a panicking consumer.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe callback receiving a single parameter.
pub type DataCallback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Create a new `ThreadSafe<T>` from a value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}
