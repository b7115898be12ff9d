//! # PulseKit Core
//!
//! Core types, traits, and errors for PulseKit.
//! Provides the value model read from controllers, the exchange data
//! queued for persistence, and the module surface driven by the host
//! scheduler.

pub mod error;
pub mod exchange;
pub mod module;
pub mod types;
pub mod value;

pub use error::{Error, ModuleError, QueueError, Result};

pub use exchange::{CncAlarm, ExchangeData, ExchangeDataCommand};

pub use module::{
    expect_bool, expect_f64, expect_finite, expect_i64, expect_text, unknown_key, CncModule,
};

pub use types::{thread_safe, DataCallback, ThreadSafe};

pub use value::{CncValue, DOUBLE_TOLERANCE};
