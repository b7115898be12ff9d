//! # PulseKit MTConnect
//!
//! An MTConnect adapter speaking SHDR, the pipe-delimited line protocol
//! agents read from adapters over TCP. It runs inside the acquisition loop
//! as a regular CNC module: no thread, no async runtime.

pub mod adapter;
pub mod buffer;
pub mod datum;
pub mod error;
pub mod module;
pub mod server;

pub use adapter::{Adapter, DEFAULT_HEARTBEAT, DEFAULT_PORT};
pub use buffer::{shdr_timestamp, ShdrBuffer};
pub use datum::{
    AvailabilityValue, ControllerModeValue, DatumKind, DatumValue, DeviceDatum, Execution,
    UNAVAILABLE,
};
pub use error::{ShdrError, ShdrResult};
pub use module::{AxisPosition, MtConnectModule};
pub use server::{ClientId, ShdrServer};
