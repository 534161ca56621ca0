//! The transport seam between the core and whatever actually talks to the device.

use crate::params::{Info, Instrument, Key, Value};

/// Native device handle.
pub type RawHandle = i32;

/// Handle returned by `open` when no device could be opened.
pub const HANDLE_NONE: RawHandle = 0;

/// A failed transport call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct DriverError {
    pub code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: i32, message: impl Into<String>) -> DriverError {
        DriverError { code, message: message.into() }
    }
}

/// Instrument, and for per-channel instruments optionally a single channel, addressed by a
/// control call. `channel: None` addresses every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub instrument: Instrument,
    pub channel: Option<usize>,
}

impl Target {
    pub fn new(instrument: Instrument) -> Target {
        Target { instrument, channel: None }
    }

    pub fn channel(instrument: Instrument, channel: usize) -> Target {
        Target { instrument, channel: Some(channel) }
    }
}

/// Primitive, synchronous device access.
///
/// Device indices are positions in the most recent `enumerate` call. Enumerated values
/// (trigger sources, states, modes) travel as their wire codes; see [`crate::wire`].
pub trait Driver: Send + Sync {
    fn enumerate(&self, filter: i32) -> Result<usize, DriverError>;
    fn device_type(&self, index: usize) -> Result<(i32, i32), DriverError>;
    fn device_is_opened(&self, index: usize) -> Result<bool, DriverError>;
    fn device_user_name(&self, index: usize) -> Result<String, DriverError>;
    fn device_name(&self, index: usize) -> Result<String, DriverError>;
    fn device_serial(&self, index: usize) -> Result<String, DriverError>;
    fn device_config_count(&self, index: usize) -> Result<usize, DriverError>;
    fn device_config_info(&self, index: usize, config: usize, info: i32) -> Result<i32, DriverError>;

    /// Returns [`HANDLE_NONE`] if the device is absent or already open.
    fn open(&self, index: usize, config: Option<usize>) -> Result<RawHandle, DriverError>;
    fn close(&self, handle: RawHandle) -> Result<(), DriverError>;

    fn reset(&self, handle: RawHandle, target: Target) -> Result<(), DriverError>;
    fn configure(&self, handle: RawHandle, target: Target, reconfigure: bool, start: bool)
        -> Result<(), DriverError>;
    /// Returns the wire code of the instrument state.
    fn status(&self, handle: RawHandle, target: Target, read_data: bool) -> Result<i32, DriverError>;
    fn trigger_pc(&self, handle: RawHandle) -> Result<(), DriverError>;

    fn get(&self, handle: RawHandle, key: Key) -> Result<Value, DriverError>;
    fn set(&self, handle: RawHandle, key: Key, value: Value) -> Result<(), DriverError>;
    fn info(&self, handle: RawHandle, key: Key) -> Result<Info, DriverError>;
    /// Name and label (or units) of a named entity.
    fn name(&self, handle: RawHandle, key: Key) -> Result<(String, String), DriverError>;
    fn range_steps(&self, handle: RawHandle, key: Key) -> Result<Vec<f64>, DriverError>;

    fn read_analog(&self, handle: RawHandle, key: Key, data: &mut [f64]) -> Result<(), DriverError>;
    fn read_digital(&self, handle: RawHandle, key: Key, data: &mut [u8]) -> Result<(), DriverError>;
    fn write_analog(&self, handle: RawHandle, key: Key, data: &[f64]) -> Result<(), DriverError>;
    /// Writes `count` bits packed LSB first into `data`.
    fn write_digital(&self, handle: RawHandle, key: Key, data: &[u8], count: usize)
        -> Result<(), DriverError>;
}

pub mod sim;

#[cfg(feature = "hardware")]
pub mod libdwf;
