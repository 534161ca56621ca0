pub mod sys;
pub mod wire;
pub mod params;
pub mod codec;
mod config;
mod device;
mod session;
mod trigger;
mod instrument;

use sys::DriverError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("device enumeration failed")]
    Enumeration(#[source] DriverError),
    #[error("no device could be opened at index {index}")]
    DeviceNotFound { index: usize },
    #[error("device {index} has no configuration {config}")]
    InvalidConfig { index: usize, config: usize },
    #[error("session is closed")]
    SessionClosed,
    #[error("{instrument} channel {channel} out of range (device has {count})")]
    InvalidChannel { instrument: &'static str, channel: usize, count: usize },
    #[error("{instrument} channel {channel} node {node} out of range (channel has {count})")]
    InvalidNode { instrument: &'static str, channel: usize, node: usize, count: usize },
    #[error("{trigger:?} cannot drive {destination}")]
    UnsupportedTrigger { destination: TriggerDestination, trigger: TriggerSource },
    #[error("{operation} failed")]
    Transport { operation: &'static str, #[source] source: DriverError },
    #[error("buffer of {len} bytes ends in a partial {width}-bit sample")]
    ShortBuffer { len: usize, width: u32 },
    #[error("{samples} samples of {width} bits exceed the addressable buffer size")]
    BufferTooLarge { samples: usize, width: u32 },
    #[error("unsupported sample width of {0} bits")]
    InvalidSampleWidth(u32),
    #[error("{operation} returned unknown code {code}")]
    UnknownCode { operation: &'static str, code: i32 },
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use wire::{
    WireEnum,
    CapabilitySet,
    Pins,
    EnumFilter,
    DeviceKind,
    DeviceVersion,
    ConfigInfo,
    TriggerSource,
    InstrumentState,
    AcquisitionMode,
    Filter,
    TriggerType,
    TriggerCondition,
    TriggerLength,
    Function,
    AnalogOutNode,
    AnalogOutMode,
    AnalogOutIdle,
    AnalogIoType,
    ClockSource,
    SampleMode,
    OutputMode,
    PatternType,
    DigitalOutIdle,
};

pub use codec::{
    SampleWidth,
    AcquisitionBuffer,
};

pub use config::{
    OpenOptions,
    ChannelConfiguration,
    AcquisitionConfiguration,
    PatternConfiguration,
};

pub use device::{
    enumerate,
    DeviceRecord,
    Configuration,
    Capabilities,
};

pub use session::Session;

pub use trigger::{
    TriggerDestination,
    TriggerBinding,
    TriggerRouter,
};

pub use instrument::{
    AnalogIn,
    AnalogOut,
    AnalogIo,
    DigitalIn,
    DigitalOut,
    DigitalIo,
    RecordStatus,
    PlayStatus,
    DigitalTrigger,
};

pub use params::StepRange;

pub use sys::{
    Driver,
    sim::{SimDriver, SimDevice},
};

#[cfg(feature = "hardware")]
pub use sys::libdwf::LibDwf;
