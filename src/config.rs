//! High-level configuration of a session and its instruments in terms of physical qualities.

use crate::wire::{
    AcquisitionMode, DigitalOutIdle, Filter, OutputMode, PatternType, TriggerCondition,
    TriggerSource, TriggerType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Device configuration to open with; `None` keeps the active one.
    pub config: Option<usize>,
    pub auto_configure: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            config: None,
            auto_configure: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfiguration {
    pub enabled: bool,
    /// Peak-to-peak input range in volts. The device picks the nearest range that fits it.
    pub range: f64,
    /// Voltage at the center of the range.
    pub offset: f64,
    pub filter: Filter,
    /// Probe attenuation. For a 1X probe, `1.0`; for a 10X probe, `10.0`.
    pub attenuation: f64,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            range: 5.0,
            offset: 0.0,
            filter: Filter::Decimate,
            attenuation: 1.0,
        }
    }
}

/// Everything needed to set up an analog acquisition in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfiguration {
    /// Sample rate in hertz.
    pub frequency: f64,
    /// Samples per channel; `None` uses the largest buffer the device supports.
    pub buffer_size: Option<usize>,
    pub mode: AcquisitionMode,
    /// Seconds to record in `Record` mode; `0.0` records until stopped.
    pub record_length: f64,
    /// Per-channel settings, starting at channel 0. Channels past the end are left alone.
    pub channels: Vec<ChannelConfiguration>,
    pub trigger_source: TriggerSource,
    /// Seconds between the trigger and the center of the buffer.
    pub trigger_position: f64,
    /// Seconds to wait for a trigger before starting anyway; `0.0` waits forever.
    pub trigger_auto_timeout: f64,
    pub trigger_channel: usize,
    pub trigger_type: TriggerType,
    pub trigger_level: f64,
    pub trigger_condition: TriggerCondition,
}

impl Default for AcquisitionConfiguration {
    fn default() -> Self {
        Self {
            frequency: 1e6,
            buffer_size: None,
            mode: AcquisitionMode::Single,
            record_length: 0.0,
            channels: Vec::new(),
            trigger_source: TriggerSource::None,
            trigger_position: 0.0,
            trigger_auto_timeout: 0.0,
            trigger_channel: 0,
            trigger_type: TriggerType::Edge,
            trigger_level: 0.0,
            trigger_condition: TriggerCondition::RisingPositive,
        }
    }
}

/// Pattern generated on one digital output channel.
///
/// The channel clock is the internal clock divided by `divider`; a pulse pattern stays low
/// for `low` and high for `high` channel clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternConfiguration {
    pub channel: usize,
    pub kind: PatternType,
    pub output: OutputMode,
    pub idle: DigitalOutIdle,
    pub divider: u32,
    pub divider_init: u32,
    pub low: u32,
    pub high: u32,
    /// Level the counter starts at.
    pub initial_high: bool,
    pub initial_count: u32,
}

impl PatternConfiguration {
    /// A square clock on `channel` with the given half periods.
    pub fn clock(channel: usize, divider: u32, low: u32, high: u32) -> Self {
        Self { channel, divider, low, high, ..Default::default() }
    }
}

impl Default for PatternConfiguration {
    fn default() -> Self {
        Self {
            channel: 0,
            kind: PatternType::Pulse,
            output: OutputMode::PushPull,
            idle: DigitalOutIdle::Init,
            divider: 1,
            divider_init: 0,
            low: 1,
            high: 1,
            initial_high: false,
            initial_count: 0,
        }
    }
}
