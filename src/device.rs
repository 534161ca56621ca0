//! Device discovery.

use std::sync::Arc;

use crate::{Error, Result, OpenOptions};
use crate::session::Session;
use crate::sys::Driver;
use crate::wire::{ConfigInfo, DeviceKind, DeviceVersion, EnumFilter, WireEnum};

/// Static channel counts and buffer sizes of one device configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub analog_in_channels: usize,
    pub analog_out_channels: usize,
    pub analog_io_channels: usize,
    pub digital_in_channels: usize,
    pub digital_out_channels: usize,
    pub digital_io_channels: usize,
    pub analog_in_buffer: usize,
    pub analog_out_buffer: usize,
    pub digital_in_buffer: usize,
    pub digital_out_buffer: usize,
}

impl Capabilities {
    pub fn get(&self, info: ConfigInfo) -> usize {
        match info {
            ConfigInfo::AnalogInChannelCount   => self.analog_in_channels,
            ConfigInfo::AnalogOutChannelCount  => self.analog_out_channels,
            ConfigInfo::AnalogIoChannelCount   => self.analog_io_channels,
            ConfigInfo::DigitalInChannelCount  => self.digital_in_channels,
            ConfigInfo::DigitalOutChannelCount => self.digital_out_channels,
            ConfigInfo::DigitalIoChannelCount  => self.digital_io_channels,
            ConfigInfo::AnalogInBufferSize     => self.analog_in_buffer,
            ConfigInfo::AnalogOutBufferSize    => self.analog_out_buffer,
            ConfigInfo::DigitalInBufferSize    => self.digital_in_buffer,
            ConfigInfo::DigitalOutBufferSize   => self.digital_out_buffer,
        }
    }

    fn field(&mut self, info: ConfigInfo) -> &mut usize {
        match info {
            ConfigInfo::AnalogInChannelCount   => &mut self.analog_in_channels,
            ConfigInfo::AnalogOutChannelCount  => &mut self.analog_out_channels,
            ConfigInfo::AnalogIoChannelCount   => &mut self.analog_io_channels,
            ConfigInfo::DigitalInChannelCount  => &mut self.digital_in_channels,
            ConfigInfo::DigitalOutChannelCount => &mut self.digital_out_channels,
            ConfigInfo::DigitalIoChannelCount  => &mut self.digital_io_channels,
            ConfigInfo::AnalogInBufferSize     => &mut self.analog_in_buffer,
            ConfigInfo::AnalogOutBufferSize    => &mut self.analog_out_buffer,
            ConfigInfo::DigitalInBufferSize    => &mut self.digital_in_buffer,
            ConfigInfo::DigitalOutBufferSize   => &mut self.digital_out_buffer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub index: usize,
    pub capabilities: Capabilities,
}

/// One device found by [`enumerate`]. The record is a snapshot: `opened` is not updated
/// when the device is later opened or closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Position in the enumeration that produced this record.
    pub index: usize,
    pub kind: DeviceKind,
    pub version: DeviceVersion,
    pub name: String,
    pub user_name: String,
    pub serial: String,
    /// Whether the device was already open, in this or another process.
    pub opened: bool,
    pub configurations: Vec<Configuration>,
}

impl DeviceRecord {
    /// Capability `info` of configuration `config`, if the device has that configuration.
    pub fn config_info(&self, config: usize, info: ConfigInfo) -> Option<usize> {
        self.configurations.get(config).map(|config| config.capabilities.get(info))
    }

    /// Opens this device. Only valid until the next enumeration on `driver`.
    pub fn open<D: Driver>(&self, driver: Arc<D>, config: Option<usize>) -> Result<Session<D>> {
        Session::open(driver, self.index, config)
    }

    pub fn open_with<D: Driver>(&self, driver: Arc<D>, options: OpenOptions) -> Result<Session<D>> {
        Session::open_with(driver, self.index, options)
    }
}

fn scan<D: Driver>(driver: &D, index: usize) -> Result<DeviceRecord> {
    let (kind_code, version_code) = driver.device_type(index).map_err(Error::Enumeration)?;
    let kind = DeviceKind::from_wire(kind_code)
        .ok_or(Error::UnknownCode { operation: "DeviceType", code: kind_code })?;
    let version = DeviceVersion::from_wire(kind, version_code)
        .ok_or(Error::UnknownCode { operation: "DeviceType", code: version_code })?;

    let mut configurations = Vec::new();
    for config in 0..driver.device_config_count(index).map_err(Error::Enumeration)? {
        let mut capabilities = Capabilities::default();
        for info in ConfigInfo::all() {
            let value = driver.device_config_info(index, config, info.to_wire())
                .map_err(Error::Enumeration)?;
            *capabilities.field(info) = value.max(0) as usize;
        }
        configurations.push(Configuration { index: config, capabilities });
    }

    Ok(DeviceRecord {
        index,
        kind,
        version,
        name: driver.device_name(index).map_err(Error::Enumeration)?,
        user_name: driver.device_user_name(index).map_err(Error::Enumeration)?,
        serial: driver.device_serial(index).map_err(Error::Enumeration)?,
        opened: driver.device_is_opened(index).map_err(Error::Enumeration)?,
        configurations,
    })
}

/// Lists the attached devices of the families selected by `filter`.
///
/// Records are indexed from 0 in the order the transport reports them; the indices stay
/// valid for [`Session::open`] only until the next enumeration.
pub fn enumerate<D: Driver>(driver: &D, filter: EnumFilter) -> Result<Vec<DeviceRecord>> {
    let count = driver.enumerate(filter.to_wire()).map_err(Error::Enumeration)?;
    let records = (0..count).map(|index| scan(driver, index)).collect::<Result<Vec<_>>>()?;
    log::debug!("enumerated {} device(s) with filter {:?}", records.len(), filter);
    Ok(records)
}
