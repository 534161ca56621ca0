//! Backend over the vendor runtime library.
//!
//! Enumeration, lifecycle and bulk data calls are declared statically. Parameter accessors
//! follow a regular naming scheme (`FDwf<Param>Get`, `...Set`, `...Info`) with a handful of
//! exceptions, and are resolved by name from the loaded library so that one typed call path
//! per value shape covers all of them.

use std::collections::HashMap;
use std::ffi::CString;

use libc::{c_char, c_int, c_uchar, c_uint, c_void};
use parking_lot::Mutex;

use crate::params::{Info, Instrument, Key, Param, Scope, StepRange, Value};
use super::{Driver, DriverError, RawHandle, Target, HANDLE_NONE};

type Hdwf = c_int;
type Bool = c_int;

const ERC_ALREADY_OPENED: i32 = 3;
const ERC_NOT_SUPPORTED: i32 = 4;
const ERC_INVALID_PARAMETER: i32 = 0x10;

/// All channels of a per-channel instrument.
const ALL_CHANNELS: c_int = -1;

#[link(name = "dwf")]
extern "C" {
    fn FDwfGetLastError(erc: *mut c_int) -> Bool;
    fn FDwfGetLastErrorMsg(message: *mut c_char) -> Bool;

    fn FDwfEnum(filter: c_int, count: *mut c_int) -> Bool;
    fn FDwfEnumDeviceType(device: c_int, id: *mut c_int, version: *mut c_int) -> Bool;
    fn FDwfEnumDeviceIsOpened(device: c_int, opened: *mut Bool) -> Bool;
    fn FDwfEnumUserName(device: c_int, name: *mut c_char) -> Bool;
    fn FDwfEnumDeviceName(device: c_int, name: *mut c_char) -> Bool;
    fn FDwfEnumSN(device: c_int, serial: *mut c_char) -> Bool;
    fn FDwfEnumConfig(device: c_int, count: *mut c_int) -> Bool;
    fn FDwfEnumConfigInfo(config: c_int, info: c_int, value: *mut c_int) -> Bool;

    fn FDwfDeviceOpen(device: c_int, hdwf: *mut Hdwf) -> Bool;
    fn FDwfDeviceConfigOpen(device: c_int, config: c_int, hdwf: *mut Hdwf) -> Bool;
    fn FDwfDeviceClose(hdwf: Hdwf) -> Bool;
    fn FDwfDeviceAutoConfigureSet(hdwf: Hdwf, enable: Bool) -> Bool;
    fn FDwfDeviceReset(hdwf: Hdwf) -> Bool;
    fn FDwfDeviceTriggerPC(hdwf: Hdwf) -> Bool;

    fn FDwfAnalogInReset(hdwf: Hdwf) -> Bool;
    fn FDwfAnalogInConfigure(hdwf: Hdwf, reconfigure: Bool, start: Bool) -> Bool;
    fn FDwfAnalogInStatus(hdwf: Hdwf, read_data: Bool, state: *mut c_uchar) -> Bool;
    fn FDwfAnalogInStatusData(hdwf: Hdwf, channel: c_int, data: *mut f64, count: c_int) -> Bool;
    fn FDwfAnalogInStatusNoise(hdwf: Hdwf, channel: c_int, min: *mut f64, max: *mut f64,
                               count: c_int) -> Bool;
    fn FDwfAnalogInChannelRangeSteps(hdwf: Hdwf, steps: *mut f64, count: *mut c_int) -> Bool;

    fn FDwfAnalogOutReset(hdwf: Hdwf, channel: c_int) -> Bool;
    fn FDwfAnalogOutConfigure(hdwf: Hdwf, channel: c_int, start: Bool) -> Bool;
    fn FDwfAnalogOutStatus(hdwf: Hdwf, channel: c_int, state: *mut c_uchar) -> Bool;
    fn FDwfAnalogOutNodeDataSet(hdwf: Hdwf, channel: c_int, node: c_int, data: *const f64,
                                count: c_int) -> Bool;
    fn FDwfAnalogOutNodePlayData(hdwf: Hdwf, channel: c_int, node: c_int, data: *const f64,
                                 count: c_int) -> Bool;

    fn FDwfAnalogIOReset(hdwf: Hdwf) -> Bool;
    fn FDwfAnalogIOConfigure(hdwf: Hdwf) -> Bool;
    fn FDwfAnalogIOStatus(hdwf: Hdwf) -> Bool;
    fn FDwfAnalogIOChannelName(hdwf: Hdwf, channel: c_int, name: *mut c_char,
                               label: *mut c_char) -> Bool;
    fn FDwfAnalogIOChannelNodeName(hdwf: Hdwf, channel: c_int, node: c_int, name: *mut c_char,
                                   units: *mut c_char) -> Bool;

    fn FDwfDigitalIOReset(hdwf: Hdwf) -> Bool;
    fn FDwfDigitalIOConfigure(hdwf: Hdwf) -> Bool;
    fn FDwfDigitalIOStatus(hdwf: Hdwf) -> Bool;

    fn FDwfDigitalInReset(hdwf: Hdwf) -> Bool;
    fn FDwfDigitalInConfigure(hdwf: Hdwf, reconfigure: Bool, start: Bool) -> Bool;
    fn FDwfDigitalInStatus(hdwf: Hdwf, read_data: Bool, state: *mut c_uchar) -> Bool;
    fn FDwfDigitalInStatusData(hdwf: Hdwf, data: *mut c_void, bytes: c_int) -> Bool;

    fn FDwfDigitalOutReset(hdwf: Hdwf) -> Bool;
    fn FDwfDigitalOutConfigure(hdwf: Hdwf, start: Bool) -> Bool;
    fn FDwfDigitalOutStatus(hdwf: Hdwf, state: *mut c_uchar) -> Bool;
    fn FDwfDigitalOutDataSet(hdwf: Hdwf, channel: c_int, data: *const c_void, bits: c_uint) -> Bool;
}

/// Calls the accessor at `address` with the given trailing arguments.
macro_rules! invoke {
    ($address:expr, $handle:expr $(, $arg:expr => $ty:ty)*) => {{
        let function = std::mem::transmute::<usize, unsafe extern "C" fn(Hdwf $(, $ty)*) -> Bool>(
            $address);
        function($handle $(, $arg)*)
    }};
}

/// Like `invoke!`, with the channel and node indices of `$index` in front of the arguments.
macro_rules! invoke_indexed {
    ($index:expr, $address:expr, $handle:expr $(, $arg:expr => $ty:ty)*) => {
        match $index {
            Index::None => invoke!($address, $handle $(, $arg => $ty)*),
            Index::One(first) => invoke!($address, $handle, first => c_int $(, $arg => $ty)*),
            Index::Two(first, second) =>
                invoke!($address, $handle, first => c_int, second => c_int $(, $arg => $ty)*),
        }
    };
}

fn c_string(buffer: &[c_char]) -> String {
    let bytes = buffer.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect::<Vec<_>>();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn last_error() -> DriverError {
    let mut code = 0;
    let mut message = [0 as c_char; 512];
    unsafe {
        FDwfGetLastError(&mut code);
        FDwfGetLastErrorMsg(message.as_mut_ptr());
    }
    DriverError::new(code, c_string(&message).trim_end())
}

fn check(ok: Bool) -> Result<(), DriverError> {
    if ok != 0 { Ok(()) } else { Err(last_error()) }
}

fn unsupported(message: impl Into<String>) -> DriverError {
    DriverError::new(ERC_NOT_SUPPORTED, message)
}

fn invalid(message: impl Into<String>) -> DriverError {
    DriverError::new(ERC_INVALID_PARAMETER, message)
}

fn int(value: usize) -> Result<c_int, DriverError> {
    c_int::try_from(value).map_err(|_| invalid(format!("index {} out of range", value)))
}

/// Leading index arguments of an accessor.
#[derive(Debug, Clone, Copy)]
enum Index {
    None,
    One(c_int),
    Two(c_int, c_int),
}

impl Index {
    fn of(key: Key) -> Result<Index, DriverError> {
        let required = |index: Option<usize>| {
            index.ok_or_else(|| invalid(format!("{:?} needs an index", key.param))).and_then(int)
        };
        Ok(match key.param.scope() {
            Scope::Instrument => Index::None,
            Scope::Channel | Scope::Pin => Index::One(required(key.channel)?),
            Scope::Node => Index::Two(required(key.channel)?, required(key.node)?),
        })
    }

    /// Capability queries of the analog input and of the trigger pins are device-wide.
    fn of_info(key: Key) -> Result<Index, DriverError> {
        match key.param.scope() {
            Scope::Pin => Ok(Index::None),
            _ if key.param.instrument() == Instrument::AnalogIn => Ok(Index::None),
            _ => Index::of(key),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Bool,
    Int,
    Uint,
    Float,
    Pair,
    Flagged,
    Counts,
    Masks,
}

fn value_shape(param: Param) -> Shape {
    use Param::*;
    match param {
        DeviceEnable | AnalogInAutoTriggered | AnalogInChannelEnable | AnalogOutRepeatTrigger |
        AnalogOutCustomAmFm | AnalogOutNodeEnable | AnalogIoEnable | AnalogIoEnableStatus |
        DigitalInAutoTriggered | DigitalOutRepeatTrigger | DigitalOutEnable => Shape::Bool,

        AnalogInSample | AnalogInRecordLength | AnalogInFrequency | AnalogInChannelRange |
        AnalogInChannelOffset | AnalogInChannelAttenuation | AnalogInTriggerPosition |
        AnalogInTriggerPositionStatus | AnalogInTriggerAutoTimeout | AnalogInTriggerHoldOff |
        AnalogInTriggerLevel | AnalogInTriggerHysteresis | AnalogInTriggerLength |
        AnalogOutRun | AnalogOutRunStatus | AnalogOutWait | AnalogOutLimitation |
        AnalogOutNodeFrequency | AnalogOutNodeAmplitude | AnalogOutNodeOffset |
        AnalogOutNodeSymmetry | AnalogOutNodePhase | AnalogIoNode | AnalogIoNodeStatus |
        DigitalInInternalClock | DigitalInTriggerAutoTimeout | DigitalOutInternalClock |
        DigitalOutRun | DigitalOutRunStatus | DigitalOutWait => Shape::Float,

        DigitalIoOutputEnable | DigitalIoOutput | DigitalIoInput | DigitalInDivider |
        DigitalInTriggerPosition | DigitalOutRepeat | DigitalOutRepeatStatus | DigitalOutDivider |
        DigitalOutDividerInit => Shape::Uint,

        DigitalOutCounter => Shape::Pair,
        DigitalOutCounterInit => Shape::Flagged,
        AnalogInRecordStatus | DigitalInRecordStatus | AnalogOutNodePlayStatus => Shape::Counts,
        DigitalInTrigger => Shape::Masks,
        _ => Shape::Int,
    }
}

#[derive(Debug, Clone, Copy)]
enum InfoShape {
    Mask,
    RangeFloat,
    RangeInt,
    RangeUint,
    Steps,
    /// Float bounds with an integer step count.
    StepCount,
    LimitInt,
    LimitUint,
    LimitFloat,
    Support,
    Masks,
}

fn info_shape(param: Param) -> Option<InfoShape> {
    use Param::*;
    Some(match param {
        DeviceTrigger | AnalogInAcquisitionMode | AnalogInChannelFilter | AnalogInTriggerSource |
        AnalogInTriggerType | AnalogInTriggerFilter | AnalogInTriggerCondition |
        AnalogInTriggerLengthCondition | AnalogOutTriggerSource | AnalogOutIdle | AnalogOutNodes |
        AnalogOutNodeFunction | DigitalInClockSource | DigitalInSampleMode |
        DigitalInAcquisitionMode | DigitalInTriggerSource | DigitalOutTriggerSource |
        DigitalOutOutput | DigitalOutType | DigitalOutIdle => InfoShape::Mask,

        AnalogInFrequency | AnalogOutRun | AnalogOutWait | AnalogOutLimitation |
        AnalogOutNodeFrequency | AnalogOutNodeAmplitude | AnalogOutNodeOffset |
        AnalogOutNodeSymmetry | AnalogOutNodePhase | DigitalOutRun | DigitalOutWait =>
            InfoShape::RangeFloat,
        AnalogInBufferSize | AnalogInTriggerChannel | AnalogOutRepeat | AnalogOutNodeData =>
            InfoShape::RangeInt,
        DigitalOutRepeat | DigitalOutDivider | DigitalOutCounter => InfoShape::RangeUint,

        AnalogInChannelRange | AnalogInChannelOffset | AnalogInTriggerPosition |
        AnalogInTriggerAutoTimeout | AnalogInTriggerHoldOff | AnalogInTriggerLevel |
        AnalogInTriggerHysteresis | AnalogInTriggerLength | DigitalInTriggerAutoTimeout =>
            InfoShape::Steps,
        AnalogIoNode | AnalogIoNodeStatus => InfoShape::StepCount,

        AnalogInBits | AnalogInNoiseSize | DigitalInBits | DigitalInBufferSize => InfoShape::LimitInt,
        DigitalInDivider | DigitalInTriggerPosition | DigitalIoOutputEnable | DigitalIoOutput |
        DigitalIoInput | DigitalOutData => InfoShape::LimitUint,
        DigitalInInternalClock | DigitalOutInternalClock => InfoShape::LimitFloat,

        AnalogIoEnable => InfoShape::Support,
        DigitalInTrigger => InfoShape::Masks,
        _ => return None,
    })
}

/// Vendor spelling of a parameter, without the `FDwf` prefix and the operation suffix.
fn base_name(param: Param) -> String {
    match param {
        Param::AnalogIoNode => "AnalogIOChannelNode".to_owned(),
        Param::AnalogOutCustomAmFm => "AnalogOutCustomAMFMEnable".to_owned(),
        _ => {
            let name = param.name();
            match name.strip_prefix("AnalogIo").or_else(|| name.strip_prefix("DigitalIo")) {
                Some(rest) => format!("{}IO{}", &name[..name.len() - rest.len() - 2], rest),
                None => name.to_owned(),
            }
        }
    }
}

fn get_symbol(param: Param) -> String {
    use Param::*;
    let name = match param {
        AnalogInChannelCount => "AnalogInChannelCount",
        AnalogInSamplesLeft => "AnalogInStatusSamplesLeft",
        AnalogInSamplesValid => "AnalogInStatusSamplesValid",
        AnalogInIndexWrite => "AnalogInStatusIndexWrite",
        AnalogInAutoTriggered => "AnalogInStatusAutoTriggered",
        AnalogInRecordStatus => "AnalogInStatusRecord",
        AnalogInSample => "AnalogInStatusSample",
        AnalogInBits => "AnalogInBitsInfo",
        AnalogInTriggerPositionStatus => "AnalogInTriggerPositionStatus",
        AnalogOutChannelCount => "AnalogOutCount",
        AnalogOutRunStatus => "AnalogOutRunStatus",
        AnalogOutRepeatStatus => "AnalogOutRepeatStatus",
        AnalogOutNodePlayStatus => "AnalogOutNodePlayStatus",
        AnalogIoEnableStatus => "AnalogIOEnableStatus",
        AnalogIoChannelCount => "AnalogIOChannelCount",
        AnalogIoChannelNodes => "AnalogIOChannelInfo",
        AnalogIoNodeType => "AnalogIOChannelNodeInfo",
        AnalogIoNodeStatus => "AnalogIOChannelNodeStatus",
        DigitalIoInput => "DigitalIOInputStatus",
        DigitalInSamplesLeft => "DigitalInStatusSamplesLeft",
        DigitalInSamplesValid => "DigitalInStatusSamplesValid",
        DigitalInIndexWrite => "DigitalInStatusIndexWrite",
        DigitalInAutoTriggered => "DigitalInStatusAutoTriggered",
        DigitalInRecordStatus => "DigitalInStatusRecord",
        DigitalInInternalClock => "DigitalInInternalClockInfo",
        DigitalInBits => "DigitalInBitsInfo",
        DigitalOutInternalClock => "DigitalOutInternalClockInfo",
        DigitalOutChannelCount => "DigitalOutCount",
        DigitalOutRunStatus => "DigitalOutRunStatus",
        DigitalOutRepeatStatus => "DigitalOutRepeatStatus",
        _ => return format!("FDwf{}Get", base_name(param)),
    };
    format!("FDwf{}", name)
}

fn set_symbol(param: Param) -> String {
    format!("FDwf{}Set", base_name(param))
}

fn info_symbol(param: Param) -> String {
    match param {
        Param::AnalogOutNodes => "FDwfAnalogOutNodeInfo".to_owned(),
        Param::AnalogIoNode => "FDwfAnalogIOChannelNodeSetInfo".to_owned(),
        Param::AnalogIoNodeStatus => "FDwfAnalogIOChannelNodeStatusInfo".to_owned(),
        _ => format!("FDwf{}Info", base_name(param)),
    }
}

/// The vendor runtime.
///
/// Byte-sized vendor enums are read through zeroed `c_int`s, which relies on a little-endian
/// target.
pub struct LibDwf {
    symbols: Mutex<HashMap<String, usize>>,
}

impl LibDwf {
    pub fn new() -> LibDwf {
        LibDwf { symbols: Mutex::new(HashMap::new()) }
    }

    fn symbol(&self, name: String) -> Result<usize, DriverError> {
        let mut symbols = self.symbols.lock();
        if let Some(&address) = symbols.get(&name) {
            return Ok(address)
        }
        let c_name = CString::new(name.as_str()).map_err(|_| invalid("malformed symbol name"))?;
        let address = unsafe { libc::dlsym(libc::RTLD_DEFAULT, c_name.as_ptr()) } as usize;
        if address == 0 {
            return Err(unsupported(format!("the runtime has no {}", name)))
        }
        log::trace!("libdwf: resolved {}", name);
        symbols.insert(name, address);
        Ok(address)
    }

    fn channel(target: Target) -> Result<c_int, DriverError> {
        target.channel.map_or(Ok(ALL_CHANNELS), int)
    }
}

impl Default for LibDwf {
    fn default() -> LibDwf {
        LibDwf::new()
    }
}

impl Driver for LibDwf {
    fn enumerate(&self, filter: i32) -> Result<usize, DriverError> {
        let mut count = 0;
        check(unsafe { FDwfEnum(filter, &mut count) })?;
        Ok(count.max(0) as usize)
    }

    fn device_type(&self, index: usize) -> Result<(i32, i32), DriverError> {
        let (mut id, mut version) = (0, 0);
        check(unsafe { FDwfEnumDeviceType(int(index)?, &mut id, &mut version) })?;
        Ok((id, version))
    }

    fn device_is_opened(&self, index: usize) -> Result<bool, DriverError> {
        let mut opened = 0;
        check(unsafe { FDwfEnumDeviceIsOpened(int(index)?, &mut opened) })?;
        Ok(opened != 0)
    }

    fn device_user_name(&self, index: usize) -> Result<String, DriverError> {
        let mut name = [0 as c_char; 32];
        check(unsafe { FDwfEnumUserName(int(index)?, name.as_mut_ptr()) })?;
        Ok(c_string(&name))
    }

    fn device_name(&self, index: usize) -> Result<String, DriverError> {
        let mut name = [0 as c_char; 32];
        check(unsafe { FDwfEnumDeviceName(int(index)?, name.as_mut_ptr()) })?;
        Ok(c_string(&name))
    }

    fn device_serial(&self, index: usize) -> Result<String, DriverError> {
        let mut serial = [0 as c_char; 32];
        check(unsafe { FDwfEnumSN(int(index)?, serial.as_mut_ptr()) })?;
        Ok(c_string(&serial))
    }

    fn device_config_count(&self, index: usize) -> Result<usize, DriverError> {
        let mut count = 0;
        check(unsafe { FDwfEnumConfig(int(index)?, &mut count) })?;
        Ok(count.max(0) as usize)
    }

    fn device_config_info(&self, index: usize, config: usize, info: i32) -> Result<i32, DriverError> {
        // configuration queries apply to the device last passed to FDwfEnumConfig
        let (mut count, mut value) = (0, 0);
        unsafe {
            check(FDwfEnumConfig(int(index)?, &mut count))?;
            check(FDwfEnumConfigInfo(int(config)?, info, &mut value))?;
        }
        Ok(value)
    }

    fn open(&self, index: usize, config: Option<usize>) -> Result<RawHandle, DriverError> {
        let mut handle = HANDLE_NONE;
        let ok = unsafe {
            match config {
                Some(config) => FDwfDeviceConfigOpen(int(index)?, int(config)?, &mut handle),
                None => FDwfDeviceOpen(int(index)?, &mut handle),
            }
        };
        if ok == 0 {
            let error = last_error();
            if error.code == ERC_ALREADY_OPENED {
                return Ok(HANDLE_NONE)
            }
            return Err(error)
        }
        if handle == HANDLE_NONE {
            return Ok(HANDLE_NONE)
        }
        // the session decides when to configure
        if let Err(error) = check(unsafe { FDwfDeviceAutoConfigureSet(handle, 0) }) {
            unsafe { FDwfDeviceClose(handle) };
            return Err(error)
        }
        log::debug!("libdwf: opened device {} as handle {}", index, handle);
        Ok(handle)
    }

    fn close(&self, handle: RawHandle) -> Result<(), DriverError> {
        check(unsafe { FDwfDeviceClose(handle) })
    }

    fn reset(&self, handle: RawHandle, target: Target) -> Result<(), DriverError> {
        check(unsafe {
            match target.instrument {
                Instrument::Device     => FDwfDeviceReset(handle),
                Instrument::AnalogIn   => FDwfAnalogInReset(handle),
                Instrument::AnalogOut  => FDwfAnalogOutReset(handle, LibDwf::channel(target)?),
                Instrument::AnalogIo   => FDwfAnalogIOReset(handle),
                Instrument::DigitalIn  => FDwfDigitalInReset(handle),
                Instrument::DigitalOut => FDwfDigitalOutReset(handle),
                Instrument::DigitalIo  => FDwfDigitalIOReset(handle),
            }
        })
    }

    fn configure(&self, handle: RawHandle, target: Target, reconfigure: bool, start: bool)
            -> Result<(), DriverError> {
        let (reconfigure, start) = (reconfigure as Bool, start as Bool);
        check(unsafe {
            match target.instrument {
                Instrument::Device => return Err(unsupported("the device has no configure step")),
                Instrument::AnalogIn   => FDwfAnalogInConfigure(handle, reconfigure, start),
                Instrument::AnalogOut  =>
                    FDwfAnalogOutConfigure(handle, LibDwf::channel(target)?, start),
                Instrument::AnalogIo   => FDwfAnalogIOConfigure(handle),
                Instrument::DigitalIn  => FDwfDigitalInConfigure(handle, reconfigure, start),
                Instrument::DigitalOut => FDwfDigitalOutConfigure(handle, start),
                Instrument::DigitalIo  => FDwfDigitalIOConfigure(handle),
            }
        })
    }

    fn status(&self, handle: RawHandle, target: Target, read_data: bool) -> Result<i32, DriverError> {
        let mut state: c_uchar = 0;
        check(unsafe {
            match target.instrument {
                Instrument::Device => return Err(unsupported("the device has no status")),
                Instrument::AnalogIn   => FDwfAnalogInStatus(handle, read_data as Bool, &mut state),
                Instrument::AnalogOut  =>
                    FDwfAnalogOutStatus(handle, LibDwf::channel(target)?, &mut state),
                Instrument::AnalogIo   => FDwfAnalogIOStatus(handle),
                Instrument::DigitalIn  => FDwfDigitalInStatus(handle, read_data as Bool, &mut state),
                Instrument::DigitalOut => FDwfDigitalOutStatus(handle, &mut state),
                Instrument::DigitalIo  => FDwfDigitalIOStatus(handle),
            }
        })?;
        Ok(state as i32)
    }

    fn trigger_pc(&self, handle: RawHandle) -> Result<(), DriverError> {
        check(unsafe { FDwfDeviceTriggerPC(handle) })
    }

    fn get(&self, handle: RawHandle, key: Key) -> Result<Value, DriverError> {
        let address = self.symbol(get_symbol(key.param))?;
        let index = Index::of(key)?;
        unsafe {
            Ok(match value_shape(key.param) {
                Shape::Bool => {
                    let mut value: Bool = 0;
                    check(invoke_indexed!(index, address, handle, &mut value => *mut Bool))?;
                    Value::Bool(value != 0)
                }
                Shape::Int => {
                    let mut value: c_int = 0;
                    check(invoke_indexed!(index, address, handle, &mut value => *mut c_int))?;
                    Value::Int(value)
                }
                Shape::Uint => {
                    let mut value: c_uint = 0;
                    check(invoke_indexed!(index, address, handle, &mut value => *mut c_uint))?;
                    Value::Uint(value)
                }
                Shape::Float => {
                    let mut value: f64 = 0.0;
                    check(invoke_indexed!(index, address, handle, &mut value => *mut f64))?;
                    Value::Float(value)
                }
                Shape::Pair => {
                    let (mut low, mut high): (c_uint, c_uint) = (0, 0);
                    check(invoke_indexed!(index, address, handle,
                                          &mut low => *mut c_uint, &mut high => *mut c_uint))?;
                    Value::Pair(low, high)
                }
                Shape::Flagged => {
                    let (mut flag, mut count): (Bool, c_uint) = (0, 0);
                    check(invoke_indexed!(index, address, handle,
                                          &mut flag => *mut Bool, &mut count => *mut c_uint))?;
                    Value::Flagged(flag != 0, count)
                }
                Shape::Counts => {
                    let (mut first, mut lost, mut corrupt): (c_int, c_int, c_int) = (0, 0, 0);
                    check(invoke_indexed!(index, address, handle, &mut first => *mut c_int,
                                          &mut lost => *mut c_int, &mut corrupt => *mut c_int))?;
                    Value::Counts(first, lost, corrupt)
                }
                Shape::Masks => {
                    let mut masks: [c_uint; 4] = [0; 4];
                    let [low, high, rise, fall] = &mut masks;
                    check(invoke_indexed!(index, address, handle,
                                          low as *mut c_uint => *mut c_uint,
                                          high as *mut c_uint => *mut c_uint,
                                          rise as *mut c_uint => *mut c_uint,
                                          fall as *mut c_uint => *mut c_uint))?;
                    Value::Masks(masks)
                }
            })
        }
    }

    fn set(&self, handle: RawHandle, key: Key, value: Value) -> Result<(), DriverError> {
        let address = self.symbol(set_symbol(key.param))?;
        let index = Index::of(key)?;
        let mismatch = || invalid(format!("{:?} cannot be written to {:?}", value, key.param));
        check(unsafe {
            match value_shape(key.param) {
                Shape::Bool => {
                    let value = value.as_bool().ok_or_else(mismatch)? as Bool;
                    invoke_indexed!(index, address, handle, value => Bool)
                }
                Shape::Int => {
                    let value = value.as_int().ok_or_else(mismatch)?;
                    invoke_indexed!(index, address, handle, value => c_int)
                }
                Shape::Uint => {
                    let value = value.as_uint().ok_or_else(mismatch)?;
                    invoke_indexed!(index, address, handle, value => c_uint)
                }
                Shape::Float => {
                    let value = value.as_float().ok_or_else(mismatch)?;
                    invoke_indexed!(index, address, handle, value => f64)
                }
                Shape::Pair => {
                    let Value::Pair(low, high) = value else { return Err(mismatch()) };
                    invoke_indexed!(index, address, handle, low => c_uint, high => c_uint)
                }
                Shape::Flagged => {
                    let Value::Flagged(flag, count) = value else { return Err(mismatch()) };
                    invoke_indexed!(index, address, handle, flag as Bool => Bool, count => c_uint)
                }
                Shape::Masks => {
                    let Value::Masks([low, high, rise, fall]) = value else { return Err(mismatch()) };
                    invoke_indexed!(index, address, handle,
                                    low => c_uint, high => c_uint, rise => c_uint, fall => c_uint)
                }
                Shape::Counts => return Err(unsupported(format!("{:?} is read-only", key.param))),
            }
        })
    }

    fn info(&self, handle: RawHandle, key: Key) -> Result<Info, DriverError> {
        let shape = info_shape(key.param)
            .ok_or_else(|| unsupported(format!("{:?} has no capability query", key.param)))?;
        let address = self.symbol(info_symbol(key.param))?;
        let index = Index::of_info(key)?;
        unsafe {
            Ok(match shape {
                InfoShape::Mask => {
                    let mut mask: c_int = 0;
                    check(invoke_indexed!(index, address, handle, &mut mask => *mut c_int))?;
                    Info::Mask(mask as u32)
                }
                InfoShape::RangeFloat => {
                    let (mut min, mut max) = (0.0f64, 0.0f64);
                    check(invoke_indexed!(index, address, handle,
                                          &mut min => *mut f64, &mut max => *mut f64))?;
                    Info::Range { min, max }
                }
                InfoShape::RangeInt => {
                    let (mut min, mut max): (c_int, c_int) = (0, 0);
                    check(invoke_indexed!(index, address, handle,
                                          &mut min => *mut c_int, &mut max => *mut c_int))?;
                    Info::Range { min: min as f64, max: max as f64 }
                }
                InfoShape::RangeUint => {
                    let (mut min, mut max): (c_uint, c_uint) = (0, 0);
                    check(invoke_indexed!(index, address, handle,
                                          &mut min => *mut c_uint, &mut max => *mut c_uint))?;
                    Info::Range { min: min as f64, max: max as f64 }
                }
                InfoShape::Steps => {
                    let (mut min, mut max, mut steps) = (0.0f64, 0.0f64, 0.0f64);
                    check(invoke_indexed!(index, address, handle, &mut min => *mut f64,
                                          &mut max => *mut f64, &mut steps => *mut f64))?;
                    Info::Steps(StepRange { min, max, steps })
                }
                InfoShape::StepCount => {
                    let (mut min, mut max, mut steps) = (0.0f64, 0.0f64, 0 as c_int);
                    check(invoke_indexed!(index, address, handle, &mut min => *mut f64,
                                          &mut max => *mut f64, &mut steps => *mut c_int))?;
                    Info::Steps(StepRange { min, max, steps: steps as f64 })
                }
                InfoShape::LimitInt => {
                    let mut max: c_int = 0;
                    check(invoke_indexed!(index, address, handle, &mut max => *mut c_int))?;
                    Info::Limit(max as f64)
                }
                InfoShape::LimitUint => {
                    let mut max: c_uint = 0;
                    check(invoke_indexed!(index, address, handle, &mut max => *mut c_uint))?;
                    Info::Limit(max as f64)
                }
                InfoShape::LimitFloat => {
                    let mut max = 0.0f64;
                    check(invoke_indexed!(index, address, handle, &mut max => *mut f64))?;
                    Info::Limit(max)
                }
                InfoShape::Support => {
                    let (mut set, mut status): (Bool, Bool) = (0, 0);
                    check(invoke_indexed!(index, address, handle,
                                          &mut set => *mut Bool, &mut status => *mut Bool))?;
                    Info::Support { set: set != 0, status: status != 0 }
                }
                InfoShape::Masks => {
                    let mut masks: [c_uint; 4] = [0; 4];
                    let [low, high, rise, fall] = &mut masks;
                    check(invoke_indexed!(index, address, handle,
                                          low as *mut c_uint => *mut c_uint,
                                          high as *mut c_uint => *mut c_uint,
                                          rise as *mut c_uint => *mut c_uint,
                                          fall as *mut c_uint => *mut c_uint))?;
                    Info::Masks(masks)
                }
            })
        }
    }

    fn name(&self, handle: RawHandle, key: Key) -> Result<(String, String), DriverError> {
        let mut name = [0 as c_char; 32];
        let mut label = [0 as c_char; 16];
        check(unsafe {
            match (key.param, Index::of(key)?) {
                (Param::AnalogIoChannelName, Index::One(channel)) =>
                    FDwfAnalogIOChannelName(handle, channel, name.as_mut_ptr(), label.as_mut_ptr()),
                (Param::AnalogIoNodeName, Index::Two(channel, node)) =>
                    FDwfAnalogIOChannelNodeName(handle, channel, node,
                                                name.as_mut_ptr(), label.as_mut_ptr()),
                _ => return Err(unsupported(format!("{:?} has no name", key.param))),
            }
        })?;
        Ok((c_string(&name), c_string(&label)))
    }

    fn range_steps(&self, handle: RawHandle, key: Key) -> Result<Vec<f64>, DriverError> {
        if key.param != Param::AnalogInChannelRange {
            return Err(unsupported(format!("{:?} has no step table", key.param)))
        }
        let mut steps = [0.0f64; 32];
        let mut count = 0;
        check(unsafe { FDwfAnalogInChannelRangeSteps(handle, steps.as_mut_ptr(), &mut count) })?;
        Ok(steps[..(count.max(0) as usize).min(steps.len())].to_vec())
    }

    fn read_analog(&self, handle: RawHandle, key: Key, data: &mut [f64]) -> Result<(), DriverError> {
        let Index::One(channel) = Index::of(key)? else {
            return Err(unsupported(format!("{:?} is not readable as data", key.param)))
        };
        let count = int(data.len())?;
        check(unsafe {
            match key.param {
                Param::AnalogInData =>
                    FDwfAnalogInStatusData(handle, channel, data.as_mut_ptr(), count),
                Param::AnalogInNoiseMin => {
                    let mut max = vec![0.0; data.len()];
                    FDwfAnalogInStatusNoise(handle, channel, data.as_mut_ptr(), max.as_mut_ptr(), count)
                }
                Param::AnalogInNoiseMax => {
                    let mut min = vec![0.0; data.len()];
                    FDwfAnalogInStatusNoise(handle, channel, min.as_mut_ptr(), data.as_mut_ptr(), count)
                }
                _ => return Err(unsupported(format!("{:?} is not readable as data", key.param))),
            }
        })
    }

    fn read_digital(&self, handle: RawHandle, key: Key, data: &mut [u8]) -> Result<(), DriverError> {
        if key.param != Param::DigitalInData {
            return Err(unsupported(format!("{:?} is not readable as data", key.param)))
        }
        check(unsafe {
            FDwfDigitalInStatusData(handle, data.as_mut_ptr() as *mut c_void, int(data.len())?)
        })
    }

    fn write_analog(&self, handle: RawHandle, key: Key, data: &[f64]) -> Result<(), DriverError> {
        let Index::Two(channel, node) = Index::of(key)? else {
            return Err(unsupported(format!("{:?} is not writable as data", key.param)))
        };
        let count = int(data.len())?;
        check(unsafe {
            match key.param {
                Param::AnalogOutNodeData =>
                    FDwfAnalogOutNodeDataSet(handle, channel, node, data.as_ptr(), count),
                Param::AnalogOutNodePlayData =>
                    FDwfAnalogOutNodePlayData(handle, channel, node, data.as_ptr(), count),
                _ => return Err(unsupported(format!("{:?} is not writable as data", key.param))),
            }
        })
    }

    fn write_digital(&self, handle: RawHandle, key: Key, data: &[u8], count: usize)
            -> Result<(), DriverError> {
        let (Param::DigitalOutData, Index::One(channel)) = (key.param, Index::of(key)?) else {
            return Err(unsupported(format!("{:?} is not writable as data", key.param)))
        };
        if data.len() * 8 < count {
            return Err(invalid(format!("{} bits do not fit {} bytes", count, data.len())))
        }
        let bits = c_uint::try_from(count).map_err(|_| invalid("pattern too long"))?;
        check(unsafe { FDwfDigitalOutDataSet(handle, channel, data.as_ptr() as *const c_void, bits) })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_symbol_names() {
        assert_eq!(get_symbol(Param::AnalogInFrequency), "FDwfAnalogInFrequencyGet");
        assert_eq!(set_symbol(Param::AnalogIoEnable), "FDwfAnalogIOEnableSet");
        assert_eq!(get_symbol(Param::AnalogIoNode), "FDwfAnalogIOChannelNodeGet");
        assert_eq!(info_symbol(Param::AnalogIoNode), "FDwfAnalogIOChannelNodeSetInfo");
        assert_eq!(set_symbol(Param::DigitalIoOutputEnable), "FDwfDigitalIOOutputEnableSet");
        assert_eq!(get_symbol(Param::DigitalIoInput), "FDwfDigitalIOInputStatus");
        assert_eq!(info_symbol(Param::DigitalIoInput), "FDwfDigitalIOInputInfo");
        assert_eq!(set_symbol(Param::AnalogOutCustomAmFm), "FDwfAnalogOutCustomAMFMEnableSet");
        assert_eq!(get_symbol(Param::AnalogOutChannelCount), "FDwfAnalogOutCount");
        assert_eq!(set_symbol(Param::DeviceTrigger), "FDwfDeviceTriggerSet");
        assert_eq!(info_symbol(Param::AnalogOutNodes), "FDwfAnalogOutNodeInfo");
    }

    #[test]
    fn test_info_index() {
        let key = Key::channel(Param::AnalogInChannelRange, 1);
        assert!(matches!(Index::of(key), Ok(Index::One(1))));
        assert!(matches!(Index::of_info(key), Ok(Index::None)));
        let key = Key::node(Param::AnalogOutNodeFrequency, 1, 2);
        assert!(matches!(Index::of_info(key), Ok(Index::Two(1, 2))));
        assert!(matches!(Index::of_info(Key::channel(Param::DeviceTrigger, 1)), Ok(Index::None)));
        assert!(Index::of(Key::new(Param::AnalogOutRun)).is_err());
    }
}
