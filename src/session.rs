//! Exclusive ownership of an open device.
//!
//! A [`Session`] owns the native handle behind a mutex. Instrument controllers and the trigger
//! router only hold a weak reference to it, so once the session is closed or dropped every
//! later call through them fails with [`Error::SessionClosed`] without reaching the transport.
//! Every call that touches the handle holds the lock for its whole duration.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{Error, Result, OpenOptions};
use crate::params::{Info, Instrument, Key, Param, Scope, StepRange, Value};
use crate::sys::{Driver, DriverError, RawHandle, Target, HANDLE_NONE};
use crate::trigger::{TriggerDestination, TriggerRouter};
use crate::wire::{CapabilitySet, DeviceKind, InstrumentState, TriggerSource, WireEnum};
use crate::instrument::{AnalogIn, AnalogIo, AnalogOut, DigitalIn, DigitalIo, DigitalOut};

/// Code of the transport error reported when a value comes back in the wrong shape.
const ERC_SHAPE: i32 = -1;

fn reset_operation(instrument: Instrument) -> &'static str {
    match instrument {
        Instrument::Device     => "DeviceReset",
        Instrument::AnalogIn   => "AnalogInReset",
        Instrument::AnalogOut  => "AnalogOutReset",
        Instrument::AnalogIo   => "AnalogIOReset",
        Instrument::DigitalIn  => "DigitalInReset",
        Instrument::DigitalOut => "DigitalOutReset",
        Instrument::DigitalIo  => "DigitalIOReset",
    }
}

fn configure_operation(instrument: Instrument) -> &'static str {
    match instrument {
        Instrument::Device     => "DeviceConfigure",
        Instrument::AnalogIn   => "AnalogInConfigure",
        Instrument::AnalogOut  => "AnalogOutConfigure",
        Instrument::AnalogIo   => "AnalogIOConfigure",
        Instrument::DigitalIn  => "DigitalInConfigure",
        Instrument::DigitalOut => "DigitalOutConfigure",
        Instrument::DigitalIo  => "DigitalIOConfigure",
    }
}

fn status_operation(instrument: Instrument) -> &'static str {
    match instrument {
        Instrument::Device     => "DeviceStatus",
        Instrument::AnalogIn   => "AnalogInStatus",
        Instrument::AnalogOut  => "AnalogOutStatus",
        Instrument::AnalogIo   => "AnalogIOStatus",
        Instrument::DigitalIn  => "DigitalInStatus",
        Instrument::DigitalOut => "DigitalOutStatus",
        Instrument::DigitalIo  => "DigitalIOStatus",
    }
}

fn unexpected(operation: &'static str, value: Value) -> Error {
    Error::Transport {
        operation,
        source: DriverError::new(ERC_SHAPE, format!("unexpected value {:?}", value)),
    }
}

/// Channel and node counts, read once when the device is opened.
#[derive(Debug, Clone, Default)]
struct Counts {
    analog_in: usize,
    analog_out: usize,
    analog_io: usize,
    analog_io_nodes: Vec<usize>,
    digital_out: usize,
    trigger_pins: usize,
}

impl Counts {
    fn channels(&self, instrument: Instrument) -> Option<usize> {
        match instrument {
            Instrument::AnalogIn   => Some(self.analog_in),
            Instrument::AnalogOut  => Some(self.analog_out),
            Instrument::AnalogIo   => Some(self.analog_io),
            Instrument::DigitalOut => Some(self.digital_out),
            _ => None,
        }
    }
}

/// Everything guarded by the session lock.
pub(crate) struct Link<D: Driver> {
    driver: Arc<D>,
    handle: Option<RawHandle>,
    index: usize,
    config: Option<usize>,
    auto_configure: bool,
    counts: Counts,
    /// Instruments last configured with `start`.
    started: Vec<Target>,
    states: HashMap<Target, InstrumentState>,
}

impl<D: Driver> Link<D> {
    fn handle(&self) -> Result<RawHandle> {
        self.handle.ok_or(Error::SessionClosed)
    }

    pub(crate) fn call<T>(&self, operation: &'static str,
                          f: impl FnOnce(&D, RawHandle) -> core::result::Result<T, DriverError>)
            -> Result<T> {
        let handle = self.handle()?;
        f(&self.driver, handle).map_err(|source| Error::Transport { operation, source })
    }

    pub(crate) fn channel_count(&self, instrument: Instrument) -> usize {
        self.counts.channels(instrument).unwrap_or(0)
    }

    pub(crate) fn trigger_pins(&self) -> usize {
        self.counts.trigger_pins
    }

    pub(crate) fn node_count(&self, channel: usize) -> Result<usize> {
        self.check_channel(Instrument::AnalogIo, channel)?;
        Ok(self.counts.analog_io_nodes.get(channel).copied().unwrap_or(0))
    }

    pub(crate) fn check_channel(&self, instrument: Instrument, channel: usize) -> Result<()> {
        if let Some(count) = self.counts.channels(instrument) {
            if channel >= count {
                return Err(Error::InvalidChannel { instrument: instrument.name(), channel, count })
            }
        }
        Ok(())
    }

    fn check(&self, key: Key) -> Result<()> {
        let instrument = key.param.instrument();
        match (key.param.scope(), key.channel) {
            (Scope::Pin, Some(pin)) if pin >= self.counts.trigger_pins => {
                return Err(Error::InvalidChannel {
                    instrument: "trigger pin", channel: pin, count: self.counts.trigger_pins,
                })
            }
            (Scope::Channel | Scope::Node, Some(channel)) => self.check_channel(instrument, channel)?,
            _ => (),
        }
        if let (Instrument::AnalogIo, Scope::Node, Some(channel), Some(node)) =
                (instrument, key.param.scope(), key.channel, key.node) {
            let count = self.node_count(channel)?;
            if node >= count {
                return Err(Error::InvalidNode { instrument: instrument.name(), channel, node, count })
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, key: Key) -> Result<Value> {
        self.check(key)?;
        let value = self.call(key.param.get_operation(), |driver, handle| driver.get(handle, key))?;
        log::trace!("{:?} -> {:?}", key, value);
        Ok(value)
    }

    pub(crate) fn get_float(&self, key: Key) -> Result<f64> {
        let value = self.get(key)?;
        value.as_float().ok_or_else(|| unexpected(key.param.get_operation(), value))
    }

    pub(crate) fn get_int(&self, key: Key) -> Result<i32> {
        let value = self.get(key)?;
        value.as_int().ok_or_else(|| unexpected(key.param.get_operation(), value))
    }

    pub(crate) fn get_uint(&self, key: Key) -> Result<u32> {
        let value = self.get(key)?;
        value.as_uint().ok_or_else(|| unexpected(key.param.get_operation(), value))
    }

    pub(crate) fn get_bool(&self, key: Key) -> Result<bool> {
        let value = self.get(key)?;
        value.as_bool().ok_or_else(|| unexpected(key.param.get_operation(), value))
    }

    pub(crate) fn get_enum<E: WireEnum>(&self, key: Key) -> Result<E> {
        let operation = key.param.get_operation();
        let code = self.get_int(key)?;
        E::from_wire(code).ok_or(Error::UnknownCode { operation, code })
    }

    pub(crate) fn get_shaped<T>(&self, key: Key, f: impl FnOnce(Value) -> Option<T>) -> Result<T> {
        let value = self.get(key)?;
        f(value).ok_or_else(|| unexpected(key.param.get_operation(), value))
    }

    /// Sets a parameter, then reconfigures its instrument if auto-configure is on.
    pub(crate) fn set(&mut self, key: Key, value: Value) -> Result<()> {
        self.check(key)?;
        log::trace!("{:?} <- {:?}", key, value);
        self.call(key.param.set_operation(), |driver, handle| driver.set(handle, key, value))?;
        self.auto_configure(key.param.instrument(), key.channel)
    }

    pub(crate) fn set_enum<E: WireEnum>(&mut self, key: Key, variant: E) -> Result<()> {
        self.set(key, Value::Int(variant.to_wire()))
    }

    pub(crate) fn info(&self, key: Key) -> Result<Info> {
        self.check(key)?;
        self.call(key.param.info_operation(), |driver, handle| driver.info(handle, key))
    }

    pub(crate) fn info_set<E: WireEnum>(&self, key: Key) -> Result<CapabilitySet<E>> {
        match self.info(key)? {
            Info::Mask(mask) => Ok(CapabilitySet::from_mask(mask)),
            other => Err(self.unexpected_info(key, other)),
        }
    }

    /// Range of a quantity; step counts are dropped.
    pub(crate) fn info_range(&self, key: Key) -> Result<(f64, f64)> {
        let steps = self.info_steps(key)?;
        Ok((steps.min, steps.max))
    }

    /// Range and resolution of a quantity. A bare range reports zero steps.
    pub(crate) fn info_steps(&self, key: Key) -> Result<StepRange> {
        match self.info(key)? {
            Info::Steps(steps) => Ok(steps),
            Info::Range { min, max } => Ok(StepRange { min, max, steps: 0.0 }),
            other => Err(self.unexpected_info(key, other)),
        }
    }

    pub(crate) fn info_limit(&self, key: Key) -> Result<f64> {
        match self.info(key)? {
            Info::Limit(limit) => Ok(limit),
            Info::Range { max, .. } => Ok(max),
            other => Err(self.unexpected_info(key, other)),
        }
    }

    pub(crate) fn info_support(&self, key: Key) -> Result<(bool, bool)> {
        match self.info(key)? {
            Info::Support { set, status } => Ok((set, status)),
            other => Err(self.unexpected_info(key, other)),
        }
    }

    pub(crate) fn info_masks(&self, key: Key) -> Result<[u32; 4]> {
        match self.info(key)? {
            Info::Masks(masks) => Ok(masks),
            other => Err(self.unexpected_info(key, other)),
        }
    }

    fn unexpected_info(&self, key: Key, info: Info) -> Error {
        Error::Transport {
            operation: key.param.info_operation(),
            source: DriverError::new(ERC_SHAPE, format!("unexpected capability {:?}", info)),
        }
    }

    pub(crate) fn name(&self, key: Key) -> Result<(String, String)> {
        self.check(key)?;
        self.call(key.param.get_operation(), |driver, handle| driver.name(handle, key))
    }

    pub(crate) fn range_steps(&self, key: Key) -> Result<Vec<f64>> {
        self.check(key)?;
        self.call(key.param.info_operation(), |driver, handle| driver.range_steps(handle, key))
    }

    pub(crate) fn read_analog(&self, key: Key, data: &mut [f64]) -> Result<()> {
        self.check(key)?;
        log::trace!("{:?} -> {} samples", key, data.len());
        self.call(key.param.get_operation(), |driver, handle| driver.read_analog(handle, key, data))
    }

    pub(crate) fn read_digital(&self, key: Key, data: &mut [u8]) -> Result<()> {
        self.check(key)?;
        log::trace!("{:?} -> {} bytes", key, data.len());
        self.call(key.param.get_operation(), |driver, handle| driver.read_digital(handle, key, data))
    }

    pub(crate) fn write_analog(&mut self, key: Key, data: &[f64]) -> Result<()> {
        self.check(key)?;
        log::trace!("{:?} <- {} samples", key, data.len());
        self.call(key.param.set_operation(),
                  |driver, handle| driver.write_analog(handle, key, data))?;
        self.auto_configure(key.param.instrument(), key.channel)
    }

    pub(crate) fn write_digital(&mut self, key: Key, data: &[u8], count: usize) -> Result<()> {
        self.check(key)?;
        log::trace!("{:?} <- {} bits", key, count);
        self.call(key.param.set_operation(),
                  |driver, handle| driver.write_digital(handle, key, data, count))?;
        self.auto_configure(key.param.instrument(), key.channel)
    }

    fn auto_configure(&mut self, instrument: Instrument, channel: Option<usize>) -> Result<()> {
        if !self.auto_configure || instrument == Instrument::Device {
            return Ok(())
        }
        let target = match instrument {
            Instrument::AnalogOut => Target { instrument, channel },
            _ => Target::new(instrument),
        };
        let start = self.is_started(target);
        self.configure(target, false, start)
    }

    /// Runs `f` with auto-configure suspended, then configures `target` once if it was on.
    pub(crate) fn batch<T>(&mut self, target: Target, f: impl FnOnce(&mut Self) -> Result<T>)
            -> Result<T> {
        let auto_configure = self.auto_configure;
        self.auto_configure = false;
        let result = f(self);
        self.auto_configure = auto_configure;
        let value = result?;
        if auto_configure {
            let start = self.is_started(target);
            self.configure(target, false, start)?;
        }
        Ok(value)
    }

    fn check_target(&self, target: Target) -> Result<()> {
        match target.channel {
            Some(channel) => self.check_channel(target.instrument, channel),
            None => Ok(()),
        }
    }

    pub(crate) fn is_started(&self, target: Target) -> bool {
        self.started.iter().any(|started| {
            started.instrument == target.instrument &&
                (started.channel.is_none() || target.channel.is_none() ||
                    started.channel == target.channel)
        })
    }

    /// Forgets `target` as started. Stopping one channel of an instrument started as a whole
    /// keeps the other channels started.
    fn mark_stopped(&mut self, target: Target) {
        let whole = Target::new(target.instrument);
        if let Some(channel) = target.channel {
            if self.started.contains(&whole) {
                self.started.retain(|started| *started != whole);
                for other in 0..self.channel_count(target.instrument) {
                    if other != channel {
                        self.started.push(Target::channel(target.instrument, other))
                    }
                }
            }
            self.started.retain(|started| *started != target);
        } else {
            self.started.retain(|started| started.instrument != target.instrument);
        }
    }

    pub(crate) fn configure(&mut self, target: Target, reconfigure: bool, start: bool) -> Result<()> {
        self.check_target(target)?;
        log::debug!("configure {:?} (reconfigure: {}, start: {})", target, reconfigure, start);
        self.call(configure_operation(target.instrument),
                  |driver, handle| driver.configure(handle, target, reconfigure, start))?;
        if start {
            if !self.is_started(target) || target.channel.is_none() {
                self.mark_stopped(target);
                self.started.push(target);
            }
        } else {
            self.mark_stopped(target);
        }
        Ok(())
    }

    pub(crate) fn reset(&mut self, target: Target) -> Result<()> {
        self.check_target(target)?;
        log::debug!("reset {:?}", target);
        self.call(reset_operation(target.instrument),
                  |driver, handle| driver.reset(handle, target))?;
        if target.instrument == Instrument::Device {
            self.started.clear();
            self.states.clear();
        } else {
            self.mark_stopped(target);
            self.states.retain(|known, _| {
                known.instrument != target.instrument ||
                    (target.channel.is_some() && known.channel != target.channel)
            });
        }
        Ok(())
    }

    pub(crate) fn status(&mut self, target: Target, read_data: bool) -> Result<InstrumentState> {
        self.check_target(target)?;
        let operation = status_operation(target.instrument);
        let code = self.call(operation, |driver, handle| driver.status(handle, target, read_data))?;
        let state = InstrumentState::from_wire(code).ok_or(Error::UnknownCode { operation, code })?;
        if self.states.insert(target, state) != Some(state) {
            log::debug!("{:?} is {:?}", target, state);
        }
        Ok(state)
    }

    pub(crate) fn trigger_pc(&self) -> Result<()> {
        log::debug!("PC trigger pulse");
        self.call("DeviceTriggerPC", |driver, handle| driver.trigger_pc(handle))
    }

    /// Releases the handle. Failures are logged, never returned.
    fn close(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        self.started.clear();
        self.states.clear();
        match self.driver.close(handle) {
            Ok(()) => log::debug!("closed device {} (handle {})", self.index, handle),
            Err(error) => log::warn!("failed to close device {} (handle {}): {}",
                                     self.index, handle, error),
        }
    }
}

/// Non-owning reference to a session, held by controllers.
pub(crate) struct SessionRef<D: Driver>(Weak<Mutex<Link<D>>>);

impl<D: Driver> SessionRef<D> {
    /// Runs `f` under the session lock.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut Link<D>) -> Result<T>) -> Result<T> {
        let link = self.0.upgrade().ok_or(Error::SessionClosed)?;
        let mut link = link.lock();
        if link.handle.is_none() {
            return Err(Error::SessionClosed)
        }
        f(&mut link)
    }
}

impl<D: Driver> Clone for SessionRef<D> {
    fn clone(&self) -> Self {
        SessionRef(self.0.clone())
    }
}

/// An open device.
///
/// With auto-configure on (the default), every parameter change reconfigures the instrument it
/// belongs to before returning; an instrument that was last configured with `start` is
/// restarted so the change takes effect immediately. With auto-configure off, changes take
/// effect at the next explicit `configure`.
pub struct Session<D: Driver> {
    link: Arc<Mutex<Link<D>>>,
}

impl<D: Driver> Session<D> {
    /// Opens the device at `index` of the last enumeration. `config` selects one of its
    /// configurations; `None` keeps the active one.
    pub fn open(driver: Arc<D>, index: usize, config: Option<usize>) -> Result<Session<D>> {
        Session::open_with(driver, index, OpenOptions { config, ..Default::default() })
    }

    pub fn open_with(driver: Arc<D>, index: usize, options: OpenOptions) -> Result<Session<D>> {
        if let Some(config) = options.config {
            let count = driver.device_config_count(index)
                .map_err(|source| Error::Transport { operation: "DeviceConfigCount", source })?;
            if config >= count {
                return Err(Error::InvalidConfig { index, config })
            }
        }
        let handle = driver.open(index, options.config)
            .map_err(|source| Error::Transport { operation: "DeviceOpen", source })?;
        if handle == HANDLE_NONE {
            return Err(Error::DeviceNotFound { index })
        }
        let mut link = Link {
            driver,
            handle: Some(handle),
            index,
            config: options.config,
            auto_configure: options.auto_configure,
            counts: Counts::default(),
            started: Vec::new(),
            states: HashMap::new(),
        };
        match Session::count(&link) {
            Ok(counts) => link.counts = counts,
            Err(error) => {
                link.close();
                return Err(error)
            }
        }
        log::debug!("opened device {} (config {:?}) as handle {}", index, options.config, handle);
        Ok(Session { link: Arc::new(Mutex::new(link)) })
    }

    fn count(link: &Link<D>) -> Result<Counts> {
        let count = |param| -> Result<usize> {
            Ok(link.get_int(Key::new(param))?.max(0) as usize)
        };
        let (kind, _version) = link.driver.device_type(link.index)
            .map_err(|source| Error::Transport { operation: "DeviceType", source })?;
        let kind = DeviceKind::from_wire(kind)
            .ok_or(Error::UnknownCode { operation: "DeviceType", code: kind })?;
        let analog_io = count(Param::AnalogIoChannelCount)?;
        // channel bounds are not known yet, so skip the checked path
        let analog_io_nodes = (0..analog_io)
            .map(|channel| {
                let key = Key::channel(Param::AnalogIoChannelNodes, channel);
                let operation = key.param.get_operation();
                let value = link.call(operation, |driver, handle| driver.get(handle, key))?;
                let nodes = value.as_int().ok_or_else(|| unexpected(operation, value))?;
                Ok(nodes.max(0) as usize)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Counts {
            analog_in: count(Param::AnalogInChannelCount)?,
            analog_out: count(Param::AnalogOutChannelCount)?,
            analog_io,
            analog_io_nodes,
            digital_out: count(Param::DigitalOutChannelCount)?,
            trigger_pins: match kind {
                DeviceKind::Discovery => 2,
                DeviceKind::EExplorer => 4,
            },
        })
    }

    pub(crate) fn reference(&self) -> SessionRef<D> {
        SessionRef(Arc::downgrade(&self.link))
    }

    fn with<T>(&self, f: impl FnOnce(&mut Link<D>) -> Result<T>) -> Result<T> {
        self.reference().with(f)
    }

    /// Releases the device. Calling it again does nothing.
    pub fn close(&self) {
        self.link.lock().close()
    }

    pub fn is_open(&self) -> bool {
        self.link.lock().handle.is_some()
    }

    /// Enumeration index the device was opened at.
    pub fn index(&self) -> usize {
        self.link.lock().index
    }

    /// Configuration the device was opened with, if one was requested.
    pub fn config(&self) -> Option<usize> {
        self.link.lock().config
    }

    pub fn auto_configure_set(&self, enable: bool) {
        self.link.lock().auto_configure = enable
    }

    pub fn auto_configure_get(&self) -> bool {
        self.link.lock().auto_configure
    }

    /// Restores factory defaults on every instrument.
    pub fn reset(&self) -> Result<()> {
        self.with(|link| link.reset(Target::new(Instrument::Device)))
    }

    /// Enables or disables the whole device.
    pub fn enable_set(&self, enable: bool) -> Result<()> {
        self.with(|link| link.set(Key::new(Param::DeviceEnable), Value::Bool(enable)))
    }

    /// Sources that can drive trigger pin `pin`.
    pub fn trigger_info(&self, pin: usize) -> Result<CapabilitySet<TriggerSource>> {
        self.trigger_router().source_info(TriggerDestination::Pin(pin))
    }

    pub fn trigger_set(&self, pin: usize, source: TriggerSource) -> Result<()> {
        self.trigger_router().bind(TriggerDestination::Pin(pin), source)
    }

    pub fn trigger_get(&self, pin: usize) -> Result<TriggerSource> {
        self.trigger_router().read(TriggerDestination::Pin(pin))
    }

    /// Issues one software trigger pulse.
    pub fn trigger_pc(&self) -> Result<()> {
        self.with(|link| link.trigger_pc())
    }

    pub fn trigger_router(&self) -> TriggerRouter<D> {
        TriggerRouter::new(self.reference())
    }

    pub fn analog_in(&self) -> AnalogIn<D> {
        AnalogIn::new(self.reference())
    }

    pub fn analog_out(&self) -> AnalogOut<D> {
        AnalogOut::new(self.reference())
    }

    pub fn analog_io(&self) -> AnalogIo<D> {
        AnalogIo::new(self.reference())
    }

    pub fn digital_in(&self) -> DigitalIn<D> {
        DigitalIn::new(self.reference())
    }

    pub fn digital_out(&self) -> DigitalOut<D> {
        DigitalOut::new(self.reference())
    }

    pub fn digital_io(&self) -> DigitalIo<D> {
        DigitalIo::new(self.reference())
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        self.close()
    }
}

impl<D: Driver> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let link = self.link.lock();
        f.debug_struct("Session")
            .field("index", &link.index)
            .field("handle", &link.handle)
            .field("auto_configure", &link.auto_configure)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sys::sim::{SimDevice, SimDriver};

    fn open() -> (Arc<SimDriver>, Session<SimDriver>) {
        let driver = Arc::new(SimDriver::default());
        let session = Session::open(driver.clone(), 0, None).unwrap();
        (driver, session)
    }

    #[test]
    fn test_open_not_found() {
        let driver = Arc::new(SimDriver::new(vec![SimDevice::analog_discovery().in_use()]));
        assert!(matches!(Session::open(driver.clone(), 0, None),
                         Err(Error::DeviceNotFound { index: 0 })));
        assert!(matches!(Session::open(driver.clone(), 3, None),
                         Err(Error::DeviceNotFound { index: 3 })));
        assert_eq!(driver.closes(), 0);
    }

    #[test]
    fn test_open_analog_io_nodes() {
        for (device, nodes) in [
            (SimDevice::analog_discovery(), &[2, 2, 3][..]),
            (SimDevice::electronics_explorer(), &[2, 2, 3, 1, 1][..]),
        ] {
            let driver = Arc::new(SimDriver::new(vec![device]));
            let session = Session::open(driver.clone(), 0, None).unwrap();
            let analog_io = session.analog_io();
            assert_eq!(analog_io.channel_count().unwrap(), nodes.len());
            for (channel, &count) in nodes.iter().enumerate() {
                assert_eq!(analog_io.channel_info(channel).unwrap(), count);
                assert!(matches!(analog_io.channel_node_get(channel, count),
                                 Err(Error::InvalidNode { .. })));
            }
        }
    }

    #[test]
    fn test_open_invalid_config() {
        let driver = Arc::new(SimDriver::default());
        assert!(matches!(Session::open(driver.clone(), 0, Some(2)),
                         Err(Error::InvalidConfig { index: 0, config: 2 })));
        assert!(!driver.is_open(0));
        let session = Session::open(driver.clone(), 0, Some(1)).unwrap();
        assert_eq!(session.config(), Some(1));
        assert_eq!(session.analog_in().buffer_size_get().unwrap(), 16384);
    }

    #[test]
    fn test_open_transport_failure() {
        let driver = Arc::new(SimDriver::default());
        driver.fail_next("open");
        assert!(matches!(Session::open(driver.clone(), 0, None),
                         Err(Error::Transport { operation: "DeviceOpen", .. })));
        // a failure after the handle was obtained must not leak it
        driver.fail_next("get");
        assert!(Session::open(driver.clone(), 0, None).is_err());
        assert!(!driver.is_open(0));
        assert_eq!(driver.closes(), 1);
    }

    #[test]
    fn test_close_once() {
        let (driver, session) = open();
        session.close();
        session.close();
        assert_eq!(driver.closes(), 1);
        assert!(!session.is_open());
        drop(session);
        assert_eq!(driver.closes(), 1);
    }

    #[test]
    fn test_close_on_drop() {
        let (driver, session) = open();
        drop(session);
        assert_eq!(driver.closes(), 1);
        assert!(!driver.is_open(0));
    }

    #[test]
    fn test_close_failure_is_swallowed() {
        let (driver, session) = open();
        driver.fail_next("close");
        session.close();
        assert!(!session.is_open());
        session.close();
        assert_eq!(driver.closes(), 0);
    }

    #[test]
    fn test_closed_session_skips_transport() {
        let (driver, session) = open();
        let analog_in = session.analog_in();
        let router = session.trigger_router();
        session.close();
        let calls = driver.calls();
        assert!(matches!(analog_in.frequency_get(), Err(Error::SessionClosed)));
        assert!(matches!(router.trigger_pc(), Err(Error::SessionClosed)));
        assert!(matches!(session.reset(), Err(Error::SessionClosed)));
        assert_eq!(driver.calls(), calls);
    }

    #[test]
    fn test_dropped_session_skips_transport() {
        let (driver, session) = open();
        let digital_out = session.digital_out();
        drop(session);
        let calls = driver.calls();
        assert!(matches!(digital_out.run_get(), Err(Error::SessionClosed)));
        assert_eq!(driver.calls(), calls);
    }

    #[test]
    fn test_auto_configure_flag() {
        let (driver, session) = open();
        assert!(session.auto_configure_get());
        let analog_in = session.analog_in();
        let calls = driver.calls();
        analog_in.frequency_set(2e6).unwrap();
        // set, then configure
        assert_eq!(driver.calls(), calls + 2);

        session.auto_configure_set(false);
        assert!(!session.auto_configure_get());
        let calls = driver.calls();
        analog_in.frequency_set(3e6).unwrap();
        assert_eq!(driver.calls(), calls + 1);
    }

    #[test]
    fn test_auto_configure_restarts_started() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        analog_in.configure(false, true).unwrap();
        while analog_in.status(false).unwrap() != InstrumentState::Done {}
        analog_in.frequency_set(2e6).unwrap();
        assert_eq!(analog_in.status(false).unwrap(), InstrumentState::Prefill);

        analog_in.configure(false, false).unwrap();
        analog_in.frequency_set(3e6).unwrap();
        assert_eq!(analog_in.status(false).unwrap(), InstrumentState::Ready);
    }

    #[test]
    fn test_reset() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        analog_in.frequency_set(5e3).unwrap();
        session.reset().unwrap();
        assert_eq!(analog_in.frequency_get().unwrap(), 1e6);
    }

    #[test]
    fn test_trigger_pins() {
        let (_driver, session) = open();
        session.trigger_set(1, TriggerSource::Pc).unwrap();
        assert_eq!(session.trigger_get(1).unwrap(), TriggerSource::Pc);
        assert!(matches!(session.trigger_get(2),
                         Err(Error::InvalidChannel { channel: 2, count: 2, .. })));
        assert!(!session.trigger_info(0).unwrap().contains(TriggerSource::External1));
    }

    #[test]
    fn test_enable() {
        let (_driver, session) = open();
        session.enable_set(false).unwrap();
        session.enable_set(true).unwrap();
    }
}
