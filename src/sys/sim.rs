//! A simulated device bench.
//!
//! [`SimDriver`] models one or more devices closely enough to exercise everything above the
//! transport seam without hardware: parameters with factory defaults and range coercion,
//! the instrument state machines, trigger routing between instruments, loopback of the
//! analog outputs into the analog inputs, and digital I/O loopback.
//!
//! Simulated time only moves when an instrument status is polled; every poll advances the
//! whole device by [`POLL_PERIOD`] seconds, so tests are fully deterministic.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::codec::{self, SampleWidth};
use crate::params::{Info, Instrument, Key, Param, Scope, StepRange, Value};
use crate::wire::*;
use super::{Driver, DriverError, RawHandle, Target, HANDLE_NONE};

/// Simulated seconds elapsed per status poll.
pub const POLL_PERIOD: f64 = 1e-3;

pub const ERC_UNKNOWN: i32 = 1;
pub const ERC_NOT_SUPPORTED: i32 = 4;
pub const ERC_INVALID_PARAMETER: i32 = 0x10;

const INTERNAL_CLOCK: f64 = 100e6;
const ANALOG_IN_BITS: i32 = 14;
const ANALOG_IN_RANGES: &[f64] = &[5.0, 50.0];

/// Static capability counts of one device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
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

impl SimConfig {
    pub fn info(&self, info: ConfigInfo) -> usize {
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
}

/// A simulated device attached to the bench.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub kind: DeviceKind,
    pub version: DeviceVersion,
    pub name: String,
    pub user_name: String,
    pub serial: String,
    pub configs: Vec<SimConfig>,
    /// Configuration used when opening without an explicit one.
    pub active_config: usize,
    /// Held open by another process.
    pub in_use: bool,
}

impl SimDevice {
    pub fn analog_discovery() -> SimDevice {
        let base = SimConfig {
            analog_in_channels: 2,
            analog_out_channels: 2,
            analog_io_channels: 3,
            digital_in_channels: 16,
            digital_out_channels: 16,
            digital_io_channels: 16,
            analog_in_buffer: 8192,
            analog_out_buffer: 4096,
            digital_in_buffer: 4096,
            digital_out_buffer: 1024,
        };
        SimDevice {
            kind: DeviceKind::Discovery,
            version: DeviceVersion::DiscoveryB,
            name: "Analog Discovery 2".to_owned(),
            user_name: "Discovery2".to_owned(),
            serial: "SN:210321A1B2C3".to_owned(),
            configs: vec![
                base,
                SimConfig { analog_in_buffer: 16384, analog_out_buffer: 1024,
                            digital_in_buffer: 1024, ..base },
            ],
            active_config: 0,
            in_use: false,
        }
    }

    pub fn electronics_explorer() -> SimDevice {
        SimDevice {
            kind: DeviceKind::EExplorer,
            version: DeviceVersion::EExplorerF,
            name: "Electronics Explorer".to_owned(),
            user_name: "EExplorer".to_owned(),
            serial: "SN:210144B9D8E7".to_owned(),
            configs: vec![SimConfig {
                analog_in_channels: 4,
                analog_out_channels: 4,
                analog_io_channels: 5,
                digital_in_channels: 32,
                digital_out_channels: 32,
                digital_io_channels: 32,
                analog_in_buffer: 16384,
                analog_out_buffer: 4096,
                digital_in_buffer: 16384,
                digital_out_buffer: 4096,
            }],
            active_config: 0,
            in_use: false,
        }
    }

    pub fn with_serial(mut self, serial: &str) -> SimDevice {
        self.serial = serial.to_owned();
        self
    }

    pub fn in_use(mut self) -> SimDevice {
        self.in_use = true;
        self
    }

    fn trigger_pins(&self) -> usize {
        match self.kind {
            DeviceKind::Discovery => 2,
            DeviceKind::EExplorer => 4,
        }
    }
}

struct IoNode {
    name: &'static str,
    units: &'static str,
    kind: AnalogIoType,
    set: Option<(f64, f64)>,
    status: (f64, f64),
}

struct IoChannel {
    name: &'static str,
    label: &'static str,
    nodes: &'static [IoNode],
}

const ANALOG_IO_LAYOUT: &[IoChannel] = &[
    IoChannel { name: "Positive Supply", label: "V+", nodes: &[
        IoNode { name: "Enable", units: "", kind: AnalogIoType::Enable,
                 set: Some((0.0, 1.0)), status: (0.0, 1.0) },
        IoNode { name: "Voltage", units: "V", kind: AnalogIoType::Voltage,
                 set: Some((0.0, 5.0)), status: (0.0, 5.0) },
    ] },
    IoChannel { name: "Negative Supply", label: "V-", nodes: &[
        IoNode { name: "Enable", units: "", kind: AnalogIoType::Enable,
                 set: Some((0.0, 1.0)), status: (0.0, 1.0) },
        IoNode { name: "Voltage", units: "V", kind: AnalogIoType::Voltage,
                 set: Some((-5.0, 0.0)), status: (-5.0, 0.0) },
    ] },
    IoChannel { name: "USB Monitor", label: "USB", nodes: &[
        IoNode { name: "Voltage", units: "V", kind: AnalogIoType::Voltage,
                 set: None, status: (0.0, 6.0) },
        IoNode { name: "Current", units: "A", kind: AnalogIoType::Current,
                 set: None, status: (0.0, 0.6) },
        IoNode { name: "Temperature", units: "degC", kind: AnalogIoType::Temperature,
                 set: None, status: (-40.0, 125.0) },
    ] },
    IoChannel { name: "Voltmeter 1", label: "VMTR1", nodes: &[
        IoNode { name: "Voltage", units: "V", kind: AnalogIoType::Voltage,
                 set: None, status: (-15.0, 15.0) },
    ] },
    IoChannel { name: "Voltmeter 2", label: "VMTR2", nodes: &[
        IoNode { name: "Voltage", units: "V", kind: AnalogIoType::Voltage,
                 set: None, status: (-15.0, 15.0) },
    ] },
];

fn invalid(message: impl Into<String>) -> DriverError {
    DriverError::new(ERC_INVALID_PARAMETER, message)
}

fn unsupported(message: impl Into<String>) -> DriverError {
    DriverError::new(ERC_NOT_SUPPORTED, message)
}

fn mask_of<E: WireEnum>(variants: impl IntoIterator<Item = E>) -> u32 {
    variants.into_iter().collect::<CapabilitySet<E>>().mask()
}

fn line_mask(count: usize) -> u32 {
    if count >= 32 { !0 } else { (1u32 << count) - 1 }
}

/// Progress of an acquisition instrument.
#[derive(Debug, Clone, Copy)]
struct Acquisition {
    state: InstrumentState,
    waiting_since: f64,
    pulses_seen: u64,
    triggered_at: f64,
    auto_triggered: bool,
    /// Samples acquired since the trigger.
    acquired: usize,
    /// Samples already handed out in record mode.
    consumed: usize,
    latch: Latch,
}

/// Counters captured by the last status read.
#[derive(Debug, Clone, Copy, Default)]
struct Latch {
    left: i32,
    valid: i32,
    index_write: i32,
    auto_triggered: bool,
    available: i32,
    lost: i32,
    corrupt: i32,
}

/// Inputs of one acquisition step, sampled from the rest of the device.
struct AcquisitionPace {
    has_source: bool,
    fired: bool,
    timeout: f64,
    per_poll: usize,
    buffer: usize,
    mode: AcquisitionMode,
    record_total: Option<usize>,
}

impl Acquisition {
    fn new() -> Acquisition {
        Acquisition {
            state: InstrumentState::Ready,
            waiting_since: 0.0,
            pulses_seen: 0,
            triggered_at: 0.0,
            auto_triggered: false,
            acquired: 0,
            consumed: 0,
            latch: Latch::default(),
        }
    }

    fn configure(&mut self, now: f64, pulses: u64, reconfigure: bool, start: bool) {
        let waiting = matches!(self.state, InstrumentState::Armed | InstrumentState::Wait);
        if reconfigure {
            self.waiting_since = now;
            self.auto_triggered = false;
            self.pulses_seen = pulses;
        }
        if start {
            if reconfigure && waiting {
                return
            }
            self.state = InstrumentState::Config;
            self.acquired = 0;
            self.consumed = 0;
            self.auto_triggered = false;
            self.pulses_seen = pulses;
            self.waiting_since = now;
        } else {
            self.state = InstrumentState::Ready;
        }
    }

    fn trigger(&mut self, now: f64, auto: bool) {
        self.state = InstrumentState::Running;
        self.triggered_at = now;
        self.auto_triggered = auto;
    }

    fn step(&mut self, now: f64, pace: &AcquisitionPace) {
        match self.state {
            InstrumentState::Config => self.state = InstrumentState::Prefill,
            InstrumentState::Prefill => self.state = InstrumentState::Armed,
            InstrumentState::Armed => {
                if pace.has_source {
                    self.state = InstrumentState::Wait;
                    self.waiting_since = now;
                } else {
                    self.trigger(now, false)
                }
            }
            InstrumentState::Wait => {
                if pace.fired {
                    self.trigger(now, false)
                } else if pace.timeout > 0.0 && now - self.waiting_since >= pace.timeout - 1e-12 {
                    self.trigger(now, true)
                }
            }
            InstrumentState::Running | InstrumentState::Triggered => {
                self.acquired += pace.per_poll;
                match pace.mode {
                    AcquisitionMode::Single if self.acquired >= pace.buffer => {
                        self.acquired = pace.buffer;
                        self.state = InstrumentState::Done;
                    }
                    AcquisitionMode::Record => {
                        if let Some(total) = pace.record_total {
                            if self.acquired >= total {
                                self.acquired = total;
                                self.state = InstrumentState::Done;
                            }
                        }
                    }
                    _ => (),
                }
            }
            InstrumentState::Ready | InstrumentState::Done => (),
        }
    }

    /// Captures the counters and returns the indices of the samples now in the buffer.
    fn latch(&mut self, mode: AcquisitionMode, buffer: usize, record_total: Option<usize>)
            -> Vec<usize> {
        let acquired = self.acquired;
        let buffer = buffer.max(1);
        let mut latch = Latch {
            index_write: (acquired % buffer) as i32,
            auto_triggered: self.auto_triggered,
            ..Latch::default()
        };
        let indices: Vec<usize> = match mode {
            AcquisitionMode::Single => {
                latch.left = buffer.saturating_sub(acquired) as i32;
                (0..acquired.min(buffer)).collect()
            }
            AcquisitionMode::ScanShift =>
                (acquired.saturating_sub(buffer)..acquired).collect(),
            AcquisitionMode::ScanScreen =>
                (0..acquired.min(buffer)).map(|slot| (acquired - 1 - slot) / buffer * buffer + slot)
                    .collect(),
            AcquisitionMode::Record => {
                let pending = acquired - self.consumed;
                let lost = pending.saturating_sub(buffer);
                let first = self.consumed + lost;
                self.consumed = acquired;
                latch.available = (acquired - first) as i32;
                latch.lost = lost as i32;
                latch.left = record_total.map_or(0, |total| total.saturating_sub(acquired)) as i32;
                (first..acquired).collect()
            }
        };
        latch.valid = indices.len() as i32;
        self.latch = latch;
        indices
    }
}

/// Progress of a pattern or waveform generator.
#[derive(Debug, Clone, Copy)]
struct Generator {
    state: InstrumentState,
    waiting_since: f64,
    running_since: f64,
    pulses_seen: u64,
    repeats: u32,
}

struct GeneratorPace {
    has_source: bool,
    fired: bool,
    wait: f64,
    run: f64,
    repeat: u32,
    repeat_trigger: bool,
}

impl Generator {
    fn new() -> Generator {
        Generator {
            state: InstrumentState::Ready,
            waiting_since: 0.0,
            running_since: 0.0,
            pulses_seen: 0,
            repeats: 0,
        }
    }

    fn configure(&mut self, now: f64, pulses: u64, start: bool) {
        if start {
            self.state = InstrumentState::Armed;
            self.waiting_since = now;
            self.pulses_seen = pulses;
            self.repeats = 0;
        } else {
            self.state = InstrumentState::Ready;
        }
    }

    fn step(&mut self, now: f64, pulses: u64, pace: &GeneratorPace) {
        match self.state {
            InstrumentState::Armed => {
                if pace.has_source || pace.wait > 0.0 {
                    self.state = InstrumentState::Wait;
                    self.waiting_since = now;
                } else {
                    self.state = InstrumentState::Running;
                    self.running_since = now;
                }
            }
            InstrumentState::Wait => {
                let fired = pace.fired || !pace.has_source;
                if fired && now - self.waiting_since >= pace.wait - 1e-12 {
                    self.state = InstrumentState::Running;
                    self.running_since = now;
                }
            }
            InstrumentState::Running | InstrumentState::Triggered => {
                if pace.run > 0.0 && now - self.running_since >= pace.run - 1e-12 {
                    self.repeats += 1;
                    if pace.repeat != 0 && self.repeats >= pace.repeat {
                        self.state = InstrumentState::Done;
                    } else if pace.repeat_trigger && pace.has_source {
                        self.state = InstrumentState::Wait;
                        self.waiting_since = now;
                        self.pulses_seen = pulses;
                    } else {
                        self.running_since = now;
                    }
                }
            }
            _ => (),
        }
    }

    fn run_status(&self, now: f64, run: f64) -> f64 {
        if self.state.is_running() && run > 0.0 {
            (run - (now - self.running_since)).max(0.0)
        } else {
            0.0
        }
    }

    fn repeat_status(&self, repeat: u32) -> u32 {
        repeat.saturating_sub(self.repeats)
    }
}

/// Factory default value of every stored parameter.
fn defaults(device: &SimDevice, config: &SimConfig) -> HashMap<Key, Value> {
    let mut params = HashMap::new();
    let mut put = |key: Key, value: Value| { params.insert(key, value); };

    put(Key::new(Param::DeviceEnable), Value::Bool(true));
    for pin in 0..device.trigger_pins() {
        put(Key::channel(Param::DeviceTrigger, pin), Value::Int(TriggerSource::None.to_wire()));
    }

    put(Key::new(Param::AnalogInRecordLength), Value::Float(0.0));
    put(Key::new(Param::AnalogInFrequency), Value::Float(1e6));
    put(Key::new(Param::AnalogInBufferSize), Value::Int(config.analog_in_buffer as i32));
    put(Key::new(Param::AnalogInAcquisitionMode), Value::Int(AcquisitionMode::Single.to_wire()));
    for channel in 0..config.analog_in_channels {
        put(Key::channel(Param::AnalogInChannelEnable, channel), Value::Bool(true));
        put(Key::channel(Param::AnalogInChannelFilter, channel), Value::Int(Filter::Decimate.to_wire()));
        put(Key::channel(Param::AnalogInChannelRange, channel), Value::Float(ANALOG_IN_RANGES[0]));
        put(Key::channel(Param::AnalogInChannelOffset, channel), Value::Float(0.0));
        put(Key::channel(Param::AnalogInChannelAttenuation, channel), Value::Float(1.0));
    }
    put(Key::new(Param::AnalogInTriggerSource), Value::Int(TriggerSource::None.to_wire()));
    put(Key::new(Param::AnalogInTriggerPosition), Value::Float(0.0));
    put(Key::new(Param::AnalogInTriggerAutoTimeout), Value::Float(0.0));
    put(Key::new(Param::AnalogInTriggerHoldOff), Value::Float(0.0));
    put(Key::new(Param::AnalogInTriggerType), Value::Int(TriggerType::Edge.to_wire()));
    put(Key::new(Param::AnalogInTriggerChannel), Value::Int(0));
    put(Key::new(Param::AnalogInTriggerFilter), Value::Int(Filter::Decimate.to_wire()));
    put(Key::new(Param::AnalogInTriggerLevel), Value::Float(0.0));
    put(Key::new(Param::AnalogInTriggerHysteresis), Value::Float(0.01));
    put(Key::new(Param::AnalogInTriggerCondition),
        Value::Int(TriggerCondition::RisingPositive.to_wire()));
    put(Key::new(Param::AnalogInTriggerLength), Value::Float(0.0));
    put(Key::new(Param::AnalogInTriggerLengthCondition), Value::Int(TriggerLength::Less.to_wire()));

    for channel in 0..config.analog_out_channels {
        put(Key::channel(Param::AnalogOutMaster, channel), Value::Int(channel as i32));
        put(Key::channel(Param::AnalogOutTriggerSource, channel), Value::Int(TriggerSource::None.to_wire()));
        put(Key::channel(Param::AnalogOutRun, channel), Value::Float(0.0));
        put(Key::channel(Param::AnalogOutWait, channel), Value::Float(0.0));
        put(Key::channel(Param::AnalogOutRepeat, channel), Value::Int(0));
        put(Key::channel(Param::AnalogOutRepeatTrigger, channel), Value::Bool(false));
        put(Key::channel(Param::AnalogOutLimitation, channel), Value::Float(0.0));
        put(Key::channel(Param::AnalogOutMode, channel), Value::Int(AnalogOutMode::Voltage.to_wire()));
        put(Key::channel(Param::AnalogOutIdle, channel), Value::Int(AnalogOutIdle::Offset.to_wire()));
        put(Key::channel(Param::AnalogOutCustomAmFm, channel), Value::Bool(false));
        for node in AnalogOutNode::all() {
            let carrier = node == AnalogOutNode::Carrier;
            let node = node.to_wire() as usize;
            put(Key::node(Param::AnalogOutNodeEnable, channel, node), Value::Bool(carrier));
            put(Key::node(Param::AnalogOutNodeFunction, channel, node), Value::Int(Function::Sine.to_wire()));
            put(Key::node(Param::AnalogOutNodeFrequency, channel, node), Value::Float(1e3));
            put(Key::node(Param::AnalogOutNodeAmplitude, channel, node),
                Value::Float(if carrier { 1.0 } else { 0.0 }));
            put(Key::node(Param::AnalogOutNodeOffset, channel, node), Value::Float(0.0));
            put(Key::node(Param::AnalogOutNodeSymmetry, channel, node), Value::Float(50.0));
            put(Key::node(Param::AnalogOutNodePhase, channel, node), Value::Float(0.0));
        }
    }

    put(Key::new(Param::AnalogIoEnable), Value::Bool(false));
    for (channel, layout) in ANALOG_IO_LAYOUT.iter().enumerate().take(config.analog_io_channels) {
        for node in 0..layout.nodes.len() {
            put(Key::node(Param::AnalogIoNode, channel, node), Value::Float(0.0));
        }
    }

    put(Key::new(Param::DigitalIoOutputEnable), Value::Uint(0));
    put(Key::new(Param::DigitalIoOutput), Value::Uint(0));

    put(Key::new(Param::DigitalInClockSource), Value::Int(ClockSource::Internal.to_wire()));
    put(Key::new(Param::DigitalInDivider), Value::Uint(1));
    let format = if config.digital_in_channels > 16 { 32 } else { 16 };
    put(Key::new(Param::DigitalInSampleFormat), Value::Int(format));
    put(Key::new(Param::DigitalInBufferSize), Value::Int(config.digital_in_buffer as i32));
    put(Key::new(Param::DigitalInSampleMode), Value::Int(SampleMode::Simple.to_wire()));
    put(Key::new(Param::DigitalInAcquisitionMode), Value::Int(AcquisitionMode::Single.to_wire()));
    put(Key::new(Param::DigitalInTriggerSource), Value::Int(TriggerSource::None.to_wire()));
    put(Key::new(Param::DigitalInTriggerPosition), Value::Uint(0));
    put(Key::new(Param::DigitalInTriggerAutoTimeout), Value::Float(0.0));
    put(Key::new(Param::DigitalInTrigger), Value::Masks([0; 4]));

    put(Key::new(Param::DigitalOutTriggerSource), Value::Int(TriggerSource::None.to_wire()));
    put(Key::new(Param::DigitalOutRun), Value::Float(0.0));
    put(Key::new(Param::DigitalOutWait), Value::Float(0.0));
    put(Key::new(Param::DigitalOutRepeat), Value::Uint(0));
    put(Key::new(Param::DigitalOutRepeatTrigger), Value::Bool(false));
    for channel in 0..config.digital_out_channels {
        put(Key::channel(Param::DigitalOutEnable, channel), Value::Bool(false));
        put(Key::channel(Param::DigitalOutOutput, channel), Value::Int(OutputMode::PushPull.to_wire()));
        put(Key::channel(Param::DigitalOutType, channel), Value::Int(PatternType::Pulse.to_wire()));
        put(Key::channel(Param::DigitalOutIdle, channel), Value::Int(DigitalOutIdle::Init.to_wire()));
        put(Key::channel(Param::DigitalOutDivider, channel), Value::Uint(1));
        put(Key::channel(Param::DigitalOutDividerInit, channel), Value::Uint(0));
        put(Key::channel(Param::DigitalOutCounter, channel), Value::Pair(0, 0));
        put(Key::channel(Param::DigitalOutCounterInit, channel), Value::Flagged(false, 0));
    }

    params
}

/// State of an open device.
struct Unit {
    device: SimDevice,
    config: SimConfig,
    params: HashMap<Key, Value>,
    time: f64,
    pc_pulses: u64,
    analog_in: Acquisition,
    digital_in: Acquisition,
    analog_out: Vec<Generator>,
    digital_out: Generator,
    analog_in_latch: Vec<Vec<f64>>,
    digital_in_latch: Vec<u8>,
    node_data: HashMap<(usize, usize), Vec<f64>>,
    play_queue: HashMap<(usize, usize), usize>,
    pattern_data: HashMap<usize, (Vec<u8>, usize)>,
}

impl Unit {
    fn new(device: SimDevice, config: SimConfig) -> Unit {
        let params = defaults(&device, &config);
        Unit {
            params,
            time: 0.0,
            pc_pulses: 0,
            analog_in: Acquisition::new(),
            digital_in: Acquisition::new(),
            analog_out: vec![Generator::new(); config.analog_out_channels],
            digital_out: Generator::new(),
            analog_in_latch: vec![Vec::new(); config.analog_in_channels],
            digital_in_latch: Vec::new(),
            node_data: HashMap::new(),
            play_queue: HashMap::new(),
            pattern_data: HashMap::new(),
            device,
            config,
        }
    }

    fn value(&self, key: Key) -> Option<Value> {
        self.params.get(&key).copied()
    }

    fn float(&self, key: Key) -> f64 {
        self.value(key).and_then(Value::as_float).unwrap_or(0.0)
    }

    fn int(&self, key: Key) -> i32 {
        self.value(key).and_then(Value::as_int).unwrap_or(0)
    }

    fn uint(&self, key: Key) -> u32 {
        self.value(key).and_then(Value::as_uint).unwrap_or(0)
    }

    fn flag(&self, key: Key) -> bool {
        self.value(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn decode<E: WireEnum>(&self, key: Key, default: E) -> E {
        E::from_wire(self.int(key)).unwrap_or(default)
    }

    fn source(&self, key: Key) -> TriggerSource {
        self.decode(key, TriggerSource::None)
    }

    fn channel_count(&self, instrument: Instrument) -> usize {
        match instrument {
            Instrument::Device     => self.device.trigger_pins(),
            Instrument::AnalogIn   => self.config.analog_in_channels,
            Instrument::AnalogOut  => self.config.analog_out_channels,
            Instrument::AnalogIo   => self.config.analog_io_channels.min(ANALOG_IO_LAYOUT.len()),
            Instrument::DigitalIn  => self.config.digital_in_channels,
            Instrument::DigitalOut => self.config.digital_out_channels,
            Instrument::DigitalIo  => self.config.digital_io_channels,
        }
    }

    fn channel_of(&self, key: Key) -> Result<usize, DriverError> {
        let channel = key.channel.ok_or_else(|| invalid("missing channel index"))?;
        if channel >= self.channel_count(key.param.instrument()) {
            return Err(invalid(format!("channel {} out of range", channel)))
        }
        Ok(channel)
    }

    fn io_node(&self, key: Key) -> Result<&'static IoNode, DriverError> {
        let channel = self.channel_of(key)?;
        let node = key.node.ok_or_else(|| invalid("missing node index"))?;
        ANALOG_IO_LAYOUT[channel].nodes.get(node)
            .ok_or_else(|| invalid(format!("node {} out of range", node)))
    }

    fn is_active(&self, source: TriggerSource, pulses_seen: u64, depth: usize) -> bool {
        let armed = |state: InstrumentState|
            matches!(state, InstrumentState::Wait) || state.is_running();
        match source {
            TriggerSource::None => true,
            TriggerSource::Pc => self.pc_pulses > pulses_seen,
            TriggerSource::DetectorAnalogIn => armed(self.analog_in.state),
            TriggerSource::DetectorDigitalIn => armed(self.digital_in.state),
            TriggerSource::AnalogIn => self.analog_in.state.is_running(),
            TriggerSource::DigitalIn => self.digital_in.state.is_running(),
            TriggerSource::DigitalOut => self.digital_out.state.is_running(),
            TriggerSource::AnalogOut1 | TriggerSource::AnalogOut2 |
            TriggerSource::AnalogOut3 | TriggerSource::AnalogOut4 => {
                source.analog_out_channel()
                    .and_then(|channel| self.analog_out.get(channel))
                    .map_or(false, |generator| generator.state.is_running())
            }
            TriggerSource::External1 | TriggerSource::External2 |
            TriggerSource::External3 | TriggerSource::External4 => {
                let Some(pin) = source.external_pin() else { return false };
                let bound = self.source(Key::channel(Param::DeviceTrigger, pin));
                depth > 0 && bound != TriggerSource::None &&
                    self.is_active(bound, pulses_seen, depth - 1)
            }
        }
    }

    fn generator_pace(&self, source: TriggerSource, pulses_seen: u64,
                      wait: f64, run: f64, repeat: u32, repeat_trigger: bool) -> GeneratorPace {
        GeneratorPace {
            has_source: source != TriggerSource::None,
            fired: source != TriggerSource::None && self.is_active(source, pulses_seen, 1),
            wait, run, repeat, repeat_trigger,
        }
    }

    fn analog_in_pace(&self) -> AcquisitionPace {
        let source = self.source(Key::new(Param::AnalogInTriggerSource));
        let frequency = self.float(Key::new(Param::AnalogInFrequency));
        let mode = self.decode(Key::new(Param::AnalogInAcquisitionMode), AcquisitionMode::Single);
        AcquisitionPace {
            has_source: source != TriggerSource::None,
            fired: self.is_active(source, self.analog_in.pulses_seen, 1),
            timeout: self.float(Key::new(Param::AnalogInTriggerAutoTimeout)),
            per_poll: ((frequency * POLL_PERIOD).round() as usize).max(1),
            buffer: self.analog_in_buffer(),
            mode,
            record_total: self.analog_in_record_total(),
        }
    }

    fn analog_in_buffer(&self) -> usize {
        self.int(Key::new(Param::AnalogInBufferSize)).max(1) as usize
    }

    fn analog_in_record_total(&self) -> Option<usize> {
        let length = self.float(Key::new(Param::AnalogInRecordLength));
        let frequency = self.float(Key::new(Param::AnalogInFrequency));
        (length > 0.0).then(|| (length * frequency).round() as usize)
    }

    fn digital_in_rate(&self) -> f64 {
        INTERNAL_CLOCK / self.uint(Key::new(Param::DigitalInDivider)).max(1) as f64
    }

    fn digital_in_buffer(&self) -> usize {
        self.int(Key::new(Param::DigitalInBufferSize)).max(1) as usize
    }

    fn digital_in_pace(&self) -> AcquisitionPace {
        let source = self.source(Key::new(Param::DigitalInTriggerSource));
        AcquisitionPace {
            has_source: source != TriggerSource::None,
            fired: self.is_active(source, self.digital_in.pulses_seen, 1),
            timeout: self.float(Key::new(Param::DigitalInTriggerAutoTimeout)),
            per_poll: ((self.digital_in_rate() * POLL_PERIOD).round() as usize).max(1),
            buffer: self.digital_in_buffer(),
            mode: self.decode(Key::new(Param::DigitalInAcquisitionMode), AcquisitionMode::Single),
            record_total: None,
        }
    }

    /// Advances the whole device by one poll period.
    fn tick(&mut self) {
        self.time += POLL_PERIOD;
        let now = self.time;
        let pulses = self.pc_pulses;

        for channel in 0..self.analog_out.len() {
            let pace = self.generator_pace(
                self.source(Key::channel(Param::AnalogOutTriggerSource, channel)),
                self.analog_out[channel].pulses_seen,
                self.float(Key::channel(Param::AnalogOutWait, channel)),
                self.float(Key::channel(Param::AnalogOutRun, channel)),
                self.int(Key::channel(Param::AnalogOutRepeat, channel)).max(0) as u32,
                self.flag(Key::channel(Param::AnalogOutRepeatTrigger, channel)));
            self.analog_out[channel].step(now, pulses, &pace);
            if self.analog_out[channel].state.is_running() {
                self.drain_play_queue(channel);
            }
        }

        let pace = self.generator_pace(
            self.source(Key::new(Param::DigitalOutTriggerSource)),
            self.digital_out.pulses_seen,
            self.float(Key::new(Param::DigitalOutWait)),
            self.float(Key::new(Param::DigitalOutRun)),
            self.uint(Key::new(Param::DigitalOutRepeat)),
            self.flag(Key::new(Param::DigitalOutRepeatTrigger)));
        self.digital_out.step(now, pulses, &pace);

        let pace = self.analog_in_pace();
        self.analog_in.step(now, &pace);
        let pace = self.digital_in_pace();
        self.digital_in.step(now, &pace);
    }

    fn drain_play_queue(&mut self, channel: usize) {
        let frequency = self.float(Key::node(Param::AnalogOutNodeFrequency, channel, 0));
        let per_poll = (frequency * POLL_PERIOD).round() as usize;
        for (&(queue_channel, _), queued) in self.play_queue.iter_mut() {
            if queue_channel == channel {
                *queued = queued.saturating_sub(per_poll);
            }
        }
    }

    fn shape(&self, channel: usize, node: usize, function: Function, cycle: f64) -> f64 {
        let phase = cycle.rem_euclid(1.0);
        let symmetry = (self.float(Key::node(Param::AnalogOutNodeSymmetry, channel, node)) / 100.0)
            .clamp(0.0, 1.0);
        match function {
            Function::Dc => 0.0,
            Function::Sine => (2.0 * std::f64::consts::PI * phase).sin(),
            Function::Square => if phase < symmetry { 1.0 } else { -1.0 },
            Function::Triangle => {
                if symmetry <= 0.0 {
                    1.0 - 2.0 * phase
                } else if phase < symmetry {
                    -1.0 + 2.0 * phase / symmetry
                } else if symmetry >= 1.0 {
                    1.0
                } else {
                    1.0 - 2.0 * (phase - symmetry) / (1.0 - symmetry)
                }
            }
            Function::RampUp => -1.0 + 2.0 * phase,
            Function::RampDown => 1.0 - 2.0 * phase,
            Function::Noise => ((cycle * 12.9898).sin() * 43758.5453).fract(),
            Function::Custom | Function::Play => {
                match self.node_data.get(&(channel, node)) {
                    Some(data) if !data.is_empty() => {
                        let index = ((phase * data.len() as f64) as usize).min(data.len() - 1);
                        data[index]
                    }
                    _ => 0.0,
                }
            }
        }
    }

    /// Voltage on analog output `channel` at simulated time `at`.
    fn analog_out_level(&self, channel: usize, at: f64) -> f64 {
        let Some(generator) = self.analog_out.get(channel) else { return 0.0 };
        let carrier = AnalogOutNode::Carrier.to_wire() as usize;
        let key = |param| Key::node(param, channel, carrier);
        let function = self.decode(key(Param::AnalogOutNodeFunction), Function::Sine);
        let amplitude = self.float(key(Param::AnalogOutNodeAmplitude));
        let offset = self.float(key(Param::AnalogOutNodeOffset));
        let phase = self.float(key(Param::AnalogOutNodePhase)) / 360.0;
        if generator.state.is_running() && self.flag(key(Param::AnalogOutNodeEnable)) {
            let cycle = self.float(key(Param::AnalogOutNodeFrequency)) *
                (at - generator.running_since) + phase;
            offset + amplitude * self.shape(channel, carrier, function, cycle)
        } else {
            match self.decode(Key::channel(Param::AnalogOutIdle, channel), AnalogOutIdle::Offset) {
                AnalogOutIdle::Disable => 0.0,
                AnalogOutIdle::Offset => offset,
                AnalogOutIdle::Initial => offset + amplitude * self.shape(channel, carrier, function, phase),
            }
        }
    }

    fn analog_in_level(&self, channel: usize, at: f64) -> f64 {
        if !self.flag(Key::channel(Param::AnalogInChannelEnable, channel)) {
            return 0.0
        }
        let range = self.float(Key::channel(Param::AnalogInChannelRange, channel));
        let offset = self.float(Key::channel(Param::AnalogInChannelOffset, channel));
        self.analog_out_level(channel, at).clamp(offset - range / 2.0, offset + range / 2.0)
    }

    fn digital_io_pins(&self) -> u32 {
        self.uint(Key::new(Param::DigitalIoOutput)) &
            self.uint(Key::new(Param::DigitalIoOutputEnable))
    }

    fn digital_in_width(&self) -> SampleWidth {
        SampleWidth::try_from(self.int(Key::new(Param::DigitalInSampleFormat)) as u32)
            .unwrap_or(SampleWidth::Bits16)
    }

    fn latch_analog_in(&mut self) {
        let mode = self.decode(Key::new(Param::AnalogInAcquisitionMode), AcquisitionMode::Single);
        let buffer = self.analog_in_buffer();
        let record_total = self.analog_in_record_total();
        let indices = self.analog_in.latch(mode, buffer, record_total);
        let frequency = self.float(Key::new(Param::AnalogInFrequency)).max(f64::MIN_POSITIVE);
        let start = self.analog_in.triggered_at;
        self.analog_in_latch = (0..self.config.analog_in_channels)
            .map(|channel| {
                indices.iter()
                    .map(|&index| self.analog_in_level(channel, start + index as f64 / frequency))
                    .collect()
            })
            .collect();
    }

    fn latch_digital_in(&mut self) {
        let mode = self.decode(Key::new(Param::DigitalInAcquisitionMode), AcquisitionMode::Single);
        let buffer = self.digital_in_buffer();
        let indices = self.digital_in.latch(mode, buffer, None);
        let width = self.digital_in_width();
        let pins = self.digital_io_pins();
        let samples: Vec<u32> = indices.iter()
            .map(|&index| (index as u32 | pins) & width.mask())
            .collect();
        self.digital_in_latch = codec::encode(&samples, width);
    }

    fn analog_io_status(&self, key: Key) -> Result<f64, DriverError> {
        let node = self.io_node(key)?;
        let channel = self.channel_of(key)?;
        let master = self.flag(Key::new(Param::AnalogIoEnable));
        let node_index = key.node.ok_or_else(|| invalid("missing node index"))?;
        let stored = self.float(Key::node(Param::AnalogIoNode, channel, node_index));
        let supplies_on = (0..self.channel_count(Instrument::AnalogIo))
            .filter(|&ch| ANALOG_IO_LAYOUT[ch].nodes[0].kind == AnalogIoType::Enable)
            .filter(|&ch| master && self.float(Key::node(Param::AnalogIoNode, ch, 0)) > 0.5)
            .count();
        Ok(match (node.kind, node.set) {
            (AnalogIoType::Enable, _) => stored,
            (_, Some(_)) => {
                let enabled = master &&
                    self.float(Key::node(Param::AnalogIoNode, channel, 0)) > 0.5;
                if enabled { stored } else { 0.0 }
            }
            (AnalogIoType::Voltage, None) if channel == 2 => 5.0,
            (AnalogIoType::Current, None) => 0.1 + 0.05 * supplies_on as f64,
            (AnalogIoType::Temperature, None) => 40.0,
            _ => 0.0,
        })
    }

    fn trigger_source_mask(&self, instrument: Instrument) -> u32 {
        TriggerSource::all()
            .filter(|source| {
                if let Some(channel) = source.analog_out_channel() {
                    instrument != Instrument::AnalogOut &&
                        channel < self.config.analog_out_channels
                } else if let Some(pin) = source.external_pin() {
                    instrument != Instrument::Device && pin < self.device.trigger_pins()
                } else {
                    !(instrument == Instrument::DigitalOut && *source == TriggerSource::DigitalOut)
                }
            })
            .fold(0, |mask, source| mask | 1 << source.to_wire())
    }

    /// Capability of a parameter.
    fn info(&self, key: Key) -> Result<Info, DriverError> {
        match key.param.scope() {
            Scope::Channel | Scope::Pin | Scope::Node => { self.channel_of(key)?; }
            Scope::Instrument => (),
        }
        type Answer = Result<Info, DriverError>;
        let all = |mask: u32| -> Answer { Ok(Info::Mask(mask)) };
        let range = |min: f64, max: f64| -> Answer { Ok(Info::Range { min, max }) };
        let steps = |min: f64, max: f64, steps: f64| -> Answer {
            Ok(Info::Steps(StepRange { min, max, steps }))
        };
        let limit = |max: usize| -> Answer { Ok(Info::Limit(max as f64)) };
        let is_carrier = key.node == Some(AnalogOutNode::Carrier.to_wire() as usize);
        match key.param {
            Param::DeviceTrigger => all(self.trigger_source_mask(Instrument::Device)),

            Param::AnalogInFrequency => range(1.0, INTERNAL_CLOCK),
            Param::AnalogInBits => limit(ANALOG_IN_BITS as usize),
            Param::AnalogInBufferSize => range(16.0, self.config.analog_in_buffer as f64),
            Param::AnalogInNoiseSize => limit(self.config.analog_in_buffer / 8),
            Param::AnalogInAcquisitionMode => all(mask_of(AcquisitionMode::all())),
            Param::AnalogInChannelFilter | Param::AnalogInTriggerFilter => all(mask_of(Filter::all())),
            Param::AnalogInChannelRange =>
                steps(ANALOG_IN_RANGES[0], ANALOG_IN_RANGES[ANALOG_IN_RANGES.len() - 1],
                      ANALOG_IN_RANGES.len() as f64),
            Param::AnalogInChannelOffset | Param::AnalogInTriggerLevel => steps(-25.0, 25.0, 1024.0),
            Param::AnalogInTriggerSource => all(self.trigger_source_mask(Instrument::AnalogIn)),
            Param::AnalogInTriggerPosition => steps(-10.0, 10.0, 65536.0),
            Param::AnalogInTriggerAutoTimeout | Param::AnalogInTriggerHoldOff =>
                steps(0.0, 10.0, 1000.0),
            Param::AnalogInTriggerType => all(mask_of(TriggerType::all())),
            Param::AnalogInTriggerChannel => range(0.0, self.config.analog_in_channels as f64 - 1.0),
            Param::AnalogInTriggerHysteresis => steps(0.0, 5.0, 512.0),
            Param::AnalogInTriggerCondition => all(mask_of(TriggerCondition::all())),
            Param::AnalogInTriggerLength => steps(0.0, 1.0, 1e6),
            Param::AnalogInTriggerLengthCondition => all(mask_of(TriggerLength::all())),

            Param::AnalogOutTriggerSource => all(self.trigger_source_mask(Instrument::AnalogOut)),
            Param::AnalogOutRun | Param::AnalogOutWait => range(0.0, 1e4),
            Param::AnalogOutRepeat => range(0.0, 65535.0),
            Param::AnalogOutLimitation => match self.device.kind {
                DeviceKind::EExplorer if key.channel >= Some(2) => range(0.0, 5.0),
                _ => range(0.0, 0.0),
            },
            Param::AnalogOutIdle => all(mask_of(AnalogOutIdle::all())),
            Param::AnalogOutNodes => all(mask_of(AnalogOutNode::all())),
            Param::AnalogOutNodeFunction if is_carrier => all(mask_of(Function::all())),
            Param::AnalogOutNodeFunction =>
                all(mask_of(Function::all().filter(|&function| function != Function::Play))),
            Param::AnalogOutNodeFrequency => range(0.0, 20e6),
            Param::AnalogOutNodeAmplitude if is_carrier => range(-5.0, 5.0),
            Param::AnalogOutNodeAmplitude => range(0.0, 100.0),
            Param::AnalogOutNodeOffset => range(-5.0, 5.0),
            Param::AnalogOutNodeSymmetry => range(0.0, 100.0),
            Param::AnalogOutNodePhase => range(0.0, 360.0),
            Param::AnalogOutNodeData => range(1.0, self.config.analog_out_buffer as f64),

            Param::AnalogIoEnable => Ok(Info::Support { set: true, status: true }),
            Param::AnalogIoNode => match self.io_node(key)?.set {
                Some((min, max)) => steps(min, max, 256.0),
                None => Err(unsupported("node is read-only")),
            },
            Param::AnalogIoNodeStatus => {
                let (min, max) = self.io_node(key)?.status;
                steps(min, max, 4096.0)
            }

            Param::DigitalIoOutputEnable | Param::DigitalIoOutput | Param::DigitalIoInput =>
                Ok(Info::Limit(line_mask(self.config.digital_io_channels) as f64)),

            Param::DigitalInInternalClock => limit(INTERNAL_CLOCK as usize),
            Param::DigitalInClockSource => all(mask_of(ClockSource::all())),
            Param::DigitalInDivider => limit(1 << 30),
            Param::DigitalInBits => limit(self.config.digital_in_channels),
            Param::DigitalInBufferSize => limit(self.config.digital_in_buffer),
            Param::DigitalInSampleMode => all(mask_of(SampleMode::all())),
            Param::DigitalInAcquisitionMode => all(mask_of(AcquisitionMode::all())),
            Param::DigitalInTriggerSource => all(self.trigger_source_mask(Instrument::DigitalIn)),
            Param::DigitalInTriggerPosition => limit(self.config.digital_in_buffer),
            Param::DigitalInTriggerAutoTimeout => steps(0.0, 10.0, 1000.0),
            Param::DigitalInTrigger => Ok(Info::Masks([line_mask(self.config.digital_in_channels); 4])),

            Param::DigitalOutInternalClock => limit(INTERNAL_CLOCK as usize),
            Param::DigitalOutTriggerSource => all(self.trigger_source_mask(Instrument::DigitalOut)),
            Param::DigitalOutRun | Param::DigitalOutWait => range(0.0, 1e4),
            Param::DigitalOutRepeat => range(0.0, (1u32 << 30) as f64),
            Param::DigitalOutOutput => all(mask_of(OutputMode::all())),
            Param::DigitalOutType => all(mask_of(PatternType::all())),
            Param::DigitalOutIdle => all(mask_of(DigitalOutIdle::all())),
            Param::DigitalOutDivider => range(1.0, (1u32 << 30) as f64),
            Param::DigitalOutCounter => range(0.0, (1u32 << 15) as f64),
            Param::DigitalOutData => limit(self.config.digital_out_buffer),

            _ => Err(unsupported(format!("{:?} has no capability query", key.param))),
        }
    }

    /// Current value of a parameter, computing the read-only ones.
    fn get(&self, key: Key) -> Result<Value, DriverError> {
        let latch = |acquisition: &Acquisition| acquisition.latch;
        let now = self.time;
        Ok(match key.param {
            Param::AnalogInChannelCount => Value::Int(self.config.analog_in_channels as i32),
            Param::AnalogInSamplesLeft => Value::Int(latch(&self.analog_in).left),
            Param::AnalogInSamplesValid => Value::Int(latch(&self.analog_in).valid),
            Param::AnalogInIndexWrite => Value::Int(latch(&self.analog_in).index_write),
            Param::AnalogInAutoTriggered => Value::Bool(latch(&self.analog_in).auto_triggered),
            Param::AnalogInRecordStatus => {
                let latch = latch(&self.analog_in);
                Value::Counts(latch.available, latch.lost, latch.corrupt)
            }
            Param::AnalogInSample => {
                let channel = self.channel_of(key)?;
                Value::Float(self.analog_in_latch[channel].last().copied()
                    .unwrap_or_else(|| self.analog_in_level(channel, now)))
            }
            Param::AnalogInBits => Value::Int(ANALOG_IN_BITS),
            Param::AnalogInNoiseSize => Value::Int((self.analog_in_buffer() / 8) as i32),
            Param::AnalogInTriggerPositionStatus =>
                Value::Float(self.float(Key::new(Param::AnalogInTriggerPosition))),

            Param::AnalogOutChannelCount => Value::Int(self.config.analog_out_channels as i32),
            Param::AnalogOutRunStatus => {
                let channel = self.channel_of(key)?;
                let run = self.float(Key::channel(Param::AnalogOutRun, channel));
                Value::Float(self.analog_out[channel].run_status(now, run))
            }
            Param::AnalogOutRepeatStatus => {
                let channel = self.channel_of(key)?;
                let repeat = self.int(Key::channel(Param::AnalogOutRepeat, channel)).max(0) as u32;
                Value::Int(self.analog_out[channel].repeat_status(repeat) as i32)
            }
            Param::AnalogOutNodePlayStatus => {
                let channel = self.channel_of(key)?;
                let node = key.node.ok_or_else(|| invalid("missing node index"))?;
                let queued = self.play_queue.get(&(channel, node)).copied().unwrap_or(0);
                let free = self.config.analog_out_buffer.saturating_sub(queued);
                Value::Counts(free as i32, 0, 0)
            }

            Param::AnalogIoEnableStatus => Value::Bool(self.flag(Key::new(Param::AnalogIoEnable))),
            Param::AnalogIoChannelCount =>
                Value::Int(self.channel_count(Instrument::AnalogIo) as i32),
            Param::AnalogIoChannelNodes =>
                Value::Int(ANALOG_IO_LAYOUT[self.channel_of(key)?].nodes.len() as i32),
            Param::AnalogIoNodeType => Value::Int(self.io_node(key)?.kind.to_wire()),
            Param::AnalogIoNodeStatus => Value::Float(self.analog_io_status(key)?),

            Param::DigitalIoInput => Value::Uint(self.digital_io_pins()),

            Param::DigitalInSamplesLeft => Value::Int(latch(&self.digital_in).left),
            Param::DigitalInSamplesValid => Value::Int(latch(&self.digital_in).valid),
            Param::DigitalInIndexWrite => Value::Int(latch(&self.digital_in).index_write),
            Param::DigitalInAutoTriggered => Value::Bool(latch(&self.digital_in).auto_triggered),
            Param::DigitalInRecordStatus => {
                let latch = latch(&self.digital_in);
                Value::Counts(latch.available, latch.lost, latch.corrupt)
            }
            Param::DigitalInInternalClock => Value::Float(INTERNAL_CLOCK),
            Param::DigitalInBits => Value::Int(self.config.digital_in_channels as i32),

            Param::DigitalOutInternalClock => Value::Float(INTERNAL_CLOCK),
            Param::DigitalOutRunStatus => {
                let run = self.float(Key::new(Param::DigitalOutRun));
                Value::Float(self.digital_out.run_status(now, run))
            }
            Param::DigitalOutRepeatStatus => {
                let repeat = self.uint(Key::new(Param::DigitalOutRepeat));
                Value::Uint(self.digital_out.repeat_status(repeat))
            }
            Param::DigitalOutChannelCount => Value::Int(self.config.digital_out_channels as i32),

            _ => self.value(key).ok_or_else(|| invalid(format!("no parameter {:?}", key)))?,
        })
    }

    fn set(&mut self, key: Key, value: Value) -> Result<(), DriverError> {
        let current = self.value(key)
            .ok_or_else(|| invalid(format!("no settable parameter {:?}", key)))?;
        let value = value.coerce_to(&current)
            .ok_or_else(|| invalid(format!("{:?} does not fit {:?}", value, key.param)))?;
        let coerced = self.coerce(key, value)?;
        if coerced != value {
            log::debug!("sim: {:?} coerced from {:?} to {:?}", key, value, coerced);
        }
        self.params.insert(key, coerced);
        Ok(())
    }

    /// Fits a value into the advertised capability, the way the hardware does.
    fn coerce(&self, key: Key, value: Value) -> Result<Value, DriverError> {
        if key.param == Param::DigitalInSampleFormat {
            return match value.as_int() {
                Some(8 | 16 | 32) => Ok(value),
                _ => Err(invalid(format!("sample format {:?} not supported", value))),
            }
        }
        let info = match self.info(key) {
            Ok(info) => info,
            Err(DriverError { code: ERC_NOT_SUPPORTED, .. }) if key.param != Param::AnalogIoNode =>
                return Ok(value),
            Err(error) => return Err(error),
        };
        let clamp = |v: f64, min: f64, max: f64| v.max(min).min(max);
        Ok(match (info, value) {
            (Info::Mask(mask), Value::Int(code)) => {
                let supported = u32::try_from(code).ok()
                    .and_then(|bit| 1u32.checked_shl(bit))
                    .map_or(false, |bit| mask & bit != 0);
                if !supported {
                    return Err(unsupported(format!("{} not supported for {:?}", code, key.param)))
                }
                value
            }
            (Info::Range { min, max }, Value::Float(v)) => Value::Float(clamp(v, min, max)),
            (Info::Range { min, max }, Value::Int(v)) =>
                Value::Int(clamp(v as f64, min, max) as i32),
            (Info::Range { min, max }, Value::Uint(v)) =>
                Value::Uint(clamp(v as f64, min, max) as u32),
            (Info::Range { min, max }, Value::Pair(low, high)) =>
                Value::Pair(clamp(low as f64, min, max) as u32, clamp(high as f64, min, max) as u32),
            (Info::Steps(_), Value::Float(v)) if key.param == Param::AnalogInChannelRange => {
                let step = ANALOG_IN_RANGES.iter().copied().find(|&step| step >= v)
                    .unwrap_or(ANALOG_IN_RANGES[ANALOG_IN_RANGES.len() - 1]);
                Value::Float(step)
            }
            (Info::Steps(range), Value::Float(v)) => Value::Float(range.clamp(v)),
            (Info::Limit(mask), Value::Uint(v)) if key.param.instrument() == Instrument::DigitalIo =>
                Value::Uint(v & mask as u32),
            (Info::Limit(max), Value::Uint(v)) => Value::Uint(v.min(max as u32)),
            (Info::Limit(max), Value::Int(v)) => Value::Int(v.min(max as i32)),
            (Info::Masks(masks), Value::Masks(v)) =>
                Value::Masks([v[0] & masks[0], v[1] & masks[1], v[2] & masks[2], v[3] & masks[3]]),
            _ => value,
        })
    }

    fn reseed(&mut self, filter: impl Fn(&Key) -> bool) {
        for (key, value) in defaults(&self.device, &self.config) {
            if filter(&key) {
                self.params.insert(key, value);
            }
        }
    }

    fn reset(&mut self, target: Target) {
        let instrument = target.instrument;
        match instrument {
            Instrument::Device => {
                let (device, config) = (self.device.clone(), self.config);
                let (time, pulses) = (self.time, self.pc_pulses);
                *self = Unit::new(device, config);
                self.time = time;
                self.pc_pulses = pulses;
                return
            }
            Instrument::AnalogIn => {
                self.analog_in = Acquisition::new();
                self.analog_in_latch = vec![Vec::new(); self.config.analog_in_channels];
            }
            Instrument::DigitalIn => {
                self.digital_in = Acquisition::new();
                self.digital_in_latch.clear();
            }
            Instrument::AnalogOut => {
                for (channel, generator) in self.analog_out.iter_mut().enumerate() {
                    if target.channel.map_or(true, |only| only == channel) {
                        *generator = Generator::new();
                    }
                }
                self.node_data.retain(|&(channel, _), _|
                    target.channel.map_or(false, |only| only != channel));
                self.play_queue.retain(|&(channel, _), _|
                    target.channel.map_or(false, |only| only != channel));
            }
            Instrument::DigitalOut => {
                self.digital_out = Generator::new();
                self.pattern_data.clear();
            }
            Instrument::AnalogIo | Instrument::DigitalIo => (),
        }
        self.reseed(|key| {
            key.param.instrument() == instrument &&
                (target.channel.is_none() || key.channel == target.channel)
        });
    }

    fn configure(&mut self, target: Target, reconfigure: bool, start: bool)
            -> Result<(), DriverError> {
        let (now, pulses) = (self.time, self.pc_pulses);
        match target.instrument {
            Instrument::AnalogIn => self.analog_in.configure(now, pulses, reconfigure, start),
            Instrument::DigitalIn => self.digital_in.configure(now, pulses, reconfigure, start),
            Instrument::DigitalOut => self.digital_out.configure(now, pulses, start),
            Instrument::AnalogOut => {
                let count = self.config.analog_out_channels;
                if let Some(channel) = target.channel {
                    if channel >= count {
                        return Err(invalid(format!("channel {} out of range", channel)))
                    }
                }
                let followers: Vec<usize> = (0..count)
                    .filter(|&channel| match target.channel {
                        None => true,
                        Some(master) => channel == master ||
                            self.int(Key::channel(Param::AnalogOutMaster, channel)) == master as i32,
                    })
                    .collect();
                for channel in followers {
                    self.analog_out[channel].configure(now, pulses, start);
                }
            }
            Instrument::AnalogIo | Instrument::DigitalIo => (),
            Instrument::Device => return Err(unsupported("device has no configure step")),
        }
        Ok(())
    }

    fn status(&mut self, target: Target, read_data: bool) -> Result<InstrumentState, DriverError> {
        self.tick();
        Ok(match target.instrument {
            Instrument::AnalogIn => {
                if read_data {
                    self.latch_analog_in();
                }
                self.analog_in.state
            }
            Instrument::DigitalIn => {
                if read_data {
                    self.latch_digital_in();
                }
                self.digital_in.state
            }
            Instrument::AnalogOut => {
                let channel = target.channel.ok_or_else(|| invalid("missing channel index"))?;
                self.analog_out.get(channel)
                    .ok_or_else(|| invalid(format!("channel {} out of range", channel)))?
                    .state
            }
            Instrument::DigitalOut => self.digital_out.state,
            Instrument::AnalogIo | Instrument::DigitalIo => InstrumentState::Ready,
            Instrument::Device => return Err(unsupported("device has no status")),
        })
    }

    fn read_analog(&self, key: Key, data: &mut [f64]) -> Result<(), DriverError> {
        let channel = self.channel_of(key)?;
        let samples = &self.analog_in_latch[channel];
        match key.param {
            Param::AnalogInData => {
                if data.len() > self.analog_in_buffer() {
                    return Err(invalid("read exceeds buffer size"))
                }
                for (slot, sample) in data.iter_mut().zip(samples.iter().chain(std::iter::repeat(&0.0))) {
                    *slot = *sample;
                }
            }
            Param::AnalogInNoiseMin | Param::AnalogInNoiseMax => {
                if data.len() > self.analog_in_buffer() / 8 {
                    return Err(invalid("read exceeds noise buffer size"))
                }
                let minimum = key.param == Param::AnalogInNoiseMin;
                let mut groups = samples.chunks(8).map(|group| {
                    group.iter().copied().fold(if minimum { f64::MAX } else { f64::MIN },
                        |acc, sample| if minimum { acc.min(sample) } else { acc.max(sample) })
                });
                for slot in data.iter_mut() {
                    *slot = groups.next().unwrap_or(0.0);
                }
            }
            _ => return Err(unsupported(format!("{:?} is not readable as data", key.param))),
        }
        Ok(())
    }


    fn read_digital(&self, key: Key, data: &mut [u8]) -> Result<(), DriverError> {
        if key.param != Param::DigitalInData {
            return Err(unsupported(format!("{:?} is not readable as data", key.param)))
        }
        if data.len() > self.digital_in_buffer() * self.digital_in_width().bytes() {
            return Err(invalid("read exceeds buffer size"))
        }
        let copied = data.len().min(self.digital_in_latch.len());
        data[..copied].copy_from_slice(&self.digital_in_latch[..copied]);
        data[copied..].fill(0);
        Ok(())
    }

    fn write_analog(&mut self, key: Key, data: &[f64]) -> Result<(), DriverError> {
        let channel = self.channel_of(key)?;
        let node = key.node.ok_or_else(|| invalid("missing node index"))?;
        if AnalogOutNode::from_wire(node as i32).is_none() {
            return Err(invalid(format!("node {} out of range", node)))
        }
        let samples = data.iter().map(|sample| sample.clamp(-1.0, 1.0));
        match key.param {
            Param::AnalogOutNodeData => {
                if data.is_empty() || data.len() > self.config.analog_out_buffer {
                    return Err(invalid(format!("{} samples do not fit the buffer", data.len())))
                }
                self.node_data.insert((channel, node), samples.collect());
            }
            Param::AnalogOutNodePlayData => {
                let queued = self.play_queue.entry((channel, node)).or_insert(0);
                if *queued + data.len() > self.config.analog_out_buffer {
                    return Err(invalid("play buffer overflow"))
                }
                *queued += data.len();
                self.node_data.entry((channel, node)).or_default().extend(samples);
            }
            _ => return Err(unsupported(format!("{:?} is not writable as data", key.param))),
        }
        Ok(())
    }

    fn write_digital(&mut self, key: Key, data: &[u8], count: usize) -> Result<(), DriverError> {
        if key.param != Param::DigitalOutData {
            return Err(unsupported(format!("{:?} is not writable as data", key.param)))
        }
        let channel = self.channel_of(key)?;
        if count > self.config.digital_out_buffer || data.len() * 8 < count {
            return Err(invalid(format!("{} bits do not fit the buffer", count)))
        }
        self.pattern_data.insert(channel, (data[..count.div_ceil(8)].to_vec(), count));
        Ok(())
    }

    fn name(&self, key: Key) -> Result<(String, String), DriverError> {
        match key.param {
            Param::AnalogIoChannelName => {
                let channel = &ANALOG_IO_LAYOUT[self.channel_of(key)?];
                Ok((channel.name.to_owned(), channel.label.to_owned()))
            }
            Param::AnalogIoNodeName => {
                let node = self.io_node(key)?;
                Ok((node.name.to_owned(), node.units.to_owned()))
            }
            _ => Err(unsupported(format!("{:?} has no name", key.param))),
        }
    }
}

struct Slot {
    device: SimDevice,
    open: Option<(RawHandle, Unit)>,
}

struct Bench {
    slots: Vec<Slot>,
    /// Slot indices in the order of the last enumeration.
    listed: Vec<usize>,
    next_handle: RawHandle,
    calls: usize,
    closes: usize,
    faults: Vec<&'static str>,
}

impl Bench {
    fn enter(&mut self, operation: &'static str) -> Result<(), DriverError> {
        self.calls += 1;
        log::trace!("sim: {}", operation);
        if let Some(position) = self.faults.iter().position(|&fault| fault == operation) {
            self.faults.remove(position);
            return Err(DriverError::new(ERC_UNKNOWN, format!("injected failure in {}", operation)))
        }
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<&Slot, DriverError> {
        self.listed.get(index)
            .map(|&slot| &self.slots[slot])
            .ok_or_else(|| invalid(format!("no device at index {}", index)))
    }

    fn unit(&mut self, handle: RawHandle) -> Result<&mut Unit, DriverError> {
        self.slots.iter_mut()
            .filter_map(|slot| slot.open.as_mut())
            .find(|(open, _)| *open == handle)
            .map(|(_, unit)| unit)
            .ok_or_else(|| invalid(format!("invalid handle {}", handle)))
    }
}

/// The simulated transport.
pub struct SimDriver {
    bench: Mutex<Bench>,
}

impl SimDriver {
    pub fn new(devices: Vec<SimDevice>) -> SimDriver {
        let listed = (0..devices.len()).collect();
        let slots = devices.into_iter().map(|device| Slot { device, open: None }).collect();
        SimDriver {
            bench: Mutex::new(Bench {
                slots,
                listed,
                next_handle: 1,
                calls: 0,
                closes: 0,
                faults: Vec::new(),
            })
        }
    }

    /// Number of transport calls made so far.
    pub fn calls(&self) -> usize {
        self.bench.lock().calls
    }

    /// Number of successful `close` calls.
    pub fn closes(&self) -> usize {
        self.bench.lock().closes
    }

    /// Makes the next call of `operation` (a [`Driver`] method name) fail once.
    pub fn fail_next(&self, operation: &'static str) {
        self.bench.lock().faults.push(operation)
    }

    /// Whether the device at `slot` (its position in the constructor list) is open.
    pub fn is_open(&self, slot: usize) -> bool {
        self.bench.lock().slots.get(slot).map_or(false, |slot| slot.open.is_some())
    }

    fn with_unit<T>(&self, operation: &'static str, handle: RawHandle,
                    f: impl FnOnce(&mut Unit) -> Result<T, DriverError>) -> Result<T, DriverError> {
        let mut bench = self.bench.lock();
        bench.enter(operation)?;
        f(bench.unit(handle)?)
    }

    fn with_slot<T>(&self, operation: &'static str, index: usize,
                    f: impl FnOnce(&Slot) -> T) -> Result<T, DriverError> {
        let mut bench = self.bench.lock();
        bench.enter(operation)?;
        bench.slot(index).map(f)
    }
}

impl Default for SimDriver {
    fn default() -> SimDriver {
        SimDriver::new(vec![SimDevice::analog_discovery()])
    }
}

impl Driver for SimDriver {
    fn enumerate(&self, filter: i32) -> Result<usize, DriverError> {
        let mut bench = self.bench.lock();
        bench.enter("enumerate")?;
        let filter = EnumFilter::from_wire(filter)
            .ok_or_else(|| invalid(format!("unknown enumeration filter {}", filter)))?;
        bench.listed = bench.slots.iter().enumerate()
            .filter(|(_, slot)| match filter {
                EnumFilter::All => true,
                EnumFilter::EExplorer => slot.device.kind == DeviceKind::EExplorer,
                EnumFilter::Discovery => slot.device.kind == DeviceKind::Discovery,
            })
            .map(|(index, _)| index)
            .collect();
        Ok(bench.listed.len())
    }

    fn device_type(&self, index: usize) -> Result<(i32, i32), DriverError> {
        self.with_slot("device_type", index,
            |slot| (slot.device.kind.to_wire(), slot.device.version.to_wire()))
    }

    fn device_is_opened(&self, index: usize) -> Result<bool, DriverError> {
        self.with_slot("device_is_opened", index,
            |slot| slot.device.in_use || slot.open.is_some())
    }

    fn device_user_name(&self, index: usize) -> Result<String, DriverError> {
        self.with_slot("device_user_name", index, |slot| slot.device.user_name.clone())
    }

    fn device_name(&self, index: usize) -> Result<String, DriverError> {
        self.with_slot("device_name", index, |slot| slot.device.name.clone())
    }

    fn device_serial(&self, index: usize) -> Result<String, DriverError> {
        self.with_slot("device_serial", index, |slot| slot.device.serial.clone())
    }

    fn device_config_count(&self, index: usize) -> Result<usize, DriverError> {
        self.with_slot("device_config_count", index, |slot| slot.device.configs.len())
    }

    fn device_config_info(&self, index: usize, config: usize, info: i32) -> Result<i32, DriverError> {
        let info = ConfigInfo::from_wire(info)
            .ok_or_else(|| invalid(format!("unknown configuration info {}", info)))?;
        self.with_slot("device_config_info", index, |slot| {
            slot.device.configs.get(config).map(|config| config.info(info) as i32)
        })?.ok_or_else(|| invalid(format!("no configuration {}", config)))
    }

    fn open(&self, index: usize, config: Option<usize>) -> Result<RawHandle, DriverError> {
        let mut bench = self.bench.lock();
        bench.enter("open")?;
        let Some(&slot) = bench.listed.get(index) else { return Ok(HANDLE_NONE) };
        let handle = bench.next_handle;
        let slot = &mut bench.slots[slot];
        if slot.device.in_use || slot.open.is_some() {
            return Ok(HANDLE_NONE)
        }
        let config = config.unwrap_or(slot.device.active_config);
        let sim_config = *slot.device.configs.get(config)
            .ok_or_else(|| invalid(format!("no configuration {}", config)))?;
        slot.open = Some((handle, Unit::new(slot.device.clone(), sim_config)));
        bench.next_handle += 1;
        log::debug!("sim: opened device {} as handle {}", index, handle);
        Ok(handle)
    }

    fn close(&self, handle: RawHandle) -> Result<(), DriverError> {
        let mut bench = self.bench.lock();
        bench.enter("close")?;
        let slot = bench.slots.iter_mut()
            .find(|slot| matches!(slot.open, Some((open, _)) if open == handle))
            .ok_or_else(|| invalid(format!("invalid handle {}", handle)))?;
        slot.open = None;
        bench.closes += 1;
        Ok(())
    }

    fn reset(&self, handle: RawHandle, target: Target) -> Result<(), DriverError> {
        self.with_unit("reset", handle, |unit| {
            unit.reset(target);
            Ok(())
        })
    }

    fn configure(&self, handle: RawHandle, target: Target, reconfigure: bool, start: bool)
            -> Result<(), DriverError> {
        self.with_unit("configure", handle, |unit| unit.configure(target, reconfigure, start))
    }

    fn status(&self, handle: RawHandle, target: Target, read_data: bool) -> Result<i32, DriverError> {
        self.with_unit("status", handle, |unit| {
            unit.status(target, read_data).map(InstrumentState::to_wire)
        })
    }

    fn trigger_pc(&self, handle: RawHandle) -> Result<(), DriverError> {
        self.with_unit("trigger_pc", handle, |unit| {
            unit.pc_pulses += 1;
            Ok(())
        })
    }

    fn get(&self, handle: RawHandle, key: Key) -> Result<Value, DriverError> {
        self.with_unit("get", handle, |unit| unit.get(key))
    }

    fn set(&self, handle: RawHandle, key: Key, value: Value) -> Result<(), DriverError> {
        self.with_unit("set", handle, |unit| unit.set(key, value))
    }

    fn info(&self, handle: RawHandle, key: Key) -> Result<Info, DriverError> {
        self.with_unit("info", handle, |unit| unit.info(key))
    }

    fn name(&self, handle: RawHandle, key: Key) -> Result<(String, String), DriverError> {
        self.with_unit("name", handle, |unit| unit.name(key))
    }

    fn range_steps(&self, handle: RawHandle, key: Key) -> Result<Vec<f64>, DriverError> {
        self.with_unit("range_steps", handle, |unit| {
            match key.param {
                Param::AnalogInChannelRange => {
                    unit.channel_of(key)?;
                    Ok(ANALOG_IN_RANGES.to_vec())
                }
                _ => Err(unsupported(format!("{:?} has no step table", key.param))),
            }
        })
    }

    fn read_analog(&self, handle: RawHandle, key: Key, data: &mut [f64]) -> Result<(), DriverError> {
        self.with_unit("read_analog", handle, |unit| unit.read_analog(key, data))
    }

    fn read_digital(&self, handle: RawHandle, key: Key, data: &mut [u8]) -> Result<(), DriverError> {
        self.with_unit("read_digital", handle, |unit| unit.read_digital(key, data))
    }

    fn write_analog(&self, handle: RawHandle, key: Key, data: &[f64]) -> Result<(), DriverError> {
        self.with_unit("write_analog", handle, |unit| unit.write_analog(key, data))
    }

    fn write_digital(&self, handle: RawHandle, key: Key, data: &[u8], count: usize)
            -> Result<(), DriverError> {
        self.with_unit("write_digital", handle, |unit| unit.write_digital(key, data, count))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn open() -> (SimDriver, RawHandle) {
        let driver = SimDriver::default();
        let handle = driver.open(0, None).unwrap();
        assert_ne!(handle, HANDLE_NONE);
        (driver, handle)
    }

    fn poll(driver: &SimDriver, handle: RawHandle, target: Target) -> InstrumentState {
        let code = driver.status(handle, target, true).unwrap();
        InstrumentState::from_wire(code).unwrap()
    }

    #[test]
    fn test_enumerate_filter() {
        let driver = SimDriver::new(vec![
            SimDevice::analog_discovery(),
            SimDevice::electronics_explorer(),
        ]);
        assert_eq!(driver.enumerate(EnumFilter::All.to_wire()).unwrap(), 2);
        assert_eq!(driver.enumerate(EnumFilter::EExplorer.to_wire()).unwrap(), 1);
        assert_eq!(driver.device_type(0).unwrap(), (1, 5));
        assert!(driver.device_type(1).is_err());
    }

    #[test]
    fn test_open_busy() {
        let driver = SimDriver::new(vec![SimDevice::analog_discovery().in_use()]);
        assert_eq!(driver.open(0, None).unwrap(), HANDLE_NONE);
        assert_eq!(driver.open(5, None).unwrap(), HANDLE_NONE);
        let (driver, _handle) = open();
        assert_eq!(driver.open(0, None).unwrap(), HANDLE_NONE);
    }

    #[test]
    fn test_fault_injection() {
        let (driver, handle) = open();
        driver.fail_next("get");
        assert!(driver.get(handle, Key::new(Param::AnalogInFrequency)).is_err());
        assert!(driver.get(handle, Key::new(Param::AnalogInFrequency)).is_ok());
        assert_eq!(driver.calls(), 3);
    }

    #[test]
    fn test_set_coerces() {
        let (driver, handle) = open();
        let range = Key::channel(Param::AnalogInChannelRange, 0);
        driver.set(handle, range, Value::Float(7.0)).unwrap();
        assert_eq!(driver.get(handle, range).unwrap(), Value::Float(50.0));
        let frequency = Key::new(Param::AnalogInFrequency);
        driver.set(handle, frequency, Value::Float(1e12)).unwrap();
        assert_eq!(driver.get(handle, frequency).unwrap(), Value::Float(INTERNAL_CLOCK));
        let filter = Key::channel(Param::AnalogInChannelFilter, 0);
        assert!(driver.set(handle, filter, Value::Int(9)).is_err());
        assert!(driver.set(handle, Key::channel(Param::AnalogInChannelEnable, 7), Value::Bool(true)).is_err());
    }

    #[test]
    fn test_acquisition_runs_to_done() {
        let (driver, handle) = open();
        let target = Target::new(Instrument::AnalogIn);
        driver.set(handle, Key::new(Param::AnalogInBufferSize), Value::Int(2000)).unwrap();
        driver.configure(handle, target, false, true).unwrap();
        let states: Vec<_> = (0..5).map(|_| poll(&driver, handle, target)).collect();
        assert_eq!(states, vec![
            InstrumentState::Prefill,
            InstrumentState::Armed,
            InstrumentState::Running,
            InstrumentState::Running,
            InstrumentState::Done,
        ]);
        assert_eq!(driver.get(handle, Key::new(Param::AnalogInSamplesValid)).unwrap(), Value::Int(2000));
    }

    #[test]
    fn test_pc_trigger_and_auto_timeout() {
        let (driver, handle) = open();
        let target = Target::new(Instrument::AnalogIn);
        driver.set(handle, Key::new(Param::AnalogInTriggerSource),
                   Value::Int(TriggerSource::Pc.to_wire())).unwrap();
        driver.configure(handle, target, false, true).unwrap();
        for _ in 0..3 {
            poll(&driver, handle, target);
        }
        assert_eq!(poll(&driver, handle, target), InstrumentState::Wait);
        driver.trigger_pc(handle).unwrap();
        assert_eq!(poll(&driver, handle, target), InstrumentState::Running);

        driver.set(handle, Key::new(Param::AnalogInTriggerAutoTimeout), Value::Float(0.005)).unwrap();
        driver.configure(handle, target, false, true).unwrap();
        let state = (0..20).map(|_| poll(&driver, handle, target))
            .find(|state| state.is_running());
        assert_eq!(state, Some(InstrumentState::Running));
        assert_eq!(driver.get(handle, Key::new(Param::AnalogInAutoTriggered)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_loopback_dc() {
        let (driver, handle) = open();
        let carrier = |param| Key::node(param, 0, 0);
        driver.set(handle, carrier(Param::AnalogOutNodeFunction), Value::Int(Function::Dc.to_wire())).unwrap();
        driver.set(handle, carrier(Param::AnalogOutNodeOffset), Value::Float(1.25)).unwrap();
        driver.configure(handle, Target::channel(Instrument::AnalogOut, 0), false, true).unwrap();
        let target = Target::new(Instrument::AnalogIn);
        driver.configure(handle, target, false, true).unwrap();
        while poll(&driver, handle, target) != InstrumentState::Done {}
        let mut data = vec![0.0; 16];
        driver.read_analog(handle, Key::channel(Param::AnalogInData, 0), &mut data).unwrap();
        assert!(data.iter().all(|&sample| (sample - 1.25).abs() < 1e-9));
    }

    #[test]
    fn test_digital_loopback() {
        let (driver, handle) = open();
        driver.set(handle, Key::new(Param::DigitalIoOutputEnable), Value::Uint(0x00ff)).unwrap();
        driver.set(handle, Key::new(Param::DigitalIoOutput), Value::Uint(0x0f0f)).unwrap();
        assert_eq!(driver.get(handle, Key::new(Param::DigitalIoInput)).unwrap(), Value::Uint(0x000f));
        // wider than the device is masked
        driver.set(handle, Key::new(Param::DigitalIoOutputEnable), Value::Uint(0xffff_ffff)).unwrap();
        assert_eq!(driver.get(handle, Key::new(Param::DigitalIoOutputEnable)).unwrap(), Value::Uint(0xffff));
    }

    #[test]
    fn test_generator_run_repeat() {
        let (driver, handle) = open();
        let target = Target::channel(Instrument::AnalogOut, 1);
        driver.set(handle, Key::channel(Param::AnalogOutRun, 1), Value::Float(0.002)).unwrap();
        driver.set(handle, Key::channel(Param::AnalogOutRepeat, 1), Value::Int(2)).unwrap();
        driver.configure(handle, target, false, true).unwrap();
        let states: Vec<_> = (0..6).map(|_| poll(&driver, handle, target)).collect();
        assert_eq!(states, vec![
            InstrumentState::Running,
            InstrumentState::Running,
            InstrumentState::Running,
            InstrumentState::Running,
            InstrumentState::Done,
            InstrumentState::Done,
        ]);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (driver, handle) = open();
        let key = Key::new(Param::AnalogInFrequency);
        driver.set(handle, key, Value::Float(5e3)).unwrap();
        driver.reset(handle, Target::new(Instrument::AnalogOut)).unwrap();
        assert_eq!(driver.get(handle, key).unwrap(), Value::Float(5e3));
        driver.reset(handle, Target::new(Instrument::Device)).unwrap();
        assert_eq!(driver.get(handle, key).unwrap(), Value::Float(1e6));
    }

    #[test]
    fn test_close() {
        let (driver, handle) = open();
        driver.close(handle).unwrap();
        assert!(driver.close(handle).is_err());
        assert_eq!(driver.closes(), 1);
        assert!(!driver.is_open(0));
        assert!(driver.get(handle, Key::new(Param::AnalogInFrequency)).is_err());
    }
}
