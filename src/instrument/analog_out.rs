//! The waveform generator.
//!
//! Every channel is an independent generator with up to three nodes: the carrier, and the
//! FM and AM nodes that modulate it. Channels can be slaved to a master channel, in which
//! case configuring the master configures them as well.

use crate::Result;
use crate::params::{Instrument, Key, Param, Value};
use crate::session::SessionRef;
use crate::sys::{Driver, Target};
use crate::trigger::{self, TriggerDestination};
use crate::wire::{
    AnalogOutIdle, AnalogOutMode, AnalogOutNode, CapabilitySet, Function, InstrumentState,
    TriggerSource, WireEnum,
};
use super::{count, PlayStatus};

fn channel_key(param: Param, channel: usize) -> Key {
    Key::channel(param, channel)
}

fn node_key(param: Param, channel: usize, node: AnalogOutNode) -> Key {
    Key::node(param, channel, node.to_wire() as usize)
}

fn target(channel: Option<usize>) -> Target {
    Target { instrument: Instrument::AnalogOut, channel }
}

pub struct AnalogOut<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> AnalogOut<D> {
    pub(crate) fn new(session: SessionRef<D>) -> AnalogOut<D> {
        AnalogOut { session }
    }

    /// Restores defaults of one channel, or of every channel with `None`.
    pub fn reset(&self, channel: Option<usize>) -> Result<()> {
        self.session.with(|link| link.reset(target(channel)))
    }

    /// Applies pending settings of one channel (and the channels slaved to it), or of every
    /// channel with `None`; with `start`, starts generating.
    pub fn configure(&self, channel: Option<usize>, start: bool) -> Result<()> {
        self.session.with(|link| link.configure(target(channel), false, start))
    }

    pub fn status(&self, channel: usize) -> Result<InstrumentState> {
        self.session.with(|link| link.status(target(Some(channel)), false))
    }

    pub fn channel_count(&self) -> Result<usize> {
        self.session.with(|link| Ok(link.channel_count(Instrument::AnalogOut)))
    }

    /// Slaves `channel` to `master`. A channel that is its own master runs independently.
    pub fn master_set(&self, channel: usize, master: usize) -> Result<()> {
        self.session.with(|link| {
            link.check_channel(Instrument::AnalogOut, master)?;
            link.set(channel_key(Param::AnalogOutMaster, channel), Value::Int(master as i32))
        })
    }

    pub fn master_get(&self, channel: usize) -> Result<usize> {
        self.session.with(|link| link.get_int(channel_key(Param::AnalogOutMaster, channel)).map(count))
    }

    pub fn trigger_source_info(&self, channel: usize) -> Result<CapabilitySet<TriggerSource>> {
        self.session.with(|link| trigger::source_info(link, TriggerDestination::AnalogOut(channel)))
    }

    pub fn trigger_source_set(&self, channel: usize, source: TriggerSource) -> Result<()> {
        self.session.with(|link| trigger::bind(link, TriggerDestination::AnalogOut(channel), source))
    }

    pub fn trigger_source_get(&self, channel: usize) -> Result<TriggerSource> {
        self.session.with(|link| trigger::read(link, TriggerDestination::AnalogOut(channel)))
    }

    pub fn run_info(&self, channel: usize) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(channel_key(Param::AnalogOutRun, channel)))
    }

    /// Seconds to generate for after being triggered; `0.0` runs until stopped.
    pub fn run_set(&self, channel: usize, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(channel_key(Param::AnalogOutRun, channel), Value::Float(seconds)))
    }

    pub fn run_get(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogOutRun, channel)))
    }

    /// Seconds left in the current run.
    pub fn run_status(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogOutRunStatus, channel)))
    }

    pub fn wait_info(&self, channel: usize) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(channel_key(Param::AnalogOutWait, channel)))
    }

    /// Seconds between the trigger and the start of generation.
    pub fn wait_set(&self, channel: usize, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(channel_key(Param::AnalogOutWait, channel), Value::Float(seconds)))
    }

    pub fn wait_get(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogOutWait, channel)))
    }

    pub fn repeat_info(&self, channel: usize) -> Result<(u32, u32)> {
        self.session.with(|link| {
            let (min, max) = link.info_range(channel_key(Param::AnalogOutRepeat, channel))?;
            Ok((min as u32, max as u32))
        })
    }

    /// Number of runs; `0` repeats forever.
    pub fn repeat_set(&self, channel: usize, repeat: u32) -> Result<()> {
        let repeat = i32::try_from(repeat).unwrap_or(i32::MAX);
        self.session.with(|link| link.set(channel_key(Param::AnalogOutRepeat, channel), Value::Int(repeat)))
    }

    pub fn repeat_get(&self, channel: usize) -> Result<u32> {
        self.session.with(|link| link.get_uint(channel_key(Param::AnalogOutRepeat, channel)))
    }

    /// Runs left.
    pub fn repeat_status(&self, channel: usize) -> Result<u32> {
        self.session.with(|link| link.get_uint(channel_key(Param::AnalogOutRepeatStatus, channel)))
    }

    /// Whether every repeat waits for a new trigger rather than only the first one.
    pub fn repeat_trigger_set(&self, channel: usize, enable: bool) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogOutRepeatTrigger, channel), Value::Bool(enable))
        })
    }

    pub fn repeat_trigger_get(&self, channel: usize) -> Result<bool> {
        self.session.with(|link| link.get_bool(channel_key(Param::AnalogOutRepeatTrigger, channel)))
    }

    /// Range of the output limit. Channels without a limiter report `(0.0, 0.0)`.
    pub fn limitation_info(&self, channel: usize) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(channel_key(Param::AnalogOutLimitation, channel)))
    }

    pub fn limitation_set(&self, channel: usize, limit: f64) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogOutLimitation, channel), Value::Float(limit))
        })
    }

    pub fn limitation_get(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogOutLimitation, channel)))
    }

    pub fn mode_set(&self, channel: usize, mode: AnalogOutMode) -> Result<()> {
        self.session.with(|link| link.set_enum(channel_key(Param::AnalogOutMode, channel), mode))
    }

    pub fn mode_get(&self, channel: usize) -> Result<AnalogOutMode> {
        self.session.with(|link| link.get_enum(channel_key(Param::AnalogOutMode, channel)))
    }

    pub fn idle_info(&self, channel: usize) -> Result<CapabilitySet<AnalogOutIdle>> {
        self.session.with(|link| link.info_set(channel_key(Param::AnalogOutIdle, channel)))
    }

    /// Output level while the channel is not running.
    pub fn idle_set(&self, channel: usize, idle: AnalogOutIdle) -> Result<()> {
        self.session.with(|link| link.set_enum(channel_key(Param::AnalogOutIdle, channel), idle))
    }

    pub fn idle_get(&self, channel: usize) -> Result<AnalogOutIdle> {
        self.session.with(|link| link.get_enum(channel_key(Param::AnalogOutIdle, channel)))
    }

    /// Nodes `channel` has.
    pub fn node_info(&self, channel: usize) -> Result<CapabilitySet<AnalogOutNode>> {
        self.session.with(|link| link.info_set(channel_key(Param::AnalogOutNodes, channel)))
    }

    pub fn node_enable_set(&self, channel: usize, node: AnalogOutNode, enable: bool) -> Result<()> {
        self.session.with(|link| {
            link.set(node_key(Param::AnalogOutNodeEnable, channel, node), Value::Bool(enable))
        })
    }

    pub fn node_enable_get(&self, channel: usize, node: AnalogOutNode) -> Result<bool> {
        self.session.with(|link| link.get_bool(node_key(Param::AnalogOutNodeEnable, channel, node)))
    }

    pub fn node_function_info(&self, channel: usize, node: AnalogOutNode)
            -> Result<CapabilitySet<Function>> {
        self.session.with(|link| link.info_set(node_key(Param::AnalogOutNodeFunction, channel, node)))
    }

    pub fn node_function_set(&self, channel: usize, node: AnalogOutNode, function: Function)
            -> Result<()> {
        self.session.with(|link| {
            link.set_enum(node_key(Param::AnalogOutNodeFunction, channel, node), function)
        })
    }

    pub fn node_function_get(&self, channel: usize, node: AnalogOutNode) -> Result<Function> {
        self.session.with(|link| link.get_enum(node_key(Param::AnalogOutNodeFunction, channel, node)))
    }

    pub fn node_frequency_info(&self, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.node_range(Param::AnalogOutNodeFrequency, channel, node)
    }

    pub fn node_frequency_set(&self, channel: usize, node: AnalogOutNode, hertz: f64) -> Result<()> {
        self.node_set(Param::AnalogOutNodeFrequency, channel, node, hertz)
    }

    pub fn node_frequency_get(&self, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.node_get(Param::AnalogOutNodeFrequency, channel, node)
    }

    /// Carrier amplitude in volts; modulation depth in percent on the FM and AM nodes.
    pub fn node_amplitude_info(&self, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.node_range(Param::AnalogOutNodeAmplitude, channel, node)
    }

    pub fn node_amplitude_set(&self, channel: usize, node: AnalogOutNode, amplitude: f64)
            -> Result<()> {
        self.node_set(Param::AnalogOutNodeAmplitude, channel, node, amplitude)
    }

    pub fn node_amplitude_get(&self, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.node_get(Param::AnalogOutNodeAmplitude, channel, node)
    }

    /// Modulation depth of an FM or AM node in percent. The device stores it as the node
    /// amplitude, so this is the same quantity as [`node_amplitude_set`](Self::node_amplitude_set).
    pub fn node_modulation_info(&self, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.node_amplitude_info(channel, node)
    }

    pub fn node_modulation_set(&self, channel: usize, node: AnalogOutNode, percent: f64)
            -> Result<()> {
        self.node_amplitude_set(channel, node, percent)
    }

    pub fn node_modulation_get(&self, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.node_amplitude_get(channel, node)
    }

    pub fn node_offset_info(&self, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.node_range(Param::AnalogOutNodeOffset, channel, node)
    }

    pub fn node_offset_set(&self, channel: usize, node: AnalogOutNode, volts: f64) -> Result<()> {
        self.node_set(Param::AnalogOutNodeOffset, channel, node, volts)
    }

    pub fn node_offset_get(&self, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.node_get(Param::AnalogOutNodeOffset, channel, node)
    }

    pub fn node_symmetry_info(&self, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.node_range(Param::AnalogOutNodeSymmetry, channel, node)
    }

    /// Duty cycle of square, triangle and ramp shapes in percent.
    pub fn node_symmetry_set(&self, channel: usize, node: AnalogOutNode, percent: f64) -> Result<()> {
        self.node_set(Param::AnalogOutNodeSymmetry, channel, node, percent)
    }

    pub fn node_symmetry_get(&self, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.node_get(Param::AnalogOutNodeSymmetry, channel, node)
    }

    pub fn node_phase_info(&self, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.node_range(Param::AnalogOutNodePhase, channel, node)
    }

    /// Starting phase in degrees.
    pub fn node_phase_set(&self, channel: usize, node: AnalogOutNode, degrees: f64) -> Result<()> {
        self.node_set(Param::AnalogOutNodePhase, channel, node, degrees)
    }

    pub fn node_phase_get(&self, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.node_get(Param::AnalogOutNodePhase, channel, node)
    }

    /// Minimum and maximum number of samples of a custom waveform.
    pub fn node_data_info(&self, channel: usize, node: AnalogOutNode) -> Result<(usize, usize)> {
        let (min, max) = self.node_range(Param::AnalogOutNodeData, channel, node)?;
        Ok((min as usize, max as usize))
    }

    /// Loads one period of a custom waveform, samples normalized to `-1.0..=1.0`.
    pub fn node_data_set(&self, channel: usize, node: AnalogOutNode, data: &[f64]) -> Result<()> {
        self.session.with(|link| link.write_analog(node_key(Param::AnalogOutNodeData, channel, node), data))
    }

    /// Whether the FM and AM nodes use custom waveforms.
    pub fn custom_am_fm_enable_set(&self, channel: usize, enable: bool) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogOutCustomAmFm, channel), Value::Bool(enable))
        })
    }

    pub fn custom_am_fm_enable_get(&self, channel: usize) -> Result<bool> {
        self.session.with(|link| link.get_bool(channel_key(Param::AnalogOutCustomAmFm, channel)))
    }

    /// Room left in the streaming buffer of a node generating [`Function::Play`].
    pub fn node_play_status(&self, channel: usize, node: AnalogOutNode) -> Result<PlayStatus> {
        self.session.with(|link| {
            link.get_shaped(node_key(Param::AnalogOutNodePlayStatus, channel, node), PlayStatus::from_value)
        })
    }

    /// Queues samples for a node generating [`Function::Play`].
    pub fn node_play_data(&self, channel: usize, node: AnalogOutNode, data: &[f64]) -> Result<()> {
        self.session.with(|link| {
            link.write_analog(node_key(Param::AnalogOutNodePlayData, channel, node), data)
        })
    }

    fn node_range(&self, param: Param, channel: usize, node: AnalogOutNode) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(node_key(param, channel, node)))
    }

    fn node_set(&self, param: Param, channel: usize, node: AnalogOutNode, value: f64) -> Result<()> {
        self.session.with(|link| link.set(node_key(param, channel, node), Value::Float(value)))
    }

    fn node_get(&self, param: Param, channel: usize, node: AnalogOutNode) -> Result<f64> {
        self.session.with(|link| link.get_float(node_key(param, channel, node)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;
    use crate::instrument::fixture::open;

    const CARRIER: AnalogOutNode = AnalogOutNode::Carrier;

    #[test]
    fn test_nodes() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        assert_eq!(analog_out.channel_count().unwrap(), 2);
        assert_eq!(analog_out.node_info(0).unwrap().len(), 3);
        assert!(analog_out.node_function_info(0, CARRIER).unwrap().contains(Function::Play));
        assert!(!analog_out.node_function_info(0, AnalogOutNode::Fm).unwrap().contains(Function::Play));
        assert!(analog_out.node_enable_get(0, CARRIER).unwrap());
        assert!(!analog_out.node_enable_get(0, AnalogOutNode::Am).unwrap());
        assert_eq!(analog_out.node_amplitude_info(0, CARRIER).unwrap(), (-5.0, 5.0));
        assert_eq!(analog_out.node_modulation_info(0, AnalogOutNode::Am).unwrap(), (0.0, 100.0));
    }

    #[test]
    fn test_node_settings() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.node_function_set(1, CARRIER, Function::Square).unwrap();
        assert_eq!(analog_out.node_function_get(1, CARRIER).unwrap(), Function::Square);
        analog_out.node_symmetry_set(1, CARRIER, 25.0).unwrap();
        assert_eq!(analog_out.node_symmetry_get(1, CARRIER).unwrap(), 25.0);
        analog_out.node_phase_set(1, CARRIER, 90.0).unwrap();
        assert_eq!(analog_out.node_phase_get(1, CARRIER).unwrap(), 90.0);
        // out of range values are clamped by the device
        analog_out.node_offset_set(1, CARRIER, 12.0).unwrap();
        assert_eq!(analog_out.node_offset_get(1, CARRIER).unwrap(), 5.0);
        analog_out.node_enable_set(1, AnalogOutNode::Am, true).unwrap();
        analog_out.node_modulation_set(1, AnalogOutNode::Am, 50.0).unwrap();
        assert_eq!(analog_out.node_amplitude_get(1, AnalogOutNode::Am).unwrap(), 50.0);
        assert_eq!(analog_out.node_modulation_get(1, AnalogOutNode::Am).unwrap(), 50.0);
        analog_out.custom_am_fm_enable_set(1, true).unwrap();
        assert!(analog_out.custom_am_fm_enable_get(1).unwrap());
        // a node that only modulates cannot play
        assert!(matches!(analog_out.node_function_set(1, AnalogOutNode::Fm, Function::Play),
                         Err(Error::Transport { operation: "AnalogOutNodeFunctionSet", .. })));
    }

    #[test]
    fn test_channel_settings() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.mode_set(0, AnalogOutMode::Current).unwrap();
        assert_eq!(analog_out.mode_get(0).unwrap(), AnalogOutMode::Current);
        assert_eq!(analog_out.idle_info(0).unwrap().len(), 3);
        analog_out.idle_set(0, AnalogOutIdle::Disable).unwrap();
        assert_eq!(analog_out.idle_get(0).unwrap(), AnalogOutIdle::Disable);
        analog_out.repeat_trigger_set(0, true).unwrap();
        assert!(analog_out.repeat_trigger_get(0).unwrap());
        analog_out.wait_set(0, 0.5).unwrap();
        assert_eq!(analog_out.wait_get(0).unwrap(), 0.5);
        assert_eq!(analog_out.repeat_info(0).unwrap(), (0, 65535));
        // this device has no output limiter
        assert_eq!(analog_out.limitation_info(0).unwrap(), (0.0, 0.0));
        analog_out.limitation_set(0, 1.0).unwrap();
        assert_eq!(analog_out.limitation_get(0).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_channel() {
        let (driver, session) = open();
        let analog_out = session.analog_out();
        let calls = driver.calls();
        assert!(matches!(analog_out.node_frequency_set(2, CARRIER, 1e3),
                         Err(Error::InvalidChannel { instrument: "analog out", channel: 2, .. })));
        assert!(matches!(analog_out.status(2), Err(Error::InvalidChannel { .. })));
        assert!(matches!(analog_out.configure(Some(5), true), Err(Error::InvalidChannel { .. })));
        assert!(matches!(analog_out.master_set(0, 2), Err(Error::InvalidChannel { .. })));
        assert_eq!(driver.calls(), calls);
    }

    #[test]
    fn test_run_and_repeat() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.run_set(0, 0.002).unwrap();
        analog_out.repeat_set(0, 2).unwrap();
        assert_eq!(analog_out.repeat_get(0).unwrap(), 2);
        analog_out.configure(Some(0), true).unwrap();
        for _ in 0..3 {
            assert_eq!(analog_out.status(0).unwrap(), InstrumentState::Running);
        }
        assert_eq!(analog_out.repeat_status(0).unwrap(), 1);
        assert_eq!(analog_out.status(0).unwrap(), InstrumentState::Running);
        assert!((analog_out.run_status(0).unwrap() - 0.001).abs() < 1e-9);
        assert_eq!(analog_out.status(0).unwrap(), InstrumentState::Done);
        assert_eq!(analog_out.repeat_status(0).unwrap(), 0);
    }

    #[test]
    fn test_master_drives_follower() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.master_set(1, 0).unwrap();
        assert_eq!(analog_out.master_get(1).unwrap(), 0);
        analog_out.configure(Some(0), true).unwrap();
        assert_eq!(analog_out.status(1).unwrap(), InstrumentState::Running);
    }

    #[test]
    fn test_trigger_source() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        assert!(matches!(analog_out.trigger_source_set(0, TriggerSource::AnalogOut1),
                         Err(Error::UnsupportedTrigger { .. })));
        analog_out.trigger_source_set(0, TriggerSource::Pc).unwrap();
        assert_eq!(analog_out.trigger_source_get(0).unwrap(), TriggerSource::Pc);
        assert!(analog_out.trigger_source_info(1).unwrap().contains(TriggerSource::External2));
        analog_out.configure(Some(0), true).unwrap();
        assert_eq!(analog_out.status(0).unwrap(), InstrumentState::Wait);
        assert_eq!(analog_out.status(0).unwrap(), InstrumentState::Wait);
        session.trigger_pc().unwrap();
        assert_eq!(analog_out.status(0).unwrap(), InstrumentState::Running);
    }

    #[test]
    fn test_custom_waveform() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        assert_eq!(analog_out.node_data_info(0, CARRIER).unwrap(), (1, 4096));
        analog_out.node_function_set(0, CARRIER, Function::Custom).unwrap();
        analog_out.node_data_set(0, CARRIER, &[1.0; 16]).unwrap();
        assert!(matches!(analog_out.node_data_set(0, CARRIER, &vec![0.0; 5000]),
                         Err(Error::Transport { .. })));
        analog_out.node_amplitude_set(0, CARRIER, 1.5).unwrap();
        analog_out.configure(Some(0), true).unwrap();

        let analog_in = session.analog_in();
        analog_in.buffer_size_set(1000).unwrap();
        analog_in.configure(false, true).unwrap();
        while analog_in.status(true).unwrap() != InstrumentState::Done {}
        let data = analog_in.status_data(0, 1000).unwrap();
        assert!(data.iter().all(|&sample| (sample - 1.5).abs() < 1e-9));
    }

    #[test]
    fn test_play() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.node_function_set(0, CARRIER, Function::Play).unwrap();
        assert_eq!(analog_out.node_play_status(0, CARRIER).unwrap().free, 4096);
        analog_out.node_play_data(0, CARRIER, &[0.5; 1000]).unwrap();
        assert_eq!(analog_out.node_play_status(0, CARRIER).unwrap().free, 3096);
        assert!(matches!(analog_out.node_play_data(0, CARRIER, &[0.0; 4000]),
                         Err(Error::Transport { operation: "AnalogOutNodePlayDataSet", .. })));
        analog_out.configure(Some(0), true).unwrap();
        analog_out.status(0).unwrap();
        assert!(analog_out.node_play_status(0, CARRIER).unwrap().free > 3096);
    }

    #[test]
    fn test_reset_one_channel() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.node_frequency_set(0, CARRIER, 5e3).unwrap();
        analog_out.node_frequency_set(1, CARRIER, 7e3).unwrap();
        analog_out.reset(Some(0)).unwrap();
        assert_eq!(analog_out.node_frequency_get(0, CARRIER).unwrap(), 1e3);
        assert_eq!(analog_out.node_frequency_get(1, CARRIER).unwrap(), 7e3);
        analog_out.reset(None).unwrap();
        assert_eq!(analog_out.node_frequency_get(1, CARRIER).unwrap(), 1e3);
    }
}
