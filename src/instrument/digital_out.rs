//! The pattern generator.
//!
//! All channels share one run/wait/repeat timeline and trigger; each channel generates its
//! own pattern from a divided internal clock.

use crate::{PatternConfiguration, Result};
use crate::params::{Instrument, Key, Param, Value};
use crate::session::SessionRef;
use crate::sys::{Driver, Target};
use crate::trigger::{self, TriggerDestination};
use crate::wire::{CapabilitySet, DigitalOutIdle, InstrumentState, OutputMode, PatternType, TriggerSource};

const TARGET: Target = Target { instrument: Instrument::DigitalOut, channel: None };

fn key(param: Param) -> Key {
    Key::new(param)
}

fn channel_key(param: Param, channel: usize) -> Key {
    Key::channel(param, channel)
}

/// Packs one bit per sample, LSB first.
fn pack(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0; bits.len().div_ceil(8)];
    for (index, _) in bits.iter().enumerate().filter(|(_, &bit)| bit) {
        bytes[index / 8] |= 1 << (index % 8);
    }
    bytes
}

pub struct DigitalOut<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> DigitalOut<D> {
    pub(crate) fn new(session: SessionRef<D>) -> DigitalOut<D> {
        DigitalOut { session }
    }

    pub fn reset(&self) -> Result<()> {
        self.session.with(|link| link.reset(TARGET))
    }

    pub fn configure(&self, start: bool) -> Result<()> {
        self.session.with(|link| link.configure(TARGET, false, start))
    }

    pub fn status(&self) -> Result<InstrumentState> {
        self.session.with(|link| link.status(TARGET, false))
    }

    pub fn internal_clock_info(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::DigitalOutInternalClock)))
    }

    pub fn trigger_source_info(&self) -> Result<CapabilitySet<TriggerSource>> {
        self.session.with(|link| trigger::source_info(link, TriggerDestination::DigitalOut))
    }

    pub fn trigger_source_set(&self, source: TriggerSource) -> Result<()> {
        self.session.with(|link| trigger::bind(link, TriggerDestination::DigitalOut, source))
    }

    pub fn trigger_source_get(&self) -> Result<TriggerSource> {
        self.session.with(|link| trigger::read(link, TriggerDestination::DigitalOut))
    }

    pub fn run_info(&self) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(key(Param::DigitalOutRun)))
    }

    pub fn run_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalOutRun), Value::Float(seconds)))
    }

    pub fn run_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::DigitalOutRun)))
    }

    pub fn run_status(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::DigitalOutRunStatus)))
    }

    pub fn wait_info(&self) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(key(Param::DigitalOutWait)))
    }

    pub fn wait_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalOutWait), Value::Float(seconds)))
    }

    pub fn wait_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::DigitalOutWait)))
    }

    pub fn repeat_info(&self) -> Result<(u32, u32)> {
        self.session.with(|link| {
            let (min, max) = link.info_range(key(Param::DigitalOutRepeat))?;
            Ok((min as u32, max as u32))
        })
    }

    pub fn repeat_set(&self, repeat: u32) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalOutRepeat), Value::Uint(repeat)))
    }

    pub fn repeat_get(&self) -> Result<u32> {
        self.session.with(|link| link.get_uint(key(Param::DigitalOutRepeat)))
    }

    pub fn repeat_status(&self) -> Result<u32> {
        self.session.with(|link| link.get_uint(key(Param::DigitalOutRepeatStatus)))
    }

    pub fn repeat_trigger_set(&self, enable: bool) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalOutRepeatTrigger), Value::Bool(enable)))
    }

    pub fn repeat_trigger_get(&self) -> Result<bool> {
        self.session.with(|link| link.get_bool(key(Param::DigitalOutRepeatTrigger)))
    }

    pub fn channel_count(&self) -> Result<usize> {
        self.session.with(|link| Ok(link.channel_count(Instrument::DigitalOut)))
    }

    pub fn enable_set(&self, channel: usize, enable: bool) -> Result<()> {
        self.session.with(|link| link.set(channel_key(Param::DigitalOutEnable, channel), Value::Bool(enable)))
    }

    pub fn enable_get(&self, channel: usize) -> Result<bool> {
        self.session.with(|link| link.get_bool(channel_key(Param::DigitalOutEnable, channel)))
    }

    pub fn output_info(&self, channel: usize) -> Result<CapabilitySet<OutputMode>> {
        self.session.with(|link| link.info_set(channel_key(Param::DigitalOutOutput, channel)))
    }

    pub fn output_set(&self, channel: usize, output: OutputMode) -> Result<()> {
        self.session.with(|link| link.set_enum(channel_key(Param::DigitalOutOutput, channel), output))
    }

    pub fn output_get(&self, channel: usize) -> Result<OutputMode> {
        self.session.with(|link| link.get_enum(channel_key(Param::DigitalOutOutput, channel)))
    }

    pub fn type_info(&self, channel: usize) -> Result<CapabilitySet<PatternType>> {
        self.session.with(|link| link.info_set(channel_key(Param::DigitalOutType, channel)))
    }

    pub fn type_set(&self, channel: usize, kind: PatternType) -> Result<()> {
        self.session.with(|link| link.set_enum(channel_key(Param::DigitalOutType, channel), kind))
    }

    pub fn type_get(&self, channel: usize) -> Result<PatternType> {
        self.session.with(|link| link.get_enum(channel_key(Param::DigitalOutType, channel)))
    }

    pub fn idle_info(&self, channel: usize) -> Result<CapabilitySet<DigitalOutIdle>> {
        self.session.with(|link| link.info_set(channel_key(Param::DigitalOutIdle, channel)))
    }

    pub fn idle_set(&self, channel: usize, idle: DigitalOutIdle) -> Result<()> {
        self.session.with(|link| link.set_enum(channel_key(Param::DigitalOutIdle, channel), idle))
    }

    pub fn idle_get(&self, channel: usize) -> Result<DigitalOutIdle> {
        self.session.with(|link| link.get_enum(channel_key(Param::DigitalOutIdle, channel)))
    }

    pub fn divider_info(&self, channel: usize) -> Result<(u32, u32)> {
        self.session.with(|link| {
            let (min, max) = link.info_range(channel_key(Param::DigitalOutDivider, channel))?;
            Ok((min as u32, max as u32))
        })
    }

    pub fn divider_set(&self, channel: usize, divider: u32) -> Result<()> {
        self.session.with(|link| link.set(channel_key(Param::DigitalOutDivider, channel), Value::Uint(divider)))
    }

    pub fn divider_get(&self, channel: usize) -> Result<u32> {
        self.session.with(|link| link.get_uint(channel_key(Param::DigitalOutDivider, channel)))
    }

    /// Divider count the channel starts from, delaying its first clock tick.
    pub fn divider_init_set(&self, channel: usize, init: u32) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::DigitalOutDividerInit, channel), Value::Uint(init))
        })
    }

    pub fn divider_init_get(&self, channel: usize) -> Result<u32> {
        self.session.with(|link| link.get_uint(channel_key(Param::DigitalOutDividerInit, channel)))
    }

    pub fn counter_info(&self, channel: usize) -> Result<(u32, u32)> {
        self.session.with(|link| {
            let (min, max) = link.info_range(channel_key(Param::DigitalOutCounter, channel))?;
            Ok((min as u32, max as u32))
        })
    }

    /// Sets how many divided clock ticks a pulse pattern stays low and then high.
    pub fn counter_set(&self, channel: usize, low: u32, high: u32) -> Result<()> {
        self.session.with(|link| link.set(channel_key(Param::DigitalOutCounter, channel), Value::Pair(low, high)))
    }

    pub fn counter_get(&self, channel: usize) -> Result<(u32, u32)> {
        self.session.with(|link| {
            link.get_shaped(channel_key(Param::DigitalOutCounter, channel), |value| match value {
                Value::Pair(low, high) => Some((low, high)),
                _ => None,
            })
        })
    }

    /// Sets the level and count the pulse counter starts from.
    pub fn counter_init_set(&self, channel: usize, high: bool, count: u32) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::DigitalOutCounterInit, channel), Value::Flagged(high, count))
        })
    }

    pub fn counter_init_get(&self, channel: usize) -> Result<(bool, u32)> {
        self.session.with(|link| {
            link.get_shaped(channel_key(Param::DigitalOutCounterInit, channel), |value| match value {
                Value::Flagged(high, count) => Some((high, count)),
                _ => None,
            })
        })
    }

    /// Largest custom pattern in bits.
    pub fn data_info(&self, channel: usize) -> Result<usize> {
        self.session.with(|link| {
            link.info_limit(channel_key(Param::DigitalOutData, channel)).map(|max| max as usize)
        })
    }

    /// Loads the custom pattern of `channel`, one sample per divided clock tick.
    pub fn data_set(&self, channel: usize, bits: &[bool]) -> Result<()> {
        let data = pack(bits);
        self.session.with(|link| {
            link.write_digital(channel_key(Param::DigitalOutData, channel), &data, bits.len())
        })
    }

    /// Enables `config.channel` and sets up its whole pattern under one lock, configuring the
    /// instrument once at the end if auto-configure is on.
    pub fn apply(&self, config: &PatternConfiguration) -> Result<()> {
        let channel = config.channel;
        self.session.with(|link| link.batch(TARGET, |link| {
            let at = |param| channel_key(param, channel);
            link.set(at(Param::DigitalOutEnable), Value::Bool(true))?;
            link.set_enum(at(Param::DigitalOutType), config.kind)?;
            link.set_enum(at(Param::DigitalOutOutput), config.output)?;
            link.set_enum(at(Param::DigitalOutIdle), config.idle)?;
            link.set(at(Param::DigitalOutDivider), Value::Uint(config.divider))?;
            link.set(at(Param::DigitalOutDividerInit), Value::Uint(config.divider_init))?;
            link.set(at(Param::DigitalOutCounter), Value::Pair(config.low, config.high))?;
            link.set(at(Param::DigitalOutCounterInit),
                     Value::Flagged(config.initial_high, config.initial_count))?;
            Ok(())
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;
    use crate::instrument::fixture::open;

    #[test]
    fn test_pack() {
        assert_eq!(pack(&[]), Vec::<u8>::new());
        assert_eq!(pack(&[true, false, true]), vec![0b101]);
        let mut bits = vec![false; 9];
        bits[8] = true;
        bits[7] = true;
        assert_eq!(pack(&bits), vec![0x80, 0x01]);
    }

    #[test]
    fn test_apply() {
        let (driver, session) = open();
        let digital_out = session.digital_out();
        let calls = driver.calls();
        digital_out.apply(&PatternConfiguration::clock(3, 100, 5, 7)).unwrap();
        assert_eq!(driver.calls() - calls, 8 + 1);
        assert!(digital_out.enable_get(3).unwrap());
        assert!(!digital_out.enable_get(2).unwrap());
        assert_eq!(digital_out.divider_get(3).unwrap(), 100);
        assert_eq!(digital_out.counter_get(3).unwrap(), (5, 7));
        assert_eq!(digital_out.counter_init_get(3).unwrap(), (false, 0));
        assert_eq!(digital_out.type_get(3).unwrap(), PatternType::Pulse);

        let config = PatternConfiguration { channel: 16, ..Default::default() };
        assert!(matches!(digital_out.apply(&config),
                         Err(Error::InvalidChannel { instrument: "digital out", channel: 16, count: 16 })));
    }

    #[test]
    fn test_channel_settings() {
        let (_driver, session) = open();
        let digital_out = session.digital_out();
        assert_eq!(digital_out.channel_count().unwrap(), 16);
        assert_eq!(digital_out.output_info(0).unwrap().len(), 4);
        digital_out.output_set(0, OutputMode::OpenDrain).unwrap();
        assert_eq!(digital_out.output_get(0).unwrap(), OutputMode::OpenDrain);
        assert!(digital_out.type_info(0).unwrap().contains(PatternType::Random));
        digital_out.type_set(0, PatternType::Custom).unwrap();
        assert_eq!(digital_out.type_get(0).unwrap(), PatternType::Custom);
        assert_eq!(digital_out.idle_info(0).unwrap().len(), 4);
        digital_out.idle_set(0, DigitalOutIdle::HiZ).unwrap();
        assert_eq!(digital_out.idle_get(0).unwrap(), DigitalOutIdle::HiZ);
        digital_out.divider_init_set(0, 3).unwrap();
        assert_eq!(digital_out.divider_init_get(0).unwrap(), 3);
        digital_out.counter_init_set(0, true, 2).unwrap();
        assert_eq!(digital_out.counter_init_get(0).unwrap(), (true, 2));
        assert_eq!(digital_out.divider_info(0).unwrap(), (1, 1 << 30));
        // the counters saturate at their width
        assert_eq!(digital_out.counter_info(0).unwrap(), (0, 1 << 15));
        digital_out.counter_set(0, 1 << 20, 1).unwrap();
        assert_eq!(digital_out.counter_get(0).unwrap(), (1 << 15, 1));
        assert!(matches!(digital_out.enable_set(16, true), Err(Error::InvalidChannel { .. })));
    }

    #[test]
    fn test_custom_data() {
        let (_driver, session) = open();
        let digital_out = session.digital_out();
        assert_eq!(digital_out.data_info(0).unwrap(), 1024);
        digital_out.type_set(0, PatternType::Custom).unwrap();
        digital_out.data_set(0, &[true, false, true, true]).unwrap();
        assert!(matches!(digital_out.data_set(0, &[false; 2000]),
                         Err(Error::Transport { operation: "DigitalOutDataSet", .. })));
    }

    #[test]
    fn test_run_and_repeat() {
        let (_driver, session) = open();
        let digital_out = session.digital_out();
        assert_eq!(digital_out.internal_clock_info().unwrap(), 100e6);
        assert_eq!(digital_out.run_info().unwrap(), (0.0, 1e4));
        digital_out.run_set(0.002).unwrap();
        assert_eq!(digital_out.run_get().unwrap(), 0.002);
        digital_out.repeat_set(2).unwrap();
        assert_eq!(digital_out.repeat_get().unwrap(), 2);
        digital_out.configure(true).unwrap();
        for _ in 0..3 {
            assert_eq!(digital_out.status().unwrap(), InstrumentState::Running);
        }
        assert_eq!(digital_out.repeat_status().unwrap(), 1);
        assert_eq!(digital_out.status().unwrap(), InstrumentState::Running);
        assert!(digital_out.run_status().unwrap() > 0.0);
        assert_eq!(digital_out.status().unwrap(), InstrumentState::Done);
    }

    #[test]
    fn test_wait_for_trigger() {
        let (_driver, session) = open();
        let digital_out = session.digital_out();
        assert!(!digital_out.trigger_source_info().unwrap().contains(TriggerSource::DigitalOut));
        assert!(matches!(digital_out.trigger_source_set(TriggerSource::DigitalOut),
                         Err(Error::UnsupportedTrigger { .. })));
        digital_out.trigger_source_set(TriggerSource::Pc).unwrap();
        assert_eq!(digital_out.trigger_source_get().unwrap(), TriggerSource::Pc);
        digital_out.repeat_trigger_set(true).unwrap();
        assert!(digital_out.repeat_trigger_get().unwrap());
        assert_eq!(digital_out.wait_info().unwrap().1, 1e4);
        digital_out.wait_set(0.002).unwrap();
        assert_eq!(digital_out.wait_get().unwrap(), 0.002);
        digital_out.configure(true).unwrap();
        assert_eq!(digital_out.status().unwrap(), InstrumentState::Wait);
        session.trigger_pc().unwrap();
        // the wait runs from the moment the generator armed
        assert_eq!(digital_out.status().unwrap(), InstrumentState::Wait);
        assert_eq!(digital_out.status().unwrap(), InstrumentState::Running);
    }

    #[test]
    fn test_reset() {
        let (_driver, session) = open();
        let digital_out = session.digital_out();
        digital_out.apply(&PatternConfiguration::clock(0, 10, 1, 1)).unwrap();
        digital_out.configure(true).unwrap();
        digital_out.reset().unwrap();
        assert!(!digital_out.enable_get(0).unwrap());
        assert_eq!(digital_out.status().unwrap(), InstrumentState::Ready);
    }
}
