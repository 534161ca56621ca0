//! The oscilloscope.

use crate::{AcquisitionConfiguration, Result};
use crate::params::{Instrument, Key, Param, StepRange, Value};
use crate::session::SessionRef;
use crate::sys::{Driver, Target};
use crate::trigger::{self, TriggerDestination};
use crate::wire::{
    AcquisitionMode, CapabilitySet, Filter, InstrumentState, TriggerCondition, TriggerLength,
    TriggerSource, TriggerType,
};
use super::{count, RecordStatus};

const TARGET: Target = Target { instrument: Instrument::AnalogIn, channel: None };

fn key(param: Param) -> Key {
    Key::new(param)
}

fn channel_key(param: Param, channel: usize) -> Key {
    Key::channel(param, channel)
}

pub struct AnalogIn<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> AnalogIn<D> {
    pub(crate) fn new(session: SessionRef<D>) -> AnalogIn<D> {
        AnalogIn { session }
    }

    pub fn reset(&self) -> Result<()> {
        self.session.with(|link| link.reset(TARGET))
    }

    /// Applies pending settings; with `start`, arms the acquisition. `reconfigure` also
    /// restarts the auto-trigger timeout.
    pub fn configure(&self, reconfigure: bool, start: bool) -> Result<()> {
        self.session.with(|link| link.configure(TARGET, reconfigure, start))
    }

    /// Polls the acquisition state. With `read_data`, also latches the sample counters and
    /// transfers the acquired samples for the `status_*` readers.
    pub fn status(&self, read_data: bool) -> Result<InstrumentState> {
        self.session.with(|link| link.status(TARGET, read_data))
    }

    pub fn status_samples_left(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::AnalogInSamplesLeft)).map(count))
    }

    pub fn status_samples_valid(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::AnalogInSamplesValid)).map(count))
    }

    pub fn status_index_write(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::AnalogInIndexWrite)).map(count))
    }

    pub fn status_auto_triggered(&self) -> Result<bool> {
        self.session.with(|link| link.get_bool(key(Param::AnalogInAutoTriggered)))
    }

    /// The first `len` samples of `channel` transferred by the last status read, in volts.
    pub fn status_data(&self, channel: usize, len: usize) -> Result<Vec<f64>> {
        self.session.with(|link| {
            let mut data = vec![0.0; len];
            link.read_analog(channel_key(Param::AnalogInData, channel), &mut data)?;
            Ok(data)
        })
    }

    /// Minimum and maximum envelopes of `channel`, `len` points each.
    pub fn status_noise(&self, channel: usize, len: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        self.session.with(|link| {
            let mut min = vec![0.0; len];
            let mut max = vec![0.0; len];
            link.read_analog(channel_key(Param::AnalogInNoiseMin, channel), &mut min)?;
            link.read_analog(channel_key(Param::AnalogInNoiseMax, channel), &mut max)?;
            Ok((min, max))
        })
    }

    /// Most recent sample of `channel`.
    pub fn status_sample(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogInSample, channel)))
    }

    pub fn status_record(&self) -> Result<RecordStatus> {
        self.session.with(|link| {
            link.get_shaped(key(Param::AnalogInRecordStatus), RecordStatus::from_value)
        })
    }

    pub fn record_length_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInRecordLength), Value::Float(seconds)))
    }

    pub fn record_length_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInRecordLength)))
    }

    pub fn frequency_info(&self) -> Result<(f64, f64)> {
        self.session.with(|link| link.info_range(key(Param::AnalogInFrequency)))
    }

    pub fn frequency_set(&self, hertz: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInFrequency), Value::Float(hertz)))
    }

    pub fn frequency_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInFrequency)))
    }

    /// ADC resolution in bits.
    pub fn bits_info(&self) -> Result<u32> {
        self.session.with(|link| link.get_uint(key(Param::AnalogInBits)))
    }

    pub fn buffer_size_info(&self) -> Result<(usize, usize)> {
        self.session.with(|link| {
            let (min, max) = link.info_range(key(Param::AnalogInBufferSize))?;
            Ok((min as usize, max as usize))
        })
    }

    pub fn buffer_size_set(&self, samples: usize) -> Result<()> {
        let samples = i32::try_from(samples).unwrap_or(i32::MAX);
        self.session.with(|link| link.set(key(Param::AnalogInBufferSize), Value::Int(samples)))
    }

    pub fn buffer_size_get(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::AnalogInBufferSize)).map(count))
    }

    pub fn noise_size_info(&self) -> Result<usize> {
        self.session.with(|link| link.info_limit(key(Param::AnalogInNoiseSize)).map(|max| max as usize))
    }

    pub fn noise_size_get(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::AnalogInNoiseSize)).map(count))
    }

    pub fn acquisition_mode_info(&self) -> Result<CapabilitySet<AcquisitionMode>> {
        self.session.with(|link| link.info_set(key(Param::AnalogInAcquisitionMode)))
    }

    pub fn acquisition_mode_set(&self, mode: AcquisitionMode) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::AnalogInAcquisitionMode), mode))
    }

    pub fn acquisition_mode_get(&self) -> Result<AcquisitionMode> {
        self.session.with(|link| link.get_enum(key(Param::AnalogInAcquisitionMode)))
    }

    pub fn channel_count(&self) -> Result<usize> {
        self.session.with(|link| Ok(link.channel_count(Instrument::AnalogIn)))
    }

    pub fn channel_enable_set(&self, channel: usize, enable: bool) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogInChannelEnable, channel), Value::Bool(enable))
        })
    }

    pub fn channel_enable_get(&self, channel: usize) -> Result<bool> {
        self.session.with(|link| link.get_bool(channel_key(Param::AnalogInChannelEnable, channel)))
    }

    pub fn channel_filter_info(&self, channel: usize) -> Result<CapabilitySet<Filter>> {
        self.session.with(|link| link.info_set(channel_key(Param::AnalogInChannelFilter, channel)))
    }

    pub fn channel_filter_set(&self, channel: usize, filter: Filter) -> Result<()> {
        self.session.with(|link| link.set_enum(channel_key(Param::AnalogInChannelFilter, channel), filter))
    }

    pub fn channel_filter_get(&self, channel: usize) -> Result<Filter> {
        self.session.with(|link| link.get_enum(channel_key(Param::AnalogInChannelFilter, channel)))
    }

    pub fn channel_range_info(&self, channel: usize) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(channel_key(Param::AnalogInChannelRange, channel)))
    }

    /// The discrete peak-to-peak ranges `channel` supports, in volts.
    pub fn channel_range_steps(&self, channel: usize) -> Result<Vec<f64>> {
        self.session.with(|link| link.range_steps(channel_key(Param::AnalogInChannelRange, channel)))
    }

    pub fn channel_range_set(&self, channel: usize, volts: f64) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogInChannelRange, channel), Value::Float(volts))
        })
    }

    pub fn channel_range_get(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogInChannelRange, channel)))
    }

    pub fn channel_offset_info(&self, channel: usize) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(channel_key(Param::AnalogInChannelOffset, channel)))
    }

    pub fn channel_offset_set(&self, channel: usize, volts: f64) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogInChannelOffset, channel), Value::Float(volts))
        })
    }

    pub fn channel_offset_get(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogInChannelOffset, channel)))
    }

    pub fn channel_attenuation_set(&self, channel: usize, attenuation: f64) -> Result<()> {
        self.session.with(|link| {
            link.set(channel_key(Param::AnalogInChannelAttenuation, channel), Value::Float(attenuation))
        })
    }

    pub fn channel_attenuation_get(&self, channel: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(channel_key(Param::AnalogInChannelAttenuation, channel)))
    }

    pub fn trigger_source_info(&self) -> Result<CapabilitySet<TriggerSource>> {
        self.session.with(|link| trigger::source_info(link, TriggerDestination::AnalogIn))
    }

    pub fn trigger_source_set(&self, source: TriggerSource) -> Result<()> {
        self.session.with(|link| trigger::bind(link, TriggerDestination::AnalogIn, source))
    }

    pub fn trigger_source_get(&self) -> Result<TriggerSource> {
        self.session.with(|link| trigger::read(link, TriggerDestination::AnalogIn))
    }

    pub fn trigger_position_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::AnalogInTriggerPosition)))
    }

    /// Seconds from the trigger to the center of the buffer.
    pub fn trigger_position_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInTriggerPosition), Value::Float(seconds)))
    }

    pub fn trigger_position_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerPosition)))
    }

    /// Trigger position of the last acquisition.
    pub fn trigger_position_status(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerPositionStatus)))
    }

    pub fn trigger_auto_timeout_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::AnalogInTriggerAutoTimeout)))
    }

    /// Seconds to wait for a trigger before acquiring anyway; `0.0` waits forever.
    pub fn trigger_auto_timeout_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInTriggerAutoTimeout), Value::Float(seconds)))
    }

    pub fn trigger_auto_timeout_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerAutoTimeout)))
    }

    pub fn trigger_hold_off_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::AnalogInTriggerHoldOff)))
    }

    pub fn trigger_hold_off_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInTriggerHoldOff), Value::Float(seconds)))
    }

    pub fn trigger_hold_off_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerHoldOff)))
    }

    pub fn trigger_type_info(&self) -> Result<CapabilitySet<TriggerType>> {
        self.session.with(|link| link.info_set(key(Param::AnalogInTriggerType)))
    }

    pub fn trigger_type_set(&self, kind: TriggerType) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::AnalogInTriggerType), kind))
    }

    pub fn trigger_type_get(&self) -> Result<TriggerType> {
        self.session.with(|link| link.get_enum(key(Param::AnalogInTriggerType)))
    }

    pub fn trigger_channel_info(&self) -> Result<(usize, usize)> {
        self.session.with(|link| {
            let (min, max) = link.info_range(key(Param::AnalogInTriggerChannel))?;
            Ok((min as usize, max as usize))
        })
    }

    pub fn trigger_channel_set(&self, channel: usize) -> Result<()> {
        self.session.with(|link| {
            link.check_channel(Instrument::AnalogIn, channel)?;
            link.set(key(Param::AnalogInTriggerChannel), Value::Int(channel as i32))
        })
    }

    pub fn trigger_channel_get(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::AnalogInTriggerChannel)).map(count))
    }

    pub fn trigger_filter_info(&self) -> Result<CapabilitySet<Filter>> {
        self.session.with(|link| link.info_set(key(Param::AnalogInTriggerFilter)))
    }

    pub fn trigger_filter_set(&self, filter: Filter) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::AnalogInTriggerFilter), filter))
    }

    pub fn trigger_filter_get(&self) -> Result<Filter> {
        self.session.with(|link| link.get_enum(key(Param::AnalogInTriggerFilter)))
    }

    pub fn trigger_level_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::AnalogInTriggerLevel)))
    }

    pub fn trigger_level_set(&self, volts: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInTriggerLevel), Value::Float(volts)))
    }

    pub fn trigger_level_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerLevel)))
    }

    pub fn trigger_hysteresis_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::AnalogInTriggerHysteresis)))
    }

    pub fn trigger_hysteresis_set(&self, volts: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInTriggerHysteresis), Value::Float(volts)))
    }

    pub fn trigger_hysteresis_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerHysteresis)))
    }

    pub fn trigger_condition_info(&self) -> Result<CapabilitySet<TriggerCondition>> {
        self.session.with(|link| link.info_set(key(Param::AnalogInTriggerCondition)))
    }

    pub fn trigger_condition_set(&self, condition: TriggerCondition) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::AnalogInTriggerCondition), condition))
    }

    pub fn trigger_condition_get(&self) -> Result<TriggerCondition> {
        self.session.with(|link| link.get_enum(key(Param::AnalogInTriggerCondition)))
    }

    pub fn trigger_length_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::AnalogInTriggerLength)))
    }

    pub fn trigger_length_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| link.set(key(Param::AnalogInTriggerLength), Value::Float(seconds)))
    }

    pub fn trigger_length_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::AnalogInTriggerLength)))
    }

    pub fn trigger_length_condition_info(&self) -> Result<CapabilitySet<TriggerLength>> {
        self.session.with(|link| link.info_set(key(Param::AnalogInTriggerLengthCondition)))
    }

    pub fn trigger_length_condition_set(&self, condition: TriggerLength) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::AnalogInTriggerLengthCondition), condition))
    }

    pub fn trigger_length_condition_get(&self) -> Result<TriggerLength> {
        self.session.with(|link| link.get_enum(key(Param::AnalogInTriggerLengthCondition)))
    }

    /// Applies a whole acquisition setup under one lock, configuring the instrument once at the
    /// end if auto-configure is on.
    pub fn apply(&self, config: &AcquisitionConfiguration) -> Result<()> {
        self.session.with(|link| link.batch(TARGET, |link| {
            // reject bad indices before anything is written
            if let Some(last) = config.channels.len().checked_sub(1) {
                link.check_channel(Instrument::AnalogIn, last)?;
            }
            link.check_channel(Instrument::AnalogIn, config.trigger_channel)?;
            trigger::bind(link, TriggerDestination::AnalogIn, config.trigger_source)?;
            link.set(key(Param::AnalogInFrequency), Value::Float(config.frequency))?;
            let buffer_size = match config.buffer_size {
                Some(buffer_size) => buffer_size,
                None => link.info_range(key(Param::AnalogInBufferSize))?.1 as usize,
            };
            let buffer_size = i32::try_from(buffer_size).unwrap_or(i32::MAX);
            link.set(key(Param::AnalogInBufferSize), Value::Int(buffer_size))?;
            link.set_enum(key(Param::AnalogInAcquisitionMode), config.mode)?;
            link.set(key(Param::AnalogInRecordLength), Value::Float(config.record_length))?;
            for (channel, channel_config) in config.channels.iter().enumerate() {
                let at = |param| channel_key(param, channel);
                link.set(at(Param::AnalogInChannelEnable), Value::Bool(channel_config.enabled))?;
                link.set(at(Param::AnalogInChannelRange), Value::Float(channel_config.range))?;
                link.set(at(Param::AnalogInChannelOffset), Value::Float(channel_config.offset))?;
                link.set_enum(at(Param::AnalogInChannelFilter), channel_config.filter)?;
                link.set(at(Param::AnalogInChannelAttenuation), Value::Float(channel_config.attenuation))?;
            }
            link.set(key(Param::AnalogInTriggerPosition), Value::Float(config.trigger_position))?;
            link.set(key(Param::AnalogInTriggerAutoTimeout), Value::Float(config.trigger_auto_timeout))?;
            link.set(key(Param::AnalogInTriggerChannel), Value::Int(config.trigger_channel as i32))?;
            link.set_enum(key(Param::AnalogInTriggerType), config.trigger_type)?;
            link.set(key(Param::AnalogInTriggerLevel), Value::Float(config.trigger_level))?;
            link.set_enum(key(Param::AnalogInTriggerCondition), config.trigger_condition)?;
            Ok(())
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ChannelConfiguration, Error, Function, Session};
    use crate::instrument::fixture::open;
    use crate::sys::sim::SimDriver;

    fn acquire(analog_in: &AnalogIn<SimDriver>) -> InstrumentState {
        analog_in.configure(false, true).unwrap();
        for _ in 0..100 {
            let state = analog_in.status(true).unwrap();
            if state == InstrumentState::Done {
                return state
            }
        }
        analog_in.status(true).unwrap()
    }

    #[test]
    fn test_channel_bounds() {
        let (driver, session) = open();
        let analog_in = session.analog_in();
        assert_eq!(analog_in.channel_count().unwrap(), 2);
        let calls = driver.calls();
        assert!(matches!(analog_in.channel_range_set(2, 5.0),
                         Err(Error::InvalidChannel { instrument: "analog in", channel: 2, count: 2 })));
        assert!(matches!(analog_in.channel_enable_get(9), Err(Error::InvalidChannel { .. })));
        assert!(matches!(analog_in.status_data(2, 16), Err(Error::InvalidChannel { .. })));
        assert!(matches!(analog_in.trigger_channel_set(2), Err(Error::InvalidChannel { .. })));
        assert_eq!(driver.calls(), calls);
        analog_in.channel_range_set(1, 5.0).unwrap();
    }

    #[test]
    fn test_capabilities() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        assert_eq!(analog_in.acquisition_mode_info().unwrap().len(), 4);
        assert!(analog_in.channel_filter_info(0).unwrap().contains(Filter::MinMax));
        assert_eq!(analog_in.channel_range_steps(0).unwrap(), vec![5.0, 50.0]);
        assert_eq!(analog_in.bits_info().unwrap(), 14);
        assert_eq!(analog_in.buffer_size_info().unwrap(), (16, 8192));
        assert_eq!(analog_in.noise_size_info().unwrap(), 1024);
        let (min, max) = analog_in.frequency_info().unwrap();
        assert!(min < 1e6 && max >= 1e8);
    }

    #[test]
    fn test_settings_round_trip() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        analog_in.acquisition_mode_set(AcquisitionMode::ScanShift).unwrap();
        assert_eq!(analog_in.acquisition_mode_get().unwrap(), AcquisitionMode::ScanShift);
        analog_in.channel_filter_set(1, Filter::Average).unwrap();
        assert_eq!(analog_in.channel_filter_get(1).unwrap(), Filter::Average);
        analog_in.trigger_condition_set(TriggerCondition::FallingNegative).unwrap();
        assert_eq!(analog_in.trigger_condition_get().unwrap(), TriggerCondition::FallingNegative);
        analog_in.trigger_length_condition_set(TriggerLength::More).unwrap();
        assert_eq!(analog_in.trigger_length_condition_get().unwrap(), TriggerLength::More);
        analog_in.trigger_type_set(TriggerType::Pulse).unwrap();
        assert_eq!(analog_in.trigger_type_get().unwrap(), TriggerType::Pulse);
        analog_in.trigger_level_set(0.5).unwrap();
        assert_eq!(analog_in.trigger_level_get().unwrap(), 0.5);
        analog_in.trigger_channel_set(1).unwrap();
        assert_eq!(analog_in.trigger_channel_get().unwrap(), 1);
        analog_in.channel_attenuation_set(0, 10.0).unwrap();
        assert_eq!(analog_in.channel_attenuation_get(0).unwrap(), 10.0);
        // the device picks the smallest range that fits
        analog_in.channel_range_set(0, 6.0).unwrap();
        assert_eq!(analog_in.channel_range_get(0).unwrap(), 50.0);
    }

    #[test]
    fn test_single_acquisition() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.node_function_set(0, crate::AnalogOutNode::Carrier, Function::Dc).unwrap();
        analog_out.node_offset_set(0, crate::AnalogOutNode::Carrier, -0.75).unwrap();
        analog_out.configure(Some(0), true).unwrap();

        let analog_in = session.analog_in();
        analog_in.buffer_size_set(4000).unwrap();
        assert_eq!(acquire(&analog_in), InstrumentState::Done);
        assert_eq!(analog_in.status_samples_valid().unwrap(), 4000);
        assert_eq!(analog_in.status_samples_left().unwrap(), 0);
        assert!(!analog_in.status_auto_triggered().unwrap());
        let data = analog_in.status_data(0, 4000).unwrap();
        assert!(data.iter().all(|&sample| (sample + 0.75).abs() < 1e-9));
        // nothing drives the second channel
        let data = analog_in.status_data(1, 10).unwrap();
        assert!(data.iter().all(|&sample| sample == 0.0));
        let (min, max) = analog_in.status_noise(0, 8).unwrap();
        assert!(min.iter().zip(&max).all(|(min, max)| min <= max));
    }

    #[test]
    fn test_sine_loopback() {
        let (_driver, session) = open();
        let analog_out = session.analog_out();
        analog_out.node_frequency_set(0, crate::AnalogOutNode::Carrier, 1e3).unwrap();
        analog_out.node_amplitude_set(0, crate::AnalogOutNode::Carrier, 2.0).unwrap();
        analog_out.configure(Some(0), true).unwrap();

        let analog_in = session.analog_in();
        analog_in.frequency_set(1e6).unwrap();
        analog_in.buffer_size_set(2000).unwrap();
        acquire(&analog_in);
        let data = analog_in.status_data(0, 2000).unwrap();
        let peak = data.iter().copied().fold(f64::MIN, f64::max);
        let trough = data.iter().copied().fold(f64::MAX, f64::min);
        assert!((peak - 2.0).abs() < 1e-3);
        assert!((trough + 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_record_mode() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        analog_in.acquisition_mode_set(AcquisitionMode::Record).unwrap();
        analog_in.frequency_set(1e6).unwrap();
        analog_in.record_length_set(0.005).unwrap();
        analog_in.configure(false, true).unwrap();
        let mut total = 0;
        for _ in 0..20 {
            let state = analog_in.status(true).unwrap();
            let record = analog_in.status_record().unwrap();
            assert_eq!(record.lost, 0);
            total += record.available;
            if state == InstrumentState::Done {
                break
            }
        }
        assert_eq!(total, 5000);
    }

    #[test]
    fn test_auto_trigger_timeout() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        analog_in.trigger_source_set(TriggerSource::DetectorDigitalIn).unwrap();
        analog_in.trigger_auto_timeout_set(0.01).unwrap();
        assert_eq!(acquire(&analog_in), InstrumentState::Done);
        assert!(analog_in.status_auto_triggered().unwrap());
    }

    #[test]
    fn test_apply() {
        let (driver, session) = open();
        let analog_in = session.analog_in();
        let calls = driver.calls();
        analog_in.apply(&AcquisitionConfiguration {
            frequency: 2e6,
            buffer_size: Some(1000),
            channels: vec![
                ChannelConfiguration { range: 50.0, ..Default::default() },
                ChannelConfiguration { enabled: false, ..Default::default() },
            ],
            trigger_source: TriggerSource::Pc,
            trigger_channel: 1,
            ..Default::default()
        }).unwrap();
        // every setting once, the trigger source capability query, and a single configure
        let settings = 4 + 2 * 5 + 1 + 6;
        assert_eq!(driver.calls() - calls, settings + 1 + 1);
        assert_eq!(analog_in.frequency_get().unwrap(), 2e6);
        assert_eq!(analog_in.buffer_size_get().unwrap(), 1000);
        assert_eq!(analog_in.channel_range_get(0).unwrap(), 50.0);
        assert!(!analog_in.channel_enable_get(1).unwrap());
        assert_eq!(analog_in.trigger_source_get().unwrap(), TriggerSource::Pc);

        // the largest buffer when none is given
        analog_in.apply(&AcquisitionConfiguration::default()).unwrap();
        assert_eq!(analog_in.buffer_size_get().unwrap(), 8192);
    }

    #[test]
    fn test_apply_rejects_bad_channel() {
        let (driver, session) = open();
        let analog_in = session.analog_in();
        let calls = driver.calls();
        let config = AcquisitionConfiguration {
            frequency: 2e6,
            channels: vec![ChannelConfiguration::default(); 3],
            ..Default::default()
        };
        assert!(matches!(analog_in.apply(&config), Err(Error::InvalidChannel { channel: 2, .. })));
        let config = AcquisitionConfiguration {
            frequency: 2e6,
            trigger_channel: 5,
            ..Default::default()
        };
        assert!(matches!(analog_in.apply(&config), Err(Error::InvalidChannel { channel: 5, .. })));
        // nothing was written
        assert_eq!(driver.calls(), calls);
        assert_eq!(analog_in.frequency_get().unwrap(), 1e6);
    }

    #[test]
    fn test_reset() {
        let (_driver, session) = open();
        let analog_in = session.analog_in();
        analog_in.frequency_set(123.0).unwrap();
        analog_in.reset().unwrap();
        assert_eq!(analog_in.frequency_get().unwrap(), 1e6);
        drop::<Session<SimDriver>>(session);
        assert!(matches!(analog_in.reset(), Err(Error::SessionClosed)));
    }
}
