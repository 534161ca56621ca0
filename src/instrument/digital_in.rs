//! The logic analyzer.
//!
//! Samples are captured as packed words of 8, 16 or 32 bits, one bit per line, and handed
//! out either raw as an [`AcquisitionBuffer`] or decoded.

use crate::{Error, Result};
use crate::codec::{AcquisitionBuffer, SampleWidth};
use crate::params::{Instrument, Key, Param, StepRange, Value};
use crate::session::{Link, SessionRef};
use crate::sys::{Driver, Target};
use crate::trigger::{self, TriggerDestination};
use crate::wire::{AcquisitionMode, CapabilitySet, ClockSource, InstrumentState, SampleMode, TriggerSource};
use super::{count, DigitalTrigger, RecordStatus};

const TARGET: Target = Target { instrument: Instrument::DigitalIn, channel: None };

fn key(param: Param) -> Key {
    Key::new(param)
}

fn sample_width<D: Driver>(link: &Link<D>) -> Result<SampleWidth> {
    let bits = link.get_int(key(Param::DigitalInSampleFormat))?;
    SampleWidth::try_from(bits.max(0) as u32)
}

pub struct DigitalIn<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> DigitalIn<D> {
    pub(crate) fn new(session: SessionRef<D>) -> DigitalIn<D> {
        DigitalIn { session }
    }

    pub fn reset(&self) -> Result<()> {
        self.session.with(|link| link.reset(TARGET))
    }

    pub fn configure(&self, reconfigure: bool, start: bool) -> Result<()> {
        self.session.with(|link| link.configure(TARGET, reconfigure, start))
    }

    pub fn status(&self, read_data: bool) -> Result<InstrumentState> {
        self.session.with(|link| link.status(TARGET, read_data))
    }

    pub fn status_samples_left(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::DigitalInSamplesLeft)).map(count))
    }

    pub fn status_samples_valid(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::DigitalInSamplesValid)).map(count))
    }

    pub fn status_index_write(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::DigitalInIndexWrite)).map(count))
    }

    pub fn status_auto_triggered(&self) -> Result<bool> {
        self.session.with(|link| link.get_bool(key(Param::DigitalInAutoTriggered)))
    }

    /// The first `samples` samples transferred by the last status read, still packed in the
    /// current sample format.
    pub fn status_buffer(&self, samples: usize) -> Result<AcquisitionBuffer> {
        self.session.with(|link| {
            let width = sample_width(link)?;
            let len = samples.checked_mul(width.bytes())
                .ok_or(Error::BufferTooLarge { samples, width: width.bits() })?;
            let mut bytes = vec![0; len];
            link.read_digital(key(Param::DigitalInData), &mut bytes)?;
            Ok(AcquisitionBuffer::new(bytes, width))
        })
    }

    /// Like [`status_buffer`](Self::status_buffer), decoded into one word per sample.
    pub fn status_data(&self, samples: usize) -> Result<Vec<u32>> {
        self.status_buffer(samples)?.decode()
    }

    pub fn status_record(&self) -> Result<RecordStatus> {
        self.session.with(|link| {
            link.get_shaped(key(Param::DigitalInRecordStatus), RecordStatus::from_value)
        })
    }

    /// Frequency of the internal clock in hertz.
    pub fn internal_clock_info(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::DigitalInInternalClock)))
    }

    pub fn clock_source_info(&self) -> Result<CapabilitySet<ClockSource>> {
        self.session.with(|link| link.info_set(key(Param::DigitalInClockSource)))
    }

    pub fn clock_source_set(&self, source: ClockSource) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::DigitalInClockSource), source))
    }

    pub fn clock_source_get(&self) -> Result<ClockSource> {
        self.session.with(|link| link.get_enum(key(Param::DigitalInClockSource)))
    }

    /// Largest clock divider.
    pub fn divider_info(&self) -> Result<u32> {
        self.session.with(|link| link.info_limit(key(Param::DigitalInDivider)).map(|max| max as u32))
    }

    /// Samples at the clock frequency divided by `divider`.
    pub fn divider_set(&self, divider: u32) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalInDivider), Value::Uint(divider)))
    }

    pub fn divider_get(&self) -> Result<u32> {
        self.session.with(|link| link.get_uint(key(Param::DigitalInDivider)))
    }

    /// Number of lines captured.
    pub fn bits_info(&self) -> Result<u32> {
        self.session.with(|link| link.get_uint(key(Param::DigitalInBits)))
    }

    pub fn sample_format_set(&self, width: SampleWidth) -> Result<()> {
        self.session.with(|link| {
            link.set(key(Param::DigitalInSampleFormat), Value::Int(width.bits() as i32))
        })
    }

    pub fn sample_format_get(&self) -> Result<SampleWidth> {
        self.session.with(|link| sample_width(link))
    }

    /// Largest buffer in samples.
    pub fn buffer_size_info(&self) -> Result<usize> {
        self.session.with(|link| link.info_limit(key(Param::DigitalInBufferSize)).map(|max| max as usize))
    }

    pub fn buffer_size_set(&self, samples: usize) -> Result<()> {
        let samples = i32::try_from(samples).unwrap_or(i32::MAX);
        self.session.with(|link| link.set(key(Param::DigitalInBufferSize), Value::Int(samples)))
    }

    pub fn buffer_size_get(&self) -> Result<usize> {
        self.session.with(|link| link.get_int(key(Param::DigitalInBufferSize)).map(count))
    }

    pub fn sample_mode_info(&self) -> Result<CapabilitySet<SampleMode>> {
        self.session.with(|link| link.info_set(key(Param::DigitalInSampleMode)))
    }

    pub fn sample_mode_set(&self, mode: SampleMode) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::DigitalInSampleMode), mode))
    }

    pub fn sample_mode_get(&self) -> Result<SampleMode> {
        self.session.with(|link| link.get_enum(key(Param::DigitalInSampleMode)))
    }

    pub fn acquisition_mode_info(&self) -> Result<CapabilitySet<AcquisitionMode>> {
        self.session.with(|link| link.info_set(key(Param::DigitalInAcquisitionMode)))
    }

    pub fn acquisition_mode_set(&self, mode: AcquisitionMode) -> Result<()> {
        self.session.with(|link| link.set_enum(key(Param::DigitalInAcquisitionMode), mode))
    }

    pub fn acquisition_mode_get(&self) -> Result<AcquisitionMode> {
        self.session.with(|link| link.get_enum(key(Param::DigitalInAcquisitionMode)))
    }

    pub fn trigger_source_info(&self) -> Result<CapabilitySet<TriggerSource>> {
        self.session.with(|link| trigger::source_info(link, TriggerDestination::DigitalIn))
    }

    pub fn trigger_source_set(&self, source: TriggerSource) -> Result<()> {
        self.session.with(|link| trigger::bind(link, TriggerDestination::DigitalIn, source))
    }

    pub fn trigger_source_get(&self) -> Result<TriggerSource> {
        self.session.with(|link| trigger::read(link, TriggerDestination::DigitalIn))
    }

    /// Largest number of samples that can be taken after the trigger.
    pub fn trigger_position_info(&self) -> Result<u32> {
        self.session.with(|link| {
            link.info_limit(key(Param::DigitalInTriggerPosition)).map(|max| max as u32)
        })
    }

    /// Samples to take after the trigger; the rest of the buffer holds samples before it.
    pub fn trigger_position_set(&self, samples: u32) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalInTriggerPosition), Value::Uint(samples)))
    }

    pub fn trigger_position_get(&self) -> Result<u32> {
        self.session.with(|link| link.get_uint(key(Param::DigitalInTriggerPosition)))
    }

    pub fn trigger_auto_timeout_info(&self) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(key(Param::DigitalInTriggerAutoTimeout)))
    }

    pub fn trigger_auto_timeout_set(&self, seconds: f64) -> Result<()> {
        self.session.with(|link| {
            link.set(key(Param::DigitalInTriggerAutoTimeout), Value::Float(seconds))
        })
    }

    pub fn trigger_auto_timeout_get(&self) -> Result<f64> {
        self.session.with(|link| link.get_float(key(Param::DigitalInTriggerAutoTimeout)))
    }

    /// Lines usable in each condition of the trigger detector.
    pub fn trigger_info(&self) -> Result<DigitalTrigger> {
        self.session.with(|link| {
            link.info_masks(key(Param::DigitalInTrigger)).map(DigitalTrigger::from_masks)
        })
    }

    pub fn trigger_set(&self, trigger: DigitalTrigger) -> Result<()> {
        self.session.with(|link| link.set(key(Param::DigitalInTrigger), Value::Masks(trigger.masks())))
    }

    pub fn trigger_get(&self) -> Result<DigitalTrigger> {
        self.session.with(|link| {
            link.get_shaped(key(Param::DigitalInTrigger), |value| match value {
                Value::Masks(masks) => Some(DigitalTrigger::from_masks(masks)),
                _ => None,
            })
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Pins;
    use crate::instrument::fixture::open;
    use crate::sys::sim::SimDriver;

    fn capture(digital_in: &DigitalIn<SimDriver>) {
        digital_in.configure(false, true).unwrap();
        while digital_in.status(true).unwrap() != InstrumentState::Done {}
    }

    #[test]
    fn test_capture_ramp() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        assert_eq!(digital_in.bits_info().unwrap(), 16);
        assert_eq!(digital_in.sample_format_get().unwrap(), SampleWidth::Bits16);
        digital_in.divider_set(1000).unwrap();
        digital_in.buffer_size_set(256).unwrap();
        capture(&digital_in);
        assert_eq!(digital_in.status_samples_valid().unwrap(), 256);
        let buffer = digital_in.status_buffer(256).unwrap();
        assert_eq!(buffer.count(), 256);
        assert_eq!(buffer.bytes().len(), 512);
        assert_eq!(digital_in.status_data(256).unwrap(), (0..256).collect::<Vec<u32>>());
    }

    #[test]
    fn test_sample_formats() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        digital_in.divider_set(1000).unwrap();
        digital_in.buffer_size_set(300).unwrap();
        digital_in.sample_format_set(SampleWidth::Bits8).unwrap();
        assert_eq!(digital_in.sample_format_get().unwrap(), SampleWidth::Bits8);
        capture(&digital_in);
        let data = digital_in.status_data(300).unwrap();
        assert_eq!(data[255], 255);
        assert_eq!(data[256], 0);

        let digital_io = session.digital_io();
        digital_io.output_enable_set(Pins::line(15)).unwrap();
        digital_io.output_set(Pins::line(15)).unwrap();
        digital_in.sample_format_set(SampleWidth::Bits32).unwrap();
        capture(&digital_in);
        let buffer = digital_in.status_buffer(300).unwrap();
        assert_eq!(buffer.width(), SampleWidth::Bits32);
        assert!(buffer.decode().unwrap().iter().all(|&sample| sample & 0x8000 != 0));
    }

    #[test]
    fn test_read_beyond_buffer() {
        let (driver, session) = open();
        let digital_in = session.digital_in();
        assert_eq!(digital_in.buffer_size_info().unwrap(), 4096);
        assert!(matches!(digital_in.status_data(5000),
                         Err(Error::Transport { operation: "DigitalInDataGet", .. })));
        let calls = driver.calls();
        assert!(matches!(digital_in.status_buffer(usize::MAX),
                         Err(Error::BufferTooLarge { samples: usize::MAX, width: 16 })));
        assert_eq!(driver.calls(), calls + 1);
    }

    #[test]
    fn test_record() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        digital_in.divider_set(1000).unwrap();
        digital_in.acquisition_mode_set(AcquisitionMode::Record).unwrap();
        digital_in.configure(false, true).unwrap();
        let mut total = 0;
        for _ in 0..5 {
            assert_ne!(digital_in.status(true).unwrap(), InstrumentState::Done);
            let record = digital_in.status_record().unwrap();
            assert_eq!((record.lost, record.corrupt), (0, 0));
            total += record.available;
        }
        assert_eq!(total, 200);
    }

    #[test]
    fn test_trigger_detector() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        let info = digital_in.trigger_info().unwrap();
        assert_eq!(info.rise, Pins::from_bits_retain(0xffff));
        digital_in.trigger_set(DigitalTrigger {
            rise: Pins::line(3),
            high: Pins::from_bits_retain(0x3_0001),
            ..Default::default()
        }).unwrap();
        let trigger = digital_in.trigger_get().unwrap();
        assert_eq!(trigger.rise, Pins::line(3));
        // lines the device does not have are dropped
        assert_eq!(trigger.high, Pins::line(0));
        assert!(trigger.low.is_empty());
    }

    #[test]
    fn test_settings() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        assert_eq!(digital_in.internal_clock_info().unwrap(), 100e6);
        assert_eq!(digital_in.divider_info().unwrap(), 1 << 30);
        assert!(digital_in.clock_source_info().unwrap().contains(ClockSource::External));
        digital_in.clock_source_set(ClockSource::External).unwrap();
        assert_eq!(digital_in.clock_source_get().unwrap(), ClockSource::External);
        assert_eq!(digital_in.sample_mode_info().unwrap().len(), 2);
        digital_in.sample_mode_set(SampleMode::Noise).unwrap();
        assert_eq!(digital_in.sample_mode_get().unwrap(), SampleMode::Noise);
        assert_eq!(digital_in.acquisition_mode_info().unwrap().len(), 4);
        digital_in.acquisition_mode_set(AcquisitionMode::ScanScreen).unwrap();
        assert_eq!(digital_in.acquisition_mode_get().unwrap(), AcquisitionMode::ScanScreen);
        assert_eq!(digital_in.trigger_position_info().unwrap(), 4096);
        digital_in.trigger_position_set(100).unwrap();
        assert_eq!(digital_in.trigger_position_get().unwrap(), 100);
        digital_in.trigger_auto_timeout_set(0.5).unwrap();
        assert_eq!(digital_in.trigger_auto_timeout_get().unwrap(), 0.5);
        assert_eq!(digital_in.trigger_auto_timeout_info().unwrap().max, 10.0);
        digital_in.divider_set(10).unwrap();
        assert_eq!(digital_in.divider_get().unwrap(), 10);
        assert_eq!(digital_in.buffer_size_get().unwrap(), 4096);
    }

    #[test]
    fn test_trigger_source() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        assert!(digital_in.trigger_source_info().unwrap().contains(TriggerSource::DetectorAnalogIn));
        digital_in.trigger_source_set(TriggerSource::AnalogIn).unwrap();
        assert_eq!(digital_in.trigger_source_get().unwrap(), TriggerSource::AnalogIn);
        digital_in.configure(false, true).unwrap();
        for _ in 0..4 {
            digital_in.status(false).unwrap();
        }
        assert_eq!(digital_in.status(false).unwrap(), InstrumentState::Wait);

        // the logic analyzer starts once the scope runs
        let analog_in = session.analog_in();
        analog_in.configure(false, true).unwrap();
        let state = (0..5).map(|_| digital_in.status(false).unwrap())
            .find(|state| state.is_running());
        assert_eq!(state, Some(InstrumentState::Running));
        assert!(!digital_in.status_auto_triggered().unwrap());
    }

    #[test]
    fn test_reset() {
        let (_driver, session) = open();
        let digital_in = session.digital_in();
        digital_in.divider_set(7).unwrap();
        digital_in.reset().unwrap();
        assert_eq!(digital_in.divider_get().unwrap(), 1);
    }
}
