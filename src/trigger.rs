//! Routing of trigger signals between instruments and the device trigger pins.
//!
//! Every instrument and every trigger pin has exactly one trigger source; one source may drive
//! any number of destinations. Binds are checked against what the destination reports it can
//! be driven by, so an unsupported route fails instead of being silently ignored.

use std::fmt;

use crate::{Error, Result};
use crate::params::{Instrument, Key, Param};
use crate::session::{Link, SessionRef};
use crate::sys::Driver;
use crate::wire::{CapabilitySet, TriggerSource};

/// Something that can be driven by a trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerDestination {
    /// A device trigger pin, whose level is also available as an `ExternalN` source.
    Pin(usize),
    AnalogIn,
    /// One analog output channel.
    AnalogOut(usize),
    DigitalIn,
    DigitalOut,
}

impl TriggerDestination {
    pub(crate) fn key(self) -> Key {
        match self {
            Self::Pin(pin)             => Key::channel(Param::DeviceTrigger, pin),
            Self::AnalogIn             => Key::new(Param::AnalogInTriggerSource),
            Self::AnalogOut(channel)   => Key::channel(Param::AnalogOutTriggerSource, channel),
            Self::DigitalIn            => Key::new(Param::DigitalInTriggerSource),
            Self::DigitalOut           => Key::new(Param::DigitalOutTriggerSource),
        }
    }
}

impl fmt::Display for TriggerDestination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pin(pin)           => write!(f, "trigger pin {}", pin),
            Self::AnalogIn           => write!(f, "analog in"),
            Self::AnalogOut(channel) => write!(f, "analog out channel {}", channel),
            Self::DigitalIn          => write!(f, "digital in"),
            Self::DigitalOut         => write!(f, "digital out"),
        }
    }
}

/// One edge of the trigger graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerBinding {
    pub destination: TriggerDestination,
    pub source: TriggerSource,
}

pub(crate) fn source_info<D: Driver>(link: &Link<D>, destination: TriggerDestination)
        -> Result<CapabilitySet<TriggerSource>> {
    link.info_set(destination.key())
}

pub(crate) fn bind<D: Driver>(link: &mut Link<D>, destination: TriggerDestination,
                              source: TriggerSource) -> Result<()> {
    if !source_info(link, destination)?.contains(source) {
        return Err(Error::UnsupportedTrigger { destination, trigger: source })
    }
    log::debug!("route {:?} to {}", source, destination);
    link.set_enum(destination.key(), source)
}

pub(crate) fn read<D: Driver>(link: &Link<D>, destination: TriggerDestination)
        -> Result<TriggerSource> {
    link.get_enum(destination.key())
}

/// View of the trigger graph of one session.
pub struct TriggerRouter<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> TriggerRouter<D> {
    pub(crate) fn new(session: SessionRef<D>) -> TriggerRouter<D> {
        TriggerRouter { session }
    }

    /// Sources `destination` can be driven by.
    pub fn source_info(&self, destination: TriggerDestination) -> Result<CapabilitySet<TriggerSource>> {
        self.session.with(|link| source_info(link, destination))
    }

    /// Makes `source` drive `destination`, replacing its previous source.
    pub fn bind(&self, destination: TriggerDestination, source: TriggerSource) -> Result<()> {
        self.session.with(|link| bind(link, destination, source))
    }

    pub fn unbind(&self, destination: TriggerDestination) -> Result<()> {
        self.bind(destination, TriggerSource::None)
    }

    pub fn read(&self, destination: TriggerDestination) -> Result<TriggerSource> {
        self.session.with(|link| read(link, destination))
    }

    /// Every destination of the device with its current source, unbound ones included.
    pub fn bindings(&self) -> Result<Vec<TriggerBinding>> {
        self.session.with(|link| {
            let pins = (0..link.trigger_pins()).map(TriggerDestination::Pin);
            let analog_out = (0..link.channel_count(Instrument::AnalogOut))
                .map(TriggerDestination::AnalogOut);
            pins
                .chain([TriggerDestination::AnalogIn])
                .chain(analog_out)
                .chain([TriggerDestination::DigitalIn, TriggerDestination::DigitalOut])
                .map(|destination| {
                    Ok(TriggerBinding { destination, source: read(link, destination)? })
                })
                .collect()
        })
    }

    /// Issues one software trigger pulse to every destination bound to [`TriggerSource::Pc`].
    pub fn trigger_pc(&self) -> Result<()> {
        self.session.with(|link| link.trigger_pc())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{InstrumentState, Session};
    use crate::sys::sim::{SimDevice, SimDriver};

    fn open() -> (Arc<SimDriver>, Session<SimDriver>) {
        let driver = Arc::new(SimDriver::default());
        let session = Session::open(driver.clone(), 0, None).unwrap();
        (driver, session)
    }

    #[test]
    fn test_bind_read_back() {
        let (_driver, session) = open();
        let router = session.trigger_router();
        router.bind(TriggerDestination::AnalogIn, TriggerSource::AnalogOut1).unwrap();
        router.bind(TriggerDestination::DigitalOut, TriggerSource::AnalogIn).unwrap();
        assert_eq!(router.read(TriggerDestination::AnalogIn).unwrap(), TriggerSource::AnalogOut1);
        // last write wins
        router.bind(TriggerDestination::AnalogIn, TriggerSource::Pc).unwrap();
        assert_eq!(router.read(TriggerDestination::AnalogIn).unwrap(), TriggerSource::Pc);
        router.unbind(TriggerDestination::AnalogIn).unwrap();
        assert_eq!(router.read(TriggerDestination::AnalogIn).unwrap(), TriggerSource::None);
    }

    #[test]
    fn test_bind_unsupported() {
        let (_driver, session) = open();
        let router = session.trigger_router();
        let destination = TriggerDestination::AnalogOut(0);
        assert!(!router.source_info(destination).unwrap().contains(TriggerSource::AnalogOut2));
        assert!(matches!(router.bind(destination, TriggerSource::AnalogOut2),
                         Err(Error::UnsupportedTrigger {
                             destination: TriggerDestination::AnalogOut(0),
                             trigger: TriggerSource::AnalogOut2,
                         })));
        assert_eq!(router.read(destination).unwrap(), TriggerSource::None);
        // a two-channel device has no third analog output to route from
        assert!(matches!(router.bind(TriggerDestination::AnalogIn, TriggerSource::AnalogOut3),
                         Err(Error::UnsupportedTrigger { .. })));
    }

    #[test]
    fn test_bind_invalid_channel() {
        let (_driver, session) = open();
        let router = session.trigger_router();
        assert!(matches!(router.bind(TriggerDestination::AnalogOut(2), TriggerSource::Pc),
                         Err(Error::InvalidChannel { channel: 2, count: 2, .. })));
        assert!(matches!(router.read(TriggerDestination::Pin(7)),
                         Err(Error::InvalidChannel { channel: 7, .. })));
    }

    #[test]
    fn test_bindings() {
        let driver = Arc::new(SimDriver::new(vec![SimDevice::electronics_explorer()]));
        let session = Session::open(driver, 0, None).unwrap();
        let router = session.trigger_router();
        router.bind(TriggerDestination::Pin(3), TriggerSource::DigitalOut).unwrap();
        let bindings = router.bindings().unwrap();
        assert_eq!(bindings.len(), 4 + 1 + 4 + 2);
        assert!(bindings.contains(&TriggerBinding {
            destination: TriggerDestination::Pin(3),
            source: TriggerSource::DigitalOut,
        }));
        assert!(bindings.iter()
            .filter(|binding| binding.destination != TriggerDestination::Pin(3))
            .all(|binding| binding.source == TriggerSource::None));
    }

    #[test]
    fn test_pc_pulse_starts_bound_instruments() {
        let (_driver, session) = open();
        let router = session.trigger_router();
        let analog_in = session.analog_in();
        router.bind(TriggerDestination::AnalogIn, TriggerSource::Pc).unwrap();
        analog_in.configure(false, true).unwrap();
        for _ in 0..5 {
            assert!(!analog_in.status(false).unwrap().is_running());
        }
        router.trigger_pc().unwrap();
        assert_eq!(analog_in.status(false).unwrap(), InstrumentState::Running);
    }

    #[test]
    fn test_external_pin_chain() {
        let (_driver, session) = open();
        let router = session.trigger_router();
        let analog_out = session.analog_out();
        let digital_in = session.digital_in();
        router.bind(TriggerDestination::Pin(0), TriggerSource::AnalogOut1).unwrap();
        router.bind(TriggerDestination::DigitalIn, TriggerSource::External1).unwrap();
        digital_in.configure(false, true).unwrap();
        for _ in 0..3 {
            digital_in.status(false).unwrap();
        }
        assert_eq!(digital_in.status(false).unwrap(), InstrumentState::Wait);
        analog_out.configure(Some(0), true).unwrap();
        assert_eq!(digital_in.status(false).unwrap(), InstrumentState::Running);
    }
}
