//! Static digital I/O: the lines driven and read directly, outside of any pattern or capture.

use crate::Result;
use crate::params::{Instrument, Key, Param, Value};
use crate::session::SessionRef;
use crate::sys::{Driver, Target};
use crate::wire::Pins;

const TARGET: Target = Target { instrument: Instrument::DigitalIo, channel: None };

pub struct DigitalIo<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> DigitalIo<D> {
    pub(crate) fn new(session: SessionRef<D>) -> DigitalIo<D> {
        DigitalIo { session }
    }

    pub fn reset(&self) -> Result<()> {
        self.session.with(|link| link.reset(TARGET))
    }

    pub fn configure(&self) -> Result<()> {
        self.session.with(|link| link.configure(TARGET, false, false))
    }

    /// Samples the input lines for [`input_status`](Self::input_status).
    pub fn status(&self) -> Result<()> {
        self.session.with(|link| link.status(TARGET, true).map(|_| ()))
    }

    fn pins_info(&self, param: Param) -> Result<Pins> {
        self.session.with(|link| {
            Ok(Pins::from_bits_retain(link.info_limit(Key::new(param))? as u32))
        })
    }

    fn pins_set(&self, param: Param, pins: Pins) -> Result<()> {
        self.session.with(|link| link.set(Key::new(param), Value::Uint(pins.bits())))
    }

    fn pins_get(&self, param: Param) -> Result<Pins> {
        self.session.with(|link| link.get_uint(Key::new(param)).map(Pins::from_bits_retain))
    }

    /// Lines that can be switched to outputs.
    pub fn output_enable_info(&self) -> Result<Pins> {
        self.pins_info(Param::DigitalIoOutputEnable)
    }

    /// Switches the given lines to outputs and every other line to an input.
    pub fn output_enable_set(&self, pins: Pins) -> Result<()> {
        self.pins_set(Param::DigitalIoOutputEnable, pins)
    }

    pub fn output_enable_get(&self) -> Result<Pins> {
        self.pins_get(Param::DigitalIoOutputEnable)
    }

    pub fn output_info(&self) -> Result<Pins> {
        self.pins_info(Param::DigitalIoOutput)
    }

    /// Drives the output lines in `pins` high and the other output lines low.
    pub fn output_set(&self, pins: Pins) -> Result<()> {
        self.pins_set(Param::DigitalIoOutput, pins)
    }

    pub fn output_get(&self) -> Result<Pins> {
        self.pins_get(Param::DigitalIoOutput)
    }

    pub fn input_info(&self) -> Result<Pins> {
        self.pins_info(Param::DigitalIoInput)
    }

    /// Lines read high by the last [`status`](Self::status).
    pub fn input_status(&self) -> Result<Pins> {
        self.pins_get(Param::DigitalIoInput)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SimDevice;
    use crate::instrument::fixture::{open, open_device};

    #[test]
    fn test_line_masks() {
        let (_driver, session) = open();
        let digital_io = session.digital_io();
        assert_eq!(digital_io.output_enable_info().unwrap(), Pins::from_bits_retain(0xffff));
        assert_eq!(digital_io.input_info().unwrap(), Pins::from_bits_retain(0xffff));
        digital_io.output_enable_set(Pins::all()).unwrap();
        assert_eq!(digital_io.output_enable_get().unwrap(), Pins::from_bits_retain(0xffff));

        let (_driver, session) = open_device(SimDevice::electronics_explorer());
        assert_eq!(session.digital_io().output_info().unwrap(), Pins::all());
    }

    #[test]
    fn test_loopback() {
        let (_driver, session) = open();
        let digital_io = session.digital_io();
        digital_io.output_enable_set(Pins::from_bits_retain(0x00ff)).unwrap();
        digital_io.output_set(Pins::from_bits_retain(0x0f0f)).unwrap();
        assert_eq!(digital_io.output_get().unwrap(), Pins::from_bits_retain(0x0f0f));
        digital_io.status().unwrap();
        let input = digital_io.input_status().unwrap();
        assert_eq!(input.lines().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_reset() {
        let (_driver, session) = open();
        let digital_io = session.digital_io();
        digital_io.output_enable_set(Pins::line(4)).unwrap();
        digital_io.configure().unwrap();
        digital_io.reset().unwrap();
        assert!(digital_io.output_enable_get().unwrap().is_empty());
    }
}
