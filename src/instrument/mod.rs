//! Controllers for the instruments of an open device.
//!
//! A controller is a cheap handle onto a [`Session`](crate::Session); it owns nothing and may be
//! created any number of times. The device never runs anything in the background: callers drive
//! each instrument by configuring it and then polling `status` until it reports what they need.

mod analog_in;
mod analog_out;
mod analog_io;
mod digital_in;
mod digital_out;
mod digital_io;

pub use analog_in::AnalogIn;
pub use analog_out::AnalogOut;
pub use analog_io::AnalogIo;
pub use digital_in::DigitalIn;
pub use digital_out::DigitalOut;
pub use digital_io::DigitalIo;

use crate::params::Value;
use crate::wire::Pins;

fn count(value: i32) -> usize {
    value.max(0) as usize
}

/// Progress of a record mode acquisition, as of the last status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordStatus {
    /// Samples transferred by the last status read.
    pub available: usize,
    /// Samples overwritten before they could be transferred.
    pub lost: usize,
    /// Samples that may have been overwritten while being transferred.
    pub corrupt: usize,
}

impl RecordStatus {
    fn from_value(value: Value) -> Option<RecordStatus> {
        match value {
            Value::Counts(available, lost, corrupt) => Some(RecordStatus {
                available: count(available),
                lost: count(lost),
                corrupt: count(corrupt),
            }),
            _ => None,
        }
    }
}

/// Room in the streaming buffer of an analog output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayStatus {
    pub free: usize,
    pub lost: usize,
    pub corrupt: usize,
}

impl PlayStatus {
    fn from_value(value: Value) -> Option<PlayStatus> {
        match value {
            Value::Counts(free, lost, corrupt) => Some(PlayStatus {
                free: count(free),
                lost: count(lost),
                corrupt: count(corrupt),
            }),
            _ => None,
        }
    }
}

/// Line conditions of the digital trigger detector. The detector fires when every line in
/// `low` is low, every line in `high` is high, and any line in `rise` or `fall` has the
/// corresponding edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalTrigger {
    pub low: Pins,
    pub high: Pins,
    pub rise: Pins,
    pub fall: Pins,
}

impl DigitalTrigger {
    fn from_masks([low, high, rise, fall]: [u32; 4]) -> DigitalTrigger {
        DigitalTrigger {
            low: Pins::from_bits_retain(low),
            high: Pins::from_bits_retain(high),
            rise: Pins::from_bits_retain(rise),
            fall: Pins::from_bits_retain(fall),
        }
    }

    fn masks(&self) -> [u32; 4] {
        [self.low.bits(), self.high.bits(), self.rise.bits(), self.fall.bits()]
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_status() {
        assert_eq!(RecordStatus::from_value(Value::Counts(10, 2, -1)),
                   Some(RecordStatus { available: 10, lost: 2, corrupt: 0 }));
        assert_eq!(RecordStatus::from_value(Value::Int(1)), None);
    }

    #[test]
    fn test_digital_trigger_masks() {
        let trigger = DigitalTrigger { rise: Pins::line(3), ..Default::default() };
        assert_eq!(trigger.masks(), [0, 0, 8, 0]);
        assert_eq!(DigitalTrigger::from_masks(trigger.masks()), trigger);
    }
}
