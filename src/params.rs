//! Parameter catalog addressed through the transport.
//!
//! Every configurable or readable quantity of the device is a [`Param`], addressed together
//! with an optional channel and node as a [`Key`]. Values travel as [`Value`]s and capability
//! queries come back as [`Info`]s; the instrument controllers convert both into typed results.

/// A functional subsystem of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Device,
    AnalogIn,
    AnalogOut,
    AnalogIo,
    DigitalIn,
    DigitalOut,
    DigitalIo,
}

impl Instrument {
    pub fn name(self) -> &'static str {
        match self {
            Self::Device     => "device",
            Self::AnalogIn   => "analog in",
            Self::AnalogOut  => "analog out",
            Self::AnalogIo   => "analog io",
            Self::DigitalIn  => "digital in",
            Self::DigitalOut => "digital out",
            Self::DigitalIo  => "digital io",
        }
    }
}

/// How a parameter is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Instrument,
    Channel,
    Node,
    /// Indexed by a device trigger pin.
    Pin,
}

macro_rules! params {
    { $( $name:ident: $instrument:ident / $scope:ident, )+ } => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Param {
            $( $name, )+
        }

        impl Param {
            pub fn instrument(self) -> Instrument {
                match self {
                    $( Param::$name => Instrument::$instrument, )+
                }
            }

            pub fn scope(self) -> Scope {
                match self {
                    $( Param::$name => Scope::$scope, )+
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Param::$name => stringify!($name), )+
                }
            }

            /// Transport operation names, used in errors.
            pub fn get_operation(self) -> &'static str {
                match self {
                    $( Param::$name => concat!(stringify!($name), "Get"), )+
                }
            }

            pub fn set_operation(self) -> &'static str {
                match self {
                    $( Param::$name => concat!(stringify!($name), "Set"), )+
                }
            }

            pub fn info_operation(self) -> &'static str {
                match self {
                    $( Param::$name => concat!(stringify!($name), "Info"), )+
                }
            }
        }
    };
}

params! {
    DeviceEnable:                   Device / Instrument,
    DeviceTrigger:                  Device / Pin,

    AnalogInChannelCount:           AnalogIn / Instrument,
    AnalogInSamplesLeft:            AnalogIn / Instrument,
    AnalogInSamplesValid:           AnalogIn / Instrument,
    AnalogInIndexWrite:             AnalogIn / Instrument,
    AnalogInAutoTriggered:          AnalogIn / Instrument,
    AnalogInRecordStatus:           AnalogIn / Instrument,
    AnalogInSample:                 AnalogIn / Channel,
    AnalogInData:                   AnalogIn / Channel,
    AnalogInNoiseMin:               AnalogIn / Channel,
    AnalogInNoiseMax:               AnalogIn / Channel,
    AnalogInRecordLength:           AnalogIn / Instrument,
    AnalogInFrequency:              AnalogIn / Instrument,
    AnalogInBits:                   AnalogIn / Instrument,
    AnalogInBufferSize:             AnalogIn / Instrument,
    AnalogInNoiseSize:              AnalogIn / Instrument,
    AnalogInAcquisitionMode:        AnalogIn / Instrument,
    AnalogInChannelEnable:          AnalogIn / Channel,
    AnalogInChannelFilter:          AnalogIn / Channel,
    AnalogInChannelRange:           AnalogIn / Channel,
    AnalogInChannelOffset:          AnalogIn / Channel,
    AnalogInChannelAttenuation:     AnalogIn / Channel,
    AnalogInTriggerSource:          AnalogIn / Instrument,
    AnalogInTriggerPosition:        AnalogIn / Instrument,
    AnalogInTriggerPositionStatus:  AnalogIn / Instrument,
    AnalogInTriggerAutoTimeout:     AnalogIn / Instrument,
    AnalogInTriggerHoldOff:         AnalogIn / Instrument,
    AnalogInTriggerType:            AnalogIn / Instrument,
    AnalogInTriggerChannel:         AnalogIn / Instrument,
    AnalogInTriggerFilter:          AnalogIn / Instrument,
    AnalogInTriggerLevel:           AnalogIn / Instrument,
    AnalogInTriggerHysteresis:      AnalogIn / Instrument,
    AnalogInTriggerCondition:       AnalogIn / Instrument,
    AnalogInTriggerLength:          AnalogIn / Instrument,
    AnalogInTriggerLengthCondition: AnalogIn / Instrument,

    AnalogOutChannelCount:          AnalogOut / Instrument,
    AnalogOutMaster:                AnalogOut / Channel,
    AnalogOutTriggerSource:         AnalogOut / Channel,
    AnalogOutRun:                   AnalogOut / Channel,
    AnalogOutRunStatus:             AnalogOut / Channel,
    AnalogOutWait:                  AnalogOut / Channel,
    AnalogOutRepeat:                AnalogOut / Channel,
    AnalogOutRepeatStatus:          AnalogOut / Channel,
    AnalogOutRepeatTrigger:         AnalogOut / Channel,
    AnalogOutLimitation:            AnalogOut / Channel,
    AnalogOutMode:                  AnalogOut / Channel,
    AnalogOutIdle:                  AnalogOut / Channel,
    AnalogOutNodes:                 AnalogOut / Channel,
    AnalogOutCustomAmFm:            AnalogOut / Channel,
    AnalogOutNodeEnable:            AnalogOut / Node,
    AnalogOutNodeFunction:          AnalogOut / Node,
    AnalogOutNodeFrequency:         AnalogOut / Node,
    AnalogOutNodeAmplitude:         AnalogOut / Node,
    AnalogOutNodeOffset:            AnalogOut / Node,
    AnalogOutNodeSymmetry:          AnalogOut / Node,
    AnalogOutNodePhase:             AnalogOut / Node,
    AnalogOutNodeData:              AnalogOut / Node,
    AnalogOutNodePlayStatus:        AnalogOut / Node,
    AnalogOutNodePlayData:          AnalogOut / Node,

    AnalogIoEnable:                 AnalogIo / Instrument,
    AnalogIoEnableStatus:           AnalogIo / Instrument,
    AnalogIoChannelCount:           AnalogIo / Instrument,
    AnalogIoChannelName:            AnalogIo / Channel,
    AnalogIoChannelNodes:           AnalogIo / Channel,
    AnalogIoNodeName:               AnalogIo / Node,
    AnalogIoNodeType:               AnalogIo / Node,
    AnalogIoNode:                   AnalogIo / Node,
    AnalogIoNodeStatus:             AnalogIo / Node,

    DigitalIoOutputEnable:          DigitalIo / Instrument,
    DigitalIoOutput:                DigitalIo / Instrument,
    DigitalIoInput:                 DigitalIo / Instrument,

    DigitalInSamplesLeft:           DigitalIn / Instrument,
    DigitalInSamplesValid:          DigitalIn / Instrument,
    DigitalInIndexWrite:            DigitalIn / Instrument,
    DigitalInAutoTriggered:         DigitalIn / Instrument,
    DigitalInRecordStatus:          DigitalIn / Instrument,
    DigitalInData:                  DigitalIn / Instrument,
    DigitalInInternalClock:         DigitalIn / Instrument,
    DigitalInClockSource:           DigitalIn / Instrument,
    DigitalInDivider:               DigitalIn / Instrument,
    DigitalInBits:                  DigitalIn / Instrument,
    DigitalInSampleFormat:          DigitalIn / Instrument,
    DigitalInBufferSize:            DigitalIn / Instrument,
    DigitalInSampleMode:            DigitalIn / Instrument,
    DigitalInAcquisitionMode:       DigitalIn / Instrument,
    DigitalInTriggerSource:         DigitalIn / Instrument,
    DigitalInTriggerPosition:       DigitalIn / Instrument,
    DigitalInTriggerAutoTimeout:    DigitalIn / Instrument,
    DigitalInTrigger:               DigitalIn / Instrument,

    DigitalOutInternalClock:        DigitalOut / Instrument,
    DigitalOutTriggerSource:        DigitalOut / Instrument,
    DigitalOutRun:                  DigitalOut / Instrument,
    DigitalOutRunStatus:            DigitalOut / Instrument,
    DigitalOutWait:                 DigitalOut / Instrument,
    DigitalOutRepeat:               DigitalOut / Instrument,
    DigitalOutRepeatStatus:         DigitalOut / Instrument,
    DigitalOutRepeatTrigger:        DigitalOut / Instrument,
    DigitalOutChannelCount:         DigitalOut / Instrument,
    DigitalOutEnable:               DigitalOut / Channel,
    DigitalOutOutput:               DigitalOut / Channel,
    DigitalOutType:                 DigitalOut / Channel,
    DigitalOutIdle:                 DigitalOut / Channel,
    DigitalOutDivider:              DigitalOut / Channel,
    DigitalOutDividerInit:          DigitalOut / Channel,
    DigitalOutCounter:              DigitalOut / Channel,
    DigitalOutCounterInit:          DigitalOut / Channel,
    DigitalOutData:                 DigitalOut / Channel,
}

/// Transport address of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub param: Param,
    pub channel: Option<usize>,
    pub node: Option<usize>,
}

impl Key {
    pub fn new(param: Param) -> Key {
        Key { param, channel: None, node: None }
    }

    pub fn channel(param: Param, channel: usize) -> Key {
        Key { param, channel: Some(channel), node: None }
    }

    pub fn node(param: Param, channel: usize, node: usize) -> Key {
        Key { param, channel: Some(channel), node: Some(node) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Uint(u32),
    Float(f64),
    /// Low and high counts of a digital output counter.
    Pair(u32, u32),
    /// Start level and initial count of a digital output counter.
    Flagged(bool, u32),
    /// Available, lost and corrupt sample counts of a streaming transfer.
    Counts(i32, i32, i32),
    /// Low, high, rise and fall line masks of the digital trigger detector.
    Masks([u32; 4]),
}

impl Value {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(value),
            Self::Int(value) => Some(value != 0),
            _ => None,
        }
    }

    pub fn as_int(self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(value),
            Self::Uint(value) => i32::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_uint(self) -> Option<u32> {
        match self {
            Self::Uint(value) => Some(value),
            Self::Int(value) => u32::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_float(self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(value),
            Self::Int(value) => Some(value as f64),
            Self::Uint(value) => Some(value as f64),
            _ => None,
        }
    }

    /// Whether `self` can be stored where `other` is stored.
    pub fn same_shape(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Converts a scalar into the shape of `shape`, if that loses nothing that matters.
    pub fn coerce_to(self, shape: &Value) -> Option<Value> {
        if self.same_shape(shape) {
            return Some(self)
        }
        match shape {
            Self::Bool(_)  => self.as_bool().map(Self::Bool),
            Self::Int(_)   => self.as_int().map(Self::Int),
            Self::Uint(_)  => self.as_uint().map(Self::Uint),
            Self::Float(_) => self.as_float().map(Self::Float),
            _ => None,
        }
    }
}

/// Minimum, maximum and number of steps of an adjustable quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRange {
    pub min: f64,
    pub max: f64,
    pub steps: f64,
}

impl StepRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Answer to a capability query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Info {
    /// Supported variants, bit `n` for wire code `n`.
    Mask(u32),
    Range { min: f64, max: f64 },
    Steps(StepRange),
    /// Upper bound (sizes, counts and line masks).
    Limit(f64),
    /// Whether a quantity can be set and whether its status can be read.
    Support { set: bool, status: bool },
    Masks([u32; 4]),
}
