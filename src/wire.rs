//! Wire-level encodings shared by the core and the transport backends.
//!
//! Every enumerated domain of the device (trigger sources, acquisition modes, filters, idle
//! states, ...) is a plain Rust enum with a single static table mapping each variant to its
//! wire code. The codes match the vendor runtime, so the native backend passes them through
//! without translation. Capability queries return a bitmask with bit `n` set for every
//! supported variant whose code is `n`; [`CapabilitySet`] decodes such masks.

use std::fmt;
use std::marker::PhantomData;

use bitflags::bitflags;

/// An enumeration with a fixed wire encoding.
pub trait WireEnum: Copy + Eq + fmt::Debug + 'static {
    /// Every variant with its wire code. When two variants share a code, the first row wins
    /// on decode.
    const TABLE: &'static [(Self, i32)];

    fn to_wire(self) -> i32;

    fn from_wire(code: i32) -> Option<Self> {
        Self::TABLE.iter().find(|&&(_, wire)| wire == code).map(|&(variant, _)| variant)
    }

    fn all() -> impl Iterator<Item = Self> {
        Self::TABLE.iter().map(|&(variant, _)| variant)
    }
}

macro_rules! wire_enum {
    {
        $( #[$meta:meta] )*
        pub enum $name:ident {
            $( $( #[$vmeta:meta] )* $variant:ident = $code:expr, )+
        }
    } => {
        $( #[$meta] )*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $( #[$vmeta] )* $variant, )+
        }

        impl WireEnum for $name {
            const TABLE: &'static [(Self, i32)] = &[ $( ($name::$variant, $code), )+ ];

            fn to_wire(self) -> i32 {
                match self {
                    $( $name::$variant => $code, )+
                }
            }
        }
    };
}

wire_enum! {
    /// Device family selection for enumeration.
    pub enum EnumFilter {
        All       = 0,
        EExplorer = 1,
        Discovery = 2,
    }
}

wire_enum! {
    /// Device family.
    pub enum DeviceKind {
        EExplorer = 1,
        Discovery = 2,
    }
}

/// Hardware revision. Revision codes overlap between families, so decoding needs the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceVersion {
    EExplorerC,
    EExplorerE,
    EExplorerF,
    DiscoveryA,
    DiscoveryB,
    DiscoveryC,
}

impl DeviceVersion {
    const TABLE: &'static [(DeviceKind, DeviceVersion, i32)] = &[
        (DeviceKind::EExplorer, DeviceVersion::EExplorerC, 2),
        (DeviceKind::EExplorer, DeviceVersion::EExplorerE, 4),
        (DeviceKind::EExplorer, DeviceVersion::EExplorerF, 5),
        (DeviceKind::Discovery, DeviceVersion::DiscoveryA, 1),
        (DeviceKind::Discovery, DeviceVersion::DiscoveryB, 2),
        (DeviceKind::Discovery, DeviceVersion::DiscoveryC, 3),
    ];

    pub fn from_wire(kind: DeviceKind, code: i32) -> Option<DeviceVersion> {
        Self::TABLE.iter()
            .find(|&&(k, _, wire)| k == kind && wire == code)
            .map(|&(_, version, _)| version)
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::EExplorerC => 2,
            Self::EExplorerE => 4,
            Self::EExplorerF => 5,
            Self::DiscoveryA => 1,
            Self::DiscoveryB => 2,
            Self::DiscoveryC => 3,
        }
    }

    pub fn kind(self) -> DeviceKind {
        match self {
            Self::EExplorerC | Self::EExplorerE | Self::EExplorerF => DeviceKind::EExplorer,
            Self::DiscoveryA | Self::DiscoveryB | Self::DiscoveryC => DeviceKind::Discovery,
        }
    }
}

wire_enum! {
    /// Static capability counts reported per device configuration.
    pub enum ConfigInfo {
        AnalogInChannelCount   = 1,
        AnalogOutChannelCount  = 2,
        AnalogIoChannelCount   = 3,
        DigitalInChannelCount  = 4,
        DigitalOutChannelCount = 5,
        DigitalIoChannelCount  = 6,
        AnalogInBufferSize     = 7,
        AnalogOutBufferSize    = 8,
        DigitalInBufferSize    = 9,
        DigitalOutBufferSize   = 10,
    }
}

wire_enum! {
    /// Event that can start an instrument or drive a trigger pin.
    pub enum TriggerSource {
        None              = 0,
        /// Software pulse issued with `trigger_pc`.
        Pc                = 1,
        DetectorAnalogIn  = 2,
        DetectorDigitalIn = 3,
        AnalogIn          = 4,
        DigitalIn         = 5,
        DigitalOut        = 6,
        AnalogOut1        = 7,
        AnalogOut2        = 8,
        AnalogOut3        = 9,
        AnalogOut4        = 10,
        External1         = 11,
        External2         = 12,
        External3         = 13,
        External4         = 14,
    }
}

impl TriggerSource {
    /// The analog output channel index for `AnalogOutN` sources.
    pub fn analog_out_channel(self) -> Option<usize> {
        match self {
            Self::AnalogOut1 => Some(0),
            Self::AnalogOut2 => Some(1),
            Self::AnalogOut3 => Some(2),
            Self::AnalogOut4 => Some(3),
            _ => None,
        }
    }

    /// The trigger pin index for `ExternalN` sources.
    pub fn external_pin(self) -> Option<usize> {
        match self {
            Self::External1 => Some(0),
            Self::External2 => Some(1),
            Self::External3 => Some(2),
            Self::External4 => Some(3),
            _ => None,
        }
    }
}

wire_enum! {
    /// Instrument state as reported by `status`.
    ///
    /// The device reports `Triggered` and `Running` with the same code; a decoded status is
    /// always `Running`.
    pub enum InstrumentState {
        Ready     = 0,
        Armed     = 1,
        Done      = 2,
        Running   = 3,
        Triggered = 3,
        Config    = 4,
        Prefill   = 5,
        Wait      = 7,
    }
}

impl InstrumentState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Triggered)
    }
}

wire_enum! {
    pub enum AcquisitionMode {
        Single     = 0,
        ScanShift  = 1,
        ScanScreen = 2,
        Record     = 3,
    }
}

wire_enum! {
    /// Analog acquisition filter.
    pub enum Filter {
        Decimate = 0,
        Average  = 1,
        MinMax   = 2,
    }
}

wire_enum! {
    pub enum TriggerType {
        Edge       = 0,
        Pulse      = 1,
        Transition = 2,
    }
}

wire_enum! {
    pub enum TriggerCondition {
        RisingPositive  = 0,
        FallingNegative = 1,
    }
}

wire_enum! {
    pub enum TriggerLength {
        Less    = 0,
        Timeout = 1,
        More    = 2,
    }
}

wire_enum! {
    /// Analog output signal shape.
    pub enum Function {
        Dc       = 0,
        Sine     = 1,
        Square   = 2,
        Triangle = 3,
        RampUp   = 4,
        RampDown = 5,
        Noise    = 6,
        Custom   = 30,
        Play     = 31,
    }
}

wire_enum! {
    pub enum AnalogOutNode {
        Carrier = 0,
        Fm      = 1,
        Am      = 2,
    }
}

wire_enum! {
    pub enum AnalogOutMode {
        Voltage = 0,
        Current = 1,
    }
}

wire_enum! {
    pub enum AnalogOutIdle {
        Disable = 0,
        Offset  = 1,
        Initial = 2,
    }
}

wire_enum! {
    /// Quantity measured or controlled by an analog I/O node.
    pub enum AnalogIoType {
        Enable      = 1,
        Voltage     = 2,
        Current     = 3,
        Power       = 4,
        Temperature = 5,
    }
}

wire_enum! {
    pub enum ClockSource {
        Internal = 0,
        External = 1,
    }
}

wire_enum! {
    pub enum SampleMode {
        Simple = 0,
        /// Alternating noise and sample words; a noise word flags more than one transition
        /// between two samples.
        Noise  = 1,
    }
}

wire_enum! {
    /// Digital output driver.
    pub enum OutputMode {
        PushPull   = 0,
        OpenDrain  = 1,
        OpenSource = 2,
        /// Only meaningful for custom and random patterns.
        ThreeState = 3,
    }
}

wire_enum! {
    pub enum PatternType {
        Pulse  = 0,
        Custom = 1,
        Random = 2,
    }
}

wire_enum! {
    pub enum DigitalOutIdle {
        Init = 0,
        Low  = 1,
        High = 2,
        HiZ  = 3,
    }
}

/// A set of enum variants decoded from a capability bitmask.
pub struct CapabilitySet<E> {
    mask: u32,
    _marker: PhantomData<E>,
}

impl<E: WireEnum> CapabilitySet<E> {
    /// Bits that correspond to some variant of `E`.
    fn known_bits() -> u32 {
        E::TABLE.iter()
            .filter_map(|&(_, code)| u32::try_from(code).ok())
            .filter_map(|bit| 1u32.checked_shl(bit))
            .fold(0, |mask, bit| mask | bit)
    }

    fn bit(variant: E) -> u32 {
        u32::try_from(variant.to_wire()).ok()
            .and_then(|bit| 1u32.checked_shl(bit))
            .unwrap_or(0)
    }

    pub fn empty() -> Self {
        CapabilitySet { mask: 0, _marker: PhantomData }
    }

    /// Decodes a wire bitmask. Bits that name no variant are dropped.
    pub fn from_mask(mask: u32) -> Self {
        CapabilitySet { mask: mask & Self::known_bits(), _marker: PhantomData }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn contains(&self, variant: E) -> bool {
        let bit = Self::bit(variant);
        bit != 0 && self.mask & bit != 0
    }

    pub fn insert(&mut self, variant: E) {
        self.mask |= Self::bit(variant)
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Iterates in wire order. Variants sharing a code are reported once.
    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        E::TABLE.iter().enumerate()
            .filter(move |&(index, &(variant, code))| {
                self.contains(variant) &&
                    !E::TABLE[..index].iter().any(|&(_, earlier)| earlier == code)
            })
            .map(|(_, &(variant, _))| variant)
    }
}

impl<E: WireEnum> FromIterator<E> for CapabilitySet<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut set = Self::empty();
        for variant in iter {
            set.insert(variant)
        }
        set
    }
}

impl<E> Clone for CapabilitySet<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for CapabilitySet<E> {}

impl<E> PartialEq for CapabilitySet<E> {
    fn eq(&self, other: &Self) -> bool {
        self.mask == other.mask
    }
}

impl<E> Eq for CapabilitySet<E> {}

impl<E: WireEnum> fmt::Debug for CapabilitySet<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

bitflags! {
    /// A mask of digital lines, bit `n` being line DIO`n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Pins: u32 {
        const _ = !0;
    }
}

impl Pins {
    pub fn line(index: usize) -> Pins {
        let bit = u32::try_from(index).ok().and_then(|index| 1u32.checked_shl(index));
        Pins::from_bits_retain(bit.unwrap_or(0))
    }

    /// Indices of the set lines, lowest first.
    pub fn lines(self) -> impl Iterator<Item = usize> {
        (0..32).filter(move |&index| self.bits() & (1 << index) != 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wire_round_trip() {
        for source in TriggerSource::all() {
            assert_eq!(TriggerSource::from_wire(source.to_wire()), Some(source));
        }
        assert_eq!(Function::from_wire(30), Some(Function::Custom));
        assert_eq!(Function::from_wire(7), None);
    }

    #[test]
    fn test_shared_state_code() {
        assert_eq!(InstrumentState::Triggered.to_wire(), 3);
        assert_eq!(InstrumentState::from_wire(3), Some(InstrumentState::Running));
        assert_eq!(InstrumentState::from_wire(6), None);
    }

    #[test]
    fn test_device_version_per_family() {
        assert_eq!(DeviceVersion::from_wire(DeviceKind::EExplorer, 2), Some(DeviceVersion::EExplorerC));
        assert_eq!(DeviceVersion::from_wire(DeviceKind::Discovery, 2), Some(DeviceVersion::DiscoveryB));
        assert_eq!(DeviceVersion::from_wire(DeviceKind::Discovery, 4), None);
        assert_eq!(DeviceVersion::DiscoveryB.kind(), DeviceKind::Discovery);
    }

    #[test]
    fn test_capability_set() {
        let set = CapabilitySet::<Filter>::from_mask(0b101);
        assert!(set.contains(Filter::Decimate));
        assert!(!set.contains(Filter::Average));
        assert!(set.contains(Filter::MinMax));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Filter::Decimate, Filter::MinMax]);
        assert!(CapabilitySet::<Filter>::from_mask(0).is_empty());
        // unknown bits are dropped
        assert_eq!(CapabilitySet::<Filter>::from_mask(0xf0), CapabilitySet::empty());
    }

    #[test]
    fn test_capability_set_high_codes() {
        let set: CapabilitySet<Function> = [Function::Sine, Function::Play].into_iter().collect();
        assert_eq!(set.mask(), (1 << 1) | (1 << 31));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_capability_set_shared_code_once() {
        let set = CapabilitySet::<InstrumentState>::from_mask(1 << 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![InstrumentState::Running]);
    }

    #[test]
    fn test_pins() {
        assert_eq!(Pins::line(3).bits(), 0b1000);
        assert_eq!(Pins::line(40), Pins::empty());
        assert_eq!(Pins::from_bits_retain(0b1010).lines().collect::<Vec<_>>(), vec![1, 3]);
    }

    proptest! {
        #[test]
        fn prop_decode_set_matches_bits(mask in any::<u32>()) {
            let set = CapabilitySet::<TriggerSource>::from_mask(mask);
            let decoded: Vec<_> = set.iter().collect();
            let expected: Vec<_> = TriggerSource::all()
                .filter(|source| mask & (1 << source.to_wire()) != 0)
                .collect();
            prop_assert_eq!(&decoded, &expected);
            let mut deduped = decoded.clone();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), decoded.len());
        }
    }
}
