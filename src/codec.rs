//! Decoding of packed acquisition buffers.
//!
//! Digital samples arrive as a flat byte buffer holding 1, 2 or 4 little-endian bytes per
//! sample depending on the configured sample format. Decoding is pure, so it is tested
//! without a device.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleWidth {
    Bits8,
    Bits16,
    Bits32,
}

impl SampleWidth {
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits8  => 8,
            Self::Bits16 => 16,
            Self::Bits32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Mask of the value bits a sample of this width can carry.
    pub fn mask(self) -> u32 {
        match self {
            Self::Bits8  => 0xff,
            Self::Bits16 => 0xffff,
            Self::Bits32 => 0xffff_ffff,
        }
    }
}

impl TryFrom<u32> for SampleWidth {
    type Error = Error;

    fn try_from(bits: u32) -> Result<SampleWidth> {
        match bits {
            8  => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            32 => Ok(Self::Bits32),
            _  => Err(Error::InvalidSampleWidth(bits)),
        }
    }
}

/// Raw samples captured by a status read, pending decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionBuffer {
    bytes: Vec<u8>,
    width: SampleWidth,
    count: usize,
}

impl AcquisitionBuffer {
    pub fn new(bytes: Vec<u8>, width: SampleWidth) -> AcquisitionBuffer {
        let count = bytes.len() / width.bytes();
        AcquisitionBuffer { bytes, width, count }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> SampleWidth {
        self.width
    }

    /// Number of whole samples in the buffer.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn decode(&self) -> Result<Vec<u32>> {
        decode(&self.bytes, self.width)
    }
}

/// Decodes `bytes` into samples of `width`.
///
/// Fails with [`Error::ShortBuffer`] if the buffer ends in a partial sample.
pub fn decode(bytes: &[u8], width: SampleWidth) -> Result<Vec<u32>> {
    if bytes.len() % width.bytes() != 0 {
        return Err(Error::ShortBuffer { len: bytes.len(), width: width.bits() })
    }
    Ok(decode_truncating(bytes, width))
}

/// Like [`decode`], but silently drops a trailing partial sample.
pub fn decode_truncating(bytes: &[u8], width: SampleWidth) -> Vec<u32> {
    let whole = bytes.len() - bytes.len() % width.bytes();
    let bytes = &bytes[..whole];
    match width {
        SampleWidth::Bits8 =>
            bytes.iter().map(|&byte| byte as u32).collect(),
        SampleWidth::Bits16 =>
            bytemuck::cast_slice::<u8, [u8; 2]>(bytes).iter()
                .map(|&group| u16::from_le_bytes(group) as u32)
                .collect(),
        SampleWidth::Bits32 =>
            bytemuck::cast_slice::<u8, [u8; 4]>(bytes).iter()
                .map(|&group| u32::from_le_bytes(group))
                .collect(),
    }
}

/// Packs samples the way the device does. Bits above `width` are discarded.
pub fn encode(samples: &[u32], width: SampleWidth) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * width.bytes());
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes()[..width.bytes()]);
    }
    bytes
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_values() {
        assert_eq!(decode(&[0xFF, 0x00], SampleWidth::Bits16).unwrap(), vec![0x00FF]);
        assert_eq!(decode(&[0x00, 0xFF], SampleWidth::Bits16).unwrap(), vec![0xFF00]);
        assert_eq!(decode(&[0xFF, 0x00, 0x00, 0x00], SampleWidth::Bits32).unwrap(), vec![0x000000FF]);
        assert_eq!(decode(&[1, 2, 3], SampleWidth::Bits8).unwrap(), vec![1, 2, 3]);
        assert_eq!(decode(&[0x78, 0x56, 0x34, 0x12], SampleWidth::Bits32).unwrap(), vec![0x12345678]);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(&[], SampleWidth::Bits32).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_decode_partial_sample() {
        assert!(matches!(decode(&[1, 2, 3], SampleWidth::Bits16),
                         Err(Error::ShortBuffer { len: 3, width: 16 })));
        assert_eq!(decode_truncating(&[1, 2, 3], SampleWidth::Bits16), vec![0x0201]);
        assert_eq!(decode_truncating(&[1, 2, 3, 4, 5], SampleWidth::Bits32), vec![0x04030201]);
    }

    #[test]
    fn test_sample_width() {
        assert_eq!(SampleWidth::try_from(16).unwrap(), SampleWidth::Bits16);
        assert!(matches!(SampleWidth::try_from(12), Err(Error::InvalidSampleWidth(12))));
        assert_eq!(SampleWidth::Bits32.bytes(), 4);
    }

    #[test]
    fn test_acquisition_buffer() {
        let buffer = AcquisitionBuffer::new(vec![1, 0, 2, 0, 3], SampleWidth::Bits16);
        assert_eq!(buffer.count(), 2);
        assert!(buffer.decode().is_err());
        let buffer = AcquisitionBuffer::new(encode(&[7, 8, 9], SampleWidth::Bits16), SampleWidth::Bits16);
        assert_eq!(buffer.decode().unwrap(), vec![7, 8, 9]);
    }

    fn width_and_samples() -> impl Strategy<Value = (SampleWidth, Vec<u32>)> {
        prop_oneof![
            Just(SampleWidth::Bits8),
            Just(SampleWidth::Bits16),
            Just(SampleWidth::Bits32),
        ].prop_flat_map(|width| {
            (Just(width), proptest::collection::vec(0..=width.mask(), 0..256))
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip((width, samples) in width_and_samples()) {
            let bytes = encode(&samples, width);
            prop_assert_eq!(bytes.len(), samples.len() * width.bytes());
            prop_assert_eq!(decode(&bytes, width).unwrap(), samples);
        }

        #[test]
        fn prop_truncating_drops_only_tail(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let decoded = decode_truncating(&bytes, SampleWidth::Bits32);
            prop_assert_eq!(decoded.len(), bytes.len() / 4);
        }
    }
}
