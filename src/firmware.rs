//! Tester bitstream packaging.
//!
//! A packaged image is `size u32 LE | raw bitstream | crc32 u32 LE`, with the
//! CRC-32/ISO-HDLC taken over the raw bitstream only. This is the layout the
//! tester's loader checks before configuring the FPGA.

use crc::{CRC_32_ISO_HDLC, Crc};
use thiserror::Error;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const SIZE_LEN: usize = 4;
pub const CRC_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FirmwareError {
    #[error("image of {0} bytes is shorter than its header and trailer")]
    Truncated(usize),
    #[error("bitstream of {0} bytes does not fit the size field")]
    TooLarge(usize),
    #[error("size field says {declared} bytes, image carries {actual}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("crc mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },
}

/// A raw bitstream together with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image<'a> {
    pub bitstream: &'a [u8],
    pub crc: u32,
}

impl Image<'_> {
    pub fn size(&self) -> usize {
        self.bitstream.len()
    }
}

pub fn checksum(bitstream: &[u8]) -> u32 {
    CRC32.checksum(bitstream)
}

/// Wrap a raw bitstream into a loadable image.
pub fn package(bitstream: &[u8]) -> Result<Vec<u8>, FirmwareError> {
    let size =
        u32::try_from(bitstream.len()).map_err(|_| FirmwareError::TooLarge(bitstream.len()))?;
    let mut image = Vec::with_capacity(SIZE_LEN + bitstream.len() + CRC_LEN);
    image.extend_from_slice(&size.to_le_bytes());
    image.extend_from_slice(bitstream);
    image.extend_from_slice(&checksum(bitstream).to_le_bytes());
    Ok(image)
}

/// Split a packaged image and check its size field and CRC.
pub fn parse(image: &[u8]) -> Result<Image<'_>, FirmwareError> {
    if image.len() < SIZE_LEN + CRC_LEN {
        return Err(FirmwareError::Truncated(image.len()));
    }
    let (head, rest) = image.split_at(SIZE_LEN);
    let (bitstream, tail) = rest.split_at(rest.len() - CRC_LEN);
    let declared = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    if declared != bitstream.len() {
        return Err(FirmwareError::SizeMismatch {
            declared,
            actual: bitstream.len(),
        });
    }
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = checksum(bitstream);
    if stored != computed {
        return Err(FirmwareError::CrcMismatch { stored, computed });
    }
    Ok(Image {
        bitstream,
        crc: stored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_reference_check_value() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn package_layout() {
        let image = package(b"123456789").unwrap();
        assert_eq!(&image[..4], &[9, 0, 0, 0]);
        assert_eq!(&image[4..13], b"123456789");
        assert_eq!(&image[13..], &0xCBF4_3926u32.to_le_bytes());

        let parsed = parse(&image).unwrap();
        assert_eq!(parsed.size(), 9);
        assert_eq!(parsed.crc, 0xCBF4_3926);
    }

    #[test]
    fn empty_bitstream_is_valid() {
        let image = package(&[]).unwrap();
        assert_eq!(image, [0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(parse(&image).unwrap().size(), 0);
    }

    #[test]
    fn rejects_flipped_bit() {
        let mut image = package(&[0x10, 0x20, 0x30]).unwrap();
        image[5] ^= 0x01;
        assert!(matches!(
            parse(&image),
            Err(FirmwareError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn rejects_truncated_image() {
        let image = package(&[1, 2, 3, 4]).unwrap();
        assert_eq!(
            parse(&image[..image.len() - 1]),
            Err(FirmwareError::SizeMismatch {
                declared: 4,
                actual: 3
            })
        );
        assert_eq!(parse(&image[..7]), Err(FirmwareError::Truncated(7)));
    }
}
