//! Control-channel frame.
//!
//! ```text
//! key[8] | address u32 LE (bit 31 = read) | length u16 LE | data[length]
//! ```
//!
//! The tester answers with zeros during the header except for the last
//! header byte, which carries [`SYNC`] once the key was recognized. During the
//! data phase of a read it shifts out the register bytes.

use crate::traits::TransportError;

pub const KEY: [u8; 8] = [0x92, 0x9D, 0x9A, 0x9B, 0x29, 0x35, 0xA2, 0x65];
pub const READ_BIT: u32 = 1 << 31;
pub const HEADER_LEN: usize = KEY.len() + 4 + 2;
pub const SYNC: u8 = 0xA5;
pub const MAX_DATA_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub direction: Direction,
    pub address: u32,
    pub length: u16,
}

impl Header {
    pub fn new(direction: Direction, address: u32, length: usize) -> Result<Self, TransportError> {
        if length > MAX_DATA_LEN {
            return Err(TransportError::TooLong(length));
        }
        Ok(Self {
            direction,
            address: address & !READ_BIT,
            length: length as u16,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&KEY);
        let raw = match self.direction {
            Direction::Read => self.address | READ_BIT,
            Direction::Write => self.address,
        };
        out[8..12].copy_from_slice(&raw.to_le_bytes());
        out[12..14].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    /// Parse a received header. Returns `None` when the key does not match.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[..8] != KEY {
            return None;
        }
        let raw = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let direction = if raw & READ_BIT != 0 {
            Direction::Read
        } else {
            Direction::Write
        };
        Some(Self {
            direction,
            address: raw & !READ_BIT,
            length: u16::from_le_bytes([bytes[12], bytes[13]]),
        })
    }
}

/// Build the outgoing bytes of a whole transaction.
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + header.length as usize);
    frame.extend_from_slice(&header.encode());
    match header.direction {
        Direction::Write => frame.extend_from_slice(payload),
        Direction::Read => frame.resize(HEADER_LEN + header.length as usize, 0),
    }
    frame
}

/// Check the sync byte of a completed transaction.
pub fn check_sync(response: &[u8]) -> Result<(), TransportError> {
    match response.get(HEADER_LEN - 1) {
        Some(&SYNC) => Ok(()),
        Some(&other) => Err(TransportError::NoSync(other)),
        None => Err(TransportError::Malformed(format!(
            "{} byte response is shorter than the header",
            response.len()
        ))),
    }
}
