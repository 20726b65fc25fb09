//! Host ⇄ bridge link framing.
//!
//! ```text
//! 0xA5 | seq u8 | len u16 LE | payload[len] | crc16-modbus u16 LE
//! ```
//!
//! The CRC covers everything before it. A request payload is the
//! control-channel frame to clock out; the response payload holds the bytes
//! clocked in, one per byte sent. The bridge echoes the request's `seq`.

use cishield_hal::traits::TransportError;
use crc::{CRC_16_MODBUS, Crc};

pub const START: u8 = 0xA5;
pub const PREFIX_LEN: usize = 4;
pub const CRC_LEN: usize = 2;
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

pub fn encode(seq: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::TooLong(payload.len()));
    }
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len() + CRC_LEN);
    frame.push(START);
    frame.push(seq);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = CRC16.checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Payload length announced by a frame prefix.
pub fn payload_len(prefix: &[u8; PREFIX_LEN]) -> Result<usize, TransportError> {
    if prefix[0] != START {
        return Err(TransportError::Malformed(format!(
            "link frame starts with {:#04x}",
            prefix[0]
        )));
    }
    Ok(u16::from_le_bytes([prefix[2], prefix[3]]) as usize)
}

/// Validate a complete frame and return its sequence number and payload.
pub fn decode(frame: &[u8]) -> Result<(u8, &[u8]), TransportError> {
    if frame.len() < PREFIX_LEN + CRC_LEN {
        return Err(TransportError::Malformed(format!(
            "{} byte link frame is too short",
            frame.len()
        )));
    }
    let len = payload_len(&[frame[0], frame[1], frame[2], frame[3]])?;
    if frame.len() != PREFIX_LEN + len + CRC_LEN {
        return Err(TransportError::Malformed(format!(
            "link frame announces {len} bytes, carries {}",
            frame.len() - PREFIX_LEN - CRC_LEN
        )));
    }
    let body = &frame[..PREFIX_LEN + len];
    let got = u16::from_le_bytes([frame[PREFIX_LEN + len], frame[PREFIX_LEN + len + 1]]);
    let want = CRC16.checksum(body);
    if got != want {
        return Err(TransportError::Malformed(format!(
            "link crc {got:#06x}, expected {want:#06x}"
        )));
    }
    Ok((frame[1], &body[PREFIX_LEN..]))
}
