//! Tester side of the control channel: frame decoding at byte and bit level.

use super::device::Device;
use crate::wire::{Direction, HEADER_LEN, Header, KEY, SYNC};

/// One select-to-deselect transaction as the tester sees it.
#[derive(Debug, Default)]
pub(crate) struct Session {
    received: Vec<u8>,
    header: Option<Header>,
}

impl Session {
    /// Byte the tester shifts out while the next byte is shifted in.
    pub fn next_out(&self, device: &Device) -> u8 {
        let k = self.received.len();
        if k + 1 < HEADER_LEN {
            return 0;
        }
        if k + 1 == HEADER_LEN {
            return if self.received[..KEY.len()] == KEY { SYNC } else { 0 };
        }
        match self.header {
            Some(h) if h.direction == Direction::Read && k - HEADER_LEN < h.length as usize => {
                device.read_reg(h.address.wrapping_add((k - HEADER_LEN) as u32))
            }
            _ => 0,
        }
    }

    pub fn push_in(&mut self, byte: u8) {
        self.received.push(byte);
        if self.received.len() == HEADER_LEN {
            self.header = Header::decode(&self.received);
        }
    }

    /// Deselect. Writes are committed only when the whole payload arrived.
    pub fn finish(self, device: &mut Device) {
        device.transactions += 1;
        let Some(header) = self.header else {
            if !self.received.is_empty() {
                log::warn!("sim: dropped {} byte frame without valid header", self.received.len());
            }
            return;
        };
        if header.direction == Direction::Read {
            return;
        }
        let len = header.length as usize;
        let payload = &self.received[HEADER_LEN..];
        if payload.len() < len {
            log::warn!(
                "sim: truncated write to {:#010x} ({} of {len} bytes), discarded",
                header.address,
                payload.len()
            );
            return;
        }
        for (i, &byte) in payload[..len].iter().enumerate() {
            device.write_reg(header.address.wrapping_add(i as u32), byte);
        }
    }
}

/// Bit-level state of the control pins, SPI mode 0, MSB first.
#[derive(Debug, Default)]
pub(crate) struct PinPort {
    clock: bool,
    mosi: bool,
    bit: u8,
    shift_in: u8,
    shift_out: u8,
    session: Option<Session>,
}

impl PinPort {
    pub fn is_selected(&self) -> bool {
        self.session.is_some()
    }

    pub fn select(&mut self, active: bool, device: &mut Device) {
        match (active, self.session.take()) {
            (true, None) => {
                let session = Session::default();
                self.bit = 0;
                self.shift_in = 0;
                self.shift_out = session.next_out(device);
                self.session = Some(session);
            }
            (true, Some(session)) => self.session = Some(session),
            (false, Some(session)) => session.finish(device),
            (false, None) => {}
        }
    }

    pub fn set_mosi(&mut self, high: bool) {
        self.mosi = high;
    }

    pub fn set_clock(&mut self, high: bool, device: &Device) {
        let rising = high && !self.clock;
        let falling = !high && self.clock;
        self.clock = high;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if rising {
            self.shift_in = (self.shift_in << 1) | self.mosi as u8;
            self.bit += 1;
        } else if falling {
            if self.bit == 8 {
                session.push_in(self.shift_in);
                self.bit = 0;
                self.shift_in = 0;
                self.shift_out = session.next_out(device);
            } else {
                self.shift_out <<= 1;
            }
        }
    }

    /// Idle MISO floats high.
    pub fn miso(&self) -> bool {
        match self.session {
            Some(_) => self.shift_out & 0x80 != 0,
            None => true,
        }
    }
}
