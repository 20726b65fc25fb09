use cishield_hal::traits::{ControlPins, Transport, TransportError};

/// Register transport that clocks frames out on discrete control pins.
///
/// SPI mode 0, MSB first: MOSI is set while the clock is low, MISO is sampled
/// after the rising edge. Select is released on every exit path.
pub struct BitBangTransport<P> {
    pins: P,
}

impl<P: ControlPins> BitBangTransport<P> {
    pub fn new(pins: P) -> Self {
        Self { pins }
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn into_inner(self) -> P {
        self.pins
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        self.pins.set_clock(false)?;
        self.pins.set_select(true)?;
        let shifted = tx
            .iter()
            .zip(rx.iter_mut())
            .try_for_each(|(&out, input)| {
                *input = shift_byte(&mut self.pins, out)?;
                Ok(())
            });
        let released = self.pins.set_select(false);
        if let Err(e) = &shifted {
            log::warn!("bit-bang transfer aborted: {e}");
        }
        shifted.and(released)
    }
}

fn shift_byte<P: ControlPins>(pins: &mut P, out: u8) -> Result<u8, TransportError> {
    let mut input = 0u8;
    for bit in (0..8).rev() {
        pins.set_mosi(out >> bit & 1 != 0)?;
        pins.set_clock(true)?;
        input = (input << 1) | pins.miso()? as u8;
        pins.set_clock(false)?;
    }
    Ok(input)
}

impl<P: ControlPins> Transport for BitBangTransport<P> {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), TransportError> {
        log::trace!("bit-bang read {address:#010x} len {}", buf.len());
        crate::read_with(address, buf, |tx, rx| self.transfer(tx, rx))
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        log::trace!("bit-bang write {address:#010x} {data:02x?}");
        crate::write_with(address, data, |tx, rx| self.transfer(tx, rx))
    }

    fn name(&self) -> &'static str {
        "bit-bang"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cishield_hal::regs::{Register, SysReg, TESTER_ID};
    use cishield_hal::sim::SimTester;

    /// Pins that fail after a number of clock edges and record select changes.
    struct FlakyPins {
        edges_left: u32,
        selects: Vec<bool>,
    }

    impl ControlPins for FlakyPins {
        fn set_select(&mut self, active: bool) -> Result<(), TransportError> {
            self.selects.push(active);
            Ok(())
        }

        fn set_clock(&mut self, _high: bool) -> Result<(), TransportError> {
            if self.edges_left == 0 {
                return Err(TransportError::Pin("clock line stuck".into()));
            }
            self.edges_left -= 1;
            Ok(())
        }

        fn set_mosi(&mut self, _high: bool) -> Result<(), TransportError> {
            Ok(())
        }

        fn miso(&mut self) -> Result<bool, TransportError> {
            Ok(false)
        }
    }

    #[test]
    fn reads_identity() {
        let mut transport = BitBangTransport::new(SimTester::new());
        let mut id = [0u8; 4];
        transport
            .read(Register::Sys(SysReg::Identity).address(), &mut id)
            .unwrap();
        assert_eq!(u32::from_le_bytes(id), TESTER_ID);
    }

    #[test]
    fn select_released_after_pin_fault() {
        let mut transport = BitBangTransport::new(FlakyPins {
            edges_left: 21,
            selects: Vec::new(),
        });
        let err = transport.write(0x1000, &[1]).unwrap_err();
        assert!(matches!(err, TransportError::Pin(_)));
        assert_eq!(transport.pins().selects, vec![true, false]);
    }

    #[test]
    fn aborted_frame_leaves_tester_untouched() {
        let sim = SimTester::new();
        let mut transport = BitBangTransport::new(sim.clone());
        transport.write(0x1000, &[7]).unwrap();
        assert_eq!(sim.peek(0x1000), 7);

        sim.fail_next_transfers(1);
        assert!(transport.write(0x1000, &[9]).is_err());
        assert_eq!(sim.peek(0x1000), 7);

        transport.write(0x1000, &[9]).unwrap();
        assert_eq!(sim.peek(0x1000), 9);
    }
}
