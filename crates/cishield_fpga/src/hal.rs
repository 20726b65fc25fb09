//! Adapters from `embedded-hal` 1.0 peripherals to the control-channel traits.

use cishield_hal::traits::{ControlBus, ControlPins, TransportError};
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, SpiDevice};

/// A native SPI device (chip select managed by the HAL) as a [`ControlBus`].
pub struct SpiControlBus<D> {
    spi: D,
}

impl<D: SpiDevice + Send> SpiControlBus<D> {
    pub fn new(spi: D) -> Self {
        Self { spi }
    }

    pub fn into_inner(self) -> D {
        self.spi
    }
}

impl<D: SpiDevice + Send> ControlBus for SpiControlBus<D> {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        self.spi
            .transfer(rx, tx)
            .map_err(|e| TransportError::Bus(format!("spi: {:?}", spi::Error::kind(&e))))
    }
}

/// Four GPIO lines as [`ControlPins`]. Select is active low.
pub struct HalPins<SEL, CLK, MOSI, MISO> {
    select: SEL,
    clock: CLK,
    mosi: MOSI,
    miso: MISO,
}

impl<SEL, CLK, MOSI, MISO> HalPins<SEL, CLK, MOSI, MISO>
where
    SEL: OutputPin,
    CLK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
{
    pub fn new(select: SEL, clock: CLK, mosi: MOSI, miso: MISO) -> Self {
        Self {
            select,
            clock,
            mosi,
            miso,
        }
    }

    pub fn release(self) -> (SEL, CLK, MOSI, MISO) {
        (self.select, self.clock, self.mosi, self.miso)
    }
}

fn pin_error<E: digital::Error>(line: &str, e: E) -> TransportError {
    TransportError::Pin(format!("{line}: {:?}", e.kind()))
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), P::Error> {
    if high { pin.set_high() } else { pin.set_low() }
}

impl<SEL, CLK, MOSI, MISO> ControlPins for HalPins<SEL, CLK, MOSI, MISO>
where
    SEL: OutputPin + Send,
    CLK: OutputPin + Send,
    MOSI: OutputPin + Send,
    MISO: InputPin + Send,
{
    fn set_select(&mut self, active: bool) -> Result<(), TransportError> {
        drive(&mut self.select, !active).map_err(|e| pin_error("select", e))
    }

    fn set_clock(&mut self, high: bool) -> Result<(), TransportError> {
        drive(&mut self.clock, high).map_err(|e| pin_error("clock", e))
    }

    fn set_mosi(&mut self, high: bool) -> Result<(), TransportError> {
        drive(&mut self.mosi, high).map_err(|e| pin_error("mosi", e))
    }

    fn miso(&mut self) -> Result<bool, TransportError> {
        self.miso.is_high().map_err(|e| pin_error("miso", e))
    }
}
