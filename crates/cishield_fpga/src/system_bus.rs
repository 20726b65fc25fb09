use cishield_hal::traits::{ControlBus, Transport, TransportError};

/// Register transport over a native control bus.
///
/// One `ControlBus::transfer` per register access; the bus keeps the tester
/// selected for the whole frame.
pub struct SystemBusTransport<B> {
    bus: B,
}

impl<B: ControlBus> SystemBusTransport<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: ControlBus> Transport for SystemBusTransport<B> {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), TransportError> {
        log::trace!("bus read {address:#010x} len {}", buf.len());
        crate::read_with(address, buf, |tx, rx| self.bus.transfer(tx, rx))
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        log::trace!("bus write {address:#010x} {data:02x?}");
        crate::write_with(address, data, |tx, rx| self.bus.transfer(tx, rx))
    }

    fn name(&self) -> &'static str {
        "system-bus"
    }
}
