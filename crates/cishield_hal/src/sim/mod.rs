//! Simulated tester.
//!
//! `SimTester` is a cheap, cloneable handle. Give one clone to the driver's
//! transport(s) and keep another as the bench: the DUT side that drives pins,
//! lets time pass, talks UART and injects faults.

mod device;
mod link;
mod metrics;
mod uart;

pub use uart::{Parity, SerialFrame};

use crate::config::TesterConstants;
use crate::pins::{LOGICAL_PINS, Peripheral, PhysicalPin};
use crate::regs::{MetricsReg, Register, UartReg};
use crate::traits::{ControlBus, ControlPins, TransportError};
use device::Device;
use link::{PinPort, Session};
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner {
    device: Device,
    port: PinPort,
}

#[derive(Clone)]
pub struct SimTester {
    inner: Arc<Mutex<Inner>>,
}

/// Register state that must match between transports driving the same
/// operation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub remap: Vec<u8>,
    pub selected: Peripheral,
    pub gpio: Vec<u8>,
    pub io_config: Vec<u8>,
    pub io_output: Vec<u8>,
    pub scratch: u32,
    pub uart: Vec<u32>,
    pub metrics_control: u8,
    pub metrics: Vec<u32>,
}

impl SimTester {
    pub fn new() -> Self {
        Self::with_constants(TesterConstants::default())
    }

    pub fn with_constants(constants: TesterConstants) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                device: Device::new(constants),
                port: PinPort::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn constants(&self) -> TesterConstants {
        self.lock().device.constants
    }

    /// DUT drives `pin` to a level, or releases it with `None`.
    pub fn drive_pin(&self, pin: PhysicalPin, level: Option<bool>) {
        self.lock().device.drive_pin(pin.index() as usize, level);
    }

    /// Resolved level of a physical line.
    pub fn pin_level(&self, pin: PhysicalPin) -> bool {
        self.lock().device.pin_level(pin.index() as usize)
    }

    pub fn advance_us(&self, us: u64) {
        let mut inner = self.lock();
        let ticks = inner.device.constants.us_to_ticks(us);
        inner.device.advance(ticks);
    }

    pub fn advance_ticks(&self, ticks: u64) {
        self.lock().device.advance(ticks);
    }

    pub fn now_ticks(&self) -> u64 {
        self.lock().device.now
    }

    /// DUT transmits characters on `pin`.
    pub fn uart_send(&self, pin: PhysicalPin, frame: &SerialFrame, data: &[u16]) {
        self.lock()
            .device
            .uart_receive(pin.index() as usize, frame, data);
    }

    /// Characters the tester transmitted towards `pin` since the last call.
    pub fn uart_take(&self, pin: PhysicalPin) -> Vec<u16> {
        self.lock().device.take_transmitted(pin.index() as usize)
    }

    /// Make the next `count` transactions fail at the bus.
    pub fn fail_next_transfers(&self, count: u32) {
        self.lock().device.faults.fail_transfers = count;
    }

    pub fn set_miso_stuck(&self, level: Option<bool>) {
        self.lock().device.faults.miso_stuck = level;
    }

    pub fn set_control_fault(&self, fault: bool) {
        self.lock().device.faults.control_fault = fault;
    }

    pub fn set_self_test_failure(&self, fail: bool) {
        self.lock().device.faults.self_test_failure = fail;
    }

    /// Read a register byte without a bus transaction.
    pub fn peek(&self, address: u32) -> u8 {
        self.lock().device.read_reg(address)
    }

    /// Completed select-to-deselect transactions, either interface.
    pub fn transactions(&self) -> u64 {
        self.lock().device.transactions
    }

    pub fn snapshot(&self) -> RegisterSnapshot {
        let inner = self.lock();
        let device = &inner.device;
        let (io_config, io_output) = device.io_expander();
        let metrics = (0..LOGICAL_PINS)
            .flat_map(|ch| MetricsReg::ALL.map(|reg| device.metrics().read(ch, reg)))
            .collect();
        RegisterSnapshot {
            remap: device.remap().to_vec(),
            selected: device.selected(),
            gpio: device.gpio().to_vec(),
            io_config: io_config.to_vec(),
            io_output: io_output.to_vec(),
            scratch: device.scratch(),
            uart: UartReg::ALL.iter().map(|&reg| device.uart().read(reg)).collect(),
            metrics_control: device.metrics().control(),
            metrics,
        }
    }

    /// Byte value of a register as the driver would read it.
    pub fn register(&self, reg: Register) -> u32 {
        let inner = self.lock();
        let mut bytes = [0u8; 4];
        for (lane, byte) in bytes.iter_mut().enumerate().take(reg.width()) {
            *byte = inner.device.read_reg(reg.address() + lane as u32);
        }
        u32::from_le_bytes(bytes)
    }
}

impl Default for SimTester {
    fn default() -> Self {
        Self::new()
    }
}

fn take_fault(device: &mut Device) -> bool {
    if device.faults.fail_transfers > 0 {
        device.faults.fail_transfers -= 1;
        true
    } else {
        false
    }
}

fn stuck_byte(level: bool) -> u8 {
    if level { 0xFF } else { 0x00 }
}

impl ControlBus for SimTester {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        if tx.len() != rx.len() {
            return Err(TransportError::Malformed(format!(
                "transfer buffers differ: {} out, {} in",
                tx.len(),
                rx.len()
            )));
        }
        let mut inner = self.lock();
        let device = &mut inner.device;
        if take_fault(device) {
            return Err(TransportError::Bus("injected bus fault".into()));
        }
        let mut session = Session::default();
        for (out, &byte) in rx.iter_mut().zip(tx) {
            *out = match device.faults.miso_stuck {
                Some(level) => stuck_byte(level),
                None => session.next_out(device),
            };
            session.push_in(byte);
        }
        session.finish(device);
        Ok(())
    }
}

impl ControlPins for SimTester {
    fn set_select(&mut self, active: bool) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let Inner { device, port } = &mut *inner;
        if active && !port.is_selected() && take_fault(device) {
            return Err(TransportError::Pin("injected select fault".into()));
        }
        port.select(active, device);
        Ok(())
    }

    fn set_clock(&mut self, high: bool) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let Inner { device, port } = &mut *inner;
        port.set_clock(high, device);
        Ok(())
    }

    fn set_mosi(&mut self, high: bool) -> Result<(), TransportError> {
        self.lock().port.set_mosi(high);
        Ok(())
    }

    fn miso(&mut self) -> Result<bool, TransportError> {
        let inner = self.lock();
        Ok(match inner.device.faults.miso_stuck {
            Some(level) => level,
            None => inner.port.miso(),
        })
    }
}
