use super::metrics::MetricsEngine;
use super::uart::{SerialFrame, UartEngine};
use crate::config::TesterConstants;
use crate::pins::{IoExpanderReg, LOGICAL_PINS, LogicalPin, PHYSICAL_PINS, Peripheral, UNMAPPED};
use crate::regs::{
    GPIO_DRIVE, GPIO_LEVEL, REMAP_SLOTS, RESET_ALL, RESET_PERIPHERALS, Register,
    SELF_TEST_DONE, SELF_TEST_PASS, SELF_TEST_START, STATUS_CONTROL_FAULT, SysReg, TESTER_ID,
};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub fail_transfers: u32,
    pub miso_stuck: Option<bool>,
    pub control_fault: bool,
    pub self_test_failure: bool,
}

/// Register-level state of the tester FPGA plus what the DUT does to its pins.
pub(crate) struct Device {
    pub constants: TesterConstants,
    pub now: u64,
    pub faults: Faults,
    pub transactions: u64,
    remap: [u8; REMAP_SLOTS],
    selected: Peripheral,
    scratch: u32,
    self_test_status: u8,
    gpio: [u8; LOGICAL_PINS],
    io_config: [u8; PHYSICAL_PINS],
    io_output: [u8; PHYSICAL_PINS],
    dut_drive: [Option<bool>; PHYSICAL_PINS],
    dut_rx: HashMap<u8, Vec<u16>>,
    uart: UartEngine,
    metrics: MetricsEngine,
}

impl Device {
    pub fn new(constants: TesterConstants) -> Self {
        Self {
            constants,
            now: 0,
            faults: Faults::default(),
            transactions: 0,
            remap: [UNMAPPED; REMAP_SLOTS],
            selected: Peripheral::None,
            scratch: 0,
            self_test_status: 0,
            gpio: [0; LOGICAL_PINS],
            io_config: [1; PHYSICAL_PINS],
            io_output: [0; PHYSICAL_PINS],
            dut_drive: [None; PHYSICAL_PINS],
            dut_rx: HashMap::new(),
            uart: UartEngine::default(),
            metrics: MetricsEngine::default(),
        }
    }

    pub fn read_reg(&self, address: u32) -> u8 {
        match Register::decode(address, self.selected) {
            Some((reg, lane)) => self.value(reg).to_le_bytes()[lane],
            None => 0,
        }
    }

    pub fn write_reg(&mut self, address: u32, byte: u8) {
        let Some((reg, lane)) = Register::decode(address, self.selected) else {
            log::trace!("write to unmapped address {address:#010x} ignored");
            return;
        };
        let mut bytes = self.value(reg).to_le_bytes();
        bytes[lane] = byte;
        self.store(reg, u32::from_le_bytes(bytes));
        self.sync_metrics();
    }

    fn value(&self, reg: Register) -> u32 {
        match reg {
            Register::Sys(SysReg::Identity) => TESTER_ID,
            Register::Sys(SysReg::Scratch) => self.scratch,
            Register::Sys(SysReg::SelfTestStatus) => self.self_test_status as u32,
            Register::Sys(SysReg::Status) => {
                if self.faults.control_fault {
                    STATUS_CONTROL_FAULT as u32
                } else {
                    0
                }
            }
            Register::Sys(SysReg::Reset | SysReg::SelfTest) => 0,
            Register::Remap(slot) => self.remap[slot as usize] as u32,
            Register::MetricsControl => self.metrics.control() as u32,
            Register::Metrics { channel, reg } => self.metrics.read(channel as usize, reg),
            Register::IoExpander { reg, pin } => match reg {
                IoExpanderReg::Config => self.io_config[pin as usize] as u32,
                IoExpanderReg::Output => self.io_output[pin as usize] as u32,
                IoExpanderReg::Input => self.pin_level(pin as usize) as u32,
            },
            Register::PeripheralSelect => self.selected.id() as u32,
            Register::Gpio(channel) => self.slot_level(channel as usize) as u32,
            Register::Uart(reg) => self.uart.read(reg),
        }
    }

    fn store(&mut self, reg: Register, value: u32) {
        match reg {
            Register::Sys(SysReg::Reset) => match value as u8 {
                RESET_ALL => self.reset_all(),
                RESET_PERIPHERALS => self.reset_peripherals(),
                other => log::debug!("unknown reset command {other:#04x}"),
            },
            Register::Sys(SysReg::Scratch) => self.scratch = value,
            Register::Sys(SysReg::SelfTest) => {
                if value as u8 & SELF_TEST_START != 0 {
                    self.self_test_status = if self.faults.self_test_failure {
                        SELF_TEST_DONE
                    } else {
                        SELF_TEST_DONE | SELF_TEST_PASS
                    };
                }
            }
            Register::Sys(_) => {}
            Register::Remap(slot) => self.remap[slot as usize] = value as u8,
            Register::MetricsControl => {
                let levels = self.channel_levels();
                self.metrics.write_control(value as u8, self.now, &levels);
            }
            Register::Metrics { .. } => {}
            Register::IoExpander { reg, pin } => match reg {
                IoExpanderReg::Config => self.io_config[pin as usize] = value as u8 & 1,
                IoExpanderReg::Output => self.io_output[pin as usize] = value as u8 & 1,
                IoExpanderReg::Input => {}
            },
            Register::PeripheralSelect => {
                self.selected = Peripheral::from_id(value as u8).unwrap_or_else(|| {
                    log::warn!("unknown peripheral id {value}, deselecting");
                    Peripheral::None
                });
            }
            Register::Gpio(channel) => {
                self.gpio[channel as usize] = value as u8 & (GPIO_DRIVE | GPIO_LEVEL)
            }
            Register::Uart(reg) => self.uart.write(reg, value),
        }
    }

    fn reset_all(&mut self) {
        self.remap = [UNMAPPED; REMAP_SLOTS];
        self.scratch = 0;
        self.self_test_status = 0;
        self.io_config = [1; PHYSICAL_PINS];
        self.io_output = [0; PHYSICAL_PINS];
        self.metrics = MetricsEngine::default();
        self.reset_peripherals();
    }

    fn reset_peripherals(&mut self) {
        self.selected = Peripheral::None;
        self.gpio = [0; LOGICAL_PINS];
        self.uart = UartEngine::default();
    }

    /// Physical pin bound to a logical slot.
    fn slot_pin(&self, slot: usize) -> Option<usize> {
        let pin = self.remap[PHYSICAL_PINS + slot] as usize;
        (pin < PHYSICAL_PINS).then_some(pin)
    }

    /// Resolved line level: tester GPIO drive, then DUT drive, then the
    /// emulated pull, otherwise the line reads low.
    pub fn pin_level(&self, pin: usize) -> bool {
        if self.selected == Peripheral::Gpio {
            let driver = (0..LOGICAL_PINS)
                .find(|&slot| self.slot_pin(slot) == Some(pin) && self.gpio[slot] & GPIO_DRIVE != 0);
            if let Some(slot) = driver {
                return self.gpio[slot] & GPIO_LEVEL != 0;
            }
        }
        if let Some(level) = self.dut_drive[pin] {
            return level;
        }
        if self.io_config[pin] == 0 {
            return self.io_output[pin] != 0;
        }
        false
    }

    fn slot_level(&self, slot: usize) -> bool {
        self.slot_pin(slot).is_some_and(|pin| self.pin_level(pin))
    }

    fn channel_levels(&self) -> [bool; LOGICAL_PINS] {
        std::array::from_fn(|slot| self.slot_level(slot))
    }

    pub fn sync_metrics(&mut self) {
        let levels = self.channel_levels();
        self.metrics.observe(self.now, &levels);
    }

    pub fn drive_pin(&mut self, pin: usize, level: Option<bool>) {
        self.dut_drive[pin] = level;
        self.sync_metrics();
    }

    pub fn advance(&mut self, ticks: u64) {
        self.now += ticks;
        self.transmit(ticks);
    }

    pub fn uart_receive(&mut self, pin: usize, frame: &SerialFrame, data: &[u16]) {
        let rx_slot = LogicalPin::UartRx.slot() as usize;
        if self.selected != Peripheral::Uart || self.slot_pin(rx_slot) != Some(pin) {
            log::debug!("{} UART characters on unrouted pin {pin} dropped", data.len());
            return;
        }
        for &value in data {
            self.uart.receive(frame, value, &self.constants);
        }
    }

    fn transmit(&mut self, ticks: u64) {
        let values = self.uart.tick(ticks);
        if values.is_empty() {
            return;
        }
        let tx_slot = LogicalPin::UartTx.slot() as usize;
        match self.slot_pin(tx_slot) {
            Some(pin) => self.dut_rx.entry(pin as u8).or_default().extend(values),
            None => log::debug!("UART TX not routed, {} characters lost", values.len()),
        }
    }

    pub fn take_transmitted(&mut self, pin: usize) -> Vec<u16> {
        self.dut_rx.remove(&(pin as u8)).unwrap_or_default()
    }

    pub fn remap(&self) -> &[u8; REMAP_SLOTS] {
        &self.remap
    }

    pub fn selected(&self) -> Peripheral {
        self.selected
    }

    pub fn gpio(&self) -> &[u8; LOGICAL_PINS] {
        &self.gpio
    }

    pub fn io_expander(&self) -> (&[u8; PHYSICAL_PINS], &[u8; PHYSICAL_PINS]) {
        (&self.io_config, &self.io_output)
    }

    pub fn scratch(&self) -> u32 {
        self.scratch
    }

    pub fn uart(&self) -> &UartEngine {
        &self.uart
    }

    pub fn metrics(&self) -> &MetricsEngine {
        &self.metrics
    }
}
