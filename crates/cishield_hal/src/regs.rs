//! Tester register address space.
//!
//! Byte-addressed, multi-byte registers little-endian. The peripheral window
//! is shared: what lives behind it depends on the selected peripheral.

use crate::pins::{IoExpanderReg, LOGICAL_PINS, PHYSICAL_PINS, Peripheral};

pub const SYS_BASE: u32 = 0x0000_0000;
pub const REMAP_BASE: u32 = 0x0000_1000;
pub const IO_METRICS_BASE: u32 = 0x0000_2000;
pub const IO_EXPANDER_BASE: u32 = 0x0000_3000;
pub const PERIPHERAL_SELECT: u32 = 0x0010_0000;
pub const PERIPHERAL_WINDOW: u32 = 0x0010_1000;

pub const REMAP_SLOTS: usize = PHYSICAL_PINS + LOGICAL_PINS;

pub const RESET_ALL: u8 = 0x01;
pub const RESET_PERIPHERALS: u8 = 0x02;
pub const TESTER_ID: u32 = 0x4D42_5453;
pub const SELF_TEST_START: u8 = 0x01;
pub const SELF_TEST_DONE: u8 = 1 << 0;
pub const SELF_TEST_PASS: u8 = 1 << 1;
pub const STATUS_CONTROL_FAULT: u8 = 1 << 0;

pub const GPIO_LEVEL: u8 = 1 << 0;
pub const GPIO_DRIVE: u8 = 1 << 1;

pub const METRICS_CTRL_RESET: u8 = 1 << 0;
pub const METRICS_CTRL_ACTIVE: u8 = 1 << 1;
/// Min-field value meaning "no complete pulse since arm".
pub const METRICS_SENTINEL: u32 = 0xFFFF_FFFF;
const METRICS_CHANNEL_BASE: u32 = 0x40;
const METRICS_CHANNEL_STRIDE: u32 = 0x40;

const IO_EXPANDER_BANK: u32 = 0x100;

pub const UART_PARITY_ENABLE: u8 = 1 << 0;
pub const UART_PARITY_ODD: u8 = 1 << 1;
pub const UART_RX_RESET: u8 = 1 << 0;
pub const UART_RX_ACTIVE: u8 = 1 << 1;
pub const UART_TX_ACTIVE: u8 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysReg {
    Reset,
    Identity,
    Scratch,
    SelfTest,
    SelfTestStatus,
    Status,
}

impl SysReg {
    pub const ALL: [SysReg; 6] = [
        Self::Reset,
        Self::Identity,
        Self::Scratch,
        Self::SelfTest,
        Self::SelfTestStatus,
        Self::Status,
    ];

    fn layout(self) -> (u32, usize) {
        match self {
            Self::Reset => (0x00, 1),
            Self::Identity => (0x04, 4),
            Self::Scratch => (0x08, 4),
            Self::SelfTest => (0x0C, 1),
            Self::SelfTestStatus => (0x0D, 1),
            Self::Status => (0x10, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartReg {
    Control,
    BaudDivisor,
    DataBits,
    StopBits,
    RxControl,
    RxChecksum,
    RxCount,
    RxParityErrors,
    RxStopErrors,
    RxFramingErrors,
    RxData,
    TxControl,
    TxCount,
    TxNext,
}

impl UartReg {
    pub const ALL: [UartReg; 14] = [
        Self::Control,
        Self::BaudDivisor,
        Self::DataBits,
        Self::StopBits,
        Self::RxControl,
        Self::RxChecksum,
        Self::RxCount,
        Self::RxParityErrors,
        Self::RxStopErrors,
        Self::RxFramingErrors,
        Self::RxData,
        Self::TxControl,
        Self::TxCount,
        Self::TxNext,
    ];

    fn layout(self) -> (u32, usize) {
        match self {
            Self::Control => (0x000, 1),
            Self::BaudDivisor => (0x004, 4),
            Self::DataBits => (0x008, 1),
            Self::StopBits => (0x009, 1),
            Self::RxControl => (0x100, 1),
            Self::RxChecksum => (0x104, 4),
            Self::RxCount => (0x108, 4),
            Self::RxParityErrors => (0x10C, 4),
            Self::RxStopErrors => (0x110, 4),
            Self::RxFramingErrors => (0x114, 4),
            Self::RxData => (0x118, 2),
            Self::TxControl => (0x200, 1),
            Self::TxCount => (0x204, 4),
            Self::TxNext => (0x208, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsReg {
    MinPulseLow,
    MinPulseHigh,
    MaxPulseLow,
    MaxPulseHigh,
    RisingEdges,
    FallingEdges,
}

impl MetricsReg {
    pub const ALL: [MetricsReg; 6] = [
        Self::MinPulseLow,
        Self::MinPulseHigh,
        Self::MaxPulseLow,
        Self::MaxPulseHigh,
        Self::RisingEdges,
        Self::FallingEdges,
    ];

    fn offset(self) -> u32 {
        match self {
            Self::MinPulseLow => 0x00,
            Self::MinPulseHigh => 0x04,
            Self::MaxPulseLow => 0x08,
            Self::MaxPulseHigh => 0x0C,
            Self::RisingEdges => 0x10,
            Self::FallingEdges => 0x14,
        }
    }
}

/// Every register the tester exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Sys(SysReg),
    /// Remap slot: physical pins 0..128, then logical slots 128..136.
    Remap(u8),
    MetricsControl,
    Metrics { channel: u8, reg: MetricsReg },
    IoExpander { reg: IoExpanderReg, pin: u8 },
    PeripheralSelect,
    /// GPIO peripheral, logical channel.
    Gpio(u8),
    Uart(UartReg),
}

impl Register {
    pub fn address(self) -> u32 {
        match self {
            Self::Sys(reg) => SYS_BASE + reg.layout().0,
            Self::Remap(slot) => REMAP_BASE + slot as u32,
            Self::MetricsControl => IO_METRICS_BASE,
            Self::Metrics { channel, reg } => {
                IO_METRICS_BASE
                    + METRICS_CHANNEL_BASE
                    + channel as u32 * METRICS_CHANNEL_STRIDE
                    + reg.offset()
            }
            Self::IoExpander { reg, pin } => {
                let bank = match reg {
                    IoExpanderReg::Config => 0,
                    IoExpanderReg::Output => 1,
                    IoExpanderReg::Input => 2,
                };
                IO_EXPANDER_BASE + bank * IO_EXPANDER_BANK + pin as u32
            }
            Self::PeripheralSelect => PERIPHERAL_SELECT,
            Self::Gpio(channel) => PERIPHERAL_WINDOW + channel as u32,
            Self::Uart(reg) => PERIPHERAL_WINDOW + reg.layout().0,
        }
    }

    /// Register width in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::Sys(reg) => reg.layout().1,
            Self::Uart(reg) => reg.layout().1,
            Self::Metrics { .. } => 4,
            _ => 1,
        }
    }

    /// Resolve a byte address to a register and the byte lane inside it.
    ///
    /// Addresses inside the peripheral window decode against `selected`.
    pub fn decode(address: u32, selected: Peripheral) -> Option<(Register, usize)> {
        if address < REMAP_BASE {
            return SysReg::ALL.iter().find_map(|&reg| {
                let (offset, width) = reg.layout();
                lane(address, SYS_BASE + offset, width).map(|l| (Self::Sys(reg), l))
            });
        }
        if address < REMAP_BASE + REMAP_SLOTS as u32 {
            return Some((Self::Remap((address - REMAP_BASE) as u8), 0));
        }
        if address == IO_METRICS_BASE {
            return Some((Self::MetricsControl, 0));
        }
        let metrics_end = IO_METRICS_BASE
            + METRICS_CHANNEL_BASE
            + LOGICAL_PINS as u32 * METRICS_CHANNEL_STRIDE;
        if (IO_METRICS_BASE + METRICS_CHANNEL_BASE..metrics_end).contains(&address) {
            let rel = address - IO_METRICS_BASE - METRICS_CHANNEL_BASE;
            let channel = (rel / METRICS_CHANNEL_STRIDE) as u8;
            let within = rel % METRICS_CHANNEL_STRIDE;
            return MetricsReg::ALL.iter().find_map(|&reg| {
                lane(within, reg.offset(), 4).map(|l| (Self::Metrics { channel, reg }, l))
            });
        }
        if (IO_EXPANDER_BASE..IO_EXPANDER_BASE + 3 * IO_EXPANDER_BANK).contains(&address) {
            let rel = address - IO_EXPANDER_BASE;
            let pin = rel % IO_EXPANDER_BANK;
            if pin as usize >= PHYSICAL_PINS {
                return None;
            }
            let reg = match rel / IO_EXPANDER_BANK {
                0 => IoExpanderReg::Config,
                1 => IoExpanderReg::Output,
                _ => IoExpanderReg::Input,
            };
            return Some((Self::IoExpander { reg, pin: pin as u8 }, 0));
        }
        if address == PERIPHERAL_SELECT {
            return Some((Self::PeripheralSelect, 0));
        }
        if address >= PERIPHERAL_WINDOW {
            let rel = address - PERIPHERAL_WINDOW;
            return match selected {
                Peripheral::Gpio if (rel as usize) < LOGICAL_PINS => {
                    Some((Self::Gpio(rel as u8), 0))
                }
                Peripheral::Uart => UartReg::ALL.iter().find_map(|&reg| {
                    let (offset, width) = reg.layout();
                    lane(rel, offset, width).map(|l| (Self::Uart(reg), l))
                }),
                _ => None,
            };
        }
        None
    }
}

fn lane(address: u32, start: u32, width: usize) -> Option<usize> {
    (address >= start && address < start + width as u32).then(|| (address - start) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_registers() -> Vec<(Register, Peripheral)> {
        let mut regs = Vec::new();
        for reg in SysReg::ALL {
            regs.push((Register::Sys(reg), Peripheral::None));
        }
        for slot in 0..REMAP_SLOTS as u8 {
            regs.push((Register::Remap(slot), Peripheral::None));
        }
        regs.push((Register::MetricsControl, Peripheral::None));
        for channel in 0..LOGICAL_PINS as u8 {
            for reg in MetricsReg::ALL {
                regs.push((Register::Metrics { channel, reg }, Peripheral::None));
            }
        }
        for pin in 0..PHYSICAL_PINS as u8 {
            for reg in [IoExpanderReg::Config, IoExpanderReg::Output, IoExpanderReg::Input] {
                regs.push((Register::IoExpander { reg, pin }, Peripheral::None));
            }
        }
        regs.push((Register::PeripheralSelect, Peripheral::None));
        for channel in 0..LOGICAL_PINS as u8 {
            regs.push((Register::Gpio(channel), Peripheral::Gpio));
        }
        for reg in UartReg::ALL {
            regs.push((Register::Uart(reg), Peripheral::Uart));
        }
        regs
    }

    #[test]
    fn every_lane_decodes_back_to_its_register() {
        for (reg, selected) in all_registers() {
            for l in 0..reg.width() {
                let decoded = Register::decode(reg.address() + l as u32, selected);
                assert_eq!(decoded, Some((reg, l)), "{reg:?} lane {l}");
            }
        }
    }

    #[test]
    fn regions_do_not_overlap() {
        let mut seen = std::collections::HashMap::new();
        for (reg, selected) in all_registers() {
            for l in 0..reg.width() {
                let key = (reg.address() + l as u32, selected == Peripheral::Uart);
                if let Some(prev) = seen.insert(key, reg) {
                    panic!("{reg:?} overlaps {prev:?}");
                }
            }
        }
    }

    #[test]
    fn fixed_bases_match_protocol() {
        assert_eq!(Register::Remap(0).address(), 0x0000_1000);
        assert_eq!(Register::Remap(128).address(), 0x0000_1080);
        assert_eq!(Register::PeripheralSelect.address(), 0x0010_0000);
        assert_eq!(Register::Gpio(0).address(), 0x0010_1000);
    }

    #[test]
    fn window_is_empty_without_peripheral() {
        assert_eq!(Register::decode(PERIPHERAL_WINDOW, Peripheral::None), None);
        assert_eq!(Register::decode(PERIPHERAL_WINDOW + 8, Peripheral::Gpio), None);
        assert_eq!(Register::decode(0x0000_0003, Peripheral::None), None);
    }
}
