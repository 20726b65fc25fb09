use crate::config::TesterConstants;
use crate::regs::{
    UART_PARITY_ENABLE, UART_PARITY_ODD, UART_RX_ACTIVE, UART_RX_RESET, UART_TX_ACTIVE, UartReg,
};

/// Relative baud mismatch a receiver still samples correctly, in percent.
const BAUD_TOLERANCE_PCT: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Line settings the DUT transmits with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFrame {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl SerialFrame {
    pub fn new(baud: u32) -> Self {
        Self {
            baud,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }

    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }
}

fn parity_bit(value: u16, bits: u8, parity: Parity) -> Option<bool> {
    let ones = (value & mask(bits) as u16).count_ones();
    match parity {
        Parity::None => None,
        Parity::Even => Some(ones % 2 == 1),
        Parity::Odd => Some(ones % 2 == 0),
    }
}

fn mask(bits: u8) -> u32 {
    (1u32 << bits.min(16)) - 1
}

/// UART peripheral registers with its RX capture and TX generator.
#[derive(Debug, Clone)]
pub(crate) struct UartEngine {
    control: u8,
    divisor: u32,
    data_bits: u8,
    stop_bits: u8,
    rx_control: u8,
    rx_checksum: u32,
    rx_count: u32,
    rx_parity_errors: u32,
    rx_stop_errors: u32,
    rx_framing_errors: u32,
    rx_data: u16,
    tx_control: u8,
    tx_count: u32,
    tx_next: u16,
    tx_elapsed: u64,
}

impl Default for UartEngine {
    fn default() -> Self {
        Self {
            control: 0,
            divisor: 0,
            data_bits: 8,
            stop_bits: 1,
            rx_control: 0,
            rx_checksum: 0,
            rx_count: 0,
            rx_parity_errors: 0,
            rx_stop_errors: 0,
            rx_framing_errors: 0,
            rx_data: 0,
            tx_control: 0,
            tx_count: 0,
            tx_next: 0,
            tx_elapsed: 0,
        }
    }
}

impl UartEngine {
    pub fn read(&self, reg: UartReg) -> u32 {
        match reg {
            UartReg::Control => self.control as u32,
            UartReg::BaudDivisor => self.divisor,
            UartReg::DataBits => self.data_bits as u32,
            UartReg::StopBits => self.stop_bits as u32,
            UartReg::RxControl => self.rx_control as u32,
            UartReg::RxChecksum => self.rx_checksum,
            UartReg::RxCount => self.rx_count,
            UartReg::RxParityErrors => self.rx_parity_errors,
            UartReg::RxStopErrors => self.rx_stop_errors,
            UartReg::RxFramingErrors => self.rx_framing_errors,
            UartReg::RxData => self.rx_data as u32,
            UartReg::TxControl => self.tx_control as u32,
            UartReg::TxCount => self.tx_count,
            UartReg::TxNext => self.tx_next as u32,
        }
    }

    pub fn write(&mut self, reg: UartReg, value: u32) {
        match reg {
            UartReg::Control => self.control = value as u8 & (UART_PARITY_ENABLE | UART_PARITY_ODD),
            UartReg::BaudDivisor => self.divisor = value,
            UartReg::DataBits => self.data_bits = value as u8,
            UartReg::StopBits => self.stop_bits = value as u8,
            UartReg::RxControl => {
                if value as u8 & UART_RX_RESET != 0 {
                    self.rx_checksum = 0;
                    self.rx_count = 0;
                    self.rx_parity_errors = 0;
                    self.rx_stop_errors = 0;
                    self.rx_framing_errors = 0;
                    self.rx_data = 0;
                }
                self.rx_control = value as u8 & UART_RX_ACTIVE;
            }
            UartReg::TxControl => {
                let was_active = self.tx_control & UART_TX_ACTIVE != 0;
                self.tx_control = value as u8 & UART_TX_ACTIVE;
                if !was_active {
                    self.tx_elapsed = 0;
                }
            }
            UartReg::TxCount => self.tx_count = value,
            UartReg::TxNext => self.tx_next = value as u16,
            UartReg::RxChecksum
            | UartReg::RxCount
            | UartReg::RxParityErrors
            | UartReg::RxStopErrors
            | UartReg::RxFramingErrors
            | UartReg::RxData => {}
        }
    }

    fn configured_parity(&self) -> Parity {
        match (
            self.control & UART_PARITY_ENABLE != 0,
            self.control & UART_PARITY_ODD != 0,
        ) {
            (false, _) => Parity::None,
            (true, false) => Parity::Even,
            (true, true) => Parity::Odd,
        }
    }

    /// One character arriving on the RX line.
    pub fn receive(&mut self, frame: &SerialFrame, value: u16, constants: &TesterConstants) {
        if self.rx_control & UART_RX_ACTIVE == 0 {
            return;
        }
        let baud = if self.divisor == 0 {
            0
        } else {
            (constants.tick_hz / self.divisor) as u64
        };
        let off = (frame.baud as u64).abs_diff(baud);
        if baud == 0 || off * 100 > baud * BAUD_TOLERANCE_PCT || frame.data_bits != self.data_bits {
            self.rx_framing_errors += 1;
            return;
        }

        let expected = self.configured_parity();
        match (expected, frame.parity) {
            (Parity::None, Parity::None) => {}
            (Parity::None, sent) => {
                // The extra bit lands where the receiver samples its stop bit.
                if parity_bit(value, frame.data_bits, sent) == Some(false) {
                    self.rx_stop_errors += 1;
                }
            }
            (expected, sent) if expected != sent => self.rx_parity_errors += 1,
            _ => {}
        }
        if frame.stop_bits < self.stop_bits {
            self.rx_stop_errors += 1;
        }

        let value = (value as u32 & mask(self.data_bits)) as u16;
        self.rx_count += 1;
        self.rx_checksum = constants.checksum.accumulate(self.rx_checksum, value);
        self.rx_data = value;
    }

    /// Line time of one character: start, data, parity and stop bits.
    fn char_ticks(&self) -> u64 {
        let parity = u64::from(self.configured_parity() != Parity::None);
        let bits = 1 + self.data_bits as u64 + parity + self.stop_bits as u64;
        self.divisor.max(1) as u64 * bits
    }

    /// Let `ticks` of line time pass and return the characters the TX
    /// generator finished sending in it. The generator idles once its count
    /// runs out; a stop leaves count and next value where they were.
    pub fn tick(&mut self, ticks: u64) -> Vec<u16> {
        if self.tx_control & UART_TX_ACTIVE == 0 {
            return Vec::new();
        }
        let per_char = self.char_ticks();
        self.tx_elapsed += ticks;
        let due = (self.tx_elapsed / per_char).min(self.tx_count as u64);
        self.tx_elapsed -= due * per_char;

        let mask = mask(self.data_bits);
        let mut next = self.tx_next as u32 & mask;
        let mut out = Vec::with_capacity(due as usize);
        for _ in 0..due {
            out.push(next as u16);
            next = next.wrapping_add(1) & mask;
        }
        self.tx_count -= due as u32;
        self.tx_next = next as u16;
        if self.tx_count == 0 {
            self.tx_control = 0;
            self.tx_elapsed = 0;
        }
        out
    }
}
