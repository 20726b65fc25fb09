use crate::{Tester, TesterError};
use cishield_hal::regs::{
    Register, UART_PARITY_ENABLE, UART_PARITY_ODD, UART_RX_ACTIVE, UART_RX_RESET, UART_TX_ACTIVE,
    UartReg,
};
use cishield_hal::traits::Transport;
use std::ops::RangeInclusive;

pub const DATA_BITS: RangeInclusive<u8> = 5..=9;
pub const STOP_BITS: RangeInclusive<u8> = 1..=2;

/// UART peripheral view. Select [`cishield_hal::pins::Peripheral::Uart`] and
/// map the UART roles before using it.
pub struct Uart<'a, T: Transport> {
    tester: &'a mut Tester<T>,
}

impl<'a, T: Transport> Uart<'a, T> {
    pub(crate) fn new(tester: &'a mut Tester<T>) -> Self {
        Self { tester }
    }

    fn write(&mut self, reg: UartReg, value: u32) -> Result<(), TesterError> {
        self.tester.write_reg(Register::Uart(reg), value)
    }

    fn read(&mut self, reg: UartReg) -> Result<u32, TesterError> {
        self.tester.read_reg(Register::Uart(reg))
    }

    /// Program the bit period as a divisor of the tester tick clock.
    pub fn set_baud(&mut self, baud: u32) -> Result<(), TesterError> {
        let tick_hz = self.tester.constants().tick_hz;
        if baud == 0 || baud > tick_hz {
            return Err(TesterError::InvalidUartConfig(format!(
                "baud {baud} with a {tick_hz} Hz tick"
            )));
        }
        self.write(UartReg::BaudDivisor, tick_hz / baud)
    }

    pub fn set_bits(&mut self, bits: u8) -> Result<(), TesterError> {
        if !DATA_BITS.contains(&bits) {
            return Err(TesterError::InvalidUartConfig(format!("{bits} data bits")));
        }
        self.write(UartReg::DataBits, bits as u32)
    }

    pub fn set_stops(&mut self, stops: u8) -> Result<(), TesterError> {
        if !STOP_BITS.contains(&stops) {
            return Err(TesterError::InvalidUartConfig(format!("{stops} stop bits")));
        }
        self.write(UartReg::StopBits, stops as u32)
    }

    pub fn set_parity(&mut self, enabled: bool, odd: bool) -> Result<(), TesterError> {
        let mut control = 0;
        if enabled {
            control |= UART_PARITY_ENABLE;
            if odd {
                control |= UART_PARITY_ODD;
            }
        }
        self.write(UartReg::Control, control as u32)
    }

    /// Clear the receive counters and start capturing.
    pub fn rx_start(&mut self) -> Result<(), TesterError> {
        self.write(UartReg::RxControl, (UART_RX_RESET | UART_RX_ACTIVE) as u32)
    }

    pub fn rx_stop(&mut self) -> Result<(), TesterError> {
        self.write(UartReg::RxControl, 0)
    }

    /// Last character received.
    pub fn rx_get_data(&mut self) -> Result<u16, TesterError> {
        Ok(self.read(UartReg::RxData)? as u16)
    }

    pub fn rx_get_checksum(&mut self) -> Result<u32, TesterError> {
        self.read(UartReg::RxChecksum)
    }

    pub fn rx_get_count(&mut self) -> Result<u32, TesterError> {
        self.read(UartReg::RxCount)
    }

    pub fn rx_get_framing_errors(&mut self) -> Result<u32, TesterError> {
        self.read(UartReg::RxFramingErrors)
    }

    pub fn rx_get_parity_errors(&mut self) -> Result<u32, TesterError> {
        self.read(UartReg::RxParityErrors)
    }

    pub fn rx_get_stop_errors(&mut self) -> Result<u32, TesterError> {
        self.read(UartReg::RxStopErrors)
    }

    /// Characters the generator sends after the next `tx_start`.
    pub fn tx_set_count(&mut self, count: u32) -> Result<(), TesterError> {
        self.write(UartReg::TxCount, count)
    }

    /// First character value; later ones increment, wrapping at the data width.
    pub fn tx_set_next(&mut self, value: u16) -> Result<(), TesterError> {
        self.write(UartReg::TxNext, value as u32)
    }

    /// Characters still to send.
    pub fn tx_get_count(&mut self) -> Result<u32, TesterError> {
        self.read(UartReg::TxCount)
    }

    pub fn tx_get_next(&mut self) -> Result<u16, TesterError> {
        Ok(self.read(UartReg::TxNext)? as u16)
    }

    pub fn tx_start(&mut self) -> Result<(), TesterError> {
        log::debug!("UART TX start");
        self.write(UartReg::TxControl, UART_TX_ACTIVE as u32)
    }

    pub fn tx_stop(&mut self) -> Result<(), TesterError> {
        self.write(UartReg::TxControl, 0)
    }
}
