//! Driver for the FPGA CI test shield.
//!
//! One [`Tester`] owns the register transport (and optionally a second,
//! bit-banged one) for the whole test run. Peripheral-specific operations are
//! reached through short-lived views: [`Tester::uart`] and
//! [`Tester::io_metrics`].

pub mod metrics;
pub mod selftest;
pub mod tester;
pub mod uart;

pub use metrics::{ChannelMetrics, IoMetrics};
pub use selftest::SelfTestReport;
pub use tester::Tester;
pub use uart::Uart;

use cishield_hal::traits::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TesterError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("pin {0} is not on the form factor")]
    UnknownPin(String),
    #[error("physical pin {0} is out of range")]
    PhysicalPinOutOfRange(usize),
    #[error("no bit-banged transport attached")]
    NoBitBangChannel,
    #[error("invalid UART setting: {0}")]
    InvalidUartConfig(String),
    #[error("tester reports unknown peripheral id {0}")]
    UnknownPeripheral(u8),
}
