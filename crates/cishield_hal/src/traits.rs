use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("control pin error: {0}")]
    Pin(String),
    #[error("no sync from tester (got {0:#04x})")]
    NoSync(u8),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("transfer of {0} bytes exceeds the frame limit")]
    TooLong(usize),
    #[error("timeout")]
    Timeout,
}

/// Addressed register access to the tester.
///
/// Implementations perform exactly one transaction per call and either
/// complete it or return an error; a failed write leaves the tester unchanged.
pub trait Transport: Send {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), TransportError>;
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError>;

    /// Short label for log lines.
    fn name(&self) -> &'static str {
        "transport"
    }
}

impl Transport for Box<dyn Transport> {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), TransportError> {
        (**self).read(address, buf)
    }
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(address, data)
    }
    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// A native full-duplex control bus.
///
/// `transfer` keeps the tester selected for the whole call, clocks `tx` out and
/// fills `rx` with the bytes clocked in. Both slices have the same length.
pub trait ControlBus: Send {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError>;
}

/// Discrete control-channel lines for the bit-banged transport.
///
/// Levels are logical: `true` on `set_select` asserts the tester select line
/// regardless of its electrical polarity.
pub trait ControlPins: Send {
    fn set_select(&mut self, active: bool) -> Result<(), TransportError>;
    fn set_clock(&mut self, high: bool) -> Result<(), TransportError>;
    fn set_mosi(&mut self, high: bool) -> Result<(), TransportError>;
    fn miso(&mut self) -> Result<bool, TransportError>;
}
