//! Serial control bridge.
//!
//! A small MCU sits between the host and the tester's control pins. The host
//! sends it a whole control-channel frame over a serial link; the bridge clocks
//! the frame out to the tester and returns the bytes it clocked in. To the
//! transports this looks like any other [`ControlBus`].

pub mod link;

use cishield_hal::traits::{ControlBus, TransportError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Runtime;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

const MAX_CONNECT_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;
/// Silence that ends a drain of leftover input.
const DRAIN_QUIET: Duration = Duration::from_millis(5);

pub const DEFAULT_BAUD_RATE: u32 = 921_600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot start I/O runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("cannot open {port} after {attempts} attempts: {source}")]
    Open {
        port: String,
        attempts: u32,
        source: tokio_serial::Error,
    },
}

/// [`ControlBus`] over a serial link to the bridge MCU.
pub struct SerialBridge<S = SerialStream> {
    stream: S,
    rt: Runtime,
    timeout: Duration,
    seq: u8,
    /// A fault left unread bytes on the link.
    dirty: bool,
}

impl SerialBridge<SerialStream> {
    /// Open the bridge's serial port, retrying while it enumerates.
    pub fn connect(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, BridgeError> {
        let rt = Runtime::new()?;

        log::info!("Opening control bridge at {port} (baud {baud_rate})");

        let mut attempt = 1;
        loop {
            let opened = rt.block_on(async {
                tokio_serial::new(port, baud_rate)
                    .data_bits(DataBits::Eight)
                    .parity(Parity::None)
                    .stop_bits(StopBits::One)
                    .flow_control(FlowControl::None)
                    .open_native_async()
            });
            match opened {
                Ok(stream) => {
                    if attempt > 1 {
                        log::info!("Opened on attempt {attempt}");
                    }
                    return Ok(Self::attach(stream, rt, timeout));
                }
                Err(e) if attempt < MAX_CONNECT_RETRIES => {
                    log::warn!("Open attempt {attempt}/{MAX_CONNECT_RETRIES} failed: {e}");
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                    attempt += 1;
                }
                Err(source) => {
                    return Err(BridgeError::Open {
                        port: port.to_string(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

impl<S> SerialBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Use an already-open byte stream. `rt` drives all I/O on it.
    pub fn attach(stream: S, rt: Runtime, timeout: Duration) -> Self {
        Self {
            stream,
            rt,
            timeout,
            seq: 0,
            dirty: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request frame and wait for the response carrying its
    /// sequence number. Responses to earlier requests are dropped.
    fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.dirty {
            self.drain();
        }
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let request = link::encode(seq, payload)?;
        let timeout = self.timeout;
        let stream = &mut self.stream;
        let io = async move {
            stream.write_all(&request).await?;
            stream.flush().await?;
            loop {
                let mut prefix = [0u8; link::PREFIX_LEN];
                stream.read_exact(&mut prefix).await?;
                let len = link::payload_len(&prefix)?;
                let mut frame = prefix.to_vec();
                frame.resize(link::PREFIX_LEN + len + link::CRC_LEN, 0);
                stream.read_exact(&mut frame[link::PREFIX_LEN..]).await?;
                let (got, response) = link::decode(&frame)?;
                if got == seq {
                    return Ok::<_, LinkFault>(response.to_vec());
                }
                log::warn!("dropping stale bridge response {got} while waiting for {seq}");
            }
        };
        let result = self
            .rt
            .block_on(async move { tokio::time::timeout(timeout, io).await });
        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(LinkFault::Io(e))) => {
                self.dirty = true;
                Err(TransportError::Bus(format!("serial: {e}")))
            }
            Ok(Err(LinkFault::Frame(e))) => {
                self.dirty = true;
                Err(e)
            }
            Err(_) => {
                log::warn!("bridge did not answer within {:?}", self.timeout);
                self.dirty = true;
                Err(TransportError::Timeout)
            }
        }
    }

    /// Discard input until the link has been quiet for a moment.
    fn drain(&mut self) {
        let stream = &mut self.stream;
        let dropped = self.rt.block_on(async move {
            let mut buf = [0u8; 256];
            let mut dropped = 0;
            while let Ok(Ok(n)) = tokio::time::timeout(DRAIN_QUIET, stream.read(&mut buf)).await {
                if n == 0 {
                    break;
                }
                dropped += n;
            }
            dropped
        });
        if dropped > 0 {
            log::debug!("drained {dropped} leftover bytes from the bridge link");
        }
        self.dirty = false;
    }
}

enum LinkFault {
    Io(std::io::Error),
    Frame(TransportError),
}

impl From<std::io::Error> for LinkFault {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<TransportError> for LinkFault {
    fn from(e: TransportError) -> Self {
        Self::Frame(e)
    }
}

impl<S> ControlBus for SerialBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        let response = self.exchange(tx)?;
        if response.len() != rx.len() {
            return Err(TransportError::Malformed(format!(
                "bridge returned {} bytes for a {} byte transfer",
                response.len(),
                rx.len()
            )));
        }
        rx.copy_from_slice(&response);
        log::debug!("bridge transfer of {} bytes", tx.len());
        Ok(())
    }
}
