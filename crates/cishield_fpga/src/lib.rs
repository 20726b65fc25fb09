//! Control-channel transports for the FPGA test shield.
//!
//! Both transports send the same frame (see `cishield_hal::wire`). The
//! system-bus transport hands the whole frame to a native bus; the bit-banged
//! transport clocks it out on four discrete pins. Register contents and read
//! results must not depend on which one is used.

pub mod bitbang;
pub mod hal;
pub mod system_bus;

pub use bitbang::BitBangTransport;
pub use hal::{HalPins, SpiControlBus};
pub use system_bus::SystemBusTransport;

use cishield_hal::traits::TransportError;
use cishield_hal::wire::{self, Direction, HEADER_LEN, Header};

pub(crate) fn read_with<F>(address: u32, buf: &mut [u8], transfer: F) -> Result<(), TransportError>
where
    F: FnOnce(&[u8], &mut [u8]) -> Result<(), TransportError>,
{
    let header = Header::new(Direction::Read, address, buf.len())?;
    let tx = wire::build_frame(&header, &[]);
    let mut rx = vec![0u8; tx.len()];
    transfer(&tx, &mut rx)?;
    wire::check_sync(&rx)?;
    buf.copy_from_slice(&rx[HEADER_LEN..]);
    Ok(())
}

pub(crate) fn write_with<F>(address: u32, data: &[u8], transfer: F) -> Result<(), TransportError>
where
    F: FnOnce(&[u8], &mut [u8]) -> Result<(), TransportError>,
{
    let header = Header::new(Direction::Write, address, data.len())?;
    let tx = wire::build_frame(&header, data);
    let mut rx = vec![0u8; tx.len()];
    transfer(&tx, &mut rx)?;
    wire::check_sync(&rx)
}
