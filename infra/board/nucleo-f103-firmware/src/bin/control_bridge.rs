#![no_std]
#![no_main]

//! Serial control bridge for the CI test shield.
//!
//! Receives link frames (`0xA5 | seq | len u16 LE | payload | crc16-modbus LE`)
//! on USART2 (the ST-LINK virtual COM port), clocks the payload out to the
//! tester on PB12..PB15 with the select line held low, and answers with a link
//! frame carrying the bytes clocked in under the same `seq`.

use cortex_m_rt::entry;
use crc::{CRC_16_MODBUS, Crc};
use nb::Error as NbError;
use panic_halt as _;
use stm32f1xx_hal::{
    gpio::{Input, Output, PullDown, PushPull, gpiob},
    pac,
    prelude::*,
    serial::{Config, Serial},
};

const START: u8 = 0xA5;
const PREFIX_LEN: usize = 4;
const CRC_LEN: usize = 2;
const MAX_PAYLOAD: usize = 512;
const RX_CAP: usize = PREFIX_LEN + MAX_PAYLOAD + CRC_LEN;
const BAUD_RATE: u32 = 921_600;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

struct ControlPins {
    select: gpiob::PB12<Output<PushPull>>,
    clock: gpiob::PB13<Output<PushPull>>,
    miso: gpiob::PB14<Input<PullDown>>,
    mosi: gpiob::PB15<Output<PushPull>>,
}

impl ControlPins {
    /// SPI mode 0, MSB first. `buf` is shifted out and overwritten with the
    /// bytes shifted in.
    fn transfer(&mut self, buf: &mut [u8]) {
        self.clock.set_low();
        self.select.set_low();
        for byte in buf.iter_mut() {
            let mut rx = 0u8;
            for bit in (0..8).rev() {
                if *byte & (1 << bit) != 0 {
                    self.mosi.set_high();
                } else {
                    self.mosi.set_low();
                }
                self.clock.set_high();
                if self.miso.is_high() {
                    rx |= 1 << bit;
                }
                self.clock.set_low();
            }
            *byte = rx;
        }
        self.select.set_high();
    }
}

fn shift_left(buf: &mut [u8], len: &mut usize, n: usize) {
    if n >= *len {
        *len = 0;
        return;
    }
    buf.copy_within(n..*len, 0);
    *len -= n;
}

/// Build a response frame around `payload_len` bytes already at
/// `frame[PREFIX_LEN..]`. Returns the frame length.
fn seal(frame: &mut [u8], seq: u8, payload_len: usize) -> usize {
    frame[0] = START;
    frame[1] = seq;
    frame[2..PREFIX_LEN].copy_from_slice(&(payload_len as u16).to_le_bytes());
    let body = PREFIX_LEN + payload_len;
    let crc = CRC16.checksum(&frame[..body]);
    frame[body..body + CRC_LEN].copy_from_slice(&crc.to_le_bytes());
    body + CRC_LEN
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();

    let mut flash = dp.FLASH.constrain();
    let rcc = dp.RCC.constrain();
    // NUCLEO-F103RB: HSE is provided by the debugger MCO pin at 8 MHz.
    let clocks = rcc.cfgr.use_hse(8.MHz()).sysclk(72.MHz()).freeze(&mut flash.acr);

    let mut afio = dp.AFIO.constrain();
    let mut gpioa = dp.GPIOA.split();
    let mut gpiob = dp.GPIOB.split();

    let mut pins = ControlPins {
        select: gpiob.pb12.into_push_pull_output(&mut gpiob.crh),
        clock: gpiob.pb13.into_push_pull_output(&mut gpiob.crh),
        miso: gpiob.pb14.into_pull_down_input(&mut gpiob.crh),
        mosi: gpiob.pb15.into_push_pull_output(&mut gpiob.crh),
    };
    pins.select.set_high();
    pins.clock.set_low();

    // LD2 lights while a frame is on the control channel.
    let mut led = gpioa.pa5.into_push_pull_output(&mut gpioa.crl);

    let tx_pin = gpioa.pa2.into_alternate_push_pull(&mut gpioa.crl);
    let rx_pin = gpioa.pa3;
    let serial = Serial::new(
        dp.USART2,
        (tx_pin, rx_pin),
        &mut afio.mapr,
        Config::default().baudrate(BAUD_RATE.bps()),
        &clocks,
    );
    let (mut tx_uart, mut rx_uart) = serial.split();

    let mut rx_buf = [0u8; RX_CAP];
    let mut rx_len: usize = 0;
    let mut tx_buf = [0u8; RX_CAP];
    // Bytes of an oversized frame still to be thrown away.
    let mut discard: usize = 0;

    loop {
        match rx_uart.read() {
            Ok(_) if discard > 0 => discard -= 1,
            Ok(b) => {
                if rx_len < RX_CAP {
                    rx_buf[rx_len] = b;
                    rx_len += 1;
                } else {
                    rx_len = 0;
                }
            }
            Err(NbError::WouldBlock) => {}
            Err(_) => {}
        }

        while rx_len >= PREFIX_LEN {
            if rx_buf[0] != START {
                shift_left(&mut rx_buf, &mut rx_len, 1);
                continue;
            }
            let seq = rx_buf[1];
            let payload_len = u16::from_le_bytes([rx_buf[2], rx_buf[3]]) as usize;
            let resp_len = if payload_len > MAX_PAYLOAD {
                // Too long for the buffer: skip the frame and answer with an
                // empty payload so the host fails fast instead of timing out.
                let skip = (PREFIX_LEN + payload_len + CRC_LEN).min(rx_len);
                discard = PREFIX_LEN + payload_len + CRC_LEN - skip;
                shift_left(&mut rx_buf, &mut rx_len, skip);
                seal(&mut tx_buf, seq, 0)
            } else {
                let frame_len = PREFIX_LEN + payload_len + CRC_LEN;
                if rx_len < frame_len {
                    break;
                }
                let body = PREFIX_LEN + payload_len;
                let stored = u16::from_le_bytes([rx_buf[body], rx_buf[body + 1]]);
                if CRC16.checksum(&rx_buf[..body]) != stored {
                    shift_left(&mut rx_buf, &mut rx_len, 1);
                    continue;
                }

                tx_buf[PREFIX_LEN..body].copy_from_slice(&rx_buf[PREFIX_LEN..body]);
                led.set_high();
                pins.transfer(&mut tx_buf[PREFIX_LEN..body]);
                led.set_low();
                shift_left(&mut rx_buf, &mut rx_len, frame_len);
                seal(&mut tx_buf, seq, payload_len)
            };

            for b in &tx_buf[..resp_len] {
                let _ = nb::block!(tx_uart.write(*b));
            }
        }
    }
}
