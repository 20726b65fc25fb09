use cishield_fpga::{BitBangTransport, SystemBusTransport};
use cishield_hal::config::BoardPins;
use cishield_hal::pins::{IoExpanderReg, LogicalPin, Peripheral, PhysicalPin, Pull};
use cishield_hal::regs::{METRICS_SENTINEL, REMAP_BASE, REMAP_SLOTS};
use cishield_hal::sim::{Parity, SerialFrame, SimTester};
use cishield_tester::{Tester, TesterError};

type Rig = Tester<SystemBusTransport<SimTester>>;

fn board() -> BoardPins {
    let names: Vec<String> = (0..16).map(|i| format!("D{i}")).collect();
    BoardPins::new(names, vec!["D0".to_string(), "D1".to_string()]).unwrap()
}

fn rig() -> (Rig, SimTester) {
    let sim = SimTester::new();
    let tester = Tester::new(SystemBusTransport::new(sim.clone()), board(), sim.constants())
        .with_bitbang(BitBangTransport::new(sim.clone()));
    (tester, sim)
}

fn us(ticks: u32) -> u32 {
    ticks / 100
}

#[test]
fn pin_map_reset_is_idempotent() {
    let (mut t, sim) = rig();
    let d4 = t.pin("D4").unwrap();
    t.pin_map_set(d4, LogicalPin::Gpio2).unwrap();

    t.pin_map_reset().unwrap();
    let mut table = [0u8; REMAP_SLOTS];
    t.read(REMAP_BASE, &mut table).unwrap();
    assert!(table.iter().all(|&b| b == 0xFF));
    let once = sim.snapshot();

    t.pin_map_reset().unwrap();
    assert_eq!(sim.snapshot(), once);
    assert!(!t.pin_map_is_mapped(d4).unwrap());
}

#[test]
fn pull_encoding_on_both_transports() {
    let (mut t, _sim) = rig();
    let usable: Vec<PhysicalPin> = t.board().usable().map(|(_, pin)| pin).collect();
    assert_eq!(usable.len(), 14);

    let cases = [
        (Pull::PullDown, 0, Some(0)),
        (Pull::PullUp, 0, Some(1)),
        (Pull::PullNone, 1, None),
    ];
    for pin in usable {
        for (pull, config, output) in cases {
            for bitbang in [false, true] {
                if bitbang {
                    t.pin_set_pull_bb(pin, pull).unwrap();
                } else {
                    t.pin_set_pull(pin, pull).unwrap();
                }
                for read_bb in [false, true] {
                    let read = |t: &mut Rig, reg| {
                        if read_bb {
                            t.io_expander_read_bb(pin, reg)
                        } else {
                            t.io_expander_read(pin, reg)
                        }
                    };
                    let got = read(&mut t, IoExpanderReg::Config).unwrap();
                    assert_eq!(got, config, "{pin} {pull:?} config");
                    if let Some(output) = output {
                        let got = read(&mut t, IoExpanderReg::Output).unwrap();
                        assert_eq!(got, output, "{pin} {pull:?} output");
                    }
                }
            }
        }
    }
}

#[test]
fn pull_levels_reach_the_input_register() {
    let (mut t, _sim) = rig();
    let pin = t.pin("D7").unwrap();
    t.pin_set_pull(pin, Pull::PullUp).unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Input).unwrap(), 1);
    t.pin_set_pull(pin, Pull::PullDown).unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Input).unwrap(), 0);
    t.pin_set_pull(pin, Pull::PullUp).unwrap();
    t.pin_pull_reset_all().unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Config).unwrap(), 1);
}

#[test]
fn gpio_drive_read_loop() {
    let (mut t, sim) = rig();
    let pin = t.pin("D5").unwrap();
    t.pin_map_set(pin, LogicalPin::Gpio0).unwrap();
    t.select_peripheral(Peripheral::Gpio).unwrap();

    t.gpio_write(LogicalPin::Gpio0, false, true).unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Input).unwrap(), 0);
    assert!(!sim.pin_level(pin));

    t.gpio_write(LogicalPin::Gpio0, true, true).unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Input).unwrap(), 1);
    assert!(t.gpio_read(LogicalPin::Gpio0).unwrap());

    // Released: the pull decides.
    t.pin_set_pull(pin, Pull::PullDown).unwrap();
    t.gpio_write(LogicalPin::Gpio0, true, false).unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Input).unwrap(), 0);
    t.pin_set_pull(pin, Pull::PullUp).unwrap();
    assert_eq!(t.io_expander_read(pin, IoExpanderReg::Input).unwrap(), 1);
}

#[test]
fn gpio_reads_what_the_dut_drives() {
    let (mut t, sim) = rig();
    let pin = t.pin("D9").unwrap();
    t.pin_map_set(pin, LogicalPin::Gpio6).unwrap();
    t.select_peripheral(Peripheral::Gpio).unwrap();
    sim.drive_pin(pin, Some(true));
    assert!(t.gpio_read(LogicalPin::Gpio6).unwrap());
    sim.drive_pin(pin, Some(false));
    assert!(!t.gpio_read(LogicalPin::Gpio6).unwrap());
}

#[test]
fn metrics_single_pulse_with_sentinels() {
    for (i, &bound) in LogicalPin::IO_METRICS.iter().enumerate() {
        let (mut t, sim) = rig();
        let pin = t.pin(&format!("D{}", i + 2)).unwrap();
        t.pin_map_set(pin, bound).unwrap();
        sim.drive_pin(pin, Some(false));

        let bench = sim.clone();
        t.io_metrics()
            .measure(|_| {
                bench.advance_us(100_000);
                bench.drive_pin(pin, Some(true));
                bench.advance_us(1_000);
                bench.drive_pin(pin, Some(false));
                bench.advance_us(50_000);
            })
            .unwrap();

        let mut m = t.io_metrics();
        assert_eq!(m.min_pulse_low(bound).unwrap(), METRICS_SENTINEL, "{bound:?}");
        assert!(us(m.max_pulse_low(bound).unwrap()).abs_diff(100_000) <= 20);
        assert!(us(m.min_pulse_high(bound).unwrap()).abs_diff(1_000) <= 20);
        assert!(us(m.max_pulse_high(bound).unwrap()).abs_diff(1_000) <= 20);
        assert_eq!(m.rising_edges(bound).unwrap(), 1);
        assert_eq!(m.falling_edges(bound).unwrap(), 1);

        for &channel in LogicalPin::IO_METRICS.iter().filter(|&&c| c != bound) {
            let snap = m.snapshot(channel).unwrap();
            assert_eq!(snap.rising_edges, 0, "{channel:?} with {bound:?} bound");
            assert_eq!(snap.falling_edges, 0);
            assert_eq!(snap.min_pulse_high, METRICS_SENTINEL);
            assert_eq!(snap.max_pulse_high, 0);
            assert!(us(snap.max_pulse_low) >= 151_000);
        }
    }
}

#[test]
fn metrics_snapshot_matches_getters() {
    let (mut t, sim) = rig();
    let pin = t.pin("D2").unwrap();
    t.pin_map_set(pin, LogicalPin::IoMetrics4).unwrap();
    sim.drive_pin(pin, Some(false));

    let bench = sim.clone();
    t.io_metrics()
        .measure(|_| {
            for _ in 0..3 {
                bench.advance_us(10);
                bench.drive_pin(pin, Some(true));
                bench.advance_us(30);
                bench.drive_pin(pin, Some(false));
            }
            bench.advance_us(5);
        })
        .unwrap();

    let constants = t.constants();
    let mut m = t.io_metrics();
    let snap = m.snapshot(LogicalPin::IoMetrics4).unwrap();
    assert_eq!(snap.rising_edges, m.rising_edges(LogicalPin::IoMetrics4).unwrap());
    assert_eq!(snap.max_pulse_low, m.max_pulse_low(LogicalPin::IoMetrics4).unwrap());
    let in_us = snap.to_us(&constants);
    assert_eq!(in_us.rising_edges, 3);
    assert_eq!(in_us.min_pulse_high, 30);
    assert_eq!(in_us.min_pulse_low, 10);
    assert!(snap.saw_low_pulse() && snap.saw_high_pulse());
}

#[test]
fn metrics_frozen_after_stop() {
    let (mut t, sim) = rig();
    let pin = t.pin("D2").unwrap();
    t.pin_map_set(pin, LogicalPin::IoMetrics1).unwrap();
    t.io_metrics().measure(|_| sim.advance_us(20)).unwrap();
    sim.drive_pin(pin, Some(true));
    sim.advance_us(20);
    let snap = t.io_metrics().snapshot(LogicalPin::IoMetrics1).unwrap();
    assert_eq!(snap.rising_edges, 0);
    assert_eq!(us(snap.max_pulse_low), 20);
}

fn uart_rig() -> (Rig, SimTester, PhysicalPin, PhysicalPin) {
    let (mut t, sim) = rig();
    let tx = t.pin("D10").unwrap();
    let rx = t.pin("D11").unwrap();
    t.pin_map_set(tx, LogicalPin::UartTx).unwrap();
    t.pin_map_set(rx, LogicalPin::UartRx).unwrap();
    t.select_peripheral(Peripheral::Uart).unwrap();
    let mut uart = t.uart();
    uart.set_baud(9600).unwrap();
    uart.set_bits(8).unwrap();
    uart.set_stops(1).unwrap();
    uart.set_parity(false, false).unwrap();
    (t, sim, tx, rx)
}

#[test]
fn uart_round_trip_9600_8n1() {
    let (mut t, sim, tx, rx) = uart_rig();
    let mut uart = t.uart();
    uart.rx_start().unwrap();
    sim.uart_send(rx, &SerialFrame::new(9600), &[27]);
    uart.rx_stop().unwrap();

    assert_eq!(uart.rx_get_data().unwrap(), 27);
    assert_eq!(uart.rx_get_checksum().unwrap(), 27);
    assert_eq!(uart.rx_get_count().unwrap(), 1);
    assert_eq!(uart.rx_get_framing_errors().unwrap(), 0);
    assert_eq!(uart.rx_get_parity_errors().unwrap(), 0);
    assert_eq!(uart.rx_get_stop_errors().unwrap(), 0);

    uart.tx_set_next(12).unwrap();
    uart.tx_set_count(2).unwrap();
    uart.tx_start().unwrap();
    // Two 8N1 characters at 9600 baud take about 2.1 ms.
    sim.advance_us(2_100);
    assert_eq!(sim.uart_take(tx), vec![12, 13]);
    assert_eq!(uart.tx_get_count().unwrap(), 0);
}

#[test]
fn uart_tx_stop_halts_the_generator() {
    let (mut t, sim, tx, _rx) = uart_rig();
    let mut uart = t.uart();
    uart.tx_set_next(0x30).unwrap();
    uart.tx_set_count(1000).unwrap();
    uart.tx_start().unwrap();
    assert!(sim.uart_take(tx).is_empty());

    sim.advance_us(3_500);
    uart.tx_stop().unwrap();
    sim.advance_us(100_000);
    assert_eq!(sim.uart_take(tx), vec![0x30, 0x31, 0x32]);
    assert_eq!(uart.tx_get_count().unwrap(), 997);
    assert_eq!(uart.tx_get_next().unwrap(), 0x33);
}

#[test]
fn uart_tx_huge_count_is_paced() {
    let (mut t, sim, tx, _rx) = uart_rig();
    let mut uart = t.uart();
    uart.tx_set_count(u32::MAX).unwrap();
    uart.tx_start().unwrap();
    sim.advance_us(10_500);
    uart.tx_stop().unwrap();
    assert_eq!(sim.uart_take(tx).len(), 10);
    assert_eq!(uart.tx_get_count().unwrap(), u32::MAX - 10);
}

#[test]
fn uart_counts_line_errors() {
    let (mut t, sim, _tx, rx) = uart_rig();
    let mut uart = t.uart();
    uart.set_parity(true, false).unwrap();
    uart.rx_start().unwrap();
    sim.uart_send(rx, &SerialFrame::new(9600).parity(Parity::Odd), &[0x41]);
    sim.uart_send(rx, &SerialFrame::new(115_200).parity(Parity::Even), &[0x42]);
    assert_eq!(uart.rx_get_parity_errors().unwrap(), 1);
    assert_eq!(uart.rx_get_framing_errors().unwrap(), 1);
    assert_eq!(uart.rx_get_count().unwrap(), 1);

    uart.rx_start().unwrap();
    assert_eq!(uart.rx_get_parity_errors().unwrap(), 0);
    assert_eq!(uart.rx_get_count().unwrap(), 0);
}

#[test]
fn uart_rejects_bad_settings_without_traffic() {
    let (mut t, sim, _tx, _rx) = uart_rig();
    let before = sim.transactions();
    let mut uart = t.uart();
    assert!(matches!(uart.set_bits(4), Err(TesterError::InvalidUartConfig(_))));
    assert!(matches!(uart.set_bits(10), Err(TesterError::InvalidUartConfig(_))));
    assert!(matches!(uart.set_stops(3), Err(TesterError::InvalidUartConfig(_))));
    assert!(matches!(uart.set_baud(0), Err(TesterError::InvalidUartConfig(_))));
    assert_eq!(sim.transactions(), before);
}

#[test]
fn boxed_transport_is_the_default() {
    let sim = SimTester::new();
    let transport: Box<dyn cishield_hal::traits::Transport> =
        Box::new(BitBangTransport::new(sim.clone()));
    let mut t: Tester = Tester::new(transport, board(), sim.constants());
    assert_eq!(t.transport_name(), "bit-bang");
    let pin = t.pin("D8").unwrap();
    t.pin_map_set(pin, LogicalPin::Gpio7).unwrap();
    assert_eq!(t.pin_map_logical(LogicalPin::Gpio7).unwrap(), Some(pin));
}
