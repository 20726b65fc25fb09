use cishield_hal::pins::{IoExpanderReg, LogicalPin, Peripheral, Pull};
use cishield_orchestrator::{OrchestratorConfig, TransportMode, create_tester, walk_pins};
use std::time::Duration;

fn load(name: &str) -> OrchestratorConfig {
    OrchestratorConfig::from_file(&format!("../../config/{name}")).unwrap()
}

#[test]
fn sim_config_self_tests_clean() {
    let config = load("shield_sim.toml");
    let mut fixture = create_tester(&config).unwrap();
    let report = fixture.tester.self_test_report().unwrap();
    assert_eq!(report.transport, "system-bus");
    assert!(report.passed());
}

#[test]
fn pin_walk_covers_every_usable_pin() {
    let config = load("shield_sim.toml");
    let mut fixture = create_tester(&config).unwrap();
    let checks = walk_pins(&mut fixture.tester, Duration::ZERO).unwrap();

    let names: Vec<_> = checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names.len(), 20);
    assert!(!names.contains(&"D0"));
    assert!(!names.contains(&"D1"));
    assert!(checks.iter().all(|c| c.passed()));

    // Walk leaves nothing mapped.
    for (_, pin) in config.board.pins() {
        assert!(!fixture.tester.pin_map_is_mapped(pin).unwrap());
    }
    assert_eq!(
        fixture.tester.selected_peripheral().unwrap(),
        Peripheral::None
    );
}

#[test]
fn bench_and_driver_see_the_same_pins() {
    let config = load("shield_sim.toml");
    let mut fixture = create_tester(&config).unwrap();
    let bench = fixture.bench.clone().unwrap();
    let t = &mut fixture.tester;

    let a2 = t.pin("A2").unwrap();
    t.pin_map_set(a2, LogicalPin::Gpio3).unwrap();
    t.select_peripheral(Peripheral::Gpio).unwrap();

    bench.drive_pin(a2, Some(true));
    assert!(t.gpio_read(LogicalPin::Gpio3).unwrap());
    bench.drive_pin(a2, None);

    t.pin_set_pull_bb(a2, Pull::PullDown).unwrap();
    assert_eq!(t.io_expander_read_bb(a2, IoExpanderReg::Input).unwrap(), 0);
    t.gpio_write(LogicalPin::Gpio3, true, true).unwrap();
    assert!(bench.pin_level(a2));
}

#[test]
fn bitbang_only_config() {
    let config = load("shield_sim_bitbang.toml");
    assert_eq!(config.transport_mode().unwrap(), TransportMode::SimBitBang);
    let mut fixture = create_tester(&config).unwrap();
    assert_eq!(fixture.tester.transport_name(), "bit-bang");
    assert!(fixture.tester.self_test_all().unwrap());
    let checks = walk_pins(&mut fixture.tester, Duration::ZERO).unwrap();
    assert_eq!(checks.len(), 6);
}
