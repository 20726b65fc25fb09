use cishield_orchestrator::{OrchestratorConfig, create_tester, walk_pins};
use std::time::Duration;

fn usage() -> ! {
    eprintln!(
        "Usage: gpio_walk <shield_config.toml> [settle_ms]\n\
         \n\
         Examples:\n\
           cargo run -p cishield_orchestrator --bin gpio_walk -- config/shield_sim.toml\n\
           cargo run -p cishield_orchestrator --bin gpio_walk -- config/shield_nucleo_bridge.toml 5\n\
         \n\
         Notes:\n\
         - Restricted pins are skipped.\n\
         - Exits with status 1 if any pin does not follow the level it is driven to."
    );
    std::process::exit(2)
}

fn parse_u64(s: &str, name: &str) -> u64 {
    s.parse::<u64>().unwrap_or_else(|_| {
        eprintln!("Invalid {name}: {s}");
        usage()
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| usage());
    let settle_ms = args
        .next()
        .map(|s| parse_u64(&s, "settle_ms"))
        .unwrap_or(0);

    let config = OrchestratorConfig::from_file(&config_path).unwrap_or_else(|e| {
        eprintln!("failed to load shield config: {e}");
        std::process::exit(2)
    });
    let mut fixture = create_tester(&config).unwrap_or_else(|e| {
        eprintln!("failed to create tester: {e}");
        std::process::exit(2)
    });

    let checks = match walk_pins(&mut fixture.tester, Duration::from_millis(settle_ms)) {
        Ok(checks) => checks,
        Err(e) => {
            eprintln!("pin walk aborted: {e}");
            // Best-effort: leave the tester in a known state.
            let _ = fixture.tester.reset();
            std::process::exit(1)
        }
    };

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed()).collect();
    for check in &failed {
        println!(
            "{:<6} low:{:<5} high:{:<5}",
            check.name, check.low_ok, check.high_ok
        );
    }
    println!("{} pins walked, {} failed", checks.len(), failed.len());
    if !failed.is_empty() {
        std::process::exit(1);
    }
}
