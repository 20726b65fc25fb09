use ci_shield::firmware;
use ci_shield::report::{SelfTestSummary, pin_table, to_json};
use cishield_orchestrator::{OrchestratorConfig, create_tester};
use std::env;
use std::fs;
use std::process::ExitCode;

fn usage(program: &str) -> ExitCode {
    eprintln!(
        "Usage:\n  \
         {program} package <bitstream.bin> <image.bin>\n  \
         {program} verify <image.bin>\n  \
         {program} selftest <shield_config.toml> [--json]\n  \
         {program} pins <shield_config.toml> [--json]"
    );
    ExitCode::from(2)
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{message}");
    ExitCode::from(2)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "ci_shield".to_string());
    let Some(command) = args.next() else {
        return usage(&program);
    };
    let rest: Vec<String> = args.collect();
    let json = rest.iter().any(|a| a == "--json");
    let positional: Vec<&str> = rest
        .iter()
        .filter(|a| *a != "--json")
        .map(String::as_str)
        .collect();

    match (command.as_str(), positional.as_slice()) {
        ("package", [src, dst]) => package(src, dst),
        ("verify", [image]) => verify(image),
        ("selftest", [config]) => selftest(config, json),
        ("pins", [config]) => pins(config, json),
        _ => usage(&program),
    }
}

fn package(src: &str, dst: &str) -> ExitCode {
    let raw = match fs::read(src) {
        Ok(raw) => raw,
        Err(e) => return fail(format!("cannot read {src}: {e}")),
    };
    println!("File \"{src}\" processed.");
    let image = match firmware::package(&raw) {
        Ok(image) => image,
        Err(e) => return fail(e),
    };
    if let Err(e) = fs::write(dst, &image) {
        return fail(format!("cannot write {dst}: {e}"));
    }
    println!("Output file \"{dst}\" written");
    println!("    Size: {}", raw.len());
    println!("    CRC: {:#x}", firmware::checksum(&raw));
    ExitCode::SUCCESS
}

fn verify(path: &str) -> ExitCode {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => return fail(format!("cannot read {path}: {e}")),
    };
    match firmware::parse(&raw) {
        Ok(image) => {
            println!("{path}: ok, {} bytes, CRC {:#x}", image.size(), image.crc);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load(path: &str) -> Result<OrchestratorConfig, ExitCode> {
    OrchestratorConfig::from_file(path).map_err(|e| fail(format!("failed to load {path}: {e}")))
}

fn selftest(path: &str, json: bool) -> ExitCode {
    let config = match load(path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let mut fixture = match create_tester(&config) {
        Ok(fixture) => fixture,
        Err(e) => return fail(format!("failed to create tester: {e}")),
    };
    let report = match fixture.tester.self_test_report() {
        Ok(report) => report,
        Err(e) => return fail(format!("self test aborted: {e}")),
    };
    let summary = SelfTestSummary::new(path, report);
    if json {
        match to_json(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => return fail(e),
        }
    } else {
        let r = &summary.report;
        println!("transport:       {}", r.transport);
        println!("identity:        {:#010x}", r.identity);
        println!("control channel: {}", verdict(r.control_channel));
        println!("scratch:         {}", verdict(r.scratch));
        println!("built-in:        {}", verdict(r.built_in));
        println!("self test {}", verdict(summary.passed));
    }
    if summary.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn verdict(ok: bool) -> &'static str {
    if ok { "PASS" } else { "FAIL" }
}

fn pins(path: &str, json: bool) -> ExitCode {
    let config = match load(path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let table = pin_table(&config.board);
    if json {
        match to_json(&table) {
            Ok(text) => println!("{text}"),
            Err(e) => return fail(e),
        }
    } else {
        for entry in &table {
            let note = if entry.restricted { "  restricted" } else { "" };
            println!("{:>3}  {}{note}", entry.physical, entry.name);
        }
    }
    ExitCode::SUCCESS
}
