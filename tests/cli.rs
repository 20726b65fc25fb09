use ci_shield::firmware;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn config_path(file_name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(file_name)
}

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ci_shield_{}_{name}", std::process::id()))
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ci_shield"))
        .args(args)
        .output()
        .expect("should run ci_shield binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn package_then_verify() {
    let src = scratch_path("bitstream.bin");
    let dst = scratch_path("image.bin");
    let bitstream: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    fs::write(&src, &bitstream).unwrap();

    let output = run(&["package", src.to_str().unwrap(), dst.to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("Size: 1000"));

    let image = fs::read(&dst).unwrap();
    assert_eq!(image.len(), 1008);
    assert_eq!(firmware::parse(&image).unwrap().bitstream, &bitstream[..]);

    let output = run(&["verify", dst.to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");

    let mut corrupt = image.clone();
    corrupt[500] ^= 0x80;
    fs::write(&dst, &corrupt).unwrap();
    let output = run(&["verify", dst.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("crc mismatch"));

    let _ = fs::remove_file(src);
    let _ = fs::remove_file(dst);
}

#[test]
fn selftest_on_sim_reports_json() {
    let config = config_path("shield_sim.toml");
    let output = run(&["selftest", config.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "{output:?}");

    let value: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["passed"], Value::Bool(true));
    assert_eq!(value["transport"], "system-bus");
    assert_eq!(value["identity"], 0x4D42_5453u32);
}

#[test]
fn pins_lists_the_board() {
    let config = config_path("shield_sim_bitbang.toml");
    let output = run(&["pins", config.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "{output:?}");

    let value: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let pins = value.as_array().unwrap();
    assert_eq!(pins.len(), 8);
    assert_eq!(pins[0]["name"], "D0");
    assert_eq!(pins[0]["restricted"], true);
    assert_eq!(pins[7]["physical"], 7);
    assert_eq!(pins[7]["restricted"], false);
}

#[test]
fn bad_arguments_print_usage() {
    let output = run(&["selftest"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));

    let output = run(&["pins", "/nonexistent/shield.toml"]);
    assert_eq!(output.status.code(), Some(2));
}
