//! Test-run orchestrator.
//!
//! Reads a TOML config file, picks the control-channel transport and builds a
//! [`Tester`] for the configured board.
//!
//! Supported transports:
//! - `sim`: simulated tester over the system-bus transport (CI)
//! - `sim_bitbang`: simulated tester over the bit-banged transport only
//! - `serial`: real tester behind the serial control bridge

use cishield_fpga::{BitBangTransport, SystemBusTransport};
use cishield_hal::config::{BoardPins, ConfigError, TesterConstants};
use cishield_hal::pins::{IoExpanderReg, LogicalPin, Peripheral};
use cishield_hal::sim::SimTester;
use cishield_hal::traits::Transport;
use cishield_serial::{BridgeError, DEFAULT_BAUD_RATE, SerialBridge};
use cishield_tester::{Tester, TesterError};
use serde::Deserialize;
use std::time::Duration;

/// Top-level config, deserialized from TOML.
#[derive(Debug, Deserialize)]
pub struct OrchestratorConfig {
    pub transport: TransportSection,
    #[serde(default)]
    pub board: BoardPins,
    #[serde(default)]
    pub tester: TesterConstants,
}

#[derive(Debug, Deserialize)]
pub struct TransportSection {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(default)]
    pub serial_port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_timeout() -> u64 {
    500
}

/// Parsed transport selection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMode {
    Sim,
    SimBitBang,
    Serial {
        serial_port: String,
        baud_rate: u32,
        timeout_ms: u64,
    },
}

impl OrchestratorConfig {
    /// Parse from TOML string. The board description is validated.
    pub fn from_toml(content: &str) -> Result<Self, OrchestratorError> {
        let config: Self =
            toml::from_str(content).map_err(|e| OrchestratorError::ConfigError(e.to_string()))?;
        config.board.validate()?;
        Ok(config)
    }

    /// Parse from TOML file path.
    pub fn from_file(path: &str) -> Result<Self, OrchestratorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::ConfigError(format!("{path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn transport_mode(&self) -> Result<TransportMode, OrchestratorError> {
        let t = &self.transport;
        match t.transport_type.as_str() {
            "sim" => Ok(TransportMode::Sim),
            "sim_bitbang" => Ok(TransportMode::SimBitBang),
            "serial" => {
                let serial_port = t.serial_port.clone().ok_or_else(|| {
                    OrchestratorError::ConfigError("transport.serial_port required for serial".into())
                })?;
                Ok(TransportMode::Serial {
                    serial_port,
                    baud_rate: t.baud_rate,
                    timeout_ms: t.timeout_ms,
                })
            }
            other => Err(OrchestratorError::ConfigError(format!(
                "unknown transport type: {other}"
            ))),
        }
    }
}

/// A ready driver, plus the bench handle when the tester is simulated.
pub struct Fixture {
    pub tester: Tester,
    pub bench: Option<SimTester>,
}

/// Create the primary transport from config.
pub fn create_transport(
    config: &OrchestratorConfig,
) -> Result<(Box<dyn Transport>, Option<SimTester>), OrchestratorError> {
    match config.transport_mode()? {
        TransportMode::Sim => {
            let sim = SimTester::with_constants(config.tester);
            Ok((Box::new(SystemBusTransport::new(sim.clone())), Some(sim)))
        }
        TransportMode::SimBitBang => {
            let sim = SimTester::with_constants(config.tester);
            Ok((Box::new(BitBangTransport::new(sim.clone())), Some(sim)))
        }
        TransportMode::Serial {
            serial_port,
            baud_rate,
            timeout_ms,
        } => {
            let bridge =
                SerialBridge::connect(&serial_port, baud_rate, Duration::from_millis(timeout_ms))?;
            Ok((Box::new(SystemBusTransport::new(bridge)), None))
        }
    }
}

/// Create a driver for the configured tester and board.
///
/// A simulated tester also gets a bit-banged secondary channel so that the
/// `_bb` operations work.
pub fn create_tester(config: &OrchestratorConfig) -> Result<Fixture, OrchestratorError> {
    let (transport, bench) = create_transport(config)?;
    let mut tester = Tester::new(transport, config.board.clone(), config.tester);
    if let Some(sim) = &bench {
        tester = tester.with_bitbang(BitBangTransport::new(sim.clone()));
    }
    log::info!(
        "tester ready over {} ({} board pins)",
        tester.transport_name(),
        config.board.form_factor.len()
    );
    Ok(Fixture { tester, bench })
}

/// Result of driving one pin during [`walk_pins`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinCheck {
    pub name: String,
    pub low_ok: bool,
    pub high_ok: bool,
}

impl PinCheck {
    pub fn passed(&self) -> bool {
        self.low_ok && self.high_ok
    }
}

/// Route every usable board pin to GPIO channel 0 in turn, drive it low then
/// high, and read the level back from the IO expander.
///
/// Each pin is released and unmapped before moving on.
pub fn walk_pins<T: Transport>(
    tester: &mut Tester<T>,
    settle: Duration,
) -> Result<Vec<PinCheck>, OrchestratorError> {
    let pins: Vec<_> = tester
        .board()
        .usable()
        .map(|(name, pin)| (name.to_string(), pin))
        .collect();
    tester.pin_map_reset()?;
    tester.select_peripheral(Peripheral::Gpio)?;

    let mut checks = Vec::with_capacity(pins.len());
    for (name, pin) in pins {
        tester.pin_map_set(pin, LogicalPin::Gpio0)?;
        let mut levels = [false; 2];
        for (i, level) in [false, true].into_iter().enumerate() {
            tester.gpio_write(LogicalPin::Gpio0, level, true)?;
            if !settle.is_zero() {
                std::thread::sleep(settle);
            }
            let input = tester.io_expander_read(pin, IoExpanderReg::Input)? != 0;
            levels[i] = input == level;
        }
        tester.gpio_write(LogicalPin::Gpio0, false, false)?;
        let check = PinCheck {
            name,
            low_ok: levels[0],
            high_ok: levels[1],
        };
        if check.passed() {
            log::debug!("{}: ok", check.name);
        } else {
            log::warn!(
                "{}: low {}, high {}",
                check.name,
                if check.low_ok { "ok" } else { "stuck" },
                if check.high_ok { "ok" } else { "stuck" }
            );
        }
        checks.push(check);
    }
    tester.pin_map_reset()?;
    tester.select_peripheral(Peripheral::None)?;
    Ok(checks)
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("board error: {0}")]
    Board(#[from] ConfigError),
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),
    #[error("tester error: {0}")]
    Tester(#[from] TesterError),
}
