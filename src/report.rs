//! Machine-readable reports for the command-line tool.

use cishield_hal::config::BoardPins;
use cishield_tester::SelfTestReport;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SelfTestSummary {
    pub config: String,
    pub passed: bool,
    #[serde(flatten)]
    pub report: SelfTestReport,
}

impl SelfTestSummary {
    pub fn new(config: impl Into<String>, report: SelfTestReport) -> Self {
        Self {
            config: config.into(),
            passed: report.passed(),
            report,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinEntry {
    pub name: String,
    pub physical: u8,
    pub restricted: bool,
}

pub fn pin_table(board: &BoardPins) -> Vec<PinEntry> {
    board
        .pins()
        .map(|(name, pin)| PinEntry {
            name: name.to_string(),
            physical: pin.index(),
            restricted: board.is_restricted(pin),
        })
        .collect()
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
