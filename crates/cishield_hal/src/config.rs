use crate::pins::{PHYSICAL_PINS, PhysicalPin};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("form factor lists {0} pins, the tester has {PHYSICAL_PINS}")]
    TooManyPins(usize),
    #[error("pin {0} listed twice in the form factor")]
    DuplicatePin(String),
    #[error("restricted pin {0} is not part of the form factor")]
    UnknownRestricted(String),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Form-factor pins of the board under test.
///
/// A pin's position in `form_factor` is its tester physical index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardPins {
    pub form_factor: Vec<String>,
    #[serde(default)]
    pub restricted: Vec<String>,
}

impl BoardPins {
    pub fn new<S: Into<String>>(
        form_factor: impl IntoIterator<Item = S>,
        restricted: impl IntoIterator<Item = S>,
    ) -> Result<Self, ConfigError> {
        let pins = Self {
            form_factor: form_factor.into_iter().map(Into::into).collect(),
            restricted: restricted.into_iter().map(Into::into).collect(),
        };
        pins.validate()?;
        Ok(pins)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let pins: Self = toml::from_str(content)?;
        pins.validate()?;
        Ok(pins)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.form_factor.len() > PHYSICAL_PINS {
            return Err(ConfigError::TooManyPins(self.form_factor.len()));
        }
        let mut seen = HashSet::new();
        for name in &self.form_factor {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicatePin(name.clone()));
            }
        }
        if let Some(name) = self.restricted.iter().find(|r| !seen.contains(r.as_str())) {
            return Err(ConfigError::UnknownRestricted(name.clone()));
        }
        Ok(())
    }

    pub fn physical(&self, name: &str) -> Option<PhysicalPin> {
        self.form_factor
            .iter()
            .position(|p| p == name)
            .and_then(PhysicalPin::new)
    }

    pub fn name(&self, pin: PhysicalPin) -> Option<&str> {
        self.form_factor.get(pin.index() as usize).map(String::as_str)
    }

    pub fn is_restricted(&self, pin: PhysicalPin) -> bool {
        self.name(pin)
            .is_some_and(|name| self.restricted.iter().any(|r| r == name))
    }

    /// All form-factor pins, restricted ones included.
    pub fn pins(&self) -> impl Iterator<Item = (&str, PhysicalPin)> + '_ {
        self.form_factor
            .iter()
            .enumerate()
            .filter_map(|(i, name)| PhysicalPin::new(i).map(|pin| (name.as_str(), pin)))
    }

    /// Pins a test may drive.
    pub fn usable(&self) -> impl Iterator<Item = (&str, PhysicalPin)> + '_ {
        self.pins().filter(|(_, pin)| !self.is_restricted(*pin))
    }
}

/// Running checksum the UART receiver keeps over received characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checksum {
    #[default]
    Sum,
    Xor,
}

impl Checksum {
    pub fn accumulate(self, acc: u32, value: u16) -> u32 {
        match self {
            Self::Sum => acc.wrapping_add(value as u32),
            Self::Xor => acc ^ value as u32,
        }
    }
}

/// Firmware constants that depend on the tester bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TesterConstants {
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default)]
    pub checksum: Checksum,
}

fn default_tick_hz() -> u32 {
    100_000_000
}

impl Default for TesterConstants {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            checksum: Checksum::default(),
        }
    }
}

impl TesterConstants {
    pub fn ticks_per_us(&self) -> u32 {
        self.tick_hz / 1_000_000
    }

    pub fn ticks_to_us(&self, ticks: u32) -> u32 {
        ticks / self.ticks_per_us().max(1)
    }

    pub fn us_to_ticks(&self, us: u64) -> u64 {
        us * self.ticks_per_us() as u64
    }
}
