use std::fmt;

/// Physical pin slots in the remap table.
pub const PHYSICAL_PINS: usize = 128;
/// Logical channel slots in the remap table.
pub const LOGICAL_PINS: usize = 8;
/// Remap table value for "no binding".
pub const UNMAPPED: u8 = 0xFF;

/// Index of a pin on the form factor, as the tester numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalPin(u8);

impl PhysicalPin {
    pub fn new(index: usize) -> Option<Self> {
        (index < PHYSICAL_PINS).then(|| Self(index as u8))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PhysicalPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Channel roles that can be bound to a physical pin.
///
/// Roles of different peripherals share the eight logical slots: `Gpio3` and
/// `IoMetrics3` are both slot 3, `UartRx` is slot 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalPin {
    Gpio0,
    Gpio1,
    Gpio2,
    Gpio3,
    Gpio4,
    Gpio5,
    Gpio6,
    Gpio7,
    IoMetrics0,
    IoMetrics1,
    IoMetrics2,
    IoMetrics3,
    IoMetrics4,
    IoMetrics5,
    IoMetrics6,
    IoMetrics7,
    UartTx,
    UartRx,
    UartCts,
    UartRts,
    I2cSda,
    I2cScl,
}

impl LogicalPin {
    pub const GPIO: [LogicalPin; LOGICAL_PINS] = [
        Self::Gpio0,
        Self::Gpio1,
        Self::Gpio2,
        Self::Gpio3,
        Self::Gpio4,
        Self::Gpio5,
        Self::Gpio6,
        Self::Gpio7,
    ];

    pub const IO_METRICS: [LogicalPin; LOGICAL_PINS] = [
        Self::IoMetrics0,
        Self::IoMetrics1,
        Self::IoMetrics2,
        Self::IoMetrics3,
        Self::IoMetrics4,
        Self::IoMetrics5,
        Self::IoMetrics6,
        Self::IoMetrics7,
    ];

    /// Remap slot (0..8) this role occupies.
    pub fn slot(self) -> u8 {
        match self {
            Self::Gpio0 | Self::IoMetrics0 | Self::UartTx | Self::I2cSda => 0,
            Self::Gpio1 | Self::IoMetrics1 | Self::UartRx | Self::I2cScl => 1,
            Self::Gpio2 | Self::IoMetrics2 | Self::UartCts => 2,
            Self::Gpio3 | Self::IoMetrics3 | Self::UartRts => 3,
            Self::Gpio4 | Self::IoMetrics4 => 4,
            Self::Gpio5 | Self::IoMetrics5 => 5,
            Self::Gpio6 | Self::IoMetrics6 => 6,
            Self::Gpio7 | Self::IoMetrics7 => 7,
        }
    }

    pub fn gpio(channel: usize) -> Option<Self> {
        Self::GPIO.get(channel).copied()
    }

    pub fn io_metrics(channel: usize) -> Option<Self> {
        Self::IO_METRICS.get(channel).copied()
    }
}

/// Virtual peripheral occupying the peripheral window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Peripheral {
    #[default]
    None,
    Gpio,
    Uart,
    I2c,
}

impl Peripheral {
    pub fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Gpio => 1,
            Self::Uart => 4,
            Self::I2c => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            1 => Some(Self::Gpio),
            4 => Some(Self::Uart),
            5 => Some(Self::I2c),
            _ => None,
        }
    }
}

/// Emulated pull network on a physical pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    PullDown,
    PullUp,
    PullNone,
}

/// Per-pin IO expander registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoExpanderReg {
    /// 0 = output, 1 = input / tri-state.
    Config,
    /// Driven level while configured as output.
    Output,
    /// Sampled level, read-only.
    Input,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_pin_bounds() {
        assert_eq!(PhysicalPin::new(127).map(PhysicalPin::index), Some(127));
        assert!(PhysicalPin::new(128).is_none());
    }

    #[test]
    fn roles_share_slots() {
        assert_eq!(LogicalPin::Gpio1.slot(), LogicalPin::UartRx.slot());
        assert_eq!(LogicalPin::IoMetrics7.slot(), 7);
        assert_eq!(LogicalPin::gpio(8), None);
        for (i, pin) in LogicalPin::IO_METRICS.iter().enumerate() {
            assert_eq!(pin.slot() as usize, i);
        }
    }

    #[test]
    fn peripheral_ids_round_trip() {
        for p in [Peripheral::None, Peripheral::Gpio, Peripheral::Uart, Peripheral::I2c] {
            assert_eq!(Peripheral::from_id(p.id()), Some(p));
        }
        assert_eq!(Peripheral::from_id(2), None);
    }
}
