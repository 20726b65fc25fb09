//! IO metrics: edge counts and pulse widths on the eight logical channels.
//!
//! Values are in tester ticks. Min fields hold [`METRICS_SENTINEL`] until a
//! complete edge-to-edge pulse of that polarity was seen.

use crate::{Tester, TesterError};
use cishield_hal::config::TesterConstants;
use cishield_hal::pins::LogicalPin;
use cishield_hal::regs::{
    METRICS_CTRL_ACTIVE, METRICS_CTRL_RESET, METRICS_SENTINEL, MetricsReg, Register,
};
use cishield_hal::traits::Transport;
use serde::Serialize;

/// All six accumulators of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelMetrics {
    pub min_pulse_low: u32,
    pub min_pulse_high: u32,
    pub max_pulse_low: u32,
    pub max_pulse_high: u32,
    pub rising_edges: u32,
    pub falling_edges: u32,
}

impl ChannelMetrics {
    /// Same values with durations in microseconds. Sentinels are kept.
    pub fn to_us(self, constants: &TesterConstants) -> Self {
        let us = |ticks: u32| {
            if ticks == METRICS_SENTINEL {
                ticks
            } else {
                constants.ticks_to_us(ticks)
            }
        };
        Self {
            min_pulse_low: us(self.min_pulse_low),
            min_pulse_high: us(self.min_pulse_high),
            max_pulse_low: us(self.max_pulse_low),
            max_pulse_high: us(self.max_pulse_high),
            ..self
        }
    }

    pub fn saw_low_pulse(&self) -> bool {
        self.min_pulse_low != METRICS_SENTINEL
    }

    pub fn saw_high_pulse(&self) -> bool {
        self.min_pulse_high != METRICS_SENTINEL
    }
}

pub struct IoMetrics<'a, T: Transport> {
    tester: &'a mut Tester<T>,
}

impl<'a, T: Transport> IoMetrics<'a, T> {
    pub(crate) fn new(tester: &'a mut Tester<T>) -> Self {
        Self { tester }
    }

    /// Clear every channel, then arm them all at once.
    pub fn start(&mut self) -> Result<(), TesterError> {
        self.tester
            .write_reg(Register::MetricsControl, METRICS_CTRL_RESET as u32)?;
        self.tester
            .write_reg(Register::MetricsControl, METRICS_CTRL_ACTIVE as u32)
    }

    /// Freeze every channel.
    pub fn stop(&mut self) -> Result<(), TesterError> {
        self.tester.write_reg(Register::MetricsControl, 0)
    }

    fn get(&mut self, channel: LogicalPin, reg: MetricsReg) -> Result<u32, TesterError> {
        self.tester.read_reg(Register::Metrics {
            channel: channel.slot(),
            reg,
        })
    }

    pub fn rising_edges(&mut self, channel: LogicalPin) -> Result<u32, TesterError> {
        self.get(channel, MetricsReg::RisingEdges)
    }

    pub fn falling_edges(&mut self, channel: LogicalPin) -> Result<u32, TesterError> {
        self.get(channel, MetricsReg::FallingEdges)
    }

    pub fn min_pulse_low(&mut self, channel: LogicalPin) -> Result<u32, TesterError> {
        self.get(channel, MetricsReg::MinPulseLow)
    }

    pub fn min_pulse_high(&mut self, channel: LogicalPin) -> Result<u32, TesterError> {
        self.get(channel, MetricsReg::MinPulseHigh)
    }

    pub fn max_pulse_low(&mut self, channel: LogicalPin) -> Result<u32, TesterError> {
        self.get(channel, MetricsReg::MaxPulseLow)
    }

    pub fn max_pulse_high(&mut self, channel: LogicalPin) -> Result<u32, TesterError> {
        self.get(channel, MetricsReg::MaxPulseHigh)
    }

    /// Read all six accumulators of `channel` in one transaction.
    pub fn snapshot(&mut self, channel: LogicalPin) -> Result<ChannelMetrics, TesterError> {
        let base = Register::Metrics {
            channel: channel.slot(),
            reg: MetricsReg::MinPulseLow,
        };
        let mut raw = [0u8; 4 * MetricsReg::ALL.len()];
        self.tester.read(base.address(), &mut raw)?;
        let word = |i: usize| {
            let b = &raw[4 * i..4 * i + 4];
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        };
        Ok(ChannelMetrics {
            min_pulse_low: word(0),
            min_pulse_high: word(1),
            max_pulse_low: word(2),
            max_pulse_high: word(3),
            rising_edges: word(4),
            falling_edges: word(5),
        })
    }

    /// Arm, run `stimulus`, disarm, all inside one critical section.
    ///
    /// The stimulus gets the driver back so it can toggle tester-side outputs.
    pub fn measure<R>(
        &mut self,
        stimulus: impl FnOnce(&mut Tester<T>) -> R,
    ) -> Result<R, TesterError> {
        critical_section::with(|_cs| {
            self.start()?;
            let result = stimulus(self.tester);
            self.stop()?;
            Ok(result)
        })
    }
}
