use crate::pins::LOGICAL_PINS;
use crate::regs::{METRICS_CTRL_ACTIVE, METRICS_CTRL_RESET, METRICS_SENTINEL, MetricsReg};

#[derive(Debug, Clone, Copy)]
struct Channel {
    level: bool,
    run_start: u64,
    /// Current run began at an edge rather than at arm time.
    from_edge: bool,
    min_low: u32,
    min_high: u32,
    max_low: u32,
    max_high: u32,
    rising: u32,
    falling: u32,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            level: false,
            run_start: 0,
            from_edge: false,
            min_low: METRICS_SENTINEL,
            min_high: METRICS_SENTINEL,
            max_low: 0,
            max_high: 0,
            rising: 0,
            falling: 0,
        }
    }
}

impl Channel {
    fn arm(&mut self, now: u64, level: bool) {
        self.level = level;
        self.run_start = now;
        self.from_edge = false;
    }

    /// Fold the current run into the accumulators. Only runs bounded by
    /// edges on both sides qualify for the minimum.
    fn close_run(&mut self, now: u64, complete: bool) {
        let len = now.saturating_sub(self.run_start).min(u32::MAX as u64 - 1) as u32;
        let (min, max) = if self.level {
            (&mut self.min_high, &mut self.max_high)
        } else {
            (&mut self.min_low, &mut self.max_low)
        };
        *max = (*max).max(len);
        if complete {
            *min = (*min).min(len);
        }
    }

    fn edge(&mut self, now: u64, level: bool) {
        self.close_run(now, self.from_edge);
        if level {
            self.rising += 1;
        } else {
            self.falling += 1;
        }
        self.level = level;
        self.run_start = now;
        self.from_edge = true;
    }
}

/// Edge and pulse-width capture on the eight logical channels.
#[derive(Debug, Clone, Default)]
pub(crate) struct MetricsEngine {
    active: bool,
    channels: [Channel; LOGICAL_PINS],
}

impl MetricsEngine {
    pub fn control(&self) -> u8 {
        if self.active { METRICS_CTRL_ACTIVE } else { 0 }
    }

    pub fn write_control(&mut self, value: u8, now: u64, levels: &[bool; LOGICAL_PINS]) {
        let active = value & METRICS_CTRL_ACTIVE != 0;
        if self.active && !active {
            for channel in &mut self.channels {
                channel.close_run(now, false);
            }
        }
        if value & METRICS_CTRL_RESET != 0 {
            self.channels = [Channel::default(); LOGICAL_PINS];
        }
        if active && !self.active {
            for (channel, &level) in self.channels.iter_mut().zip(levels) {
                channel.arm(now, level);
            }
        }
        self.active = active;
    }

    pub fn observe(&mut self, now: u64, levels: &[bool; LOGICAL_PINS]) {
        if !self.active {
            return;
        }
        for (channel, &level) in self.channels.iter_mut().zip(levels) {
            if channel.level != level {
                channel.edge(now, level);
            }
        }
    }

    pub fn read(&self, channel: usize, reg: MetricsReg) -> u32 {
        let Some(ch) = self.channels.get(channel) else {
            return 0;
        };
        match reg {
            MetricsReg::MinPulseLow => ch.min_low,
            MetricsReg::MinPulseHigh => ch.min_high,
            MetricsReg::MaxPulseLow => ch.max_low,
            MetricsReg::MaxPulseHigh => ch.max_high,
            MetricsReg::RisingEdges => ch.rising,
            MetricsReg::FallingEdges => ch.falling,
        }
    }
}
