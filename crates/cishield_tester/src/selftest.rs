use crate::{Tester, TesterError};
use cishield_hal::regs::{
    Register, SELF_TEST_DONE, SELF_TEST_PASS, SELF_TEST_START, STATUS_CONTROL_FAULT, SysReg,
    TESTER_ID,
};
use cishield_hal::traits::Transport;
use serde::Serialize;

const SCRATCH_PATTERNS: [u32; 4] = [0x0000_0000, 0xFFFF_FFFF, 0xA5A5_5A5A, 0x1234_5678];
const SELF_TEST_POLLS: u32 = 100;

/// Outcome of [`Tester::self_test_report`], step by step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfTestReport {
    pub transport: &'static str,
    pub identity: u32,
    pub control_channel: bool,
    pub scratch: bool,
    pub built_in: bool,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.control_channel && self.scratch && self.built_in
    }
}

impl<T: Transport> Tester<T> {
    /// Channel liveness: the tester answers with its identity and reports no
    /// control-channel fault.
    pub fn self_test_control_current(&mut self) -> Result<bool, TesterError> {
        Ok(self.control_probe()?.1)
    }

    fn control_probe(&mut self) -> Result<(u32, bool), TesterError> {
        let identity = self.read_reg(Register::Sys(SysReg::Identity))?;
        let status = self.read_reg(Register::Sys(SysReg::Status))?;
        let healthy = identity == TESTER_ID && status & STATUS_CONTROL_FAULT as u32 == 0;
        if !healthy {
            log::warn!("control channel unhealthy: id {identity:#010x}, status {status:#04x}");
        }
        Ok((identity, healthy))
    }

    /// Write each pattern to the scratch register and read it back. The
    /// original content is restored afterwards.
    fn scratch_round_trip(&mut self) -> Result<bool, TesterError> {
        let scratch = Register::Sys(SysReg::Scratch);
        let original = self.read_reg(scratch)?;
        let mut ok = true;
        for pattern in SCRATCH_PATTERNS {
            self.write_reg(scratch, pattern)?;
            let back = self.read_reg(scratch)?;
            if back != pattern {
                log::warn!("scratch wrote {pattern:#010x}, read {back:#010x}");
                ok = false;
            }
        }
        self.write_reg(scratch, original)?;
        Ok(ok)
    }

    fn built_in_self_test(&mut self) -> Result<bool, TesterError> {
        self.write_reg(Register::Sys(SysReg::SelfTest), SELF_TEST_START as u32)?;
        for _ in 0..SELF_TEST_POLLS {
            let status = self.read_reg(Register::Sys(SysReg::SelfTestStatus))? as u8;
            if status & SELF_TEST_DONE != 0 {
                return Ok(status & SELF_TEST_PASS != 0);
            }
        }
        log::warn!("built-in self test did not finish after {SELF_TEST_POLLS} polls");
        Ok(false)
    }

    pub fn self_test_report(&mut self) -> Result<SelfTestReport, TesterError> {
        let (identity, control_channel) = self.control_probe()?;
        let scratch = self.scratch_round_trip()?;
        let built_in = self.built_in_self_test()?;
        let report = SelfTestReport {
            transport: self.transport_name(),
            identity,
            control_channel,
            scratch,
            built_in,
        };
        log::info!("self test {}", if report.passed() { "passed" } else { "FAILED" });
        Ok(report)
    }

    /// Full consistency check of the tester.
    pub fn self_test_all(&mut self) -> Result<bool, TesterError> {
        Ok(self.self_test_report()?.passed())
    }
}
