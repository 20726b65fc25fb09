//! Host-side tooling for the FPGA CI test shield.
//!
//! The driver itself lives in the `cishield_*` workspace crates; this crate
//! adds bitstream packaging and the reports printed by the `ci_shield` tool.

pub mod firmware;
pub mod report;
