//! Hardware abstraction for the FPGA CI test shield.
//!
//! Everything both ends of the control channel agree on lives here: the
//! register address space, the wire frame, the transport traits and the
//! board pin description. The `sim` module is a register-accurate software
//! tester used in CI and by the transport equivalence tests.

pub mod config;
pub mod pins;
pub mod regs;
pub mod sim;
pub mod traits;
pub mod wire;
