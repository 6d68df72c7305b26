//! Register allocation for L2 functions, down to L1.

pub mod analysis;
pub mod arch;
pub mod ir;
pub mod regalloc;
pub mod report;
