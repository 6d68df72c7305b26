//! Dataflow over one function body.
//!
//! # Pipeline
//!
//! ```text
//! instructions → successors ─┐
//!              → gen/kill ───┴→ liveness → interference graph
//! ```
//!
//! Every structure here is rebuilt from scratch for each allocation
//! attempt; nothing survives a spill.

pub mod gen_kill;
pub mod interference;
pub mod liveness;
pub mod successors;

use std::collections::BTreeSet;

use thiserror::Error;

use super::ir::{Function, Variable};

pub use gen_kill::GenKill;
pub use interference::{InterferenceGraph, KillPolicy};
pub use liveness::Liveness;
pub use successors::Successors;

/// Malformed function bodies. These indicate a bug upstream of the
/// allocator and are never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("label `{label}` is not defined in function `{function}`")]
    LabelNotFound { function: String, label: String },

    #[error("instruction {index} of function `{function}` has no successor; a function must end in a return")]
    FallsOffEnd { function: String, index: usize },

    #[error("variable `{variable}` in function `{function}` was never produced as an operand")]
    UnknownVariable { function: String, variable: String },
}

/// Everything one allocation attempt knows about a function.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub variables: BTreeSet<Variable>,
    pub successors: Successors,
    pub gen_kill: Vec<GenKill>,
    pub liveness: Liveness,
    pub interference: InterferenceGraph,
}

pub fn analyze(function: &Function, policy: KillPolicy) -> Result<Analysis, AnalysisError> {
    let variables = function.variables();
    let successors = successors::compute(function)?;
    let gen_kill = gen_kill::compute(function, &variables)?;
    let liveness = liveness::compute(&successors, &gen_kill);
    let interference = interference::build(function, &gen_kill, &liveness, &variables, policy);

    Ok(Analysis {
        variables,
        successors,
        gen_kill,
        liveness,
        interference,
    })
}
