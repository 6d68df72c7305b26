//! Iterated graph-colouring register allocation.
//!
//! Each function runs its own loop: analyse, colour, and if some variable
//! found no colour, spill one variable to the stack and start over on the
//! rewritten body. Functions share nothing, so a program is allocated one
//! function at a time.

pub mod coloring;
pub mod spill;

use thiserror::Error;

use super::analysis::{analyze, AnalysisError, InterferenceGraph, KillPolicy};
use super::ir::{Function, Instruction, Node, Operand, Program, Variable};

pub use coloring::{Assignment, Color, Coloring};
pub use spill::SpillPrefix;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("`{0}` cannot prefix spill temporaries; it must itself be a variable name such as `%S`")]
    InvalidPrefix(String),

    #[error("spill prefix `{prefix}` collides with variable `{variable}` in function `{function}`")]
    PrefixCollision {
        prefix: String,
        variable: String,
        function: String,
    },

    #[error("variable `{variable}` does not occur in function `{function}`")]
    UnknownVariable { function: String, variable: String },

    #[error("function `{function}` still needs spilling after {spills} spills")]
    SpillLimit { function: String, spills: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub kill_policy: KillPolicy,
    pub spill_prefix: String,
    /// The spill loop gives up after `spill_bound_factor * (variables + 1)`
    /// spills.
    pub spill_bound_factor: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            kill_policy: KillPolicy::Conservative,
            spill_prefix: "%S".to_owned(),
            spill_bound_factor: 8,
        }
    }
}

enum State {
    NeedsAllocation,
    NeedsSpill(Variable),
    Colored(Coloring),
}

/// A function whose every variable has a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// The body after all spills, still written with variables.
    pub function: Function,
    pub coloring: Coloring,
    pub spills: usize,
}

impl Allocation {
    /// The L1 body: variables replaced by their registers.
    pub fn to_l1(&self) -> Function {
        let mut function = self.function.clone();
        for instr in function.instructions.iter_mut() {
            if let Instruction::ReturnVoid = instr {
                *instr = Instruction::Return;
                continue;
            }

            for operand in instr.operands_mut() {
                let register = match operand {
                    Operand::Variable(v) => self.coloring.register_of(v),
                    _ => None,
                };

                if let Some(r) = register {
                    *operand = Operand::Register(r);
                }
            }
        }

        function
    }
}

fn busiest(graph: &InterferenceGraph, vars: Vec<&Variable>) -> Option<Variable> {
    vars.into_iter()
        .max_by(|a, b| {
            let degree = |v: &Variable| graph.degree(&Node::Variable(v.clone()));
            degree(*a).cmp(&degree(*b)).then_with(|| b.cmp(a))
        })
        .cloned()
}

/// Chooses what to spill when `coloring` left variables uncoloured. Real
/// variables go before spill temporaries, then the most constrained first.
/// When only temporaries are left, the busiest variable competing with them
/// is spilled instead so the next round has more room.
fn spill_candidate(
    coloring: &Coloring,
    graph: &InterferenceGraph,
    prefix: &SpillPrefix,
) -> Option<Variable> {
    let spilled: Vec<&Variable> = coloring.spilled().collect();
    if spilled.is_empty() {
        return None;
    }

    let real: Vec<&Variable> = spilled.iter().copied().filter(|v| !prefix.owns(v)).collect();
    if !real.is_empty() {
        return busiest(graph, real);
    }

    let competing: Vec<&Variable> = spilled
        .iter()
        .flat_map(|v| graph.neighbors(&Node::Variable((*v).clone())).collect::<Vec<_>>())
        .filter_map(Node::variable)
        .filter(|v| !prefix.owns(v))
        .collect();

    busiest(graph, competing).or_else(|| busiest(graph, spilled))
}

pub fn allocate_function(
    function: &Function,
    config: &AllocatorConfig,
) -> Result<Allocation, AllocError> {
    let prefix = SpillPrefix::reserve(&config.spill_prefix, function)?;
    let bound = config.spill_bound_factor * (function.variables().len() + 1);

    let mut function = function.clone();
    let mut spills = 0;
    let mut state = State::NeedsAllocation;
    loop {
        state = match state {
            State::NeedsAllocation => {
                let analysis = analyze(&function, config.kill_policy)?;
                log::debug!(
                    "colouring {} with {} variables",
                    function.name,
                    analysis.variables.len()
                );

                let coloring = coloring::color(&analysis.interference);
                match spill_candidate(&coloring, &analysis.interference, &prefix) {
                    Some(v) => State::NeedsSpill(v),
                    None => State::Colored(coloring),
                }
            }

            State::NeedsSpill(variable) => {
                if spills >= bound {
                    return Err(AllocError::SpillLimit {
                        function: function.name.clone(),
                        spills,
                    });
                }

                log::debug!("spilling {} in {}", variable, function.name);
                spill::spill(&mut function, &variable, &prefix);
                spills += 1;
                State::NeedsAllocation
            }

            State::Colored(coloring) => {
                return Ok(Allocation {
                    function,
                    coloring,
                    spills,
                })
            }
        }
    }
}

/// Allocates every function and returns the L1 program. Nothing is
/// returned unless every function succeeds.
pub fn allocate_program(program: &Program, config: &AllocatorConfig) -> Result<Program, AllocError> {
    let functions = program
        .functions
        .iter()
        .map(|f| {
            let allocation = allocate_function(f, config)?;
            log::info!(
                "allocated {} with {} spills and {} locals",
                f.name,
                allocation.spills,
                allocation.function.locals
            );
            Ok(allocation.to_l1())
        })
        .collect::<Result<Vec<_>, AllocError>>()?;

    Ok(Program {
        entry: program.entry.clone(),
        functions,
    })
}
