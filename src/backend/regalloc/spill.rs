use std::collections::BTreeSet;

use super::AllocError;
use crate::backend::analysis::GenKill;
use crate::backend::ir::{Function, Instruction, Memory, Node, Operand, Variable};
use crate::frontend::lowering::is_variable_name;

/// Namespace for spill temporaries. No variable of the function being
/// rewritten may start with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillPrefix(String);

impl SpillPrefix {
    /// Checks that `prefix` followed by a counter spells a variable name.
    pub fn new(prefix: &str) -> Result<Self, AllocError> {
        if is_variable_name(prefix) {
            Ok(Self(prefix.to_owned()))
        } else {
            Err(AllocError::InvalidPrefix(prefix.to_owned()))
        }
    }

    /// Fails if some variable of `function` already lives in this namespace.
    pub fn check_disjoint(&self, function: &Function) -> Result<(), AllocError> {
        match function.variables().into_iter().find(|v| self.owns(v)) {
            Some(v) => Err(AllocError::PrefixCollision {
                prefix: self.0.clone(),
                variable: v.name().to_owned(),
                function: function.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Lengthens `prefix` with underscores until nothing in `function`
    /// collides with it.
    pub fn reserve(prefix: &str, function: &Function) -> Result<Self, AllocError> {
        let mut reserved = Self::new(prefix)?;
        let variables = function.variables();
        while variables.iter().any(|v| reserved.owns(v)) {
            reserved.0.push('_');
        }

        if reserved.0 != prefix {
            log::debug!(
                "spill prefix {} is taken in {}, using {}",
                prefix,
                function.name,
                reserved.0
            );
        }

        Ok(reserved)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owns(&self, variable: &Variable) -> bool {
        variable.name().starts_with(&self.0)
    }
}

struct Temporaries<'a> {
    prefix: &'a SpillPrefix,
    taken: BTreeSet<Variable>,
    next: usize,
}

impl Temporaries<'_> {
    fn fresh(&mut self) -> Variable {
        loop {
            let candidate = Variable::new(format!("{}{}", self.prefix.as_str(), self.next));
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Moves `variable` into a fresh stack slot at the top of the frame. Every
/// instruction touching it gets its own temporary, loaded right before the
/// instruction when read and stored right after when written.
///
/// Returns whether `variable` occurred at all; if not, `function` is left
/// untouched.
pub fn spill(function: &mut Function, variable: &Variable, prefix: &SpillPrefix) -> bool {
    let slot = Memory::stack(function.locals * 8);
    let node = Node::Variable(variable.clone());
    let mut temps = Temporaries {
        prefix,
        taken: function.variables(),
        next: 0,
    };

    let old = std::mem::take(&mut function.instructions);
    let mut rewritten = Vec::with_capacity(old.len());
    let mut spilled = false;

    for mut instr in old {
        if !instr.variables().any(|v| v == variable) {
            rewritten.push(instr);
            continue;
        }

        let sets = GenKill::of(&instr);
        let temp = temps.fresh();
        instr.replace_variable(variable, &Operand::Variable(temp.clone()));
        spilled = true;

        if sets.gens.contains(&node) {
            rewritten.push(Instruction::Load {
                dest: Operand::Variable(temp.clone()),
                source: slot.clone(),
            });
        }

        rewritten.push(instr);

        if sets.kills.contains(&node) {
            rewritten.push(Instruction::Store {
                dest: slot.clone(),
                source: Operand::Variable(temp),
            });
        }
    }

    function.instructions = rewritten;
    if spilled {
        function.locals += 1;
    }

    spilled
}
