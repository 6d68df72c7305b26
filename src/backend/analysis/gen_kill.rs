use std::collections::BTreeSet;

use super::AnalysisError;
use crate::backend::arch::{x64, Register};
use crate::backend::ir::{Callee, Function, Instruction, Node, Operand, Variable};

/// What one instruction reads (`gens`) and overwrites (`kills`).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenKill {
    pub gens: BTreeSet<Node>,
    pub kills: BTreeSet<Node>,
}

impl GenKill {
    fn read(&mut self, operand: &Operand) {
        if let Some(node) = operand.node() {
            self.gens.insert(node);
        }
    }

    fn write(&mut self, operand: &Operand) {
        if let Some(node) = operand.node() {
            self.kills.insert(node);
        }
    }

    fn read_registers(&mut self, registers: impl IntoIterator<Item = Register>) {
        self.gens.extend(registers.into_iter().map(Node::Register));
    }

    fn write_registers(&mut self, registers: impl IntoIterator<Item = Register>) {
        self.kills.extend(registers.into_iter().map(Node::Register));
    }

    /// Reads and writes of a single instruction, independent of context.
    pub fn of(instr: &Instruction) -> GenKill {
        let mut sets = GenKill::default();

        match instr {
            Instruction::Move { dest, source } => {
                sets.read(source);
                sets.write(dest);
            }

            Instruction::Load { dest, source } => {
                sets.read(&source.base);
                sets.write(dest);
            }

            Instruction::Store { dest, source }
            | Instruction::StoreArithmetic { dest, source, .. } => {
                sets.read(&dest.base);
                sets.read(source);
            }

            Instruction::Arithmetic { dest, source, .. } => {
                sets.read(dest);
                sets.read(source);
                sets.write(dest);
            }

            // sal/sar read their destination even when the count is a
            // constant, so the shifted value is live up to this point
            Instruction::Shift { dest, source, .. } => {
                sets.read(dest);
                sets.read(source);
                sets.write(dest);
            }

            Instruction::LoadArithmetic { dest, source, .. } => {
                sets.read(dest);
                sets.read(&source.base);
                sets.write(dest);
            }

            Instruction::Compare { dest, lhs, rhs, .. } => {
                sets.read(lhs);
                sets.read(rhs);
                sets.write(dest);
            }

            Instruction::Branch { lhs, rhs, .. } | Instruction::BranchElse { lhs, rhs, .. } => {
                sets.read(lhs);
                sets.read(rhs);
            }

            Instruction::Label(_) | Instruction::Goto(_) => (),

            Instruction::Return => {
                sets.read_registers([x64::RETURN]);
                sets.read_registers(x64::CALLEE_SAVED);
            }

            Instruction::ReturnVoid => sets.read_registers(x64::CALLEE_SAVED),

            Instruction::Call { callee, arguments } => {
                if let Callee::Operand(callee) = callee {
                    sets.read(callee);
                }

                let passed = (*arguments).clamp(0, x64::ARGUMENTS.len() as i64) as usize;
                sets.read_registers(x64::ARGUMENTS[..passed].iter().copied());
                sets.write_registers(x64::CALLER_SAVED);
                sets.write_registers([x64::RETURN]);
            }

            Instruction::Increment(dest) | Instruction::Decrement(dest) => {
                sets.read(dest);
                sets.write(dest);
            }

            Instruction::Address {
                dest, base, index, ..
            } => {
                sets.read(base);
                sets.read(index);
                sets.write(dest);
            }
        }

        sets
    }
}

fn check_known(
    function: &Function,
    sets: &GenKill,
    variables: &BTreeSet<Variable>,
) -> Result<(), AnalysisError> {
    let unknown = sets
        .gens
        .iter()
        .chain(sets.kills.iter())
        .filter_map(Node::variable)
        .find(|v| !variables.contains(*v));

    match unknown {
        Some(v) => Err(AnalysisError::UnknownVariable {
            function: function.name.clone(),
            variable: v.name().to_owned(),
        }),
        None => Ok(()),
    }
}

/// Gen and kill sets for every instruction of `function`, indexed by
/// instruction position.
pub fn compute(
    function: &Function,
    variables: &BTreeSet<Variable>,
) -> Result<Vec<GenKill>, AnalysisError> {
    function
        .instructions
        .iter()
        .map(|instr| {
            let sets = GenKill::of(instr);
            check_known(function, &sets, variables)?;
            Ok(sets)
        })
        .collect()
}
