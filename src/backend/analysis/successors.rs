use std::collections::BTreeSet;

use super::AnalysisError;
use crate::backend::ir::{Callee, Function, Instruction};

/// For each instruction, the instructions that may run right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successors(Vec<BTreeSet<usize>>);

impl Successors {
    pub fn of(&self, index: usize) -> &BTreeSet<usize> {
        &self.0[index]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn target(function: &Function, label: &str) -> Result<usize, AnalysisError> {
    function
        .find_label(label)
        .ok_or_else(|| AnalysisError::LabelNotFound {
            function: function.name.clone(),
            label: label.to_owned(),
        })
}

fn next(function: &Function, index: usize) -> Result<usize, AnalysisError> {
    if index + 1 < function.instructions.len() {
        Ok(index + 1)
    } else {
        Err(AnalysisError::FallsOffEnd {
            function: function.name.clone(),
            index,
        })
    }
}

pub fn compute(function: &Function) -> Result<Successors, AnalysisError> {
    let mut successors = Vec::with_capacity(function.instructions.len());

    for (i, instr) in function.instructions.iter().enumerate() {
        let mut set = BTreeSet::new();
        match instr {
            Instruction::Goto(label) => {
                set.insert(target(function, label)?);
            }

            Instruction::BranchElse {
                then, otherwise, ..
            } => {
                set.insert(target(function, then)?);
                set.insert(target(function, otherwise)?);
            }

            Instruction::Branch { target: label, .. } => {
                set.insert(next(function, i)?);
                set.insert(target(function, label)?);
            }

            Instruction::Return | Instruction::ReturnVoid => (),

            Instruction::Call {
                callee: Callee::Runtime(runtime),
                ..
            } if !runtime.returns() => (),

            _ => {
                set.insert(next(function, i)?);
            }
        }

        successors.push(set);
    }

    Ok(Successors(successors))
}
