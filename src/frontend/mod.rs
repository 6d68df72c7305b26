//! Reading L2 source text into the instruction arena.

pub mod lowering;
pub mod parsing;

use thiserror::Error;

use crate::backend::ir::Program;

use self::{lowering::LoweringError, parsing::SyntaxError};

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Lowering(#[from] LoweringError),
}

impl FrontendError {
    pub fn offset(&self) -> usize {
        match self {
            FrontendError::Syntax(e) => e.offset,
            FrontendError::Lowering(e) => e.span().start,
        }
    }
}

pub fn parse_program(text: &str) -> Result<Program, FrontendError> {
    let source = parsing::strip_comments(text);
    let asts = parsing::parse(&source)?;
    Ok(lowering::lower(&asts)?)
}
