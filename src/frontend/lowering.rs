use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::parsing::{Ast, Span};
use crate::backend::{
    arch::{x64, Register},
    ir::{
        ArithmeticOp, Callee, CompareOp, Function, Instruction, Memory, Operand, Program, Runtime,
        ShiftOp, Variable,
    },
};

lazy_static! {
    static ref VARIABLE: Regex = Regex::new(r"^%[A-Za-z_][A-Za-z_0-9]*$").unwrap();
    static ref LABEL: Regex = Regex::new(r"^:[A-Za-z_][A-Za-z_0-9]*$").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
}

pub fn is_variable_name(name: &str) -> bool {
    VARIABLE.is_match(name)
}

#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("expected a program `(:entry function...)` or a single function")]
    InvalidProgram(Span),

    #[error("invalid function `{1}`")]
    InvalidFunction(Span, String),

    #[error("invalid instruction `{1}`")]
    InvalidInstruction(Span, String),

    #[error("invalid operand `{1}`")]
    InvalidOperand(Span, String),

    #[error("number `{1}` does not fit in 64 bits")]
    NumberTooBig(Span, String),
}

impl LoweringError {
    pub fn span(&self) -> Span {
        match self {
            LoweringError::InvalidProgram(s)
            | LoweringError::InvalidFunction(s, _)
            | LoweringError::InvalidInstruction(s, _)
            | LoweringError::InvalidOperand(s, _)
            | LoweringError::NumberTooBig(s, _) => s.clone(),
        }
    }
}

fn invalid_operand(ast: &Ast<'_>) -> LoweringError {
    LoweringError::InvalidOperand(ast.span(), ast.to_string())
}

fn invalid_instruction(ast: &Ast<'_>) -> LoweringError {
    LoweringError::InvalidInstruction(ast.span(), ast.to_string())
}

fn operand(ast: &Ast<'_>) -> Result<Operand, LoweringError> {
    let value = ast.atom().ok_or_else(|| invalid_operand(ast))?;

    if let Some(reg) = Register::from_name(value) {
        Ok(Operand::Register(reg))
    } else if VARIABLE.is_match(value) {
        Ok(Operand::Variable(Variable::new(value)))
    } else if LABEL.is_match(value) {
        Ok(Operand::Label(value.to_owned()))
    } else if NUMBER.is_match(value) {
        value
            .parse()
            .map(Operand::Number)
            .map_err(|_| LoweringError::NumberTooBig(ast.span(), value.to_owned()))
    } else {
        Err(invalid_operand(ast))
    }
}

/// `w`: a variable or any register but `rsp`.
fn writable(ast: &Ast<'_>) -> Result<Operand, LoweringError> {
    match operand(ast)? {
        Operand::Register(r) if r == x64::STACK_POINTER => Err(invalid_operand(ast)),
        v @ (Operand::Register(_) | Operand::Variable(_)) => Ok(v),
        _ => Err(invalid_operand(ast)),
    }
}

/// `x`: `w` or `rsp`.
fn readable(ast: &Ast<'_>) -> Result<Operand, LoweringError> {
    match operand(ast)? {
        v @ (Operand::Register(_) | Operand::Variable(_)) => Ok(v),
        _ => Err(invalid_operand(ast)),
    }
}

/// `t`: `x` or a number.
fn value(ast: &Ast<'_>) -> Result<Operand, LoweringError> {
    match operand(ast)? {
        Operand::Label(_) => Err(invalid_operand(ast)),
        v => Ok(v),
    }
}

fn label(ast: &Ast<'_>) -> Result<String, LoweringError> {
    match operand(ast)? {
        Operand::Label(l) => Ok(l),
        _ => Err(invalid_operand(ast)),
    }
}

fn number(ast: &Ast<'_>) -> Result<i64, LoweringError> {
    match operand(ast)? {
        Operand::Number(n) => Ok(n),
        _ => Err(invalid_operand(ast)),
    }
}

fn memory(ast: &Ast<'_>) -> Result<Memory, LoweringError> {
    match ast {
        Ast::List(_, items) if items.len() == 3 && items[0].atom() == Some("mem") => {
            let base = readable(&items[1])?;
            let offset = number(&items[2])?;
            if offset % 8 != 0 {
                return Err(invalid_operand(&items[2]));
            }

            Ok(Memory { base, offset })
        }

        _ => Err(invalid_operand(ast)),
    }
}

fn callee(ast: &Ast<'_>) -> Result<Callee, LoweringError> {
    if let Some(runtime) = ast.atom().and_then(Runtime::from_name) {
        return Ok(Callee::Runtime(runtime));
    }

    match operand(ast)? {
        Operand::Register(r) if r == x64::STACK_POINTER => Err(invalid_operand(ast)),
        Operand::Number(_) => Err(invalid_operand(ast)),
        v => Ok(Callee::Operand(v)),
    }
}

fn shift_amount(ast: &Ast<'_>) -> Result<Operand, LoweringError> {
    match operand(ast)? {
        Operand::Register(r) if r == x64::SHIFT => Ok(Operand::Register(r)),
        v @ (Operand::Variable(_) | Operand::Number(_)) => Ok(v),
        _ => Err(invalid_operand(ast)),
    }
}

fn compare_op(ast: &Ast<'_>) -> Result<CompareOp, LoweringError> {
    ast.atom()
        .and_then(CompareOp::from_name)
        .ok_or_else(|| invalid_operand(ast))
}

pub fn lower_instruction(ast: &Ast<'_>) -> Result<Instruction, LoweringError> {
    let items = match ast {
        Ast::Atom(_, v) if LABEL.is_match(v) => return Ok(Instruction::Label((*v).to_owned())),
        Ast::Atom(_, _) => return Err(invalid_instruction(ast)),
        Ast::List(_, items) => items,
    };

    let heads: Vec<Option<&str>> = items.iter().map(|v| v.atom()).collect();
    let instr = match heads.as_slice() {
        [Some("return")] => Instruction::Return,

        [Some("return"), Some("void")] => Instruction::ReturnVoid,

        [Some("goto"), _] => Instruction::Goto(label(&items[1])?),

        [Some("call"), _, _] => {
            let arguments = number(&items[2])?;
            if arguments < 0 {
                return Err(invalid_operand(&items[2]));
            }

            Instruction::Call {
                callee: callee(&items[1])?,
                arguments,
            }
        }

        [Some("cjump"), _, _, _, _] => Instruction::Branch {
            op: compare_op(&items[2])?,
            lhs: value(&items[1])?,
            rhs: value(&items[3])?,
            target: label(&items[4])?,
        },

        [Some("cjump"), _, _, _, _, _] => Instruction::BranchElse {
            op: compare_op(&items[2])?,
            lhs: value(&items[1])?,
            rhs: value(&items[3])?,
            then: label(&items[4])?,
            otherwise: label(&items[5])?,
        },

        [_, Some("++")] => Instruction::Increment(writable(&items[0])?),

        [_, Some("--")] => Instruction::Decrement(writable(&items[0])?),

        [_, Some("<-"), _] => match (&items[0], &items[2]) {
            (Ast::List(_, _), _) => {
                let dest = memory(&items[0])?;
                let source = match operand(&items[2])? {
                    l @ Operand::Label(_) => l,
                    _ => value(&items[2])?,
                };
                Instruction::Store { dest, source }
            }

            (_, Ast::List(_, _)) => Instruction::Load {
                dest: writable(&items[0])?,
                source: memory(&items[2])?,
            },

            _ => Instruction::Move {
                dest: writable(&items[0])?,
                source: operand(&items[2])?,
            },
        },

        [_, Some("<-"), _, _, _] => Instruction::Compare {
            dest: writable(&items[0])?,
            op: compare_op(&items[3])?,
            lhs: value(&items[2])?,
            rhs: value(&items[4])?,
        },

        [_, Some("@"), _, _, _] => {
            let scale = number(&items[4])?;
            if !matches!(scale, 1 | 2 | 4 | 8) {
                return Err(invalid_operand(&items[4]));
            }

            Instruction::Address {
                dest: writable(&items[0])?,
                base: writable(&items[2])?,
                index: writable(&items[3])?,
                scale,
            }
        }

        [_, Some(op), _] => {
            if let Some(op) = ArithmeticOp::from_name(op) {
                let in_memory = matches!(op, ArithmeticOp::Add | ArithmeticOp::Sub);
                match (&items[0], &items[2]) {
                    (Ast::List(_, _), _) if in_memory => Instruction::StoreArithmetic {
                        op,
                        dest: memory(&items[0])?,
                        source: value(&items[2])?,
                    },

                    (_, Ast::List(_, _)) if in_memory => Instruction::LoadArithmetic {
                        op,
                        dest: writable(&items[0])?,
                        source: memory(&items[2])?,
                    },

                    _ => Instruction::Arithmetic {
                        op,
                        dest: writable(&items[0])?,
                        source: value(&items[2])?,
                    },
                }
            } else if let Some(op) = ShiftOp::from_name(op) {
                Instruction::Shift {
                    op,
                    dest: writable(&items[0])?,
                    source: shift_amount(&items[2])?,
                }
            } else {
                return Err(invalid_instruction(ast));
            }
        }

        _ => return Err(invalid_instruction(ast)),
    };

    Ok(instr)
}

pub fn lower_function(ast: &Ast<'_>) -> Result<Function, LoweringError> {
    let invalid = || LoweringError::InvalidFunction(ast.span(), ast.to_string());

    let items = match ast {
        Ast::List(_, items) if items.len() >= 4 => items,
        _ => return Err(invalid()),
    };

    let name = label(&items[0]).map_err(|_| invalid())?;
    let arguments = number(&items[1]).map_err(|_| invalid())?;
    let locals = number(&items[2]).map_err(|_| invalid())?;
    if arguments < 0 || locals < 0 {
        return Err(invalid());
    }

    let instructions = items[3..]
        .iter()
        .map(lower_instruction)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Function {
        name,
        arguments,
        locals,
        instructions,
    })
}

/// Lowers a whole program, or a lone function wrapped into a program whose
/// entry is that function.
pub fn lower(asts: &[Ast<'_>]) -> Result<Program, LoweringError> {
    let top = match asts {
        [top] => top,
        [] => return Err(LoweringError::InvalidProgram(0..0)),
        [_, second, ..] => return Err(LoweringError::InvalidProgram(second.span())),
    };

    let items = match top {
        Ast::List(_, items) if items.len() >= 2 => items,
        _ => return Err(LoweringError::InvalidProgram(top.span())),
    };

    if let Ast::Atom(_, _) = items[1] {
        let function = lower_function(top)?;
        return Ok(Program {
            entry: function.name.clone(),
            functions: vec![function],
        });
    }

    let entry = label(&items[0]).map_err(|_| LoweringError::InvalidProgram(items[0].span()))?;
    let functions = items[1..]
        .iter()
        .map(lower_function)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Program { entry, functions })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frontend::parsing::parse;

    fn instr(src: &str) -> Result<Instruction, LoweringError> {
        let asts = parse(src).unwrap();
        lower_instruction(&asts[0])
    }

    #[test]
    fn instruction_shapes() {
        assert!(matches!(instr("(%x <- 5)"), Ok(Instruction::Move { .. })));
        assert!(matches!(instr("(%x <- :f)"), Ok(Instruction::Move { .. })));
        assert!(matches!(instr("(%x <- (mem rsp 8))"), Ok(Instruction::Load { .. })));
        assert!(matches!(instr("((mem %p 0) <- :ret)"), Ok(Instruction::Store { .. })));
        assert!(matches!(instr("(%x *= %y)"), Ok(Instruction::Arithmetic { .. })));
        assert!(matches!(instr("(%x <<= rcx)"), Ok(Instruction::Shift { .. })));
        assert!(matches!(instr("(%x >>= 3)"), Ok(Instruction::Shift { .. })));
        assert!(matches!(
            instr("((mem %p 16) -= 1)"),
            Ok(Instruction::StoreArithmetic { .. })
        ));
        assert!(matches!(
            instr("(%x += (mem %p 16))"),
            Ok(Instruction::LoadArithmetic { .. })
        ));
        assert!(matches!(instr("(%c <- %a <= 3)"), Ok(Instruction::Compare { .. })));
        assert!(matches!(instr("(cjump %a = 3 :t)"), Ok(Instruction::Branch { .. })));
        assert!(matches!(
            instr("(cjump %a < %b :t :f)"),
            Ok(Instruction::BranchElse { .. })
        ));
        assert!(matches!(instr(":loop"), Ok(Instruction::Label(_))));
        assert!(matches!(instr("(goto :loop)"), Ok(Instruction::Goto(_))));
        assert!(matches!(instr("(return)"), Ok(Instruction::Return)));
        assert!(matches!(instr("(return void)"), Ok(Instruction::ReturnVoid)));
        assert!(matches!(instr("(call print 1)"), Ok(Instruction::Call { .. })));
        assert!(matches!(instr("(call %f 7)"), Ok(Instruction::Call { .. })));
        assert!(matches!(instr("(%i ++)"), Ok(Instruction::Increment(_))));
        assert!(matches!(instr("(%i --)"), Ok(Instruction::Decrement(_))));
        assert!(matches!(instr("(%a @ %b %c 8)"), Ok(Instruction::Address { .. })));
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(instr("(%x <-)"), Err(LoweringError::InvalidInstruction(..))));
        assert!(matches!(instr("(rsp <- 1)"), Err(LoweringError::InvalidOperand(..))));
        assert!(matches!(instr("(%x <<= rdx)"), Err(LoweringError::InvalidOperand(..))));
        assert!(matches!(instr("(%x <- (mem rsp 3))"), Err(LoweringError::InvalidOperand(..))));
        assert!(matches!(instr("(%a @ %b %c 3)"), Err(LoweringError::InvalidOperand(..))));
        assert!(matches!(instr("(%x *= (mem rsp 0))"), Err(LoweringError::InvalidOperand(..))));
        assert!(matches!(instr("(goto %x)"), Err(LoweringError::InvalidOperand(..))));
        assert!(matches!(
            instr("(%x <- 99999999999999999999)"),
            Err(LoweringError::NumberTooBig(..))
        ));
    }

    #[test]
    fn program_and_lone_function() {
        let asts = parse("(:main (:main 0 0 (return)) (:f 1 2 (rax <- rdi) (return)))").unwrap();
        let program = lower(&asts).unwrap();
        assert_eq!(program.entry, ":main");
        assert_eq!(program.functions.len(), 2);
        assert_eq!(program.functions[1].arguments, 1);
        assert_eq!(program.functions[1].locals, 2);

        let asts = parse("(:f 1 0 (rax <- rdi) (return))").unwrap();
        let program = lower(&asts).unwrap();
        assert_eq!(program.entry, ":f");
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn operand_classes() {
        let asts = parse("(%x <- rsp)").unwrap();
        match lower_instruction(&asts[0]).unwrap() {
            Instruction::Move { dest, source } => {
                assert_eq!(dest, Operand::var("%x"));
                assert_eq!(source, Operand::Register(Register::Rsp));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(is_variable_name("%S0"));
        assert!(!is_variable_name("S0"));
    }
}
