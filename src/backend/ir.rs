use std::{cmp::Ordering, collections::BTreeSet, fmt::Display};

use super::arch::{x64, Register};

/// A symbolic location, spelled with its `%` sigil.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything liveness and interference reason about: a variable or an
/// analyzable register. Ordered by name so reports print lexically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Register(Register),
    Variable(Variable),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Register(r) => r.name(),
            Node::Variable(v) => v.name(),
        }
    }

    pub fn variable(&self) -> Option<&Variable> {
        match self {
            Node::Variable(v) => Some(v),
            Node::Register(_) => None,
        }
    }

    pub fn register(&self) -> Option<Register> {
        match self {
            Node::Register(r) => Some(*r),
            Node::Variable(_) => None,
        }
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl From<Register> for Node {
    fn from(r: Register) -> Self {
        Node::Register(r)
    }
}

impl From<Variable> for Node {
    fn from(v: Variable) -> Self {
        Node::Variable(v)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Variable(Variable),
    Number(i64),
    Label(String),
}

impl Operand {
    pub fn var(name: &str) -> Self {
        Operand::Variable(Variable::new(name))
    }

    /// The node this operand contributes to dataflow, if any. Numbers,
    /// labels and the stack pointer contribute nothing.
    pub fn node(&self) -> Option<Node> {
        match self {
            Operand::Register(r) if r.is_analyzable() => Some(Node::Register(*r)),
            Operand::Variable(v) => Some(Node::Variable(v.clone())),
            _ => None,
        }
    }

    pub fn variable(&self) -> Option<&Variable> {
        match self {
            Operand::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Variable(v) => write!(f, "{}", v),
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    pub base: Operand,
    pub offset: i64,
}

impl Memory {
    pub fn stack(offset: i64) -> Self {
        Self {
            base: Operand::Register(x64::STACK_POINTER),
            offset,
        }
    }
}

impl Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(mem {} {})", self.base, self.offset)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    And,
}

impl ArithmeticOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "+=" => Some(ArithmeticOp::Add),
            "-=" => Some(ArithmeticOp::Sub),
            "*=" => Some(ArithmeticOp::Mul),
            "&=" => Some(ArithmeticOp::And),
            _ => None,
        }
    }
}

impl Display for ArithmeticOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArithmeticOp::Add => write!(f, "+="),
            ArithmeticOp::Sub => write!(f, "-="),
            ArithmeticOp::Mul => write!(f, "*="),
            ArithmeticOp::And => write!(f, "&="),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Left,
    Right,
}

impl ShiftOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "<<=" => Some(ShiftOp::Left),
            ">>=" => Some(ShiftOp::Right),
            _ => None,
        }
    }
}

impl Display for ShiftOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftOp::Left => write!(f, "<<="),
            ShiftOp::Right => write!(f, ">>="),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
}

impl CompareOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            "=" => Some(CompareOp::Eq),
            _ => None,
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Eq => write!(f, "="),
        }
    }
}

/// Functions provided by the runtime rather than the program.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Runtime {
    Print,
    Input,
    Allocate,
    TupleError,
    TensorError,
}

impl Runtime {
    pub fn name(self) -> &'static str {
        match self {
            Runtime::Print => "print",
            Runtime::Input => "input",
            Runtime::Allocate => "allocate",
            Runtime::TupleError => "tuple-error",
            Runtime::TensorError => "tensor-error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Runtime::Print,
            Runtime::Input,
            Runtime::Allocate,
            Runtime::TupleError,
            Runtime::TensorError,
        ]
        .into_iter()
        .find(|r| r.name() == name)
    }

    /// The error reporters abort the program.
    pub fn returns(self) -> bool {
        !matches!(self, Runtime::TupleError | Runtime::TensorError)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callee {
    Runtime(Runtime),
    Operand(Operand),
}

impl Display for Callee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callee::Runtime(r) => write!(f, "{}", r.name()),
            Callee::Operand(o) => write!(f, "{}", o),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Move {
        dest: Operand,
        source: Operand,
    },

    Load {
        dest: Operand,
        source: Memory,
    },

    Store {
        dest: Memory,
        source: Operand,
    },

    Arithmetic {
        op: ArithmeticOp,
        dest: Operand,
        source: Operand,
    },

    Shift {
        op: ShiftOp,
        dest: Operand,
        source: Operand,
    },

    StoreArithmetic {
        op: ArithmeticOp,
        dest: Memory,
        source: Operand,
    },

    LoadArithmetic {
        op: ArithmeticOp,
        dest: Operand,
        source: Memory,
    },

    Compare {
        dest: Operand,
        op: CompareOp,
        lhs: Operand,
        rhs: Operand,
    },

    Branch {
        op: CompareOp,
        lhs: Operand,
        rhs: Operand,
        target: String,
    },

    BranchElse {
        op: CompareOp,
        lhs: Operand,
        rhs: Operand,
        then: String,
        otherwise: String,
    },

    Label(String),

    Goto(String),

    Return,

    ReturnVoid,

    Call {
        callee: Callee,
        arguments: i64,
    },

    Increment(Operand),

    Decrement(Operand),

    Address {
        dest: Operand,
        base: Operand,
        index: Operand,
        scale: i64,
    },
}

impl Instruction {
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instruction::Move { dest, source }
            | Instruction::Arithmetic { dest, source, .. }
            | Instruction::Shift { dest, source, .. } => vec![dest, source],

            Instruction::Load { dest, source } | Instruction::LoadArithmetic { dest, source, .. } => {
                vec![dest, &source.base]
            }

            Instruction::Store { dest, source }
            | Instruction::StoreArithmetic { dest, source, .. } => vec![&dest.base, source],

            Instruction::Compare { dest, lhs, rhs, .. } => vec![dest, lhs, rhs],

            Instruction::Branch { lhs, rhs, .. } | Instruction::BranchElse { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }

            Instruction::Call {
                callee: Callee::Operand(callee),
                ..
            } => vec![callee],

            Instruction::Increment(dest) | Instruction::Decrement(dest) => vec![dest],

            Instruction::Address {
                dest, base, index, ..
            } => vec![dest, base, index],

            Instruction::Label(_)
            | Instruction::Goto(_)
            | Instruction::Return
            | Instruction::ReturnVoid
            | Instruction::Call { .. } => vec![],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instruction::Move { dest, source }
            | Instruction::Arithmetic { dest, source, .. }
            | Instruction::Shift { dest, source, .. } => vec![dest, source],

            Instruction::Load { dest, source } | Instruction::LoadArithmetic { dest, source, .. } => {
                vec![dest, &mut source.base]
            }

            Instruction::Store { dest, source }
            | Instruction::StoreArithmetic { dest, source, .. } => vec![&mut dest.base, source],

            Instruction::Compare { dest, lhs, rhs, .. } => vec![dest, lhs, rhs],

            Instruction::Branch { lhs, rhs, .. } | Instruction::BranchElse { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }

            Instruction::Call {
                callee: Callee::Operand(callee),
                ..
            } => vec![callee],

            Instruction::Increment(dest) | Instruction::Decrement(dest) => vec![dest],

            Instruction::Address {
                dest, base, index, ..
            } => vec![dest, base, index],

            Instruction::Label(_)
            | Instruction::Goto(_)
            | Instruction::Return
            | Instruction::ReturnVoid
            | Instruction::Call { .. } => vec![],
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.operands().into_iter().filter_map(Operand::variable)
    }

    /// Rewrites every occurrence of `from`. Returns whether anything changed.
    pub fn replace_variable(&mut self, from: &Variable, to: &Operand) -> bool {
        let mut replaced = false;
        for operand in self.operands_mut() {
            if operand.variable() == Some(from) {
                *operand = to.clone();
                replaced = true;
            }
        }

        replaced
    }

    pub fn defines_label(&self, label: &str) -> bool {
        matches!(self, Instruction::Label(l) if l == label)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Move { dest, source } => write!(f, "({} <- {})", dest, source),
            Instruction::Load { dest, source } => write!(f, "({} <- {})", dest, source),
            Instruction::Store { dest, source } => write!(f, "({} <- {})", dest, source),
            Instruction::Arithmetic { op, dest, source } => write!(f, "({} {} {})", dest, op, source),
            Instruction::Shift { op, dest, source } => write!(f, "({} {} {})", dest, op, source),
            Instruction::StoreArithmetic { op, dest, source } => {
                write!(f, "({} {} {})", dest, op, source)
            }
            Instruction::LoadArithmetic { op, dest, source } => {
                write!(f, "({} {} {})", dest, op, source)
            }
            Instruction::Compare { dest, op, lhs, rhs } => {
                write!(f, "({} <- {} {} {})", dest, lhs, op, rhs)
            }
            Instruction::Branch {
                op,
                lhs,
                rhs,
                target,
            } => write!(f, "(cjump {} {} {} {})", lhs, op, rhs, target),
            Instruction::BranchElse {
                op,
                lhs,
                rhs,
                then,
                otherwise,
            } => write!(f, "(cjump {} {} {} {} {})", lhs, op, rhs, then, otherwise),
            Instruction::Label(l) => write!(f, "{}", l),
            Instruction::Goto(l) => write!(f, "(goto {})", l),
            Instruction::Return => write!(f, "(return)"),
            Instruction::ReturnVoid => write!(f, "(return void)"),
            Instruction::Call { callee, arguments } => write!(f, "(call {} {})", callee, arguments),
            Instruction::Increment(dest) => write!(f, "({} ++)", dest),
            Instruction::Decrement(dest) => write!(f, "({} --)", dest),
            Instruction::Address {
                dest,
                base,
                index,
                scale,
            } => write!(f, "({} @ {} {} {})", dest, base, index, scale),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub arguments: i64,
    pub locals: i64,
    pub instructions: Vec<Instruction>,
}

impl Function {
    /// Every variable mentioned anywhere in the body.
    pub fn variables(&self) -> BTreeSet<Variable> {
        self.instructions
            .iter()
            .flat_map(|i| i.variables())
            .cloned()
            .collect()
    }

    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.instructions.iter().position(|i| i.defines_label(label))
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "({} {} {}", self.name, self.arguments, self.locals)?;
        for instr in self.instructions.iter() {
            writeln!(f, "  {}", instr)?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub entry: String,
    pub functions: Vec<Function>,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "({}", self.entry)?;
        for func in self.functions.iter() {
            for line in func.to_string().lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        writeln!(f, ")")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_order_is_lexical() {
        let mut nodes = vec![
            Node::Register(Register::Rdi),
            Node::Variable(Variable::new("%b")),
            Node::Register(Register::R8),
            Node::Variable(Variable::new("%a")),
        ];
        nodes.sort();
        let names: Vec<_> = nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["%a", "%b", "r8", "rdi"]);
    }

    #[test]
    fn stack_pointer_is_not_a_node() {
        assert_eq!(Operand::Register(Register::Rsp).node(), None);
        assert_eq!(Operand::Number(4).node(), None);
        assert_eq!(
            Operand::Register(Register::Rax).node(),
            Some(Node::Register(Register::Rax))
        );
    }

    #[test]
    fn replace_in_memory_base() {
        let mut instr = Instruction::StoreArithmetic {
            op: ArithmeticOp::Add,
            dest: Memory {
                base: Operand::var("%p"),
                offset: 8,
            },
            source: Operand::var("%p"),
        };
        assert!(instr.replace_variable(&Variable::new("%p"), &Operand::var("%S0")));
        assert_eq!(instr.to_string(), "((mem %S0 8) += %S0)");
    }

    #[test]
    fn display_function() {
        let func = Function {
            name: ":f".to_owned(),
            arguments: 1,
            locals: 0,
            instructions: vec![
                Instruction::Move {
                    dest: Operand::Register(Register::Rax),
                    source: Operand::Register(Register::Rdi),
                },
                Instruction::Return,
            ],
        };
        assert_eq!(func.to_string(), "(:f 1 0\n  (rax <- rdi)\n  (return)\n)");
    }
}
