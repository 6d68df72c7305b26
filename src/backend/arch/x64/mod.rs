use std::fmt::Display;

/// The sixteen general purpose registers of the x86-64 target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

pub const ALL: [Register; 16] = [
    Register::Rax,
    Register::Rbx,
    Register::Rcx,
    Register::Rdx,
    Register::Rsi,
    Register::Rdi,
    Register::Rsp,
    Register::Rbp,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

pub const CALLER_SAVED: [Register; 9] = [
    Register::R10,
    Register::R11,
    Register::R8,
    Register::R9,
    Register::Rax,
    Register::Rcx,
    Register::Rdi,
    Register::Rdx,
    Register::Rsi,
];

pub const CALLEE_SAVED: [Register; 6] = [
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
    Register::Rbp,
    Register::Rbx,
];

pub const ARGUMENTS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

pub const RETURN: Register = Register::Rax;
pub const SHIFT: Register = Register::Rcx;
pub const STACK_POINTER: Register = Register::Rsp;

/// Registers the allocator may hand out, caller-saved first.
pub fn analyzable() -> impl Iterator<Item = Register> {
    CALLER_SAVED.into_iter().chain(CALLEE_SAVED)
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "rax",
            Register::Rbx => "rbx",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
            Register::Rsi => "rsi",
            Register::Rdi => "rdi",
            Register::Rsp => "rsp",
            Register::Rbp => "rbp",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
            Register::R11 => "r11",
            Register::R12 => "r12",
            Register::R13 => "r13",
            Register::R14 => "r14",
            Register::R15 => "r15",
        }
    }

    pub fn from_name(name: &str) -> Option<Register> {
        ALL.into_iter().find(|r| r.name() == name)
    }

    pub fn is_analyzable(self) -> bool {
        self != STACK_POINTER
    }

    pub fn is_caller_saved(self) -> bool {
        CALLER_SAVED.contains(&self)
    }

    pub fn is_callee_saved(self) -> bool {
        CALLEE_SAVED.contains(&self)
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
