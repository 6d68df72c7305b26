use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use l2c::backend::analysis::KillPolicy;

/// Allocates registers for L2 programs and emits L1.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
#[command(propagate_version = true)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,

    /// Log more; repeat for more detail. `RUST_LOG` overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Allocate every function and write the L1 program.
    #[command(visible_alias = "c")]
    Compile {
        #[command(flatten)]
        input: Input,

        /// Where to write the program. Defaults to the input path with an
        /// `L1` extension.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        allocator: Allocator,
    },

    /// Print the IN and OUT sets of every instruction.
    Liveness {
        #[command(flatten)]
        input: Input,

        #[command(flatten)]
        allocator: Allocator,
    },

    /// Print the interference graph, one node per line.
    Interference {
        #[command(flatten)]
        input: Input,

        #[command(flatten)]
        allocator: Allocator,
    },

    /// Print the first colouring attempt of every function.
    Color {
        #[command(flatten)]
        input: Input,

        #[command(flatten)]
        allocator: Allocator,
    },

    /// Spill one variable of the first function and print the result.
    Spill {
        #[command(flatten)]
        input: Input,

        /// The variable to move to the stack.
        #[arg(long)]
        variable: String,

        /// Prefix for the temporaries introduced by the rewrite.
        #[arg(long, default_value = "%S")]
        prefix: String,
    },
}

#[derive(Debug, Args)]
pub struct Input {
    #[arg(required = true)]
    pub path: PathBuf,
}

#[derive(Debug, Args)]
pub struct Allocator {
    /// Whether a plain copy may share a register with its source.
    #[arg(long, value_enum, default_value_t = Policy::Conservative)]
    pub kill_policy: Policy,

    /// Prefix for spill temporaries. Lengthened automatically if a variable
    /// already uses it.
    #[arg(long, default_value = "%S")]
    pub spill_prefix: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    Conservative,
    Optimistic,
}

impl From<Policy> for KillPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Conservative => KillPolicy::Conservative,
            Policy::Optimistic => KillPolicy::Optimistic,
        }
    }
}
