mod args;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::LevelFilter;

use l2c::backend::analysis::{analyze, KillPolicy};
use l2c::backend::ir::{Function, Program, Variable};
use l2c::backend::regalloc::{
    allocate_program, coloring, spill, AllocError, AllocatorConfig, SpillPrefix,
};
use l2c::backend::report;
use l2c::frontend::{parse_program, parsing::line_col};

use args::{Allocator, Arguments, Command};

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn read_program(path: &Path) -> anyhow::Result<Program> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;

    parse_program(&text).map_err(|e| {
        let (line, col) = line_col(&text, e.offset());
        anyhow!(e).context(format!("{}:{}:{}", path.display(), line, col))
    })
}

fn config(allocator: &Allocator) -> AllocatorConfig {
    AllocatorConfig {
        kill_policy: allocator.kill_policy.into(),
        spill_prefix: allocator.spill_prefix.clone(),
        ..AllocatorConfig::default()
    }
}

/// Runs one report over every function, labelling each section when the
/// program has more than one function.
fn per_function(
    program: &Program,
    mut render: impl FnMut(&Function) -> Result<String, AllocError>,
) -> anyhow::Result<String> {
    let mut out = String::new();
    for function in program.functions.iter() {
        if program.functions.len() > 1 {
            out.push_str(&format!("// {}\n", function.name));
        }

        let section = render(function)
            .with_context(|| format!("in function `{}`", function.name))?;
        out.push_str(&section);
    }

    Ok(out)
}

fn compile(path: &Path, output: Option<PathBuf>, allocator: &Allocator) -> anyhow::Result<()> {
    let program = read_program(path)?;
    let l1 = allocate_program(&program, &config(allocator))?;

    let output = output.unwrap_or_else(|| path.with_extension("L1"));
    fs::write(&output, l1.to_string())
        .with_context(|| format!("could not write `{}`", output.display()))?;

    log::info!("wrote {}", output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    init_logger(args.verbose);

    match args.command {
        Command::Compile {
            input,
            output,
            allocator,
        } => compile(&input.path, output, &allocator)?,

        Command::Liveness { input, allocator } => {
            let program = read_program(&input.path)?;
            let policy: KillPolicy = allocator.kill_policy.into();
            let out = per_function(&program, |f| {
                Ok(report::liveness(&analyze(f, policy)?.liveness))
            })?;
            print!("{}", out);
        }

        Command::Interference { input, allocator } => {
            let program = read_program(&input.path)?;
            let policy: KillPolicy = allocator.kill_policy.into();
            let out = per_function(&program, |f| {
                Ok(report::interference(&analyze(f, policy)?.interference))
            })?;
            print!("{}", out);
        }

        Command::Color { input, allocator } => {
            let program = read_program(&input.path)?;
            let policy: KillPolicy = allocator.kill_policy.into();
            let out = per_function(&program, |f| {
                let graph = analyze(f, policy)?.interference;
                Ok(report::coloring(&coloring::color(&graph)))
            })?;
            print!("{}", out);
        }

        Command::Spill {
            input,
            variable,
            prefix,
        } => {
            let program = read_program(&input.path)?;
            let mut function = match program.functions.into_iter().next() {
                Some(f) => f,
                None => bail!("`{}` holds no function", input.path.display()),
            };

            let prefix = SpillPrefix::new(&prefix)?;
            prefix.check_disjoint(&function)?;

            let variable = Variable::new(variable);
            if !spill::spill(&mut function, &variable, &prefix) {
                return Err(AllocError::UnknownVariable {
                    function: function.name,
                    variable: variable.name().to_owned(),
                }
                .into());
            }

            println!("{}", function);
        }
    }

    Ok(())
}
