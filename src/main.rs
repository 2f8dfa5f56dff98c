mod cli;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, CompileArgs, DisasmArgs, InputArgs, RunArgs};
use decaf::bytecode::disasm::ProgramStats;
use decaf::runtime::vm_bc::TRACE_TARGET;
use decaf::{BytecodeProgram, Vm, VmConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let trace = matches!(&cli.command, Commands::Run(args) if args.trace);
    if let Err(e) = init_logging(cli.verbose, trace) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Commands::Compile(args) => compile(args),
        Commands::Run(args) => run(args),
        Commands::Disasm(args) => disasm(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never mix with program output.
fn init_logging(verbose: bool, trace: bool) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        filter = filter.add_directive("decaf=debug".parse()?);
    }
    if trace {
        filter = filter.add_directive(format!("{}=trace", TRACE_TARGET).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
    Ok(())
}

fn compile_file(path: &Path) -> Result<BytecodeProgram> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    debug!(path = %path.display(), "compiling");

    decaf::compile_source(&source).with_context(|| format!("{}", path.display()))
}

fn load_artifact(path: &Path) -> Result<BytecodeProgram> {
    let bytes = fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    decaf::decode(&bytes).with_context(|| format!("{}", path.display()))
}

fn load(input: &InputArgs) -> Result<BytecodeProgram> {
    match (&input.source, &input.bytecode) {
        (_, Some(artifact)) => load_artifact(artifact),
        (Some(source), None) => compile_file(source),
        (None, None) => anyhow::bail!("no input: pass a source file or --bytecode"),
    }
}

fn compile(args: &CompileArgs) -> Result<ExitCode> {
    let program = compile_file(&args.source)?;
    let bytes = decaf::encode(&program)?;
    fs::write(&args.output, &bytes)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;

    debug!(path = %args.output.display(), bytes = bytes.len(), "wrote artifact");
    Ok(ExitCode::SUCCESS)
}

fn run(args: &RunArgs) -> Result<ExitCode> {
    let program = load(&args.input)?;
    let config = VmConfig {
        trace: args.trace,
        max_steps: args.max_steps,
        verify: args.verify,
    };

    let mut vm = Vm::with_config(&program, config);
    let result = vm.run();

    for line in vm.output() {
        println!("{}", line);
    }

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn disasm(args: &DisasmArgs) -> Result<ExitCode> {
    let program = load(&args.input)?;
    println!("{}", decaf::disassemble(&program));

    if args.stats {
        println!();
        println!("{}", ProgramStats::collect(&program));
    }
    Ok(ExitCode::SUCCESS)
}
