//! Command line interface of the `decaf` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// decaf - compile, run and inspect Decaf programs
#[derive(Parser, Debug)]
#[command(name = "decaf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log compiler phases to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a source file to a bytecode artifact
    Compile(CompileArgs),

    /// Run a source file or a compiled artifact
    Run(RunArgs),

    /// Print the bytecode listing of a program
    #[command(alias = "dis")]
    Disasm(DisasmArgs),
}

/// Where a program comes from: source text, or an artifact with `-b`.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Decaf source file
    #[arg(required_unless_present = "bytecode", conflicts_with = "bytecode")]
    pub source: Option<PathBuf>,

    /// Compiled artifact produced by `decaf compile`
    #[arg(short, long, value_name = "ARTIFACT")]
    pub bytecode: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Decaf source file
    pub source: PathBuf,

    /// Output artifact path
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Log every executed instruction
    #[arg(long)]
    pub trace: bool,

    /// Abort after this many instructions
    #[arg(long, value_name = "N")]
    pub max_steps: Option<u64>,

    /// Stack-check all functions before running
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args, Debug)]
pub struct DisasmArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Also print instruction statistics
    #[arg(long)]
    pub stats: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("decaf").chain(args.iter().copied()))
    }

    #[test]
    fn test_run_with_flags() {
        let cli = parse(&["-v", "run", "prog.dcf", "--trace", "--max-steps", "50"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input.source, Some(PathBuf::from("prog.dcf")));
                assert!(args.trace);
                assert_eq!(args.max_steps, Some(50));
                assert!(!args.verify);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_input_is_source_or_artifact() {
        let cli = parse(&["disasm", "-b", "out.dcb", "--stats"]).unwrap();
        match cli.command {
            Commands::Disasm(args) => {
                assert_eq!(args.input.bytecode, Some(PathBuf::from("out.dcb")));
                assert!(args.stats);
            }
            other => panic!("expected disasm, got {:?}", other),
        }

        assert!(parse(&["run"]).is_err());
        assert!(parse(&["run", "a.dcf", "-b", "a.dcb"]).is_err());
    }

    #[test]
    fn test_compile_requires_output() {
        assert!(parse(&["compile", "a.dcf"]).is_err());
        assert!(parse(&["compile", "a.dcf", "-o", "a.dcb"]).is_ok());
    }
}
