//! Decaf: a small imperative language compiled to stack bytecode.
//!
//! Pipeline: [`frontend`] (lexer, parser) produces a [`lang`] syntax tree,
//! [`sema`] resolves names and checks it, [`bytecode`] lowers it to a
//! [`BytecodeProgram`], and [`runtime`] executes that program.

pub mod bytecode;
pub mod error;
pub mod frontend;
pub mod lang;
pub mod runtime;
pub mod sema;

use tracing::debug;

pub use bytecode::codec::{decode, encode};
pub use bytecode::{BytecodeProgram, Opcode};
pub use error::DecafError;
pub use runtime::{RuntimeError, RuntimeErrorKind, Vm, VmConfig};

use frontend::lexer::Lexer;
use frontend::parser::Parser;

/// Lexes, parses, resolves and compiles a source file.
pub fn compile_source(source: &str) -> Result<BytecodeProgram, DecafError> {
    let tokens = Lexer::new(source).tokenize()?;
    debug!(tokens = tokens.len(), "lexed source");

    let program = Parser::new(tokens).parse()?;
    debug!(
        declarations = program.declarations.len(),
        nodes = program.node_count,
        "parsed program"
    );

    let resolved = sema::resolve(&program)?;
    debug!(
        globals = resolved.globals.len(),
        functions = resolved.functions.len(),
        "resolved program"
    );

    let compiled = bytecode::compile::compile(&resolved)?;
    debug!(
        functions = compiled.functions.len(),
        code_bytes = compiled.code_size(),
        "compiled program"
    );
    Ok(compiled)
}

/// Runs `program` and returns the printed lines.
pub fn run(program: &BytecodeProgram, trace: bool) -> Result<Vec<String>, RuntimeError> {
    run_with_config(
        program,
        VmConfig {
            trace,
            ..Default::default()
        },
    )
}

/// Runs `program`. On failure, lines printed before the fault are kept in
/// [`RuntimeError::output`].
pub fn run_with_config(
    program: &BytecodeProgram,
    config: VmConfig,
) -> Result<Vec<String>, RuntimeError> {
    let mut vm = Vm::with_config(program, config);
    vm.run()?;
    Ok(vm.into_output())
}

/// Human-readable listing of every function.
pub fn disassemble(program: &BytecodeProgram) -> String {
    bytecode::disasm::disassemble(program)
}
