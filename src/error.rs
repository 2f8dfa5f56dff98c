use thiserror::Error;

use crate::bytecode::codec::CodecError;
use crate::bytecode::compile_error::CompileError;
use crate::frontend::lexer::LexerError;
use crate::frontend::parser_error::ParserError;
use crate::runtime::RuntimeError;
use crate::sema::SemanticError;

/// Any failure surfaced by the library entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecafError {
    #[error("lex error at {0}")]
    Lexer(#[from] LexerError),

    #[error("parse error at {0}")]
    Parser(#[from] ParserError),

    #[error("semantic error at {0}")]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
