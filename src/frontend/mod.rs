//! Source text to syntax tree: tokens, lexer and recursive-descent parser.

pub mod lexer;
pub mod parser;
pub mod parser_error;
pub mod token;
