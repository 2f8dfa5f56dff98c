use thiserror::Error;

use crate::lang::span::Span;

/// A resolution failure. Resolution stops at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    #[error("{span}: duplicate declaration of '{name}'")]
    DuplicateDeclaration { name: String, span: Span },

    #[error("{span}: undeclared variable '{name}'")]
    UndeclaredVariable { name: String, span: Span },

    #[error("{span}: cannot assign to immutable variable '{name}'")]
    ImmutableAssignment { name: String, span: Span },

    #[error("{span}: unknown function '{name}'")]
    UnknownFunction { name: String, span: Span },

    #[error("{span}: function '{name}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
        span: Span,
    },

    #[error("{span}: function '{name}' may exit without returning")]
    MissingReturn { name: String, span: Span },

    /// A count that would not fit the bytecode's fixed-width operands.
    #[error("{span}: too many {what} (limit is {limit})")]
    TooMany {
        what: &'static str,
        limit: usize,
        span: Span,
    },
}

impl SemanticError {
    pub fn span(&self) -> Span {
        match self {
            SemanticError::DuplicateDeclaration { span, .. }
            | SemanticError::UndeclaredVariable { span, .. }
            | SemanticError::ImmutableAssignment { span, .. }
            | SemanticError::UnknownFunction { span, .. }
            | SemanticError::ArityMismatch { span, .. }
            | SemanticError::MissingReturn { span, .. }
            | SemanticError::TooMany { span, .. } => *span,
        }
    }
}
