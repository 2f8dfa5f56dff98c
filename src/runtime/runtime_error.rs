use thiserror::Error;

use crate::bytecode::stack_check::StackCheckError;

/// What went wrong while executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("unknown opcode 0x{byte:02x} at {offset:04}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("instruction pointer {ip} out of bounds")]
    IpOutOfBounds { ip: usize },

    #[error("call target {index} out of range")]
    CallTargetOutOfRange { index: usize },

    #[error("function '{name}' arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("function '{name}' has an impossible frame (arity {arity}, {num_locals} locals)")]
    InvalidFrame {
        name: String,
        arity: usize,
        num_locals: usize,
    },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("local slot {slot} out of range")]
    LocalOutOfRange { slot: usize },

    #[error("global slot {slot} out of range")]
    GlobalOutOfRange { slot: usize },

    #[error("constant #{index} out of range")]
    ConstantOutOfRange { index: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("return with empty call stack")]
    ReturnWithoutFrame,

    #[error("execution step limit exceeded ({limit})")]
    StepLimitExceeded { limit: u64 },

    #[error("bytecode rejected: {0}")]
    Verification(StackCheckError),
}

/// A runtime fault plus the active call stack (innermost last).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub call_stack: Vec<String>,
    /// Lines printed before the fault.
    pub output: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn with_call_stack(mut self, call_stack: Vec<String>) -> Self {
        self.call_stack = call_stack;
        self
    }

    pub fn with_output(mut self, output: Vec<String>) -> Self {
        self.output = output;
        self
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}
