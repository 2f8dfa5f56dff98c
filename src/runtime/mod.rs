//! Bytecode execution.

pub mod config;
pub mod runtime_error;
pub mod vm_bc;

pub use config::VmConfig;
pub use runtime_error::{RuntimeError, RuntimeErrorKind};
pub use vm_bc::Vm;
