//! Name resolution and static checks.
//!
//! The resolver binds every variable use to a global or frame slot, every
//! call to a function index, and rejects programs the compiler cannot lower.

pub mod binding;
pub mod resolver;
pub mod semantic_error;

pub use binding::{Binding, BindingId, FunctionSymbol, GlobalVariable, Storage};
pub use resolver::{ResolvedProgram, resolve};
pub use semantic_error::SemanticError;
