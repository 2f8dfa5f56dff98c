//! # Decaf Abstract Syntax Tree
//!
//! This module defines the syntax tree for the Decaf language. The tree is
//! produced by the parser and consumed by the resolver and the bytecode
//! compiler.
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )` and describe the code
//!   the compiler emits for a node.
//! - Every expression and every variable declaration carries a [`node::NodeId`]
//!   so later passes can attach resolved facts in side tables.

pub mod node;
pub mod program;
pub mod span;
