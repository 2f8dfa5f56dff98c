use super::node::Decl;
use super::span::Span;

/// Parsed Decaf program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level declarations in source order.
    pub declarations: Vec<Decl>,
    pub span: Span,
    /// Upper bound (exclusive) of every `NodeId` in the tree.
    pub node_count: usize,
}
