use crate::lang::node::{FunctionDecl, VarDecl};
use crate::lang::span::Span;

/// Where a binding's value lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Slot in the program-wide global array.
    Global,
    /// Slot relative to the current call frame's base.
    Local,
}

/// Handle into the resolver's binding arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

impl BindingId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved storage location for a named variable.
///
/// Slots always fit the `u16` operand of the load/store instructions; the
/// resolver refuses programs that would need more.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub span: Span,
    pub mutable: bool,
    pub storage: Storage,
    pub slot: u16,
}

impl Binding {
    pub fn is_global(&self) -> bool {
        self.storage == Storage::Global
    }
}

/// A top-level function and the frame layout computed for it.
#[derive(Debug, Clone)]
pub struct FunctionSymbol<'a> {
    pub name: String,
    /// Position among the program's functions, which is also its index in
    /// the bytecode function table.
    pub index: usize,
    pub arity: usize,
    pub decl: &'a FunctionDecl,
    /// Parameters first, then block locals in first-appearance order.
    pub locals: Vec<BindingId>,
    /// Frame size: one slot per entry in `locals`, never reused.
    pub max_locals: usize,
}

/// A top-level `let`/`var` paired with its global slot.
#[derive(Debug, Clone)]
pub struct GlobalVariable<'a> {
    pub decl: &'a VarDecl,
    pub binding: BindingId,
}
