use super::span::Span;

/// Dense identity of a syntax node.
///
/// Assigned by the parser in creation order, starting at zero. Resolver side
/// tables are plain vectors indexed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arithmetic operators supported by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// An expression together with its identity and source range.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ───────────────────────────── Literals ─────────────────────────────
    /// Integer literal.
    ///
    /// Stack effect: `( -- n )`
    Int(i64),

    // ───────────────────────────── Variables ────────────────────────────
    /// Read of a named variable.
    ///
    /// Stack effect: `( -- value )`
    Var { name: String, name_span: Span },

    /// Assignment to a named variable. Evaluates to the stored value.
    ///
    /// Stack effect: `( -- value )`
    Assign {
        name: String,
        name_span: Span,
        value: Box<Expr>,
    },

    // ──────────────────────────── Arithmetic ────────────────────────────
    /// Binary arithmetic. The left operand is evaluated first.
    ///
    /// Stack effect: `( -- a op b )`
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    // ─────────────────────────────── Calls ──────────────────────────────
    /// Call of a top-level function by name. Arguments are evaluated left
    /// to right.
    ///
    /// Stack effect: `( -- result )`
    Call {
        callee: String,
        callee_span: Span,
        args: Vec<Expr>,
    },
}

/// `let`/`var` declaration, at top level or inside a block.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub id: NodeId,
    pub name: String,
    pub name_span: Span,
    pub mutable: bool,
    pub initializer: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub span: Span,
}

/// Braced statement list. Opens a new lexical scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

impl FunctionDecl {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Var(VarDecl),
    Function(FunctionDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Var(decl) => &decl.name,
            Decl::Function(decl) => &decl.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Decl::Var(decl) => decl.span,
            Decl::Function(decl) => decl.span,
        }
    }
}

/// Statements. Every compiled statement leaves the operand stack depth
/// unchanged; a local declaration moves its initializer into a frame slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var(VarDecl),
    Block(Block),
    /// Expression evaluated for its side effects; the result is dropped.
    Expr { expr: Expr, span: Span },
    Print { expr: Expr, span: Span },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Return { value: Expr, span: Span },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var(decl) => decl.span,
            Stmt::Block(block) => block.span,
            Stmt::Expr { span, .. }
            | Stmt::Print { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. } => *span,
        }
    }
}
