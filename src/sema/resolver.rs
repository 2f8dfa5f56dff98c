use std::collections::HashMap;

use crate::lang::node::{Block, Decl, Expr, ExprKind, FunctionDecl, NodeId, Stmt, VarDecl};
use crate::lang::program::Program;
use crate::lang::span::Span;
use crate::sema::binding::{Binding, BindingId, FunctionSymbol, GlobalVariable, Storage};
use crate::sema::semantic_error::SemanticError;

/// Global and local slot operands are `u16`.
pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

/// Function indices are `u16` and the synthesized entry function takes the
/// index after the last user function.
pub const MAX_FUNCTIONS: usize = u16::MAX as usize;

/// The `CALL` argument count is a single byte.
pub const MAX_CALL_ARGS: usize = u8::MAX as usize;

/// Output of resolution: symbol tables plus per-node annotations.
///
/// Variable references, assignments and declarations map to a [`Binding`];
/// call expressions map to the [`FunctionSymbol`] they target. Both tables are
/// keyed by the node's [`NodeId`].
#[derive(Debug, Clone)]
pub struct ResolvedProgram<'a> {
    pub program: &'a Program,
    pub globals: Vec<GlobalVariable<'a>>,
    pub functions: Vec<FunctionSymbol<'a>>,
    bindings: Vec<Binding>,
    var_bindings: Vec<Option<BindingId>>,
    call_targets: Vec<Option<usize>>,
}

impl<'a> ResolvedProgram<'a> {
    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id.index())
    }

    /// Binding attached to a variable, assignment or declaration node.
    pub fn binding_of(&self, node: NodeId) -> Option<&Binding> {
        let id = self.var_bindings.get(node.index()).copied().flatten()?;
        self.binding(id)
    }

    /// Function targeted by a call node.
    pub fn call_target(&self, node: NodeId) -> Option<&FunctionSymbol<'a>> {
        let index = self.call_targets.get(node.index()).copied().flatten()?;
        self.functions.get(index)
    }

    pub fn function_named(&self, name: &str) -> Option<&FunctionSymbol<'a>> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Bindings of a function's frame slots in slot order.
    pub fn locals_of(&self, function: &FunctionSymbol<'_>) -> Vec<&Binding> {
        function
            .locals
            .iter()
            .filter_map(|id| self.binding(*id))
            .collect()
    }
}

/// Resolves names in `program` and checks its static rules.
pub fn resolve(program: &Program) -> Result<ResolvedProgram<'_>, SemanticError> {
    Resolver::new(program).resolve()
}

type Scope = HashMap<String, BindingId>;

/// Per-function state while its body is being walked.
struct FunctionContext {
    locals: Vec<BindingId>,
    next_local: usize,
}

pub struct Resolver<'a> {
    program: &'a Program,
    bindings: Vec<Binding>,
    global_scope: Scope,
    globals: Vec<GlobalVariable<'a>>,
    functions: Vec<FunctionSymbol<'a>>,
    functions_by_name: HashMap<&'a str, usize>,
    var_bindings: Vec<Option<BindingId>>,
    call_targets: Vec<Option<usize>>,
    /// Block scopes of the function being resolved, innermost last.
    scopes: Vec<Scope>,
}

impl<'a> Resolver<'a> {
    pub fn new(program: &'a Program) -> Self {
        Resolver {
            program,
            bindings: Vec::new(),
            global_scope: HashMap::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            functions_by_name: HashMap::new(),
            var_bindings: vec![None; program.node_count],
            call_targets: vec![None; program.node_count],
            scopes: Vec::new(),
        }
    }

    pub fn resolve(mut self) -> Result<ResolvedProgram<'a>, SemanticError> {
        self.declare_top_level()?;

        for index in 0..self.globals.len() {
            let decl = self.globals[index].decl;
            self.resolve_expr(&decl.initializer)?;
        }

        for index in 0..self.functions.len() {
            self.resolve_function(index)?;
        }

        Ok(ResolvedProgram {
            program: self.program,
            globals: self.globals,
            functions: self.functions,
            bindings: self.bindings,
            var_bindings: self.var_bindings,
            call_targets: self.call_targets,
        })
    }

    // ───────────────────────────── Declarations ─────────────────────────────

    /// Registers every global and function before any body is looked at, so
    /// declaration order does not matter for lookups.
    fn declare_top_level(&mut self) -> Result<(), SemanticError> {
        let program = self.program;
        for decl in &program.declarations {
            match decl {
                Decl::Var(var) => self.declare_global(var)?,
                Decl::Function(function) => self.declare_function(function)?,
            }
        }
        Ok(())
    }

    fn is_top_level_name(&self, name: &str) -> bool {
        self.global_scope.contains_key(name) || self.functions_by_name.contains_key(name)
    }

    fn declare_global(&mut self, decl: &'a VarDecl) -> Result<(), SemanticError> {
        if self.is_top_level_name(&decl.name) {
            return Err(SemanticError::DuplicateDeclaration {
                name: decl.name.clone(),
                span: decl.name_span,
            });
        }
        let slot = slot_for(self.globals.len(), "global variables", decl.name_span)?;
        let id = self.add_binding(Binding {
            name: decl.name.clone(),
            span: decl.name_span,
            mutable: decl.mutable,
            storage: Storage::Global,
            slot,
        });
        self.global_scope.insert(decl.name.clone(), id);
        self.globals.push(GlobalVariable { decl, binding: id });
        self.record_binding(decl.id, id);
        Ok(())
    }

    fn declare_function(&mut self, decl: &'a FunctionDecl) -> Result<(), SemanticError> {
        if self.is_top_level_name(&decl.name) {
            return Err(SemanticError::DuplicateDeclaration {
                name: decl.name.clone(),
                span: decl.name_span,
            });
        }
        let index = self.functions.len();
        if index >= MAX_FUNCTIONS {
            return Err(SemanticError::TooMany {
                what: "functions",
                limit: MAX_FUNCTIONS,
                span: decl.name_span,
            });
        }
        self.functions.push(FunctionSymbol {
            name: decl.name.clone(),
            index,
            arity: decl.arity(),
            decl,
            locals: Vec::new(),
            max_locals: 0,
        });
        self.functions_by_name.insert(&decl.name, index);
        Ok(())
    }

    // ─────────────────────────────── Functions ──────────────────────────────

    fn resolve_function(&mut self, index: usize) -> Result<(), SemanticError> {
        let decl = self.functions[index].decl;
        let mut context = FunctionContext {
            locals: Vec::new(),
            next_local: 0,
        };

        self.scopes.clear();
        self.scopes.push(Scope::new());
        for param in &decl.params {
            let id = self.declare_local(&mut context, &param.name, param.span, true)?;
            context.locals.push(id);
        }
        self.resolve_block(&decl.body, &mut context)?;
        self.scopes.clear();

        let symbol = &mut self.functions[index];
        symbol.max_locals = context.next_local;
        symbol.locals = context.locals;

        if !block_guarantees_return(&decl.body) {
            return Err(SemanticError::MissingReturn {
                name: decl.name.clone(),
                span: decl.span,
            });
        }
        Ok(())
    }

    fn resolve_block(
        &mut self,
        block: &Block,
        context: &mut FunctionContext,
    ) -> Result<(), SemanticError> {
        self.scopes.push(Scope::new());
        for stmt in &block.statements {
            self.resolve_stmt(stmt, context)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn resolve_stmt(
        &mut self,
        stmt: &Stmt,
        context: &mut FunctionContext,
    ) -> Result<(), SemanticError> {
        match stmt {
            Stmt::Var(decl) => self.resolve_local_var(decl, context),
            Stmt::Block(block) => self.resolve_block(block, context),
            Stmt::Expr { expr, .. } | Stmt::Print { expr, .. } => self.resolve_expr(expr),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(then_branch, context)?;
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch, context)?;
                }
                Ok(())
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(body, context)
            }
            Stmt::Return { value, .. } => self.resolve_expr(value),
        }
    }

    /// The initializer is resolved before the name is declared, so
    /// `let x = x;` refers to an outer `x`.
    fn resolve_local_var(
        &mut self,
        decl: &VarDecl,
        context: &mut FunctionContext,
    ) -> Result<(), SemanticError> {
        self.resolve_expr(&decl.initializer)?;
        let id = self.declare_local(context, &decl.name, decl.name_span, decl.mutable)?;
        context.locals.push(id);
        self.record_binding(decl.id, id);
        Ok(())
    }

    // ────────────────────────────── Expressions ─────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), SemanticError> {
        match &expr.kind {
            ExprKind::Int(_) => Ok(()),
            ExprKind::Var { name, name_span } => {
                let id = self.lookup_or_error(name, *name_span)?;
                self.record_binding(expr.id, id);
                Ok(())
            }
            ExprKind::Assign {
                name,
                name_span,
                value,
            } => {
                let id = self.lookup_or_error(name, *name_span)?;
                if !self.bindings[id.index()].mutable {
                    return Err(SemanticError::ImmutableAssignment {
                        name: name.clone(),
                        span: *name_span,
                    });
                }
                self.resolve_expr(value)?;
                self.record_binding(expr.id, id);
                Ok(())
            }
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Call {
                callee,
                callee_span,
                args,
            } => {
                let Some(&target) = self.functions_by_name.get(callee.as_str()) else {
                    return Err(SemanticError::UnknownFunction {
                        name: callee.clone(),
                        span: *callee_span,
                    });
                };
                let expected = self.functions[target].arity;
                if args.len() != expected {
                    return Err(SemanticError::ArityMismatch {
                        name: callee.clone(),
                        expected,
                        actual: args.len(),
                        span: *callee_span,
                    });
                }
                if args.len() > MAX_CALL_ARGS {
                    return Err(SemanticError::TooMany {
                        what: "call arguments",
                        limit: MAX_CALL_ARGS,
                        span: *callee_span,
                    });
                }
                for arg in args {
                    self.resolve_expr(arg)?;
                }
                self.record_call_target(expr.id, target);
                Ok(())
            }
        }
    }

    // ──────────────────────────────── Scopes ────────────────────────────────

    /// Declares a local in the innermost scope, taking the function's next
    /// unused slot. Shadowing within a scope simply replaces the entry.
    fn declare_local(
        &mut self,
        context: &mut FunctionContext,
        name: &str,
        span: Span,
        mutable: bool,
    ) -> Result<BindingId, SemanticError> {
        let slot = slot_for(context.next_local, "local variables", span)?;
        context.next_local += 1;
        let id = self.add_binding(Binding {
            name: name.to_string(),
            span,
            mutable,
            storage: Storage::Local,
            slot,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
        Ok(id)
    }

    fn lookup(&self, name: &str) -> Option<BindingId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.global_scope.get(name))
            .copied()
    }

    fn lookup_or_error(&self, name: &str, span: Span) -> Result<BindingId, SemanticError> {
        self.lookup(name)
            .ok_or_else(|| SemanticError::UndeclaredVariable {
                name: name.to_string(),
                span,
            })
    }

    // ─────────────────────────────── Tables ─────────────────────────────────

    fn add_binding(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(binding);
        id
    }

    fn record_binding(&mut self, node: NodeId, id: BindingId) {
        if node.index() >= self.var_bindings.len() {
            self.var_bindings.resize(node.index() + 1, None);
        }
        self.var_bindings[node.index()] = Some(id);
    }

    fn record_call_target(&mut self, node: NodeId, target: usize) {
        if node.index() >= self.call_targets.len() {
            self.call_targets.resize(node.index() + 1, None);
        }
        self.call_targets[node.index()] = Some(target);
    }
}

fn slot_for(count: usize, what: &'static str, span: Span) -> Result<u16, SemanticError> {
    u16::try_from(count).map_err(|_| SemanticError::TooMany {
        what,
        limit: MAX_SLOTS,
        span,
    })
}

// ───────────────────────────── Return analysis ──────────────────────────────

/// A block returns on every path when its last statement does.
pub fn block_guarantees_return(block: &Block) -> bool {
    block
        .statements
        .last()
        .is_some_and(stmt_guarantees_return)
}

/// Loops never count, even `while (1)`.
pub fn stmt_guarantees_return(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } => true,
        Stmt::Block(block) => block_guarantees_return(block),
        Stmt::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => stmt_guarantees_return(then_branch) && stmt_guarantees_return(else_branch),
        _ => false,
    }
}
