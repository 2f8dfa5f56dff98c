use tracing::debug;

use crate::bytecode::{
    BytecodeFunction, BytecodeProgram, Chunk, Opcode, compile_error::CompileError,
    ir::ENTRY_NAME,
};
use crate::lang::node::{BinaryOp, Block, Expr, ExprKind, NodeId, Stmt, VarDecl};
use crate::sema::{Binding, FunctionSymbol, ResolvedProgram, Storage};

/// Largest constant pool a chunk can address with a `u16` operand.
const MAX_CONSTANTS: usize = u16::MAX as usize + 1;

/// Placeholder operand of a forward jump, waiting for its target.
///
/// Returned by [`Compiler::emit_jump`] and consumed by
/// [`Compiler::patch_jump`], which points the jump at the current end of the
/// chunk.
#[must_use]
#[derive(Debug)]
pub struct JumpPatch {
    operand_offset: usize,
}

/// Lowers a resolved program to bytecode.
pub fn compile(resolved: &ResolvedProgram<'_>) -> Result<BytecodeProgram, CompileError> {
    Compiler::new(resolved).compile()
}

pub struct Compiler<'r, 'a> {
    resolved: &'r ResolvedProgram<'a>,

    /// Chunk of the function currently being compiled
    chunk: Chunk,

    /// Its name, for error messages
    function: String,
}

impl<'r, 'a> Compiler<'r, 'a> {
    pub fn new(resolved: &'r ResolvedProgram<'a>) -> Self {
        Self {
            resolved,
            chunk: Chunk::new(),
            function: String::new(),
        }
    }

    /// Compiles every user function in declaration order, then appends the
    /// entry function.
    pub fn compile(mut self) -> Result<BytecodeProgram, CompileError> {
        let resolved = self.resolved;
        let mut functions = Vec::with_capacity(resolved.functions.len() + 1);

        for symbol in &resolved.functions {
            functions.push(self.compile_function(symbol)?);
        }

        let entry_index = functions.len();
        functions.push(self.compile_entry()?);

        Ok(BytecodeProgram {
            functions,
            globals: vec![0; resolved.globals.len()],
            entry_index,
        })
    }

    fn begin(&mut self, name: &str) {
        self.chunk = Chunk::new();
        self.function = name.to_string();
    }

    fn finish(&mut self) -> Chunk {
        let chunk = std::mem::take(&mut self.chunk);
        debug!(
            function = %self.function,
            bytes = chunk.len(),
            constants = chunk.constants.len(),
            "compiled function"
        );
        chunk
    }

    fn compile_function(
        &mut self,
        symbol: &FunctionSymbol<'_>,
    ) -> Result<BytecodeFunction, CompileError> {
        self.begin(&symbol.name);
        self.compile_block(&symbol.decl.body)?;

        Ok(BytecodeFunction {
            name: symbol.name.clone(),
            chunk: self.finish(),
            arity: symbol.arity,
            num_locals: symbol.max_locals,
        })
    }

    /// ```text
    /// <global initializer>  STORE_GLOBAL g     (per global, in order)
    /// CALL main 0
    /// POP
    /// HALT
    /// ```
    ///
    /// `main` is always called with no arguments.
    fn compile_entry(&mut self) -> Result<BytecodeFunction, CompileError> {
        let resolved = self.resolved;
        self.begin(ENTRY_NAME);

        for global in &resolved.globals {
            let binding = resolved
                .binding(global.binding)
                .ok_or_else(|| CompileError::missing_binding(&global.decl.name))?;
            self.compile_expr(&global.decl.initializer)?;
            self.emit_with_u16(Opcode::StoreGlobal, binding.slot, global.decl.span.line());
        }

        let main = resolved
            .function_named("main")
            .ok_or(CompileError::MissingMain)?;
        let line = main.decl.span.line();
        self.emit_call(main.index, 0, line)?;
        self.emit(Opcode::Pop, line);
        self.emit(Opcode::Halt, line);

        Ok(BytecodeFunction {
            name: ENTRY_NAME.to_string(),
            chunk: self.finish(),
            arity: 0,
            num_locals: 0,
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let line = stmt.span().line();
        match stmt {
            Stmt::Var(decl) => self.compile_var_decl(decl),
            Stmt::Block(block) => self.compile_block(block),
            Stmt::Expr { expr, .. } => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Pop, line);
                Ok(())
            }
            Stmt::Print { expr, .. } => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Print, line);
                Ok(())
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(Opcode::JmpIfFalse, line);
                self.compile_stmt(then_branch)?;

                match else_branch {
                    Some(else_branch) => {
                        let end_jump = self.emit_jump(Opcode::Jmp, line);
                        self.patch_jump(else_jump)?;
                        self.compile_stmt(else_branch)?;
                        self.patch_jump(end_jump)
                    }
                    None => self.patch_jump(else_jump),
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                let loop_start = self.chunk.len();
                self.compile_expr(condition)?;
                let exit_jump = self.emit_jump(Opcode::JmpIfFalse, line);
                self.compile_stmt(body)?;
                self.emit_loop(loop_start, line)?;
                self.patch_jump(exit_jump)
            }
            Stmt::Return { value, .. } => {
                self.compile_expr(value)?;
                self.emit(Opcode::Ret, line);
                Ok(())
            }
        }
    }

    fn compile_var_decl(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        let binding = self.binding_for(decl.id, &decl.name)?;
        self.compile_expr(&decl.initializer)?;
        self.emit_store(binding, decl.span.line());
        Ok(())
    }

    // =========================================================================
    // Expressions: each leaves exactly one value on the stack
    // =========================================================================

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let line = expr.span.line();
        match &expr.kind {
            ExprKind::Int(value) => self.emit_constant(*value, line),
            ExprKind::Var { name, .. } => {
                let binding = self.binding_for(expr.id, name)?;
                self.emit_load(binding, line);
                Ok(())
            }
            ExprKind::Assign { name, value, .. } => {
                let binding = self.binding_for(expr.id, name)?;
                self.compile_expr(value)?;
                self.emit_store(binding, line);
                self.emit_load(binding, line);
                Ok(())
            }
            ExprKind::Binary { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(binary_opcode(*op), line);
                Ok(())
            }
            ExprKind::Call { callee, args, .. } => {
                let resolved = self.resolved;
                let target = resolved
                    .call_target(expr.id)
                    .ok_or_else(|| CompileError::missing_call_target(callee))?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit_call(target.index, args.len(), line)
            }
        }
    }

    fn binding_for(&self, node: NodeId, name: &str) -> Result<&'r Binding, CompileError> {
        let resolved = self.resolved;
        resolved
            .binding_of(node)
            .ok_or_else(|| CompileError::missing_binding(name))
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn emit(&mut self, op: Opcode, line: u32) {
        self.chunk.write_op(op, line);
    }

    fn emit_with_u16(&mut self, op: Opcode, operand: u16, line: u32) {
        self.chunk.write_op(op, line);
        self.chunk.write_u16(operand, line);
    }

    fn emit_constant(&mut self, value: i64, line: u32) -> Result<(), CompileError> {
        if self.chunk.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants {
                function: self.function.clone(),
                limit: MAX_CONSTANTS,
            });
        }
        let index = self.chunk.add_constant(value);
        // bounded by the check above
        self.emit_with_u16(Opcode::PushConst, index as u16, line);
        Ok(())
    }

    fn emit_load(&mut self, binding: &Binding, line: u32) {
        let op = match binding.storage {
            Storage::Global => Opcode::LoadGlobal,
            Storage::Local => Opcode::LoadLocal,
        };
        self.emit_with_u16(op, binding.slot, line);
    }

    fn emit_store(&mut self, binding: &Binding, line: u32) {
        let op = match binding.storage {
            Storage::Global => Opcode::StoreGlobal,
            Storage::Local => Opcode::StoreLocal,
        };
        self.emit_with_u16(op, binding.slot, line);
    }

    fn emit_call(&mut self, function: usize, argc: usize, line: u32) -> Result<(), CompileError> {
        let function = u16::try_from(function)
            .map_err(|_| CompileError::internal(format!("function index {} overflows", function)))?;
        let argc = u8::try_from(argc)
            .map_err(|_| CompileError::internal(format!("argument count {} overflows", argc)))?;
        self.emit_with_u16(Opcode::Call, function, line);
        self.chunk.write(argc, line);
        Ok(())
    }

    /// Emits `op` with a zero placeholder operand.
    pub fn emit_jump(&mut self, op: Opcode, line: u32) -> JumpPatch {
        self.emit(op, line);
        let operand_offset = self.chunk.len();
        self.chunk.write_u16(0, line);
        JumpPatch { operand_offset }
    }

    /// Points a pending jump at the current end of the chunk.
    pub fn patch_jump(&mut self, patch: JumpPatch) -> Result<(), CompileError> {
        let target = self.jump_operand(self.chunk.len())?;
        if !self.chunk.patch_u16(patch.operand_offset, target) {
            return Err(CompileError::internal(format!(
                "jump operand at {} is outside '{}'",
                patch.operand_offset, self.function
            )));
        }
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), CompileError> {
        let target = self.jump_operand(loop_start)?;
        self.emit_with_u16(Opcode::Jmp, target, line);
        Ok(())
    }

    fn jump_operand(&self, target: usize) -> Result<u16, CompileError> {
        u16::try_from(target).map_err(|_| CompileError::JumpTooFar {
            function: self.function.clone(),
            target,
        })
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::sema::resolve;
    use pretty_assertions::assert_eq;

    fn compile_source(source: &str) -> BytecodeProgram {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let resolved = resolve(&program).unwrap();
        compile(&resolved).unwrap()
    }

    fn function<'p>(program: &'p BytecodeProgram, name: &str) -> &'p BytecodeFunction {
        program
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function named {}", name))
    }

    #[test]
    fn test_compile_print_and_return() {
        let program = compile_source("fn main() {\n  print 2 + 3 * 4;\n  return 0;\n}");
        let main = function(&program, "main");

        assert_eq!(main.chunk.constants, vec![2, 3, 4, 0]);
        assert_eq!(
            main.chunk.code,
            vec![0, 0, 0, 0, 0, 1, 0, 0, 2, 7, 5, 13, 0, 0, 3, 12]
        );
        assert_eq!(main.chunk.lines.len(), main.chunk.code.len());
        assert_eq!(main.chunk.line_at(11), Some(2));
        assert_eq!(main.chunk.line_at(15), Some(3));
    }

    #[test]
    fn test_entry_initializes_globals_then_calls_main() {
        let program = compile_source("let g = 10;\nfn main() {\n  return g;\n}");

        assert_eq!(program.entry_index, 1);
        assert_eq!(program.globals, vec![0]);

        let entry = program.entry().unwrap();
        assert_eq!(entry.name, "<entry>");
        assert_eq!((entry.arity, entry.num_locals), (0, 0));
        assert_eq!(entry.chunk.constants, vec![10]);
        assert_eq!(entry.chunk.code, vec![0, 0, 0, 4, 0, 0, 11, 0, 0, 0, 14, 15]);
        // store uses the declaration line, the call uses main's line
        assert_eq!(entry.chunk.line_at(3), Some(1));
        assert_eq!(entry.chunk.line_at(6), Some(2));

        assert_eq!(function(&program, "main").chunk.code, vec![3, 0, 0, 12]);
    }

    #[test]
    fn test_if_else_jump_targets() {
        let program = compile_source("fn main() { if (1) print 2; else print 3; return 0; }");
        assert_eq!(
            function(&program, "main").chunk.code,
            vec![0, 0, 0, 10, 0, 13, 0, 0, 1, 13, 9, 0, 17, 0, 0, 2, 13, 0, 0, 3, 12]
        );
    }

    #[test]
    fn test_if_without_else_patches_to_end() {
        let program =
            compile_source("fn main() { if (1) { print 2; } return 0; }");
        assert_eq!(
            function(&program, "main").chunk.code,
            vec![0, 0, 0, 10, 0, 10, 0, 0, 1, 13, 0, 0, 2, 12]
        );
    }

    #[test]
    fn test_while_loops_back_to_condition() {
        let program = compile_source("fn main() { var i = 3; while (i) i = i - 1; return i; }");
        let main = function(&program, "main");
        assert_eq!(
            main.chunk.code,
            vec![
                0, 0, 0, 2, 0, 0, // var i = 3
                1, 0, 0, 10, 0, 29, // condition, exit jump
                1, 0, 0, 0, 0, 1, 6, 2, 0, 0, 1, 0, 0, 14, // i = i - 1;
                9, 0, 6, // back edge
                1, 0, 0, 12, // return i
            ]
        );
        assert_eq!(main.num_locals, 1);
    }

    #[test]
    fn test_call_and_function_table_order() {
        let program = compile_source(
            "fn add(a, b) { return a + b; } fn main() { return add(1, 2); }",
        );

        let names: Vec<_> = program.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["add", "main", "<entry>"]);
        assert_eq!(program.entry_index, 2);

        let add = function(&program, "add");
        assert_eq!((add.arity, add.num_locals), (2, 2));
        assert_eq!(add.chunk.code, vec![1, 0, 0, 1, 0, 1, 5, 12]);

        assert_eq!(
            function(&program, "main").chunk.code,
            vec![0, 0, 0, 0, 0, 1, 11, 0, 0, 2, 12]
        );
        assert_eq!(
            program.entry().unwrap().chunk.code,
            vec![11, 0, 1, 0, 14, 15]
        );
    }

    #[test]
    fn test_main_with_params_is_still_called_with_zero_args() {
        let program = compile_source("fn main(x) { return x; }");
        assert_eq!(program.entry().unwrap().chunk.code, vec![11, 0, 0, 0, 14, 15]);
    }

    #[test]
    fn test_assignment_stores_then_reloads() {
        let program = compile_source("var g = 0; fn main() { print (g = 5); return 0; }");
        assert_eq!(
            function(&program, "main").chunk.code,
            vec![0, 0, 0, 4, 0, 0, 3, 0, 0, 13, 0, 0, 1, 12]
        );
    }

    #[test]
    fn test_constants_are_not_deduplicated() {
        let program = compile_source("fn main() { print 7; print 7; return 7; }");
        assert_eq!(function(&program, "main").chunk.constants, vec![7, 7, 7]);
    }

    #[test]
    fn test_missing_main() {
        let tokens = Lexer::new("fn helper() { return 1; }").tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let resolved = resolve(&program).unwrap();
        assert_eq!(compile(&resolved), Err(CompileError::MissingMain));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let source = "var g = 2; fn f(n) { if (n) return f(n - 1) * g; else return 1; } \
                      fn main() { print f(5); return 0; }";
        assert_eq!(compile_source(source), compile_source(source));
    }
}
