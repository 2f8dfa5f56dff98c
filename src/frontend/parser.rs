use std::mem;

use crate::frontend::lexer::Spanned;
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::node::{
    BinaryOp, Block, Decl, Expr, ExprKind, FunctionDecl, NodeId, Param, Stmt, VarDecl,
};
use crate::lang::program::Program;
use crate::lang::span::Span;

/// Recursive-descent parser for Decaf.
///
/// The parser consumes the lexer's `Spanned` tokens and produces a `Program`
/// whose top level holds only `fn`, `let` and `var` declarations.
///
/// Notes:
/// - Every expression and variable declaration receives a fresh `NodeId`.
/// - Unary minus has no node of its own; `-e` is parsed as `0 - e`.
/// - A parenthesized expression keeps its inner node but takes the span of
///   the parentheses.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    next_id: u32,
}

impl Parser {
    /// Creates a new parser from lexer output.
    ///
    /// An `Eof` token is appended if the stream does not already end with one,
    /// so the cursor always has a token to look at.
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last(), Some(Spanned { token: Token::Eof, .. })) {
            let span = tokens
                .last()
                .map(|s| Span::new(s.span.end, s.span.end))
                .unwrap_or_default();
            tokens.push(Spanned {
                token: Token::Eof,
                span,
            });
        }
        Parser {
            tokens,
            pos: 0,
            next_id: 0,
        }
    }

    fn current(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    /// Consumes the current token and returns it. Never moves past `Eof`.
    fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        spanned
    }

    /// Compares token kinds, ignoring payloads.
    fn check(&self, kind: &Token) -> bool {
        mem::discriminant(self.peek()) == mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &Token, message: &str) -> Result<Spanned, ParserError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn consume_ident(&mut self, message: &str) -> Result<(String, Span), ParserError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.error(message)),
        }
    }

    /// Error at the current token, naming what was found there.
    fn error(&self, message: &str) -> ParserError {
        let current = self.current();
        Self::error_at(
            current.span,
            format!("{}, found {}", message, current.token.describe()),
        )
    }

    fn error_at(span: Span, message: impl Into<String>) -> ParserError {
        ParserError {
            message: message.into(),
            line: span.start.line,
            col: span.start.col,
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.next_id(),
            kind,
            span,
        }
    }

    /// Parses a complete Decaf program.
    ///
    /// Only declarations may appear at top level; a stray statement is an
    /// error.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut declarations = Vec::new();

        while !self.is_at_end() {
            match self.peek() {
                Token::Fn => declarations.push(Decl::Function(self.parse_function()?)),
                Token::Let | Token::Var => declarations.push(Decl::Var(self.parse_var_decl()?)),
                _ => return Err(self.error("expected function or variable declaration")),
            }
        }

        let span = declarations
            .iter()
            .map(Decl::span)
            .reduce(Span::merge)
            .unwrap_or(self.current().span);

        Ok(Program {
            declarations,
            span,
            node_count: self.next_id as usize,
        })
    }

    /// ```text
    /// fn <name> ( <param>, ... ) { <body> }
    /// ```
    fn parse_function(&mut self) -> Result<FunctionDecl, ParserError> {
        let keyword = self.advance(); // consume 'fn'
        let (name, name_span) = self.consume_ident("expected function name")?;
        self.consume(&Token::LParen, "expected '(' after function name")?;

        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let (name, span) = self.consume_ident("expected parameter name")?;
                params.push(Param { name, span });
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.consume(&Token::RParen, "expected ')' after parameters")?;

        let body = self.parse_block()?;
        let span = keyword.span.merge(body.span);

        Ok(FunctionDecl {
            name,
            name_span,
            params,
            body,
            span,
        })
    }

    /// ```text
    /// let <name> = <expr> ;
    /// var <name> = <expr> ;
    /// ```
    fn parse_var_decl(&mut self) -> Result<VarDecl, ParserError> {
        let keyword = self.advance(); // consume 'let' or 'var'
        let mutable = keyword.token == Token::Var;
        let (name, name_span) = self.consume_ident("expected variable name")?;
        self.consume(&Token::Equal, "expected '=' after variable name")?;
        let initializer = self.parse_expression()?;
        let semicolon = self.consume(
            &Token::Semicolon,
            "expected ';' after variable declaration",
        )?;

        Ok(VarDecl {
            id: self.next_id(),
            name,
            name_span,
            mutable,
            initializer,
            span: keyword.span.merge(semicolon.span),
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParserError> {
        let open = self.consume(&Token::LBrace, "expected '{' to start block")?;
        let mut statements = Vec::new();

        while !self.check(&Token::RBrace) && !self.is_at_end() {
            if matches!(self.peek(), Token::Let | Token::Var) {
                statements.push(Stmt::Var(self.parse_var_decl()?));
            } else {
                statements.push(self.parse_statement()?);
            }
        }

        let close = self.consume(&Token::RBrace, "expected '}' after block")?;
        Ok(Block {
            statements,
            span: open.span.merge(close.span),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParserError> {
        match self.peek() {
            Token::Print => {
                let keyword = self.advance();
                let expr = self.parse_expression()?;
                let semicolon =
                    self.consume(&Token::Semicolon, "expected ';' after print statement")?;
                Ok(Stmt::Print {
                    expr,
                    span: keyword.span.merge(semicolon.span),
                })
            }
            Token::If => self.parse_if(),
            Token::While => {
                let keyword = self.advance();
                self.consume(&Token::LParen, "expected '(' after 'while'")?;
                let condition = self.parse_expression()?;
                self.consume(&Token::RParen, "expected ')' after while condition")?;
                let body = self.parse_statement()?;
                let span = keyword.span.merge(body.span());
                Ok(Stmt::While {
                    condition,
                    body: Box::new(body),
                    span,
                })
            }
            Token::Return => {
                let keyword = self.advance();
                let value = self.parse_expression()?;
                let semicolon =
                    self.consume(&Token::Semicolon, "expected ';' after return value")?;
                Ok(Stmt::Return {
                    value,
                    span: keyword.span.merge(semicolon.span),
                })
            }
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expression()?;
                let semicolon = self.consume(&Token::Semicolon, "expected ';' after expression")?;
                let span = expr.span.merge(semicolon.span);
                Ok(Stmt::Expr { expr, span })
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParserError> {
        let keyword = self.advance(); // consume 'if'
        self.consume(&Token::LParen, "expected '(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.consume(&Token::RParen, "expected ')' after if condition")?;

        let then_branch = self.parse_statement()?;
        let mut span = keyword.span.merge(then_branch.span());

        let else_branch = if self.match_token(&Token::Else) {
            let else_stmt = self.parse_statement()?;
            span = span.merge(else_stmt.span());
            Some(Box::new(else_stmt))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch,
            span,
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, ParserError> {
        self.parse_assignment()
    }

    /// Right-associative; the target must be a bare variable name.
    fn parse_assignment(&mut self) -> Result<Expr, ParserError> {
        let target = self.parse_term()?;

        if self.check(&Token::Equal) {
            let equals = self.advance();
            let value = self.parse_assignment()?;
            return match target.kind {
                ExprKind::Var { name, name_span } => {
                    let span = target.span.merge(value.span);
                    Ok(self.expr(
                        ExprKind::Assign {
                            name,
                            name_span,
                            value: Box::new(value),
                        },
                        span,
                    ))
                }
                _ => Err(Self::error_at(equals.span, "invalid assignment target")),
            };
        }

        Ok(target)
    }

    fn parse_term(&mut self) -> Result<Expr, ParserError> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParserError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn binary(&mut self, left: Expr, op: BinaryOp, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        self.expr(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParserError> {
        if self.check(&Token::Minus) {
            let minus = self.advance();
            let operand = self.parse_unary()?;
            let zero = self.expr(ExprKind::Int(0), minus.span);
            let mut negated = self.binary(zero, BinaryOp::Sub, operand);
            negated.span = minus.span.merge(negated.span);
            return Ok(negated);
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Result<Expr, ParserError> {
        let mut expr = self.parse_primary()?;

        while self.check(&Token::LParen) {
            let open = self.advance();
            let (callee, callee_span) = match expr.kind {
                ExprKind::Var { name, name_span } => (name, name_span),
                _ => return Err(Self::error_at(expr.span, "can only call functions by name")),
            };

            let mut args = Vec::new();
            if !self.check(&Token::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.match_token(&Token::Comma) {
                        break;
                    }
                }
            }
            let close = self.consume(&Token::RParen, "expected ')' after arguments")?;

            let span = expr.span.merge(open.span).merge(close.span);
            expr = self.expr(
                ExprKind::Call {
                    callee,
                    callee_span,
                    args,
                },
                span,
            );
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParserError> {
        match self.peek().clone() {
            Token::Integer(value) => {
                let span = self.advance().span;
                Ok(self.expr(ExprKind::Int(value), span))
            }
            Token::Ident(name) => {
                let span = self.advance().span;
                Ok(self.expr(
                    ExprKind::Var {
                        name,
                        name_span: span,
                    },
                    span,
                ))
            }
            Token::LParen => {
                let open = self.advance();
                let mut expr = self.parse_expression()?;
                let close = self.consume(&Token::RParen, "expected ')' after expression")?;
                expr.span = open.span.merge(close.span);
                Ok(expr)
            }
            _ => Err(self.error("expected expression")),
        }
    }
}
