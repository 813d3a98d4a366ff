//! Parser
//!
//! A recursive-descent parser over the token buffer. Binary operators are
//! parsed with a precedence ladder (all left-associative), assignment is
//! right-associative. The parser populates a [`SymbolTable`] while it
//! goes, collects position-annotated errors instead of failing, and
//! resynchronises on statement boundaries so one mistake produces one
//! diagnostic.

use crate::ast::{
    BinaryOp, Block, Expression, ExpressionKind, NoContext, Parameter, Statement, StatementKind,
    UnaryOp, UntypedProgram,
};
use crate::common::Type;

use super::symbol_table::{SymbolCategory, SymbolInfo, SymbolTable};
use super::token::{Token, TokenKind};
use super::ParseError;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseError>,
    symbols: SymbolTable,
    eof: Token,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = tokens
            .last()
            .filter(|t| t.kind == TokenKind::Eof)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, "", 1, 1, 0));
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
            symbols: SymbolTable::new(),
            eof,
        }
    }

    /// Parse the whole buffer into top-level statements plus an error list
    pub fn parse(mut self) -> (UntypedProgram, Vec<ParseError>) {
        let mut program = Vec::new();
        while !self.check(TokenKind::Eof) {
            debug_assert_eq!(self.symbols.depth(), 1);
            let before = self.current;
            if let Some(statement) = self.parse_top_level() {
                program.push(statement);
            }
            if self.current == before {
                self.advance();
            }
        }
        (program, self.errors)
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.current).unwrap_or(&self.eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_token().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        if self.current < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn error(&mut self, message: impl Into<String>, token: &Token) {
        self.errors.push(ParseError::new(message, token));
    }

    /// Record an "expected X" error at the current token
    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let token = self.current_token().clone();
            self.error(
                format!("Expected {what}, found '{}'", token.describe()),
                &token,
            );
            None
        }
    }

    /// Consume tokens up to (not past) any member of `kinds`
    fn skip_until(&mut self, kinds: &[TokenKind]) {
        while !self.check(TokenKind::Eof) && !kinds.contains(&self.current_token().kind) {
            self.advance();
        }
    }

    /// Resynchronise after a failed statement, eating a trailing `;`
    fn synchronize(&mut self) {
        self.skip_until(&[TokenKind::Semicolon, TokenKind::RBrace]);
        self.match_kind(TokenKind::Semicolon);
    }

    fn parse_top_level(&mut self) -> Option<Statement<NoContext>> {
        if self.check(TokenKind::Func) {
            self.parse_func_decl()
        } else {
            self.parse_terminated_statement()
        }
    }

    /// A statement followed by its optional `;` terminator
    fn parse_terminated_statement(&mut self) -> Option<Statement<NoContext>> {
        match self.parse_statement() {
            Some(statement) => {
                self.match_kind(TokenKind::Semicolon);
                Some(statement)
            }
            None => {
                self.synchronize();
                None
            }
        }
    }

    fn parse_statement(&mut self) -> Option<Statement<NoContext>> {
        match self.current_token().kind {
            TokenKind::Type => self.parse_var_decl(),
            TokenKind::Ident
            | TokenKind::Number
            | TokenKind::Str
            | TokenKind::Bool
            | TokenKind::LParen
            | TokenKind::Minus
            | TokenKind::Bang => self.parse_assign_or_expr(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                let token = block.token.clone();
                Some(Statement::new(StatementKind::Block(block), token))
            }
            TokenKind::Illegal => {
                let token = self.advance();
                self.error(format!("Invalid token: {}", token.lexeme), &token);
                None
            }
            _ => {
                let token = self.advance();
                self.error(format!("Unexpected token '{}'", token.describe()), &token);
                None
            }
        }
    }

    fn parse_var_decl(&mut self) -> Option<Statement<NoContext>> {
        let type_token = self.advance();
        let typ = Type::from_name(&type_token.lexeme).unwrap_or(Type::Unknown);

        let name_token = self.expect(TokenKind::Ident, "a variable name")?;
        let name = name_token.lexeme.clone();

        let init = if self.match_kind(TokenKind::Assign).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.declare_variable(&name, typ, &name_token);

        Some(Statement::new(
            StatementKind::VarDecl { typ, name, init },
            name_token,
        ))
    }

    fn declare_variable(&mut self, name: &str, typ: Type, token: &Token) {
        let info = SymbolInfo {
            name: name.to_string(),
            category: SymbolCategory::Variable,
            typ,
            line: token.line,
            params: None,
        };
        if self.symbols.declare(info).is_err() {
            self.error(
                format!("Symbol '{name}' already declared in this scope"),
                token,
            );
        }
    }

    /// Expression-led statements: an assignment or a bare expression
    fn parse_assign_or_expr(&mut self) -> Option<Statement<NoContext>> {
        let expression = self.parse_expression()?;
        let token = expression.token.clone();
        match expression.kind {
            ExpressionKind::Assign { target, value } => Some(Statement::new(
                StatementKind::Assignment {
                    target,
                    value: *value,
                },
                token,
            )),
            _ => Some(Statement::new(StatementKind::ExprStmt(expression), token)),
        }
    }

    fn parse_if(&mut self) -> Option<Statement<NoContext>> {
        let if_token = self.advance();

        // both `if (cond)` and `if cond` are accepted
        let condition = if self.match_kind(TokenKind::LParen).is_some() {
            let condition = self.parse_expression()?;
            self.expect(TokenKind::RParen, "')' after if condition")?;
            condition
        } else {
            self.parse_expression()?
        };

        let then_block = self.parse_block()?;
        let else_block = if self.match_kind(TokenKind::Else).is_some() {
            Some(self.parse_block()?)
        } else {
            None
        };

        Some(Statement::new(
            StatementKind::If {
                condition,
                then_block,
                else_block,
            },
            if_token,
        ))
    }

    fn parse_while(&mut self) -> Option<Statement<NoContext>> {
        let while_token = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after while condition")?;
        let body = self.parse_block()?;

        Some(Statement::new(
            StatementKind::While { condition, body },
            while_token,
        ))
    }

    fn parse_for(&mut self) -> Option<Statement<NoContext>> {
        let for_token = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'for'")?;

        // the loop header gets its own scope so `for (int i = 0; ...)`
        // does not leak into the surrounding one
        self.symbols.push_scope();
        let result = self.parse_for_header_and_body(for_token);
        self.symbols.pop_scope();
        result
    }

    fn parse_for_header_and_body(&mut self, for_token: Token) -> Option<Statement<NoContext>> {
        let init = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };
        self.expect(TokenKind::Semicolon, "';' after for initializer")?;

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after for condition")?;

        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };
        self.expect(TokenKind::RParen, "')' after for clauses")?;

        let body = self.parse_block()?;

        Some(Statement::new(
            StatementKind::For {
                init,
                condition,
                update,
                body,
            },
            for_token,
        ))
    }

    fn parse_return(&mut self) -> Option<Statement<NoContext>> {
        let return_token = self.advance();
        let value = if matches!(
            self.current_token().kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        Some(Statement::new(StatementKind::Return { value }, return_token))
    }

    fn parse_func_decl(&mut self) -> Option<Statement<NoContext>> {
        self.advance();
        let name_token = self.expect(TokenKind::Ident, "a function name")?;
        let name = name_token.lexeme.clone();

        self.expect(TokenKind::LParen, "'(' after function name")?;
        let params = self.parse_params()?;
        let return_token = self.expect(TokenKind::Type, "a return type")?;
        let return_type = Type::from_name(&return_token.lexeme).unwrap_or(Type::Unknown);

        // the function itself lives in the enclosing frame, its parameters
        // in a fresh one wrapping the body
        let info = SymbolInfo {
            name: name.clone(),
            category: SymbolCategory::Function,
            typ: return_type,
            line: name_token.line,
            params: Some(params.iter().map(|p| p.typ).collect()),
        };
        if self.symbols.declare(info).is_err() {
            self.error(
                format!("Symbol '{name}' already declared in this scope"),
                &name_token,
            );
        }

        self.symbols.push_scope();
        for param in &params {
            let name = param.name.clone();
            let typ = param.typ;
            let token = param.token.clone();
            self.declare_variable(&name, typ, &token);
        }
        let body = self.parse_block();
        self.symbols.pop_scope();

        Some(Statement::new(
            StatementKind::FuncDecl {
                name,
                params,
                return_type,
                body: body?,
            },
            name_token,
        ))
    }

    fn parse_params(&mut self) -> Option<Vec<Parameter>> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let type_token = self.expect(TokenKind::Type, "a parameter type")?;
                let typ = Type::from_name(&type_token.lexeme).unwrap_or(Type::Unknown);
                let name_token = self.expect(TokenKind::Ident, "a parameter name")?;
                params.push(Parameter {
                    typ,
                    name: name_token.lexeme.clone(),
                    token: name_token,
                });
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;
        Some(params)
    }

    fn parse_block(&mut self) -> Option<Block<NoContext>> {
        let brace_token = self.expect(TokenKind::LBrace, "'{'")?;
        self.symbols.push_scope();

        let mut statements = Vec::new();
        // bound the loop so pathological input cannot spin forever
        let mut fuel = 2 * (self.tokens.len() - self.current) + 4;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) && fuel > 0 {
            let before = self.current;
            if let Some(statement) = self.parse_terminated_statement() {
                statements.push(statement);
            }
            if self.current == before {
                self.advance();
            }
            fuel -= 1;
        }

        self.symbols.pop_scope();
        self.expect(TokenKind::RBrace, "'}' to close the block")?;
        Some(Block {
            statements,
            token: brace_token,
        })
    }

    pub fn parse_expression(&mut self) -> Option<Expression<NoContext>> {
        self.parse_assignment()
    }

    /// `assignment = logical-or [ "=" assignment ]`, right-associative
    fn parse_assignment(&mut self) -> Option<Expression<NoContext>> {
        let lhs = self.parse_logical_or()?;

        if self.match_kind(TokenKind::Assign).is_some() {
            let value = self.parse_assignment();
            return match lhs.kind {
                ExpressionKind::Identifier(target) => {
                    let token = lhs.token;
                    Some(Expression::new(
                        ExpressionKind::Assign {
                            target,
                            value: Box::new(value?),
                        },
                        token,
                        NoContext,
                    ))
                }
                _ => {
                    let token = lhs.token.clone();
                    self.error("Expected identifier on left of assignment", &token);
                    // keep going with the right-hand side for further diagnostics
                    value.or(Some(lhs))
                }
            };
        }

        Some(lhs)
    }

    fn parse_logical_or(&mut self) -> Option<Expression<NoContext>> {
        let mut lhs = self.parse_logical_and()?;
        while let Some(op_token) = self.match_kind(TokenKind::OrOr) {
            let rhs = self.parse_logical_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs, op_token);
        }
        Some(lhs)
    }

    fn parse_logical_and(&mut self) -> Option<Expression<NoContext>> {
        let mut lhs = self.parse_equality()?;
        while let Some(op_token) = self.match_kind(TokenKind::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs, op_token);
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expression<NoContext>> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.current_token().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let op_token = self.advance();
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs, op_token);
        }
        Some(lhs)
    }

    fn parse_comparison(&mut self) -> Option<Expression<NoContext>> {
        let mut lhs = self.parse_addition()?;
        loop {
            let op = match self.current_token().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let op_token = self.advance();
            let rhs = self.parse_addition()?;
            lhs = binary(op, lhs, rhs, op_token);
        }
        Some(lhs)
    }

    fn parse_addition(&mut self) -> Option<Expression<NoContext>> {
        let mut lhs = self.parse_multiplication()?;
        loop {
            let op = match self.current_token().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let op_token = self.advance();
            let rhs = self.parse_multiplication()?;
            lhs = binary(op, lhs, rhs, op_token);
        }
        Some(lhs)
    }

    fn parse_multiplication(&mut self) -> Option<Expression<NoContext>> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current_token().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            let op_token = self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs, op_token);
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expression<NoContext>> {
        let op = match self.current_token().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let op_token = self.advance();
        let operand = self.parse_unary()?;
        Some(Expression::new(
            ExpressionKind::Unary {
                op,
                operand: Box::new(operand),
            },
            op_token,
            NoContext,
        ))
    }

    fn parse_primary(&mut self) -> Option<Expression<NoContext>> {
        match self.current_token().kind {
            TokenKind::Number => {
                let token = self.advance();
                match token.lexeme.parse::<f64>() {
                    Ok(value) => Some(Expression::new(
                        ExpressionKind::Number(value),
                        token,
                        NoContext,
                    )),
                    Err(_) => {
                        self.error(format!("Invalid number literal: {}", token.lexeme), &token);
                        None
                    }
                }
            }
            TokenKind::Str => {
                let token = self.advance();
                let value = token.lexeme.clone();
                Some(Expression::new(
                    ExpressionKind::Str(value),
                    token,
                    NoContext,
                ))
            }
            TokenKind::Bool => {
                let token = self.advance();
                let value = token.lexeme == "true";
                Some(Expression::new(
                    ExpressionKind::Bool(value),
                    token,
                    NoContext,
                ))
            }
            TokenKind::Ident => {
                let token = self.advance();
                if self.check(TokenKind::LParen) {
                    self.parse_call(token)
                } else {
                    let name = token.lexeme.clone();
                    Some(Expression::new(
                        ExpressionKind::Identifier(name),
                        token,
                        NoContext,
                    ))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(inner)
            }
            TokenKind::Illegal => {
                let token = self.advance();
                self.error(format!("Invalid token: {}", token.lexeme), &token);
                None
            }
            _ => {
                let token = self.current_token().clone();
                self.error(
                    format!("Unexpected token '{}' in expression", token.describe()),
                    &token,
                );
                None
            }
        }
    }

    fn parse_call(&mut self, name_token: Token) -> Option<Expression<NoContext>> {
        self.advance();
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                match self.parse_expression() {
                    Some(arg) => args.push(arg),
                    None => self.skip_until(&[
                        TokenKind::Comma,
                        TokenKind::RParen,
                        TokenKind::Semicolon,
                    ]),
                }
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after arguments")?;

        let callee = name_token.lexeme.clone();
        Some(Expression::new(
            ExpressionKind::Call { callee, args },
            name_token,
            NoContext,
        ))
    }
}

fn binary(
    op: BinaryOp,
    lhs: Expression<NoContext>,
    rhs: Expression<NoContext>,
    op_token: Token,
) -> Expression<NoContext> {
    Expression::new(
        ExpressionKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        op_token,
        NoContext,
    )
}
