//! Abstract syntax tree
//!
//! The AST is split into expressions and statements, each a closed sum
//! type. Every node carries its originating token so later stages can
//! attach diagnostics to a precise source position.
//!
//! Both node types are generic over a type-annotation context: the parser
//! produces `Expression<NoContext>` and the type checker rewrites the tree
//! into `Expression<Type>` with every expression annotated.

use std::borrow::Cow;
use std::{fmt, io};

use ptree::{print_tree, Style, TreeItem};

use crate::common::Type;
use crate::parsing::Token;

/// Type context of a freshly parsed, unchecked AST
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoContext;

pub type UntypedProgram = Vec<Statement<NoContext>>;
pub type TypedProgram = Vec<Statement<Type>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Expression<C> {
    pub kind: ExpressionKind<C>,
    pub token: Token,
    pub typ: C,
}

impl<C> Expression<C> {
    pub fn new(kind: ExpressionKind<C>, token: Token, typ: C) -> Self {
        Self { kind, token, typ }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind<C> {
    /// A numeric literal; integer-ness is a property of the value
    Number(f64),
    Bool(bool),
    /// A string literal body, quotes stripped, escape pairs kept verbatim
    Str(String),
    Identifier(String),

    Unary {
        op: UnaryOp,
        operand: Box<Expression<C>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression<C>>,
        rhs: Box<Expression<C>>,
    },
    Call {
        callee: String,
        args: Vec<Expression<C>>,
    },
    /// Assignment in expression position (`a = b = 1` nests to the right)
    Assign {
        target: String,
        value: Box<Expression<C>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::NotEq)
    }

    pub fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement<C> {
    pub kind: StatementKind<C>,
    pub token: Token,
}

impl<C> Statement<C> {
    pub fn new(kind: StatementKind<C>, token: Token) -> Self {
        Self { kind, token }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind<C> {
    VarDecl {
        typ: Type,
        name: String,
        init: Option<Expression<C>>,
    },
    Assignment {
        target: String,
        value: Expression<C>,
    },
    If {
        condition: Expression<C>,
        then_block: Block<C>,
        else_block: Option<Block<C>>,
    },
    While {
        condition: Expression<C>,
        body: Block<C>,
    },
    For {
        init: Option<Box<Statement<C>>>,
        condition: Option<Expression<C>>,
        update: Option<Box<Statement<C>>>,
        body: Block<C>,
    },
    Return {
        value: Option<Expression<C>>,
    },
    Block(Block<C>),
    ExprStmt(Expression<C>),
    FuncDecl {
        name: String,
        params: Vec<Parameter>,
        return_type: Type,
        body: Block<C>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub typ: Type,
    pub name: String,
    pub token: Token,
}

/// An ordered statement list with its opening-brace token
#[derive(Debug, Clone, PartialEq)]
pub struct Block<C> {
    pub statements: Vec<Statement<C>>,
    pub token: Token,
}

/// Render a numeric literal the way it was meant: integers without a
/// fractional part, everything else as a float
pub fn format_number(value: f64) -> String {
    if value == value.trunc() && value.is_finite() && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Pretty-print a parsed program as a tree, one top-level statement per root
pub fn print_program(program: &UntypedProgram) -> io::Result<()> {
    for statement in program {
        print_tree(&AstNode::Stmt(statement.clone()))?;
    }
    Ok(())
}

/// Uniform tree node over statements, expressions and blocks for rendering
#[derive(Debug, Clone)]
enum AstNode {
    Stmt(Statement<NoContext>),
    Expr(Expression<NoContext>),
    Block(Block<NoContext>),
}

impl TreeItem for AstNode {
    type Child = AstNode;

    fn write_self<W: io::Write>(&self, f: &mut W, style: &Style) -> io::Result<()> {
        let label = match self {
            AstNode::Stmt(stmt) => match &stmt.kind {
                StatementKind::VarDecl { typ, name, .. } => format!("{typ} {name}"),
                StatementKind::Assignment { target, .. } => format!("{target} ="),
                StatementKind::If { .. } => String::from("if"),
                StatementKind::While { .. } => String::from("while"),
                StatementKind::For { .. } => String::from("for"),
                StatementKind::Return { .. } => String::from("return"),
                StatementKind::Block(_) => String::from("block"),
                StatementKind::ExprStmt(_) => String::from("expr"),
                StatementKind::FuncDecl {
                    name,
                    params,
                    return_type,
                    ..
                } => {
                    let params: Vec<String> = params
                        .iter()
                        .map(|p| format!("{} {}", p.typ, p.name))
                        .collect();
                    format!("func {name}({}) {return_type}", params.join(", "))
                }
            },
            AstNode::Expr(expr) => match &expr.kind {
                ExpressionKind::Number(value) => format_number(*value),
                ExpressionKind::Bool(value) => value.to_string(),
                ExpressionKind::Str(value) => format!("\"{value}\""),
                ExpressionKind::Identifier(name) => name.clone(),
                ExpressionKind::Unary { op, .. } => op.to_string(),
                ExpressionKind::Binary { op, .. } => op.to_string(),
                ExpressionKind::Call { callee, .. } => format!("call {callee}"),
                ExpressionKind::Assign { target, .. } => format!("{target} ="),
            },
            AstNode::Block(_) => String::from("block"),
        };
        write!(f, "{}", style.paint(label))
    }

    fn children(&self) -> Cow<[Self::Child]> {
        let children = match self {
            AstNode::Stmt(stmt) => match &stmt.kind {
                StatementKind::VarDecl { init, .. } => {
                    init.iter().cloned().map(AstNode::Expr).collect()
                }
                StatementKind::Assignment { value, .. } => vec![AstNode::Expr(value.clone())],
                StatementKind::If {
                    condition,
                    then_block,
                    else_block,
                } => {
                    let mut nodes = vec![
                        AstNode::Expr(condition.clone()),
                        AstNode::Block(then_block.clone()),
                    ];
                    if let Some(else_block) = else_block {
                        nodes.push(AstNode::Block(else_block.clone()));
                    }
                    nodes
                }
                StatementKind::While { condition, body } => vec![
                    AstNode::Expr(condition.clone()),
                    AstNode::Block(body.clone()),
                ],
                StatementKind::For {
                    init,
                    condition,
                    update,
                    body,
                } => {
                    let mut nodes = Vec::new();
                    if let Some(init) = init {
                        nodes.push(AstNode::Stmt(init.as_ref().clone()));
                    }
                    if let Some(condition) = condition {
                        nodes.push(AstNode::Expr(condition.clone()));
                    }
                    if let Some(update) = update {
                        nodes.push(AstNode::Stmt(update.as_ref().clone()));
                    }
                    nodes.push(AstNode::Block(body.clone()));
                    nodes
                }
                StatementKind::Return { value } => {
                    value.iter().cloned().map(AstNode::Expr).collect()
                }
                StatementKind::Block(block) => {
                    block.statements.iter().cloned().map(AstNode::Stmt).collect()
                }
                StatementKind::ExprStmt(expr) => vec![AstNode::Expr(expr.clone())],
                StatementKind::FuncDecl { body, .. } => vec![AstNode::Block(body.clone())],
            },
            AstNode::Expr(expr) => match &expr.kind {
                ExpressionKind::Number(_)
                | ExpressionKind::Bool(_)
                | ExpressionKind::Str(_)
                | ExpressionKind::Identifier(_) => vec![],
                ExpressionKind::Unary { operand, .. } => {
                    vec![AstNode::Expr(operand.as_ref().clone())]
                }
                ExpressionKind::Binary { lhs, rhs, .. } => vec![
                    AstNode::Expr(lhs.as_ref().clone()),
                    AstNode::Expr(rhs.as_ref().clone()),
                ],
                ExpressionKind::Call { args, .. } => {
                    args.iter().cloned().map(AstNode::Expr).collect()
                }
                ExpressionKind::Assign { value, .. } => {
                    vec![AstNode::Expr(value.as_ref().clone())]
                }
            },
            AstNode::Block(block) => {
                block.statements.iter().cloned().map(AstNode::Stmt).collect()
            }
        };
        Cow::from(children)
    }
}
