//! Type checking
//!
//! This module is responsible for checking declaration/use rules and the
//! types of all expressions. It rewrites the untyped AST into a typed one
//! so the lowerer can lean on the type of every expression. The main
//! interface is the [type_check] function.
//!
//! Unlike the parser, the checker never stops early: it visits the entire
//! program and accumulates as many diagnostics as it can. An expression it
//! could not type becomes [`Type::Unknown`], which silences follow-up
//! errors about the same subtree.

use std::collections::HashMap;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::{
    BinaryOp, Block, Expression, ExpressionKind, NoContext, Parameter, Statement, StatementKind,
    TypedProgram, UnaryOp, UntypedProgram,
};
use crate::common::Type;
use crate::parsing::symbol_table::{SymbolCategory, SymbolInfo, SymbolTable};
use crate::parsing::Token;

/// A semantic rule violation with the position of the offending token
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{message}")]
pub struct SemanticError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub lexeme: String,

    #[label("here")]
    pub span: SourceSpan,
}

impl SemanticError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
            lexeme: token.lexeme.clone(),
            span: (token.offset, token.lexeme.len().max(1)).into(),
        }
    }
}

#[derive(Debug, Clone)]
struct FunctionSig {
    params: Vec<Type>,
    return_type: Type,
}

/// Check and store the types of all expressions
pub fn type_check(program: UntypedProgram) -> Result<TypedProgram, Vec<SemanticError>> {
    let mut checker = TypeChecker::new(&program);

    let typed: Vec<Statement<Type>> = program
        .into_iter()
        .map(|statement| checker.check_statement(statement))
        .collect();

    if checker.errors.is_empty() {
        Ok(typed)
    } else {
        Err(checker.errors)
    }
}

/// The main state during type checking
struct TypeChecker {
    symbols: SymbolTable,
    /// Signatures of all user functions, collected up front so calls may
    /// precede definitions
    functions: HashMap<String, FunctionSig>,
    errors: Vec<SemanticError>,
    /// Name and return type of the function being checked; `None` means
    /// top-level code, which becomes the body of the implicit `main`
    current_function: Option<(String, Type)>,
    /// Scope depth at the current function's parameter frame; variable
    /// resolution does not look below it, because the implicit main's
    /// locals have no representation inside other functions
    function_boundary: usize,
}

impl TypeChecker {
    fn new(program: &UntypedProgram) -> Self {
        let mut functions = HashMap::new();
        for statement in program {
            if let StatementKind::FuncDecl {
                name,
                params,
                return_type,
                ..
            } = &statement.kind
            {
                functions.entry(name.clone()).or_insert(FunctionSig {
                    params: params.iter().map(|p| p.typ).collect(),
                    return_type: *return_type,
                });
            }
        }

        Self {
            symbols: SymbolTable::new(),
            functions,
            errors: Vec::new(),
            current_function: None,
            function_boundary: 0,
        }
    }

    fn error(&mut self, message: impl Into<String>, token: &Token) {
        self.errors.push(SemanticError::new(message, token));
    }

    fn resolve_variable(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.resolve_from(self.function_boundary, name)
    }

    fn check_statement(&mut self, statement: Statement<NoContext>) -> Statement<Type> {
        let token = statement.token;
        let kind = match statement.kind {
            StatementKind::VarDecl { typ, name, init } => {
                self.check_var_decl(typ, name, init, &token)
            }

            StatementKind::Assignment { target, value } => {
                let value = self.check_expression(value);
                let target_type = self.check_assignment_target(&target, &token);
                self.check_assignable(target_type, &value, &target);
                StatementKind::Assignment { target, value }
            }

            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let condition = self.check_condition(condition, "if");
                let then_block = self.check_block(then_block);
                let else_block = else_block.map(|block| self.check_block(block));
                StatementKind::If {
                    condition,
                    then_block,
                    else_block,
                }
            }

            StatementKind::While { condition, body } => {
                let condition = self.check_condition(condition, "while");
                let body = self.check_block(body);
                StatementKind::While { condition, body }
            }

            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.symbols.push_scope();
                let init = init.map(|s| Box::new(self.check_statement(*s)));
                let condition = condition.map(|c| self.check_condition(c, "for"));
                let update = update.map(|s| Box::new(self.check_statement(*s)));
                let body = self.check_block(body);
                self.symbols.pop_scope();
                StatementKind::For {
                    init,
                    condition,
                    update,
                    body,
                }
            }

            StatementKind::Return { value } => {
                let value = value.map(|v| self.check_expression(v));
                self.check_return(&value, &token);
                StatementKind::Return { value }
            }

            StatementKind::Block(block) => StatementKind::Block(self.check_block(block)),

            StatementKind::ExprStmt(expression) => {
                StatementKind::ExprStmt(self.check_expression(expression))
            }

            StatementKind::FuncDecl {
                name,
                params,
                return_type,
                body,
            } => self.check_func_decl(name, params, return_type, body, &token),
        };

        Statement::new(kind, token)
    }

    fn check_var_decl(
        &mut self,
        typ: Type,
        name: String,
        init: Option<Expression<NoContext>>,
        token: &Token,
    ) -> StatementKind<Type> {
        if typ == Type::Void {
            self.error("Cannot declare variable of type void", token);
        }

        let init = init.map(|expression| {
            let init = self.check_expression(expression);
            self.check_assignable(Some(typ), &init, &name);
            init
        });

        let info = SymbolInfo {
            name: name.clone(),
            category: SymbolCategory::Variable,
            typ,
            line: token.line,
            params: None,
        };
        if self.symbols.declare(info).is_err() {
            self.error(format!("Symbol '{name}' already declared in this scope"), token);
        }

        StatementKind::VarDecl { typ, name, init }
    }

    /// Resolve the target of an assignment, reporting what went wrong
    fn check_assignment_target(&mut self, target: &str, token: &Token) -> Option<Type> {
        let resolved = self
            .resolve_variable(target)
            .map(|info| (info.category, info.typ));
        match resolved {
            Some((SymbolCategory::Variable, typ)) => Some(typ),
            Some(_) => {
                self.error(format!("'{target}' is not a variable"), token);
                None
            }
            None => {
                self.error(format!("Identifier not declared: {target}"), token);
                None
            }
        }
    }

    fn check_assignable(&mut self, target: Option<Type>, value: &Expression<Type>, name: &str) {
        if let Some(target) = target {
            if value.typ != Type::Unknown && !target.accepts(value.typ) {
                self.error(
                    format!(
                        "Cannot assign a value of type {} to '{name}' of type {target}",
                        value.typ
                    ),
                    &value.token,
                );
            }
        }
    }

    fn check_condition(
        &mut self,
        condition: Expression<NoContext>,
        construct: &str,
    ) -> Expression<Type> {
        let condition = self.check_expression(condition);
        if condition.typ != Type::Bool && condition.typ != Type::Unknown {
            self.error(
                format!(
                    "Condition of '{construct}' must be of type bool, got {}",
                    condition.typ
                ),
                &condition.token,
            );
        }
        condition
    }

    fn check_return(&mut self, value: &Option<Expression<Type>>, token: &Token) {
        match (&self.current_function, value) {
            (Some((name, return_type)), Some(value)) => {
                if *return_type == Type::Void {
                    self.error(
                        format!("Function '{name}' has return type void and cannot return a value"),
                        token,
                    );
                } else if value.typ != Type::Unknown && !return_type.accepts(value.typ) {
                    self.error(
                        format!(
                            "Cannot return a value of type {} from function '{name}' with return type {return_type}",
                            value.typ
                        ),
                        &value.token,
                    );
                }
            }
            (Some((name, return_type)), None) => {
                if *return_type != Type::Void {
                    self.error(
                        format!("Function '{name}' must return a value of type {return_type}"),
                        token,
                    );
                }
            }
            // top-level code returns from the implicit main
            (None, Some(value)) => {
                if value.typ != Type::Unknown && !Type::Int.accepts(value.typ) {
                    self.error(
                        format!("Top-level return value must be of type int, got {}", value.typ),
                        &value.token,
                    );
                }
            }
            (None, None) => {}
        }
    }

    fn check_block(&mut self, block: Block<NoContext>) -> Block<Type> {
        self.symbols.push_scope();
        let statements = block
            .statements
            .into_iter()
            .map(|statement| self.check_statement(statement))
            .collect();
        self.symbols.pop_scope();
        Block {
            statements,
            token: block.token,
        }
    }

    fn check_func_decl(
        &mut self,
        name: String,
        params: Vec<Parameter>,
        return_type: Type,
        body: Block<NoContext>,
        token: &Token,
    ) -> StatementKind<Type> {
        if name == "print" {
            self.error("The name 'print' is reserved for the builtin print function", token);
        }

        let info = SymbolInfo {
            name: name.clone(),
            category: SymbolCategory::Function,
            typ: return_type,
            line: token.line,
            params: Some(params.iter().map(|p| p.typ).collect()),
        };
        if let Err(existing) = self.symbols.declare(info) {
            let message = if existing.category == SymbolCategory::Function {
                format!("Function '{name}' is already defined")
            } else {
                format!("Symbol '{name}' already declared in this scope")
            };
            self.error(message, token);
        }

        let enclosing_function = self.current_function.replace((name.clone(), return_type));
        let enclosing_boundary = self.function_boundary;

        self.symbols.push_scope();
        self.function_boundary = self.symbols.depth() - 1;

        for param in &params {
            if param.typ == Type::Void {
                self.error(
                    format!("Parameter '{}' cannot be of type void", param.name),
                    &param.token,
                );
            }
            let info = SymbolInfo {
                name: param.name.clone(),
                category: SymbolCategory::Variable,
                typ: param.typ,
                line: param.token.line,
                params: None,
            };
            if self.symbols.declare(info).is_err() {
                self.error(
                    format!("Symbol '{}' already declared in this scope", param.name),
                    &param.token,
                );
            }
        }

        let body = self.check_block(body);

        self.symbols.pop_scope();
        self.function_boundary = enclosing_boundary;
        self.current_function = enclosing_function;

        if return_type != Type::Void && !block_always_returns(&body) {
            self.error(format!("Function '{name}' does not return on every path"), token);
        }

        StatementKind::FuncDecl {
            name,
            params,
            return_type,
            body,
        }
    }

    fn check_expression(&mut self, expression: Expression<NoContext>) -> Expression<Type> {
        let token = expression.token;
        match expression.kind {
            ExpressionKind::Number(value) => {
                let typ = if value == value.trunc() {
                    Type::Int
                } else {
                    Type::Float
                };
                Expression::new(ExpressionKind::Number(value), token, typ)
            }

            ExpressionKind::Bool(value) => {
                Expression::new(ExpressionKind::Bool(value), token, Type::Bool)
            }

            ExpressionKind::Str(value) => {
                Expression::new(ExpressionKind::Str(value), token, Type::String)
            }

            ExpressionKind::Identifier(name) => {
                let resolved = self
                    .resolve_variable(&name)
                    .map(|info| (info.category, info.typ));
                let typ = match resolved {
                    Some((SymbolCategory::Variable, typ)) => typ,
                    Some(_) => {
                        self.error(
                            format!("'{name}' is a function and cannot be used as a value"),
                            &token,
                        );
                        Type::Unknown
                    }
                    None => {
                        self.error(format!("Identifier not declared: {name}"), &token);
                        Type::Unknown
                    }
                };
                Expression::new(ExpressionKind::Identifier(name), token, typ)
            }

            ExpressionKind::Unary { op, operand } => {
                let operand = self.check_expression(*operand);
                let typ = match op {
                    UnaryOp::Neg => match operand.typ {
                        t if t.is_numeric() => t,
                        Type::Unknown => Type::Unknown,
                        t => {
                            self.error(
                                format!("Operator '-' expects a numeric operand, got {t}"),
                                &token,
                            );
                            Type::Unknown
                        }
                    },
                    UnaryOp::Not => match operand.typ {
                        Type::Bool => Type::Bool,
                        Type::Unknown => Type::Unknown,
                        t => {
                            self.error(
                                format!("Operator '!' expects an operand of type bool, got {t}"),
                                &token,
                            );
                            Type::Unknown
                        }
                    },
                };
                Expression::new(
                    ExpressionKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    token,
                    typ,
                )
            }

            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expression(*lhs);
                let rhs = self.check_expression(*rhs);
                let typ = self.binary_result_type(op, &lhs, &rhs, &token);
                Expression::new(
                    ExpressionKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    token,
                    typ,
                )
            }

            ExpressionKind::Call { callee, args } => {
                let args: Vec<Expression<Type>> = args
                    .into_iter()
                    .map(|arg| self.check_expression(arg))
                    .collect();
                let typ = self.check_call(&callee, &args, &token);
                Expression::new(ExpressionKind::Call { callee, args }, token, typ)
            }

            ExpressionKind::Assign { target, value } => {
                let value = self.check_expression(*value);
                let target_type = self.check_assignment_target(&target, &token);
                self.check_assignable(target_type, &value, &target);
                let typ = target_type.unwrap_or(Type::Unknown);
                Expression::new(
                    ExpressionKind::Assign {
                        target,
                        value: Box::new(value),
                    },
                    token,
                    typ,
                )
            }
        }
    }

    fn binary_result_type(
        &mut self,
        op: BinaryOp,
        lhs: &Expression<Type>,
        rhs: &Expression<Type>,
        token: &Token,
    ) -> Type {
        if lhs.typ == Type::Unknown || rhs.typ == Type::Unknown {
            // a diagnostic was already recorded for the operand
            return if op.is_arithmetic() {
                Type::Unknown
            } else {
                Type::Bool
            };
        }

        if op.is_arithmetic() || op.is_relational() {
            for operand in [lhs, rhs] {
                if !operand.typ.is_numeric() {
                    self.error(
                        format!("Operator '{op}' expects numeric operands, got {}", operand.typ),
                        token,
                    );
                    return if op.is_arithmetic() {
                        Type::Unknown
                    } else {
                        Type::Bool
                    };
                }
            }
            return if op.is_relational() {
                Type::Bool
            } else if lhs.typ == Type::Float || rhs.typ == Type::Float {
                Type::Float
            } else {
                Type::Int
            };
        }

        if op.is_equality() {
            if !lhs.typ.accepts(rhs.typ) && !rhs.typ.accepts(lhs.typ) {
                self.error(
                    format!("Cannot compare values of type {} and {}", lhs.typ, rhs.typ),
                    token,
                );
            }
            return Type::Bool;
        }

        debug_assert!(matches!(op, BinaryOp::And | BinaryOp::Or));
        for operand in [lhs, rhs] {
            if operand.typ != Type::Bool {
                self.error(
                    format!(
                        "Operator '{op}' expects operands of type bool, got {}",
                        operand.typ
                    ),
                    token,
                );
                break;
            }
        }
        Type::Bool
    }

    fn check_call(&mut self, callee: &str, args: &[Expression<Type>], token: &Token) -> Type {
        if callee == "print" {
            if args.len() != 1 {
                self.error(
                    format!("print expects exactly 1 argument, got {}", args.len()),
                    token,
                );
            } else {
                let arg = &args[0];
                if !matches!(
                    arg.typ,
                    Type::Int | Type::Float | Type::String | Type::Unknown
                ) {
                    self.error(
                        format!("print does not support arguments of type {}", arg.typ),
                        &arg.token,
                    );
                }
            }
            return Type::Void;
        }

        let Some(sig) = self.functions.get(callee).cloned() else {
            if self.resolve_variable(callee).is_some() {
                self.error(format!("'{callee}' is not a function"), token);
            } else {
                self.error(format!("Identifier not declared: {callee}"), token);
            }
            return Type::Unknown;
        };

        if args.len() != sig.params.len() {
            self.error(
                format!(
                    "Function '{callee}' expects {} arguments, got {}",
                    sig.params.len(),
                    args.len()
                ),
                token,
            );
            return sig.return_type;
        }

        for (index, (arg, param)) in args.iter().zip(sig.params.iter()).enumerate() {
            if arg.typ != Type::Unknown && !param.accepts(arg.typ) {
                self.error(
                    format!(
                        "Argument {} of '{callee}' expects type {param}, got {}",
                        index + 1,
                        arg.typ
                    ),
                    &arg.token,
                );
            }
        }

        sig.return_type
    }
}

/// Whether a block is guaranteed to execute a `return`
fn block_always_returns(block: &Block<Type>) -> bool {
    block.statements.iter().any(statement_always_returns)
}

fn statement_always_returns(statement: &Statement<Type>) -> bool {
    match &statement.kind {
        StatementKind::Return { .. } => true,
        StatementKind::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => block_always_returns(then_block) && block_always_returns(else_block),
        StatementKind::Block(block) => block_always_returns(block),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;

    fn check(src: &str) -> Result<TypedProgram, Vec<SemanticError>> {
        type_check(parse(src).expect("test source must parse"))
    }

    fn first_error(src: &str) -> SemanticError {
        check(src).unwrap_err().into_iter().next().unwrap()
    }

    #[test]
    fn undeclared_identifier_with_position() {
        let error = first_error("x = 1;");
        assert_eq!(error.message, "Identifier not declared: x");
        assert_eq!((error.line, error.column), (1, 1));
    }

    #[test]
    fn numeric_widening_is_accepted_both_ways() {
        assert!(check("float y = 1 + 2.5;").is_ok());
        assert!(check("int x = 2.5;").is_ok());
    }

    #[test]
    fn bool_is_not_assignable_to_int() {
        let error = first_error("int x = true;");
        assert!(error.message.contains("Cannot assign a value of type bool"));
    }

    #[test]
    fn conditions_must_be_bool() {
        let error = first_error("if (1) { }");
        assert_eq!(error.message, "Condition of 'if' must be of type bool, got int");
        assert!(check("while (1 + 2) { }").is_err());
        assert!(check("for (; 3; ) { }").is_err());
        assert!(check("int n = 0; while (n < 3) { n = n + 1; }").is_ok());
    }

    #[test]
    fn arithmetic_requires_numbers() {
        let error = first_error("int x = 1 + true;");
        assert_eq!(error.message, "Operator '+' expects numeric operands, got bool");
    }

    #[test]
    fn logical_operators_require_bools() {
        let error = first_error("bool b = 1 && true;");
        assert_eq!(error.message, "Operator '&&' expects operands of type bool, got int");
    }

    #[test]
    fn equality_requires_compatible_operands() {
        let error = first_error("bool b = 1 == \"one\";");
        assert_eq!(error.message, "Cannot compare values of type int and string");
        assert!(check("bool b = 1 == 2.5;").is_ok());
        assert!(check("bool b = \"a\" == \"b\";").is_ok());
    }

    #[test]
    fn unary_operator_typing() {
        assert!(check("int x = -3; bool b = !true;").is_ok());
        assert!(check("bool b = !3;").is_err());
        assert!(check("int x = -true;").is_err());
    }

    #[test]
    fn print_accepts_int_float_and_string_only() {
        assert!(check("print(1);").is_ok());
        assert!(check("print(1.5);").is_ok());
        assert!(check("print(\"hi\");").is_ok());

        let error = first_error("print(true);");
        assert_eq!(error.message, "print does not support arguments of type bool");

        let error = first_error("print(1, 2);");
        assert_eq!(error.message, "print expects exactly 1 argument, got 2");
    }

    #[test]
    fn call_arity_and_argument_types() {
        let src = "func add(int a, int b) int { return a + b; }\n";
        assert!(check(&format!("{src}int r = add(2, 3);")).is_ok());
        assert!(check(&format!("{src}int r = add(2, 3.5);")).is_ok());

        let error = first_error(&format!("{src}int r = add(2);"));
        assert_eq!(error.message, "Function 'add' expects 2 arguments, got 1");

        let error = first_error(&format!("{src}int r = add(2, \"x\");"));
        assert_eq!(error.message, "Argument 2 of 'add' expects type int, got string");
    }

    #[test]
    fn calls_may_precede_the_definition() {
        assert!(check("int r = double(2);\nfunc double(int n) int { return n * 2; }").is_ok());
    }

    #[test]
    fn missing_return_is_flagged() {
        let error = first_error("func f() int { int x = 1; }");
        assert_eq!(error.message, "Function 'f' does not return on every path");

        assert!(check("func f(int n) int { if (n > 0) { return 1; } else { return 0; } }").is_ok());
        assert!(check("func f(int n) int { if (n > 0) { return 1; } }").is_err());
        assert!(check("func f() void { }").is_ok());
    }

    #[test]
    fn return_type_rules() {
        assert!(check("func f() void { return; }").is_ok());
        let error = first_error("func f() void { return 1; }");
        assert!(error.message.contains("cannot return a value"));

        let error = first_error("func f() int { return \"x\"; }");
        assert!(error.message.contains("Cannot return a value of type string"));

        let error = first_error("func f() int { return; }");
        assert_eq!(error.message, "Function 'f' must return a value of type int");
    }

    #[test]
    fn top_level_return_is_the_implicit_mains() {
        assert!(check("return;").is_ok());
        assert!(check("return 0;").is_ok());
        assert!(check("return \"x\";").is_err());
    }

    #[test]
    fn void_variables_and_parameters_are_rejected() {
        assert!(check("void v;").is_err());
        assert!(check("func f(void v) int { return 0; }").is_err());
    }

    #[test]
    fn duplicate_functions_are_rejected() {
        let error = first_error("func f() void { }\nfunc f() void { }");
        assert_eq!(error.message, "Function 'f' is already defined");
    }

    #[test]
    fn print_cannot_be_redefined() {
        let error = first_error("func print(int n) void { }");
        assert_eq!(
            error.message,
            "The name 'print' is reserved for the builtin print function"
        );
    }

    #[test]
    fn top_level_variables_are_invisible_inside_functions() {
        let error = first_error("int g = 1;\nfunc f() int { return g; }");
        assert_eq!(error.message, "Identifier not declared: g");
    }

    #[test]
    fn functions_are_not_values() {
        let error = first_error("func f() int { return 0; }\nint x = f + 1;");
        assert_eq!(error.message, "'f' is a function and cannot be used as a value");
    }

    #[test]
    fn all_errors_are_collected_in_one_pass() {
        let errors = check("x = 1;\ny = 2;\nprint(true);").unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn expressions_carry_their_types() {
        let program = check("float y = 1 + 2.5;").unwrap();
        let StatementKind::VarDecl { init: Some(init), .. } = &program[0].kind else {
            panic!("expected declaration");
        };
        assert_eq!(init.typ, Type::Float);
        let ExpressionKind::Binary { lhs, rhs, .. } = &init.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(lhs.typ, Type::Int);
        assert_eq!(rhs.typ, Type::Float);
    }
}
