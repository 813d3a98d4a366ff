//! Lowering
//!
//! This module translates the type-checked AST into the in-memory IR tree.
//! Every user variable becomes a stack slot (an `alloca` in the entry
//! block of its containing function) with reads and writes lowered to
//! `load`/`store`; no SSA promotion is performed. Control flow becomes
//! labelled basic blocks with explicit terminators.
//!
//! All counters (temporaries, labels, string constants) are fields of the
//! [`Lowerer`] instance, so identical input produces byte-identical IR.

use std::collections::{HashMap, HashSet};

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::{
    BinaryOp, Block, Expression, ExpressionKind, Parameter, Statement, StatementKind, TypedProgram,
    UnaryOp,
};
use crate::common::Type;
use crate::ir::{self, BasicBlock, Instruction, IrType, Terminator};
use crate::parsing::Token;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum LoweringError {
    #[error("print does not support arguments of type {typ}")]
    UnsupportedPrintType {
        typ: Type,
        line: u32,
        column: u32,

        #[label("this argument")]
        span: SourceSpan,
    },

    #[error("Function '{name}' is defined more than once")]
    DuplicateFunction {
        name: String,
        line: u32,
        column: u32,

        #[label("second definition")]
        span: SourceSpan,
    },
}

impl LoweringError {
    pub fn position(&self) -> (u32, u32) {
        match self {
            LoweringError::UnsupportedPrintType { line, column, .. }
            | LoweringError::DuplicateFunction { line, column, .. } => (*line, *column),
        }
    }
}

/// Translate a type-checked program into an IR module
///
/// On any recorded error the module is withheld, so nothing is ever
/// emitted for a broken program.
pub fn lower(program: TypedProgram) -> Result<ir::Module, Vec<LoweringError>> {
    let mut lowerer = Lowerer::new();
    let module = lowerer.lower_program(program);
    if lowerer.errors.is_empty() {
        Ok(module)
    } else {
        Err(lowerer.errors)
    }
}

#[derive(Debug, Clone)]
struct FunctionSig {
    params: Vec<Type>,
    return_type: Type,
}

/// A variable's stack slot
#[derive(Debug, Clone)]
struct Slot {
    register: String,
    typ: Type,
}

/// A lowered expression value: an immediate or an SSA register
#[derive(Debug, Clone)]
struct Operand {
    text: String,
    typ: Type,
}

pub struct Lowerer {
    functions: HashMap<String, FunctionSig>,
    /// Module-global counter behind the `if.then3`-style labels
    label_counter: usize,
    interned: HashMap<Vec<u8>, String>,
    globals: Vec<ir::Global>,
    declares_printf: bool,
    errors: Vec<LoweringError>,
}

/// Per-function lowering state
struct FunctionCtx {
    return_type: Type,
    blocks: Vec<BasicBlock>,
    current: usize,
    temp_counter: usize,
    scopes: Vec<HashMap<String, Slot>>,
    /// How often each variable name was allocated, for shadowing
    slot_counts: HashMap<String, usize>,
}

impl FunctionCtx {
    fn new(return_type: Type) -> Self {
        Self {
            return_type,
            blocks: vec![BasicBlock::new("entry")],
            current: 0,
            temp_counter: 0,
            scopes: vec![HashMap::new()],
            slot_counts: HashMap::new(),
        }
    }

    fn fresh_temp(&mut self) -> String {
        let temp = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        temp
    }

    /// Append to the current block; code after a terminator is unreachable
    /// and silently dropped
    fn append(&mut self, instruction: Instruction) {
        let block = &mut self.blocks[self.current];
        if !block.is_closed() {
            block.instructions.push(instruction);
        }
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current];
        if !block.is_closed() {
            block.terminator = Some(terminator);
        }
    }

    fn new_block(&mut self, label: String) {
        self.blocks.push(BasicBlock::new(label));
        self.current = self.blocks.len() - 1;
    }

    /// Reserve a stack slot in the entry block
    fn alloca(&mut self, name: &str, typ: IrType) -> String {
        let count = self.slot_counts.entry(name.to_string()).or_insert(0);
        let register = if *count == 0 {
            format!("%{name}.slot")
        } else {
            format!("%{name}.slot{count}")
        };
        *count += 1;

        self.blocks[0].instructions.push(Instruction::with_dest(
            "alloca",
            typ,
            register.clone(),
            vec![typ.to_string()],
        ));
        register
    }

    fn declare(&mut self, name: String, slot: Slot) {
        self.scopes
            .last_mut()
            .expect("function scope always exists")
            .insert(name, slot);
    }

    fn lookup(&self, name: &str) -> Option<&Slot> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Seal every open block with the function's default return
    fn finish(mut self) -> Vec<BasicBlock> {
        let return_type = ir_type(self.return_type);
        for block in &mut self.blocks {
            if !block.is_closed() {
                let value = match return_type {
                    IrType::Void => None,
                    typ => Some(typ.zero().to_string()),
                };
                block.terminator = Some(Terminator::Ret {
                    typ: return_type,
                    value,
                });
            }
        }
        self.blocks
    }
}

impl Lowerer {
    fn new() -> Self {
        Self {
            functions: HashMap::new(),
            label_counter: 0,
            interned: HashMap::new(),
            globals: Vec::new(),
            declares_printf: false,
            errors: Vec::new(),
        }
    }

    fn error(&mut self, error: LoweringError) {
        self.errors.push(error);
    }

    fn fresh_label_index(&mut self) -> usize {
        let index = self.label_counter;
        self.label_counter += 1;
        index
    }

    /// Intern a string constant; returns its name and the `[N x i8]` size
    fn intern_string(&mut self, bytes: Vec<u8>) -> (String, usize) {
        let size = bytes.len() + 1;
        if let Some(name) = self.interned.get(&bytes) {
            return (name.clone(), size);
        }
        let name = format!(".str.{}", self.interned.len());
        self.interned.insert(bytes.clone(), name.clone());
        self.globals.push(ir::Global { name: name.clone(), bytes });
        (name, size)
    }

    fn lower_program(&mut self, program: TypedProgram) -> ir::Module {
        let mut module = ir::Module::new("minic");

        for statement in &program {
            if let StatementKind::FuncDecl {
                name,
                params,
                return_type,
                ..
            } = &statement.kind
            {
                self.functions.entry(name.clone()).or_insert(FunctionSig {
                    params: params.iter().map(|p| p.typ).collect(),
                    return_type: *return_type,
                });
            }
        }

        let mut defined: HashSet<String> = HashSet::new();
        let mut user_main: Option<Token> = None;
        let mut top_level = Vec::new();

        for statement in program {
            match statement.kind {
                StatementKind::FuncDecl {
                    name,
                    params,
                    return_type,
                    body,
                } => {
                    if !defined.insert(name.clone()) {
                        self.error(duplicate_function(&name, &statement.token));
                        continue;
                    }
                    if name == "main" {
                        user_main = Some(statement.token.clone());
                    }
                    let function = self.lower_function(&name, &params, return_type, body);
                    module.functions.push(function);
                }
                kind => top_level.push(Statement::new(kind, statement.token)),
            }
        }

        if user_main.is_some() {
            if let Some(first) = top_level.first() {
                self.error(duplicate_function("main", &first.token));
            }
        } else {
            let main = self.lower_implicit_main(top_level);
            module.functions.push(main);
        }

        module.declares_printf = self.declares_printf;
        module.globals = std::mem::take(&mut self.globals);
        module
    }

    fn lower_function(
        &mut self,
        name: &str,
        params: &[Parameter],
        return_type: Type,
        body: Block<Type>,
    ) -> ir::Function {
        let mut ctx = FunctionCtx::new(return_type);

        let mut ir_params = Vec::new();
        for param in params {
            let typ = ir_type(param.typ);
            ir_params.push((param.name.clone(), typ));

            // parameters get a slot too, so they are assignable like locals
            let slot = ctx.alloca(&param.name, typ);
            ctx.append(Instruction::plain(
                "store",
                vec![format!("{typ} %{}", param.name), format!("{typ}* {slot}")],
            ));
            ctx.declare(
                param.name.clone(),
                Slot {
                    register: slot,
                    typ: param.typ,
                },
            );
        }

        self.lower_block(&mut ctx, body);

        ir::Function {
            name: name.to_string(),
            return_type: ir_type(return_type),
            params: ir_params,
            blocks: ctx.finish(),
        }
    }

    /// Concatenate the top-level statements into `main`, returning 0
    fn lower_implicit_main(&mut self, statements: Vec<Statement<Type>>) -> ir::Function {
        let mut ctx = FunctionCtx::new(Type::Int);
        for statement in statements {
            self.lower_statement(&mut ctx, statement);
        }
        ir::Function {
            name: "main".to_string(),
            return_type: IrType::I32,
            params: Vec::new(),
            blocks: ctx.finish(),
        }
    }

    fn lower_block(&mut self, ctx: &mut FunctionCtx, block: Block<Type>) {
        ctx.scopes.push(HashMap::new());
        for statement in block.statements {
            self.lower_statement(ctx, statement);
        }
        ctx.scopes.pop();
    }

    fn lower_statement(&mut self, ctx: &mut FunctionCtx, statement: Statement<Type>) {
        // everything after a terminator in the same block is unreachable
        if ctx.blocks[ctx.current].is_closed() {
            return;
        }
        match statement.kind {
            StatementKind::VarDecl { typ, name, init } => {
                let slot = ctx.alloca(&name, ir_type(typ));
                ctx.declare(
                    name,
                    Slot {
                        register: slot.clone(),
                        typ,
                    },
                );
                if let Some(init) = init {
                    let value = self.lower_expression(ctx, init);
                    let value = self.coerce(ctx, value, typ);
                    ctx.append(store(ir_type(typ), &value.text, &slot));
                }
            }

            StatementKind::Assignment { target, value } => {
                let value = self.lower_expression(ctx, value);
                self.store_to(ctx, &target, value);
            }

            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let cond = self.lower_expression(ctx, condition);
                let index = self.fresh_label_index();
                let then_label = format!("if.then{index}");
                let else_label = format!("if.else{index}");
                let end_label = format!("if.end{index}");

                ctx.terminate(Terminator::CondBr {
                    cond: cond.text,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                });

                ctx.new_block(then_label);
                self.lower_block(ctx, then_block);
                ctx.terminate(Terminator::Br {
                    target: end_label.clone(),
                });

                ctx.new_block(else_label);
                if let Some(else_block) = else_block {
                    self.lower_block(ctx, else_block);
                }
                ctx.terminate(Terminator::Br {
                    target: end_label.clone(),
                });

                ctx.new_block(end_label);
            }

            StatementKind::While { condition, body } => {
                let index = self.fresh_label_index();
                let cond_label = format!("while.cond{index}");
                let body_label = format!("while.body{index}");
                let end_label = format!("while.end{index}");

                ctx.terminate(Terminator::Br {
                    target: cond_label.clone(),
                });

                ctx.new_block(cond_label.clone());
                let cond = self.lower_expression(ctx, condition);
                ctx.terminate(Terminator::CondBr {
                    cond: cond.text,
                    then_label: body_label.clone(),
                    else_label: end_label.clone(),
                });

                ctx.new_block(body_label);
                self.lower_block(ctx, body);
                ctx.terminate(Terminator::Br { target: cond_label });

                ctx.new_block(end_label);
            }

            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                ctx.scopes.push(HashMap::new());
                if let Some(init) = init {
                    self.lower_statement(ctx, *init);
                }

                let index = self.fresh_label_index();
                let cond_label = format!("for.cond{index}");
                let body_label = format!("for.body{index}");
                let step_label = format!("for.step{index}");
                let end_label = format!("for.end{index}");

                ctx.terminate(Terminator::Br {
                    target: cond_label.clone(),
                });

                ctx.new_block(cond_label.clone());
                match condition {
                    Some(condition) => {
                        let cond = self.lower_expression(ctx, condition);
                        ctx.terminate(Terminator::CondBr {
                            cond: cond.text,
                            then_label: body_label.clone(),
                            else_label: end_label.clone(),
                        });
                    }
                    None => ctx.terminate(Terminator::Br {
                        target: body_label.clone(),
                    }),
                }

                ctx.new_block(body_label);
                self.lower_block(ctx, body);
                ctx.terminate(Terminator::Br {
                    target: step_label.clone(),
                });

                ctx.new_block(step_label);
                if let Some(update) = update {
                    self.lower_statement(ctx, *update);
                }
                ctx.terminate(Terminator::Br { target: cond_label });

                ctx.new_block(end_label);
                ctx.scopes.pop();
            }

            StatementKind::Return { value } => match value {
                Some(value) => {
                    let return_type = ctx.return_type;
                    let value = self.lower_expression(ctx, value);
                    let value = self.coerce(ctx, value, return_type);
                    ctx.terminate(Terminator::Ret {
                        typ: ir_type(return_type),
                        value: Some(value.text),
                    });
                }
                None => {
                    let typ = ir_type(ctx.return_type);
                    let value = match typ {
                        IrType::Void => None,
                        typ => Some(typ.zero().to_string()),
                    };
                    ctx.terminate(Terminator::Ret { typ, value });
                }
            },

            StatementKind::Block(block) => self.lower_block(ctx, block),

            StatementKind::ExprStmt(expression) => {
                self.lower_expression(ctx, expression);
            }

            StatementKind::FuncDecl { .. } => {
                debug_assert!(false, "the parser only produces top-level functions");
            }
        }
    }

    fn store_to(&mut self, ctx: &mut FunctionCtx, target: &str, value: Operand) {
        let Some(slot) = ctx.lookup(target).cloned() else {
            debug_assert!(false, "assignment target {target:?} survived the analyzer unresolved");
            return;
        };
        let value = self.coerce(ctx, value, slot.typ);
        ctx.append(store(ir_type(slot.typ), &value.text, &slot.register));
    }

    fn lower_expression(&mut self, ctx: &mut FunctionCtx, expression: Expression<Type>) -> Operand {
        let Expression { kind, token, typ } = expression;
        match kind {
            ExpressionKind::Number(value) => {
                let text = if typ == Type::Int {
                    format!("{}", value as i64)
                } else {
                    format_double(value)
                };
                Operand { text, typ }
            }

            ExpressionKind::Bool(value) => Operand {
                text: String::from(if value { "1" } else { "0" }),
                typ: Type::Bool,
            },

            ExpressionKind::Str(raw) => {
                let (name, size) = self.intern_string(decode_escapes(&raw));
                let temp = self.emit_gep(ctx, &name, size);
                Operand {
                    text: temp,
                    typ: Type::String,
                }
            }

            ExpressionKind::Identifier(name) => {
                let Some(slot) = ctx.lookup(&name).cloned() else {
                    debug_assert!(false, "identifier {name:?} survived the analyzer unresolved");
                    return Operand {
                        text: String::from("0"),
                        typ: Type::Unknown,
                    };
                };
                let typ = ir_type(slot.typ);
                let temp = ctx.fresh_temp();
                ctx.append(Instruction::with_dest(
                    "load",
                    typ,
                    temp.clone(),
                    vec![typ.to_string(), format!("{typ}* {}", slot.register)],
                ));
                Operand {
                    text: temp,
                    typ: slot.typ,
                }
            }

            ExpressionKind::Unary { op, operand } => {
                let operand = self.lower_expression(ctx, *operand);
                let temp = ctx.fresh_temp();
                match op {
                    UnaryOp::Neg if operand.typ == Type::Float => {
                        ctx.append(Instruction::with_dest(
                            "fneg",
                            IrType::Double,
                            temp.clone(),
                            vec![format!("double {}", operand.text)],
                        ));
                        Operand {
                            text: temp,
                            typ: Type::Float,
                        }
                    }
                    UnaryOp::Neg => {
                        ctx.append(Instruction::with_dest(
                            "sub",
                            IrType::I32,
                            temp.clone(),
                            vec![String::from("i32 0"), operand.text],
                        ));
                        Operand {
                            text: temp,
                            typ: Type::Int,
                        }
                    }
                    UnaryOp::Not => {
                        ctx.append(Instruction::with_dest(
                            "xor",
                            IrType::I1,
                            temp.clone(),
                            vec![format!("i1 {}", operand.text), String::from("1")],
                        ));
                        Operand {
                            text: temp,
                            typ: Type::Bool,
                        }
                    }
                }
            }

            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expression(ctx, *lhs);
                let rhs = self.lower_expression(ctx, *rhs);
                self.lower_binary(ctx, op, lhs, rhs, typ)
            }

            ExpressionKind::Call { callee, args } => self.lower_call(ctx, &callee, args, &token),

            ExpressionKind::Assign { target, value } => {
                let value = self.lower_expression(ctx, *value);
                let Some(typ) = ctx.lookup(&target).map(|slot| slot.typ) else {
                    debug_assert!(false, "assignment target {target:?} survived the analyzer");
                    return value;
                };
                let value = self.coerce(ctx, value, typ);
                self.store_to(ctx, &target, value.clone());
                value
            }
        }
    }

    fn lower_binary(
        &mut self,
        ctx: &mut FunctionCtx,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
        result_type: Type,
    ) -> Operand {
        if op.is_logical() {
            let opcode = match op {
                BinaryOp::And => "and",
                _ => "or",
            };
            let temp = ctx.fresh_temp();
            ctx.append(Instruction::with_dest(
                opcode,
                IrType::I1,
                temp.clone(),
                vec![format!("i1 {}", lhs.text), rhs.text],
            ));
            return Operand {
                text: temp,
                typ: Type::Bool,
            };
        }

        if op.is_arithmetic() {
            let lhs = self.coerce(ctx, lhs, result_type);
            let rhs = self.coerce(ctx, rhs, result_type);
            let typ = ir_type(result_type);
            let opcode = match (op, result_type) {
                (BinaryOp::Add, Type::Float) => "fadd",
                (BinaryOp::Sub, Type::Float) => "fsub",
                (BinaryOp::Mul, Type::Float) => "fmul",
                (BinaryOp::Div, Type::Float) => "fdiv",
                (BinaryOp::Add, _) => "add",
                (BinaryOp::Sub, _) => "sub",
                (BinaryOp::Mul, _) => "mul",
                (BinaryOp::Div, _) => "sdiv",
                _ => unreachable!(),
            };
            let temp = ctx.fresh_temp();
            ctx.append(Instruction::with_dest(
                opcode,
                typ,
                temp.clone(),
                vec![format!("{typ} {}", lhs.text), rhs.text],
            ));
            return Operand {
                text: temp,
                typ: result_type,
            };
        }

        // comparisons: unify numeric operands, then icmp/fcmp
        let operand_type = if lhs.typ == Type::Float || rhs.typ == Type::Float {
            Type::Float
        } else {
            lhs.typ
        };
        let lhs = self.coerce(ctx, lhs, operand_type);
        let rhs = self.coerce(ctx, rhs, operand_type);

        let opcode = if operand_type == Type::Float {
            match op {
                BinaryOp::Eq => "fcmp oeq",
                BinaryOp::NotEq => "fcmp one",
                BinaryOp::Lt => "fcmp olt",
                BinaryOp::LtEq => "fcmp ole",
                BinaryOp::Gt => "fcmp ogt",
                BinaryOp::GtEq => "fcmp oge",
                _ => unreachable!(),
            }
        } else {
            match op {
                BinaryOp::Eq => "icmp eq",
                BinaryOp::NotEq => "icmp ne",
                BinaryOp::Lt => "icmp slt",
                BinaryOp::LtEq => "icmp sle",
                BinaryOp::Gt => "icmp sgt",
                BinaryOp::GtEq => "icmp sge",
                _ => unreachable!(),
            }
        };

        let typ = ir_type(operand_type);
        let temp = ctx.fresh_temp();
        ctx.append(Instruction::with_dest(
            opcode,
            IrType::I1,
            temp.clone(),
            vec![format!("{typ} {}", lhs.text), rhs.text],
        ));
        Operand {
            text: temp,
            typ: Type::Bool,
        }
    }

    fn lower_call(
        &mut self,
        ctx: &mut FunctionCtx,
        callee: &str,
        args: Vec<Expression<Type>>,
        token: &Token,
    ) -> Operand {
        if callee == "print" {
            return self.lower_print(ctx, args, token);
        }

        let Some(sig) = self.functions.get(callee).cloned() else {
            debug_assert!(false, "call to {callee:?} survived the analyzer unresolved");
            return Operand {
                text: String::from("0"),
                typ: Type::Unknown,
            };
        };

        let mut rendered = Vec::with_capacity(args.len());
        for (arg, param) in args.into_iter().zip(sig.params.iter()) {
            let arg = self.lower_expression(ctx, arg);
            let arg = self.coerce(ctx, arg, *param);
            rendered.push(format!("{} {}", ir_type(*param), arg.text));
        }
        let call = format!("@{callee}({})", rendered.join(", "));

        if sig.return_type == Type::Void {
            ctx.append(Instruction::plain("call", vec![format!("void {call}")]));
            Operand {
                text: String::new(),
                typ: Type::Void,
            }
        } else {
            let typ = ir_type(sig.return_type);
            let temp = ctx.fresh_temp();
            ctx.append(Instruction::with_dest(
                "call",
                typ,
                temp.clone(),
                vec![format!("{typ} {call}")],
            ));
            Operand {
                text: temp,
                typ: sig.return_type,
            }
        }
    }

    fn lower_print(
        &mut self,
        ctx: &mut FunctionCtx,
        args: Vec<Expression<Type>>,
        token: &Token,
    ) -> Operand {
        let Some(arg) = args.into_iter().next() else {
            debug_assert!(false, "print call without argument survived the analyzer");
            return Operand {
                text: String::new(),
                typ: Type::Void,
            };
        };

        let arg = self.lower_expression(ctx, arg);
        let format = match arg.typ {
            Type::Int => "%d\n",
            Type::Float => "%f\n",
            Type::String => "%s\n",
            typ => {
                self.error(LoweringError::UnsupportedPrintType {
                    typ,
                    line: token.line,
                    column: token.column,
                    span: (token.offset, token.lexeme.len().max(1)).into(),
                });
                return Operand {
                    text: String::new(),
                    typ: Type::Void,
                };
            }
        };

        let (name, size) = self.intern_string(format.as_bytes().to_vec());
        let format_ptr = self.emit_gep(ctx, &name, size);

        self.declares_printf = true;
        let arg_type = ir_type(arg.typ);
        let temp = ctx.fresh_temp();
        ctx.append(Instruction::with_dest(
            "call",
            IrType::I32,
            temp.clone(),
            vec![format!(
                "i32 (i8*, ...) @printf(i8* {format_ptr}, {arg_type} {})",
                arg.text
            )],
        ));

        Operand {
            text: temp,
            typ: Type::Void,
        }
    }

    /// Materialise the address of a string constant's first byte
    fn emit_gep(&mut self, ctx: &mut FunctionCtx, name: &str, size: usize) -> String {
        let temp = ctx.fresh_temp();
        ctx.append(Instruction::with_dest(
            "getelementptr inbounds",
            IrType::I8Ptr,
            temp.clone(),
            vec![
                format!("[{size} x i8]"),
                format!("[{size} x i8]* @{name}"),
                String::from("i64 0"),
                String::from("i64 0"),
            ],
        ));
        temp
    }

    /// Insert a numeric conversion when the operand type differs
    fn coerce(&mut self, ctx: &mut FunctionCtx, operand: Operand, to: Type) -> Operand {
        match (operand.typ, to) {
            (Type::Int, Type::Float) => {
                let temp = ctx.fresh_temp();
                ctx.append(Instruction::with_dest(
                    "sitofp",
                    IrType::Double,
                    temp.clone(),
                    vec![format!("i32 {} to double", operand.text)],
                ));
                Operand {
                    text: temp,
                    typ: Type::Float,
                }
            }
            (Type::Float, Type::Int) => {
                let temp = ctx.fresh_temp();
                ctx.append(Instruction::with_dest(
                    "fptosi",
                    IrType::I32,
                    temp.clone(),
                    vec![format!("double {} to i32", operand.text)],
                ));
                Operand {
                    text: temp,
                    typ: Type::Int,
                }
            }
            _ => operand,
        }
    }
}

fn duplicate_function(name: &str, token: &Token) -> LoweringError {
    LoweringError::DuplicateFunction {
        name: name.to_string(),
        line: token.line,
        column: token.column,
        span: (token.offset, token.lexeme.len().max(1)).into(),
    }
}

fn store(typ: IrType, value: &str, slot: &str) -> Instruction {
    Instruction::plain(
        "store",
        vec![format!("{typ} {value}"), format!("{typ}* {slot}")],
    )
}

fn ir_type(typ: Type) -> IrType {
    match typ {
        Type::Int => IrType::I32,
        Type::Float => IrType::Double,
        Type::Bool => IrType::I1,
        Type::String => IrType::I8Ptr,
        Type::Void => IrType::Void,
        Type::Unknown => {
            debug_assert!(false, "unknown type survived the analyzer");
            IrType::I32
        }
    }
}

/// Render a double immediate in LLVM's always-exact 16-digit hex form
fn format_double(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

/// Decode the escape pairs the lexer kept verbatim
fn decode_escapes(raw: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut buffer = [0u8; 4];
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            bytes.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some('0') => bytes.push(0),
            Some('"') => bytes.push(b'"'),
            Some('\\') => bytes.push(b'\\'),
            Some(other) => bytes.extend_from_slice(other.encode_utf8(&mut buffer).as_bytes()),
            None => bytes.push(b'\\'),
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse;
    use crate::type_checking::type_check;

    fn lower_source(src: &str) -> String {
        let program = parse(src).expect("test source must parse");
        let program = type_check(program).expect("test source must type-check");
        lower(program).expect("test source must lower").to_string()
    }

    #[test]
    fn arithmetic_and_print() {
        let text = lower_source("int x = 2 + 3 * 4;\nprint(x);");
        assert!(text.contains("%t0 = mul i32 3, 4"));
        assert!(text.contains("%t1 = add i32 2, %t0"));
        assert!(text.contains("store i32 %t1, i32* %x.slot"));
        assert!(text.contains("%t2 = load i32, i32* %x.slot"));
        assert!(text.contains("c\"%d\\0A\\00\""));
        assert!(text.contains("call i32 (i8*, ...) @printf(i8* %t3, i32 %t2)"));
    }

    #[test]
    fn implicit_widening_inserts_sitofp() {
        let text = lower_source("float y = 1 + 2.5;");
        assert!(text.contains("sitofp i32 1 to double"));
        assert!(text.contains("fadd double"));
    }

    #[test]
    fn narrowing_assignment_inserts_fptosi() {
        let text = lower_source("int x = 2.5;");
        assert!(text.contains("fptosi double"));
    }

    #[test]
    fn if_else_blocks_and_branches() {
        let text = lower_source("int n = 5;\nif (n > 0) { print(1); } else { print(0); }");
        assert!(text.contains("icmp sgt i32"));
        assert!(text.contains("br i1 %t1, label %if.then0, label %if.else0"));
        assert!(text.contains("if.then0:"));
        assert!(text.contains("if.else0:"));
        assert!(text.contains("if.end0:"));
        assert_eq!(text.matches("br label %if.end0").count(), 2);
    }

    #[test]
    fn if_without_else_still_has_an_else_block() {
        let text = lower_source("if (true) { }");
        assert!(text.contains("if.else0:"));
        assert!(text.contains("br i1 1, label %if.then0, label %if.else0"));
    }

    #[test]
    fn while_loop_shape() {
        let text = lower_source("int i = 0;\nwhile (i < 3) { i = i + 1; }");
        assert!(text.contains("while.cond0:"));
        assert!(text.contains("while.body0:"));
        assert!(text.contains("while.end0:"));
        assert!(text.contains("icmp slt i32"));
        // pre-header and loop body both jump back to the condition
        assert_eq!(text.matches("br label %while.cond0").count(), 2);
    }

    #[test]
    fn for_loop_shape() {
        let text = lower_source("for (int i = 0; i < 3; i = i + 1) { print(i); }");
        for label in ["for.cond0:", "for.body0:", "for.step0:", "for.end0:"] {
            assert!(text.contains(label), "missing {label} in:\n{text}");
        }
        // init jumps to cond, body to step, step back to cond
        assert_eq!(text.matches("br label %for.cond0").count(), 2);
        assert!(text.contains("br label %for.step0"));
    }

    #[test]
    fn function_definition_and_call() {
        let text =
            lower_source("func add(int a, int b) int { return a + b; }\nint r = add(2, 3);\nprint(r);");
        assert!(text.contains("define i32 @add(i32 %a, i32 %b) {"));
        assert!(text.contains("store i32 %a, i32* %a.slot"));
        assert!(text.contains("call i32 @add(i32 2, i32 3)"));
        assert!(text.contains("define i32 @main() {"));
    }

    #[test]
    fn void_calls_have_no_destination() {
        let text = lower_source("func hello() void { print(1); }\nhello();");
        assert!(text.contains("call void @hello()"));
        assert!(!text.contains("= call void"));
    }

    #[test]
    fn call_arguments_are_widened_to_the_parameter_type() {
        let text = lower_source("func f(float x) void { }\nf(1);");
        assert!(text.contains("sitofp i32 1 to double"));
        assert!(text.contains("call void @f(double %t0)"));
    }

    #[test]
    fn comparison_between_float_and_int() {
        let text = lower_source("float x = 1.5;\nbool b = x < 2;");
        assert!(text.contains("sitofp i32 2 to double"));
        assert!(text.contains("fcmp olt double"));
    }

    #[test]
    fn unary_operators() {
        let text = lower_source("int a = 1; int x = -a;\nbool b = !true;\nfloat f = 1.5; float g = -f;");
        assert!(text.contains("sub i32 0, %t0"));
        assert!(text.contains("xor i1 1, 1"));
        assert!(text.contains("fneg double"));
    }

    #[test]
    fn logical_operators_are_eager() {
        let text = lower_source("bool b = true && false;\nbool c = true || b;");
        assert!(text.contains("and i1 1, 0"));
        assert!(text.contains("or i1 1, %t1"));
    }

    #[test]
    fn string_literals_become_interned_globals() {
        let text = lower_source("print(\"hi\");\nprint(\"hi\");");
        assert!(text.contains("@.str.0 = private unnamed_addr constant [3 x i8] c\"hi\\00\", align 1"));
        assert!(text.contains("c\"%s\\0A\\00\""));
        // the literal is interned once
        assert_eq!(text.matches("c\"hi\\00\"").count(), 1);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let text = lower_source("print(\"a\\nb\");");
        assert!(text.contains("[4 x i8] c\"a\\0Ab\\00\""));
    }

    #[test]
    fn empty_program_is_a_main_returning_zero() {
        let text = lower_source("");
        assert!(text.contains("define i32 @main() {"));
        assert!(text.contains("ret i32 0"));
        assert!(!text.contains("declare i32 @printf"));
    }

    #[test]
    fn printf_is_declared_only_when_used() {
        assert!(lower_source("print(1);").contains("declare i32 @printf(i8*, ...)"));
        assert!(!lower_source("int x = 1;").contains("declare i32 @printf"));
    }

    #[test]
    fn user_main_suppresses_the_implicit_one() {
        let text = lower_source("func main() int { return 7; }");
        assert_eq!(text.matches("define i32 @main()").count(), 1);
        assert!(text.contains("ret i32 7"));
    }

    #[test]
    fn user_main_plus_top_level_code_is_a_duplicate() {
        let program = parse("func main() int { return 0; }\nint x = 1;").unwrap();
        let program = type_check(program).unwrap();
        let errors = lower(program).unwrap_err();
        assert!(matches!(
            &errors[0],
            LoweringError::DuplicateFunction { name, .. } if name == "main"
        ));
    }

    #[test]
    fn shadowed_variables_get_distinct_slots() {
        let text = lower_source("int x = 1; if (true) { int x = 2; x = 3; }");
        assert!(text.contains("%x.slot = alloca i32"));
        assert!(text.contains("%x.slot1 = alloca i32"));
        assert!(text.contains("store i32 3, i32* %x.slot1"));
    }

    #[test]
    fn allocas_land_in_the_entry_block() {
        let text = lower_source("while (true) { int x = 1; }");
        let entry_end = text.find("while.cond0:").unwrap();
        let alloca_at = text.find("%x.slot = alloca i32").unwrap();
        assert!(alloca_at < entry_end, "alloca must be in the entry block:\n{text}");
    }

    #[test]
    fn code_after_return_is_dropped() {
        let text = lower_source("func f() int { return 1; print(2); }");
        assert!(!text.contains("@printf"));
    }

    #[test]
    fn assignment_expressions_chain() {
        let text = lower_source("int a; int b; a = b = 1;");
        assert!(text.contains("store i32 1, i32* %b.slot"));
        assert!(text.contains("store i32 1, i32* %a.slot"));
    }

    #[test]
    fn registers_are_unique_and_blocks_are_terminated() {
        let src = "int x = 1;\nif (true) { int x = 2; }\nwhile (x < 5) { x = x + 1; }\nprint(x);";
        let program = type_check(parse(src).unwrap()).unwrap();
        let module = lower(program).unwrap();
        for function in &module.functions {
            let mut seen = std::collections::HashSet::new();
            for block in &function.blocks {
                assert!(block.is_closed(), "open block {} in @{}", block.label, function.name);
                for instruction in &block.instructions {
                    if let Some(dest) = &instruction.dest {
                        assert!(seen.insert(dest.clone()), "duplicate register {dest}");
                    }
                }
            }
        }
    }

    #[test]
    fn lowering_is_deterministic() {
        let src = "int i = 0;\nwhile (i < 10) { print(i); i = i + 1; }\nprint(\"done\");";
        assert_eq!(lower_source(src), lower_source(src));
    }

    #[test]
    fn temporaries_reset_per_function() {
        let text = lower_source("func f() int { return 1 + 2; }\nint x = 3 + 4;");
        // both functions start counting at %t0
        assert_eq!(text.matches("%t0 = add i32").count(), 2);
    }
}
