//! Intermediate representation
//!
//! An in-memory tree mirroring LLVM's textual form: a [`Module`] owns
//! string-constant globals and [`Function`]s, a function owns its
//! [`BasicBlock`]s, and a block owns its instructions plus exactly one
//! terminator. The `Display` implementations serialize the tree into the
//! textual dialect `llc` consumes; given the same input program the output
//! is byte-identical.

use std::fmt;

/// The LLVM-level types the language lowers to
///
/// The language type `float` maps to `double`: numeric literals are
/// IEEE-754 doubles end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
    I32,
    Double,
    I1,
    I8Ptr,
    Void,
}

impl IrType {
    /// The zero constant of this type, used for default returns
    pub fn zero(self) -> &'static str {
        match self {
            IrType::I32 => "0",
            IrType::Double => "0x0000000000000000",
            IrType::I1 => "0",
            IrType::I8Ptr => "null",
            IrType::Void => "",
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::I32 => write!(f, "i32"),
            IrType::Double => write!(f, "double"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8Ptr => write!(f, "i8*"),
            IrType::Void => write!(f, "void"),
        }
    }
}

/// A compiled module: globals and functions in declaration order
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// Whether `declare i32 @printf(i8*, ...)` must be emitted
    pub declares_printf: bool,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declares_printf: false,
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }
}

/// A private NUL-terminated string constant
#[derive(Debug, Clone)]
pub struct Global {
    /// Name without the leading `@`, e.g. `.str.0`
    pub name: String,
    /// Content bytes, without the trailing NUL
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub return_type: IrType,
    pub params: Vec<(String, IrType)>,
    pub blocks: Vec<BasicBlock>,
}

/// A straight-line instruction sequence ending in exactly one terminator
///
/// The terminator is optional only during construction; every block of a
/// finished function has one.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.terminator.is_some()
    }
}

/// A non-terminator instruction in generic textual form
///
/// `operands` are pre-rendered fragments (`"i32 %t0"`, `"i64 0"`, ...)
/// joined with `", "` after the opcode; `typ` records the type of the
/// value in `dest` for bookkeeping.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: String,
    pub typ: IrType,
    pub dest: Option<String>,
    pub operands: Vec<String>,
    pub comment: Option<String>,
}

impl Instruction {
    /// An instruction producing a value in `dest`
    pub fn with_dest(
        opcode: impl Into<String>,
        typ: IrType,
        dest: impl Into<String>,
        operands: Vec<String>,
    ) -> Self {
        Self {
            opcode: opcode.into(),
            typ,
            dest: Some(dest.into()),
            operands,
            comment: None,
        }
    }

    /// An instruction executed for its effect only
    pub fn plain(opcode: impl Into<String>, operands: Vec<String>) -> Self {
        Self {
            opcode: opcode.into(),
            typ: IrType::Void,
            dest: None,
            operands,
            comment: None,
        }
    }
}

/// The restricted set of control-transfer instructions
#[derive(Debug, Clone)]
pub enum Terminator {
    CondBr {
        cond: String,
        then_label: String,
        else_label: String,
    },
    Br {
        target: String,
    },
    Ret {
        typ: IrType,
        value: Option<String>,
    },
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if self.declares_printf {
            writeln!(f)?;
            writeln!(f, "declare i32 @printf(i8*, ...)")?;
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                writeln!(f, "{global}")?;
            }
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{} = private unnamed_addr constant [{} x i8] c\"{}\\00\", align 1",
            self.name,
            self.bytes.len() + 1,
            escape_bytes(&self.bytes)
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(name, typ)| format!("{typ} %{name}"))
            .collect();
        writeln!(
            f,
            "define {} @{}({}) {{",
            self.return_type,
            self.name,
            params.join(", ")
        )?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        match &self.terminator {
            Some(terminator) => writeln!(f, "  {terminator}"),
            None => {
                // a finished function never has an open block; this is a
                // generator bug, not a user error
                debug_assert!(false, "open basic block {:?} at emit time", self.label);
                writeln!(f, "  unreachable")
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dest) = &self.dest {
            write!(f, "{dest} = ")?;
        }
        write!(f, "{} {}", self.opcode, self.operands.join(", "))?;
        if let Some(comment) = &self.comment {
            write!(f, " ; {comment}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::CondBr {
                cond,
                then_label,
                else_label,
            } => write!(f, "br i1 {cond}, label %{then_label}, label %{else_label}"),
            Terminator::Br { target } => write!(f, "br label %{target}"),
            Terminator::Ret { typ, value } => match value {
                Some(value) => write!(f, "ret {typ} {value}"),
                None => write!(f, "ret void"),
            },
        }
    }
}

/// Escape constant bytes for a `c"..."` initializer
///
/// Printable ASCII stays as-is except `"` and `\`; everything else becomes
/// `\XX` with uppercase hex digits.
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if (0x20..=0x7e).contains(&byte) && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_render_escapes_and_counts_the_nul() {
        let global = Global {
            name: ".str.0".to_string(),
            bytes: b"%d\n".to_vec(),
        };
        assert_eq!(
            global.to_string(),
            "@.str.0 = private unnamed_addr constant [4 x i8] c\"%d\\0A\\00\", align 1"
        );
    }

    #[test]
    fn global_render_escapes_quotes_and_backslashes() {
        let global = Global {
            name: ".str.1".to_string(),
            bytes: b"a\"b\\c".to_vec(),
        };
        assert!(global.to_string().contains("c\"a\\22b\\5Cc\\00\""));
    }

    #[test]
    fn instruction_render_with_and_without_dest() {
        let add = Instruction::with_dest(
            "add",
            IrType::I32,
            "%t1",
            vec!["i32 2".to_string(), "%t0".to_string()],
        );
        assert_eq!(add.to_string(), "%t1 = add i32 2, %t0");

        let store = Instruction::plain(
            "store",
            vec!["i32 %t1".to_string(), "i32* %x.slot".to_string()],
        );
        assert_eq!(store.to_string(), "store i32 %t1, i32* %x.slot");
    }

    #[test]
    fn terminator_render() {
        let cond = Terminator::CondBr {
            cond: "%t0".to_string(),
            then_label: "if.then0".to_string(),
            else_label: "if.else0".to_string(),
        };
        assert_eq!(
            cond.to_string(),
            "br i1 %t0, label %if.then0, label %if.else0"
        );
        assert_eq!(
            Terminator::Br {
                target: "while.cond0".to_string()
            }
            .to_string(),
            "br label %while.cond0"
        );
        assert_eq!(
            Terminator::Ret {
                typ: IrType::I32,
                value: Some("0".to_string())
            }
            .to_string(),
            "ret i32 0"
        );
        assert_eq!(
            Terminator::Ret {
                typ: IrType::Void,
                value: None
            }
            .to_string(),
            "ret void"
        );
    }

    #[test]
    fn function_render_prints_the_entry_label() {
        let mut block = BasicBlock::new("entry");
        block.terminator = Some(Terminator::Ret {
            typ: IrType::I32,
            value: Some("0".to_string()),
        });
        let function = Function {
            name: "main".to_string(),
            return_type: IrType::I32,
            params: Vec::new(),
            blocks: vec![block],
        };
        assert_eq!(
            function.to_string(),
            "define i32 @main() {\nentry:\n  ret i32 0\n}\n"
        );
    }

    #[test]
    fn module_render_order() {
        let mut module = Module::new("minic");
        module.declares_printf = true;
        module.globals.push(Global {
            name: ".str.0".to_string(),
            bytes: b"%d\n".to_vec(),
        });
        let mut block = BasicBlock::new("entry");
        block.terminator = Some(Terminator::Ret {
            typ: IrType::I32,
            value: Some("0".to_string()),
        });
        module.functions.push(Function {
            name: "main".to_string(),
            return_type: IrType::I32,
            params: Vec::new(),
            blocks: vec![block],
        });

        let text = module.to_string();
        let declare = text.find("declare i32 @printf").unwrap();
        let global = text.find("@.str.0").unwrap();
        let define = text.find("define i32 @main").unwrap();
        assert!(text.starts_with("; ModuleID = 'minic'\n"));
        assert!(declare < global && global < define);
    }
}
