use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::{env, fs};

use clap::Parser;

use minic::lowering::LoweringError;
use minic::parsing::ParseError;
use minic::type_checking::SemanticError;
use minic::{ast, lower, parse, type_check};

mod cli;

fn main() -> ExitCode {
    let args = cli::Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn run(args: &cli::Args) -> Result<(), ()> {
    let source = fs::read_to_string(&args.input_file).map_err(|error| {
        eprintln!(
            "🔴 Failed to read '{}': {error}",
            args.input_file.display()
        );
    })?;

    let program = parse(&source).map_err(|errors| report(errors.iter().map(parse_diagnostic)))?;

    if args.mode == cli::Mode::Parse {
        return ast::print_program(&program).map_err(|error| {
            eprintln!("🔴 Failed to print the AST: {error}");
        });
    }

    let program =
        type_check(program).map_err(|errors| report(errors.iter().map(semantic_diagnostic)))?;
    let module = lower(program).map_err(|errors| report(errors.iter().map(lowering_diagnostic)))?;
    let ir_text = module.to_string();

    if args.mode == cli::Mode::EmitIr {
        print!("{ir_text}");
        return Ok(());
    }

    compile_native(&ir_text, &args.output).map_err(|message| eprintln!("🔴 {message}"))?;

    if args.run {
        run_binary(&args.output).map_err(|message| eprintln!("🔴 {message}"))?;
    }

    Ok(())
}

/// A pipeline diagnostic reduced to what the report format needs
struct Diagnostic {
    line: u32,
    column: Option<u32>,
    message: String,
}

fn parse_diagnostic(error: &ParseError) -> Diagnostic {
    Diagnostic {
        line: error.line,
        column: Some(error.column),
        message: error.message.clone(),
    }
}

fn semantic_diagnostic(error: &SemanticError) -> Diagnostic {
    Diagnostic {
        line: error.line,
        column: Some(error.column),
        message: error.message.clone(),
    }
}

fn lowering_diagnostic(error: &LoweringError) -> Diagnostic {
    let (line, column) = error.position();
    Diagnostic {
        line,
        column: Some(column),
        message: error.to_string(),
    }
}

/// Print diagnostics to stderr, sorted by position and deduplicated
fn report(diagnostics: impl Iterator<Item = Diagnostic>) {
    let mut diagnostics: Vec<Diagnostic> = diagnostics.collect();
    diagnostics.sort_by(|a, b| {
        (a.line, a.column, &a.message).cmp(&(b.line, b.column, &b.message))
    });
    diagnostics.dedup_by(|a, b| a.line == b.line && a.column == b.column && a.message == b.message);

    for diagnostic in diagnostics {
        match diagnostic.column {
            Some(column) => eprintln!(
                "🔴 Line {}:{} - {}",
                diagnostic.line, column, diagnostic.message
            ),
            None => eprintln!("🔴 Line {} - {}", diagnostic.line, diagnostic.message),
        }
    }
}

/// Turn the IR text into an executable with `llc` and the system C compiler
fn compile_native(ir_text: &str, output: &str) -> Result<(), String> {
    let ll_file = env::temp_dir().join(format!("{output}-{}.ll", std::process::id()));
    fs::write(&ll_file, ir_text)
        .map_err(|error| format!("Failed to write '{}': {error}", ll_file.display()))?;

    let asm_file = format!("{output}.s");
    let result = run_tool(
        Command::new("llc")
            .arg(&ll_file)
            .arg("-o")
            .arg(&asm_file),
        "llc",
    );
    let result = result.and_then(|()| {
        run_tool(
            Command::new("gcc")
                .arg("-no-pie")
                .arg(&asm_file)
                .arg("-o")
                .arg(output),
            "gcc",
        )
    });

    // best-effort cleanup of the temporary IR file
    let _ = fs::remove_file(&ll_file);
    result
}

/// Run an external tool with inherited stdio, failing on non-zero exit
fn run_tool(command: &mut Command, name: &str) -> Result<(), String> {
    let status = command
        .status()
        .map_err(|error| format!("Failed to execute {name}: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{name} failed with {status}"))
    }
}

/// Execute the produced binary, streaming its combined output
///
/// The child's exit code is deliberately ignored.
fn run_binary(output: &str) -> Result<(), String> {
    let path = if Path::new(output).components().count() > 1 {
        PathBuf::from(output)
    } else {
        Path::new(".").join(output)
    };
    Command::new(&path)
        .status()
        .map_err(|error| format!("Failed to execute '{}': {error}", path.display()))?;
    Ok(())
}
