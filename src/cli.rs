use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about = "Compiler for the minic language", long_about = None)]
pub struct Args {
    /// Source code input file
    pub input_file: PathBuf,

    /// Name of the produced executable
    #[arg(default_value = "output")]
    pub output: String,

    /// Run the executable after linking and stream its output
    #[arg(long)]
    pub run: bool,

    /// Execution mode
    #[arg(value_enum)]
    #[arg(short, long)]
    #[arg(default_value_t = Mode::Compile)]
    pub mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Compile the source code to a native executable
    Compile,

    /// Inspect the AST of the parsed source code
    Parse,

    /// Print the generated LLVM IR instead of compiling it
    EmitIr,
}
