use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use padlang::compiler::{compile_with, CompileOptions};
use padlang::scanner::Scanner;

#[derive(Parser)]
#[command(name = "padlang")]
#[command(about = "Parse a Pad template and print what came out", long_about = None)]
#[command(version)]
struct Cli {
    /// Template file to parse
    file: PathBuf,

    /// Print the tokens
    #[arg(long)]
    tokens: bool,

    /// Print the syntax tree
    #[arg(long)]
    ast: bool,

    /// Accept input the grammar doesn't consume entirely
    #[arg(long)]
    allow_trailing: bool,

    /// Trace every grammar rule (with RUST_LOG=trace)
    #[arg(long)]
    trace: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            error!("can't read {}: {}", cli.file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let filename = cli.file.display().to_string();

    let tokens = match Scanner::with_filename(&source, &filename).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if cli.tokens {
        for token in &tokens {
            println!("{}", token);
        }
    }

    let ast = compile_with(
        &tokens,
        CompileOptions {
            debug: cli.trace,
            allow_trailing_tokens: cli.allow_trailing,
        },
    );
    if ast.has_errors() {
        eprint!("{}", ast.errors);
        return ExitCode::FAILURE;
    }
    if cli.ast {
        match &ast.root {
            Some(root) => println!("{}", root),
            None => println!("(empty)"),
        }
    }
    ExitCode::SUCCESS
}
