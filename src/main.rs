//! ncc command-line interface.
//!
//! `ncc [options] input-file` — selects one of three modes (scan,
//! parse, generate), wires the pipeline and writes the result to the
//! output file or stdout. `-` stands for stdin/stdout. Exit codes
//! distinguish CLI misuse, compile errors and I/O failures.

use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser as ClapParser, ValueEnum};
use clap_complete::{generate, Shell};
use ncc::{
    AstDumpFormat, CompilerConfig, CompilerMode, ErrorKind, ParserMode,
};
use std::io::{self, Read, Write};
use std::process;

const EXIT_SUCCESS: i32 = 0;
const EXIT_TOO_FEW_ARGUMENTS: i32 = 1;
const EXIT_INVALID_ARGUMENTS: i32 = 2;
const EXIT_NO_INPUT_FILE: i32 = 3;
const EXIT_TOO_MANY_INPUT_FILES: i32 = 4;
const EXIT_COMPILE_ERROR: i32 = 5;
const EXIT_IO_ERROR: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputModeArg {
    Tree,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ParserModeArg {
    Normal,
    Expression,
}

#[derive(ClapParser)]
#[command(name = "ncc")]
#[command(about = "ncc - compile a practical C subset to 32-bit x86 assembly", long_about = None)]
struct Cli {
    /// Print version info and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Write output to a file (default stdout, `-` means stdout)
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<String>,

    /// Run the scanner only
    #[arg(short = 'S', long = "scan")]
    scan: bool,

    /// Run the parser only
    #[arg(short = 'P', long = "parse")]
    parse: bool,

    /// Run the code generator (default)
    #[arg(short = 'G', long = "generate")]
    generate: bool,

    /// Perform optimizations
    #[arg(short = 'O', long = "optimize")]
    optimize: bool,

    /// Parse-mode AST dump form
    #[arg(long = "parser-output-mode", value_name = "MODE", default_value = "tree")]
    parser_output_mode: OutputModeArg,

    /// Parse a whole translation unit or a single expression
    #[arg(long = "parser-mode", value_name = "MODE", default_value = "normal")]
    parser_mode: ParserModeArg,

    /// Prepend the symbol-table dump to the parse dump
    #[arg(long = "symbol-tables")]
    symbol_tables: bool,

    /// Generate shell completions and exit
    #[arg(long = "completions", value_name = "SHELL")]
    completions: Option<Shell>,

    /// Input file (`-` or nothing means stdin)
    input: Vec<String>,
}

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    if std::env::args().len() < 2 {
        print_version();
        print_usage();
        return EXIT_TOO_FEW_ARGUMENTS;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            return match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                    let _ = e.print();
                    EXIT_SUCCESS
                }
                _ => {
                    let _ = e.print();
                    EXIT_INVALID_ARGUMENTS
                }
            };
        }
    };

    if cli.version {
        print_version();
        return EXIT_SUCCESS;
    }

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "ncc", &mut io::stdout());
        return EXIT_SUCCESS;
    }

    let modes_selected = [cli.scan, cli.parse, cli.generate]
        .iter()
        .filter(|&&m| m)
        .count();
    if modes_selected > 1 {
        return argument_error("only one mode could be specified");
    }
    let mode = if cli.scan {
        CompilerMode::Scan
    } else if cli.parse {
        CompilerMode::Parse
    } else {
        CompilerMode::Generate
    };

    if cli.optimize && mode != CompilerMode::Generate {
        return argument_error("optimization can only be enabled when compiler mode is code generation");
    }
    if cli.parser_mode == ParserModeArg::Expression && mode != CompilerMode::Parse {
        return argument_error("expressions-only parser mode can only be selected when compiler mode is parsing");
    }
    if cli.symbol_tables && mode != CompilerMode::Parse {
        return argument_error("symbol tables can only be dumped when compiler mode is parsing");
    }

    if cli.input.is_empty() {
        eprintln!("ncc: no input file");
        return EXIT_NO_INPUT_FILE;
    }
    if cli.input.len() > 1 {
        eprintln!("ncc: only one input file per run is supported");
        return EXIT_TOO_MANY_INPUT_FILES;
    }
    let input = &cli.input[0];

    let config = CompilerConfig::new()
        .with_mode(mode)
        .with_optimize(cli.optimize)
        .with_parser_output_mode(match cli.parser_output_mode {
            OutputModeArg::Tree => AstDumpFormat::Tree,
            OutputModeArg::Linear => AstDumpFormat::Linear,
        })
        .with_parser_mode(match cli.parser_mode {
            ParserModeArg::Normal => ParserMode::Normal,
            ParserModeArg::Expression => ParserMode::Expression,
        })
        .with_symbol_tables(cli.symbol_tables);

    let source = match read_input(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ncc: cannot read '{}': {}", input, e);
            return EXIT_IO_ERROR;
        }
    };

    let (text, diagnostics) = match ncc::run_mode(&source, &config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e);
            return match e.kind {
                ErrorKind::Io => EXIT_IO_ERROR,
                _ => EXIT_COMPILE_ERROR,
            };
        }
    };

    for d in &diagnostics {
        eprintln!("{}", d);
    }

    if let Err(e) = write_output(cli.output.as_deref(), &text) {
        eprintln!("ncc: cannot write output: {}", e);
        return EXIT_IO_ERROR;
    }

    EXIT_SUCCESS
}

fn argument_error(message: &str) -> i32 {
    eprintln!("ncc: {}", message);
    EXIT_INVALID_ARGUMENTS
}

fn read_input(name: &str) -> io::Result<String> {
    if name == "-" {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(name)
    }
}

fn write_output(name: Option<&str>, text: &str) -> io::Result<()> {
    match name {
        None | Some("-") => {
            io::stdout().write_all(text.as_bytes())?;
            io::stdout().flush()
        }
        Some(path) => std::fs::write(path, text),
    }
}

fn print_version() {
    println!("ncc, version {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn print_usage() {
    println!("Usage: ncc [options] input-file");
    println!("Try 'ncc --help' for the option list.");
    println!();
}
