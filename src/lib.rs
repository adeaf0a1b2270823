//! ncc — a compiler for a practical C subset targeting 32-bit x86.
//!
//! The pipeline is the classic one: a hand-written scanner feeds a
//! recursive-descent parser that builds an annotated AST plus scoped
//! symbol tables while type-checking; a tree-walking code generator
//! lowers the AST to stack-machine x86 in AT&T syntax; two small
//! optimizer layers (tree passes and a peephole pass) run when enabled.
//!
//! # Example
//!
//! ```rust
//! use ncc::compile_to_asm;
//!
//! let asm = compile_to_asm("int main() { return 0; }", false).unwrap();
//! assert!(asm.contains("main:"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod optimizer;
pub mod parser;
pub mod pretty;
pub mod scanner;
pub mod symbols;

pub use config::{CompilerConfig, CompilerMode};
pub use diagnostics::{CompileError, Diagnostic, ErrorKind, Position, Severity};
pub use parser::{Parser, ParserMode};
pub use pretty::AstDumpFormat;
pub use scanner::{Scanner, Token, TokenKind};
pub use symbols::Program;

use codegen::{peephole_optimize, CodeGen};
use std::fs;
use std::path::Path;

/// Scan `source` and return the token dump plus any lexical
/// diagnostics. Scanning continues past malformed lexemes.
pub fn scan_source(source: &str) -> (String, Vec<Diagnostic>) {
    pretty::dump_tokens(source)
}

/// Parse `source` and return the AST dump configured by `config`.
pub fn parse_source(source: &str, config: &CompilerConfig) -> Result<String, CompileError> {
    match config.parser_mode {
        ParserMode::Expression => {
            let (expr, _program) = Parser::new(source).parse_expression_only()?;
            Ok(pretty::print_expression(&expr, config.parser_output_mode))
        }
        ParserMode::Normal => {
            let program = Parser::new(source).parse_translation_unit()?;
            Ok(pretty::dump_parse(
                &program,
                config.parser_output_mode,
                config.symbol_tables,
            ))
        }
    }
}

/// Compile `source` to assembly text, optionally running the tree and
/// peephole optimizers.
pub fn compile_to_asm(source: &str, optimize: bool) -> Result<String, CompileError> {
    let mut program = Parser::new(source).parse_translation_unit()?;

    if optimize {
        optimizer::optimize_program(&mut program);
    }

    let mut asm = CodeGen::new(&program, optimize).run();

    if optimize {
        peephole_optimize(&mut asm);
    }

    let mut out = String::new();
    asm.write_to(&mut out)?;
    Ok(out)
}

/// Run the mode selected by `config` over `source`.
///
/// The scan dump never fails; its lexical diagnostics come back in the
/// second slot so the driver can forward them to the error stream.
pub fn run_mode(source: &str, config: &CompilerConfig) -> Result<(String, Vec<Diagnostic>), CompileError> {
    match config.mode {
        CompilerMode::Scan => Ok(scan_source(source)),
        CompilerMode::Parse => Ok((parse_source(source, config)?, Vec::new())),
        CompilerMode::Generate => Ok((compile_to_asm(source, config.optimize)?, Vec::new())),
    }
}

/// Compile `input` into `output` with the given configuration.
pub fn compile_file(input: &Path, output: &Path, config: &CompilerConfig) -> Result<(), CompileError> {
    let source = fs::read_to_string(input).map_err(|e| CompileError {
        kind: ErrorKind::Io,
        position: Position::default(),
        message: format!("cannot read '{}': {}", input.display(), e),
    })?;

    let (text, diagnostics) = run_mode(&source, config)?;
    for d in &diagnostics {
        eprintln!("{}", d);
    }

    fs::write(output, text).map_err(|e| CompileError {
        kind: ErrorKind::Io,
        position: Position::default(),
        message: format!("cannot write '{}': {}", output.display(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_minimal_program() {
        let asm = compile_to_asm("int main() { return 0; }", false).unwrap();
        assert!(asm.starts_with(".data\n"));
        assert!(asm.contains(".globl\tmain"));
        assert!(asm.ends_with(".end\n"));
    }

    #[test]
    fn test_compile_error_carries_position() {
        let err = compile_to_asm("int main() { undeclared = 1; return 0; }", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert_eq!(err.position.line, 1);
        assert!(err.position.column > 1);
    }

    #[test]
    fn test_optimized_and_plain_outputs_both_well_formed() {
        let source = "int main() { int a; a = 2 + 3; return a; }";
        for optimize in [false, true] {
            let asm = compile_to_asm(source, optimize).unwrap();
            assert!(asm.contains(".text"));
            assert!(asm.contains("\tret"));
        }
    }

    #[test]
    fn test_run_mode_scan_reports_diagnostics() {
        let config = CompilerConfig::new().with_mode(CompilerMode::Scan);
        let (dump, diagnostics) = run_mode("int @;", &config).unwrap();
        assert!(dump.contains("INVALID"));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_run_mode_parse_expression() {
        let config = CompilerConfig::new()
            .with_mode(CompilerMode::Parse)
            .with_parser_mode(ParserMode::Expression)
            .with_parser_output_mode(AstDumpFormat::Linear);
        let (dump, _) = run_mode("1 + 2", &config).unwrap();
        assert_eq!(dump, "+{1, 2}\n");
    }

    #[test]
    fn test_compile_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("prog.c");
        let output = dir.path().join("prog.s");
        std::fs::write(&input, "int main() { return 0; }").unwrap();

        compile_file(&input, &output, &CompilerConfig::new()).unwrap();

        let asm = std::fs::read_to_string(&output).unwrap();
        assert!(asm.contains("main:"));
    }

    #[test]
    fn test_compile_file_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_file(
            &dir.path().join("missing.c"),
            &dir.path().join("out.s"),
            &CompilerConfig::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
