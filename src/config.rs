//! Compiler configuration.
//!
//! A plain data struct wiring the driver: which stage to run, whether
//! the optimizers are on, and how the parse dump renders. The CLI fills
//! one of these in; library users build it directly.

use crate::parser::ParserMode;
use crate::pretty::AstDumpFormat;

/// Which stage the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilerMode {
    /// Dump the token stream.
    Scan,
    /// Dump the AST (and optionally the symbol tables).
    Parse,
    /// Emit assembly.
    #[default]
    Generate,
}

/// Configuration for one compiler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompilerConfig {
    pub mode: CompilerMode,
    /// Enables both the AST passes and the peephole pass. Only
    /// meaningful in generate mode.
    pub optimize: bool,
    /// Tree or linear AST dump (parse mode).
    pub parser_output_mode: AstDumpFormat,
    /// Whole translation unit or a single expression (parse mode).
    pub parser_mode: ParserMode,
    /// Prepend the symbol-table dump to the parse dump.
    pub symbol_tables: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_mode(mut self, mode: CompilerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_parser_output_mode(mut self, format: AstDumpFormat) -> Self {
        self.parser_output_mode = format;
        self
    }

    pub fn with_parser_mode(mut self, mode: ParserMode) -> Self {
        self.parser_mode = mode;
        self
    }

    pub fn with_symbol_tables(mut self, on: bool) -> Self {
        self.symbol_tables = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::new();
        assert_eq!(config.mode, CompilerMode::Generate);
        assert!(!config.optimize);
        assert_eq!(config.parser_output_mode, AstDumpFormat::Tree);
        assert_eq!(config.parser_mode, ParserMode::Normal);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_mode(CompilerMode::Parse)
            .with_parser_output_mode(AstDumpFormat::Linear)
            .with_symbol_tables(true);
        assert_eq!(config.mode, CompilerMode::Parse);
        assert_eq!(config.parser_output_mode, AstDumpFormat::Linear);
        assert!(config.symbol_tables);
    }
}
