//! Pretty-printers for the scan, parse and symbol-table dumps.
//!
//! The scanner dump is one line per token. The AST printers come in two
//! forms: an indented tree with `|- `/`` `- `` branch decorations and a
//! prefix linear form using `{`, `}` and `, `. The symbol printer lists
//! global types, global variables and functions with their block scopes.

use crate::ast::{BlockStatement, Expr, ExprKind, Statement};
use crate::diagnostics::Diagnostic;
use crate::scanner::{Scanner, TokenKind};
use crate::symbols::{Program, SymbolTable};
use std::fmt::Write;

/// Width of the kind-name column in the token dump.
const TOKEN_NAME_FIELD_WIDTH: usize = 31;

/// Scan the whole input and dump one `line TAB column TAB kind TAB text`
/// row per token, the synthetic EOF included. Lexical errors come back
/// as diagnostics; the dump carries the invalid tokens.
pub fn dump_tokens(source: &str) -> (String, Vec<Diagnostic>) {
    let mut scanner = Scanner::new(source);
    let mut out = String::new();

    loop {
        let token = scanner.next_token();
        let _ = writeln!(
            out,
            "{}\t{}\t{:<width$}\t{}",
            token.position.line,
            token.position.column,
            token.kind.name(),
            token.text,
            width = TOKEN_NAME_FIELD_WIDTH,
        );
        if token.kind == TokenKind::Eof {
            break;
        }
    }

    (out, scanner.take_diagnostics())
}

/// How the parse dump renders the AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AstDumpFormat {
    #[default]
    Tree,
    Linear,
}

/// Dump every user-defined function body, preceded by the symbol tables
/// when requested.
pub fn dump_parse(program: &Program, format: AstDumpFormat, symbol_tables: bool) -> String {
    let mut out = String::new();

    if symbol_tables {
        out.push_str(&dump_symbols(program));
    }

    for function in &program.functions {
        if function.builtin {
            continue;
        }
        let Some(body) = function.body.as_ref() else {
            continue;
        };
        let _ = writeln!(out, "{}:", function.name);
        let block = Statement::Block(body.clone());
        match format {
            AstDumpFormat::Tree => out.push_str(&print_statement_tree(&block)),
            AstDumpFormat::Linear => {
                out.push_str(&print_statement_linear(&block));
                out.push('\n');
            }
        }
    }

    out
}

pub fn print_expression(expr: &Expr, format: AstDumpFormat) -> String {
    match format {
        AstDumpFormat::Tree => {
            let mut printer = TreePrinter::new();
            printer.expr(expr);
            printer.out
        }
        AstDumpFormat::Linear => {
            let mut out = String::new();
            linear_expr(expr, &mut out);
            out.push('\n');
            out
        }
    }
}

pub fn print_statement_tree(stmt: &Statement) -> String {
    let mut printer = TreePrinter::new();
    printer.statement(stmt);
    printer.out
}

pub fn print_statement_linear(stmt: &Statement) -> String {
    let mut out = String::new();
    linear_statement(stmt, &mut out);
    out
}

/*
 * Tree form
 */

struct TreePrinter {
    out: String,
    nesting: usize,
    last_child: Vec<bool>,
}

impl TreePrinter {
    fn new() -> Self {
        TreePrinter {
            out: String::new(),
            nesting: 0,
            last_child: vec![true],
        }
    }

    fn set_last(&mut self, level: usize, value: bool) {
        if self.last_child.len() <= level {
            self.last_child.resize(level + 1, false);
        }
        self.last_child[level] = value;
    }

    fn decoration(&mut self) {
        for i in 1..self.nesting {
            if self.last_child.get(i).copied().unwrap_or(false) {
                self.out.push_str("   ");
            } else {
                self.out.push_str("|  ");
            }
        }

        let level = self.nesting + 1;
        self.set_last(level, false);

        if self.nesting > 0 {
            if self.last_child.get(self.nesting).copied().unwrap_or(false) {
                self.out.push_str("`- ");
            } else {
                self.out.push_str("|- ");
            }
        }
    }

    fn line(&mut self, text: &str) {
        self.decoration();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expression(e) => self.expr(e),
            Statement::Null | Statement::Break | Statement::Continue => {
                self.line(&stmt.display_name());
            }
            Statement::Block(b) => {
                self.line("{ }");
                self.nesting += 1;
                let count = b.statements.len();
                for (i, s) in b.statements.iter().enumerate() {
                    if i + 1 == count {
                        self.set_last(self.nesting, true);
                    }
                    self.statement(s);
                }
                self.nesting -= 1;
            }
            Statement::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                self.line("if");
                self.nesting += 1;
                self.expr(cond);
                self.set_last(self.nesting, else_stmt.is_none());
                self.statement(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.set_last(self.nesting, true);
                    self.statement(else_stmt);
                }
                self.nesting -= 1;
            }
            Statement::For {
                init,
                cond,
                update,
                body,
            } => {
                self.line("for");
                self.nesting += 1;
                for e in [init, cond, update].into_iter().flatten() {
                    self.expr(e);
                }
                self.set_last(self.nesting, true);
                self.statement(body);
                self.nesting -= 1;
            }
            Statement::While { cond, body } => {
                self.line("while");
                self.nesting += 1;
                self.expr(cond);
                self.set_last(self.nesting, true);
                self.statement(body);
                self.nesting -= 1;
            }
            Statement::Do { body, cond } => {
                self.line("do");
                self.nesting += 1;
                self.statement(body);
                self.set_last(self.nesting, true);
                self.expr(cond);
                self.nesting -= 1;
            }
            Statement::Label { name, next } => {
                self.line(&format!("{}:", name));
                self.nesting += 1;
                self.set_last(self.nesting, true);
                self.statement(next);
                self.nesting -= 1;
            }
            Statement::CaseLabel { value, next, .. } => {
                self.line("case");
                self.nesting += 1;
                self.line(&value.to_string());
                self.set_last(self.nesting, true);
                self.statement(next);
                self.nesting -= 1;
            }
            Statement::DefaultLabel { next, .. } => {
                self.line("default:");
                self.nesting += 1;
                self.set_last(self.nesting, true);
                self.statement(next);
                self.nesting -= 1;
            }
            Statement::Goto { label, .. } => {
                self.line("goto");
                self.nesting += 1;
                self.set_last(self.nesting, true);
                self.line(label);
                self.nesting -= 1;
            }
            Statement::Return { expr } => {
                self.line("return");
                self.nesting += 1;
                self.set_last(self.nesting, true);
                if let Some(e) = expr {
                    self.expr(e);
                }
                self.nesting -= 1;
            }
            Statement::Switch(s) => {
                self.line("switch");
                self.nesting += 1;
                self.expr(&s.test);
                self.set_last(self.nesting, true);
                self.statement(&s.body);
                self.nesting -= 1;
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntConst(_)
            | ExprKind::FloatConst(_)
            | ExprKind::CharConst(_)
            | ExprKind::StringConst(_)
            | ExprKind::Variable(_)
            | ExprKind::FunctionRef { .. } => {
                self.line(&expr.display_name());
            }
            ExprKind::Unary { arg }
            | ExprKind::AddressOf { arg }
            | ExprKind::Cast { arg }
            | ExprKind::SizeOf { arg } => {
                self.line(&expr.display_name());
                self.nesting += 1;
                self.set_last(self.nesting, true);
                self.expr(arg);
                self.nesting -= 1;
            }
            ExprKind::Postfix { arg } => {
                self.line(&format!("{}(postfix)", expr.display_name()));
                self.nesting += 1;
                self.set_last(self.nesting, true);
                self.expr(arg);
                self.nesting -= 1;
            }
            ExprKind::Binary { left, right } | ExprKind::ArrayAccess { left, right } => {
                self.line(&expr.display_name());
                self.nesting += 1;
                self.expr(left);
                self.set_last(self.nesting, true);
                self.expr(right);
                self.nesting -= 1;
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.line(&expr.display_name());
                self.nesting += 1;
                self.expr(cond);
                self.expr(then_expr);
                self.set_last(self.nesting, true);
                self.expr(else_expr);
                self.nesting -= 1;
            }
            ExprKind::Call { args, .. } => {
                self.line(&expr.display_name());
                self.nesting += 1;
                let count = args.len();
                for (i, a) in args.iter().enumerate() {
                    if i + 1 == count {
                        self.set_last(self.nesting, true);
                    }
                    self.expr(a);
                }
                self.nesting -= 1;
            }
            ExprKind::StructAccess { object: e, field } | ExprKind::IndirectAccess { pointer: e, field } => {
                self.line(&expr.display_name());
                self.nesting += 1;
                self.expr(e);
                self.set_last(self.nesting, true);
                self.line(&field.name);
                self.nesting -= 1;
            }
        }
    }
}

/*
 * Linear form
 */

const LEFT_ENCLOSING: &str = "{";
const RIGHT_ENCLOSING: &str = "}";
const DELIMITER: &str = ", ";

fn linear_statement(stmt: &Statement, out: &mut String) {
    match stmt {
        Statement::Expression(e) => linear_expr(e, out),
        Statement::Null | Statement::Break | Statement::Continue => {
            out.push_str(&stmt.display_name());
        }
        Statement::Block(b) => {
            out.push_str(LEFT_ENCLOSING);
            let count = b.statements.len();
            for (i, s) in b.statements.iter().enumerate() {
                linear_statement(s, out);
                if i + 1 != count {
                    out.push_str(DELIMITER);
                }
            }
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::If {
            cond,
            then_stmt,
            else_stmt,
        } => {
            out.push_str("if");
            out.push_str(LEFT_ENCLOSING);
            linear_expr(cond, out);
            out.push_str(DELIMITER);
            linear_statement(then_stmt, out);
            if let Some(else_stmt) = else_stmt {
                out.push_str(DELIMITER);
                linear_statement(else_stmt, out);
            }
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::For {
            init,
            cond,
            update,
            body,
        } => {
            out.push_str("for");
            out.push_str(LEFT_ENCLOSING);
            for e in [init, cond, update] {
                if let Some(e) = e {
                    linear_expr(e, out);
                }
                out.push_str(DELIMITER);
            }
            linear_statement(body, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::While { cond, body } => {
            out.push_str("while");
            out.push_str(LEFT_ENCLOSING);
            linear_expr(cond, out);
            out.push_str(DELIMITER);
            linear_statement(body, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::Do { body, cond } => {
            out.push_str("do");
            out.push_str(LEFT_ENCLOSING);
            linear_statement(body, out);
            out.push_str(DELIMITER);
            linear_expr(cond, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::Label { name, next } => {
            out.push_str(name);
            out.push(':');
            out.push_str(LEFT_ENCLOSING);
            linear_statement(next, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::CaseLabel { value, next, .. } => {
            out.push_str("case");
            out.push_str(LEFT_ENCLOSING);
            out.push_str(&value.to_string());
            out.push_str(DELIMITER);
            linear_statement(next, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::DefaultLabel { next, .. } => {
            out.push_str("default:");
            out.push_str(LEFT_ENCLOSING);
            linear_statement(next, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::Goto { label, .. } => {
            out.push_str("goto");
            out.push_str(LEFT_ENCLOSING);
            out.push_str(label);
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::Return { expr } => {
            out.push_str("return");
            out.push_str(LEFT_ENCLOSING);
            if let Some(e) = expr {
                linear_expr(e, out);
            }
            out.push_str(RIGHT_ENCLOSING);
        }
        Statement::Switch(s) => {
            out.push_str("switch");
            out.push_str(LEFT_ENCLOSING);
            linear_expr(&s.test, out);
            out.push_str(DELIMITER);
            linear_statement(&s.body, out);
            out.push_str(RIGHT_ENCLOSING);
        }
    }
}

fn linear_expr(expr: &Expr, out: &mut String) {
    match &expr.kind {
        ExprKind::IntConst(_)
        | ExprKind::FloatConst(_)
        | ExprKind::CharConst(_)
        | ExprKind::StringConst(_)
        | ExprKind::Variable(_)
        | ExprKind::FunctionRef { .. } => {
            out.push_str(&expr.display_name());
        }
        ExprKind::Unary { arg }
        | ExprKind::AddressOf { arg }
        | ExprKind::Cast { arg }
        | ExprKind::SizeOf { arg } => {
            out.push_str(&expr.display_name());
            out.push_str(LEFT_ENCLOSING);
            linear_expr(arg, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        ExprKind::Postfix { arg } => {
            out.push_str(&expr.display_name());
            out.push_str("(postfix)");
            out.push_str(LEFT_ENCLOSING);
            linear_expr(arg, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        ExprKind::Binary { left, right } | ExprKind::ArrayAccess { left, right } => {
            out.push_str(&expr.display_name());
            out.push_str(LEFT_ENCLOSING);
            linear_expr(left, out);
            out.push_str(DELIMITER);
            linear_expr(right, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            out.push_str(&expr.display_name());
            out.push_str(LEFT_ENCLOSING);
            linear_expr(cond, out);
            out.push_str(DELIMITER);
            linear_expr(then_expr, out);
            out.push_str(DELIMITER);
            linear_expr(else_expr, out);
            out.push_str(RIGHT_ENCLOSING);
        }
        ExprKind::Call { args, .. } => {
            out.push_str(&expr.display_name());
            out.push_str(LEFT_ENCLOSING);
            let count = args.len();
            for (i, a) in args.iter().enumerate() {
                linear_expr(a, out);
                if i + 1 != count {
                    out.push_str(DELIMITER);
                }
            }
            out.push_str(RIGHT_ENCLOSING);
        }
        ExprKind::StructAccess { object: e, field } | ExprKind::IndirectAccess { pointer: e, field } => {
            out.push_str(&expr.display_name());
            out.push_str(LEFT_ENCLOSING);
            linear_expr(e, out);
            out.push_str(DELIMITER);
            out.push_str(&field.name);
            out.push_str(RIGHT_ENCLOSING);
        }
    }
}

/*
 * Symbol tables
 */

/// Global types, global variables and functions, with per-block scopes.
pub fn dump_symbols(program: &Program) -> String {
    let mut out = String::new();
    let types = &program.types;

    out.push_str("Global types:\n");
    for (_, ty) in program.globals.type_names() {
        let _ = writeln!(out, "\t{}", types.name(ty));
    }
    out.push('\n');

    out.push_str("Global variables:\n");
    for var in program.globals.variables() {
        let _ = writeln!(out, "\t{}: {}", var.name, types.name(var.ty));
    }
    out.push('\n');

    out.push_str("Functions:\n");
    for function in &program.functions {
        if function.builtin {
            continue;
        }
        let _ = writeln!(out, "\t{}: {}", function.name, types.name(function.return_type));
        for param in function.parameters.variables() {
            let _ = writeln!(out, "\t\t{}: {}", param.name, types.name(param.ty));
        }
        out.push('\n');

        if let Some(body) = function.body.as_ref() {
            dump_block_symbols(body, types, 1, &mut out);
        }
    }
    out.push('\n');

    out
}

fn dump_block_symbols(
    block: &BlockStatement,
    types: &crate::symbols::TypeTable,
    nesting: usize,
    out: &mut String,
) {
    let indent = "\t".repeat(nesting);

    let _ = writeln!(out, "{}{{", indent);
    dump_table(&block.locals, types, nesting, out);

    for nested in nested_blocks(block) {
        dump_block_symbols(nested, types, nesting + 1, out);
    }

    let _ = writeln!(out, "{}}}", indent);
}

fn dump_table(table: &SymbolTable, types: &crate::symbols::TypeTable, nesting: usize, out: &mut String) {
    let indent = "\t".repeat(nesting);

    let _ = writeln!(out, "{}Block types:", indent);
    for (_, ty) in table.type_names() {
        let _ = writeln!(out, "{}\t{}", indent, types.name(ty));
    }

    let _ = writeln!(out, "{}Block variables:", indent);
    for var in table.variables() {
        let _ = writeln!(out, "{}\t{}: {}", indent, var.name, types.name(var.ty));
    }
}

/// Direct nested block statements, in source order.
fn nested_blocks(block: &BlockStatement) -> Vec<&BlockStatement> {
    let mut blocks = Vec::new();
    for stmt in &block.statements {
        collect_blocks(stmt, &mut blocks);
    }
    blocks
}

fn collect_blocks<'a>(stmt: &'a Statement, blocks: &mut Vec<&'a BlockStatement>) {
    match stmt {
        Statement::Block(b) => blocks.push(b),
        Statement::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            collect_blocks(then_stmt, blocks);
            if let Some(s) = else_stmt {
                collect_blocks(s, blocks);
            }
        }
        Statement::For { body, .. }
        | Statement::While { body, .. }
        | Statement::Do { body, .. } => collect_blocks(body, blocks),
        Statement::Label { next, .. }
        | Statement::CaseLabel { next, .. }
        | Statement::DefaultLabel { next, .. } => collect_blocks(next, blocks),
        Statement::Switch(s) => collect_blocks(&s.body, blocks),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parse_expr(source: &str) -> Expr {
        Parser::new(source).parse_expression_only().unwrap().0
    }

    fn parse(source: &str) -> Program {
        Parser::new(source).parse_translation_unit().unwrap()
    }

    #[test]
    fn test_token_dump_format() {
        let (dump, diagnostics) = dump_tokens("int x;");
        assert!(diagnostics.is_empty());
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("1\t1\tIDENTIFIER"));
        assert!(lines[0].ends_with("\tint"));
        assert!(lines[1].starts_with("1\t5\tIDENTIFIER"));
        assert!(lines[2].starts_with("1\t6\tSEPARATOR_SEMICOLON"));
        assert!(lines[3].contains("EOF"));
    }

    #[test]
    fn test_token_dump_of_blank_input_is_one_eof_line() {
        let (dump, _) = dump_tokens("  /* only air */  ");
        assert_eq!(dump.lines().count(), 1);
        assert!(dump.contains("EOF"));
    }

    #[test]
    fn test_token_dump_keeps_invalid_tokens() {
        let (dump, diagnostics) = dump_tokens("a @ b");
        assert!(dump.contains("INVALID"));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_linear_expression() {
        let e = parse_expr("1 + 2 * 3");
        assert_eq!(print_expression(&e, AstDumpFormat::Linear), "+{1, *{2, 3}}\n");
    }

    #[test]
    fn test_linear_conditional_and_unary() {
        let e = parse_expr("-1 ? 2 : 3");
        assert_eq!(
            print_expression(&e, AstDumpFormat::Linear),
            "?:{-{1}, 2, 3}\n"
        );
    }

    #[test]
    fn test_tree_expression() {
        let e = parse_expr("1 + 2 * 3");
        let expected = "+\n\
                        |- 1\n\
                        `- *\n\
                        \x20  |- 2\n\
                        \x20  `- 3\n";
        assert_eq!(print_expression(&e, AstDumpFormat::Tree), expected);
    }

    #[test]
    fn test_tree_statement_dump_of_function() {
        let program = parse("int main() { return 0; }");
        let dump = dump_parse(&program, AstDumpFormat::Tree, false);
        let expected = "main:\n\
                        { }\n\
                        `- return\n\
                        \x20  `- 0\n";
        assert_eq!(dump, expected);
    }

    #[test]
    fn test_linear_statement_dump() {
        let program = parse("int main() { int a; a = 1; return a; }");
        let dump = dump_parse(&program, AstDumpFormat::Linear, false);
        assert_eq!(dump, "main:\n{={a, 1}, return{a}}\n");
    }

    #[test]
    fn test_builtins_hidden_from_parse_dump() {
        let program = parse("int main() { return 0; }");
        let dump = dump_parse(&program, AstDumpFormat::Tree, false);
        assert!(!dump.contains("__print_int"));
    }

    #[test]
    fn test_symbols_dump_sections() {
        let program = parse(
            "int g; int add(int a, int b) { int r; r = a + b; return r; }",
        );
        let dump = dump_symbols(&program);
        assert!(dump.contains("Global types:"));
        assert!(dump.contains("\tint\n"));
        assert!(dump.contains("Global variables:"));
        assert!(dump.contains("\tg: int\n"));
        assert!(dump.contains("Functions:"));
        assert!(dump.contains("\tadd: int\n"));
        assert!(dump.contains("\t\ta: int\n"));
        assert!(dump.contains("Block variables:"));
        assert!(dump.contains("\t\tr: int\n"));
    }

    #[test]
    fn test_symbols_dump_shows_pointer_and_array_types() {
        let program = parse("int *p; float v[3]; int main() { return 0; }");
        let dump = dump_symbols(&program);
        assert!(dump.contains("p: int *"));
        assert!(dump.contains("v: float[3]"));
    }

    #[test]
    fn test_case_label_tree() {
        let program = parse(
            "int main() { switch (1) { case 2: return 0; } return 1; }",
        );
        let dump = dump_parse(&program, AstDumpFormat::Tree, false);
        assert!(dump.contains("case\n"));
        assert!(dump.contains("|- 2\n"));
    }

    #[test]
    fn test_goto_linear() {
        let program = parse("int main() { goto out; out: return 0; }");
        let dump = dump_parse(&program, AstDumpFormat::Linear, false);
        assert!(dump.contains("goto{out}"));
        assert!(dump.contains("out:{return{0}}"));
    }
}
