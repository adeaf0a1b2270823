//! Tree-level optimization passes.
//!
//! Three passes run over every function body when optimization is
//! enabled, in this order:
//!
//! 1. **Constant folding** replaces every fully-constant unary, binary
//!    and conditional expression with a single constant node carrying
//!    the original's result type.
//! 2. **Unreachable-code elimination** drops statements following a
//!    `return`/`break`/`continue` in the same block, suppressed in
//!    blocks that contain labels or gotos so no jump target is orphaned.
//! 3. **Loop-invariant hoisting** moves call-free, address-free
//!    expression statements out of loop bodies when none of the
//!    variables they read are written anywhere in the loop.
//!
//! The folder is idempotent and the passes are applied once each.

use crate::ast::{BlockStatement, Expr, ExprKind, Statement};
use crate::scanner::TokenKind;
use crate::symbols::{Program, TypeTable};
use std::collections::HashSet;

/// Run all tree passes over every defined function.
pub fn optimize_program(program: &mut Program) {
    let (types, functions) = program.types_and_functions_mut();
    for function in functions.iter_mut() {
        if let Some(body) = function.body.as_mut() {
            fold_block(body, types);
            eliminate_in_block(body);
            hoist_in_block(body);
        }
    }
}

/*
 * Constant evaluation
 */

/// The value of a constant expression: an int or a float, promoted the
/// way C promotes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Float(f32),
}

impl ConstValue {
    pub fn is_truthy(self) -> bool {
        match self {
            ConstValue::Int(v) => v != 0,
            ConstValue::Float(v) => v != 0.0,
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            ConstValue::Int(v) => v as f32,
            ConstValue::Float(v) => v,
        }
    }

    /// Truncation toward zero, as a C cast does.
    pub fn as_i32(self) -> i32 {
        match self {
            ConstValue::Int(v) => v,
            ConstValue::Float(v) => v as i32,
        }
    }

    fn int(self) -> Option<i32> {
        match self {
            ConstValue::Int(v) => Some(v),
            ConstValue::Float(_) => None,
        }
    }
}

/// Evaluate a constant expression with C semantics: integer division
/// truncates toward zero, `%` takes the dividend's sign, shifts are
/// arithmetic, comparisons and logical connectives yield 0 or 1.
/// Returns `None` for anything that is not evaluable (variables, calls,
/// strings, casts, `sizeof`, division by zero).
pub fn eval_const_expr(expr: &Expr) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::IntConst(v) => Some(ConstValue::Int(*v)),
        ExprKind::FloatConst(v) => Some(ConstValue::Float(*v)),
        ExprKind::CharConst(c) => Some(ConstValue::Int(*c as i32)),
        ExprKind::Unary { arg } => {
            let v = eval_const_expr(arg)?;
            match expr.op {
                TokenKind::Plus => Some(v),
                TokenKind::Minus => Some(match v {
                    ConstValue::Int(i) => ConstValue::Int(i.wrapping_neg()),
                    ConstValue::Float(f) => ConstValue::Float(-f),
                }),
                TokenKind::LogicNot => Some(ConstValue::Int(if v.is_truthy() { 0 } else { 1 })),
                TokenKind::BitwiseNot => Some(ConstValue::Int(!v.int()?)),
                _ => None,
            }
        }
        ExprKind::Binary { left, right } => {
            let l = eval_const_expr(left)?;
            let r = eval_const_expr(right)?;
            eval_binary(expr.op, l, r)
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            let c = eval_const_expr(cond)?;
            if c.is_truthy() {
                eval_const_expr(then_expr)
            } else {
                eval_const_expr(else_expr)
            }
        }
        _ => None,
    }
}

fn eval_binary(op: TokenKind, l: ConstValue, r: ConstValue) -> Option<ConstValue> {
    use ConstValue::{Float, Int};

    let both_int = matches!((l, r), (Int(_), Int(_)));

    match op {
        TokenKind::Plus | TokenKind::Minus | TokenKind::Asterisk | TokenKind::Slash => {
            if both_int {
                let (a, b) = (l.as_i32(), r.as_i32());
                let v = match op {
                    TokenKind::Plus => a.wrapping_add(b),
                    TokenKind::Minus => a.wrapping_sub(b),
                    TokenKind::Asterisk => a.wrapping_mul(b),
                    TokenKind::Slash => {
                        if b == 0 {
                            return None;
                        }
                        a.wrapping_div(b)
                    }
                    _ => unreachable!(),
                };
                Some(Int(v))
            } else {
                let (a, b) = (l.as_f32(), r.as_f32());
                let v = match op {
                    TokenKind::Plus => a + b,
                    TokenKind::Minus => a - b,
                    TokenKind::Asterisk => a * b,
                    TokenKind::Slash => a / b,
                    _ => unreachable!(),
                };
                Some(Float(v))
            }
        }
        TokenKind::Percent => {
            let (a, b) = (l.int()?, r.int()?);
            if b == 0 {
                return None;
            }
            Some(Int(a.wrapping_rem(b)))
        }
        TokenKind::ShiftLeft => Some(Int(l.int()?.wrapping_shl(r.int()? as u32))),
        TokenKind::ShiftRight => Some(Int(l.int()?.wrapping_shr(r.int()? as u32))),
        TokenKind::Ampersand => Some(Int(l.int()? & r.int()?)),
        TokenKind::BitwiseOr => Some(Int(l.int()? | r.int()?)),
        TokenKind::BitwiseXor => Some(Int(l.int()? ^ r.int()?)),
        TokenKind::LogicAnd => Some(Int((l.is_truthy() && r.is_truthy()) as i32)),
        TokenKind::LogicOr => Some(Int((l.is_truthy() || r.is_truthy()) as i32)),
        TokenKind::Equal
        | TokenKind::NotEqual
        | TokenKind::LessThan
        | TokenKind::GreaterThan
        | TokenKind::LessThanOrEqual
        | TokenKind::GreaterThanOrEqual => {
            let result = if both_int {
                let (a, b) = (l.as_i32(), r.as_i32());
                compare(op, a.partial_cmp(&b)?)
            } else {
                let (a, b) = (l.as_f32(), r.as_f32());
                compare(op, a.partial_cmp(&b)?)
            };
            Some(Int(result as i32))
        }
        TokenKind::Comma => Some(r),
        _ => None,
    }
}

fn compare(op: TokenKind, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match op {
        TokenKind::Equal => ordering == Equal,
        TokenKind::NotEqual => ordering != Equal,
        TokenKind::LessThan => ordering == Less,
        TokenKind::GreaterThan => ordering == Greater,
        TokenKind::LessThanOrEqual => ordering != Greater,
        TokenKind::GreaterThanOrEqual => ordering != Less,
        _ => false,
    }
}

/*
 * Constant folding
 */

fn fold_block(block: &mut BlockStatement, types: &TypeTable) {
    for stmt in &mut block.statements {
        fold_statement(stmt, types);
    }
}

fn fold_statement(stmt: &mut Statement, types: &TypeTable) {
    match stmt {
        Statement::Expression(e) => fold_expr(e, types),
        Statement::Block(b) => fold_block(b, types),
        Statement::If {
            cond,
            then_stmt,
            else_stmt,
        } => {
            fold_expr(cond, types);
            fold_statement(then_stmt, types);
            if let Some(s) = else_stmt {
                fold_statement(s, types);
            }
        }
        Statement::For {
            init,
            cond,
            update,
            body,
        } => {
            for e in [init, cond, update].into_iter().flatten() {
                fold_expr(e, types);
            }
            fold_statement(body, types);
        }
        Statement::While { cond, body } | Statement::Do { body, cond } => {
            fold_expr(cond, types);
            fold_statement(body, types);
        }
        Statement::Label { next, .. }
        | Statement::CaseLabel { next, .. }
        | Statement::DefaultLabel { next, .. } => fold_statement(next, types),
        Statement::Return { expr: Some(e) } => fold_expr(e, types),
        Statement::Switch(s) => {
            fold_expr(&mut s.test, types);
            fold_statement(&mut s.body, types);
        }
        _ => {}
    }
}

fn fold_expr(expr: &mut Expr, types: &TypeTable) {
    match &mut expr.kind {
        ExprKind::Unary { arg } | ExprKind::Postfix { arg } => fold_expr(arg, types),
        ExprKind::AddressOf { arg } | ExprKind::Cast { arg } | ExprKind::SizeOf { arg } => {
            fold_expr(arg, types)
        }
        ExprKind::Binary { left, right } | ExprKind::ArrayAccess { left, right } => {
            fold_expr(left, types);
            fold_expr(right, types);
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            fold_expr(cond, types);
            fold_expr(then_expr, types);
            fold_expr(else_expr, types);
        }
        ExprKind::Call { args, .. } => {
            for a in args {
                fold_expr(a, types);
            }
        }
        ExprKind::StructAccess { object: e, .. } | ExprKind::IndirectAccess { pointer: e, .. } => {
            fold_expr(e, types)
        }
        _ => {}
    }

    // Only operator nodes collapse; constants already are their own
    // folded form.
    let foldable = matches!(
        expr.kind,
        ExprKind::Unary { .. } | ExprKind::Binary { .. } | ExprKind::Conditional { .. }
    );
    if !foldable || !expr.is_const() {
        return;
    }
    let Some(value) = eval_const_expr(expr) else {
        return;
    };

    // The replacement keeps the node's annotated result type.
    if types.is_float(expr.ty) {
        expr.kind = ExprKind::FloatConst(value.as_f32());
        expr.op = TokenKind::ConstFloat;
    } else if types.is_int(expr.ty) {
        expr.kind = ExprKind::IntConst(value.as_i32());
        expr.op = TokenKind::ConstInteger;
    }
}

/*
 * Unreachable-code elimination
 */

fn eliminate_in_block(block: &mut BlockStatement) {
    // Truncation is suppressed in blocks carrying labels or gotos so no
    // jump target gets orphaned.
    let suppress = block.statements.iter().any(|s| {
        matches!(
            s,
            Statement::Goto { .. }
                | Statement::Label { .. }
                | Statement::CaseLabel { .. }
                | Statement::DefaultLabel { .. }
        )
    });

    let mut cut_at = None;
    for (i, stmt) in block.statements.iter_mut().enumerate() {
        eliminate_in_statement(stmt);

        if !suppress
            && cut_at.is_none()
            && matches!(
                stmt,
                Statement::Return { .. } | Statement::Break | Statement::Continue
            )
        {
            cut_at = Some(i + 1);
        }
    }

    if let Some(end) = cut_at {
        block.statements.truncate(end);
    }
}

fn eliminate_in_statement(stmt: &mut Statement) {
    match stmt {
        Statement::Block(b) => eliminate_in_block(b),
        Statement::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            eliminate_in_statement(then_stmt);
            if let Some(s) = else_stmt {
                eliminate_in_statement(s);
            }
        }
        Statement::For { body, .. }
        | Statement::While { body, .. }
        | Statement::Do { body, .. } => eliminate_in_statement(body),
        Statement::Label { next, .. }
        | Statement::CaseLabel { next, .. }
        | Statement::DefaultLabel { next, .. } => eliminate_in_statement(next),
        Statement::Switch(s) => eliminate_in_statement(&mut s.body),
        _ => {}
    }
}

/*
 * Loop-invariant hoisting
 */

fn hoist_in_block(block: &mut BlockStatement) {
    let mut i = 0;
    while i < block.statements.len() {
        // Inner constructs first, so invariants can bubble outward.
        hoist_in_statement(&mut block.statements[i]);

        let is_loop = matches!(
            block.statements[i],
            Statement::For { .. } | Statement::While { .. } | Statement::Do { .. }
        );
        if is_loop {
            // Variables written anywhere in the loop, its condition and
            // its update included.
            let mut affected = HashSet::new();
            block.statements[i].collect_affected(&mut affected);

            let hoisted = extract_invariants(&mut block.statements[i], &affected);
            let count = hoisted.len();
            for (k, s) in hoisted.into_iter().enumerate() {
                block.statements.insert(i + k, s);
            }
            i += count;
        }

        i += 1;
    }
}

fn hoist_in_statement(stmt: &mut Statement) {
    match stmt {
        Statement::Block(b) => hoist_in_block(b),
        Statement::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            hoist_in_statement(then_stmt);
            if let Some(s) = else_stmt {
                hoist_in_statement(s);
            }
        }
        Statement::For { body, .. }
        | Statement::While { body, .. }
        | Statement::Do { body, .. } => {
            if let Statement::Block(b) = body.as_mut() {
                hoist_in_block(b);
            }
        }
        Statement::Label { next, .. }
        | Statement::CaseLabel { next, .. }
        | Statement::DefaultLabel { next, .. } => hoist_in_statement(next),
        Statement::Switch(s) => hoist_in_statement(&mut s.body),
        _ => {}
    }
}

/// Remove and return the hoistable top-level expression statements of
/// the loop's body block, preserving their mutual order.
fn extract_invariants(loop_stmt: &mut Statement, affected: &HashSet<String>) -> Vec<Statement> {
    let body = match loop_stmt {
        Statement::For { body, .. } | Statement::While { body, .. } | Statement::Do { body, .. } => {
            body
        }
        _ => return Vec::new(),
    };
    let Statement::Block(block) = body.as_mut() else {
        return Vec::new();
    };

    let mut hoisted = Vec::new();
    let mut i = 0;
    while i < block.statements.len() {
        let movable = match &block.statements[i] {
            Statement::Expression(e) if e.can_be_hoisted() => {
                let mut used = HashSet::new();
                e.collect_used(&mut used);
                used.is_disjoint(affected)
            }
            _ => false,
        };
        if movable {
            hoisted.push(block.statements.remove(i));
        } else {
            i += 1;
        }
    }
    hoisted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::symbols::Program;

    fn parse(source: &str) -> Program {
        Parser::new(source).parse_translation_unit().unwrap()
    }

    fn optimized(source: &str) -> Program {
        let mut program = parse(source);
        optimize_program(&mut program);
        program
    }

    fn main_statements(program: &Program) -> &[Statement] {
        let id = program.find_function("main").unwrap();
        &program.function(id).body.as_ref().unwrap().statements
    }

    fn rhs_of(stmt: &Statement) -> &Expr {
        let Statement::Expression(e) = stmt else {
            panic!("expected expression statement");
        };
        let ExprKind::Binary { right, .. } = &e.kind else {
            panic!("expected assignment");
        };
        right
    }

    #[test]
    fn test_eval_integer_arithmetic() {
        use ConstValue::Int;
        let cases: &[(&str, i32)] = &[
            ("2 + 6", 8),
            ("7 - 4", 3),
            ("3 * 5", 15),
            ("5 / 2", 2),
            ("-7 / 2", -3),
            ("7 % 3", 1),
            ("-7 % 3", -1),
            ("4 << 2", 16),
            ("28 >> 1", 14),
            ("5 | 2", 7),
            ("6 & 5", 4),
            ("5 ^ 6", 3),
            ("~5", -6),
            ("!5", 0),
            ("!0", 1),
            ("2 && 5", 1),
            ("4 && 0", 0),
            ("0 || 7", 1),
            ("0 || 0", 0),
            ("3 == 3", 1),
            ("2 != 5", 1),
            ("2 < 7", 1),
            ("8 >= 9", 0),
            ("5 ? 2 : 4", 2),
            ("0 ? 2 : 4", 4),
        ];
        for (source, expected) in cases {
            let (expr, _) = Parser::new(source).parse_expression_only().unwrap();
            assert_eq!(eval_const_expr(&expr), Some(Int(*expected)), "{}", source);
        }
    }

    #[test]
    fn test_eval_float_arithmetic() {
        let (expr, _) = Parser::new("7.35 - 4").parse_expression_only().unwrap();
        let Some(ConstValue::Float(v)) = eval_const_expr(&expr) else {
            panic!("expected float result");
        };
        assert!((v - 3.35).abs() < 1e-5);
    }

    #[test]
    fn test_eval_division_by_zero_is_not_constant() {
        let (expr, _) = Parser::new("1 / 0").parse_expression_only().unwrap();
        assert_eq!(eval_const_expr(&expr), None);
    }

    #[test]
    fn test_fold_rewrites_literal_expressions() {
        let program = optimized("int main() { int a; a = 2 + 6; return a; }");
        let rhs = rhs_of(&main_statements(&program)[0]);
        assert_eq!(rhs.kind, ExprKind::IntConst(8));
    }

    #[test]
    fn test_fold_preserves_float_result_type() {
        // `!3.4` is int-valued 0, assigned to a float.
        let program = optimized("int main() { float b; b = 2 + 6.5; b = 7.35 - 4; return 0; }");
        let stmts = main_statements(&program);
        let ExprKind::FloatConst(v) = rhs_of(&stmts[0]).kind else {
            panic!("expected float constant");
        };
        assert!((v - 8.5).abs() < 1e-5);
    }

    #[test]
    fn test_fold_comma_and_conditional() {
        let program = optimized("int main() { int a; a = (3, 7); a = 5 ? 2 : 4; return a; }");
        let stmts = main_statements(&program);
        assert_eq!(rhs_of(&stmts[0]).kind, ExprKind::IntConst(7));
        assert_eq!(rhs_of(&stmts[1]).kind, ExprKind::IntConst(2));
    }

    #[test]
    fn test_fold_is_idempotent() {
        let mut program = parse(
            "int main() { int a; a = 1 + 2 * 3 - (4 / 2); a = a + 1; return !a; }",
        );
        optimize_program(&mut program);
        let once = program.clone();
        optimize_program(&mut program);
        assert_eq!(once, program);
    }

    #[test]
    fn test_unreachable_code_removed_after_return() {
        let program = optimized("int main() { int a; return 0; a = 1; a = 2; }");
        assert_eq!(main_statements(&program).len(), 1);
    }

    #[test]
    fn test_unreachable_code_kept_when_label_present() {
        let program = optimized(
            "int main() { goto skip; return 1; skip: return 0; }",
        );
        assert_eq!(main_statements(&program).len(), 3);
    }

    #[test]
    fn test_unreachable_removal_inside_loop_body() {
        let program = optimized(
            "int main() { int i; for (i = 0; i < 3; i++) { continue; i = 9; } return i; }",
        );
        let Statement::For { body, .. } = &main_statements(&program)[0] else {
            panic!("expected for loop");
        };
        let Statement::Block(b) = body.as_ref() else {
            panic!("expected block body");
        };
        assert_eq!(b.statements.len(), 1);
    }

    #[test]
    fn test_invariant_statement_hoisted() {
        let source = "
            int main() {
                int i;
                int t;
                int a;
                int s;
                a = 3;
                s = 0;
                for (i = 0; i < 10; i++) {
                    t = a * 2;
                    s += i;
                }
                return s + t;
            }";
        let program = optimized(source);
        let stmts = main_statements(&program);
        // a=3; s=0; t=a*2; for...
        assert!(matches!(&stmts[2], Statement::Expression(e)
            if matches!(&e.kind, ExprKind::Binary { left, .. }
                if matches!(&left.kind, ExprKind::Variable(v) if v.name == "t"))));
        assert!(matches!(&stmts[3], Statement::For { .. }));

        let Statement::For { body, .. } = &stmts[3] else {
            panic!();
        };
        let Statement::Block(b) = body.as_ref() else {
            panic!();
        };
        assert_eq!(b.statements.len(), 1);
    }

    #[test]
    fn test_statement_using_loop_counter_not_hoisted() {
        let source = "
            int main() {
                int i;
                int t;
                int s;
                s = 0;
                for (i = 0; i < 10; i++) {
                    t = i * 2;
                    s += t;
                }
                return s;
            }";
        let program = optimized(source);
        let Statement::For { body, .. } = &main_statements(&program)[1] else {
            panic!("expected loop in place");
        };
        let Statement::Block(b) = body.as_ref() else {
            panic!();
        };
        assert_eq!(b.statements.len(), 2);
    }

    #[test]
    fn test_statement_with_call_not_hoisted() {
        let source = "
            int f() { return 1; }
            int main() {
                int i;
                int t;
                for (i = 0; i < 3; i++) {
                    t = f();
                }
                return t;
            }";
        let program = optimized(source);
        let Statement::For { body, .. } = &main_statements(&program)[0] else {
            panic!("loop should stay first");
        };
        let Statement::Block(b) = body.as_ref() else {
            panic!();
        };
        assert_eq!(b.statements.len(), 1);
    }
}
