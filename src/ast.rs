//! Abstract syntax tree for the C subset.
//!
//! Two sibling hierarchies, expressions and statements, modeled as tagged
//! enums with exhaustive matching in every walker (the Rust equivalent of
//! the classic double-dispatch visitor pair). Each expression node owns
//! its children and carries its annotated result type, its operator token
//! kind and its source position; each block statement owns its statements
//! and its local symbol table.

use crate::diagnostics::Position;
use crate::scanner::TokenKind;
use crate::symbols::{FieldRef, FunId, SymbolTable, TypeId, TypeTable, VariableRef};
use std::collections::HashSet;

/// Identifier assigned by the parser to each `case`/`default` label so
/// the switch dispatch and the body walk agree on the generated label.
pub type CaseId = usize;

/// An annotated expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// The operator token for unary/binary/postfix nodes; the constant's
    /// token kind otherwise.
    pub op: TokenKind,
    /// Result type, non-null once parsing completes.
    pub ty: TypeId,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntConst(i32),
    FloatConst(f32),
    CharConst(char),
    StringConst(String),
    Variable(VariableRef),
    /// A function name in call position.
    FunctionRef { fun: FunId, name: String },
    Unary { arg: Box<Expr> },
    Postfix { arg: Box<Expr> },
    Binary { left: Box<Expr>, right: Box<Expr> },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        fun: FunId,
        name: String,
        args: Vec<Expr>,
    },
    /// `a.b`
    StructAccess { object: Box<Expr>, field: FieldRef },
    /// `a->b`
    IndirectAccess { pointer: Box<Expr>, field: FieldRef },
    /// `a[b]`
    ArrayAccess { left: Box<Expr>, right: Box<Expr> },
    /// `&a`
    AddressOf { arg: Box<Expr> },
    /// `(type) a`
    Cast { arg: Box<Expr> },
    /// `sizeof a`
    SizeOf { arg: Box<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind, op: TokenKind, ty: TypeId, pos: Position) -> Self {
        Expr { kind, op, ty, pos }
    }

    /// The node label used by the AST dumps: the operator lexeme, the
    /// constant's value, or the referenced identifier.
    pub fn display_name(&self) -> String {
        match &self.kind {
            ExprKind::IntConst(v) => v.to_string(),
            ExprKind::FloatConst(v) => v.to_string(),
            ExprKind::CharConst(c) => format!("'{}'", c),
            ExprKind::StringConst(s) => format!("\"{}\"", s),
            ExprKind::Variable(v) => v.name.clone(),
            ExprKind::FunctionRef { name, .. } => name.clone(),
            ExprKind::Call { name, .. } => format!("{}()", name),
            ExprKind::ArrayAccess { .. } => "[]".to_string(),
            ExprKind::AddressOf { .. } => "&".to_string(),
            ExprKind::Cast { .. } => "(cast)".to_string(),
            ExprKind::SizeOf { .. } => "sizeof".to_string(),
            ExprKind::StructAccess { .. } => ".".to_string(),
            ExprKind::IndirectAccess { .. } => "->".to_string(),
            ExprKind::Conditional { .. } => "?:".to_string(),
            ExprKind::Unary { .. } | ExprKind::Postfix { .. } | ExprKind::Binary { .. } => {
                op_lexeme(self.op).to_string()
            }
        }
    }

    /// Whether this expression designates a modifiable object.
    ///
    /// Stable for a given node: depends only on the node kind and the
    /// `const` flag of the designated type.
    pub fn is_lvalue(&self, types: &TypeTable) -> bool {
        match &self.kind {
            ExprKind::Variable(v) => !types.is_const(v.ty),
            ExprKind::Unary { .. } => self.op == TokenKind::Asterisk,
            ExprKind::ArrayAccess { .. } => !types.is_const(self.ty),
            ExprKind::StructAccess { field, .. } | ExprKind::IndirectAccess { field, .. } => {
                !types.is_const(field.ty)
            }
            _ => false,
        }
    }

    /// Whether the constant folder can evaluate this node.
    pub fn is_const(&self) -> bool {
        match &self.kind {
            ExprKind::IntConst(_)
            | ExprKind::FloatConst(_)
            | ExprKind::CharConst(_)
            | ExprKind::StringConst(_) => true,
            ExprKind::Unary { arg } | ExprKind::SizeOf { arg } | ExprKind::Cast { arg } => {
                arg.is_const()
            }
            ExprKind::Binary { left, right } => left.is_const() && right.is_const(),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => cond.is_const() && then_expr.is_const() && else_expr.is_const(),
            _ => false,
        }
    }

    /// Variables this expression reads. The left side of a plain
    /// assignment to a variable is written, not read, and is excluded.
    pub fn collect_used(&self, used: &mut HashSet<String>) {
        match &self.kind {
            ExprKind::Variable(v) => {
                used.insert(v.name.clone());
            }
            ExprKind::Unary { arg }
            | ExprKind::Postfix { arg }
            | ExprKind::AddressOf { arg }
            | ExprKind::Cast { arg }
            | ExprKind::SizeOf { arg } => arg.collect_used(used),
            ExprKind::Binary { left, right } => {
                let plain_variable_lhs = matches!(left.kind, ExprKind::Variable(_));
                if !(self.op == TokenKind::Assign && plain_variable_lhs) {
                    left.collect_used(used);
                }
                right.collect_used(used);
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.collect_used(used);
                then_expr.collect_used(used);
                else_expr.collect_used(used);
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    a.collect_used(used);
                }
            }
            ExprKind::StructAccess { object: e, .. }
            | ExprKind::IndirectAccess { pointer: e, .. } => e.collect_used(used),
            ExprKind::ArrayAccess { left, right } => {
                left.collect_used(used);
                right.collect_used(used);
            }
            _ => {}
        }
    }

    /// Variables this expression may write: assignment targets, operands
    /// of `++`/`--`, anything whose address is taken, and (conservatively)
    /// every variable mentioned in a function-call argument.
    ///
    /// With `collect_all` set, every variable reference underneath is
    /// recorded; the flag is how write positions propagate downward.
    pub fn collect_affected(&self, affected: &mut HashSet<String>, collect_all: bool) {
        match &self.kind {
            ExprKind::Variable(v) => {
                if collect_all {
                    affected.insert(v.name.clone());
                }
            }
            ExprKind::Unary { arg } | ExprKind::Postfix { arg } => {
                let writes = matches!(self.op, TokenKind::Increment | TokenKind::Decrement);
                arg.collect_affected(affected, collect_all || writes);
            }
            ExprKind::AddressOf { arg } => arg.collect_affected(affected, true),
            ExprKind::Cast { arg } | ExprKind::SizeOf { arg } => {
                arg.collect_affected(affected, collect_all)
            }
            ExprKind::Binary { left, right } => {
                let writes = self.op.is_assignment();
                left.collect_affected(affected, collect_all || writes);
                right.collect_affected(affected, collect_all);
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.collect_affected(affected, collect_all);
                then_expr.collect_affected(affected, collect_all);
                else_expr.collect_affected(affected, collect_all);
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    a.collect_affected(affected, true);
                }
            }
            ExprKind::StructAccess { object: e, .. }
            | ExprKind::IndirectAccess { pointer: e, .. } => {
                e.collect_affected(affected, collect_all)
            }
            ExprKind::ArrayAccess { left, right } => {
                left.collect_affected(affected, collect_all);
                right.collect_affected(affected, collect_all);
            }
            _ => {}
        }
    }

    pub fn contains_call(&self) -> bool {
        match &self.kind {
            ExprKind::Call { .. } => true,
            ExprKind::Unary { arg }
            | ExprKind::Postfix { arg }
            | ExprKind::AddressOf { arg }
            | ExprKind::Cast { arg }
            | ExprKind::SizeOf { arg } => arg.contains_call(),
            ExprKind::Binary { left, right } | ExprKind::ArrayAccess { left, right } => {
                left.contains_call() || right.contains_call()
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => cond.contains_call() || then_expr.contains_call() || else_expr.contains_call(),
            ExprKind::StructAccess { object: e, .. }
            | ExprKind::IndirectAccess { pointer: e, .. } => e.contains_call(),
            _ => false,
        }
    }

    pub fn contains_address_of(&self) -> bool {
        match &self.kind {
            ExprKind::AddressOf { .. } => true,
            ExprKind::Unary { arg }
            | ExprKind::Postfix { arg }
            | ExprKind::Cast { arg }
            | ExprKind::SizeOf { arg } => arg.contains_address_of(),
            ExprKind::Binary { left, right } | ExprKind::ArrayAccess { left, right } => {
                left.contains_address_of() || right.contains_address_of()
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.contains_address_of()
                    || then_expr.contains_address_of()
                    || else_expr.contains_address_of()
            }
            ExprKind::Call { args, .. } => args.iter().any(|a| a.contains_address_of()),
            ExprKind::StructAccess { object: e, .. }
            | ExprKind::IndirectAccess { pointer: e, .. } => e.contains_address_of(),
            _ => false,
        }
    }

    /// Hoisting candidates must be free of calls and address-taking.
    pub fn can_be_hoisted(&self) -> bool {
        !self.contains_call() && !self.contains_address_of()
    }
}

/// The printable lexeme of an operator token.
pub fn op_lexeme(op: TokenKind) -> &'static str {
    match op {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Asterisk => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Assign => "=",
        TokenKind::PlusAssign => "+=",
        TokenKind::MinusAssign => "-=",
        TokenKind::AsteriskAssign => "*=",
        TokenKind::SlashAssign => "/=",
        TokenKind::PercentAssign => "%=",
        TokenKind::AmpersandAssign => "&=",
        TokenKind::BitwiseOrAssign => "|=",
        TokenKind::BitwiseXorAssign => "^=",
        TokenKind::ShiftLeftAssign => "<<=",
        TokenKind::ShiftRightAssign => ">>=",
        TokenKind::Equal => "==",
        TokenKind::NotEqual => "!=",
        TokenKind::LessThan => "<",
        TokenKind::GreaterThan => ">",
        TokenKind::LessThanOrEqual => "<=",
        TokenKind::GreaterThanOrEqual => ">=",
        TokenKind::LogicAnd => "&&",
        TokenKind::LogicOr => "||",
        TokenKind::LogicNot => "!",
        TokenKind::Ampersand => "&",
        TokenKind::BitwiseOr => "|",
        TokenKind::BitwiseNot => "~",
        TokenKind::BitwiseXor => "^",
        TokenKind::ShiftLeft => "<<",
        TokenKind::ShiftRight => ">>",
        TokenKind::Dot => ".",
        TokenKind::Arrow => "->",
        TokenKind::Increment => "++",
        TokenKind::Decrement => "--",
        TokenKind::Conditional => "?:",
        TokenKind::Comma => ",",
        _ => "?",
    }
}

/// A statement. Expressions are statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Null,
    Expression(Expr),
    Block(BlockStatement),
    If {
        cond: Expr,
        then_stmt: Box<Statement>,
        else_stmt: Option<Box<Statement>>,
    },
    For {
        init: Option<Expr>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Statement>,
    },
    While { cond: Expr, body: Box<Statement> },
    Do { body: Box<Statement>, cond: Expr },
    /// `name: next`
    Label { name: String, next: Box<Statement> },
    /// `case value: next`
    CaseLabel {
        id: CaseId,
        value: i32,
        next: Box<Statement>,
    },
    /// `default: next`
    DefaultLabel { id: CaseId, next: Box<Statement> },
    Goto { label: String, pos: Position },
    Break,
    Continue,
    Return { expr: Option<Expr> },
    Switch(SwitchStatement),
}

/// `{ ... }` with its own scope.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
    pub locals: SymbolTable,
}

/// A switch: its controlling expression, its body, and the case labels
/// collected while parsing the body.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    pub test: Expr,
    pub body: Box<Statement>,
    pub cases: Vec<CaseRef>,
    pub default_case: Option<CaseId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseRef {
    pub id: CaseId,
    pub value: i32,
}

impl Statement {
    /// Name used by the AST dumps.
    pub fn display_name(&self) -> String {
        match self {
            Statement::Null => "(null statement)".to_string(),
            Statement::Expression(e) => e.display_name(),
            Statement::Block(_) => "{ }".to_string(),
            Statement::If { .. } => "if".to_string(),
            Statement::For { .. } => "for".to_string(),
            Statement::While { .. } => "while".to_string(),
            Statement::Do { .. } => "do".to_string(),
            Statement::Label { name, .. } => format!("{}:", name),
            Statement::CaseLabel { .. } => "case".to_string(),
            Statement::DefaultLabel { .. } => "default".to_string(),
            Statement::Goto { .. } => "goto".to_string(),
            Statement::Break => "break".to_string(),
            Statement::Continue => "continue".to_string(),
            Statement::Return { .. } => "return".to_string(),
            Statement::Switch(_) => "switch".to_string(),
        }
    }

    /// Variables possibly written anywhere inside this statement.
    pub fn collect_affected(&self, affected: &mut HashSet<String>) {
        match self {
            Statement::Expression(e) => e.collect_affected(affected, false),
            Statement::Block(b) => {
                for s in &b.statements {
                    s.collect_affected(affected);
                }
            }
            Statement::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                cond.collect_affected(affected, false);
                then_stmt.collect_affected(affected);
                if let Some(e) = else_stmt {
                    e.collect_affected(affected);
                }
            }
            Statement::For {
                init,
                cond,
                update,
                body,
            } => {
                for e in [init, cond, update].into_iter().flatten() {
                    e.collect_affected(affected, false);
                }
                body.collect_affected(affected);
            }
            Statement::While { cond, body } | Statement::Do { body, cond } => {
                cond.collect_affected(affected, false);
                body.collect_affected(affected);
            }
            Statement::Label { next, .. }
            | Statement::CaseLabel { next, .. }
            | Statement::DefaultLabel { next, .. } => next.collect_affected(affected),
            Statement::Return { expr: Some(e) } => e.collect_affected(affected, false),
            Statement::Switch(s) => {
                s.test.collect_affected(affected, false);
                s.body.collect_affected(affected);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{OffsetPolicy, VariableSymbol};

    fn types_with_var(name: &str) -> (TypeTable, VariableRef) {
        let mut table = SymbolTable::new(OffsetPolicy::Locals);
        let types = TypeTable::new();
        let sym = table
            .add_variable(VariableSymbol::new(name, types.int()), &types)
            .clone();
        (types, VariableRef::from_symbol(&sym, Position::start()))
    }

    fn var_expr(types: &TypeTable, v: &VariableRef) -> Expr {
        Expr::new(
            ExprKind::Variable(v.clone()),
            TokenKind::Identifier,
            types.int(),
            Position::start(),
        )
    }

    fn int_expr(types: &TypeTable, v: i32) -> Expr {
        Expr::new(
            ExprKind::IntConst(v),
            TokenKind::ConstInteger,
            types.int(),
            Position::start(),
        )
    }

    #[test]
    fn test_const_predicate() {
        let types = TypeTable::new();
        let sum = Expr::new(
            ExprKind::Binary {
                left: Box::new(int_expr(&types, 1)),
                right: Box::new(int_expr(&types, 2)),
            },
            TokenKind::Plus,
            types.int(),
            Position::start(),
        );
        assert!(sum.is_const());

        let (types, v) = types_with_var("x");
        let mixed = Expr::new(
            ExprKind::Binary {
                left: Box::new(int_expr(&types, 1)),
                right: Box::new(var_expr(&types, &v)),
            },
            TokenKind::Plus,
            types.int(),
            Position::start(),
        );
        assert!(!mixed.is_const());
    }

    #[test]
    fn test_variable_lvalue_respects_const() {
        let (types, v) = types_with_var("x");
        assert!(var_expr(&types, &v).is_lvalue(&types));

        let mut types = TypeTable::new();
        let const_int = types.const_of(types.int());
        let mut table = SymbolTable::new(OffsetPolicy::Locals);
        let sym = table
            .add_variable(VariableSymbol::new("c", const_int), &types)
            .clone();
        let r = VariableRef::from_symbol(&sym, Position::start());
        let e = Expr::new(
            ExprKind::Variable(r),
            TokenKind::Identifier,
            const_int,
            Position::start(),
        );
        assert!(!e.is_lvalue(&types));
    }

    #[test]
    fn test_assignment_lhs_is_affected_not_used() {
        let (types, x) = types_with_var("x");
        let (_, y) = types_with_var("y");

        let assign = Expr::new(
            ExprKind::Binary {
                left: Box::new(var_expr(&types, &x)),
                right: Box::new(var_expr(&types, &y)),
            },
            TokenKind::Assign,
            types.int(),
            Position::start(),
        );

        let mut used = HashSet::new();
        assign.collect_used(&mut used);
        assert!(!used.contains("x"));
        assert!(used.contains("y"));

        let mut affected = HashSet::new();
        assign.collect_affected(&mut affected, false);
        assert!(affected.contains("x"));
        assert!(!affected.contains("y"));
    }

    #[test]
    fn test_address_of_marks_affected() {
        let (types, x) = types_with_var("x");
        let addr = Expr::new(
            ExprKind::AddressOf {
                arg: Box::new(var_expr(&types, &x)),
            },
            TokenKind::Ampersand,
            types.int(),
            Position::start(),
        );
        let mut affected = HashSet::new();
        addr.collect_affected(&mut affected, false);
        assert!(affected.contains("x"));
        assert!(!addr.can_be_hoisted());
    }

    #[test]
    fn test_display_names() {
        let types = TypeTable::new();
        let neg = Expr::new(
            ExprKind::Unary {
                arg: Box::new(int_expr(&types, 3)),
            },
            TokenKind::Minus,
            types.int(),
            Position::start(),
        );
        assert_eq!(neg.display_name(), "-");
        assert_eq!(Statement::Break.display_name(), "break");
        assert_eq!(
            Statement::Label {
                name: "out".to_string(),
                next: Box::new(Statement::Null),
            }
            .display_name(),
            "out:"
        );
    }
}
