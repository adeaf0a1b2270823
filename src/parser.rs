//! Recursive-descent parser with integrated semantic analysis.
//!
//! One function per grammar non-terminal; the expression ladder follows
//! C precedence bottom-up. Every node is type-checked and
//! lvalue-checked as it is constructed, so a successfully parsed
//! translation unit is also a semantically valid one. The parser owns
//! the scope stack; declarations install symbols into the innermost
//! scope as they are reduced.
//!
//! Semantic failures surface as [`CompileError`]s carrying the position
//! of the offending token; there is no recovery.

use crate::ast::{
    BlockStatement, CaseId, CaseRef, Expr, ExprKind, Statement, SwitchStatement, op_lexeme,
};
use crate::diagnostics::{CompileError, Position};
use crate::optimizer::{ConstValue, eval_const_expr};
use crate::scanner::{Token, TokenKind, TokenStream};
use crate::symbols::{
    FieldRef, FunId, FunctionSymbol, OffsetPolicy, Program, ScopeStack, SymbolTable, TypeId,
    TypeKind, VariableRef, VariableSymbol,
};
use std::collections::HashMap;

/// Whether the parser consumes a whole translation unit or one
/// expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    #[default]
    Normal,
    Expression,
}

/// Marker for the enclosing construct kinds `break`/`continue` bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    Loop,
    Switch,
}

/// Per-function `goto` label bookkeeping.
struct LabelInfo {
    defined: bool,
    first_use: Position,
}

/// Case labels collected for the switch currently being parsed.
struct SwitchFrame {
    cases: Vec<CaseRef>,
    default_case: Option<CaseId>,
}

struct DeclSpec {
    ty: TypeId,
    is_typedef: bool,
}

pub struct Parser<'a> {
    stream: TokenStream<'a>,
    program: Program,
    scopes: ScopeStack,

    /// Cached ids of the pre-registered `char` alias and derived types.
    char_type: TypeId,
    string_type: TypeId,
    function_type: TypeId,

    labels: HashMap<String, LabelInfo>,
    block_types: Vec<BlockType>,
    switches: Vec<SwitchFrame>,
    next_case_id: CaseId,
    current_function: Option<FunId>,
}

type ParseResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut program = Program::new();

        let char_type = program.types.alloc(TypeKind::Typedef {
            name: "char".to_string(),
            target: program.types.int(),
        });
        let string_type = program.types.pointer_to(char_type);
        let function_type = program.types.alloc(TypeKind::Function);

        // Primitive type names live in the ordinary type namespace of the
        // global scope; `int`, `float` and `void` are identifiers, not
        // keywords, in this subset.
        let mut global = SymbolTable::new(OffsetPolicy::Globals);
        global.add_type("int", program.types.int());
        global.add_type("float", program.types.float());
        global.add_type("void", program.types.void());
        global.add_type("char", char_type);

        let mut parser = Parser {
            stream: TokenStream::new(source),
            program,
            scopes: ScopeStack::new(global),
            char_type,
            string_type,
            function_type,
            labels: HashMap::new(),
            block_types: Vec::new(),
            switches: Vec::new(),
            next_case_id: 0,
            current_function: None,
        };

        parser.add_builtin("__print_int", parser.program.types.void(), &["int"]);
        parser.add_builtin("__print_float", parser.program.types.void(), &["float"]);

        parser
    }

    fn add_builtin(&mut self, name: &str, return_type: TypeId, params: &[&str]) {
        let mut symbol = FunctionSymbol::new(name, return_type);
        symbol.builtin = true;
        for (i, type_name) in params.iter().enumerate() {
            let ty = self.scopes.lookup_type(type_name).expect("builtin parameter type");
            symbol
                .parameters
                .add_variable(VariableSymbol::new(format!("arg{}", i), ty), &self.program.types);
        }
        self.program.add_function(symbol);
    }

    /// Parse the whole input. Returns the annotated translation unit:
    /// the global symbol table, the function map and the type arena.
    pub fn parse_translation_unit(mut self) -> ParseResult<Program> {
        while self.current().kind != TokenKind::Eof {
            self.check_lexical()?;
            if !self.parse_declaration()? {
                return self.syntax_err("expected declaration");
            }
        }

        self.program.globals = self.scopes.into_global();
        Ok(self.program)
    }

    /// Parse a single expression and require EOF behind it.
    pub fn parse_expression_only(mut self) -> ParseResult<(Expr, Program)> {
        let expr = self.parse_expression()?;
        if self.current().kind != TokenKind::Eof {
            return self.syntax_err("trailing characters");
        }
        self.program.globals = self.scopes.into_global();
        Ok((expr, self.program))
    }

    /*
     * Token plumbing
     */

    fn current(&self) -> &Token {
        self.stream.current()
    }

    fn advance(&mut self) {
        self.stream.advance();
    }

    /// Propagate a scanner error once an `Invalid` token reaches us.
    fn check_lexical(&self) -> ParseResult<()> {
        if self.current().kind == TokenKind::Invalid {
            let (pos, msg) = match self.stream.scanner_error() {
                Some(d) => (d.position, d.message.clone()),
                None => (self.current().position, "invalid token".to_string()),
            };
            return Err(CompileError::lexical(pos, msg));
        }
        Ok(())
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        self.check_lexical()?;
        if self.current().kind != kind {
            return self.syntax_err(&format!("expected {}", what));
        }
        let token = self.current().clone();
        self.advance();
        Ok(token)
    }

    fn at_keyword(&self, word: &str) -> bool {
        let t = self.current();
        t.kind == TokenKind::Keyword && t.text == word
    }

    fn accept_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn syntax_err<T>(&self, message: &str) -> ParseResult<T> {
        let t = self.current();
        let shown = if t.kind == TokenKind::Eof {
            "end of file"
        } else {
            t.text.as_str()
        };
        Err(CompileError::syntax(
            t.position,
            format!("{}, got '{}'", message, shown),
        ))
    }

    fn sem_err<T>(&self, pos: Position, message: impl Into<String>) -> ParseResult<T> {
        Err(CompileError::semantic(pos, message))
    }

    /*
     * Declarations
     */

    /// Whether `token` can begin a declaration in the current scope.
    fn starts_type(&self, token: &Token) -> bool {
        match token.kind {
            TokenKind::Keyword => matches!(token.text.as_str(), "const" | "struct" | "typedef"),
            TokenKind::Identifier => self.scopes.lookup_type(&token.text).is_some(),
            _ => false,
        }
    }

    /// Parse one declaration if the current token starts one. Returns
    /// false without consuming anything otherwise.
    fn parse_declaration(&mut self) -> ParseResult<bool> {
        if !self.starts_type(&self.current().clone()) {
            return Ok(false);
        }

        let spec = self.parse_declaration_specifier()?;

        // `struct S { ... };` declares only the tag.
        if self.accept(TokenKind::Semicolon) {
            return Ok(true);
        }

        loop {
            let (name, ty, pos) = self.parse_declarator(spec.ty)?;

            if spec.is_typedef {
                self.install_typedef(name, ty, pos)?;
            } else if self.current().kind == TokenKind::LeftParen {
                self.parse_function(name, ty, pos)?;
                // A function definition is not followed by declarators.
                return Ok(true);
            } else {
                self.install_variable(name, ty, pos)?;
            }

            if !self.accept(TokenKind::Comma) {
                self.expect(TokenKind::Semicolon, "';' after declaration")?;
                break;
            }
        }

        Ok(true)
    }

    fn parse_declaration_specifier(&mut self) -> ParseResult<DeclSpec> {
        let mut is_typedef = false;
        let mut is_const = false;
        let mut ty: Option<TypeId> = None;

        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::Keyword if token.text == "typedef" => {
                    self.advance();
                    is_typedef = true;
                }
                TokenKind::Keyword if token.text == "const" => {
                    self.advance();
                    is_const = true;
                }
                TokenKind::Keyword if token.text == "struct" => {
                    let id = self.parse_struct()?;
                    ty = Some(id);
                }
                TokenKind::Identifier if ty.is_none() => {
                    match self.scopes.lookup_type(&token.text) {
                        Some(id) => {
                            self.advance();
                            ty = Some(id);
                        }
                        None => break,
                    }
                }
                _ => break,
            }

            if ty.is_some() && !matches!(self.current().kind, TokenKind::Keyword) {
                break;
            }
        }

        let Some(mut ty) = ty else {
            return self.syntax_err("expected type specifier");
        };
        if is_const {
            ty = self.program.types.const_of(ty);
        }

        Ok(DeclSpec { ty, is_typedef })
    }

    /// Pointer stars, the declared name, and bracketed array lengths,
    /// building the declared type from the inside out.
    fn parse_declarator(&mut self, base: TypeId) -> ParseResult<(String, TypeId, Position)> {
        let mut ty = base;
        while self.accept(TokenKind::Asterisk) {
            ty = self.program.types.pointer_to(ty);
        }

        let name_token = self.expect(TokenKind::Identifier, "identifier in declaration")?;

        let mut lengths = Vec::new();
        while self.accept(TokenKind::LeftBracket) {
            let len_token = self.expect(TokenKind::ConstInteger, "array length")?;
            let length = len_token.integer_value();
            if length <= 0 {
                return self.sem_err(len_token.position, "array length must be positive");
            }
            lengths.push(length as u32);
            self.expect(TokenKind::RightBracket, "']' after array length")?;
        }
        for &length in lengths.iter().rev() {
            ty = self.program.types.array_of(ty, length);
        }

        Ok((name_token.text, ty, name_token.position))
    }

    fn install_typedef(&mut self, name: String, target: TypeId, pos: Position) -> ParseResult<()> {
        if self.scopes.top().exists(&name) {
            return self.sem_err(pos, format!("redeclaration of '{}'", name));
        }
        let alias = self.program.types.alloc(TypeKind::Typedef {
            name: name.clone(),
            target,
        });
        self.scopes.top_mut().add_type(name, alias);
        Ok(())
    }

    fn install_variable(&mut self, name: String, ty: TypeId, pos: Position) -> ParseResult<()> {
        if self.scopes.top().exists(&name) {
            return self.sem_err(pos, format!("redeclaration of '{}'", name));
        }
        if self.program.types.is_void(ty) {
            return self.sem_err(pos, format!("variable '{}' declared void", name));
        }
        if !self.program.types.is_complete(ty) {
            return self.sem_err(pos, format!("variable '{}' has incomplete type", name));
        }
        self.scopes
            .top_mut()
            .add_variable(VariableSymbol::new(name, ty), &self.program.types);
        Ok(())
    }

    /// `struct tag`, `struct tag { ... }` or `struct { ... }`.
    fn parse_struct(&mut self) -> ParseResult<TypeId> {
        let struct_pos = self.current().position;
        self.advance(); // struct

        let tag = if self.current().kind == TokenKind::Identifier {
            let t = self.current().clone();
            self.advance();
            Some(t.text)
        } else {
            None
        };

        if self.current().kind != TokenKind::BlockStart {
            // Reference to a (possibly forward-declared) tag.
            let Some(tag) = tag else {
                return self.syntax_err("expected struct tag or '{'");
            };
            if let Some(id) = self.scopes.lookup_tag(&tag) {
                return Ok(id);
            }
            let id = self.program.types.alloc(TypeKind::Struct {
                tag: Some(tag.clone()),
                fields: SymbolTable::new(OffsetPolicy::StructFields),
            });
            self.scopes.top_mut().add_tag(tag, id);
            return Ok(id);
        }

        // Definition. Allocate (or re-open) the entry before the body so
        // the tag resolves inside it.
        let id = match &tag {
            Some(tag_name) => match self.scopes.top().get_tag(tag_name) {
                Some(existing) => {
                    if self.program.types.is_complete(existing) {
                        return self.sem_err(struct_pos, format!("redefinition of 'struct {}'", tag_name));
                    }
                    existing
                }
                None => {
                    let id = self.program.types.alloc(TypeKind::Struct {
                        tag: tag.clone(),
                        fields: SymbolTable::new(OffsetPolicy::StructFields),
                    });
                    self.scopes.top_mut().add_tag(tag_name.clone(), id);
                    id
                }
            },
            None => self.program.types.alloc(TypeKind::Struct {
                tag: None,
                fields: SymbolTable::new(OffsetPolicy::StructFields),
            }),
        };

        self.advance(); // {
        self.scopes.push(SymbolTable::new(OffsetPolicy::StructFields));

        while self.current().kind != TokenKind::BlockEnd {
            self.check_lexical()?;
            if !self.parse_declaration()? {
                return self.syntax_err("expected field declaration");
            }
        }
        self.advance(); // }

        let fields = self.scopes.pop();
        if fields.is_empty() {
            return self.sem_err(struct_pos, "struct has no members");
        }

        *self.program.types.kind_mut(id) = TypeKind::Struct { tag, fields };
        self.program.types.set_complete(id);

        Ok(id)
    }

    /*
     * Functions
     */

    fn parse_function(&mut self, name: String, return_type: TypeId, pos: Position) -> ParseResult<()> {
        if !self.scopes.is_global() {
            return self.sem_err(pos, "function declarations are only allowed at file scope");
        }

        self.advance(); // (
        let parameters = self.parse_parameter_list()?;

        let id = match self.program.find_function(&name) {
            Some(existing_id) => {
                let existing = self.program.function(existing_id);
                if !self.prototypes_match(existing, return_type, &parameters) {
                    return self.sem_err(pos, format!("conflicting declaration of '{}'", name));
                }
                existing_id
            }
            None => {
                if self.scopes.top().exists(&name) {
                    return self.sem_err(pos, format!("redeclaration of '{}'", name));
                }
                let mut symbol = FunctionSymbol::new(name.clone(), return_type);
                symbol.parameters = parameters.clone();
                self.program.add_function(symbol)
            }
        };
        // A later declaration (or the definition) supplies the parameter
        // names that matter.
        self.program.function_mut(id).parameters = parameters.clone();

        if self.current().kind != TokenKind::BlockStart {
            self.expect(TokenKind::Semicolon, "';' after function declaration")?;
            return Ok(());
        }

        if self.program.function(id).body.is_some() {
            return self.sem_err(pos, format!("redefinition of '{}'", name));
        }

        self.current_function = Some(id);
        self.labels.clear();

        self.scopes.push(parameters);
        let body = self.parse_block()?;
        self.scopes.pop();

        for (label, info) in &self.labels {
            if !info.defined {
                return self.sem_err(
                    info.first_use,
                    format!("label '{}' used but not defined", label),
                );
            }
        }
        self.labels.clear();
        self.current_function = None;

        self.program.function_mut(id).body = Some(body);
        Ok(())
    }

    fn parse_parameter_list(&mut self) -> ParseResult<SymbolTable> {
        let mut parameters = SymbolTable::new(OffsetPolicy::Parameters);

        if self.accept(TokenKind::RightParen) {
            return Ok(parameters);
        }

        loop {
            let spec = self.parse_declaration_specifier()?;

            // `(void)` is an empty parameter list.
            if self.program.types.is_void(spec.ty) && self.current().kind == TokenKind::RightParen {
                self.advance();
                return Ok(parameters);
            }

            let (name, ty, pos) = self.parse_declarator(spec.ty)?;
            if parameters.variable(&name).is_some() {
                return self.sem_err(pos, format!("duplicate parameter '{}'", name));
            }
            parameters.add_variable(VariableSymbol::new(name, ty), &self.program.types);

            if !self.accept(TokenKind::Comma) {
                self.expect(TokenKind::RightParen, "')' after parameter list")?;
                return Ok(parameters);
            }
        }
    }

    fn prototypes_match(
        &self,
        existing: &FunctionSymbol,
        return_type: TypeId,
        parameters: &SymbolTable,
    ) -> bool {
        let types = &self.program.types;
        if !types.compatible(existing.return_type, return_type) {
            return false;
        }
        let old = existing.parameters.variables();
        let new = parameters.variables();
        old.len() == new.len()
            && old
                .iter()
                .zip(new.iter())
                .all(|(a, b)| types.compatible(a.ty, b.ty))
    }

    /*
     * Statements
     */

    fn parse_block(&mut self) -> ParseResult<BlockStatement> {
        self.expect(TokenKind::BlockStart, "'{'")?;
        self.scopes.push(SymbolTable::new(OffsetPolicy::Locals));

        let mut statements = Vec::new();
        while self.current().kind != TokenKind::BlockEnd {
            self.check_lexical()?;
            if self.current().kind == TokenKind::Eof {
                return self.syntax_err("expected '}'");
            }
            if self.parse_declaration()? {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.advance(); // }

        let locals = self.scopes.pop();
        Ok(BlockStatement { statements, locals })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        self.check_lexical()?;
        let token = self.current().clone();

        match token.kind {
            TokenKind::Keyword => match token.text.as_str() {
                "if" => self.parse_if(),
                "for" => self.parse_for(),
                "while" => self.parse_while(),
                "do" => self.parse_do(),
                "switch" => self.parse_switch(),
                "case" => self.parse_case(),
                "default" => self.parse_default(),
                "goto" => self.parse_goto(),
                "break" => self.parse_break(),
                "continue" => self.parse_continue(),
                "return" => self.parse_return(),
                _ => self.syntax_err("unexpected keyword"),
            },
            TokenKind::BlockStart => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Null)
            }
            TokenKind::Identifier => {
                // Speculative: `identifier :` is a labelled statement.
                self.advance();
                if self.current().kind == TokenKind::Colon {
                    self.advance();
                    self.define_label(&token)?;
                    let next = self.parse_statement()?;
                    Ok(Statement::Label {
                        name: token.text,
                        next: Box::new(next),
                    })
                } else {
                    self.stream.retreat();
                    self.parse_expression_statement()
                }
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Statement> {
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after expression")?;
        Ok(Statement::Expression(expr))
    }

    fn parse_condition(&mut self, construct: &str) -> ParseResult<Expr> {
        self.expect(TokenKind::LeftParen, &format!("'(' after '{}'", construct))?;
        let cond = self.parse_expression()?;
        if !self.program.types.is_scalar(cond.ty) {
            return self.sem_err(cond.pos, format!("{} condition must have scalar type", construct));
        }
        self.expect(TokenKind::RightParen, "')' after condition")?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.advance(); // if
        let cond = self.parse_condition("if")?;
        let then_stmt = Box::new(self.parse_statement()?);
        let else_stmt = if self.accept_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_stmt,
            else_stmt,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.advance(); // for
        self.expect(TokenKind::LeftParen, "'(' after 'for'")?;

        let init = if self.current().kind == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after loop initialization")?;

        let cond = if self.current().kind == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after loop condition")?;

        let update = if self.current().kind == TokenKind::RightParen {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RightParen, "')' after loop update")?;

        self.block_types.push(BlockType::Loop);
        let body = Box::new(self.parse_statement()?);
        self.block_types.pop();

        Ok(Statement::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.advance(); // while
        let cond = self.parse_condition("while")?;

        self.block_types.push(BlockType::Loop);
        let body = Box::new(self.parse_statement()?);
        self.block_types.pop();

        Ok(Statement::While { cond, body })
    }

    fn parse_do(&mut self) -> ParseResult<Statement> {
        self.advance(); // do

        self.block_types.push(BlockType::Loop);
        let body = Box::new(self.parse_statement()?);
        self.block_types.pop();

        if !self.accept_keyword("while") {
            return self.syntax_err("expected 'while' after do-loop body");
        }
        let cond = self.parse_condition("while")?;
        self.expect(TokenKind::Semicolon, "';' after do-while")?;

        Ok(Statement::Do { body, cond })
    }

    fn parse_switch(&mut self) -> ParseResult<Statement> {
        self.advance(); // switch
        self.expect(TokenKind::LeftParen, "'(' after 'switch'")?;
        let test = self.parse_expression()?;
        if !self.program.types.is_int(test.ty) {
            return self.sem_err(test.pos, "switch quantity must have integer type");
        }
        self.expect(TokenKind::RightParen, "')' after switch expression")?;

        self.switches.push(SwitchFrame {
            cases: Vec::new(),
            default_case: None,
        });
        self.block_types.push(BlockType::Switch);
        let body = Box::new(self.parse_statement()?);
        self.block_types.pop();
        let frame = self.switches.pop().unwrap();

        Ok(Statement::Switch(SwitchStatement {
            test,
            body,
            cases: frame.cases,
            default_case: frame.default_case,
        }))
    }

    fn parse_case(&mut self) -> ParseResult<Statement> {
        let pos = self.current().position;
        if self.switches.is_empty() {
            return self.sem_err(pos, "case label outside of switch");
        }
        self.advance(); // case

        let expr = self.parse_conditional()?;
        let value = match eval_const_expr(&expr) {
            Some(ConstValue::Int(v)) => v,
            _ => {
                return self.sem_err(expr.pos, "case label must be an integer constant expression");
            }
        };
        self.expect(TokenKind::Colon, "':' after case value")?;

        let id = self.fresh_case_id();
        self.switches
            .last_mut()
            .unwrap()
            .cases
            .push(CaseRef { id, value });

        let next = Box::new(self.parse_statement()?);
        Ok(Statement::CaseLabel { id, value, next })
    }

    fn parse_default(&mut self) -> ParseResult<Statement> {
        let pos = self.current().position;
        if self.switches.is_empty() {
            return self.sem_err(pos, "default label outside of switch");
        }
        self.advance(); // default
        self.expect(TokenKind::Colon, "':' after 'default'")?;

        if self.switches.last().unwrap().default_case.is_some() {
            return self.sem_err(pos, "multiple default labels in one switch");
        }
        let id = self.fresh_case_id();
        self.switches.last_mut().unwrap().default_case = Some(id);

        let next = Box::new(self.parse_statement()?);
        Ok(Statement::DefaultLabel { id, next })
    }

    fn fresh_case_id(&mut self) -> CaseId {
        let id = self.next_case_id;
        self.next_case_id += 1;
        id
    }

    fn parse_goto(&mut self) -> ParseResult<Statement> {
        self.advance(); // goto
        let label = self.expect(TokenKind::Identifier, "label name after 'goto'")?;
        self.expect(TokenKind::Semicolon, "';' after goto")?;

        self.labels
            .entry(label.text.clone())
            .or_insert(LabelInfo {
                defined: false,
                first_use: label.position,
            });

        Ok(Statement::Goto {
            label: label.text,
            pos: label.position,
        })
    }

    fn define_label(&mut self, token: &Token) -> ParseResult<()> {
        match self.labels.get_mut(&token.text) {
            Some(info) if info.defined => {
                self.sem_err(token.position, format!("duplicate label '{}'", token.text))
            }
            Some(info) => {
                info.defined = true;
                Ok(())
            }
            None => {
                self.labels.insert(
                    token.text.clone(),
                    LabelInfo {
                        defined: true,
                        first_use: token.position,
                    },
                );
                Ok(())
            }
        }
    }

    fn parse_break(&mut self) -> ParseResult<Statement> {
        let pos = self.current().position;
        if self.block_types.is_empty() {
            return self.sem_err(pos, "break statement outside of loop or switch");
        }
        self.advance();
        self.expect(TokenKind::Semicolon, "';' after 'break'")?;
        Ok(Statement::Break)
    }

    fn parse_continue(&mut self) -> ParseResult<Statement> {
        let pos = self.current().position;
        if !self.block_types.contains(&BlockType::Loop) {
            return self.sem_err(pos, "continue statement outside of loop");
        }
        self.advance();
        self.expect(TokenKind::Semicolon, "';' after 'continue'")?;
        Ok(Statement::Continue)
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let pos = self.current().position;
        self.advance(); // return

        let fun = self.current_function.expect("return outside of function");
        let return_type = self.program.function(fun).return_type;

        if self.accept(TokenKind::Semicolon) {
            return Ok(Statement::Return { expr: None });
        }

        let expr = self.parse_expression()?;
        let types = &self.program.types;
        if types.is_void(return_type) {
            return self.sem_err(pos, "return with a value in a void function");
        }
        if !(types.is_arithmetic(return_type) && types.is_arithmetic(expr.ty))
            && !types.compatible(return_type, expr.ty)
        {
            return self.sem_err(expr.pos, "incompatible type in return statement");
        }
        self.expect(TokenKind::Semicolon, "';' after return value")?;

        Ok(Statement::Return { expr: Some(expr) })
    }

    /*
     * Expressions, bottom-up by precedence
     */

    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_assignment()?;

        while self.current().kind == TokenKind::Comma {
            let op_pos = self.current().position;
            self.advance();
            let right = self.parse_assignment()?;
            let ty = right.ty;
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                TokenKind::Comma,
                ty,
                op_pos,
            );
        }

        Ok(left)
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let left = self.parse_conditional()?;
        let op = self.current().kind;
        if !op.is_assignment() {
            return Ok(left);
        }
        let op_pos = self.current().position;
        self.advance();

        if !left.is_lvalue(&self.program.types) {
            return self.sem_err(
                op_pos,
                format!("lvalue required as left operand of '{}'", op_lexeme(op)),
            );
        }
        if self.program.types.is_struct(left.ty) {
            return self.sem_err(op_pos, "assignment of struct type is not supported");
        }

        // Right-associative.
        let right = self.parse_assignment()?;

        if op.is_compound_assignment() {
            self.check_binary_operands(compound_base(op), &left, &right, op_pos)?;
        } else {
            let types = &self.program.types;
            if !(types.is_arithmetic(left.ty) && types.is_arithmetic(right.ty))
                && !types.compatible(left.ty, right.ty)
            {
                return self.sem_err(op_pos, "incompatible types in assignment");
            }
        }

        let ty = left.ty;
        Ok(Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                right: Box::new(right),
            },
            op,
            ty,
            op_pos,
        ))
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_logical_or()?;
        if self.current().kind != TokenKind::Conditional {
            return Ok(cond);
        }
        let op_pos = self.current().position;
        self.advance();

        if !self.program.types.is_scalar(cond.ty) {
            return self.sem_err(
                cond.pos,
                "first operand of conditional operator must have scalar type",
            );
        }

        let then_expr = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':' in conditional expression")?;
        let else_expr = self.parse_conditional()?;

        // Result type is the common type of the branches: the wider
        // arithmetic type, the compatible pointer type, or pointer-to-void
        // when one branch is a `void *`.
        let types = &self.program.types;
        let is_void_pointer = |ty: TypeId| {
            types.is_pointer(ty) && types.pointee(ty).is_some_and(|t| types.is_void(t))
        };
        let both_pointers = types.is_pointer(then_expr.ty) && types.is_pointer(else_expr.ty);

        let ty = if types.compatible(then_expr.ty, else_expr.ty) {
            then_expr.ty
        } else if types.is_arithmetic(then_expr.ty) && types.is_arithmetic(else_expr.ty) {
            self.common_real_type(then_expr.ty, else_expr.ty)
        } else if both_pointers && is_void_pointer(then_expr.ty) {
            then_expr.ty
        } else if both_pointers && is_void_pointer(else_expr.ty) {
            else_expr.ty
        } else {
            return self.sem_err(op_pos, "incompatible operand types in conditional expression");
        };

        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            TokenKind::Conditional,
            ty,
            op_pos,
        ))
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::LogicOr], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::LogicAnd], Self::parse_bitwise_or)
    }

    fn parse_bitwise_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::BitwiseOr], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_xor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::BitwiseXor], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::Ampersand], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[TokenKind::Equal, TokenKind::NotEqual],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::LessThanOrEqual,
                TokenKind::GreaterThanOrEqual,
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[TokenKind::ShiftLeft, TokenKind::ShiftRight],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[TokenKind::Asterisk, TokenKind::Slash, TokenKind::Percent],
            Self::parse_cast_expression,
        )
    }

    fn parse_binary_level(
        &mut self,
        ops: &[TokenKind],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;

        while ops.contains(&self.current().kind) {
            let op = self.current().kind;
            let op_pos = self.current().position;
            self.advance();
            let right = next(self)?;

            self.check_binary_operands(op, &left, &right, op_pos)?;
            let ty = self.binary_result_type(op, &left, &right);

            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                op,
                ty,
                op_pos,
            );
        }

        Ok(left)
    }

    fn common_real_type(&self, l: TypeId, r: TypeId) -> TypeId {
        let types = &self.program.types;
        if types.is_float(l) || types.is_float(r) {
            types.float()
        } else {
            l
        }
    }

    fn binary_result_type(&self, op: TokenKind, left: &Expr, right: &Expr) -> TypeId {
        let types = &self.program.types;
        match op {
            TokenKind::Plus | TokenKind::Minus => {
                if types.is_pointer(left.ty) && types.is_pointer(right.ty) {
                    types.int()
                } else if types.is_pointer(left.ty) {
                    left.ty
                } else if types.is_pointer(right.ty) {
                    right.ty
                } else {
                    self.common_real_type(left.ty, right.ty)
                }
            }
            TokenKind::Asterisk | TokenKind::Slash => self.common_real_type(left.ty, right.ty),
            TokenKind::Percent | TokenKind::ShiftLeft | TokenKind::ShiftRight => left.ty,
            // Comparisons and logical connectives yield 0 or 1.
            _ => types.int(),
        }
    }

    fn check_binary_operands(
        &self,
        op: TokenKind,
        left: &Expr,
        right: &Expr,
        pos: Position,
    ) -> ParseResult<()> {
        let types = &self.program.types;
        let l = left.ty;
        let r = right.ty;

        let ok = match op {
            TokenKind::Plus => {
                (types.is_arithmetic(l) && types.is_arithmetic(r))
                    || (types.is_pointer(l) && types.is_int(r))
                    || (types.is_int(l) && types.is_pointer(r))
            }
            TokenKind::Minus => {
                (types.is_arithmetic(l) && types.is_arithmetic(r))
                    || (types.is_pointer(l) && types.is_pointer(r) && types.compatible(l, r))
                    || (types.is_pointer(l) && types.is_int(r))
            }
            TokenKind::Asterisk | TokenKind::Slash => {
                types.is_arithmetic(l) && types.is_arithmetic(r)
            }
            TokenKind::Percent
            | TokenKind::ShiftLeft
            | TokenKind::ShiftRight
            | TokenKind::Ampersand
            | TokenKind::BitwiseOr
            | TokenKind::BitwiseXor => types.is_int(l) && types.is_int(r),
            TokenKind::LogicAnd | TokenKind::LogicOr => types.is_scalar(l) && types.is_scalar(r),
            _ if op.is_comparison() => {
                (types.is_arithmetic(l) && types.is_arithmetic(r))
                    || (types.is_pointer(l) && types.is_pointer(r))
                    || (types.is_pointer(l) && types.is_int(r))
                    || (types.is_int(l) && types.is_pointer(r))
            }
            _ => true,
        };

        if !ok {
            return self.sem_err(pos, format!("invalid operands to '{}'", op_lexeme(op)));
        }
        Ok(())
    }

    fn parse_cast_expression(&mut self) -> ParseResult<Expr> {
        if self.current().kind == TokenKind::LeftParen {
            let paren = self.current().clone();
            self.advance();
            if self.starts_type(&self.current().clone()) {
                let spec = self.parse_declaration_specifier()?;
                let mut ty = spec.ty;
                while self.accept(TokenKind::Asterisk) {
                    ty = self.program.types.pointer_to(ty);
                }
                self.expect(TokenKind::RightParen, "')' after type name in cast")?;

                let arg = self.parse_cast_expression()?;
                let types = &self.program.types;
                if !types.is_scalar(ty) || !types.is_scalar(arg.ty) {
                    return self.sem_err(paren.position, "invalid cast");
                }
                return Ok(Expr::new(
                    ExprKind::Cast { arg: Box::new(arg) },
                    TokenKind::LeftParen,
                    ty,
                    paren.position,
                ));
            }
            self.stream.retreat();
        }
        self.parse_unary()
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        self.check_lexical()?;
        let token = self.current().clone();

        match token.kind {
            TokenKind::Increment | TokenKind::Decrement => {
                self.advance();
                let arg = self.parse_unary()?;
                if !arg.is_lvalue(&self.program.types) {
                    return self.sem_err(
                        token.position,
                        format!("lvalue required as operand of prefix '{}'", token.text),
                    );
                }
                let ty = arg.ty;
                Ok(Expr::new(
                    ExprKind::Unary { arg: Box::new(arg) },
                    token.kind,
                    ty,
                    token.position,
                ))
            }
            TokenKind::Plus | TokenKind::Minus => {
                self.advance();
                let arg = self.parse_cast_expression()?;
                if !self.program.types.is_arithmetic(arg.ty) {
                    return self.sem_err(
                        token.position,
                        format!("operand of unary '{}' must have arithmetic type", token.text),
                    );
                }
                let ty = arg.ty;
                Ok(Expr::new(
                    ExprKind::Unary { arg: Box::new(arg) },
                    token.kind,
                    ty,
                    token.position,
                ))
            }
            TokenKind::LogicNot => {
                self.advance();
                let arg = self.parse_cast_expression()?;
                if !self.program.types.is_scalar(arg.ty) {
                    return self.sem_err(token.position, "operand of '!' must have scalar type");
                }
                let ty = self.program.types.int();
                Ok(Expr::new(
                    ExprKind::Unary { arg: Box::new(arg) },
                    token.kind,
                    ty,
                    token.position,
                ))
            }
            TokenKind::BitwiseNot => {
                self.advance();
                let arg = self.parse_cast_expression()?;
                if !self.program.types.is_int(arg.ty) {
                    return self.sem_err(token.position, "operand of '~' must have integer type");
                }
                let ty = arg.ty;
                Ok(Expr::new(
                    ExprKind::Unary { arg: Box::new(arg) },
                    token.kind,
                    ty,
                    token.position,
                ))
            }
            TokenKind::Asterisk => {
                self.advance();
                let arg = self.parse_cast_expression()?;
                let Some(target) = self.program.types.pointee(arg.ty) else {
                    return self.sem_err(
                        token.position,
                        "operand of dereference must have pointer type",
                    );
                };
                Ok(Expr::new(
                    ExprKind::Unary { arg: Box::new(arg) },
                    token.kind,
                    target,
                    token.position,
                ))
            }
            TokenKind::Ampersand => {
                self.advance();
                let arg = self.parse_cast_expression()?;
                let is_deref = matches!(arg.kind, ExprKind::Unary { .. }) && arg.op == TokenKind::Asterisk;
                let is_subscript = matches!(arg.kind, ExprKind::ArrayAccess { .. });
                if !arg.is_lvalue(&self.program.types) && !is_deref && !is_subscript {
                    return self.sem_err(
                        token.position,
                        "operand of '&' must be an lvalue, a dereference or a subscript",
                    );
                }
                let ty = self.program.types.pointer_to(arg.ty);
                Ok(Expr::new(
                    ExprKind::AddressOf { arg: Box::new(arg) },
                    token.kind,
                    ty,
                    token.position,
                ))
            }
            TokenKind::Keyword if token.text == "sizeof" => {
                self.advance();
                if self.current().kind == TokenKind::LeftParen {
                    self.advance();
                    if self.starts_type(&self.current().clone()) {
                        return self.sem_err(
                            token.position,
                            "sizeof applied to a type name is not supported",
                        );
                    }
                    self.stream.retreat();
                }
                let arg = self.parse_unary()?;
                let ty = self.program.types.int();
                Ok(Expr::new(
                    ExprKind::SizeOf { arg: Box::new(arg) },
                    TokenKind::Keyword,
                    ty,
                    token.position,
                ))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::LeftParen => {
                    expr = self.parse_call(expr, token.position)?;
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RightBracket, "']' after subscript")?;
                    expr = self.make_array_access(expr, index, token.position)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect(TokenKind::Identifier, "field name after '.'")?;
                    expr = self.make_struct_access(expr, &field, token.position)?;
                }
                TokenKind::Arrow => {
                    self.advance();
                    let field = self.expect(TokenKind::Identifier, "field name after '->'")?;
                    expr = self.make_indirect_access(expr, &field, token.position)?;
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    self.advance();
                    if !expr.is_lvalue(&self.program.types) {
                        return self.sem_err(
                            token.position,
                            format!("lvalue required as operand of postfix '{}'", token.text),
                        );
                    }
                    let ty = expr.ty;
                    expr = Expr::new(
                        ExprKind::Postfix { arg: Box::new(expr) },
                        token.kind,
                        ty,
                        token.position,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call(&mut self, callee: Expr, pos: Position) -> ParseResult<Expr> {
        let ExprKind::FunctionRef { fun, name } = callee.kind else {
            return self.sem_err(pos, "called object is not a function");
        };
        self.advance(); // (

        let mut args = Vec::new();
        if !self.accept(TokenKind::RightParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.accept(TokenKind::Comma) {
                    self.expect(TokenKind::RightParen, "')' after call arguments")?;
                    break;
                }
            }
        }

        let function = self.program.function(fun);
        let params = function.parameters.variables();
        if args.len() != params.len() {
            return self.sem_err(
                pos,
                format!(
                    "'{}' expects {} argument(s), {} given",
                    name,
                    params.len(),
                    args.len()
                ),
            );
        }
        let return_type = function.return_type;

        let param_types: Vec<TypeId> = params.iter().map(|p| p.ty).collect();
        for (arg, param_ty) in args.iter().zip(param_types) {
            let types = &self.program.types;
            if !(types.is_arithmetic(arg.ty) && types.is_arithmetic(param_ty))
                && !types.compatible(arg.ty, param_ty)
            {
                return self.sem_err(arg.pos, format!("incompatible argument type in call to '{}'", name));
            }
        }

        Ok(Expr::new(
            ExprKind::Call { fun, name, args },
            TokenKind::RightParen,
            return_type,
            pos,
        ))
    }

    fn make_array_access(&mut self, left: Expr, right: Expr, pos: Position) -> ParseResult<Expr> {
        let types = &self.program.types;
        let element = if types.is_pointer(left.ty) && types.is_int(right.ty) {
            types.pointee(left.ty)
        } else if types.is_int(left.ty) && types.is_pointer(right.ty) {
            types.pointee(right.ty)
        } else {
            None
        };
        let Some(element) = element else {
            return self.sem_err(pos, "invalid operands to '[]'");
        };

        Ok(Expr::new(
            ExprKind::ArrayAccess {
                left: Box::new(left),
                right: Box::new(right),
            },
            TokenKind::LeftBracket,
            element,
            pos,
        ))
    }

    fn make_struct_access(&mut self, object: Expr, field: &Token, pos: Position) -> ParseResult<Expr> {
        let types = &self.program.types;
        if !types.is_struct(object.ty) {
            return self.sem_err(pos, "first operand of '.' must have struct type");
        }
        let Some(symbol) = types.field(object.ty, &field.text) else {
            return self.sem_err(
                field.position,
                format!("struct has no member named '{}'", field.text),
            );
        };
        let field_ref = FieldRef {
            name: symbol.name.clone(),
            ty: symbol.ty,
            offset: symbol.offset,
        };

        Ok(Expr::new(
            ExprKind::StructAccess {
                object: Box::new(object),
                field: field_ref.clone(),
            },
            TokenKind::Dot,
            field_ref.ty,
            pos,
        ))
    }

    fn make_indirect_access(&mut self, pointer: Expr, field: &Token, pos: Position) -> ParseResult<Expr> {
        let types = &self.program.types;
        let target = types.pointee(pointer.ty);
        let Some(target) = target.filter(|&t| types.is_struct(t)) else {
            return self.sem_err(pos, "first operand of '->' must be a pointer to a struct");
        };
        let Some(symbol) = types.field(target, &field.text) else {
            return self.sem_err(
                field.position,
                format!("struct has no member named '{}'", field.text),
            );
        };
        let field_ref = FieldRef {
            name: symbol.name.clone(),
            ty: symbol.ty,
            offset: symbol.offset,
        };

        Ok(Expr::new(
            ExprKind::IndirectAccess {
                pointer: Box::new(pointer),
                field: field_ref.clone(),
            },
            TokenKind::Arrow,
            field_ref.ty,
            pos,
        ))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        self.check_lexical()?;
        let token = self.current().clone();

        match token.kind {
            TokenKind::ConstInteger => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::IntConst(token.integer_value()),
                    token.kind,
                    self.program.types.int(),
                    token.position,
                ))
            }
            TokenKind::ConstFloat => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::FloatConst(token.float_value()),
                    token.kind,
                    self.program.types.float(),
                    token.position,
                ))
            }
            TokenKind::ConstChar => {
                self.advance();
                let c = match token.value {
                    crate::scanner::TokenValue::Char(c) => c,
                    _ => '\0',
                };
                Ok(Expr::new(
                    ExprKind::CharConst(c),
                    token.kind,
                    self.char_type,
                    token.position,
                ))
            }
            TokenKind::ConstString => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::StringConst(token.text),
                    TokenKind::ConstString,
                    self.string_type,
                    token.position,
                ))
            }
            TokenKind::Identifier => {
                self.advance();
                if let Some(symbol) = self.scopes.lookup_variable(&token.text) {
                    let var = VariableRef::from_symbol(symbol, token.position);
                    let ty = var.ty;
                    return Ok(Expr::new(
                        ExprKind::Variable(var),
                        TokenKind::Identifier,
                        ty,
                        token.position,
                    ));
                }
                if let Some(fun) = self.program.find_function(&token.text) {
                    return Ok(Expr::new(
                        ExprKind::FunctionRef {
                            fun,
                            name: token.text,
                        },
                        TokenKind::Identifier,
                        self.function_type,
                        token.position,
                    ));
                }
                self.sem_err(
                    token.position,
                    format!("undeclared identifier '{}'", token.text),
                )
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            _ => self.syntax_err("unexpected token in expression"),
        }
    }
}

/// The base operation a compound assignment applies.
pub fn compound_base(op: TokenKind) -> TokenKind {
    match op {
        TokenKind::PlusAssign => TokenKind::Plus,
        TokenKind::MinusAssign => TokenKind::Minus,
        TokenKind::AsteriskAssign => TokenKind::Asterisk,
        TokenKind::SlashAssign => TokenKind::Slash,
        TokenKind::PercentAssign => TokenKind::Percent,
        TokenKind::AmpersandAssign => TokenKind::Ampersand,
        TokenKind::BitwiseOrAssign => TokenKind::BitwiseOr,
        TokenKind::BitwiseXorAssign => TokenKind::BitwiseXor,
        TokenKind::ShiftLeftAssign => TokenKind::ShiftLeft,
        TokenKind::ShiftRightAssign => TokenKind::ShiftRight,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorKind;

    fn parse(source: &str) -> Result<Program, CompileError> {
        Parser::new(source).parse_translation_unit()
    }

    fn parse_expr(source: &str) -> Result<Expr, CompileError> {
        Parser::new(source).parse_expression_only().map(|(e, _)| e)
    }

    fn parse_expr_with_program(source: &str) -> (Expr, Program) {
        Parser::new(source).parse_expression_only().unwrap()
    }

    fn main_body(program: &Program) -> &BlockStatement {
        let id = program.find_function("main").unwrap();
        program.function(id).body.as_ref().unwrap()
    }

    #[test]
    fn test_empty_translation_unit() {
        let program = parse("  /* nothing here */ ").unwrap();
        assert!(program.find_function("main").is_none());
        // Builtins are pre-registered.
        assert!(program.find_function("__print_int").is_some());
    }

    #[test]
    fn test_function_with_locals() {
        let program = parse("int main() { int a; float b; a = 1; return a; }").unwrap();
        let body = main_body(&program);
        assert_eq!(body.locals.elements_size(), 8);
        assert_eq!(body.locals.variable("a").unwrap().offset, -4);
        assert_eq!(body.locals.variable("b").unwrap().offset, -8);
        assert_eq!(body.statements.len(), 2);
    }

    #[test]
    fn test_parameter_offsets() {
        let program = parse("int add(int a, int b) { return a + b; }").unwrap();
        let id = program.find_function("add").unwrap();
        let f = program.function(id);
        assert_eq!(f.parameters.variable("a").unwrap().offset, 8);
        assert_eq!(f.parameters.variable("b").unwrap().offset, 12);
        assert_eq!(f.arguments_size(), 8);
    }

    #[test]
    fn test_prototype_then_definition() {
        let program = parse("int f(int x); int f(int x) { return x; }").unwrap();
        let id = program.find_function("f").unwrap();
        assert!(program.function(id).body.is_some());
    }

    #[test]
    fn test_conflicting_prototype() {
        let err = parse("int f(int x); float f(int x) { return 0; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert!(err.message.contains("conflicting"));
    }

    #[test]
    fn test_redefinition_rejected() {
        let err = parse("int f() { return 0; } int f() { return 1; }").unwrap_err();
        assert!(err.message.contains("redefinition"));
    }

    #[test]
    fn test_global_variables() {
        let program = parse("int g; float h; int main() { g = 1; return g; }").unwrap();
        assert!(program.globals.variable("g").unwrap().global);
        assert!(program.globals.variable("h").unwrap().global);
    }

    #[test]
    fn test_undeclared_identifier() {
        let err = parse("int main() { x = 1; return 0; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert!(err.message.contains("undeclared identifier 'x'"));
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let err = parse("int main() { int a; float a; return 0; }").unwrap_err();
        assert!(err.message.contains("redeclaration of 'a'"));
    }

    #[test]
    fn test_shadowing_in_nested_block() {
        assert!(parse("int main() { int a; { float a; a = 0.5; } return 0; }").is_ok());
    }

    #[test]
    fn test_precedence_shapes_tree() {
        let e = parse_expr("1 + 2 * 3").unwrap();
        assert_eq!(e.op, TokenKind::Plus);
        let ExprKind::Binary { right, .. } = &e.kind else {
            panic!("expected binary node");
        };
        assert_eq!(right.op, TokenKind::Asterisk);
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse("int main() { int a; int b; a = b = 1; return a; }").unwrap();
        let body = main_body(&program);
        let Statement::Expression(e) = &body.statements[0] else {
            panic!("expected expression statement");
        };
        assert_eq!(e.op, TokenKind::Assign);
        let ExprKind::Binary { right, .. } = &e.kind else {
            panic!();
        };
        assert_eq!(right.op, TokenKind::Assign);
    }

    #[test]
    fn test_assignment_requires_lvalue() {
        let err = parse("int main() { 1 = 2; return 0; }").unwrap_err();
        assert!(err.message.contains("lvalue required"));
    }

    #[test]
    fn test_const_variable_is_not_assignable() {
        let err = parse("int main() { const int c; c = 1; return 0; }").unwrap_err();
        assert!(err.message.contains("lvalue required"));
    }

    #[test]
    fn test_modulo_requires_integers() {
        let err = parse("int main() { float f; f = 1.5 % 2; return 0; }").unwrap_err();
        assert!(err.message.contains("invalid operands"));
    }

    #[test]
    fn test_mixed_arithmetic_types_as_float() {
        let (e, program) = parse_expr_with_program("1 + 2.5");
        assert!(program.types.is_float(e.ty));
    }

    #[test]
    fn test_comparison_types_as_int() {
        let (e, program) = parse_expr_with_program("1.5 < 2.5");
        assert!(program.types.is_int(e.ty));
    }

    #[test]
    fn test_dereference_requires_pointer() {
        let err = parse("int main() { int a; a = *a; return 0; }").unwrap_err();
        assert!(err.message.contains("pointer"));
    }

    #[test]
    fn test_address_of_subscript() {
        assert!(
            parse("void f(int *p) { } int main() { int a[5]; f(&a[2]); return 0; }").is_ok()
        );
    }

    #[test]
    fn test_address_of_rvalue_rejected() {
        let err = parse("int main() { int *p; p = &(1 + 2); return 0; }").unwrap_err();
        assert!(err.message.contains("operand of '&'"));
    }

    #[test]
    fn test_call_argument_count_checked() {
        let err = parse("int f(int a) { return a; } int main() { return f(1, 2); }").unwrap_err();
        assert!(err.message.contains("argument"));
    }

    #[test]
    fn test_call_of_non_function() {
        let err = parse("int main() { int a; return a(); }").unwrap_err();
        assert!(err.message.contains("not a function"));
    }

    #[test]
    fn test_struct_declaration_and_access() {
        let source = "
            int main() {
                struct point { int x; int y; };
                struct point p;
                p.x = 3;
                p.y = 4;
                return p.x + p.y;
            }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_struct_field_offsets_packed() {
        let source = "
            struct s { int a; float b; int c; };
            int main() { struct s v; v.c = 1; return v.c; }";
        let program = parse(source).unwrap();
        let tag = program.globals.get_tag("s").unwrap();
        assert_eq!(program.types.field(tag, "a").unwrap().offset, 0);
        assert_eq!(program.types.field(tag, "b").unwrap().offset, 4);
        assert_eq!(program.types.field(tag, "c").unwrap().offset, 8);
        assert_eq!(program.types.size(tag), 12);
    }

    #[test]
    fn test_unknown_struct_member() {
        let err = parse(
            "int main() { struct s { int a; }; struct s v; return v.b; }",
        )
        .unwrap_err();
        assert!(err.message.contains("no member named 'b'"));
    }

    #[test]
    fn test_indirect_access_requires_struct_pointer() {
        let err = parse("int main() { int *p; return p->a; }").unwrap_err();
        assert!(err.message.contains("pointer to a struct"));
    }

    #[test]
    fn test_self_referential_struct() {
        let source = "
            struct node { int value; struct node *next; };
            int main() { struct node n; n.value = 1; return n.value; }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_incomplete_struct_variable_rejected() {
        let err = parse("struct later; struct later x; int main() { return 0; }").unwrap_err();
        assert!(err.message.contains("incomplete type"));
    }

    #[test]
    fn test_struct_assignment_rejected() {
        let source = "
            int main() {
                struct s { int a; };
                struct s x;
                struct s y;
                x = y;
                return 0;
            }";
        let err = parse(source).unwrap_err();
        assert!(err.message.contains("struct"));
    }

    #[test]
    fn test_typedef_alias() {
        let source = "typedef int myint; int main() { myint x; x = 3; return x; }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_sizeof_expression() {
        let source = "int main() { int a[5]; return sizeof a; }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_sizeof_type_name_rejected() {
        let err = parse("int main() { return sizeof (int); }").unwrap_err();
        assert!(err.message.contains("sizeof"));
    }

    #[test]
    fn test_cast_expression() {
        let e = parse_expr("(float) 3").unwrap();
        assert!(matches!(e.kind, ExprKind::Cast { .. }));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = parse("int main() { break; return 0; }").unwrap_err();
        assert!(err.message.contains("break"));
    }

    #[test]
    fn test_continue_inside_switch_needs_loop() {
        let err = parse(
            "int main() { switch (1) { case 1: continue; } return 0; }",
        )
        .unwrap_err();
        assert!(err.message.contains("continue"));
    }

    #[test]
    fn test_case_outside_switch() {
        let err = parse("int main() { case 1: return 0; }").unwrap_err();
        assert!(err.message.contains("case"));
    }

    #[test]
    fn test_case_value_must_be_constant() {
        let err = parse(
            "int main() { int a; a = 1; switch (a) { case a: return 0; } return 1; }",
        )
        .unwrap_err();
        assert!(err.message.contains("integer constant"));
    }

    #[test]
    fn test_case_value_may_fold() {
        let program = parse(
            "int main() { switch (1) { case 2 + 3: return 0; } return 1; }",
        )
        .unwrap();
        let body = main_body(&program);
        let Statement::Switch(s) = &body.statements[0] else {
            panic!("expected switch");
        };
        assert_eq!(s.cases.len(), 1);
        assert_eq!(s.cases[0].value, 5);
    }

    #[test]
    fn test_goto_unresolved_label() {
        let err = parse("int main() { goto missing; return 0; }").unwrap_err();
        assert!(err.message.contains("label 'missing'"));
    }

    #[test]
    fn test_goto_resolved_label() {
        assert!(parse("int main() { goto out; out: return 0; }").is_ok());
    }

    #[test]
    fn test_labels_are_per_function() {
        let source = "
            void a() { goto l; l: ; }
            void b() { goto l; l: ; }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_conditional_common_type() {
        let (e, program) = parse_expr_with_program("1 ? 2 : 3.5");
        assert!(program.types.is_float(e.ty));
    }

    #[test]
    fn test_conditional_mixed_pointers_yield_void_pointer() {
        let source = "
            int main() {
                void *p;
                int *q;
                int c;
                c = 1;
                c ? p : q;
                c ? q : p;
                return 0;
            }";
        let program = parse(source).unwrap();
        let body = main_body(&program);
        for stmt in &body.statements[1..3] {
            let Statement::Expression(e) = stmt else {
                panic!("expected conditional expression statement");
            };
            let pointee = program.types.pointee(e.ty).unwrap();
            assert!(program.types.is_void(pointee));
        }
    }

    #[test]
    fn test_conditional_incompatible_pointers_rejected() {
        let err = parse(
            "int main() { int *p; float *q; int c; c = 1; c ? p : q; return 0; }",
        )
        .unwrap_err();
        assert!(err.message.contains("conditional"));
    }

    #[test]
    fn test_expression_mode_rejects_trailing() {
        let err = parse_expr("1 + 2 ;").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("trailing characters"));
    }

    #[test]
    fn test_lexical_error_propagates() {
        let err = parse("int main() { return \"unterminated; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
    }

    #[test]
    fn test_array_subscript_both_orders() {
        assert!(parse("int main() { int a[3]; a[0] = 1; 0[a] = 2; return a[0]; }").is_ok());
    }

    #[test]
    fn test_void_variable_rejected() {
        let err = parse("int main() { void v; return 0; }").unwrap_err();
        assert!(err.message.contains("void"));
    }

    #[test]
    fn test_return_value_in_void_function() {
        let err = parse("void f() { return 1; }").unwrap_err();
        assert!(err.message.contains("void function"));
    }

    #[test]
    fn test_string_argument_compatible_with_int_pointer() {
        let source = "int printf(const int *fmt, int d); int main() { printf(\"%d\\n\", 1); return 0; }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let source = "
            int g;
            struct pair { int a; float b; };
            int add(int a, int b) { return a + b; }
            int main() { struct pair p; p.a = add(g, 2); return p.a; }";
        assert_eq!(parse(source).unwrap(), parse(source).unwrap());
    }
}
