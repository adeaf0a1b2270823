//! Hand-written scanner for the C subset.
//!
//! The scanner reads characters on demand and produces [`Token`]s tagged
//! with a [`TokenKind`], the consumed lexeme, a source [`Position`] and a
//! parsed payload for numeric and character constants. Malformed input is
//! reported through the scanner's diagnostic list; the offending lexeme
//! becomes an `Invalid` token and scanning resumes at the next character,
//! which keeps scan-mode dumps going. EOF is sticky.
//!
//! [`TokenStream`] wraps the scanner with a small ring buffer providing
//! one-token look-behind for the parser's speculative label parsing.

use crate::diagnostics::{Diagnostic, Position};
use std::iter::Peekable;
use std::str::Chars;

/// Token classification. Operator names follow their lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Invalid,

    Identifier,
    Keyword,

    BlockStart,
    BlockEnd,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    ConstInteger,
    ConstFloat,
    ConstChar,
    ConstString,

    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,

    Assign,
    PlusAssign,
    MinusAssign,
    AsteriskAssign,
    SlashAssign,
    PercentAssign,
    AmpersandAssign,
    BitwiseOrAssign,
    BitwiseXorAssign,
    ShiftLeftAssign,
    ShiftRightAssign,

    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,

    LogicAnd,
    LogicOr,
    LogicNot,

    Ampersand,
    BitwiseOr,
    BitwiseNot,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,

    Dot,
    Arrow,

    Increment,
    Decrement,

    Conditional,

    Comma,
    Semicolon,
    Colon,

    Eof,
}

impl TokenKind {
    /// Stable name used by the scan-mode dump.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Invalid => "INVALID",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Keyword => "KEYWORD",
            TokenKind::BlockStart => "BLOCK_START",
            TokenKind::BlockEnd => "BLOCK_END",
            TokenKind::LeftParen => "LEFT_PARENTHESIS",
            TokenKind::RightParen => "RIGHT_PARENTHESIS",
            TokenKind::LeftBracket => "LEFT_SQUARE_BRACKET",
            TokenKind::RightBracket => "RIGHT_SQUARE_BRACKET",
            TokenKind::ConstInteger => "CONSTANT_INTEGER",
            TokenKind::ConstFloat => "CONSTANT_FLOAT",
            TokenKind::ConstChar => "CONSTANT_SYMBOL",
            TokenKind::ConstString => "CONSTANT_STRING",
            TokenKind::Plus => "OPERATION_PLUS",
            TokenKind::Minus => "OPERATION_MINUS",
            TokenKind::Asterisk => "OPERATION_ASTERISK",
            TokenKind::Slash => "OPERATION_SLASH",
            TokenKind::Percent => "OPERATION_PERCENT",
            TokenKind::Assign => "OPERATION_ASSIGN",
            TokenKind::PlusAssign => "OPERATION_PLUS_ASSIGN",
            TokenKind::MinusAssign => "OPERATION_MINUS_ASSIGN",
            TokenKind::AsteriskAssign => "OPERATION_ASTERISK_ASSIGN",
            TokenKind::SlashAssign => "OPERATION_SLASH_ASSIGN",
            TokenKind::PercentAssign => "OPERATION_PERCENT_ASSIGN",
            TokenKind::AmpersandAssign => "OPERATION_AMPERSAND_ASSIGN",
            TokenKind::BitwiseOrAssign => "OPERATION_BITWISE_OR_ASSIGN",
            TokenKind::BitwiseXorAssign => "OPERATION_BITWISE_XOR_ASSIGN",
            TokenKind::ShiftLeftAssign => "OPERATION_SHIFT_LEFT_ASSIGN",
            TokenKind::ShiftRightAssign => "OPERATION_SHIFT_RIGHT_ASSIGN",
            TokenKind::Equal => "OPERATION_EQUAL",
            TokenKind::NotEqual => "OPERATION_NOT_EQUAL",
            TokenKind::LessThan => "OPERATION_LESS_THAN",
            TokenKind::GreaterThan => "OPERATION_GREATER_THAN",
            TokenKind::LessThanOrEqual => "OPERATION_LESS_THAN_OR_EQUAL",
            TokenKind::GreaterThanOrEqual => "OPERATION_GREATER_THAN_OR_EQUAL",
            TokenKind::LogicAnd => "OPERATION_LOGIC_AND",
            TokenKind::LogicOr => "OPERATION_LOGIC_OR",
            TokenKind::LogicNot => "OPERATION_LOGIC_NOT",
            TokenKind::Ampersand => "OPERATION_AMPERSAND",
            TokenKind::BitwiseOr => "OPERATION_BITWISE_OR",
            TokenKind::BitwiseNot => "OPERATION_BITWISE_NOT",
            TokenKind::BitwiseXor => "OPERATION_BITWISE_XOR",
            TokenKind::ShiftLeft => "OPERATION_SHIFT_LEFT",
            TokenKind::ShiftRight => "OPERATION_SHIFT_RIGHT",
            TokenKind::Dot => "OPERATION_DOT",
            TokenKind::Arrow => "OPERATION_INDIRECT_ACCESS",
            TokenKind::Increment => "OPERATION_INCREMENT",
            TokenKind::Decrement => "OPERATION_DECREMENT",
            TokenKind::Conditional => "OPERATION_CONDITIONAL",
            TokenKind::Comma => "SEPARATOR_COMMA",
            TokenKind::Semicolon => "SEPARATOR_SEMICOLON",
            TokenKind::Colon => "SEPARATOR_COLON",
            TokenKind::Eof => "EOF",
        }
    }

    pub fn is_compound_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::AsteriskAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::AmpersandAssign
                | TokenKind::BitwiseOrAssign
                | TokenKind::BitwiseXorAssign
                | TokenKind::ShiftLeftAssign
                | TokenKind::ShiftRightAssign
        )
    }

    pub fn is_assignment(self) -> bool {
        self == TokenKind::Assign || self.is_compound_assignment()
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::LessThan
                | TokenKind::GreaterThan
                | TokenKind::LessThanOrEqual
                | TokenKind::GreaterThanOrEqual
        )
    }

    /// Binary operations that map one-to-one onto a two-operand mnemonic.
    pub fn is_trivial_operation(self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Asterisk
                | TokenKind::Ampersand
                | TokenKind::BitwiseOr
                | TokenKind::BitwiseXor
        )
    }
}

/// Payload of a constant token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenValue {
    None,
    Integer(i32),
    Float(f32),
    Char(char),
}

/// One scanned token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
    pub value: TokenValue,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
            value: TokenValue::None,
        }
    }

    pub fn integer_value(&self) -> i32 {
        match self.value {
            TokenValue::Integer(v) => v,
            TokenValue::Char(c) => c as i32,
            _ => 0,
        }
    }

    pub fn float_value(&self) -> f32 {
        match self.value {
            TokenValue::Float(v) => v,
            _ => 0.0,
        }
    }
}

const KEYWORDS: &[&str] = &[
    "return", "if", "else", "for", "while", "do", "switch", "case", "default", "break",
    "continue", "goto", "struct", "sizeof", "typedef", "const",
];

fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains(&s)
}

fn is_identifier_char(c: char, first: bool) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (!first && c.is_ascii_digit())
}

fn is_operation_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '^' | '~' | '&' | '|' | '?' | '.'
    )
}

fn is_numeric_char(c: char) -> bool {
    c.is_ascii_digit()
        || c == '.'
        || c == 'x'
        || c == 'X'
        || c.is_ascii_hexdigit()
        || c == 'l'
        || c == 'L'
}

/// Longest prefix of `s` that parses as a decimal floating constant,
/// mirroring stream extraction: at least one character must be consumed.
fn parse_prefix_f64(s: &str) -> Option<f64> {
    for end in (1..=s.len()).rev() {
        if let Ok(v) = s[..end].parse::<f64>() {
            return Some(v);
        }
    }
    None
}

/// Leading decimal digits of `s` (with optional sign handled by the
/// grammar, never present here), saturated into the `int` range.
fn parse_prefix_int(s: &str) -> Option<i32> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match digits.parse::<i64>() {
        Ok(v) if v > i32::MAX as i64 => Some(i32::MAX),
        Ok(v) => Some(v as i32),
        // More digits than fit an i64: saturate as well.
        Err(_) => Some(i32::MAX),
    }
}

/// The lexer. Produces tokens left-to-right; see the module docs for the
/// error-handling contract.
pub struct Scanner<'a> {
    input: Peekable<Chars<'a>>,
    position: Position,
    last_token: Option<Token>,
    diagnostics: Vec<Diagnostic>,
    error_state: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            input: source.chars().peekable(),
            position: Position::start(),
            last_token: None,
            diagnostics: Vec::new(),
            error_state: false,
        }
    }

    /// The most recently produced token, if any.
    pub fn current(&self) -> Option<&Token> {
        self.last_token.as_ref()
    }

    /// True once any lexical error has been reported.
    pub fn is_error(&self) -> bool {
        self.error_state
    }

    /// Diagnostics accumulated so far, oldest first.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Scan and return the next token. EOF repeats forever.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let token = match self.input.peek().copied() {
            None => Token::new(TokenKind::Eof, "", self.position),
            Some(c) if is_identifier_char(c, true) => self.scan_identifier(),
            Some(c) if self.starts_numeric_constant(c) => self.scan_numeric_constant(),
            Some(c) if is_operation_char(c) => self.scan_operation(),
            Some('"') => self.scan_string_constant(),
            Some('\'') => self.scan_char_constant(),
            Some(_) => self.scan_single_char(),
        };

        self.last_token = Some(token.clone());
        token
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.input.next()?;
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(c)
    }

    fn error(&mut self, position: Position, message: impl Into<String>) -> Token {
        self.diagnostics.push(Diagnostic::error(position, message));
        self.error_state = true;
        Token::new(TokenKind::Invalid, "", position)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            if !(self.skip_whitespace() || self.skip_comment()) {
                break;
            }
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while matches!(self.input.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.advance();
            skipped = true;
        }
        skipped
    }

    /// Skip a `/* ... */` block comment. Line comments are not part of the
    /// subset.
    fn skip_comment(&mut self) -> bool {
        let mut probe = self.input.clone();
        if probe.next() != Some('/') || probe.next() != Some('*') {
            return false;
        }

        let start = self.position;
        self.advance();
        self.advance();

        let mut star = false;
        loop {
            match self.advance() {
                Some('*') => star = true,
                Some('/') if star => return true,
                Some(_) => star = false,
                None => {
                    self.error(start, "unterminated comment");
                    return true;
                }
            }
        }
    }

    fn starts_numeric_constant(&self, first: char) -> bool {
        if first.is_ascii_digit() {
            return true;
        }
        if first == '.' {
            let mut probe = self.input.clone();
            probe.next();
            return matches!(probe.peek(), Some(c) if c.is_ascii_digit());
        }
        false
    }

    fn scan_identifier(&mut self) -> Token {
        let position = self.position;
        let mut text = String::new();

        while matches!(self.input.peek(), Some(&c) if is_identifier_char(c, false)) {
            text.push(self.advance().unwrap());
        }

        let kind = if is_keyword(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };

        Token::new(kind, text, position)
    }

    /// Consume a run of numeric-constant characters and classify it.
    ///
    /// The lexeme is parsed both as a decimal double and as a decimal int
    /// over its longest valid prefix; if the two agree exactly the token
    /// is an integer, otherwise a float. Hex and octal spellings are
    /// consumed but keep decimal semantics, a documented limitation of
    /// the subset.
    fn scan_numeric_constant(&mut self) -> Token {
        let position = self.position;
        let mut text = String::new();

        while matches!(self.input.peek(), Some(&c) if is_numeric_char(c)) {
            text.push(self.advance().unwrap());
        }

        let Some(double_val) = parse_prefix_f64(&text) else {
            return self.error(position, "invalid numerical constant");
        };
        let Some(int_val) = parse_prefix_int(&text) else {
            return self.error(position, "invalid numerical constant");
        };

        let mut token;
        if double_val == int_val as f64 {
            token = Token::new(TokenKind::ConstInteger, text, position);
            token.value = TokenValue::Integer(int_val);
        } else {
            token = Token::new(TokenKind::ConstFloat, text, position);
            token.value = TokenValue::Float(double_val as f32);
        }

        token
    }

    fn scan_operation(&mut self) -> Token {
        let position = self.position;
        let first = self.advance().unwrap();
        let second = self.input.peek().copied();

        // Greedy match: longest of a three-, two- or one-character
        // operator starting at `first`.
        let (kind, extra) = match (first, second) {
            ('+', Some('=')) => (TokenKind::PlusAssign, 1),
            ('+', Some('+')) => (TokenKind::Increment, 1),
            ('+', _) => (TokenKind::Plus, 0),

            ('-', Some('=')) => (TokenKind::MinusAssign, 1),
            ('-', Some('-')) => (TokenKind::Decrement, 1),
            ('-', Some('>')) => (TokenKind::Arrow, 1),
            ('-', _) => (TokenKind::Minus, 0),

            ('*', Some('=')) => (TokenKind::AsteriskAssign, 1),
            ('*', _) => (TokenKind::Asterisk, 0),

            ('/', Some('=')) => (TokenKind::SlashAssign, 1),
            ('/', _) => (TokenKind::Slash, 0),

            ('%', Some('=')) => (TokenKind::PercentAssign, 1),
            ('%', _) => (TokenKind::Percent, 0),

            ('~', _) => (TokenKind::BitwiseNot, 0),

            ('^', Some('=')) => (TokenKind::BitwiseXorAssign, 1),
            ('^', _) => (TokenKind::BitwiseXor, 0),

            ('&', Some('=')) => (TokenKind::AmpersandAssign, 1),
            ('&', Some('&')) => (TokenKind::LogicAnd, 1),
            ('&', _) => (TokenKind::Ampersand, 0),

            ('|', Some('=')) => (TokenKind::BitwiseOrAssign, 1),
            ('|', Some('|')) => (TokenKind::LogicOr, 1),
            ('|', _) => (TokenKind::BitwiseOr, 0),

            ('!', Some('=')) => (TokenKind::NotEqual, 1),
            ('!', _) => (TokenKind::LogicNot, 0),

            ('=', Some('=')) => (TokenKind::Equal, 1),
            ('=', _) => (TokenKind::Assign, 0),

            ('<', Some('=')) => (TokenKind::LessThanOrEqual, 1),
            ('<', Some('<')) => (TokenKind::ShiftLeft, 1),
            ('<', _) => (TokenKind::LessThan, 0),

            ('>', Some('=')) => (TokenKind::GreaterThanOrEqual, 1),
            ('>', Some('>')) => (TokenKind::ShiftRight, 1),
            ('>', _) => (TokenKind::GreaterThan, 0),

            ('?', _) => (TokenKind::Conditional, 0),
            ('.', _) => (TokenKind::Dot, 0),

            _ => (TokenKind::Invalid, 0),
        };

        let mut text = String::new();
        text.push(first);

        let mut kind = kind;
        if extra == 1 {
            text.push(self.advance().unwrap());

            // `<<=` and `>>=` extend the two-character shifts.
            if kind == TokenKind::ShiftLeft && self.input.peek() == Some(&'=') {
                text.push(self.advance().unwrap());
                kind = TokenKind::ShiftLeftAssign;
            } else if kind == TokenKind::ShiftRight && self.input.peek() == Some(&'=') {
                text.push(self.advance().unwrap());
                kind = TokenKind::ShiftRightAssign;
            }
        }

        Token::new(kind, text, position)
    }

    fn scan_single_char(&mut self) -> Token {
        let position = self.position;
        let c = self.advance().unwrap();

        let kind = match c {
            '{' => TokenKind::BlockStart,
            '}' => TokenKind::BlockEnd,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            _ => {
                return self.error(position, format!("invalid character '{}'", c));
            }
        };

        Token::new(kind, c.to_string(), position)
    }

    fn scan_string_constant(&mut self) -> Token {
        let position = self.position;
        self.advance(); // opening quote

        let mut text = String::new();
        loop {
            match self.input.peek().copied() {
                None | Some('\n') => {
                    return self.error(position, "unterminated string constant");
                }
                Some('"') => {
                    self.advance();
                    let mut token = Token::new(TokenKind::ConstString, text, position);
                    token.value = TokenValue::None;
                    return token;
                }
                Some('\\') => match self.process_escape_sequence() {
                    Some(c) => text.push(c),
                    None => return self.error(position, "invalid escape sequence"),
                },
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
            }
        }
    }

    fn scan_char_constant(&mut self) -> Token {
        let position = self.position;
        self.advance(); // opening quote

        let c = match self.input.peek().copied() {
            None => return self.error(position, "unterminated character constant"),
            Some('\\') => match self.process_escape_sequence() {
                Some(c) => c,
                None => return self.error(position, "invalid escape sequence"),
            },
            Some(c) => {
                self.advance();
                c
            }
        };

        if self.advance() != Some('\'') {
            return self.error(position, "unterminated character constant");
        }

        let mut token = Token::new(TokenKind::ConstChar, c.to_string(), position);
        token.value = TokenValue::Char(c);
        token
    }

    /// Consume a `\x` escape, the backslash included. Returns the decoded
    /// character or `None` on an unknown escape.
    fn process_escape_sequence(&mut self) -> Option<char> {
        self.advance(); // backslash

        match self.advance()? {
            c @ ('\'' | '"' | '\\' | '?') => Some(c),
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0c'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\x0b'),
            _ => None,
        }
    }
}

/// Ring-buffered view over the scanner with bounded look-behind.
///
/// The parser consumes tokens through this stream and may step back one
/// token after speculatively reading an identifier that turns out not to
/// start a labelled statement.
pub struct TokenStream<'a> {
    scanner: Scanner<'a>,
    buffer: Vec<Token>,
    /// Index of the current token within `buffer`.
    current: usize,
}

/// Retained history depth. Two suffices for this grammar; five matches
/// the original's head-room.
const TOKEN_STREAM_SIZE: usize = 5;

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut scanner = Scanner::new(source);
        let first = scanner.next_token();
        TokenStream {
            scanner,
            buffer: vec![first],
            current: 0,
        }
    }

    /// The token under the cursor.
    pub fn current(&self) -> &Token {
        &self.buffer[self.current]
    }

    /// Advance the cursor, scanning a fresh token if the cursor is at the
    /// newest buffered one.
    pub fn advance(&mut self) -> &Token {
        if self.current + 1 < self.buffer.len() {
            self.current += 1;
        } else {
            let token = self.scanner.next_token();
            self.buffer.push(token);
            if self.buffer.len() > TOKEN_STREAM_SIZE {
                self.buffer.remove(0);
            }
            self.current = self.buffer.len() - 1;
        }
        self.current()
    }

    /// Step back one token. Retreating past the retained window is a
    /// programmer error.
    pub fn retreat(&mut self) -> &Token {
        assert!(self.current > 0, "token stream rewound past its buffer");
        self.current -= 1;
        self.current()
    }

    pub fn scanner_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.scanner.take_diagnostics()
    }

    /// The first lexical error seen so far, if any. The parser surfaces
    /// it when it runs into an `Invalid` token.
    pub fn scanner_error(&self) -> Option<&Diagnostic> {
        self.scanner.diagnostics().first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let t = scanner.next_token();
            let kind = t.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace_and_comments_only() {
        assert_eq!(kinds("  \t\n /* comment \n spanning lines */  \n"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut scanner = Scanner::new("x");
        scanner.next_token();
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn test_identifiers_and_keywords() {
        let mut scanner = Scanner::new("return retval _x9");
        assert_eq!(scanner.next_token().kind, TokenKind::Keyword);
        assert_eq!(scanner.next_token().kind, TokenKind::Identifier);
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::Identifier);
        assert_eq!(t.text, "_x9");
    }

    #[test]
    fn test_positions_track_lines_and_columns() {
        let mut scanner = Scanner::new("a\n  b");
        let a = scanner.next_token();
        assert_eq!(a.position, Position::new(1, 1));
        let b = scanner.next_token();
        assert_eq!(b.position, Position::new(2, 3));
    }

    #[test]
    fn test_integer_constant() {
        let mut scanner = Scanner::new("42");
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::ConstInteger);
        assert_eq!(t.integer_value(), 42);
    }

    #[test]
    fn test_float_constant() {
        let mut scanner = Scanner::new("3.78");
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::ConstFloat);
        assert!((t.float_value() - 3.78).abs() < 1e-6);
    }

    #[test]
    fn test_leading_dot_float() {
        let mut scanner = Scanner::new(".5");
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::ConstFloat);
        assert!((t.float_value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_dot_alone_is_member_operator() {
        let mut scanner = Scanner::new(". x");
        assert_eq!(scanner.next_token().kind, TokenKind::Dot);
    }

    #[test]
    fn test_int_max_boundary() {
        // INT_MAX round-trips through double, one past does not.
        let mut scanner = Scanner::new("2147483647 2147483648");
        assert_eq!(scanner.next_token().kind, TokenKind::ConstInteger);
        assert_eq!(scanner.next_token().kind, TokenKind::ConstFloat);
    }

    #[test]
    fn test_whole_valued_float_spelling_is_integer() {
        // Decimal round-trip agreement classifies 7.0 as an integer.
        let mut scanner = Scanner::new("7.0");
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::ConstInteger);
        assert_eq!(t.integer_value(), 7);
    }

    #[test]
    fn test_greedy_operators() {
        let source = "== != <= >= && || << >> ++ -- -> += -= *= /= %= &= |= ^= <<= >>=";
        let expected = [
            TokenKind::Equal,
            TokenKind::NotEqual,
            TokenKind::LessThanOrEqual,
            TokenKind::GreaterThanOrEqual,
            TokenKind::LogicAnd,
            TokenKind::LogicOr,
            TokenKind::ShiftLeft,
            TokenKind::ShiftRight,
            TokenKind::Increment,
            TokenKind::Decrement,
            TokenKind::Arrow,
            TokenKind::PlusAssign,
            TokenKind::MinusAssign,
            TokenKind::AsteriskAssign,
            TokenKind::SlashAssign,
            TokenKind::PercentAssign,
            TokenKind::AmpersandAssign,
            TokenKind::BitwiseOrAssign,
            TokenKind::BitwiseXorAssign,
            TokenKind::ShiftLeftAssign,
            TokenKind::ShiftRightAssign,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(source), expected);
    }

    #[test]
    fn test_single_char_tokens() {
        assert_eq!(
            kinds("{}()[];,:"),
            vec![
                TokenKind::BlockStart,
                TokenKind::BlockEnd,
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_constant_with_escapes() {
        let mut scanner = Scanner::new(r#""a\"b\\c\n\t\a\b\f\r\v\?""#);
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::ConstString);
        assert_eq!(t.text, "a\"b\\c\n\t\x07\x08\x0c\r\x0b?");
    }

    #[test]
    fn test_unterminated_string_reports_error() {
        let mut scanner = Scanner::new("\"abc\nrest");
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::Invalid);
        assert!(scanner.is_error());
        assert!(scanner.diagnostics()[0].message.contains("unterminated string"));
    }

    #[test]
    fn test_char_constant() {
        let mut scanner = Scanner::new(r"'x' '\n'");
        let t = scanner.next_token();
        assert_eq!(t.kind, TokenKind::ConstChar);
        assert_eq!(t.value, TokenValue::Char('x'));
        let t = scanner.next_token();
        assert_eq!(t.value, TokenValue::Char('\n'));
    }

    #[test]
    fn test_char_constant_dump_name() {
        assert_eq!(TokenKind::ConstChar.name(), "CONSTANT_SYMBOL");
    }

    #[test]
    fn test_char_constant_requires_closing_quote() {
        let mut scanner = Scanner::new("'ab'");
        assert_eq!(scanner.next_token().kind, TokenKind::Invalid);
    }

    #[test]
    fn test_unterminated_comment() {
        let mut scanner = Scanner::new("/* never closed");
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
        assert!(scanner.is_error());
    }

    #[test]
    fn test_invalid_character() {
        let mut scanner = Scanner::new("@");
        assert_eq!(scanner.next_token().kind, TokenKind::Invalid);
        assert!(scanner.is_error());
    }

    #[test]
    fn test_scan_continues_after_error() {
        let mut scanner = Scanner::new("@ x");
        scanner.next_token();
        assert_eq!(scanner.next_token().kind, TokenKind::Identifier);
    }

    #[test]
    fn test_token_stream_retreat() {
        let mut stream = TokenStream::new("a b c");
        assert_eq!(stream.current().text, "a");
        stream.advance();
        assert_eq!(stream.current().text, "b");
        stream.retreat();
        assert_eq!(stream.current().text, "a");
        stream.advance();
        stream.advance();
        assert_eq!(stream.current().text, "c");
    }
}
