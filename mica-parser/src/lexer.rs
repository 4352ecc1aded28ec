// mica-parser - Lexer for Mica
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Lexer (tokeniser) for Mica source code.
//!
//! Converts a source string into a stream of position-tagged tokens.
//! Numeric literals follow the engine's octal rule: a literal starting
//! with `0` whose remaining characters are all digits 0-7 is read in
//! base 8; `0x` prefixes are hexadecimal; everything else is decimal.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use mica_core::{Error, Result, ScriptPosition};

/// A token kind produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals and names
    Number(f64),
    Str(String),
    Identifier(String),

    // Keywords
    Var,
    Const,
    Function,
    Class,
    Extends,
    If,
    Else,
    For,
    While,
    In,
    Return,
    True,
    False,
    Null,
    Export,
    Import,
    New,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Question,

    // Operators
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    LshiftAssign,
    RshiftAssign,
    RshiftUAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lshift,
    Rshift,
    RshiftU,
    PlusPlus,
    MinusMinus,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "{}", other.text()),
        }
    }
}

impl TokenKind {
    fn text(&self) -> &'static str {
        match self {
            TokenKind::Var => "var",
            TokenKind::Const => "const",
            TokenKind::Function => "function",
            TokenKind::Class => "class",
            TokenKind::Extends => "extends",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::While => "while",
            TokenKind::In => "in",
            TokenKind::Return => "return",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Export => "export",
            TokenKind::Import => "import",
            TokenKind::New => "new",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Question => "?",
            TokenKind::Assign => "=",
            TokenKind::AddAssign => "+=",
            TokenKind::SubAssign => "-=",
            TokenKind::MulAssign => "*=",
            TokenKind::DivAssign => "/=",
            TokenKind::ModAssign => "%=",
            TokenKind::AndAssign => "&=",
            TokenKind::OrAssign => "|=",
            TokenKind::XorAssign => "^=",
            TokenKind::LshiftAssign => "<<=",
            TokenKind::RshiftAssign => ">>=",
            TokenKind::RshiftUAssign => ">>>=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Power => "**",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::EqEqEq => "===",
            TokenKind::NotEqEq => "!==",
            TokenKind::Lshift => "<<",
            TokenKind::Rshift => ">>",
            TokenKind::RshiftU => ">>>",
            _ => "",
        }
    }
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: ScriptPosition,
}

/// The lexer converts source code into tokens.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Tokenise the whole source.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token from the source.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        let pos = self.position();
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token { kind: TokenKind::Eof, pos }),
        };

        let kind = if c.is_ascii_digit() {
            self.read_number()?
        } else if c == '"' || c == '\'' {
            self.read_string(c)?
        } else if is_ident_start(c) {
            self.read_identifier()
        } else {
            self.read_operator()?
        };

        Ok(Token { kind, pos })
    }

    fn position(&self) -> ScriptPosition {
        ScriptPosition::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        c
    }

    /// Consume `c` if it is next; true on a match.
    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    // Peek one further without consuming the slash.
                    let mut clone = self.chars.clone();
                    clone.next();
                    match clone.next() {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            let start = self.position();
                            self.advance();
                            self.advance();
                            loop {
                                match self.advance() {
                                    Some('*') if self.peek() == Some('/') => {
                                        self.advance();
                                        break;
                                    }
                                    Some(_) => {}
                                    None => {
                                        return Err(Error::parse(
                                            "Unterminated block comment",
                                            start,
                                        ));
                                    }
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_number(&mut self) -> Result<TokenKind> {
        let pos = self.position();
        let mut text = String::new();

        // Hexadecimal
        if self.peek() == Some('0') {
            let mut clone = self.chars.clone();
            clone.next();
            if matches!(clone.next(), Some('x') | Some('X')) {
                self.advance();
                self.advance();
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_hexdigit() {
                        digits.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err(Error::parse("Invalid hexadecimal literal", pos));
                }
                let value = u64::from_str_radix(&digits, 16)
                    .map_err(|_| Error::parse("Invalid hexadecimal literal", pos))?;
                return Ok(TokenKind::Number(value as f64));
            }
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            // Only part of the number when a digit follows.
            let mut clone = self.chars.clone();
            clone.next();
            if matches!(clone.next(), Some(d) if d.is_ascii_digit()) {
                is_float = true;
                text.push('.');
                self.advance();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut clone = self.chars.clone();
            clone.next();
            let mut next = clone.next();
            if matches!(next, Some('+') | Some('-')) {
                next = clone.next();
            }
            if matches!(next, Some(d) if d.is_ascii_digit()) {
                is_float = true;
                text.push(self.advance().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.advance().unwrap());
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        // Octal rule: leading zero and all remaining digits 0-7.
        if !is_float && text.len() > 1 && text.starts_with('0') && is_octal(&text) {
            let value = u64::from_str_radix(&text[1..], 8)
                .map_err(|_| Error::parse("Invalid octal literal", pos))?;
            return Ok(TokenKind::Number(value as f64));
        }

        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| Error::parse(format!("Invalid number literal: {}", text), pos))
    }

    fn read_string(&mut self, quote: char) -> Result<TokenKind> {
        let start = self.position();
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(TokenKind::Str(text)),
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(c) => text.push(c),
                    None => return Err(Error::parse("Unterminated string literal", start)),
                },
                Some(c) => text.push(c),
                None => return Err(Error::parse("Unterminated string literal", start)),
            }
        }
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_part(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match name.as_str() {
            "var" => TokenKind::Var,
            "const" => TokenKind::Const,
            "function" => TokenKind::Function,
            "class" => TokenKind::Class,
            "extends" => TokenKind::Extends,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "in" => TokenKind::In,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "export" => TokenKind::Export,
            "import" => TokenKind::Import,
            "new" => TokenKind::New,
            _ => TokenKind::Identifier(name),
        }
    }

    fn read_operator(&mut self) -> Result<TokenKind> {
        let pos = self.position();
        let c = self.advance().unwrap();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            '~' => TokenKind::Tilde,
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::AddAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::SubAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('*') {
                    TokenKind::Power
                } else if self.eat('=') {
                    TokenKind::MulAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.eat('=') {
                    TokenKind::DivAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.eat('=') {
                    TokenKind::ModAssign
                } else {
                    TokenKind::Percent
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AmpAmp
                } else if self.eat('=') {
                    TokenKind::AndAssign
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::PipePipe
                } else if self.eat('=') {
                    TokenKind::OrAssign
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => {
                if self.eat('=') {
                    TokenKind::XorAssign
                } else {
                    TokenKind::Caret
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else {
                    TokenKind::Assign
                }
            }
            '<' => {
                if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::LshiftAssign
                    } else {
                        TokenKind::Lshift
                    }
                } else if self.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') {
                            TokenKind::RshiftUAssign
                        } else {
                            TokenKind::RshiftU
                        }
                    } else if self.eat('=') {
                        TokenKind::RshiftAssign
                    } else {
                        TokenKind::Rshift
                    }
                } else if self.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            other => {
                return Err(Error::parse(
                    format!("Unexpected character: '{}'", other),
                    pos,
                ));
            }
        };
        Ok(kind)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_octal(text: &str) -> bool {
    text.bytes().all(|b| (b'0'..=b'7').contains(&b))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Number(42.0), TokenKind::Eof]);
        assert_eq!(kinds("3.5"), vec![TokenKind::Number(3.5), TokenKind::Eof]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Number(1000.0), TokenKind::Eof]);
        assert_eq!(kinds("0xff"), vec![TokenKind::Number(255.0), TokenKind::Eof]);
    }

    #[test]
    fn test_octal_rule() {
        // Leading zero, all digits 0-7: base 8.
        assert_eq!(kinds("010"), vec![TokenKind::Number(8.0), TokenKind::Eof]);
        assert_eq!(kinds("0777"), vec![TokenKind::Number(511.0), TokenKind::Eof]);
        // A digit beyond 7 makes it decimal.
        assert_eq!(kinds("018"), vec![TokenKind::Number(18.0), TokenKind::Eof]);
        // A lone zero and fractional forms are decimal.
        assert_eq!(kinds("0"), vec![TokenKind::Number(0.0), TokenKind::Eof]);
        assert_eq!(kinds("0.5"), vec![TokenKind::Number(0.5), TokenKind::Eof]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds("\"a\\nb\""),
            vec![TokenKind::Str("a\nb".to_string()), TokenKind::Eof]
        );
        assert_eq!(
            kinds("'it'"),
            vec![TokenKind::Str("it".to_string()), TokenKind::Eof]
        );
        assert!(Lexer::new("\"open").tokenize().is_err());
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a >>>= 1"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::RshiftUAssign,
                TokenKind::Number(1.0),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("=== == ="),
            vec![
                TokenKind::EqEqEq,
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = Lexer::new("// line\n/* block */ x").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier("x".to_string()));
        assert_eq!(tokens[0].pos.line, 2);
        assert_eq!(tokens[0].pos.column, 13);
    }

    #[test]
    fn test_member_access_vs_float() {
        assert_eq!(
            kinds("a.b"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Dot,
                TokenKind::Identifier("b".to_string()),
                TokenKind::Eof
            ]
        );
    }
}
