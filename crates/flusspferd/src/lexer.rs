//! Lexical analysis for the script evaluator

use crate::parser::ParseError;
use crate::token::{Token, TokenKind};

/// Tokenizer over one source text
pub struct Lexer {
    chars: Vec<char>,
    current: usize,
    line: u32,
    start_line: u32,
}

impl Lexer {
    /// Lexer whose first line is numbered `first_line`
    pub fn new(source: &str, first_line: u32) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: first_line,
            start_line: first_line,
        }
    }

    /// Tokenize the whole source; the last token is always `Eof`
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments()?;
        self.start_line = self.line;

        let Some(c) = self.advance() else {
            return Ok(self.make_token(TokenKind::Eof, ""));
        };

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => return Ok(self.number(c)),
            '.' => TokenKind::Dot,
            '=' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        TokenKind::EqualEqualEqual
                    } else {
                        TokenKind::EqualEqual
                    }
                } else {
                    TokenKind::Equal
                }
            }
            '!' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        TokenKind::BangEqualEqual
                    } else {
                        TokenKind::BangEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '&' if self.match_char('&') => TokenKind::AmpAmp,
            '|' if self.match_char('|') => TokenKind::PipePipe,
            '"' | '\'' => return self.string(c),
            c if c.is_ascii_digit() => return Ok(self.number(c)),
            c if c.is_alphabetic() || c == '_' || c == '$' => return Ok(self.identifier(c)),
            c => return Err(self.error(format!("unexpected character '{}'", c))),
        };
        let lexeme: String = self.chars[self.current - lexeme_len(kind)..self.current]
            .iter()
            .collect();
        Ok(self.make_token(kind, lexeme))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                c if c.is_whitespace() => self.current += 1,
                '/' if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.current += 1;
                    }
                }
                '/' if self.peek_next() == Some('*') => {
                    self.current += 2;
                    loop {
                        match self.advance() {
                            None => {
                                return Err(self.incomplete("unterminated comment"));
                            }
                            Some('*') if self.peek() == Some('/') => {
                                self.current += 1;
                                break;
                            }
                            Some('\n') => self.line += 1,
                            Some(_) => {}
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<Token, ParseError> {
        let mut value = String::new();
        loop {
            let c = self
                .advance()
                .ok_or_else(|| self.incomplete("unterminated string literal"))?;
            match c {
                c if c == quote => break,
                '\n' => return Err(self.error("unterminated string literal")),
                '\\' => {
                    let escaped = self
                        .advance()
                        .ok_or_else(|| self.incomplete("unterminated string literal"))?;
                    match escaped {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        '0' => value.push('\0'),
                        'x' => value.push(self.hex_escape(2)?),
                        'u' => value.push(self.hex_escape(4)?),
                        '\n' => self.line += 1,
                        other => value.push(other),
                    }
                }
                c => value.push(c),
            }
        }
        Ok(self.make_token(TokenKind::String, value))
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, ParseError> {
        let end = self.current + digits;
        if end > self.chars.len() {
            return Err(self.incomplete("unterminated string literal"));
        }
        let text: String = self.chars[self.current..end].iter().collect();
        let code = u32::from_str_radix(&text, 16)
            .map_err(|_| self.error(format!("invalid escape sequence '{}'", text)))?;
        self.current = end;
        char::from_u32(code).ok_or_else(|| self.error("invalid escape sequence"))
    }

    fn number(&mut self, first: char) -> Token {
        let start = self.current - 1;
        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.current += 1;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.current += 1;
            }
        } else {
            self.digits();
            if first != '.' && self.peek() == Some('.') {
                self.current += 1;
                self.digits();
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                let mark = self.current;
                self.current += 1;
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.current += 1;
                }
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.digits();
                } else {
                    self.current = mark;
                }
            }
        }
        let lexeme: String = self.chars[start..self.current].iter().collect();
        self.make_token(TokenKind::Number, lexeme)
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
        }
    }

    fn identifier(&mut self, _first: char) -> Token {
        let start = self.current - 1;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.current += 1;
        }
        let lexeme: String = self.chars[start..self.current].iter().collect();
        let kind = TokenKind::keyword(&lexeme).unwrap_or(TokenKind::Identifier);
        self.make_token(kind, lexeme)
    }

    // === Character navigation ===

    fn peek(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += 1;
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn make_token(&self, kind: TokenKind, lexeme: impl Into<String>) -> Token {
        Token::new(kind, lexeme, self.start_line)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, false)
    }

    fn incomplete(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, true)
    }
}

fn lexeme_len(kind: TokenKind) -> usize {
    match kind {
        TokenKind::EqualEqualEqual | TokenKind::BangEqualEqual => 3,
        TokenKind::EqualEqual
        | TokenKind::BangEqual
        | TokenKind::LessEqual
        | TokenKind::GreaterEqual
        | TokenKind::AmpAmp
        | TokenKind::PipePipe => 2,
        _ => 1,
    }
}
