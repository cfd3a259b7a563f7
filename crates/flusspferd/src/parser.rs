//! Parsing (tokens to syntax tree)
//!
//! Recursive descent for statements, precedence climbing for binary
//! operators. A semicolon may be omitted before `}`, at the end of input, or
//! at a line break.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use thiserror::Error;

/// Syntax error with the line it was found on
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    /// The input ended before the construct was complete
    pub at_eof: bool,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, at_eof: bool) -> Self {
        Self {
            message: message.into(),
            line,
            at_eof,
        }
    }
}

/// Parse `source`, numbering lines from `first_line`
pub fn parse(source: &str, first_line: u32) -> Result<Program, ParseError> {
    let tokens = Lexer::new(source, first_line).tokenize()?;
    Parser::new(tokens).parse_program()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
}

fn infix(kind: TokenKind) -> Option<(Precedence, Infix)> {
    use BinaryOp::*;
    let entry = match kind {
        TokenKind::PipePipe => (Precedence::Or, Infix::Logical(LogicalOp::Or)),
        TokenKind::AmpAmp => (Precedence::And, Infix::Logical(LogicalOp::And)),
        TokenKind::EqualEqual => (Precedence::Equality, Infix::Binary(Eq)),
        TokenKind::BangEqual => (Precedence::Equality, Infix::Binary(NotEq)),
        TokenKind::EqualEqualEqual => (Precedence::Equality, Infix::Binary(StrictEq)),
        TokenKind::BangEqualEqual => (Precedence::Equality, Infix::Binary(StrictNotEq)),
        TokenKind::Less => (Precedence::Comparison, Infix::Binary(Less)),
        TokenKind::LessEqual => (Precedence::Comparison, Infix::Binary(LessEq)),
        TokenKind::Greater => (Precedence::Comparison, Infix::Binary(Greater)),
        TokenKind::GreaterEqual => (Precedence::Comparison, Infix::Binary(GreaterEq)),
        TokenKind::Plus => (Precedence::Term, Infix::Binary(Add)),
        TokenKind::Minus => (Precedence::Term, Infix::Binary(Sub)),
        TokenKind::Star => (Precedence::Factor, Infix::Binary(Mul)),
        TokenKind::Slash => (Precedence::Factor, Infix::Binary(Div)),
        TokenKind::Percent => (Precedence::Factor, Infix::Binary(Rem)),
        _ => return None,
    };
    Some(entry)
}

#[derive(Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    /// `tokens` must end with `Eof`
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    // === Statements ===

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        match self.peek().kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::LeftBrace => {
                self.advance();
                Ok(Stmt::Block(self.block_body()?))
            }
            TokenKind::Var => self.var_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::Throw => {
                self.advance();
                if self.peek().line != line {
                    return Err(self.error_here("illegal newline after throw"));
                }
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Throw { value, line })
            }
            TokenKind::Try => self.try_statement(),
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Expr { expr, line })
            }
        }
    }

    /// Statements up to and including the closing `}`
    fn block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(self.error_here("expected '}' before end of input"));
            }
            statements.push(self.statement()?);
        }
        self.advance();
        Ok(statements)
    }

    fn var_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let mut declarations = Vec::new();
        loop {
            let name = self.consume(TokenKind::Identifier, "variable name")?.lexeme;
            let init = if self.match_kind(TokenKind::Equal) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarations.push((name, init));
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.end_statement()?;
        Ok(Stmt::Var { declarations, line })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        self.consume(TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "')' after condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            line,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.consume(TokenKind::LeftBrace, "'{' after 'try'")?;
        let body = self.block_body()?;
        self.consume(TokenKind::Catch, "'catch' after try block")?;
        self.consume(TokenKind::LeftParen, "'(' after 'catch'")?;
        let param = self.consume(TokenKind::Identifier, "catch parameter")?.lexeme;
        self.consume(TokenKind::RightParen, "')' after catch parameter")?;
        self.consume(TokenKind::LeftBrace, "'{' before catch block")?;
        let handler = self.block_body()?;
        Ok(Stmt::Try {
            body,
            param,
            handler,
        })
    }

    fn end_statement(&mut self) -> Result<(), ParseError> {
        if self.match_kind(TokenKind::Semicolon)
            || self.check(TokenKind::RightBrace)
            || self.is_at_end()
            || self.peek().line > self.previous_line()
        {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    // === Expressions ===

    pub fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.binary(Precedence::Lowest)?;
        if self.check(TokenKind::Equal) {
            if !target.is_assignable() {
                return Err(self.error_here("invalid assignment target"));
            }
            self.advance();
            let value = self.assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            });
        }
        Ok(target)
    }

    fn binary(&mut self, min: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        while let Some((precedence, op)) = infix(self.peek().kind) {
            if precedence <= min {
                break;
            }
            self.advance();
            let right = Box::new(self.binary(precedence)?);
            let operands = Box::new(left);
            left = match op {
                Infix::Binary(op) => Expr::Binary {
                    op,
                    left: operands,
                    right,
                },
                Infix::Logical(op) => Expr::Logical {
                    op,
                    left: operands,
                    right,
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            _ => return self.call(),
        };
        self.advance();
        let operand = Box::new(self.unary()?);
        Ok(Expr::Unary { op, operand })
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.check(TokenKind::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if let Some(member) = self.member_suffix(&expr)? {
                expr = member;
            } else {
                return Ok(expr);
            }
        }
    }

    fn new_expression(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let mut callee = if self.check(TokenKind::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        while let Some(member) = self.member_suffix(&callee)? {
            callee = member;
        }
        let args = if self.match_kind(TokenKind::LeftParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn member_suffix(&mut self, object: &Expr) -> Result<Option<Expr>, ParseError> {
        if self.match_kind(TokenKind::Dot) {
            if !self.at_property_name(false) {
                return Err(self.unexpected("property name"));
            }
            return Ok(Some(Expr::Member {
                object: Box::new(object.clone()),
                name: self.advance().lexeme,
            }));
        }
        if self.match_kind(TokenKind::LeftBracket) {
            let index = self.expression()?;
            self.consume(TokenKind::RightBracket, "']'")?;
            return Ok(Some(Expr::Index {
                object: Box::new(object.clone()),
                index: Box::new(index),
            }));
        }
        Ok(None)
    }

    /// Arguments after the opening `(`
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.match_kind(TokenKind::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.match_kind(TokenKind::RightParen) {
                return Ok(args);
            }
            self.consume(TokenKind::Comma, "',' or ')' in argument list")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if matches!(
            self.peek().kind,
            TokenKind::RightParen
                | TokenKind::RightBrace
                | TokenKind::RightBracket
                | TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Dot
                | TokenKind::Equal
                | TokenKind::Eof
        ) || infix(self.peek().kind).is_some()
        {
            return Err(self.unexpected("expression"));
        }
        let token = self.advance();
        Ok(match token.kind {
            TokenKind::Number => Expr::Number(parse_number(&token.lexeme)),
            TokenKind::String => Expr::String(token.lexeme),
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::Null => Expr::Null,
            TokenKind::Undefined => Expr::Undefined,
            TokenKind::Identifier => Expr::Identifier(token.lexeme),
            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "')'")?;
                expr
            }
            TokenKind::LeftBracket => self.array_literal()?,
            TokenKind::LeftBrace => self.object_literal()?,
            _ => {
                self.current -= 1;
                return Err(self.unexpected("expression"));
            }
        })
    }

    fn array_literal(&mut self) -> Result<Expr, ParseError> {
        let mut elements = Vec::new();
        while !self.match_kind(TokenKind::RightBracket) {
            elements.push(self.assignment()?);
            if !self.check(TokenKind::RightBracket) {
                self.consume(TokenKind::Comma, "',' or ']' in array literal")?;
            }
        }
        Ok(Expr::Array(elements))
    }

    fn object_literal(&mut self) -> Result<Expr, ParseError> {
        let mut properties = Vec::new();
        while !self.match_kind(TokenKind::RightBrace) {
            if !self.at_property_name(true) {
                return Err(self.unexpected("property name"));
            }
            let key = self.advance();
            let name = match key.kind {
                TokenKind::Number => crate::value::number_to_string(parse_number(&key.lexeme)),
                _ => key.lexeme,
            };
            self.consume(TokenKind::Colon, "':' after property name")?;
            properties.push((name, self.assignment()?));
            if !self.check(TokenKind::RightBrace) {
                self.consume(TokenKind::Comma, "',' or '}' in object literal")?;
            }
        }
        Ok(Expr::Object(properties))
    }

    // === Token navigation ===

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous_line(&self) -> u32 {
        self.current
            .checked_sub(1)
            .map(|i| self.tokens[i].line)
            .unwrap_or(0)
    }

    /// Identifier or keyword; string and number keys only in literals
    fn at_property_name(&self, literal: bool) -> bool {
        let token = self.peek();
        match token.kind {
            TokenKind::Identifier => true,
            TokenKind::String | TokenKind::Number => literal,
            _ => TokenKind::keyword(&token.lexeme).is_some(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Identifier | TokenKind::Number => format!("'{}'", token.lexeme),
            kind => kind.describe().to_string(),
        };
        ParseError::new(
            format!("expected {}, found {}", expected, found),
            token.line,
            token.kind == TokenKind::Eof,
        )
    }

    fn error_here(&self, message: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.line, token.kind == TokenKind::Eof)
    }
}

fn parse_number(lexeme: &str) -> f64 {
    match lexeme
        .strip_prefix("0x")
        .or_else(|| lexeme.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN),
        None => lexeme.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn expr(source: &str) -> Expr {
        match parse(source, 1).unwrap().statements.remove(0) {
            Stmt::Expr { expr, .. } => expr,
            other => panic!("not an expression statement: {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Number(1.0)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Number(2.0)),
                    right: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        let Expr::Binary { left, .. } = expr("5 - 2 - 1") else {
            panic!("expected binary");
        };
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn test_new_with_member_callee() {
        let Expr::New { callee, args } = expr("new a.B(1)") else {
            panic!("expected new");
        };
        assert!(matches!(*callee, Expr::Member { .. }));
        assert_eq!(args, vec![Expr::Number(1.0)]);
    }

    #[test]
    fn test_call_on_new_result() {
        let Expr::Call { callee, .. } = expr("new S().size()") else {
            panic!("expected call");
        };
        assert!(matches!(*callee, Expr::Member { .. }));
    }

    #[test]
    fn test_statement_forms() {
        let program = parse(
            "var a = 1, b\nif (a) { b = 2 } else b = 3\ntry { throw 1 } catch (e) { }",
            1,
        )
        .unwrap();
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(program.statements[2], Stmt::Try { .. }));
    }

    #[rstest]
    #[case("var", true)]
    #[case("f(1,", true)]
    #[case("if (x) {", true)]
    #[case("({a: 1", true)]
    #[case("1 +* 2", false)]
    #[case("1 2", false)]
    #[case("a + 1 = 2", false)]
    fn test_errors_report_incompleteness(#[case] source: &str, #[case] at_eof: bool) {
        let err = parse(source, 1).unwrap_err();
        assert_eq!(err.at_eof, at_eof, "{}: {}", source, err);
    }

    #[test]
    fn test_error_line_offset() {
        let err = parse("a\nb c", 7).unwrap_err();
        assert_eq!(err.line, 8);
    }

    #[test]
    fn test_object_literal_keys() {
        assert_eq!(
            expr("({a: 1, 'b c': 2, 3: 4})"),
            Expr::Object(vec![
                ("a".into(), Expr::Number(1.0)),
                ("b c".into(), Expr::Number(2.0)),
                ("3".into(), Expr::Number(4.0)),
            ])
        );
    }
}
