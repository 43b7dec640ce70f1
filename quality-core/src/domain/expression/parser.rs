// quality-core/src/domain/expression/parser.rs

// Recursive descent with precedence climbing for infix operators.
// Function and method names are resolved here, so an unknown call is a parse error.

use super::error::ExpressionError;
use super::lexer::{Token, TokenKind};
use super::value::Value;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

pub(crate) const MAX_DEPTH: usize = 64;
pub(crate) const MAX_REGEX_PATTERN_LEN: usize = 1000;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::In
            | BinaryOp::NotIn => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    DaysBetween,
    Today,
    Date,
    Abs,
    Min,
    Max,
    Coalesce,
}

impl Function {
    /// (function, min args, max args)
    fn resolve(name: &str) -> Option<(Function, usize, usize)> {
        let resolved = match name.to_ascii_uppercase().as_str() {
            "DAYS_BETWEEN" => (Function::DaysBetween, 2, 2),
            // NOW is the evaluation date as well: rules compare dates, not instants
            "TODAY" | "NOW" => (Function::Today, 0, 0),
            "DATE" => (Function::Date, 1, 1),
            "ABS" => (Function::Abs, 1, 1),
            "MIN" => (Function::Min, 1, usize::MAX),
            "MAX" => (Function::Max, 1, usize::MAX),
            "COALESCE" => (Function::Coalesce, 1, usize::MAX),
            _ => return None,
        };
        Some(resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Trim,
    IsEmpty,
    IsBlank,
    ToUpperCase,
    ToLowerCase,
    Length,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    EqualsIgnoreCase,
    IsBefore,
    IsAfter,
    IsEqual,
    PlusDays,
    MinusDays,
}

impl Method {
    fn resolve(name: &str) -> Option<(Method, usize)> {
        let resolved = match name {
            "trim" => (Method::Trim, 0),
            "isEmpty" => (Method::IsEmpty, 0),
            "isBlank" => (Method::IsBlank, 0),
            "toUpperCase" => (Method::ToUpperCase, 0),
            "toLowerCase" => (Method::ToLowerCase, 0),
            "length" | "size" => (Method::Length, 0),
            "contains" => (Method::Contains, 1),
            "startsWith" => (Method::StartsWith, 1),
            "endsWith" => (Method::EndsWith, 1),
            "matches" => (Method::Matches, 1),
            "equalsIgnoreCase" => (Method::EqualsIgnoreCase, 1),
            "isBefore" => (Method::IsBefore, 1),
            "isAfter" => (Method::IsAfter, 1),
            "isEqual" | "equals" => (Method::IsEqual, 1),
            "plusDays" => (Method::PlusDays, 1),
            "minusDays" => (Method::MinusDays, 1),
            _ => return None,
        };
        Some(resolved)
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Trim => "trim",
            Method::IsEmpty => "isEmpty",
            Method::IsBlank => "isBlank",
            Method::ToUpperCase => "toUpperCase",
            Method::ToLowerCase => "toLowerCase",
            Method::Length => "length",
            Method::Contains => "contains",
            Method::StartsWith => "startsWith",
            Method::EndsWith => "endsWith",
            Method::Matches => "matches",
            Method::EqualsIgnoreCase => "equalsIgnoreCase",
            Method::IsBefore => "isBefore",
            Method::IsAfter => "isAfter",
            Method::IsEqual => "isEqual",
            Method::PlusDays => "plusDays",
            Method::MinusDays => "minusDays",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Variable(String),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    Method {
        receiver: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
    /// `matches` with a literal pattern, compiled once.
    Matches {
        receiver: Box<Expr>,
        regex: Arc<Regex>,
    },
}

/// Full-match semantics: the pattern must cover the whole string.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, ExpressionError> {
    if pattern.len() > MAX_REGEX_PATTERN_LEN {
        return Err(ExpressionError::TooComplex(format!(
            "regex pattern longer than {MAX_REGEX_PATTERN_LEN} bytes"
        )));
    }
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ExpressionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr, ExpressionError> {
        let expr = self.parse_binary(0)?;
        let token = self.current();
        if token.kind != TokenKind::Eof {
            return Err(ExpressionError::syntax(
                token.position,
                format!("unexpected trailing token {:?}", token.kind),
            ));
        }
        Ok(expr)
    }

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.position + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ExpressionError> {
        let token = self.current();
        if token.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                token.position,
                format!("expected {what}, found {:?}", token.kind),
            ))
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooComplex(format!(
                "nesting deeper than {MAX_DEPTH}"
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Infix operator at the cursor and the number of tokens it spans.
    fn peek_operator(&self) -> Option<(BinaryOp, usize)> {
        let op = match &self.current().kind {
            TokenKind::Or => BinaryOp::Or,
            TokenKind::And => BinaryOp::And,
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Percent => BinaryOp::Modulo,
            TokenKind::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "or" => BinaryOp::Or,
                "and" => BinaryOp::And,
                "in" => BinaryOp::In,
                "not" => match self.peek_kind(1) {
                    Some(TokenKind::Ident(next)) if next.eq_ignore_ascii_case("in") => {
                        return Some((BinaryOp::NotIn, 2));
                    }
                    _ => return None,
                },
                _ => return None,
            },
            _ => return None,
        };
        Some((op, 1))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let mut left = self.parse_unary()?;

        while let Some((op, width)) = self.peek_operator() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            for _ in 0..width {
                self.advance();
            }
            // All operators are left-associative
            let right = self.parse_binary(precedence + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.leave();
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        match &self.current().kind {
            TokenKind::Bang => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary()?;
                self.leave();
                Ok(Expr::Not(Box::new(inner)))
            }
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("not") => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary()?;
                self.leave();
                Ok(Expr::Not(Box::new(inner)))
            }
            TokenKind::Minus => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary()?;
                self.leave();
                Ok(match inner {
                    Expr::Literal(Value::Number(n)) => Expr::Literal(Value::Number(-n)),
                    other => Expr::Negate(Box::new(other)),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;

        while self.current().kind == TokenKind::Dot {
            self.advance();
            let token = self.current().clone();
            let TokenKind::Ident(name) = token.kind else {
                return Err(ExpressionError::syntax(
                    token.position,
                    "expected a method name after '.'",
                ));
            };
            self.advance();

            let (method, arity) =
                Method::resolve(&name).ok_or_else(|| ExpressionError::UnknownMethod(name.clone()))?;
            let args = if self.current().kind == TokenKind::LeftParen {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            if args.len() != arity {
                return Err(ExpressionError::Arity {
                    name,
                    expected: arity.to_string(),
                    actual: args.len(),
                });
            }

            expr = match (method, args.as_slice()) {
                (Method::Matches, [Expr::Literal(Value::Text(pattern))]) => Expr::Matches {
                    receiver: Box::new(expr),
                    regex: Arc::new(compile_pattern(pattern)?),
                },
                _ => Expr::Method {
                    receiver: Box::new(expr),
                    method,
                    args,
                },
            };
        }

        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let args = self.parse_sequence(TokenKind::RightParen)?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(args)
    }

    fn parse_sequence(&mut self, closing: TokenKind) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        if self.current().kind == closing {
            return Ok(items);
        }
        loop {
            items.push(self.parse_binary(0)?);
            if self.current().kind == TokenKind::Comma {
                self.advance();
            } else {
                return Ok(items);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Number(n)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_binary(0)?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LeftBracket | TokenKind::LeftBrace => {
                let closing = if token.kind == TokenKind::LeftBracket {
                    TokenKind::RightBracket
                } else {
                    TokenKind::RightBrace
                };
                self.advance();
                let items = self.parse_sequence(closing.clone())?;
                self.expect(closing, "end of list")?;
                Ok(Expr::List(items))
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.to_ascii_lowercase().as_str() {
                    "true" => return Ok(Expr::Literal(Value::Bool(true))),
                    "false" => return Ok(Expr::Literal(Value::Bool(false))),
                    "null" => return Ok(Expr::Literal(Value::Null)),
                    _ => {}
                }
                if self.current().kind == TokenKind::LeftParen {
                    let (function, min, max) = Function::resolve(&name)
                        .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                    let args = self.parse_arguments()?;
                    if args.len() < min || args.len() > max {
                        let expected = if min == max {
                            min.to_string()
                        } else {
                            format!("at least {min}")
                        };
                        return Err(ExpressionError::Arity {
                            name,
                            expected,
                            actual: args.len(),
                        });
                    }
                    Ok(Expr::Call { function, args })
                } else {
                    // Bare identifiers are variables too (`amount > 0`)
                    Ok(Expr::Variable(name))
                }
            }
            other => Err(ExpressionError::syntax(
                token.position,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}
