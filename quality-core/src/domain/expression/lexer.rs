// quality-core/src/domain/expression/lexer.rs

use super::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    /// `#name`
    Variable(String),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    /// `{'a', 'b'}` inline lists
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            index: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::with_capacity((self.input.len() / 4).max(8));
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index + 1).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map_or(self.input.len(), |(pos, _)| *pos)
    }

    fn advance(&mut self) {
        self.index += 1;
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.current().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let position = self.offset();
        let Some(ch) = self.current() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };

        let kind = match ch {
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            '[' => Some(TokenKind::LeftBracket),
            ']' => Some(TokenKind::RightBracket),
            '{' => Some(TokenKind::LeftBrace),
            '}' => Some(TokenKind::RightBrace),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            _ => None,
        };
        if let Some(kind) = kind {
            self.advance();
            return Ok(Token { kind, position });
        }

        let kind = match ch {
            '=' | '!' | '<' | '>' | '&' | '|' => self.operator(ch, position)?,
            '\'' | '"' => self.string(ch, position)?,
            '#' => {
                self.advance();
                match self.identifier() {
                    Some(name) => TokenKind::Variable(name),
                    None => {
                        return Err(ExpressionError::syntax(
                            position,
                            "expected a variable name after '#'",
                        ));
                    }
                }
            }
            c if c.is_ascii_digit() => self.number(position)?,
            c if c.is_alphabetic() || c == '_' => match self.identifier() {
                Some(name) => TokenKind::Ident(name),
                None => return Err(ExpressionError::syntax(position, "invalid identifier")),
            },
            other => {
                return Err(ExpressionError::syntax(
                    position,
                    format!("unexpected character '{other}'"),
                ));
            }
        };

        Ok(Token { kind, position })
    }

    fn operator(&mut self, ch: char, position: usize) -> Result<TokenKind, ExpressionError> {
        let next = self.peek();
        let (kind, width) = match (ch, next) {
            ('=', Some('=')) => (TokenKind::Equal, 2),
            ('!', Some('=')) => (TokenKind::NotEqual, 2),
            ('!', _) => (TokenKind::Bang, 1),
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('<', _) => (TokenKind::Less, 1),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            ('>', _) => (TokenKind::Greater, 1),
            ('&', Some('&')) => (TokenKind::And, 2),
            ('|', Some('|')) => (TokenKind::Or, 2),
            // Assignment and bitwise operators are not part of the language.
            _ => {
                return Err(ExpressionError::syntax(
                    position,
                    format!("unsupported operator '{ch}'"),
                ));
            }
        };
        for _ in 0..width {
            self.advance();
        }
        Ok(kind)
    }

    fn string(&mut self, quote: char, position: usize) -> Result<TokenKind, ExpressionError> {
        self.advance();
        let mut out = String::new();
        loop {
            match self.current() {
                None => return Err(ExpressionError::syntax(position, "unterminated string")),
                // 'it''s' style escaping for single quotes
                Some(c) if c == quote && quote == '\'' && self.peek() == Some('\'') => {
                    out.push('\'');
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::Str(out));
                }
                Some('\\') if quote == '"' => {
                    self.advance();
                    match self.current() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some(c) => out.push(c),
                        None => {
                            return Err(ExpressionError::syntax(position, "unterminated string"));
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }

    fn number(&mut self, position: usize) -> Result<TokenKind, ExpressionError> {
        let start = self.offset();
        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        // A dot only belongs to the literal when digits follow (`1.5` vs `x.size()`)
        if self.current() == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.current().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let end = self.offset();
        // Java-style long/double suffixes
        if matches!(self.current(), Some('L' | 'l' | 'd' | 'D')) {
            self.advance();
        }
        self.input[start..end]
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|e| ExpressionError::syntax(position, format!("invalid number: {e}")))
    }

    fn identifier(&mut self) -> Option<String> {
        let start = self.offset();
        if !self.current().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return None;
        }
        while self
            .current()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        Some(self.input[start..self.offset()].to_string())
    }
}
