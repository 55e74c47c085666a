//! Lexer: tokenizes rule expressions
//!
//! Handles identifiers, numbers, quoted strings, backtick JSON literals,
//! comparison and boolean operators, and path punctuation.

use crate::error::{PolicyError, PolicyResult};

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text, or the unescaped contents for string and JSON literals
    pub text: String,
    /// Column of the first character (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            col,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    True,
    False,
    Null,

    // Identifiers and literals
    Identifier,
    StringLiteral,
    NumberLiteral,
    JsonLiteral,

    // Operators
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,

    // Structural
    Dot,
    Comma,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Null => write!(f, "null"),
            Self::Identifier => write!(f, "identifier"),
            Self::StringLiteral => write!(f, "string literal"),
            Self::NumberLiteral => write!(f, "number"),
            Self::JsonLiteral => write!(f, "JSON literal"),
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Not => write!(f, "!"),
            Self::Dot => write!(f, "."),
            Self::Comma => write!(f, ","),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::OpenBracket => write!(f, "["),
            Self::CloseBracket => write!(f, "]"),
            Self::Eof => write!(f, "end of expression"),
        }
    }
}

/// Lexer for rule expressions
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> PolicyResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let col = self.pos + 1;

            let ch = match self.peek() {
                Some(ch) => ch,
                None => {
                    tokens.push(Token::new(TokenKind::Eof, "", col));
                    break;
                }
            };

            let token = match ch {
                '.' => self.single(TokenKind::Dot, col),
                ',' => self.single(TokenKind::Comma, col),
                '(' => self.single(TokenKind::OpenParen, col),
                ')' => self.single(TokenKind::CloseParen, col),
                '[' => self.single(TokenKind::OpenBracket, col),
                ']' => self.single(TokenKind::CloseBracket, col),
                '=' => self.pair('=', TokenKind::Eq, None, col)?,
                '!' => self.pair('=', TokenKind::Ne, Some(TokenKind::Not), col)?,
                '<' => self.pair('=', TokenKind::Le, Some(TokenKind::Lt), col)?,
                '>' => self.pair('=', TokenKind::Ge, Some(TokenKind::Gt), col)?,
                '&' => self.pair('&', TokenKind::And, None, col)?,
                '|' => self.pair('|', TokenKind::Or, None, col)?,
                '\'' | '"' => self.read_string(ch, col)?,
                '`' => self.read_json_literal(col)?,
                c if c.is_ascii_digit() || c == '-' => self.read_number(col)?,
                c if c.is_alphabetic() || c == '_' => self.read_identifier(col),
                other => {
                    return Err(PolicyError::Parse {
                        col,
                        message: format!("unexpected character '{other}'"),
                    })
                }
            };
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn single(&mut self, kind: TokenKind, col: usize) -> Token {
        let ch = self.advance().unwrap_or_default();
        Token::new(kind, ch.to_string(), col)
    }

    /// Two-character operator, or a one-character fallback when allowed.
    fn pair(
        &mut self,
        second: char,
        kind: TokenKind,
        fallback: Option<TokenKind>,
        col: usize,
    ) -> PolicyResult<Token> {
        let first = self.advance().unwrap_or_default();
        if self.peek() == Some(second) {
            self.advance();
            return Ok(Token::new(kind, format!("{first}{second}"), col));
        }
        match fallback {
            Some(kind) => Ok(Token::new(kind, first.to_string(), col)),
            None => Err(PolicyError::Parse {
                col,
                message: format!("expected '{first}{second}'"),
            }),
        }
    }

    fn read_string(&mut self, quote: char, col: usize) -> PolicyResult<Token> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => break,
                },
                Some(ch) if ch == quote => {
                    return Ok(Token::new(TokenKind::StringLiteral, text, col));
                }
                Some(ch) => text.push(ch),
                None => break,
            }
        }
        Err(PolicyError::Parse {
            col,
            message: "unterminated string literal".to_string(),
        })
    }

    fn read_json_literal(&mut self, col: usize) -> PolicyResult<Token> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('\\') if self.peek() == Some('`') => {
                    self.advance();
                    text.push('`');
                }
                Some('`') => return Ok(Token::new(TokenKind::JsonLiteral, text, col)),
                Some(ch) => text.push(ch),
                None => {
                    return Err(PolicyError::Parse {
                        col,
                        message: "unterminated JSON literal".to_string(),
                    })
                }
            }
        }
    }

    fn read_number(&mut self, col: usize) -> PolicyResult<Token> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(PolicyError::Parse {
                    col,
                    message: "expected digit after '-'".to_string(),
                });
            }
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.input[start..self.pos].iter().collect();
        Ok(Token::new(TokenKind::NumberLiteral, text, col))
    }

    fn read_identifier(&mut self, col: usize) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let text: String = self.input[start..self.pos].iter().collect();
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_comparison_path() {
        assert_eq!(
            kinds("actor.is_superuser == true"),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_not_from_not_equal() {
        assert_eq!(
            kinds("!a != b"),
            vec![
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::Ne,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reads_literals() {
        let tokens = Lexer::new("'it\\'s' `{\"a\": 1}` -2.5 meta.tags[0]")
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].kind, TokenKind::JsonLiteral);
        assert_eq!(tokens[1].text, "{\"a\": 1}");
        assert_eq!(tokens[2].kind, TokenKind::NumberLiteral);
        assert_eq!(tokens[2].text, "-2.5");
        assert_eq!(tokens[6].kind, TokenKind::NumberLiteral);
    }

    #[test]
    fn rejects_single_ampersand_and_unterminated_strings() {
        assert!(Lexer::new("a & b").tokenize().is_err());
        assert!(Lexer::new("'open").tokenize().is_err());
        assert!(Lexer::new("a = b").tokenize().is_err());
    }
}
