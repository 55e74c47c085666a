//! Parser: builds an expression tree from lexer tokens
//!
//! Precedence, lowest first: `||`, `&&`, `!`, comparison, primary.

use serde_json::Value;

use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{PolicyError, PolicyResult};

/// One step of a path expression.
#[derive(Clone, Debug, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Built-in functions callable from rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    NotNull,
}

impl Function {
    fn lookup(name: &str) -> PolicyResult<Self> {
        match name {
            "contains" => Ok(Self::Contains),
            "starts_with" => Ok(Self::StartsWith),
            "ends_with" => Ok(Self::EndsWith),
            "length" => Ok(Self::Length),
            "not_null" => Ok(Self::NotNull),
            other => Err(PolicyError::UnknownFunction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Length => "length",
            Self::NotNull => "not_null",
        }
    }

    fn check_arity(&self, got: usize) -> PolicyResult<()> {
        let (ok, expected) = match self {
            Self::Contains | Self::StartsWith | Self::EndsWith => (got == 2, "2"),
            Self::Length => (got == 1, "1"),
            Self::NotNull => (got >= 1, "at least 1"),
        };
        if ok {
            Ok(())
        } else {
            Err(PolicyError::Arity {
                function: self.name().to_string(),
                expected: expected.to_string(),
                got,
            })
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Literal(Value),
    Path(Vec<PathSegment>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

/// Parse an expression string into a tree.
pub fn parse(input: &str) -> PolicyResult<Node> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    parser.expect(TokenKind::Eof)?;
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn next(&mut self) -> PolicyResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| PolicyError::UnexpectedEof("token".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> PolicyResult<Token> {
        let token = self.next()?;
        if token.kind == kind {
            return Ok(token);
        }
        if token.kind == TokenKind::Eof {
            return Err(PolicyError::UnexpectedEof(kind.to_string()));
        }
        Err(PolicyError::UnexpectedToken {
            col: token.col,
            expected: kind.to_string(),
            found: token.text,
        })
    }

    fn parse_or(&mut self) -> PolicyResult<Node> {
        let mut left = self.parse_and()?;
        while *self.peek() == TokenKind::Or {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PolicyResult<Node> {
        let mut left = self.parse_not()?;
        while *self.peek() == TokenKind::And {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PolicyResult<Node> {
        if *self.peek() == TokenKind::Not {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PolicyResult<Node> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_primary()?;
        Ok(Node::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> PolicyResult<Node> {
        let token = self.next()?;
        match token.kind {
            TokenKind::True => Ok(Node::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Node::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Node::Literal(Value::Null)),
            TokenKind::StringLiteral => Ok(Node::Literal(Value::String(token.text))),
            TokenKind::NumberLiteral => parse_number(&token).map(Node::Literal),
            TokenKind::JsonLiteral => serde_json::from_str(token.text.trim())
                .map(Node::Literal)
                .map_err(|e| PolicyError::Parse {
                    col: token.col,
                    message: format!("invalid JSON literal: {e}"),
                }),
            TokenKind::OpenParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::Identifier if *self.peek() == TokenKind::OpenParen => {
                self.parse_call(token)
            }
            TokenKind::Identifier => self.parse_path(token),
            TokenKind::Eof => Err(PolicyError::UnexpectedEof("expression".to_string())),
            _ => Err(PolicyError::UnexpectedToken {
                col: token.col,
                expected: "expression".to_string(),
                found: token.text,
            }),
        }
    }

    fn parse_call(&mut self, name: Token) -> PolicyResult<Node> {
        let function = Function::lookup(&name.text)?;
        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if *self.peek() != TokenKind::CloseParen {
            loop {
                args.push(self.parse_or()?);
                if *self.peek() == TokenKind::Comma {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::CloseParen)?;
        function.check_arity(args.len())?;
        Ok(Node::Call(function, args))
    }

    fn parse_path(&mut self, head: Token) -> PolicyResult<Node> {
        let mut segments = vec![PathSegment::Field(head.text)];
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.pos += 1;
                    let field = self.next()?;
                    match field.kind {
                        // Keywords are valid field names after a dot.
                        TokenKind::Identifier
                        | TokenKind::True
                        | TokenKind::False
                        | TokenKind::Null => segments.push(PathSegment::Field(field.text)),
                        TokenKind::StringLiteral => segments.push(PathSegment::Field(field.text)),
                        _ => {
                            return Err(PolicyError::UnexpectedToken {
                                col: field.col,
                                expected: "field name".to_string(),
                                found: field.text,
                            })
                        }
                    }
                }
                TokenKind::OpenBracket => {
                    self.pos += 1;
                    let index = self.expect(TokenKind::NumberLiteral)?;
                    let value = index.text.parse::<i64>().map_err(|_| PolicyError::Parse {
                        col: index.col,
                        message: format!("invalid index '{}'", index.text),
                    })?;
                    self.expect(TokenKind::CloseBracket)?;
                    segments.push(PathSegment::Index(value));
                }
                _ => break,
            }
        }
        Ok(Node::Path(segments))
    }
}

fn parse_number(token: &Token) -> PolicyResult<Value> {
    if let Ok(int) = token.text.parse::<i64>() {
        return Ok(Value::from(int));
    }
    token
        .text
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| PolicyError::Parse {
            col: token.col,
            message: format!("invalid number '{}'", token.text),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> PathSegment {
        PathSegment::Field(name.to_string())
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let node = parse("a || b && c").unwrap();
        match node {
            Node::Or(left, right) => {
                assert_eq!(*left, Node::Path(vec![field("a")]));
                assert!(matches!(*right, Node::And(_, _)));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn parses_indexed_paths_and_literals() {
        let node = parse("meta.tags[0] == 'vip'").unwrap();
        assert_eq!(
            node,
            Node::Compare(
                CompareOp::Eq,
                Box::new(Node::Path(vec![field("meta"), field("tags"), PathSegment::Index(0)])),
                Box::new(Node::Literal(json!("vip"))),
            )
        );
    }

    #[test]
    fn parses_function_calls() {
        let node = parse("contains(actor.role, 'admin') && length(meta) > `0`").unwrap();
        assert!(matches!(node, Node::And(_, _)));
    }

    #[test]
    fn reports_structural_errors() {
        assert!(matches!(parse("a ==").unwrap_err(), PolicyError::UnexpectedEof(_)));
        assert!(matches!(parse("(a").unwrap_err(), PolicyError::UnexpectedEof(_)));
        assert!(matches!(parse("a b").unwrap_err(), PolicyError::UnexpectedToken { .. }));
        assert_eq!(
            parse("explode(a)").unwrap_err(),
            PolicyError::UnknownFunction("explode".to_string())
        );
        assert!(matches!(parse("length(a, b)").unwrap_err(), PolicyError::Arity { .. }));
    }
}
