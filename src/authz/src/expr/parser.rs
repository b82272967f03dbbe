//! Lexer and recursive-descent parser for matcher expressions
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := cmp ( "&&" cmp )*
//! cmp     := sum ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" ) sum )?
//! sum     := unary ( ( "+" | "-" ) unary )*
//! unary   := ( "!" | "-" ) unary | primary
//! primary := literal | ref | call | "(" or ( "," or )* ")"
//! ```

use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::{ExprError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    True,
    False,
    In,
    LParen,
    RParen,
    Comma,
    Dot,
    AndAnd,
    OrOr,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Str(s) => format!("string '{}'", s),
            Token::Number(n) => format!("number {}", n),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::In => "'in'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::AndAnd => "'&&'".to_string(),
            Token::OrOr => "'||'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let token = match ident.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "in" => Token::In,
                _ => Token::Ident(ident),
            };
            tokens.push((token, offset));
            continue;
        }

        if ch.is_ascii_digit() {
            let mut literal = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    literal.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let number = literal
                .parse::<f64>()
                .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
            tokens.push((Token::Number(number), offset));
            continue;
        }

        if ch == '\'' || ch == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, escaped)) => value.push(escaped),
                        None => break,
                    },
                    c if c == ch => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(ExprError::UnterminatedString(offset));
            }
            tokens.push((Token::Str(value), offset));
            continue;
        }

        chars.next();
        let next = chars.peek().map(|&(_, c)| c);
        let token = match (ch, next) {
            ('&', Some('&')) => Some(Token::AndAnd),
            ('|', Some('|')) => Some(Token::OrOr),
            ('=', Some('=')) => Some(Token::EqEq),
            ('!', Some('=')) => Some(Token::NotEq),
            ('<', Some('=')) => Some(Token::Le),
            ('>', Some('=')) => Some(Token::Ge),
            _ => None,
        };
        if let Some(token) = token {
            chars.next();
            tokens.push((token, offset));
            continue;
        }

        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '!' => Token::Bang,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '+' => Token::Plus,
            '-' => Token::Minus,
            _ => return Err(ExprError::UnexpectedChar { ch, offset }),
        };
        tokens.push((token, offset));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<()> {
        match self.advance() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, offset)) => Err(ExprError::UnexpectedToken {
                found: token.describe(),
                expected: what,
                offset,
            }),
            None => Err(ExprError::UnexpectedEnd(what)),
        }
    }

    fn ident(&mut self, what: &'static str) -> Result<String> {
        match self.advance() {
            Some((Token::Ident(name), _)) => Ok(name),
            Some((token, offset)) => Err(ExprError::UnexpectedToken {
                found: token.describe(),
                expected: what,
                offset,
            }),
            None => Err(ExprError::UnexpectedEnd(what)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_cmp()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::In) => BinaryOp::In,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_sum()?;
        Ok(binary(op, lhs, rhs))
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some((token, offset)) = self.advance() else {
            return Err(ExprError::UnexpectedEnd("an operand"));
        };

        match token {
            Token::Str(value) => Ok(Expr::Literal(Value::String(value))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Number(n) => Number::from_f64(n)
                .map(|num| Expr::Literal(Value::Number(num)))
                .ok_or_else(|| ExprError::InvalidNumber(n.to_string())),
            Token::LParen => {
                let first = self.parse_or()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    items.push(self.parse_or()?);
                }
                self.expect(Token::RParen, "')'")?;
                Ok(Expr::List(items))
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    return self.parse_call(name);
                }
                if !self.eat(&Token::Dot) {
                    return Err(ExprError::UnexpectedToken {
                        found: format!("bare identifier '{}'", name),
                        expected: "a field reference such as 'r.sub' or a function call",
                        offset,
                    });
                }
                let field = self.ident("a field name")?;
                let mut path = Vec::new();
                while self.eat(&Token::Dot) {
                    path.push(self.ident("an attribute name")?);
                }
                Ok(Expr::Ref {
                    scope: name,
                    field,
                    path,
                })
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                expected: "an operand",
                offset,
            }),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr> {
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma, "',' or ')'")?;
            }
        }
        Ok(Expr::Call { name, args })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Parse matcher source text into an expression tree
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;

    if let Some((token, offset)) = parser.advance() {
        return Err(ExprError::UnexpectedToken {
            found: token.describe(),
            expected: "end of expression",
            offset,
        });
    }

    Ok(expr)
}
