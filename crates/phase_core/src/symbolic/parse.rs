use super::expr::{Expr, Func};
use crate::error::{DynamicsError, Result};
use std::f64::consts::PI;

/// Parses an infix expression into a symbolic [`Expr`].
///
/// Grammar, loosest first: `+ -`, then `* /`, then unary minus, then `^`
/// (right-associative, `**` accepted as a synonym). `-x^2` is `-(x^2)`.
/// Identifiers followed by `(` are function calls; `sqrt` is sugar for `^0.5`.
/// `I` is the imaginary unit and `pi` is the constant.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(DynamicsError::Parse(format!(
            "Unexpected token {token:?} in '{input}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else if (d == 'e' || d == 'E') && !num_str.is_empty() {
                    // Exponent part, only when followed by digits (optionally signed).
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    if !matches!(lookahead.peek(), Some(x) if x.is_ascii_digit()) {
                        break;
                    }
                    while let Some(&x) = lookahead.peek() {
                        if x.is_ascii_digit() {
                            exponent.push(x);
                            lookahead.next();
                        } else {
                            break;
                        }
                    }
                    num_str.push_str(&exponent);
                    chars = lookahead;
                    break;
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| DynamicsError::Parse(format!("Invalid number '{num_str}'")))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            chars.next();
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Token::Caret
                }
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => {
                    return Err(DynamicsError::Parse(format!(
                        "Unexpected character '{other}' in '{input}'"
                    )))
                }
            };
            tokens.push(token);
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(DynamicsError::Parse("Expected ')'".to_string())),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = left + right;
                }
                Some(Token::Minus) => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = left - right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = left * right;
                }
                Some(Token::Slash) => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = left / right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            // Right operand goes through unary so that `x^-2` and `2^3^2` work.
            let exponent = self.parse_unary()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::real(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    if name == "sqrt" {
                        return Ok(arg.sqrt());
                    }
                    let func = Func::from_name(&name).ok_or_else(|| {
                        DynamicsError::Parse(format!("Unknown function '{name}'"))
                    })?;
                    Ok(Expr::call(func, arg))
                } else {
                    Ok(match name.as_str() {
                        "I" => Expr::complex(0.0, 1.0),
                        "pi" => Expr::real(PI),
                        _ => Expr::Sym(name),
                    })
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(DynamicsError::Parse(format!("Unexpected token {token:?}"))),
            None => Err(DynamicsError::Parse("Unexpected end of input".to_string())),
        }
    }
}
