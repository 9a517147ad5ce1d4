use std::fmt;

use crate::error::{Error, Result};

use super::lexer::{tokenize, Spanned, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub params: Vec<Param>,
    pub outputs: Vec<String>,
    pub statements: Vec<Statement>,
}

/// `float(N,C,H,W) I`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub sizes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Accumulate,
    ResetAccumulate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub output: String,
    pub indices: Vec<String>,
    pub op: AssignOp,
    /// Factors of the right-hand side product.
    pub factors: Vec<Access>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub tensor: String,
    pub indices: Vec<Affine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Index(String),
    Constant(usize),
    Scaled(String, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affine {
    pub terms: Vec<Term>,
}

impl Affine {
    /// The index name when the expression is a bare index.
    pub fn as_index(&self) -> Option<&str> {
        match self.terms.as_slice() {
            [Term::Index(name)] => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .terms
            .iter()
            .map(|t| match t {
                Term::Index(name) => name.clone(),
                Term::Constant(c) => c.to_string(),
                Term::Scaled(name, c) => format!("{} * {}", name, c),
            })
            .collect();
        f.write_str(&terms.join(" + "))
    }
}

pub fn parse(source: &str) -> Result<Vec<Definition>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };

    let mut definitions = Vec::new();
    while !parser.at_end() {
        definitions.push(parser.definition()?);
    }
    Ok(definitions)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, o)| *o)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: Token) -> bool {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(expected.clone()) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", expected, self.peek())))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {:?}", other))),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<()> {
        match self.peek() {
            Some(Token::Ident(name)) if name == keyword => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.error(format!("expected `{}`, found {:?}", keyword, other))),
        }
    }

    /// Parses `item {, item}` up to and including the closing token.
    fn list<T>(
        &mut self,
        close: Token,
        mut item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = vec![item(self)?];
        while self.eat(Token::Comma) {
            items.push(item(self)?);
        }
        self.expect(close)?;
        Ok(items)
    }

    fn definition(&mut self) -> Result<Definition> {
        self.keyword("def")?;
        let name = self.ident()?;
        self.expect(Token::LParen)?;
        let params = self.list(Token::RParen, Self::param)?;
        self.expect(Token::Arrow)?;
        self.expect(Token::LParen)?;
        let outputs = self.list(Token::RParen, Self::ident)?;
        self.expect(Token::LBrace)?;

        let mut statements = Vec::new();
        while !self.eat(Token::RBrace) {
            if self.at_end() {
                return Err(self.error("unterminated definition body"));
            }
            statements.push(self.statement()?);
        }

        Ok(Definition {
            name,
            params,
            outputs,
            statements,
        })
    }

    fn param(&mut self) -> Result<Param> {
        self.keyword("float")?;
        self.expect(Token::LParen)?;
        let sizes = self.list(Token::RParen, Self::ident)?;
        let name = self.ident()?;
        Ok(Param { name, sizes })
    }

    fn statement(&mut self) -> Result<Statement> {
        let output = self.ident()?;
        self.expect(Token::LParen)?;
        let indices = self.list(Token::RParen, Self::ident)?;
        let op = match self.next() {
            Some(Token::Assign) => AssignOp::Set,
            Some(Token::PlusAssign) => AssignOp::Accumulate,
            Some(Token::ReduceAssign) => AssignOp::ResetAccumulate,
            other => {
                self.pos -= 1;
                return Err(self.error(format!("expected assignment, found {:?}", other)));
            }
        };

        let mut factors = vec![self.access()?];
        while self.eat(Token::Star) {
            factors.push(self.access()?);
        }

        Ok(Statement {
            output,
            indices,
            op,
            factors,
        })
    }

    fn access(&mut self) -> Result<Access> {
        let tensor = self.ident()?;
        self.expect(Token::LParen)?;
        let indices = self.list(Token::RParen, Self::affine)?;
        Ok(Access { tensor, indices })
    }

    fn affine(&mut self) -> Result<Affine> {
        let mut terms = vec![self.term()?];
        while self.eat(Token::Plus) {
            terms.push(self.term()?);
        }
        Ok(Affine { terms })
    }

    fn term(&mut self) -> Result<Term> {
        match self.next() {
            Some(Token::Ident(name)) => {
                if self.eat(Token::Star) {
                    match self.next() {
                        Some(Token::Int(c)) => Ok(Term::Scaled(name, c)),
                        _ => {
                            self.pos -= 1;
                            Err(self.error("expected integer scale"))
                        }
                    }
                } else {
                    Ok(Term::Index(name))
                }
            }
            Some(Token::Int(c)) => {
                if self.eat(Token::Star) {
                    let name = self.ident()?;
                    Ok(Term::Scaled(name, c))
                } else {
                    Ok(Term::Constant(c))
                }
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected index expression, found {:?}", other)))
            }
        }
    }
}
