//! Recursive-descent parser for build scripts.
//!
//! Newlines are statement separators only and are consumed freely between
//! statements and inside bracketed literals. The single point of
//! lookahead distinguishes `identifier = expr` from an expression
//! statement.

use std::path::Path;

use thiserror::Error;

use crate::ast::{Ast, BinOp, Block, Expr, Stmt, UnOp};
use crate::lexer::{tokenize, LexError};
use crate::token::{Token, TokenKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("{message} at line {line}, column {column}")]
  Unexpected { message: String, line: u32, column: u32 },

  #[error(transparent)]
  Lex(#[from] LexError),

  #[error("cannot open {path}: {reason}")]
  File { path: String, reason: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a source string into an [`Ast`].
pub fn parse(source: &str) -> ParseResult<Ast> {
  let tokens = tokenize(source)?;
  Parser::new(tokens).parse_program()
}

/// Read and parse a build script file.
pub fn parse_file(path: &Path) -> ParseResult<Ast> {
  let source = std::fs::read_to_string(path).map_err(|e| ParseError::File {
    path: path.display().to_string(),
    reason: e.to_string(),
  })?;
  parse(&source)
}

pub struct Parser {
  tokens: Vec<Token>,
  pos: usize,
}

impl Parser {
  pub fn new(mut tokens: Vec<Token>) -> Self {
    if tokens.is_empty() {
      tokens.push(Token::new(TokenKind::Eof, "", 1, 1));
    }
    Self { tokens, pos: 0 }
  }

  pub fn parse_program(mut self) -> ParseResult<Ast> {
    let mut statements = Vec::new();
    while !self.at_end() {
      self.skip_newlines();
      if !self.at_end() {
        statements.push(self.parse_statement()?);
      }
    }
    Ok(Ast { statements })
  }

  fn parse_statement(&mut self) -> ParseResult<Stmt> {
    self.skip_newlines();

    if self.eat(TokenKind::Project) {
      return self.parse_project();
    }
    for (keyword, kind) in [
      (TokenKind::Executable, "executable"),
      (TokenKind::Library, "library"),
      (TokenKind::SharedLibrary, "shared_library"),
      (TokenKind::StaticLibrary, "static_library"),
    ] {
      if self.eat(keyword) {
        return self.parse_target(kind);
      }
    }
    if self.eat(TokenKind::Compiler) {
      return self.parse_compiler();
    }
    if self.eat(TokenKind::Dependency) {
      return self.parse_dependency();
    }
    if self.eat(TokenKind::Task) {
      return self.parse_task();
    }
    if self.eat(TokenKind::If) {
      return self.parse_if();
    }
    if self.eat(TokenKind::Unless) {
      return self.parse_unless();
    }
    if self.eat(TokenKind::For) {
      return self.parse_for();
    }
    if self.eat(TokenKind::Fn) {
      return self.parse_fn_def();
    }
    if self.eat(TokenKind::Return) {
      if self.check(TokenKind::Newline) || self.check(TokenKind::End) {
        return Ok(Stmt::Return(None));
      }
      return Ok(Stmt::Return(Some(self.parse_expression()?)));
    }

    self.parse_assignment_or_expression()
  }

  fn parse_project(&mut self) -> ParseResult<Stmt> {
    let name = self.consume(TokenKind::Str, "Expected project name")?.lexeme;
    self.consume(TokenKind::Do, "Expected 'do' after project name")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close project block")?;
    Ok(Stmt::Project { name, body })
  }

  fn parse_target(&mut self, kind: &str) -> ParseResult<Stmt> {
    let name = self.consume(TokenKind::Str, "Expected target name")?.lexeme;
    self.consume(TokenKind::Do, "Expected 'do' after target name")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close target block")?;
    Ok(Stmt::Target {
      name,
      kind: kind.to_string(),
      body,
    })
  }

  fn parse_compiler(&mut self) -> ParseResult<Stmt> {
    self.consume(TokenKind::Do, "Expected 'do' after 'compiler'")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close compiler block")?;
    Ok(Stmt::Compiler { body })
  }

  fn parse_dependency(&mut self) -> ParseResult<Stmt> {
    let name = if self.check(TokenKind::Str) || self.check(TokenKind::Ident) {
      self.advance().lexeme
    } else {
      return Err(self.error("Expected dependency name"));
    };
    self.consume(TokenKind::Do, "Expected 'do' after dependency name")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close dependency block")?;
    Ok(Stmt::Dependency { name, body })
  }

  fn parse_task(&mut self) -> ParseResult<Stmt> {
    // task names may be symbols or strings
    let name = if self.check(TokenKind::Symbol) || self.check(TokenKind::Str) {
      self.advance().lexeme
    } else {
      return Err(self.error("Expected task name"));
    };
    self.consume(TokenKind::Do, "Expected 'do' after task name")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close task block")?;
    Ok(Stmt::Task { name, body })
  }

  fn parse_if(&mut self) -> ParseResult<Stmt> {
    let condition = self.parse_expression()?;
    self.consume(TokenKind::Do, "Expected 'do' after if condition")?;
    let then_block = self.parse_block()?;

    let mut else_block = None;
    let mut chained = false;
    if self.eat(TokenKind::Else) {
      if self.eat(TokenKind::If) {
        // `else if` nests inside the else block; its `end` closes the chain
        chained = true;
        else_block = Some(Block {
          statements: vec![self.parse_if()?],
        });
      } else {
        self.consume(TokenKind::Do, "Expected 'do' after 'else'")?;
        else_block = Some(self.parse_block()?);
      }
    }

    if !chained {
      self.consume(TokenKind::End, "Expected 'end' to close if statement")?;
    }

    Ok(Stmt::If {
      condition,
      then_block,
      else_block,
    })
  }

  fn parse_unless(&mut self) -> ParseResult<Stmt> {
    let condition = self.parse_expression()?;
    self.consume(TokenKind::Do, "Expected 'do' after unless condition")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close unless statement")?;
    Ok(Stmt::Unless { condition, body })
  }

  fn parse_for(&mut self) -> ParseResult<Stmt> {
    let var = self.consume(TokenKind::Ident, "Expected variable name")?.lexeme;
    self.consume(TokenKind::In, "Expected 'in' in for loop")?;
    let iterable = self.parse_expression()?;
    self.consume(TokenKind::Do, "Expected 'do' after for loop header")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close for loop")?;
    Ok(Stmt::For { var, iterable, body })
  }

  fn parse_fn_def(&mut self) -> ParseResult<Stmt> {
    let name = self.consume(TokenKind::Ident, "Expected function name")?.lexeme;
    self.consume(TokenKind::LParen, "Expected '(' after function name")?;

    let mut params = Vec::new();
    if !self.check(TokenKind::RParen) {
      loop {
        params.push(self.consume(TokenKind::Ident, "Expected parameter name")?.lexeme);
        if !self.eat(TokenKind::Comma) {
          break;
        }
      }
    }
    self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
    self.consume(TokenKind::Do, "Expected 'do' after function parameters")?;
    let body = self.parse_block()?;
    self.consume(TokenKind::End, "Expected 'end' to close function definition")?;
    Ok(Stmt::FnDef { name, params, body })
  }

  fn parse_assignment_or_expression(&mut self) -> ParseResult<Stmt> {
    if self.check(TokenKind::Ident) {
      // one token of lookahead decides assignment vs expression
      match self.peek_kind(1) {
        Some(TokenKind::Eq) => {
          let name = self.advance().lexeme;
          self.advance();
          let value = self.parse_expression()?;
          return Ok(Stmt::Assign { name, value });
        }
        Some(TokenKind::PlusEq) => {
          // `x += e` desugars to `x = x + e`
          let name = self.advance().lexeme;
          self.advance();
          let rhs = self.parse_expression()?;
          return Ok(Stmt::Assign {
            name: name.clone(),
            value: Expr::Binary {
              op: BinOp::Add,
              left: Box::new(Expr::Ident(name)),
              right: Box::new(rhs),
            },
          });
        }
        _ => {}
      }
    }

    Ok(Stmt::Expr(self.parse_expression()?))
  }

  fn parse_block(&mut self) -> ParseResult<Block> {
    let mut block = Block::default();
    self.skip_newlines();
    while !self.check(TokenKind::End) && !self.check(TokenKind::Else) && !self.at_end() {
      block.statements.push(self.parse_statement()?);
      self.skip_newlines();
    }
    Ok(block)
  }

  // expression grammar, lowest precedence first

  fn parse_expression(&mut self) -> ParseResult<Expr> {
    self.parse_or()
  }

  fn parse_or(&mut self) -> ParseResult<Expr> {
    let mut left = self.parse_and()?;
    while self.eat(TokenKind::Or) {
      left = binary(BinOp::Or, left, self.parse_and()?);
    }
    Ok(left)
  }

  fn parse_and(&mut self) -> ParseResult<Expr> {
    let mut left = self.parse_equality()?;
    while self.eat(TokenKind::And) {
      left = binary(BinOp::And, left, self.parse_equality()?);
    }
    Ok(left)
  }

  fn parse_equality(&mut self) -> ParseResult<Expr> {
    let mut left = self.parse_comparison()?;
    loop {
      let op = if self.eat(TokenKind::EqEq) {
        BinOp::Eq
      } else if self.eat(TokenKind::NotEq) {
        BinOp::NotEq
      } else {
        break;
      };
      left = binary(op, left, self.parse_comparison()?);
    }
    Ok(left)
  }

  fn parse_comparison(&mut self) -> ParseResult<Expr> {
    let mut left = self.parse_term()?;
    loop {
      let op = if self.eat(TokenKind::Lt) {
        BinOp::Lt
      } else if self.eat(TokenKind::Gt) {
        BinOp::Gt
      } else if self.eat(TokenKind::LtEq) {
        BinOp::LtEq
      } else if self.eat(TokenKind::GtEq) {
        BinOp::GtEq
      } else {
        break;
      };
      left = binary(op, left, self.parse_term()?);
    }
    Ok(left)
  }

  fn parse_term(&mut self) -> ParseResult<Expr> {
    let mut left = self.parse_factor()?;
    loop {
      let op = if self.eat(TokenKind::Plus) {
        BinOp::Add
      } else if self.eat(TokenKind::Minus) {
        BinOp::Sub
      } else {
        break;
      };
      left = binary(op, left, self.parse_factor()?);
    }
    Ok(left)
  }

  fn parse_factor(&mut self) -> ParseResult<Expr> {
    let mut left = self.parse_unary()?;
    loop {
      let op = if self.eat(TokenKind::Star) {
        BinOp::Mul
      } else if self.eat(TokenKind::Slash) {
        BinOp::Div
      } else if self.eat(TokenKind::Percent) {
        BinOp::Rem
      } else {
        break;
      };
      left = binary(op, left, self.parse_unary()?);
    }
    Ok(left)
  }

  fn parse_unary(&mut self) -> ParseResult<Expr> {
    let op = if self.eat(TokenKind::Minus) {
      Some(UnOp::Neg)
    } else if self.eat(TokenKind::Not) {
      Some(UnOp::Not)
    } else {
      None
    };
    if let Some(op) = op {
      return Ok(Expr::Unary {
        op,
        operand: Box::new(self.parse_unary()?),
      });
    }
    self.parse_call()
  }

  fn parse_call(&mut self) -> ParseResult<Expr> {
    let mut expr = self.parse_primary()?;
    loop {
      if self.eat(TokenKind::LParen) {
        let Expr::Ident(name) = expr else {
          return Err(self.error("Expected function name"));
        };
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
          loop {
            args.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
              break;
            }
          }
        }
        self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
        expr = Expr::Call { name, args };
      } else if self.eat(TokenKind::Dot) {
        let member = self.consume(TokenKind::Ident, "Expected member name")?.lexeme;
        expr = Expr::Member {
          object: Box::new(expr),
          name: member,
        };
      } else if self.eat(TokenKind::LBracket) {
        let index = self.parse_expression()?;
        self.consume(TokenKind::RBracket, "Expected ']' after index")?;
        expr = Expr::Index {
          object: Box::new(expr),
          index: Box::new(index),
        };
      } else {
        break;
      }
    }
    Ok(expr)
  }

  fn parse_primary(&mut self) -> ParseResult<Expr> {
    if self.check(TokenKind::Str) {
      return Ok(Expr::Str(self.advance().lexeme));
    }
    if self.check(TokenKind::Number) {
      let lexeme = self.advance().lexeme;
      let value: f64 = lexeme.parse().unwrap_or(0.0);
      return Ok(Expr::Number {
        value,
        is_integer: !lexeme.contains('.'),
      });
    }
    if self.eat(TokenKind::True) {
      return Ok(Expr::Bool(true));
    }
    if self.eat(TokenKind::False) {
      return Ok(Expr::Bool(false));
    }
    if self.eat(TokenKind::Nil) {
      return Ok(Expr::Nil);
    }
    if self.check(TokenKind::Symbol) {
      return Ok(Expr::Symbol(self.advance().lexeme));
    }
    if self.check(TokenKind::Ident) {
      return Ok(Expr::Ident(self.advance().lexeme));
    }
    if self.eat(TokenKind::LBracket) {
      return self.parse_array();
    }
    if self.eat(TokenKind::LBrace) {
      return self.parse_hash();
    }
    if self.eat(TokenKind::LParen) {
      let expr = self.parse_expression()?;
      self.consume(TokenKind::RParen, "Expected ')' after expression")?;
      return Ok(expr);
    }

    Err(self.error("Expected expression"))
  }

  fn parse_array(&mut self) -> ParseResult<Expr> {
    let mut elements = Vec::new();
    self.skip_newlines();
    if !self.check(TokenKind::RBracket) {
      loop {
        self.skip_newlines();
        elements.push(self.parse_expression()?);
        self.skip_newlines();
        if !self.eat(TokenKind::Comma) {
          break;
        }
      }
    }
    self.skip_newlines();
    self.consume(TokenKind::RBracket, "Expected ']' after array elements")?;
    Ok(Expr::Array(elements))
  }

  fn parse_hash(&mut self) -> ParseResult<Expr> {
    let mut pairs = Vec::new();
    self.skip_newlines();
    if !self.check(TokenKind::RBrace) {
      loop {
        self.skip_newlines();
        let key = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' in hash literal")?;
        let value = self.parse_expression()?;
        pairs.push((key, value));
        self.skip_newlines();
        if !self.eat(TokenKind::Comma) {
          break;
        }
      }
    }
    self.skip_newlines();
    self.consume(TokenKind::RBrace, "Expected '}' after hash elements")?;
    Ok(Expr::Hash(pairs))
  }

  // token helpers

  fn current(&self) -> &Token {
    &self.tokens[self.pos.min(self.tokens.len() - 1)]
  }

  fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
    self.tokens.get(self.pos + offset).map(|t| t.kind)
  }

  fn advance(&mut self) -> Token {
    let token = self.current().clone();
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
    token
  }

  fn check(&self, kind: TokenKind) -> bool {
    self.current().kind == kind
  }

  fn eat(&mut self, kind: TokenKind) -> bool {
    if self.check(kind) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
    if self.check(kind) {
      Ok(self.advance())
    } else {
      Err(self.error(message))
    }
  }

  fn skip_newlines(&mut self) {
    while self.eat(TokenKind::Newline) {}
  }

  fn at_end(&self) -> bool {
    self.current().kind == TokenKind::Eof
  }

  fn error(&self, message: &str) -> ParseError {
    let token = self.current();
    let found = match token.kind {
      TokenKind::Eof => "end of file".to_string(),
      TokenKind::Newline => "newline".to_string(),
      TokenKind::Error => format!("Unexpected character '{}'", token.lexeme),
      _ => format!("'{}'", token.lexeme),
    };
    ParseError::Unexpected {
      message: format!("{message}, found {found}"),
      line: token.line,
      column: token.column,
    }
  }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
  Expr::Binary {
    op,
    left: Box::new(left),
    right: Box::new(right),
  }
}
