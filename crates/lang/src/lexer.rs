//! The build-script tokenizer.
//!
//! Horizontal whitespace is skipped; newlines come through as explicit
//! tokens because the parser treats them as soft statement separators.
//! Comments run from `#` (unless followed by `{`) or `//` to end of line.
//! An unrecognized character becomes an [`TokenKind::Error`] token rather
//! than aborting the scan, so the parser owns the diagnostics.

use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
  #[error("Unterminated string at line {line}, column {column}")]
  UnterminatedString { line: u32, column: u32 },
}

pub type LexResult<T> = Result<T, LexError>;

/// Tokenize a whole source string, ending with an `Eof` token.
pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
  let mut lexer = Lexer::new(source);
  let mut tokens = Vec::new();
  loop {
    let token = lexer.next_token()?;
    let done = token.kind == TokenKind::Eof;
    tokens.push(token);
    if done {
      break;
    }
  }
  Ok(tokens)
}

pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
  line: u32,
  column: u32,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      source,
      pos: 0,
      line: 1,
      column: 1,
    }
  }

  pub fn next_token(&mut self) -> LexResult<Token> {
    self.skip_horizontal_whitespace();

    let (line, column) = (self.line, self.column);
    let Some(c) = self.peek() else {
      return Ok(Token::new(TokenKind::Eof, "", line, column));
    };

    // comments run to end of line; `#{` is the interpolation opener
    if (c == '#' && self.peek_at(1) != Some('{')) || (c == '/' && self.peek_at(1) == Some('/')) {
      self.skip_comment();
      return self.next_token();
    }

    if c == '\n' {
      self.advance();
      return Ok(Token::new(TokenKind::Newline, "\n", line, column));
    }

    if c == '"' || c == '\'' {
      return self.scan_string(line, column);
    }

    if c.is_ascii_digit() {
      return Ok(self.scan_number(line, column));
    }

    // symbols are `:name`; a lone colon stays punctuation
    if c == ':' && self.peek_at(1).is_some_and(is_ident_start) {
      return Ok(self.scan_symbol(line, column));
    }

    if is_ident_start(c) {
      return Ok(self.scan_identifier(line, column));
    }

    self.advance();
    let kind = match c {
      '(' => TokenKind::LParen,
      ')' => TokenKind::RParen,
      '[' => TokenKind::LBracket,
      ']' => TokenKind::RBracket,
      '{' => TokenKind::LBrace,
      '}' => TokenKind::RBrace,
      ',' => TokenKind::Comma,
      '.' => TokenKind::Dot,
      ';' => TokenKind::Semicolon,
      ':' => TokenKind::Colon,
      '*' => TokenKind::Star,
      '/' => TokenKind::Slash,
      '%' => TokenKind::Percent,
      '+' => {
        if self.eat('=') {
          TokenKind::PlusEq
        } else {
          TokenKind::Plus
        }
      }
      '-' => {
        if self.eat('>') {
          TokenKind::Arrow
        } else if self.eat('=') {
          TokenKind::MinusEq
        } else {
          TokenKind::Minus
        }
      }
      '=' => {
        if self.eat('=') {
          TokenKind::EqEq
        } else if self.eat('>') {
          TokenKind::FatArrow
        } else {
          TokenKind::Eq
        }
      }
      '!' => {
        if self.eat('=') {
          TokenKind::NotEq
        } else {
          TokenKind::Not
        }
      }
      '<' => {
        if self.eat('=') {
          TokenKind::LtEq
        } else {
          TokenKind::Lt
        }
      }
      '>' => {
        if self.eat('=') {
          TokenKind::GtEq
        } else {
          TokenKind::Gt
        }
      }
      '#' => {
        // peeked above: this '#' is followed by '{'
        self.advance();
        TokenKind::InterpolationStart
      }
      other => {
        return Ok(Token::new(TokenKind::Error, other.to_string(), line, column));
      }
    };

    let lexeme = token_text(kind);
    Ok(Token::new(kind, lexeme, line, column))
  }

  fn scan_string(&mut self, line: u32, column: u32) -> LexResult<Token> {
    let quote = self.advance().expect("caller saw the opening quote");
    let mut value = String::new();

    while let Some(c) = self.peek() {
      if c == quote {
        self.advance();
        return Ok(Token::new(TokenKind::Str, value, line, column));
      }
      if c == '\\' {
        self.advance();
        if let Some(escaped) = self.advance() {
          value.push(unescape(escaped));
        }
        continue;
      }
      value.push(c);
      self.advance();
    }

    Err(LexError::UnterminatedString { line, column })
  }

  fn scan_number(&mut self, line: u32, column: u32) -> Token {
    let mut value = String::new();
    while let Some(c) = self.peek() {
      if !c.is_ascii_digit() {
        break;
      }
      value.push(c);
      self.advance();
    }

    if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
      value.push('.');
      self.advance();
      while let Some(c) = self.peek() {
        if !c.is_ascii_digit() {
          break;
        }
        value.push(c);
        self.advance();
      }
    }

    Token::new(TokenKind::Number, value, line, column)
  }

  fn scan_symbol(&mut self, line: u32, column: u32) -> Token {
    self.advance(); // leading colon is not part of the lexeme
    let mut value = String::new();
    while let Some(c) = self.peek() {
      if !is_ident_continue(c) {
        break;
      }
      value.push(c);
      self.advance();
    }
    Token::new(TokenKind::Symbol, value, line, column)
  }

  fn scan_identifier(&mut self, line: u32, column: u32) -> Token {
    let mut value = String::new();
    while let Some(c) = self.peek() {
      if !is_ident_continue(c) {
        break;
      }
      value.push(c);
      self.advance();
    }

    let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Ident);
    Token::new(kind, value, line, column)
  }

  fn skip_horizontal_whitespace(&mut self) {
    while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
      self.advance();
    }
  }

  fn skip_comment(&mut self) {
    while let Some(c) = self.peek() {
      if c == '\n' {
        break;
      }
      self.advance();
    }
  }

  fn peek(&self) -> Option<char> {
    self.source[self.pos..].chars().next()
  }

  fn peek_at(&self, offset: usize) -> Option<char> {
    self.source[self.pos..].chars().nth(offset)
  }

  fn advance(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn eat(&mut self, expected: char) -> bool {
    if self.peek() == Some(expected) {
      self.advance();
      true
    } else {
      false
    }
  }
}

fn is_ident_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

fn unescape(c: char) -> char {
  match c {
    'n' => '\n',
    't' => '\t',
    'r' => '\r',
    // \\ \" \' and anything unrecognized reproduce the character itself
    other => other,
  }
}

fn token_text(kind: TokenKind) -> &'static str {
  match kind {
    TokenKind::LParen => "(",
    TokenKind::RParen => ")",
    TokenKind::LBracket => "[",
    TokenKind::RBracket => "]",
    TokenKind::LBrace => "{",
    TokenKind::RBrace => "}",
    TokenKind::Comma => ",",
    TokenKind::Dot => ".",
    TokenKind::Semicolon => ";",
    TokenKind::Colon => ":",
    TokenKind::Plus => "+",
    TokenKind::Minus => "-",
    TokenKind::Star => "*",
    TokenKind::Slash => "/",
    TokenKind::Percent => "%",
    TokenKind::Eq => "=",
    TokenKind::EqEq => "==",
    TokenKind::NotEq => "!=",
    TokenKind::Lt => "<",
    TokenKind::Gt => ">",
    TokenKind::LtEq => "<=",
    TokenKind::GtEq => ">=",
    TokenKind::PlusEq => "+=",
    TokenKind::MinusEq => "-=",
    TokenKind::Arrow => "->",
    TokenKind::FatArrow => "=>",
    TokenKind::InterpolationStart => "#{",
    TokenKind::Not => "!",
    _ => "",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use indoc::indoc;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
  }

  #[test]
  fn project_block_token_stream() {
    let source = indoc! {r#"
      project "p" do
        version = "0.1"
      end
    "#};

    assert_eq!(
      kinds(source),
      vec![
        TokenKind::Project,
        TokenKind::Str,
        TokenKind::Do,
        TokenKind::Newline,
        TokenKind::Ident,
        TokenKind::Eq,
        TokenKind::Str,
        TokenKind::Newline,
        TokenKind::End,
        TokenKind::Newline,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn string_lexeme_has_no_quotes() {
    let tokens = tokenize(r#""hello""#).unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Str);
    assert_eq!(tokens[0].lexeme, "hello");
  }

  #[test]
  fn single_quoted_strings_and_escapes() {
    let tokens = tokenize(r#"'a\tb' "c\nd" "q\zq""#).unwrap();
    assert_eq!(tokens[0].lexeme, "a\tb");
    assert_eq!(tokens[1].lexeme, "c\nd");
    // unrecognized escapes reproduce the character literally
    assert_eq!(tokens[2].lexeme, "qzq");
  }

  #[test]
  fn numbers_with_and_without_fraction() {
    let tokens = tokenize("42 3.14 7.").unwrap();
    assert_eq!(tokens[0].lexeme, "42");
    assert_eq!(tokens[1].lexeme, "3.14");
    // a trailing dot is member access, not a fraction
    assert_eq!(tokens[2].lexeme, "7");
    assert_eq!(tokens[3].kind, TokenKind::Dot);
  }

  #[test]
  fn symbol_strips_leading_colon() {
    let tokens = tokenize(":cpp").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Symbol);
    assert_eq!(tokens[0].lexeme, "cpp");
  }

  #[test]
  fn lone_colon_is_punctuation() {
    let tokens = tokenize("{a: 1}").unwrap();
    assert_eq!(tokens[2].kind, TokenKind::Colon);
  }

  #[test]
  fn keywords_are_classified() {
    assert_eq!(
      kinds("unless shared_library nil and or not"),
      vec![
        TokenKind::Unless,
        TokenKind::SharedLibrary,
        TokenKind::Nil,
        TokenKind::And,
        TokenKind::Or,
        TokenKind::Not,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn multi_char_operators() {
    assert_eq!(
      kinds("== != <= >= += -= -> =>"),
      vec![
        TokenKind::EqEq,
        TokenKind::NotEq,
        TokenKind::LtEq,
        TokenKind::GtEq,
        TokenKind::PlusEq,
        TokenKind::MinusEq,
        TokenKind::Arrow,
        TokenKind::FatArrow,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn comments_are_skipped() {
    let source = indoc! {"
      # hash comment
      // slash comment
      x = 1  # trailing
    "};
    let found = kinds(source);
    assert!(found.contains(&TokenKind::Ident));
    assert_eq!(found.iter().filter(|k| **k == TokenKind::Newline).count(), 3);
  }

  #[test]
  fn interpolation_start_survives_comment_rule() {
    let tokens = tokenize("#{").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::InterpolationStart);
  }

  #[test]
  fn unterminated_string_fails_with_position() {
    let err = tokenize("x = \"abc").unwrap_err();
    assert_eq!(err, LexError::UnterminatedString { line: 1, column: 5 });
  }

  #[test]
  fn unknown_character_is_an_error_token() {
    let tokens = tokenize("x = 1 @ 2").unwrap();
    let error = tokens.iter().find(|t| t.kind == TokenKind::Error).unwrap();
    assert_eq!(error.lexeme, "@");
    assert_eq!(error.column, 7);
  }

  #[test]
  fn positions_are_one_based() {
    let tokens = tokenize("a\n  b").unwrap();
    assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    // tokens[1] is the newline
    assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
  }

  #[test]
  fn relexing_concatenated_lexemes_preserves_kinds() {
    let source = r#"project "p" do if x >= 3.5 and not y do end end"#;
    let tokens = tokenize(source).unwrap();

    let rendered: Vec<String> = tokens
      .iter()
      .filter(|t| t.kind != TokenKind::Eof)
      .map(|t| match t.kind {
        TokenKind::Str => format!("\"{}\"", t.lexeme),
        TokenKind::Symbol => format!(":{}", t.lexeme),
        _ => t.lexeme.clone(),
      })
      .collect();

    let relexed = tokenize(&rendered.join(" ")).unwrap();
    let original_kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    let relexed_kinds: Vec<TokenKind> = relexed.iter().map(|t| t.kind).collect();
    assert_eq!(original_kinds, relexed_kinds);
  }
}
