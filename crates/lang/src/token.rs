//! Tokens produced by the lexer.

use std::fmt;

/// Every token the build-script language knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  // literals
  Str,
  Number,
  Symbol,
  Ident,

  // keywords
  Project,
  Executable,
  Library,
  SharedLibrary,
  StaticLibrary,
  Compiler,
  Dependency,
  Task,
  If,
  Else,
  Unless,
  For,
  In,
  Do,
  End,
  Fn,
  Return,
  True,
  False,
  Nil,
  And,
  Or,
  Not,

  // punctuation and operators
  LParen,
  RParen,
  LBracket,
  RBracket,
  LBrace,
  RBrace,
  Comma,
  Dot,
  Semicolon,
  Colon,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Eq,
  EqEq,
  NotEq,
  Lt,
  Gt,
  LtEq,
  GtEq,
  PlusEq,
  MinusEq,
  Arrow,
  FatArrow,
  /// `#{`, reserved for string interpolation.
  InterpolationStart,

  Newline,
  Eof,
  /// An unrecognized character; carried in the stream so the parser can
  /// report it with a position.
  Error,
}

impl TokenKind {
  /// Classify an identifier against the keyword table.
  pub fn keyword(ident: &str) -> Option<Self> {
    let kind = match ident {
      "project" => Self::Project,
      "executable" => Self::Executable,
      "library" => Self::Library,
      "shared_library" => Self::SharedLibrary,
      "static_library" => Self::StaticLibrary,
      "compiler" => Self::Compiler,
      "dependency" => Self::Dependency,
      "task" => Self::Task,
      "if" => Self::If,
      "else" => Self::Else,
      "unless" => Self::Unless,
      "for" => Self::For,
      "in" => Self::In,
      "do" => Self::Do,
      "end" => Self::End,
      "fn" => Self::Fn,
      "return" => Self::Return,
      "true" => Self::True,
      "false" => Self::False,
      "nil" => Self::Nil,
      "and" => Self::And,
      "or" => Self::Or,
      "not" => Self::Not,
      _ => return None,
    };
    Some(kind)
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Str => "string",
      Self::Number => "number",
      Self::Symbol => "symbol",
      Self::Ident => "identifier",
      Self::Newline => "newline",
      Self::Eof => "end of file",
      Self::Error => "invalid token",
      other => return write!(f, "{other:?}"),
    };
    f.write_str(name)
  }
}

/// A token with its lexeme and source position (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: u32,
  pub column: u32,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      line,
      column,
    }
  }
}
