use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system variants recognized by build scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
  Linux,
  MacOs,
  Windows,
  FreeBsd,
  /// Any other POSIX-ish host.
  Unix,
}

impl Os {
  /// Detect the host operating system.
  pub fn current() -> Self {
    match std::env::consts::OS {
      "linux" => Self::Linux,
      "macos" => Self::MacOs,
      "windows" => Self::Windows,
      "freebsd" => Self::FreeBsd,
      _ => Self::Unix,
    }
  }

  /// Returns the identifier exposed to build scripts.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "macos",
      Self::Windows => "windows",
      Self::FreeBsd => "freebsd",
      Self::Unix => "unix",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
