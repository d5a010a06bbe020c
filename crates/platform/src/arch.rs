use std::fmt;

use serde::{Deserialize, Serialize};

/// CPU architecture variants recognized by build scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
  X86_64,
  X86,
  Arm64,
  Arm,
  Unknown,
}

impl Arch {
  /// Detect the host CPU architecture.
  pub fn current() -> Self {
    match std::env::consts::ARCH {
      "x86_64" => Self::X86_64,
      "x86" => Self::X86,
      "aarch64" => Self::Arm64,
      "arm" => Self::Arm,
      _ => Self::Unknown,
    }
  }

  /// Returns the identifier exposed to build scripts.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::X86 => "x86",
      Self::Arm64 => "arm64",
      Self::Arm => "arm",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
