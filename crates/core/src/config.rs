//! Build configuration produced by evaluating a build script.
//!
//! A [`BuildConfig`] is the hand-off point between the language front-end
//! and the engine: the interpreter fills one in, the engine consumes it.
//! It serializes to `iris-config.json` in the build directory so later
//! invocations can reconstruct the engine without re-evaluating the script.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the persisted configuration inside a build directory.
pub const CONFIG_FILENAME: &str = "iris-config.json";

/// Kind of artifact a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
  #[default]
  Executable,
  StaticLibrary,
  SharedLibrary,
  Object,
  Custom,
}

impl TargetKind {
  /// Name used in graph exports and log output.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Executable => "executable",
      Self::StaticLibrary => "library",
      Self::SharedLibrary => "shared_library",
      Self::Object => "object",
      Self::Custom => "custom",
    }
  }
}

/// A declared build artifact: sources, flags and dependency names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
  pub name: String,
  pub kind: TargetKind,
  /// Source patterns as written in the script; globs are expanded at build time.
  pub sources: Vec<String>,
  pub includes: Vec<String>,
  pub flags: Vec<String>,
  pub link_flags: Vec<String>,
  /// Names of other targets or declared external dependencies.
  pub dependencies: Vec<String>,
  pub defines: BTreeMap<String, String>,
}

/// How an external dependency is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
  #[default]
  System,
  PkgConfig,
  Cmake,
  Subproject,
}

impl DependencyKind {
  pub fn parse(s: &str) -> Self {
    match s {
      "pkg-config" | "pkgconfig" => Self::PkgConfig,
      "cmake" => Self::Cmake,
      "subproject" => Self::Subproject,
      _ => Self::System,
    }
  }
}

/// An external library the project links against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
  pub name: String,
  pub version: String,
  pub kind: DependencyKind,
  pub include_dirs: Vec<String>,
  pub link_dirs: Vec<String>,
  pub libraries: Vec<String>,
}

/// The evaluated project configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
  pub project_name: String,
  pub version: String,
  pub language: String,
  pub standard: String,
  pub build_type: String,
  pub compiler: String,

  pub global_flags: Vec<String>,
  pub global_includes: Vec<String>,
  pub global_defines: BTreeMap<String, String>,

  pub targets: Vec<Target>,
  pub dependencies: Vec<Dependency>,

  pub variables: BTreeMap<String, String>,
}

/// Errors reading or writing a persisted configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed configuration in {path}: {source}")]
  Malformed {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl BuildConfig {
  /// Look up a target by name.
  pub fn target(&self, name: &str) -> Option<&Target> {
    self.targets.iter().find(|t| t.name == name)
  }

  /// Look up a declared external dependency by name.
  pub fn dependency(&self, name: &str) -> Option<&Dependency> {
    self.dependencies.iter().find(|d| d.name == name)
  }

  /// True when the project compiles as C++ rather than C.
  pub fn is_cpp(&self) -> bool {
    matches!(self.language.as_str(), "cpp" | "c++" | "cxx") || self.language.is_empty()
  }

  /// Persist the configuration into `dir` as [`CONFIG_FILENAME`].
  pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    let json = serde_json::to_string_pretty(self).expect("config serialization is infallible");
    fs::write(&path, json).map_err(|source| ConfigError::Write {
      path: path.clone(),
      source,
    })
  }

  /// Load a configuration previously written by [`BuildConfig::save`].
  pub fn load(dir: &Path) -> Result<Self, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    let data = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
      path: path.clone(),
      source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Malformed { path, source })
  }
}
