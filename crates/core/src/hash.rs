//! Content hashing for rebuild decisions.
//!
//! All digests are 64-bit XXH64 values rendered as 16-char lowercase hex.
//! They are stable across runs and platforms for the same byte sequence,
//! which is the only property the cache needs; nothing here is
//! cryptographic.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use xxhash_rust::xxh64::xxh64;

/// Digest a byte sequence with an optional seed.
pub fn digest(bytes: &[u8], seed: u64) -> u64 {
  xxh64(bytes, seed)
}

/// Render a digest as fixed-width lowercase hex.
pub fn to_hex(hash: u64) -> String {
  format!("{hash:016x}")
}

/// Digest a file's contents without loading it whole.
pub fn hash_file(path: &Path) -> std::io::Result<u64> {
  let file = File::open(path)?;
  let mut reader = BufReader::new(file);
  let mut buffer = [0u8; 8192];
  let mut hash = 0u64;

  loop {
    let n = reader.read(&mut buffer)?;
    if n == 0 {
      break;
    }
    // Chain block digests: each block is hashed with the running value as seed.
    hash = xxh64(&buffer[..n], hash);
  }

  Ok(hash)
}

/// The pair of digests that identifies a rebuild key for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
  /// Digest over the target's source contents.
  pub input: String,
  /// Digest over the commands that would be executed.
  pub command: String,
}

impl Fingerprint {
  /// Two-pass 32-char combined key, for logging and debugging.
  pub fn combined(&self) -> String {
    format!("{}{}", self.input, self.command)
  }
}

/// Digest the ordered `(path, content-hash)` sequence of a target's sources.
///
/// Paths are sorted first so that glob-expansion order cannot change the
/// result. A missing source contributes its path with an empty content
/// hash rather than failing, so the mismatch shows up as a rebuild.
pub fn input_hash(sources: &[PathBuf]) -> String {
  let mut sorted: Vec<&PathBuf> = sources.iter().collect();
  sorted.sort();

  let mut key = String::new();
  for path in sorted {
    let content = match hash_file(path) {
      Ok(h) => to_hex(h),
      Err(_) => String::new(),
    };
    key.push_str("in:");
    key.push_str(&path.to_string_lossy());
    key.push(':');
    key.push_str(&content);
    key.push('\n');
  }

  to_hex(digest(key.as_bytes(), 0))
}

/// Digest the exact commands a target would run, plus the environment
/// entries that influence their output and the compiler path.
pub fn command_hash(commands: &[String], env: &BTreeMap<String, String>, compiler: &str) -> String {
  let mut key = String::new();
  for command in commands {
    key.push_str("cmd:");
    key.push_str(command);
    key.push('\n');
  }
  for (name, value) in env {
    key.push_str("env:");
    key.push_str(name);
    key.push('=');
    key.push_str(value);
    key.push('\n');
  }
  key.push_str("cc:");
  key.push_str(compiler);
  key.push('\n');

  to_hex(digest(key.as_bytes(), 0))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn digest_is_deterministic() {
    assert_eq!(digest(b"hello", 0), digest(b"hello", 0));
    assert_ne!(digest(b"hello", 0), digest(b"world", 0));
    assert_ne!(digest(b"hello", 0), digest(b"hello", 1));
  }

  #[test]
  fn hex_is_fixed_width() {
    assert_eq!(to_hex(0).len(), 16);
    assert_eq!(to_hex(u64::MAX).len(), 16);
    assert_eq!(to_hex(0xab), "00000000000000ab");
  }

  #[test]
  fn hash_file_matches_across_reads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("input.txt");
    fs::write(&path, b"some source text").unwrap();

    assert_eq!(hash_file(&path).unwrap(), hash_file(&path).unwrap());
  }

  #[test]
  fn input_hash_ignores_listing_order() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.cpp");
    let b = dir.path().join("b.cpp");
    fs::write(&a, b"int a;").unwrap();
    fs::write(&b, b"int b;").unwrap();

    let forward = input_hash(&[a.clone(), b.clone()]);
    let backward = input_hash(&[b, a]);
    assert_eq!(forward, backward);
  }

  #[test]
  fn input_hash_changes_with_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.cpp");
    fs::write(&path, b"int a;").unwrap();
    let before = input_hash(std::slice::from_ref(&path));

    fs::write(&path, b"int b;").unwrap();
    let after = input_hash(std::slice::from_ref(&path));

    assert_ne!(before, after);
  }

  #[test]
  fn command_hash_is_sensitive_to_env_and_compiler() {
    let commands = vec!["cc -c main.c -o main.o".to_string()];
    let empty = BTreeMap::new();
    let mut env = BTreeMap::new();
    env.insert("CFLAGS".to_string(), "-O2".to_string());

    let base = command_hash(&commands, &empty, "cc");
    assert_ne!(base, command_hash(&commands, &env, "cc"));
    assert_ne!(base, command_hash(&commands, &empty, "clang"));
    assert_eq!(base, command_hash(&commands, &empty, "cc"));
  }

  #[test]
  fn fingerprint_combined_is_32_chars() {
    let fp = Fingerprint {
      input: to_hex(1),
      command: to_hex(2),
    };
    assert_eq!(fp.combined().len(), 32);
  }
}
