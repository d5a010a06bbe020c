//! Glob expansion for source patterns.
//!
//! Pattern semantics: `*` matches within a single path component, `**`
//! matches across directory boundaries, `?` matches exactly one character
//! and `.` is literal. A pattern without metacharacters is returned as-is
//! when the file exists.
//!
//! Results are sorted so that downstream fingerprinting is deterministic.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Expand a glob pattern relative to the current directory.
pub fn expand(pattern: &str) -> Vec<PathBuf> {
  expand_in(Path::new("."), pattern)
}

/// Expand a glob pattern relative to `root`.
pub fn expand_in(root: &Path, pattern: &str) -> Vec<PathBuf> {
  let full = if Path::new(pattern).is_absolute() {
    PathBuf::from(pattern)
  } else {
    root.join(pattern)
  };

  if !has_meta(pattern) {
    return if full.is_file() { vec![full] } else { Vec::new() };
  }

  // Split into a literal base directory and the pattern components after it.
  let mut base = PathBuf::new();
  let mut pat_components: Vec<String> = Vec::new();
  for component in full.components() {
    let text = match component {
      Component::Normal(os) => os.to_string_lossy().into_owned(),
      other => {
        if pat_components.is_empty() {
          base.push(other.as_os_str());
          continue;
        }
        other.as_os_str().to_string_lossy().into_owned()
      }
    };
    if pat_components.is_empty() && !has_meta(&text) {
      base.push(&text);
    } else {
      pat_components.push(text);
    }
  }
  if base.as_os_str().is_empty() {
    base.push(".");
  }

  let recursive = pat_components.iter().any(|c| c == "**");
  let mut walk = WalkDir::new(&base).min_depth(1).sort_by_file_name();
  if !recursive {
    walk = walk.max_depth(pat_components.len());
  }

  let mut matches = Vec::new();
  for entry in walk.into_iter().filter_map(Result::ok) {
    if !entry.file_type().is_file() {
      continue;
    }
    let relative = match entry.path().strip_prefix(&base) {
      Ok(rel) => rel,
      Err(_) => continue,
    };
    let parts: Vec<String> = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy().into_owned())
      .collect();
    if match_components(&pat_components, &parts) {
      matches.push(entry.into_path());
    }
  }

  matches.sort();
  matches
}

fn has_meta(pattern: &str) -> bool {
  pattern.contains('*') || pattern.contains('?')
}

/// Match path components against pattern components, where `**` may consume
/// zero or more components.
fn match_components(pattern: &[String], path: &[String]) -> bool {
  match pattern.split_first() {
    None => path.is_empty(),
    Some((head, rest)) if head == "**" => {
      (0..=path.len()).any(|skip| match_components(rest, &path[skip..]))
    }
    Some((head, rest)) => match path.split_first() {
      Some((part, tail)) => match_segment(head, part) && match_components(rest, tail),
      None => false,
    },
  }
}

/// Match a single component: `*` spans any run of characters, `?` exactly one.
fn match_segment(pattern: &str, name: &str) -> bool {
  let pat: Vec<char> = pattern.chars().collect();
  let txt: Vec<char> = name.chars().collect();
  match_chars(&pat, &txt)
}

fn match_chars(pat: &[char], txt: &[char]) -> bool {
  match pat.split_first() {
    None => txt.is_empty(),
    Some(('*', rest)) => (0..=txt.len()).any(|skip| match_chars(rest, &txt[skip..])),
    Some(('?', rest)) => match txt.split_first() {
      Some((_, tail)) => match_chars(rest, tail),
      None => false,
    },
    Some((c, rest)) => match txt.split_first() {
      Some((t, tail)) => c == t && match_chars(rest, tail),
      None => false,
    },
  }
}
