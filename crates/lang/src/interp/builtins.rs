//! Native functions callable from build scripts.
//!
//! Filesystem helpers are deliberately forgiving: a missing file reads as
//! an empty string and a failed probe returns nil, because scripts branch
//! on these results rather than handle errors. Only `error(...)` aborts
//! evaluation.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use iris_core::glob;
use iris_platform::{Arch, Os};

use super::{EvalError, EvalResult, OutputSink};
use crate::value::Value;

const NAMES: &[&str] = &[
  "glob",
  "find_package",
  "find_library",
  "print",
  "error",
  "warning",
  "shell",
  "run",
  "env",
  "platform",
  "arch",
  "join",
  "split",
  "contains",
  "len",
  "file_exists",
  "read_file",
  "write_file",
  "dirname",
  "basename",
  "extension",
];

pub(super) fn is_builtin(name: &str) -> bool {
  NAMES.contains(&name)
}

/// Dispatch a builtin by name; `None` means the name is not a builtin.
pub(super) fn call(sink: &dyn OutputSink, name: &str, args: &[Value]) -> Option<EvalResult<Value>> {
  let result = match name {
    "glob" => glob_files(args),
    "find_package" => find_package(args),
    "find_library" => find_library(args),
    "print" => {
      let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
      sink.print(&line);
      Ok(Value::Nil)
    }
    "error" => {
      let message = args
        .first()
        .map(Value::to_string)
        .unwrap_or_else(|| "Build error".to_string());
      Err(EvalError::Aborted(message))
    }
    "warning" => {
      if let Some(message) = args.first() {
        sink.warning(&message.to_string());
      }
      Ok(Value::Nil)
    }
    "shell" => shell(args),
    "run" => run(args),
    "env" => {
      let value = string_arg(args, 0)
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_default();
      Ok(Value::Str(value))
    }
    "platform" => Ok(Value::Str(Os::current().as_str().to_string())),
    "arch" => Ok(Value::Str(Arch::current().as_str().to_string())),
    "join" => join(args),
    "split" => split(args),
    "contains" => contains(args),
    "len" => len(args),
    "file_exists" => {
      let exists = string_arg(args, 0).is_some_and(|p| Path::new(p).exists());
      Ok(Value::Bool(exists))
    }
    "read_file" => {
      let content = string_arg(args, 0)
        .and_then(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_default();
      Ok(Value::Str(content))
    }
    "write_file" => write_file(args),
    "dirname" => {
      let dir = string_arg(args, 0)
        .and_then(|p| Path::new(p).parent())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
      Ok(Value::Str(dir))
    }
    "basename" => {
      let base = string_arg(args, 0)
        .and_then(|p| Path::new(p).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
      Ok(Value::Str(base))
    }
    "extension" => {
      let ext = string_arg(args, 0)
        .and_then(|p| Path::new(p).extension())
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
      Ok(Value::Str(ext))
    }
    _ => return None,
  };
  Some(result)
}

fn string_arg(args: &[Value], index: usize) -> Option<&str> {
  match args.get(index) {
    Some(Value::Str(s)) => Some(s),
    _ => None,
  }
}

fn glob_files(args: &[Value]) -> EvalResult<Value> {
  let Some(pattern) = string_arg(args, 0) else {
    return Ok(Value::Array(Vec::new()));
  };
  let files = glob::expand(pattern)
    .into_iter()
    .map(|p| Value::Str(p.to_string_lossy().into_owned()))
    .collect();
  Ok(Value::Array(files))
}

fn find_package(args: &[Value]) -> EvalResult<Value> {
  let Some(name) = string_arg(args, 0) else {
    return Ok(Value::Nil);
  };

  let found = Command::new("pkg-config")
    .args(["--exists", name])
    .status()
    .map(|status| status.success())
    .unwrap_or(false);

  if !found {
    return Ok(Value::Nil);
  }

  let mut info = BTreeMap::new();
  info.insert("name".to_string(), Value::Str(name.to_string()));
  info.insert("found".to_string(), Value::Bool(true));
  Ok(Value::Hash(info))
}

fn find_library(args: &[Value]) -> EvalResult<Value> {
  let Some(name) = string_arg(args, 0) else {
    return Ok(Value::Nil);
  };

  let search_paths = [
    "/usr/lib",
    "/usr/local/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/lib",
    "/lib64",
  ];

  for dir in search_paths {
    let shared = Path::new(dir).join(format!("lib{name}.so"));
    let archive = Path::new(dir).join(format!("lib{name}.a"));
    if shared.exists() || archive.exists() {
      let mut info = BTreeMap::new();
      info.insert("name".to_string(), Value::Str(name.to_string()));
      info.insert("found".to_string(), Value::Bool(true));
      info.insert("path".to_string(), Value::Str(dir.to_string()));
      return Ok(Value::Hash(info));
    }
  }

  Ok(Value::Nil)
}

/// Run a command through the shell, capturing stdout and stderr as one
/// string with the trailing newline stripped.
fn shell(args: &[Value]) -> EvalResult<Value> {
  let Some(command) = string_arg(args, 0) else {
    return Ok(Value::Nil);
  };

  let output = match shell_command(command).output() {
    Ok(output) => output,
    Err(_) => return Ok(Value::Str(String::new())),
  };

  let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
  combined.push_str(&String::from_utf8_lossy(&output.stderr));
  if combined.ends_with('\n') {
    combined.pop();
  }
  Ok(Value::Str(combined))
}

/// Run a command and hand back its exit code.
fn run(args: &[Value]) -> EvalResult<Value> {
  let Some(command) = string_arg(args, 0) else {
    return Ok(Value::Number(-1.0));
  };

  let code = shell_command(command)
    .status()
    .ok()
    .and_then(|status| status.code())
    .unwrap_or(-1);
  Ok(Value::Number(f64::from(code)))
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
  let mut cmd = Command::new("/bin/sh");
  cmd.arg("-c").arg(command);
  cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
  let mut cmd = Command::new("cmd.exe");
  cmd.arg("/C").arg(command);
  cmd
}

fn join(args: &[Value]) -> EvalResult<Value> {
  let (Some(Value::Array(items)), Some(sep)) = (args.first(), string_arg(args, 1)) else {
    return Ok(Value::Str(String::new()));
  };
  let joined = items.iter().map(Value::to_string).collect::<Vec<_>>().join(sep);
  Ok(Value::Str(joined))
}

fn split(args: &[Value]) -> EvalResult<Value> {
  let (Some(text), Some(delim)) = (string_arg(args, 0), string_arg(args, 1)) else {
    return Ok(Value::Array(Vec::new()));
  };
  if delim.is_empty() {
    return Ok(Value::Array(vec![Value::Str(text.to_string())]));
  }

  let mut parts: Vec<Value> = text.split(delim).map(|p| Value::Str(p.to_string())).collect();
  // a trailing delimiter does not produce an empty part
  if matches!(parts.last(), Some(Value::Str(s)) if s.is_empty()) {
    parts.pop();
  }
  Ok(Value::Array(parts))
}

fn contains(args: &[Value]) -> EvalResult<Value> {
  let (Some(Value::Array(items)), Some(needle)) = (args.first(), args.get(1)) else {
    return Ok(Value::Bool(false));
  };
  let needle = needle.to_string();
  Ok(Value::Bool(items.iter().any(|item| item.to_string() == needle)))
}

fn len(args: &[Value]) -> EvalResult<Value> {
  let length = match args.first() {
    Some(Value::Str(s)) => s.chars().count(),
    Some(Value::Array(items)) => items.len(),
    _ => 0,
  };
  Ok(Value::Number(length as f64))
}

fn write_file(args: &[Value]) -> EvalResult<Value> {
  let (Some(path), Some(content)) = (string_arg(args, 0), string_arg(args, 1)) else {
    return Ok(Value::Bool(false));
  };
  Ok(Value::Bool(std::fs::write(path, content).is_ok()))
}
