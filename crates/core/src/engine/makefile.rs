//! Makefile emission.
//!
//! The Make rendering of the same build the ninja emitter describes:
//! an `all` target over every artifact, one pattern-free rule per object
//! and per artifact, and a `clean` rule removing everything generated.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use crate::config::TargetKind;

use super::{BuildError, Engine};

pub(super) fn emit(engine: &Engine) -> Result<PathBuf, BuildError> {
  let path = engine.build_dir.join("Makefile");
  let config = &engine.config;

  let mut out = String::new();
  let _ = writeln!(out, "# generated by iris for project '{}'", config.project_name);
  let _ = writeln!(out, "CC := {}", engine.compiler());
  let _ = writeln!(out, "CFLAGS := {}", engine.global_compile_flags().join(" "));
  let _ = writeln!(out);

  let artifacts: Vec<String> = config
    .targets
    .iter()
    .map(|t| engine.artifact_path(t).display().to_string())
    .collect();
  let _ = writeln!(out, "all: {}", artifacts.join(" "));
  let _ = writeln!(out, ".PHONY: all clean");
  let _ = writeln!(out);

  for target in &config.targets {
    let sources = engine.resolve_sources(target);
    let extra = engine.target_compile_flags(target).join(" ");

    let mut objects = Vec::new();
    for source in &sources {
      let object = engine.object_path(target, source).display().to_string();
      let _ = writeln!(out, "{object}: {}", source.display());
      let _ = writeln!(out, "\t@mkdir -p $(@D)");
      let _ = writeln!(out, "\t$(CC) $(CFLAGS) {extra} -c $< -o $@");
      let _ = writeln!(out);
      objects.push(object);
    }

    let artifact = engine.artifact_path(target).display().to_string();
    let inputs = objects.join(" ");
    let ldflags = engine.link_tail(target).join(" ");

    match target.kind {
      TargetKind::StaticLibrary => {
        let _ = writeln!(out, "{artifact}: {inputs}");
        let _ = writeln!(out, "\tar rcs $@ $^");
      }
      TargetKind::SharedLibrary => {
        let _ = writeln!(out, "{artifact}: {inputs}");
        let _ = writeln!(out, "\t$(CC) -shared $^ -o $@ {ldflags}");
      }
      _ => {
        let deps = engine
          .dependency_artifacts(target)
          .iter()
          .map(|p| p.display().to_string())
          .collect::<Vec<_>>()
          .join(" ");
        let _ = writeln!(out, "{artifact}: {inputs} {deps}");
        let _ = writeln!(out, "\t$(CC) $^ -o $@ {ldflags}");
      }
    }
    let _ = writeln!(out);
  }

  let _ = writeln!(out, "clean:");
  let _ = writeln!(
    out,
    "\trm -rf {} {}",
    engine.build_dir.join("obj").display(),
    artifacts.join(" ")
  );

  fs::write(&path, out).map_err(|source| BuildError::Emit {
    path: path.clone(),
    source,
  })?;
  Ok(path)
}
