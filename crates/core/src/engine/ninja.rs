//! Ninja manifest emission.
//!
//! Emits one `cc` build statement per object and one link statement per
//! artifact, with per-target flags passed through a scoped `extra`
//! variable. Paths are written exactly as the engine would execute them,
//! so a `ninja -f <build_dir>/build.ninja` run from the project root
//! produces the same artifacts as `iris build`.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use crate::config::TargetKind;

use super::{BuildError, Engine};

pub(super) fn emit(engine: &Engine) -> Result<PathBuf, BuildError> {
  let path = engine.build_dir.join("build.ninja");
  let config = &engine.config;

  let mut out = String::new();
  let _ = writeln!(out, "# generated by iris for project '{}'", config.project_name);
  let _ = writeln!(out, "ninja_required_version = 1.3");
  let _ = writeln!(out);
  let _ = writeln!(out, "cc = {}", engine.compiler());
  let _ = writeln!(out, "cflags = {}", engine.global_compile_flags().join(" "));
  let _ = writeln!(out);

  out.push_str(
    "rule cc\n  command = $cc $cflags $extra -c $in -o $out\n  description = CC $out\n\n\
     rule link\n  command = $cc $in -o $out $ldflags\n  description = LINK $out\n\n\
     rule ar\n  command = ar rcs $out $in\n  description = AR $out\n\n\
     rule solink\n  command = $cc -shared $in -o $out $ldflags\n  description = SOLINK $out\n\n",
  );

  let mut artifacts = Vec::new();
  for target in &config.targets {
    let sources = engine.resolve_sources(target);
    let extra = engine.target_compile_flags(target).join(" ");

    let mut objects = Vec::new();
    for source in &sources {
      let object = engine.object_path(target, source);
      let _ = writeln!(out, "build {}: cc {}", object.display(), source.display());
      if !extra.is_empty() {
        let _ = writeln!(out, "  extra = {extra}");
      }
      objects.push(object.display().to_string());
    }

    let artifact = engine.artifact_path(target);
    let inputs = objects.join(" ");
    let ldflags = engine.link_tail(target).join(" ");

    match target.kind {
      TargetKind::StaticLibrary => {
        let _ = writeln!(out, "build {}: ar {inputs}", artifact.display());
      }
      TargetKind::SharedLibrary => {
        let _ = writeln!(out, "build {}: solink {inputs}", artifact.display());
        if !ldflags.is_empty() {
          let _ = writeln!(out, "  ldflags = {ldflags}");
        }
      }
      _ => {
        let deps = engine
          .dependency_artifacts(target)
          .iter()
          .map(|p| p.display().to_string())
          .collect::<Vec<_>>()
          .join(" ");
        let line = if deps.is_empty() { inputs } else { format!("{inputs} {deps}") };
        let _ = writeln!(out, "build {}: link {line}", artifact.display());
        if !ldflags.is_empty() {
          let _ = writeln!(out, "  ldflags = {ldflags}");
        }
      }
    }
    let _ = writeln!(out);
    artifacts.push(artifact.display().to_string());
  }

  if !artifacts.is_empty() {
    let _ = writeln!(out, "default {}", artifacts.join(" "));
  }

  fs::write(&path, out).map_err(|source| BuildError::Emit {
    path: path.clone(),
    source,
  })?;
  Ok(path)
}
