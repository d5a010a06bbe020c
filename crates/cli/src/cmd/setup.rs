//! Implementation of `iris setup`.

use std::path::Path;

use anyhow::{bail, Context, Result};

use iris_core::engine::{Backend, Engine};
use iris_lang::{parse_file, Interpreter};

use crate::output;

pub fn run(dir: &Path, builddir: &Path, buildtype: &str, prefix: &str, backend: &str) -> Result<()> {
  let build_file = dir.join("iris.build");
  if !build_file.exists() {
    bail!(
      "no iris.build found in {} (run 'iris init' to create a project)",
      dir.display()
    );
  }

  output::header("Configuring project");
  output::info("source directory", &dir.display().to_string());
  output::info("build directory", &builddir.display().to_string());
  output::info("build type", buildtype);

  let ast = parse_file(&build_file).context("failed to parse iris.build")?;

  let mut interpreter = Interpreter::new();
  interpreter.set_variable("builddir", &builddir.display().to_string());
  interpreter.set_variable("buildtype", buildtype);
  interpreter.set_variable("prefix", prefix);
  let config = interpreter
    .execute(&ast)
    .context("failed to evaluate iris.build")?;

  let backend: Backend = backend.parse()?;
  let mut engine = Engine::new(config, builddir);
  engine.set_source_root(dir);
  let emitted = engine.generate_build_files(backend)?;

  output::success(&format!(
    "configuration complete, wrote {}",
    emitted.display()
  ));
  println!("  run 'iris build' to compile the project");
  Ok(())
}
