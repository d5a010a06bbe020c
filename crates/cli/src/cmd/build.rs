//! Implementation of `iris build`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use owo_colors::OwoColorize;

use iris_core::engine::{Engine, ProgressCallback, TargetState};

use crate::output;

pub async fn run(target: Option<&str>, jobs: usize, verbose: bool, builddir: &Path) -> Result<()> {
  if !builddir.exists() {
    bail!(
      "build directory {} not found (run 'iris setup' first)",
      builddir.display()
    );
  }

  output::header("Building project");
  let start = Instant::now();

  let mut engine = Engine::load_from_build_dir(builddir)?;

  let progress: ProgressCallback = Arc::new(|task: &str, current: usize, total: usize| {
    println!("  [{current}/{total}] {task}");
  });

  let report = engine.build(target, jobs, verbose, Some(progress)).await?;

  let elapsed = output::format_duration(start.elapsed());
  println!();
  println!(
    "  {} built, {} up to date, {} failed, {} skipped",
    report.count(TargetState::Built),
    report.count(TargetState::UpToDate),
    report.count(TargetState::Failed),
    report.count(TargetState::Skipped),
  );

  if report.is_success() {
    output::success(&format!("build completed in {elapsed}"));
    return Ok(());
  }

  for (name, detail) in &report.failures {
    eprintln!();
    eprintln!("{} {}", "failed:".red().bold(), name);
    eprintln!("{}", detail.trim_end());
  }
  bail!("build failed");
}
