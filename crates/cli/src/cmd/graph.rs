//! Implementation of `iris graph`.

use std::path::Path;

use anyhow::Result;

use iris_core::engine::Engine;
use iris_core::graph::Graph;

pub fn run(format: &str, builddir: &Path) -> Result<()> {
  let engine = Engine::load_from_build_dir(builddir)?;
  let graph = Graph::from_config(engine.config());

  match format {
    "json" => println!("{}", graph.to_json()),
    _ => print!("{}", graph.to_dot()),
  }
  Ok(())
}
