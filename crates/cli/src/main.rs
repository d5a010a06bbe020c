//! The `iris` command.
//!
//! - `iris setup [dir]` evaluates `iris.build` and writes the backend files
//! - `iris build` compiles using the configured build directory
//! - `iris clean` removes build artifacts
//! - `iris graph` prints the target dependency graph

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cmd;
mod output;

#[derive(Parser)]
#[command(name = "iris")]
#[command(version, about = "A build orchestrator for C/C++ projects")]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Configure a project from its iris.build script
  Setup {
    /// Source directory containing iris.build
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Build directory to generate into
    #[arg(long, default_value = "build")]
    builddir: PathBuf,

    /// Build type (debug, release)
    #[arg(long, default_value = "debug")]
    buildtype: String,

    /// Installation prefix exposed to the script
    #[arg(long, default_value = "/usr/local")]
    prefix: String,

    /// Backend build file to emit (ninja, make)
    #[arg(long, default_value = "ninja")]
    backend: String,
  },

  /// Compile the project
  Build {
    /// Build only this target and its dependencies
    #[arg(long)]
    target: Option<String>,

    /// Parallel jobs (0 = number of CPUs)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Build directory created by `iris setup`
    #[arg(long, default_value = "build")]
    builddir: PathBuf,
  },

  /// Remove build artifacts
  Clean {
    /// Also remove the build directory and cache entirely
    #[arg(long)]
    all: bool,

    /// Build directory created by `iris setup`
    #[arg(long, default_value = "build")]
    builddir: PathBuf,
  },

  /// Print the target dependency graph
  Graph {
    /// Output format
    #[arg(long, default_value = "dot", value_parser = ["dot", "json"])]
    format: String,

    /// Build directory created by `iris setup`
    #[arg(long, default_value = "build")]
    builddir: PathBuf,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
  FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .init();

  match cli.command {
    Commands::Setup {
      dir,
      builddir,
      buildtype,
      prefix,
      backend,
    } => cmd::setup::run(&dir, &builddir, &buildtype, &prefix, &backend),
    Commands::Build {
      target,
      jobs,
      builddir,
    } => cmd::build::run(target.as_deref(), jobs, cli.verbose, &builddir).await,
    Commands::Clean { all, builddir } => cmd::clean::run(all, &builddir),
    Commands::Graph { format, builddir } => cmd::graph::run(&format, &builddir),
  }
}
