//! The build engine.
//!
//! Owns the evaluated [`BuildConfig`] and drives everything after script
//! evaluation: backend file emission, fingerprinting, cache consultation
//! and parallel command execution over the dependency graph.
//!
//! Scheduling model: targets execute wave by wave (every dependency of a
//! wave lives in an earlier wave). Within a target, compile commands run
//! in parallel and the link step waits for all of them; across targets, a
//! shared semaphore caps total command fan-out. The cache is only touched
//! from the scheduling task, never from workers.

mod makefile;
mod ninja;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, CACHE_DIR};
use crate::config::{BuildConfig, ConfigError, Target, TargetKind};
use crate::glob;
use crate::graph::{Graph, GraphError};
use crate::hash::{command_hash, input_hash, Fingerprint};
use crate::runner::{default_parallelism, Runner};

/// Backend build-file dialects the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
  Ninja,
  Make,
}

impl FromStr for Backend {
  type Err = BuildError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "ninja" => Ok(Self::Ninja),
      "make" => Ok(Self::Make),
      other => Err(BuildError::UnknownBackend(other.to_string())),
    }
  }
}

/// Fatal build errors raised before or outside command execution.
/// Per-target command failures are reported through [`BuildReport`]
/// instead, so independent targets can still finish.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("unknown backend: '{0}' (expected 'ninja' or 'make')")]
  UnknownBackend(String),

  #[error("cannot write {path}: {source}")]
  Emit {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Lifecycle state of one target within a build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
  /// Fingerprint matched the cache; nothing ran.
  UpToDate,
  /// All commands ran and succeeded.
  Built,
  /// A command exited non-zero.
  Failed,
  /// A transitive dependency failed.
  Skipped,
}

impl TargetState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::UpToDate => "up to date",
      Self::Built => "built",
      Self::Failed => "failed",
      Self::Skipped => "skipped",
    }
  }
}

/// Outcome of a build invocation.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub states: BTreeMap<String, TargetState>,
  /// Captured output of failed targets, keyed by target name.
  pub failures: BTreeMap<String, String>,
  /// Number of commands actually executed.
  pub commands_run: usize,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self
      .states
      .values()
      .all(|s| matches!(s, TargetState::UpToDate | TargetState::Built))
  }

  pub fn count(&self, state: TargetState) -> usize {
    self.states.values().filter(|s| **s == state).count()
  }
}

/// Called after every command with `(target, completed, total)`.
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Everything needed to build one target, computed up front on the
/// scheduling task.
#[derive(Debug, Clone)]
struct TargetPlan {
  name: String,
  compiles: Vec<String>,
  link: Option<String>,
  artifact: PathBuf,
  object_dir: PathBuf,
  outputs: Vec<PathBuf>,
  fingerprint: Fingerprint,
}

impl TargetPlan {
  fn command_count(&self) -> usize {
    self.compiles.len() + usize::from(self.link.is_some())
  }
}

/// Result handed back from a worker to the scheduling task.
struct TargetOutcome {
  name: String,
  success: bool,
  detail: String,
}

/// The build orchestrator.
pub struct Engine {
  config: BuildConfig,
  build_dir: PathBuf,
  source_root: PathBuf,
  cache_dir: PathBuf,
  env: BTreeMap<String, String>,
}

impl Engine {
  /// Create an engine for a freshly evaluated configuration.
  pub fn new(config: BuildConfig, build_dir: impl Into<PathBuf>) -> Self {
    Self {
      config,
      build_dir: build_dir.into(),
      source_root: PathBuf::from("."),
      cache_dir: PathBuf::from(CACHE_DIR),
      env: BTreeMap::new(),
    }
  }

  /// Reconstruct an engine from a previously configured build directory.
  pub fn load_from_build_dir(build_dir: impl Into<PathBuf>) -> Result<Self, BuildError> {
    let build_dir = build_dir.into();
    let config = BuildConfig::load(&build_dir)?;
    Ok(Self::new(config, build_dir))
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  /// Directory the source patterns are resolved against.
  pub fn set_source_root(&mut self, root: impl Into<PathBuf>) {
    self.source_root = root.into();
  }

  pub fn set_cache_dir(&mut self, dir: impl Into<PathBuf>) {
    self.cache_dir = dir.into();
  }

  /// Environment entries applied to every build command (and folded into
  /// command fingerprints).
  pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.env.insert(key.into(), value.into());
  }

  /// Emit the backend build file (plus `iris-config.json`) into the
  /// build directory. Returns the path of the emitted file.
  pub fn generate_build_files(&self, backend: Backend) -> Result<PathBuf, BuildError> {
    fs::create_dir_all(&self.build_dir)?;
    self.config.save(&self.build_dir)?;

    let path = match backend {
      Backend::Ninja => ninja::emit(self)?,
      Backend::Make => makefile::emit(self)?,
    };
    info!(path = %path.display(), "backend file written");
    Ok(path)
  }

  /// Run a build.
  ///
  /// `target` restricts the build to one target and its dependency
  /// closure; `jobs == 0` means hardware concurrency. Progress is
  /// reported after every command.
  pub async fn build(
    &mut self,
    target: Option<&str>,
    jobs: usize,
    verbose: bool,
    progress: Option<ProgressCallback>,
  ) -> Result<BuildReport, BuildError> {
    let graph = Graph::from_config(&self.config);
    if graph.has_cycle() {
      return Err(GraphError::Cycle.into());
    }
    let waves = graph.waves()?;
    let selection: Option<HashSet<String>> = match target {
      Some(name) => Some(graph.dependency_closure(name)?),
      None => None,
    };

    let mut cache = Cache::open(&self.cache_dir);
    let mut report = BuildReport::default();

    // Planning pass, in dependency order: decide per target whether the
    // cache answers for it. A target whose dependency is being rebuilt is
    // never taken from the cache, so source edits propagate downstream.
    let mut plans: BTreeMap<String, TargetPlan> = BTreeMap::new();
    let mut rebuilding: HashSet<String> = HashSet::new();
    for name in graph.topological_sort()? {
      if let Some(selected) = &selection {
        if !selected.contains(&name) {
          continue;
        }
      }
      let target = self.config.target(&name).expect("graph nodes come from config");
      let plan = self.plan_target(target);

      let dep_rebuilding = graph.dependencies_of(&name).iter().any(|d| rebuilding.contains(d));
      if !dep_rebuilding && cache.is_up_to_date(&name, &plan.fingerprint.input, &plan.fingerprint.command) {
        info!(target = %name, "up to date");
        report.states.insert(name, TargetState::UpToDate);
      } else {
        rebuilding.insert(name.clone());
        plans.insert(name, plan);
      }
    }

    let total: usize = plans.values().map(TargetPlan::command_count).sum();
    let completed = Arc::new(AtomicUsize::new(0));
    let jobs = if jobs == 0 { default_parallelism() } else { jobs };
    let permits = Arc::new(Semaphore::new(jobs));

    let mut runner = Runner::new();
    for (key, value) in &self.env {
      runner.set_env(key.clone(), value.clone());
    }

    info!(
      targets = plans.len(),
      cached = report.count(TargetState::UpToDate),
      commands = total,
      jobs,
      "starting build"
    );

    for wave in waves {
      let mut tasks: JoinSet<TargetOutcome> = JoinSet::new();

      for name in wave {
        let Some(plan) = plans.get(&name) else {
          continue;
        };

        // A failed or skipped dependency poisons the whole subtree.
        let poisoned = graph
          .dependencies_of(&name)
          .iter()
          .any(|d| matches!(report.states.get(d), Some(TargetState::Failed | TargetState::Skipped)));
        if poisoned {
          warn!(target = %name, "skipping, a dependency failed");
          report.states.insert(name, TargetState::Skipped);
          continue;
        }

        fs::create_dir_all(&plan.object_dir)?;
        tasks.spawn(execute_plan(
          plan.clone(),
          runner.clone(),
          Arc::clone(&permits),
          Arc::clone(&completed),
          total,
          progress.clone(),
          verbose,
        ));
      }

      while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
          Ok(outcome) => outcome,
          Err(e) => {
            error!(error = %e, "build task panicked");
            continue;
          }
        };

        if outcome.success {
          let plan = &plans[&outcome.name];
          cache.store(
            &outcome.name,
            &plan.fingerprint.input,
            &plan.fingerprint.command,
            plan.outputs.clone(),
          );
          report.states.insert(outcome.name, TargetState::Built);
        } else {
          error!(target = %outcome.name, "build failed");
          report.states.insert(outcome.name.clone(), TargetState::Failed);
          report.failures.insert(outcome.name, outcome.detail);
        }
      }
    }

    report.commands_run = completed.load(Ordering::SeqCst);

    // A write failure must not fail a build that otherwise succeeded.
    if let Err(e) = cache.save() {
      warn!(error = %e, "failed to persist cache manifest");
    }

    info!(
      built = report.count(TargetState::Built),
      cached = report.count(TargetState::UpToDate),
      failed = report.count(TargetState::Failed),
      skipped = report.count(TargetState::Skipped),
      commands = report.commands_run,
      "build finished"
    );
    Ok(report)
  }

  /// The compiler binary for this configuration.
  fn compiler(&self) -> &str {
    if !self.config.compiler.is_empty() {
      &self.config.compiler
    } else if self.config.is_cpp() {
      "c++"
    } else {
      "cc"
    }
  }

  /// Compile flags shared by every target: global flags, the language
  /// standard, global include dirs and global defines.
  fn global_compile_flags(&self) -> Vec<String> {
    let mut flags = self.config.global_flags.clone();
    if !self.config.standard.is_empty() {
      flags.push(format!("-std={}", self.config.standard));
    }
    for dir in &self.config.global_includes {
      flags.push(format!("-I{dir}"));
    }
    for (key, value) in &self.config.global_defines {
      flags.push(define_flag(key, value));
    }
    flags
  }

  /// Per-target flag tail: include dirs, defines, extra flags and
  /// external dependency include dirs.
  fn target_compile_flags(&self, target: &Target) -> Vec<String> {
    let mut flags = Vec::new();
    for dir in &target.includes {
      flags.push(format!("-I{dir}"));
    }
    for (key, value) in &target.defines {
      flags.push(define_flag(key, value));
    }
    flags.extend(target.flags.iter().cloned());
    if target.kind == TargetKind::SharedLibrary {
      flags.push("-fPIC".to_string());
    }
    for dep in &target.dependencies {
      if let Some(external) = self.config.dependency(dep) {
        for dir in &external.include_dirs {
          flags.push(format!("-I{dir}"));
        }
      }
    }
    flags
  }

  /// Arguments appended to a target's link line.
  fn link_tail(&self, target: &Target) -> Vec<String> {
    let mut tail = target.link_flags.clone();
    for dep in &target.dependencies {
      if let Some(external) = self.config.dependency(dep) {
        for dir in &external.link_dirs {
          tail.push(format!("-L{dir}"));
        }
        for lib in &external.libraries {
          tail.push(format!("-l{lib}"));
        }
      }
    }
    tail
  }

  /// Where a target's final artifact lands.
  fn artifact_path(&self, target: &Target) -> PathBuf {
    let file = match target.kind {
      TargetKind::Executable | TargetKind::Object | TargetKind::Custom => target.name.clone(),
      TargetKind::StaticLibrary => format!("lib{}.a", target.name),
      TargetKind::SharedLibrary => format!("lib{}.so", target.name),
    };
    self.build_dir.join(file)
  }

  fn object_dir(&self, target: &Target) -> PathBuf {
    self.build_dir.join("obj").join(&target.name)
  }

  fn object_path(&self, target: &Target, source: &Path) -> PathBuf {
    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "source".to_string());
    self.object_dir(target).join(format!("{stem}.o"))
  }

  /// Glob-expand a target's source patterns, in declaration order.
  fn resolve_sources(&self, target: &Target) -> Vec<PathBuf> {
    let mut sources = Vec::new();
    for pattern in &target.sources {
      let expanded = glob::expand_in(&self.source_root, pattern);
      if expanded.is_empty() {
        warn!(target = %target.name, pattern = %pattern, "source pattern matched nothing");
      }
      sources.extend(expanded);
    }
    sources
  }

  /// Artifacts of the target's in-project dependencies, used as extra
  /// link inputs.
  fn dependency_artifacts(&self, target: &Target) -> Vec<PathBuf> {
    target
      .dependencies
      .iter()
      .filter_map(|dep| self.config.target(dep))
      .map(|dep| self.artifact_path(dep))
      .collect()
  }

  /// Compute every command the target would run plus its fingerprint.
  fn plan_target(&self, target: &Target) -> TargetPlan {
    let sources = self.resolve_sources(target);
    let compiler = self.compiler();

    let mut flags = self.global_compile_flags();
    flags.extend(self.target_compile_flags(target));
    let flag_str = flags.join(" ");

    let mut compiles = Vec::new();
    let mut objects = Vec::new();
    for source in &sources {
      let object = self.object_path(target, source);
      compiles.push(format!(
        "{compiler} {flag_str} -c {} -o {}",
        source.display(),
        object.display()
      ));
      objects.push(object);
    }

    let artifact = self.artifact_path(target);
    let object_list = objects
      .iter()
      .map(|o| o.display().to_string())
      .collect::<Vec<_>>()
      .join(" ");
    let dep_artifacts = self
      .dependency_artifacts(target)
      .iter()
      .map(|p| p.display().to_string())
      .collect::<Vec<_>>()
      .join(" ");
    let tail = self.link_tail(target).join(" ");

    let link = match target.kind {
      TargetKind::StaticLibrary => Some(join_command(&["ar rcs", &artifact.display().to_string(), &object_list])),
      TargetKind::SharedLibrary => Some(join_command(&[
        compiler,
        "-shared",
        &object_list,
        "-o",
        &artifact.display().to_string(),
        &tail,
      ])),
      _ => Some(join_command(&[
        compiler,
        &object_list,
        &dep_artifacts,
        "-o",
        &artifact.display().to_string(),
        &tail,
      ])),
    };

    let mut commands = compiles.clone();
    commands.extend(link.clone());
    let fingerprint = Fingerprint {
      input: input_hash(&sources),
      command: command_hash(&commands, &self.env, compiler),
    };

    let mut outputs = vec![artifact.clone()];
    outputs.extend(objects);

    TargetPlan {
      name: target.name.clone(),
      compiles,
      link,
      artifact,
      object_dir: self.object_dir(target),
      outputs,
      fingerprint,
    }
  }
}

/// Build a command line from non-empty fragments.
fn join_command(parts: &[&str]) -> String {
  parts
    .iter()
    .filter(|p| !p.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(" ")
}

fn define_flag(key: &str, value: &str) -> String {
  if value.is_empty() {
    format!("-D{key}")
  } else {
    format!("-D{key}={value}")
  }
}

/// Run one target's commands: compiles in parallel, then the link step.
async fn execute_plan(
  plan: TargetPlan,
  runner: Runner,
  permits: Arc<Semaphore>,
  completed: Arc<AtomicUsize>,
  total: usize,
  progress: Option<ProgressCallback>,
  verbose: bool,
) -> TargetOutcome {
  let run_one = |command: String| {
    let runner = runner.clone();
    let permits = Arc::clone(&permits);
    let completed = Arc::clone(&completed);
    let progress = progress.clone();
    let name = plan.name.clone();
    async move {
      let _permit = permits.acquire().await.expect("semaphore is never closed");
      if verbose {
        info!(target = %name, command = %command, "running");
      } else {
        debug!(target = %name, command = %command, "running");
      }
      let result = runner.run(&command).await;
      let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
      if let Some(cb) = &progress {
        cb(&name, done, total);
      }
      (command, result)
    }
  };

  let mut compile_tasks = JoinSet::new();
  for command in plan.compiles.clone() {
    compile_tasks.spawn(run_one(command));
  }

  let mut failure: Option<String> = None;
  while let Some(joined) = compile_tasks.join_next().await {
    let Ok((command, result)) = joined else {
      failure.get_or_insert_with(|| "compile task panicked".to_string());
      continue;
    };
    match result {
      Ok(result) if result.success() => {}
      Ok(result) => {
        failure.get_or_insert_with(|| format!("{command}\n{}{}", result.stdout, result.stderr));
      }
      Err(e) => {
        failure.get_or_insert_with(|| e.to_string());
      }
    }
  }

  if let Some(detail) = failure {
    return TargetOutcome {
      name: plan.name.clone(),
      success: false,
      detail,
    };
  }

  if let Some(link) = plan.link.clone() {
    let (command, result) = run_one(link).await;
    match result {
      Ok(result) if result.success() => {}
      Ok(result) => {
        return TargetOutcome {
          name: plan.name,
          success: false,
          detail: format!("{command}\n{}{}", result.stdout, result.stderr),
        };
      }
      Err(e) => {
        return TargetOutcome {
          name: plan.name,
          success: false,
          detail: e.to_string(),
        };
      }
    }
  }

  debug!(target = %plan.name, artifact = %plan.artifact.display(), "target complete");
  TargetOutcome {
    name: plan.name,
    success: true,
    detail: String::new(),
  }
}
