//! Shell command execution.
//!
//! Commands run through the system shell with the runner's environment
//! overlay and working directory. `run_parallel` drains a queue of
//! commands through a semaphore-bounded set of workers, so a slow command
//! never idles the rest of the pool. Cancellation is cooperative: a
//! `watch` flag is observed between captured output lines and in-flight
//! children are killed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Outcome of one executed command.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
  /// Process exit code; `-1` when the process was killed or never ran.
  pub exit_code: i32,
  pub stdout: String,
  pub stderr: String,
  pub elapsed: Duration,
}

impl RunResult {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }

  fn aborted(stderr: impl Into<String>) -> Self {
    Self {
      exit_code: -1,
      stderr: stderr.into(),
      ..Default::default()
    }
  }
}

#[derive(Debug, Error)]
pub enum RunError {
  #[error("failed to spawn '{command}': {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("io error while running '{command}': {source}")]
  Io {
    command: String,
    #[source]
    source: std::io::Error,
  },
}

/// Executes shell commands with a shared environment and working directory.
#[derive(Debug, Clone)]
pub struct Runner {
  env: BTreeMap<String, String>,
  working_dir: Option<PathBuf>,
  cancel: Arc<watch::Sender<bool>>,
}

impl Default for Runner {
  fn default() -> Self {
    Self::new()
  }
}

impl Runner {
  pub fn new() -> Self {
    let (cancel, _) = watch::channel(false);
    Self {
      env: BTreeMap::new(),
      working_dir: None,
      cancel: Arc::new(cancel),
    }
  }

  /// Environment overlay applied to every subsequent execution.
  pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.env.insert(key.into(), value.into());
  }

  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.env
  }

  pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
    self.working_dir = Some(dir.into());
  }

  /// Request cancellation of every running and queued command.
  pub fn cancel(&self) {
    self.cancel.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.cancel.borrow()
  }

  /// Run one command to completion, capturing its output.
  pub async fn run(&self, command: &str) -> Result<RunResult, RunError> {
    if self.is_cancelled() {
      return Ok(RunResult::aborted("cancelled before start"));
    }

    let start = Instant::now();
    let (shell, shell_arg) = system_shell();

    let mut process = Command::new(shell);
    process
      .arg(shell_arg)
      .arg(command)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &self.working_dir {
      process.current_dir(dir);
    }
    for (key, value) in &self.env {
      process.env(key, value);
    }

    debug!(command, "spawning");
    let mut child = process.spawn().map_err(|source| RunError::Spawn {
      command: command.to_string(),
      source,
    })?;

    let io_err = |source| RunError::Io {
      command: command.to_string(),
      source,
    };

    let child_stderr = child.stderr.take().expect("stderr is piped");
    let stderr_task = tokio::spawn(async move {
      let mut buf = String::new();
      let mut reader = BufReader::new(child_stderr);
      reader.read_to_string(&mut buf).await.ok();
      buf
    });

    let child_stdout = child.stdout.take().expect("stdout is piped");
    let mut lines = BufReader::new(child_stdout).lines();
    let mut rx = self.cancel.subscribe();
    let mut stdout = String::new();
    let mut killed = false;

    loop {
      tokio::select! {
        line = lines.next_line() => match line.map_err(io_err)? {
          Some(line) => {
            stdout.push_str(&line);
            stdout.push('\n');
          }
          None => break,
        },
        changed = rx.changed() => {
          if changed.is_ok() && *rx.borrow_and_update() {
            child.start_kill().ok();
            killed = true;
            break;
          }
        }
      }
    }

    let status = child.wait().await.map_err(io_err)?;
    let stderr = stderr_task.await.unwrap_or_default();

    let exit_code = if killed { -1 } else { status.code().unwrap_or(-1) };
    Ok(RunResult {
      exit_code,
      stdout,
      stderr,
      elapsed: start.elapsed(),
    })
  }

  /// Run many commands with at most `max_parallel` in flight
  /// (`0` means hardware concurrency). Results come back in input order;
  /// a command that fails to spawn yields exit code 127 with the error
  /// text on stderr rather than aborting its peers.
  pub async fn run_parallel(&self, commands: &[String], max_parallel: usize) -> Vec<RunResult> {
    let limit = if max_parallel == 0 {
      default_parallelism()
    } else {
      max_parallel
    };
    let semaphore = Arc::new(Semaphore::new(limit));

    let mut tasks: JoinSet<(usize, RunResult)> = JoinSet::new();
    for (index, command) in commands.iter().enumerate() {
      let runner = self.clone();
      let command = command.clone();
      let semaphore = Arc::clone(&semaphore);

      tasks.spawn(async move {
        let _permit = semaphore.acquire().await.expect("semaphore is never closed");
        let result = match runner.run(&command).await {
          Ok(result) => result,
          Err(e) => {
            error!(command = %command, error = %e, "command could not be executed");
            RunResult {
              exit_code: 127,
              stderr: e.to_string(),
              ..Default::default()
            }
          }
        };
        (index, result)
      });
    }

    let mut results: Vec<RunResult> = vec![RunResult::aborted("not executed"); commands.len()];
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((index, result)) => results[index] = result,
        Err(e) => error!(error = %e, "command task panicked"),
      }
    }
    results
  }
}

/// Pool width when the caller passes `0`.
pub fn default_parallelism() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(unix)]
fn system_shell() -> (&'static str, &'static str) {
  ("/bin/sh", "-c")
}

#[cfg(windows)]
fn system_shell() -> (&'static str, &'static str) {
  ("cmd.exe", "/C")
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn captures_stdout_and_exit_code() {
    let runner = Runner::new();
    let result = runner.run("echo hello").await.unwrap();

    assert!(result.success());
    assert_eq!(result.stdout, "hello\n");
    assert!(result.stderr.is_empty());
  }

  #[tokio::test]
  async fn nonzero_exit_is_reported_not_an_error() {
    let runner = Runner::new();
    let result = runner.run("exit 3").await.unwrap();

    assert!(!result.success());
    assert_eq!(result.exit_code, 3);
  }

  #[tokio::test]
  async fn captures_stderr() {
    let runner = Runner::new();
    let result = runner.run("echo oops 1>&2").await.unwrap();

    assert!(result.stderr.contains("oops"));
  }

  #[tokio::test]
  async fn env_overlay_is_visible() {
    let mut runner = Runner::new();
    runner.set_env("IRIS_TEST_VALUE", "42");
    let result = runner.run("echo $IRIS_TEST_VALUE").await.unwrap();

    assert_eq!(result.stdout.trim(), "42");
  }

  #[tokio::test]
  async fn working_dir_applies() {
    let dir = TempDir::new().unwrap();
    let mut runner = Runner::new();
    runner.set_working_dir(dir.path());
    runner.run("touch marker").await.unwrap();

    assert!(dir.path().join("marker").exists());
  }

  #[tokio::test]
  async fn parallel_results_keep_input_order() {
    let runner = Runner::new();
    let commands: Vec<String> = (0..6).map(|i| format!("echo {i}")).collect();

    let results = runner.run_parallel(&commands, 3).await;

    assert_eq!(results.len(), 6);
    for (i, result) in results.iter().enumerate() {
      assert_eq!(result.stdout.trim(), i.to_string());
    }
  }

  #[tokio::test]
  async fn parallel_zero_means_hardware_concurrency() {
    let runner = Runner::new();
    let results = runner.run_parallel(&["echo a".to_string()], 0).await;
    assert!(results[0].success());
  }

  #[tokio::test]
  async fn cancelled_runner_skips_new_commands() {
    let runner = Runner::new();
    runner.cancel();

    let result = runner.run("echo should-not-run").await.unwrap();
    assert_eq!(result.exit_code, -1);
    assert!(result.stdout.is_empty());
  }

  #[tokio::test]
  async fn cancel_kills_in_flight_command() {
    let runner = Runner::new();
    let handle = {
      let runner = runner.clone();
      tokio::spawn(async move { runner.run("sleep 30").await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    runner.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .expect("cancelled command must not run to completion")
      .unwrap()
      .unwrap();
    assert_eq!(result.exit_code, -1);
  }
}
