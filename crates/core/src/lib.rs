//! iris-core: everything downstream of script evaluation.
//!
//! - [`config`]: the evaluated project model (`BuildConfig`, `Target`)
//! - [`graph`]: target dependency graph, ordering and cycle detection
//! - [`cache`]: persistent fingerprint cache with up-to-date queries
//! - [`hash`]: content digests for rebuild decisions
//! - [`runner`]: parallel shell command execution
//! - [`engine`]: backend file emission and build orchestration
//!
//! The language front-end (`iris-lang`) produces a [`config::BuildConfig`]
//! and hands it to an [`engine::Engine`] for a single build invocation.

pub mod cache;
pub mod config;
pub mod engine;
pub mod glob;
pub mod graph;
pub mod hash;
pub mod runner;

pub use cache::{Cache, CacheEntry};
pub use config::{BuildConfig, Dependency, DependencyKind, Target, TargetKind};
pub use engine::{Backend, BuildError, BuildReport, Engine, TargetState};
pub use graph::{Graph, GraphError};
pub use runner::{RunResult, Runner};
