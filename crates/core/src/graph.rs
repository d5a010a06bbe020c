//! Target dependency graph.
//!
//! One node per target; an edge is stored from dependency to dependent so
//! that topological order lists prerequisites first. Construction from a
//! [`BuildConfig`] checks referential integrity: a dependency name must
//! resolve to another target or to a declared external dependency,
//! otherwise it is logged and treated as a terminal leaf.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;
use tracing::warn;

use crate::config::{BuildConfig, TargetKind};

/// Errors surfaced before any build command runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("dependency cycle detected")]
  Cycle,

  #[error("unknown target: {0}")]
  UnknownTarget(String),
}

#[derive(Debug, Clone)]
struct Node {
  name: String,
  kind: TargetKind,
}

/// The build graph over target names.
#[derive(Debug, Default)]
pub struct Graph {
  graph: DiGraph<Node, ()>,
  indices: HashMap<String, NodeIndex>,
  insertion: Vec<NodeIndex>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build the graph for a configuration.
  ///
  /// Dependency names that match a declared external [`Dependency`] are
  /// link-time concerns, not graph edges. Names that match nothing are
  /// logged and skipped so the remaining targets still get a build order.
  ///
  /// [`Dependency`]: crate::config::Dependency
  pub fn from_config(config: &BuildConfig) -> Self {
    let mut graph = Self::new();

    for target in &config.targets {
      graph.add_node(&target.name, target.kind);
    }

    for target in &config.targets {
      for dep in &target.dependencies {
        if graph.contains(dep) {
          graph.add_edge(&target.name, dep);
        } else if config.dependency(dep).is_none() {
          warn!(target = %target.name, dependency = %dep, "unknown dependency, treating as leaf");
        }
      }
    }

    graph
  }

  /// Insert a node; repeated inserts of the same name are no-ops.
  pub fn add_node(&mut self, name: &str, kind: TargetKind) {
    if self.indices.contains_key(name) {
      return;
    }
    let idx = self.graph.add_node(Node {
      name: name.to_string(),
      kind,
    });
    self.indices.insert(name.to_string(), idx);
    self.insertion.push(idx);
  }

  /// Record that `from` depends on `to`. Duplicate edges collapse; edges
  /// to unknown nodes are dropped.
  pub fn add_edge(&mut self, from: &str, to: &str) {
    let (Some(&from_idx), Some(&to_idx)) = (self.indices.get(from), self.indices.get(to)) else {
      warn!(from, to, "edge endpoint not in graph, dropping edge");
      return;
    };
    // Stored dependency-first so traversal order matches build order.
    if !self.graph.contains_edge(to_idx, from_idx) {
      self.graph.add_edge(to_idx, from_idx, ());
    }
  }

  pub fn contains(&self, name: &str) -> bool {
    self.indices.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Direct dependencies of a target.
  pub fn dependencies_of(&self, name: &str) -> Vec<String> {
    let Some(&idx) = self.indices.get(name) else {
      return Vec::new();
    };
    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].name.clone())
      .collect()
  }

  /// `name` plus everything it transitively depends on.
  pub fn dependency_closure(&self, name: &str) -> Result<HashSet<String>, GraphError> {
    let Some(&start) = self.indices.get(name) else {
      return Err(GraphError::UnknownTarget(name.to_string()));
    };

    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(idx) = queue.pop_front() {
      if !seen.insert(self.graph[idx].name.clone()) {
        continue;
      }
      queue.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
    }
    Ok(seen)
  }

  /// Everything that transitively depends on `name` (excluding it).
  pub fn dependents_closure(&self, name: &str) -> HashSet<String> {
    let Some(&start) = self.indices.get(name) else {
      return HashSet::new();
    };

    let mut seen = HashSet::new();
    let mut queue: VecDeque<NodeIndex> =
      self.graph.neighbors_directed(start, Direction::Outgoing).collect();
    while let Some(idx) = queue.pop_front() {
      if !seen.insert(self.graph[idx].name.clone()) {
        continue;
      }
      queue.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
    }
    seen
  }

  /// True when the graph contains at least one cycle.
  pub fn has_cycle(&self) -> bool {
    toposort(&self.graph, None).is_err()
  }

  /// Kahn's algorithm: dependencies always precede their dependents.
  ///
  /// Ready nodes seed the queue in insertion order; nodes freed by the
  /// same relaxation step are appended sorted by name, so the result is
  /// deterministic for a given configuration.
  pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut queue: VecDeque<NodeIndex> = self
      .insertion
      .iter()
      .copied()
      .filter(|idx| in_degree[idx] == 0)
      .collect();

    let mut order = Vec::with_capacity(self.graph.node_count());
    while let Some(idx) = queue.pop_front() {
      order.push(self.graph[idx].name.clone());

      let mut freed: Vec<NodeIndex> = Vec::new();
      for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        let degree = in_degree.get_mut(&next).expect("node has a degree entry");
        *degree -= 1;
        if *degree == 0 {
          freed.push(next);
        }
      }
      freed.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
      queue.extend(freed);
    }

    if order.len() != self.graph.node_count() {
      return Err(GraphError::Cycle);
    }
    Ok(order)
  }

  /// Group targets into parallel execution levels: every target's
  /// dependencies live in strictly earlier waves.
  pub fn waves(&self) -> Result<Vec<Vec<String>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = self
        .insertion
        .iter()
        .copied()
        .filter(|idx| remaining.contains(idx) && in_degree[idx] == 0)
        .collect();

      if ready.is_empty() {
        return Err(GraphError::Cycle);
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&next) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].name.clone()).collect());
    }

    Ok(waves)
  }

  fn sorted_nodes(&self) -> Vec<&Node> {
    let mut nodes: Vec<&Node> = self.graph.node_weights().collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
  }

  /// Dependency edges as `(dependent, dependency)` pairs, sorted.
  fn sorted_edges(&self) -> Vec<(String, String)> {
    let mut edges: Vec<(String, String)> = self
      .graph
      .edge_indices()
      .filter_map(|e| self.graph.edge_endpoints(e))
      .map(|(dep, dependent)| (self.graph[dependent].name.clone(), self.graph[dep].name.clone()))
      .collect();
    edges.sort();
    edges
  }

  /// Graphviz rendering with one box per target, colored by kind.
  pub fn to_dot(&self) -> String {
    let mut out = String::from("digraph IrisBuild {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, style=filled];\n\n");

    for node in self.sorted_nodes() {
      let color = match node.kind {
        TargetKind::Executable => "#90EE90",
        TargetKind::StaticLibrary => "#87CEEB",
        _ => "#FFE4B5",
      };
      out.push_str(&format!("  \"{}\" [fillcolor=\"{}\"];\n", node.name, color));
    }

    out.push('\n');
    for (from, to) in self.sorted_edges() {
      out.push_str(&format!("  \"{from}\" -> \"{to}\";\n"));
    }

    out.push_str("}\n");
    out
  }

  /// JSON rendering with `nodes` and `edges` arrays.
  pub fn to_json(&self) -> String {
    let nodes: Vec<serde_json::Value> = self
      .sorted_nodes()
      .iter()
      .map(|n| serde_json::json!({ "name": n.name, "type": n.kind.as_str() }))
      .collect();
    let edges: Vec<serde_json::Value> = self
      .sorted_edges()
      .into_iter()
      .map(|(from, to)| serde_json::json!({ "from": from, "to": to }))
      .collect();

    let doc = serde_json::json!({ "nodes": nodes, "edges": edges });
    serde_json::to_string_pretty(&doc).expect("graph serialization is infallible")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Dependency, Target};

  fn target(name: &str, kind: TargetKind, deps: &[&str]) -> Target {
    Target {
      name: name.to_string(),
      kind,
      dependencies: deps.iter().map(|d| d.to_string()).collect(),
      ..Default::default()
    }
  }

  fn config_of(targets: Vec<Target>) -> BuildConfig {
    BuildConfig {
      targets,
      ..Default::default()
    }
  }

  #[test]
  fn empty_graph() {
    let graph = Graph::new();
    assert!(graph.is_empty());
    assert!(!graph.has_cycle());
    assert!(graph.topological_sort().unwrap().is_empty());
    assert!(graph.waves().unwrap().is_empty());
  }

  #[test]
  fn dependencies_precede_dependents() {
    let config = config_of(vec![
      target("app", TargetKind::Executable, &["core"]),
      target("core", TargetKind::StaticLibrary, &[]),
    ]);
    let graph = Graph::from_config(&config);

    assert_eq!(graph.topological_sort().unwrap(), vec!["core", "app"]);
  }

  #[test]
  fn diamond_waves() {
    let config = config_of(vec![
      target("base", TargetKind::StaticLibrary, &[]),
      target("left", TargetKind::StaticLibrary, &["base"]),
      target("right", TargetKind::StaticLibrary, &["base"]),
      target("app", TargetKind::Executable, &["left", "right"]),
    ]);
    let graph = Graph::from_config(&config);

    let waves = graph.waves().unwrap();
    assert_eq!(waves.len(), 3);
    assert_eq!(waves[0], vec!["base"]);
    assert_eq!(waves[1], vec!["left", "right"]);
    assert_eq!(waves[2], vec!["app"]);
  }

  #[test]
  fn cycle_is_detected() {
    let config = config_of(vec![
      target("a", TargetKind::StaticLibrary, &["b"]),
      target("b", TargetKind::StaticLibrary, &["a"]),
    ]);
    let graph = Graph::from_config(&config);

    assert!(graph.has_cycle());
    assert_eq!(graph.topological_sort(), Err(GraphError::Cycle));
    assert_eq!(graph.waves(), Err(GraphError::Cycle));
  }

  #[test]
  fn acyclic_graph_reports_no_cycle() {
    let config = config_of(vec![
      target("a", TargetKind::StaticLibrary, &[]),
      target("b", TargetKind::Executable, &["a"]),
    ]);
    assert!(!Graph::from_config(&config).has_cycle());
  }

  #[test]
  fn unknown_dependency_is_a_leaf() {
    let config = config_of(vec![target("app", TargetKind::Executable, &["ghost"])]);
    let graph = Graph::from_config(&config);

    assert_eq!(graph.len(), 1);
    assert_eq!(graph.topological_sort().unwrap(), vec!["app"]);
    assert!(graph.dependencies_of("app").is_empty());
  }

  #[test]
  fn external_dependency_is_not_an_edge() {
    let mut config = config_of(vec![target("app", TargetKind::Executable, &["zlib"])]);
    config.dependencies.push(Dependency {
      name: "zlib".to_string(),
      ..Default::default()
    });
    let graph = Graph::from_config(&config);

    assert_eq!(graph.len(), 1);
    assert!(graph.dependencies_of("app").is_empty());
  }

  #[test]
  fn duplicate_edges_collapse() {
    let mut graph = Graph::new();
    graph.add_node("a", TargetKind::Executable);
    graph.add_node("b", TargetKind::StaticLibrary);
    graph.add_edge("a", "b");
    graph.add_edge("a", "b");

    assert_eq!(graph.dependencies_of("a"), vec!["b"]);
  }

  #[test]
  fn closure_walks_transitive_dependencies() {
    let config = config_of(vec![
      target("base", TargetKind::StaticLibrary, &[]),
      target("mid", TargetKind::StaticLibrary, &["base"]),
      target("app", TargetKind::Executable, &["mid"]),
      target("other", TargetKind::Executable, &[]),
    ]);
    let graph = Graph::from_config(&config);

    let closure = graph.dependency_closure("app").unwrap();
    assert_eq!(closure.len(), 3);
    assert!(closure.contains("base"));
    assert!(!closure.contains("other"));

    assert_eq!(
      graph.dependency_closure("nope"),
      Err(GraphError::UnknownTarget("nope".to_string()))
    );
  }

  #[test]
  fn dependents_closure_walks_downstream() {
    let config = config_of(vec![
      target("base", TargetKind::StaticLibrary, &[]),
      target("mid", TargetKind::StaticLibrary, &["base"]),
      target("app", TargetKind::Executable, &["mid"]),
    ]);
    let graph = Graph::from_config(&config);

    let downstream = graph.dependents_closure("base");
    assert_eq!(downstream.len(), 2);
    assert!(downstream.contains("mid"));
    assert!(downstream.contains("app"));
  }

  #[test]
  fn dot_output_is_stable_and_colored() {
    let config = config_of(vec![
      target("app", TargetKind::Executable, &["core"]),
      target("core", TargetKind::StaticLibrary, &[]),
    ]);
    let graph = Graph::from_config(&config);

    let dot = graph.to_dot();
    assert!(dot.contains("\"app\" [fillcolor=\"#90EE90\"]"));
    assert!(dot.contains("\"core\" [fillcolor=\"#87CEEB\"]"));
    assert!(dot.contains("\"app\" -> \"core\";"));
    assert_eq!(dot, graph.to_dot());
  }

  #[test]
  fn json_output_lists_nodes_and_edges() {
    let config = config_of(vec![
      target("app", TargetKind::Executable, &["core"]),
      target("core", TargetKind::StaticLibrary, &[]),
    ]);
    let graph = Graph::from_config(&config);

    let parsed: serde_json::Value = serde_json::from_str(&graph.to_json()).unwrap();
    assert_eq!(parsed["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["nodes"][0]["name"], "app");
    assert_eq!(parsed["nodes"][1]["type"], "library");
    assert_eq!(parsed["edges"][0]["from"], "app");
    assert_eq!(parsed["edges"][0]["to"], "core");
  }
}
