//! Block-scoped variable environment.
//!
//! A stack of frames. `get` walks outward, `set` mutates the nearest
//! enclosing binding or defines locally, `define` always binds in the
//! current frame. Function calls push a *barrier* frame: name resolution
//! inside a function sees the function's own scopes and the globals, but
//! never the caller's locals. That asymmetry is deliberate and load-bearing.

use std::collections::HashMap;

use crate::value::Value;

#[derive(Debug, Default)]
struct Frame {
  bindings: HashMap<String, Value>,
  /// Set on function-call frames; lookups skip from here to the globals.
  barrier: bool,
}

#[derive(Debug)]
pub struct Environment {
  frames: Vec<Frame>,
}

impl Default for Environment {
  fn default() -> Self {
    Self::new()
  }
}

impl Environment {
  /// A fresh environment containing only the global frame.
  pub fn new() -> Self {
    Self {
      frames: vec![Frame::default()],
    }
  }

  /// Enter a lexical block scope.
  pub fn push_scope(&mut self) {
    self.frames.push(Frame::default());
  }

  /// Enter a function body: the new frame chains to the globals only.
  pub fn push_function_scope(&mut self) {
    self.frames.push(Frame {
      bindings: HashMap::new(),
      barrier: true,
    });
  }

  pub fn pop_scope(&mut self) {
    debug_assert!(self.frames.len() > 1, "cannot pop the global frame");
    if self.frames.len() > 1 {
      self.frames.pop();
    }
  }

  /// Frame indices visible from the innermost frame, outermost last.
  fn visible(&self) -> impl Iterator<Item = usize> + '_ {
    let top = self.frames.len() - 1;
    let mut cut = 0;
    for i in (0..=top).rev() {
      if self.frames[i].barrier {
        cut = i;
        break;
      }
    }
    // frames above (and including) the barrier, then the globals
    (cut..=top).rev().chain(if cut > 0 { Some(0) } else { None })
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    for i in self.visible().collect::<Vec<_>>() {
      if let Some(value) = self.frames[i].bindings.get(name) {
        return Some(value);
      }
    }
    None
  }

  /// Look up only in the innermost frame. Used when a block closes and
  /// its conventional variables are harvested.
  pub fn get_local(&self, name: &str) -> Option<&Value> {
    self.frames.last().and_then(|f| f.bindings.get(name))
  }

  /// Mutate the nearest visible binding of `name`, else define locally.
  pub fn set(&mut self, name: &str, value: Value) {
    let target = self
      .visible()
      .collect::<Vec<_>>()
      .into_iter()
      .find(|&i| self.frames[i].bindings.contains_key(name));
    match target {
      Some(i) => {
        self.frames[i].bindings.insert(name.to_string(), value);
      }
      None => self.define(name, value),
    }
  }

  /// Bind in the current frame, shadowing any outer binding.
  pub fn define(&mut self, name: &str, value: Value) {
    self
      .frames
      .last_mut()
      .expect("environment always has a global frame")
      .bindings
      .insert(name.to_string(), value);
  }

  /// Bind in the global frame regardless of current scope depth.
  pub fn define_global(&mut self, name: &str, value: Value) {
    self.frames[0].bindings.insert(name.to_string(), value);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn s(v: &str) -> Value {
    Value::Str(v.to_string())
  }

  #[test]
  fn get_walks_outward() {
    let mut env = Environment::new();
    env.define("x", s("global"));
    env.push_scope();

    assert_eq!(env.get("x"), Some(&s("global")));
    env.define("x", s("inner"));
    assert_eq!(env.get("x"), Some(&s("inner")));

    env.pop_scope();
    assert_eq!(env.get("x"), Some(&s("global")));
  }

  #[test]
  fn set_mutates_nearest_enclosing_binding() {
    let mut env = Environment::new();
    env.define("x", s("old"));
    env.push_scope();
    env.set("x", s("new"));
    env.pop_scope();

    assert_eq!(env.get("x"), Some(&s("new")));
  }

  #[test]
  fn set_without_binding_defines_locally() {
    let mut env = Environment::new();
    env.push_scope();
    env.set("y", s("local"));
    assert_eq!(env.get("y"), Some(&s("local")));

    env.pop_scope();
    assert_eq!(env.get("y"), None);
  }

  #[test]
  fn function_scope_hides_caller_locals() {
    let mut env = Environment::new();
    env.define("global_var", s("g"));
    env.push_scope();
    env.define("caller_local", s("c"));

    env.push_function_scope();
    assert_eq!(env.get("global_var"), Some(&s("g")));
    assert_eq!(env.get("caller_local"), None);

    // nested block inside the function still sees the function frame
    env.define("param", s("p"));
    env.push_scope();
    assert_eq!(env.get("param"), Some(&s("p")));
    assert_eq!(env.get("caller_local"), None);
    env.pop_scope();

    env.pop_scope();
    assert_eq!(env.get("caller_local"), Some(&s("c")));
  }

  #[test]
  fn get_local_ignores_outer_frames() {
    let mut env = Environment::new();
    env.define("x", s("outer"));
    env.push_scope();

    assert_eq!(env.get_local("x"), None);
    env.define("x", s("inner"));
    assert_eq!(env.get_local("x"), Some(&s("inner")));
  }

  #[test]
  fn define_global_from_inner_scope() {
    let mut env = Environment::new();
    env.push_scope();
    env.define_global("marker", s("m"));
    env.pop_scope();

    assert_eq!(env.get("marker"), Some(&s("m")));
  }
}
