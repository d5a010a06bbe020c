//! Tree-walking interpreter.
//!
//! Evaluates a parsed build script into a [`BuildConfig`]. Block forms
//! (`project`, target kinds, `compiler`, `dependency`, `task`) run their
//! bodies in a fresh scope and harvest a fixed set of conventional
//! variable names from it when the scope closes. `if`/`unless` share the
//! enclosing scope so conditional assignments merge naturally; `for`
//! opens one child scope and rebinds its variable per iteration.
//!
//! `return` is threaded through evaluation as an explicit control-flow
//! signal, never as an error or panic.

mod builtins;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::debug;

use iris_core::config::{BuildConfig, Dependency, DependencyKind, Target, TargetKind};
use iris_platform::{Arch, Os};

use crate::ast::{Ast, BinOp, Block, Expr, Stmt, UnOp};
use crate::env::Environment;
use crate::value::Value;

/// Where `print`/`warning` output goes. Injected so evaluation stays
/// testable and reusable outside a terminal.
pub trait OutputSink {
  fn print(&self, message: &str);
  fn warning(&self, message: &str);
}

/// Default sink: plain stdout/stderr.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
  fn print(&self, message: &str) {
    println!("{message}");
  }

  fn warning(&self, message: &str) {
    eprintln!("warning: {message}");
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
  #[error("Unknown function: {0}")]
  UnknownFunction(String),

  #[error("Division by zero")]
  DivisionByZero,

  #[error("Modulo by zero")]
  ModuloByZero,

  #[error("For loop requires an array, got {0}")]
  NotIterable(&'static str),

  /// Raised by the `error(...)` builtin.
  #[error("{0}")]
  Aborted(String),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Control-flow signal threaded through statement evaluation.
enum Flow {
  Normal,
  Return(Value),
}

/// A script-defined function or task body. Bodies are borrowed from the
/// AST, which outlives the interpreter.
#[derive(Clone)]
struct UserFn<'a> {
  params: Vec<String>,
  body: &'a Block,
}

pub struct Interpreter<'a> {
  env: Environment,
  config: BuildConfig,
  functions: HashMap<String, UserFn<'a>>,
  sink: Box<dyn OutputSink>,
}

impl Default for Interpreter<'_> {
  fn default() -> Self {
    Self::new()
  }
}

impl<'a> Interpreter<'a> {
  pub fn new() -> Self {
    Self::with_sink(Box::new(StdoutSink))
  }

  pub fn with_sink(sink: Box<dyn OutputSink>) -> Self {
    Self {
      env: Environment::new(),
      config: BuildConfig::default(),
      functions: HashMap::new(),
      sink,
    }
  }

  /// Inject a caller-provided variable (e.g. `builddir`, `buildtype`)
  /// before evaluation.
  pub fn set_variable(&mut self, name: &str, value: &str) {
    self.env.define_global(name, Value::Str(value.to_string()));
    self.config.variables.insert(name.to_string(), value.to_string());
  }

  pub fn get_variable(&self, name: &str) -> String {
    self.env.get(name).map(|v| v.to_string()).unwrap_or_default()
  }

  /// Evaluate a script into its build configuration.
  pub fn execute(&mut self, ast: &'a Ast) -> EvalResult<BuildConfig> {
    let variables = std::mem::take(&mut self.config.variables);
    self.config = BuildConfig {
      variables,
      ..Default::default()
    };

    self.env.define_global("platform", Value::Str(Os::current().as_str().to_string()));
    self.env.define_global("arch", Value::Str(Arch::current().as_str().to_string()));

    for stmt in &ast.statements {
      // a top-level return simply stops evaluation
      if let Flow::Return(_) = self.eval_stmt(stmt)? {
        break;
      }
    }

    debug!(
      project = %self.config.project_name,
      targets = self.config.targets.len(),
      "script evaluated"
    );
    Ok(self.config.clone())
  }

  fn eval_stmt(&mut self, stmt: &'a Stmt) -> EvalResult<Flow> {
    match stmt {
      Stmt::Assign { name, value } => {
        let value = self.eval_expr(value)?;
        self.env.set(name, value);
        Ok(Flow::Normal)
      }
      Stmt::Project { name, body } => self.eval_project(name, body),
      Stmt::Target { name, kind, body } => self.eval_target(name, kind, body),
      Stmt::Compiler { body } => self.eval_compiler(body),
      Stmt::Dependency { name, body } => self.eval_dependency(name, body),
      Stmt::Task { name, body } => {
        self.functions.insert(
          format!("task_{name}"),
          UserFn {
            params: Vec::new(),
            body,
          },
        );
        // marker for task discovery from script code
        self
          .env
          .define_global(&format!("__task_{name}"), Value::Str(name.clone()));
        Ok(Flow::Normal)
      }
      Stmt::If {
        condition,
        then_block,
        else_block,
      } => {
        if self.eval_expr(condition)?.truthy() {
          self.eval_block(then_block)
        } else if let Some(else_block) = else_block {
          self.eval_block(else_block)
        } else {
          Ok(Flow::Normal)
        }
      }
      Stmt::Unless { condition, body } => {
        if !self.eval_expr(condition)?.truthy() {
          self.eval_block(body)
        } else {
          Ok(Flow::Normal)
        }
      }
      Stmt::For { var, iterable, body } => {
        let items = match self.eval_expr(iterable)? {
          Value::Array(items) => items,
          other => return Err(EvalError::NotIterable(other.type_name())),
        };

        self.env.push_scope();
        for item in items {
          self.env.define(var, item);
          match self.eval_block(body) {
            Ok(Flow::Normal) => {}
            other => {
              self.env.pop_scope();
              return other;
            }
          }
        }
        self.env.pop_scope();
        Ok(Flow::Normal)
      }
      Stmt::FnDef { name, params, body } => {
        self.functions.insert(
          name.clone(),
          UserFn {
            params: params.clone(),
            body,
          },
        );
        Ok(Flow::Normal)
      }
      Stmt::Return(value) => {
        let value = match value {
          Some(expr) => self.eval_expr(expr)?,
          None => Value::Nil,
        };
        Ok(Flow::Return(value))
      }
      Stmt::Expr(expr) => {
        self.eval_expr(expr)?;
        Ok(Flow::Normal)
      }
    }
  }

  fn eval_block(&mut self, block: &'a Block) -> EvalResult<Flow> {
    for stmt in &block.statements {
      if let Flow::Return(value) = self.eval_stmt(stmt)? {
        return Ok(Flow::Return(value));
      }
    }
    Ok(Flow::Normal)
  }

  fn eval_project(&mut self, name: &str, body: &'a Block) -> EvalResult<Flow> {
    self.config.project_name = name.to_string();

    self.env.push_scope();
    let flow = self.eval_block(body)?;

    if let Some(version) = self.local_string("version") {
      self.config.version = version;
    }
    if let Some(lang) = self.local_string("lang") {
      self.config.language = lang;
    }
    if let Some(std) = self.local_string("std") {
      self.config.standard = std;
    }

    self.env.pop_scope();
    Ok(flow)
  }

  fn eval_target(&mut self, name: &str, kind: &str, body: &'a Block) -> EvalResult<Flow> {
    let kind = match kind {
      "shared_library" => TargetKind::SharedLibrary,
      "library" | "static_library" => TargetKind::StaticLibrary,
      _ => TargetKind::Executable,
    };
    let mut target = Target {
      name: name.to_string(),
      kind,
      ..Default::default()
    };

    self.env.push_scope();
    let flow = self.eval_block(body)?;

    target.sources = self.local_string_list("sources");
    target.includes = self.local_string_list("includes");
    target.flags = self.local_string_list("flags");
    target.link_flags = self.local_string_list("link_flags");
    target.dependencies = self.local_string_list("deps");
    target.defines = parse_defines(&self.local_string_list("defines"));

    self.env.pop_scope();
    self.config.targets.push(target);
    Ok(flow)
  }

  fn eval_compiler(&mut self, body: &'a Block) -> EvalResult<Flow> {
    self.env.push_scope();
    let flow = self.eval_block(body)?;

    let flags = self.local_string_list("flags");
    self.config.global_flags.extend(flags);
    let warnings = self.local_string_list("warnings");
    self.config.global_flags.extend(warnings);

    if let Some(cc) = self.local_string("cc") {
      self.config.compiler = cc;
    }
    if let Some(cxx) = self.local_string("cxx") {
      self.config.compiler = cxx;
    }

    self.env.pop_scope();
    Ok(flow)
  }

  fn eval_dependency(&mut self, name: &str, body: &'a Block) -> EvalResult<Flow> {
    let mut dependency = Dependency {
      name: name.to_string(),
      ..Default::default()
    };

    self.env.push_scope();
    let flow = self.eval_block(body)?;

    if let Some(version) = self.local_string("version") {
      dependency.version = version;
    }
    if let Some(kind) = self.local_string("kind") {
      dependency.kind = DependencyKind::parse(&kind);
    }
    dependency.include_dirs = self.local_string_list("include_dirs");
    dependency.link_dirs = self.local_string_list("link_dirs");
    dependency.libraries = self.local_string_list("libraries");

    self.env.pop_scope();
    self.config.dependencies.push(dependency);
    Ok(flow)
  }

  fn eval_expr(&mut self, expr: &'a Expr) -> EvalResult<Value> {
    match expr {
      Expr::Str(s) => Ok(Value::Str(s.clone())),
      Expr::Number { value, .. } => Ok(Value::Number(*value)),
      Expr::Bool(b) => Ok(Value::Bool(*b)),
      Expr::Nil => Ok(Value::Nil),
      // symbols read as enum-ish shorthand but are just strings
      Expr::Symbol(name) => Ok(Value::Str(name.clone())),
      Expr::Ident(name) => Ok(self.resolve_ident(name)),
      Expr::Array(elements) => {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
          values.push(self.eval_expr(element)?);
        }
        Ok(Value::Array(values))
      }
      Expr::Hash(pairs) => {
        let mut map = BTreeMap::new();
        for (key, value) in pairs {
          // bare identifier keys read as literal names: {a: 1} keys on "a"
          let key = match key {
            Expr::Ident(name) => name.clone(),
            other => self.eval_expr(other)?.to_string(),
          };
          map.insert(key, self.eval_expr(value)?);
        }
        Ok(Value::Hash(map))
      }
      Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
      Expr::Unary { op, operand } => {
        let operand = self.eval_expr(operand)?;
        Ok(match op {
          UnOp::Neg => Value::Number(-operand.as_number()),
          UnOp::Not => Value::Bool(!operand.truthy()),
        })
      }
      Expr::Call { name, args } => {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
          values.push(self.eval_expr(arg)?);
        }
        self.call_function(name, values)
      }
      Expr::Member { object, name } => {
        let object = self.eval_expr(object)?;
        Ok(eval_member(&object, name))
      }
      Expr::Index { object, index } => {
        let object = self.eval_expr(object)?;
        let index = self.eval_expr(index)?;
        Ok(eval_index(&object, &index))
      }
    }
  }

  fn resolve_ident(&self, name: &str) -> Value {
    if let Some(value) = self.env.get(name) {
      return value.clone();
    }
    // identifiers naming functions are usable as first-class values
    if self.functions.contains_key(name) || builtins::is_builtin(name) {
      return Value::NativeFn(name.to_string());
    }
    Value::Nil
  }

  fn eval_binary(&mut self, op: BinOp, left: &'a Expr, right: &'a Expr) -> EvalResult<Value> {
    // and/or evaluate the right side only when the left doesn't decide
    if op == BinOp::And {
      let left = self.eval_expr(left)?;
      if !left.truthy() {
        return Ok(Value::Bool(false));
      }
      return Ok(Value::Bool(self.eval_expr(right)?.truthy()));
    }
    if op == BinOp::Or {
      let left = self.eval_expr(left)?;
      if left.truthy() {
        return Ok(Value::Bool(true));
      }
      return Ok(Value::Bool(self.eval_expr(right)?.truthy()));
    }

    let left = self.eval_expr(left)?;
    let right = self.eval_expr(right)?;

    match op {
      // + concatenates as soon as either side is a string
      BinOp::Add if left.is_string() || right.is_string() => {
        Ok(Value::Str(format!("{left}{right}")))
      }
      BinOp::Add => Ok(Value::Number(left.as_number() + right.as_number())),
      BinOp::Sub => Ok(Value::Number(left.as_number() - right.as_number())),
      BinOp::Mul => Ok(Value::Number(left.as_number() * right.as_number())),
      BinOp::Div => {
        let divisor = right.as_number();
        if divisor == 0.0 {
          return Err(EvalError::DivisionByZero);
        }
        Ok(Value::Number(left.as_number() / divisor))
      }
      BinOp::Rem => {
        let divisor = right.as_number() as i64;
        if divisor == 0 {
          return Err(EvalError::ModuloByZero);
        }
        Ok(Value::Number((left.as_number() as i64 % divisor) as f64))
      }
      BinOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
      BinOp::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
      BinOp::Lt => Ok(Value::Bool(left.as_number() < right.as_number())),
      BinOp::Gt => Ok(Value::Bool(left.as_number() > right.as_number())),
      BinOp::LtEq => Ok(Value::Bool(left.as_number() <= right.as_number())),
      BinOp::GtEq => Ok(Value::Bool(left.as_number() >= right.as_number())),
      BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
  }

  fn call_function(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    if let Some(func) = self.functions.get(name).cloned() {
      // functions chain to the globals, not to the caller's scope
      self.env.push_function_scope();
      for (param, arg) in func.params.iter().zip(args) {
        self.env.define(param, arg);
      }
      let flow = self.eval_block(func.body);
      self.env.pop_scope();

      return match flow? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => Ok(Value::Nil),
      };
    }

    match builtins::call(self.sink.as_ref(), name, &args) {
      Some(result) => result,
      None => Err(EvalError::UnknownFunction(name.to_string())),
    }
  }

  fn local_string(&self, name: &str) -> Option<String> {
    self.env.get_local(name).map(|v| v.to_string())
  }

  fn local_string_list(&self, name: &str) -> Vec<String> {
    match self.env.get_local(name) {
      Some(Value::Array(items)) => items.iter().map(|v| v.to_string()).collect(),
      Some(Value::Str(s)) => vec![s.clone()],
      _ => Vec::new(),
    }
  }
}

/// `"KEY=VAL"` and bare `"KEY"` entries become define pairs.
fn parse_defines(entries: &[String]) -> BTreeMap<String, String> {
  let mut defines = BTreeMap::new();
  for entry in entries {
    match entry.split_once('=') {
      Some((key, value)) => defines.insert(key.to_string(), value.to_string()),
      None => defines.insert(entry.clone(), String::new()),
    };
  }
  defines
}

fn values_equal(left: &Value, right: &Value) -> bool {
  match (left, right) {
    (Value::Str(a), Value::Str(b)) => a == b,
    (Value::Number(a), Value::Number(b)) => a == b,
    (Value::Bool(a), Value::Bool(b)) => a == b,
    // mixed types fall back to rendered equality
    _ => left.to_string() == right.to_string(),
  }
}

fn eval_member(object: &Value, name: &str) -> Value {
  match object {
    Value::Hash(map) => map.get(name).cloned().unwrap_or(Value::Nil),
    Value::Array(items) => match name {
      "length" | "size" => Value::Number(items.len() as f64),
      "empty" => Value::Bool(items.is_empty()),
      "first" => items.first().cloned().unwrap_or(Value::Nil),
      "last" => items.last().cloned().unwrap_or(Value::Nil),
      _ => Value::Nil,
    },
    Value::Str(s) => match name {
      "length" | "size" => Value::Number(s.chars().count() as f64),
      "empty" => Value::Bool(s.is_empty()),
      "upper" => Value::Str(s.to_uppercase()),
      "lower" => Value::Str(s.to_lowercase()),
      _ => Value::Nil,
    },
    _ => Value::Nil,
  }
}

fn eval_index(object: &Value, index: &Value) -> Value {
  match (object, index) {
    (Value::Array(items), Value::Number(n)) => {
      match wrap_index(*n, items.len()) {
        Some(i) => items[i].clone(),
        None => Value::Nil,
      }
    }
    (Value::Hash(map), Value::Str(key)) => map.get(key).cloned().unwrap_or(Value::Nil),
    (Value::Str(s), Value::Number(n)) => {
      let chars: Vec<char> = s.chars().collect();
      match wrap_index(*n, chars.len()) {
        Some(i) => Value::Str(chars[i].to_string()),
        None => Value::Nil,
      }
    }
    _ => Value::Nil,
  }
}

/// Negative indices count from the end; out of range is `None`.
fn wrap_index(index: f64, len: usize) -> Option<usize> {
  let mut i = index as i64;
  if i < 0 {
    i += len as i64;
  }
  if i >= 0 && (i as usize) < len {
    Some(i as usize)
  } else {
    None
  }
}

#[cfg(test)]
mod tests;
