use std::cell::RefCell;
use std::rc::Rc;

use indoc::indoc;

use iris_core::config::{DependencyKind, TargetKind};

use super::*;
use crate::parser::parse;

#[derive(Clone, Default)]
struct Recorder {
  lines: Rc<RefCell<Vec<String>>>,
  warnings: Rc<RefCell<Vec<String>>>,
}

impl OutputSink for Recorder {
  fn print(&self, message: &str) {
    self.lines.borrow_mut().push(message.to_string());
  }

  fn warning(&self, message: &str) {
    self.warnings.borrow_mut().push(message.to_string());
  }
}

fn interpret(source: &str) -> BuildConfig {
  let ast = parse(source).unwrap();
  Interpreter::new().execute(&ast).unwrap()
}

/// Evaluate a script and return the rendered value of `x`.
fn eval_x(source: &str) -> String {
  let ast = parse(source).unwrap();
  let mut interp = Interpreter::new();
  interp.execute(&ast).unwrap();
  interp.get_variable("x")
}

#[test]
fn project_block_fills_config() {
  let config = interpret(indoc! {r#"
    project "p" do
      version = "0.1"
      lang = :cpp
      std = "c++17"
    end
  "#});

  assert_eq!(config.project_name, "p");
  assert_eq!(config.version, "0.1");
  assert_eq!(config.language, "cpp");
  assert_eq!(config.standard, "c++17");
}

#[test]
fn target_block_builds_target() {
  let config = interpret(indoc! {r#"
    executable "app" do
      sources = ["src/main.cpp", "src/util.cpp"]
      includes = ["include"]
      flags = ["-O2"]
      link_flags = ["-lm"]
      deps = ["core"]
      defines = ["VERSION=3", "NDEBUG"]
    end
    library "core" do
      sources = ["src/core.cpp"]
    end
  "#});

  assert_eq!(config.targets.len(), 2);
  let app = config.target("app").unwrap();
  assert_eq!(app.kind, TargetKind::Executable);
  assert_eq!(app.sources, vec!["src/main.cpp", "src/util.cpp"]);
  assert_eq!(app.includes, vec!["include"]);
  assert_eq!(app.flags, vec!["-O2"]);
  assert_eq!(app.link_flags, vec!["-lm"]);
  assert_eq!(app.dependencies, vec!["core"]);
  assert_eq!(app.defines["VERSION"], "3");
  assert_eq!(app.defines["NDEBUG"], "");

  // `library` is a synonym for `static_library`
  assert_eq!(config.target("core").unwrap().kind, TargetKind::StaticLibrary);
}

#[test]
fn compiler_block_merges_into_globals() {
  let config = interpret(indoc! {r#"
    compiler do
      cxx = "clang++"
      flags = ["-O2"]
      warnings = ["-Wall", "-Wextra"]
    end
  "#});

  assert_eq!(config.compiler, "clang++");
  assert_eq!(config.global_flags, vec!["-O2", "-Wall", "-Wextra"]);
}

#[test]
fn dependency_block_builds_dependency() {
  let config = interpret(indoc! {r#"
    dependency "zlib" do
      version = "1.3"
      kind = "pkg-config"
      include_dirs = ["/opt/zlib/include"]
      link_dirs = ["/opt/zlib/lib"]
      libraries = ["z"]
    end
  "#});

  let dep = config.dependency("zlib").unwrap();
  assert_eq!(dep.version, "1.3");
  assert_eq!(dep.kind, DependencyKind::PkgConfig);
  assert_eq!(dep.libraries, vec!["z"]);
}

#[test]
fn arithmetic_and_precedence() {
  assert_eq!(eval_x("x = 2 + 3 * 4"), "14");
  assert_eq!(eval_x("x = (2 + 3) * 4"), "20");
  assert_eq!(eval_x("x = 10 / 4"), "2.5");
  assert_eq!(eval_x("x = 7 % 3"), "1");
  assert_eq!(eval_x("x = -(2 + 1)"), "-3");
}

#[test]
fn string_concatenation_coerces() {
  assert_eq!(eval_x(r#"x = "a" + "b""#), "ab");
  assert_eq!(eval_x(r#"x = "x" + 1"#), "x1");
  assert_eq!(eval_x(r#"x = 1 + "x""#), "1x");
}

#[test]
fn comparisons_and_logic() {
  assert_eq!(eval_x("x = 2 + 3 * 4 == 14"), "true");
  assert_eq!(eval_x("x = 3 < 2"), "false");
  assert_eq!(eval_x(r#"x = "a" == "a""#), "true");
  assert_eq!(eval_x(r#"x = "1" == 1"#), "true");
  assert_eq!(eval_x("x = not nil"), "true");
  assert_eq!(eval_x("x = true and false"), "false");
  assert_eq!(eval_x("x = false or true"), "true");
}

#[test]
fn short_circuit_skips_right_side() {
  // the right operand would raise Unknown function if evaluated
  assert_eq!(eval_x("x = false and undefined_fn()"), "false");
  assert_eq!(eval_x("x = true or undefined_fn()"), "true");
}

#[test]
fn member_access_forms() {
  assert_eq!(eval_x("x = [1, 2, 3].length"), "3");
  assert_eq!(eval_x("x = [1, 2, 3].first"), "1");
  assert_eq!(eval_x("x = [].empty"), "true");
  assert_eq!(eval_x(r#"x = "hi".upper"#), "HI");
  assert_eq!(eval_x(r#"x = "Hi".lower"#), "hi");
  assert_eq!(eval_x(r#"x = "hi".size"#), "2");
  assert_eq!(eval_x("x = {a: 1, b: 2}.a"), "1");
  assert_eq!(eval_x("x = {a: 1}.missing"), "nil");
}

#[test]
fn index_access_with_negative_wrap() {
  assert_eq!(eval_x("x = [1, 2, 3][0]"), "1");
  assert_eq!(eval_x("x = [1, 2, 3][-1]"), "3");
  assert_eq!(eval_x("x = [1, 2, 3][5]"), "nil");
  assert_eq!(eval_x("x = [][-1]"), "nil");
  assert_eq!(eval_x(r#"x = {a: 1, b: 2}["a"]"#), "1");
  assert_eq!(eval_x(r#"x = "abc"[-1]"#), "c");
  assert_eq!(eval_x(r#"x = "abc"[1]"#), "b");
}

#[test]
fn division_and_modulo_by_zero_fail() {
  let ast = parse("x = 1 / 0").unwrap();
  assert_eq!(
    Interpreter::new().execute(&ast),
    Err(EvalError::DivisionByZero)
  );

  let ast = parse("x = 1 % 0").unwrap();
  assert_eq!(Interpreter::new().execute(&ast), Err(EvalError::ModuloByZero));
}

#[test]
fn unknown_function_fails() {
  let ast = parse("nope()").unwrap();
  assert_eq!(
    Interpreter::new().execute(&ast),
    Err(EvalError::UnknownFunction("nope".to_string()))
  );
}

#[test]
fn error_builtin_aborts_evaluation() {
  let ast = parse(r#"error("missing toolchain")"#).unwrap();
  assert_eq!(
    Interpreter::new().execute(&ast),
    Err(EvalError::Aborted("missing toolchain".to_string()))
  );
}

#[test]
fn conditionals_share_the_enclosing_scope() {
  let config = interpret(indoc! {r#"
    executable "app" do
      if true do
        sources = ["a.cpp"]
      end
      unless false do
        flags = ["-g"]
      end
    end
  "#});

  let app = config.target("app").unwrap();
  assert_eq!(app.sources, vec!["a.cpp"]);
  assert_eq!(app.flags, vec!["-g"]);
}

#[test]
fn else_branch_taken_when_condition_is_false() {
  assert_eq!(
    eval_x(indoc! {r#"
      if false do
        x = 1
      else do
        x = 2
      end
    "#}),
    "2"
  );
}

#[test]
fn for_loop_accumulates_and_scopes_its_variable() {
  let ast = parse(indoc! {r#"
    total = 0
    for n in [1, 2, 3] do
      total += n
    end
  "#})
  .unwrap();
  let mut interp = Interpreter::new();
  interp.execute(&ast).unwrap();

  assert_eq!(interp.get_variable("total"), "6");
  // the loop variable does not leak out of the loop
  assert_eq!(interp.get_variable("n"), "");
}

#[test]
fn for_over_non_array_fails() {
  let ast = parse("for a in 42 do\nend").unwrap();
  assert_eq!(
    Interpreter::new().execute(&ast),
    Err(EvalError::NotIterable("number"))
  );
}

#[test]
fn functions_return_values() {
  assert_eq!(
    eval_x(indoc! {r#"
      fn double(n) do
        return n * 2
      end
      x = double(21)
    "#}),
    "42"
  );
}

#[test]
fn function_without_return_yields_nil() {
  assert_eq!(
    eval_x(indoc! {r#"
      fn noop() do
        y = 1
      end
      x = noop()
    "#}),
    "nil"
  );
}

#[test]
fn functions_see_globals_but_not_caller_locals() {
  assert_eq!(
    eval_x(indoc! {r#"
      greeting = "hello"
      fn inner() do
        return greeting + " " + hidden
      end
      fn outer() do
        hidden = "secret"
        return inner()
      end
      x = outer()
    "#}),
    // `hidden` lives in outer's scope, which inner cannot see
    "hello nil"
  );
}

#[test]
fn identifiers_naming_functions_are_first_class_tags() {
  assert_eq!(eval_x("x = glob"), "__func:glob");
  assert_eq!(
    eval_x(indoc! {r#"
      fn f() do
      end
      x = f
    "#}),
    "__func:f"
  );
  // unresolved identifiers are nil, not an error
  assert_eq!(eval_x("x = never_bound"), "nil");
}

#[test]
fn tasks_register_as_callables() {
  let sink = Recorder::default();
  let ast = parse(indoc! {r#"
    task :hello do
      print("from task")
    end
    task_hello()
    x = __task_hello
  "#})
  .unwrap();

  let mut interp = Interpreter::with_sink(Box::new(sink.clone()));
  interp.execute(&ast).unwrap();

  assert_eq!(*sink.lines.borrow(), vec!["from task"]);
  assert_eq!(interp.get_variable("x"), "hello");
}

#[test]
fn print_and_warning_route_through_the_sink() {
  let sink = Recorder::default();
  let ast = parse(indoc! {r#"
    print("a", 1, true)
    warning("careful")
  "#})
  .unwrap();

  Interpreter::with_sink(Box::new(sink.clone())).execute(&ast).unwrap();

  assert_eq!(*sink.lines.borrow(), vec!["a 1 true"]);
  assert_eq!(*sink.warnings.borrow(), vec!["careful"]);
}

#[test]
fn platform_and_arch_are_bound_and_callable() {
  let bound = eval_x("x = platform");
  assert!(!bound.is_empty());
  assert_eq!(eval_x("x = platform()"), bound);
  assert_eq!(eval_x("x = arch()"), eval_x("x = arch"));
}

#[test]
fn injected_variables_are_visible_and_recorded() {
  let ast = parse(r#"x = builddir + "/out""#).unwrap();
  let mut interp = Interpreter::new();
  interp.set_variable("builddir", "build");
  let config = interp.execute(&ast).unwrap();

  assert_eq!(interp.get_variable("x"), "build/out");
  assert_eq!(config.variables["builddir"], "build");
}

#[test]
fn string_helpers() {
  assert_eq!(eval_x(r#"x = join(["a", "b", "c"], "-")"#), "a-b-c");
  assert_eq!(eval_x(r#"x = split("a,b,c", ",").length"#), "3");
  assert_eq!(eval_x(r#"x = split("a,b,", ",").length"#), "2");
  assert_eq!(eval_x(r#"x = contains(["a", "b"], "b")"#), "true");
  assert_eq!(eval_x(r#"x = contains(["a", "b"], "z")"#), "false");
  assert_eq!(eval_x(r#"x = len("hello")"#), "5");
  assert_eq!(eval_x("x = len([1, 2])"), "2");
}

#[test]
fn path_helpers() {
  assert_eq!(eval_x(r#"x = dirname("src/main.cpp")"#), "src");
  assert_eq!(eval_x(r#"x = basename("src/main.cpp")"#), "main.cpp");
  assert_eq!(eval_x(r#"x = extension("src/main.cpp")"#), ".cpp");
  assert_eq!(eval_x(r#"x = extension("Makefile")"#), "");
}

#[test]
fn file_builtins_round_trip() {
  let dir = tempfile::TempDir::new().unwrap();
  let path = dir.path().join("note.txt");
  let script = format!(
    indoc! {r#"
      missing = file_exists("{path}")
      ok = write_file("{path}", "hello")
      back = read_file("{path}")
      x = file_exists("{path}")
    "#},
    path = path.display()
  );

  let ast = parse(&script).unwrap();
  let mut interp = Interpreter::new();
  interp.execute(&ast).unwrap();

  assert_eq!(interp.get_variable("missing"), "false");
  assert_eq!(interp.get_variable("ok"), "true");
  assert_eq!(interp.get_variable("back"), "hello");
  assert_eq!(interp.get_variable("x"), "true");
}

#[test]
fn glob_builtin_expands_patterns() {
  let dir = tempfile::TempDir::new().unwrap();
  let src = dir.path().join("src");
  std::fs::create_dir_all(&src).unwrap();
  std::fs::write(src.join("a.c"), "").unwrap();
  std::fs::write(src.join("b.c"), "").unwrap();
  std::fs::write(src.join("c.h"), "").unwrap();

  let script = format!("x = glob(\"{}/src/*.c\").length", dir.path().display());
  assert_eq!(eval_x(&script), "2");
}

#[cfg(unix)]
#[test]
fn shell_and_run_builtins() {
  assert_eq!(eval_x(r#"x = shell("echo hi")"#), "hi");
  assert_eq!(eval_x(r#"x = run("exit 7")"#), "7");
  assert_eq!(eval_x(r#"x = run("true")"#), "0");
}

#[test]
fn env_builtin_reads_process_environment() {
  std::env::set_var("IRIS_INTERP_TEST_VAR", "present");
  assert_eq!(eval_x(r#"x = env("IRIS_INTERP_TEST_VAR")"#), "present");
  assert_eq!(eval_x(r#"x = env("IRIS_INTERP_TEST_VAR_MISSING")"#), "");
}

#[test]
fn top_level_return_stops_evaluation() {
  let config = interpret(indoc! {r#"
    project "early" do
    end
    return
    project "late" do
    end
  "#});
  assert_eq!(config.project_name, "early");
}

#[test]
fn evaluation_is_deterministic() {
  let source = indoc! {r#"
    project "demo" do
      version = "1.0"
      lang = :cpp
    end
    compiler do
      flags = ["-O2", "-g"]
    end
    values = {b: 2, a: 1}
    executable "app" do
      sources = ["src/main.cpp"]
      defines = ["ID=" + values["a"]]
      if 1 + 1 == 2 do
        flags = ["-DEVEN"]
      else do
        flags = ["-DODD"]
      end
    end
  "#};

  let ast = parse(source).unwrap();
  let first = Interpreter::new().execute(&ast).unwrap();
  let second = Interpreter::new().execute(&ast).unwrap();
  assert_eq!(first, second);
  assert_eq!(first.targets.len(), 1);
  assert_eq!(first.targets[0].defines["ID"], "1");
  assert_eq!(first.targets[0].flags, vec!["-DEVEN"]);
}
