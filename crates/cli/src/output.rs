//! Terminal output helpers.

use std::time::Duration;

use owo_colors::OwoColorize;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const ARROW: &str = "→";
}

pub fn header(text: &str) {
  println!("{}", text.bold());
}

pub fn info(label: &str, value: &str) {
  println!("  {} {label}: {value}", symbols::ARROW.cyan());
}

pub fn success(text: &str) {
  println!("{} {}", symbols::SUCCESS.green().bold(), text);
}

pub fn failure(text: &str) {
  eprintln!("{} {}", symbols::ERROR.red().bold(), text);
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs_f64();
  if secs >= 60.0 {
    format!("{}m {:.1}s", (secs / 60.0) as u64, secs % 60.0)
  } else {
    format!("{secs:.2}s")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn durations_format_human_readably() {
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(90)), "1m 30.0s");
  }
}
