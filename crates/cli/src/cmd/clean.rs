//! Implementation of `iris clean`.

use std::fs;
use std::path::Path;

use anyhow::Result;

use iris_core::cache::CACHE_DIR;
use iris_core::config::CONFIG_FILENAME;

use crate::output;

pub fn run(all: bool, builddir: &Path) -> Result<()> {
  output::header("Cleaning");

  if all {
    for dir in [builddir, Path::new(CACHE_DIR)] {
      if dir.exists() {
        output::info("removing", &dir.display().to_string());
        fs::remove_dir_all(dir)?;
      }
    }
  } else if builddir.exists() {
    // keep the configuration so `iris build` still works afterwards
    for entry in fs::read_dir(builddir)? {
      let entry = entry?;
      if entry.file_name() == CONFIG_FILENAME {
        continue;
      }
      output::info("removing", &entry.path().display().to_string());
      if entry.file_type()?.is_dir() {
        fs::remove_dir_all(entry.path())?;
      } else {
        fs::remove_file(entry.path())?;
      }
    }
  }

  output::success("clean complete");
  Ok(())
}
