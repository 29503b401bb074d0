//! Desktop integration for the download folder.
//!
//! Opens a directory in the platform file manager: Explorer on Windows, Finder via
//! `open` on macOS, and `xdg-open` everywhere else.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::info;

/// Program used to reveal a folder on the current platform.
pub fn file_manager_command() -> &'static str {
  if cfg!(target_os = "windows") {
    "explorer"
  } else if cfg!(target_os = "macos") {
    "open"
  } else {
    "xdg-open"
  }
}

/// Open `dir` in the file manager without blocking the caller.
pub fn open_in_file_manager(dir: &Path) -> Result<()> {
  if !dir.is_dir() {
    bail!("Folder does not exist: {}", dir.display());
  }

  let program = file_manager_command();
  info!(dir = %dir.display(), program, "window: opening folder");
  let mut child = Command::new(program)
    .arg(dir)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
    .with_context(|| format!("Failed to launch {}", program))?;

  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}
