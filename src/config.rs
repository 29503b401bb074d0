use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User preferences persisted as `prefs.toml` in the platform config directory.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub theme_name: Option<String>,
  /// Folder the save prompt starts in, and the one `Ctrl+O` opens.
  pub download_dir: Option<PathBuf>,
  /// Explicit yt-dlp executable; falls back to `yt-dlp` on `PATH`.
  pub ytdlp_path: Option<PathBuf>,
  /// Ring the terminal bell when a stream download finishes.
  pub notify_on_complete: Option<bool>,
  /// Default tracing filter, e.g. `info` or `ytgrab=debug`. `RUST_LOG` wins.
  pub log_level: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "ytgrab")
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = project_dirs() {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        let config_file = config_dir.join("prefs.toml");
        if let Ok(content) = toml::to_string(self) {
          let _ = std::fs::write(config_file, content);
        }
      }
    }
  }

  /// Resolved download directory: configured value, then the user's Downloads
  /// folder, then the current directory.
  pub fn download_dir(&self) -> PathBuf {
    if let Some(dir) = &self.download_dir {
      return dir.clone();
    }
    UserDirs::new().and_then(|u| u.download_dir().map(|d| d.to_path_buf())).unwrap_or_else(|| PathBuf::from("."))
  }

  pub fn notify_on_complete(&self) -> bool {
    self.notify_on_complete.unwrap_or(true)
  }

  pub fn log_level(&self) -> &str {
    self.log_level.as_deref().unwrap_or("info")
  }
}

/// Directory for rolling log files. `None` when no home directory can be resolved.
pub fn log_dir() -> Option<PathBuf> {
  project_dirs().map(|p| p.data_local_dir().join("logs"))
}
