use ratatui::widgets::ListState;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::constants;
use crate::models::{CaptionTrack, StreamInfo};
use crate::session::{Action, DownloadStart, SaveFilter, Session};
use crate::theme::{THEMES, Theme, theme_index};
use crate::window;
use crate::youtube::VideoClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Streams,
  Captions,
  SavePrompt,
}

/// What the open save prompt will download.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveTarget {
  Stream(StreamInfo),
  Caption(CaptionTrack),
}

/// Editable destination path shown in the save popup.
#[derive(Debug, Clone)]
pub struct SaveDialog {
  pub target: SaveTarget,
  pub filter: SaveFilter,
  pub path: String,
  pub cursor: usize,
  pub scroll: usize,
  /// Mode to return to once the prompt closes.
  pub return_mode: AppMode,
}

impl SaveDialog {
  pub fn title(&self) -> String {
    let what = match self.target {
      SaveTarget::Stream(_) => "stream",
      SaveTarget::Caption(_) => "captions",
    };
    format!(" Save {} as ({}) ", what, self.filter.description)
  }
}

pub struct App<C> {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme_index: usize,
  pub session: Session<C>,
  pub stream_state: ListState,
  pub caption_state: ListState,
  pub save: Option<SaveDialog>,
  pub last_error: Option<String>,
  /// Informational message, lower priority than progress and errors.
  pub info_message: Option<String>,
  pub should_quit: bool,
  pub started_at: Instant,
  config: Config,
  error_time: Option<Instant>,
}

impl<C: VideoClient> App<C> {
  pub fn new(session: Session<C>, config: Config) -> Self {
    let input = session.query().to_string();
    let cursor_position = input.chars().count();
    Self {
      input,
      cursor_position,
      input_scroll: 0,
      mode: AppMode::Input,
      theme_index: theme_index(config.theme_name.as_deref()),
      session,
      stream_state: ListState::default(),
      caption_state: ListState::default(),
      save: None,
      last_error: None,
      info_message: None,
      should_quit: false,
      started_at: Instant::now(),
      config,
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    // theme_index is bounded by theme_index() and the modulo in next_theme().
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    self.config.save();
  }

  pub fn download_dir(&self) -> PathBuf {
    self.config.download_dir()
  }

  // --- Messages ---

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after the configured display time.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_display_secs)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  // --- Session glue ---

  /// Push the edited text into the session.
  pub fn sync_query(&mut self) {
    self.session.set_query(self.input.clone());
  }

  /// Apply pending background events. Returns whether a redraw is due.
  pub fn poll(&mut self) -> bool {
    let changed = self.session.poll();
    if changed {
      self.sync_from_session();
    }
    changed
  }

  /// Pull results, errors and saved paths out of the session after events were applied.
  pub fn sync_from_session(&mut self) {
    if let Some(err) = self.session.take_error() {
      self.set_error(err);
    }
    if let Some(path) = self.session.take_last_saved() {
      self.info_message = Some(format!("Saved {}", path.display()));
    }

    let stream_count = self.session.streams().map_or(0, |s| s.len());
    clamp_selection(&mut self.stream_state, stream_count);
    let caption_count = self.session.captions().map_or(0, |c| c.len());
    clamp_selection(&mut self.caption_state, caption_count);

    if !self.session.is_data_available() && matches!(self.mode, AppMode::Streams | AppMode::Captions) {
      self.mode = AppMode::Input;
    }
  }

  pub fn trigger_fetch(&mut self) {
    self.sync_query();
    match self.session.fetch_metadata() {
      Ok(_) => {
        self.clear_error();
        self.info_message = None;
        self.stream_state.select(None);
        self.caption_state.select(None);
      }
      Err(e) => self.set_error(format!("{:#}", e)),
    }
  }

  /// Human description of the running action, if any.
  pub fn status_message(&self) -> Option<String> {
    match self.session.active()? {
      Action::Fetch => Some(format!("Fetching {}…", self.session.fetching_id().unwrap_or_default())),
      Action::Stream => Some("Downloading stream…".to_string()),
      Action::Caption => Some("Downloading captions…".to_string()),
    }
  }

  // --- Selection ---

  pub fn selected_stream(&self) -> Option<&StreamInfo> {
    let i = self.stream_state.selected()?;
    self.session.streams()?.iter().nth(i)
  }

  pub fn selected_caption(&self) -> Option<&CaptionTrack> {
    let i = self.caption_state.selected()?;
    self.session.captions()?.get(i)
  }

  /// Number of rows in the list the current mode navigates.
  pub fn list_len(&self) -> usize {
    match self.mode {
      AppMode::Streams => self.session.streams().map_or(0, |s| s.len()),
      AppMode::Captions => self.session.captions().map_or(0, |c| c.len()),
      _ => 0,
    }
  }

  pub fn list_state_mut(&mut self) -> Option<&mut ListState> {
    match self.mode {
      AppMode::Streams => Some(&mut self.stream_state),
      AppMode::Captions => Some(&mut self.caption_state),
      _ => None,
    }
  }

  /// Enter the stream or caption list, if there is anything to show.
  pub fn enter_list(&mut self, mode: AppMode) {
    if !self.session.is_data_available() {
      return;
    }
    self.mode = mode;
    if self.list_len() > 0
      && let Some(state) = self.list_state_mut()
      && state.selected().is_none()
    {
      state.select(Some(0));
    }
  }

  // --- Save prompt ---

  /// Open the save popup for the selected row, prefilled with the download folder and default name.
  pub fn open_save_prompt(&mut self) {
    if self.session.is_busy() {
      self.set_error("Another operation is in progress".to_string());
      return;
    }
    let (filter, target, default_name) = match self.mode {
      AppMode::Streams => {
        let Some(stream) = self.selected_stream().cloned() else { return };
        let name = self.session.stream_file_name(&stream);
        (SaveFilter::for_extension(&stream.container), SaveTarget::Stream(stream), name)
      }
      AppMode::Captions => {
        let Some(track) = self.selected_caption().cloned() else { return };
        let name = self.session.caption_file_name(&track);
        (SaveFilter::for_extension(&constants().caption_extension), SaveTarget::Caption(track), name)
      }
      _ => return,
    };
    let default_name = match default_name {
      Ok(name) => name,
      Err(e) => {
        self.set_error(format!("{:#}", e));
        return;
      }
    };

    let path = self.download_dir().join(default_name).to_string_lossy().into_owned();
    debug!(path = %path, "save prompt opened");
    self.save =
      Some(SaveDialog { cursor: path.chars().count(), path, scroll: 0, target, filter, return_mode: self.mode });
    self.mode = AppMode::SavePrompt;
  }

  /// Start the download into the path typed in the popup.
  pub fn confirm_save(&mut self) {
    let Some(dialog) = self.save.take() else { return };
    self.mode = dialog.return_mode;
    let path = PathBuf::from(dialog.path.trim());
    self.run_download(&dialog.target, Some(path));
  }

  /// Close the popup; the download operation sees a cancelled prompt.
  pub fn cancel_save(&mut self) {
    let Some(dialog) = self.save.take() else { return };
    self.mode = dialog.return_mode;
    self.run_download(&dialog.target, None);
  }

  fn run_download(&mut self, target: &SaveTarget, choice: Option<PathBuf>) {
    let mut prompt = move |_: &str, _: &SaveFilter| choice.clone();
    let result = match target {
      SaveTarget::Stream(stream) => self.session.download_media_stream(stream, &mut prompt),
      SaveTarget::Caption(track) => self.session.download_caption_track(track, &mut prompt),
    };
    match result {
      Ok(DownloadStart::Started(path)) => {
        self.clear_error();
        self.info_message = Some(format!("Saving to {}", path.display()));
      }
      Ok(DownloadStart::Cancelled) => info!("download cancelled"),
      Err(e) => self.set_error(format!("{:#}", e)),
    }
  }

  pub fn open_download_folder(&mut self) {
    let dir = self.download_dir();
    if let Err(e) = window::open_in_file_manager(&dir) {
      self.set_error(format!("{:#}", e));
    }
  }
}

fn clamp_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    Some(i) if i >= len => state.select(Some(len - 1)),
    _ => {}
  }
}
