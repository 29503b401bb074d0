//! View-state controller for one query session.
//!
//! The session owns every piece of state the UI shows: the query, the four fetched
//! entities, busy/progress flags and the last error. Operations start background
//! tasks on the tokio runtime; those tasks never touch the session directly and
//! instead send [`SessionEvent`]s over a channel. The UI loop applies them with
//! [`Session::poll`], so all mutation happens on the thread driving the UI.
//!
//! Every state-changing call returns [`Flags`], the derived values a presentation
//! layer needs to enable or disable its controls.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::filename::{caption_file_name, stream_file_name};
use crate::models::{CaptionTrack, Channel, StreamCatalog, StreamInfo, Video};
use crate::youtube::{ProgressFn, VideoClient, parse_video_id};

/// Derived state recomputed after every mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flags {
  pub fetch_enabled: bool,
  pub download_enabled: bool,
  pub is_data_available: bool,
  pub is_busy: bool,
  pub progress: f64,
  pub progress_indeterminate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Fetch,
  Stream,
  Caption,
}

impl Action {
  fn label(self) -> &'static str {
    match self {
      Action::Fetch => "fetch",
      Action::Stream => "stream download",
      Action::Caption => "caption download",
    }
  }
}

/// Messages from background tasks to the session.
#[derive(Debug)]
pub enum SessionEvent {
  Video(Video),
  Channel(Channel),
  Streams(StreamCatalog),
  Captions(Vec<CaptionTrack>),
  Progress(f64),
  /// Sent exactly once per action, on every exit path.
  Finished { action: Action, error: Option<String> },
}

/// Description of the files a save prompt should offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFilter {
  pub description: String,
  pub extension: String,
}

impl SaveFilter {
  pub fn for_extension(extension: &str) -> Self {
    Self { description: format!("{} files", extension.to_uppercase()), extension: extension.to_string() }
  }
}

/// Asks the user where to save. `None` means the user cancelled.
pub trait SavePrompt {
  fn prompt_save_path(&mut self, default_file_name: &str, filter: &SaveFilter) -> Option<PathBuf>;
}

impl<F> SavePrompt for F
where
  F: FnMut(&str, &SaveFilter) -> Option<PathBuf>,
{
  fn prompt_save_path(&mut self, default_file_name: &str, filter: &SaveFilter) -> Option<PathBuf> {
    self(default_file_name, filter)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStart {
  Started(PathBuf),
  Cancelled,
}

/// Sends `Finished` when dropped, unless [`Release::finish`] already did.
///
/// Owned by each spawned action so the session leaves its busy state even when
/// the task errors, panics, or is aborted.
struct Release {
  tx: mpsc::UnboundedSender<SessionEvent>,
  action: Action,
  sent: bool,
}

impl Release {
  fn new(tx: mpsc::UnboundedSender<SessionEvent>, action: Action) -> Self {
    Self { tx, action, sent: false }
  }

  fn finish(mut self, result: Result<()>) {
    self.sent = true;
    let error = result.err().map(|e| format!("{:#}", e));
    let _ = self.tx.send(SessionEvent::Finished { action: self.action, error });
  }
}

impl Drop for Release {
  fn drop(&mut self) {
    if !self.sent {
      let error = Some(format!("{} ended unexpectedly", self.action.label()));
      let _ = self.tx.send(SessionEvent::Finished { action: self.action, error });
    }
  }
}

pub struct Session<C> {
  client: Arc<C>,
  query: String,
  video: Option<Video>,
  channel: Option<Channel>,
  streams: Option<StreamCatalog>,
  captions: Option<Vec<CaptionTrack>>,
  busy: bool,
  progress: f64,
  progress_indeterminate: bool,
  active: Option<Action>,
  fetching: Option<String>,
  target: Option<PathBuf>,
  last_error: Option<String>,
  last_saved: Option<PathBuf>,
  notifier: Option<Box<dyn Fn() + Send>>,
  tx: mpsc::UnboundedSender<SessionEvent>,
  rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<C: VideoClient> Session<C> {
  pub fn new(client: Arc<C>, query: impl Into<String>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      client,
      query: query.into(),
      video: None,
      channel: None,
      streams: None,
      captions: None,
      busy: false,
      progress: 0.0,
      progress_indeterminate: false,
      active: None,
      fetching: None,
      target: None,
      last_error: None,
      last_saved: None,
      notifier: None,
      tx,
      rx,
    }
  }

  /// Called after a stream download completes successfully.
  pub fn with_notifier(mut self, notifier: impl Fn() + Send + 'static) -> Self {
    self.notifier = Some(Box::new(notifier));
    self
  }

  // --- Accessors ---

  pub fn query(&self) -> &str {
    &self.query
  }

  pub fn video(&self) -> Option<&Video> {
    self.video.as_ref()
  }

  pub fn channel(&self) -> Option<&Channel> {
    self.channel.as_ref()
  }

  pub fn streams(&self) -> Option<&StreamCatalog> {
    self.streams.as_ref()
  }

  pub fn captions(&self) -> Option<&[CaptionTrack]> {
    self.captions.as_deref()
  }

  pub fn is_busy(&self) -> bool {
    self.busy
  }

  pub fn active(&self) -> Option<Action> {
    self.active
  }

  /// Identifier of the fetch in flight, fixed when the fetch started.
  pub fn fetching_id(&self) -> Option<&str> {
    self.fetching.as_deref()
  }

  #[cfg(test)]
  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  /// Take the error so a presentation layer can show it once.
  pub fn take_error(&mut self) -> Option<String> {
    self.last_error.take()
  }

  /// Take the destination of the last successful download.
  pub fn take_last_saved(&mut self) -> Option<PathBuf> {
    self.last_saved.take()
  }

  pub fn is_data_available(&self) -> bool {
    self.video.is_some() && self.channel.is_some() && self.streams.is_some() && self.captions.is_some()
  }

  pub fn can_fetch(&self) -> bool {
    !self.busy && !self.query.trim().is_empty()
  }

  pub fn can_download(&self) -> bool {
    !self.busy && self.video.is_some()
  }

  pub fn flags(&self) -> Flags {
    Flags {
      fetch_enabled: self.can_fetch(),
      download_enabled: self.can_download(),
      is_data_available: self.is_data_available(),
      is_busy: self.busy,
      progress: self.progress,
      progress_indeterminate: self.progress_indeterminate,
    }
  }

  // --- Operations ---

  pub fn set_query(&mut self, text: impl Into<String>) -> Flags {
    self.query = text.into();
    self.flags()
  }

  /// Identifier the next fetch will use: the parsed id, or the trimmed raw input.
  fn normalized_id(&self) -> String {
    let raw = self.query.trim();
    parse_video_id(raw).unwrap_or_else(|| raw.to_string())
  }

  /// Start fetching video, channel, stream catalog and caption catalog, in that order.
  pub fn fetch_metadata(&mut self) -> Result<Flags> {
    if self.busy {
      bail!("Another operation is in progress");
    }
    if self.query.trim().is_empty() {
      bail!("Enter a video URL or ID");
    }

    self.last_error = None;
    self.busy = true;
    self.progress_indeterminate = true;
    self.active = Some(Action::Fetch);
    self.reset_data();

    let id = self.normalized_id();
    info!(id = %id, "session: fetch started");
    self.fetching = Some(id.clone());

    let client = Arc::clone(&self.client);
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let release = Release::new(tx.clone(), Action::Fetch);
      let result = async {
        let video = client.get_video(&id).await.context("Failed to fetch video")?;
        let _ = tx.send(SessionEvent::Video(video));
        let channel = client.get_channel(&id).await.context("Failed to fetch channel")?;
        let _ = tx.send(SessionEvent::Channel(channel));
        let streams = client.get_stream_catalog(&id).await.context("Failed to fetch streams")?;
        let _ = tx.send(SessionEvent::Streams(streams));
        let captions = client.get_caption_catalog(&id).await.context("Failed to fetch captions")?;
        let _ = tx.send(SessionEvent::Captions(captions));
        Ok::<(), anyhow::Error>(())
      }
      .await;
      release.finish(result);
    });

    Ok(self.flags())
  }

  /// Default file name for a stream of the loaded video.
  pub fn stream_file_name(&self, stream: &StreamInfo) -> Result<String> {
    let video = self.video.as_ref().context("No video loaded")?;
    Ok(stream_file_name(video, stream))
  }

  /// Default file name for a caption track of the loaded video.
  pub fn caption_file_name(&self, track: &CaptionTrack) -> Result<String> {
    let video = self.video.as_ref().context("No video loaded")?;
    Ok(caption_file_name(video, track))
  }

  /// Prompt for a destination and start saving `stream` there.
  pub fn download_media_stream(&mut self, stream: &StreamInfo, prompt: &mut impl SavePrompt) -> Result<DownloadStart> {
    self.check_download_allowed()?;
    let catalog = self.streams.as_ref().context("No stream catalog loaded")?;
    if !catalog.contains(stream) {
      bail!("Stream {} is not part of the current catalog", stream.format_id);
    }

    let default_name = self.stream_file_name(stream)?;
    let filter = SaveFilter::for_extension(&stream.container);
    let Some(path) = prompt_path(prompt, &default_name, &filter) else {
      debug!(format = %stream.format_id, "session: stream download cancelled at prompt");
      return Ok(DownloadStart::Cancelled);
    };

    let video_id = self.video_id()?;
    self.begin_download(Action::Stream, path.clone());
    info!(id = %video_id, format = %stream.format_id, dest = %path.display(), "session: stream download started");

    let client = Arc::clone(&self.client);
    let stream = stream.clone();
    let tx = self.tx.clone();
    let dest = path.clone();
    tokio::spawn(async move {
      let release = Release::new(tx.clone(), Action::Stream);
      let result = client.download_stream(&video_id, &stream, &dest, progress_sink(&tx)).await;
      release.finish(result);
    });

    Ok(DownloadStart::Started(path))
  }

  /// Prompt for a destination and start saving `track` there as SRT.
  pub fn download_caption_track(
    &mut self,
    track: &CaptionTrack,
    prompt: &mut impl SavePrompt,
  ) -> Result<DownloadStart> {
    self.check_download_allowed()?;
    let captions = self.captions.as_ref().context("No caption tracks loaded")?;
    if !captions.contains(track) {
      bail!("Caption track {} is not part of the current catalog", track.language_code);
    }

    let default_name = self.caption_file_name(track)?;
    let filter = SaveFilter::for_extension(&crate::constants::constants().caption_extension);
    let Some(path) = prompt_path(prompt, &default_name, &filter) else {
      debug!(lang = %track.language_code, "session: caption download cancelled at prompt");
      return Ok(DownloadStart::Cancelled);
    };

    let video_id = self.video_id()?;
    self.begin_download(Action::Caption, path.clone());
    info!(id = %video_id, lang = %track.language_code, dest = %path.display(), "session: caption download started");

    let client = Arc::clone(&self.client);
    let track = track.clone();
    let tx = self.tx.clone();
    let dest = path.clone();
    tokio::spawn(async move {
      let release = Release::new(tx.clone(), Action::Caption);
      let result = client.download_caption_track(&video_id, &track, &dest, progress_sink(&tx)).await;
      release.finish(result);
    });

    Ok(DownloadStart::Started(path))
  }

  // --- Event application ---

  /// Apply one event from a background task.
  pub fn apply(&mut self, event: SessionEvent) -> Flags {
    match event {
      SessionEvent::Video(video) if self.active == Some(Action::Fetch) => self.video = Some(video),
      SessionEvent::Channel(channel) if self.active == Some(Action::Fetch) => self.channel = Some(channel),
      SessionEvent::Streams(streams) if self.active == Some(Action::Fetch) => self.streams = Some(streams),
      SessionEvent::Captions(captions) if self.active == Some(Action::Fetch) => self.captions = Some(captions),
      SessionEvent::Progress(p) if p.is_finite() && matches!(self.active, Some(Action::Stream | Action::Caption)) => {
        self.progress = p.clamp(0.0, 1.0);
      }
      SessionEvent::Finished { action, error } if self.active == Some(action) => self.finish(action, error),
      other => debug!(event = ?other, "session: ignoring event for inactive action"),
    }
    self.flags()
  }

  /// Apply every pending event. Returns whether anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(event) = self.rx.try_recv() {
      self.apply(event);
      changed = true;
    }
    changed
  }

  /// Wait for the next event and apply it.
  pub async fn next(&mut self) -> Flags {
    // The session holds a sender, so the channel never closes.
    if let Some(event) = self.rx.recv().await {
      self.apply(event);
    }
    self.flags()
  }

  /// Apply events until no action is in flight.
  pub async fn settle(&mut self) -> Flags {
    while self.busy {
      self.next().await;
    }
    self.flags()
  }

  // --- Internals ---

  fn reset_data(&mut self) {
    self.video = None;
    self.channel = None;
    self.streams = None;
    self.captions = None;
  }

  fn video_id(&self) -> Result<String> {
    Ok(self.video.as_ref().context("No video loaded")?.id.clone())
  }

  fn check_download_allowed(&self) -> Result<()> {
    if self.busy {
      bail!("Another operation is in progress");
    }
    if self.video.is_none() {
      bail!("Fetch a video first");
    }
    Ok(())
  }

  fn begin_download(&mut self, action: Action, target: PathBuf) {
    self.last_error = None;
    self.busy = true;
    self.progress = 0.0;
    self.active = Some(action);
    self.target = Some(target);
  }

  fn finish(&mut self, action: Action, error: Option<String>) {
    // Busy state is released before the error is surfaced.
    self.busy = false;
    self.progress = 0.0;
    self.progress_indeterminate = false;
    self.active = None;
    self.fetching = None;
    let target = self.target.take();

    match error {
      Some(msg) => {
        if action == Action::Fetch {
          self.reset_data();
        }
        error!(action = action.label(), err = %msg, "session: action failed");
        self.last_error = Some(msg);
      }
      None => {
        info!(action = action.label(), "session: action finished");
        if action != Action::Fetch {
          self.last_saved = target;
        }
        if action == Action::Stream
          && let Some(notify) = &self.notifier
        {
          notify();
        }
      }
    }
  }
}

fn prompt_path(prompt: &mut impl SavePrompt, default_name: &str, filter: &SaveFilter) -> Option<PathBuf> {
  prompt.prompt_save_path(default_name, filter).filter(|p| !p.as_os_str().is_empty())
}

fn progress_sink(tx: &mpsc::UnboundedSender<SessionEvent>) -> ProgressFn {
  let tx = tx.clone();
  Arc::new(move |p| {
    if tx.send(SessionEvent::Progress(p)).is_err() {
      warn!("session: progress dropped, session gone");
    }
  })
}


#[cfg(test)]
mod tests {
  use super::fake::FakeClient;
  use super::*;
  use crate::models::StreamKind;
  use crate::models::fixtures;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::Notify;

  const WATCH_URL: &str = "https://www.youtube.com/watch?v=dRZv355zZ1g";

  fn session(client: FakeClient) -> (Session<FakeClient>, Arc<FakeClient>) {
    let client = Arc::new(client);
    (Session::new(Arc::clone(&client), WATCH_URL), client)
  }

  async fn loaded(client: FakeClient) -> (Session<FakeClient>, Arc<FakeClient>) {
    let (mut s, client) = session(client);
    s.fetch_metadata().unwrap();
    s.settle().await;
    assert!(s.is_data_available());
    (s, client)
  }

  fn save_to(path: &'static str) -> impl FnMut(&str, &SaveFilter) -> Option<PathBuf> {
    move |_, _| Some(PathBuf::from(path))
  }

  // --- set_query ---

  #[test]
  fn fetch_enabled_iff_trimmed_query_non_empty() {
    let (mut s, _) = session(FakeClient::default());
    assert!(s.set_query(WATCH_URL).fetch_enabled);
    assert!(s.set_query("  x ").fetch_enabled);
    assert!(!s.set_query("").fetch_enabled);
    assert!(!s.set_query(" \t\n ").fetch_enabled);
  }

  #[tokio::test]
  async fn fetch_disabled_while_busy() {
    let (mut s, _) = session(FakeClient::default());
    s.fetch_metadata().unwrap();
    assert!(!s.set_query("dRZv355zZ1g").fetch_enabled);
    assert!(s.fetch_metadata().is_err());
    s.settle().await;
    assert!(s.flags().fetch_enabled);
  }

  // --- fetch_metadata ---

  #[tokio::test]
  async fn watch_url_fetches_four_entities_with_parsed_id() {
    let (mut s, client) = session(FakeClient::default());
    let flags = s.fetch_metadata().unwrap();
    assert!(flags.is_busy && flags.progress_indeterminate);

    let flags = s.settle().await;
    assert!(flags.is_data_available);
    assert!(!flags.is_busy && !flags.progress_indeterminate);
    assert_eq!(
      client.calls(),
      ["video:dRZv355zZ1g", "channel:dRZv355zZ1g", "streams:dRZv355zZ1g", "captions:dRZv355zZ1g"]
    );
    assert_eq!(s.video().unwrap().id, "dRZv355zZ1g");
    assert_eq!(s.streams().unwrap().len(), 2);
    assert_eq!(s.captions().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unparseable_query_is_passed_through_verbatim() {
    let (mut s, client) = session(FakeClient::default());
    s.set_query("not a url");
    assert_eq!(s.normalized_id(), "not a url");
    s.fetch_metadata().unwrap();
    s.settle().await;
    assert_eq!(client.calls(), ["video:not a url", "channel:not a url", "streams:not a url", "captions:not a url"]);
  }

  #[tokio::test]
  async fn data_is_reset_as_soon_as_a_new_fetch_begins() {
    let (mut s, _) = loaded(FakeClient::default()).await;
    let flags = s.fetch_metadata().unwrap();
    assert!(!flags.is_data_available);
    assert!(s.video().is_none() && s.channel().is_none() && s.streams().is_none() && s.captions().is_none());
    s.settle().await;
    assert!(s.is_data_available());
  }

  #[tokio::test]
  async fn fetching_id_survives_query_edits() {
    let (mut s, _) = session(FakeClient::default());
    assert_eq!(s.fetching_id(), None);
    s.fetch_metadata().unwrap();
    s.set_query("something else");
    assert_eq!(s.fetching_id(), Some("dRZv355zZ1g"));
    s.settle().await;
    assert_eq!(s.fetching_id(), None);
  }

  #[tokio::test]
  async fn entities_are_published_as_they_arrive() {
    let (mut s, _) = session(FakeClient::default());
    s.fetch_metadata().unwrap();
    let flags = s.next().await;
    assert!(s.video().is_some());
    assert!(s.channel().is_none());
    assert!(!flags.is_data_available);
    assert!(flags.is_busy);
  }

  #[tokio::test]
  async fn failed_fetch_rolls_back_everything() {
    for step in ["video", "channel", "streams", "captions"] {
      let (mut s, _) = session(FakeClient { fail_at: Some(step), ..FakeClient::default() });
      s.fetch_metadata().unwrap();
      let flags = s.settle().await;
      assert!(!flags.is_data_available, "step {}", step);
      assert!(!flags.is_busy && !flags.progress_indeterminate);
      assert!(s.video().is_none() && s.channel().is_none() && s.streams().is_none() && s.captions().is_none());
      assert!(s.last_error().unwrap().contains(&format!("boom in {}", step)));
    }
  }

  #[tokio::test]
  async fn failure_stops_the_remaining_requests() {
    let (mut s, client) = session(FakeClient { fail_at: Some("channel"), ..FakeClient::default() });
    s.fetch_metadata().unwrap();
    s.settle().await;
    assert_eq!(client.calls(), ["video:dRZv355zZ1g", "channel:dRZv355zZ1g"]);
  }

  #[tokio::test]
  async fn new_fetch_clears_previous_error() {
    let (mut s, _) = session(FakeClient { fail_at: Some("video"), ..FakeClient::default() });
    s.fetch_metadata().unwrap();
    s.settle().await;
    assert!(s.last_error().is_some());
    s.fetch_metadata().unwrap();
    assert!(s.last_error().is_none());
    s.settle().await;
  }

  #[test]
  fn blank_query_is_rejected_without_state_change() {
    let (mut s, _) = session(FakeClient::default());
    s.set_query("   ");
    assert!(s.fetch_metadata().is_err());
    assert!(!s.is_busy());
  }

  // --- downloads ---

  #[tokio::test]
  async fn stream_download_offers_sanitized_default_name() {
    let (mut s, client) = loaded(FakeClient::default()).await;
    let stream = s.streams().unwrap().find("18").unwrap().clone();
    let mut offered = None;
    let start = s
      .download_media_stream(&stream, &mut |name: &str, filter: &SaveFilter| {
        offered = Some((name.to_string(), filter.extension.clone()));
        Some(PathBuf::from("/tmp/out.mp4"))
      })
      .unwrap();
    assert_eq!(start, DownloadStart::Started(PathBuf::from("/tmp/out.mp4")));
    assert_eq!(offered, Some(("My_Video.mp4".to_string(), "mp4".to_string())));

    s.settle().await;
    assert_eq!(client.calls().last().unwrap(), "stream:dRZv355zZ1g:18:/tmp/out.mp4");
    assert_eq!(s.take_last_saved(), Some(PathBuf::from("/tmp/out.mp4")));
  }

  #[tokio::test]
  async fn cancelled_prompt_changes_nothing() {
    let (mut s, client) = loaded(FakeClient::default()).await;
    let calls_before = client.calls().len();
    let stream = s.streams().unwrap().find("140").unwrap().clone();
    let before = s.flags();

    let start = s.download_media_stream(&stream, &mut |_: &str, _: &SaveFilter| None::<PathBuf>).unwrap();
    assert_eq!(start, DownloadStart::Cancelled);
    assert_eq!(s.flags(), before);
    assert!(!s.is_busy());

    let start = s.download_media_stream(&stream, &mut |_: &str, _: &SaveFilter| Some(PathBuf::new())).unwrap();
    assert_eq!(start, DownloadStart::Cancelled);
    assert_eq!(client.calls().len(), calls_before);
  }

  #[tokio::test]
  async fn progress_is_reflected_then_reset() {
    let gate = Arc::new(Notify::new());
    let (mut s, _) = loaded(FakeClient { gate: Some(Arc::clone(&gate)), ..FakeClient::default() }).await;
    let stream = s.streams().unwrap().find("18").unwrap().clone();
    s.download_media_stream(&stream, &mut save_to("/tmp/a.mp4")).unwrap();
    assert!(s.is_busy());
    assert_eq!(s.flags().progress, 0.0);
    assert!(!s.flags().download_enabled);

    let flags = s.next().await;
    assert_eq!(flags.progress, 0.5);
    assert!(flags.is_busy);

    gate.notify_one();
    let flags = s.settle().await;
    assert!(!flags.is_busy);
    assert_eq!(flags.progress, 0.0);
    assert!(s.last_error().is_none());
  }

  #[tokio::test]
  async fn non_finite_progress_is_dropped() {
    let gate = Arc::new(Notify::new());
    let (mut s, _) = loaded(FakeClient { gate: Some(Arc::clone(&gate)), ..FakeClient::default() }).await;
    let stream = s.streams().unwrap().find("18").unwrap().clone();
    s.download_media_stream(&stream, &mut save_to("/tmp/a.mp4")).unwrap();
    assert_eq!(s.next().await.progress, 0.5);

    assert_eq!(s.apply(SessionEvent::Progress(f64::NAN)).progress, 0.5);
    assert_eq!(s.apply(SessionEvent::Progress(f64::INFINITY)).progress, 0.5);

    gate.notify_one();
    s.settle().await;
  }

  #[tokio::test]
  async fn failed_download_still_releases_busy_state() {
    let (mut s, _) = loaded(FakeClient { fail_download: true, ..FakeClient::default() }).await;
    let stream = s.streams().unwrap().find("18").unwrap().clone();
    s.download_media_stream(&stream, &mut save_to("/tmp/a.mp4")).unwrap();
    let flags = s.settle().await;
    assert!(!flags.is_busy);
    assert_eq!(flags.progress, 0.0);
    assert!(s.last_error().unwrap().contains("disk full"));
    assert!(s.take_last_saved().is_none());
    assert!(s.is_data_available());
  }

  #[tokio::test]
  async fn panicking_transfer_still_releases_busy_state() {
    let (mut s, _) = loaded(FakeClient { panic_download: true, ..FakeClient::default() }).await;
    let track = s.captions().unwrap()[0].clone();
    s.download_caption_track(&track, &mut save_to("/tmp/a.srt")).unwrap();
    let flags = s.settle().await;
    assert!(!flags.is_busy);
    assert_eq!(flags.progress, 0.0);
    assert!(s.last_error().unwrap().contains("ended unexpectedly"));
  }

  #[tokio::test]
  async fn caption_download_uses_language_and_srt() {
    let (mut s, client) = loaded(FakeClient::default()).await;
    let track = s.captions().unwrap()[0].clone();
    let mut offered = String::new();
    s.download_caption_track(&track, &mut |name: &str, filter: &SaveFilter| {
      offered = name.to_string();
      assert_eq!(filter.extension, "srt");
      Some(PathBuf::from("/tmp/subs.srt"))
    })
    .unwrap();
    assert_eq!(offered, "My_Video.English.srt");
    s.settle().await;
    assert_eq!(client.calls().last().unwrap(), "caption:dRZv355zZ1g:en:/tmp/subs.srt");
  }

  #[tokio::test]
  async fn downloads_require_loaded_data_and_idle_session() {
    let (mut s, _) = session(FakeClient::default());
    let stream = fixtures::stream("18", "mp4", StreamKind::Muxed);
    assert!(s.download_media_stream(&stream, &mut save_to("/tmp/a.mp4")).is_err());

    s.fetch_metadata().unwrap();
    assert!(s.download_media_stream(&stream, &mut save_to("/tmp/a.mp4")).is_err());
    s.settle().await;

    let foreign = fixtures::stream("22", "mp4", StreamKind::Muxed);
    assert!(s.download_media_stream(&foreign, &mut save_to("/tmp/a.mp4")).is_err());
    let foreign_track = fixtures::caption("xx", "Nowhere");
    assert!(s.download_caption_track(&foreign_track, &mut save_to("/tmp/a.srt")).is_err());
    assert!(!s.is_busy());
  }

  #[tokio::test]
  async fn notifier_fires_only_for_successful_stream_downloads() {
    let rings = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rings);
    let (s, _) = loaded(FakeClient::default()).await;
    let mut s = s.with_notifier(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    let stream = s.streams().unwrap().find("18").unwrap().clone();
    s.download_media_stream(&stream, &mut save_to("/tmp/a.mp4")).unwrap();
    s.settle().await;
    assert_eq!(rings.load(Ordering::SeqCst), 1);

    let track = s.captions().unwrap()[0].clone();
    s.download_caption_track(&track, &mut save_to("/tmp/a.srt")).unwrap();
    s.settle().await;
    assert_eq!(rings.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn stray_events_are_ignored_when_idle() {
    let (mut s, _) = loaded(FakeClient::default()).await;
    let flags = s.apply(SessionEvent::Progress(0.7));
    assert_eq!(flags.progress, 0.0);
    s.apply(SessionEvent::Video(fixtures::video("Other")));
    assert_eq!(s.video().unwrap().title, "My:Video");
  }
}
