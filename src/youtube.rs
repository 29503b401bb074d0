use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::constants;
use crate::models::{CaptionTrack, Channel, StreamCatalog, StreamInfo, StreamKind, Video};

/// Progress sink handed to downloads. Receives fractions in `0.0..=1.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Everything the session needs from a video platform.
///
/// Methods return `Send` futures so the session can drive them from spawned tasks.
pub trait VideoClient: Send + Sync + 'static {
  fn get_video(&self, id: &str) -> impl Future<Output = Result<Video>> + Send;
  fn get_channel(&self, id: &str) -> impl Future<Output = Result<Channel>> + Send;
  fn get_stream_catalog(&self, id: &str) -> impl Future<Output = Result<StreamCatalog>> + Send;
  fn get_caption_catalog(&self, id: &str) -> impl Future<Output = Result<Vec<CaptionTrack>>> + Send;

  /// Write the given stream to `dest`, reporting progress along the way.
  fn download_stream(
    &self,
    video_id: &str,
    stream: &StreamInfo,
    dest: &Path,
    on_progress: ProgressFn,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Write the given caption track to `dest` as SRT.
  fn download_caption_track(
    &self,
    video_id: &str,
    track: &CaptionTrack,
    dest: &Path,
    on_progress: ProgressFn,
  ) -> impl Future<Output = Result<()>> + Send;
}

// --- Identifier parsing ---

/// A bare identifier is exactly 11 URL-safe base64 characters.
pub fn is_valid_video_id(s: &str) -> bool {
  s.len() == 11 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Extract the video identifier from a URL or bare identifier.
/// Returns `None` when the input is neither.
pub fn parse_video_id(input: &str) -> Option<String> {
  let trimmed = input.trim();
  if is_valid_video_id(trimmed) {
    return Some(trimmed.to_string());
  }

  let with_scheme = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{}", trimmed) };
  let url = Url::parse(&with_scheme).ok()?;
  let host = url.host_str()?.to_lowercase();
  let host = host.trim_start_matches("www.").trim_start_matches("m.").trim_start_matches("music.");

  let candidate = match host {
    "youtu.be" => url.path_segments().and_then(|mut s| s.next()).map(str::to_string),
    "youtube.com" | "youtube-nocookie.com" => {
      let segments: Vec<&str> = url.path_segments().map(|s| s.filter(|p| !p.is_empty()).collect()).unwrap_or_default();
      match segments.as_slice() {
        ["watch"] => url.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned()),
        ["embed" | "shorts" | "live" | "v", id, ..] => Some(id.to_string()),
        _ => None,
      }
    }
    _ => None,
  }?;

  is_valid_video_id(&candidate).then_some(candidate)
}

/// Canonical watch URL for an identifier.
pub fn watch_url(video_id: &str) -> String {
  format!("https://www.youtube.com/watch?v={}", video_id)
}

// --- yt-dlp JSON ---

#[derive(Debug, Deserialize)]
struct InfoJson {
  id: String,
  title: String,
  description: Option<String>,
  duration: Option<f64>,
  upload_date: Option<String>,
  view_count: Option<u64>,
  like_count: Option<u64>,
  tags: Option<Vec<String>>,
  webpage_url: Option<String>,
  channel: Option<String>,
  channel_id: Option<String>,
  channel_url: Option<String>,
  channel_follower_count: Option<u64>,
  uploader: Option<String>,
  uploader_id: Option<String>,
  uploader_url: Option<String>,
  formats: Option<Vec<FormatJson>>,
  subtitles: Option<BTreeMap<String, Vec<SubtitleJson>>>,
  automatic_captions: Option<BTreeMap<String, Vec<SubtitleJson>>>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
  format_id: String,
  ext: Option<String>,
  format_note: Option<String>,
  width: Option<u32>,
  height: Option<u32>,
  fps: Option<f64>,
  vcodec: Option<String>,
  acodec: Option<String>,
  tbr: Option<f64>,
  filesize: Option<u64>,
  filesize_approx: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SubtitleJson {
  name: Option<String>,
}

fn parse_info_json(bytes: &[u8]) -> Result<InfoJson> {
  serde_json::from_slice(bytes).context("yt-dlp returned invalid JSON")
}

fn video_from_info(info: &InfoJson) -> Video {
  Video {
    id: info.id.clone(),
    title: info.title.clone(),
    description: info.description.clone().unwrap_or_default(),
    duration: info.duration.filter(|d| d.is_finite() && *d >= 0.0).map(Duration::from_secs_f64),
    upload_date: info.upload_date.as_deref().and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok()),
    view_count: info.view_count,
    like_count: info.like_count,
    tags: info.tags.clone().unwrap_or_default(),
    url: info.webpage_url.clone().unwrap_or_else(|| watch_url(&info.id)),
  }
}

fn channel_from_info(info: &InfoJson) -> Result<Channel> {
  let title = info
    .channel
    .clone()
    .or_else(|| info.uploader.clone())
    .ok_or_else(|| anyhow!("No channel information for video {}", info.id))?;
  Ok(Channel {
    id: info.channel_id.clone().or_else(|| info.uploader_id.clone()).unwrap_or_default(),
    title,
    url: info.channel_url.clone().or_else(|| info.uploader_url.clone()),
    subscriber_count: info.channel_follower_count,
  })
}

fn stream_from_format(f: &FormatJson) -> Option<StreamInfo> {
  let codec = |c: &Option<String>| c.as_deref().filter(|c| *c != "none").map(str::to_string);
  let video_codec = codec(&f.vcodec);
  let audio_codec = codec(&f.acodec);
  let kind = match (video_codec.is_some(), audio_codec.is_some()) {
    (true, true) => StreamKind::Muxed,
    (true, false) => StreamKind::VideoOnly,
    (false, true) => StreamKind::AudioOnly,
    // Storyboards and other image-only formats.
    (false, false) => return None,
  };
  let container = f.ext.clone().filter(|e| !e.is_empty() && e != "mhtml")?;
  let quality = f.format_note.clone().filter(|n| !n.is_empty()).or_else(|| f.height.map(|h| format!("{}p", h)));
  let resolution = match (f.width, f.height) {
    (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
    _ => None,
  };
  Some(StreamInfo {
    format_id: f.format_id.clone(),
    container,
    kind,
    quality,
    resolution,
    fps: f.fps,
    video_codec,
    audio_codec,
    bitrate_kbps: f.tbr,
    size: f.filesize.or(f.filesize_approx),
  })
}

fn catalog_from_info(info: &InfoJson) -> StreamCatalog {
  StreamCatalog::from_streams(info.formats.iter().flatten().filter_map(stream_from_format))
}

fn captions_from_info(info: &InfoJson) -> Vec<CaptionTrack> {
  let track = |code: &str, entries: &[SubtitleJson], auto_generated: bool| CaptionTrack {
    language_code: code.to_string(),
    language_name: entries.iter().find_map(|e| e.name.clone()).unwrap_or_else(|| code.to_string()),
    auto_generated,
  };
  let mut tracks: Vec<CaptionTrack> = info
    .subtitles
    .iter()
    .flatten()
    .filter(|(code, entries)| code.as_str() != "live_chat" && !entries.is_empty())
    .map(|(code, entries)| track(code, entries, false))
    .collect();
  // Automatic captions list every machine translation; keep only the original-language track.
  tracks.extend(
    info
      .automatic_captions
      .iter()
      .flatten()
      .filter(|(code, entries)| code.ends_with("-orig") && !entries.is_empty())
      .map(|(code, entries)| track(code, entries, true)),
  );
  tracks
}

// --- Progress ---

/// Parse a `download:<percent>` line emitted via `--progress-template`.
pub fn parse_progress_line(line: &str) -> Option<f64> {
  let rest = line.trim().strip_prefix("download:")?;
  let pct = rest.trim().strip_suffix('%')?.trim().parse::<f64>().ok().filter(|p| p.is_finite())?;
  Some((pct / 100.0).clamp(0.0, 1.0))
}

/// yt-dlp treats `-o` as a template; literal `%` must be doubled.
fn escape_output_template(path: &Path) -> String {
  path.to_string_lossy().replace('%', "%%")
}

fn not_found_hint(e: std::io::Error, program: &Path, action: &str) -> anyhow::Error {
  if e.kind() == std::io::ErrorKind::NotFound {
    anyhow!(
      "{} not found. Install it with: brew install yt-dlp (macOS) or pip install yt-dlp",
      program.display()
    )
  } else {
    anyhow!(e).context(format!("Failed to execute yt-dlp to {}", action))
  }
}

/// Keep the last few stderr lines for error messages.
fn stderr_tail(stderr: &str) -> String {
  let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
  lines[lines.len().saturating_sub(3)..].join(" | ")
}

// --- Client ---

/// `VideoClient` backed by the `yt-dlp` executable.
///
/// One `--dump-single-json` run serves all four metadata calls for an identifier;
/// the parsed document is cached until a different identifier is requested.
pub struct YtDlpClient {
  program: PathBuf,
  cache: Mutex<Option<Arc<InfoJson>>>,
}

impl YtDlpClient {
  pub fn new(program: Option<PathBuf>) -> Self {
    Self { program: program.unwrap_or_else(|| PathBuf::from(&constants().ytdlp_program)), cache: Mutex::new(None) }
  }

  fn command(&self) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    cmd
  }

  async fn info(&self, id: &str) -> Result<Arc<InfoJson>> {
    let mut cache = self.cache.lock().await;
    if let Some(info) = cache.as_ref()
      && info.id == id
    {
      return Ok(Arc::clone(info));
    }

    info!(id = %id, "yt-dlp: fetching metadata");
    let url = watch_url(id);
    let output = self
      .command()
      .args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings", "--", url.as_str()])
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .output();
    let timeout = Duration::from_secs(constants().metadata_timeout_secs);
    let output = tokio::time::timeout(timeout, output)
      .await
      .map_err(|_| anyhow!("Timed out fetching metadata after {}s", timeout.as_secs()))?
      .map_err(|e| not_found_hint(e, &self.program, "fetch metadata"))?;

    if !output.status.success() {
      bail!("yt-dlp failed: {}", stderr_tail(&String::from_utf8_lossy(&output.stderr)));
    }

    let info = Arc::new(parse_info_json(&output.stdout)?);
    debug!(id = %info.id, formats = info.formats.as_ref().map_or(0, Vec::len), "yt-dlp: metadata parsed");
    *cache = Some(Arc::clone(&info));
    Ok(info)
  }

  /// Run a download command, forwarding `download:` progress lines from stdout.
  async fn run_with_progress(&self, mut cmd: Command, on_progress: &ProgressFn, action: &str) -> Result<()> {
    let mut child = cmd
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| not_found_hint(e, &self.program, action))?;

    let stdout = child.stdout.take().context("Failed to get yt-dlp stdout")?;
    let mut stderr = child.stderr.take().context("Failed to get yt-dlp stderr")?;
    // Drain stderr concurrently so a full pipe never stalls the child.
    let stderr_reader = tokio::spawn(async move {
      let mut buf = String::new();
      let _ = stderr.read_to_string(&mut buf).await;
      buf
    });

    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read yt-dlp output")? {
      if let Some(fraction) = parse_progress_line(&line) {
        on_progress(fraction);
      }
    }

    let status = child.wait().await.context("Failed to wait for yt-dlp")?;
    let stderr = stderr_reader.await.unwrap_or_default();
    if !status.success() {
      warn!(code = ?status.code(), "yt-dlp: {} failed", action);
      bail!("yt-dlp failed to {}: {}", action, stderr_tail(&stderr));
    }
    Ok(())
  }
}

impl VideoClient for YtDlpClient {
  async fn get_video(&self, id: &str) -> Result<Video> {
    Ok(video_from_info(&*self.info(id).await?))
  }

  async fn get_channel(&self, id: &str) -> Result<Channel> {
    channel_from_info(&*self.info(id).await?)
  }

  async fn get_stream_catalog(&self, id: &str) -> Result<StreamCatalog> {
    Ok(catalog_from_info(&*self.info(id).await?))
  }

  async fn get_caption_catalog(&self, id: &str) -> Result<Vec<CaptionTrack>> {
    Ok(captions_from_info(&*self.info(id).await?))
  }

  async fn download_stream(
    &self,
    video_id: &str,
    stream: &StreamInfo,
    dest: &Path,
    on_progress: ProgressFn,
  ) -> Result<()> {
    info!(id = %video_id, format = %stream.format_id, dest = %dest.display(), "yt-dlp: downloading stream");
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await.context("Failed to create destination directory")?;
    }

    let mut cmd = self.command();
    cmd.args(["--format", stream.format_id.as_str()])
      .args(["--newline", "--no-playlist", "--no-warnings", "--force-overwrites", "--progress-template"])
      .arg(&constants().progress_template)
      .arg("--output")
      .arg(escape_output_template(dest))
      .arg("--")
      .arg(watch_url(video_id));
    self.run_with_progress(cmd, &on_progress, "download stream").await?;

    on_progress(1.0);
    info!(dest = %dest.display(), "yt-dlp: stream saved");
    Ok(())
  }

  async fn download_caption_track(
    &self,
    video_id: &str,
    track: &CaptionTrack,
    dest: &Path,
    on_progress: ProgressFn,
  ) -> Result<()> {
    info!(id = %video_id, lang = %track.language_code, dest = %dest.display(), "yt-dlp: downloading captions");
    let parent = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    tokio::fs::create_dir_all(parent).await.context("Failed to create destination directory")?;
    // Scratch space next to the destination, so the final move is a rename.
    let scratch = tempfile::tempdir_in(parent).context("Failed to create scratch directory")?;
    on_progress(0.0);

    let extension = &constants().caption_extension;
    let template = format!("subtitle:{}", escape_output_template(&scratch.path().join("caption.%(ext)s")));
    let mut cmd = self.command();
    cmd.args(["--skip-download", "--no-playlist", "--no-warnings"])
      .arg(if track.auto_generated { "--write-auto-subs" } else { "--write-subs" })
      .args(["--sub-langs", track.language_code.as_str(), "--convert-subs", extension.as_str()])
      .args(["--output", template.as_str(), "--"])
      .arg(watch_url(video_id));
    self.run_with_progress(cmd, &on_progress, "download captions").await?;

    let produced = find_with_extension(scratch.path(), extension)
      .await?
      .ok_or_else(|| anyhow!("yt-dlp produced no {} file for language {}", extension, track.language_code))?;
    tokio::fs::rename(&produced, dest).await.context("Failed to move caption file into place")?;

    on_progress(1.0);
    info!(dest = %dest.display(), "yt-dlp: captions saved");
    Ok(())
  }
}

async fn find_with_extension(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
  let mut entries = tokio::fs::read_dir(dir).await.context("Failed to list scratch directory")?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(extension)) {
      return Ok(Some(path));
    }
  }
  Ok(None)
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- parse_video_id ---

  #[test]
  fn parses_watch_url() {
    assert_eq!(parse_video_id("https://www.youtube.com/watch?v=dRZv355zZ1g").as_deref(), Some("dRZv355zZ1g"));
  }

  #[test]
  fn parses_watch_url_with_extra_params() {
    let id = parse_video_id("https://m.youtube.com/watch?feature=share&v=dRZv355zZ1g&t=42s");
    assert_eq!(id.as_deref(), Some("dRZv355zZ1g"));
  }

  #[test]
  fn parses_short_and_path_forms() {
    for input in [
      "https://youtu.be/dRZv355zZ1g",
      "youtu.be/dRZv355zZ1g?t=3",
      "https://www.youtube.com/embed/dRZv355zZ1g",
      "https://youtube.com/shorts/dRZv355zZ1g",
      "https://www.youtube.com/live/dRZv355zZ1g?si=x",
      "https://music.youtube.com/watch?v=dRZv355zZ1g",
      "www.youtube.com/watch?v=dRZv355zZ1g",
    ] {
      assert_eq!(parse_video_id(input).as_deref(), Some("dRZv355zZ1g"), "input: {}", input);
    }
  }

  #[test]
  fn bare_id_is_accepted() {
    assert_eq!(parse_video_id("  dRZv355zZ1g ").as_deref(), Some("dRZv355zZ1g"));
  }

  #[test]
  fn rejects_non_video_input() {
    assert_eq!(parse_video_id("not a url"), None);
    assert_eq!(parse_video_id(""), None);
    assert_eq!(parse_video_id("https://example.com/watch?v=dRZv355zZ1g"), None);
    assert_eq!(parse_video_id("https://www.youtube.com/watch?v=short"), None);
    assert_eq!(parse_video_id("https://www.youtube.com/@somechannel"), None);
  }

  // --- progress ---

  #[test]
  fn progress_line_parsing() {
    assert_eq!(parse_progress_line("download:  45.0%"), Some(0.45));
    assert_eq!(parse_progress_line("download:100%"), Some(1.0));
    assert_eq!(parse_progress_line("download:N/A"), None);
    assert_eq!(parse_progress_line("[info] Writing video subtitles"), None);
    assert_eq!(parse_progress_line(""), None);
    assert_eq!(parse_progress_line("download:nan%"), None);
    assert_eq!(parse_progress_line("download:inf%"), None);
  }

  #[test]
  fn output_template_escapes_percent() {
    assert_eq!(escape_output_template(Path::new("/tmp/100% real.mp4")), "/tmp/100%% real.mp4");
  }

  #[test]
  fn stderr_tail_keeps_last_lines() {
    assert_eq!(stderr_tail("a\n\nb\nc\nd\n"), "b | c | d");
    assert_eq!(stderr_tail(""), "");
  }

  // --- JSON mapping ---

  const SAMPLE: &str = r#"{
    "id": "dRZv355zZ1g",
    "title": "My:Video",
    "description": "desc",
    "duration": 212.0,
    "upload_date": "20170501",
    "view_count": 1234,
    "like_count": null,
    "tags": ["a", "b"],
    "webpage_url": "https://www.youtube.com/watch?v=dRZv355zZ1g",
    "channel": "Some Channel",
    "channel_id": "UCabc",
    "channel_url": "https://www.youtube.com/channel/UCabc",
    "channel_follower_count": 99,
    "uploader": "Some Uploader",
    "formats": [
      {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none", "format_note": "storyboard"},
      {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "format_note": "medium", "filesize": 3000000},
      {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "width": 1920, "height": 1080, "fps": 30},
      {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "width": 640, "height": 360, "format_note": "360p", "filesize_approx": 1000}
    ],
    "subtitles": {
      "en": [{"ext": "json3", "name": "English"}, {"ext": "vtt", "name": "English"}],
      "live_chat": [{"ext": "json"}],
      "de": []
    },
    "automatic_captions": {
      "en-orig": [{"ext": "vtt", "name": "English (Original)"}],
      "fr": [{"ext": "vtt", "name": "French"}]
    }
  }"#;

  fn sample() -> InfoJson {
    parse_info_json(SAMPLE.as_bytes()).unwrap()
  }

  #[test]
  fn maps_video_fields() {
    let video = video_from_info(&sample());
    assert_eq!(video.title, "My:Video");
    assert_eq!(video.duration, Some(Duration::from_secs(212)));
    assert_eq!(video.upload_date, NaiveDate::from_ymd_opt(2017, 5, 1));
    assert_eq!(video.view_count, Some(1234));
    assert_eq!(video.like_count, None);
    assert_eq!(video.tags, ["a", "b"]);
  }

  #[test]
  fn maps_channel_preferring_channel_fields() {
    let channel = channel_from_info(&sample()).unwrap();
    assert_eq!(channel.title, "Some Channel");
    assert_eq!(channel.id, "UCabc");
    assert_eq!(channel.subscriber_count, Some(99));
  }

  #[test]
  fn channel_missing_is_an_error() {
    let info = parse_info_json(br#"{"id": "dRZv355zZ1g", "title": "t"}"#).unwrap();
    assert!(channel_from_info(&info).is_err());
  }

  #[test]
  fn maps_formats_into_catalog_skipping_storyboards() {
    let catalog = catalog_from_info(&sample());
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.muxed[0].format_id, "18");
    assert_eq!(catalog.muxed[0].size, Some(1000));
    assert_eq!(catalog.video[0].quality.as_deref(), Some("1080p"));
    assert_eq!(catalog.video[0].audio_codec, None);
    assert_eq!(catalog.audio[0].container, "m4a");
    assert!(catalog.find("sb0").is_none());
  }

  #[test]
  fn maps_captions_keeping_original_auto_track_only() {
    let tracks = captions_from_info(&sample());
    let codes: Vec<&str> = tracks.iter().map(|t| t.language_code.as_str()).collect();
    assert_eq!(codes, ["en", "en-orig"]);
    assert_eq!(tracks[0].language_name, "English");
    assert!(!tracks[0].auto_generated);
    assert!(tracks[1].auto_generated);
  }

  #[test]
  fn minimal_json_gives_empty_catalogs() {
    let info = parse_info_json(br#"{"id": "dRZv355zZ1g", "title": "t"}"#).unwrap();
    assert!(catalog_from_info(&info).is_empty());
    assert!(captions_from_info(&info).is_empty());
    assert_eq!(video_from_info(&info).url, watch_url("dRZv355zZ1g"));
  }

  #[tokio::test]
  async fn find_with_extension_locates_srt() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("caption.en.vtt"), "x").unwrap();
    std::fs::write(dir.path().join("caption.en.srt"), "x").unwrap();
    let found = find_with_extension(dir.path(), "srt").await.unwrap();
    assert_eq!(found, Some(dir.path().join("caption.en.srt")));
    assert_eq!(find_with_extension(dir.path(), "ass").await.unwrap(), None);
  }

  #[tokio::test]
  async fn missing_executable_reports_install_hint() {
    let client = YtDlpClient::new(Some(PathBuf::from("/nonexistent/yt-dlp-for-tests")));
    let err = client.get_video("dRZv355zZ1g").await.unwrap_err();
    assert!(format!("{:#}", err).contains("not found"));
  }
}
