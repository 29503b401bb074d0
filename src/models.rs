use chrono::NaiveDate;
use std::time::Duration;

/// Descriptive metadata for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Video {
  pub id: String,
  pub title: String,
  pub description: String,
  pub duration: Option<Duration>,
  pub upload_date: Option<NaiveDate>,
  pub view_count: Option<u64>,
  pub like_count: Option<u64>,
  pub tags: Vec<String>,
  pub url: String,
}

/// The uploader of a video.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
  pub id: String,
  pub title: String,
  pub url: Option<String>,
  pub subscriber_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
  /// Audio and video in one container.
  Muxed,
  VideoOnly,
  AudioOnly,
}

impl StreamKind {
  pub fn label(self) -> &'static str {
    match self {
      StreamKind::Muxed => "muxed",
      StreamKind::VideoOnly => "video",
      StreamKind::AudioOnly => "audio",
    }
  }
}

/// One downloadable media variant of a video.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
  /// Opaque format selector understood by the client.
  pub format_id: String,
  /// Container, doubling as the file extension (`mp4`, `webm`, `m4a`).
  pub container: String,
  pub kind: StreamKind,
  /// Human quality label such as `720p` or `medium`.
  pub quality: Option<String>,
  pub resolution: Option<(u32, u32)>,
  pub fps: Option<f64>,
  pub video_codec: Option<String>,
  pub audio_codec: Option<String>,
  pub bitrate_kbps: Option<f64>,
  pub size: Option<u64>,
}

impl StreamInfo {
  /// Kind, container, quality and codecs. Callers show the size in its own column.
  pub fn label(&self) -> String {
    let mut parts = vec![self.kind.label().to_string(), self.container.clone()];
    if let Some(q) = &self.quality {
      parts.push(q.clone());
    } else if let Some((w, h)) = self.resolution {
      parts.push(format!("{}x{}", w, h));
    }
    if let Some(fps) = self.fps
      && self.kind != StreamKind::AudioOnly
    {
      parts.push(format!("{}fps", fps.round() as u32));
    }
    if let Some(kbps) = self.bitrate_kbps
      && self.kind == StreamKind::AudioOnly
    {
      parts.push(format!("{}k", kbps.round() as u32));
    }
    let codecs: Vec<&str> = [self.video_codec.as_deref(), self.audio_codec.as_deref()].into_iter().flatten().collect();
    if !codecs.is_empty() {
      parts.push(codecs.join("+"));
    }
    parts.join(" · ")
  }
}

/// All streams of a video, split by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamCatalog {
  pub muxed: Vec<StreamInfo>,
  pub video: Vec<StreamInfo>,
  pub audio: Vec<StreamInfo>,
}

impl StreamCatalog {
  pub fn from_streams(streams: impl IntoIterator<Item = StreamInfo>) -> Self {
    let mut catalog = Self::default();
    for stream in streams {
      match stream.kind {
        StreamKind::Muxed => catalog.muxed.push(stream),
        StreamKind::VideoOnly => catalog.video.push(stream),
        StreamKind::AudioOnly => catalog.audio.push(stream),
      }
    }
    catalog
  }

  /// Muxed first, then video-only, then audio-only.
  pub fn iter(&self) -> impl Iterator<Item = &StreamInfo> {
    self.muxed.iter().chain(&self.video).chain(&self.audio)
  }

  pub fn len(&self) -> usize {
    self.muxed.len() + self.video.len() + self.audio.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn find(&self, format_id: &str) -> Option<&StreamInfo> {
    self.iter().find(|s| s.format_id == format_id)
  }

  pub fn contains(&self, stream: &StreamInfo) -> bool {
    self.iter().any(|s| s == stream)
  }
}

/// One subtitle track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
  /// Language key as the client reports it (`en`, `de`, `en-orig`).
  pub language_code: String,
  /// Display name, e.g. `English`. Falls back to the code.
  pub language_name: String,
  pub auto_generated: bool,
}

impl CaptionTrack {
  pub fn label(&self) -> String {
    if self.auto_generated {
      format!("{} ({}, auto-generated)", self.language_name, self.language_code)
    } else {
      format!("{} ({})", self.language_name, self.language_code)
    }
  }
}

/// `1536` -> `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  if unit == 0 { format!("{} B", bytes) } else { format!("{:.1} {}", value, UNITS[unit]) }
}

/// `h:mm:ss` for long videos, `m:ss` otherwise.
pub fn format_duration(d: Duration) -> String {
  let total = d.as_secs();
  let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
  if h > 0 { format!("{}:{:02}:{:02}", h, m, s) } else { format!("{}:{:02}", m, s) }
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;

  pub fn video(title: &str) -> Video {
    Video {
      id: "dRZv355zZ1g".to_string(),
      title: title.to_string(),
      description: String::new(),
      duration: Some(Duration::from_secs(212)),
      upload_date: NaiveDate::from_ymd_opt(2017, 5, 1),
      view_count: Some(1_000),
      like_count: None,
      tags: Vec::new(),
      url: "https://www.youtube.com/watch?v=dRZv355zZ1g".to_string(),
    }
  }

  pub fn channel() -> Channel {
    Channel {
      id: "UCabc".to_string(),
      title: "Some Channel".to_string(),
      url: Some("https://www.youtube.com/channel/UCabc".to_string()),
      subscriber_count: Some(42),
    }
  }

  pub fn stream(format_id: &str, container: &str, kind: StreamKind) -> StreamInfo {
    StreamInfo {
      format_id: format_id.to_string(),
      container: container.to_string(),
      kind,
      quality: Some("720p".to_string()),
      resolution: Some((1280, 720)),
      fps: Some(30.0),
      video_codec: Some("avc1".to_string()),
      audio_codec: Some("mp4a".to_string()),
      bitrate_kbps: None,
      size: Some(10 * 1024 * 1024),
    }
  }

  pub fn caption(code: &str, name: &str) -> CaptionTrack {
    CaptionTrack { language_code: code.to_string(), language_name: name.to_string(), auto_generated: false }
  }
}
