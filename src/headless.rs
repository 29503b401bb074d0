//! Non-interactive front end: fetch once, then print or download and exit.

use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::models::{format_duration, format_size};
use crate::session::{DownloadStart, SaveFilter, Session};
use crate::youtube::VideoClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
  Info,
  Stream(String),
  Caption(String),
}

/// Where a headless download goes: `output` if it names a file, `output/<default>`
/// if it is a directory, otherwise `<download dir>/<default>`.
fn destination(output: Option<PathBuf>, download_dir: PathBuf) -> impl FnMut(&str, &SaveFilter) -> Option<PathBuf> {
  move |default_name: &str, _: &SaveFilter| {
    Some(match &output {
      Some(p) if p.is_dir() => p.join(default_name),
      Some(p) => p.clone(),
      None => download_dir.join(default_name),
    })
  }
}

pub async fn run<C: VideoClient>(
  mut session: Session<C>,
  job: Job,
  output: Option<PathBuf>,
  download_dir: PathBuf,
  out: &mut impl Write,
) -> Result<()> {
  info!(job = ?job, query = %session.query(), "headless: starting");
  session.fetch_metadata()?;
  session.settle().await;
  if let Some(err) = session.take_error() {
    bail!(err);
  }

  let mut prompt = destination(output, download_dir);
  let start = match job {
    Job::Info => return print_info(&session, out),
    Job::Stream(format_id) => {
      let stream = session
        .streams()
        .and_then(|c| c.find(&format_id))
        .cloned()
        .with_context(|| format!("No stream with format id {} (see --info)", format_id))?;
      session.download_media_stream(&stream, &mut prompt)?
    }
    Job::Caption(lang) => {
      let track = session
        .captions()
        .and_then(|tracks| tracks.iter().find(|t| t.language_code == lang))
        .cloned()
        .with_context(|| format!("No caption track for language {} (see --info)", lang))?;
      session.download_caption_track(&track, &mut prompt)?
    }
  };

  let DownloadStart::Started(path) = start else {
    bail!("Download cancelled");
  };
  while session.is_busy() {
    let flags = session.next().await;
    if flags.is_busy {
      eprint!("\r{:>5.1}%", flags.progress * 100.0);
    }
  }
  eprintln!();
  if let Some(err) = session.take_error() {
    bail!(err);
  }
  writeln!(out, "Saved {}", path.display())?;
  Ok(())
}

fn print_info<C: VideoClient>(session: &Session<C>, out: &mut impl Write) -> Result<()> {
  let video = session.video().context("No video loaded")?;
  writeln!(out, "{}", video.title)?;
  if let Some(channel) = session.channel() {
    match channel.url.as_deref().filter(|_| !channel.id.is_empty()) {
      Some(url) => writeln!(out, "  channel   {} [{}] {}", channel.title, channel.id, url)?,
      None => writeln!(out, "  channel   {}", channel.title)?,
    }
  }
  if let Some(d) = video.duration {
    writeln!(out, "  duration  {}", format_duration(d))?;
  }
  if let Some(date) = video.upload_date {
    writeln!(out, "  uploaded  {}", date)?;
  }
  if let Some(views) = video.view_count {
    writeln!(out, "  views     {}", views)?;
  }
  writeln!(out, "  url       {}", video.url)?;

  writeln!(out, "\nStreams:")?;
  for s in session.streams().into_iter().flat_map(|c| c.iter()) {
    let size = s.size.map(format_size).unwrap_or_default();
    writeln!(out, "  {:>8}  {}  {}", s.format_id, s.label(), size)?;
  }

  writeln!(out, "\nCaptions:")?;
  let tracks = session.captions().unwrap_or_default();
  if tracks.is_empty() {
    writeln!(out, "  (none)")?;
  }
  for t in tracks {
    writeln!(out, "  {:>8}  {}", t.language_code, t.label())?;
  }
  Ok(())
}
