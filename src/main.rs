mod app;
mod config;
mod constants;
mod filename;
mod headless;
mod input;
mod models;
mod session;
mod theme;
mod ui;
mod window;
mod youtube;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use constants::constants;
use headless::Job;
use session::Session;
use youtube::{VideoClient, YtDlpClient};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Video URL or ID. Prefills the input box, or selects the video for headless runs.
  query: Option<String>,

  /// Print video details, streams and caption tracks, then exit
  #[arg(long, conflicts_with_all = ["stream", "caption"])]
  info: bool,

  /// Download the stream with this format id, then exit
  #[arg(long, value_name = "FORMAT_ID", conflicts_with = "caption")]
  stream: Option<String>,

  /// Download the caption track for this language code as SRT, then exit
  #[arg(long, value_name = "LANG")]
  caption: Option<String>,

  /// Destination file or folder for --stream / --caption (default: download folder)
  #[arg(short, long, value_name = "PATH")]
  output: Option<PathBuf>,

  /// Print a shell completion script and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<Shell>,
}

impl Args {
  fn job(&self) -> Option<Job> {
    if self.info {
      Some(Job::Info)
    } else if let Some(format_id) = &self.stream {
      Some(Job::Stream(format_id.clone()))
    } else {
      self.caption.as_ref().map(|lang| Job::Caption(lang.clone()))
    }
  }

  /// The bell goes to stdout, which headless runs reserve for their report.
  fn rings_bell(&self, config: &Config) -> bool {
    self.job().is_none() && config.notify_on_complete()
  }
}

// --- Logging ---

/// Log to a daily file under the data directory; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
  let dir = config::log_dir()?;
  std::fs::create_dir_all(&dir).ok()?;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "ytgrab.log"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init().ok()?;
  Some(guard)
}

fn ring_bell() {
  let mut out = std::io::stdout();
  let _ = out.write_all(b"\x07").and_then(|_| out.flush());
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), env!("CARGO_PKG_NAME"), &mut std::io::stdout());
    return Ok(());
  }

  let config = Config::load();
  let _log_guard = init_logging(&config);
  info!(version = env!("CARGO_PKG_VERSION"), "ytgrab starting");

  let client = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
  let query = args.query.clone().unwrap_or_else(|| constants().default_query.clone());
  let mut session = Session::new(client, query);
  if args.rings_bell(&config) {
    session = session.with_notifier(ring_bell);
  }

  if let Some(job) = args.job() {
    return headless::run(session, job, args.output, config.download_dir(), &mut std::io::stdout()).await;
  }

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, App::new(session, config)).await;
  ratatui::restore();
  info!("ytgrab exiting");
  result
}

async fn run<C: VideoClient>(terminal: &mut DefaultTerminal, mut app: App<C>) -> Result<()> {
  let tick = Duration::from_millis(constants().tick_millis);

  loop {
    app.poll();
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(tick)? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  Ok(())
}
