use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, Gauge, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode};
use crate::models::{format_duration, format_size};
use crate::theme::Theme;
use crate::youtube::VideoClient;

const SPINNER: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Slice of `text` visible in a field `inner_w` columns wide, keeping the cursor in view.
///
/// Returns the visible text and the cursor column relative to the field.
fn scroll_field(text: &str, cursor: usize, scroll: &mut usize, inner_w: usize) -> (String, usize) {
  if inner_w == 0 {
    return (String::new(), 0);
  }
  let cursor_col = display_width(text, cursor);
  if cursor_col < *scroll {
    *scroll = cursor_col;
  } else if cursor_col >= *scroll + inner_w {
    *scroll = cursor_col.saturating_sub(inner_w) + 1;
  }
  let start_col = *scroll;

  let visible = text
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= start_col)
    .take_while(|(start, _, _)| *start < start_col + inner_w)
    .map(|(_, _, c)| c)
    .collect();
  (visible, cursor_col - start_col)
}

fn rounded_block<'a>(theme: &Theme) -> Block<'a> {
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border))
}

fn thousands(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

// --- UI Rendering ---

pub fn ui<C: VideoClient>(frame: &mut Frame, app: &mut App<C>) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, theme, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);

  if app.mode == AppMode::SavePrompt {
    render_save_prompt(frame, app, main_area);
  }
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(" ⬇ ytgrab ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main<C: VideoClient>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
  if app.session.video().is_none() {
    render_welcome(frame, app.theme(), area);
    return;
  }

  let [details_area, list_area] =
    Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)]).areas(area);
  render_details(frame, app, details_area);

  let show_captions = match app.mode {
    AppMode::Captions => true,
    AppMode::SavePrompt => app.save.as_ref().is_some_and(|d| d.return_mode == AppMode::Captions),
    _ => false,
  };
  if show_captions {
    render_captions(frame, app, list_area);
  } else {
    render_streams(frame, app, list_area);
  }
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("⬇  Welcome to ytgrab", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Inspect a YouTube video. Save its streams and captions.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled("Paste a URL or video ID below and press Enter.", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(rounded_block(theme));
  frame.render_widget(paragraph, area);
}

fn render_details<C: VideoClient>(frame: &mut Frame, app: &App<C>, area: Rect) {
  let theme = app.theme();
  let block = rounded_block(theme)
    .title(" Video ")
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .padding(Padding::horizontal(1));

  let Some(video) = app.session.video() else {
    frame.render_widget(block, area);
    return;
  };
  let inner_w = area.width.saturating_sub(4) as usize;

  let field = |label: &'static str, value: String| {
    Line::from(vec![
      Span::styled(format!("{:<12}", label), Style::default().fg(theme.muted)),
      Span::styled(truncate_str(&value, inner_w.saturating_sub(12)), Style::default().fg(theme.fg)),
    ])
  };

  let mut lines = vec![
    Line::from(Span::styled(truncate_str(&video.title, inner_w), Style::default().fg(theme.fg).bold())),
    Line::from(""),
  ];
  match app.session.channel() {
    Some(channel) => {
      lines.push(field("Channel", channel.title.clone()));
      if let Some(url) = &channel.url {
        lines.push(field("", url.clone()));
      }
      if let Some(subs) = channel.subscriber_count {
        lines.push(field("Subscribers", thousands(subs)));
      }
    }
    None => lines.push(field("Channel", "…".to_string())),
  }
  if let Some(d) = video.duration {
    lines.push(field("Duration", format_duration(d)));
  }
  if let Some(date) = video.upload_date {
    lines.push(field("Uploaded", date.format("%Y-%m-%d").to_string()));
  }
  if let Some(views) = video.view_count {
    lines.push(field("Views", thousands(views)));
  }
  if let Some(likes) = video.like_count {
    lines.push(field("Likes", thousands(likes)));
  }
  if !video.tags.is_empty() {
    lines.push(field("Tags", video.tags.join(", ")));
  }
  lines.push(Line::from(Span::styled(
    truncate_str(&video.url, inner_w),
    Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
  )));
  if !video.description.is_empty() {
    lines.push(Line::from(""));
    lines.extend(video.description.lines().map(|l| Line::from(Span::styled(l, Style::default().fg(theme.muted)))));
  }

  let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
  frame.render_widget(paragraph, area);
}

fn list_block<'a>(theme: &Theme, title: String, focused: bool) -> Block<'a> {
  let color = if focused { theme.accent } else { theme.border };
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
}

fn striped_item<'a>(theme: &Theme, i: usize, selected: Option<usize>, line: Line<'a>) -> ListItem<'a> {
  let bg = if Some(i) == selected {
    theme.highlight_bg
  } else if i % 2 == 1 {
    theme.stripe_bg
  } else {
    theme.bg
  };
  ListItem::new(line).bg(bg)
}

fn render_streams<C: VideoClient>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
  let theme = app.theme();
  let focused = app.mode == AppMode::Streams;
  let inner_w = area.width.saturating_sub(4) as usize;
  let selected = app.stream_state.selected();

  let (items, count): (Vec<ListItem>, usize) = match app.session.streams() {
    Some(catalog) => {
      let items = catalog
        .iter()
        .enumerate()
        .map(|(i, s)| {
          let fg = if Some(i) == selected { theme.highlight_fg } else { theme.fg };
          let size = s.size.map(format_size).unwrap_or_default();
          let label_max = inner_w.saturating_sub(size.chars().count() + 2);
          let label = truncate_str(&s.label(), label_max);
          let gap = inner_w.saturating_sub(label.chars().count() + size.chars().count());
          let line = Line::from(vec![
            Span::styled(label, Style::default().fg(fg)),
            Span::raw(" ".repeat(gap)),
            Span::styled(size, Style::default().fg(theme.muted)),
          ]);
          striped_item(theme, i, selected, line)
        })
        .collect();
      (items, catalog.len())
    }
    None => (Vec::new(), 0),
  };

  let title = match app.session.streams() {
    Some(catalog) if catalog.is_empty() => " Streams (none) ".to_string(),
    Some(_) => format!(" Streams ({}) ", count),
    None => " Streams … ".to_string(),
  };
  let list = List::new(items)
    .block(list_block(theme, title, focused))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, area, &mut app.stream_state);
}

fn render_captions<C: VideoClient>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
  let theme = app.theme();
  let focused = app.mode == AppMode::Captions;
  let inner_w = area.width.saturating_sub(4) as usize;
  let selected = app.caption_state.selected();

  let tracks = app.session.captions().unwrap_or_default();
  let items: Vec<ListItem> = tracks
    .iter()
    .enumerate()
    .map(|(i, t)| {
      let fg = if Some(i) == selected { theme.highlight_fg } else { theme.fg };
      let line = Line::from(Span::styled(truncate_str(&t.label(), inner_w), Style::default().fg(fg)));
      striped_item(theme, i, selected, line)
    })
    .collect();

  let title =
    if tracks.is_empty() { " Captions (none) ".to_string() } else { format!(" Captions ({}) ", tracks.len()) };
  let list = List::new(items)
    .block(list_block(theme, title, focused))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, area, &mut app.caption_state);
}

fn render_status<C: VideoClient>(frame: &mut Frame, app: &App<C>, area: Rect) {
  let theme = app.theme();
  let flags = app.session.flags();

  if flags.is_busy && !flags.progress_indeterminate {
    let msg = app.status_message().unwrap_or_default();
    let gauge = Gauge::default()
      .gauge_style(Style::default().fg(theme.gauge).bg(theme.stripe_bg))
      .ratio(flags.progress)
      .label(format!("{} {:.0}%", msg, flags.progress * 100.0));
    frame.render_widget(gauge, area);
    return;
  }

  let (text, style) = if let Some(msg) = app.status_message() {
    let tick = (app.started_at.elapsed().as_millis() / 100) as usize % SPINNER.len();
    (format!(" {} {}", SPINNER[tick], msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ✓ {}", info), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input<C: VideoClient>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Input { theme.accent } else { theme.border };
  let input_block = Block::bordered()
    .title(" Video URL or ID ")
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let (visible, cursor_col) = scroll_field(&app.input, app.cursor_position, &mut app.input_scroll, inner_w);

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Input {
    frame.set_cursor_position((area.x + 2 + cursor_col as u16, area.y + 1));
  }
}

fn render_save_prompt<C: VideoClient>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
  let theme = app.theme();
  let Some(dialog) = app.save.as_mut() else { return };

  let width = area.width.saturating_sub(4).min(90);
  let x = area.x + (area.width - width) / 2;
  let y = area.y + area.height.saturating_sub(3) / 2;
  let popup = Rect { x, y, width, height: 3 }.intersection(frame.area());
  frame.render_widget(Clear, popup);

  let block = Block::bordered()
    .title(dialog.title())
    .title_bottom(Line::from(Span::styled(" Enter save · Esc cancel ", Style::default().fg(theme.muted))))
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));

  let inner_w = popup.width.saturating_sub(4) as usize;
  let (visible, cursor_col) = scroll_field(&dialog.path, dialog.cursor, &mut dialog.scroll, inner_w);
  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), popup);
  frame.set_cursor_position((popup.x + 2 + cursor_col as u16, popup.y + 1));
}

fn render_footer<C: VideoClient>(frame: &mut Frame, app: &App<C>, area: Rect) {
  let theme = app.theme();
  let flags = app.session.flags();
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Input => {
      let mut k = Vec::new();
      if flags.fetch_enabled {
        k.push(("Enter", "Fetch"));
      }
      if flags.is_data_available {
        k.push(("Tab", "Lists"));
      }
      k.push(("^o", "Folder"));
      k.push(("^t", "Theme"));
      k.push(("Esc", if app.input.is_empty() { "Quit" } else { "Clear" }));
      k
    }
    AppMode::Streams | AppMode::Captions => {
      let mut k = vec![];
      if flags.download_enabled {
        k.push(("Enter", "Save"));
      }
      k.push(("j/k", "Navigate"));
      k.push(("Tab", if app.mode == AppMode::Streams { "Captions" } else { "Streams" }));
      k.push(("^o", "Folder"));
      k.push(("Esc", "Back"));
      k
    }
    AppMode::SavePrompt => vec![("Enter", "Save"), ("Esc", "Cancel")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
