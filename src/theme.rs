use ratatui::style::Color;

/// Colour palette for the TUI. Cycled with `Ctrl+T` and persisted by name.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
  /// Filled part of the progress gauge.
  pub gauge: Color,
}

pub const THEMES: [Theme; 4] = [
  Theme {
    name: "Pastel",
    bg: Color::Rgb(30, 30, 46),
    fg: Color::Rgb(205, 214, 244),
    accent: Color::Rgb(245, 194, 231),
    muted: Color::Rgb(127, 132, 156),
    border: Color::Rgb(88, 91, 112),
    highlight_fg: Color::Rgb(30, 30, 46),
    highlight_bg: Color::Rgb(203, 166, 247),
    stripe_bg: Color::Rgb(36, 36, 54),
    status: Color::Rgb(249, 226, 175),
    error: Color::Rgb(243, 139, 168),
    key_fg: Color::Rgb(30, 30, 46),
    key_bg: Color::Rgb(180, 190, 254),
    gauge: Color::Rgb(166, 227, 161),
  },
  Theme {
    name: "Dusk",
    bg: Color::Rgb(40, 42, 54),
    fg: Color::Rgb(248, 248, 242),
    accent: Color::Rgb(255, 121, 198),
    muted: Color::Rgb(98, 114, 164),
    border: Color::Rgb(68, 71, 90),
    highlight_fg: Color::Rgb(40, 42, 54),
    highlight_bg: Color::Rgb(189, 147, 249),
    stripe_bg: Color::Rgb(46, 48, 62),
    status: Color::Rgb(241, 250, 140),
    error: Color::Rgb(255, 85, 85),
    key_fg: Color::Rgb(40, 42, 54),
    key_bg: Color::Rgb(139, 233, 253),
    gauge: Color::Rgb(80, 250, 123),
  },
  Theme {
    name: "Paper",
    bg: Color::Rgb(250, 244, 237),
    fg: Color::Rgb(87, 82, 121),
    accent: Color::Rgb(180, 99, 122),
    muted: Color::Rgb(152, 147, 165),
    border: Color::Rgb(206, 202, 205),
    highlight_fg: Color::Rgb(250, 244, 237),
    highlight_bg: Color::Rgb(144, 122, 169),
    stripe_bg: Color::Rgb(242, 233, 225),
    status: Color::Rgb(234, 157, 52),
    error: Color::Rgb(215, 130, 126),
    key_fg: Color::Rgb(250, 244, 237),
    key_bg: Color::Rgb(86, 148, 159),
    gauge: Color::Rgb(40, 105, 131),
  },
  Theme {
    name: "Terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Magenta,
    muted: Color::DarkGray,
    border: Color::Gray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    stripe_bg: Color::Reset,
    status: Color::Yellow,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::Gray,
    gauge: Color::Green,
  },
];

/// Index of the theme called `name`, or the first theme.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name == n)).unwrap_or(0)
}
