use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, AppMode};
use crate::youtube::VideoClient;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Apply a single-line editing key to `text`. Returns `true` if the text changed.
///
/// Keys that are not editing keys are ignored; the caller handles Enter and Esc.
pub fn edit_line(text: &mut String, cursor: &mut usize, key: KeyCode) -> bool {
  match key {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(text, *cursor);
      text.insert(byte_idx, c);
      *cursor += 1;
      true
    }
    KeyCode::Backspace if *cursor > 0 => {
      *cursor -= 1;
      let byte_idx = char_to_byte_index(text, *cursor);
      text.remove(byte_idx);
      true
    }
    KeyCode::Delete if *cursor < text.chars().count() => {
      let byte_idx = char_to_byte_index(text, *cursor);
      text.remove(byte_idx);
      true
    }
    KeyCode::Left => {
      *cursor = cursor.saturating_sub(1);
      false
    }
    KeyCode::Right => {
      if *cursor < text.chars().count() {
        *cursor += 1;
      }
      false
    }
    KeyCode::Home => {
      *cursor = 0;
      false
    }
    KeyCode::End => {
      *cursor = text.chars().count();
      false
    }
    _ => false,
  }
}

// --- Event Handling ---

pub fn handle_key_event<C: VideoClient>(app: &mut App<C>, key: KeyEvent) {
  let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

  if ctrl && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  if ctrl && key.code == KeyCode::Char('t') {
    app.next_theme();
    return;
  }

  if ctrl && key.code == KeyCode::Char('o') {
    app.open_download_folder();
    return;
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Streams | AppMode::Captions => handle_list_key(app, key),
    AppMode::SavePrompt => handle_save_key(app, key),
  }
}

fn handle_input_key<C: VideoClient>(app: &mut App<C>, key: KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.trigger_fetch();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
        app.sync_query();
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down | KeyCode::Tab => {
      app.enter_list(AppMode::Streams);
    }
    code => {
      if edit_line(&mut app.input, &mut app.cursor_position, code) {
        app.sync_query();
      }
    }
  }
}

fn handle_list_key<C: VideoClient>(app: &mut App<C>, key: KeyEvent) {
  match key.code {
    KeyCode::Enter | KeyCode::Char('s') => {
      app.open_save_prompt();
    }
    KeyCode::Tab => {
      let next = if app.mode == AppMode::Streams { AppMode::Captions } else { AppMode::Streams };
      app.enter_list(next);
    }
    KeyCode::Down | KeyCode::Char('j') => {
      let count = app.list_len();
      if count > 0
        && let Some(state) = app.list_state_mut()
      {
        let i = state.selected().map_or(0, |i| (i + 1) % count);
        state.select(Some(i));
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      let count = app.list_len();
      if count > 0
        && let Some(state) = app.list_state_mut()
      {
        let i = state.selected().map_or(0, |i| if i == 0 { count - 1 } else { i - 1 });
        state.select(Some(i));
      }
    }
    KeyCode::Esc => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_save_key<C: VideoClient>(app: &mut App<C>, key: KeyEvent) {
  match key.code {
    KeyCode::Enter => app.confirm_save(),
    KeyCode::Esc => app.cancel_save(),
    code => {
      if let Some(dialog) = app.save.as_mut() {
        edit_line(&mut dialog.path, &mut dialog.cursor, code);
      }
    }
  }
}
