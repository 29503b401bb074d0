use crate::constants::constants;
use crate::models::{CaptionTrack, StreamInfo, Video};

/// Characters rejected by at least one mainstream file system.
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace every character that is invalid in a file name with the configured substitute.
pub fn sanitize_file_name(name: &str) -> String {
  let substitute = constants().invalid_char_substitute;
  name.chars().map(|c| if INVALID_CHARS.contains(&c) || c.is_control() { substitute } else { c }).collect()
}

/// `<title>.<container>`, sanitized.
pub fn stream_file_name(video: &Video, stream: &StreamInfo) -> String {
  sanitize_file_name(&format!("{}.{}", video.title, stream.container))
}

/// `<title>.<language>.srt`, sanitized.
pub fn caption_file_name(video: &Video, track: &CaptionTrack) -> String {
  sanitize_file_name(&format!("{}.{}.{}", video.title, track.language_name, constants().caption_extension))
}
