//! Strict SRT cue parser.
//!
//! Scans normalized text line by line with a three-state machine. A block that does not match the
//! exact `id / HH:MM:SS,mmm --> HH:MM:SS,mmm / text` shape is skipped without error; repairing
//! near-misses is the job of [`crate::autofix`].

use serde::Serialize;

/// One subtitle entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleCue {
  pub sequence_id: u32,
  /// Seconds.
  pub start_time: f64,
  /// Seconds.
  pub end_time: f64,
  pub text: String,
}

impl SubtitleCue {
  /// Render this cue as an SRT block, terminated by a newline (no trailing blank line).
  pub fn to_srt_block(&self) -> String {
    format!(
      "{}\n{} --> {}\n{}\n",
      self.sequence_id,
      format_timestamp(self.start_time),
      format_timestamp(self.end_time),
      self.text
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
  ExpectId,
  ExpectTimeRange,
  ExpectText,
}

/// Block under construction while scanning.
#[derive(Default)]
struct PendingCue<'a> {
  sequence_id: u32,
  start_time: f64,
  end_time: f64,
  lines: Vec<&'a str>,
}

impl PendingCue<'_> {
  fn finish(self) -> Option<SubtitleCue> {
    let text = self.lines.join("\n").trim().to_string();
    if text.is_empty() || self.start_time > self.end_time {
      return None;
    }
    Some(SubtitleCue { sequence_id: self.sequence_id, start_time: self.start_time, end_time: self.end_time, text })
  }
}

/// Replace `\r\n` and lone `\r` with `\n`.
pub fn normalize_line_endings(text: &str) -> String {
  text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Parse raw SRT text into cues in source order.
///
/// Empty or whitespace-only input yields an empty list.
pub fn parse_srt(raw: &str) -> Vec<SubtitleCue> {
  let text = normalize_line_endings(raw);
  let mut cues = Vec::new();
  let mut state = ScanState::ExpectId;
  let mut pending = PendingCue::default();

  for line in text.split('\n') {
    match state {
      ScanState::ExpectId => {
        if let Some(id) = parse_sequence_id(line) {
          pending = PendingCue { sequence_id: id, ..PendingCue::default() };
          state = ScanState::ExpectTimeRange;
        }
      }
      ScanState::ExpectTimeRange => {
        if let Some((start, end)) = parse_time_range(line) {
          pending.start_time = start;
          pending.end_time = end;
          state = ScanState::ExpectText;
        } else if let Some(id) = parse_sequence_id(line) {
          // Abandoned block; this line may open the next one.
          pending = PendingCue { sequence_id: id, ..PendingCue::default() };
        } else {
          state = ScanState::ExpectId;
        }
      }
      ScanState::ExpectText => {
        if line.trim().is_empty() {
          cues.extend(std::mem::take(&mut pending).finish());
          state = ScanState::ExpectId;
        } else {
          pending.lines.push(line);
        }
      }
    }
  }

  if state == ScanState::ExpectText {
    cues.extend(pending.finish());
  }
  cues
}

/// A bare run of ASCII digits, nothing else on the line.
fn parse_sequence_id(line: &str) -> Option<u32> {
  if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  line.parse().ok()
}

/// `HH:MM:SS,mmm --> HH:MM:SS,mmm` with exactly one space on each side of the arrow.
fn parse_time_range(line: &str) -> Option<(f64, f64)> {
  let (start, end) = line.split_once(" --> ")?;
  Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

/// Parse a strict `HH:MM:SS,mmm` timestamp into seconds.
pub fn parse_timestamp(ts: &str) -> Option<f64> {
  let b = ts.as_bytes();
  if b.len() != 12 || b[2] != b':' || b[5] != b':' || b[8] != b',' {
    return None;
  }
  let field = |range: std::ops::Range<usize>| -> Option<u32> {
    let digits = &ts[range];
    if !digits.bytes().all(|c| c.is_ascii_digit()) {
      return None;
    }
    digits.parse().ok()
  };
  let hours = field(0..2)?;
  let minutes = field(3..5)?;
  let seconds = field(6..8)?;
  let millis = field(9..12)?;
  Some(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + f64::from(seconds) + f64::from(millis) / 1000.0)
}

/// Format seconds as `HH:MM:SS,mmm`, rounded to the nearest millisecond.
///
/// Negative and non-finite inputs clamp to zero. Hours wider than two digits are printed in full.
pub fn format_timestamp(seconds: f64) -> String {
  let total_ms = if seconds.is_finite() && seconds > 0.0 { (seconds * 1000.0).round() as u64 } else { 0 };
  let hours = total_ms / 3_600_000;
  let minutes = (total_ms % 3_600_000) / 60_000;
  let secs = (total_ms % 60_000) / 1_000;
  let millis = total_ms % 1_000;
  format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
