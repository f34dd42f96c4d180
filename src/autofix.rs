//! Best-effort structural repair of SRT text before parsing.
//!
//! Only structural tokens are touched: sequence-id lines that sit directly above a time-range line,
//! and the time-range lines themselves. Everything else is cue text and passes through byte for byte,
//! line terminators included.

use regex::Regex;
use std::sync::LazyLock;

const BOM: char = '\u{feff}';

/// Any `H:M:S<sep>ms --> H:M:S<sep>ms` line, tolerant of field widths, separators and spacing.
static LOOSE_TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^\s*([0-9]{1,2}:[0-9]{1,2}:[0-9]{1,2}[,.:][0-9]{1,3})[ \t]*-->[ \t]*([0-9]{1,2}:[0-9]{1,2}:[0-9]{1,2}[,.:][0-9]{1,3})\s*$",
  )
  .expect("time range pattern is valid")
});

/// Output of [`auto_fix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixReport {
  pub corrected_text: String,
  pub fix_count: usize,
}

/// Repair common SRT malformations.
///
/// Idempotent: feeding `corrected_text` back in yields the same text and a `fix_count` of zero.
pub fn auto_fix(raw: &str) -> FixReport {
  let mut fix_count = 0;
  let body = raw.trim_start_matches(BOM);
  if body.len() != raw.len() {
    fix_count += 1;
  }

  let lines = split_keep_terminators(body);
  let mut corrected = String::with_capacity(body.len());

  for (i, &(content, terminator)) in lines.iter().enumerate() {
    if let Some((fixed, fixes)) = fix_time_range(content) {
      fix_count += fixes;
      corrected.push_str(&fixed);
    } else if is_id_line(content) && lines.get(i + 1).is_some_and(|(next, _)| LOOSE_TIME_RANGE.is_match(next)) {
      let trimmed = content.trim();
      if trimmed != content {
        fix_count += 1;
      }
      corrected.push_str(trimmed);
    } else {
      corrected.push_str(content);
    }
    corrected.push_str(terminator);
  }

  FixReport { corrected_text: corrected, fix_count }
}

fn is_id_line(line: &str) -> bool {
  let trimmed = line.trim();
  !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Canonicalize a time-range line. Returns `None` if the line is not one.
fn fix_time_range(line: &str) -> Option<(String, usize)> {
  let caps = LOOSE_TIME_RANGE.captures(line)?;
  let (raw_start, raw_end) = (&caps[1], &caps[2]);
  let start = canonical_timestamp(raw_start)?;
  let end = canonical_timestamp(raw_end)?;

  let mut fixes = usize::from(start != raw_start) + usize::from(end != raw_end);
  if format!("{} --> {}", raw_start, raw_end) != line {
    fixes += 1;
  }
  Some((format!("{} --> {}", start, end), fixes))
}

/// `H:M:S<sep>ms` in any tolerated width and separator into `HH:MM:SS,mmm`.
fn canonical_timestamp(ts: &str) -> Option<String> {
  let sep = ts.rfind([',', '.', ':'])?;
  let (clock, millis) = (&ts[..sep], &ts[sep + 1..]);
  let mut fields = clock.split(':');
  let (h, m, s) = (fields.next()?, fields.next()?, fields.next()?);
  if fields.next().is_some() || millis.is_empty() || millis.len() > 3 {
    return None;
  }
  // Milliseconds are a decimal fraction: ".5" means 500.
  Some(format!("{:0>2}:{:0>2}:{:0>2},{:0<3}", h, m, s, millis))
}

/// Split into `(content, terminator)` pairs, recognizing `\r\n`, `\n` and lone `\r`.
///
/// Concatenating every pair reproduces the input exactly.
fn split_keep_terminators(text: &str) -> Vec<(&str, &str)> {
  let bytes = text.as_bytes();
  let mut out = Vec::new();
  let mut start = 0;
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'\n' => {
        out.push((&text[start..i], &text[i..i + 1]));
        i += 1;
        start = i;
      }
      b'\r' => {
        let width = if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        out.push((&text[start..i], &text[i..i + width]));
        i += width;
        start = i;
      }
      _ => i += 1,
    }
  }
  if start < text.len() {
    out.push((&text[start..], ""));
  }
  out
}
