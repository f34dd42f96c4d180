use crate::srt::SubtitleCue;

/// Immutable cue list in source order.
///
/// Built once from a text blob and replaced wholesale; lookups never re-sort or re-index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueList {
  cues: Vec<SubtitleCue>,
}

impl CueList {
  pub fn new(cues: Vec<SubtitleCue>) -> Self {
    Self { cues }
  }

  pub fn len(&self) -> usize {
    self.cues.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cues.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &SubtitleCue> {
    self.cues.iter()
  }

  /// The first cue in list order whose closed interval contains `t`.
  ///
  /// Overlapping cues resolve to whichever appears first in the source. Negative or NaN times
  /// resolve to nothing.
  pub fn active_at(&self, t: f64) -> Option<&SubtitleCue> {
    if t.is_nan() || t < 0.0 {
      return None;
    }
    self.cues.iter().find(|c| c.start_time <= t && t <= c.end_time)
  }

  /// Text of the active cue, or `""` when nothing is active.
  pub fn text_at(&self, t: f64) -> &str {
    self.active_at(t).map_or("", |c| c.text.as_str())
  }
}
