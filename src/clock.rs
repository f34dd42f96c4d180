//! Rate-limited playback clock feed.
//!
//! Polled on a fixed period by the surface loop; a report goes upward only when the position has
//! moved by more than `epsilon` since the last report. Paused or missing sources report nothing.

use std::future::Future;
use std::time::Duration;

use crate::protocol::SyncMessage;

/// Below any valid playback position, so the first real sample always reports.
const UNREPORTED: f64 = -1.0;

/// A single observation of the playback source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSample {
  pub position: f64,
  pub paused: bool,
}

/// Something that can be asked for the current playback position.
pub trait PlaybackSource {
  /// `None` when there is no source to observe yet (no media loaded, player not reachable).
  fn sample(&mut self) -> impl Future<Output = Option<PlaybackSample>>;
}

/// Poll period and change threshold for the clock feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTiming {
  pub poll_interval: Duration,
  pub epsilon: f64,
}

#[derive(Debug, Clone)]
pub struct ClockFeed {
  epsilon: f64,
  last_reported: f64,
}

impl ClockFeed {
  pub fn new(epsilon: f64) -> Self {
    Self { epsilon, last_reported: UNREPORTED }
  }

  pub fn last_reported(&self) -> Option<f64> {
    (self.last_reported != UNREPORTED).then_some(self.last_reported)
  }

  /// Feed one poll result; returns the time report to send upward, if any.
  pub fn observe(&mut self, sample: Option<PlaybackSample>) -> Option<SyncMessage> {
    let sample = sample?;
    if sample.paused || !sample.position.is_finite() {
      return None;
    }
    if (sample.position - self.last_reported).abs() <= self.epsilon {
      return None;
    }
    self.last_reported = sample.position;
    Some(SyncMessage::CurrentTime(sample.position))
  }
}
