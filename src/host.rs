//! Host side of the sync protocol.
//!
//! Owns the cue list, resolves incoming time reports and sends text down only when it changes.
//! Fullscreen lifecycle notifications are forwarded to an orientation collaborator.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::autofix::auto_fix;
use crate::cues::CueList;
use crate::protocol::{Direction, SyncMessage};
use crate::srt::parse_srt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationLock {
  Landscape,
  Portrait,
}

/// Fire-and-forget orientation control, invoked once per fullscreen transition.
pub trait Orientation {
  fn lock(&mut self, lock: OrientationLock);
}

/// Orientation sink for platforms with nothing to rotate: just records the request in the log.
#[derive(Debug, Default)]
pub struct LogOrientation;

impl Orientation for LogOrientation {
  fn lock(&mut self, lock: OrientationLock) {
    info!(?lock, "host: orientation lock requested");
  }
}

/// What happened when a new subtitle blob was loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
  pub fix_count: usize,
  pub cue_count: usize,
  /// Clears the overlay if the previous list was showing something.
  pub clear: Option<SyncMessage>,
}

pub struct HostSession<O: Orientation> {
  cues: CueList,
  last_resolved_text: String,
  orientation: O,
}

impl<O: Orientation> HostSession<O> {
  pub fn new(orientation: O) -> Self {
    Self { cues: CueList::default(), last_resolved_text: String::new(), orientation }
  }

  pub fn cues(&self) -> &CueList {
    &self.cues
  }

  #[cfg(test)]
  pub fn orientation(&self) -> &O {
    &self.orientation
  }

  /// Auto-fix, parse and install a new subtitle blob.
  pub fn load_subtitles(&mut self, raw: &str) -> LoadSummary {
    let report = auto_fix(raw);
    if report.fix_count > 0 {
      info!(fixes = report.fix_count, "host: auto-fixed subtitle formatting");
    }
    let cues = CueList::new(parse_srt(&report.corrected_text));
    let cue_count = cues.len();
    info!(cues = cue_count, "host: subtitles loaded");
    if cues.is_empty() && !raw.trim().is_empty() {
      warn!("host: subtitle text contained no usable cues");
    }
    let clear = self.replace_cues(cues);
    LoadSummary { fix_count: report.fix_count, cue_count, clear }
  }

  /// Swap in a new cue list in one step. The next time report resolves against it.
  pub fn replace_cues(&mut self, cues: CueList) -> Option<SyncMessage> {
    self.cues = cues;
    let was_showing = !self.last_resolved_text.is_empty();
    self.last_resolved_text.clear();
    was_showing.then(|| SyncMessage::SetSubtitle(String::new()))
  }

  /// Resolve a time report. Returns a downward message only when the text changed.
  pub fn resolve(&mut self, t: f64) -> Option<SyncMessage> {
    let text = self.cues.text_at(t);
    if text == self.last_resolved_text {
      return None;
    }
    self.last_resolved_text = text.to_string();
    debug!(t, text = %self.last_resolved_text, "host: active cue changed");
    Some(SyncMessage::SetSubtitle(self.last_resolved_text.clone()))
  }

  pub fn handle_message(&mut self, msg: SyncMessage) -> Option<SyncMessage> {
    match msg {
      SyncMessage::CurrentTime(t) => self.resolve(t),
      SyncMessage::FullscreenOpen => {
        self.orientation.lock(OrientationLock::Landscape);
        None
      }
      SyncMessage::FullscreenClose => {
        self.orientation.lock(OrientationLock::Portrait);
        None
      }
      SyncMessage::SetSubtitle(_) => None,
    }
  }

  /// Decode one upward message and produce the encoded reply, if any. Garbage is dropped.
  pub fn handle_raw(&mut self, raw: &str) -> Option<String> {
    let msg = match SyncMessage::decode_for(raw, Direction::Up) {
      Ok(msg) => msg,
      Err(e) => {
        debug!(err = %e, "host: dropping upward message");
        return None;
      }
    };
    let reply = self.handle_message(msg)?;
    match reply.encode() {
      Ok(line) => Some(line),
      Err(e) => {
        warn!(err = %e, "host: failed to encode reply");
        None
      }
    }
  }
}

/// Commands the host accepts from the rest of the application.
#[derive(Debug)]
pub enum HostCommand {
  /// Replace the subtitles with a new raw blob.
  Load(String),
}

/// Drain the upward channel until the surface hangs up.
pub async fn run_host<O: Orientation>(
  mut session: HostSession<O>,
  mut upward: mpsc::UnboundedReceiver<String>,
  downward: mpsc::UnboundedSender<String>,
  mut commands: mpsc::UnboundedReceiver<HostCommand>,
) -> HostSession<O> {
  loop {
    let reply = tokio::select! {
      raw = upward.recv() => {
        let Some(raw) = raw else {
          info!("host: surface channel closed");
          break;
        };
        session.handle_raw(&raw)
      }
      Some(cmd) = commands.recv() => match cmd {
        HostCommand::Load(raw) => session.load_subtitles(&raw).clear.and_then(|m| m.encode().ok()),
      },
    };
    if let Some(line) = reply
      && downward.send(line).is_err()
    {
      info!("host: surface went away");
      break;
    }
  }
  debug!(cues = session.cues().len(), "host: stopped");
  session
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Default)]
  struct RecordingOrientation {
    locks: Vec<OrientationLock>,
  }

  impl Orientation for RecordingOrientation {
    fn lock(&mut self, lock: OrientationLock) {
      self.locks.push(lock);
    }
  }

  const SCENARIO_A: &str = "1\n00:00:01,000 --> 00:00:04,000\nHello world\n";

  fn host() -> HostSession<RecordingOrientation> {
    HostSession::new(RecordingOrientation::default())
  }

  fn time(t: f64) -> String {
    SyncMessage::CurrentTime(t).encode().unwrap()
  }

  #[test]
  fn resolves_reports_and_sends_only_changes() {
    let mut h = host();
    h.load_subtitles(SCENARIO_A);
    assert_eq!(h.handle_raw(&time(0.95)), None);
    assert_eq!(h.handle_raw(&time(1.05)).as_deref(), Some(r#"{"type":"setSubtitle","payload":"Hello world"}"#));
    assert_eq!(h.handle_raw(&time(1.20)), None);
  }

  #[test]
  fn never_repeats_a_payload_back_to_back() {
    let mut h = host();
    h.load_subtitles("1\n00:00:01,000 --> 00:00:02,000\nA\n\n2\n00:00:02,500 --> 00:00:04,000\nB\n\n3\n00:00:03,000 --> 00:00:05,000\nA\n");
    let mut sent: Vec<SyncMessage> = Vec::new();
    let mut t = 0.0;
    while t < 6.0 {
      sent.extend(h.resolve(t));
      t += 0.1;
    }
    for pair in sent.windows(2) {
      assert_ne!(pair[0], pair[1]);
    }
    let texts: Vec<&str> = sent
      .iter()
      .map(|m| match m {
        SyncMessage::SetSubtitle(s) => s.as_str(),
        other => panic!("unexpected {:?}", other),
      })
      .collect();
    // Cue 3 overlaps cue 2 from 3.0 to 4.0; cue 2 wins there.
    assert_eq!(texts, vec!["A", "", "B", "A", ""]);
  }

  #[test]
  fn fixed_timestamps_parse_and_report_the_count() {
    let mut h = host();
    let summary = h.load_subtitles("1\n00:00:01.000 --> 00:00:04,000\nHello world\n");
    assert_eq!(summary.fix_count, 1);
    assert_eq!(summary.cue_count, 1);
    assert_eq!(summary.clear, None);
  }

  #[test]
  fn empty_input_loads_no_cues() {
    let mut h = host();
    let summary = h.load_subtitles("");
    assert_eq!(summary.cue_count, 0);
    assert!(h.cues().is_empty());
    assert_eq!(h.handle_raw(&time(1.0)), None);
  }

  #[test]
  fn reload_clears_stale_text_and_resolves_against_new_list() {
    let mut h = host();
    h.load_subtitles(SCENARIO_A);
    assert!(h.resolve(2.0).is_some());

    let summary = h.load_subtitles("1\n00:00:01,000 --> 00:00:04,000\nBonjour\n");
    assert_eq!(summary.clear, Some(SyncMessage::SetSubtitle(String::new())));
    assert_eq!(h.resolve(2.0), Some(SyncMessage::SetSubtitle("Bonjour".to_string())));
  }

  #[test]
  fn reload_while_idle_sends_nothing() {
    let mut h = host();
    h.load_subtitles(SCENARIO_A);
    assert_eq!(h.load_subtitles(SCENARIO_A).clear, None);
  }

  #[test]
  fn lifecycle_messages_drive_orientation() {
    let mut h = host();
    assert_eq!(h.handle_raw(r#"{"type":"fullscreen_open"}"#), None);
    assert_eq!(h.handle_raw(r#"{"type":"fullscreen_close"}"#), None);
    assert_eq!(h.orientation().locks, vec![OrientationLock::Landscape, OrientationLock::Portrait]);
  }

  #[test]
  fn garbage_and_downward_messages_are_dropped() {
    let mut h = host();
    h.load_subtitles(SCENARIO_A);
    assert_eq!(h.handle_raw("]]"), None);
    assert_eq!(h.handle_raw(r#"{"type":"setSubtitle","payload":"x"}"#), None);
    assert_eq!(h.handle_raw(r#"{"type":"currentTime"}"#), None);
    assert!(h.orientation().locks.is_empty());
  }

  #[tokio::test]
  async fn run_host_replies_over_channels() {
    let (up_tx, up_rx) = mpsc::unbounded_channel();
    let (down_tx, mut down_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let mut h = host();
    h.load_subtitles(SCENARIO_A);
    for t in [0.95, 1.05, 1.20] {
      up_tx.send(time(t)).unwrap();
    }
    up_tx.send("not json".to_string()).unwrap();
    drop(up_tx);
    drop(cmd_tx);

    run_host(h, up_rx, down_tx, cmd_rx).await;

    let mut replies = Vec::new();
    while let Ok(line) = down_rx.try_recv() {
      replies.push(line);
    }
    assert_eq!(replies, vec![r#"{"type":"setSubtitle","payload":"Hello world"}"#.to_string()]);
  }
}
