//! Rendering surface: owns the subtitle display node, the clock feed and the reattachment watcher.
//!
//! The surface only talks to the host through encoded [`SyncMessage`]s. It reports playback time
//! and fullscreen lifecycle changes upward, and applies `setSubtitle` text coming down.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{ClockFeed, ClockTiming, PlaybackSample, PlaybackSource};
use crate::protocol::{Direction, SyncMessage};

/// Opaque handle to an element that can host the overlay while fullscreen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// Where the display node currently hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
  Root,
  Element(ElementId),
}

/// The tree the display node lives in.
///
/// `append_overlay` has move semantics: the node is detached from its previous parent, so it never
/// has more than one.
pub trait Document {
  fn fullscreen_element(&self) -> Option<ElementId>;
  fn overlay_parent(&self) -> Option<Parent>;
  fn append_overlay(&mut self, parent: Parent);
  fn paint_overlay(&mut self, text: &str, visible: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
  AttachedToRoot,
  AttachedToFullscreenHost,
}

/// Keeps the display node under the fullscreen element (or the root) across transitions.
///
/// Lifecycle state only moves on fullscreen-change events. The corrective check fixes placement
/// after a missed event but never notifies and never touches the lifecycle state.
#[derive(Debug)]
pub struct ReattachmentWatcher {
  state: WatcherState,
}

impl Default for ReattachmentWatcher {
  fn default() -> Self {
    Self { state: WatcherState::AttachedToRoot }
  }
}

impl ReattachmentWatcher {
  pub fn state(&self) -> WatcherState {
    self.state
  }

  pub fn expected_parent<D: Document>(doc: &D) -> Parent {
    doc.fullscreen_element().map_or(Parent::Root, Parent::Element)
  }

  /// Handle a platform fullscreen-change event. Returns a lifecycle message on a genuine transition.
  pub fn on_fullscreen_change<D: Document>(&mut self, doc: &mut D) -> Option<SyncMessage> {
    let target = Self::expected_parent(doc);
    place(doc, target);

    let next = match target {
      Parent::Root => WatcherState::AttachedToRoot,
      Parent::Element(_) => WatcherState::AttachedToFullscreenHost,
    };
    if next == self.state {
      debug!(?next, "surface: fullscreen event without state change");
      return None;
    }
    self.state = next;
    info!(state = ?next, "surface: fullscreen transition");
    Some(match next {
      WatcherState::AttachedToFullscreenHost => SyncMessage::FullscreenOpen,
      WatcherState::AttachedToRoot => SyncMessage::FullscreenClose,
    })
  }

  /// Periodic placement repair. Returns whether the node had to be moved.
  pub fn corrective_check<D: Document>(&self, doc: &mut D) -> bool {
    let moved = place(doc, Self::expected_parent(doc));
    if moved {
      info!("surface: corrective check re-parented overlay");
    }
    moved
  }
}

fn place<D: Document>(doc: &mut D, target: Parent) -> bool {
  if doc.overlay_parent() == Some(target) {
    return false;
  }
  doc.append_overlay(target);
  true
}

/// Session-scoped state for one rendering surface.
pub struct SurfaceSession<D: Document> {
  document: D,
  clock: ClockFeed,
  watcher: ReattachmentWatcher,
  last_displayed_text: String,
}

impl<D: Document> SurfaceSession<D> {
  /// Attach a hidden display node to the document root.
  pub fn new(mut document: D, epsilon: f64) -> Self {
    document.append_overlay(Parent::Root);
    document.paint_overlay("", false);
    Self {
      document,
      clock: ClockFeed::new(epsilon),
      watcher: ReattachmentWatcher::default(),
      last_displayed_text: String::new(),
    }
  }

  #[cfg(test)]
  pub fn document(&self) -> &D {
    &self.document
  }

  #[cfg(test)]
  pub fn document_mut(&mut self) -> &mut D {
    &mut self.document
  }

  pub fn watcher_state(&self) -> WatcherState {
    self.watcher.state()
  }

  pub fn displayed_text(&self) -> &str {
    &self.last_displayed_text
  }

  /// Decode and apply one downward message. Malformed or misdirected messages are dropped.
  pub fn handle_downward(&mut self, raw: &str) -> bool {
    match SyncMessage::decode_for(raw, Direction::Down) {
      Ok(SyncMessage::SetSubtitle(text)) => self.apply_subtitle(&text),
      Ok(_) => false,
      Err(e) => {
        debug!(err = %e, "surface: dropping downward message");
        false
      }
    }
  }

  /// Update the display node only if the text actually changed.
  pub fn apply_subtitle(&mut self, text: &str) -> bool {
    if text == self.last_displayed_text {
      return false;
    }
    self.document.paint_overlay(text, !text.is_empty());
    self.last_displayed_text = text.to_string();
    true
  }

  pub fn on_clock_sample(&mut self, sample: Option<PlaybackSample>) -> Option<SyncMessage> {
    self.clock.observe(sample)
  }

  pub fn on_fullscreen_change(&mut self) -> Option<SyncMessage> {
    self.watcher.on_fullscreen_change(&mut self.document)
  }

  pub fn corrective_check(&mut self) -> bool {
    self.watcher.corrective_check(&mut self.document)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceTiming {
  pub clock: ClockTiming,
  pub parent_check_interval: Duration,
}

/// Channels connecting a surface to its host and to the platform.
pub struct SurfaceLinks {
  /// Fires whenever the platform reports a fullscreen change. Coalescing is fine.
  pub fullscreen_events: mpsc::Receiver<()>,
  pub downward: mpsc::UnboundedReceiver<String>,
  pub upward: mpsc::UnboundedSender<String>,
}

/// Drive a surface until the host hangs up. Returns the session for inspection.
pub async fn run_surface<S, D>(
  mut session: SurfaceSession<D>,
  mut source: S,
  links: SurfaceLinks,
  timing: SurfaceTiming,
) -> SurfaceSession<D>
where
  S: PlaybackSource,
  D: Document,
{
  let SurfaceLinks { mut fullscreen_events, mut downward, upward } = links;

  let mut poll = tokio::time::interval(timing.clock.poll_interval);
  poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let mut parent_check = tokio::time::interval(timing.parent_check_interval);
  parent_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    let outgoing = tokio::select! {
      _ = poll.tick() => {
        let sample = source.sample().await;
        session.on_clock_sample(sample)
      }
      _ = parent_check.tick() => {
        session.corrective_check();
        None
      }
      Some(()) = fullscreen_events.recv() => session.on_fullscreen_change(),
      raw = downward.recv() => {
        let Some(raw) = raw else {
          info!("surface: host channel closed");
          break;
        };
        session.handle_downward(&raw);
        None
      }
    };

    let Some(msg) = outgoing else { continue };
    match msg.encode() {
      Ok(line) => {
        if upward.send(line).is_err() {
          info!("surface: host went away");
          break;
        }
      }
      Err(e) => warn!(err = %e, kind = msg.kind(), "surface: failed to encode upward message"),
    }
  }
  info!(
    state = ?session.watcher_state(),
    last_time = ?session.clock.last_reported(),
    text = session.displayed_text(),
    "surface: stopped"
  );
  session
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;

  /// In-memory tree: a root plus any number of elements, one of which may be fullscreen.
  #[derive(Debug, Default)]
  struct MemoryDocument {
    fullscreen: Option<ElementId>,
    /// Every parent the node is currently a child of. The invariant is `len() <= 1`.
    parents: Vec<Parent>,
    text: String,
    visible: bool,
    paints: usize,
  }

  impl Document for MemoryDocument {
    fn fullscreen_element(&self) -> Option<ElementId> {
      self.fullscreen
    }

    fn overlay_parent(&self) -> Option<Parent> {
      self.parents.first().copied()
    }

    fn append_overlay(&mut self, parent: Parent) {
      self.parents.clear();
      self.parents.push(parent);
    }

    fn paint_overlay(&mut self, text: &str, visible: bool) {
      self.text = text.to_string();
      self.visible = visible;
      self.paints += 1;
    }
  }

  const PLAYER: ElementId = ElementId(7);
  const OTHER: ElementId = ElementId(9);

  fn session() -> SurfaceSession<MemoryDocument> {
    SurfaceSession::new(MemoryDocument::default(), 0.15)
  }

  #[test]
  fn starts_hidden_under_root() {
    let s = session();
    assert_eq!(s.document().overlay_parent(), Some(Parent::Root));
    assert!(!s.document().visible);
    assert_eq!(s.watcher_state(), WatcherState::AttachedToRoot);
  }

  #[test]
  fn subtitle_updates_skip_identical_text() {
    let mut s = session();
    let paints = s.document().paints;
    assert!(s.handle_downward(r#"{"type":"setSubtitle","payload":"Hello"}"#));
    assert!(!s.handle_downward(r#"{"type":"setSubtitle","payload":"Hello"}"#));
    assert_eq!(s.document().paints, paints + 1);
    assert!(s.document().visible);
    assert_eq!(s.document().text, "Hello");

    assert!(s.handle_downward(r#"{"type":"setSubtitle","payload":""}"#));
    assert!(!s.document().visible);
    assert_eq!(s.displayed_text(), "");
  }

  #[test]
  fn bad_downward_messages_are_ignored() {
    let mut s = session();
    assert!(!s.handle_downward("{oops"));
    assert!(!s.handle_downward(r#"{"type":"currentTime","payload":3}"#));
    assert!(!s.handle_downward(r#"{"type":"setSubtitle","payload":5}"#));
    assert_eq!(s.document().text, "");
  }

  #[test]
  fn enter_and_exit_notify_once_each() {
    let mut s = session();
    s.document_mut().fullscreen = Some(PLAYER);
    assert_eq!(s.on_fullscreen_change(), Some(SyncMessage::FullscreenOpen));
    assert_eq!(s.document().overlay_parent(), Some(Parent::Element(PLAYER)));
    // Vendor-prefixed and standard events both fire for the same transition.
    assert_eq!(s.on_fullscreen_change(), None);

    s.document_mut().fullscreen = None;
    assert_eq!(s.on_fullscreen_change(), Some(SyncMessage::FullscreenClose));
    assert_eq!(s.document().overlay_parent(), Some(Parent::Root));
    assert_eq!(s.on_fullscreen_change(), None);
  }

  #[test]
  fn switching_fullscreen_hosts_moves_silently() {
    let mut s = session();
    s.document_mut().fullscreen = Some(PLAYER);
    assert_eq!(s.on_fullscreen_change(), Some(SyncMessage::FullscreenOpen));
    s.document_mut().fullscreen = Some(OTHER);
    assert_eq!(s.on_fullscreen_change(), None);
    assert_eq!(s.document().overlay_parent(), Some(Parent::Element(OTHER)));
  }

  #[test]
  fn corrective_check_repairs_missed_event_without_notifying() {
    let mut s = session();
    s.document_mut().fullscreen = Some(PLAYER);
    assert!(s.corrective_check());
    assert_eq!(s.document().overlay_parent(), Some(Parent::Element(PLAYER)));
    assert_eq!(s.watcher_state(), WatcherState::AttachedToRoot);
    assert!(!s.corrective_check());

    // The late event is still the one that notifies.
    assert_eq!(s.on_fullscreen_change(), Some(SyncMessage::FullscreenOpen));
  }

  #[test]
  fn corrective_check_restores_a_detached_node() {
    let mut s = session();
    s.document_mut().parents.clear();
    assert!(s.corrective_check());
    assert_eq!(s.document().overlay_parent(), Some(Parent::Root));
  }

  #[derive(Debug, Clone, Copy)]
  enum Step {
    Enter(ElementId),
    Exit,
    /// Fullscreen state changes but the event never arrives.
    SilentEnter(ElementId),
    SilentExit,
    Check,
  }

  fn all_sequences(len: usize) -> Vec<Vec<Step>> {
    let steps =
      [Step::Enter(PLAYER), Step::Enter(OTHER), Step::Exit, Step::SilentEnter(PLAYER), Step::SilentExit, Step::Check];
    let mut out = vec![Vec::new()];
    for _ in 0..len {
      out = out
        .into_iter()
        .flat_map(|prefix| {
          steps.iter().map(move |step| {
            let mut next = prefix.clone();
            next.push(*step);
            next
          })
        })
        .collect();
    }
    out
  }

  #[test]
  fn any_interleaving_settles_with_one_notification_per_transition() {
    for seq in all_sequences(5) {
      let mut s = session();
      let mut emitted = Vec::new();
      let mut notified_fullscreen = false;
      let mut genuine = 0;

      for step in &seq {
        match *step {
          Step::Enter(el) | Step::SilentEnter(el) => s.document_mut().fullscreen = Some(el),
          Step::Exit | Step::SilentExit => s.document_mut().fullscreen = None,
          Step::Check => {
            s.corrective_check();
            let expected = ReattachmentWatcher::expected_parent(s.document());
            assert_eq!(s.document().overlay_parent(), Some(expected));
            continue;
          }
        }
        if matches!(step, Step::Enter(_) | Step::Exit) {
          let now_fullscreen = s.document().fullscreen.is_some();
          if now_fullscreen != notified_fullscreen {
            genuine += 1;
            notified_fullscreen = now_fullscreen;
          }
          emitted.extend(s.on_fullscreen_change());
        }
        assert!(s.document().parents.len() <= 1, "node has several parents after {:?}", seq);
      }

      s.corrective_check();
      let expected = ReattachmentWatcher::expected_parent(s.document());
      assert_eq!(s.document().overlay_parent(), Some(expected), "unsettled after {:?}", seq);
      assert_eq!(emitted.len(), genuine, "lifecycle count mismatch for {:?}", seq);

      // Notifications alternate, starting with an open.
      let mut queue: VecDeque<_> = emitted.into_iter().collect();
      let mut expect_open = true;
      while let Some(msg) = queue.pop_front() {
        let want = if expect_open { SyncMessage::FullscreenOpen } else { SyncMessage::FullscreenClose };
        assert_eq!(msg, want, "out of order lifecycle for {:?}", seq);
        expect_open = !expect_open;
      }
    }
  }

  // --- run_surface ---

  /// Plays back a scripted list of samples, then reports no source.
  struct ScriptedSource {
    samples: VecDeque<Option<PlaybackSample>>,
  }

  impl PlaybackSource for ScriptedSource {
    async fn sample(&mut self) -> Option<PlaybackSample> {
      self.samples.pop_front().flatten()
    }
  }

  fn timing() -> SurfaceTiming {
    SurfaceTiming {
      clock: ClockTiming { poll_interval: Duration::from_millis(150), epsilon: 0.15 },
      parent_check_interval: Duration::from_secs(2),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn run_surface_reports_time_and_applies_text() {
    let (fs_tx, fs_rx) = mpsc::channel(1);
    let (down_tx, down_rx) = mpsc::unbounded_channel();
    let (up_tx, mut up_rx) = mpsc::unbounded_channel();

    let samples = [0.0, 0.1, 0.5, 0.55, 1.0]
      .into_iter()
      .map(|position| Some(PlaybackSample { position, paused: false }))
      .collect();
    let source = ScriptedSource { samples };
    let links = SurfaceLinks { fullscreen_events: fs_rx, downward: down_rx, upward: up_tx };

    let driver = async move {
      tokio::time::sleep(Duration::from_millis(1000)).await;
      down_tx.send(r#"{"type":"setSubtitle","payload":"Hi"}"#.to_string()).unwrap();
      fs_tx.send(()).await.unwrap();
      tokio::time::sleep(Duration::from_millis(10)).await;
      drop(down_tx);
    };
    let (finished, ()) = tokio::join!(run_surface(session(), source, links, timing()), driver);
    assert_eq!(finished.displayed_text(), "Hi");

    let mut reports = Vec::new();
    while let Ok(line) = up_rx.try_recv() {
      reports.push(SyncMessage::decode(&line).unwrap());
    }
    let times: Vec<f64> = reports
      .iter()
      .filter_map(|m| match m {
        SyncMessage::CurrentTime(t) => Some(*t),
        _ => None,
      })
      .collect();
    assert_eq!(times, vec![0.0, 0.5, 1.0]);
    // The fullscreen event fired without a fullscreen element, so nothing changed.
    assert!(!reports.iter().any(|m| matches!(m, SyncMessage::FullscreenOpen | SyncMessage::FullscreenClose)));
  }
}
