//! Adapters that let the rendering surface run on top of mpv.
//!
//! Each concern gets its own IPC connection: the clock polls `time-pos`/`pause`, a watcher task
//! observes `fullscreen`, and an OSD writer task paints the overlay with `osd-overlay`. The
//! "document" is virtual: mpv has a single window, so the fullscreen element is a fixed id and the
//! overlay's parent only decides where on screen the text goes.

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::{PlaybackSample, PlaybackSource};
use crate::config::OverlayStyle;
use crate::constants::constants;
use crate::player::MpvIpc;
use crate::surface::{Document, ElementId, Parent};

// --- Clock ---

pub struct MpvClock {
  ipc: MpvIpc,
}

impl MpvClock {
  pub fn new(ipc: MpvIpc) -> Self {
    Self { ipc }
  }
}

impl PlaybackSource for MpvClock {
  async fn sample(&mut self) -> Option<PlaybackSample> {
    // `time-pos` is unavailable (null or an error) until a file is loaded.
    let position = match self.ipc.get_property("time-pos").await {
      Ok(v) => v.as_f64()?,
      Err(e) => {
        debug!(err = %e, "clock: no playback position");
        return None;
      }
    };
    let paused = match self.ipc.get_property("pause").await {
      Ok(v) => v.as_bool().unwrap_or(false),
      Err(e) => {
        debug!(err = %e, "clock: no pause state");
        return None;
      }
    };
    Some(PlaybackSample { position, paused })
  }
}

// --- Overlay ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
  Windowed,
  Fullscreen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OsdCommand {
  Show { text: String, placement: Placement },
  Hide,
}

pub struct MpvDocument {
  fullscreen: Arc<AtomicBool>,
  parent: Option<Parent>,
  text: String,
  visible: bool,
  osd: mpsc::UnboundedSender<OsdCommand>,
}

impl MpvDocument {
  pub fn new(fullscreen: Arc<AtomicBool>, osd: mpsc::UnboundedSender<OsdCommand>) -> Self {
    Self { fullscreen, parent: None, text: String::new(), visible: false, osd }
  }

  fn repaint(&self) {
    let cmd = match self.parent {
      Some(parent) if self.visible && !self.text.is_empty() => {
        let placement = match parent {
          Parent::Root => Placement::Windowed,
          Parent::Element(_) => Placement::Fullscreen,
        };
        OsdCommand::Show { text: self.text.clone(), placement }
      }
      _ => OsdCommand::Hide,
    };
    if self.osd.send(cmd).is_err() {
      debug!("surface: OSD writer is gone");
    }
  }
}

impl Document for MpvDocument {
  fn fullscreen_element(&self) -> Option<ElementId> {
    self.fullscreen.load(Ordering::SeqCst).then_some(ElementId(constants().fullscreen_host_id))
  }

  fn overlay_parent(&self) -> Option<Parent> {
    self.parent
  }

  fn append_overlay(&mut self, parent: Parent) {
    self.parent = Some(parent);
    self.repaint();
  }

  fn paint_overlay(&mut self, text: &str, visible: bool) {
    self.text = text.to_string();
    self.visible = visible;
    self.repaint();
  }
}

/// Escape cue text for an ASS event: braces would open override blocks, a backslash would start a
/// tag, and line breaks must be `\N`.
fn ass_escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '\\' => out.push_str("\\\u{2060}"),
      '{' => out.push_str("\\{"),
      '}' => out.push_str("\\}"),
      '\n' => out.push_str("\\N"),
      '\r' => {}
      c => out.push(c),
    }
  }
  out
}

/// Build the `osd-overlay` IPC command for one paint.
pub fn osd_overlay_command(cmd: &OsdCommand, style: OverlayStyle) -> Value {
  let c = constants();
  match cmd {
    OsdCommand::Hide => json!({ "name": "osd-overlay", "id": c.overlay_id, "format": "none", "data": "" }),
    OsdCommand::Show { text, placement } => {
      let margin = match placement {
        Placement::Windowed => c.windowed_margin_v,
        Placement::Fullscreen => c.fullscreen_margin_v,
      };
      let res_x = c.osd_res_y * 16 / 9;
      let data = format!(
        "{{\\an2\\pos({},{})\\fs{}\\b{}\\i{}\\bord2}}{}",
        res_x / 2,
        c.osd_res_y.saturating_sub(margin),
        style.font_size,
        u8::from(style.bold),
        u8::from(style.italic),
        ass_escape(text)
      );
      json!({
        "name": "osd-overlay",
        "id": c.overlay_id,
        "format": "ass-events",
        "data": data,
        "res_x": res_x,
        "res_y": c.osd_res_y,
      })
    }
  }
}

/// Apply paints in order until the surface drops its sender.
pub async fn run_osd_writer(mut ipc: MpvIpc, mut paints: mpsc::UnboundedReceiver<OsdCommand>, style: OverlayStyle) {
  while let Some(cmd) = paints.recv().await {
    if let Err(e) = ipc.request(osd_overlay_command(&cmd, style)).await {
      warn!(err = %e, "surface: failed to paint overlay");
    }
  }
  debug!("surface: OSD writer finished");
}

// --- Fullscreen ---

const FULLSCREEN_OBSERVER_ID: u64 = 1;

fn is_fullscreen_change(event: &Value) -> Option<bool> {
  if event.get("event")?.as_str()? != "property-change" || event.get("name")?.as_str()? != "fullscreen" {
    return None;
  }
  Some(event.get("data").and_then(Value::as_bool).unwrap_or(false))
}

/// Mirror mpv's `fullscreen` property into `flag` and poke the surface on every change.
/// Returns when mpv closes the connection.
pub async fn watch_fullscreen(mut ipc: MpvIpc, flag: Arc<AtomicBool>, changes: mpsc::Sender<()>) -> anyhow::Result<()> {
  ipc.observe_property(FULLSCREEN_OBSERVER_ID, "fullscreen").await?;
  if let Some(on) = ipc.get_property("fullscreen").await?.as_bool() {
    flag.store(on, Ordering::SeqCst);
  }
  // A full channel already has a wakeup pending, and the surface reads the flag when it wakes.
  let _ = changes.try_send(());

  while let Some(event) = ipc.next_event().await? {
    if let Some(on) = is_fullscreen_change(&event) {
      debug!(on, "mpv: fullscreen changed");
      flag.store(on, Ordering::SeqCst);
      let _ = changes.try_send(());
    }
  }
  info!("mpv: fullscreen watcher finished");
  Ok(())
}
