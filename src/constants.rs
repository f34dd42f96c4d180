//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, so there is no runtime file I/O.
//! Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub app_name: String,

  // Clock feed
  pub clock_poll_ms: u64,
  pub clock_epsilon_secs: f64,

  // Reattachment watcher
  pub parent_check_ms: u64,

  // Overlay styling
  pub default_font_size: u32,
  pub min_font_size: u32,
  pub max_font_size: u32,
  pub osd_res_y: u32,
  pub windowed_margin_v: u32,
  pub fullscreen_margin_v: u32,
  pub overlay_id: u64,

  // mpv IPC
  pub ipc_timeout_ms: u64,
  pub ipc_connect_attempts: u32,
  pub fullscreen_host_id: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
