use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::clock::ClockTiming;
use crate::constants::constants;
use crate::surface::SurfaceTiming;

/// User preferences persisted in `prefs.toml`. Every field is optional; missing ones use the
/// embedded defaults.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub font_size: Option<u32>,
  pub bold: Option<bool>,
  pub italic: Option<bool>,
  pub clock_poll_ms: Option<u64>,
  pub clock_epsilon_secs: Option<f64>,
  pub parent_check_ms: Option<u64>,
}

/// Overlay text style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
  pub font_size: u32,
  pub bold: bool,
  pub italic: bool,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", &constants().app_name)
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      return Self::load_from(&proj_dirs.config_dir().join("prefs.toml"));
    }
    Self::default()
  }

  pub fn load_from(path: &Path) -> Self {
    if let Ok(content) = std::fs::read_to_string(path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = project_dirs() {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        self.save_to(&config_dir.join("prefs.toml"));
      }
    }
  }

  pub fn save_to(&self, path: &Path) {
    if let Ok(content) = toml::to_string(self) {
      let _ = std::fs::write(path, content);
    }
  }

  /// Font size is clamped to the supported range.
  pub fn overlay_style(&self) -> OverlayStyle {
    let c = constants();
    let font_size = self.font_size.unwrap_or(c.default_font_size).clamp(c.min_font_size, c.max_font_size);
    OverlayStyle { font_size, bold: self.bold.unwrap_or(true), italic: self.italic.unwrap_or(false) }
  }

  /// Zero or non-positive overrides fall back to the defaults.
  pub fn surface_timing(&self) -> SurfaceTiming {
    let c = constants();
    let poll_ms = self.clock_poll_ms.filter(|ms| *ms > 0).unwrap_or(c.clock_poll_ms);
    let epsilon = self.clock_epsilon_secs.filter(|e| e.is_finite() && *e > 0.0).unwrap_or(c.clock_epsilon_secs);
    let check_ms = self.parent_check_ms.filter(|ms| *ms > 0).unwrap_or(c.parent_check_ms);
    SurfaceTiming {
      clock: ClockTiming { poll_interval: Duration::from_millis(poll_ms), epsilon },
      parent_check_interval: Duration::from_millis(check_ms),
    }
  }
}
