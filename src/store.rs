//! Saved subtitles, one file per video.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::constants::constants;

pub struct SubtitleStore {
  dir: PathBuf,
}

impl SubtitleStore {
  /// Store under the platform data directory.
  pub fn open_default() -> Result<Self> {
    let proj_dirs = ProjectDirs::from("", "", &constants().app_name).context("No home directory for saved subtitles")?;
    Ok(Self::at(proj_dirs.data_dir().join("subtitles")))
  }

  pub fn at(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path_for(&self, id: &str) -> PathBuf {
    self.dir.join(format!("{}.srt", sanitize_id(id)))
  }

  /// Saved text for `id`. Anything that prevents reading it counts as nothing saved.
  pub fn get(&self, id: &str) -> Option<String> {
    let path = self.path_for(id);
    match std::fs::read_to_string(&path) {
      Ok(text) => Some(text),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(id, "store: nothing saved");
        None
      }
      Err(e) => {
        warn!(err = %e, path = %path.display(), "store: failed to read saved subtitles");
        None
      }
    }
  }

  pub fn set(&self, id: &str, text: &str) -> Result<()> {
    std::fs::create_dir_all(&self.dir)
      .with_context(|| format!("Failed to create store directory {}", self.dir.display()))?;
    let path = self.path_for(id);
    std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(id, bytes = text.len(), "store: saved subtitles");
    Ok(())
  }

  /// Returns whether anything was removed.
  pub fn remove(&self, id: &str) -> Result<bool> {
    let path = self.path_for(id);
    match std::fs::remove_file(&path) {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to remove {}", path.display()))),
    }
  }
}

/// Map an arbitrary id onto a safe file stem. Bytes outside `[A-Za-z0-9_-]` are percent-encoded, so
/// distinct ids never share a file.
fn sanitize_id(id: &str) -> String {
  if id.is_empty() {
    return "%".to_string();
  }
  let mut stem = String::with_capacity(id.len());
  for b in id.bytes() {
    if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
      stem.push(char::from(b));
    } else {
      stem.push_str(&format!("%{:02X}", b));
    }
  }
  stem
}

/// Derive the store key for a playback target.
///
/// YouTube URLs collapse to their video id so `watch?v=`, `youtu.be/` and `shorts/` links share
/// one entry. Anything else (local paths, other sites) is used whole.
pub fn video_key(target: &str) -> String {
  let target = target.trim();
  let candidate = if let Some((_, rest)) = target.split_once("watch?v=") {
    Some(rest)
  } else if let Some((_, rest)) = target.split_once("youtu.be/") {
    Some(rest)
  } else if let Some((_, rest)) = target.split_once("youtube.com/shorts/") {
    Some(rest)
  } else {
    None
  };
  if let Some(rest) = candidate {
    let id: String = rest.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_').collect();
    if !id.is_empty() {
      return id;
    }
  }
  target.to_string()
}
