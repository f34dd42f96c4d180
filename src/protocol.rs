//! Wire contract between the host and the rendering surface.
//!
//! Every message is a flat JSON object with a `type` discriminator and an optional `payload`.
//! Time reports and fullscreen lifecycle notifications travel up; subtitle text travels down.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
  /// Playback position in seconds.
  #[serde(rename = "currentTime")]
  CurrentTime(f64),
  /// Text to display; empty means "display nothing".
  #[serde(rename = "setSubtitle")]
  SetSubtitle(String),
  #[serde(rename = "fullscreen_open")]
  FullscreenOpen,
  #[serde(rename = "fullscreen_close")]
  FullscreenClose,
}

/// Which side of the boundary a message travels towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  /// Surface → host.
  Up,
  /// Host → surface.
  Down,
}

impl std::fmt::Display for Direction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Direction::Up => f.write_str("upward"),
      Direction::Down => f.write_str("downward"),
    }
  }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("malformed message: {0}")]
  Malformed(#[from] serde_json::Error),
  #[error("{kind} is not a valid {direction} message")]
  WrongDirection { kind: &'static str, direction: Direction },
}

impl SyncMessage {
  pub fn kind(&self) -> &'static str {
    match self {
      SyncMessage::CurrentTime(_) => "currentTime",
      SyncMessage::SetSubtitle(_) => "setSubtitle",
      SyncMessage::FullscreenOpen => "fullscreen_open",
      SyncMessage::FullscreenClose => "fullscreen_close",
    }
  }

  pub fn direction(&self) -> Direction {
    match self {
      SyncMessage::SetSubtitle(_) => Direction::Down,
      _ => Direction::Up,
    }
  }

  pub fn encode(&self) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
  }

  /// Decode and reject messages that do not belong on the `expected` channel.
  pub fn decode_for(raw: &str, expected: Direction) -> Result<Self, ProtocolError> {
    let msg = Self::decode(raw)?;
    if msg.direction() != expected {
      return Err(ProtocolError::WrongDirection { kind: msg.kind(), direction: expected });
    }
    Ok(msg)
  }
}
