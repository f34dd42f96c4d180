//! Wires a host session and an mpv-backed rendering surface together for one playback.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::bridge::{MpvClock, MpvDocument, run_osd_writer, watch_fullscreen};
use crate::config::Config;
use crate::host::{HostCommand, HostSession, LogOrientation, run_host};
use crate::player::{MpvIpc, MpvPlayer};
use crate::store::{SubtitleStore, video_key};
use crate::surface::{SurfaceLinks, SurfaceSession, run_surface};

// --- Types ---

#[derive(Debug, Clone)]
pub struct PlayOptions {
  /// URL or file handed to mpv.
  pub target: String,
  /// Subtitle file to load instead of the saved one.
  pub srt: Option<PathBuf>,
  /// Store key override. Defaults to the key derived from `target`.
  pub video_id: Option<String>,
  /// Remember `srt` for this video.
  pub save: bool,
}

impl PlayOptions {
  pub fn store_key(&self) -> String {
    self.video_id.clone().unwrap_or_else(|| video_key(&self.target))
  }
}

// --- Subtitle sources ---

/// Read raw subtitle text from a file, or stdin for `-`. Invalid UTF-8 is replaced, not rejected.
pub fn read_subtitle_source(path: &Path) -> Result<String> {
  let bytes = if path == Path::new("-") {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf).context("Failed to read subtitles from stdin")?;
    buf
  } else {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
  };
  Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Pick the subtitle text for a playback: an explicit file wins (and is saved when asked),
/// otherwise whatever the store has for the video.
pub fn resolve_subtitles(opts: &PlayOptions, store: &SubtitleStore) -> Result<Option<String>> {
  let key = opts.store_key();
  let Some(path) = &opts.srt else {
    return Ok(store.get(&key));
  };
  let text = read_subtitle_source(path)?;
  if opts.save {
    store.set(&key, &text)?;
    info!(key, "app: saved subtitles for video");
  }
  Ok(Some(text))
}

// --- Play ---

pub async fn run_play(opts: PlayOptions, config: &Config) -> Result<()> {
  let store = SubtitleStore::open_default()?;
  let raw = resolve_subtitles(&opts, &store)?;

  let mut host = HostSession::new(LogOrientation);
  match &raw {
    Some(raw) => {
      let summary = host.load_subtitles(raw);
      eprintln!("Loaded {} cues ({} formatting fixes)", summary.cue_count, summary.fix_count);
    }
    None => eprintln!("No subtitles saved for {}; playing without overlay", opts.store_key()),
  }

  let mut player = MpvPlayer::spawn(&opts.target)?;
  let result = drive(&mut player, host, &opts, config).await;
  player.stop().await?;
  result
}

async fn drive(
  player: &mut MpvPlayer,
  host: HostSession<LogOrientation>,
  opts: &PlayOptions,
  config: &Config,
) -> Result<()> {
  let socket = player.socket_path().to_path_buf();
  let mut clock_ipc = MpvIpc::connect_with_retry(&socket).await?;
  let mut osd_ipc = MpvIpc::connect(&socket).await?;
  // Only the fullscreen watcher reads between requests; the others would just buffer events.
  clock_ipc.disable_events().await?;
  osd_ipc.disable_events().await?;
  let fullscreen_ipc = MpvIpc::connect(&socket).await?;
  info!(socket = %socket.display(), "app: connected to mpv");

  let timing = config.surface_timing();
  let (up_tx, up_rx) = mpsc::unbounded_channel();
  let (down_tx, down_rx) = mpsc::unbounded_channel();
  let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
  let (osd_tx, osd_rx) = mpsc::unbounded_channel();
  let (fullscreen_tx, fullscreen_rx) = mpsc::channel(1);
  let fullscreen = Arc::new(AtomicBool::new(false));

  let host_task = tokio::spawn(run_host(host, up_rx, down_tx, cmd_rx));
  let osd_task = tokio::spawn(run_osd_writer(osd_ipc, osd_rx, config.overlay_style()));
  let fullscreen_task = tokio::spawn({
    let flag = fullscreen.clone();
    async move {
      if let Err(e) = watch_fullscreen(fullscreen_ipc, flag, fullscreen_tx).await {
        warn!(err = %e, "app: fullscreen watcher stopped");
      }
    }
  });
  let reload_task =
    opts.srt.clone().filter(|p| p != Path::new("-")).map(|path| tokio::spawn(reload_on_hangup(path, cmd_tx)));

  let session = SurfaceSession::new(MpvDocument::new(fullscreen, osd_tx), timing.clock.epsilon);
  let links = SurfaceLinks { fullscreen_events: fullscreen_rx, downward: down_rx, upward: up_tx };
  let surface = run_surface(session, MpvClock::new(clock_ipc), links, timing);

  let outcome = tokio::select! {
    status = player.wait() => status.map(|s| info!(%s, "app: mpv exited")),
    _ = surface => {
      error!("app: surface stopped before mpv exited");
      Ok(())
    }
    _ = tokio::signal::ctrl_c() => {
      info!("app: interrupted");
      Ok(())
    }
  };

  for task in [host_task.abort_handle(), osd_task.abort_handle(), fullscreen_task.abort_handle()] {
    task.abort();
  }
  if let Some(task) = reload_task {
    task.abort();
  }
  outcome
}

/// Re-read the subtitle file on SIGHUP so edits show up without restarting playback.
async fn reload_on_hangup(path: PathBuf, commands: mpsc::UnboundedSender<HostCommand>) {
  let mut hangups = match signal(SignalKind::hangup()) {
    Ok(s) => s,
    Err(e) => {
      warn!(err = %e, "app: cannot listen for SIGHUP; reload disabled");
      return;
    }
  };
  while hangups.recv().await.is_some() {
    match read_subtitle_source(&path) {
      Ok(raw) => {
        info!(path = %path.display(), "app: reloading subtitles");
        if commands.send(HostCommand::Load(raw)).is_err() {
          break;
        }
      }
      Err(e) => warn!(err = %e, "app: reload failed, keeping current subtitles"),
    }
  }
}
