//! The mpv process and its JSON IPC socket.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader, Lines},
  net::{
    UnixStream,
    unix::{OwnedReadHalf, OwnedWriteHalf},
  },
  process::{Child as TokioChild, Command},
};
use tracing::{debug, info};

use crate::constants::constants;

// --- Process ---

pub struct MpvPlayer {
  child: Option<TokioChild>,
  socket_path: PathBuf,
}

impl MpvPlayer {
  /// Start mpv on `target` with an IPC server on a per-process socket.
  pub fn spawn(target: &str) -> Result<Self> {
    let socket_path =
      std::env::temp_dir().join(format!("{}-mpv-{}.sock", constants().app_name, std::process::id()));
    let socket_path_str = socket_path.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let mut cmd = Command::new("mpv");
    cmd.args([
      "--force-window=immediate",
      "--keep-open=no",
      "--really-quiet",
      &format!("--input-ipc-server={}", socket_path_str),
      target,
    ]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;
    info!(target, socket = %socket_path_str, "mpv: started");

    Ok(Self { child: Some(child), socket_path })
  }

  pub fn socket_path(&self) -> &Path {
    &self.socket_path
  }

  /// Resolves when the mpv window is closed.
  pub async fn wait(&mut self) -> Result<ExitStatus> {
    let child = self.child.as_mut().context("mpv is not running")?;
    child.wait().await.context("Failed to wait for mpv")
  }

  pub async fn stop(&mut self) -> Result<()> {
    if let Some(mut child) = self.child.take() {
      if child.try_wait().ok().flatten().is_none() {
        child.kill().await.context("Failed to kill mpv process")?;
      }
      let _ = child.wait().await;
    }
    let _ = std::fs::remove_file(&self.socket_path);
    Ok(())
  }
}

// --- IPC ---

/// One connection to mpv's IPC server. Requests are answered in order on the same socket,
/// interleaved with unsolicited event lines.
pub struct MpvIpc {
  lines: Lines<TokioBufReader<OwnedReadHalf>>,
  writer: OwnedWriteHalf,
  next_request_id: i64,
  timeout: Duration,
}

impl MpvIpc {
  pub fn new(stream: UnixStream) -> Self {
    let (read, writer) = stream.into_split();
    Self {
      lines: TokioBufReader::new(read).lines(),
      writer,
      next_request_id: 1,
      timeout: Duration::from_millis(constants().ipc_timeout_ms),
    }
  }

  pub async fn connect(path: &Path) -> Result<Self> {
    let stream = UnixStream::connect(path).await.context("Failed to connect to mpv IPC socket")?;
    Ok(Self::new(stream))
  }

  /// mpv creates the socket a moment after it starts; keep trying for a few seconds.
  pub async fn connect_with_retry(path: &Path) -> Result<Self> {
    let attempts = constants().ipc_connect_attempts;
    for attempt in 0..attempts {
      let delay = match attempt {
        0 => Duration::from_millis(500),
        1 => Duration::from_secs(1),
        _ => Duration::from_secs(2),
      };
      tokio::time::sleep(delay).await;
      match Self::connect(path).await {
        Ok(ipc) => return Ok(ipc),
        Err(e) => info!(attempt, err = %e, "mpv: IPC connect failed, retrying"),
      }
    }
    bail!("mpv IPC socket {} never came up", path.display())
  }

  /// Send one command and wait for its reply. Returns the reply's `data` (null when absent).
  pub async fn request(&mut self, command: Value) -> Result<Value> {
    let request_id = self.next_request_id;
    self.next_request_id += 1;

    let mut line = serde_json::to_string(&json!({ "command": command, "request_id": request_id }))?;
    line.push('\n');
    self.writer.write_all(line.as_bytes()).await.context("Failed to write to mpv IPC socket")?;

    // mpv interleaves event lines with replies; skip them until ours shows up.
    let deadline = tokio::time::Instant::now() + self.timeout;
    loop {
      let line = tokio::time::timeout_at(deadline, self.lines.next_line())
        .await
        .context("Timeout waiting for mpv IPC response")?
        .context("Failed to read from mpv IPC socket")?;
      let Some(line) = line else {
        bail!("mpv IPC socket closed");
      };

      let Ok(mut val) = serde_json::from_str::<Value>(&line) else {
        debug!(line, "mpv: ignoring unparseable IPC line");
        continue;
      };
      if val.get("request_id").and_then(|v| v.as_i64()) != Some(request_id) {
        continue;
      }
      return match val.get("error").and_then(|v| v.as_str()) {
        Some("success") => Ok(val.get_mut("data").map(Value::take).unwrap_or(Value::Null)),
        Some(err) => Err(anyhow!("mpv rejected {}: {}", command, err)),
        None => Err(anyhow!("mpv reply to {} had no status", command)),
      };
    }
  }

  /// Stop mpv from broadcasting events to this connection. For request-only connections.
  pub async fn disable_events(&mut self) -> Result<()> {
    self.request(json!(["disable_event", "all"])).await.map(|_| ())
  }

  pub async fn get_property(&mut self, name: &str) -> Result<Value> {
    self.request(json!(["get_property", name])).await
  }

  pub async fn observe_property(&mut self, observer_id: u64, name: &str) -> Result<()> {
    self.request(json!(["observe_property", observer_id, name])).await.map(|_| ())
  }

  /// Wait for the next event line. `None` once mpv closes the socket.
  pub async fn next_event(&mut self) -> Result<Option<Value>> {
    while let Some(line) = self.lines.next_line().await.context("Failed to read from mpv IPC socket")? {
      if let Ok(val) = serde_json::from_str::<Value>(&line)
        && val.get("event").is_some()
      {
        return Ok(Some(val));
      }
    }
    Ok(None)
  }
}
