/// mpv-backed playback engine over JSON IPC.
///
/// Architecture:
///
/// ```text
///   MpvEngine ── MpvDriver::spawn_and_connect()
///                     │
///                     ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
///                     └── reader_task   ← reads JSON lines from socket
///                                            ├── response (has request_id) → matched oneshot::Sender
///                                            └── event                     → event_tx channel
/// ```
///
/// The engine queue maps onto mpv's playlist: `add` appends with
/// `loadfile … append`, `skip` jumps with `playlist-play-index`, and the
/// current track is read back from `playlist-pos`.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use vtfm_proto::catalog::{Track, TrackKey};
use vtfm_proto::protocol::PlaybackState;

use crate::engine::{EngineError, EngineOptions, PlaybackEngine};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `end-file` events carrying `reason: "error"` mean the stream failed.
    pub fn stream_error(&self) -> Option<&str> {
        if self.event_name()? != "end-file" || self.raw.get("reason")?.as_str()? != "error" {
            return None;
        }
        Some(
            self.raw
                .get("file_error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error"),
        )
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn get_property(&self, name: &str) -> anyhow::Result<Value> {
        let resp = self.send(json!(["get_property", name])).await?;
        Ok(resp.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn get_flag(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.get_property(name).await?.as_bool().unwrap_or(false))
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and its IPC connection.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    volume: f32,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: vtfm_proto::platform::mpv_socket_name(),
            process: None,
            volume,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        info!("mpv: spawning new process");
        let mpv_binary = vtfm_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--keep-open=no")
            .arg(vtfm_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;
        self.spawn_process()?;

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(start_io_tasks(stream, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                return Ok(start_io_tasks(client, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<S>(stream: S, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = match val["error"].as_str() {
                            Some("success") => Ok(val),
                            other => Err(anyhow::anyhow!(
                                "mpv error: {}",
                                other.unwrap_or("unknown error")
                            )),
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── engine ────────────────────────────────────────────────────────────────────

/// Raw mpv flags that together determine the playback state.
#[derive(Debug, Clone, Copy, Default)]
struct MpvStatus {
    idle_active: bool,
    pause: bool,
    paused_for_cache: bool,
    core_idle: bool,
}

fn derive_playback_state(status: MpvStatus, queued: bool) -> PlaybackState {
    if status.idle_active {
        if queued {
            PlaybackState::Stopped
        } else {
            PlaybackState::Idle
        }
    } else if status.pause {
        PlaybackState::Paused
    } else if status.paused_for_cache {
        PlaybackState::Buffering
    } else if status.core_idle {
        PlaybackState::Connecting
    } else {
        PlaybackState::Playing
    }
}

struct EngineInner {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    /// Mirrors mpv's playlist, index for index.
    queue: Vec<TrackKey>,
}

pub struct MpvEngine {
    inner: Mutex<EngineInner>,
}

impl MpvEngine {
    pub fn new(volume: f32) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                driver: MpvDriver::new(volume),
                handle: None,
                queue: Vec::new(),
            }),
        }
    }

    async fn connect(inner: &mut EngineInner) -> Result<MpvHandle, EngineError> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = inner
            .driver
            .spawn_and_connect(event_tx)
            .await
            .map_err(|e| EngineError::Process(e.to_string()))?;
        tokio::spawn(log_events(event_rx));
        inner.handle = Some(handle.clone());
        inner.queue.clear();
        Ok(handle)
    }

    /// The live handle, respawning mpv if the process died since setup.
    async fn live_handle(inner: &mut EngineInner) -> Result<MpvHandle, EngineError> {
        match inner.handle.clone() {
            Some(handle) if inner.driver.process_alive() => Ok(handle),
            Some(_) => {
                warn!("mpv: process died, restarting");
                Self::connect(inner).await
            }
            None => Err(EngineError::NotReady),
        }
    }

    async fn status(handle: &MpvHandle) -> anyhow::Result<MpvStatus> {
        Ok(MpvStatus {
            idle_active: handle.get_flag("idle-active").await?,
            pause: handle.get_flag("pause").await?,
            paused_for_cache: handle.get_flag("paused-for-cache").await.unwrap_or(false),
            core_idle: handle.get_flag("core-idle").await?,
        })
    }
}

async fn log_events(mut rx: mpsc::Receiver<MpvEvent>) {
    while let Some(event) = rx.recv().await {
        if let Some(reason) = event.stream_error() {
            warn!("mpv: stream failed: {}", reason);
        } else if let Some(name) = event.event_name() {
            debug!("mpv: event {}", name);
        }
    }
}

#[async_trait]
impl PlaybackEngine for MpvEngine {
    async fn setup(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        if inner.handle.is_some() && inner.driver.process_alive() {
            return Ok(());
        }
        Self::connect(&mut inner).await?;
        Ok(())
    }

    /// mpv needs no reconfiguration for these; the coordinator acts on
    /// `stop_with_app` at shutdown.
    async fn update_options(&self, options: EngineOptions) -> Result<(), EngineError> {
        debug!(
            "mpv: options stop_with_app={} capabilities={:?}",
            options.stop_with_app, options.capabilities
        );
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let handle = Self::live_handle(&mut inner).await?;
        handle.send(json!(["stop"])).await?;
        handle.send(json!(["playlist-clear"])).await?;
        inner.queue.clear();
        Ok(())
    }

    async fn add(&self, tracks: &[Track]) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let handle = Self::live_handle(&mut inner).await?;
        for track in tracks {
            handle
                .send(json!(["loadfile", track.url, "append"]))
                .await?;
            inner.queue.push(track.key.clone());
        }
        debug!("mpv: queued {} tracks", tracks.len());
        Ok(())
    }

    async fn skip(&self, key: &TrackKey) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let handle = Self::live_handle(&mut inner).await?;
        let index = inner
            .queue
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| EngineError::UnknownTrack(key.clone()))?;
        handle.send(json!(["playlist-play-index", index])).await?;
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        Self::live_handle(&mut inner).await?.set_pause(false).await?;
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        Self::live_handle(&mut inner).await?.set_pause(true).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let handle = Self::live_handle(&mut inner).await?;
        inner.queue.clear();
        // mpv's stop also clears its playlist.
        handle.send(json!(["stop"])).await?;
        Ok(())
    }

    async fn current_track(&self) -> Result<Option<TrackKey>, EngineError> {
        let mut inner = self.inner.lock().await;
        if inner.handle.is_none() {
            return Ok(None);
        }
        let handle = Self::live_handle(&mut inner).await?;
        let pos = handle.get_property("playlist-pos").await?.as_i64().unwrap_or(-1);
        if pos < 0 {
            return Ok(None);
        }
        Ok(inner.queue.get(pos as usize).cloned())
    }

    async fn playback_state(&self) -> Result<PlaybackState, EngineError> {
        let mut inner = self.inner.lock().await;
        if inner.handle.is_none() {
            return Ok(PlaybackState::Idle);
        }
        let handle = Self::live_handle(&mut inner).await?;
        let status = Self::status(&handle).await?;
        Ok(derive_playback_state(status, !inner.queue.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_flags() {
        let idle = MpvStatus {
            idle_active: true,
            ..Default::default()
        };
        assert_eq!(derive_playback_state(idle, false), PlaybackState::Idle);
        assert_eq!(derive_playback_state(idle, true), PlaybackState::Stopped);

        let paused = MpvStatus {
            pause: true,
            core_idle: true,
            ..Default::default()
        };
        assert_eq!(derive_playback_state(paused, true), PlaybackState::Paused);

        let buffering = MpvStatus {
            paused_for_cache: true,
            core_idle: true,
            ..Default::default()
        };
        assert_eq!(derive_playback_state(buffering, true), PlaybackState::Buffering);

        let opening = MpvStatus {
            core_idle: true,
            ..Default::default()
        };
        assert_eq!(derive_playback_state(opening, true), PlaybackState::Connecting);

        assert_eq!(
            derive_playback_state(MpvStatus::default(), true),
            PlaybackState::Playing
        );
    }

    #[test]
    fn test_stream_error_event() {
        let failed = MpvEvent {
            raw: json!({"event": "end-file", "reason": "error", "file_error": "loading failed"}),
        };
        assert_eq!(failed.stream_error(), Some("loading failed"));

        let finished = MpvEvent {
            raw: json!({"event": "end-file", "reason": "stop"}),
        };
        assert_eq!(finished.stream_error(), None);
        assert_eq!(finished.event_name(), Some("end-file"));
    }

    #[tokio::test]
    async fn test_engine_without_setup_reports_nothing_loaded() {
        let engine = MpvEngine::new(0.5);
        assert_eq!(engine.current_track().await.unwrap(), None);
        assert_eq!(engine.playback_state().await.unwrap(), PlaybackState::Idle);
        assert!(matches!(engine.play().await, Err(EngineError::NotReady)));
    }

    #[tokio::test]
    async fn test_options_accepted_before_setup() {
        let engine = MpvEngine::new(0.5);
        let options = EngineOptions {
            stop_with_app: false,
            ..EngineOptions::default()
        };
        engine.update_options(options).await.unwrap();
        assert_eq!(engine.playback_state().await.unwrap(), PlaybackState::Idle);
    }
}
