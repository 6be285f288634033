//! Control socket.
//!
//! A Unix Domain Socket speaking newline-delimited JSON. On a host build
//! this is where button presses come from: every `Press` is pushed onto the
//! edge queue exactly as an edge interrupt would be.

use crate::brightness::{BrightnessIntent, BrightnessStatus};
use crate::calibration::BrightnessMode;
use crate::config::ConfigManager;
use crate::error::{ConfigError, IpcError};
use crate::input::{EdgeSender, InputSource, RawEdge};
use crate::mode_machine::DisplayIntent;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;

#[cfg(unix)]
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Default socket path for the control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/unicorn-clock.sock";

/// Commands that can be received over the socket.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "command")]
pub enum IpcCommand {
    Press { button: InputSource },
    SetBrightnessMode { mode: BrightnessMode },
    ToggleBrightnessMode,
    GetStatus,
}

/// Status response sent to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusResponse {
    pub mode: u8,
    pub effect: u8,
    pub am_pm_mode: bool,
    pub brightness: BrightnessStatus,
    pub light: f64,
}

/// State shared between the control loops and the socket.
pub struct DaemonState {
    pub config_manager: Arc<ConfigManager>,
    pub display: Arc<DisplayIntent>,
    pub brightness: Arc<BrightnessIntent>,
    /// Last status published by the brightness loop
    pub brightness_status: RwLock<BrightnessStatus>,
    /// Last raw light reading
    pub light: RwLock<f64>,
    edges: EdgeSender,
}

impl DaemonState {
    pub fn new(
        config_manager: Arc<ConfigManager>,
        display: Arc<DisplayIntent>,
        brightness: Arc<BrightnessIntent>,
        initial_status: BrightnessStatus,
        edges: EdgeSender,
    ) -> Self {
        Self {
            config_manager,
            display,
            brightness,
            brightness_status: RwLock::new(initial_status),
            light: RwLock::new(0.0),
            edges,
        }
    }

    /// Push a raw edge for `button` onto the input queue.
    pub fn press(&self, button: InputSource) -> Result<(), IpcError> {
        self.edges
            .try_send(RawEdge::now(button))
            .map_err(|e| match e {
                TrySendError::Full(_) => IpcError::QueueFull,
                TrySendError::Closed(_) => IpcError::QueueClosed,
            })
    }

    /// Store `mode` as the brightness mode used at the next launch.
    pub fn save_brightness_mode(&self, mode: BrightnessMode) -> Result<(), ConfigError> {
        let mut config = self.config_manager.get();
        if config.brightness_mode == mode {
            return Ok(());
        }
        config.brightness_mode = mode;
        self.config_manager.update(config)
    }

    /// Record what the brightness loop just did.
    pub async fn publish_brightness(&self, status: BrightnessStatus, light: f64) {
        *self.brightness_status.write().await = status;
        *self.light.write().await = light;
    }

    /// Get the current status as a StatusResponse.
    pub async fn get_status(&self) -> StatusResponse {
        let display = self.display.snapshot();
        StatusResponse {
            mode: display.mode,
            effect: display.effect,
            am_pm_mode: display.am_pm,
            brightness: *self.brightness_status.read().await,
            light: *self.light.read().await,
        }
    }
}

/// Handle a single command and return the response.
pub async fn handle_command(command: IpcCommand, state: &Arc<DaemonState>) -> serde_json::Value {
    match command {
        IpcCommand::Press { button } => match state.press(button) {
            Ok(()) => {
                tracing::debug!("Press {:?} queued via IPC", button);
                serde_json::json!({ "success": true })
            }
            Err(e) => {
                tracing::warn!("Press {:?} rejected: {}", button, e);
                serde_json::json!({ "success": false, "error": e.to_string() })
            }
        },

        IpcCommand::SetBrightnessMode { mode } => {
            state.brightness.set_mode(mode);
            tracing::info!("Brightness mode set to {} via IPC", mode.as_str());
            brightness_mode_response(state, mode)
        }

        IpcCommand::ToggleBrightnessMode => {
            let mode = state.brightness.toggle_mode();
            brightness_mode_response(state, mode)
        }

        IpcCommand::GetStatus => {
            let status = state.get_status().await;
            serde_json::to_value(status).unwrap_or_else(|e| {
                serde_json::json!({
                    "error": format!("Failed to serialize status: {}", e)
                })
            })
        }
    }
}

/// Persist an applied brightness mode and report the outcome.
fn brightness_mode_response(state: &DaemonState, mode: BrightnessMode) -> serde_json::Value {
    match state.save_brightness_mode(mode) {
        Ok(()) => serde_json::json!({ "success": true, "mode": mode.as_str() }),
        Err(e) => {
            tracing::warn!("Failed to persist brightness mode: {}", e);
            serde_json::json!({
                "success": false,
                "mode": mode.as_str(),
                "error": e.to_string()
            })
        }
    }
}

/// Unix Domain Socket server.
#[cfg(unix)]
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

#[cfg(unix)]
impl IpcServer {
    /// Bind the socket at `path`, replacing a stale socket file.
    pub async fn new(path: &str) -> Result<Self, IpcError> {
        let socket_path = PathBuf::from(path);

        Self::cleanup_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|e| IpcError::SocketBindFailed {
            path: path.to_string(),
            source: e,
        })?;

        Ok(Self {
            socket_path,
            listener,
        })
    }

    fn cleanup_socket(path: &Path) -> Result<(), IpcError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| IpcError::SocketBindFailed {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections forever, one task per client.
    pub async fn run(&self, state: Arc<DaemonState>) -> Result<(), IpcError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, state).await {
                            tracing::warn!("Error handling IPC connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting IPC connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) -> Result<(), IpcError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        while reader.read_line(&mut line).await? > 0 {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                line.clear();
                continue;
            }

            let response = match serde_json::from_str::<IpcCommand>(trimmed) {
                Ok(command) => handle_command(command, &state).await,
                Err(e) => serde_json::json!({
                    "error": format!("Invalid command: {}", e)
                }),
            };

            let response_str = serde_json::to_string(&response)?;
            writer.write_all(response_str.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;

            line.clear();
        }

        Ok(())
    }
}

#[cfg(unix)]
impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
