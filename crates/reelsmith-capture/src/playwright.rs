use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use reelsmith_core::frame::FrameBuffer;
use reelsmith_core::{ReelError, ReelResult};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{CaptureBackend, CaptureSessionConfig, SessionInfo};

/// Extra time allowed on top of the navigation timeout before the driver
/// itself is considered hung.
const DRIVER_GRACE: Duration = Duration::from_secs(1);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture backend that runs `scripts/capture.js` under Node and drives
/// Chromium through Playwright with a line-delimited JSON protocol.
pub struct PlaywrightBackend {
    node_bin: String,
    script_path: Option<PathBuf>,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    source: String,
    seek_delay: Duration,
    frame_timeout: Duration,
}

impl Default for PlaywrightBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaywrightBackend {
    pub fn new() -> Self {
        Self {
            node_bin: "node".to_string(),
            script_path: None,
            process: None,
            stdin: None,
            stdout: None,
            source: String::new(),
            seek_delay: Duration::ZERO,
            frame_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_node_bin(mut self, node_bin: impl Into<String>) -> Self {
        self.node_bin = node_bin.into();
        self
    }

    pub fn with_script(mut self, script_path: impl Into<PathBuf>) -> Self {
        self.script_path = Some(script_path.into());
        self
    }

    fn resolve_script(&self) -> ReelResult<PathBuf> {
        if let Some(path) = &self.script_path {
            return Ok(path.clone());
        }
        if let Ok(path) = std::env::var("REELSMITH_CAPTURE_SCRIPT") {
            return Ok(PathBuf::from(path));
        }
        // Workspace root, then inside the crate, then where the crate was built.
        let cwd = std::env::current_dir()?;
        let candidates = [
            cwd.join("crates")
                .join("reelsmith-capture")
                .join("scripts")
                .join("capture.js"),
            cwd.join("scripts").join("capture.js"),
            PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/capture.js")),
        ];
        Ok(candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .unwrap_or_else(|| candidates[candidates.len() - 1].clone()))
    }

    fn err(&self, message: impl Into<String>) -> ReelError {
        ReelError::capture(&self.source, message)
    }

    async fn send_request(&mut self, req: serde_json::Value) -> ReelResult<()> {
        let source = self.source.clone();
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReelError::capture(&source, "driver stdin not available"))?;
        let msg = req.to_string() + "\n";
        stdin
            .write_all(msg.as_bytes())
            .await
            .map_err(|e| ReelError::capture(&source, format!("failed to write to driver: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ReelError::capture(&source, format!("failed to write to driver: {e}")))?;
        Ok(())
    }

    /// Read one response line. `None` means the wait timed out.
    async fn read_response(&mut self, wait: Duration) -> ReelResult<Option<serde_json::Value>> {
        let source = self.source.clone();
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| ReelError::capture(&source, "driver stdout not available"))?;
        let line = match tokio::time::timeout(wait, stdout.next_line()).await {
            Err(_) => return Ok(None),
            Ok(line) => line?,
        };
        let Some(line) = line else {
            return Err(ReelError::capture(&source, "browser driver exited unexpectedly"));
        };
        let res: serde_json::Value = serde_json::from_str(&line)?;
        if res["type"] == "error" {
            let message = res["error"].as_str().unwrap_or("unknown driver error");
            return Err(ReelError::capture(&source, message));
        }
        Ok(Some(res))
    }

    async fn expect(&mut self, kind: &str, wait: Duration) -> ReelResult<serde_json::Value> {
        match self.read_response(wait).await? {
            Some(res) if res["type"] == kind => Ok(res),
            Some(res) => Err(self.err(format!("expected '{kind}' from driver, got {}", res["type"]))),
            None => Err(self.err(format!("driver did not answer '{kind}' within {wait:?}"))),
        }
    }

    async fn kill(&mut self) {
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.process.take() {
            let _ = child.kill().await;
        }
    }

    async fn start_inner(&mut self, config: &CaptureSessionConfig) -> ReelResult<SessionInfo> {
        let script = self.resolve_script()?;
        let mut child = Command::new(&self.node_bin)
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.err(format!(
                    "failed to spawn `{} {}`: {e}",
                    self.node_bin,
                    script.display()
                ))
            })?;

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        self.process = Some(child);

        let bridge = match &config.bridge {
            Some(b) => serde_json::to_value(b)?,
            None => serde_json::Value::Null,
        };
        self.send_request(json!({
            "type": "start",
            "config": {
                "source": config.source,
                "viewport_width": config.viewport_width,
                "viewport_height": config.viewport_height,
                "navigation_timeout_ms": config.navigation_timeout.as_millis() as u64,
                "bridge": bridge,
            }
        }))
        .await?;

        let wait = config.navigation_timeout + DRIVER_GRACE;
        match self.read_response(wait).await? {
            Some(res) if res["type"] == "loaded" => {}
            Some(res) => {
                return Err(self.err(format!("expected 'loaded' from driver, got {}", res["type"])))
            }
            None => {
                return Err(ReelError::CaptureTimeout {
                    url: config.source.clone(),
                    timeout_ms: config.navigation_timeout.as_millis() as u64,
                })
            }
        }

        // Let the animation library build its timeline before the first seek.
        tokio::time::sleep(config.settle_delay).await;

        self.send_request(json!({ "type": "inspect" })).await?;
        let res = self.expect("ready", self.frame_timeout).await?;
        Ok(SessionInfo {
            timeline_found: res["timeline"].as_bool().unwrap_or(false),
        })
    }
}

#[async_trait]
impl CaptureBackend for PlaywrightBackend {
    async fn start_session(&mut self, config: &CaptureSessionConfig) -> ReelResult<SessionInfo> {
        if self.process.is_some() {
            return Err(self.err("capture session already running"));
        }
        self.source = config.source.clone();
        self.seek_delay = config.seek_delay;
        self.frame_timeout = config.frame_timeout;

        match self.start_inner(config).await {
            Ok(info) => {
                tracing::info!(url = %config.source, timeline = info.timeline_found, "overlay loaded");
                Ok(info)
            }
            Err(e) => {
                self.kill().await;
                Err(e)
            }
        }
    }

    async fn capture_frame(&mut self, time_seconds: f64) -> ReelResult<FrameBuffer> {
        self.send_request(json!({ "type": "seek", "time": time_seconds }))
            .await?;
        self.expect("seeked", self.frame_timeout).await?;

        tokio::time::sleep(self.seek_delay).await;

        self.send_request(json!({ "type": "screenshot" })).await?;
        let res = self.expect("frame", self.frame_timeout).await?;

        let b64_str = res["data"]
            .as_str()
            .ok_or_else(|| self.err("frame response is missing data"))?;
        let bytes = general_purpose::STANDARD
            .decode(b64_str)
            .map_err(|e| self.err(format!("frame is not valid base64: {e}")))?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(|e| self.err(format!("frame is not a valid PNG: {e}")))?;
        let rgba = img.to_rgba8();
        let (width, height) = (rgba.width(), rgba.height());

        FrameBuffer::from_rgba(width, height, rgba.into_raw())
            .ok_or_else(|| self.err("decoded frame has an unexpected size"))
    }

    async fn stop_session(&mut self) -> ReelResult<()> {
        if self.process.is_none() {
            return Ok(());
        }
        let _ = self.send_request(json!({ "type": "stop" })).await;
        self.stdin = None;
        self.stdout = None;

        if let Some(mut child) = self.process.take() {
            match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(url = %self.source, "browser driver did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod playwright_tests;
