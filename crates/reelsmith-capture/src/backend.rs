use std::time::Duration;

use async_trait::async_trait;
use reelsmith_core::frame::FrameBuffer;
use reelsmith_core::{BridgeContent, CaptureConfig, ReelResult, RenderConfig};

/// Hard limit on the initial page load.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Wait after load so the overlay's animation library can initialise.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(3000);
/// Wait after each timeline seek before the screenshot.
pub const DEFAULT_SEEK_DELAY: Duration = Duration::from_millis(16);
/// Upper bound on a single seek or screenshot round trip.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CaptureSessionConfig {
    /// URL of the overlay document.
    pub source: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub fps: f64,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub seek_delay: Duration,
    pub frame_timeout: Duration,
    /// Task-scoped content exposed to the page before any of its scripts run.
    pub bridge: Option<BridgeContent>,
}

impl CaptureSessionConfig {
    pub fn new(source: impl Into<String>, viewport_width: u32, viewport_height: u32, fps: f64) -> Self {
        Self {
            source: source.into(),
            viewport_width,
            viewport_height,
            fps,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            seek_delay: DEFAULT_SEEK_DELAY,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            bridge: None,
        }
    }

    /// Build a session config from the `[render]` and `[capture]` sections.
    pub fn from_config(source: impl Into<String>, render: &RenderConfig, capture: &CaptureConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_millis(capture.navigation_timeout_ms),
            settle_delay: Duration::from_millis(capture.settle_delay_ms),
            seek_delay: Duration::from_millis(capture.seek_delay_ms),
            frame_timeout: Duration::from_millis(capture.frame_timeout_ms),
            ..Self::new(source, render.width, render.height, render.fps)
        }
    }

    pub fn with_bridge(mut self, bridge: BridgeContent) -> Self {
        self.bridge = Some(bridge);
        self
    }
}

/// What the backend learned about the page once it settled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Whether the page exposes a seekable animation timeline. Without one
    /// frames still capture, they just show static content.
    pub timeline_found: bool,
}

/// A browser engine that can load an overlay and screenshot it at a given
/// logical time. One backend instance serves exactly one render.
#[async_trait]
pub trait CaptureBackend: Send {
    /// Launch the browser, load `config.source`, and wait for it to settle.
    async fn start_session(&mut self, config: &CaptureSessionConfig) -> ReelResult<SessionInfo>;

    /// Seek the overlay timeline to `time_seconds` and capture one frame.
    async fn capture_frame(&mut self, time_seconds: f64) -> ReelResult<FrameBuffer>;

    /// Release the browser. Must be safe to call when no session is running.
    async fn stop_session(&mut self) -> ReelResult<()>;
}
