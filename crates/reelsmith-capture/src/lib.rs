//! # reelsmith-capture
//!
//! Drives a headless browser that has loaded an animated overlay document,
//! seeks its timeline frame by frame and writes each frame as a transparent
//! PNG.

pub mod backend;
pub mod playwright;
pub mod sequence;
pub mod session;

pub use backend::{CaptureBackend, CaptureSessionConfig, SessionInfo};
pub use playwright::PlaywrightBackend;
pub use sequence::FrameSequence;
pub use session::CaptureSession;
