//! # reelsmith-core
//!
//! Core types and primitives for the Reelsmith render pipeline.
//! This crate contains the foundational types shared by the capture,
//! compose and task crates: frames, timing math, bridge content,
//! subtitle cues, configuration, and error types.

pub mod bridge;
pub mod config;
pub mod error;
pub mod frame;
pub mod subtitle;
pub mod time;

pub use config::*;

pub use bridge::{BridgeContent, BridgeStore, FileBridgeStore};
pub use error::{ReelError, ReelResult};
pub use frame::{Frame, FrameBuffer};
pub use subtitle::{SubtitleCue, SubtitleSource};
pub use time::{Duration, Timestamp};
