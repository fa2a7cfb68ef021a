//! # reelsmith-compose
//!
//! Merges a base video, a captured overlay frame sequence, an audio track
//! and burned-in subtitles into one output file. Shells out to FFmpeg with a
//! filter graph; output appears at its final path only once FFmpeg has
//! exited successfully.

pub mod ffmpeg;
pub mod graph;
pub mod probe;

pub use ffmpeg::{CompositionSpec, FfmpegCompositor};
pub use graph::{build_filter_graph, SubtitleStyle};
pub use probe::probe_duration;
