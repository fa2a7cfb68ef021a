//! On-disk frame sequences.
//!
//! Frames are named `frame_00000.png`, `frame_00001.png`, ... so lexical and
//! numeric order agree, which ffmpeg's image2 demuxer relies on.

use std::path::{Path, PathBuf};

use reelsmith_core::frame::FrameBuffer;
use reelsmith_core::{ReelError, ReelResult};

pub const FRAME_PREFIX: &str = "frame_";
pub const FRAME_EXTENSION: &str = "png";
/// Printf-style pattern matching [`frame_file_name`], for ffmpeg.
pub const FRAME_PATTERN: &str = "frame_%05d.png";
/// Largest frame count the fixed 5-digit index can name.
pub const MAX_FRAMES: u64 = 100_000;

pub fn frame_file_name(index: u64) -> String {
    format!("{FRAME_PREFIX}{index:05}.{FRAME_EXTENSION}")
}

/// Parse the index out of a `frame_NNNNN.png` name.
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(".png")?;
    if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A contiguous, zero-indexed run of frames in one directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    dir: PathBuf,
    fps: f64,
    len: u64,
}

impl FrameSequence {
    pub fn new(dir: impl Into<PathBuf>, fps: f64, len: u64) -> Self {
        Self {
            dir: dir.into(),
            fps,
            len,
        }
    }

    /// Inspect `dir` and build a sequence from the frames found there.
    /// Fails if the indices have a gap or do not start at zero.
    pub fn scan(dir: &Path, fps: f64) -> ReelResult<Self> {
        let mut indices = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(idx) = entry.file_name().to_str().and_then(parse_frame_index) {
                indices.push(idx);
            }
        }
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if *actual != expected as u64 {
                return Err(ReelError::InvalidArgument(format!(
                    "frame sequence in {} has a gap: expected frame {}, found {}",
                    dir.display(),
                    expected,
                    actual
                )));
            }
        }
        Ok(Self::new(dir, fps, indices.len() as u64))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(frame_file_name(index))
    }

    /// `dir/frame_%05d.png`, the input path handed to ffmpeg.
    pub fn input_pattern(&self) -> PathBuf {
        self.dir.join(FRAME_PATTERN)
    }

    /// Delete the frame directory.
    pub fn remove(&self) -> ReelResult<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Remove `frame_NNNNN.png` files left in `dir` by an earlier capture.
/// Anything else in the directory is left alone. Returns how many were removed.
pub fn clear_frames(dir: &Path) -> ReelResult<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_frame = entry.file_name().to_str().and_then(parse_frame_index).is_some();
        if is_frame && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Encode a frame as an RGBA PNG, keeping its alpha channel.
pub fn write_png(path: &Path, frame: &FrameBuffer) -> ReelResult<()> {
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| {
            ReelError::InvalidArgument(format!(
                "frame buffer does not match {}x{}",
                frame.width, frame.height
            ))
        })?;
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| ReelError::Io(std::io::Error::other(e)))
}
