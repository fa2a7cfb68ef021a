//! Subtitle cues and SRT text handling.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ReelError, ReelResult, Timestamp};

/// One timed subtitle line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Where the compositor reads burned-in subtitles from.
#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleSource {
    /// Cues held in memory; written to a temporary SRT before composition.
    Cues(Vec<SubtitleCue>),
    /// An existing `.srt` file.
    File(PathBuf),
}

/// Render cues as SRT text. Cues are numbered from 1 in the given order.
pub fn to_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n",
            i + 1,
            Timestamp::from_seconds(cue.start).to_srt(),
            Timestamp::from_seconds(cue.end).to_srt(),
            cue.text.trim()
        ));
    }
    out
}

/// Parse SRT text into cues. Malformed blocks are skipped; multi-line cue
/// text is joined with a single space.
pub fn parse_srt(text: &str) -> Vec<SubtitleCue> {
    let normalized = text.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        // Sequence number is optional in practice; find the timing line.
        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };
        let Some((start_raw, end_raw)) = lines[timing_idx].split_once("-->") else {
            continue;
        };
        let (Some(start), Some(end)) = (
            Timestamp::parse_srt(start_raw),
            Timestamp::parse_srt(end_raw),
        ) else {
            continue;
        };
        let body: Vec<&str> = lines[timing_idx + 1..].iter().map(|l| l.trim()).collect();
        if body.is_empty() {
            continue;
        }
        cues.push(SubtitleCue::new(
            start.as_seconds(),
            end.as_seconds(),
            body.join(" "),
        ));
    }

    cues
}

/// Read and validate an existing SRT file. A file without a single
/// well-formed cue is rejected.
pub fn read_srt_file(path: &Path) -> ReelResult<Vec<SubtitleCue>> {
    let text = std::fs::read_to_string(path)?;
    let cues = parse_srt(&text);
    if cues.is_empty() {
        return Err(ReelError::InvalidArgument(format!(
            "no subtitle cues in {}",
            path.display()
        )));
    }
    validate_cues(&cues)?;
    Ok(cues)
}

/// Write cues to an SRT file, creating parent directories.
pub fn write_srt_file(cues: &[SubtitleCue], path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_srt(cues))?;
    Ok(())
}

/// Check that cues are well-formed: finite, non-negative, `start < end`, ordered.
pub fn validate_cues(cues: &[SubtitleCue]) -> ReelResult<()> {
    let mut prev_start = 0.0;
    for (i, cue) in cues.iter().enumerate() {
        let finite = cue.start.is_finite() && cue.end.is_finite();
        if !finite || cue.start < 0.0 || cue.end <= cue.start {
            return Err(ReelError::InvalidArgument(format!(
                "subtitle cue {} has invalid range {}..{}",
                i + 1,
                cue.start,
                cue.end
            )));
        }
        if cue.start < prev_start {
            return Err(ReelError::InvalidArgument(format!(
                "subtitle cue {} starts before the previous cue",
                i + 1
            )));
        }
        prev_start = cue.start;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_srt_numbers_and_formats() {
        let cues = vec![
            SubtitleCue::new(0.0, 1.5, "Hello there"),
            SubtitleCue::new(1.5, 3.25, "  General Kenobi "),
        ];
        let srt = to_srt(&cues);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nHello there\n\n2\n00:00:01,500 --> 00:00:03,250\nGeneral Kenobi\n"
        );
    }

    #[test]
    fn test_parse_srt_handles_crlf_and_multiline() {
        let raw = "1\r\n00:00:00,000 --> 00:00:02,000\r\nfirst\r\nline\r\n\r\n2\r\n00:00:02,000 --> 00:00:04,500\r\nsecond\r\n";
        let cues = parse_srt(raw);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "first line");
        assert!((cues[1].end - 4.5).abs() < 0.001);
    }

    #[test]
    fn test_parse_srt_skips_malformed_blocks() {
        let raw = "1\nnot a timing line\ntext\n\n2\n00:00:01,000 --> 00:00:02,000\nkept\n\n3\n00:00:03,000 --> 00:00:04,000\n";
        let cues = parse_srt(raw);
        assert_eq!(cues, vec![SubtitleCue::new(1.0, 2.0, "kept")]);
    }

    #[test]
    fn test_validate_cues() {
        assert!(validate_cues(&[SubtitleCue::new(0.0, 1.0, "a")]).is_ok());
        assert!(validate_cues(&[SubtitleCue::new(1.0, 1.0, "a")]).is_err());
        assert!(validate_cues(&[
            SubtitleCue::new(2.0, 3.0, "a"),
            SubtitleCue::new(1.0, 2.0, "b"),
        ])
        .is_err());
    }

    #[test]
    fn test_validate_cues_rejects_non_finite_times() {
        assert!(validate_cues(&[SubtitleCue::new(f64::NAN, 1.0, "a")]).is_err());
        assert!(validate_cues(&[SubtitleCue::new(0.0, f64::NAN, "a")]).is_err());
        assert!(validate_cues(&[SubtitleCue::new(0.0, f64::INFINITY, "a")]).is_err());
        assert!(validate_cues(&[
            SubtitleCue::new(0.0, 1.0, "a"),
            SubtitleCue::new(f64::NAN, f64::NAN, "b"),
        ])
        .is_err());
    }

    #[test]
    fn test_read_srt_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.srt");
        std::fs::write(&good, "1\n00:00:00,000 --> 00:00:01,000\nhi\n").unwrap();
        assert_eq!(read_srt_file(&good).unwrap().len(), 1);

        let empty = dir.path().join("empty.srt");
        std::fs::write(&empty, "not subtitles at all").unwrap();
        assert!(read_srt_file(&empty).unwrap_err().to_string().contains("no subtitle cues"));

        let backwards = dir.path().join("backwards.srt");
        std::fs::write(&backwards, "1\n00:00:02,000 --> 00:00:01,000\nhi\n").unwrap();
        assert!(read_srt_file(&backwards).is_err());

        assert!(read_srt_file(&dir.path().join("missing.srt")).is_err());
    }

    #[test]
    fn test_write_srt_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("subs.srt");
        write_srt_file(&[SubtitleCue::new(0.0, 1.0, "x")], &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(parse_srt(&written).len(), 1);
    }
}
