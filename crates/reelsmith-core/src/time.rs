use serde::{Deserialize, Serialize};
use std::fmt;

/// Slack applied before rounding `seconds * fps` up, so float noise such as
/// `0.1 * 30.0 == 3.0000000000000004` does not produce an extra frame.
const FRAME_EPSILON: f64 = 1e-9;

/// Time duration with sub-millisecond precision (stored as fractional seconds).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Duration {
    /// Duration in seconds.
    seconds: f64,
}

impl Duration {
    /// Create a duration from seconds.
    pub fn from_seconds(s: f64) -> Self {
        Self {
            seconds: s.max(0.0),
        }
    }

    /// Create a duration from milliseconds.
    pub fn from_millis(ms: f64) -> Self {
        Self::from_seconds(ms / 1000.0)
    }

    /// Create a zero duration.
    pub fn zero() -> Self {
        Self { seconds: 0.0 }
    }

    /// Get duration as seconds.
    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Get duration as milliseconds.
    pub fn as_millis(&self) -> f64 {
        self.seconds * 1000.0
    }

    /// Number of frames needed to cover this duration: `ceil(seconds * fps)`.
    pub fn frame_count(&self, fps: f64) -> u64 {
        if self.seconds <= 0.0 || fps <= 0.0 {
            return 0;
        }
        (self.seconds * fps - FRAME_EPSILON).ceil().max(0.0) as u64
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::zero()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds < 1.0 {
            write!(f, "{:.0}ms", self.seconds * 1000.0)
        } else {
            write!(f, "{:.2}s", self.seconds)
        }
    }
}

/// A point in time within a video.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp {
    /// Time in seconds from the start of the video.
    seconds: f64,
}

impl Timestamp {
    /// Create a timestamp from seconds.
    pub fn from_seconds(s: f64) -> Self {
        Self {
            seconds: s.max(0.0),
        }
    }

    /// Create a timestamp at the start (0.0).
    pub fn zero() -> Self {
        Self { seconds: 0.0 }
    }

    /// Get the time in seconds.
    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Convert to a frame index for a given FPS.
    pub fn to_frame(&self, fps: f64) -> u64 {
        (self.seconds * fps).floor() as u64
    }

    /// Format as an SRT timestamp (`HH:MM:SS,mmm`).
    pub fn to_srt(&self) -> String {
        let (h, m, s, ms) = self.parts();
        format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
    }

    /// Parse an SRT timestamp (`HH:MM:SS,mmm`). A `.` separator is accepted too.
    pub fn parse_srt(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (hms, millis) = raw.split_once(|c| c == ',' || c == '.')?;
        let mut fields = hms.split(':');
        let h: u64 = fields.next()?.parse().ok()?;
        let m: u64 = fields.next()?.parse().ok()?;
        let s: u64 = fields.next()?.parse().ok()?;
        if fields.next().is_some() || m >= 60 || s >= 60 {
            return None;
        }
        let ms: u64 = millis.parse().ok()?;
        Some(Self::from_seconds(
            (h * 3600 + m * 60 + s) as f64 + ms as f64 / 1000.0,
        ))
    }

    fn parts(&self) -> (u64, u64, u64, u64) {
        let total_ms = (self.seconds * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let secs = (total_ms % 60_000) / 1_000;
        (hours, minutes, secs, total_ms % 1_000)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::zero()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s, ms) = self.parts();
        write!(f, "{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_seconds() {
        let d = Duration::from_seconds(2.5);
        assert!((d.as_seconds() - 2.5).abs() < 0.001);
        assert!((d.as_millis() - 2500.0).abs() < 0.1);
    }

    #[test]
    fn test_duration_frame_count() {
        assert_eq!(Duration::from_seconds(1.0).frame_count(30.0), 30);
        assert_eq!(Duration::from_seconds(5.0).frame_count(10.0), 50);
        assert_eq!(Duration::from_seconds(1.01).frame_count(10.0), 11);
        assert_eq!(Duration::from_seconds(0.01).frame_count(15.0), 1);
    }

    #[test]
    fn test_duration_frame_count_ignores_float_noise() {
        // 0.1 * 30.0 is 3.0000000000000004 in f64
        assert_eq!(Duration::from_seconds(0.1).frame_count(30.0), 3);
        assert_eq!(Duration::from_seconds(0.7).frame_count(10.0), 7);
    }

    #[test]
    fn test_duration_frame_count_degenerate() {
        assert_eq!(Duration::zero().frame_count(30.0), 0);
        assert_eq!(Duration::from_seconds(2.0).frame_count(0.0), 0);
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(format!("{}", Duration::from_seconds(2.5)), "2.50s");
        assert_eq!(format!("{}", Duration::from_millis(16.0)), "16ms");
    }

    #[test]
    fn test_timestamp_srt_round_trip() {
        let ts = Timestamp::from_seconds(3661.5);
        assert_eq!(ts.to_srt(), "01:01:01,500");
        let parsed = Timestamp::parse_srt("01:01:01,500").unwrap();
        assert!((parsed.as_seconds() - 3661.5).abs() < 0.0005);
    }

    #[test]
    fn test_timestamp_parse_rejects_garbage() {
        assert!(Timestamp::parse_srt("1:2").is_none());
        assert!(Timestamp::parse_srt("00:61:00,000").is_none());
        assert!(Timestamp::parse_srt("aa:bb:cc,ddd").is_none());
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_seconds(3661.5);
        assert_eq!(format!("{}", ts), "01:01:01.500");
    }

    #[test]
    fn test_timestamp_to_frame() {
        assert_eq!(Timestamp::from_seconds(1.0).to_frame(30.0), 30);
    }
}
