use std::path::Path;
use std::process::Stdio;

use reelsmith_core::{ReelError, ReelResult};
use tokio::process::Command;

/// Media duration in seconds, via ffprobe.
pub async fn probe_duration(ffprobe_bin: &str, path: &Path) -> ReelResult<f64> {
    if !path.exists() {
        return Err(ReelError::collaborator(
            "ffprobe",
            format!("file not found: {}", path.display()),
        ));
    }

    let output = Command::new(ffprobe_bin)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ReelError::collaborator("ffprobe", format!("failed to run {ffprobe_bin}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReelError::collaborator("ffprobe", stderr.trim().to_string()));
    }

    parse_duration_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe's bare `format=duration` output.
pub fn parse_duration_output(raw: &str) -> ReelResult<f64> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(ReelError::collaborator(
            "ffprobe",
            format!("unusable duration output: {trimmed:?}"),
        )),
    }
}
