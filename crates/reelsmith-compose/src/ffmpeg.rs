use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use reelsmith_capture::FrameSequence;
use reelsmith_core::subtitle::{self, SubtitleSource};
use reelsmith_core::{ReelConfig, ReelError, ReelResult};
use tokio::process::Command;

use crate::graph::{build_filter_graph, SubtitleStyle};

/// Everything one composite needs. Built per render and not changed after
/// it is handed to [`FfmpegCompositor::compose`].
#[derive(Debug, Clone)]
pub struct CompositionSpec {
    pub base_video: PathBuf,
    pub frames: FrameSequence,
    pub audio: PathBuf,
    pub subtitles: Option<SubtitleSource>,
    pub output: PathBuf,
}

/// Removes the in-progress output (and any scratch files) unless committed.
/// Covers FFmpeg failure and the compose future being dropped mid-run.
struct PartialOutput {
    temp: PathBuf,
    scratch: Vec<PathBuf>,
    committed: bool,
}

impl PartialOutput {
    fn new(temp: PathBuf) -> Self {
        Self {
            temp,
            scratch: Vec::new(),
            committed: false,
        }
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        for path in &self.scratch {
            let _ = std::fs::remove_file(path);
        }
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Compositor that shells out to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    ffmpeg_bin: String,
    width: u32,
    height: u32,
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegCompositor {
    pub fn new(ffmpeg_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            width: 1080,
            height: 1920,
        }
    }

    pub fn from_config(config: &ReelConfig) -> Self {
        Self::new(config.compose.ffmpeg_bin.clone())
            .with_canvas(config.render.width, config.render.height)
    }

    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Whether `ffmpeg -version` runs successfully.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_bin)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// FFmpeg arguments for `spec`, writing to `target`.
    pub fn build_args(
        &self,
        spec: &CompositionSpec,
        target: &Path,
        subtitle_file: Option<&Path>,
    ) -> Vec<OsString> {
        let graph = build_filter_graph(
            self.width,
            self.height,
            subtitle_file,
            &SubtitleStyle::default(),
        );
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            // Input 0: base video
            "-i".into(),
            spec.base_video.clone().into(),
            // Input 1: overlay frames, read at the capture frame rate
            "-framerate".into(),
            spec.frames.fps().to_string().into(),
            "-i".into(),
            spec.frames.input_pattern().into(),
            // Input 2: narration audio
            "-i".into(),
            spec.audio.clone().into(),
            "-filter_complex".into(),
            graph.into(),
            "-map".into(),
            "[outv]".into(),
            "-map".into(),
            "2:a".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-crf".into(),
            "23".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-shortest".into(),
            "-movflags".into(),
            "+faststart".into(),
            target.as_os_str().to_owned(),
        ]
    }

    /// Run the composite. On success the output exists at `spec.output`; on
    /// any failure nothing new is left there.
    pub async fn compose(&self, spec: &CompositionSpec) -> ReelResult<PathBuf> {
        check_inputs(spec)?;

        let out_dir = match spec.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&out_dir)?;

        let stem = spec
            .output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let ext = spec
            .output
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("mp4");

        let mut guard = PartialOutput::new(out_dir.join(format!(".{stem}.partial.{ext}")));
        if guard.temp.exists() {
            std::fs::remove_file(&guard.temp)?;
        }

        let subtitle_file = match &spec.subtitles {
            None => None,
            Some(SubtitleSource::File(path)) => {
                if !path.is_file() {
                    return Err(ReelError::Composition(format!(
                        "subtitle file not found: {}",
                        path.display()
                    )));
                }
                let cues = subtitle::read_srt_file(path)?;
                tracing::debug!(path = %path.display(), cues = cues.len(), "subtitle file checked");
                Some(path.clone())
            }
            Some(SubtitleSource::Cues(cues)) if cues.is_empty() => None,
            Some(SubtitleSource::Cues(cues)) => {
                subtitle::validate_cues(cues)?;
                let path = out_dir.join(format!(".{stem}.subtitles.srt"));
                guard.scratch.push(path.clone());
                subtitle::write_srt_file(cues, &path)?;
                Some(path)
            }
        };

        let args = self.build_args(spec, &guard.temp, subtitle_file.as_deref());
        tracing::info!(
            output = %spec.output.display(),
            frames = spec.frames.len(),
            fps = spec.frames.fps(),
            "compositing with ffmpeg"
        );

        let output = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ReelError::Composition(format!(
                        "{} not found in PATH. Install FFmpeg: https://ffmpeg.org/download.html",
                        self.ffmpeg_bin
                    ))
                } else {
                    ReelError::Composition(format!("failed to start ffmpeg: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let diagnostic = if stderr.trim().is_empty() {
                format!("ffmpeg exited with {}", output.status)
            } else {
                stderr
            };
            tracing::warn!(status = %output.status, "ffmpeg failed");
            return Err(ReelError::Composition(diagnostic));
        }

        if !guard.temp.exists() {
            return Err(ReelError::Composition(format!(
                "ffmpeg succeeded but produced no file at {}",
                guard.temp.display()
            )));
        }

        tokio::fs::rename(&guard.temp, &spec.output).await?;
        guard.committed = true;

        tracing::info!(output = %spec.output.display(), "composite finished");
        Ok(spec.output.clone())
    }
}

fn check_inputs(spec: &CompositionSpec) -> ReelResult<()> {
    if !spec.base_video.is_file() {
        return Err(ReelError::Composition(format!(
            "base video not found: {}",
            spec.base_video.display()
        )));
    }
    if !spec.audio.is_file() {
        return Err(ReelError::Composition(format!(
            "audio not found: {}",
            spec.audio.display()
        )));
    }
    if spec.frames.is_empty() || !spec.frames.frame_path(0).is_file() {
        return Err(ReelError::Composition(format!(
            "no overlay frames in {}",
            spec.frames.dir().display()
        )));
    }
    if !(spec.frames.fps() > 0.0) {
        return Err(ReelError::Composition(format!(
            "invalid overlay frame rate {}",
            spec.frames.fps()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsmith_core::SubtitleCue;

    struct Fixture {
        dir: tempfile::TempDir,
        spec: CompositionSpec,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        std::fs::create_dir_all(&frames_dir).unwrap();
        for i in 0..3 {
            std::fs::write(frames_dir.join(format!("frame_{:05}.png", i)), b"png").unwrap();
        }
        std::fs::write(dir.path().join("base.mp4"), b"video").unwrap();
        std::fs::write(dir.path().join("voice.mp3"), b"audio").unwrap();

        let spec = CompositionSpec {
            base_video: dir.path().join("base.mp4"),
            frames: FrameSequence::new(&frames_dir, 10.0, 3),
            audio: dir.path().join("voice.mp3"),
            subtitles: None,
            output: dir.path().join("out").join("reel.mp4"),
        };
        Fixture { dir, spec }
    }

    /// An executable shell script standing in for ffmpeg. The output path is
    /// always the last argument.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        std::fs::write(
            &path,
            format!("#!/bin/sh\nfor a in \"$@\"; do last=\"$a\"; done\n{body}\n"),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|n| n.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_args_map_overlay_and_audio_and_truncate() {
        let fx = fixture();
        let compositor = FfmpegCompositor::default();
        let args: Vec<String> = compositor
            .build_args(&fx.spec, Path::new("/tmp/.reel.partial.mp4"), None)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-framerate") + 1], "10");
        assert!(args[pos("-framerate") + 3].ends_with("frame_%05d.png"));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "2:a"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "[outv]"));
        assert_eq!(args.last().unwrap(), "/tmp/.reel.partial.mp4");
    }

    #[tokio::test]
    async fn test_missing_base_video_fails_before_spawning() {
        let mut fx = fixture();
        fx.spec.base_video = fx.dir.path().join("nope.mp4");
        let compositor = FfmpegCompositor::new("reelsmith-no-such-ffmpeg");
        let err = compositor.compose(&fx.spec).await.unwrap_err();
        assert!(err.to_string().contains("base video not found"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_a_composition_error() {
        let fx = fixture();
        let compositor = FfmpegCompositor::new("reelsmith-no-such-ffmpeg");
        let err = compositor.compose(&fx.spec).await.unwrap_err();
        assert!(matches!(err, ReelError::Composition(_)));
        assert!(!fx.spec.output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_moves_temp_into_place() {
        let mut fx = fixture();
        fx.spec.subtitles = Some(SubtitleSource::Cues(vec![SubtitleCue::new(0.0, 1.0, "hi")]));
        let bin = fake_ffmpeg(fx.dir.path(), "printf done > \"$last\"\nexit 0");

        let out = FfmpegCompositor::new(bin).compose(&fx.spec).await.unwrap();
        assert_eq!(out, fx.spec.output);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "done");
        // No temp output or scratch SRT left behind.
        assert!(leftovers(fx.spec.output.parent().unwrap()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_keeps_stderr_and_leaves_no_output() {
        let fx = fixture();
        let bin = fake_ffmpeg(
            fx.dir.path(),
            "printf partial > \"$last\"\necho \"Error opening input: Invalid data found\" >&2\nexit 1",
        );

        let err = FfmpegCompositor::new(bin).compose(&fx.spec).await.unwrap_err();
        match err {
            ReelError::Composition(msg) => {
                assert_eq!(msg, "Error opening input: Invalid data found\n")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!fx.spec.output.exists());
        assert!(leftovers(fx.spec.output.parent().unwrap()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_preserves_existing_output() {
        let fx = fixture();
        std::fs::create_dir_all(fx.spec.output.parent().unwrap()).unwrap();
        std::fs::write(&fx.spec.output, b"previous render").unwrap();
        let bin = fake_ffmpeg(fx.dir.path(), "printf partial > \"$last\"\nexit 1");

        assert!(FfmpegCompositor::new(bin).compose(&fx.spec).await.is_err());
        assert_eq!(std::fs::read(&fx.spec.output).unwrap(), b"previous render");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_mid_run_leaves_no_output() {
        let fx = fixture();
        let bin = fake_ffmpeg(fx.dir.path(), "printf partial > \"$last\"\nexec sleep 30");

        let compositor = FfmpegCompositor::new(bin);
        let run = compositor.compose(&fx.spec);
        let res = tokio::time::timeout(std::time::Duration::from_millis(500), run).await;
        assert!(res.is_err(), "compose should still be running");

        assert!(!fx.spec.output.exists());
        assert!(leftovers(fx.spec.output.parent().unwrap()).is_empty());
    }
    #[cfg(unix)]
    #[tokio::test]
    async fn test_is_available() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ffmpeg(dir.path(), "exit 0");
        assert!(FfmpegCompositor::new(bin).is_available().await);
        assert!(!FfmpegCompositor::new("reelsmith-no-such-ffmpeg").is_available().await);
    }

    #[tokio::test]
    async fn test_unusable_subtitle_file_fails_before_spawning() {
        let mut fx = fixture();
        let srt = fx.dir.path().join("broken.srt");
        std::fs::write(&srt, "1\n00:00:05,000 --> 00:00:01,000\nbackwards\n").unwrap();
        fx.spec.subtitles = Some(SubtitleSource::File(srt));

        let err = FfmpegCompositor::new("reelsmith-no-such-ffmpeg")
            .compose(&fx.spec)
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::InvalidArgument(_)), "{err}");
        assert!(!fx.spec.output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subtitle_file_is_burned_in_as_given() {
        let mut fx = fixture();
        let srt = fx.dir.path().join("subs.srt");
        std::fs::write(&srt, "1\n00:00:00,000 --> 00:00:01,000\nhello\n").unwrap();
        fx.spec.subtitles = Some(SubtitleSource::File(srt));
        // Record the filter graph ffmpeg was handed.
        let bin = fake_ffmpeg(
            fx.dir.path(),
            "prev=\"\"; for a in \"$@\"; do if [ \"$prev\" = \"-filter_complex\" ]; then printf '%s' \"$a\" > \"$last\"; fi; prev=\"$a\"; done\nexit 0",
        );

        let out = FfmpegCompositor::new(bin).compose(&fx.spec).await.unwrap();
        let graph = std::fs::read_to_string(out).unwrap();
        assert!(graph.contains("subtitles="), "{graph}");
        assert!(graph.contains("subs.srt"), "{graph}");
    }
}
