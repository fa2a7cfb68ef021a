use std::path::Path;

use reelsmith_core::frame::{Frame, FrameBuffer};
use reelsmith_core::{Duration, ReelError, ReelResult};

use crate::backend::{CaptureBackend, CaptureSessionConfig, SessionInfo};
use crate::sequence::{self, FrameSequence, MAX_FRAMES};

pub struct CaptureSession {
    config: CaptureSessionConfig,
    backend: Box<dyn CaptureBackend>,
    is_active: bool,
}

impl CaptureSession {
    pub fn new(config: CaptureSessionConfig, backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            config,
            backend,
            is_active: false,
        }
    }

    pub fn config(&self) -> &CaptureSessionConfig {
        &self.config
    }

    pub async fn start(&mut self) -> ReelResult<SessionInfo> {
        let info = self.backend.start_session(&self.config).await?;
        self.is_active = true;
        Ok(info)
    }

    /// Capture the overlay as it looks at `frame.index / fps`.
    pub async fn capture_frame(&mut self, frame: Frame) -> ReelResult<FrameBuffer> {
        if !self.is_active {
            self.start().await?;
        }
        let time = frame.to_timestamp(self.config.fps).as_seconds();
        self.backend.capture_frame(time).await
    }

    /// Release the browser. Called even if `start` failed half-way, since the
    /// backend may already have spawned a process.
    pub async fn stop(&mut self) -> ReelResult<()> {
        self.is_active = false;
        self.backend.stop_session().await
    }

    /// Capture `ceil(duration * fps)` frames into `out_dir`.
    ///
    /// Frames left in `out_dir` by an earlier capture are removed first so the
    /// sequence is exactly the frames of this render. Other files are kept. `on_frame(done, total)` is called
    /// after each frame is written. The browser is stopped on every path.
    pub async fn capture_sequence<F>(
        &mut self,
        out_dir: &Path,
        duration: Duration,
        mut on_frame: F,
    ) -> ReelResult<FrameSequence>
    where
        F: FnMut(u64, u64) + Send,
    {
        let fps = self.config.fps;
        if !(fps > 0.0) || !(duration.as_seconds() > 0.0) {
            return Err(ReelError::InvalidArgument(format!(
                "capture needs a positive duration and fps (got {} @ {}fps)",
                duration, fps
            )));
        }
        let total = duration.frame_count(fps);
        if total > MAX_FRAMES {
            return Err(ReelError::InvalidArgument(format!(
                "{} frames exceeds the {} frame limit of the sequence naming",
                total, MAX_FRAMES
            )));
        }

        std::fs::create_dir_all(out_dir)?;
        let stale = sequence::clear_frames(out_dir)?;
        if stale > 0 {
            tracing::debug!(dir = %out_dir.display(), stale, "removed frames from a previous capture");
        }

        let result = self.run_frames(out_dir, total, &mut on_frame).await;
        let stopped = self.stop().await;

        match (result, stopped) {
            (Ok(seq), Ok(())) => Ok(seq),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_err)) => {
                tracing::warn!(error = %stop_err, "failed to stop capture backend after error");
                Err(e)
            }
        }
    }

    async fn run_frames<F>(
        &mut self,
        out_dir: &Path,
        total: u64,
        on_frame: &mut F,
    ) -> ReelResult<FrameSequence>
    where
        F: FnMut(u64, u64) + Send,
    {
        let info = self.start().await?;
        if !info.timeline_found {
            tracing::warn!(
                url = %self.config.source,
                "overlay exposes no seekable timeline; frames will show static content"
            );
        }

        tracing::info!(
            url = %self.config.source,
            frames = total,
            fps = self.config.fps,
            "capturing overlay frames"
        );

        let seq = FrameSequence::new(out_dir, self.config.fps, total);
        let mut size: Option<(u32, u32)> = None;

        for index in 0..total {
            let frame = self.capture_frame(Frame::new(index)).await?;

            let dims = (frame.width, frame.height);
            match size {
                None => size = Some(dims),
                Some(expected) if expected != dims => {
                    return Err(ReelError::capture(
                        &self.config.source,
                        format!(
                            "frame {} is {}x{}, expected {}x{}",
                            index, dims.0, dims.1, expected.0, expected.1
                        ),
                    ));
                }
                Some(_) => {}
            }

            let path = seq.frame_path(index);
            tokio::task::spawn_blocking(move || sequence::write_png(&path, &frame))
                .await
                .map_err(|e| ReelError::Io(std::io::Error::other(e)))??;

            on_frame(index + 1, total);
            if index % 10 == 0 {
                tracing::debug!(frame = index, total, "frame captured");
            }
        }

        Ok(seq)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.is_active {
            // Backends kill their browser process on drop; just make it visible.
            tracing::warn!(url = %self.config.source, "capture session dropped while active");
        }
    }
}
