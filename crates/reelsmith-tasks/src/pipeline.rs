//! The render job: content → bridge → capture → composite → storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reelsmith_capture::{CaptureBackend, CaptureSession, CaptureSessionConfig, PlaywrightBackend};
use reelsmith_compose::{probe_duration, CompositionSpec, FfmpegCompositor};
use reelsmith_core::subtitle::{self, SubtitleSource};
use reelsmith_core::{
    BridgeContent, BridgeStore, Duration, FileBridgeStore, ReelConfig, ReelError, ReelResult,
};

use crate::collaborators::{
    ArtifactStorage, EvenSubtitleAligner, FixedAudio, LocalStorage, ScriptWriter,
    SpeechSynthesizer, SubtitleAligner, TemplateScriptWriter,
};
use crate::manager::Progress;
use crate::task::RenderRequest;

/// Work the task manager runs for each submitted task. Returns the output
/// locator.
#[async_trait]
pub trait RenderJob: Send + Sync {
    async fn run(
        &self,
        task_id: &str,
        request: &RenderRequest,
        progress: &Progress,
    ) -> ReelResult<String>;
}

/// Creates a fresh capture backend for every render.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn CaptureBackend> + Send + Sync>;

pub struct ReelPipeline {
    config: ReelConfig,
    bridge: Arc<dyn BridgeStore>,
    backend_factory: BackendFactory,
    compositor: FfmpegCompositor,
    script_writer: Arc<dyn ScriptWriter>,
    speech: Arc<dyn SpeechSynthesizer>,
    aligner: Arc<dyn SubtitleAligner>,
    storage: Arc<dyn ArtifactStorage>,
}

impl ReelPipeline {
    /// Pipeline wired to the Playwright backend and the local collaborators.
    pub fn local(config: ReelConfig) -> Self {
        let capture = config.capture.clone();
        let backend_factory: BackendFactory = Arc::new(move || {
            let mut backend = PlaywrightBackend::new().with_node_bin(capture.node_bin.clone());
            if let Some(script) = &capture.driver_script {
                backend = backend.with_script(script.clone());
            }
            Box::new(backend) as Box<dyn CaptureBackend>
        });

        Self {
            bridge: Arc::new(FileBridgeStore::new(config.tasks.work_dir.join("bridge"))),
            backend_factory,
            compositor: FfmpegCompositor::from_config(&config),
            script_writer: Arc::new(TemplateScriptWriter),
            speech: Arc::new(FixedAudio::new(config.audio.default_audio.clone())),
            aligner: Arc::new(EvenSubtitleAligner::new(config.compose.ffprobe_bin.clone())),
            storage: Arc::new(
                LocalStorage::new(config.tasks.output_dir.clone())
                    .with_public_base_url(config.tasks.public_base_url.clone()),
            ),
            config,
        }
    }

    pub fn with_backend_factory(mut self, factory: BackendFactory) -> Self {
        self.backend_factory = factory;
        self
    }

    pub fn with_bridge_store(mut self, bridge: Arc<dyn BridgeStore>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_script_writer(mut self, writer: Arc<dyn ScriptWriter>) -> Self {
        self.script_writer = writer;
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_aligner(mut self, aligner: Arc<dyn SubtitleAligner>) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ArtifactStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn bridge_store(&self) -> Arc<dyn BridgeStore> {
        Arc::clone(&self.bridge)
    }

    pub fn config(&self) -> &ReelConfig {
        &self.config
    }

    fn work_dir(&self, task_id: &str) -> PathBuf {
        self.config.tasks.work_dir.join(task_id)
    }

    async fn render(
        &self,
        task_id: &str,
        request: &RenderRequest,
        progress: &Progress,
        work_dir: &Path,
    ) -> ReelResult<String> {
        let options = &request.options;
        tokio::fs::create_dir_all(work_dir).await?;

        progress.checkpoint("preparing_content", 5);
        let script = self.script_writer.write(&request.topic).await?;
        let audio = match &options.audio {
            Some(path) => path.clone(),
            None => self.speech.synthesize(&script.narration, work_dir).await?,
        };
        let cues = self.aligner.align(&audio, &script.narration).await?;
        let duration = match options.duration_secs.or(self.config.render.default_duration_secs) {
            Some(secs) => secs,
            None => probe_duration(&self.config.compose.ffprobe_bin, &audio).await?,
        };
        let fps = options.fps.unwrap_or(self.config.render.fps);
        if !(duration > 0.0) || !(fps > 0.0) {
            return Err(ReelError::InvalidArgument(format!(
                "render needs a positive duration and fps (got {duration}s @ {fps}fps)"
            )));
        }

        progress.checkpoint("writing_bridge", 20);
        let content = BridgeContent::new(
            script.overlay_html,
            script.narration,
            subtitle::to_srt(&cues),
        );
        self.bridge.write(task_id, &content)?;

        progress.checkpoint("capturing", 25);
        let mut session_config = CaptureSessionConfig::from_config(
            overlay_url(&self.config.capture.overlay_url, task_id),
            &self.config.render,
            &self.config.capture,
        )
        .with_bridge(content);
        session_config.fps = fps;

        let mut session = CaptureSession::new(session_config, (self.backend_factory)());
        let frames = session
            .capture_sequence(
                &work_dir.join("frames"),
                Duration::from_seconds(duration),
                |done, total| progress.checkpoint("capturing", capture_progress(done, total)),
            )
            .await?;

        progress.checkpoint("compositing", 80);
        let output = work_dir.join(format!("reel_{task_id}.mp4"));
        let spec = CompositionSpec {
            base_video: options
                .base_video
                .clone()
                .unwrap_or_else(|| self.config.compose.base_video.clone()),
            frames: frames.clone(),
            audio,
            subtitles: (!cues.is_empty()).then_some(SubtitleSource::Cues(cues)),
            output,
        };
        let composed = self.compositor.compose(&spec).await;
        if let Err(e) = frames.remove() {
            tracing::warn!(task_id, error = %e, "failed to remove frame directory");
        }
        let output = composed?;

        progress.checkpoint("storing", 95);
        self.storage.persist(&output).await
    }
}

#[async_trait]
impl RenderJob for ReelPipeline {
    async fn run(
        &self,
        task_id: &str,
        request: &RenderRequest,
        progress: &Progress,
    ) -> ReelResult<String> {
        let work_dir = self.work_dir(task_id);
        let result = self.render(task_id, request, progress, &work_dir).await;

        if let Err(e) = self.bridge.remove(task_id) {
            tracing::warn!(task_id, error = %e, "failed to remove bridge content");
        }
        if work_dir.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                tracing::warn!(task_id, error = %e, "failed to remove work directory");
            }
        }
        result
    }
}

/// Overlay URL for one task. The `task` query parameter lets the overlay
/// fetch its bridge content over HTTP when it is not injected.
pub fn overlay_url(base: &str, task_id: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}task={task_id}")
}

/// Capture spans 25..=75 percent.
fn capture_progress(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 75;
    }
    (25 + done.min(total) * 50 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_url() {
        assert_eq!(
            overlay_url("http://127.0.0.1:8080/overlay", "abc"),
            "http://127.0.0.1:8080/overlay?task=abc"
        );
        assert_eq!(
            overlay_url("http://host/overlay?theme=dark", "abc"),
            "http://host/overlay?theme=dark&task=abc"
        );
    }

    #[test]
    fn test_capture_progress_range() {
        assert_eq!(capture_progress(0, 50), 25);
        assert_eq!(capture_progress(25, 50), 50);
        assert_eq!(capture_progress(50, 50), 75);
        assert_eq!(capture_progress(1, 0), 75);
    }
}
