//! External services the render pipeline depends on, plus local stand-ins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reelsmith_core::{ReelError, ReelResult, SubtitleCue};

/// Text and overlay markup generated for a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub narration: String,
    pub overlay_html: String,
}

#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write(&self, topic: &str) -> ReelResult<Script>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Produce narration audio inside `out_dir` and return its path.
    async fn synthesize(&self, text: &str, out_dir: &Path) -> ReelResult<PathBuf>;
}

#[async_trait]
pub trait SubtitleAligner: Send + Sync {
    async fn align(&self, audio: &Path, narration: &str) -> ReelResult<Vec<SubtitleCue>>;
}

#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Take ownership of a finished file and return where clients can fetch it.
    async fn persist(&self, local_path: &Path) -> ReelResult<String>;
}

/// Builds narration and a title-card overlay straight from the topic.
#[derive(Debug, Clone, Default)]
pub struct TemplateScriptWriter;

#[async_trait]
impl ScriptWriter for TemplateScriptWriter {
    async fn write(&self, topic: &str) -> ReelResult<Script> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ReelError::collaborator("script writing", "topic is empty"));
        }
        let narration = format!(
            "Here is {topic} in under a minute. \
             Start with the big picture and why it matters. \
             Then look at the one detail most people miss. \
             Follow for more short explainers like this one."
        );
        let escaped = escape_html(topic);
        let overlay_html = format!(
            r#"<section class="card">
  <h1 class="title">{escaped}</h1>
  <p class="tagline">in under a minute</p>
</section>
<script>
  (function () {{
    var card = document.querySelector('.card');
    window.__reelsmithSeek = function (t) {{
      var k = Math.min(1, t / 0.8);
      card.style.opacity = String(k);
      card.style.transform = 'translateY(' + (1 - k) * 60 + 'px)';
    }};
    window.__reelsmithSeek(0);
  }})();
</script>"#
        );
        Ok(Script {
            narration,
            overlay_html,
        })
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// "Synthesizes" by returning a pre-recorded narration file.
#[derive(Debug, Clone)]
pub struct FixedAudio {
    path: PathBuf,
}

impl FixedAudio {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpeechSynthesizer for FixedAudio {
    async fn synthesize(&self, _text: &str, _out_dir: &Path) -> ReelResult<PathBuf> {
        if !self.path.is_file() {
            return Err(ReelError::collaborator(
                "speech synthesis",
                format!("audio file not found: {}", self.path.display()),
            ));
        }
        Ok(self.path.clone())
    }
}

/// Spreads sentence cues over the audio's length, weighted by word count.
#[derive(Debug, Clone)]
pub struct EvenSubtitleAligner {
    ffprobe_bin: String,
}

impl EvenSubtitleAligner {
    pub fn new(ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }
}

#[async_trait]
impl SubtitleAligner for EvenSubtitleAligner {
    async fn align(&self, audio: &Path, narration: &str) -> ReelResult<Vec<SubtitleCue>> {
        let duration = reelsmith_compose::probe_duration(&self.ffprobe_bin, audio).await?;
        Ok(distribute_cues(narration, duration))
    }
}

/// Split `narration` into sentences and give each a slice of `duration`
/// proportional to its word count. Cues are contiguous and end at `duration`.
pub fn distribute_cues(narration: &str, duration: f64) -> Vec<SubtitleCue> {
    let sentences = split_sentences(narration);
    let words: Vec<usize> = sentences
        .iter()
        .map(|s| s.split_whitespace().count().max(1))
        .collect();
    let total: usize = words.iter().sum();
    if total == 0 || !(duration > 0.0) {
        return Vec::new();
    }

    let mut cues = Vec::with_capacity(sentences.len());
    let mut start = 0.0;
    let mut seen = 0usize;
    for (sentence, count) in sentences.into_iter().zip(words) {
        seen += count;
        let end = duration * seen as f64 / total as f64;
        cues.push(SubtitleCue::new(start, end, sentence));
        start = end;
    }
    cues
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let s = current.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Moves finished renders into an output directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    output_dir: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStorage {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            public_base_url: None,
        }
    }

    /// Return `<base>/<file name>` locators instead of filesystem paths.
    pub fn with_public_base_url(mut self, base: Option<String>) -> Self {
        self.public_base_url = base;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn persist(&self, local_path: &Path) -> ReelResult<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ReelError::collaborator(
                    "storage",
                    format!("not a file path: {}", local_path.display()),
                )
            })?
            .to_string();

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let dest = self.output_dir.join(&name);
        if tokio::fs::rename(local_path, &dest).await.is_err() {
            // Different filesystem.
            copy_into_place(local_path, &dest).await.map_err(|e| {
                ReelError::collaborator("storage", format!("failed to store {name}: {e}"))
            })?;
            tokio::fs::remove_file(local_path).await?;
        }

        let locator = match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), name),
            None => tokio::fs::canonicalize(&dest)
                .await?
                .to_string_lossy()
                .into_owned(),
        };
        tracing::info!(locator = %locator, "render stored");
        Ok(locator)
    }
}

/// Copy `src` to a hidden sibling of `dest`, then rename it over `dest`, so
/// `dest` is either absent or complete.
async fn copy_into_place(src: &Path, dest: &Path) -> std::io::Result<()> {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dest.with_file_name(format!(".{name}.partial"));
    let copied = match tokio::fs::copy(src, &temp).await {
        Ok(_) => tokio::fs::rename(&temp, dest).await,
        Err(e) => Err(e),
    };
    if copied.is_err() {
        let _ = tokio::fs::remove_file(&temp).await;
    }
    copied
}
