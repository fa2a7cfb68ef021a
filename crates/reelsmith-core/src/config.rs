use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ReelError, ReelResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Fixed overlay duration; when unset the synthesized audio length is used.
    pub default_duration_secs: Option<f64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 15.0,
            default_duration_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub overlay_url: String,
    pub node_bin: String,
    pub driver_script: Option<PathBuf>,
    pub navigation_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub seek_delay_ms: u64,
    pub frame_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            overlay_url: "http://127.0.0.1:8080/overlay".to_string(),
            node_bin: "node".to_string(),
            driver_script: None,
            navigation_timeout_ms: 30_000,
            settle_delay_ms: 3_000,
            seek_delay_ms: 16,
            frame_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub base_video: PathBuf,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            base_video: PathBuf::from("videos/base.mp4"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Narration audio used by the fixed-audio synthesizer.
    pub default_audio: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_audio: PathBuf::from("audio/narration.mp3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStoreKind {
    Memory,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TasksConfig {
    pub max_concurrent_renders: usize,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub store: TaskStoreKind,
    pub store_dir: PathBuf,
    pub public_base_url: Option<String>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: 2,
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("final_video"),
            store: TaskStoreKind::Memory,
            store_dir: PathBuf::from("work/tasks"),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ReelConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl ReelConfig {
    pub fn load_from_file(path: &Path) -> ReelResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ReelConfig = toml::from_str(&contents)
            .map_err(|e| ReelError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> ReelResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ReelError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ReelError::Config("render size must be non-zero".into()));
        }
        if !(self.render.fps > 0.0) {
            return Err(ReelError::Config("render.fps must be positive".into()));
        }
        if let Some(d) = self.render.default_duration_secs {
            if !(d > 0.0) {
                return Err(ReelError::Config(
                    "render.default_duration_secs must be positive".into(),
                ));
            }
        }
        if self.tasks.max_concurrent_renders == 0 {
            return Err(ReelError::Config(
                "tasks.max_concurrent_renders must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_vertical_canvas() {
        let config = ReelConfig::default();
        assert_eq!((config.render.width, config.render.height), (1080, 1920));
        assert_eq!(config.capture.seek_delay_ms, 16);
        assert_eq!(config.tasks.max_concurrent_renders, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ReelConfig = toml::from_str(
            r#"
            [render]
            fps = 10.0

            [tasks]
            store = "json"
            max_concurrent_renders = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.render.fps, 10.0);
        assert_eq!(config.render.width, 1080);
        assert_eq!(config.tasks.store, TaskStoreKind::Json);
        assert_eq!(config.tasks.max_concurrent_renders, 4);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = ReelConfig::default();
        config.tasks.max_concurrent_renders = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reelsmith.toml");
        let mut config = ReelConfig::default();
        config.server.port = 9191;
        config.save_to_file(&path).unwrap();
        let loaded = ReelConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 9191);
    }
}
