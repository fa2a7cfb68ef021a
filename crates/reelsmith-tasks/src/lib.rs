//! # reelsmith-tasks
//!
//! Task manager for asynchronous renders. A submission returns a task id at
//! once; the render runs in the background and clients poll its status and
//! fetch the result locator when it completes.

pub mod collaborators;
pub mod manager;
pub mod pipeline;
pub mod store;
pub mod task;

pub use collaborators::{
    ArtifactStorage, EvenSubtitleAligner, FixedAudio, LocalStorage, Script, ScriptWriter,
    SpeechSynthesizer, SubtitleAligner, TemplateScriptWriter,
};
pub use manager::{Progress, TaskManager};
pub use pipeline::{overlay_url, BackendFactory, ReelPipeline, RenderJob};
pub use store::{open_store, JsonDirTaskStore, MemoryTaskStore, TaskStore};
pub use task::{RenderOptions, RenderRequest, RenderTask, TaskStatus};
