use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a render task. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Processing)
                | (TaskStatus::Queued, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request overrides. Anything left out comes from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_video: Option<PathBuf>,
    /// Use this audio file instead of synthesizing narration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub topic: String,
    #[serde(default)]
    pub options: RenderOptions,
}

impl RenderRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

/// One asynchronous render, as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTask {
    #[serde(rename = "taskId")]
    pub id: String,
    pub status: TaskStatus,
    /// Free-text phase label, e.g. `capturing`.
    pub step: String,
    /// Percent complete, never decreasing.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_locator: Option<String>,
    pub request: RenderRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderTask {
    pub fn new(id: impl Into<String>, request: RenderRequest) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: TaskStatus::Queued,
            step: "queued".to_string(),
            progress: 0,
            error: None,
            output_locator: None,
            request,
            created_at: now,
            updated_at: now,
        }
    }

    // The mutators below return whether anything changed. They never move a
    // task backwards and never touch a terminal task.

    pub(crate) fn start(&mut self) -> bool {
        if !self.status.can_transition_to(TaskStatus::Processing) {
            return false;
        }
        self.status = TaskStatus::Processing;
        self.step = "starting".to_string();
        true
    }

    pub(crate) fn advance(&mut self, step: &str, progress: u8) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        let progress = progress.min(100).max(self.progress);
        if self.step == step && self.progress == progress {
            return false;
        }
        self.step = step.to_string();
        self.progress = progress;
        true
    }

    pub(crate) fn finish(&mut self, locator: String) -> bool {
        if !self.status.can_transition_to(TaskStatus::Completed) {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.step = "completed".to_string();
        self.progress = 100;
        self.output_locator = Some(locator);
        true
    }

    pub(crate) fn fail(&mut self, message: String) -> bool {
        if !self.status.can_transition_to(TaskStatus::Failed) {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.step = "failed".to_string();
        self.error = Some(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> RenderTask {
        RenderTask::new("t-1", RenderRequest::new("demo"))
    }

    #[test]
    fn test_transitions_only_move_forward() {
        use TaskStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Queued.can_transition_to(Completed));
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut t = task();
        assert!(!t.advance("capturing", 30), "queued tasks do not report progress");
        assert!(t.start());
        assert!(t.advance("capturing", 30));
        t.advance("capturing", 10);
        assert_eq!(t.progress, 30);
        t.advance("compositing", 250);
        assert_eq!(t.progress, 100);
        assert_eq!(t.step, "compositing");
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut t = task();
        t.start();
        assert!(t.finish("/out/reel.mp4".into()));
        assert!(!t.fail("late error".into()));
        assert!(!t.advance("storing", 99));
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.error, None);

        let mut t = task();
        assert!(t.fail("could not start".into()));
        assert!(!t.start());
        assert!(!t.finish("x".into()));
        assert_eq!(t.error.as_deref(), Some("could not start"));
    }

    #[test]
    fn test_wire_format() {
        let mut t = task();
        t.start();
        t.finish("https://cdn.test/reel.mp4".into());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["taskId"], "t-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["outputLocator"], "https://cdn.test/reel.mp4");
        assert!(json.get("error").is_none());

        let back: RenderTask = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_request_options_default_when_missing() {
        let req: RenderRequest = serde_json::from_str(r#"{"topic":"black holes"}"#).unwrap();
        assert_eq!(req.topic, "black holes");
        assert_eq!(req.options, RenderOptions::default());

        let req: RenderRequest =
            serde_json::from_str(r#"{"topic":"x","options":{"durationSecs":5,"fps":10}}"#).unwrap();
        assert_eq!(req.options.duration_secs, Some(5.0));
        assert_eq!(req.options.fps, Some(10.0));
    }
}
