//! Core types for Runboard

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl RunStatus {
    /// Whether this status is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Aggregate outcome counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// One execution of the test suite, from start to a terminal status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    /// Opaque identifier, unique per invocation
    pub id: Option<String>,
    pub status: RunStatus,
    /// Unix millis, set when the run starts
    pub started_at: Option<i64>,
    /// Unix millis, set when the run reaches a terminal status
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub counts: RunCounts,
    /// Runner exit code, once known
    pub exit_code: Option<i32>,
}

impl Run {
    /// Wall-clock duration of the run in milliseconds, if both ends are known
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some(f - s),
            _ => None,
        }
    }
}

/// Generate a fresh run id
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Status of an individual scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl Default for ScenarioStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ScenarioStatus {
    /// Whether this status is a resolved outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    /// Whether a live-run transition from `self` to `next` is legal.
    ///
    /// Terminal outcomes never regress, and nothing goes back to pending
    /// short of a full reset at run start.
    pub fn can_transition_to(&self, next: ScenarioStatus) -> bool {
        match (self, next) {
            (_, ScenarioStatus::Pending) => false,
            (s, ScenarioStatus::Running) => !s.is_terminal(),
            (s, n) if n.is_terminal() => !s.is_terminal() || *s == n,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioStatus::Pending => write!(f, "pending"),
            ScenarioStatus::Running => write!(f, "running"),
            ScenarioStatus::Passed => write!(f, "passed"),
            ScenarioStatus::Failed => write!(f, "failed"),
            ScenarioStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One test case tracked independently of the run it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable identifier derived from file path + test title
    pub id: String,
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub suite: String,
    #[serde(default)]
    pub status: ScenarioStatus,
    pub duration_ms: Option<u64>,
    pub retries: Option<u32>,
    /// Free-text stack/message, only set on `failed`
    pub error: Option<String>,
}

impl Scenario {
    /// Create a pending scenario with a derived id
    pub fn pending(name: &str, file: &str, suite: &str) -> Self {
        Self {
            id: scenario_id(file, name),
            name: name.to_string(),
            file: file.to_string(),
            suite: suite.to_string(),
            status: ScenarioStatus::Pending,
            duration_ms: None,
            retries: None,
            error: None,
        }
    }
}

/// Derive a scenario id from its source file and title.
///
/// Must produce the same id from the static catalog and from live runner
/// output, since the two are joined on it.
pub fn scenario_id(file: &str, title: &str) -> String {
    format!("{}::{}", file, title)
}

/// Partial scenario update applied by the ingestion path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioPatch {
    pub status: Option<ScenarioStatus>,
    pub name: Option<String>,
    pub file: Option<String>,
    pub suite: Option<String>,
    pub duration_ms: Option<u64>,
    pub retries: Option<u32>,
    pub error: Option<String>,
}

impl ScenarioPatch {
    pub fn status(status: ScenarioStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Classification of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Stdout,
    Stderr,
    Info,
    Error,
}

/// One line of run output.
///
/// `seq` is the ordering key for both storage and transport; wall-clock time
/// is never used for ordering because chunked process output arrives with
/// coalesced timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub kind: LogKind,
    /// Raw line text, may contain ANSI escape sequences
    pub content: String,
}
