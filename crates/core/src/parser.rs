//! Output ingestion: turns the runner's raw, interleaved byte stream into
//! store mutations.
//!
//! Two marker protocols are recognized, both versioned here and nowhere
//! else, so a runner upgrade that changes its output has a single point of
//! change:
//!
//! 1. **Marker protocol v1** (primary): a line beginning with
//!    [`MARKER_PREFIX`] followed by one JSON object, e.g.
//!    `@@runboard:v1 {"file":"a.spec","name":"t1","status":"passed","duration_ms":120}`.
//! 2. **Legacy grammar** (fallback, for runners that only emit colorized
//!    human-readable text): after ANSI stripping, lines of the form
//!    `<title> started`, `<title> passed (120ms)`, `<title> failed`,
//!    `<title> skipped`. Error text for a failure accumulates from the
//!    following plain lines until the next marker or end of stream.
//!
//! Parsing is fail-open: a line that looks like a marker but does not parse
//! becomes plain log output, never a dropped line and never a panic.

use crate::store::RunStore;
use crate::types::{scenario_id, LogKind, ScenarioPatch, ScenarioStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

/// Versioned prefix for the structured marker protocol
pub const MARKER_PREFIX: &str = "@@runboard:v1 ";

static ANSI_RE: Lazy<Regex> = Lazy::new(|| {
    // CSI sequences plus lone two-byte escapes; enough to clean up SGR
    // coloring and cursor movement from test-runner output.
    Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|[@-Z\\-_])").unwrap()
});

static LEGACY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<title>.+?) (?P<verb>started|passed|failed|skipped)(?:\s*\((?P<dur>\d+)\s*ms\))?$")
        .unwrap()
});

/// Remove ANSI escape sequences from a line
pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_RE.replace_all(line, "")
}

/// Which subprocess stream a chunk arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn log_kind(self) -> LogKind {
        match self {
            StreamKind::Stdout => LogKind::Stdout,
            StreamKind::Stderr => LogKind::Stderr,
        }
    }
}

/// Structured marker payload (protocol v1)
#[derive(Debug, Deserialize)]
struct MarkerPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    suite: Option<String>,
    status: ScenarioStatus,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    retries: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

struct PendingFailure {
    id: String,
    lines: Vec<String>,
}

/// Stateful chunk-to-mutation parser for one run's output.
///
/// Chunks are not line-aligned; a per-stream carry buffer holds the last
/// incomplete line. Chunks must be fed strictly in arrival order.
pub struct OutputParser {
    store: RunStore,
    carry: [Vec<u8>; 2],
    pending_failure: Option<PendingFailure>,
}

impl OutputParser {
    pub fn new(store: RunStore) -> Self {
        Self {
            store,
            carry: [Vec::new(), Vec::new()],
            pending_failure: None,
        }
    }

    /// Consume one chunk of subprocess output
    pub fn feed(&mut self, stream: StreamKind, chunk: &[u8]) {
        let idx = stream as usize;
        self.carry[idx].extend_from_slice(chunk);

        // Split off complete lines; the tail stays in the carry buffer.
        loop {
            let Some(pos) = self.carry[idx].iter().position(|&b| b == b'\n') else {
                break;
            };
            let rest = self.carry[idx].split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.carry[idx], rest);
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            self.handle_line(stream, &line);
        }
    }

    /// Flush carry buffers and any accumulating failure text at end of
    /// stream. Must be called once after the subprocess exits.
    pub fn finish(&mut self) {
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            let idx = stream as usize;
            if self.carry[idx].is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(&std::mem::take(&mut self.carry[idx])).into_owned();
            self.handle_line(stream, &line);
        }
        self.flush_pending_failure();
    }

    fn handle_line(&mut self, stream: StreamKind, line: &str) {
        let stripped = strip_ansi(line);
        let stripped = stripped.trim_end();

        if let Some(json) = stripped.strip_prefix(MARKER_PREFIX) {
            match serde_json::from_str::<MarkerPayload>(json) {
                Ok(payload) => {
                    self.apply_marker(payload);
                    return;
                }
                Err(e) => {
                    // ParseAnomaly: keep the line as plain output
                    debug!(error = %e, line = %stripped, "unparseable lifecycle marker");
                }
            }
        } else if let Some(caps) = LEGACY_RE.captures(stripped) {
            let title = &caps["title"];
            let status = match &caps["verb"] {
                "started" => ScenarioStatus::Running,
                "passed" => ScenarioStatus::Passed,
                "failed" => ScenarioStatus::Failed,
                _ => ScenarioStatus::Skipped,
            };
            let duration_ms = caps.name("dur").and_then(|m| m.as_str().parse().ok());
            let id = self
                .store
                .resolve_title(title)
                .unwrap_or_else(|| title.to_string());
            self.apply_marker(MarkerPayload {
                id: Some(id),
                name: Some(title.to_string()),
                file: None,
                suite: None,
                status,
                duration_ms,
                retries: None,
                error: None,
            });
            return;
        }

        if let Some(pending) = &mut self.pending_failure {
            pending.lines.push(stripped.to_string());
        }

        self.store.append_log(classify(stream, stripped), line);
    }

    fn apply_marker(&mut self, payload: MarkerPayload) {
        self.flush_pending_failure();

        let id = match (&payload.id, &payload.file, &payload.name) {
            (Some(id), _, _) => id.clone(),
            (None, Some(file), Some(name)) => scenario_id(file, name),
            _ => {
                debug!("marker without id or (file, name); ignoring");
                return;
            }
        };

        let failed_without_error =
            payload.status == ScenarioStatus::Failed && payload.error.is_none();

        self.store.update_scenario(
            &id,
            ScenarioPatch {
                status: Some(payload.status),
                name: payload.name,
                file: payload.file,
                suite: payload.suite,
                duration_ms: payload.duration_ms,
                retries: payload.retries,
                error: payload.error,
            },
        );

        if failed_without_error {
            self.pending_failure = Some(PendingFailure {
                id,
                lines: Vec::new(),
            });
        }
    }

    fn flush_pending_failure(&mut self) {
        let Some(pending) = self.pending_failure.take() else {
            return;
        };
        let text = pending.lines.join("\n");
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.store.update_scenario(
            &pending.id,
            ScenarioPatch {
                error: Some(text.to_string()),
                ..Default::default()
            },
        );
    }
}

fn classify(stream: StreamKind, stripped: &str) -> LogKind {
    const ERROR_PREFIXES: [&str; 5] = ["Error:", "error:", "ERROR", "npm ERR!", "FATAL"];
    if ERROR_PREFIXES.iter().any(|p| stripped.starts_with(p)) {
        return LogKind::Error;
    }
    stream.log_kind()
}
