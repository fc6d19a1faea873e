//! Run state store: the canonical, single-writer, multi-reader model of the
//! current run, the per-scenario status map, and the capped log buffer.
//!
//! Every mutation bumps a store-wide revision counter and is fanned out to
//! subscribers in revision order over a broadcast channel. The Streaming
//! Transport uses the revision to detect missed updates and resync from a
//! fresh snapshot instead of attempting delta repair.

use crate::catalog::CatalogSource;
use crate::error::{Error, Result};
use crate::types::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of retained log entries; oldest are evicted first
    pub log_capacity: usize,
    /// Broadcast channel depth before a slow subscriber is considered lagged
    pub channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_capacity: 10_000,
            channel_capacity: 4_096,
        }
    }
}

/// A single store mutation, tagged with the revision it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mutation {
    pub revision: u64,
    pub event: StoreEvent,
}

/// The observable effect of a store mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A new run started. Implies: all scenario statuses reset to pending,
    /// log buffer cleared, counts zeroed.
    RunStarted { run: Run },
    /// The run reached a terminal status; counts are frozen.
    RunFinished { run: Run },
    /// A scenario was created or updated in place.
    Scenario { scenario: Scenario },
    /// A log line was appended.
    Log { entry: LogEntry },
}

/// Full state snapshot sent to a newly connected client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub revision: u64,
    pub run: Run,
    pub scenarios: Vec<Scenario>,
    pub log: Vec<LogEntry>,
    pub source: CatalogSource,
}

struct Inner {
    run: Run,
    scenarios: HashMap<String, Scenario>,
    /// Insertion order of scenario ids, for a stable view
    order: Vec<String>,
    log: VecDeque<LogEntry>,
    next_seq: u64,
    revision: u64,
    source: CatalogSource,
    log_capacity: usize,
}

/// Cloneable handle to the run state store.
///
/// Mutations are serialized through the inner write lock; the revision bump
/// and the broadcast send happen under the same lock so subscribers observe
/// mutations in revision order with no gaps for a keeping-up receiver.
#[derive(Clone)]
pub struct RunStore {
    inner: Arc<RwLock<Inner>>,
    tx: broadcast::Sender<Mutation>,
}

impl RunStore {
    /// Create an empty store
    pub fn new(config: StoreConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                run: Run::default(),
                scenarios: HashMap::new(),
                order: Vec::new(),
                log: VecDeque::new(),
                next_seq: 0,
                revision: 0,
                source: CatalogSource::Empty,
                log_capacity: config.log_capacity.max(1),
            })),
            tx,
        }
    }

    /// Seed pending scenarios from the static catalog.
    ///
    /// Called at dashboard load, before any run. Already-known ids are left
    /// untouched so a reseed never clobbers live state.
    pub fn seed(&self, scenarios: Vec<Scenario>, source: CatalogSource) {
        let mut inner = self.inner.write();
        inner.source = source;
        for scenario in scenarios {
            if inner.scenarios.contains_key(&scenario.id) {
                continue;
            }
            inner.order.push(scenario.id.clone());
            inner.scenarios.insert(scenario.id.clone(), scenario.clone());
            let rev = inner.bump();
            self.publish(rev, StoreEvent::Scenario { scenario });
        }
    }

    /// Start a new run.
    ///
    /// Resets every scenario to pending, clears the log buffer, and zeroes
    /// the counts. Fails with `AlreadyRunning` while a run is active.
    pub fn start_run(&self) -> Result<String> {
        let mut inner = self.inner.write();
        if inner.run.status == RunStatus::Running {
            return Err(Error::AlreadyRunning);
        }

        let id = new_run_id();
        inner.run = Run {
            id: Some(id.clone()),
            status: RunStatus::Running,
            started_at: Some(chrono::Utc::now().timestamp_millis()),
            finished_at: None,
            counts: RunCounts::default(),
            exit_code: None,
        };
        inner.log.clear();
        for sid in inner.order.clone() {
            if let Some(s) = inner.scenarios.get_mut(&sid) {
                s.status = ScenarioStatus::Pending;
                s.duration_ms = None;
                s.retries = None;
                s.error = None;
            }
        }

        let run = inner.run.clone();
        let rev = inner.bump();
        self.publish(rev, StoreEvent::RunStarted { run });
        debug!(run_id = %id, "run started");
        Ok(id)
    }

    /// Append a log line. Never blocks; at capacity the oldest entry is
    /// evicted (accepted lossy behavior under sustained volume).
    pub fn append_log(&self, kind: LogKind, content: impl Into<String>) -> LogEntry {
        let mut inner = self.inner.write();
        let entry = LogEntry {
            seq: inner.next_seq,
            kind,
            content: content.into(),
        };
        inner.next_seq += 1;
        if inner.log.len() >= inner.log_capacity {
            inner.log.pop_front();
        }
        inner.log.push_back(entry.clone());
        let rev = inner.bump();
        self.publish(rev, StoreEvent::Log { entry: entry.clone() });
        entry
    }

    /// Merge a partial update into a scenario.
    ///
    /// Unknown ids create a new entry, covering tests that were added
    /// without regenerating the static catalog. Illegal status transitions
    /// (e.g. passed -> pending) are dropped fail-open, never applied.
    pub fn update_scenario(&self, id: &str, patch: ScenarioPatch) {
        let mut inner = self.inner.write();
        if inner.run.status != RunStatus::Running {
            debug!(scenario = %id, "ignoring scenario update outside an active run");
            return;
        }

        if !inner.scenarios.contains_key(id) {
            // Best-effort split of a derived id back into file/title
            let (file, name) = id
                .split_once("::")
                .map(|(f, n)| (f.to_string(), n.to_string()))
                .unwrap_or_else(|| (String::new(), id.to_string()));
            inner.order.push(id.to_string());
            inner.scenarios.insert(
                id.to_string(),
                Scenario {
                    id: id.to_string(),
                    name: patch.name.clone().unwrap_or(name),
                    file: patch.file.clone().unwrap_or(file),
                    suite: patch.suite.clone().unwrap_or_default(),
                    status: ScenarioStatus::Pending,
                    duration_ms: None,
                    retries: None,
                    error: None,
                },
            );
        }

        let mut counts = inner.run.counts;
        let scenario = {
            let s = inner
                .scenarios
                .get_mut(id)
                .unwrap_or_else(|| unreachable!("inserted above"));
            let prev = s.status;

            if let Some(next) = patch.status {
                if !prev.can_transition_to(next) {
                    warn!(scenario = %id, %prev, %next, "dropping illegal scenario transition");
                    return;
                }
                // A repeated start marker means the runner retried the test
                if prev == ScenarioStatus::Running && next == ScenarioStatus::Running {
                    s.retries = Some(s.retries.unwrap_or(0) + 1);
                }
                s.status = next;
                if next.is_terminal() && !prev.is_terminal() {
                    match next {
                        ScenarioStatus::Passed => counts.passed += 1,
                        ScenarioStatus::Failed => counts.failed += 1,
                        ScenarioStatus::Skipped => counts.skipped += 1,
                        _ => {}
                    }
                }
            }
            if let Some(name) = patch.name {
                s.name = name;
            }
            if let Some(file) = patch.file {
                s.file = file;
            }
            if let Some(suite) = patch.suite {
                s.suite = suite;
            }
            if let Some(d) = patch.duration_ms {
                s.duration_ms = Some(d);
            }
            if let Some(r) = patch.retries {
                s.retries = Some(r);
            }
            if let Some(e) = patch.error {
                s.error = Some(e);
            }
            s.clone()
        };
        inner.run.counts = counts;

        let rev = inner.bump();
        self.publish(rev, StoreEvent::Scenario { scenario });
    }

    /// Transition the run to a terminal status and freeze the counts.
    ///
    /// Idempotent: finishing an already-finished run is a no-op that returns
    /// the existing terminal record.
    pub fn finish_run(&self, status: RunStatus, exit_code: Option<i32>) -> Run {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.write();
        if inner.run.status != RunStatus::Running {
            return inner.run.clone();
        }
        inner.run.status = status;
        inner.run.finished_at = Some(chrono::Utc::now().timestamp_millis());
        if exit_code.is_some() {
            inner.run.exit_code = exit_code;
        }
        let run = inner.run.clone();
        let rev = inner.bump();
        self.publish(rev, StoreEvent::RunFinished { run: run.clone() });
        debug!(status = %run.status, "run finished");
        run
    }

    /// Resolve a bare test title to a known scenario id.
    ///
    /// The legacy marker grammar carries only the title, while catalog ids
    /// are file-qualified; the join happens here. Ambiguous titles resolve
    /// to the first match in stable order.
    pub fn resolve_title(&self, title: &str) -> Option<String> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .find(|id| {
                inner
                    .scenarios
                    .get(*id)
                    .map(|s| s.name == title)
                    .unwrap_or(false)
            })
            .cloned()
    }

    /// Ids of scenarios currently marked running, in stable order
    pub fn running_scenarios(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .scenarios
                    .get(*id)
                    .map(|s| s.status == ScenarioStatus::Running)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Current run metadata
    pub fn run(&self) -> Run {
        self.inner.read().run.clone()
    }

    /// Current store revision
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// Scenarios in stable (catalog, then discovery) order
    pub fn scenarios(&self) -> Vec<Scenario> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.scenarios.get(id).cloned())
            .collect()
    }

    /// Full state snapshot for a newly connected client
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        Snapshot {
            revision: inner.revision,
            run: inner.run.clone(),
            scenarios: inner
                .order
                .iter()
                .filter_map(|id| inner.scenarios.get(id).cloned())
                .collect(),
            log: inner.log.iter().cloned().collect(),
            source: inner.source,
        }
    }

    /// Subscribe to the mutation stream.
    ///
    /// A receiver that falls behind the channel capacity observes a lag
    /// error and must resync from a snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.tx.subscribe()
    }

    fn publish(&self, revision: u64, event: StoreEvent) {
        // Send failure just means no subscribers; mutations are not gated
        // on anyone listening.
        let _ = self.tx.send(Mutation { revision, event });
    }
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}
