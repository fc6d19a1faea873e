//! Scenario list and report views: read-only aggregation over the scenario
//! map, grouped by source file.
//!
//! Pure derived views; the only state owned here is which groups the user
//! has expanded, which survives rebuilds as the store updates.

use runboard_core::types::{Scenario, ScenarioStatus};
use std::collections::HashSet;

/// Status counters for a group of scenarios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub running: u32,
    pub pending: u32,
}

impl GroupCounts {
    fn add(&mut self, status: ScenarioStatus) {
        match status {
            ScenarioStatus::Passed => self.passed += 1,
            ScenarioStatus::Failed => self.failed += 1,
            ScenarioStatus::Skipped => self.skipped += 1,
            ScenarioStatus::Running => self.running += 1,
            ScenarioStatus::Pending => self.pending += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped + self.running + self.pending
    }
}

/// Scenarios from one source file
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub file: String,
    pub counts: GroupCounts,
    pub scenarios: Vec<Scenario>,
}

impl FileGroup {
    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }
}

/// The scenario report: per-file groups in first-appearance order plus
/// global totals.
#[derive(Debug, Default)]
pub struct ReportView {
    groups: Vec<FileGroup>,
    totals: GroupCounts,
    expanded: HashSet<String>,
}

impl ReportView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the aggregation from a fresh scenario list. Expansion state
    /// is preserved for files that still exist.
    pub fn rebuild(&mut self, scenarios: &[Scenario]) {
        self.groups.clear();
        self.totals = GroupCounts::default();

        for scenario in scenarios {
            self.totals.add(scenario.status);
            match self.groups.iter_mut().find(|g| g.file == scenario.file) {
                Some(group) => {
                    group.counts.add(scenario.status);
                    group.scenarios.push(scenario.clone());
                }
                None => {
                    let mut counts = GroupCounts::default();
                    counts.add(scenario.status);
                    self.groups.push(FileGroup {
                        file: scenario.file.clone(),
                        counts,
                        scenarios: vec![scenario.clone()],
                    });
                }
            }
        }

        let files: HashSet<&str> = self.groups.iter().map(|g| g.file.as_str()).collect();
        self.expanded.retain(|f| files.contains(f.as_str()));
    }

    pub fn groups(&self) -> &[FileGroup] {
        &self.groups
    }

    pub fn totals(&self) -> GroupCounts {
        self.totals
    }

    /// Failed scenarios across all groups, for the run summary
    pub fn failed_scenarios(&self) -> Vec<&Scenario> {
        self.groups
            .iter()
            .flat_map(|g| &g.scenarios)
            .filter(|s| s.status == ScenarioStatus::Failed)
            .collect()
    }

    pub fn toggle(&mut self, file: &str) {
        if !self.expanded.remove(file) {
            self.expanded.insert(file.to_string());
        }
    }

    pub fn is_expanded(&self, file: &str) -> bool {
        self.expanded.contains(file)
    }
}
