//! One-shot run summary printed by `runboard run`

use colored::Colorize;
use runboard_core::types::{Run, RunStatus, Scenario, ScenarioStatus};
use runboard_viewer::ReportView;

/// Print a per-file summary of the finished run
pub fn print_summary(run: &Run, scenarios: &[Scenario]) {
    let mut view = ReportView::new();
    view.rebuild(scenarios);

    println!();
    for group in view.groups() {
        let c = group.counts;
        println!(
            "{}  {} passed, {} failed, {} skipped",
            group.file.bold(),
            c.passed,
            c.failed,
            c.skipped
        );
        for scenario in &group.scenarios {
            let mark = match scenario.status {
                ScenarioStatus::Passed => "✓".green(),
                ScenarioStatus::Failed => "✗".red(),
                ScenarioStatus::Skipped => "-".yellow(),
                ScenarioStatus::Running => "?".red(),
                ScenarioStatus::Pending => "·".dimmed(),
            };
            let duration = scenario
                .duration_ms
                .map(|d| format!(" ({} ms)", d))
                .unwrap_or_default();
            println!("  {} {}{}", mark, scenario.name, duration);
            if let Some(error) = &scenario.error {
                for line in error.lines() {
                    println!("      {}", line.red());
                }
            }
        }
    }

    let counts = run.counts;
    let duration = run
        .duration_ms()
        .map(|d| format!(" ({} ms)", d))
        .unwrap_or_default();
    let verdict = match run.status {
        RunStatus::Completed => "completed".green().bold(),
        RunStatus::Cancelled => "cancelled".yellow().bold(),
        _ => "failed".red().bold(),
    };
    println!();
    println!(
        "Run {}: {} passed, {} failed, {} skipped{}",
        verdict, counts.passed, counts.failed, counts.skipped, duration
    );
}
