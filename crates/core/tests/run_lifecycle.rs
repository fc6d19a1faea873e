//! End-to-end run lifecycle tests driving a real subprocess through the
//! supervisor, parser, and store.

use std::time::Duration;

use runboard_core::catalog::CatalogSource;
use runboard_core::store::{RunStore, StoreConfig};
use runboard_core::supervisor::{ProcessSupervisor, RunnerCommand, SupervisorConfig};
use runboard_core::types::*;
use runboard_core::Error;

fn seeded_store() -> RunStore {
    let store = RunStore::new(StoreConfig::default());
    store.seed(
        vec![
            Scenario::pending("t1", "a.spec", "smoke"),
            Scenario::pending("t2", "b.spec", "smoke"),
        ],
        CatalogSource::Catalog,
    );
    store
}

fn supervisor(store: &RunStore) -> ProcessSupervisor {
    ProcessSupervisor::new(
        store.clone(),
        SupervisorConfig {
            grace_period: Duration::from_secs(2),
            ..Default::default()
        },
    )
}

/// Poll until the run reaches a terminal status
async fn wait_terminal(store: &RunStore) -> Run {
    for _ in 0..600 {
        let run = store.run();
        if run.status.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not reach a terminal status in time");
}

fn scenario(store: &RunStore, id: &str) -> Scenario {
    store
        .scenarios()
        .into_iter()
        .find(|s| s.id == id)
        .unwrap_or_else(|| panic!("scenario {} not found", id))
}

#[tokio::test]
async fn early_exit_reconciles_started_scenarios_to_failed() {
    // t1 resolves, t2 starts but never finishes, runner exits with code 1.
    let store = seeded_store();
    let sup = supervisor(&store);

    sup.spawn(RunnerCommand::shell(
        "echo 't1 started'; echo 't1 passed (120ms)'; echo 't2 started'; exit 1",
    ))
    .await
    .unwrap();

    let run = wait_terminal(&store).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_code, Some(1));

    let t1 = scenario(&store, "a.spec::t1");
    assert_eq!(t1.status, ScenarioStatus::Passed);
    assert_eq!(t1.duration_ms, Some(120));

    let t2 = scenario(&store, "b.spec::t2");
    assert_eq!(t2.status, ScenarioStatus::Failed);
    assert!(
        t2.error.as_deref().unwrap_or("").contains("exited unexpectedly"),
        "t2 error should mention the unexpected exit, got {:?}",
        t2.error
    );
}

#[tokio::test]
async fn leftover_running_scenario_forces_failed_even_on_exit_zero() {
    let store = seeded_store();
    let sup = supervisor(&store);

    sup.spawn(RunnerCommand::shell("echo 't1 started'; exit 0"))
        .await
        .unwrap();

    let run = wait_terminal(&store).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_code, Some(0));
    assert_eq!(scenario(&store, "a.spec::t1").status, ScenarioStatus::Failed);
}

#[tokio::test]
async fn clean_run_completes_with_counts() {
    let store = seeded_store();
    let sup = supervisor(&store);

    sup.spawn(RunnerCommand::shell(concat!(
        "echo '@@runboard:v1 {\"file\":\"a.spec\",\"name\":\"t1\",\"status\":\"running\"}';",
        "echo '@@runboard:v1 {\"file\":\"a.spec\",\"name\":\"t1\",\"status\":\"passed\",\"duration_ms\":7}';",
        "echo '@@runboard:v1 {\"file\":\"b.spec\",\"name\":\"t2\",\"status\":\"skipped\"}';",
        "exit 0",
    )))
    .await
    .unwrap();

    let run = wait_terminal(&store).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.passed, 1);
    assert_eq!(run.counts.skipped, 1);
    assert_eq!(run.counts.failed, 0);
    assert_eq!(scenario(&store, "a.spec::t1").duration_ms, Some(7));
}

#[tokio::test]
async fn cancel_is_idempotent_and_leaves_cancelled_state() {
    let store = seeded_store();
    let sup = supervisor(&store);

    sup.spawn(RunnerCommand::shell("echo 't1 started'; sleep 30"))
        .await
        .unwrap();

    // Give the runner a moment to emit the start marker
    for _ in 0..200 {
        if scenario(&store, "a.spec::t1").status == ScenarioStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    sup.cancel().await.unwrap();
    let first = store.run();
    assert_eq!(first.status, RunStatus::Cancelled);

    // Second cancel is a no-op, not an error, and changes nothing
    sup.cancel().await.unwrap();
    let second = store.run();
    assert_eq!(second.status, RunStatus::Cancelled);
    assert_eq!(first.finished_at, second.finished_at);
    assert!(!sup.is_active());
}

#[tokio::test]
async fn second_start_fails_fast_while_running() {
    let store = seeded_store();
    let sup = supervisor(&store);

    sup.spawn(RunnerCommand::shell("sleep 30")).await.unwrap();
    let err = sup.spawn(RunnerCommand::shell("exit 0")).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));

    sup.cancel().await.unwrap();
    assert_eq!(store.run().status, RunStatus::Cancelled);
}

#[tokio::test]
async fn spawn_failure_surfaces_as_failed_run_with_log_entry() {
    let store = seeded_store();
    let sup = supervisor(&store);

    let err = sup
        .spawn(RunnerCommand::new("/nonexistent/test-runner-binary"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SpawnFailure(_)));

    let run = store.run();
    assert_eq!(run.status, RunStatus::Failed);

    let snap = store.snapshot();
    assert!(snap
        .log
        .iter()
        .any(|e| e.kind == LogKind::Error && e.content.contains("failed to spawn")));
}

#[tokio::test]
async fn new_run_can_start_after_cancel() {
    let store = seeded_store();
    let sup = supervisor(&store);

    sup.spawn(RunnerCommand::shell("sleep 30")).await.unwrap();
    sup.cancel().await.unwrap();

    sup.spawn(RunnerCommand::shell("echo 't1 passed (3ms)'; exit 0"))
        .await
        .unwrap();
    let run = wait_terminal(&store).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(scenario(&store, "a.spec::t1").status, ScenarioStatus::Passed);
}
