use std::sync::Arc;
use std::time::Duration;

use loadgen_common::controller::{LoadController, LoadLimits};
use loadgen_common::error::{LoadError, SpawnError};
use loadgen_common::registry::SessionState;
use loadgen_common::shutdown::ShutdownCoordinator;
use loadgen_common::supervisor::{Supervisor, Workload};
use uuid::Uuid;

/// A workload that runs `script` through sh. The unique marker ends up in the
/// command line, so pattern-kills from concurrent tests never cross.
fn shell_workload(script: &str) -> Workload {
    let marker = format!("loadgen-test-{}", Uuid::new_v4());
    Workload::new(
        "sh",
        vec!["-c".to_owned(), script.to_owned(), marker.clone()],
        &marker,
    )
}

fn supervisor(script: &str) -> Supervisor {
    Supervisor::new(shell_workload(script), Duration::from_secs(5))
}

fn controller(script: &str) -> Arc<LoadController> {
    Arc::new(LoadController::new(
        supervisor(script),
        LoadLimits {
            default_cores: 2,
            default_duration_secs: 300,
            max_duration_secs: 3_600,
        },
    ))
}

async fn assert_or_retry<F>(check: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(check())
}

#[tokio::test]
async fn spawn_tracks_until_kill_all() {
    let supervisor = supervisor("exec sleep 30");

    let session = supervisor.spawn(2, 30).await.expect("failed to spawn");
    assert_eq!(session.cores, 2);
    assert_eq!(session.duration_secs, 30);
    assert_eq!(session.state, SessionState::Running);
    assert!(session.pid > 0);

    assert_eq!(supervisor.registry().count(), 1);
    assert_eq!(supervisor.registry().list(), vec![session]);

    assert_eq!(supervisor.kill_all().await, 1);
    assert_eq!(supervisor.registry().count(), 0);
}

#[tokio::test]
async fn exited_sessions_are_removed() {
    let supervisor = supervisor("exit 0");

    supervisor.spawn(1, 1).await.expect("failed to spawn");
    assert_or_retry(|| supervisor.registry().count() == 0).await;
}

#[tokio::test]
async fn spawn_failure_registers_nothing() {
    let supervisor = Supervisor::new(
        Workload::stress_ng("/nonexistent/loadgen-missing-binary"),
        Duration::from_secs(1),
    );

    let result = supervisor.spawn(1, 10).await;
    assert!(matches!(result, Err(SpawnError::Io { .. })));
    assert_eq!(supervisor.registry().count(), 0);
    assert!(!supervisor.is_available().await);
}

#[tokio::test]
async fn kill_all_when_idle() {
    let supervisor = supervisor("exec sleep 30");
    assert_eq!(supervisor.kill_all().await, 0);
    assert_eq!(supervisor.kill_all().await, 0);
}

#[tokio::test]
async fn absolute_binary_is_available() {
    let supervisor = Supervisor::new(Workload::stress_ng("/bin/sh"), Duration::from_secs(1));
    assert!(supervisor.is_available().await);
}

#[tokio::test]
async fn start_then_stop_leaves_nothing() {
    let controller = controller("exec sleep 30");

    let started = controller
        .start_load(None, None)
        .await
        .expect("failed to start load");
    assert_eq!(started.cores, 2);
    assert_eq!(started.duration_secs, 300);
    assert_eq!(controller.status().active_count, 1);

    assert_eq!(controller.stop_load().await, 1);
    assert_eq!(controller.status().active_count, 0);
    assert_eq!(controller.stop_load().await, 0);
}

#[tokio::test]
async fn second_start_supersedes_first() {
    let controller = controller("exec sleep 30");

    let first = controller.start_load(Some(1), Some(60)).await.unwrap();
    let second = controller.start_load(Some(3), Some(90)).await.unwrap();
    assert_ne!(first.session_id, second.session_id);

    let status = controller.status();
    assert_eq!(status.active_count, 1);
    assert_eq!(status.sessions[0].id, second.session_id);
    assert_eq!(status.sessions[0].cores, 3);
    assert_eq!(status.sessions[0].duration_secs, 90);

    controller.stop_load().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_leave_one_session() {
    let controller = controller("exec sleep 30");

    let (a, b) = tokio::join!(
        {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start_load(None, None).await })
        },
        {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start_load(None, None).await })
        }
    );
    assert!(a.unwrap().is_ok());
    assert!(b.unwrap().is_ok());

    assert_eq!(controller.status().active_count, 1);
    assert_eq!(controller.stop_load().await, 1);
}

#[tokio::test]
async fn stop_during_start_waits_and_stops() {
    let controller = controller("exec sleep 30");

    let starter = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_load(None, None).await })
    };
    let stopper = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.stop_load().await })
    };

    assert!(starter.await.unwrap().is_ok());
    stopper.await.unwrap();

    // Whichever ran first, a final stop leaves the host clean.
    controller.stop_load().await;
    assert_eq!(controller.status().active_count, 0);
}

#[tokio::test]
async fn shutdown_drains_sessions() {
    let controller = controller("exec sleep 30");
    controller.start_load(None, None).await.unwrap();

    let coordinator = ShutdownCoordinator::new(controller.clone());
    let stopped = coordinator.run_until(std::future::ready(())).await;

    assert_eq!(stopped, 1);
    assert_eq!(controller.status().active_count, 0);
}

#[tokio::test]
async fn starts_queued_behind_shutdown_are_refused() {
    let controller = controller("exec sleep 30");
    controller.start_load(None, None).await.unwrap();

    let coordinator = ShutdownCoordinator::new(controller.clone());
    let drain = tokio::spawn(async move { coordinator.drain().await });
    tokio::task::yield_now().await;

    let late = controller.start_load(None, None).await;
    assert!(matches!(late, Err(LoadError::ShuttingDown)));

    assert_eq!(drain.await.unwrap(), 1);
    assert_eq!(controller.status().active_count, 0);
    assert!(matches!(
        controller.start_load(Some(1), Some(5)).await,
        Err(LoadError::ShuttingDown)
    ));
}

#[tokio::test]
async fn kill_all_reaps_untracked_processes() {
    let marker = format!("loadgen-test-{}", Uuid::new_v4());
    // Not exec'd, so the marker stays on the shell's command line.
    let mut stray = tokio::process::Command::new("sh")
        .arg("-c")
        .arg("sleep 30; true")
        .arg(&marker)
        .spawn()
        .expect("failed to spawn stray process");

    let supervisor = Supervisor::new(
        Workload::new("sh", Vec::new(), &marker),
        Duration::from_secs(1),
    );
    assert!(supervisor.is_running_on_host().await);

    assert_eq!(supervisor.kill_all().await, 0);

    let status = tokio::time::timeout(Duration::from_secs(5), stray.wait())
        .await
        .expect("stray process survived kill_all")
        .expect("failed to wait for stray process");
    assert!(!status.success());
    assert!(!supervisor.is_running_on_host().await);
}
