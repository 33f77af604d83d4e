//! Crash-loop abort and health escalation.

use super::{serving_worker, wait_for};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_healthcheck::{HealthChecker, HealthStatus, ProbeResult};
use vigil_supervisor::{Supervisor, SupervisorOutcome, WorkerCommand};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crash_loop_aborts_and_marks_health_unhealthy() {
    let crash_looping = Arc::new(AtomicBool::new(false));

    let health = Arc::new(HealthChecker::builder().build());
    let flag = Arc::clone(&crash_looping);
    health.register("fleet", move || {
        let crashed = flag.load(Ordering::SeqCst);
        async move {
            if crashed {
                ProbeResult::unhealthy().detail("error", "crash loop abort")
            } else {
                ProbeResult::healthy()
            }
        }
    });

    let flag = Arc::clone(&crash_looping);
    let supervisor = Supervisor::builder()
        .worker_count(2)
        .restart_backoff(Duration::from_millis(10))
        .heartbeat_interval(Duration::from_millis(100))
        .worker_command(WorkerCommand::new("/bin/sh").arg("-c").arg("exit 1"))
        .on_crash_loop(move |_| flag.store(true, Ordering::SeqCst))
        .build()
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("supervisor should abort quickly")
        .unwrap();
    assert_eq!(outcome, SupervisorOutcome::CrashLoopAbort);
    assert_eq!(outcome.exit_code(), 2);

    health.run_once().await;
    assert_eq!(health.overall().await, HealthStatus::Unhealthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graceful_stop_leaves_no_children_within_grace() {
    let supervisor = Supervisor::builder()
        .worker_count(3)
        .heartbeat_interval(Duration::from_millis(100))
        .shutdown_grace(Duration::from_secs(5))
        .worker_command(serving_worker())
        .build()
        .unwrap();
    let handle = supervisor.handle();
    let run = tokio::spawn(supervisor.run());

    wait_for(&handle, Duration::from_secs(5), |s| s.ready_count() == 3, "fleet ready").await;
    let pids: Vec<u32> = handle.stats().workers.iter().map(|w| w.pid).collect();

    handle.shutdown().await;
    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, SupervisorOutcome::Clean);
    assert_eq!(handle.stats().running, 0);

    // Past the grace deadline no child remains alive.
    for pid in pids {
        let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
        assert!(!alive, "worker {pid} survived the shutdown");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stubborn_workers_are_force_killed_past_grace() {
    // Ignores TERM entirely; only KILL removes it.
    let stubborn = WorkerCommand::new("/bin/sh").arg("-c").arg(
        r#"trap "" TERM; echo ready; while true; do echo heartbeat; sleep 0.1; done"#,
    );

    let supervisor = Supervisor::builder()
        .worker_count(1)
        .heartbeat_interval(Duration::from_millis(100))
        .shutdown_grace(Duration::from_millis(300))
        .worker_command(stubborn)
        .build()
        .unwrap();
    let handle = supervisor.handle();
    let run = tokio::spawn(supervisor.run());

    wait_for(&handle, Duration::from_secs(5), |s| s.ready_count() == 1, "worker ready").await;

    handle.shutdown().await;
    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, SupervisorOutcome::GraceExceeded);
    assert_eq!(outcome.exit_code(), 124);
    assert_eq!(handle.stats().running, 0);
}
