//! Zero-downtime deployment strategies.

use super::{serving_worker, wait_for};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::DeploymentStrategy;
use vigil_supervisor::Supervisor;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rolling_deploy_never_drops_below_n_minus_one_ready() {
    let supervisor = Supervisor::builder()
        .worker_count(4)
        .strategy(DeploymentStrategy::Rolling)
        .heartbeat_interval(Duration::from_millis(200))
        .shutdown_grace(Duration::from_secs(5))
        .ready_timeout(Duration::from_secs(5))
        .worker_command(serving_worker())
        .build()
        .unwrap();
    let handle = supervisor.handle();
    let run = tokio::spawn(supervisor.run());

    wait_for(&handle, Duration::from_secs(10), |s| s.ready_count() == 4, "fleet ready").await;
    let old_pids: HashSet<u32> = handle.stats().workers.iter().map(|w| w.pid).collect();
    assert_eq!(handle.generation(), 1);

    // Sample readiness throughout the rollout.
    let min_ready = Arc::new(AtomicUsize::new(usize::MAX));
    let sampler = {
        let handle = handle.clone();
        let min_ready = Arc::clone(&min_ready);
        tokio::spawn(async move {
            loop {
                min_ready.fetch_min(handle.stats().ready_count(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    handle.deploy(DeploymentStrategy::Rolling).await;
    wait_for(
        &handle,
        Duration::from_secs(30),
        |s| s.ready_count() == 4 && s.workers.iter().all(|w| w.generation == 2),
        "rollout to finish",
    )
    .await;
    sampler.abort();

    assert!(
        min_ready.load(Ordering::SeqCst) >= 3,
        "ready workers dipped to {} during the rollout",
        min_ready.load(Ordering::SeqCst)
    );
    assert_eq!(handle.generation(), 2);

    let new_pids: HashSet<u32> = handle.stats().workers.iter().map(|w| w.pid).collect();
    assert_eq!(new_pids.len(), 4);
    assert!(old_pids.is_disjoint(&new_pids), "old pids were not reaped");

    handle.shutdown().await;
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blue_green_deploy_swaps_the_whole_fleet() {
    let supervisor = Supervisor::builder()
        .worker_count(2)
        .strategy(DeploymentStrategy::BlueGreen)
        .heartbeat_interval(Duration::from_millis(200))
        .shutdown_grace(Duration::from_secs(5))
        .ready_timeout(Duration::from_secs(5))
        .worker_command(serving_worker())
        .build()
        .unwrap();
    let handle = supervisor.handle();
    let run = tokio::spawn(supervisor.run());

    wait_for(&handle, Duration::from_secs(10), |s| s.ready_count() == 2, "fleet ready").await;
    let old_pids: HashSet<u32> = handle.stats().workers.iter().map(|w| w.pid).collect();

    handle.deploy(DeploymentStrategy::BlueGreen).await;
    wait_for(
        &handle,
        Duration::from_secs(30),
        |s| s.ready_count() == 2 && s.workers.iter().all(|w| w.generation == 2),
        "blue/green swap to finish",
    )
    .await;

    let new_pids: HashSet<u32> = handle.stats().workers.iter().map(|w| w.pid).collect();
    assert!(old_pids.is_disjoint(&new_pids));

    handle.shutdown().await;
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn socket_handoff_runs_the_new_image() {
    let supervisor = Supervisor::builder()
        .worker_count(2)
        .strategy(DeploymentStrategy::SocketHandoff)
        .heartbeat_interval(Duration::from_millis(200))
        .shutdown_grace(Duration::from_secs(5))
        .ready_timeout(Duration::from_secs(5))
        .worker_command(serving_worker())
        .build()
        .unwrap();
    let handle = supervisor.handle();
    let run = tokio::spawn(supervisor.run());

    wait_for(&handle, Duration::from_secs(10), |s| s.ready_count() == 2, "fleet ready").await;

    // The "new image" here is the same interpreter; the strategy passes the
    // sockets to whatever image the deploy names.
    handle.deploy_image("/bin/sh".into()).await;
    wait_for(
        &handle,
        Duration::from_secs(30),
        |s| s.workers.iter().all(|w| w.generation == 2),
        "handoff to finish",
    )
    .await;

    handle.shutdown().await;
    run.await.unwrap().unwrap();
}
