//! Scheduling contract: defers run FIFO before the next poll, timers fire in
//! deadline order, cancellation is idempotent.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_eventloop::HybridEventLoop;

async fn with_running<T>(
    hybrid: Arc<HybridEventLoop>,
    f: impl std::future::Future<Output = T>,
) -> T {
    let driver = Arc::clone(&hybrid);
    let task = tokio::spawn(async move { driver.run().await });
    let out = f.await;
    hybrid.stop();
    task.await.unwrap().unwrap();
    out
}

#[tokio::test]
async fn defers_run_fifo_before_timers_fire() {
    let hybrid = Arc::new(HybridEventLoop::builder().build().unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));

    let timer = Arc::clone(&order);
    hybrid.delay(
        Duration::from_millis(20),
        Box::new(move || timer.lock().unwrap().push("timer")),
    );
    for n in 0..3 {
        let order = Arc::clone(&order);
        hybrid.defer(Box::new(move || order.lock().unwrap().push(["a", "b", "c"][n])));
    }

    with_running(Arc::clone(&hybrid), async {
        tokio::time::sleep(Duration::from_millis(60)).await;
    })
    .await;

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c", "timer"]);
}

#[tokio::test]
async fn timers_fire_in_non_decreasing_deadline_order() {
    let hybrid = Arc::new(HybridEventLoop::builder().build().unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));

    for (label, ms) in [("late", 40u64), ("early", 10), ("middle", 25)] {
        let order = Arc::clone(&order);
        hybrid.delay(
            Duration::from_millis(ms),
            Box::new(move || order.lock().unwrap().push(label)),
        );
    }

    with_running(Arc::clone(&hybrid), async {
        tokio::time::sleep(Duration::from_millis(90)).await;
    })
    .await;

    assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
}

#[tokio::test]
async fn cancel_is_idempotent_and_safe_on_fired_ids() {
    let hybrid = Arc::new(HybridEventLoop::builder().build().unwrap());
    let fired = Arc::new(Mutex::new(0u32));

    let fired_clone = Arc::clone(&fired);
    let oneshot = hybrid.delay(
        Duration::from_millis(10),
        Box::new(move || *fired_clone.lock().unwrap() += 1),
    );
    let never = hybrid.delay(Duration::from_secs(60), Box::new(|| {}));

    with_running(Arc::clone(&hybrid), async {
        tokio::time::sleep(Duration::from_millis(40)).await;
    })
    .await;

    assert_eq!(*fired.lock().unwrap(), 1);

    // Already fired: cancel reports nothing to do and stays safe.
    assert!(!hybrid.cancel(oneshot));
    assert!(!hybrid.cancel(oneshot));

    assert!(hybrid.cancel(never));
    assert!(!hybrid.cancel(never));
}
