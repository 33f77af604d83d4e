//! Backend selection and switching.

use vigil_eventloop::{BackendKind, HybridEventLoop};

#[test]
fn connection_growth_switches_to_accelerated_with_hysteresis() {
    let hybrid = HybridEventLoop::builder().build().unwrap();

    hybrid.add_connections(1000);
    assert_eq!(hybrid.metrics().backend_in_use, BackendKind::Primary);
    assert_eq!(hybrid.metrics().switches, 0);

    hybrid.add_connections(100);
    let metrics = hybrid.metrics();
    assert_eq!(metrics.connection_count, 1100);
    assert_eq!(metrics.backend_in_use, BackendKind::Accelerated);
    assert_eq!(metrics.switches, 1);

    // 900 is above threshold - hysteresis (1024 - 128 = 896): no flap.
    hybrid.remove_connections(200);
    let metrics = hybrid.metrics();
    assert_eq!(metrics.connection_count, 900);
    assert_eq!(metrics.backend_in_use, BackendKind::Accelerated);
    assert_eq!(metrics.switches, 1);

    // Dropping below 896 releases the accelerated backend.
    hybrid.remove_connections(5);
    let metrics = hybrid.metrics();
    assert_eq!(metrics.backend_in_use, BackendKind::Primary);
    assert_eq!(metrics.switches, 2);
}

#[test]
fn custom_threshold_and_hysteresis_apply() {
    let hybrid = HybridEventLoop::builder()
        .threshold(10)
        .hysteresis(4)
        .build()
        .unwrap();

    hybrid.add_connections(10);
    assert_eq!(hybrid.metrics().backend_in_use, BackendKind::Accelerated);

    hybrid.remove_connections(4); // 6, threshold - hysteresis = 6: stays
    assert_eq!(hybrid.metrics().backend_in_use, BackendKind::Accelerated);

    hybrid.remove_connections(1); // 5 < 6: releases
    assert_eq!(hybrid.metrics().backend_in_use, BackendKind::Primary);
}

#[test]
fn memory_usage_is_reported() {
    let hybrid = HybridEventLoop::builder().build().unwrap();
    // Non-zero on Linux; never panics anywhere.
    let _ = hybrid.metrics().memory_usage;
}
