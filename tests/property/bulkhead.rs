//! Property tests for the bulkhead.
//!
//! Invariants tested:
//! - Active count stays within `0..=max_concurrent` at every observation
//! - `successes + failures <= requests` for any outcome mix

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use vigil_bulkhead::{Bulkhead, CompartmentLimits};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: concurrent bursts never push the active count past the cap.
    #[test]
    fn active_count_stays_bounded(
        max_concurrent in 1usize..8,
        burst in 1usize..32,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let bulkhead = Arc::new(
                Bulkhead::builder()
                    .compartment(
                        "prop",
                        CompartmentLimits { max_concurrent, op_timeout: None },
                    )
                    .build(),
            );

            let mut handles = Vec::new();
            for _ in 0..burst {
                let bulkhead = Arc::clone(&bulkhead);
                handles.push(tokio::spawn(async move {
                    let _ = bulkhead
                        .execute("prop", || async {
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            Ok::<(), ()>(())
                        })
                        .await;
                }));
            }

            for _ in 0..10 {
                if let Some(stats) = bulkhead.stats("prop").await {
                    prop_assert!(stats.active <= max_concurrent);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }

            for handle in handles {
                handle.await.unwrap();
            }
            prop_assert_eq!(bulkhead.stats("prop").await.unwrap().active, 0);
            Ok(())
        })?;
    }

    /// Property: counter accounting holds for any success/failure mix.
    #[test]
    fn accounting_invariant_holds(outcomes in proptest::collection::vec(any::<bool>(), 1..60)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let bulkhead = Bulkhead::builder().build();

            for ok in outcomes {
                let _ = bulkhead
                    .execute("prop", move || async move {
                        if ok { Ok::<(), &str>(()) } else { Err("boom") }
                    })
                    .await;
            }

            let stats = bulkhead.stats("prop").await.unwrap();
            prop_assert!(stats.successes + stats.failures <= stats.requests);
            prop_assert!(stats.failure_rate <= 100.0);
            Ok(())
        })?;
    }
}
