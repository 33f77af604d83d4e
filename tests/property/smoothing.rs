//! Property tests for the response-time smoother.
//!
//! The compartment mean uses `mean = (mean + sample) / 2`. Whatever its
//! bias, the smoothed value must stay inside the range of observed samples.

use proptest::prelude::*;
use tokio::runtime::Runtime;
use vigil_bulkhead::Bulkhead;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn smoothed_mean_stays_within_sample_range(
        delays_ms in proptest::collection::vec(1u64..40, 2..10),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let bulkhead = Bulkhead::builder().build();

            for ms in &delays_ms {
                let ms = *ms;
                bulkhead
                    .execute("prop", move || async move {
                        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                        Ok::<(), ()>(())
                    })
                    .await
                    .unwrap();
            }

            let stats = bulkhead.stats("prop").await.unwrap();
            let max = *delays_ms.iter().max().unwrap();
            // Samples include scheduling overhead; allow headroom above the
            // nominal sleep but the mean can never exceed the slowest sample
            // by more than that overhead.
            let ceiling = std::time::Duration::from_millis(max + 50);
            prop_assert!(stats.mean_response > std::time::Duration::ZERO);
            prop_assert!(
                stats.mean_response < ceiling,
                "mean {:?} above ceiling {:?}",
                stats.mean_response,
                ceiling
            );
            Ok(())
        })?;
    }
}
