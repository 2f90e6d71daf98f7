// tests/property/routing_test.rs

//! Property-based tests for request correlation
//! Tests that interleaved frames reach only the operation they are addressed to

use crate::mock_cfe::MockCfe;
use bifrost::{ClientOptions, OperationEvent};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 20, // Each case opens a real socket
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_interleaved_progress_reaches_only_its_operation(
        operations in 1usize..=4,
        frames in prop::collection::vec((0usize..4, 0u32..64), 0..30),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut cfe = MockCfe::start().await;
            let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;

            let streams: Vec<_> = (0..operations)
                .map(|_| client.send("formulate", &json!({})))
                .collect();
            for _ in 0..operations {
                session.recv_request().await;
            }

            let mut expected: Vec<Vec<OperationEvent>> = vec![Vec::new(); operations];
            for (target, step) in &frames {
                let target = target % operations;
                let value = f64::from(*step) / 64.0;
                session.progress(&target.to_string(), value).await;
                expected[target].push(OperationEvent::Progress(value));
            }
            for (index, events) in expected.iter_mut().enumerate() {
                session.result(&index.to_string(), json!(index)).await;
                events.push(OperationEvent::Progress(1.0));
                events.push(OperationEvent::Result(json!(index)));
            }

            for (mut stream, expected) in streams.into_iter().zip(expected) {
                let mut received = Vec::new();
                while let Some(event) = stream.next_event().await {
                    received.push(event);
                }
                assert_eq!(received, expected);
            }
        });
    }
}
