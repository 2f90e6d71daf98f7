// tests/integration/pool_test.rs

//! Integration tests for `CfeClientManager`: caching, eviction and the
//! unauthorized-session handling.

use super::mock_cfe::{MockCfe, STEP_TIMEOUT};
use bifrost::core::pool::{ENGINE_PARAM, TOKEN_PARAM};
use bifrost::{BifrostError, CfeClientManager, EngineType, GetOptions};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

const TOKEN: &str = "session-token-123";

fn manager_for(cfe: &MockCfe) -> CfeClientManager {
    CfeClientManager::new(cfe.endpoint(), TOKEN).with_connect_timeout(STEP_TIMEOUT)
}

fn counting_callback(counter: &Arc<AtomicUsize>) -> GetOptions {
    let counter = counter.clone();
    GetOptions::on_new_connection(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// Waits until the pool no longer caches a client for `engine_type`.
async fn wait_for_eviction(manager: &CfeClientManager, engine_type: EngineType) {
    timeout(STEP_TIMEOUT, async {
        while manager.cached(engine_type).await.is_some() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pool entry was never evicted");
}

#[tokio::test]
async fn test_get_reuses_open_connection() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);
    let created = Arc::new(AtomicUsize::new(0));

    let first = manager
        .get(EngineType::Formulation, counting_callback(&created))
        .await
        .unwrap();
    let session = cfe.accept().await;
    assert_eq!(session.query_param(TOKEN_PARAM).as_deref(), Some(TOKEN));
    assert_eq!(
        session.query_param(ENGINE_PARAM).as_deref(),
        Some("formulation")
    );

    let second = manager
        .get(EngineType::Formulation, counting_callback(&created))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(cfe.no_connection_within(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_engine_types_get_separate_connections() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);

    let formulation = manager
        .get(EngineType::Formulation, GetOptions::default())
        .await
        .unwrap();
    let first = cfe.accept().await;
    let prediction = manager
        .get(EngineType::Prediction, GetOptions::default())
        .await
        .unwrap();
    let second = cfe.accept().await;

    assert!(!Arc::ptr_eq(&formulation, &prediction));
    assert_eq!(
        first.query_param(ENGINE_PARAM).as_deref(),
        Some("formulation")
    );
    assert_eq!(
        second.query_param(ENGINE_PARAM).as_deref(),
        Some("prediction")
    );
}

#[tokio::test]
async fn test_closed_connection_is_evicted_and_replaced() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);
    let created = Arc::new(AtomicUsize::new(0));

    let first = manager
        .get(EngineType::Correction, counting_callback(&created))
        .await
        .unwrap();
    let mut session = cfe.accept().await;

    session.close(1000).await;
    wait_for_eviction(&manager, EngineType::Correction).await;
    assert!(!first.is_open());

    let second = manager
        .get(EngineType::Correction, counting_callback(&created))
        .await
        .unwrap();
    let _session = cfe.accept().await;
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_open());
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unauthorized_push_closes_connection() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);

    let client = manager
        .get(EngineType::Calibration, GetOptions::default())
        .await
        .unwrap();
    let mut session = cfe.accept().await;

    let op = client.calibrate(&json!({"device": "spectro-1"}));
    session.recv_request().await;

    // The rejection is pushed under an id no operation owns.
    session.error("push", &[("Session expired", 2)]).await;

    assert_eq!(session.recv_close().await, Some(4001));
    assert_eq!(op.wait().await, Err(BifrostError::Unauthorized));
    wait_for_eviction(&manager, EngineType::Calibration).await;
}

#[tokio::test]
async fn test_other_server_errors_keep_connection_open() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);

    let client = manager
        .get(EngineType::Prediction, GetOptions::default())
        .await
        .unwrap();
    let mut session = cfe.accept().await;

    let op = client.predict(&json!({}));
    session.recv_request().await;
    session.error("0", &[("Backend failure", 1)]).await;

    assert_eq!(
        op.wait().await,
        Err(BifrostError::ServerReported("Backend failure".to_string()))
    );
    sleep(Duration::from_millis(100)).await;
    assert!(client.is_open());
    assert!(manager.cached(EngineType::Prediction).await.is_some());
}

#[tokio::test]
async fn test_concurrent_gets_share_one_connection() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);
    let created = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
        manager.get(EngineType::Formulation, counting_callback(&created)),
        manager.get(EngineType::Formulation, counting_callback(&created)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    let _session = cfe.accept().await;
    assert!(cfe.no_connection_within(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_close_all_closes_every_cached_client() {
    let mut cfe = MockCfe::start().await;
    let manager = manager_for(&cfe);

    manager
        .get(EngineType::Formulation, GetOptions::default())
        .await
        .unwrap();
    let mut first = cfe.accept().await;
    manager
        .get(EngineType::Correction, GetOptions::default())
        .await
        .unwrap();
    let mut second = cfe.accept().await;

    manager.close_all().await;

    assert_eq!(first.recv_close().await, Some(1000));
    assert_eq!(second.recv_close().await, Some(1000));
    wait_for_eviction(&manager, EngineType::Formulation).await;
    wait_for_eviction(&manager, EngineType::Correction).await;
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    // Bind then release a port so nothing is listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = url::Url::parse(&format!("ws://{addr}/cfe")).unwrap();
    let manager = CfeClientManager::new(endpoint, TOKEN).with_connect_timeout(STEP_TIMEOUT);
    let called = Arc::new(AtomicUsize::new(0));

    let result = manager
        .get(EngineType::Formulation, counting_callback(&called))
        .await;
    assert!(matches!(result, Err(BifrostError::Connection(_))));
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert!(manager.cached(EngineType::Formulation).await.is_none());
}

#[test]
fn test_connection_url_carries_token_and_engine() {
    let endpoint = url::Url::parse("wss://cfe.example.com/socket").unwrap();
    let manager = CfeClientManager::new(endpoint, "a b&c");
    let url = manager.connection_url(EngineType::Calibration);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (TOKEN_PARAM.to_string(), "a b&c".to_string()),
            (ENGINE_PARAM.to_string(), "calibration".to_string()),
        ]
    );
    assert_eq!(url.path(), "/socket");
}
