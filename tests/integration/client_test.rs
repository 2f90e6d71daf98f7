// tests/integration/client_test.rs

//! Integration tests for `CfeClient`: request ids, domain commands and closing.

use super::mock_cfe::MockCfe;
use bifrost::{BifrostError, ClientOptions};
use serde_json::json;
use std::collections::HashMap;

#[tokio::test]
async fn test_request_ids_are_sequential_per_client() {
    let mut cfe = MockCfe::start().await;
    let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;

    let ops: Vec<_> = (0..3).map(|_| client.send("predict", &json!({}))).collect();
    let ids: Vec<&str> = ops.iter().map(|op| op.request_id()).collect();
    assert_eq!(ids, vec!["0", "1", "2"]);

    for expected in ["0", "1", "2"] {
        let request = session.recv_request().await;
        assert_eq!(request["requestId"], expected);
    }
}

#[tokio::test]
async fn test_domain_commands_use_wire_names() {
    let mut cfe = MockCfe::start().await;
    let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;

    let _formulate = client.formulate(&json!({"target": "L*a*b*"}));
    let _correct = client.correct(&json!({}));
    let _predict = client.predict(&json!({}));
    let _calibrate = client.calibrate(&json!({}));

    let mut commands = Vec::new();
    for _ in 0..4 {
        let request = session.recv_request().await;
        commands.push(request["command"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(commands, vec!["formulate", "correct", "predict", "calibrate"]);
}

#[tokio::test]
async fn test_typed_payload_is_serialized() {
    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Recipe {
        color_name: String,
        lightness: f64,
    }

    let mut cfe = MockCfe::start().await;
    let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;

    let _op = client.formulate(&Recipe {
        color_name: "Ocean".to_string(),
        lightness: 52.5,
    });
    let request = session.recv_request().await;
    assert_eq!(
        request["payload"],
        json!({"colorName": "Ocean", "lightness": 52.5})
    );
}

#[tokio::test]
async fn test_unserializable_payload_fails_without_sending() {
    let mut cfe = MockCfe::start().await;
    let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;

    // JSON object keys must be strings.
    let mut payload = HashMap::new();
    payload.insert((1, 2), "tuple key");

    let op = client.send("formulate", &payload);
    assert!(matches!(
        op.wait().await,
        Err(BifrostError::InvalidRequest(_))
    ));

    // The id was still consumed and the next request goes out normally.
    let next = client.send("formulate", &json!({}));
    assert_eq!(next.request_id(), "1");
    let request = session.recv_request().await;
    assert_eq!(request["requestId"], "1");
}

#[tokio::test]
async fn test_close_disconnects_in_flight_operations() {
    let mut cfe = MockCfe::start().await;
    let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;
    assert!(client.is_open());

    let op = client.send("formulate", &json!({}));
    session.recv_request().await;

    client.close();
    assert!(!client.is_open());
    assert_eq!(session.recv_close().await, Some(1000));
    assert_eq!(
        op.wait().await,
        Err(BifrostError::Disconnected {
            request_id: "0".to_string()
        })
    );
}

#[tokio::test]
async fn test_close_twice_is_harmless() {
    let mut cfe = MockCfe::start().await;
    let (client, mut session) = cfe.connect_client(ClientOptions::default()).await;

    client.close();
    client.close();
    assert_eq!(session.recv_close().await, Some(1000));
    assert!(!client.is_open());
}
