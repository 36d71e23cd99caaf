//! Adapter scenarios against a mock pricing oracle over HTTP.

use crate::mock_infrastructure::{summer_attrs, summer_rates};
use serde_json::json;
use std::sync::Arc;
use tarifa_core::{
    KvStore, MemoryStore, OracleClient, OracleConfig, PricingError, PricingService, TarifaConfig,
    UpstreamError,
};

fn service_against(url: String, config: TarifaConfig) -> (PricingService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(
        OracleClient::new(OracleConfig {
            url,
            api_token: "test-token".to_string(),
            request_timeout_seconds: 5,
            concurrent_limit: 8,
        })
        .unwrap(),
    );
    let service =
        PricingService::new(Arc::clone(&store) as Arc<dyn KvStore>, oracle, &config);
    (service, store)
}

#[tokio::test]
async fn test_fetch_pricing_caches_the_oracle_answer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::to_string(&summer_rates()).unwrap())
        .expect(1)
        .create_async()
        .await;

    let (service, _store) = service_against(server.url(), TarifaConfig::default());

    let first = service.fetch_pricing(&summer_attrs()).await.unwrap();
    assert_eq!(first, summer_rates());

    // Hot path: byte-identical answer, no second HTTP call.
    let second = service.fetch_pricing(&summer_attrs()).await.unwrap();
    assert_eq!(second, first);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_attribute_order_variants_share_one_oracle_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::to_string(&summer_rates()).unwrap())
        .expect(1)
        .create_async()
        .await;

    let (service, _store) = service_against(server.url(), TarifaConfig::default());

    let spelled_one_way = json!([
        {"period": "Summer", "hotel": "H", "room": "R"},
        {"period": "Winter", "hotel": "H", "room": "R"},
    ]);
    let spelled_another = json!([
        {"Period": "Winter", "Hotel": "H", "Room": "R"},
        {"Period": "Summer", "Hotel": "H", "Room": "R"},
    ]);

    let first = service.fetch_pricing(&spelled_one_way).await.unwrap();
    let second = service.fetch_pricing(&spelled_another).await.unwrap();

    assert_eq!(first, second);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_error_propagates_with_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(422)
        .with_body("unknown hotel")
        .expect(1)
        .create_async()
        .await;

    let (service, _store) = service_against(server.url(), TarifaConfig::default());

    let err = service.fetch_pricing(&summer_attrs()).await.unwrap_err();
    match err {
        PricingError::Upstream(UpstreamError::Http(422, body)) => {
            assert_eq!(body, "unknown hotel");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_persistent_failures_become_service_unavailable() {
    let mut server = mockito::Server::new_async().await;
    // The client retries 5xx twice per attempt, so one leader fetch can
    // produce up to three HTTP calls.
    let mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("oracle down")
        .expect_at_least(3)
        .create_async()
        .await;

    let mut config = TarifaConfig::default();
    config.breaker.failure_threshold = 1;
    let (service, _store) = service_against(server.url(), config);

    // The failing leader surfaces the oracle error and trips the breaker.
    let err = service.fetch_pricing(&summer_attrs()).await.unwrap_err();
    assert!(matches!(err, PricingError::Upstream(UpstreamError::Http(500, _))));

    // With the breaker open and no stale copy, the caller sees a readable
    // service-unavailable answer and the oracle stays untouched.
    let err = service.fetch_pricing(&summer_attrs()).await.unwrap_err();
    match err {
        PricingError::ServiceUnavailable(message) => {
            assert!(message.contains("no recent rates"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_breaker_open_with_stale_serves_the_stale_rates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(500)
        .expect_at_least(3)
        .create_async()
        .await;

    let mut config = TarifaConfig::default();
    config.breaker.failure_threshold = 1;
    let (service, store) = service_against(server.url(), config);

    let key = tarifa_core::fingerprint(&summer_attrs()).unwrap();
    let payload = serde_json::to_string(&summer_rates()).unwrap();
    store
        .set(&key.stale_key(), &payload, std::time::Duration::from_secs(900))
        .await
        .unwrap();

    let _ = service.fetch_pricing(&summer_attrs()).await;
    let rates = service.fetch_pricing(&summer_attrs()).await.unwrap();
    assert_eq!(rates, summer_rates());
}
