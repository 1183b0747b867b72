//! Webhook DNS plugin tests
//!
//! Exercises the HTTP contract of the webhook plugin against a wiremock server.

use std::time::Duration;

use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zonecert_config::{PluginConfig, PluginKind, WebhookPluginConfig};
use zonecert_issuer::dns::{create_provider, DnsProvider, DnsProviderError, WebhookProvider};

fn provider(server: &MockServer) -> WebhookProvider {
    WebhookProvider::new(
        "webhook".to_string(),
        server.uri(),
        Some("secret-token".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_propagation(Duration::from_millis(10), Duration::from_millis(200))
}

#[tokio::test]
async fn test_create_record_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/records"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(serde_json::json!({
            "name": "_acme-challenge.example.com",
            "type": "TXT",
            "value": "validation-value",
            "ttl": 60,
            "account_id": "123456789012"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "change_id": "C-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let change_id = provider(&server)
        .create_txt_record(
            "_acme-challenge.example.com",
            "validation-value",
            Some("123456789012"),
        )
        .await
        .unwrap();

    assert_eq!(change_id, "C-1");
}

#[tokio::test]
async fn test_create_record_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_txt_record("_acme-challenge.example.com", "v", None)
        .await
        .unwrap_err();

    match err {
        DnsProviderError::RecordCreation { record_name, message } => {
            assert_eq!(record_name, "_acme-challenge.example.com");
            assert!(message.contains("500"));
            assert!(message.contains("Internal Server Error"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_authentication_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_txt_record("_acme-challenge.example.com", "v", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DnsProviderError::Authentication(_)));
}

#[tokio::test]
async fn test_forbidden_on_zones() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = provider(&server).get_zones(None).await.unwrap_err();
    assert!(matches!(err, DnsProviderError::Authentication(_)));
}

#[tokio::test]
async fn test_wait_until_insync() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/C-1"))
        .and(query_param("account_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "pending"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/changes/C-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "insync"
        })))
        .mount(&server)
        .await;

    provider(&server)
        .wait_for_dns_change("C-1", Some("42"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_wait_reports_failed_change() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/C-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "failed",
            "message": "zone is locked"
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .wait_for_dns_change("C-2", None)
        .await
        .unwrap_err();

    match err {
        DnsProviderError::Propagation { change_id, message } => {
            assert_eq!(change_id, "C-2");
            assert_eq!(message, "zone is locked");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_wait_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/C-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "pending"
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .wait_for_dns_change("C-3", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DnsProviderError::PropagationTimeout { ref change_id, .. } if change_id == "C-3"));
}

#[tokio::test]
async fn test_delete_record_success() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/records/C-1"))
        .and(query_param("name", "_acme-challenge.example.com"))
        .and(query_param("value", "validation-value"))
        .and(query_param("account_id", "42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server)
        .delete_txt_record(
            "C-1",
            Some("42"),
            "_acme-challenge.example.com",
            "validation-value",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_id_is_a_single_path_segment() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/zone%2FC-7%3Fx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "insync"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/records/zone%2FC-7%3Fx"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    provider.wait_for_dns_change("zone/C-7?x", None).await.unwrap();
    provider
        .delete_txt_record("zone/C-7?x", None, "_acme-challenge.example.com", "v")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_record_not_found_is_ok() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/records/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    provider(&server)
        .delete_txt_record("gone", None, "_acme-challenge.example.com", "v")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_record_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/records/C-9"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = provider(&server)
        .delete_txt_record("C-9", None, "_acme-challenge.example.com", "v")
        .await
        .unwrap_err();
    assert!(matches!(err, DnsProviderError::RecordDeletion { ref change_id, .. } if change_id == "C-9"));
}

#[tokio::test]
async fn test_list_zones() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("account_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "zones": ["example.com", "example.org"]
        })))
        .mount(&server)
        .await;

    let zones = provider(&server).get_zones(Some("42")).await.unwrap();
    assert_eq!(zones, vec!["example.com", "example.org"]);
}

#[tokio::test]
async fn test_created_from_plugin_definition() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "zones": ["internal.test"]
        })))
        .mount(&server)
        .await;

    let plugin = create_provider(&PluginConfig {
        name: "internal".to_string(),
        kind: PluginKind::Webhook(WebhookPluginConfig::new(format!("{}/", server.uri()))),
    })
    .unwrap();

    assert_eq!(plugin.name(), "internal");
    assert_eq!(plugin.get_zones(None).await.unwrap(), vec!["internal.test"]);
}
