//! Integration tests for the Vault credential provider against a mock Vault.

use credrefresh::secrets::{
    CredentialProvider, SecretString, SecretsError, VaultConfig, VaultCredentialProvider,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "s.test-token";

fn health_body() -> serde_json::Value {
    json!({
        "initialized": true,
        "sealed": false,
        "standby": false,
        "performance_standby": false,
        "replication_performance_mode": "disabled",
        "replication_perf_mode": "disabled",
        "replication_dr_mode": "disabled",
        "server_time_utc": 1_700_000_000u64,
        "version": "1.15.0",
        "cluster_name": "vault-cluster-test",
        "cluster_id": "00000000-0000-0000-0000-000000000000"
    })
}

fn creds_body(username: &str, password: &str) -> serde_json::Value {
    json!({
        "request_id": "8f2c0c1e-0000-0000-0000-000000000000",
        "lease_id": "postgresql/creds/readonly/abc123",
        "renewable": true,
        "lease_duration": 3600,
        "data": { "username": username, "password": password },
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

async fn mock_vault() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(health_body()))
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> VaultConfig {
    VaultConfig {
        address: server.uri(),
        token: Some(SecretString::new(TOKEN)),
        ..VaultConfig::default()
    }
}

#[tokio::test]
async fn test_fetch_reads_role_credentials() {
    let server = mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/postgresql/creds/readonly"))
        .and(header("X-Vault-Token", TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(creds_body("v-token-readonly-1", "A1a-pw")),
        )
        .expect(2)
        .mount(&server)
        .await;

    let provider = VaultCredentialProvider::new(config_for(&server)).await.unwrap();
    assert!(provider.describe().contains("postgresql/creds/readonly"));

    let creds = provider.fetch().await.unwrap();
    assert_eq!(creds.username, "v-token-readonly-1");
    assert_eq!(creds.password.expose_secret(), "A1a-pw");

    // every refresh reads again
    provider.fetch().await.unwrap();
}

#[tokio::test]
async fn test_fetch_uses_configured_mount_and_role() {
    let server = mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/database/creds/reporting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(creds_body("v-reporting", "pw")))
        .mount(&server)
        .await;

    let config = VaultConfig {
        database_mount: "database".to_string(),
        role: "reporting".to_string(),
        ..config_for(&server)
    };
    let provider = VaultCredentialProvider::new(config).await.unwrap();

    assert_eq!(provider.fetch().await.unwrap().username, "v-reporting");
}

#[tokio::test]
async fn test_permission_denied_is_authentication_failure() {
    let server = mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/postgresql/creds/readonly"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] })),
        )
        .mount(&server)
        .await;

    let provider = VaultCredentialProvider::new(config_for(&server)).await.unwrap();
    let err = provider.fetch().await.unwrap_err();

    assert!(matches!(err, SecretsError::AuthenticationFailed { .. }), "unexpected: {err:?}");
    assert!(!err.to_string().contains(TOKEN));
}

#[tokio::test]
async fn test_unknown_role_is_not_found() {
    let server = mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/postgresql/creds/readonly"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
        .mount(&server)
        .await;

    let provider = VaultCredentialProvider::new(config_for(&server)).await.unwrap();
    let err = provider.fetch().await.unwrap_err();

    assert_eq!(err, SecretsError::not_found("postgresql/creds/readonly"));
}

#[tokio::test]
async fn test_unreachable_vault_fails_construction() {
    let config = VaultConfig {
        address: "http://127.0.0.1:1".to_string(),
        token: Some(SecretString::new(TOKEN)),
        ..VaultConfig::default()
    };

    let err = VaultCredentialProvider::new(config).await.unwrap_err();
    assert!(matches!(err, SecretsError::ConnectionFailed { .. }));
}
