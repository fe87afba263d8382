//! Cache purge across every connected zone.
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::cloudflare::CloudflareClient;
use crate::settings::{SettingsError, SettingsStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    pub domain: String,
    pub reason: String,
}

impl std::fmt::Display for PurgeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.domain, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("No Cloudflare zones configured. Please connect to Cloudflare first.")]
    NotConnected,

    #[error("All purge operations failed: {}", join_failures(.0))]
    AllFailed(Vec<PurgeFailure>),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Per-zone results of one purge run, in settings order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<PurgeFailure>,
}

impl PurgeSummary {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn message(&self) -> String {
        let mut message = match self.succeeded.as_slice() {
            [single] => format!("Successfully purged Cloudflare cache for: {single}"),
            many => format!(
                "Successfully purged Cloudflare cache for {} domains: {}",
                many.len(),
                many.join(", ")
            ),
        };
        if self.is_partial() {
            message.push_str(". Some domains failed: ");
            message.push_str(&join_failures(&self.failed));
        }
        message
    }
}

fn join_failures(failures: &[PurgeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Purge every saved zone. One zone failing never stops the others; the run
/// fails only when there is nothing to purge or every zone failed.
pub async fn purge_all(
    client: &mut CloudflareClient,
    store: &SettingsStore,
) -> Result<PurgeSummary, PurgeError> {
    let settings = store.load().await?;
    if !settings.is_connected() {
        return Err(PurgeError::NotConnected);
    }

    let mut summary = PurgeSummary::default();

    for zone in &settings.zones {
        match client.purge_everything(&zone.zone_id).await {
            Ok(_) => {
                info!(domain = %zone.domain, zone_id = %zone.zone_id, "purged Cloudflare cache");
                summary.succeeded.push(zone.domain.clone());
            }
            Err(failure) => {
                warn!(domain = %zone.domain, zone_id = %zone.zone_id, error = %failure, "purge failed");
                summary.failed.push(PurgeFailure {
                    domain: zone.domain.clone(),
                    reason: failure.to_string(),
                });
            }
        }
    }

    if summary.succeeded.is_empty() {
        return Err(PurgeError::AllFailed(summary.failed));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingsDocument, ZoneRecord};
    use serde_json::json;
    use tempfile::{TempDir, tempdir};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    async fn store_with(zones: &[(&str, &str)]) -> (TempDir, SettingsStore) {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("cloudburst.yaml"));
        if !zones.is_empty() {
            store
                .save(SettingsDocument::with_zones(
                    zones
                        .iter()
                        .map(|(domain, id)| ZoneRecord::new(*domain, *id))
                        .collect(),
                ))
                .await
                .unwrap();
        }
        (dir, store)
    }

    async fn mount_purge(server: &MockServer, zone_id: &str, status: u16) {
        let body = if status < 300 {
            json!({ "success": true, "result": { "id": zone_id } })
        } else {
            json!({ "success": false, "errors": [{ "code": 1000, "message": "purge refused" }] })
        };
        Mock::given(method("POST"))
            .and(path(format!("/zones/{zone_id}/purge_cache")))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_not_connected_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (_dir, store) = store_with(&[]).await;
        let mut client = CloudflareClient::with_endpoint("t", &server.uri()).unwrap();

        let err = purge_all(&mut client, &store).await.unwrap_err();
        assert!(matches!(err, PurgeError::NotConnected));
        assert!(client.last_request().is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_is_success() {
        let server = MockServer::start().await;
        mount_purge(&server, "ZA", 200).await;
        mount_purge(&server, "ZB", 500).await;

        let (_dir, store) = store_with(&[("a.com", "ZA"), ("b.com", "ZB")]).await;
        let mut client = CloudflareClient::with_endpoint("t", &server.uri()).unwrap();

        let summary = purge_all(&mut client, &store).await.unwrap();

        assert_eq!(summary.succeeded, vec!["a.com"]);
        assert_eq!(
            summary.failed,
            vec![PurgeFailure {
                domain: "b.com".into(),
                reason: "HTTP 500 Internal Server Error: purge refused (1000)".into(),
            }]
        );
        assert_eq!(
            summary.message(),
            "Successfully purged Cloudflare cache for: a.com. Some domains failed: \
             b.com: HTTP 500 Internal Server Error: purge refused (1000)"
        );
    }

    #[tokio::test]
    async fn test_all_failed_aggregates_reasons() {
        let server = MockServer::start().await;
        mount_purge(&server, "ZA", 403).await;
        mount_purge(&server, "ZB", 500).await;

        let (_dir, store) = store_with(&[("a.com", "ZA"), ("b.com", "ZB")]).await;
        let mut client = CloudflareClient::with_endpoint("t", &server.uri()).unwrap();

        let err = purge_all(&mut client, &store).await.unwrap_err();
        let PurgeError::AllFailed(failures) = &err else {
            panic!("expected AllFailed, got {err:?}");
        };
        assert_eq!(failures.len(), 2);

        let message = err.to_string();
        assert!(message.starts_with("All purge operations failed: a.com: HTTP 403 Forbidden"));
        assert!(message.contains(", b.com: HTTP 500 Internal Server Error"));
    }

    #[tokio::test]
    async fn test_purges_in_settings_order() {
        let server = MockServer::start().await;
        mount_purge(&server, "Z3", 200).await;
        mount_purge(&server, "Z1", 200).await;
        mount_purge(&server, "Z2", 200).await;

        let (_dir, store) = store_with(&[("c.com", "Z3"), ("a.com", "Z1"), ("b.co.uk", "Z2")]).await;
        let mut client = CloudflareClient::with_endpoint("t", &server.uri()).unwrap();

        let summary = purge_all(&mut client, &store).await.unwrap();
        assert_eq!(summary.succeeded, vec!["c.com", "a.com", "b.co.uk"]);
        assert!(!summary.is_partial());
        assert_eq!(
            summary.message(),
            "Successfully purged Cloudflare cache for 3 domains: c.com, a.com, b.co.uk"
        );
    }

    #[tokio::test]
    async fn test_legacy_settings_are_purged() {
        let server = MockServer::start().await;
        mount_purge(&server, "Z1", 200).await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("cloudburst.yaml");
        std::fs::write(&path, "zone_id: Z1\ndomain: legacy.com\n").unwrap();
        let store = SettingsStore::new(&path);
        let mut client = CloudflareClient::with_endpoint("t", &server.uri()).unwrap();

        let summary = purge_all(&mut client, &store).await.unwrap();
        assert_eq!(summary.succeeded, vec!["legacy.com"]);
    }
}
