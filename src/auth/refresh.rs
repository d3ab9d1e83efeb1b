// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Configuration Refresh Task
//!
//! Background task that keeps the OpenID Connect metadata cache warm.
//!
//! Every `poll_interval` (default 10 s) it asks the configuration service to
//! refresh if the metadata expired or a refresh was requested. Fetch
//! failures are logged by the service and retried on the next pass.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::discovery::OidcConfigurationService;

/// Periodic metadata refresher.
pub struct ConfigurationRefreshTask {
    service: Arc<OidcConfigurationService>,
    poll_interval: Duration,
}

impl ConfigurationRefreshTask {
    pub fn new(service: Arc<OidcConfigurationService>, poll_interval: Duration) -> Self {
        Self {
            service,
            poll_interval,
        }
    }

    /// Run the refresh loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(task.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            address = %self.service.metadata_address(),
            "Metadata refresh task starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Metadata refresh task shutting down");
                    return;
                }
            }

            let available = self.service.refresh_if_expired().await;
            debug!(available, "Metadata refresh pass complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::settings::AuthSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn stops_when_cancelled() {
        let settings = AuthSettings {
            authority: Some("https://idp.example.com".into()),
            ..AuthSettings::default()
        };
        let service = Arc::new(OidcConfigurationService::from_settings(&settings).unwrap());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            ConfigurationRefreshTask::new(service, Duration::from_secs(3600)).run(shutdown.clone()),
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn loads_metadata_in_the_background() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"keys": []})))
            .mount(&server)
            .await;

        let settings = AuthSettings {
            authority: Some(server.uri()),
            require_https_metadata: false,
            ..AuthSettings::default()
        };
        let service = Arc::new(OidcConfigurationService::from_settings(&settings).unwrap());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            ConfigurationRefreshTask::new(service.clone(), Duration::from_millis(10))
                .run(shutdown.clone()),
        );

        let mut configured = false;
        for _ in 0..100 {
            if service.is_configured().await {
                configured = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();
        assert!(configured);
    }
}
