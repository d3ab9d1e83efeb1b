// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect discovery: metadata address resolution, document
//! retrieval and the cached configuration service.
//!
//! ## Refresh model
//!
//! - `get_configuration` only fetches when nothing is cached yet
//! - `refresh_if_expired` refetches once the automatic refresh interval has
//!   elapsed or a refresh was requested; on failure the previous metadata
//!   stays in place
//! - `request_refresh` marks the cache stale, at most once per refresh
//!   interval (used when a token names an unknown signing key)

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::settings::{has_text, AuthSettings};

/// Path appended to the authority to locate the discovery document.
pub const WELL_KNOWN_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

/// Largest discovery or key-set document accepted (10 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

/// Resolve the discovery document address.
///
/// An explicit metadata address wins over one derived from the authority.
pub fn metadata_address(
    authority: Option<&str>,
    metadata_address: Option<&str>,
    require_https: bool,
) -> Result<String, AuthError> {
    let address = if has_text(metadata_address) {
        metadata_address.unwrap_or_default().trim().to_string()
    } else if has_text(authority) {
        let authority = authority.unwrap_or_default().trim();
        let separator = if authority.ends_with('/') { "" } else { "/" };
        format!("{authority}{separator}{WELL_KNOWN_CONFIGURATION_PATH}")
    } else {
        return Err(AuthError::Configuration(
            "The metadata address or the authority must be specified".to_string(),
        ));
    };

    if require_https && !is_https(&address) {
        return Err(AuthError::Configuration(
            "The MetadataAddress or Authority must use HTTPS unless disabled for development \
             by setting RequireHttpsMetadata=false."
                .to_string(),
        ));
    }

    Ok(address)
}

fn is_https(address: &str) -> bool {
    address
        .get(..8)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
}

/// Subset of the OpenID Provider metadata used by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Discovery document together with the signing keys it points at.
#[derive(Debug, Clone)]
pub struct OidcMetadata {
    pub configuration: OpenIdConfiguration,
    pub keys: JwkSet,
}

// =============================================================================
// Document retrieval
// =============================================================================

/// Fetches JSON documents from the identity provider.
#[derive(Clone)]
pub struct DocumentRetriever {
    client: reqwest::Client,
    require_https: bool,
}

impl DocumentRetriever {
    pub fn new(timeout: Duration, require_https: bool) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            require_https,
        })
    }

    /// Download a document, enforcing HTTPS and the size cap.
    pub async fn get_document(&self, address: &str) -> Result<Vec<u8>, AuthError> {
        if self.require_https && !is_https(address) {
            return Err(AuthError::MetadataUnavailable(format!(
                "refusing to fetch non-HTTPS address {address}"
            )));
        }

        let mut response = self
            .client
            .get(address)
            .send()
            .await
            .map_err(|e| AuthError::MetadataUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::MetadataUnavailable(format!(
                "HTTP {} from {address}",
                response.status()
            )));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_DOCUMENT_SIZE as u64)
        {
            return Err(AuthError::MetadataUnavailable(format!(
                "document at {address} exceeds {MAX_DOCUMENT_SIZE} bytes"
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AuthError::MetadataUnavailable(e.to_string()))?
        {
            if body.len() + chunk.len() > MAX_DOCUMENT_SIZE {
                return Err(AuthError::MetadataUnavailable(format!(
                    "document at {address} exceeds {MAX_DOCUMENT_SIZE} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, address: &str) -> Result<T, AuthError> {
        let body = self.get_document(address).await?;
        serde_json::from_slice(&body).map_err(|e| {
            AuthError::MetadataUnavailable(format!("invalid document at {address}: {e}"))
        })
    }
}

// =============================================================================
// Configuration service
// =============================================================================

struct CachedMetadata {
    metadata: Arc<OidcMetadata>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    cached: Option<CachedMetadata>,
    refresh_requested: bool,
    last_requested_refresh: Option<Instant>,
}

/// Cached OpenID Connect metadata for one identity provider.
pub struct OidcConfigurationService {
    metadata_address: String,
    retriever: DocumentRetriever,
    automatic_refresh_interval: Duration,
    refresh_interval: Duration,
    state: RwLock<CacheState>,
    /// Serialises fetches so concurrent callers share one download
    fetch_lock: Mutex<()>,
}

impl OidcConfigurationService {
    /// Build the service from settings. Fails if no metadata address can be
    /// resolved or HTTPS rules are violated.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let address = metadata_address(
            settings.authority.as_deref(),
            settings.metadata_address.as_deref(),
            settings.require_https_metadata,
        )?;
        let retriever =
            DocumentRetriever::new(settings.backchannel_timeout, settings.require_https_metadata)?;
        Ok(Self {
            metadata_address: address,
            retriever,
            automatic_refresh_interval: settings.automatic_refresh_interval,
            refresh_interval: settings.refresh_interval,
            state: RwLock::new(CacheState::default()),
            fetch_lock: Mutex::new(()),
        })
    }

    pub fn metadata_address(&self) -> &str {
        &self.metadata_address
    }

    /// Return cached metadata, fetching only if nothing is cached yet.
    pub async fn get_configuration(&self) -> Result<Arc<OidcMetadata>, AuthError> {
        if let Some(metadata) = self.cached().await {
            return Ok(metadata);
        }

        let _guard = self.fetch_lock.lock().await;
        if let Some(metadata) = self.cached().await {
            return Ok(metadata);
        }

        let metadata = Arc::new(self.fetch().await?);
        self.store(metadata.clone()).await;
        Ok(metadata)
    }

    /// Refresh when expired or requested. Returns whether metadata is available.
    pub async fn refresh_if_expired(&self) -> bool {
        if !self.needs_refresh().await {
            return true;
        }

        let _guard = self.fetch_lock.lock().await;
        if !self.needs_refresh().await {
            return true;
        }

        match self.fetch().await {
            Ok(metadata) => {
                self.store(Arc::new(metadata)).await;
                info!(address = %self.metadata_address, "OpenID Connect metadata refreshed");
                true
            }
            Err(e) => {
                warn!(
                    address = %self.metadata_address,
                    error = %e,
                    "Failed to refresh OpenID Connect metadata"
                );
                self.state.read().await.cached.is_some()
            }
        }
    }

    /// Ask for a refresh on the next `refresh_if_expired` pass.
    ///
    /// Ignored when the previous request is younger than the refresh interval.
    pub async fn request_refresh(&self) {
        let mut state = self.state.write().await;
        let now = Instant::now();
        let allowed = state
            .last_requested_refresh
            .is_none_or(|last| now.duration_since(last) >= self.refresh_interval);
        if allowed {
            debug!(address = %self.metadata_address, "Metadata refresh requested");
            state.refresh_requested = true;
            state.last_requested_refresh = Some(now);
        }
    }

    /// Whether metadata has been loaded at least once.
    pub async fn is_configured(&self) -> bool {
        self.state.read().await.cached.is_some()
    }

    async fn cached(&self) -> Option<Arc<OidcMetadata>> {
        self.state
            .read()
            .await
            .cached
            .as_ref()
            .map(|entry| entry.metadata.clone())
    }

    async fn needs_refresh(&self) -> bool {
        let state = self.state.read().await;
        match &state.cached {
            None => true,
            Some(entry) => {
                state.refresh_requested
                    || entry.fetched_at.elapsed() >= self.automatic_refresh_interval
            }
        }
    }

    async fn store(&self, metadata: Arc<OidcMetadata>) {
        let mut state = self.state.write().await;
        state.cached = Some(CachedMetadata {
            metadata,
            fetched_at: Instant::now(),
        });
        state.refresh_requested = false;
    }

    async fn fetch(&self) -> Result<OidcMetadata, AuthError> {
        let configuration: OpenIdConfiguration =
            self.retriever.get_json(&self.metadata_address).await?;
        let keys: JwkSet = self.retriever.get_json(&configuration.jwks_uri).await?;
        debug!(
            issuer = %configuration.issuer,
            keys = keys.keys.len(),
            "Fetched OpenID Connect metadata"
        );
        Ok(OidcMetadata {
            configuration,
            keys,
        })
    }
}
