// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth 2.0 token introspection (RFC 7662) for reference tokens.
//!
//! The API authenticates to the introspection endpoint with HTTP Basic
//! using its application name and API secret. Active results are cached in
//! memory keyed by a SHA-256 digest of the token, never the token itself.

use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::AuthError;
use crate::cache::MemoryCache;

/// Maximum number of cached introspection results.
const CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(flatten)]
    claims: Map<String, Value>,
}

/// Client for the identity provider's introspection endpoint.
pub struct IntrospectionClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    cache: MemoryCache<Map<String, Value>>,
    cache_duration: Duration,
}

impl IntrospectionClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
        cache_duration: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: MemoryCache::new(CACHE_CAPACITY),
            cache_duration,
        })
    }

    /// Introspect a token and return its claims if it is active.
    pub async fn introspect(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<Map<String, Value>, AuthError> {
        let cache_key = token_digest(token);
        if let Some(claims) = self.cache.get(&cache_key) {
            debug!("Introspection cache hit");
            return Ok(claims);
        }

        let response = self
            .client
            .post(endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| AuthError::IntrospectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::IntrospectionFailed(format!(
                "HTTP {} from introspection endpoint",
                response.status()
            )));
        }

        let result: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::IntrospectionFailed(e.to_string()))?;

        if !result.active {
            return Err(AuthError::InactiveToken);
        }

        let ttl = cache_ttl(&result.claims, self.cache_duration, chrono::Utc::now().timestamp());
        self.cache.insert(cache_key, result.claims.clone(), ttl);
        Ok(result.claims)
    }
}

/// Base64url SHA-256 of the token.
fn token_digest(token: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(token.as_bytes()))
}

/// Cache for the configured duration, but never beyond the token's `exp`.
fn cache_ttl(claims: &Map<String, Value>, cache_duration: Duration, now: i64) -> Duration {
    match claims.get("exp").and_then(Value::as_i64) {
        Some(exp) if exp <= now => Duration::ZERO,
        Some(exp) => cache_duration.min(Duration::from_secs((exp - now) as u64)),
        None => cache_duration,
    }
}
