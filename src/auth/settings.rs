// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settings consumed by the authorization layer.

use std::time::Duration;

/// Default interval after which cached metadata is refreshed (1 day).
pub const DEFAULT_AUTOMATIC_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum gap between two forced metadata refreshes (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How often the background task checks whether metadata expired.
pub const DEFAULT_REFRESH_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Timeout for calls to the identity provider.
pub const DEFAULT_BACKCHANNEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Tolerated clock difference when validating token lifetimes.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// How long an active introspection result is reused.
pub const DEFAULT_INTROSPECTION_CACHE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Identity provider and policy settings for one API.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// API name. Also the client id presented to the introspection endpoint.
    pub application_name: String,
    /// Token issuer base URL. Discovery is disabled when neither this nor
    /// `metadata_address` is set.
    pub authority: Option<String>,
    /// Explicit discovery document URL, overriding the one derived from
    /// `authority`.
    pub metadata_address: Option<String>,
    /// Required `aud` value. Audience is not checked when unset.
    pub audience: Option<String>,
    /// Client secret presented to the introspection endpoint.
    pub api_secret: String,
    /// Path to the JSON role → privileges map.
    pub role_map: String,
    pub require_https_metadata: bool,
    pub backchannel_timeout: Duration,
    pub automatic_refresh_interval: Duration,
    pub refresh_interval: Duration,
    pub refresh_poll_interval: Duration,
    pub clock_skew: Duration,
    pub introspection_cache_duration: Duration,
}

impl AuthSettings {
    /// Whether OpenID Connect discovery is configured.
    pub fn uses_discovery(&self) -> bool {
        has_text(self.authority.as_deref()) || has_text(self.metadata_address.as_deref())
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            application_name: "communications-api".to_string(),
            authority: None,
            metadata_address: None,
            audience: None,
            api_secret: String::new(),
            role_map: "config/role-map.json".to_string(),
            require_https_metadata: true,
            backchannel_timeout: DEFAULT_BACKCHANNEL_TIMEOUT,
            automatic_refresh_interval: DEFAULT_AUTOMATIC_REFRESH_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_poll_interval: DEFAULT_REFRESH_POLL_INTERVAL,
            clock_skew: DEFAULT_CLOCK_SKEW,
            introspection_cache_duration: DEFAULT_INTROSPECTION_CACHE_DURATION,
        }
    }
}

pub(crate) fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_requires_authority_or_metadata_address() {
        let mut settings = AuthSettings::default();
        assert!(!settings.uses_discovery());

        settings.authority = Some("   ".to_string());
        assert!(!settings.uses_discovery());

        settings.metadata_address = Some("https://idp/.well-known/openid-configuration".into());
        assert!(settings.uses_discovery());
    }
}
