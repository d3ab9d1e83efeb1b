// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token validation and policy evaluation for one API.
//!
//! ## Token routing
//!
//! 1. Three dot-separated segments → JWT
//!    - HMAC algorithm, no `kid`, local issuer configured → local validation
//!    - otherwise → signing keys from OpenID Connect discovery
//! 2. Anything else → reference token, resolved through introspection

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::claims::AuthenticatedUser;
use super::discovery::OidcConfigurationService;
use super::error::AuthError;
use super::introspection::IntrospectionClient;
use super::jwks::{is_hmac, select_key};
use super::privileges::{AuthorizationOptions, PrivilegeDescriptor};
use super::refresh::ConfigurationRefreshTask;
use super::roles::{FileSystemRoleService, RoleService};
use super::settings::AuthSettings;

/// Shared-secret issuer for tokens minted by this service.
#[derive(Clone)]
pub struct LocalIssuer {
    secret: Vec<u8>,
    issuer: String,
    audience: Option<String>,
}

impl LocalIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: Option<String>) -> Self {
        Self {
            secret: secret.to_vec(),
            issuer: issuer.into(),
            audience,
        }
    }
}

impl std::fmt::Debug for LocalIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Configure token validation and authorization policies.
///
/// Registers one policy per privilege, then lets `customize` add or replace
/// policies.
pub fn configure_auth_service<F>(
    settings: AuthSettings,
    local_issuer: Option<LocalIssuer>,
    privileges: &[PrivilegeDescriptor],
    customize: F,
) -> Result<AuthService, AuthError>
where
    F: FnOnce(&mut AuthorizationOptions),
{
    if settings.role_map.trim().is_empty() {
        return Err(AuthError::Configuration(
            "A path to the role map must be provided.".to_string(),
        ));
    }
    let roles = FileSystemRoleService::load(Path::new(settings.role_map.trim()))?;

    let (oidc, introspection) = if settings.uses_discovery() {
        let oidc = OidcConfigurationService::from_settings(&settings)?;
        let introspection = IntrospectionClient::new(
            settings.application_name.clone(),
            settings.api_secret.clone(),
            settings.backchannel_timeout,
            settings.introspection_cache_duration,
        )?;
        info!(address = %oidc.metadata_address(), "OpenID Connect discovery enabled");
        (Some(Arc::new(oidc)), Some(introspection))
    } else {
        (None, None)
    };

    if oidc.is_none() && local_issuer.is_none() {
        return Err(AuthError::Configuration(
            "either an authority or a local token issuer must be configured".to_string(),
        ));
    }

    let mut options = AuthorizationOptions::default();
    for privilege in privileges {
        options.insert(privilege.name(), privilege.policy());
    }
    customize(&mut options);
    info!(policies = ?options.policy_names(), "Authorization policies registered");

    Ok(AuthService {
        clock_skew: settings.clock_skew,
        audience: settings.audience.clone(),
        refresh_poll_interval: settings.refresh_poll_interval,
        local: local_issuer,
        oidc,
        introspection,
        roles: Arc::new(roles),
        options,
    })
}

/// Authenticates bearer tokens and evaluates named policies.
pub struct AuthService {
    clock_skew: Duration,
    audience: Option<String>,
    refresh_poll_interval: Duration,
    local: Option<LocalIssuer>,
    oidc: Option<Arc<OidcConfigurationService>>,
    introspection: Option<IntrospectionClient>,
    roles: Arc<dyn RoleService>,
    options: AuthorizationOptions,
}

impl AuthService {
    /// Validate a bearer token and build the caller.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = if token.split('.').count() == 3 {
            self.validate_jwt(token).await?
        } else {
            self.introspect(token).await?
        };
        AuthenticatedUser::from_claims(claims)
    }

    /// Check a caller against a named policy.
    pub fn authorize(&self, user: &AuthenticatedUser, policy_name: &str) -> Result<(), AuthError> {
        let policy = self
            .options
            .get_policy(policy_name)
            .ok_or_else(|| AuthError::UnknownPolicy(policy_name.to_string()))?;
        if policy.evaluate(user, self.roles.as_ref()) {
            Ok(())
        } else {
            warn!(
                user_id = %user.user_id,
                policy = policy_name,
                "Authorization failed"
            );
            Err(AuthError::InsufficientPermissions)
        }
    }

    pub fn roles(&self) -> &dyn RoleService {
        self.roles.as_ref()
    }

    pub fn options(&self) -> &AuthorizationOptions {
        &self.options
    }

    pub fn uses_discovery(&self) -> bool {
        self.oidc.is_some()
    }

    /// Token-validation health: `None` without discovery, otherwise whether
    /// metadata is available after a refresh attempt.
    pub async fn check_token_validation(&self) -> Option<bool> {
        match &self.oidc {
            Some(oidc) => Some(oidc.refresh_if_expired().await),
            None => None,
        }
    }

    /// Start the background metadata refresh, if discovery is configured.
    pub fn spawn_refresh(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        self.oidc.as_ref().map(|oidc| {
            let task = ConfigurationRefreshTask::new(oidc.clone(), self.refresh_poll_interval);
            tokio::spawn(task.run(shutdown))
        })
    }

    async fn validate_jwt(&self, token: &str) -> Result<Map<String, Value>, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

        if let Some(local) = &self.local {
            if (is_hmac(header.alg) && header.kid.is_none()) || self.oidc.is_none() {
                debug!("Validating token with the local issuer");
                return self.validate_local(token, &header, local);
            }
        }

        let oidc = self
            .oidc
            .as_ref()
            .ok_or_else(|| AuthError::Configuration("no token issuer configured".to_string()))?;
        let metadata = oidc.get_configuration().await?;

        let (key, algorithm) = match select_key(&metadata.keys, &header) {
            Ok(selected) => selected,
            Err(AuthError::NoMatchingKey) => {
                // Keys may have rotated since the last fetch
                oidc.request_refresh().await;
                return Err(AuthError::NoMatchingKey);
            }
            Err(e) => return Err(e),
        };

        decode_claims(
            token,
            &key,
            algorithm,
            Some(metadata.configuration.issuer.as_str()),
            self.audience.as_deref(),
            self.clock_skew,
        )
    }

    fn validate_local(
        &self,
        token: &str,
        header: &Header,
        local: &LocalIssuer,
    ) -> Result<Map<String, Value>, AuthError> {
        if !is_hmac(header.alg) {
            return Err(AuthError::InvalidSignature);
        }
        decode_claims(
            token,
            &DecodingKey::from_secret(&local.secret),
            header.alg,
            Some(local.issuer.as_str()),
            local.audience.as_deref(),
            self.clock_skew,
        )
    }

    async fn introspect(&self, token: &str) -> Result<Map<String, Value>, AuthError> {
        let (oidc, client) = match (&self.oidc, &self.introspection) {
            (Some(oidc), Some(client)) => (oidc, client),
            _ => return Err(AuthError::MalformedToken),
        };
        let metadata = oidc.get_configuration().await?;
        let endpoint = metadata
            .configuration
            .introspection_endpoint
            .as_deref()
            .ok_or_else(|| {
                AuthError::IntrospectionFailed(
                    "identity provider does not advertise an introspection endpoint".to_string(),
                )
            })?;
        client.introspect(endpoint, token).await
    }
}

/// Decode and validate a JWT into its raw claim set.
fn decode_claims(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    issuer: Option<&str>,
    audience: Option<&str>,
    clock_skew: Duration,
) -> Result<Map<String, Value>, AuthError> {
    let mut validation = Validation::new(algorithm);
    validation.leeway = clock_skew.as_secs();
    validation.validate_nbf = true;

    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    match audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let data = decode::<Map<String, Value>>(token, key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        _ => AuthError::MalformedToken,
    })?;
    Ok(data.claims)
}
