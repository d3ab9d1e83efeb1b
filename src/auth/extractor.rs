// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! Use the `Auth` extractor in handlers to require authentication, and
//! `Authorized<P>` to additionally require the policy of privilege `P`:
//!
//! ```rust,ignore
//! async fn my_handler(Authorized(user, _): Authorized<CanViewSubscription>) -> impl IntoResponse {
//!     // user is AuthenticatedUser and passed the CanViewSubscription policy
//! }
//! ```
//!
//! The extractors work with any state from which an `Arc<AuthService>` can
//! be obtained through `FromRef`.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::privileges::Privilege;
use super::service::AuthService;
use super::{AuthError, AuthenticatedUser};

/// Extractor for authenticated users.
///
/// The validated user is cached in request extensions so later extractors
/// on the same request do not validate the token again.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let token = bearer_token(&parts.headers)?.to_string();
        let auth = Arc::<AuthService>::from_ref(state);
        let user = auth.authenticate(&token).await.inspect_err(|e| {
            warn!(error = %e, error_code = e.error_code(), "Authentication failed");
        })?;

        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Extractor that requires the policy registered for privilege `P`.
pub struct Authorized<P>(pub AuthenticatedUser, pub PhantomData<fn() -> P>);

impl<P, S> FromRequestParts<S> for Authorized<P>
where
    P: Privilege,
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        Arc::<AuthService>::from_ref(state).authorize(&user, P::NAME)?;
        Ok(Authorized(user, PhantomData))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` if no valid authentication is present, instead of rejecting.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(OptionalAuth(None));
        }
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(user)) => Ok(OptionalAuth(Some(user))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::privileges::PrivilegeDescriptor;
    use crate::auth::service::{configure_auth_service, LocalIssuer};
    use crate::auth::settings::AuthSettings;
    use axum::http::Request;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;
    use tempfile::TempDir;

    const SECRET: &[u8] = b"extractor-test-secret-32-bytes-long!";

    struct CanViewSubscription;

    impl Privilege for CanViewSubscription {
        const NAME: &'static str = "CanViewSubscription";
    }

    /// Helper to create an auth service with a local issuer
    fn create_test_auth() -> (Arc<AuthService>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let role_map = temp_dir.path().join("role-map.json");
        std::fs::write(&role_map, r#"{"SubscriptionAdmin": ["CanViewSubscription"]}"#).unwrap();

        let settings = AuthSettings {
            role_map: role_map.to_string_lossy().into_owned(),
            ..AuthSettings::default()
        };
        let service = configure_auth_service(
            settings,
            Some(LocalIssuer::new(SECRET, "test", None)),
            &[PrivilegeDescriptor::of::<CanViewSubscription>()],
            |_| {},
        )
        .unwrap();
        (Arc::new(service), temp_dir)
    }

    fn create_test_jwt(user_id: &str, roles: &[&str]) -> String {
        let claims = json!({
            "sub": user_id,
            "iss": "test",
            "exp": chrono::Utc::now().timestamp() + 600,
            "role": roles,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn parts_with(authorization: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _temp_dir) = create_test_auth();
        let mut parts = parts_with(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_other_schemes() {
        let (state, _temp_dir) = create_test_auth();
        let mut parts = parts_with(Some("Basic dXNlcjpwYXNz".to_string()));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_jwt() {
        let (state, _temp_dir) = create_test_auth();
        let token = create_test_jwt("user_123", &[]);
        let mut parts = parts_with(Some(format!("Bearer {token}")));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.unwrap().0.user_id, "user_123");
        // Cached for later extractors
        assert!(parts.extensions.get::<AuthenticatedUser>().is_some());
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _temp_dir) = create_test_auth();
        let mut parts = parts_with(None);
        let user = AuthenticatedUser::from_claims(
            json!({"sub": "user_from_middleware"}).as_object().cloned().unwrap(),
        )
        .unwrap();
        parts.extensions.insert(user);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.unwrap().0.user_id, "user_from_middleware");
    }

    #[tokio::test]
    async fn authorized_checks_privilege_policy() {
        let (state, _temp_dir) = create_test_auth();

        let token = create_test_jwt("admin", &["SubscriptionAdmin"]);
        let mut parts = parts_with(Some(format!("Bearer {token}")));
        let result = Authorized::<CanViewSubscription>::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.unwrap().0.user_id, "admin");

        let token = create_test_jwt("reader", &["Reader"]);
        let mut parts = parts_with(Some(format!("Bearer {token}")));
        let result = Authorized::<CanViewSubscription>::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));
    }

    #[tokio::test]
    async fn optional_auth_returns_none_without_user() {
        let (state, _temp_dir) = create_test_auth();
        let mut parts = parts_with(None);

        let result = OptionalAuth::from_request_parts(&mut parts, &state).await;
        assert!(result.unwrap().0.is_none());

        let mut parts = parts_with(Some("Bearer garbage".to_string()));
        let result = OptionalAuth::from_request_parts(&mut parts, &state).await;
        assert!(result.unwrap().0.is_none());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc");

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(matches!(
            bearer_token(&headers),
            Err(AuthError::InvalidAuthHeader)
        ));
    }
}
