// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Invalid authorization header format
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    #[error("Token is malformed")]
    MalformedToken,
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token issuer is invalid")]
    InvalidIssuer,
    #[error("Token audience is invalid")]
    InvalidAudience,
    #[error("Token is not yet valid")]
    TokenNotYetValid,
    /// Introspection reported the reference token as inactive
    #[error("Token is not active")]
    InactiveToken,
    /// No key in the signing key set matches the token
    #[error("No matching key found in JWKS")]
    NoMatchingKey,
    /// Discovery document or key set could not be retrieved
    #[error("Failed to retrieve identity provider metadata: {0}")]
    MetadataUnavailable(String),
    #[error("Token introspection failed: {0}")]
    IntrospectionFailed(String),
    /// Policy name was never registered
    #[error("Authorization policy '{0}' is not registered")]
    UnknownPolicy(String),
    #[error("Authentication is misconfigured: {0}")]
    Configuration(String),
    #[error("Internal authentication error: {0}")]
    InternalError(String),
    #[error("Insufficient permissions for this operation")]
    InsufficientPermissions,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InactiveToken => "inactive_token",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::MetadataUnavailable(_) => "metadata_unavailable",
            AuthError::IntrospectionFailed(_) => "introspection_failed",
            AuthError::UnknownPolicy(_) => "unknown_policy",
            AuthError::Configuration(_) => "configuration_error",
            AuthError::InternalError(_) => "internal_error",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::TokenNotYetValid
            | AuthError::InactiveToken
            | AuthError::NoMatchingKey => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::MetadataUnavailable(_) | AuthError::IntrospectionFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::UnknownPolicy(_)
            | AuthError::Configuration(_)
            | AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `WWW-Authenticate` challenge for 401 responses (RFC 6750).
    pub fn challenge(&self) -> Option<String> {
        if self.status_code() != StatusCode::UNAUTHORIZED {
            return None;
        }
        match self {
            AuthError::MissingAuthHeader => Some("Bearer".to_string()),
            AuthError::InvalidAuthHeader => Some(format!(
                "Bearer error=\"invalid_request\", error_description=\"{self}\""
            )),
            _ => Some(format!(
                "Bearer error=\"invalid_token\", error_description=\"{self}\""
            )),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let challenge = self.challenge();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_auth_returns_401_with_bare_challenge() {
        let response = AuthError::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn expired_token_challenge_includes_error_details() {
        let response = AuthError::TokenExpired.into_response();
        let challenge = response.headers()[WWW_AUTHENTICATE].to_str().unwrap();
        assert_eq!(
            challenge,
            "Bearer error=\"invalid_token\", error_description=\"Token has expired\""
        );
    }

    #[tokio::test]
    async fn insufficient_permissions_returns_403_without_challenge() {
        let response = AuthError::InsufficientPermissions.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn upstream_failures_are_unavailable() {
        assert_eq!(
            AuthError::MetadataUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::UnknownPolicy("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
