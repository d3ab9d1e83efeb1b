// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 access tokens for local accounts.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::IdentityError;
use crate::auth::LocalIssuer;
use crate::storage::{ApplicationUser, UserClaim};

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: Option<String>,
    pub expiration: Duration,
}

impl JwtSettings {
    /// Validation parameters for tokens minted with these settings.
    pub fn local_issuer(&self) -> LocalIssuer {
        LocalIssuer::new(self.secret.as_bytes(), self.issuer.clone(), self.audience.clone())
    }
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

pub struct JwtTokenManager {
    settings: JwtSettings,
    key: EncodingKey,
}

impl JwtTokenManager {
    pub fn new(settings: JwtSettings) -> Self {
        let key = EncodingKey::from_secret(settings.secret.as_bytes());
        Self { settings, key }
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    /// Issue a token for a user with their roles and extra claims.
    pub fn generate(
        &self,
        user: &ApplicationUser,
        roles: &[String],
        claims: &[UserClaim],
    ) -> Result<AccessToken, IdentityError> {
        let issued_at = Utc::now().timestamp();
        let expires_in = self.settings.expiration.as_secs();

        let mut payload = Map::new();
        // User claims first so the registered claims below always win
        for claim in claims {
            append_claim(&mut payload, &claim.claim_type, &claim.claim_value);
        }
        payload.insert("sub".into(), Value::String(user.id.clone()));
        payload.insert("email".into(), Value::String(user.email_address.clone()));
        payload.insert(
            "role".into(),
            Value::Array(roles.iter().cloned().map(Value::String).collect()),
        );
        payload.insert("iss".into(), Value::String(self.settings.issuer.clone()));
        if let Some(audience) = &self.settings.audience {
            payload.insert("aud".into(), Value::String(audience.clone()));
        }
        payload.insert("iat".into(), Value::from(issued_at));
        payload.insert("exp".into(), Value::from(issued_at + expires_in as i64));
        payload.insert("jti".into(), Value::String(Uuid::new_v4().to_string()));

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.key)?;
        Ok(AccessToken { token, expires_in })
    }
}

/// Insert a claim, turning repeated claim types into arrays.
fn append_claim(payload: &mut Map<String, Value>, claim_type: &str, value: &str) {
    let value = Value::String(value.to_string());
    match payload.get_mut(claim_type) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            payload.insert(claim_type.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn settings() -> JwtSettings {
        JwtSettings {
            secret: "token-manager-secret-of-32-bytes!!".into(),
            issuer: "communications-api".into(),
            audience: Some("communications".into()),
            expiration: Duration::from_secs(3600),
        }
    }

    fn decode_payload(token: &str) -> Map<String, Value> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["communications-api"]);
        validation.set_audience(&["communications"]);
        decode::<Map<String, Value>>(
            token,
            &DecodingKey::from_secret(settings().secret.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn token_carries_identity_and_roles() {
        let manager = JwtTokenManager::new(settings());
        let user = ApplicationUser::new("reader@example.com", "hash".into());
        let issued = manager
            .generate(&user, &["SubscriptionAdmin".to_string()], &[])
            .unwrap();
        assert_eq!(issued.expires_in, 3600);

        let claims = decode_payload(&issued.token);
        assert_eq!(claims["sub"], user.id.as_str());
        assert_eq!(claims["email"], "reader@example.com");
        assert_eq!(claims["role"], serde_json::json!(["SubscriptionAdmin"]));
        assert!(claims["jti"].as_str().is_some());
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            3600
        );
    }

    #[test]
    fn repeated_user_claims_become_arrays() {
        let manager = JwtTokenManager::new(settings());
        let user = ApplicationUser::new("reader@example.com", "hash".into());
        let claims = [
            UserClaim::new(&user.id, "department", "marketing"),
            UserClaim::new(&user.id, "department", "support"),
            UserClaim::new(&user.id, "sub", "spoofed"),
        ];
        let issued = manager.generate(&user, &[], &claims).unwrap();

        let payload = decode_payload(&issued.token);
        assert_eq!(payload["department"], serde_json::json!(["marketing", "support"]));
        assert_eq!(payload["sub"], user.id.as_str());
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("token-manager-secret"));
    }
}
