// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated principal built from a validated claim set.

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::error::AuthError;

/// Claim types that carry role names.
const ROLE_CLAIM_TYPES: [&str; 3] = [
    "role",
    "roles",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
];

/// Authenticated caller, either a user (`sub`) or a client (`client_id`).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Subject, falling back to the client id for client-credential tokens
    pub user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    pub roles: Vec<String>,

    pub scopes: Vec<String>,

    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp), 0 when absent
    #[serde(skip)]
    pub expires_at: i64,

    /// Every claim from the token or introspection response
    #[serde(skip)]
    pub claims: Map<String, Value>,
}

impl AuthenticatedUser {
    /// Build a principal from a validated claim set.
    pub fn from_claims(claims: Map<String, Value>) -> Result<Self, AuthError> {
        let client_id = claims
            .get("client_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let user_id = claims
            .get("sub")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| client_id.clone())
            .ok_or(AuthError::MalformedToken)?;

        let mut roles = Vec::new();
        for claim_type in ROLE_CLAIM_TYPES {
            roles.extend(string_values(claims.get(claim_type)));
        }

        let scopes = match claims.get("scope") {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            other => string_values(other),
        };

        Ok(Self {
            user_id,
            client_id,
            roles,
            scopes,
            issuer: claims
                .get("iss")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            expires_at: claims.get("exp").and_then(Value::as_i64).unwrap_or(0),
            claims,
        })
    }

    /// Case-insensitive role check.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// All string values of a claim, whether it is a single value or an array.
    pub fn claim_values(&self, claim_type: &str) -> Vec<String> {
        string_values(self.claims.get(claim_type))
    }
}

fn string_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
