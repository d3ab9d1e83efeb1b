// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, AuthenticatedUser};

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserMeResponse {
    /// Token subject, or the client id for client-credential tokens
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
}

impl From<AuthenticatedUser> for UserMeResponse {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id,
            client_id: user.client_id,
            roles: user.roles,
            scopes: user.scopes,
        }
    }
}

/// Get the current authenticated principal.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(user): Auth) -> Json<UserMeResponse> {
    Json(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn user_me_response_from_authenticated_user() {
        let user = AuthenticatedUser {
            user_id: "user_123".to_string(),
            client_id: Some("portal".to_string()),
            roles: vec!["Support".to_string()],
            scopes: vec!["communications".to_string()],
            issuer: "test".to_string(),
            expires_at: 0,
            claims: Map::new(),
        };

        let response: UserMeResponse = user.into();
        assert_eq!(response.user_id, "user_123");
        assert_eq!(response.client_id.as_deref(), Some("portal"));
        assert_eq!(response.roles, vec!["Support"]);
        assert_eq!(response.scopes, vec!["communications"]);
    }
}
