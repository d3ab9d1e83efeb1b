// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. JSON field names are
//! camelCase; every type derives `ToSchema` for the OpenAPI document.
//!
//! ## Model Categories
//!
//! - **Subscriptions**: subscribe, unsubscribe and lookup contracts
//! - **Accounts**: registration and login

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::application::FieldError;

// =============================================================================
// Subscriptions
// =============================================================================

/// Body of `POST /v1/subscribe` and `POST /v1/unsubscribe`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Address to (un)subscribe
    #[serde(default)]
    pub email_address: String,
}

/// Outcome of a command: success flag plus field errors.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub errors: Vec<FieldError>,
}

impl CommandResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct SubscriptionLookup {
    pub email_address: String,
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    pub email_address: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// The account email address
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}
