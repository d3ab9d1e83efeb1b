// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use serde::Serialize;
use utoipa::ToSchema;

/// A validation failure tied to a request field.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn required_field_missing(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_email_address(field: impl Into<String>, email_address: &str) -> Self {
        Self {
            field: field.into(),
            message: format!("{email_address} is not a valid email address"),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of a command: field errors, or data on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub errors: Vec<FieldError>,
    pub data: Option<T>,
}

impl<T> CommandResponse<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            errors: Vec::new(),
            data,
        }
    }

    pub fn failure(errors: Vec<FieldError>) -> Self {
        Self { errors, data: None }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
