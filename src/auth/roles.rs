// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role → privilege mapping.
//!
//! ## Role Map Format
//!
//! A JSON object keyed by role name, each listing the privileges it grants:
//!
//! ```json
//! {
//!   "SubscriptionAdmin": ["CanViewSubscription"],
//!   "Support": ["CanViewSubscription"]
//! }
//! ```
//!
//! Role names match case-insensitively. Privilege names match exactly.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::info;

use super::error::AuthError;

/// Answers whether a set of roles grants a privilege.
pub trait RoleService: Send + Sync {
    fn has_privilege(&self, roles: &[String], privilege: &str) -> bool;

    /// Privileges granted by a single role.
    fn privileges_for(&self, role: &str) -> Vec<String>;
}

/// Role service backed by a JSON role map on disk.
#[derive(Debug, Default)]
pub struct FileSystemRoleService {
    /// Lowercased role name → privileges
    roles: HashMap<String, HashSet<String>>,
}

impl FileSystemRoleService {
    /// Load the role map from a file.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Configuration(format!(
                "failed to read role map {}: {e}",
                path.display()
            ))
        })?;
        let service = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            roles = service.roles.len(),
            "Loaded role map"
        );
        Ok(service)
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let map: HashMap<String, Vec<String>> = serde_json::from_str(json)
            .map_err(|e| AuthError::Configuration(format!("invalid role map: {e}")))?;
        Ok(Self::from_map(map))
    }

    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        let mut roles: HashMap<String, HashSet<String>> = HashMap::new();
        for (role, privileges) in map {
            roles
                .entry(role.to_lowercase())
                .or_default()
                .extend(privileges);
        }
        Self { roles }
    }
}

impl RoleService for FileSystemRoleService {
    fn has_privilege(&self, roles: &[String], privilege: &str) -> bool {
        roles.iter().any(|role| {
            self.roles
                .get(&role.to_lowercase())
                .is_some_and(|privileges| privileges.contains(privilege))
        })
    }

    fn privileges_for(&self, role: &str) -> Vec<String> {
        let mut privileges: Vec<String> = self
            .roles
            .get(&role.to_lowercase())
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default();
        privileges.sort();
        privileges
    }
}
