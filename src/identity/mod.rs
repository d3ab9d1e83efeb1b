// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity
//!
//! Local accounts for callers that do not come through the external
//! identity provider.
//!
//! - `UserManager` creates users, assigns roles and claims
//! - `SignInManager` checks passwords and applies lockout
//! - `JwtTokenManager` issues HS256 access tokens validated by the
//!   auth module's local issuer

pub mod password;
pub mod sign_in;
pub mod token;
pub mod users;

pub use password::{hash_password, verify_password, PasswordPolicy};
pub use sign_in::{LockoutOptions, SignInManager, SignInResult, MAX_LOCKOUT_DAYS};
pub use token::{AccessToken, JwtSettings, JwtTokenManager, MIN_SECRET_LENGTH};
pub use users::UserManager;

use tracing::info;

use crate::storage::StoreError;

/// Role granted to the seeded administrator.
pub const ADMIN_ROLE: &str = "SubscriptionAdmin";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Email '{0}' is invalid.")]
    InvalidEmail(String),

    #[error("{}", .0.join(" "))]
    PasswordPolicy(Vec<String>),

    #[error("Email '{0}' is already taken.")]
    DuplicateEmail(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Create the administrator account if it does not exist yet.
///
/// Returns `true` when a new account was created.
pub fn seed_admin(users: &UserManager, email: &str, password: &str) -> Result<bool, IdentityError> {
    if let Some(existing) = users.find_by_email(email)? {
        users.add_to_role(&existing, ADMIN_ROLE)?;
        return Ok(false);
    }
    let user = users.create(email, password)?;
    users.add_to_role(&user, ADMIN_ROLE)?;
    info!(user_id = %user.id, role = ADMIN_ROLE, "Seeded administrator account");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn seed_admin_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(&temp_dir.path().join("test.redb")).unwrap());
        let users = UserManager::new(db, PasswordPolicy::default());

        assert!(seed_admin(&users, "admin@example.com", "Adm1n!pass").unwrap());
        assert!(!seed_admin(&users, "ADMIN@example.com", "Adm1n!pass").unwrap());

        let admin = users.find_by_email("admin@example.com").unwrap().unwrap();
        assert_eq!(users.roles(&admin).unwrap(), vec![ADMIN_ROLE.to_string()]);
    }

    #[test]
    fn policy_error_joins_messages() {
        let err = IdentityError::PasswordPolicy(vec!["a.".into(), "b.".into()]);
        assert_eq!(err.to_string(), "a. b.");
    }
}
