// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity persistence: users, roles, user-role links and user claims.
//!
//! Emails and role names are unique case-insensitively. Uniqueness is
//! enforced through the `user_email_index` and `role_name_index` tables,
//! written in the same redb transaction as the entity.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::database::{
    composite_key, owner_prefix, ROLES, ROLE_NAME_INDEX, USERS, USER_CLAIMS, USER_EMAIL_INDEX,
    USER_ROLES,
};
use super::super::{Database, StoreError, StoreResult};

/// Normalise an email or role name for index lookups.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_uppercase()
}

/// A local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationUser {
    pub id: String,
    pub user_name: String,
    pub email_address: String,
    pub normalized_email: String,
    /// PHC-formatted argon2 hash
    pub password_hash: String,
    pub access_failed_count: u32,
    pub lockout_enabled: bool,
    pub lockout_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApplicationUser {
    pub fn new(email_address: &str, password_hash: String) -> Self {
        let email_address = email_address.trim().to_string();
        Self {
            id: Uuid::new_v4().to_string(),
            user_name: email_address.clone(),
            normalized_email: normalize_key(&email_address),
            email_address,
            password_hash,
            access_failed_count: 0,
            lockout_enabled: true,
            lockout_end: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the account is locked out at `now`.
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_enabled && self.lockout_end.is_some_and(|end| end > now)
    }
}

/// A named role, mapped to privileges by the role map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRole {
    pub id: String,
    pub name: String,
    pub normalized_name: String,
}

impl IdentityRole {
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_string();
        Self {
            id: Uuid::new_v4().to_string(),
            normalized_name: normalize_key(&name),
            name,
        }
    }
}

/// An additional claim issued in a user's tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserClaim {
    pub id: String,
    pub user_id: String,
    pub claim_type: String,
    pub claim_value: String,
}

impl UserClaim {
    pub fn new(user_id: &str, claim_type: &str, claim_value: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            claim_type: claim_type.to_string(),
            claim_value: claim_value.to_string(),
        }
    }
}

/// Repository for identity data.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user. Fails if the email is already taken.
    pub fn create(&self, user: &ApplicationUser) -> StoreResult<()> {
        let json = serde_json::to_vec(user)?;
        let write_txn = self.db.redb().begin_write()?;
        {
            let mut index = write_txn.open_table(USER_EMAIL_INDEX)?;
            if index.get(user.normalized_email.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "User with email {}",
                    user.email_address
                )));
            }
            index.insert(user.normalized_email.as_str(), user.id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            users.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> StoreResult<Option<ApplicationUser>> {
        self.db.get_json(USERS, user_id)
    }

    /// Case-insensitive lookup by email.
    pub fn find_by_email(&self, email_address: &str) -> StoreResult<Option<ApplicationUser>> {
        match self
            .db
            .get_index(USER_EMAIL_INDEX, &normalize_key(email_address))?
        {
            Some(user_id) => self.get(&user_id),
            None => Ok(None),
        }
    }

    /// Replace an existing user. The email may not change through this call.
    pub fn update(&self, user: &ApplicationUser) -> StoreResult<()> {
        if self.get(&user.id)?.is_none() {
            return Err(StoreError::NotFound(format!("User {}", user.id)));
        }
        self.db.put_json(USERS, &user.id, user)
    }

    /// Re-read a user inside one write transaction, apply `change` and store
    /// the result. redb admits a single writer, so concurrent calls see each
    /// other's changes.
    pub fn update_with<R>(
        &self,
        user_id: &str,
        change: impl FnOnce(&mut ApplicationUser) -> R,
    ) -> StoreResult<R> {
        let write_txn = self.db.redb().begin_write()?;
        let result = {
            let mut users = write_txn.open_table(USERS)?;
            let mut user: ApplicationUser = match users.get(user_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StoreError::NotFound(format!("User {user_id}"))),
            };
            let result = change(&mut user);
            let json = serde_json::to_vec(&user)?;
            users.insert(user_id, json.as_slice())?;
            result
        };
        write_txn.commit()?;
        Ok(result)
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Case-insensitive lookup by role name.
    pub fn find_role_by_name(&self, name: &str) -> StoreResult<Option<IdentityRole>> {
        match self.db.get_index(ROLE_NAME_INDEX, &normalize_key(name))? {
            Some(role_id) => self.db.get_json(ROLES, &role_id),
            None => Ok(None),
        }
    }

    /// Insert a new role. Fails if the name is already taken.
    pub fn create_role(&self, role: &IdentityRole) -> StoreResult<()> {
        let json = serde_json::to_vec(role)?;
        let write_txn = self.db.redb().begin_write()?;
        {
            let mut index = write_txn.open_table(ROLE_NAME_INDEX)?;
            if index.get(role.normalized_name.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("Role {}", role.name)));
            }
            index.insert(role.normalized_name.as_str(), role.id.as_str())?;

            let mut roles = write_txn.open_table(ROLES)?;
            roles.insert(role.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Link a user to a role. Linking twice is a no-op.
    pub fn add_to_role(&self, user_id: &str, role_id: &str) -> StoreResult<()> {
        let key = composite_key(user_id, role_id);
        let write_txn = self.db.redb().begin_write()?;
        {
            let mut links = write_txn.open_table(USER_ROLES)?;
            links.insert(key.as_str(), role_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Roles linked to a user.
    pub fn roles_for(&self, user_id: &str) -> StoreResult<Vec<IdentityRole>> {
        let role_ids = self
            .db
            .list_index_with_prefix(USER_ROLES, &owner_prefix(user_id))?;
        let mut roles = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            if let Some(role) = self.db.get_json(ROLES, &role_id)? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    // =========================================================================
    // Claims
    // =========================================================================

    pub fn add_claim(&self, claim: &UserClaim) -> StoreResult<()> {
        self.db
            .put_json(USER_CLAIMS, &composite_key(&claim.user_id, &claim.id), claim)
    }

    pub fn claims_for(&self, user_id: &str) -> StoreResult<Vec<UserClaim>> {
        self.db
            .list_json_with_prefix(USER_CLAIMS, &owner_prefix(user_id))
    }
}
