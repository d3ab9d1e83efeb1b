// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::{debug, info};

use super::password::{hash_password, PasswordPolicy};
use super::IdentityError;
use crate::application::validation::is_valid_email;
use crate::storage::{ApplicationUser, Database, IdentityRole, StoreError, UserClaim, UserRepository};

/// Account management on top of the identity tables.
pub struct UserManager {
    db: Arc<Database>,
    policy: PasswordPolicy,
}

impl UserManager {
    pub fn new(db: Arc<Database>, policy: PasswordPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Create a user after checking the email and password policy.
    pub fn create(&self, email_address: &str, password: &str) -> Result<ApplicationUser, IdentityError> {
        let email_address = email_address.trim();
        if !is_valid_email(email_address) {
            return Err(IdentityError::InvalidEmail(email_address.to_string()));
        }

        let violations = self.policy.validate(password);
        if !violations.is_empty() {
            return Err(IdentityError::PasswordPolicy(violations));
        }

        let user = ApplicationUser::new(email_address, hash_password(password)?);
        UserRepository::new(&self.db)
            .create(&user)
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => {
                    IdentityError::DuplicateEmail(email_address.to_string())
                }
                other => IdentityError::Store(other),
            })?;

        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub fn find_by_email(&self, email_address: &str) -> Result<Option<ApplicationUser>, IdentityError> {
        Ok(UserRepository::new(&self.db).find_by_email(email_address)?)
    }

    pub fn find_by_id(&self, user_id: &str) -> Result<Option<ApplicationUser>, IdentityError> {
        Ok(UserRepository::new(&self.db).get(user_id)?)
    }

    pub fn update(&self, user: &ApplicationUser) -> Result<(), IdentityError> {
        Ok(UserRepository::new(&self.db).update(user)?)
    }

    /// Apply `change` to the stored user atomically.
    pub fn update_with<R>(
        &self,
        user_id: &str,
        change: impl FnOnce(&mut ApplicationUser) -> R,
    ) -> Result<R, IdentityError> {
        Ok(UserRepository::new(&self.db).update_with(user_id, change)?)
    }

    /// Add the user to a role, creating the role if it does not exist.
    pub fn add_to_role(&self, user: &ApplicationUser, role_name: &str) -> Result<(), IdentityError> {
        let repo = UserRepository::new(&self.db);
        let role = match repo.find_role_by_name(role_name)? {
            Some(role) => role,
            None => {
                let role = IdentityRole::new(role_name);
                match repo.create_role(&role) {
                    Ok(()) => {
                        debug!(role = %role.name, "Role created");
                        role
                    }
                    // Lost a race with a concurrent creator
                    Err(StoreError::AlreadyExists(_)) => repo
                        .find_role_by_name(role_name)?
                        .ok_or_else(|| StoreError::NotFound(format!("Role {role_name}")))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };
        repo.add_to_role(&user.id, &role.id)?;
        Ok(())
    }

    /// Names of the user's roles, sorted.
    pub fn roles(&self, user: &ApplicationUser) -> Result<Vec<String>, IdentityError> {
        let mut names: Vec<String> = UserRepository::new(&self.db)
            .roles_for(&user.id)?
            .into_iter()
            .map(|role| role.name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn add_claim(
        &self,
        user: &ApplicationUser,
        claim_type: &str,
        claim_value: &str,
    ) -> Result<UserClaim, IdentityError> {
        let claim = UserClaim::new(&user.id, claim_type, claim_value);
        UserRepository::new(&self.db).add_claim(&claim)?;
        Ok(claim)
    }

    pub fn claims(&self, user: &ApplicationUser) -> Result<Vec<UserClaim>, IdentityError> {
        Ok(UserRepository::new(&self.db).claims_for(&user.id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (UserManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(&temp_dir.path().join("test.redb")).unwrap());
        (UserManager::new(db, PasswordPolicy::default()), temp_dir)
    }

    #[test]
    fn create_hashes_password() {
        let (users, _dir) = manager();
        let user = users.create(" reader@example.com ", "Secr3t!").unwrap();
        assert_eq!(user.email_address, "reader@example.com");
        assert_ne!(user.password_hash, "Secr3t!");
        assert!(users.find_by_email("READER@example.com").unwrap().is_some());
    }

    #[test]
    fn create_rejects_invalid_input() {
        let (users, _dir) = manager();
        assert!(matches!(
            users.create("not-an-email", "Secr3t!"),
            Err(IdentityError::InvalidEmail(_))
        ));
        assert!(matches!(
            users.create("a@example.com", "weak"),
            Err(IdentityError::PasswordPolicy(_))
        ));
    }

    #[test]
    fn create_rejects_duplicate_email() {
        let (users, _dir) = manager();
        users.create("a@example.com", "Secr3t!").unwrap();
        let result = users.create("A@Example.com", "Secr3t!");
        match result {
            Err(IdentityError::DuplicateEmail(email)) => assert_eq!(email, "A@Example.com"),
            other => panic!("expected duplicate email, got {other:?}"),
        }
    }

    #[test]
    fn roles_and_claims() {
        let (users, _dir) = manager();
        let user = users.create("a@example.com", "Secr3t!").unwrap();

        users.add_to_role(&user, "Support").unwrap();
        users.add_to_role(&user, "SubscriptionAdmin").unwrap();
        users.add_to_role(&user, "support").unwrap();
        assert_eq!(users.roles(&user).unwrap(), vec!["SubscriptionAdmin", "Support"]);

        users.add_claim(&user, "department", "marketing").unwrap();
        let claims = users.claims(&user).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_value, "marketing");
    }
}
