// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password policy and argon2 hashing.

use std::collections::HashSet;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use super::IdentityError;

/// Rules a new password must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub required_length: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
    pub required_unique_chars: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            required_length: 6,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
            required_unique_chars: 1,
        }
    }
}

impl PasswordPolicy {
    /// Check a password, returning every rule it breaks.
    pub fn validate(&self, password: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if password.chars().count() < self.required_length {
            errors.push(format!(
                "Passwords must be at least {} characters.",
                self.required_length
            ));
        }
        if self.require_non_alphanumeric && password.chars().all(char::is_alphanumeric) {
            errors.push("Passwords must have at least one non alphanumeric character.".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Passwords must have at least one digit ('0'-'9').".to_string());
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            errors.push("Passwords must have at least one lowercase ('a'-'z').".to_string());
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            errors.push("Passwords must have at least one uppercase ('A'-'Z').".to_string());
        }
        let unique: HashSet<char> = password.chars().collect();
        if self.required_unique_chars >= 1 && unique.len() < self.required_unique_chars {
            errors.push(format!(
                "Passwords must use at least {} different characters.",
                self.required_unique_chars
            ));
        }

        errors
    }
}

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::PasswordHash(e.to_string()))
}

/// Verify a password against a stored PHC string.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, IdentityError> {
    let parsed =
        PasswordHash::new(password_hash).map_err(|e| IdentityError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes_default_policy() {
        assert!(PasswordPolicy::default().validate("Secr3t!").is_empty());
    }

    #[test]
    fn each_broken_rule_is_reported() {
        let errors = PasswordPolicy::default().validate("abc");
        assert_eq!(
            errors,
            vec![
                "Passwords must be at least 6 characters.",
                "Passwords must have at least one non alphanumeric character.",
                "Passwords must have at least one digit ('0'-'9').",
                "Passwords must have at least one uppercase ('A'-'Z').",
            ]
        );
    }

    #[test]
    fn unique_characters_are_counted() {
        let policy = PasswordPolicy {
            required_unique_chars: 4,
            ..PasswordPolicy::default()
        };
        let errors = policy.validate("Aa1!Aa1!");
        assert!(errors.is_empty());

        let errors = policy.validate("Aa1Aa1Aa1");
        assert!(errors.contains(&"Passwords must use at least 4 different characters.".to_string()));
    }

    #[test]
    fn relaxed_policy_accepts_simple_password() {
        let policy = PasswordPolicy {
            required_length: 4,
            require_digit: false,
            require_lowercase: false,
            require_uppercase: false,
            require_non_alphanumeric: false,
            required_unique_chars: 0,
        };
        assert!(policy.validate("aaaa").is_empty());
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("Secr3t!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Secr3t!", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn corrupt_hash_is_an_error() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(IdentityError::PasswordHash(_))
        ));
    }
}
