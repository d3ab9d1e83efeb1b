// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password sign-in with account lockout.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::password::verify_password;
use super::users::UserManager;
use super::IdentityError;
use crate::storage::ApplicationUser;

pub const INVALID_LOGIN_ATTEMPT: &str = "Invalid Login Attempt.";
pub const ACCOUNT_LOCKED: &str = "Account Locked, too many invalid login attempts.";

/// Upper bound on a lockout, in days.
pub const MAX_LOCKOUT_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutOptions {
    /// Failures before the account is locked
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutOptions {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::days(1),
        }
    }
}

/// Outcome of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInResult {
    Succeeded(ApplicationUser),
    LockedOut,
    Failed,
}

impl SignInResult {
    /// Message shown to the caller for a failed attempt.
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            SignInResult::Succeeded(_) => None,
            SignInResult::LockedOut => Some(ACCOUNT_LOCKED),
            SignInResult::Failed => Some(INVALID_LOGIN_ATTEMPT),
        }
    }
}

pub struct SignInManager {
    users: Arc<UserManager>,
    lockout: LockoutOptions,
}

impl SignInManager {
    pub fn new(users: Arc<UserManager>, lockout: LockoutOptions) -> Self {
        Self { users, lockout }
    }

    /// Check a username (email) and password.
    ///
    /// With `lockout_on_failure`, each wrong password counts towards the
    /// lockout threshold. The lockout state is re-read and written in one
    /// transaction after the password check, so parallel attempts are all
    /// counted.
    pub fn password_sign_in(
        &self,
        username: &str,
        password: &str,
        lockout_on_failure: bool,
    ) -> Result<SignInResult, IdentityError> {
        let Some(user) = self.users.find_by_email(username)? else {
            return Ok(SignInResult::Failed);
        };

        if user.is_locked_out(Utc::now()) {
            warn!(user_id = %user.id, "Sign-in attempt on locked account");
            return Ok(SignInResult::LockedOut);
        }

        if verify_password(password, &user.password_hash)? {
            return self.record_success(&user.id);
        }

        if !(lockout_on_failure && user.lockout_enabled) {
            return Ok(SignInResult::Failed);
        }
        self.record_failure(&user.id)
    }

    fn record_success(&self, user_id: &str) -> Result<SignInResult, IdentityError> {
        let result = self.users.update_with(user_id, |user| {
            if user.is_locked_out(Utc::now()) {
                return SignInResult::LockedOut;
            }
            user.access_failed_count = 0;
            user.lockout_end = None;
            SignInResult::Succeeded(user.clone())
        })?;

        match &result {
            SignInResult::Succeeded(user) => info!(user_id = %user.id, "User signed in"),
            _ => warn!(user_id, "Account locked while signing in"),
        }
        Ok(result)
    }

    fn record_failure(&self, user_id: &str) -> Result<SignInResult, IdentityError> {
        let max_failed_attempts = self.lockout.max_failed_attempts;
        let lockout_duration = self
            .lockout
            .lockout_duration
            .min(Duration::days(MAX_LOCKOUT_DAYS));

        let (result, locked_until) = self.users.update_with(user_id, |user| {
            let now = Utc::now();
            if user.is_locked_out(now) {
                return (SignInResult::LockedOut, None);
            }
            user.access_failed_count += 1;
            if user.access_failed_count < max_failed_attempts {
                return (SignInResult::Failed, None);
            }
            let end = now + lockout_duration;
            user.lockout_end = Some(end);
            user.access_failed_count = 0;
            (SignInResult::LockedOut, Some(end))
        })?;

        if let Some(until) = locked_until {
            warn!(
                user_id,
                until = %until,
                "Account locked after repeated failed sign-ins"
            );
        }
        Ok(result)
    }
}
