// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;

use crate::application::{Mediator, SubscriptionHandlers};
use crate::auth::AuthService;
use crate::config::Environment;
use crate::identity::{JwtTokenManager, SignInManager, UserManager};
use crate::rate_limit::IpRateLimiter;
use crate::storage::Database;

#[derive(Clone)]
pub struct AppState {
    pub environment: Environment,
    pub cors_origins: Vec<String>,
    pub db: Arc<Database>,
    pub auth: Arc<AuthService>,
    pub mediator: Arc<Mediator<SubscriptionHandlers>>,
    pub users: Arc<UserManager>,
    pub sign_in: Arc<SignInManager>,
    /// `None` when no local issuer is configured
    pub tokens: Option<Arc<JwtTokenManager>>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<IpRateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limiter.clone()
    }
}
