// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Application Layer
//!
//! Commands and queries dispatched through the [`Mediator`]. Handlers
//! validate input, call the subscription service and send confirmation
//! emails. HTTP concerns stay in `api`.

pub mod mediator;
pub mod response;
pub mod subscriptions;
pub mod validation;

pub use mediator::{Handler, Mediator, Request};
pub use response::{CommandResponse, FieldError};
pub use subscriptions::{
    GetSubscriptionByEmailQuery, SubscribeCommand, SubscriptionHandlers, UnsubscribeByTokenCommand,
    UnsubscribeCommand,
};

use crate::auth::Privilege;
use crate::data_protection::DataProtectionError;
use crate::notifications::EmailError;
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("email error: {0}")]
    Email(#[from] EmailError),

    #[error("data protection error: {0}")]
    DataProtection(#[from] DataProtectionError),
}

/// Allows reading subscription records.
pub struct CanViewSubscription;

impl Privilege for CanViewSubscription {
    const NAME: &'static str = "CanViewSubscription";
}
