// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mailing-list subscription records.
//!
//! One record per normalised email address. Unsubscribing keeps the record
//! so a later subscribe reactivates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::super::database::SUBSCRIPTIONS;
use super::super::{Database, StoreResult};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
}

/// Subscription stored in redb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    /// Normalised (trimmed, lowercase) address
    pub email_address: String,
    pub status: SubscriptionStatus,
    /// When the address most recently subscribed
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// New active subscription for an already-normalised address.
    pub fn new(email_address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email_address: email_address.into(),
            status: SubscriptionStatus::Subscribed,
            subscribed_at: now,
            unsubscribed_at: None,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Subscribed
    }

    pub fn reactivate(&mut self) {
        let now = Utc::now();
        self.status = SubscriptionStatus::Subscribed;
        self.subscribed_at = now;
        self.unsubscribed_at = None;
        self.updated_at = now;
    }

    pub fn deactivate(&mut self) {
        let now = Utc::now();
        self.status = SubscriptionStatus::Unsubscribed;
        self.unsubscribed_at = Some(now);
        self.updated_at = now;
    }
}

/// Repository for subscription records.
pub struct SubscriptionRepository<'a> {
    db: &'a Database,
}

impl<'a> SubscriptionRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Look up a subscription by normalised email.
    pub fn get(&self, email_address: &str) -> StoreResult<Option<Subscription>> {
        self.db.get_json(SUBSCRIPTIONS, email_address)
    }

    /// Insert or replace a subscription.
    pub fn save(&self, subscription: &Subscription) -> StoreResult<()> {
        self.db
            .put_json(SUBSCRIPTIONS, &subscription.email_address, subscription)
    }

    /// List all subscriptions (admin view).
    pub fn list_all(&self) -> StoreResult<Vec<Subscription>> {
        self.db.list_json(SUBSCRIPTIONS)
    }
}
