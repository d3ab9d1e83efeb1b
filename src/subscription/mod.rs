// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Subscription Service
//!
//! The mailing-list backend behind the subscribe and unsubscribe commands.
//! Handlers depend on the [`SubscriptionService`] trait; the shipped
//! implementation keeps subscriptions in the application database.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::storage::{Database, StoreResult, Subscription, SubscriptionRepository};

/// Canonical form of an email address used as the subscription key.
pub fn normalize_email(email_address: &str) -> String {
    email_address.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub subscription: Subscription,
    /// `true` if the address was added or reactivated by this call
    pub newly_subscribed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed(Subscription),
    AlreadyUnsubscribed(Subscription),
    NotSubscribed,
}

#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Subscribe an address. Subscribing an active address is a no-op.
    async fn subscribe(&self, email_address: &str) -> StoreResult<SubscribeOutcome>;

    async fn unsubscribe(&self, email_address: &str) -> StoreResult<UnsubscribeOutcome>;

    async fn get_subscription(&self, email_address: &str) -> StoreResult<Option<Subscription>>;
}

/// Subscription service backed by the `subscriptions` table.
pub struct StoredSubscriptionService {
    db: Arc<Database>,
    /// Serialises read-modify-write cycles on subscriptions
    write_lock: Mutex<()>,
}

impl StoredSubscriptionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SubscriptionService for StoredSubscriptionService {
    async fn subscribe(&self, email_address: &str) -> StoreResult<SubscribeOutcome> {
        let email_address = normalize_email(email_address);
        let _guard = self.write_lock.lock().await;
        let repo = SubscriptionRepository::new(&self.db);

        let outcome = match repo.get(&email_address)? {
            Some(existing) if existing.is_active() => {
                debug!(subscription_id = %existing.id, "Address already subscribed");
                SubscribeOutcome {
                    subscription: existing,
                    newly_subscribed: false,
                }
            }
            Some(mut existing) => {
                existing.reactivate();
                repo.save(&existing)?;
                info!(subscription_id = %existing.id, "Subscription reactivated");
                SubscribeOutcome {
                    subscription: existing,
                    newly_subscribed: true,
                }
            }
            None => {
                let subscription = Subscription::new(email_address);
                repo.save(&subscription)?;
                info!(subscription_id = %subscription.id, "Subscription created");
                SubscribeOutcome {
                    subscription,
                    newly_subscribed: true,
                }
            }
        };
        Ok(outcome)
    }

    async fn unsubscribe(&self, email_address: &str) -> StoreResult<UnsubscribeOutcome> {
        let email_address = normalize_email(email_address);
        let _guard = self.write_lock.lock().await;
        let repo = SubscriptionRepository::new(&self.db);

        let outcome = match repo.get(&email_address)? {
            Some(mut existing) if existing.is_active() => {
                existing.deactivate();
                repo.save(&existing)?;
                info!(subscription_id = %existing.id, "Subscription cancelled");
                UnsubscribeOutcome::Unsubscribed(existing)
            }
            Some(existing) => UnsubscribeOutcome::AlreadyUnsubscribed(existing),
            None => UnsubscribeOutcome::NotSubscribed,
        };
        Ok(outcome)
    }

    async fn get_subscription(&self, email_address: &str) -> StoreResult<Option<Subscription>> {
        SubscriptionRepository::new(&self.db).get(&normalize_email(email_address))
    }
}
