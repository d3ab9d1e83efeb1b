// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the application database.

pub mod products;
pub mod subscriptions;
pub mod users;

pub use products::{Category, Product, ProductRepository};
pub use subscriptions::{Subscription, SubscriptionRepository, SubscriptionStatus};
pub use users::{ApplicationUser, IdentityRole, UserClaim, UserRepository};
