// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent application data in a single embedded redb file.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   communications.redb   # subscriptions, identity, catalogue
//!   keys/
//!     data-protection.key # master key for protected route values
//! ```
//!
//! Values are stored as JSON. Repositories borrow the [`Database`] and
//! expose typed CRUD for one aggregate each.

pub mod audit;
pub mod database;
pub mod repository;

pub use audit::{AuditInfo, Auditable};
pub use database::{Database, StoreError, StoreResult};
pub use repository::{
    ApplicationUser, Category, IdentityRole, Product, ProductRepository, Subscription,
    SubscriptionRepository, SubscriptionStatus, UserClaim, UserRepository,
};

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "communications.redb";
