// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Communications Service - mailing-list subscriptions with templated email
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `application` - Commands, queries and their handlers
//! - `auth` - OpenID Connect / JWT authentication and privilege policies
//! - `identity` - Local accounts, password sign-in and token issuance
//! - `notifications` - Templated email over SMTP or a pickup directory
//! - `rate_limit` - Per-client IP rate limiting middleware
//! - `storage` - Embedded redb persistence

pub mod api;
pub mod application;
pub mod auth;
pub mod cache;
pub mod config;
pub mod data_protection;
pub mod error;
pub mod github;
pub mod identity;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod rate_limit;
pub mod state;
pub mod storage;
pub mod subscription;
