// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound notifications.

pub mod email;

pub use email::{
    EmailError, EmailMessage, EmailNotification, EmailNotificationService, EmailSettings,
    EmailTemplate, EmailTransportSettings,
};
