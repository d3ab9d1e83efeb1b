// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization
//!
//! Shared OAuth2 / OpenID Connect authorization for the Communications API.
//!
//! ## Auth Flow
//!
//! 1. Clients send `Authorization: Bearer <token>`
//! 2. The service:
//!    - Validates self-issued JWTs (HS256, no `kid`) with the local secret
//!    - Validates other JWTs against keys from the authority's discovery document
//!    - Resolves reference tokens through the introspection endpoint
//!    - Extracts:
//!      - `sub` (or `client_id`) → `user_id`
//!      - role and scope claims
//! 3. Handlers declare the privilege they need with `Authorized<P>`; the
//!    privilege's policy is checked against the role map.
//!
//! ## Metadata
//!
//! - Discovery metadata and signing keys are cached in memory
//! - A background task refreshes them when they expire
//! - A token signed by an unknown key requests an early refresh
//! - Clock skew tolerance is 5 minutes

pub mod claims;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod introspection;
pub mod jwks;
pub mod privileges;
pub mod refresh;
pub mod roles;
pub mod service;
pub mod settings;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{Auth, Authorized, OptionalAuth};
pub use privileges::{
    AuthorizationOptions, AuthorizationPolicy, PolicyBuilder, Privilege, PrivilegeDescriptor,
    Requirement,
};
pub use roles::{FileSystemRoleService, RoleService};
pub use service::{configure_auth_service, AuthService, LocalIssuer};
pub use settings::AuthSettings;
