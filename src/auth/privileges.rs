// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privileges and the authorization policies derived from them.
//!
//! Each privilege type becomes a named policy. By default that policy
//! requires an authenticated caller whose roles grant the privilege; a
//! privilege can add requirements of its own through `configure_policy`.
//!
//! ```rust,ignore
//! pub struct CanViewSubscription;
//!
//! impl Privilege for CanViewSubscription {
//!     const NAME: &'static str = "CanViewSubscription";
//! }
//!
//! let privileges = [PrivilegeDescriptor::of::<CanViewSubscription>()];
//! ```

use std::collections::HashMap;

use super::claims::AuthenticatedUser;
use super::roles::RoleService;

/// A named capability granted to roles through the role map.
pub trait Privilege: Send + Sync + 'static {
    /// Policy and privilege name.
    const NAME: &'static str;

    /// Add requirements beyond the default role-map check.
    fn configure_policy(policy: PolicyBuilder) -> PolicyBuilder {
        policy
    }
}

/// Type-erased handle to a [`Privilege`], used to register its policy.
#[derive(Clone, Copy)]
pub struct PrivilegeDescriptor {
    name: &'static str,
    configure: fn(PolicyBuilder) -> PolicyBuilder,
}

impl PrivilegeDescriptor {
    pub fn of<P: Privilege>() -> Self {
        Self {
            name: P::NAME,
            configure: P::configure_policy,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The policy for this privilege: authenticated, granted by role, plus
    /// whatever the privilege adds.
    pub fn policy(&self) -> AuthorizationPolicy {
        let builder = PolicyBuilder::new()
            .require_authenticated_user()
            .require_privilege(self.name);
        (self.configure)(builder).build()
    }
}

impl std::fmt::Debug for PrivilegeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// A single condition a caller must meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    AuthenticatedUser,
    /// Claim must be present; if `allowed_values` is non-empty one of its
    /// values must be listed
    Claim {
        claim_type: String,
        allowed_values: Vec<String>,
    },
    /// Role map must grant the privilege to one of the caller's roles
    Privilege(String),
    Scope(String),
    /// Caller must hold one of the roles
    Role(Vec<String>),
}

impl Requirement {
    fn is_met(&self, user: &AuthenticatedUser, roles: &dyn RoleService) -> bool {
        match self {
            Requirement::AuthenticatedUser => !user.user_id.is_empty(),
            Requirement::Claim {
                claim_type,
                allowed_values,
            } => {
                let values = user.claim_values(claim_type);
                if allowed_values.is_empty() {
                    !values.is_empty()
                } else {
                    values.iter().any(|v| allowed_values.contains(v))
                }
            }
            Requirement::Privilege(privilege) => roles.has_privilege(&user.roles, privilege),
            Requirement::Scope(scope) => user.has_scope(scope),
            Requirement::Role(allowed) => allowed.iter().any(|role| user.has_role(role)),
        }
    }
}

/// A set of requirements that must all hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    requirements: Vec<Requirement>,
}

impl AuthorizationPolicy {
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn evaluate(&self, user: &AuthenticatedUser, roles: &dyn RoleService) -> bool {
        self.requirements.iter().all(|r| r.is_met(user, roles))
    }
}

/// Fluent builder for [`AuthorizationPolicy`].
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    requirements: Vec<Requirement>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_authenticated_user(self) -> Self {
        self.require(Requirement::AuthenticatedUser)
    }

    pub fn require_claim<I, V>(self, claim_type: impl Into<String>, allowed_values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.require(Requirement::Claim {
            claim_type: claim_type.into(),
            allowed_values: allowed_values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn require_privilege(self, privilege: impl Into<String>) -> Self {
        self.require(Requirement::Privilege(privilege.into()))
    }

    pub fn require_scope(self, scope: impl Into<String>) -> Self {
        self.require(Requirement::Scope(scope.into()))
    }

    pub fn require_role<I, V>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.require(Requirement::Role(roles.into_iter().map(Into::into).collect()))
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        if !self.requirements.contains(&requirement) {
            self.requirements.push(requirement);
        }
        self
    }

    pub fn build(self) -> AuthorizationPolicy {
        AuthorizationPolicy {
            requirements: self.requirements,
        }
    }
}

/// Named policies available to the API.
#[derive(Debug, Default)]
pub struct AuthorizationOptions {
    policies: HashMap<String, AuthorizationPolicy>,
}

impl AuthorizationOptions {
    /// Register (or replace) a named policy.
    pub fn add_policy<F>(&mut self, name: impl Into<String>, configure: F)
    where
        F: FnOnce(PolicyBuilder) -> PolicyBuilder,
    {
        let policy = configure(PolicyBuilder::new()).build();
        self.policies.insert(name.into(), policy);
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, policy: AuthorizationPolicy) {
        self.policies.insert(name.into(), policy);
    }

    pub fn get_policy(&self, name: &str) -> Option<&AuthorizationPolicy> {
        self.policies.get(name)
    }

    pub fn policy_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::FileSystemRoleService;
    use serde_json::json;

    struct CanViewSubscription;

    impl Privilege for CanViewSubscription {
        const NAME: &'static str = "CanViewSubscription";
    }

    struct CanExportSubscriptions;

    impl Privilege for CanExportSubscriptions {
        const NAME: &'static str = "CanExportSubscriptions";

        fn configure_policy(policy: PolicyBuilder) -> PolicyBuilder {
            policy.require_scope("communications.export")
        }
    }

    fn roles() -> FileSystemRoleService {
        FileSystemRoleService::from_json(
            r#"{"Admin": ["CanViewSubscription", "CanExportSubscriptions"]}"#,
        )
        .unwrap()
    }

    fn user(claims: serde_json::Value) -> AuthenticatedUser {
        AuthenticatedUser::from_claims(claims.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn default_policy_requires_authentication_and_privilege() {
        let policy = PrivilegeDescriptor::of::<CanViewSubscription>().policy();
        assert_eq!(
            policy.requirements(),
            &[
                Requirement::AuthenticatedUser,
                Requirement::Privilege("CanViewSubscription".into())
            ]
        );

        let roles = roles();
        assert!(policy.evaluate(&user(json!({"sub": "a", "role": "admin"})), &roles));
        assert!(!policy.evaluate(&user(json!({"sub": "b", "role": "guest"})), &roles));
    }

    #[test]
    fn privilege_can_extend_its_policy() {
        let policy = PrivilegeDescriptor::of::<CanExportSubscriptions>().policy();
        let roles = roles();

        let without_scope = user(json!({"sub": "a", "role": "Admin"}));
        assert!(!policy.evaluate(&without_scope, &roles));

        let with_scope = user(json!({
            "sub": "a",
            "role": "Admin",
            "scope": "communications.export"
        }));
        assert!(policy.evaluate(&with_scope, &roles));
    }

    #[test]
    fn claim_requirement_with_allowed_values() {
        let mut options = AuthorizationOptions::default();
        options.add_policy("ClientIdPolicy", |p| {
            p.require_claim("client_id", ["movieClient", "movies_mvc_client"])
        });
        let policy = options.get_policy("ClientIdPolicy").unwrap();
        let roles = roles();

        assert!(policy.evaluate(&user(json!({"client_id": "movieClient"})), &roles));
        assert!(!policy.evaluate(&user(json!({"client_id": "other"})), &roles));
        assert!(!policy.evaluate(&user(json!({"sub": "no-client"})), &roles));
    }

    #[test]
    fn claim_requirement_without_values_checks_presence() {
        let policy = PolicyBuilder::new()
            .require_claim("department", Vec::<String>::new())
            .build();
        let roles = roles();
        assert!(policy.evaluate(&user(json!({"sub": "a", "department": "x"})), &roles));
        assert!(!policy.evaluate(&user(json!({"sub": "a"})), &roles));
    }

    #[test]
    fn role_requirement_matches_any_listed_role() {
        let policy = PolicyBuilder::new().require_role(["Support", "Admin"]).build();
        let roles = roles();
        assert!(policy.evaluate(&user(json!({"sub": "a", "role": "support"})), &roles));
        assert!(!policy.evaluate(&user(json!({"sub": "a", "role": "guest"})), &roles));
    }

    #[test]
    fn duplicate_requirements_are_collapsed() {
        let policy = PolicyBuilder::new()
            .require_authenticated_user()
            .require_authenticated_user()
            .build();
        assert_eq!(policy.requirements().len(), 1);
    }

    #[test]
    fn policy_names_are_sorted() {
        let mut options = AuthorizationOptions::default();
        options.add_policy("b", |p| p);
        options.add_policy("a", |p| p);
        assert_eq!(options.policy_names(), vec!["a", "b"]);
    }
}
