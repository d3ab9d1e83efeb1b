// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Creation and modification stamps for auditable entities.
//!
//! Every write to an auditable entity records who made it and when. The
//! acting user is the authenticated caller's id, or `None` for system writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity that carries [`AuditInfo`].
pub trait Auditable {
    fn audit_mut(&mut self) -> &mut AuditInfo;

    /// Stamp the creation fields. Called once, on insert.
    fn stamp_created(&mut self, actor: Option<&str>, at: DateTime<Utc>) {
        let audit = self.audit_mut();
        audit.created_by = actor.map(str::to_string);
        audit.created = at;
    }

    /// Stamp the modification fields. Called on every update.
    fn stamp_modified(&mut self, actor: Option<&str>, at: DateTime<Utc>) {
        let audit = self.audit_mut();
        audit.last_modified_by = actor.map(str::to_string);
        audit.last_modified = Some(at);
    }
}

/// Audit columns shared by auditable entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    pub created_by: Option<String>,
    pub created: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for AuditInfo {
    fn default() -> Self {
        Self {
            created_by: None,
            created: Utc::now(),
            last_modified_by: None,
            last_modified: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entity {
        audit: AuditInfo,
    }

    impl Auditable for Entity {
        fn audit_mut(&mut self) -> &mut AuditInfo {
            &mut self.audit
        }
    }

    #[test]
    fn stamps_creation_and_modification_independently() {
        let mut entity = Entity {
            audit: AuditInfo::default(),
        };
        let created = Utc::now();
        entity.stamp_created(Some("user-1"), created);
        assert_eq!(entity.audit.created_by.as_deref(), Some("user-1"));
        assert_eq!(entity.audit.created, created);
        assert!(entity.audit.last_modified.is_none());

        let modified = created + chrono::Duration::minutes(5);
        entity.stamp_modified(Some("user-2"), modified);
        assert_eq!(entity.audit.created_by.as_deref(), Some("user-1"));
        assert_eq!(entity.audit.last_modified_by.as_deref(), Some("user-2"));
        assert_eq!(entity.audit.last_modified, Some(modified));
    }

    #[test]
    fn system_writes_have_no_actor() {
        let mut entity = Entity {
            audit: AuditInfo::default(),
        };
        entity.stamp_created(None, Utc::now());
        assert!(entity.audit.created_by.is_none());
    }
}
