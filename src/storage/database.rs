// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded application database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `subscriptions`: normalised email → serialized Subscription
//! - `users`: user_id → serialized ApplicationUser
//! - `user_email_index`: normalised email → user_id
//! - `roles`: role_id → serialized IdentityRole
//! - `role_name_index`: normalised role name → role_id
//! - `user_roles`: composite key (user_id|role_id) → role_id
//! - `user_claims`: composite key (user_id|claim_id) → serialized UserClaim
//! - `categories`: category_id → serialized Category
//! - `products`: product_id → serialized Product

use std::path::Path;

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// Table keyed by string with JSON-encoded values.
pub(crate) type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Table keyed by string with string values (indexes and link tables).
pub(crate) type IndexTable = TableDefinition<'static, &'static str, &'static str>;

pub(crate) const SUBSCRIPTIONS: JsonTable = TableDefinition::new("subscriptions");
pub(crate) const USERS: JsonTable = TableDefinition::new("users");
pub(crate) const USER_EMAIL_INDEX: IndexTable = TableDefinition::new("user_email_index");
pub(crate) const ROLES: JsonTable = TableDefinition::new("roles");
pub(crate) const ROLE_NAME_INDEX: IndexTable = TableDefinition::new("role_name_index");
pub(crate) const USER_ROLES: IndexTable = TableDefinition::new("user_roles");
pub(crate) const USER_CLAIMS: JsonTable = TableDefinition::new("user_claims");
pub(crate) const CATEGORIES: JsonTable = TableDefinition::new("categories");
pub(crate) const PRODUCTS: JsonTable = TableDefinition::new("products");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid entity: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Composite Key Helpers
// =============================================================================

/// Build a composite key `owner|child` for link tables.
pub(crate) fn composite_key(owner: &str, child: &str) -> String {
    format!("{owner}|{child}")
}

/// Prefix covering every composite key owned by `owner`.
pub(crate) fn owner_prefix(owner: &str) -> String {
    format!("{owner}|")
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID application database.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in [SUBSCRIPTIONS, USERS, ROLES, USER_CLAIMS, CATEGORIES, PRODUCTS] {
                let _ = write_txn.open_table(table)?;
            }
            for table in [USER_EMAIL_INDEX, ROLE_NAME_INDEX, USER_ROLES] {
                let _ = write_txn.open_table(table)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Verify the database answers read transactions.
    pub fn health_check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SUBSCRIPTIONS)?;
        Ok(())
    }

    pub(crate) fn redb(&self) -> &redb::Database {
        &self.db
    }

    // =========================================================================
    // JSON helpers
    // =========================================================================

    /// Read and deserialize a single value.
    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a single value, replacing any previous one.
    pub(crate) fn put_json<T: Serialize>(
        &self,
        table: JsonTable,
        key: &str,
        value: &T,
    ) -> StoreResult<()> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a value. Returns whether it existed.
    pub(crate) fn remove(&self, table: JsonTable, key: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(table)?;
            let removed = table.remove(key)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Deserialize every value in a table.
    pub(crate) fn list_json<T: DeserializeOwned>(&self, table: JsonTable) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut items = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    /// Deserialize every value whose key starts with `prefix`.
    pub(crate) fn list_json_with_prefix<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        prefix: &str,
    ) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut items = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix) {
                break;
            }
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    /// Read a single index entry.
    pub(crate) fn get_index(&self, table: IndexTable, key: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        Ok(table.get(key)?.map(|value| value.value().to_string()))
    }

    /// Index values whose key starts with `prefix`.
    pub(crate) fn list_index_with_prefix(
        &self,
        table: IndexTable,
        prefix: &str,
    ) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut items = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix) {
                break;
            }
            items.push(value.value().to_string());
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("nested").join("app.redb")).unwrap();
        (db, dir)
    }

    fn item(name: &str) -> Item {
        Item {
            name: name.to_string(),
        }
    }

    #[test]
    fn open_creates_parent_directories_and_tables() {
        let (db, dir) = temp_db();
        assert!(dir.path().join("nested").join("app.redb").exists());
        db.health_check().unwrap();
    }

    #[test]
    fn put_get_and_remove_json() {
        let (db, _dir) = temp_db();
        db.put_json(CATEGORIES, "c1", &item("books")).unwrap();

        let loaded: Option<Item> = db.get_json(CATEGORIES, "c1").unwrap();
        assert_eq!(loaded, Some(item("books")));

        assert!(db.remove(CATEGORIES, "c1").unwrap());
        assert!(!db.remove(CATEGORIES, "c1").unwrap());
        let loaded: Option<Item> = db.get_json(CATEGORIES, "c1").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn prefix_listing_stops_at_other_owners() {
        let (db, _dir) = temp_db();
        db.put_json(USER_CLAIMS, &composite_key("user-a", "1"), &item("a1"))
            .unwrap();
        db.put_json(USER_CLAIMS, &composite_key("user-a", "2"), &item("a2"))
            .unwrap();
        db.put_json(USER_CLAIMS, &composite_key("user-ab", "1"), &item("ab1"))
            .unwrap();
        db.put_json(USER_CLAIMS, &composite_key("user-b", "1"), &item("b1"))
            .unwrap();

        let items: Vec<Item> = db
            .list_json_with_prefix(USER_CLAIMS, &owner_prefix("user-a"))
            .unwrap();
        assert_eq!(items, vec![item("a1"), item("a2")]);
    }

    #[test]
    fn list_json_returns_all_values() {
        let (db, _dir) = temp_db();
        db.put_json(PRODUCTS, "p1", &item("one")).unwrap();
        db.put_json(PRODUCTS, "p2", &item("two")).unwrap();

        let items: Vec<Item> = db.list_json(PRODUCTS).unwrap();
        assert_eq!(items.len(), 2);
    }
}
