// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Product catalogue: categories and products.
//!
//! Both entities are auditable. Prices are stored in minor units with two
//! implied decimal places.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::audit::{Auditable, AuditInfo};
use super::super::database::{CATEGORIES, PRODUCTS};
use super::super::{Database, StoreError, StoreResult};

/// Maximum length of product names and category ids.
pub const MAX_NAME_LENGTH: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_id: String,
    pub name: String,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl Category {
    pub fn new(category_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            name: name.into(),
            audit: AuditInfo::default(),
        }
    }
}

impl Auditable for Category {
    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    /// Price in minor units (cents)
    pub unit_price_minor: i64,
    pub category_id: String,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl Product {
    pub fn new(
        product_name: impl Into<String>,
        unit_price_minor: i64,
        category_id: impl Into<String>,
    ) -> Self {
        Self {
            product_id: Uuid::new_v4().to_string(),
            product_name: product_name.into(),
            unit_price_minor,
            category_id: category_id.into(),
            audit: AuditInfo::default(),
        }
    }

    /// Price formatted with two decimal places.
    pub fn unit_price(&self) -> String {
        let sign = if self.unit_price_minor < 0 { "-" } else { "" };
        let abs = self.unit_price_minor.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }

    /// Trim the name and category id in place.
    pub fn normalize(&mut self) {
        self.product_name = self.product_name.trim().to_string();
        self.category_id = self.category_id.trim().to_string();
    }

    /// Column rules: required ASCII name and category id, at most 50
    /// characters each, non-negative price.
    pub fn validate(&self) -> StoreResult<()> {
        let name = self.product_name.as_str();
        if name.is_empty() {
            return Err(StoreError::Invalid("ProductName is required".to_string()));
        }
        if !name.is_ascii() || name.len() > MAX_NAME_LENGTH {
            return Err(StoreError::Invalid(format!(
                "ProductName must be at most {MAX_NAME_LENGTH} ASCII characters"
            )));
        }
        let category = self.category_id.as_str();
        if category.is_empty() {
            return Err(StoreError::Invalid("CategoryId is required".to_string()));
        }
        if category.len() > MAX_NAME_LENGTH {
            return Err(StoreError::Invalid(format!(
                "CategoryId must be at most {MAX_NAME_LENGTH} characters"
            )));
        }
        if self.unit_price_minor < 0 {
            return Err(StoreError::Invalid(
                "UnitPrice must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Auditable for Product {
    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

/// Repository for catalogue data. Writes are stamped with `actor`.
pub struct ProductRepository<'a> {
    db: &'a Database,
}

impl<'a> ProductRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub fn create_category(&self, category: &mut Category, actor: Option<&str>) -> StoreResult<()> {
        category.category_id = category.category_id.trim().to_string();
        if category.category_id.is_empty() {
            return Err(StoreError::Invalid("CategoryId is required".to_string()));
        }
        if self.get_category(&category.category_id)?.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "Category {}",
                category.category_id
            )));
        }
        category.stamp_created(actor, Utc::now());
        self.db
            .put_json(CATEGORIES, &category.category_id, category)
    }

    pub fn get_category(&self, category_id: &str) -> StoreResult<Option<Category>> {
        self.db.get_json(CATEGORIES, category_id)
    }

    pub fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.db.list_json(CATEGORIES)
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Insert a product. The referenced category must exist.
    pub fn create(&self, product: &mut Product, actor: Option<&str>) -> StoreResult<()> {
        product.normalize();
        product.validate()?;
        self.ensure_category(&product.category_id)?;
        if self.get(&product.product_id)?.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "Product {}",
                product.product_id
            )));
        }
        product.stamp_created(actor, Utc::now());
        self.db.put_json(PRODUCTS, &product.product_id, product)
    }

    pub fn get(&self, product_id: &str) -> StoreResult<Option<Product>> {
        self.db.get_json(PRODUCTS, product_id)
    }

    /// Replace a product, keeping its creation stamp.
    pub fn update(&self, product: &mut Product, actor: Option<&str>) -> StoreResult<()> {
        product.normalize();
        product.validate()?;
        self.ensure_category(&product.category_id)?;
        let existing = self
            .get(&product.product_id)?
            .ok_or_else(|| StoreError::NotFound(format!("Product {}", product.product_id)))?;

        product.audit.created = existing.audit.created;
        product.audit.created_by = existing.audit.created_by;
        product.stamp_modified(actor, Utc::now());
        self.db.put_json(PRODUCTS, &product.product_id, product)
    }

    pub fn delete(&self, product_id: &str) -> StoreResult<()> {
        if !self.db.remove(PRODUCTS, product_id)? {
            return Err(StoreError::NotFound(format!("Product {product_id}")));
        }
        Ok(())
    }

    pub fn list_by_category(&self, category_id: &str) -> StoreResult<Vec<Product>> {
        let products: Vec<Product> = self.db.list_json(PRODUCTS)?;
        Ok(products
            .into_iter()
            .filter(|p| p.category_id == category_id)
            .collect())
    }

    fn ensure_category(&self, category_id: &str) -> StoreResult<()> {
        if self.get_category(category_id)?.is_none() {
            return Err(StoreError::Invalid(format!(
                "Category {category_id} does not exist"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("app.redb")).unwrap();
        (db, dir)
    }

    fn seeded(db: &Database) -> ProductRepository<'_> {
        let repo = ProductRepository::new(db);
        repo.create_category(&mut Category::new("newsletters", "Newsletters"), Some("admin"))
            .unwrap();
        repo
    }

    #[test]
    fn create_stamps_audit_fields() {
        let (db, _dir) = temp_db();
        let repo = seeded(&db);
        let mut product = Product::new("Weekly Digest", 1999, "newsletters");
        repo.create(&mut product, Some("user-1")).unwrap();

        let stored = repo.get(&product.product_id).unwrap().unwrap();
        assert_eq!(stored.audit.created_by.as_deref(), Some("user-1"));
        assert!(stored.audit.last_modified.is_none());
        assert_eq!(stored.unit_price(), "19.99");
    }

    #[test]
    fn create_requires_existing_category() {
        let (db, _dir) = temp_db();
        let repo = seeded(&db);
        let mut product = Product::new("Digest", 100, "missing");
        assert!(matches!(
            repo.create(&mut product, None),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn padded_names_are_stored_trimmed() {
        let (db, _dir) = temp_db();
        let repo = seeded(&db);
        let mut product = Product::new(" Weekly Digest ", 100, " newsletters ");
        repo.create(&mut product, None).unwrap();

        let stored = repo.get(&product.product_id).unwrap().unwrap();
        assert_eq!(stored.product_name, "Weekly Digest");
        assert_eq!(stored.category_id, "newsletters");
        assert_eq!(repo.list_by_category("newsletters").unwrap().len(), 1);

        let mut category = Category::new(" newsletters ", "Again");
        assert!(matches!(
            repo.create_category(&mut category, None),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn product_name_rules() {
        let too_long = Product::new("x".repeat(MAX_NAME_LENGTH + 1), 0, "c");
        assert!(too_long.validate().is_err());

        let mut blank = Product::new("  ", 0, "c");
        blank.normalize();
        assert!(blank.validate().is_err());

        let non_ascii = Product::new("Résumé", 0, "c");
        assert!(non_ascii.validate().is_err());

        let negative = Product::new("Ok", -1, "c");
        assert!(negative.validate().is_err());

        assert!(Product::new("Ok", 0, "c").validate().is_ok());
    }

    #[test]
    fn update_keeps_creation_stamp() {
        let (db, _dir) = temp_db();
        let repo = seeded(&db);
        let mut product = Product::new("Digest", 500, "newsletters");
        repo.create(&mut product, Some("creator")).unwrap();

        let mut changed = product.clone();
        changed.unit_price_minor = 750;
        changed.audit = AuditInfo::default();
        repo.update(&mut changed, Some("editor")).unwrap();

        let stored = repo.get(&product.product_id).unwrap().unwrap();
        assert_eq!(stored.unit_price_minor, 750);
        assert_eq!(stored.audit.created_by.as_deref(), Some("creator"));
        assert_eq!(stored.audit.created, product.audit.created);
        assert_eq!(stored.audit.last_modified_by.as_deref(), Some("editor"));
    }

    #[test]
    fn delete_and_list_by_category() {
        let (db, _dir) = temp_db();
        let repo = seeded(&db);
        let mut a = Product::new("A", 1, "newsletters");
        let mut b = Product::new("B", 2, "newsletters");
        repo.create(&mut a, None).unwrap();
        repo.create(&mut b, None).unwrap();
        assert_eq!(repo.list_by_category("newsletters").unwrap().len(), 2);

        repo.delete(&a.product_id).unwrap();
        assert!(matches!(
            repo.delete(&a.product_id),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(repo.list_by_category("newsletters").unwrap().len(), 1);
        assert_eq!(repo.list_categories().unwrap().len(), 1);
    }

    #[test]
    fn unit_price_formats_small_amounts() {
        assert_eq!(Product::new("A", 5, "c").unit_price(), "0.05");
    }
}
