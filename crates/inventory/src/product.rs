use serde::{Deserialize, Serialize};

use pharmacore_core::{DomainError, DomainResult, Entity, ProductId};

/// Catalog product. Identity and SKU never change once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Advisory reorder threshold; never enforced by the engine.
    pub min_stock: i64,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Command: create a catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub min_stock: i64,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, min_stock: i64) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            min_stock,
        }
    }

    /// Validate and assign a fresh identifier. SKU uniqueness is the store's concern.
    pub fn into_product(self, id: ProductId) -> DomainResult<Product> {
        let sku = self.sku.trim();
        if sku.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if sku.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("sku cannot contain whitespace"));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.min_stock < 0 {
            return Err(DomainError::validation("min_stock cannot be negative"));
        }

        Ok(Product {
            id,
            sku: sku.to_string(),
            name: name.to_string(),
            min_stock: self.min_stock,
        })
    }
}
