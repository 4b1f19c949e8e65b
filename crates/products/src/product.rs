use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aggregator_core::{DomainError, DomainResult, Entity, ExternalProductId, ProductId};

/// Request to create a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Full replacement of the user-editable product fields.
///
/// An absent `description` clears the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn validate_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name must not be empty"));
    }
    Ok(())
}

/// A locally owned product.
///
/// `external_id` is set once the product has been registered with the upstream
/// offers service. Products without it are local-only and never synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub external_id: Option<ExternalProductId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(
        id: ProductId,
        new: NewProduct,
        external_id: Option<ExternalProductId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_name(&new.name)?;
        Ok(Self {
            id,
            name: new.name,
            description: new.description,
            external_id,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_registered(&self) -> bool {
        self.external_id.is_some()
    }

    /// Replace name and description. The external reference is not user-editable.
    pub fn apply_update(&mut self, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        validate_name(&update.name)?;
        self.name = update.name;
        self.description = update.description;
        self.updated_at = now;
        Ok(())
    }
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)
    }
}

impl ProductUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product(name: &str, description: Option<&str>) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn create_sets_both_timestamps() {
        let now = Utc::now();
        let product = Product::create(ProductId::new(), new_product("Widget", None), None, now).unwrap();
        assert_eq!(product.created_at, now);
        assert_eq!(product.updated_at, now);
        assert!(!product.is_registered());
    }

    #[test]
    fn create_rejects_blank_name() {
        let err = Product::create(ProductId::new(), new_product("   ", None), None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_replaces_and_clears_description() {
        let created = Utc::now();
        let mut product = Product::create(
            ProductId::new(),
            new_product("old", Some("something old")),
            None,
            created,
        )
        .unwrap();

        let later = created + chrono::Duration::seconds(5);
        product
            .apply_update(
                ProductUpdate {
                    name: "new".to_string(),
                    description: None,
                },
                later,
            )
            .unwrap();

        assert_eq!(product.name, "new");
        assert_eq!(product.description, None);
        assert_eq!(product.created_at, created);
        assert_eq!(product.updated_at, later);
    }

    #[test]
    fn update_keeps_external_reference() {
        let external = ExternalProductId::from_uuid(uuid::Uuid::new_v4());
        let mut product =
            Product::create(ProductId::new(), new_product("A", None), Some(external), Utc::now()).unwrap();
        product
            .apply_update(
                ProductUpdate {
                    name: "B".to_string(),
                    description: Some("d".to_string()),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(product.external_id, Some(external));
    }

    #[test]
    fn rejected_update_leaves_product_untouched() {
        let mut product = Product::create(ProductId::new(), new_product("A", None), None, Utc::now()).unwrap();
        let before = product.clone();
        let err = product
            .apply_update(
                ProductUpdate {
                    name: String::new(),
                    description: None,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(product, before);
    }
}
