//! Product catalogue and inventory view.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::common::{
    decimal, ensure_non_negative, ensure_present, flag_default_true, matches_term, optional_decimal,
    optional_i64, search_term, EntityId, NamedRef,
};
use crate::error::ApiResult;

/// Product as returned by `/api/products`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category: Option<NamedRef>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub unit_id: Option<i64>,
    #[serde(default)]
    pub unit: Option<NamedRef>,
    #[serde(default, deserialize_with = "decimal")]
    pub purchase_price: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub selling_price: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub stock_quantity: Decimal,
    #[serde(default, deserialize_with = "optional_decimal")]
    pub reorder_level: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    /// Image URL or inline data; never exported.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "super::common::default_true", deserialize_with = "flag_default_true")]
    pub is_active: bool,
}

impl Product {
    pub fn category_label(&self) -> Option<&str> {
        self.category
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .or(self.category_name.as_deref())
    }

    pub fn unit_label(&self) -> Option<&str> {
        self.unit.as_ref().and_then(|u| u.name.as_deref())
    }

    /// Stock value at purchase price, capped at the largest `Decimal`.
    pub fn stock_value(&self) -> Decimal {
        self.stock_quantity.saturating_mul(self.purchase_price)
    }
}

/// Stock-level filter on the products page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockFilter {
    #[default]
    All,
    /// Below the low-stock threshold (out-of-stock included)
    Low,
    /// Zero or negative stock
    Out,
    /// Any positive stock
    In,
}

impl StockFilter {
    pub fn matches(&self, stock: Decimal, low_threshold: Decimal) -> bool {
        match self {
            Self::All => true,
            Self::Low => stock < low_threshold,
            Self::Out => stock <= Decimal::ZERO,
            Self::In => stock > Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProductQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub stock_filter: StockFilter,
    #[serde(default)]
    pub category_id: Option<i64>,
}

/// Apply search, stock and category filters. Search matches name, SKU and
/// category name, case-insensitively.
pub fn filter_products(products: Vec<Product>, query: &ProductQuery, low_threshold: i64) -> Vec<Product> {
    let term = search_term(query.search.as_deref());
    let threshold = Decimal::from(low_threshold);

    products
        .into_iter()
        .filter(|p| {
            term.as_deref().map_or(true, |t| {
                matches_term(Some(&p.name), t)
                    || matches_term(p.sku.as_deref(), t)
                    || matches_term(p.category_label(), t)
            })
        })
        .filter(|p| query.stock_filter.matches(p.stock_quantity, threshold))
        .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
        .collect()
}

/// Inventory totals shown above the product table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InventorySummary {
    pub product_count: usize,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
    pub stock_value: Decimal,
}

pub fn inventory_summary(products: &[Product], low_threshold: i64) -> InventorySummary {
    let threshold = Decimal::from(low_threshold);
    InventorySummary {
        product_count: products.len(),
        low_stock_count: products
            .iter()
            .filter(|p| StockFilter::Low.matches(p.stock_quantity, threshold))
            .count(),
        out_of_stock_count: products
            .iter()
            .filter(|p| StockFilter::Out.matches(p.stock_quantity, threshold))
            .count(),
        stock_value: products
            .iter()
            .fold(Decimal::ZERO, |total, p| total.saturating_add(p.stock_value())),
    }
}

/// Create/update payload for a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProductInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<i64>,
    #[serde(default, deserialize_with = "decimal")]
    pub purchase_price: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub selling_price: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub stock_quantity: Decimal,
    #[serde(
        default,
        deserialize_with = "optional_decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub reorder_level: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default = "super::common::default_true", deserialize_with = "flag_default_true")]
    pub is_active: bool,
}

impl ProductInput {
    pub fn validate(&self) -> ApiResult<()> {
        ensure_present("name", &self.name)?;
        ensure_non_negative("purchase_price", self.purchase_price)?;
        ensure_non_negative("selling_price", self.selling_price)?;
        ensure_non_negative("stock_quantity", self.stock_quantity)?;
        if let Some(level) = self.reorder_level {
            ensure_non_negative("reorder_level", level)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn product(id: i64, name: &str, sku: &str, category: &str, stock: i64) -> Product {
        Product {
            id: EntityId::Id(id),
            name: name.to_string(),
            sku: Some(sku.to_string()),
            barcode: None,
            category_id: Some(id % 3),
            category: Some(NamedRef {
                id: Some(id % 3),
                name: Some(category.to_string()),
            }),
            category_name: None,
            unit_id: Some(1),
            unit: Some(NamedRef {
                id: Some(1),
                name: Some("pcs".to_string()),
            }),
            purchase_price: Decimal::new(1000, 2),
            selling_price: Decimal::new(1250, 2),
            stock_quantity: Decimal::from(stock),
            reorder_level: None,
            description: None,
            image: None,
            is_active: true,
        }
    }

    fn catalogue() -> Vec<Product> {
        vec![
            product(1, "Basmati Rice 5kg", "RICE-5", "Grains", 120),
            product(2, "Sunflower Oil 1L", "OIL-1", "Edible Oil", 30),
            product(3, "Red Lentils", "DAL-R", "Grains", 0),
            product(4, "Dish Soap", "SOAP-D", "Household", 49),
        ]
    }

    #[test]
    fn low_stock_filter_keeps_items_under_threshold() {
        let query = ProductQuery {
            stock_filter: StockFilter::Low,
            ..Default::default()
        };
        let ids: Vec<_> = filter_products(catalogue(), &query, 50)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![EntityId::Id(2), EntityId::Id(3), EntityId::Id(4)]);
    }

    #[test]
    fn search_is_case_insensitive_across_name_sku_and_category() {
        let by_name = ProductQuery {
            search: Some("rice".into()),
            ..Default::default()
        };
        assert_eq!(filter_products(catalogue(), &by_name, 50).len(), 1);

        let by_sku = ProductQuery {
            search: Some("soap-d".into()),
            ..Default::default()
        };
        assert_eq!(filter_products(catalogue(), &by_sku, 50)[0].name, "Dish Soap");

        let by_category = ProductQuery {
            search: Some("GRAINS".into()),
            ..Default::default()
        };
        assert_eq!(filter_products(catalogue(), &by_category, 50).len(), 2);
    }

    #[test]
    fn out_and_in_stock_filters_split_on_zero() {
        let out = ProductQuery {
            stock_filter: StockFilter::Out,
            ..Default::default()
        };
        let in_stock = ProductQuery {
            stock_filter: StockFilter::In,
            ..Default::default()
        };
        assert_eq!(filter_products(catalogue(), &out, 50).len(), 1);
        assert_eq!(filter_products(catalogue(), &in_stock, 50).len(), 3);
    }

    #[test]
    fn summary_counts_low_and_out_of_stock() {
        let summary = inventory_summary(&catalogue(), 50);
        assert_eq!(summary.product_count, 4);
        assert_eq!(summary.low_stock_count, 3);
        assert_eq!(summary.out_of_stock_count, 1);
        assert_eq!(summary.stock_value, Decimal::from(1990));
    }

    #[test]
    fn stock_value_is_capped_instead_of_overflowing() {
        let mut products = catalogue();
        products[0].stock_quantity = Decimal::MAX;
        products[0].purchase_price = Decimal::from(2);
        assert_eq!(inventory_summary(&products, 50).stock_value, Decimal::MAX);
    }

    #[test]
    fn backend_payload_with_string_amounts_parses() {
        let json = r#"{
            "id": 9, "name": "Tea 250g", "sku": "TEA-250",
            "category": {"id": 2, "name": "Beverages"},
            "purchase_price": "80.00", "selling_price": "95.50",
            "stock_quantity": "12", "is_active": 1
        }"#;
        let p: Product = serde_json::from_str(json).unwrap();
        assert_eq!(p.category_label(), Some("Beverages"));
        assert_eq!(p.selling_price, Decimal::new(9550, 2));
        assert!(p.is_active);
    }

    #[test]
    fn input_rejects_negative_price() {
        let input = ProductInput {
            name: "Sugar".into(),
            selling_price: Decimal::from(-1),
            is_active: true,
            ..Default::default()
        };
        assert!(input.validate().is_err());
        assert!(ProductInput {
            name: " ".into(),
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
