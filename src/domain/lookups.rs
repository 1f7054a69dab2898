//! Reference data used by the forms: warehouses, categories, suppliers, units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{decimal, ensure_present, flag_default_true, optional_i64};
use crate::error::ApiResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warehouse {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "super::common::default_true", deserialize_with = "flag_default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "decimal")]
    pub current_due: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
}

/// Create payload for any lookup: a required name plus whatever else the
/// form sends, forwarded untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLookup {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewLookup {
    pub fn validate(&self) -> ApiResult<()> {
        ensure_present("name", &self.name)
    }
}

/// Case-insensitive name sort used by every lookup dropdown.
pub fn sort_by_name<T>(items: &mut [T], name: impl Fn(&T) -> &str) {
    items.sort_by_cached_key(|item| name(item).to_lowercase());
}
