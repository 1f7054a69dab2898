use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::common::{
    decimal, ensure_non_negative, ensure_present, flag_default_true, matches_term, optional_i64,
    search_term, EntityId, NamedRef,
};
use crate::error::ApiResult;

/// Retailer (shop) the business delivers to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Retailer {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub route_id: Option<i64>,
    #[serde(default)]
    pub route: Option<NamedRef>,
    #[serde(default, deserialize_with = "decimal")]
    pub credit_limit: Decimal,
    /// Outstanding balance owed to the business
    #[serde(default, deserialize_with = "decimal")]
    pub current_due: Decimal,
    #[serde(default = "super::common::default_true", deserialize_with = "flag_default_true")]
    pub is_active: bool,
}

impl Retailer {
    pub fn over_credit_limit(&self) -> bool {
        self.credit_limit > Decimal::ZERO && self.current_due > self.credit_limit
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RetailerQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub route_id: Option<i64>,
    /// Only retailers with an outstanding balance
    #[serde(default)]
    pub with_due: Option<bool>,
}

pub fn filter_retailers(retailers: Vec<Retailer>, query: &RetailerQuery) -> Vec<Retailer> {
    let term = search_term(query.search.as_deref());
    let area = search_term(query.area.as_deref());

    retailers
        .into_iter()
        .filter(|r| {
            term.as_deref().map_or(true, |t| {
                matches_term(Some(&r.name), t)
                    || matches_term(r.owner_name.as_deref(), t)
                    || matches_term(r.phone.as_deref(), t)
                    || matches_term(r.address.as_deref(), t)
            })
        })
        .filter(|r| {
            area.as_deref()
                .map_or(true, |a| r.area.as_deref().map(str::to_lowercase).as_deref() == Some(a))
        })
        .filter(|r| query.route_id.map_or(true, |id| r.route_id == Some(id)))
        .filter(|r| !query.with_due.unwrap_or(false) || r.current_due > Decimal::ZERO)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RetailerInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<i64>,
    #[serde(default, deserialize_with = "decimal")]
    pub credit_limit: Decimal,
    #[serde(default = "super::common::default_true", deserialize_with = "flag_default_true")]
    pub is_active: bool,
}

impl RetailerInput {
    pub fn validate(&self) -> ApiResult<()> {
        ensure_present("name", &self.name)?;
        ensure_non_negative("credit_limit", self.credit_limit)?;
        if let Some(phone) = self.phone.as_deref() {
            let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
            if !phone.trim().is_empty() && digits < 6 {
                return Err(crate::error::ApiError::invalid(
                    "phone",
                    "The phone number is too short",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retailer(id: i64, name: &str, owner: &str, phone: &str, area: &str, due: i64) -> Retailer {
        Retailer {
            id: EntityId::Id(id),
            name: name.into(),
            owner_name: Some(owner.into()),
            phone: Some(phone.into()),
            email: None,
            address: Some(format!("{} market road", area)),
            area: Some(area.into()),
            route_id: Some(id % 2),
            route: None,
            credit_limit: Decimal::from(5000),
            current_due: Decimal::from(due),
            is_active: true,
        }
    }

    fn shops() -> Vec<Retailer> {
        vec![
            retailer(1, "Rahman Store", "Abdur Rahman", "01711000001", "Mirpur", 0),
            retailer(2, "City Mart", "Karim", "01811000002", "Uttara", 1500),
            retailer(3, "New Bazar", "Salma", "01911000003", "Mirpur", 7000),
        ]
    }

    #[test]
    fn search_covers_owner_phone_and_address() {
        let q = |s: &str| RetailerQuery {
            search: Some(s.into()),
            ..Default::default()
        };
        assert_eq!(filter_retailers(shops(), &q("karim"))[0].name, "City Mart");
        assert_eq!(filter_retailers(shops(), &q("0191"))[0].name, "New Bazar");
        assert_eq!(filter_retailers(shops(), &q("MIRPUR")).len(), 2);
    }

    #[test]
    fn area_and_due_filters_combine() {
        let query = RetailerQuery {
            area: Some("mirpur".into()),
            with_due: Some(true),
            ..Default::default()
        };
        let result = filter_retailers(shops(), &query);
        assert_eq!(result.len(), 1);
        assert!(result[0].over_credit_limit());
    }

    #[test]
    fn short_phone_is_rejected() {
        let input = RetailerInput {
            name: "Corner Shop".into(),
            phone: Some("123".into()),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }
}
