use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::common::{
    checked_mul, checked_sum, decimal, ensure_non_negative, matches_term, optional_i64, parse_date, search_term, within_range,
    NamedRef,
};
use super::reconciliation::PaymentStatus;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseItem {
    #[serde(default, deserialize_with = "optional_i64")]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product: Option<NamedRef>,
    #[serde(default, deserialize_with = "decimal")]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub unit_cost: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub total: Decimal,
}

/// Stock purchase from a supplier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: i64,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub supplier_id: Option<i64>,
    #[serde(default)]
    pub supplier: Option<NamedRef>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub warehouse_id: Option<i64>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default, deserialize_with = "decimal")]
    pub total_amount: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub items: Vec<PurchaseItem>,
}

impl Purchase {
    pub fn supplier_label(&self) -> &str {
        self.supplier
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .unwrap_or("")
    }

    /// Amount still owed to the supplier
    pub fn due_amount(&self) -> Decimal {
        self.total_amount.saturating_sub(self.paid_amount).max(Decimal::ZERO)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::classify(self.due_amount(), self.paid_amount, Decimal::ZERO)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.purchase_date.as_deref().and_then(parse_date)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PurchaseQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub supplier_id: Option<i64>,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

pub fn filter_purchases(purchases: Vec<Purchase>, query: &PurchaseQuery) -> Vec<Purchase> {
    let term = search_term(query.search.as_deref());
    purchases
        .into_iter()
        .filter(|p| {
            term.as_deref().map_or(true, |t| {
                matches_term(p.invoice_number.as_deref(), t)
                    || matches_term(Some(p.supplier_label()), t)
            })
        })
        .filter(|p| query.supplier_id.map_or(true, |id| p.supplier_id == Some(id)))
        .filter(|p| query.status.map_or(true, |s| p.payment_status() == s))
        .filter(|p| within_range(p.date(), query.from, query.to))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseLineInput {
    pub product_id: i64,
    #[serde(deserialize_with = "decimal")]
    pub quantity: Decimal,
    #[serde(deserialize_with = "decimal")]
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CreatePurchaseRequest {
    pub supplier_id: i64,
    #[serde(default)]
    pub warehouse_id: Option<i64>,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub items: Vec<PurchaseLineInput>,
    #[serde(default, deserialize_with = "decimal")]
    pub paid_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PurchasePayload {
    pub supplier_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub items: Vec<PurchaseLinePayload>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PurchaseLinePayload {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total: Decimal,
}

impl CreatePurchaseRequest {
    pub fn into_payload(self) -> ApiResult<PurchasePayload> {
        if self.items.is_empty() {
            return Err(ApiError::invalid("items", "A purchase needs at least one item"));
        }
        let mut items = Vec::with_capacity(self.items.len());
        for line in self.items {
            if line.quantity <= Decimal::ZERO {
                return Err(ApiError::invalid("items", "Item quantity must be positive"));
            }
            ensure_non_negative("unit_cost", line.unit_cost)?;
            items.push(PurchaseLinePayload {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                total: checked_mul(line.quantity, line.unit_cost)?,
            });
        }
        let total_amount = checked_sum(items.iter().map(|i| i.total))?;
        ensure_non_negative("paid_amount", self.paid_amount)?;
        if self.paid_amount > total_amount {
            return Err(ApiError::invalid(
                "paid_amount",
                "Paid amount cannot exceed the purchase total",
            ));
        }

        Ok(PurchasePayload {
            supplier_id: self.supplier_id,
            warehouse_id: self.warehouse_id,
            purchase_date: self.purchase_date,
            invoice_number: self.invoice_number,
            items,
            total_amount,
            paid_amount: self.paid_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_totals_lines() {
        let req = CreatePurchaseRequest {
            supplier_id: 2,
            warehouse_id: Some(1),
            purchase_date: None,
            invoice_number: Some("P-100".into()),
            items: vec![
                PurchaseLineInput {
                    product_id: 1,
                    quantity: Decimal::from(20),
                    unit_cost: Decimal::new(4550, 2),
                },
                PurchaseLineInput {
                    product_id: 2,
                    quantity: Decimal::from(5),
                    unit_cost: Decimal::from(100),
                },
            ],
            paid_amount: Decimal::from(1000),
        };
        let payload = req.into_payload().unwrap();
        assert_eq!(payload.total_amount, Decimal::from(1410));
    }

    #[test]
    fn overpayment_is_rejected() {
        let req = CreatePurchaseRequest {
            supplier_id: 2,
            warehouse_id: None,
            purchase_date: None,
            invoice_number: None,
            items: vec![PurchaseLineInput {
                product_id: 1,
                quantity: Decimal::ONE,
                unit_cost: Decimal::from(10),
            }],
            paid_amount: Decimal::from(11),
        };
        assert!(req.into_payload().is_err());
    }

    #[test]
    fn due_never_goes_negative() {
        let p: Purchase = serde_json::from_str(
            r#"{"id": 1, "supplier": {"id": 2, "name": "Acme Foods"},
                "total_amount": "500", "paid_amount": "600"}"#,
        )
        .unwrap();
        assert_eq!(p.due_amount(), Decimal::ZERO);
        assert_eq!(p.payment_status(), PaymentStatus::Paid);
    }
}
