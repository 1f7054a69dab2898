//! Payments received from retailers, and the receivable/payable position.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{
    checked_add, checked_sub, checked_sum, decimal, optional_i64, parse_date, within_range,
    AmountOverflow, NamedRef,
};
use super::purchases::Purchase;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    #[serde(default, deserialize_with = "optional_i64")]
    pub retailer_id: Option<i64>,
    #[serde(default)]
    pub retailer: Option<NamedRef>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub sale_id: Option<i64>,
    #[serde(default, deserialize_with = "decimal")]
    pub amount: Decimal,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_date: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Payment {
    pub fn date(&self) -> Option<NaiveDate> {
        self.payment_date.as_deref().and_then(parse_date)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaymentQuery {
    #[serde(default)]
    pub retailer_id: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

pub fn filter_payments(payments: Vec<Payment>, query: &PaymentQuery) -> Vec<Payment> {
    let method = query.method.as_deref().map(str::to_lowercase);
    payments
        .into_iter()
        .filter(|p| query.retailer_id.map_or(true, |id| p.retailer_id == Some(id)))
        .filter(|p| {
            method.as_deref().map_or(true, |m| {
                p.payment_method.as_deref().map(str::to_lowercase).as_deref() == Some(m)
            })
        })
        .filter(|p| within_range(p.date(), query.from, query.to))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Bank,
    Cheque,
    Mobile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatePaymentRequest {
    pub retailer_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<i64>,
    #[serde(deserialize_with = "decimal")]
    pub amount: Decimal,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(ApiError::invalid("amount", "Payment amount must be positive"));
        }
        if matches!(self.payment_method, PaymentMethod::Bank | PaymentMethod::Cheque)
            && self.reference.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(ApiError::invalid(
                "reference",
                "A reference is required for bank and cheque payments",
            ));
        }
        Ok(())
    }
}

/// Amount a retailer owes, as returned by `/api/receivables`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receivable {
    #[serde(default, deserialize_with = "optional_i64")]
    pub retailer_id: Option<i64>,
    #[serde(default)]
    pub retailer_name: Option<String>,
    #[serde(default)]
    pub retailer: Option<NamedRef>,
    #[serde(default, deserialize_with = "decimal")]
    pub total_sales: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub total_paid: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub total_due: Decimal,
    #[serde(default)]
    pub last_payment_date: Option<String>,
}

impl Receivable {
    pub fn retailer_label(&self) -> &str {
        self.retailer
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .or(self.retailer_name.as_deref())
            .unwrap_or("")
    }
}

/// Amount owed to one supplier, derived from purchases
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Payable {
    pub supplier_id: Option<i64>,
    pub supplier_name: String,
    pub purchase_count: usize,
    pub total_purchases: Decimal,
    pub total_paid: Decimal,
    pub total_due: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReceivablesView {
    pub receivables: Vec<Receivable>,
    pub payables: Vec<Payable>,
    pub total_receivable: Decimal,
    pub total_payable: Decimal,
    /// Receivable minus payable
    pub net_position: Decimal,
}

/// Sum purchase dues per supplier, largest due first.
pub fn payables_from_purchases(purchases: &[Purchase]) -> Result<Vec<Payable>, AmountOverflow> {
    let mut by_supplier: BTreeMap<Option<i64>, Payable> = BTreeMap::new();
    for p in purchases {
        let entry = by_supplier.entry(p.supplier_id).or_insert_with(|| Payable {
            supplier_id: p.supplier_id,
            supplier_name: p.supplier_label().to_string(),
            purchase_count: 0,
            total_purchases: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            total_due: Decimal::ZERO,
        });
        entry.purchase_count += 1;
        entry.total_purchases = checked_add(entry.total_purchases, p.total_amount)?;
        entry.total_paid = checked_add(entry.total_paid, p.paid_amount)?;
        entry.total_due = checked_add(entry.total_due, p.due_amount())?;
    }

    let mut payables: Vec<Payable> = by_supplier
        .into_values()
        .filter(|p| p.total_due > Decimal::ZERO)
        .collect();
    payables.sort_by(|a, b| b.total_due.cmp(&a.total_due));
    Ok(payables)
}

pub fn receivables_view(
    mut receivables: Vec<Receivable>,
    purchases: &[Purchase],
) -> Result<ReceivablesView, AmountOverflow> {
    receivables.retain(|r| r.total_due > Decimal::ZERO);
    receivables.sort_by(|a, b| b.total_due.cmp(&a.total_due));

    let payables = payables_from_purchases(purchases)?;
    let total_receivable = checked_sum(receivables.iter().map(|r| r.total_due))?;
    let total_payable = checked_sum(payables.iter().map(|p| p.total_due))?;

    Ok(ReceivablesView {
        receivables,
        payables,
        total_receivable,
        total_payable,
        net_position: checked_sub(total_receivable, total_payable)?,
    })
}
