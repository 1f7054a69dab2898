//! Sales, sale line items and sale returns.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::common::{
    checked_add, checked_sum, decimal, ensure_non_negative, matches_term, optional_i64,
    parse_date, search_term, within_range, NamedRef,
};
use super::reconciliation::{compute_return_amount, line_total_after_discount, PaymentStatus};
use crate::error::{ApiError, ApiResult};

/// Sale line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleItem {
    #[serde(default, deserialize_with = "optional_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product: Option<NamedRef>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "decimal")]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub unit_price: Decimal,
    /// Discount in percent of the line subtotal
    #[serde(default, deserialize_with = "decimal")]
    pub discount: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub total: Decimal,
}

impl SaleItem {
    pub fn product_label(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .or(self.product_name.as_deref())
            .unwrap_or("")
    }
}

/// Sale (invoice) as returned by `/api/sales`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: i64,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub retailer_id: Option<i64>,
    #[serde(default)]
    pub retailer: Option<NamedRef>,
    #[serde(default)]
    pub retailer_name: Option<String>,
    #[serde(default)]
    pub sale_date: Option<String>,
    #[serde(default, deserialize_with = "decimal")]
    pub total_amount: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<SaleItem>,
}

impl Sale {
    pub fn retailer_label(&self) -> &str {
        self.retailer
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .or(self.retailer_name.as_deref())
            .unwrap_or("")
    }

    pub fn invoice_label(&self) -> String {
        self.invoice_number
            .clone()
            .unwrap_or_else(|| format!("#{}", self.id))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.sale_date.as_deref().and_then(parse_date)
    }

    pub fn due_amount(&self) -> Decimal {
        self.total_amount.saturating_sub(self.paid_amount)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::classify(self.due_amount(), self.paid_amount, Decimal::ZERO)
    }

    pub fn item(&self, item_id: i64) -> Option<&SaleItem> {
        self.items.iter().find(|i| i.id == Some(item_id))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SaleQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub retailer_id: Option<i64>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

/// Search matches invoice number and retailer name.
pub fn filter_sales(sales: Vec<Sale>, query: &SaleQuery) -> Vec<Sale> {
    let term = search_term(query.search.as_deref());

    sales
        .into_iter()
        .filter(|s| {
            term.as_deref().map_or(true, |t| {
                matches_term(s.invoice_number.as_deref(), t)
                    || matches_term(Some(s.retailer_label()), t)
            })
        })
        .filter(|s| query.status.map_or(true, |st| s.payment_status() == st))
        .filter(|s| query.retailer_id.map_or(true, |id| s.retailer_id == Some(id)))
        .filter(|s| within_range(s.date(), query.from, query.to))
        .collect()
}

/// Line of a new sale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLineInput {
    pub product_id: i64,
    #[serde(deserialize_with = "decimal")]
    pub quantity: Decimal,
    #[serde(deserialize_with = "decimal")]
    pub unit_price: Decimal,
    #[serde(default, deserialize_with = "decimal")]
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateSaleRequest {
    pub retailer_id: i64,
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    #[serde(default)]
    pub warehouse_id: Option<i64>,
    pub items: Vec<SaleLineInput>,
    #[serde(default, deserialize_with = "decimal")]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Payload forwarded to the backend with computed line and invoice totals
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalePayload {
    pub retailer_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<i64>,
    pub items: Vec<SaleLinePayload>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaleLinePayload {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl CreateSaleRequest {
    pub fn into_payload(self) -> ApiResult<SalePayload> {
        if self.items.is_empty() {
            return Err(ApiError::invalid("items", "A sale needs at least one item"));
        }

        let mut items = Vec::with_capacity(self.items.len());
        for line in &self.items {
            if line.quantity <= Decimal::ZERO {
                return Err(ApiError::invalid("items", "Item quantity must be positive"));
            }
            ensure_non_negative("unit_price", line.unit_price)?;
            if line.discount < Decimal::ZERO || line.discount > Decimal::ONE_HUNDRED {
                return Err(ApiError::invalid(
                    "discount",
                    "Discount must be between 0 and 100 percent",
                ));
            }
            items.push(SaleLinePayload {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                total: line_total_after_discount(line.unit_price, line.quantity, line.discount)?,
            });
        }

        let total_amount = checked_sum(items.iter().map(|i| i.total))?;
        ensure_non_negative("paid_amount", self.paid_amount)?;
        if self.paid_amount > total_amount {
            return Err(ApiError::invalid(
                "paid_amount",
                "Paid amount cannot exceed the sale total",
            ));
        }

        Ok(SalePayload {
            retailer_id: self.retailer_id,
            sale_date: self.sale_date,
            warehouse_id: self.warehouse_id,
            items,
            total_amount,
            paid_amount: self.paid_amount,
            notes: self.notes,
        })
    }
}

/// Return of goods against an existing sale
#[derive(Debug, Clone, Deserialize)]
pub struct SaleReturnRequest {
    pub items: Vec<SaleReturnLine>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaleReturnLine {
    pub sale_item_id: i64,
    #[serde(deserialize_with = "decimal")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaleReturnPayload {
    pub items: Vec<SaleReturnLinePayload>,
    pub total_return_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaleReturnLinePayload {
    pub sale_item_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    pub quantity: Decimal,
    pub return_amount: Decimal,
}

impl SaleReturnRequest {
    /// Check the return against the sale and price it at the discounted unit price.
    pub fn price_against(self, sale: &Sale) -> ApiResult<SaleReturnPayload> {
        let mut requested: HashMap<i64, Decimal> = HashMap::new();
        for line in &self.items {
            if line.quantity < Decimal::ZERO {
                return Err(ApiError::invalid("items", "Return quantity cannot be negative"));
            }
            let total = requested.entry(line.sale_item_id).or_default();
            *total = checked_add(*total, line.quantity)?;
        }

        let mut items = Vec::new();
        for (item_id, quantity) in requested {
            if quantity.is_zero() {
                continue;
            }
            let item = sale.item(item_id).ok_or_else(|| {
                ApiError::invalid("items", format!("Item {} is not part of this sale", item_id))
            })?;
            if quantity > item.quantity {
                return Err(ApiError::invalid(
                    "items",
                    format!(
                        "Cannot return {} of {}: only {} sold",
                        quantity,
                        item.product_label(),
                        item.quantity
                    ),
                ));
            }
            items.push(SaleReturnLinePayload {
                sale_item_id: item_id,
                product_id: item.product_id,
                quantity,
                return_amount: compute_return_amount(item, quantity)?,
            });
        }

        if items.is_empty() {
            return Err(ApiError::invalid("items", "Nothing to return"));
        }
        items.sort_by_key(|i| i.sale_item_id);

        Ok(SaleReturnPayload {
            total_return_amount: checked_sum(items.iter().map(|i| i.return_amount))?,
            items,
            reason: self.reason,
        })
    }
}
