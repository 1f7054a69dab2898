//! Sales report: daily rollup, totals and best-selling products.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::common::{checked_add, checked_sub, checked_sum, AmountOverflow};
use super::reconciliation::line_total_after_discount;
use super::sales::Sale;

/// Number of products listed under `top_products`
pub const TOP_PRODUCTS: usize = 10;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SalesReportQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub retailer_id: Option<i64>,
    #[serde(default)]
    pub sales_rep_id: Option<i64>,
}

impl SalesReportQuery {
    /// Query string for `/api/reports/sales`.
    pub fn backend_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(from) = self.from {
            params.push(("start_date", from.to_string()));
        }
        if let Some(to) = self.to {
            params.push(("end_date", to.to_string()));
        }
        if let Some(id) = self.retailer_id {
            params.push(("retailer_id", id.to_string()));
        }
        if let Some(id) = self.sales_rep_id {
            params.push(("sales_rep_id", id.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailySales {
    pub date: Option<NaiveDate>,
    pub invoice_count: usize,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub due_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductSales {
    pub product_id: Option<i64>,
    pub product_name: String,
    pub quantity: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalesReport {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub invoice_count: usize,
    pub total_sales: Decimal,
    pub total_paid: Decimal,
    pub total_due: Decimal,
    pub average_invoice: Decimal,
    pub days: Vec<DailySales>,
    pub top_products: Vec<ProductSales>,
}

pub fn build_sales_report(sales: &[Sale], query: &SalesReportQuery) -> Result<SalesReport, AmountOverflow> {
    let mut days: BTreeMap<Option<NaiveDate>, DailySales> = BTreeMap::new();
    let mut products: HashMap<(Option<i64>, String), ProductSales> = HashMap::new();

    for sale in sales {
        let date = sale.date();
        let day = days.entry(date).or_insert_with(|| DailySales {
            date,
            invoice_count: 0,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            due_amount: Decimal::ZERO,
        });
        day.invoice_count += 1;
        day.total_amount = checked_add(day.total_amount, sale.total_amount)?;
        day.paid_amount = checked_add(day.paid_amount, sale.paid_amount)?;
        day.due_amount = checked_add(day.due_amount, sale.due_amount())?;

        for item in &sale.items {
            let name = item.product_label().to_string();
            let entry = products
                .entry((item.product_id, name.clone()))
                .or_insert_with(|| ProductSales {
                    product_id: item.product_id,
                    product_name: name,
                    quantity: Decimal::ZERO,
                    amount: Decimal::ZERO,
                });
            entry.quantity = checked_add(entry.quantity, item.quantity)?;
            let line = line_total_after_discount(item.unit_price, item.quantity, item.discount)?;
            entry.amount = checked_add(entry.amount, line)?;
        }
    }

    let total_sales = checked_sum(sales.iter().map(|s| s.total_amount))?;
    let total_paid = checked_sum(sales.iter().map(|s| s.paid_amount))?;
    let average_invoice = if sales.is_empty() {
        Decimal::ZERO
    } else {
        (total_sales / Decimal::from(sales.len())).round_dp(2)
    };

    let mut top_products: Vec<ProductSales> = products.into_values().collect();
    top_products.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    top_products.truncate(TOP_PRODUCTS);

    Ok(SalesReport {
        from: query.from,
        to: query.to,
        invoice_count: sales.len(),
        total_sales,
        total_paid,
        total_due: checked_sub(total_sales, total_paid)?,
        average_invoice,
        days: days.into_values().collect(),
        top_products,
    })
}
