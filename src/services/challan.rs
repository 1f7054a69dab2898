//! Printable delivery challans (receipts) as standalone HTML pages.
//!
//! Pages are rendered from the tera templates under `templates/`, compiled
//! into the binary. Autoescaping is on for every `.html` template, so record
//! text from the backend is always escaped.

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use crate::domain::delivery::Route;
use crate::domain::sales::Sale;

const BASE_TEMPLATE: &str = include_str!("../../templates/challan_base.html");
const SALE_TEMPLATE: &str = include_str!("../../templates/sale_challan.html");
const ROUTE_TEMPLATE: &str = include_str!("../../templates/route_challan.html");

#[derive(Debug, Serialize)]
struct LineView {
    product: String,
    quantity: String,
    unit_price: String,
    discount: String,
    total: String,
}

#[derive(Debug, Serialize)]
struct SaleView {
    retailer: String,
    invoice: String,
    date: String,
    lines: Vec<LineView>,
    total: String,
    paid: String,
    due: String,
}

impl From<&Sale> for SaleView {
    fn from(sale: &Sale) -> Self {
        Self {
            retailer: sale.retailer_label().to_string(),
            invoice: sale.invoice_label(),
            date: date(sale.date()),
            lines: sale
                .items
                .iter()
                .map(|item| LineView {
                    product: item.product_label().to_string(),
                    quantity: qty(item.quantity),
                    unit_price: money(item.unit_price),
                    discount: qty(item.discount),
                    total: money(item.total),
                })
                .collect(),
            total: money(sale.total_amount),
            paid: money(sale.paid_amount),
            due: money(sale.due_amount()),
        }
    }
}

/// Summary row with blank collection columns for the sales rep
#[derive(Debug, Serialize)]
struct RouteRow {
    invoice: String,
    retailer: String,
    previous_due: String,
    bill: String,
    outstanding: String,
}

#[derive(Debug, Serialize)]
struct RouteView {
    name: String,
    sales_rep: String,
    date: String,
    rows: Vec<RouteRow>,
    total_bill: String,
    total_outstanding: String,
}

impl From<&Route> for RouteView {
    fn from(route: &Route) -> Self {
        let mut total_outstanding = Decimal::ZERO;
        let rows = route
            .sales
            .iter()
            .map(|sale| {
                let previous_due = route.previous_due(sale.id);
                let outstanding = previous_due.saturating_add(sale.total_amount);
                total_outstanding = total_outstanding.saturating_add(outstanding);
                RouteRow {
                    invoice: sale.invoice_label(),
                    retailer: sale.retailer_label().to_string(),
                    previous_due: money(previous_due),
                    bill: money(sale.total_amount),
                    outstanding: money(outstanding),
                }
            })
            .collect();

        Self {
            name: route.name.clone(),
            sales_rep: route.sales_rep_label().unwrap_or("").to_string(),
            date: date(route.date()),
            rows,
            total_bill: money(route.total_bill()),
            total_outstanding: money(total_outstanding),
        }
    }
}

fn money(d: Decimal) -> String {
    format!("{:.2}", d.round_dp(2))
}

fn qty(d: Decimal) -> String {
    d.normalize().to_string()
}

fn date(d: Option<NaiveDate>) -> String {
    d.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default()
}

/// Compiled challan templates plus the heading printed on every page.
#[derive(Clone)]
pub struct Challans {
    tera: Tera,
    company: String,
}

impl Challans {
    pub fn new(company: impl Into<String>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html"]);
        tera.add_raw_templates(vec![
            ("challan_base.html", BASE_TEMPLATE),
            ("sale_challan.html", SALE_TEMPLATE),
            ("route_challan.html", ROUTE_TEMPLATE),
        ])
        .context("Failed to compile challan templates")?;

        Ok(Self {
            tera,
            company: company.into(),
        })
    }

    fn context(&self, print: bool) -> Context {
        let mut context = Context::new();
        context.insert("company", &self.company);
        context.insert("print", &print);
        context
    }

    /// Challan for a single sale.
    pub fn sale(&self, sale: &Sale, print: bool) -> Result<String> {
        let mut context = self.context(print);
        context.insert("sales", &[SaleView::from(sale)]);
        self.tera
            .render("sale_challan.html", &context)
            .context("Failed to render sale challan")
    }

    /// Route challan: a summary sheet with blank collection columns for the
    /// sales rep, followed by every sale on the route.
    pub fn route(&self, route: &Route, print: bool) -> Result<String> {
        let mut context = self.context(print);
        context.insert("route", &RouteView::from(route));
        context.insert(
            "sales",
            &route.sales.iter().map(SaleView::from).collect::<Vec<_>>(),
        );
        self.tera
            .render("route_challan.html", &context)
            .context("Failed to render route challan")
    }
}
