//! Spreadsheet export and import.
//!
//! Exports are CSV. Product imports accept CSV or any workbook calamine can
//! open (xlsx, xls, ods); the first sheet is read with its first row as the
//! header. Headers are matched case-insensitively, spaces read as `_`.
//! Category and unit columns may hold a name instead of an id; names are
//! resolved against the lookups before anything is sent.

use anyhow::Context;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;

use crate::domain::common::parse_decimal_str;
use crate::domain::lookups::{Category, Unit};
use crate::domain::products::{Product, ProductInput};
use crate::domain::reports::SalesReport;
use crate::domain::retailers::Retailer;
use crate::error::{ApiError, ApiResult};

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Debug, Serialize)]
struct ProductRow<'a> {
    id: String,
    name: &'a str,
    sku: Option<&'a str>,
    barcode: Option<&'a str>,
    category_id: Option<i64>,
    category: Option<&'a str>,
    unit_id: Option<i64>,
    unit: Option<&'a str>,
    purchase_price: Decimal,
    selling_price: Decimal,
    stock_quantity: Decimal,
    reorder_level: Option<Decimal>,
    description: Option<&'a str>,
    is_active: bool,
}

impl<'a> From<&'a Product> for ProductRow<'a> {
    fn from(p: &'a Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: &p.name,
            sku: p.sku.as_deref(),
            barcode: p.barcode.as_deref(),
            category_id: p.category_id,
            category: p.category_label(),
            unit_id: p.unit_id,
            unit: p.unit_label(),
            purchase_price: p.purchase_price,
            selling_price: p.selling_price,
            stock_quantity: p.stock_quantity,
            reorder_level: p.reorder_level,
            description: p.description.as_deref(),
            is_active: p.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
struct RetailerRow<'a> {
    id: String,
    name: &'a str,
    owner_name: Option<&'a str>,
    phone: Option<&'a str>,
    email: Option<&'a str>,
    address: Option<&'a str>,
    area: Option<&'a str>,
    route_id: Option<i64>,
    credit_limit: Decimal,
    current_due: Decimal,
    is_active: bool,
}

#[derive(Debug, Serialize)]
struct SalesReportRow {
    date: String,
    invoices: usize,
    total_amount: Decimal,
    paid_amount: Decimal,
    due_amount: Decimal,
}

fn write_rows<T: Serialize>(rows: impl IntoIterator<Item = T>) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("Failed to write CSV row")?;
    }
    writer.into_inner().context("Failed to finish CSV")
}

/// Product catalogue as CSV. Images are left out.
pub fn products_csv(products: &[Product]) -> anyhow::Result<Vec<u8>> {
    write_rows(products.iter().map(ProductRow::from))
}

pub fn retailers_csv(retailers: &[Retailer]) -> anyhow::Result<Vec<u8>> {
    write_rows(retailers.iter().map(|r| RetailerRow {
        id: r.id.to_string(),
        name: &r.name,
        owner_name: r.owner_name.as_deref(),
        phone: r.phone.as_deref(),
        email: r.email.as_deref(),
        address: r.address.as_deref(),
        area: r.area.as_deref(),
        route_id: r.route_id,
        credit_limit: r.credit_limit,
        current_due: r.current_due,
        is_active: r.is_active,
    }))
}

/// One row per day followed by a `TOTAL` row.
pub fn sales_report_csv(report: &SalesReport) -> anyhow::Result<Vec<u8>> {
    let days = report.days.iter().map(|d| SalesReportRow {
        date: d.date.map(|d| d.to_string()).unwrap_or_default(),
        invoices: d.invoice_count,
        total_amount: d.total_amount,
        paid_amount: d.paid_amount,
        due_amount: d.due_amount,
    });
    let total = SalesReportRow {
        date: "TOTAL".to_string(),
        invoices: report.invoice_count,
        total_amount: report.total_sales,
        paid_amount: report.total_paid,
        due_amount: report.total_due,
    };
    write_rows(days.chain(std::iter::once(total)))
}

/// `Content-Disposition` value for a download.
pub fn attachment(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename.replace('"', ""))
}

/// A rejected import row. `row` is the spreadsheet line number.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// A valid import row. `category` and `unit` hold the names read from the
/// sheet when no id was given.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub line: usize,
    pub input: ProductInput,
    category: Option<String>,
    unit: Option<String>,
}

impl ImportRow {
    fn resolve(&mut self, categories: &[Category], units: &[Unit]) -> Result<(), String> {
        if let Some(name) = self.category.take() {
            let category = categories
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&name))
                .ok_or_else(|| format!("Unknown category: {}", name))?;
            self.input.category_id = Some(category.id);
        }
        if let Some(name) = self.unit.take() {
            let unit = units
                .iter()
                .find(|u| {
                    u.name.eq_ignore_ascii_case(&name)
                        || u.short_name.as_deref().map_or(false, |s| s.eq_ignore_ascii_case(&name))
                })
                .ok_or_else(|| format!("Unknown unit: {}", name))?;
            self.input.unit_id = Some(unit.id);
        }
        Ok(())
    }
}

/// Parsed import: valid rows and rejected ones.
#[derive(Debug, Default)]
pub struct ProductImport {
    pub rows: Vec<ImportRow>,
    pub errors: Vec<RowError>,
}

impl ProductImport {
    /// True when some row names a category or unit instead of giving its id.
    pub fn needs_lookups(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.category.is_some() || r.unit.is_some())
    }

    /// Turn category and unit names into ids. Rows naming one that does not
    /// exist move to `errors`.
    pub fn resolve_names(&mut self, categories: &[Category], units: &[Unit]) {
        let rows = std::mem::take(&mut self.rows);
        for mut row in rows {
            match row.resolve(categories, units) {
                Ok(()) => self.rows.push(row),
                Err(message) => self.errors.push(RowError {
                    row: row.line,
                    message,
                }),
            }
        }
        self.errors.sort_by_key(|e| e.row);
    }
}

type Record = HashMap<String, String>;

fn header_key(h: &str) -> String {
    h.trim().to_lowercase().replace(' ', "_")
}

fn is_workbook(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".xlsx", ".xlsm", ".xls", ".xlsb", ".ods"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn read_csv(bytes: &[u8]) -> ApiResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ApiError::BadRequest(format!("Unreadable CSV header: {}", e)))?
        .iter()
        .map(header_key)
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ApiError::BadRequest(format!("Unreadable CSV row: {}", e)))?;
        records.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect(),
        );
    }
    Ok(records)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.trim().to_string(),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn read_workbook(bytes: Vec<u8>) -> ApiResult<Vec<Record>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ApiError::BadRequest(format!("Unreadable workbook: {}", e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::BadRequest("The workbook has no sheets".into()))?
        .map_err(|e| ApiError::BadRequest(format!("Unreadable sheet: {}", e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| header_key(&cell_to_string(c))).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|row| {
            headers
                .iter()
                .cloned()
                .zip(row.iter().map(cell_to_string))
                .collect()
        })
        .collect())
}

fn field<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn decimal_field(record: &Record, name: &str) -> Result<Option<Decimal>, String> {
    match field(record, name) {
        None => Ok(None),
        Some(v) => parse_decimal_str(v)
            .map(Some)
            .ok_or_else(|| format!("{} is not a number: {}", name, v)),
    }
}

fn id_field(record: &Record, name: &str) -> Result<Option<i64>, String> {
    match field(record, name) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("{} is not an id: {}", name, v)),
    }
}

fn bool_field(record: &Record, name: &str) -> bool {
    field(record, name).map_or(true, |v| {
        !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "inactive")
    })
}

/// Name column, kept only when the matching id column is empty.
fn name_without_id(record: &Record, name: &str, id: Option<i64>) -> Option<String> {
    match id {
        Some(_) => None,
        None => field(record, name).map(str::to_string),
    }
}

fn product_from_record(record: &Record, line: usize) -> Result<ImportRow, String> {
    let input = ProductInput {
        name: field(record, "name").unwrap_or_default().to_string(),
        sku: field(record, "sku").map(str::to_string),
        barcode: field(record, "barcode").map(str::to_string),
        category_id: id_field(record, "category_id")?,
        unit_id: id_field(record, "unit_id")?,
        purchase_price: decimal_field(record, "purchase_price")?.unwrap_or_default(),
        selling_price: decimal_field(record, "selling_price")?.unwrap_or_default(),
        stock_quantity: decimal_field(record, "stock_quantity")?.unwrap_or_default(),
        reorder_level: decimal_field(record, "reorder_level")?,
        description: field(record, "description").map(str::to_string),
        image: None,
        is_active: bool_field(record, "is_active"),
    };
    input.validate().map_err(|e| match e {
        ApiError::Validation { message, .. } => message,
        other => other.to_string(),
    })?;
    Ok(ImportRow {
        line,
        category: name_without_id(record, "category", input.category_id),
        unit: name_without_id(record, "unit", input.unit_id),
        input,
    })
}

/// Parse an uploaded product sheet. Blank lines are skipped; invalid rows are
/// reported, not fatal.
pub fn parse_products(filename: &str, bytes: Vec<u8>) -> ApiResult<ProductImport> {
    let records = if is_workbook(filename) {
        read_workbook(bytes)?
    } else {
        read_csv(&bytes)?
    };

    let mut import = ProductImport::default();
    for (index, record) in records.iter().enumerate() {
        // header is line 1
        let line = index + 2;
        if record.values().all(|v| v.trim().is_empty()) {
            continue;
        }
        match product_from_record(record, line) {
            Ok(row) => import.rows.push(row),
            Err(message) => import.errors.push(RowError { row: line, message }),
        }
    }
    Ok(import)
}
