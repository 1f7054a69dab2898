//! Route reconciliation
//!
//! For every sale on a delivery route the dashboard compares what was owed
//! (previous due plus the current bill) against the cash collected and the
//! value of goods returned. Returned goods are valued at the line's unit price
//! after its percentage discount. Totals roll up per retailer and per route;
//! the route discrepancy is `expected - collected - returns`.
//!
//! Everything here is pure arithmetic over fetched data and is recomputed on
//! every request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use super::common::{checked_add, checked_mul, checked_sub, checked_sum, decimal, AmountOverflow};
use super::delivery::Route;
use super::sales::{Sale, SaleItem};
use crate::error::{ApiError, FieldErrors};

/// Remaining dues at or below this count as settled.
pub fn settled_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    #[serde(alias = "paid")]
    Paid,
    #[serde(alias = "partial")]
    Partial,
    #[serde(alias = "unpaid")]
    Unpaid,
}

impl PaymentStatus {
    /// `Paid` once the remaining due is within a cent; `Unpaid` when nothing
    /// was collected or returned; `Partial` otherwise.
    pub fn classify(remaining_due: Decimal, collected_cash: Decimal, returned_quantity: Decimal) -> Self {
        if remaining_due <= settled_tolerance() {
            Self::Paid
        } else if collected_cash.is_zero() && returned_quantity.is_zero() {
            Self::Unpaid
        } else {
            Self::Partial
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paid => write!(f, "Paid"),
            Self::Partial => write!(f, "Partial"),
            Self::Unpaid => write!(f, "Unpaid"),
        }
    }
}

/// `unit_price * quantity` less the percentage discount.
pub fn line_total_after_discount(
    unit_price: Decimal,
    quantity: Decimal,
    discount_percent: Decimal,
) -> Result<Decimal, AmountOverflow> {
    let subtotal = checked_mul(unit_price, quantity)?;
    let rate = discount_percent
        .checked_div(Decimal::ONE_HUNDRED)
        .ok_or(AmountOverflow)?;
    checked_sub(subtotal, checked_mul(subtotal, rate)?)
}

/// Line total divided back over the sold quantity. Zero for lines with
/// nothing sold.
pub fn unit_price_after_discount(item: &SaleItem) -> Result<Decimal, AmountOverflow> {
    if item.quantity.is_zero() {
        return Ok(Decimal::ZERO);
    }
    line_total_after_discount(item.unit_price, item.quantity, item.discount)?
        .checked_div(item.quantity)
        .ok_or(AmountOverflow)
}

/// Value of `returned` units of `item` at its discounted unit price.
/// Lines with no sold quantity have no unit price and return nothing.
pub fn compute_return_amount(item: &SaleItem, returned: Decimal) -> Result<Decimal, AmountOverflow> {
    checked_mul(unit_price_after_discount(item)?, returned)
}

/// Returned quantity for one sale line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnEntry {
    pub sale_item_id: i64,
    #[serde(deserialize_with = "decimal")]
    pub quantity: Decimal,
}

/// What the sales rep brought back for one sale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleCollection {
    pub sale_id: i64,
    #[serde(default, deserialize_with = "decimal")]
    pub collected_cash: Decimal,
    #[serde(default)]
    pub returns: Vec<ReturnEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub sales: Vec<SaleCollection>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconciliationError {
    #[error("sale {0} is not on this route")]
    UnknownSale(i64),
    #[error("sale {0} is listed more than once")]
    DuplicateSale(i64),
    #[error("item {item_id} is not part of sale {sale_id}")]
    UnknownItem { sale_id: i64, item_id: i64 },
    #[error("collected cash for sale {0} cannot be negative")]
    NegativeCollection(i64),
    #[error("return quantity for item {item_id} of sale {sale_id} cannot be negative")]
    NegativeReturn { sale_id: i64, item_id: i64 },
    #[error("cannot return {returned} of item {item_id} on sale {sale_id}: only {sold} sold")]
    ReturnExceedsSold {
        sale_id: i64,
        item_id: i64,
        sold: Decimal,
        returned: Decimal,
    },
    #[error(transparent)]
    Overflow(#[from] AmountOverflow),
}

impl From<ReconciliationError> for ApiError {
    fn from(err: ReconciliationError) -> Self {
        let field = match &err {
            ReconciliationError::NegativeCollection(_) => "collected_cash",
            ReconciliationError::UnknownSale(_) | ReconciliationError::DuplicateSale(_) => "sales",
            ReconciliationError::Overflow(_) => "amount",
            _ => "returns",
        };
        let message = err.to_string();
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.clone()]);
        ApiError::Validation { message, errors }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemReturn {
    pub sale_item_id: i64,
    pub product_id: Option<i64>,
    pub product_name: String,
    pub quantity_sold: Decimal,
    pub quantity_returned: Decimal,
    pub unit_price_after_discount: Decimal,
    pub return_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaleReconciliation {
    pub sale_id: i64,
    pub invoice_number: String,
    pub retailer_id: Option<i64>,
    pub retailer_name: String,
    pub previous_due: Decimal,
    pub current_bill: Decimal,
    pub total_outstanding: Decimal,
    pub collected_cash: Decimal,
    pub returned_quantity: Decimal,
    pub return_amount: Decimal,
    pub remaining_due: Decimal,
    pub status: PaymentStatus,
    pub returns: Vec<ItemReturn>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetailerReconciliation {
    pub retailer_id: Option<i64>,
    pub retailer_name: String,
    pub sale_count: usize,
    pub total_outstanding: Decimal,
    pub collected_cash: Decimal,
    pub return_amount: Decimal,
    pub remaining_due: Decimal,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteReconciliation {
    pub route_id: i64,
    pub route_name: String,
    pub sales_rep_name: Option<String>,
    pub sales: Vec<SaleReconciliation>,
    pub retailers: Vec<RetailerReconciliation>,
    pub total_expected: Decimal,
    pub total_collected: Decimal,
    pub total_returns: Decimal,
    pub discrepancy: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Reconcile a single sale. `returns` maps sale item id to returned quantity
/// and must already be validated against the sale.
pub fn reconcile_sale(
    sale: &Sale,
    previous_due: Decimal,
    collected_cash: Decimal,
    returns: &HashMap<i64, Decimal>,
) -> Result<SaleReconciliation, AmountOverflow> {
    let current_bill = sale.total_amount;
    let total_outstanding = checked_add(previous_due, current_bill)?;

    let mut item_returns = Vec::new();
    for item in &sale.items {
        let Some(id) = item.id else { continue };
        let Some(&quantity) = returns.get(&id) else { continue };
        if quantity.is_zero() {
            continue;
        }
        let unit_price = unit_price_after_discount(item)?;
        item_returns.push(ItemReturn {
            sale_item_id: id,
            product_id: item.product_id,
            product_name: item.product_label().to_string(),
            quantity_sold: item.quantity,
            quantity_returned: quantity,
            unit_price_after_discount: unit_price,
            return_amount: checked_mul(unit_price, quantity)?,
        });
    }

    let return_amount = checked_sum(item_returns.iter().map(|r| r.return_amount))?;
    let returned_quantity = checked_sum(item_returns.iter().map(|r| r.quantity_returned))?;
    let remaining_due = checked_sub(checked_sub(total_outstanding, collected_cash)?, return_amount)?;

    Ok(SaleReconciliation {
        sale_id: sale.id,
        invoice_number: sale.invoice_label(),
        retailer_id: sale.retailer_id,
        retailer_name: sale.retailer_label().to_string(),
        previous_due,
        current_bill,
        total_outstanding,
        collected_cash,
        returned_quantity,
        return_amount,
        remaining_due,
        status: PaymentStatus::classify(remaining_due, collected_cash, returned_quantity),
        returns: item_returns,
    })
}

/// Validate entered collections against the route and reconcile every sale.
/// Sales without an entry are reconciled with nothing collected or returned.
pub fn reconcile_route(
    route: &Route,
    entries: &[SaleCollection],
    notes: Option<String>,
) -> Result<RouteReconciliation, ReconciliationError> {
    let mut by_sale: HashMap<i64, (Decimal, HashMap<i64, Decimal>)> = HashMap::new();
    let mut seen = HashSet::new();

    for entry in entries {
        let sale = route
            .sale(entry.sale_id)
            .ok_or(ReconciliationError::UnknownSale(entry.sale_id))?;
        if !seen.insert(entry.sale_id) {
            return Err(ReconciliationError::DuplicateSale(entry.sale_id));
        }
        if entry.collected_cash < Decimal::ZERO {
            return Err(ReconciliationError::NegativeCollection(entry.sale_id));
        }

        let mut returns: HashMap<i64, Decimal> = HashMap::new();
        for ret in &entry.returns {
            if ret.quantity < Decimal::ZERO {
                return Err(ReconciliationError::NegativeReturn {
                    sale_id: sale.id,
                    item_id: ret.sale_item_id,
                });
            }
            let total = returns.entry(ret.sale_item_id).or_default();
            *total = checked_add(*total, ret.quantity)?;
        }
        for (&item_id, &returned) in &returns {
            let item = sale.item(item_id).ok_or(ReconciliationError::UnknownItem {
                sale_id: sale.id,
                item_id,
            })?;
            if returned > item.quantity {
                return Err(ReconciliationError::ReturnExceedsSold {
                    sale_id: sale.id,
                    item_id,
                    sold: item.quantity,
                    returned,
                });
            }
        }

        by_sale.insert(entry.sale_id, (entry.collected_cash, returns));
    }

    let empty = HashMap::new();
    let sales = route
        .sales
        .iter()
        .map(|sale| {
            let (collected, returns) = by_sale
                .get(&sale.id)
                .map(|(c, r)| (*c, r))
                .unwrap_or((Decimal::ZERO, &empty));
            reconcile_sale(sale, route.previous_due(sale.id), collected, returns)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total_expected = checked_sum(sales.iter().map(|s| s.total_outstanding))?;
    let total_collected = checked_sum(sales.iter().map(|s| s.collected_cash))?;
    let total_returns = checked_sum(sales.iter().map(|s| s.return_amount))?;
    let discrepancy = checked_sub(checked_sub(total_expected, total_collected)?, total_returns)?;

    Ok(RouteReconciliation {
        route_id: route.id,
        route_name: route.name.clone(),
        sales_rep_name: route.sales_rep_label().map(str::to_string),
        retailers: group_by_retailer(&sales)?,
        sales,
        total_expected,
        total_collected,
        total_returns,
        discrepancy,
        notes,
    })
}

/// Roll per-sale figures up per retailer, in first-seen order.
pub fn group_by_retailer(sales: &[SaleReconciliation]) -> Result<Vec<RetailerReconciliation>, AmountOverflow> {
    let mut order: Vec<(Option<i64>, String)> = Vec::new();
    let mut groups: BTreeMap<(Option<i64>, String), (RetailerReconciliation, Decimal)> = BTreeMap::new();

    for sale in sales {
        let key = (sale.retailer_id, sale.retailer_name.clone());
        let (group, returned_qty) = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (
                RetailerReconciliation {
                    retailer_id: sale.retailer_id,
                    retailer_name: sale.retailer_name.clone(),
                    sale_count: 0,
                    total_outstanding: Decimal::ZERO,
                    collected_cash: Decimal::ZERO,
                    return_amount: Decimal::ZERO,
                    remaining_due: Decimal::ZERO,
                    status: PaymentStatus::Unpaid,
                },
                Decimal::ZERO,
            )
        });
        group.sale_count += 1;
        group.total_outstanding = checked_add(group.total_outstanding, sale.total_outstanding)?;
        group.collected_cash = checked_add(group.collected_cash, sale.collected_cash)?;
        group.return_amount = checked_add(group.return_amount, sale.return_amount)?;
        group.remaining_due = checked_add(group.remaining_due, sale.remaining_due)?;
        *returned_qty = checked_add(*returned_qty, sale.returned_quantity)?;
    }

    Ok(order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|(mut group, returned_qty)| {
            group.status =
                PaymentStatus::classify(group.remaining_due, group.collected_cash, returned_qty);
            group
        })
        .collect())
}

/// Payload submitted to `/api/routes/{id}/reconcile`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconciliationSubmission {
    pub total_expected: Decimal,
    pub total_collected: Decimal,
    pub total_returns: Decimal,
    pub discrepancy: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub sales: Vec<SaleSubmission>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaleSubmission {
    pub sale_id: i64,
    pub previous_due: Decimal,
    pub collected_cash: Decimal,
    pub return_amount: Decimal,
    pub remaining_due: Decimal,
    pub status: PaymentStatus,
    pub returns: Vec<ReturnSubmission>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReturnSubmission {
    pub sale_item_id: i64,
    pub product_id: Option<i64>,
    pub quantity_returned: Decimal,
    pub return_amount: Decimal,
}

impl From<&RouteReconciliation> for ReconciliationSubmission {
    fn from(r: &RouteReconciliation) -> Self {
        Self {
            total_expected: r.total_expected,
            total_collected: r.total_collected,
            total_returns: r.total_returns,
            discrepancy: r.discrepancy,
            notes: r.notes.clone(),
            sales: r
                .sales
                .iter()
                .map(|s| SaleSubmission {
                    sale_id: s.sale_id,
                    previous_due: s.previous_due,
                    collected_cash: s.collected_cash,
                    return_amount: s.return_amount,
                    remaining_due: s.remaining_due,
                    status: s.status,
                    returns: s
                        .returns
                        .iter()
                        .map(|ret| ReturnSubmission {
                            sale_item_id: ret.sale_item_id,
                            product_id: ret.product_id,
                            quantity_returned: ret.quantity_returned,
                            return_amount: ret.return_amount,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::delivery::{Route, RouteSale};
    use crate::domain::sales::tests::{item, sale};

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn route(sales: Vec<Sale>, previous: &[(i64, i64)]) -> Route {
        Route {
            id: 7,
            name: "Mirpur Morning".into(),
            route_date: Some("2024-05-02".into()),
            sales_rep_id: Some(3),
            sales_rep: None,
            status: None,
            notes: None,
            sales,
            route_sales: previous
                .iter()
                .map(|(sale_id, due)| RouteSale {
                    sale_id: *sale_id,
                    previous_due: d(*due),
                })
                .collect(),
        }
    }

    fn collect(sale_id: i64, cash: i64, returns: &[(i64, i64)]) -> SaleCollection {
        SaleCollection {
            sale_id,
            collected_cash: d(cash),
            returns: returns
                .iter()
                .map(|(id, q)| ReturnEntry {
                    sale_item_id: *id,
                    quantity: d(*q),
                })
                .collect(),
        }
    }

    #[test]
    fn partial_collection_leaves_remaining_due() {
        let r = route(vec![sale(1, 1, "City Mart", vec![item(1, "Rice", 10, 100, 0)])], &[(1, 500)]);
        let result = reconcile_route(&r, &[collect(1, 800, &[])], None).unwrap();
        let s = &result.sales[0];
        assert_eq!(s.current_bill, d(1000));
        assert_eq!(s.total_outstanding, d(1500));
        assert_eq!(s.remaining_due, d(700));
        assert_eq!(s.status, PaymentStatus::Partial);
    }

    #[test]
    fn full_collection_is_paid() {
        let r = route(vec![sale(1, 1, "City Mart", vec![item(1, "Rice", 10, 100, 0)])], &[(1, 500)]);
        let result = reconcile_route(&r, &[collect(1, 1500, &[])], None).unwrap();
        assert_eq!(result.sales[0].remaining_due, Decimal::ZERO);
        assert_eq!(result.sales[0].status, PaymentStatus::Paid);
    }

    #[test]
    fn nothing_collected_is_unpaid() {
        let r = route(vec![sale(1, 1, "City Mart", vec![item(1, "Rice", 10, 100, 0)])], &[]);
        let result = reconcile_route(&r, &[], None).unwrap();
        assert_eq!(result.sales[0].previous_due, Decimal::ZERO);
        assert_eq!(result.sales[0].remaining_due, d(1000));
        assert_eq!(result.sales[0].status, PaymentStatus::Unpaid);
    }

    #[test]
    fn returns_use_discounted_unit_price() {
        let it = item(1, "Rice", 10, 100, 10);
        assert_eq!(compute_return_amount(&it, d(3)), Ok(d(270)));

        let r = route(vec![sale(1, 1, "City Mart", vec![it])], &[]);
        let result = reconcile_route(&r, &[collect(1, 0, &[(1, 3)])], None).unwrap();
        let s = &result.sales[0];
        assert_eq!(s.return_amount, d(270));
        assert_eq!(s.returns[0].unit_price_after_discount, d(90));
        assert_eq!(s.remaining_due, d(630));
        // returns alone still count as activity
        assert_eq!(s.status, PaymentStatus::Partial);
    }

    #[test]
    fn discrepancy_is_zero_when_collections_and_returns_cover_expected() {
        let r = route(
            vec![
                sale(1, 1, "City Mart", vec![item(1, "Rice", 10, 100, 10)]),
                sale(2, 2, "Rahman Store", vec![item(2, "Oil", 4, 250, 0)]),
            ],
            &[(1, 200), (2, 0)],
        );
        // sale 1: 200 + 900 = 1100, returns 3 * 90 = 270, cash 830
        // sale 2: 1000, cash 1000
        let result = reconcile_route(
            &r,
            &[collect(1, 830, &[(1, 3)]), collect(2, 1000, &[])],
            Some("all settled".into()),
        )
        .unwrap();
        assert_eq!(result.total_expected, d(2100));
        assert_eq!(result.total_collected, d(1830));
        assert_eq!(result.total_returns, d(270));
        assert_eq!(result.discrepancy, Decimal::ZERO);
        assert!(result.sales.iter().all(|s| s.status == PaymentStatus::Paid));
    }

    #[test]
    fn retailer_groups_sum_their_sales() {
        let r = route(
            vec![
                sale(1, 1, "City Mart", vec![item(1, "Rice", 1, 100, 0)]),
                sale(2, 2, "Rahman Store", vec![item(2, "Oil", 1, 50, 0)]),
                sale(3, 1, "City Mart", vec![item(3, "Salt", 2, 25, 0)]),
            ],
            &[],
        );
        let result = reconcile_route(&r, &[collect(1, 100, &[])], None).unwrap();
        assert_eq!(result.retailers.len(), 2);
        let city = &result.retailers[0];
        assert_eq!(city.retailer_name, "City Mart");
        assert_eq!(city.sale_count, 2);
        assert_eq!(city.total_outstanding, d(150));
        assert_eq!(city.remaining_due, d(50));
        assert_eq!(city.status, PaymentStatus::Partial);
        assert_eq!(result.retailers[1].status, PaymentStatus::Unpaid);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let r = route(vec![sale(1, 1, "City Mart", vec![item(1, "Rice", 10, 100, 0)])], &[]);
        assert_eq!(
            reconcile_route(&r, &[collect(9, 0, &[])], None),
            Err(ReconciliationError::UnknownSale(9))
        );
        assert_eq!(
            reconcile_route(&r, &[collect(1, -5, &[])], None),
            Err(ReconciliationError::NegativeCollection(1))
        );
        assert!(matches!(
            reconcile_route(&r, &[collect(1, 0, &[(1, 11)])], None),
            Err(ReconciliationError::ReturnExceedsSold { .. })
        ));
        assert!(matches!(
            reconcile_route(&r, &[collect(1, 0, &[(4, 1)])], None),
            Err(ReconciliationError::UnknownItem { .. })
        ));
        assert_eq!(
            reconcile_route(&r, &[collect(1, 0, &[]), collect(1, 5, &[])], None),
            Err(ReconciliationError::DuplicateSale(1))
        );
    }

    #[test]
    fn zero_quantity_line_returns_nothing() {
        let mut it = item(1, "Rice", 0, 100, 0);
        it.quantity = Decimal::ZERO;
        assert_eq!(compute_return_amount(&it, d(2)), Ok(Decimal::ZERO));
    }

    #[test]
    fn oversized_amounts_are_errors_not_panics() {
        assert_eq!(
            line_total_after_discount(Decimal::MAX, d(2), Decimal::ZERO),
            Err(AmountOverflow)
        );

        let mut huge = route(vec![sale(1, 1, "City Mart", vec![item(1, "Rice", 10, 100, 0)])], &[]);
        huge.route_sales = vec![RouteSale {
            sale_id: 1,
            previous_due: Decimal::MAX,
        }];
        assert_eq!(
            reconcile_route(&huge, &[], None),
            Err(ReconciliationError::Overflow(AmountOverflow))
        );

        let api: ApiError = ReconciliationError::Overflow(AmountOverflow).into();
        match api {
            ApiError::Validation { errors, .. } => assert!(errors.contains_key("amount")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn classify_uses_one_cent_tolerance() {
        assert_eq!(
            PaymentStatus::classify(Decimal::new(1, 2), Decimal::ZERO, Decimal::ZERO),
            PaymentStatus::Paid
        );
        assert_eq!(
            PaymentStatus::classify(Decimal::new(2, 2), Decimal::ZERO, Decimal::ZERO),
            PaymentStatus::Unpaid
        );
    }
}
