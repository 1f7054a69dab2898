//! Delivery routes: a batch of sales handed to one sales rep for a day.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::common::{decimal, ensure_present, optional_i64, parse_date, search_term, matches_term, within_range, NamedRef};
use super::sales::Sale;
use crate::error::{ApiError, ApiResult};

/// Link between a route and one of its sales, carrying the retailer's
/// balance before that sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSale {
    pub sale_id: i64,
    #[serde(default, deserialize_with = "decimal")]
    pub previous_due: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub route_date: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub sales_rep_id: Option<i64>,
    #[serde(default)]
    pub sales_rep: Option<NamedRef>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub sales: Vec<Sale>,
    #[serde(default)]
    pub route_sales: Vec<RouteSale>,
}

impl Route {
    pub fn sale(&self, sale_id: i64) -> Option<&Sale> {
        self.sales.iter().find(|s| s.id == sale_id)
    }

    /// Previous due recorded on the route link, zero when there is none.
    pub fn previous_due(&self, sale_id: i64) -> Decimal {
        self.route_sales
            .iter()
            .find(|rs| rs.sale_id == sale_id)
            .map(|rs| rs.previous_due)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn sales_rep_label(&self) -> Option<&str> {
        self.sales_rep.as_ref().and_then(|r| r.name.as_deref())
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.route_date.as_deref().and_then(parse_date)
    }

    /// Sum of current bills on the route.
    pub fn total_bill(&self) -> Decimal {
        self.sales
            .iter()
            .fold(Decimal::ZERO, |total, s| total.saturating_add(s.total_amount))
    }
}

/// Row on the routes page
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteSummary {
    pub id: i64,
    pub name: String,
    pub route_date: Option<String>,
    pub sales_rep_name: Option<String>,
    pub status: Option<String>,
    pub sale_count: usize,
    pub total_bill: Decimal,
}

impl From<&Route> for RouteSummary {
    fn from(r: &Route) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            route_date: r.route_date.clone(),
            sales_rep_name: r.sales_rep_label().map(str::to_string),
            status: r.status.clone(),
            sale_count: r.sales.len(),
            total_bill: r.total_bill(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouteQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sales_rep_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

pub fn filter_routes(routes: Vec<Route>, query: &RouteQuery) -> Vec<Route> {
    let term = search_term(query.search.as_deref());
    let status = search_term(query.status.as_deref());

    routes
        .into_iter()
        .filter(|r| {
            term.as_deref().map_or(true, |t| {
                matches_term(Some(&r.name), t) || matches_term(r.sales_rep_label(), t)
            })
        })
        .filter(|r| query.sales_rep_id.map_or(true, |id| r.sales_rep_id == Some(id)))
        .filter(|r| {
            status
                .as_deref()
                .map_or(true, |s| r.status.as_deref().map(str::to_lowercase).as_deref() == Some(s))
        })
        .filter(|r| within_range(r.date(), query.from, query.to))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRouteRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_date: Option<NaiveDate>,
    pub sales_rep_id: i64,
    pub sale_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreateRouteRequest {
    pub fn validate(&self) -> ApiResult<()> {
        ensure_present("name", &self.name)?;
        if self.sale_ids.is_empty() {
            return Err(ApiError::invalid("sale_ids", "Select at least one sale for the route"));
        }
        let mut ids = self.sale_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.sale_ids.len() {
            return Err(ApiError::invalid("sale_ids", "A sale can only be added once"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_route_payload_parses_links() {
        let json = r#"{
            "id": 3, "name": "Uttara Evening", "route_date": "2024-05-02",
            "sales_rep": {"id": 5, "name": "Jamal"},
            "sales": [{"id": 11, "total_amount": "1000.00", "items": []}],
            "route_sales": [{"sale_id": 11, "previous_due": "250.50"}]
        }"#;
        let route: Route = serde_json::from_str(json).unwrap();
        assert_eq!(route.previous_due(11), Decimal::new(25050, 2));
        assert_eq!(route.previous_due(12), Decimal::ZERO);
        assert_eq!(RouteSummary::from(&route).total_bill, Decimal::from(1000));
    }

    #[test]
    fn create_rejects_duplicate_sales() {
        let req = CreateRouteRequest {
            name: "Mirpur".into(),
            route_date: None,
            sales_rep_id: 1,
            sale_ids: vec![1, 2, 1],
            notes: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn routes_filter_by_rep_and_date() {
        let json = r#"[
            {"id": 1, "name": "A", "route_date": "2024-05-01", "sales_rep_id": 1},
            {"id": 2, "name": "B", "route_date": "2024-05-03", "sales_rep_id": 2}
        ]"#;
        let routes: Vec<Route> = serde_json::from_str(json).unwrap();
        let query = RouteQuery {
            from: NaiveDate::from_ymd_opt(2024, 5, 2),
            ..Default::default()
        };
        assert_eq!(filter_routes(routes.clone(), &query)[0].id, 2);
        let query = RouteQuery {
            sales_rep_id: Some(1),
            ..Default::default()
        };
        assert_eq!(filter_routes(routes, &query)[0].id, 1);
    }
}
