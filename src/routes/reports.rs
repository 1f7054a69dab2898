use axum::{
    extract::{Query, State},
    http::HeaderMap,
};
use std::sync::Arc;

use super::today;
use crate::api::{DataResponse, Download};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::reports::{build_sales_report, SalesReport, SalesReportQuery};
use crate::domain::sales::Sale;
use crate::error::ApiResult;
use crate::services::export::{self, CSV_CONTENT_TYPE};
use crate::services::{BackendClient, CallContext};

async fn load_report(
    backend: &BackendClient,
    query: &SalesReportQuery,
    ctx: CallContext<'_>,
) -> ApiResult<SalesReport> {
    let sales: Vec<Sale> = backend
        .get_list("/api/reports/sales", &query.backend_params(), ctx)
        .await?;
    Ok(build_sales_report(&sales, query)?)
}

pub async fn sales_report(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SalesReportQuery>,
) -> ApiResult<DataResponse<SalesReport>> {
    let ctx = CallContext::new(&auth, &headers);
    Ok(DataResponse::new(load_report(&state.backend, &query, ctx).await?))
}

pub async fn export_sales_report(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SalesReportQuery>,
) -> ApiResult<Download> {
    let ctx = CallContext::new(&auth, &headers);
    let report = load_report(&state.backend, &query, ctx).await?;

    Ok(Download {
        content_type: CSV_CONTENT_TYPE,
        disposition: export::attachment(&format!("sales-report-{}.csv", today())),
        body: export::sales_report_csv(&report)?,
    })
}
