//! SMS notification settings
//!
//! The API key never leaves the service unmasked. A masked key sent back on
//! update means the stored key is kept.

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::settings::SmsSettings;
use crate::error::ApiResult;
use crate::services::CallContext;

const SMS_SETTINGS_PATH: &str = "/api/settings/sms";

/// GET /settings/sms
pub async fn get_sms_settings(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<SmsSettings>> {
    let ctx = CallContext::new(&auth, &headers);
    let settings: SmsSettings = state.backend.get_item(SMS_SETTINGS_PATH, ctx).await?;
    Ok(DataResponse::new(settings.masked()))
}

/// PUT /settings/sms
pub async fn update_sms_settings(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<SmsSettings>,
) -> ApiResult<DataResponse<SmsSettings>> {
    let ctx = CallContext::new(&auth, &headers);

    if req.is_masked_key() {
        let current: SmsSettings = state.backend.get_item(SMS_SETTINGS_PATH, ctx).await?;
        req.api_key = current.api_key;
    }
    req.validate()?;

    tracing::info!(
        user_id = ?auth.user_id,
        enabled = req.enabled,
        provider = ?req.provider,
        "Updating SMS settings"
    );

    let _: serde_json::Value = state.backend.put(SMS_SETTINGS_PATH, &req, ctx).await?;
    Ok(DataResponse::new(req.masked()))
}
