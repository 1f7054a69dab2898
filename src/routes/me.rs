use axum::Json;
use serde::Serialize;

use crate::auth::RequireAuth;

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Identity read from the bearer token
pub async fn get_me(auth: RequireAuth) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: auth.user_id.clone(),
        email: auth.email.clone(),
        name: auth.claims().and_then(|c| c.name.clone()),
        role: auth.role.clone(),
    })
}
