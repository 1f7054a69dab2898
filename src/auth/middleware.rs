use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;

use super::{AuthContext, Claims};
use crate::app::AppState;
use crate::error::ErrorResponse;

/// Extractor that requires a bearer token.
///
/// When `AUTH_JWT_SECRET` is configured the token must be a valid HS256 JWT;
/// otherwise claims are read best-effort and the backend validates the token
/// on every forwarded call.
///
/// Example:
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {:?}", auth.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::MissingToken => "Missing authorization token",
            AuthError::InvalidFormat => "Invalid authorization format",
            AuthError::InvalidToken(_) => "Invalid or expired token",
        };

        let body = ErrorResponse {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            errors: None,
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Decode the claims of `token`, verifying the signature when `secret` is set.
pub fn decode_claims(
    token: &str,
    secret: Option<&str>,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let (key, validation) = match secret {
        Some(secret) => {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.validate_aud = false;
            (DecodingKey::from_secret(secret.as_bytes()), validation)
        }
        None => {
            let mut validation = Validation::default();
            validation.insecure_disable_signature_validation();
            validation.validate_aud = false;
            validation.validate_exp = false;
            validation.required_spec_claims.clear();
            (DecodingKey::from_secret(&[]), validation)
        }
    };

    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    if rejection.is_missing() {
                        AuthError::MissingToken
                    } else {
                        AuthError::InvalidFormat
                    }
                })?;

        let token = bearer.token();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let secret = state.settings.auth_jwt_secret.as_deref();
        let claims = match decode_claims(token, secret) {
            Ok(claims) => Some(claims),
            Err(e) if secret.is_some() => {
                tracing::warn!(error = %e, "JWT verification failed");
                return Err(AuthError::InvalidToken(e.to_string()));
            }
            // Opaque tokens are fine, the backend checks them
            Err(_) => None,
        };

        Ok(RequireAuth(AuthContext::new(token, claims)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn signed(secret: &str, exp: i64) -> String {
        let claims = serde_json::json!({ "sub": 7, "exp": exp, "role": "sales_rep" });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn verifies_with_matching_secret() {
        let token = signed("s3cret", far_future());
        let claims = decode_claims(&token, Some("s3cret")).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("7"));
        assert_eq!(claims.role.as_deref(), Some("sales_rep"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = signed("s3cret", far_future());
        assert!(decode_claims(&token, Some("other")).is_err());
    }

    #[test]
    fn reads_claims_without_secret() {
        let token = signed("whatever", far_future());
        let claims = decode_claims(&token, None).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("7"));
    }

    #[test]
    fn opaque_token_has_no_claims() {
        assert!(decode_claims("12|plain-sanctum-token", None).is_err());
    }
}
