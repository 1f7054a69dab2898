use super::Claims;

/// Authenticated caller, extracted from the bearer token.
///
/// The token is forwarded verbatim to the backend, which stays the authority
/// on whether it is valid. Claims are present only when the token is a JWT.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID (from JWT sub claim)
    pub user_id: Option<String>,

    /// User email if available
    pub email: Option<String>,

    /// User role if specified
    pub role: Option<String>,

    /// Raw bearer token
    token: String,

    claims: Option<Claims>,
}

impl AuthContext {
    pub fn new(token: &str, claims: Option<Claims>) -> Self {
        Self {
            user_id: claims.as_ref().and_then(|c| c.sub.clone()),
            email: claims.as_ref().and_then(|c| c.email.clone()),
            role: claims.as_ref().and_then(|c| c.role.clone()),
            token: token.to_string(),
            claims,
        }
    }

    /// Get the raw bearer token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the JWT claims, if the token carried any
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }
}
