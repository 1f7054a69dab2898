use serde::{Deserialize, Deserializer, Serialize};

/// JWT claims issued by the backend's auth endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Claims {
    /// Subject (user ID). The backend issues numeric ids, other issuers strings.
    #[serde(default, deserialize_with = "string_or_number")]
    pub sub: Option<String>,

    /// Expiration (Unix timestamp)
    #[serde(default)]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<i64>,

    /// User email - optional
    #[serde(default)]
    pub email: Option<String>,

    /// Display name - optional
    #[serde(default)]
    pub name: Option<String>,

    /// User role (admin, manager, sales_rep, ...) - optional
    #[serde(default)]
    pub role: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_subject_is_accepted() {
        let claims: Claims =
            serde_json::from_str(r#"{"sub": 42, "exp": 1700000000, "role": "admin"}"#).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }
}
