//! SMS notification settings

use serde::{Deserialize, Serialize};

use super::common::{flag, optional_i64};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SmsSettings {
    #[serde(default, deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub send_on_sale: bool,
    #[serde(default, deserialize_with = "flag")]
    pub send_on_payment: bool,
    /// Days overdue before a due reminder goes out
    #[serde(default, deserialize_with = "optional_i64")]
    pub due_reminder_days: Option<i64>,
    #[serde(default)]
    pub sale_template: Option<String>,
    #[serde(default)]
    pub payment_template: Option<String>,
}

impl SmsSettings {
    /// Copy for display: the API key keeps only its last four characters.
    pub fn masked(&self) -> Self {
        Self {
            api_key: self.api_key.as_deref().map(mask_secret),
            ..self.clone()
        }
    }

    /// A key echoed back exactly as it was masked means "unchanged".
    pub fn is_masked_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map_or(false, |k| k.starts_with(MASK) && k.len() <= MASK.len() + 4)
    }

    pub fn validate(&self) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if missing(&self.provider) {
            return Err(ApiError::invalid("provider", "Choose an SMS provider"));
        }
        if missing(&self.api_key) {
            return Err(ApiError::invalid("api_key", "The API key is required"));
        }
        if missing(&self.sender_id) {
            return Err(ApiError::invalid("sender_id", "The sender id is required"));
        }
        if matches!(self.due_reminder_days, Some(d) if d < 0) {
            return Err(ApiError::invalid(
                "due_reminder_days",
                "Reminder days cannot be negative",
            ));
        }
        Ok(())
    }
}

const MASK: &str = "****";

fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}{}", MASK, tail)
}
