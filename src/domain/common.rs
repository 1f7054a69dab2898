//! Shared building blocks for the backend DTOs.
//!
//! The backend is loose about types: amounts arrive as numbers or numeric
//! strings, flags as `true`/`1`/`"1"`, and lists either bare or wrapped in
//! `{ "data": [...] }`. The helpers here normalise all of that at the edge.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix for ids generated while the backend is unreachable.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Entity id: a backend id, or a temporary id for records created offline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Id(i64),
    Temp(String),
}

impl EntityId {
    pub fn temp() -> Self {
        Self::Temp(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Temp(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Id(id) => Value::from(*id),
            Self::Temp(s) => Value::from(s.clone()),
        }
    }

    /// Read an id out of a JSON value (number or string).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Id),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Temp(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        if s.starts_with(TEMP_ID_PREFIX) && s.len() > TEMP_ID_PREFIX.len() {
            return Ok(Self::Temp(s.to_string()));
        }
        Err(format!("invalid id: {}", s))
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => serializer.serialize_i64(*id),
            Self::Temp(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid entity id: {}", value)))
    }
}

/// `{ id, name }` pair the backend nests for related records.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "optional_i64")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Backend list payload, bare or wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// Backend single-record payload, bare or wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ItemEnvelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> ItemEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

pub fn parse_decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => parse_decimal_str(s),
        _ => None,
    }
}

/// Parse a user- or backend-supplied amount. Thousands separators are dropped.
pub fn parse_decimal_str(s: &str) -> Option<Decimal> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Amount that may be a number, a numeric string, or null (zero).
pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_decimal(deserializer)?.unwrap_or(Decimal::ZERO))
}

pub fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => parse_decimal_value(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {}", value))),
    }
}

pub fn optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Flag sent as `true`, `1`, `"1"` or `"true"`; missing means `true`.
pub fn flag_default_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_flag(Option::<Value>::deserialize(deserializer)?).unwrap_or(true))
}

/// Flag sent as `true`, `1`, `"1"` or `"true"`; missing means `false`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_flag(Option::<Value>::deserialize(deserializer)?).unwrap_or(false))
}

fn parse_flag(value: Option<Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "active" => Some(true),
            "0" | "false" | "no" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn default_true() -> bool {
    true
}

/// Date part of a backend timestamp (`2024-05-01` or `2024-05-01T08:00:00Z`).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let date = s.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Case-insensitive containment; `needle` must already be lowercase.
pub fn matches_term(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Normalised search term, `None` when blank.
pub fn search_term(search: Option<&str>) -> Option<String> {
    search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Keep a date within an optional inclusive range. Undated records only pass
/// an unbounded range.
pub fn within_range(date: Option<NaiveDate>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    if from.is_none() && to.is_none() {
        return true;
    }
    match date {
        Some(d) => from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t),
        None => false,
    }
}

/// A money or quantity computation left the range `Decimal` can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("amounts are too large to compute")]
pub struct AmountOverflow;

impl From<AmountOverflow> for crate::error::ApiError {
    fn from(err: AmountOverflow) -> Self {
        crate::error::ApiError::invalid("amount", format!("The {}", err))
    }
}

/// Sum that reports overflow instead of panicking.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, AmountOverflow> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, v| total.checked_add(v).ok_or(AmountOverflow))
}

pub fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, AmountOverflow> {
    a.checked_add(b).ok_or(AmountOverflow)
}

pub fn checked_sub(a: Decimal, b: Decimal) -> Result<Decimal, AmountOverflow> {
    a.checked_sub(b).ok_or(AmountOverflow)
}

pub fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, AmountOverflow> {
    a.checked_mul(b).ok_or(AmountOverflow)
}

pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), crate::error::ApiError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(crate::error::ApiError::invalid(
            field,
            format!("The {} must not be negative", field.replace('_', " ")),
        ));
    }
    Ok(())
}

pub fn ensure_present(field: &str, value: &str) -> Result<(), crate::error::ApiError> {
    if value.trim().is_empty() {
        return Err(crate::error::ApiError::invalid(
            field,
            format!("The {} field is required", field.replace('_', " ")),
        ));
    }
    Ok(())
}
