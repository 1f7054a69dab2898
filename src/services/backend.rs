//! Client for the distribution backend's REST API.
//!
//! Every call carries the caller's bearer token and request id. GETs retry
//! transient failures (transport errors, 502/503/504) with exponential
//! backoff; writes are sent once. Backend statuses are mapped onto
//! `ApiError` so handlers can pass them straight through.

use anyhow::Context;
use axum::http::HeaderMap;
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::AuthContext;
use crate::domain::common::{ItemEnvelope, ListEnvelope};
use crate::error::{ApiError, FieldErrors};
use crate::middleware::{request_id, X_REQUEST_ID};

/// Credentials and correlation id forwarded on a backend call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub token: &'a str,
    pub request_id: Option<&'a str>,
    pub idempotency_key: Option<&'a str>,
}

impl<'a> CallContext<'a> {
    pub fn new(auth: &'a AuthContext, headers: &'a HeaderMap) -> Self {
        Self {
            token: auth.token(),
            request_id: request_id(headers),
            idempotency_key: None,
        }
    }

    pub fn with_token(token: &'a str) -> Self {
        Self {
            token,
            request_id: None,
            idempotency_key: None,
        }
    }

    /// Attach an `Idempotency-Key` so a replayed write is applied once.
    pub fn idempotent(self, key: &'a str) -> Self {
        Self {
            idempotency_key: Some(key),
            ..self
        }
    }
}

/// Error body shape used by the backend (Laravel style).
#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<FieldErrors>,
}

/// Client for the backend REST API.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    retry_max_elapsed: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout_seconds: u64, retry_max_elapsed_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, "Backend client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_max_elapsed: Duration::from_millis(retry_max_elapsed_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, ctx: CallContext<'_>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method, &url)
            .bearer_auth(ctx.token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(rid) = ctx.request_id {
            req = req.header(X_REQUEST_ID, rid);
        }
        if let Some(key) = ctx.idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        req
    }

    /// GET with retry on transient failures.
    #[instrument(skip(self, query, ctx))]
    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        ctx: CallContext<'_>,
    ) -> Result<R, ApiError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(self.retry_max_elapsed))
            .build();

        let response = backoff::future::retry(policy, || {
            let req = self.request(Method::GET, path, ctx).query(query);
            async move {
                let response = req.send().await.map_err(|e| {
                    let err = transport_error(e);
                    debug!(error = %err, "Backend GET failed, may retry");
                    backoff::Error::transient(err)
                })?;
                if is_transient_status(response.status()) {
                    return Err(backoff::Error::transient(error_from_response(response).await));
                }
                Ok(response)
            }
        })
        .await?;

        decode(response).await
    }

    /// GET a collection, accepting bare or `{ data }` wrapped lists.
    pub async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        ctx: CallContext<'_>,
    ) -> Result<Vec<T>, ApiError> {
        let envelope: ListEnvelope<T> = self.get(path, query, ctx).await?;
        Ok(envelope.into_vec())
    }

    /// GET a single record, accepting bare or `{ data }` wrapped payloads.
    pub async fn get_item<T: DeserializeOwned>(&self, path: &str, ctx: CallContext<'_>) -> Result<T, ApiError> {
        let envelope: ItemEnvelope<T> = self.get(path, &[], ctx).await?;
        Ok(envelope.into_inner())
    }

    async fn send_once(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let response = req.send().await.map_err(transport_error)?;
        Ok(response)
    }

    #[instrument(skip(self, body, ctx))]
    pub async fn post<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
        ctx: CallContext<'_>,
    ) -> Result<R, ApiError> {
        let response = self
            .send_once(self.request(Method::POST, path, ctx).json(body))
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, body, ctx))]
    pub async fn put<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
        ctx: CallContext<'_>,
    ) -> Result<R, ApiError> {
        let response = self
            .send_once(self.request(Method::PUT, path, ctx).json(body))
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete(&self, path: &str, ctx: CallContext<'_>) -> Result<(), ApiError> {
        let response = self.send_once(self.request(Method::DELETE, path, ctx)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Check the backend answers at all. Any non-5xx answer counts, since the
    /// health route may sit behind auth.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let url = format!("{}/api/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("Backend health check failed")?;

        if response.status().is_server_error() {
            anyhow::bail!("Backend unhealthy: {}", response.status());
        }
        Ok(())
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_builder() {
        return ApiError::Internal(anyhow::anyhow!("Invalid backend request: {}", e));
    }
    warn!(error = %e, timeout = e.is_timeout(), "Backend unreachable");
    ApiError::Offline(e.to_string())
}

/// Decode a response body. Empty bodies decode as JSON `null`.
async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, ApiError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Offline(format!("Backend response interrupted: {}", e)))?;
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &bytes
    };

    serde_json::from_slice(body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse backend response");
        ApiError::Internal(anyhow::anyhow!("Invalid backend response: {}", e))
    })
}

/// Map a non-success backend response onto `ApiError`.
pub async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let body = response.json::<BackendErrorBody>().await.ok();

    let message = body
        .as_ref()
        .and_then(|b| b.message.clone().or_else(|| b.error.clone()))
        .unwrap_or_else(|| format!("Backend responded with {}", status));

    match status {
        StatusCode::BAD_REQUEST => ApiError::BadRequest(message),
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation {
            message,
            errors: body.and_then(|b| b.errors).unwrap_or_default(),
        },
        s if is_transient_status(s) => ApiError::Offline(message),
        s => ApiError::Upstream {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_are_transient() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("http://backend.local/", 5, 0).unwrap();
        assert_eq!(client.base_url(), "http://backend.local");
    }
}
