//! Request ids. Each incoming request gets one (or keeps the caller's), it is
//! echoed on the response, and `CallContext` forwards it on backend calls so a
//! dashboard request can be followed into the backend's logs.

use axum::http::{HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// The two halves of request id handling, applied at different depths of
/// the layer stack.
pub struct RequestIdLayers {
    pub set: SetRequestIdLayer<MakeRequestUuid>,
    pub propagate: PropagateRequestIdLayer,
}

impl RequestIdLayers {
    pub fn new() -> Self {
        let header = HeaderName::from_static(X_REQUEST_ID);
        Self {
            set: SetRequestIdLayer::new(header.clone(), MakeRequestUuid),
            propagate: PropagateRequestIdLayer::new(header),
        }
    }
}

impl Default for RequestIdLayers {
    fn default() -> Self {
        Self::new()
    }
}

/// Request id of an incoming request, once the set layer has run.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(X_REQUEST_ID)?
        .to_str()
        .ok()
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_request_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), None);

        headers.insert(X_REQUEST_ID, HeaderValue::from_static("req-42"));
        assert_eq!(request_id(&headers), Some("req-42"));

        headers.insert(X_REQUEST_ID, HeaderValue::from_static(""));
        assert_eq!(request_id(&headers), None);
    }
}
