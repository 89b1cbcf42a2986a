//! Request ID middleware for tracing.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestId(pub Arc<str>);

impl RequestId {
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = extract_or_generate_request_id(&request);

    request.extensions_mut().insert(request_id.clone());

    let method = request.method().clone();
    let uri = request.uri().clone();
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), header_value);
    }
    response
}

fn extract_or_generate_request_id(request: &Request) -> RequestId {
    if let Some(id) = request.headers().get(&REQUEST_ID_HEADER) {
        if let Ok(id_str) = id.to_str() {
            if is_valid_request_id(id_str) {
                return RequestId::from_string(id_str);
            }
        }
    }

    RequestId::new()
}

fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1.as_str(), id2.as_str());
    }

    #[test]
    fn test_request_id_from_string() {
        let id = RequestId::from_string("test-request-id-123");
        assert_eq!(id.as_str(), "test-request-id-123");
        assert_eq!(format!("{}", id), "test-request-id-123");
    }

    #[test]
    fn test_valid_request_id() {
        assert!(is_valid_request_id("abc123"));
        assert!(is_valid_request_id("abc-123_XYZ"));
        assert!(is_valid_request_id("a".repeat(128).as_str()));
    }

    #[test]
    fn test_invalid_request_id() {
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("abc 123"));
        assert!(!is_valid_request_id("abc@123"));
        assert!(!is_valid_request_id("a".repeat(129).as_str()));
    }
}
