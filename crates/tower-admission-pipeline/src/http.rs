//! Helpers for running the pipeline over `http::Request` stacks.
//!
//! Servers insert a [`ClientAddr`] extension when they accept a connection;
//! [`source_key_for`] then derives the admission key from it plus the
//! method and path. Correlation ids follow the read-or-generate rule: an
//! inbound `x-trace-id` / `x-request-id` is kept, a missing one is minted,
//! and both are echoed on the response.

use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::{Request, Response, StatusCode};
use std::net::IpAddr;
use tower_admission_core::{AdmissionError, SourceKey};
use uuid::Uuid;

/// Trace id header, propagated across service hops.
pub const TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");
/// Request id header, unique per request.
pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The peer address of the connection a request arrived on.
///
/// Inserted into request extensions by the server glue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

/// Derives the admission key for an HTTP request.
///
/// The client component comes from the [`ClientAddr`] extension, falling
/// back to `"unknown"` so requests without one still share a single
/// bucket instead of bypassing the limiter.
pub fn source_key_for<B>(req: &Request<B>) -> SourceKey {
    let client = req
        .extensions()
        .get::<ClientAddr>()
        .map(|addr| addr.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    SourceKey::new(&client, req.method().as_str(), req.uri().path())
}

/// Correlation ids attached to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationIds {
    /// Trace id, shared across hops.
    pub trace_id: String,
    /// Request id, unique to this request.
    pub request_id: String,
}

/// Reads the correlation headers, minting any that are absent, and writes
/// them back onto the request so the downstream sees them.
pub fn ensure_correlation_ids<B>(req: &mut Request<B>) -> CorrelationIds {
    let trace_id = header_or_uuid(req, &TRACE_ID);
    let request_id = header_or_uuid(req, &REQUEST_ID);
    CorrelationIds {
        trace_id,
        request_id,
    }
}

fn header_or_uuid<B>(req: &mut Request<B>, name: &HeaderName) -> String {
    if let Some(value) = req.headers().get(name).and_then(|v| v.to_str().ok()) {
        return value.to_string();
    }
    let id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        req.headers_mut().insert(name.clone(), value);
    }
    id
}

/// Echoes the correlation ids onto a response.
pub fn echo_correlation_ids<B>(resp: &mut Response<B>, ids: &CorrelationIds) {
    if let Ok(value) = HeaderValue::from_str(&ids.trace_id) {
        resp.headers_mut().insert(TRACE_ID, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ids.request_id) {
        resp.headers_mut().insert(REQUEST_ID, value);
    }
}

/// Logs a pipeline error with the request's correlation ids.
///
/// Call this before mapping the error to a response so every rejection is
/// attributable to a trace.
#[allow(unused_variables)]
pub fn log_rejection<E: std::fmt::Display>(err: &AdmissionError<E>, ids: &CorrelationIds) {
    #[cfg(feature = "tracing")]
    tracing::warn!(
        trace_id = %ids.trace_id,
        request_id = %ids.request_id,
        error = %err,
        "request rejected by admission pipeline"
    );
}

/// Maps a pipeline error to the HTTP status a handler should return.
pub fn status_for<E>(err: &AdmissionError<E>) -> StatusCode {
    match err {
        AdmissionError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        AdmissionError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AdmissionError::RetryExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AdmissionError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        AdmissionError::PanicRecovered { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the rejection response for a pipeline error: the mapped status
/// plus a `Retry-After` header (rounded up to whole seconds) for rate
/// limit rejections.
pub fn rejection_response<E>(err: &AdmissionError<E>) -> Response<()> {
    let mut resp = Response::new(());
    *resp.status_mut() = status_for(err);
    if let AdmissionError::RateLimitExceeded {
        retry_after: Some(wait),
    } = err
    {
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            resp.headers_mut().insert(RETRY_AFTER, value);
        }
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).unwrap()
    }

    #[test]
    fn key_uses_client_extension_method_and_path() {
        let mut req = request("/users/42");
        req.extensions_mut()
            .insert(ClientAddr("10.0.0.7".parse().unwrap()));
        assert_eq!(source_key_for(&req).as_str(), "10.0.0.7:GET:/users/42");
    }

    #[test]
    fn missing_client_falls_back_to_a_shared_bucket() {
        let req = request("/users");
        assert_eq!(source_key_for(&req).as_str(), "unknown:GET:/users");
    }

    #[test]
    fn inbound_ids_are_kept_and_missing_ones_minted() {
        let mut req = request("/");
        req.headers_mut()
            .insert(TRACE_ID, HeaderValue::from_static("trace-123"));

        let ids = ensure_correlation_ids(&mut req);
        assert_eq!(ids.trace_id, "trace-123");
        assert!(!ids.request_id.is_empty());
        // The minted id is visible to the downstream too.
        assert_eq!(
            req.headers().get(&REQUEST_ID).unwrap().to_str().unwrap(),
            ids.request_id
        );
    }

    #[test]
    fn ids_echo_onto_the_response() {
        let ids = CorrelationIds {
            trace_id: "trace-123".to_string(),
            request_id: "req-456".to_string(),
        };
        let mut resp = Response::new(());
        echo_correlation_ids(&mut resp, &ids);
        assert_eq!(resp.headers().get(&TRACE_ID).unwrap(), "trace-123");
        assert_eq!(resp.headers().get(&REQUEST_ID).unwrap(), "req-456");
    }

    #[test]
    fn status_mapping() {
        let rate: AdmissionError<String> = AdmissionError::RateLimitExceeded {
            retry_after: Some(Duration::from_millis(1500)),
        };
        let open: AdmissionError<String> = AdmissionError::CircuitOpen { name: None };
        let deadline: AdmissionError<String> = AdmissionError::DeadlineExceeded {
            after: Duration::from_secs(2),
        };
        assert_eq!(status_for(&rate), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&open), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&deadline), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn rate_limit_rejection_carries_retry_after_rounded_up() {
        let err: AdmissionError<String> = AdmissionError::RateLimitExceeded {
            retry_after: Some(Duration::from_millis(1500)),
        };
        let resp = rejection_response(&err);
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(RETRY_AFTER).unwrap(), "2");
    }
}
