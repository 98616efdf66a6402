//! Correlation IDs.
//!
//! Every inbound request carries exactly one ID. It is:
//!
//! - Accepted from the caller if they already send the configured header
//! - Freshly generated otherwise ([`generate_request_id`])
//! - Stored as an axum [`Extension`](axum::Extension) so handlers can read it
//! - Echoed back under the same header on the response
//!
//! Resolution itself happens in [`lifecycle`](super::lifecycle); this module
//! only defines the ID and how it is read from a header.

use axum::http::{HeaderMap, HeaderName};
use uuid::Uuid;

/// Length of a generated ID.
pub const REQUEST_ID_LEN: usize = 32;

/// Newtype wrapper carrying the resolved request ID.
///
/// Exposed as an axum extension so any handler can read it:
/// ```rust,ignore
/// async fn handler(Extension(req_id): Extension<RequestId>) { ... }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A new random ID: UUID v4 as 32 lowercase hex characters, no hyphens.
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The caller-supplied ID under `header`, ignoring empty and non-UTF-8 values.
///
/// The value is returned exactly as sent so it can be echoed back unchanged.
pub fn inbound_request_id(headers: &HeaderMap, header: &HeaderName) -> Option<String> {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn generated_ids_are_hex_without_hyphens() {
        let id = generate_request_id();
        assert_eq!(id.len(), REQUEST_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_request_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn inbound_id_is_read_from_the_configured_header() {
        let header = HeaderName::from_static("x-correlation-id");
        let mut headers = HeaderMap::new();
        assert_eq!(inbound_request_id(&headers, &header), None);

        headers.insert(header.clone(), HeaderValue::from_static(""));
        assert_eq!(inbound_request_id(&headers, &header), None);

        headers.insert(header.clone(), HeaderValue::from_static("abc-123"));
        assert_eq!(inbound_request_id(&headers, &header).as_deref(), Some("abc-123"));

        headers.insert(header.clone(), HeaderValue::from_static(" abc-123 "));
        assert_eq!(inbound_request_id(&headers, &header).as_deref(), Some(" abc-123 "));
    }
}
