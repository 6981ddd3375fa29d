//! Read-only view of the parts of a SIP request that routing looks at

use std::collections::HashMap;

/// Accessor for the request fields the selection engine reads.
///
/// Message parsing lives elsewhere; implementors adapt their own request type.
/// Every method returns `None` when the value is absent.
pub trait RequestView {
    /// Value of the Call-ID header
    fn call_id(&self) -> Option<&str>;

    /// URI carried in the To header
    fn to_uri(&self) -> Option<&str>;

    /// The request-URI
    fn request_uri(&self) -> Option<&str>;

    /// First value of an arbitrary header, matched case-insensitively
    fn header(&self, name: &str) -> Option<&str>;

    /// Message body as text
    fn body(&self) -> Option<&str>;
}

/// Owned request data for callers that have already parsed their message
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    request_uri: Option<String>,
    call_id: Option<String>,
    to_uri: Option<String>,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl RoutingRequest {
    pub fn new(request_uri: impl Into<String>) -> Self {
        Self {
            request_uri: Some(request_uri.into()),
            ..Default::default()
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_to_uri(mut self, to_uri: impl Into<String>) -> Self {
        self.to_uri = Some(to_uri.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

impl RequestView for RoutingRequest {
    fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    fn to_uri(&self) -> Option<&str> {
        self.to_uri.as_deref()
    }

    fn request_uri(&self) -> Option<&str> {
        self.request_uri.as_deref()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let request = RoutingRequest::new("sip:bob@example.com")
            .with_header("Ms-Conversation-ID", "conv-1");

        assert_eq!(request.header("ms-conversation-id"), Some("conv-1"));
        assert_eq!(request.header("MS-CONVERSATION-ID"), Some("conv-1"));
        assert_eq!(request.header("X-Other"), None);
    }

    #[test]
    fn test_absent_fields() {
        let request = RoutingRequest::default();
        assert!(request.request_uri().is_none());
        assert!(request.call_id().is_none());
        assert!(request.to_uri().is_none());
        assert!(request.body().is_none());
    }
}
