//! Load balancing policies and the request keys they hash on

use crate::errors::{Result, RoutingError};
use crate::request::RequestView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Header carrying the correlation id shared by the legs of one conversation
pub const CORRELATION_HEADER: &str = "Ms-Conversation-ID";

/// Key used by the `constant` policy, and by every hash policy when the request
/// carries nothing usable to hash on
pub const FALLBACK_KEY: &str = "rvoip-proxy-routing";

/// Load balancing policy configured on a server group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Policy {
    /// Use the proxy-wide default policy
    #[default]
    Global,
    /// Always take the first candidate of the highest tier
    HighestQ,
    /// Hash on the request-URI
    RequestUri,
    /// Hash on the Call-ID
    CallId,
    /// Hash on the To URI
    ToUri,
    /// Weighted random selection
    Weight,
    /// Hash on the correlation header, pinning auxiliary media legs
    MsConversationId,
    /// Hash on a fixed key
    Constant,
}

impl Policy {
    pub const ALL: [Policy; 8] = [
        Policy::Global,
        Policy::HighestQ,
        Policy::RequestUri,
        Policy::CallId,
        Policy::ToUri,
        Policy::Weight,
        Policy::MsConversationId,
        Policy::Constant,
    ];

    /// Configuration token for this policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Global => "global",
            Policy::HighestQ => "highest-q",
            Policy::RequestUri => "request-uri",
            Policy::CallId => "call-id",
            Policy::ToUri => "to-uri",
            Policy::Weight => "weight",
            Policy::MsConversationId => "ms-conversation-id",
            Policy::Constant => "constant",
        }
    }

    /// Replace `Global` with the proxy-wide default.
    ///
    /// A default that is itself `Global` resolves to `RequestUri`.
    pub fn resolve(self, default: Policy) -> Policy {
        match (self, default) {
            (Policy::Global, Policy::Global) => Policy::RequestUri,
            (Policy::Global, default) => default,
            (policy, _) => policy,
        }
    }

    /// Where a hash policy takes its key from
    pub fn key_source(&self) -> Option<KeySource> {
        match self {
            Policy::RequestUri => Some(KeySource::RequestUri),
            Policy::CallId => Some(KeySource::CallId),
            Policy::ToUri => Some(KeySource::ToUri),
            Policy::MsConversationId => Some(KeySource::Header(CORRELATION_HEADER.to_string())),
            Policy::Constant => Some(KeySource::Constant),
            Policy::Global | Policy::HighestQ | Policy::Weight => None,
        }
    }

    /// Whether unavailable next hops stay in the candidate pool so the policy
    /// can decide per leg
    pub fn keeps_unavailable_next_hops(&self) -> bool {
        matches!(self, Policy::MsConversationId)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        Policy::ALL
            .iter()
            .copied()
            .find(|policy| policy.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| RoutingError::UnknownPolicy(token.to_string()))
    }
}

impl TryFrom<String> for Policy {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Policy> for String {
    fn from(policy: Policy) -> Self {
        policy.as_str().to_string()
    }
}

/// Request field a hash policy derives its key from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    CallId,
    ToUri,
    RequestUri,
    /// A header value, falling back to the request-URI when the header is absent
    Header(String),
    Constant,
}

impl KeySource {
    /// Extract the hash key from `request`.
    ///
    /// Missing or blank values are logged and replaced: a correlation header
    /// falls back to the request-URI, everything else to [`FALLBACK_KEY`].
    pub fn derive(&self, request: &dyn RequestView) -> String {
        let derived = match self {
            KeySource::CallId => usable(request.call_id()),
            KeySource::ToUri => usable(request.to_uri()).map(strip_angle_brackets),
            KeySource::RequestUri => usable(request.request_uri()),
            KeySource::Header(name) => match usable(request.header(name)) {
                Some(value) => Some(value),
                None => usable(request.request_uri()),
            },
            KeySource::Constant => return FALLBACK_KEY.to_string(),
        };

        match derived {
            Some(key) => key.to_string(),
            None => {
                warn!(
                    "Request has no usable {:?} to hash on, using fallback key",
                    self
                );
                FALLBACK_KEY.to_string()
            }
        }
    }
}

fn usable(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn strip_angle_brackets(uri: &str) -> &str {
    uri.strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .map(str::trim)
        .unwrap_or(uri)
}
