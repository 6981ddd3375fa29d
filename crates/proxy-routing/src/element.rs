//! Server group elements: the candidate destinations a request can be routed to

use crate::errors::{Result, RoutingError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Default priority of an element when none is configured
pub const DEFAULT_Q_VALUE: f32 = 1.0;

/// Default SIP port for next hops
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Transport used to reach a next hop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
            Transport::Tls => write!(f, "tls"),
        }
    }
}

impl FromStr for Transport {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            "tls" => Ok(Transport::Tls),
            other => Err(RoutingError::Config(format!("Unknown transport: {}", other))),
        }
    }
}

/// Network address of a leaf next hop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Network (listen point label) the next hop is reached through
    pub network: String,
    /// Host name or IP address
    pub host: String,
    /// Port
    pub port: u16,
    /// Transport
    pub transport: Transport,
}

impl Endpoint {
    pub fn new(network: impl Into<String>, host: impl Into<String>, port: u16, transport: Transport) -> Self {
        Self {
            network: network.into(),
            host: host.into(),
            port,
            transport,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{};transport={}", self.host, self.port, self.transport)
    }
}

/// Identity of an element, used for availability lookups and duplicate checks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementId {
    /// A leaf destination
    NextHop(Endpoint),
    /// A reference to another server group, resolved by the caller
    ServerGroup(String),
}

impl ElementId {
    /// Whether this identity denotes a leaf destination
    pub fn is_next_hop(&self) -> bool {
        matches!(self, ElementId::NextHop(_))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::NextHop(endpoint) => write!(f, "{}", endpoint),
            ElementId::ServerGroup(name) => write!(f, "sg:{}", name),
        }
    }
}

/// One candidate in a server group.
///
/// Elements are immutable once created. The `sequence` number is assigned when
/// the element is added to a group and is the tie-break between elements that
/// share a q-value, so the candidate order never depends on memory layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    id: ElementId,
    q_value: f32,
    weight: u32,
    sequence: u64,
}

impl Element {
    /// Create a leaf next hop
    pub fn next_hop(endpoint: Endpoint, q_value: f32, weight: u32) -> Result<Self> {
        Self::new(ElementId::NextHop(endpoint), q_value, weight)
    }

    /// Create a reference to a nested server group
    pub fn server_group_ref(name: impl Into<String>, q_value: f32, weight: u32) -> Result<Self> {
        Self::new(ElementId::ServerGroup(name.into()), q_value, weight)
    }

    fn new(id: ElementId, q_value: f32, weight: u32) -> Result<Self> {
        if !q_value.is_finite() || q_value < 0.0 {
            return Err(RoutingError::InvalidElement(format!(
                "{} has invalid q-value {}",
                id, q_value
            )));
        }
        Ok(Self {
            id,
            // -0.0 becomes 0.0 so ordering and tier equality agree
            q_value: q_value + 0.0,
            weight,
            sequence: 0,
        })
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn q_value(&self) -> f32 {
        self.q_value
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Position of the element within its group's insertion order
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_server_group_ref(&self) -> bool {
        !self.id.is_next_hop()
    }

    /// The endpoint of a leaf next hop
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match &self.id {
            ElementId::NextHop(endpoint) => Some(endpoint),
            ElementId::ServerGroup(_) => None,
        }
    }

    /// Name of the referenced group for a sub-group element
    pub fn server_group_name(&self) -> Option<&str> {
        match &self.id {
            ElementId::ServerGroup(name) => Some(name),
            ElementId::NextHop(_) => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} q={} w={}", self.id, self.q_value, self.weight)
    }
}

/// Order in which candidates are considered: highest q-value first, then
/// insertion sequence.
pub fn selection_order(a: &Element, b: &Element) -> Ordering {
    b.q_value
        .total_cmp(&a.q_value)
        .then_with(|| a.sequence.cmp(&b.sequence))
}
