//! # RVoIP Proxy Routing
//!
//! Next-hop selection for SIP proxies routing requests to server groups.
//!
//! A server group is a named set of candidate destinations, each with a
//! priority (q-value) and a weight. For every request being proxied the caller
//! creates a [`SelectionContext`] and asks it for destinations one at a time.
//! The context:
//!
//! - only offers candidates from the highest q-value tier still untried,
//! - picks inside a tier according to the group's [`Policy`] (hash on Call-ID,
//!   To URI, request-URI or a correlation header, weighted random, or first
//!   in order),
//! - never returns the same destination twice, and
//! - reports exhaustion as `None`.
//!
//! ## Architecture
//!
//! ```text
//! ServerGroupRepository ──snapshot──▶ SelectionContext ◀── AvailabilityProvider
//!        (arc-swap)                    │  candidates          (EndpointStatusTable)
//!                                      │  tiering
//!                                      ▼
//!                                 TierStrategy ── DeterministicHasher
//!                                              └─ WeightedSelector
//! ```
//!
//! Everything here is synchronous and allocation-light; contexts are owned by
//! a single routing attempt while group snapshots and liveness state are
//! shared across threads.
//!
//! What triggers a retry is up to the caller: [`FailoverCodes`] holds the
//! response codes that should, per server group.

pub mod availability;
pub mod candidates;
pub mod classify;
pub mod config;
pub mod context;
pub mod element;
pub mod errors;
pub mod failover;
pub mod group;
pub mod hash;
pub mod logging;
pub mod policy;
pub mod repository;
pub mod request;
pub mod strategy;
pub mod weighted;

// Re-export key types
pub use availability::{AlwaysAvailable, AvailabilityProvider, EndpointStatusTable};
pub use classify::{LegClass, LegClassifier, SdpMediaClassifier};
pub use config::ProxyRoutingConfig;
pub use context::{ContextFactory, SelectionContext};
pub use element::{Element, ElementId, Endpoint, Transport};
pub use errors::{Result, RoutingError};
pub use failover::{FailoverCodeSet, FailoverCodes};
pub use group::ServerGroup;
pub use hash::DeterministicHasher;
pub use policy::Policy;
pub use repository::{MembershipProvider, ServerGroupRepository};
pub use request::{RequestView, RoutingRequest};

pub mod prelude {
    pub use crate::availability::{AlwaysAvailable, AvailabilityProvider, EndpointStatusTable};
    pub use crate::classify::{LegClass, LegClassifier, SdpMediaClassifier};
    pub use crate::config::ProxyRoutingConfig;
    pub use crate::context::{ContextFactory, SelectionContext};
    pub use crate::element::{Element, ElementId, Endpoint, Transport};
    pub use crate::errors::RoutingError;
    pub use crate::failover::{FailoverCodeSet, FailoverCodes};
    pub use crate::group::ServerGroup;
    pub use crate::policy::Policy;
    pub use crate::repository::{MembershipProvider, ServerGroupRepository};
    pub use crate::request::{RequestView, RoutingRequest};
    pub use crate::weighted::{RandomSource, SeededRandom};
}
