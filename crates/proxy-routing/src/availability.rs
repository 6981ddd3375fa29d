//! Liveness of next hops as seen by the selection engine
//!
//! The engine asks an [`AvailabilityProvider`] synchronously on the routing
//! path, so implementations must answer from memory without blocking. The
//! [`EndpointStatusTable`] is the in-process implementation, fed by whatever
//! detects failures (transaction timeouts, failover responses, pings).

use crate::config::RetryConfig;
use crate::element::{Element, ElementId, Endpoint, Transport};
use crate::errors::AvailabilityError;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Answers whether an element may currently be routed to
pub trait AvailabilityProvider: Send + Sync {
    fn is_available(&self, element: &ElementId) -> Result<bool, AvailabilityError>;

    /// Whether the element is a leaf destination rather than a nested group
    fn is_next_hop(&self, element: &ElementId) -> bool {
        element.is_next_hop()
    }
}

/// Availability with provider failures treated as "unavailable"
pub fn is_usable(provider: &dyn AvailabilityProvider, element: &Element) -> bool {
    match provider.is_available(element.id()) {
        Ok(available) => available,
        Err(e) => {
            warn!("Treating {} as unavailable: {}", element.id(), e);
            false
        }
    }
}

/// Provider that reports every element as available
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl AvailabilityProvider for AlwaysAvailable {
    fn is_available(&self, _element: &ElementId) -> Result<bool, AvailabilityError> {
        Ok(true)
    }
}

/// Point-in-time view of an endpoint's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStats {
    pub tries_left: u32,
    pub max_tries: u32,
    pub overloaded: bool,
    pub active_usage: u64,
    pub usage_limit: Option<u64>,
    pub total_usage: u64,
    pub total_failures: u64,
}

#[derive(Debug, Clone)]
struct EndpointState {
    tries_left: u32,
    max_tries: u32,
    retry_after_until: Option<Instant>,
    usage_limit: Option<u64>,
    active_usage: u64,
    total_usage: u64,
    total_failures: u64,
}

impl EndpointState {
    fn new(max_tries: u32) -> Self {
        Self {
            tries_left: max_tries,
            max_tries,
            retry_after_until: None,
            usage_limit: None,
            active_usage: 0,
            total_usage: 0,
            total_failures: 0,
        }
    }

    fn is_reachable(&self) -> bool {
        self.tries_left > 0
    }

    fn is_overloaded(&self, now: Instant) -> bool {
        matches!(self.retry_after_until, Some(until) if now < until)
    }

    fn under_usage_limit(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.active_usage < limit)
    }

    fn is_available(&self, now: Instant) -> bool {
        self.is_reachable() && !self.is_overloaded(now) && self.under_usage_limit()
    }
}

/// Per-endpoint liveness state shared by every routing attempt.
///
/// Each endpoint has a try budget taken from [`RetryConfig`] for its transport.
/// Failures consume the budget and an endpoint with no tries left is
/// unreachable until a success or a reset. Endpoints never seen before are
/// available.
#[derive(Debug)]
pub struct EndpointStatusTable {
    retries: RetryConfig,
    endpoints: DashMap<Endpoint, EndpointState>,
}

impl EndpointStatusTable {
    pub fn new(retries: RetryConfig) -> Self {
        Self {
            retries,
            endpoints: DashMap::new(),
        }
    }

    fn max_tries(&self, transport: Transport) -> u32 {
        match transport {
            Transport::Udp => self.retries.udp,
            Transport::Tcp => self.retries.tcp,
            Transport::Tls => self.retries.tls,
        }
    }

    fn with_state<T>(&self, endpoint: &Endpoint, f: impl FnOnce(&mut EndpointState) -> T) -> T {
        let max_tries = self.max_tries(endpoint.transport);
        let mut state = self
            .endpoints
            .entry(endpoint.clone())
            .or_insert_with(|| EndpointState::new(max_tries));
        f(state.value_mut())
    }

    /// Whether `endpoint` is reachable, not overloaded and under its usage limit
    pub fn is_endpoint_available(&self, endpoint: &Endpoint) -> bool {
        self.endpoints
            .get(endpoint)
            .map_or(true, |state| state.is_available(Instant::now()))
    }

    /// Consume one try. Returns `true` if this failure made the endpoint unreachable.
    pub fn record_failure(&self, endpoint: &Endpoint) -> bool {
        let became_unreachable = self.with_state(endpoint, |state| {
            state.total_failures += 1;
            if state.tries_left == 0 {
                return false;
            }
            state.tries_left -= 1;
            state.tries_left == 0
        });
        if became_unreachable {
            info!("{} is UNAVAILABLE", endpoint);
        }
        became_unreachable
    }

    /// Mark the endpoint unreachable immediately
    pub fn mark_unreachable(&self, endpoint: &Endpoint) {
        let was_reachable = self.with_state(endpoint, |state| {
            let was_reachable = state.is_reachable();
            state.tries_left = 0;
            was_reachable
        });
        if was_reachable {
            info!("{} is UNAVAILABLE", endpoint);
        }
    }

    /// Restore the full try budget, e.g. after a successful transaction
    pub fn record_success(&self, endpoint: &Endpoint) {
        let was_unreachable = self.with_state(endpoint, |state| {
            let was_unreachable = !state.is_reachable();
            state.tries_left = state.max_tries;
            was_unreachable
        });
        if was_unreachable {
            info!("{} is AVAILABLE", endpoint);
        }
    }

    /// Treat the endpoint as overloaded for `duration` (a Retry-After response)
    pub fn set_retry_after(&self, endpoint: &Endpoint, duration: Duration) {
        self.with_state(endpoint, |state| {
            state.retry_after_until = Some(Instant::now() + duration);
        });
        info!("{} is OVERLOADED for {:?}", endpoint, duration);
    }

    pub fn clear_retry_after(&self, endpoint: &Endpoint) {
        self.with_state(endpoint, |state| state.retry_after_until = None);
    }

    /// Cap the number of concurrent uses, or remove the cap with `None`
    pub fn set_usage_limit(&self, endpoint: &Endpoint, limit: Option<u64>) {
        self.with_state(endpoint, |state| state.usage_limit = limit);
    }

    /// Count a new use of the endpoint (a call routed to it)
    pub fn acquire(&self, endpoint: &Endpoint) {
        self.with_state(endpoint, |state| {
            state.active_usage += 1;
            state.total_usage += 1;
        });
    }

    /// Count the end of a use started with [`acquire`](Self::acquire)
    pub fn release(&self, endpoint: &Endpoint) {
        self.with_state(endpoint, |state| {
            state.active_usage = state.active_usage.saturating_sub(1);
        });
    }

    /// Forget all state for the endpoint
    pub fn reset(&self, endpoint: &Endpoint) {
        self.endpoints.remove(endpoint);
    }

    pub fn stats(&self, endpoint: &Endpoint) -> Option<EndpointStats> {
        let now = Instant::now();
        self.endpoints.get(endpoint).map(|state| EndpointStats {
            tries_left: state.tries_left,
            max_tries: state.max_tries,
            overloaded: state.is_overloaded(now),
            active_usage: state.active_usage,
            usage_limit: state.usage_limit,
            total_usage: state.total_usage,
            total_failures: state.total_failures,
        })
    }
}

impl AvailabilityProvider for EndpointStatusTable {
    fn is_available(&self, element: &ElementId) -> Result<bool, AvailabilityError> {
        match element {
            ElementId::NextHop(endpoint) => Ok(self.is_endpoint_available(endpoint)),
            ElementId::ServerGroup(_) => Ok(true),
        }
    }
}
