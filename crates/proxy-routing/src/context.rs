//! Selection contexts: next-hop selection for one routing attempt sequence
//!
//! A [`SelectionContext`] is created when a request is about to be proxied to a
//! server group and lives until the caller stops retrying. Each call to
//! [`next`](SelectionContext::next) returns a destination not returned before;
//! after a send failure or a response in the failover code set the caller asks
//! again, until `None` signals that every candidate has been tried.
//!
//! ```
//! use std::sync::Arc;
//! use rvoip_proxy_routing::prelude::*;
//!
//! let group = ServerGroup::builder("sg-edge")
//!     .policy(Policy::CallId)
//!     .element(Element::next_hop(Endpoint::new("net", "10.0.0.1", 5060, Transport::Udp), 1.0, 0).unwrap())
//!     .element(Element::next_hop(Endpoint::new("net", "10.0.0.2", 5060, Transport::Udp), 0.5, 0).unwrap())
//!     .build()
//!     .unwrap();
//! let request = RoutingRequest::new("sip:bob@example.com").with_call_id("a84b4c76e66710");
//!
//! let mut context = SelectionContext::new(Arc::new(group), &request, Arc::new(AlwaysAvailable));
//! assert_eq!(context.next().unwrap().endpoint().unwrap().host, "10.0.0.1");
//! assert_eq!(context.next().unwrap().endpoint().unwrap().host, "10.0.0.2");
//! assert!(context.next().is_none());
//! ```

use crate::availability::AvailabilityProvider;
use crate::candidates::{Candidates, initialize_candidates};
use crate::classify::{LegClass, LegClassifier, SdpMediaClassifier};
use crate::element::{Element, ElementId};
use crate::errors::{Result, RoutingError};
use crate::group::ServerGroup;
use crate::policy::Policy;
use crate::repository::MembershipProvider;
use crate::request::RequestView;
use crate::strategy::{TierChoice, TierStrategy};
use crate::weighted::{RandomSource, ThreadRandom};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-attempt selection state. Not shared between requests.
pub struct SelectionContext {
    group: Arc<ServerGroup>,
    policy: Policy,
    key: Option<String>,
    leg: LegClass,
    availability: Arc<dyn AvailabilityProvider>,
    random: Box<dyn RandomSource>,
    remaining: Option<Candidates>,
    last_tried: Option<Element>,
}

impl SelectionContext {
    /// Context using the group's own policy; `global` resolves to `request-uri`
    pub fn new(
        group: Arc<ServerGroup>,
        request: &dyn RequestView,
        availability: Arc<dyn AvailabilityProvider>,
    ) -> Self {
        let policy = group.policy().resolve(Policy::RequestUri);
        Self::with_policy(group, request, policy, availability, &SdpMediaClassifier::default())
    }

    /// Context using an explicit policy and leg classifier
    pub fn with_policy(
        group: Arc<ServerGroup>,
        request: &dyn RequestView,
        policy: Policy,
        availability: Arc<dyn AvailabilityProvider>,
        classifier: &dyn LegClassifier,
    ) -> Self {
        let policy = policy.resolve(Policy::RequestUri);
        let key = policy.key_source().map(|source| source.derive(request));
        let leg = if policy == Policy::MsConversationId {
            classifier.classify(request)
        } else {
            LegClass::AvailabilityChecked
        };
        debug!(
            "Selection context for server group {} using {} (key {:?}, {:?})",
            group.name(),
            policy,
            key,
            leg
        );

        Self {
            group,
            policy,
            key,
            leg,
            availability,
            random: Box::new(ThreadRandom),
            remaining: None,
            last_tried: None,
        }
    }

    /// Replace the random source used by the weighted policy
    pub fn with_random_source(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn group(&self) -> &ServerGroup {
        &self.group
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// The key hash policies use when no explicit key is given
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn leg_class(&self) -> LegClass {
        self.leg
    }

    /// Next destination to try, or `None` once every candidate has been tried
    pub fn next(&mut self) -> Option<Element> {
        self.select(None)
    }

    /// Like [`next`](Self::next), hashing on `key` instead of the request's key.
    ///
    /// Lets related legs that already agreed on a key land on the same member.
    /// Policies that do not hash ignore the key.
    pub fn next_with_key(&mut self, key: &str) -> Option<Element> {
        self.select(Some(key))
    }

    /// Destination returned by the latest call to `next`
    pub fn last_tried(&self) -> Option<&Element> {
        self.last_tried.as_ref()
    }

    /// Candidates not yet returned. Zero before the first call to `next`.
    pub fn untried_count(&self) -> usize {
        self.remaining.as_ref().map_or(0, Candidates::len)
    }

    fn strategy(&self, key_override: Option<&str>) -> TierStrategy {
        let key = key_override
            .map(str::to_string)
            .or_else(|| self.key.clone())
            .unwrap_or_default();
        match self.policy {
            Policy::HighestQ => TierStrategy::First,
            Policy::Weight => TierStrategy::Weighted,
            Policy::MsConversationId => TierStrategy::Correlated { key, leg: self.leg },
            Policy::Global | Policy::RequestUri | Policy::CallId | Policy::ToUri | Policy::Constant => {
                TierStrategy::Hash { key }
            }
        }
    }

    fn select(&mut self, key_override: Option<&str>) -> Option<Element> {
        self.last_tried = None;
        let strategy = self.strategy(key_override);

        let mut remaining = match self.remaining.take() {
            Some(remaining) => remaining,
            None => initialize_candidates(
                &self.group,
                self.availability.as_ref(),
                self.policy.keeps_unavailable_next_hops(),
            ),
        };

        let selected = loop {
            let tier = remaining.top_tier();
            if tier.is_empty() {
                warn!("No more routes remain in server group {}", self.group.name());
                break None;
            }

            let TierChoice { chosen, skipped } =
                strategy.choose(tier, self.availability.as_ref(), self.random.as_mut());
            let chosen = chosen.map(|index| tier[index].clone());
            let mut consumed: Vec<ElementId> = skipped.iter().map(|&i| tier[i].id().clone()).collect();

            match chosen {
                Some(element) => {
                    consumed.push(element.id().clone());
                    remaining = remaining.without_all(&consumed);
                    break Some(element);
                }
                None if consumed.is_empty() => {
                    remaining = Candidates::default();
                }
                None => {
                    debug!("Tier exhausted, {} unavailable members skipped", consumed.len());
                    remaining = remaining.without_all(&consumed);
                }
            }
        };

        if let Some(element) = &selected {
            debug!(
                "Server group {} selected {} ({} untried)",
                self.group.name(),
                element,
                remaining.len()
            );
        }
        self.remaining = Some(remaining);
        self.last_tried = selected.clone();
        selected
    }
}

impl std::fmt::Debug for SelectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionContext")
            .field("group", &self.group.name())
            .field("policy", &self.policy)
            .field("key", &self.key)
            .field("leg", &self.leg)
            .field("remaining", &self.remaining)
            .field("last_tried", &self.last_tried)
            .finish()
    }
}

/// Creates selection contexts for named server groups
pub struct ContextFactory {
    membership: Arc<dyn MembershipProvider>,
    availability: Arc<dyn AvailabilityProvider>,
    classifier: Arc<dyn LegClassifier>,
    default_policy: Policy,
}

impl ContextFactory {
    pub fn new(
        membership: Arc<dyn MembershipProvider>,
        availability: Arc<dyn AvailabilityProvider>,
        default_policy: Policy,
    ) -> Self {
        Self {
            membership,
            availability,
            classifier: Arc::new(SdpMediaClassifier::default()),
            default_policy,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn LegClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Snapshot `group_name` and start a routing attempt for `request`
    pub fn create(&self, group_name: &str, request: &dyn RequestView) -> Result<SelectionContext> {
        let group = self
            .membership
            .server_group(group_name)
            .ok_or_else(|| RoutingError::ServerGroupNotFound(group_name.to_string()))?;
        let policy = group.policy().resolve(self.default_policy);
        Ok(SelectionContext::with_policy(
            group,
            request,
            policy,
            Arc::clone(&self.availability),
            self.classifier.as_ref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AlwaysAvailable;
    use crate::element::{Endpoint, Transport};
    use crate::request::RoutingRequest;

    fn hop(host: &str, q: f32, weight: u32) -> Element {
        Element::next_hop(Endpoint::new("net", host, 5060, Transport::Udp), q, weight).unwrap()
    }

    fn host(element: &Element) -> &str {
        &element.endpoint().unwrap().host
    }

    fn group(policy: Policy) -> Arc<ServerGroup> {
        Arc::new(
            ServerGroup::builder("sg")
                .policy(policy)
                .element(hop("a", 0.5, 1))
                .element(hop("b", 1.0, 1))
                .element(hop("c", 1.0, 1))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_highest_q_walks_group_in_order() {
        let request = RoutingRequest::new("sip:svc@example.com");
        let mut context = SelectionContext::new(group(Policy::HighestQ), &request, Arc::new(AlwaysAvailable));

        assert_eq!(context.untried_count(), 0);
        assert_eq!(host(&context.next().unwrap()), "b");
        assert_eq!(context.untried_count(), 2);
        assert_eq!(host(context.last_tried().unwrap()), "b");
        assert_eq!(host(&context.next().unwrap()), "c");
        assert_eq!(host(&context.next().unwrap()), "a");
        assert!(context.next().is_none());
        assert!(context.last_tried().is_none());
        assert!(context.next().is_none());
    }

    #[test]
    fn test_global_policy_resolves_to_request_uri() {
        let request = RoutingRequest::new("sip:svc@example.com");
        let context = SelectionContext::new(group(Policy::Global), &request, Arc::new(AlwaysAvailable));
        assert_eq!(context.policy(), Policy::RequestUri);
        assert_eq!(context.key(), Some("sip:svc@example.com"));
    }

    #[test]
    fn test_explicit_key_overrides_request_key() {
        let request = RoutingRequest::new("sip:svc@example.com").with_call_id("unrelated");
        let members = ServerGroup::builder("sg")
            .policy(Policy::CallId)
            .element(hop("a", 1.0, 0))
            .element(hop("b", 1.0, 0))
            .element(hop("c", 1.0, 0))
            .element(hop("d", 1.0, 0))
            .build()
            .unwrap();
        let mut context = SelectionContext::new(Arc::new(members), &request, Arc::new(AlwaysAvailable));

        // "abc123" hashes to index 3 of 4
        assert_eq!(host(&context.next_with_key("abc123").unwrap()), "d");
        // then index 1 of the remaining [a, b, c]
        assert_eq!(host(&context.next_with_key("abc123").unwrap()), "b");
    }

    #[test]
    fn test_factory_resolves_default_policy() {
        let repository = Arc::new(crate::repository::ServerGroupRepository::new());
        repository
            .add_server_group(ServerGroup::builder("sg").element(hop("a", 1.0, 0)).build().unwrap())
            .unwrap();
        let factory = ContextFactory::new(repository, Arc::new(AlwaysAvailable), Policy::Weight);

        let request = RoutingRequest::new("sip:svc@example.com");
        let mut context = factory.create("sg", &request).unwrap();
        assert_eq!(context.policy(), Policy::Weight);
        assert!(context.key().is_none());
        assert_eq!(host(&context.next().unwrap()), "a");

        assert!(matches!(
            factory.create("missing", &request),
            Err(RoutingError::ServerGroupNotFound(_))
        ));
    }

    #[test]
    fn test_classification_only_for_correlation_policy() {
        let request = RoutingRequest::new("sip:conf@example.com")
            .with_body("v=0\r\nm=applicationsharing 5000 TCP 0\r\n");
        let context = SelectionContext::new(group(Policy::CallId), &request, Arc::new(AlwaysAvailable));
        assert_eq!(context.leg_class(), LegClass::AvailabilityChecked);

        let context =
            SelectionContext::new(group(Policy::MsConversationId), &request, Arc::new(AlwaysAvailable));
        assert_eq!(context.leg_class(), LegClass::Pinned);
    }
}
