//! The shrinking pool of untried candidates for one routing attempt

use crate::availability::{AvailabilityProvider, is_usable};
use crate::element::{Element, ElementId, selection_order};
use crate::group::ServerGroup;
use tracing::debug;

/// Untried candidates, kept in selection order.
///
/// The pool is a value: removing a candidate yields a new pool and leaves the
/// old one untouched, so every step of a selection can be inspected on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    elements: Vec<Element>,
}

impl Candidates {
    pub fn new(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut elements: Vec<Element> = elements.into_iter().collect();
        elements.sort_by(selection_order);
        Self { elements }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.elements
    }

    /// Candidates sharing the highest remaining q-value, in selection order.
    ///
    /// Q-values are compared exactly. Configured priorities are literals, and
    /// two values that differ in any bit belong to different tiers.
    pub fn top_tier(&self) -> &[Element] {
        let Some(first) = self.elements.first() else {
            return &[];
        };
        let end = self
            .elements
            .iter()
            .position(|e| e.q_value() != first.q_value())
            .unwrap_or(self.elements.len());
        &self.elements[..end]
    }

    /// The pool without `id`
    pub fn without(&self, id: &ElementId) -> Candidates {
        self.without_all(std::slice::from_ref(id))
    }

    /// The pool without any of `ids`
    pub fn without_all(&self, ids: &[ElementId]) -> Candidates {
        Candidates {
            elements: self
                .elements
                .iter()
                .filter(|e| !ids.contains(e.id()))
                .cloned()
                .collect(),
        }
    }
}

/// Build the starting pool for a routing attempt on `group`.
///
/// Sub-group references are always included. Leaf next hops are included when
/// currently available, or unconditionally when `keep_unavailable` is set and
/// the policy filters per leg instead. An empty pool is a normal result.
pub fn initialize_candidates(
    group: &ServerGroup,
    availability: &dyn AvailabilityProvider,
    keep_unavailable: bool,
) -> Candidates {
    let candidates = Candidates::new(group.elements().iter().filter(|element| {
        !availability.is_next_hop(element.id())
            || keep_unavailable
            || is_usable(availability, element)
    }).cloned());
    debug!(
        "Server group {} has {} of {} elements to try",
        group.name(),
        candidates.len(),
        group.len()
    );
    candidates
}
