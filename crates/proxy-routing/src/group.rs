//! Server groups: named, immutable sets of candidate destinations

use crate::element::{Element, ElementId};
use crate::errors::{Result, RoutingError};
use crate::policy::Policy;
use std::sync::Arc;

/// Snapshot of a server group.
///
/// A `ServerGroup` never changes after construction. Administrative updates
/// produce a new snapshot, so a routing attempt that holds an
/// `Arc<ServerGroup>` keeps seeing the membership it started with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerGroup {
    name: String,
    network: String,
    policy: Policy,
    elements: Arc<[Element]>,
    next_sequence: u64,
}

impl ServerGroup {
    pub fn builder(name: impl Into<String>) -> ServerGroupBuilder {
        ServerGroupBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Elements in insertion order
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.get(id).is_some()
    }

    /// Names of the groups this group references directly
    pub fn referenced_groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.elements.iter().filter_map(Element::server_group_name)
    }

    /// New snapshot with `element` appended
    pub fn with_element(&self, element: Element) -> Result<ServerGroup> {
        if self.contains(element.id()) {
            return Err(RoutingError::DuplicateElement {
                group: self.name.clone(),
                element: element.id().to_string(),
            });
        }
        let mut elements = self.elements.to_vec();
        elements.push(element.with_sequence(self.next_sequence));
        Ok(ServerGroup {
            elements: elements.into(),
            next_sequence: self.next_sequence + 1,
            ..self.clone()
        })
    }

    /// New snapshot without the element identified by `id`, or `None` if absent
    pub fn without_element(&self, id: &ElementId) -> Option<ServerGroup> {
        if !self.contains(id) {
            return None;
        }
        let elements: Vec<Element> = self
            .elements
            .iter()
            .filter(|e| e.id() != id)
            .cloned()
            .collect();
        Some(ServerGroup {
            elements: elements.into(),
            ..self.clone()
        })
    }

    /// New snapshot with no elements
    pub fn emptied(&self) -> ServerGroup {
        ServerGroup {
            elements: Arc::from(Vec::new()),
            ..self.clone()
        }
    }
}

/// Builder for [`ServerGroup`]
#[derive(Debug)]
pub struct ServerGroupBuilder {
    name: String,
    network: String,
    policy: Policy,
    elements: Vec<Element>,
}

impl ServerGroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: String::new(),
            policy: Policy::Global,
            elements: Vec::new(),
        }
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn build(self) -> Result<ServerGroup> {
        let mut group = ServerGroup {
            name: self.name,
            network: self.network,
            policy: self.policy,
            elements: Arc::from(Vec::new()),
            next_sequence: 0,
        };
        for element in self.elements {
            group = group.with_element(element)?;
        }
        Ok(group)
    }
}
