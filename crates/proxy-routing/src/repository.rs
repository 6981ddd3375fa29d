//! Server group repository
//!
//! Readers take lock-free snapshots through [`ArcSwap`]; every administrative
//! change clones the group map, applies the change and publishes the new map
//! in one step. Writers are serialized by a mutex so concurrent updates cannot
//! lose each other's changes.
//!
//! Group names are matched exactly, including case.

use crate::config::ProxyRoutingConfig;
use crate::element::{Element, ElementId};
use crate::errors::{Result, RoutingError};
use crate::group::ServerGroup;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

type GroupMap = HashMap<String, Arc<ServerGroup>>;

/// Supplies read-only server group snapshots to the selection engine
pub trait MembershipProvider: Send + Sync {
    fn server_group(&self, name: &str) -> Option<Arc<ServerGroup>>;
}

/// Copy-on-write store of all configured server groups
#[derive(Debug, Default)]
pub struct ServerGroupRepository {
    groups: ArcSwap<GroupMap>,
    write_lock: Mutex<()>,
}

impl ServerGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from configuration.
    ///
    /// Groups are created before any element is added, so sub-group references
    /// may point at groups defined later in the file.
    pub fn from_config(config: &ProxyRoutingConfig) -> Result<Self> {
        let repository = Self::new();
        for group in &config.server_groups {
            repository.add_server_group(
                ServerGroup::builder(group.name.as_str())
                    .network(group.network.as_str())
                    .policy(group.policy)
                    .build()?,
            )?;
        }
        for group in &config.server_groups {
            for element in &group.elements {
                repository.add_element(&group.name, element.to_element(&group.network)?)?;
            }
        }
        info!("Loaded {} server groups from configuration", config.server_groups.len());
        Ok(repository)
    }

    /// Apply `change` to a private copy of the map and publish the result
    fn update<T>(&self, change: impl FnOnce(&mut GroupMap) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        let mut groups = GroupMap::clone(&self.groups.load());
        let result = change(&mut groups)?;
        self.groups.store(Arc::new(groups));
        Ok(result)
    }

    /// Add a new group. Sub-group references it carries are validated.
    pub fn add_server_group(&self, group: ServerGroup) -> Result<()> {
        self.update(|groups| {
            if groups.contains_key(group.name()) {
                return Err(RoutingError::DuplicateServerGroup(group.name().to_string()));
            }
            for referenced in group.referenced_groups() {
                check_reference(groups, group.name(), referenced)?;
            }
            info!("Added server group {}", group.name());
            groups.insert(group.name().to_string(), Arc::new(group));
            Ok(())
        })
    }

    /// Add an element to an existing group
    pub fn add_element(&self, group_name: &str, element: Element) -> Result<()> {
        self.update(|groups| {
            let group = groups
                .get(group_name)
                .ok_or_else(|| RoutingError::ServerGroupNotFound(group_name.to_string()))?;
            if let Some(referenced) = element.server_group_name() {
                check_reference(groups, group_name, referenced)?;
            }
            debug!("Adding {} to server group {}", element, group_name);
            let updated = group.with_element(element)?;
            groups.insert(group_name.to_string(), Arc::new(updated));
            Ok(())
        })
    }

    /// Remove one element; returns `false` if the group or element does not exist
    pub fn remove_element(&self, group_name: &str, id: &ElementId) -> Result<bool> {
        self.update(|groups| {
            let updated = groups
                .get(group_name)
                .and_then(|group| group.without_element(id));
            match updated {
                Some(updated) => {
                    info!("Removed {} from server group {}", id, group_name);
                    groups.insert(group_name.to_string(), Arc::new(updated));
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Remove every element of a group, returning what was removed
    pub fn remove_all_elements(&self, group_name: &str) -> Result<Vec<Element>> {
        self.update(|groups| {
            let group = groups
                .get(group_name)
                .ok_or_else(|| RoutingError::ServerGroupNotFound(group_name.to_string()))?;
            let removed = group.elements().to_vec();
            let emptied = group.emptied();
            groups.insert(group_name.to_string(), Arc::new(emptied));
            info!("Removed all {} elements from server group {}", removed.len(), group_name);
            Ok(removed)
        })
    }

    /// Remove a group and every reference other groups hold to it
    pub fn remove_server_group(&self, name: &str) -> Result<Option<Arc<ServerGroup>>> {
        self.update(|groups| {
            let removed = groups.remove(name);
            if removed.is_some() {
                let reference = ElementId::ServerGroup(name.to_string());
                for group in groups.values_mut() {
                    if let Some(updated) = group.without_element(&reference) {
                        *group = Arc::new(updated);
                    }
                }
                info!("Removed server group {}", name);
            }
            Ok(removed)
        })
    }

    /// Remove all groups
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.groups.store(Arc::new(GroupMap::new()));
        info!("Removed all server groups");
    }

    /// Current snapshot of a group
    pub fn server_group(&self, name: &str) -> Option<Arc<ServerGroup>> {
        self.groups.load().get(name).cloned()
    }

    /// Current snapshots of every group on `network`
    pub fn server_groups_in_network(&self, network: &str) -> Vec<Arc<ServerGroup>> {
        let mut groups: Vec<_> = self
            .groups
            .load()
            .values()
            .filter(|group| group.network() == network)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.groups.load().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.load().is_empty()
    }
}

impl MembershipProvider for ServerGroupRepository {
    fn server_group(&self, name: &str) -> Option<Arc<ServerGroup>> {
        ServerGroupRepository::server_group(self, name)
    }
}

/// Validate that `destination` may reference `referenced`
fn check_reference(groups: &GroupMap, destination: &str, referenced: &str) -> Result<()> {
    if referenced == destination {
        return Err(RoutingError::CircularReference(format!(
            "cannot add server group {} to itself",
            referenced
        )));
    }
    if !groups.contains_key(referenced) {
        return Err(RoutingError::ServerGroupNotFound(format!(
            "{} (referenced from {})",
            referenced, destination
        )));
    }
    if reaches(groups, referenced, destination, &mut HashSet::new()) {
        return Err(RoutingError::CircularReference(format!(
            "server group {} or one of its subgroups references {}",
            referenced, destination
        )));
    }
    Ok(())
}

/// Whether `from` references `target`, directly or through nested groups
fn reaches<'a>(groups: &'a GroupMap, from: &'a str, target: &str, seen: &mut HashSet<&'a str>) -> bool {
    if !seen.insert(from) {
        return false;
    }
    let Some(group) = groups.get(from) else {
        return false;
    };
    group.referenced_groups().any(|child| {
        child == target || reaches(groups, child, target, seen)
    })
}
