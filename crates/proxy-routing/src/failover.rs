//! Response codes that make a caller fail over to the next hop
//!
//! The selection engine never looks at these. Callers check a final response
//! against the codes of the server groups the destination belongs to and, on a
//! match, ask their [`SelectionContext`](crate::context::SelectionContext) for
//! the next hop.

use crate::config::ProxyRoutingConfig;
use crate::errors::{Result, RoutingError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Default failover codes: every 5xx response
pub const DEFAULT_FAILOVER_CODES: &str = "500-599";

/// A set of SIP response status codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FailoverCodeSet {
    codes: BTreeSet<u16>,
}

impl FailoverCodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, code: u16) -> bool {
        self.codes.contains(&code)
    }

    pub fn insert(&mut self, code: u16) -> Result<()> {
        validate(code)?;
        self.codes.insert(code);
        Ok(())
    }

    pub fn remove(&mut self, code: u16) -> bool {
        self.codes.remove(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.codes.iter().copied()
    }
}

fn validate(code: u16) -> Result<()> {
    if (100..=699).contains(&code) {
        Ok(())
    } else {
        Err(RoutingError::InvalidFailoverCode(code.to_string()))
    }
}

fn parse_code(token: &str) -> Result<u16> {
    let code = token
        .parse::<u16>()
        .map_err(|_| RoutingError::InvalidFailoverCode(token.to_string()))?;
    validate(code)?;
    Ok(code)
}

/// Parses lists such as `"500-599"` or `"502, 503,504"`; whitespace is ignored.
impl FromStr for FailoverCodeSet {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let mut set = FailoverCodeSet::new();
        if compact.is_empty() {
            return Ok(set);
        }
        for token in compact.split(',') {
            match token.split_once('-') {
                Some((low, high)) => {
                    let (low, high) = (parse_code(low)?, parse_code(high)?);
                    if low > high {
                        return Err(RoutingError::InvalidFailoverCode(token.to_string()));
                    }
                    set.codes.extend(low..=high);
                }
                None => {
                    set.codes.insert(parse_code(token)?);
                }
            }
        }
        Ok(set)
    }
}

/// Renders the set compactly, collapsing consecutive codes into ranges
impl fmt::Display for FailoverCodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ranges: Vec<(u16, u16)> = Vec::new();
        for code in self.iter() {
            match ranges.last_mut() {
                Some((_, high)) if *high + 1 == code => *high = code,
                _ => ranges.push((code, code)),
            }
        }
        let parts: Vec<String> = ranges
            .into_iter()
            .map(|(low, high)| {
                if low == high {
                    low.to_string()
                } else {
                    format!("{}-{}", low, high)
                }
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

impl TryFrom<String> for FailoverCodeSet {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FailoverCodeSet> for String {
    fn from(set: FailoverCodeSet) -> Self {
        set.to_string()
    }
}

/// Failover codes per server group, with a proxy-wide fallback
#[derive(Debug, Default)]
pub struct FailoverCodes {
    global: FailoverCodeSet,
    groups: DashMap<String, FailoverCodeSet>,
}

impl FailoverCodes {
    pub fn new(global: FailoverCodeSet) -> Self {
        Self {
            global,
            groups: DashMap::new(),
        }
    }

    /// Global set plus the sets of groups that configure their own
    pub fn from_config(config: &ProxyRoutingConfig) -> Self {
        let codes = Self::new(config.failover_codes.clone());
        for group in &config.server_groups {
            if let Some(set) = &group.failover_codes {
                codes.set_failover_codes(group.name.as_str(), set.clone());
            }
        }
        codes
    }

    pub fn global(&self) -> &FailoverCodeSet {
        &self.global
    }

    pub fn failover_codes(&self, group: &str) -> Option<FailoverCodeSet> {
        self.groups.get(group).map(|set| set.clone())
    }

    pub fn set_failover_codes(&self, group: impl Into<String>, codes: FailoverCodeSet) {
        self.groups.insert(group.into(), codes);
    }

    pub fn remove_failover_codes(&self, group: &str) -> Option<FailoverCodeSet> {
        self.groups.remove(group).map(|(_, set)| set)
    }

    pub fn add_failover_code(&self, group: &str, code: u16) -> Result<()> {
        self.groups.entry(group.to_string()).or_default().insert(code)
    }

    pub fn remove_failover_code(&self, group: &str, code: u16) -> bool {
        self.groups
            .get_mut(group)
            .map_or(false, |mut set| set.remove(code))
    }

    /// Whether a response with `code` from a destination in `groups` should
    /// trigger failover.
    ///
    /// Groups with their own code set are consulted; if none of `groups` has
    /// one, the global set decides.
    pub fn is_failover_code(&self, groups: &[&str], code: u16) -> bool {
        let mut any_configured = false;
        for group in groups {
            if let Some(set) = self.groups.get(*group) {
                any_configured = true;
                if set.contains(code) {
                    return true;
                }
            }
        }
        !any_configured && self.global.contains(code)
    }
}
