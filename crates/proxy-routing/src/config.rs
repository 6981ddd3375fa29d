//! Configuration for server groups and load balancing
//!
//! ```toml
//! default_policy = "call-id"
//! failover_codes = "500-599"
//!
//! [retries]
//! udp = 10
//! tcp = 1
//! tls = 1
//!
//! [[server_groups]]
//! name = "sg-media"
//! network = "net-internal"
//! policy = "ms-conversation-id"
//! failover_codes = "502,503"
//!
//! [[server_groups.elements]]
//! host = "10.0.0.1"
//! port = 5060
//! transport = "tcp"
//! q_value = 0.9
//! weight = 10
//!
//! [[server_groups.elements]]
//! server_group = "sg-backup"
//! q_value = 0.5
//! ```

use crate::element::{DEFAULT_Q_VALUE, DEFAULT_SIP_PORT, Element, Endpoint, Transport};
use crate::errors::{Result, RoutingError};
use crate::failover::{DEFAULT_FAILOVER_CODES, FailoverCodeSet};
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyRoutingConfig {
    /// Policy used by groups configured with `global`
    pub default_policy: Policy,
    /// Failover codes for groups without their own set
    pub failover_codes: FailoverCodeSet,
    /// Try budgets for the endpoint status table
    pub retries: RetryConfig,
    /// Statically configured server groups
    pub server_groups: Vec<ServerGroupConfig>,
}

impl Default for ProxyRoutingConfig {
    fn default() -> Self {
        Self {
            default_policy: Policy::RequestUri,
            failover_codes: DEFAULT_FAILOVER_CODES
                .parse()
                .unwrap_or_default(),
            retries: RetryConfig::default(),
            server_groups: Vec::new(),
        }
    }
}

impl ProxyRoutingConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ProxyRoutingConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_policy == Policy::Global {
            return Err(RoutingError::Config(
                "default_policy cannot be \"global\"".to_string(),
            ));
        }
        for group in &self.server_groups {
            if group.name.trim().is_empty() {
                return Err(RoutingError::Config("server group with empty name".to_string()));
            }
            for element in &group.elements {
                element.to_element(&group.network)?;
            }
        }
        Ok(())
    }
}

/// Number of failed attempts after which a next hop is considered down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub udp: u32,
    pub tcp: u32,
    pub tls: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            udp: 10,
            tcp: 1,
            tls: 1,
        }
    }
}

/// One server group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerGroupConfig {
    pub name: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub policy: Policy,
    /// Overrides the global failover codes for this group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_codes: Option<FailoverCodeSet>,
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
}

/// One element; exactly one of `host` and `server_group` must be set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_group: Option<String>,
    #[serde(default = "default_q_value")]
    pub q_value: f32,
    #[serde(default)]
    pub weight: u32,
}

fn default_port() -> u16 {
    DEFAULT_SIP_PORT
}

fn default_q_value() -> f32 {
    DEFAULT_Q_VALUE
}

impl ElementConfig {
    /// Build the element; leaf next hops are placed on `network`
    pub fn to_element(&self, network: &str) -> Result<Element> {
        match (&self.host, &self.server_group) {
            (Some(host), None) => Element::next_hop(
                Endpoint::new(network, host.as_str(), self.port, self.transport),
                self.q_value,
                self.weight,
            ),
            (None, Some(group)) => Element::server_group_ref(group.as_str(), self.q_value, self.weight),
            _ => Err(RoutingError::Config(
                "element needs exactly one of `host` or `server_group`".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_policy = "call-id"
failover_codes = "502-504"

[retries]
udp = 4

[[server_groups]]
name = "sg-media"
network = "net-internal"
policy = "Ms-Conversation-ID"
failover_codes = "503"

[[server_groups.elements]]
host = "10.0.0.1"
transport = "tcp"
q_value = 0.9
weight = 10

[[server_groups.elements]]
server_group = "sg-backup"
q_value = 0.5

[[server_groups]]
name = "sg-backup"
"#;

    #[test]
    fn test_parse_sample() {
        let config = ProxyRoutingConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.default_policy, Policy::CallId);
        assert_eq!(config.failover_codes.to_string(), "502-504");
        assert_eq!(config.retries, RetryConfig { udp: 4, tcp: 1, tls: 1 });
        assert_eq!(config.server_groups.len(), 2);

        let media = &config.server_groups[0];
        assert_eq!(media.policy, Policy::MsConversationId);
        assert_eq!(media.failover_codes.as_ref().unwrap().to_string(), "503");

        let hop = media.elements[0].to_element(&media.network).unwrap();
        let endpoint = hop.endpoint().unwrap();
        assert_eq!(endpoint.host, "10.0.0.1");
        assert_eq!(endpoint.port, 5060);
        assert_eq!(endpoint.transport, Transport::Tcp);
        assert_eq!(endpoint.network, "net-internal");
        assert_eq!(hop.q_value(), 0.9);
        assert_eq!(hop.weight(), 10);

        let group_ref = media.elements[1].to_element(&media.network).unwrap();
        assert_eq!(group_ref.server_group_name(), Some("sg-backup"));
        assert_eq!(group_ref.weight(), 0);

        let backup = &config.server_groups[1];
        assert_eq!(backup.policy, Policy::Global);
        assert!(backup.elements.is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = ProxyRoutingConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProxyRoutingConfig::default());
        assert_eq!(config.default_policy, Policy::RequestUri);
        assert!(config.failover_codes.contains(500));
        assert!(config.failover_codes.contains(599));
    }

    #[test]
    fn test_rejects_global_default_policy() {
        let err = ProxyRoutingConfig::from_toml_str("default_policy = \"global\"").unwrap_err();
        assert!(matches!(err, RoutingError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = ProxyRoutingConfig::from_toml_str("default_policy = \"round-robin\"").unwrap_err();
        assert!(matches!(err, RoutingError::Config(_)));
    }

    #[test]
    fn test_rejects_ambiguous_element() {
        let text = r#"
[[server_groups]]
name = "sg"

[[server_groups.elements]]
host = "10.0.0.1"
server_group = "other"
"#;
        assert!(ProxyRoutingConfig::from_toml_str(text).is_err());

        let text = r#"
[[server_groups]]
name = "sg"

[[server_groups.elements]]
q_value = 0.5
"#;
        assert!(ProxyRoutingConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_from_missing_file() {
        let err = ProxyRoutingConfig::from_file("/nonexistent/proxy-routing.toml").unwrap_err();
        assert!(matches!(err, RoutingError::Io(_)));
    }
}
