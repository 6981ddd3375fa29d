//! A proxy-style retry loop driven by configuration

use rvoip_proxy_routing::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

const CONFIG: &str = r#"
default_policy = "call-id"
failover_codes = "500-599"

[retries]
udp = 2

[[server_groups]]
name = "sg-edge"
network = "net-external"
policy = "call-id"
failover_codes = "503"

[[server_groups.elements]]
host = "a.example.com"
q_value = 1.0

[[server_groups.elements]]
host = "b.example.com"
q_value = 0.5

[[server_groups.elements]]
host = "c.example.com"
q_value = 0.5

[[server_groups.elements]]
server_group = "sg-backup"
q_value = 0.1

[[server_groups]]
name = "sg-backup"
network = "net-external"
policy = "highest-q"

[[server_groups.elements]]
host = "d.example.com"

[[server_groups]]
name = "sg-conf"
network = "net-internal"
policy = "ms-conversation-id"

[[server_groups.elements]]
host = "m0.example.com"

[[server_groups.elements]]
host = "m1.example.com"

[[server_groups.elements]]
host = "m2.example.com"

[[server_groups.elements]]
host = "m3.example.com"
"#;

struct Proxy {
    factory: ContextFactory,
    codes: FailoverCodes,
    status: Arc<EndpointStatusTable>,
    responses: HashMap<String, u16>,
    tried: Vec<String>,
}

impl Proxy {
    fn new(responses: &[(&str, u16)]) -> Self {
        let config = ProxyRoutingConfig::from_toml_str(CONFIG).unwrap();
        let repository = Arc::new(ServerGroupRepository::from_config(&config).unwrap());
        let status = Arc::new(EndpointStatusTable::new(config.retries));
        let factory = ContextFactory::new(repository, status.clone(), config.default_policy);
        Self {
            factory,
            codes: FailoverCodes::from_config(&config),
            status,
            responses: responses
                .iter()
                .map(|(host, code)| (host.to_string(), *code))
                .collect(),
            tried: Vec::new(),
        }
    }

    /// Send down `group` until a response that should not fail over
    fn route(&mut self, group: &str, request: &RoutingRequest, path: &mut Vec<String>) -> Option<u16> {
        let mut context = self.factory.create(group, request).unwrap();
        path.push(group.to_string());
        let mut last = None;

        while let Some(element) = context.next() {
            let code = match element.server_group_name() {
                Some(nested) => self.route(nested, request, path),
                None => {
                    let endpoint = element.endpoint().unwrap();
                    self.tried.push(endpoint.host.clone());
                    let code = self.responses.get(&endpoint.host).copied().unwrap_or(200);
                    if code >= 500 {
                        self.status.record_failure(endpoint);
                    } else {
                        self.status.record_success(endpoint);
                    }
                    Some(code)
                }
            };
            last = code;
            let groups: Vec<&str> = path.iter().map(String::as_str).collect();
            match code {
                Some(code) if self.codes.is_failover_code(&groups, code) => continue,
                _ => break,
            }
        }

        path.pop();
        last
    }
}

fn invite(call_id: &str) -> RoutingRequest {
    RoutingRequest::new("sip:svc@example.com").with_call_id(call_id)
}

#[test]
fn test_fails_over_through_tiers_into_sub_group() {
    let mut proxy = Proxy::new(&[
        ("a.example.com", 503),
        ("b.example.com", 503),
        ("c.example.com", 503),
    ]);

    let result = proxy.route("sg-edge", &invite("call-1@host"), &mut Vec::new());

    assert_eq!(result, Some(200));
    assert_eq!(proxy.tried.len(), 4);
    assert_eq!(proxy.tried[0], "a.example.com");
    let mut middle = proxy.tried[1..3].to_vec();
    middle.sort();
    assert_eq!(middle, vec!["b.example.com", "c.example.com"]);
    assert_eq!(proxy.tried[3], "d.example.com");
}

#[test]
fn test_non_failover_code_stops_retrying() {
    // sg-edge only fails over on 503
    let mut proxy = Proxy::new(&[("a.example.com", 500)]);

    let result = proxy.route("sg-edge", &invite("call-2@host"), &mut Vec::new());

    assert_eq!(result, Some(500));
    assert_eq!(proxy.tried, vec!["a.example.com"]);
}

#[test]
fn test_exhausted_group_returns_last_response() {
    let mut proxy = Proxy::new(&[
        ("a.example.com", 503),
        ("b.example.com", 503),
        ("c.example.com", 503),
        ("d.example.com", 503),
    ]);

    let result = proxy.route("sg-edge", &invite("call-3@host"), &mut Vec::new());

    assert_eq!(result, Some(503));
    assert_eq!(proxy.tried.len(), 4);
}

#[test]
fn test_failures_take_next_hop_out_of_rotation() {
    let mut proxy = Proxy::new(&[("a.example.com", 503)]);
    let a = Endpoint::new("net-external", "a.example.com", 5060, Transport::Udp);

    // UDP budget is 2 tries
    proxy.route("sg-edge", &invite("call-4@host"), &mut Vec::new());
    assert!(proxy.status.is_endpoint_available(&a));
    proxy.route("sg-edge", &invite("call-5@host"), &mut Vec::new());
    assert!(!proxy.status.is_endpoint_available(&a));

    proxy.tried.clear();
    let result = proxy.route("sg-edge", &invite("call-6@host"), &mut Vec::new());
    assert_eq!(result, Some(200));
    assert_ne!(proxy.tried[0], "a.example.com");
    assert!(!proxy.tried.contains(&"a.example.com".to_string()));
}

fn conference_leg(conversation: &str, media: &str) -> RoutingRequest {
    RoutingRequest::new("sip:conf@example.com")
        .with_call_id(format!("{}-{}", conversation, media))
        .with_header("Ms-Conversation-ID", conversation)
        .with_body(format!("v=0\r\no=- 0 0 IN IP4 10.1.1.1\r\nm={} 5000 RTP/AVP 0\r\n", media))
}

#[test]
fn test_pinned_leg_follows_conversation_when_member_is_down() {
    let proxy = Proxy::new(&[]);

    // Where an audio leg of the conversation lands while everything is up
    let audio = conference_leg("conv-42", "audio");
    let mut context = proxy.factory.create("sg-conf", &audio).unwrap();
    assert_eq!(context.leg_class(), LegClass::AvailabilityChecked);
    let home = context.next().unwrap().endpoint().unwrap().clone();

    proxy.status.mark_unreachable(&home);

    // Application sharing must reach the same member regardless
    let sharing = conference_leg("conv-42", "applicationsharing");
    for _ in 0..3 {
        let mut context = proxy.factory.create("sg-conf", &sharing).unwrap();
        assert_eq!(context.leg_class(), LegClass::Pinned);
        assert_eq!(context.next().unwrap().endpoint(), Some(&home));
        // and continues elsewhere after a failure
        assert_ne!(context.next().unwrap().endpoint(), Some(&home));
    }

    // New audio legs avoid the unavailable member
    let mut context = proxy.factory.create("sg-conf", &audio).unwrap();
    let mut offered = Vec::new();
    while let Some(element) = context.next() {
        offered.push(element.endpoint().unwrap().clone());
    }
    assert_eq!(offered.len(), 3);
    assert!(!offered.contains(&home));
}

#[test]
fn test_unknown_group_is_an_error() {
    let proxy = Proxy::new(&[]);
    assert!(matches!(
        proxy.factory.create("sg-missing", &invite("call-7@host")),
        Err(RoutingError::ServerGroupNotFound(name)) if name == "sg-missing"
    ));
}
