use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::Domain;

// declarative network-blocking rule generation

pub const WILDCARD_PRIORITY: i32 = 100;
pub const EXACT_HOST_PRIORITY: i32 = 90;
pub const THIRD_PARTY_PRIORITY: i32 = 80;
pub const BASE_DOMAIN_PRIORITY: i32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    Webtransport,
    Other,
}

impl ResourceType {
    pub const ALL: [ResourceType; 14] = [
        ResourceType::MainFrame,
        ResourceType::SubFrame,
        ResourceType::Stylesheet,
        ResourceType::Script,
        ResourceType::Image,
        ResourceType::Font,
        ResourceType::Object,
        ResourceType::Xmlhttprequest,
        ResourceType::Ping,
        ResourceType::CspReport,
        ResourceType::Media,
        ResourceType::Websocket,
        ResourceType::Webtransport,
        ResourceType::Other,
    ];

    /// Request types typically issued by embedded trackers.
    pub const THIRD_PARTY: [ResourceType; 5] = [
        ResourceType::Script,
        ResourceType::Image,
        ResourceType::Xmlhttprequest,
        ResourceType::Ping,
        ResourceType::Other,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
}

/// One declarative blocking rule.
///
/// Serializes to the dynamic-rule shape browsers accept:
/// `{"id", "priority", "action": {"type"}, "condition": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireRule", from = "WireRule")]
pub struct RuleDescriptor {
    pub id: u32,
    pub priority: i32,
    pub action: RuleAction,
    pub url_pattern: String,
    pub resource_types: BTreeSet<ResourceType>,
    pub third_party_only: bool,
}

/// Builds the full rule set for `domains`, numbering ids from 1.
///
/// Each domain contributes, in order: wildcard-subdomain (100), exact host
/// (90), third-party (80) and, when it has two or more labels, base-domain
/// (70) rules. Input is assumed to be normalized.
pub fn generate(domains: &[Domain]) -> Vec<RuleDescriptor> {
    let mut rules = Vec::with_capacity(domains.len() * 4);
    let mut next_id = 1;
    for domain in domains {
        push_domain_rules(domain, &mut next_id, &mut rules);
    }
    rules
}

/// Appends the rules for a single domain, advancing `next_id`.
fn push_domain_rules(domain: &Domain, next_id: &mut u32, out: &mut Vec<RuleDescriptor>) {
    let mut push = |priority, url_pattern: String, types: &[ResourceType], third_party_only| {
        out.push(RuleDescriptor {
            id: *next_id,
            priority,
            action: RuleAction::Block,
            url_pattern,
            resource_types: types.iter().copied().collect(),
            third_party_only,
        });
        *next_id += 1;
    };

    push(
        WILDCARD_PRIORITY,
        wildcard_pattern(domain),
        &ResourceType::ALL,
        false,
    );
    push(
        EXACT_HOST_PRIORITY,
        format!("*://{domain}/*"),
        &ResourceType::ALL,
        false,
    );
    push(
        THIRD_PARTY_PRIORITY,
        wildcard_pattern(domain),
        &ResourceType::THIRD_PARTY,
        true,
    );
    if let Some(base) = domain.base_domain() {
        push(
            BASE_DOMAIN_PRIORITY,
            wildcard_pattern(base),
            &ResourceType::ALL,
            false,
        );
    }
}

fn wildcard_pattern(host: &str) -> String {
    format!("*://*.{host}/*")
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRule {
    id: u32,
    priority: i32,
    action: WireAction,
    condition: WireCondition,
}

#[derive(Serialize, Deserialize)]
struct WireAction {
    #[serde(rename = "type")]
    kind: RuleAction,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCondition {
    url_filter: String,
    resource_types: BTreeSet<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain_type: Option<DomainType>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum DomainType {
    FirstParty,
    ThirdParty,
}

impl From<RuleDescriptor> for WireRule {
    fn from(rule: RuleDescriptor) -> Self {
        Self {
            id: rule.id,
            priority: rule.priority,
            action: WireAction { kind: rule.action },
            condition: WireCondition {
                url_filter: rule.url_pattern,
                resource_types: rule.resource_types,
                domain_type: rule.third_party_only.then_some(DomainType::ThirdParty),
            },
        }
    }
}

impl From<WireRule> for RuleDescriptor {
    fn from(wire: WireRule) -> Self {
        Self {
            id: wire.id,
            priority: wire.priority,
            action: wire.action.kind,
            url_pattern: wire.condition.url_filter,
            resource_types: wire.condition.resource_types,
            third_party_only: wire.condition.domain_type == Some(DomainType::ThirdParty),
        }
    }
}
