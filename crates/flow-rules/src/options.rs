//! Caller-facing rule options and the rule intent they describe

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::TableSpec;
use crate::error::{Result, RuleError};
use crate::field::{FieldKind, FieldValue, MatchCriterion};

/// Default rule priority
pub const DEFAULT_PRIORITY: u32 = 40;

/// Default rule timeout in seconds
pub const DEFAULT_TIMEOUT: u32 = 1;

/// Optional match constraints. An absent field puts no constraint on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_port: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_port: Option<u8>,
    /// Destination MAC, e.g. `00:00:00:00:00:1b`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<String>,
    /// Source MAC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    /// Source IPv4 address, dotted quad
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<String>,
    /// Destination IPv4 address, dotted quad
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_proto: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l4_src: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l4_dst: Option<u16>,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingress_port(mut self, port: u8) -> Self {
        self.ingress_port = Some(port);
        self
    }

    pub fn egress_port(mut self, port: u8) -> Self {
        self.egress_port = Some(port);
        self
    }

    pub fn eth_dst(mut self, mac: &str) -> Self {
        self.eth_dst = Some(mac.to_string());
        self
    }

    pub fn eth_src(mut self, mac: &str) -> Self {
        self.eth_src = Some(mac.to_string());
        self
    }

    pub fn eth_type(mut self, ether_type: u16) -> Self {
        self.eth_type = Some(ether_type);
        self
    }

    pub fn ipv4_src(mut self, addr: &str) -> Self {
        self.ipv4_src = Some(addr.to_string());
        self
    }

    pub fn ipv4_dst(mut self, addr: &str) -> Self {
        self.ipv4_dst = Some(addr.to_string());
        self
    }

    pub fn ipv4_proto(mut self, proto: u8) -> Self {
        self.ipv4_proto = Some(proto);
        self
    }

    pub fn l4_src(mut self, port: u16) -> Self {
        self.l4_src = Some(port);
        self
    }

    pub fn l4_dst(mut self, port: u16) -> Self {
        self.l4_dst = Some(port);
        self
    }

    /// Encode the present fields, in payload order.
    pub fn criteria(&self) -> Result<Vec<MatchCriterion>> {
        let mut out = Vec::new();
        let mut push = |kind: FieldKind, value: FieldValue| -> Result<()> {
            out.push(MatchCriterion::new(kind, value)?);
            Ok(())
        };

        if let Some(p) = self.ingress_port {
            push(FieldKind::IngressPort, FieldValue::Port(p))?;
        }
        if let Some(p) = self.egress_port {
            push(FieldKind::EgressPort, FieldValue::Port(p))?;
        }
        if let Some(mac) = &self.eth_dst {
            push(FieldKind::EthDst, FieldValue::parse(FieldKind::EthDst, mac)?)?;
        }
        if let Some(mac) = &self.eth_src {
            push(FieldKind::EthSrc, FieldValue::parse(FieldKind::EthSrc, mac)?)?;
        }
        if let Some(t) = self.eth_type {
            push(FieldKind::EthType, FieldValue::EtherType(t))?;
        }
        if let Some(addr) = &self.ipv4_dst {
            push(FieldKind::Ipv4Dst, FieldValue::parse(FieldKind::Ipv4Dst, addr)?)?;
        }
        if let Some(addr) = &self.ipv4_src {
            push(FieldKind::Ipv4Src, FieldValue::parse(FieldKind::Ipv4Src, addr)?)?;
        }
        if let Some(p) = self.ipv4_proto {
            push(FieldKind::IpProto, FieldValue::IpProto(p))?;
        }
        if let Some(p) = self.l4_src {
            push(FieldKind::L4Src, FieldValue::L4Port(p))?;
        }
        if let Some(p) = self.l4_dst {
            push(FieldKind::L4Dst, FieldValue::L4Port(p))?;
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Action options. Tables ignore the ones they cannot honour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<u16>,
    #[serde(default)]
    pub no_op: bool,
}

impl ActionOptions {
    pub fn output(port: u16) -> Self {
        Self {
            output_port: Some(port),
            no_op: false,
        }
    }

    pub fn noop() -> Self {
        Self {
            output_port: None,
            no_op: true,
        }
    }
}

/// Timing and priority attributes of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOptions {
    pub priority: u32,
    /// Idle timeout in seconds; ignored by the controller for permanent rules.
    pub timeout: u32,
    pub permanent: bool,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            timeout: DEFAULT_TIMEOUT,
            permanent: false,
        }
    }
}

impl RuleOptions {
    pub fn permanent(priority: u32) -> Self {
        Self {
            priority,
            permanent: true,
            ..Self::default()
        }
    }
}

/// A table-scoped set of match criteria.
///
/// Two intents describe the same logical rule iff they target the same table
/// and their (field, value) pairs are equal as sets. Masks are not compared.
#[derive(Debug, Clone)]
pub struct RuleIntent {
    table: &'static TableSpec,
    criteria: Vec<MatchCriterion>,
}

impl RuleIntent {
    /// Criteria are kept in field order. A field may appear at most once.
    pub fn new(table: &'static TableSpec, mut criteria: Vec<MatchCriterion>) -> Result<Self> {
        criteria.sort_by_key(|c| c.field());
        if let Some(pair) = criteria.windows(2).find(|w| w[0].field() == w[1].field()) {
            return Err(RuleError::DuplicateField(pair[0].field()));
        }
        Ok(Self { table, criteria })
    }

    pub fn from_options(table: &'static TableSpec, matches: &MatchOptions) -> Result<Self> {
        Self::new(table, matches.criteria()?)
    }

    pub fn table(&self) -> &'static TableSpec {
        self.table
    }

    pub fn criteria(&self) -> &[MatchCriterion] {
        &self.criteria
    }

    /// The (field, value) pairs that identify this rule.
    pub fn key(&self) -> BTreeSet<(FieldKind, Vec<u8>)> {
        self.criteria
            .iter()
            .map(|c| (c.field(), c.value().to_vec()))
            .collect()
    }

    pub fn same_rule(&self, other: &RuleIntent) -> bool {
        self.table.table_id == other.table.table_id && self.key() == other.key()
    }

    /// Comma-separated criteria, for logs and errors.
    pub fn describe_fields(&self) -> String {
        self.criteria
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for RuleIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.table.name, self.describe_fields())
    }
}
