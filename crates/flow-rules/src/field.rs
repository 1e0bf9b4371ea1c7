//! Match field encoding
//!
//! Converts typed header values into the fixed-width ternary value/mask pairs
//! the controller expects for protocol-independent criteria. Every kind has a
//! fixed byte width; encoded values are always zero-padded lowercase hex of
//! exactly that width, and masks are all-ones of the same width.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Result, RuleError};

/// Header or metadata field a rule can match on.
///
/// Declaration order is the order match entries appear in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    IngressPort,
    EgressPort,
    EthDst,
    EthSrc,
    EthType,
    Ipv4Dst,
    Ipv4Src,
    IpProto,
    L4Src,
    L4Dst,
}

impl FieldKind {
    pub const ALL: [FieldKind; 10] = [
        FieldKind::IngressPort,
        FieldKind::EgressPort,
        FieldKind::EthDst,
        FieldKind::EthSrc,
        FieldKind::EthType,
        FieldKind::Ipv4Dst,
        FieldKind::Ipv4Src,
        FieldKind::IpProto,
        FieldKind::L4Src,
        FieldKind::L4Dst,
    ];

    /// Fully qualified field name in the pipeline.
    pub fn pipeline_field(&self) -> &'static str {
        match self {
            Self::IngressPort => "standard_metadata.ingress_port",
            Self::EgressPort => "standard_metadata.egress_port",
            Self::EthDst => "hdr.ethernet.dst_addr",
            Self::EthSrc => "hdr.ethernet.src_addr",
            Self::EthType => "hdr.ethernet.ether_type",
            Self::Ipv4Dst => "hdr.ipv4.dst_addr",
            Self::Ipv4Src => "hdr.ipv4.src_addr",
            Self::IpProto => "local_metadata.ip_proto",
            Self::L4Src => "local_metadata.l4_src_port",
            Self::L4Dst => "local_metadata.l4_dst_port",
        }
    }

    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        match self {
            Self::IngressPort | Self::EgressPort | Self::IpProto => 1,
            Self::EthType | Self::L4Src | Self::L4Dst => 2,
            Self::Ipv4Dst | Self::Ipv4Src => 4,
            Self::EthDst | Self::EthSrc => 6,
        }
    }

    /// Name used for this field in match options and on the command line.
    pub fn option_name(&self) -> &'static str {
        match self {
            Self::IngressPort => "ingress_port",
            Self::EgressPort => "egress_port",
            Self::EthDst => "eth_dst",
            Self::EthSrc => "eth_src",
            Self::EthType => "eth_type",
            Self::Ipv4Dst => "ipv4_dst",
            Self::Ipv4Src => "ipv4_src",
            Self::IpProto => "ipv4_proto",
            Self::L4Src => "l4_src",
            Self::L4Dst => "l4_dst",
        }
    }

    /// Look up a kind by its pipeline field name.
    pub fn from_pipeline_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.pipeline_field() == name)
    }

    /// All-ones mask of this field's width, as hex.
    pub fn full_mask_hex(&self) -> String {
        "ff".repeat(self.width())
    }

    fn is_address(&self) -> bool {
        matches!(
            self,
            Self::EthDst | Self::EthSrc | Self::Ipv4Dst | Self::Ipv4Src
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_name())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.option_name() == lower || k.pipeline_field() == s)
            .ok_or_else(|| format!("Unknown match field: {}", s))
    }
}

/// 48-bit Ethernet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` or twelve bare hex digits.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let separated = digits.len() != s.len();
        if separated && s.split([':', '-']).any(|group| group.len() != 2) {
            return Err(format!("malformed MAC address: {}", s));
        }
        let bytes = hex_to_bytes(&digits).ok_or_else(|| format!("malformed MAC address: {}", s))?;
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| format!("MAC address must be 6 bytes: {}", s))?;
        Ok(MacAddr(octets))
    }
}

/// A typed value for one match field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Port(u8),
    Mac(MacAddr),
    EtherType(u16),
    Ipv4(Ipv4Addr),
    IpProto(u8),
    L4Port(u16),
}

impl FieldValue {
    fn fits(&self, kind: FieldKind) -> bool {
        use FieldKind::*;
        matches!(
            (self, kind),
            (FieldValue::Port(_), IngressPort | EgressPort)
                | (FieldValue::Mac(_), EthDst | EthSrc)
                | (FieldValue::EtherType(_), EthType)
                | (FieldValue::Ipv4(_), Ipv4Dst | Ipv4Src)
                | (FieldValue::IpProto(_), IpProto)
                | (FieldValue::L4Port(_), L4Src | L4Dst)
        )
    }

    /// Network-order bytes of the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Port(p) | FieldValue::IpProto(p) => vec![*p],
            FieldValue::Mac(mac) => mac.octets().to_vec(),
            FieldValue::EtherType(v) | FieldValue::L4Port(v) => v.to_be_bytes().to_vec(),
            FieldValue::Ipv4(addr) => addr.octets().to_vec(),
        }
    }

    fn from_bytes(kind: FieldKind, bytes: &[u8]) -> Option<Self> {
        use FieldKind::*;
        let value = match kind {
            IngressPort | EgressPort => FieldValue::Port(*bytes.first()?),
            IpProto => FieldValue::IpProto(*bytes.first()?),
            EthType => FieldValue::EtherType(u16::from_be_bytes(bytes.try_into().ok()?)),
            L4Src | L4Dst => FieldValue::L4Port(u16::from_be_bytes(bytes.try_into().ok()?)),
            Ipv4Dst | Ipv4Src => {
                let octets: [u8; 4] = bytes.try_into().ok()?;
                FieldValue::Ipv4(Ipv4Addr::from(octets))
            }
            EthDst | EthSrc => FieldValue::Mac(MacAddr(bytes.try_into().ok()?)),
        };
        Some(value)
    }

    /// Parse a textual value for `kind`.
    ///
    /// Integers accept decimal or `0x`-prefixed hex. Addresses that do not
    /// parse yield `InvalidAddress`; everything else yields `InvalidValue`.
    pub fn parse(kind: FieldKind, raw: &str) -> Result<Self> {
        use FieldKind::*;
        let raw = raw.trim();
        let invalid = |reason: String| RuleError::InvalidValue {
            field: kind,
            value: raw.to_string(),
            reason,
        };
        let value = match kind {
            IngressPort | EgressPort => FieldValue::Port(parse_int(raw).map_err(invalid)?),
            IpProto => FieldValue::IpProto(parse_int(raw).map_err(invalid)?),
            EthType => FieldValue::EtherType(parse_int(raw).map_err(invalid)?),
            L4Src | L4Dst => FieldValue::L4Port(parse_int(raw).map_err(invalid)?),
            Ipv4Dst | Ipv4Src => FieldValue::Ipv4(parse_ipv4(kind, raw)?),
            EthDst | EthSrc => FieldValue::Mac(parse_mac(kind, raw)?),
        };
        Ok(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Port(p) | FieldValue::IpProto(p) => write!(f, "{}", p),
            FieldValue::Mac(mac) => write!(f, "{}", mac),
            FieldValue::EtherType(v) => write!(f, "0x{:04x}", v),
            FieldValue::Ipv4(addr) => write!(f, "{}", addr),
            FieldValue::L4Port(v) => write!(f, "{}", v),
        }
    }
}

pub(crate) fn parse_ipv4(kind: FieldKind, raw: &str) -> Result<Ipv4Addr> {
    raw.parse::<Ipv4Addr>()
        .map_err(|_| RuleError::InvalidAddress {
            field: kind,
            value: raw.to_string(),
        })
}

pub(crate) fn parse_mac(kind: FieldKind, raw: &str) -> Result<MacAddr> {
    raw.parse::<MacAddr>()
        .map_err(|_| RuleError::InvalidAddress {
            field: kind,
            value: raw.to_string(),
        })
}

fn parse_int<T>(raw: &str) -> std::result::Result<T, String>
where
    T: TryFrom<u64>,
{
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    }
    .map_err(|e| e.to_string())?;
    T::try_from(parsed).map_err(|_| format!("{} is out of range", parsed))
}

/// A single ternary match on one field.
///
/// Value and mask always have exactly `field.width()` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchCriterion {
    field: FieldKind,
    value: Vec<u8>,
    mask: Vec<u8>,
}

impl MatchCriterion {
    /// Encode a typed value with a full mask.
    pub fn new(field: FieldKind, value: FieldValue) -> Result<Self> {
        if !value.fits(field) {
            return Err(RuleError::InvalidValue {
                field,
                value: value.to_string(),
                reason: "value type does not belong to this field".to_string(),
            });
        }
        Ok(Self {
            field,
            value: value.to_bytes(),
            mask: vec![0xff; field.width()],
        })
    }

    /// Parse a textual value for `field` and encode it.
    pub fn parse(field: FieldKind, raw: &str) -> Result<Self> {
        Self::new(field, FieldValue::parse(field, raw)?)
    }

    /// Build from raw value/mask bytes, enforcing the field width.
    pub fn from_bytes(field: FieldKind, value: Vec<u8>, mask: Vec<u8>) -> Result<Self> {
        let width = field.width();
        if value.len() != width || mask.len() != width {
            return Err(RuleError::InvalidValue {
                field,
                value: bytes_to_hex(&value),
                reason: format!(
                    "expected {} byte value and mask, got {} and {}",
                    width,
                    value.len(),
                    mask.len()
                ),
            });
        }
        Ok(Self { field, value, mask })
    }

    pub fn field(&self) -> FieldKind {
        self.field
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    pub fn value_hex(&self) -> String {
        bytes_to_hex(&self.value)
    }

    pub fn mask_hex(&self) -> String {
        bytes_to_hex(&self.mask)
    }

    /// Typed view of the value.
    pub fn typed_value(&self) -> Option<FieldValue> {
        FieldValue::from_bytes(self.field, &self.value)
    }
}

impl fmt::Display for MatchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typed_value() {
            Some(v) => write!(f, "{}={}", self.field, v),
            None => write!(f, "{}=0x{}", self.field, self.value_hex()),
        }
    }
}

/// Encode `value` for `kind` as a `(value_hex, mask_hex)` pair.
pub fn encode(kind: FieldKind, value: &FieldValue) -> Result<(String, String)> {
    let criterion = MatchCriterion::new(kind, *value)?;
    Ok((criterion.value_hex(), criterion.mask_hex()))
}

/// Decode a hex value reported for `kind` back into its typed value.
pub fn decode(kind: FieldKind, hex: &str) -> Result<FieldValue> {
    normalize_value(kind, hex)
        .and_then(|bytes| FieldValue::from_bytes(kind, &bytes))
        .ok_or_else(|| {
            if kind.is_address() {
                RuleError::InvalidAddress {
                    field: kind,
                    value: hex.to_string(),
                }
            } else {
                RuleError::InvalidValue {
                    field: kind,
                    value: hex.to_string(),
                    reason: format!("not a {} byte hex value", kind.width()),
                }
            }
        })
}

/// Bring a controller-reported hex value to exactly `kind.width()` bytes.
///
/// Accepts an optional `0x` prefix, odd digit counts and missing or extra
/// leading zeros. Returns `None` when the string is not hex or the value does
/// not fit the field.
pub fn normalize_value(kind: FieldKind, hex: &str) -> Option<Vec<u8>> {
    let digits = hex
        .trim()
        .strip_prefix("0x")
        .or_else(|| hex.trim().strip_prefix("0X"))
        .unwrap_or_else(|| hex.trim());
    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    let bytes = hex_to_bytes(&padded)?;
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let width = kind.width();
    if significant.len() > width {
        return None;
    }
    let mut out = vec![0u8; width - significant.len()];
    out.extend(significant);
    Some(out)
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_to_bytes(digits: &str) -> Option<Vec<u8>> {
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}
