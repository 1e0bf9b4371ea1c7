//! Rule resolution
//!
//! The controller assigns flow ids at install time and never returns them to
//! the caller through the rule options. To remove a rule the client lists
//! every installed flow and finds the one whose table and match entries equal
//! the caller's intent.
//!
//! A flow qualifies when it is in the intent's table, belongs to the session
//! device (when the listing says which device it is on), and one of its
//! protocol-independent criteria has exactly as many match entries as the
//! intent has criteria with every (field, value) pair of the intent present.
//! Values are compared after normalising to the field width. Masks are
//! ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::FlowApi;
use crate::device::DeviceId;
use crate::error::{Result, RuleError};
use crate::field::{normalize_value, FieldKind};
use crate::options::RuleIntent;
use crate::wire::{InstalledRule, MatchEntry};

/// What to do when more than one installed flow matches an intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Take the first match in controller listing order.
    #[default]
    FirstMatch,
    /// Fail with `ResolutionAmbiguous`.
    RejectAmbiguous,
}

impl fmt::Display for AmbiguityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstMatch => write!(f, "first_match"),
            Self::RejectAmbiguous => write!(f, "reject_ambiguous"),
        }
    }
}

impl FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "first_match" | "first" => Ok(Self::FirstMatch),
            "reject_ambiguous" | "reject" | "strict" => Ok(Self::RejectAmbiguous),
            _ => Err(format!("Unknown ambiguity policy: {}", s)),
        }
    }
}

/// Does `entry` carry the same (field, value) pair as `(kind, value)`?
fn entry_matches(entry: &MatchEntry, kind: FieldKind, value: &[u8]) -> bool {
    entry.field == kind.pipeline_field()
        && normalize_value(kind, &entry.value).as_deref() == Some(value)
}

/// Is `flow` the same logical rule as `intent`?
pub fn matches_intent(flow: &InstalledRule, intent: &RuleIntent) -> bool {
    if flow.table_id != intent.table().table_id {
        return false;
    }
    flow.pi_criteria().any(|criterion| {
        criterion.matches.len() == intent.criteria().len()
            && intent.criteria().iter().all(|c| {
                criterion
                    .matches
                    .iter()
                    .any(|entry| entry_matches(entry, c.field(), c.value()))
            })
    })
}

/// All flows on `device` that match `intent`, in listing order.
pub fn find_matches<'a>(
    flows: &'a [InstalledRule],
    device: &DeviceId,
    intent: &RuleIntent,
) -> Vec<&'a InstalledRule> {
    flows
        .iter()
        .filter(|f| f.device_id.as_deref().map_or(true, |d| d == device.as_str()))
        .filter(|f| matches_intent(f, intent))
        .collect()
}

/// Pick one id from the candidates according to `policy`.
pub fn select(
    candidates: &[&InstalledRule],
    device: &DeviceId,
    intent: &RuleIntent,
    policy: AmbiguityPolicy,
) -> Result<Option<String>> {
    match candidates {
        [] => Ok(None),
        [only] => Ok(Some(only.id.clone())),
        [first, ..] => {
            let ids: Vec<String> = candidates.iter().map(|f| f.id.clone()).collect();
            match policy {
                AmbiguityPolicy::FirstMatch => {
                    warn!(
                        "{} flows match {} on {}, using first: {}",
                        ids.len(),
                        intent,
                        device,
                        first.id
                    );
                    Ok(Some(first.id.clone()))
                }
                AmbiguityPolicy::RejectAmbiguous => Err(RuleError::ResolutionAmbiguous {
                    table: intent.table().table_id.to_string(),
                    device: device.to_string(),
                    fields: intent.describe_fields(),
                    ids,
                }),
            }
        }
    }
}

/// Resolve the controller id of the flow matching `intent`.
///
/// Returns `Ok(None)` when nothing matches.
pub async fn resolve<A>(
    api: &A,
    device: &DeviceId,
    intent: &RuleIntent,
    policy: AmbiguityPolicy,
) -> Result<Option<String>>
where
    A: FlowApi + ?Sized,
{
    let flows = api.list_flows().await?;
    let candidates = find_matches(&flows, device, intent);
    debug!(
        "Resolving {} on {}: {} of {} flows match",
        intent,
        device,
        candidates.len(),
        flows.len()
    );
    select(&candidates, device, intent, policy)
}
