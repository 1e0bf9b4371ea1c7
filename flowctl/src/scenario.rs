//! Fixed rule sets for the classifier deployment
//!
//! - `bypass`: forward 1→2 and 2→1 directly
//! - `enable`: send ingress traffic through the classifier on port 4, return it
//!   on port 3, keep the reverse path direct, and shift the classifier fields
//!   on egress port 4
//! - `disable`: remove every rule the other two install

use anyhow::{Context, Result};
use flow_rules::prelude::*;
use tracing::info;

const PRIORITY: u32 = 40;

/// One rule of a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRule {
    pub table: &'static str,
    pub matches: MatchOptions,
    pub actions: ActionOptions,
}

fn forward(ingress: u8, output: u16) -> ScenarioRule {
    ScenarioRule {
        table: "forward",
        matches: MatchOptions::new().ingress_port(ingress),
        actions: ActionOptions::output(output),
    }
}

/// Delete target for the forward rule on `ingress`; carries no action.
fn forward_target(ingress: u8) -> ScenarioRule {
    ScenarioRule {
        table: "forward",
        matches: MatchOptions::new().ingress_port(ingress),
        actions: ActionOptions::default(),
    }
}

fn shift_on_egress(egress: u8) -> ScenarioRule {
    ScenarioRule {
        table: "fxpt_format",
        matches: MatchOptions::new().egress_port(egress),
        actions: ActionOptions::default(),
    }
}

pub fn bypass_rules() -> Vec<ScenarioRule> {
    vec![forward(1, 2), forward(2, 1)]
}

pub fn enable_rules() -> Vec<ScenarioRule> {
    vec![
        forward(1, 4),
        forward(3, 2),
        // reverse path skips the classifier
        forward(2, 1),
        shift_on_egress(4),
    ]
}

/// Rules removed by `disable`.
pub fn disable_rules() -> Vec<ScenarioRule> {
    let mut rules: Vec<ScenarioRule> = (1..=4).map(forward_target).collect();
    rules.push(shift_on_egress(4));
    rules
}

pub async fn install_all<A: FlowApi>(session: &RuleSession<A>, rules: &[ScenarioRule]) -> Result<()> {
    let options = RuleOptions::permanent(PRIORITY);
    for rule in rules {
        let ack = session
            .install_rule(rule.table, &rule.matches, &rule.actions, &options)
            .await
            .with_context(|| format!("Failed to install {:?} rule {:?}", rule.table, rule.matches))?;
        info!("Installed {} rule {:?}: {:?}", rule.table, rule.matches, ack);
    }
    Ok(())
}

pub async fn delete_all<A: FlowApi>(session: &RuleSession<A>, rules: &[ScenarioRule]) -> Result<()> {
    for rule in rules {
        let ack = session
            .delete_rule(rule.table, &rule.matches)
            .await
            .with_context(|| format!("Failed to delete {:?} rule {:?}", rule.table, rule.matches))?;
        info!("Deleted {} rule {:?}: {:?}", rule.table, rule.matches, ack);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flow_rules::{InstalledRule, RulePayload};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        flows: Mutex<Vec<InstalledRule>>,
    }

    #[async_trait]
    impl FlowApi for Recorder {
        async fn create_flow(&self, device: &DeviceId, payload: &RulePayload) -> flow_rules::Result<Ack> {
            let mut flows = self.flows.lock().unwrap();
            let id = format!("{}", flows.len() + 1);
            flows.push(InstalledRule {
                id: id.clone(),
                table_id: payload.table_id.clone(),
                device_id: Some(device.to_string()),
                selector: payload.selector.clone(),
                treatment: None,
                extra: Default::default(),
            });
            Ok(Ack::Installed { status: 201, flow_id: Some(id) })
        }

        async fn list_flows(&self) -> flow_rules::Result<Vec<InstalledRule>> {
            Ok(self.flows.lock().unwrap().clone())
        }

        async fn remove_flow(&self, _device: &DeviceId, flow_id: &str) -> flow_rules::Result<Ack> {
            self.flows.lock().unwrap().retain(|f| f.id != flow_id);
            Ok(Ack::Removed { status: 204, flow_id: flow_id.to_string() })
        }
    }

    #[test]
    fn test_rule_sets() {
        assert_eq!(bypass_rules().len(), 2);
        let enable = enable_rules();
        assert_eq!(enable.len(), 4);
        assert_eq!(enable[3].table, "fxpt_format");
        assert_eq!(enable[0].actions.output_port, Some(4));
        assert_eq!(disable_rules().len(), 5);
    }

    #[test]
    fn test_disable_targets_carry_no_action() {
        for rule in disable_rules() {
            assert_eq!(rule.actions, ActionOptions::default(), "{:?}", rule.matches);
        }
    }

    #[tokio::test]
    async fn test_enable_then_disable_clears_device() {
        let session = RuleSession::new(Recorder::default(), DeviceId::new("device:s1bmv2"));
        install_all(&session, &enable_rules()).await.unwrap();
        assert_eq!(session.list_rules(None).await.unwrap().len(), 4);

        delete_all(&session, &disable_rules()).await.unwrap();
        assert!(session.list_rules(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bypass_then_disable() {
        let session = RuleSession::new(Recorder::default(), DeviceId::new("device:s1"));
        install_all(&session, &bypass_rules()).await.unwrap();
        delete_all(&session, &disable_rules()).await.unwrap();
        assert!(session.list_rules(Some("forward")).await.unwrap().is_empty());
    }
}
