//! Rule session
//!
//! A session binds one controller transport to one device. It is the only
//! place callers go through: `install_rule` and `delete_rule` take table
//! names and options, never controller flow ids.

use tracing::{debug, info};

use crate::builder;
use crate::catalog::{resolve_table, TableSpec};
use crate::client::{Ack, FlowApi, OnosClient};
use crate::config::ControllerConfig;
use crate::device::DeviceId;
use crate::error::Result;
use crate::options::{ActionOptions, MatchOptions, RuleIntent, RuleOptions};
use crate::resolver::{self, AmbiguityPolicy};
use crate::wire::{InstalledRule, RulePayload};

/// Rule operations scoped to a single device
pub struct RuleSession<A = OnosClient> {
    api: A,
    device: DeviceId,
    policy: AmbiguityPolicy,
}

impl RuleSession<OnosClient> {
    /// Create a session talking to the configured controller
    pub fn connect(config: &ControllerConfig) -> Result<Self> {
        let api = OnosClient::new(config)?;
        let device = config.device();
        info!("Rule session for {} via {}", device, api.base_url());
        Ok(Self::new(api, device).with_policy(config.ambiguity))
    }
}

impl<A: FlowApi> RuleSession<A> {
    pub fn new(api: A, device: DeviceId) -> Self {
        Self {
            api,
            device,
            policy: AmbiguityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Build the creation payload without sending it.
    pub fn build(
        &self,
        table: &str,
        matches: &MatchOptions,
        actions: &ActionOptions,
        rule: &RuleOptions,
    ) -> Result<RulePayload> {
        let table = resolve_table(table)?;
        let intent = RuleIntent::from_options(table, matches)?;
        let action = table.select_action(actions)?;
        Ok(builder::build(&self.device, &intent, &action, rule))
    }

    /// Submit a prebuilt payload.
    pub async fn install(&self, payload: &RulePayload) -> Result<Ack> {
        self.api.create_flow(&self.device, payload).await
    }

    /// Install a rule on `table` matching `matches`.
    pub async fn install_rule(
        &self,
        table: &str,
        matches: &MatchOptions,
        actions: &ActionOptions,
        rule: &RuleOptions,
    ) -> Result<Ack> {
        let payload = self.build(table, matches, actions, rule)?;
        debug!(
            "Installing rule in {} on {} with {} match entries",
            payload.table_id,
            self.device,
            payload.selector.criteria.first().map_or(0, |c| c.matches.len())
        );
        self.install(&payload).await
    }

    /// Find the controller id of the rule matching `intent`.
    pub async fn resolve(&self, intent: &RuleIntent) -> Result<Option<String>> {
        resolver::resolve(&self.api, &self.device, intent, self.policy).await
    }

    /// Find the controller id of the rule on `table` matching `matches`.
    pub async fn resolve_rule(&self, table: &str, matches: &MatchOptions) -> Result<Option<String>> {
        let table = resolve_table(table)?;
        self.resolve(&RuleIntent::from_options(table, matches)?).await
    }

    /// Remove the rule matching `intent`. A missing rule is not an error.
    pub async fn delete(&self, intent: &RuleIntent) -> Result<Ack> {
        match self.resolve(intent).await? {
            Some(flow_id) => self.api.remove_flow(&self.device, &flow_id).await,
            None => {
                debug!("No rule matches {} on {}, nothing to delete", intent, self.device);
                Ok(Ack::NotPresent)
            }
        }
    }

    /// Remove the rule on `table` matching `matches`.
    pub async fn delete_rule(&self, table: &str, matches: &MatchOptions) -> Result<Ack> {
        let table = resolve_table(table)?;
        self.delete(&RuleIntent::from_options(table, matches)?).await
    }

    /// Rules on this session's device, optionally restricted to one table.
    pub async fn list_rules(&self, table: Option<&str>) -> Result<Vec<InstalledRule>> {
        let table: Option<&TableSpec> = table.map(resolve_table).transpose()?;
        let flows = self.api.list_flows().await?;
        Ok(flows
            .into_iter()
            .filter(|f| {
                f.device_id
                    .as_deref()
                    .map_or(true, |d| d == self.device.as_str())
            })
            .filter(|f| table.map_or(true, |t| f.table_id == t.table_id))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::field::FieldKind;
    use crate::wire::{Selector, PROTOCOL_INDEPENDENT};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory controller holding flows for any device.
    #[derive(Default)]
    pub(crate) struct FakeController {
        flows: Mutex<Vec<InstalledRule>>,
        next_id: AtomicUsize,
        pub(crate) reject_installs: Option<u16>,
    }

    impl FakeController {
        pub(crate) fn flows(&self) -> Vec<InstalledRule> {
            self.flows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FlowApi for FakeController {
        async fn create_flow(&self, device: &DeviceId, payload: &RulePayload) -> Result<Ack> {
            if let Some(status) = self.reject_installs {
                return Err(RuleError::Install {
                    status,
                    body: "rejected".to_string(),
                    table: payload.table_id.clone(),
                    device: device.to_string(),
                });
            }
            let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1000).to_string();
            self.flows.lock().unwrap().push(InstalledRule {
                id: id.clone(),
                table_id: payload.table_id.clone(),
                device_id: Some(device.to_string()),
                selector: payload.selector.clone(),
                treatment: serde_json::to_value(&payload.treatment).ok(),
                extra: Default::default(),
            });
            Ok(Ack::Installed {
                status: 201,
                flow_id: Some(id),
            })
        }

        async fn list_flows(&self) -> Result<Vec<InstalledRule>> {
            Ok(self.flows())
        }

        async fn remove_flow(&self, device: &DeviceId, flow_id: &str) -> Result<Ack> {
            let mut flows = self.flows.lock().unwrap();
            let before = flows.len();
            flows.retain(|f| f.id != flow_id);
            if flows.len() == before {
                return Err(RuleError::Delete {
                    status: 404,
                    body: "no such flow".to_string(),
                    flow_id: flow_id.to_string(),
                    device: device.to_string(),
                });
            }
            Ok(Ack::Removed {
                status: 204,
                flow_id: flow_id.to_string(),
            })
        }
    }

    fn session() -> RuleSession<FakeController> {
        RuleSession::new(FakeController::default(), DeviceId::new("device:s1bmv2"))
    }

    fn ingress(port: u8) -> MatchOptions {
        MatchOptions::new().ingress_port(port)
    }

    #[tokio::test]
    async fn test_install_then_delete_leaves_nothing() {
        let s = session();
        let ack = s
            .install_rule("forward", &ingress(1), &ActionOptions::output(2), &RuleOptions::permanent(40))
            .await
            .unwrap();
        assert!(matches!(ack, Ack::Installed { .. }));
        assert_eq!(s.list_rules(Some("forward")).await.unwrap().len(), 1);

        let ack = s.delete_rule("forward", &ingress(1)).await.unwrap();
        assert_eq!(ack.flow_id(), Some("1000"));
        assert!(s.resolve_rule("forward", &ingress(1)).await.unwrap().is_none());
        assert!(s.list_rules(Some("forward")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let s = session();
        s.install_rule("forward", &ingress(3), &ActionOptions::output(2), &RuleOptions::default())
            .await
            .unwrap();

        let first = s.delete_rule("forward", &ingress(3)).await.unwrap();
        assert!(matches!(first, Ack::Removed { .. }));
        let second = s.delete_rule("forward", &ingress(3)).await.unwrap();
        assert_eq!(second, Ack::NotPresent);
    }

    #[tokio::test]
    async fn test_delete_only_touches_the_matching_rule() {
        let s = session();
        for (port, out) in [(1, 2), (2, 1)] {
            s.install_rule("forward", &ingress(port), &ActionOptions::output(out), &RuleOptions::default())
                .await
                .unwrap();
        }
        s.install_rule(
            "fxpt_format",
            &MatchOptions::new().egress_port(4),
            &ActionOptions::default(),
            &RuleOptions::permanent(40),
        )
        .await
        .unwrap();

        s.delete_rule("forward", &ingress(2)).await.unwrap();
        let left = s.api().flows();
        assert_eq!(left.len(), 2);
        let ports: Vec<_> = left
            .iter()
            .flat_map(|f| f.selector.criteria[0].matches.iter())
            .map(|m| (m.field.clone(), m.value.clone()))
            .collect();
        assert!(ports.contains(&(FieldKind::IngressPort.pipeline_field().to_string(), "01".to_string())));
        assert!(ports.contains(&(FieldKind::EgressPort.pipeline_field().to_string(), "04".to_string())));
    }

    #[tokio::test]
    async fn test_empty_format_rule_selects_shift() {
        let s = session();
        s.install_rule(
            "fxpt_format",
            &MatchOptions::new(),
            &ActionOptions::output(7),
            &RuleOptions::default(),
        )
        .await
        .unwrap();
        let flows = s.api().flows();
        assert_eq!(flows.len(), 1);
        let treatment = flows[0].treatment.as_ref().unwrap();
        assert_eq!(
            treatment["instructions"][0]["actionId"],
            "EgressPipeImpl.fxpt_format_control.shift_fields"
        );
        assert_eq!(flows[0].selector.criteria[0].kind, PROTOCOL_INDEPENDENT);
        assert!(flows[0].selector.criteria[0].matches.is_empty());

        let ack = s.delete_rule("fxpt_format", &MatchOptions::new()).await.unwrap();
        assert!(matches!(ack, Ack::Removed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_table_never_reaches_controller() {
        let s = session();
        let err = s
            .install_rule("acl", &ingress(1), &ActionOptions::default(), &RuleOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::UnknownTable { .. }));
        assert!(s.api().flows().is_empty());

        let err = s.delete_rule("acl", &ingress(1)).await.unwrap_err();
        assert!(matches!(err, RuleError::UnknownTable { .. }));
    }

    #[tokio::test]
    async fn test_install_error_is_surfaced() {
        let s = RuleSession::new(
            FakeController {
                reject_installs: Some(400),
                ..Default::default()
            },
            DeviceId::new("device:s1"),
        );
        let err = s
            .install_rule("forward", &ingress(1), &ActionOptions::default(), &RuleOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_rules_on_other_devices_are_invisible() {
        let shared = FakeController::default();
        shared
            .create_flow(
                &DeviceId::new("device:s2"),
                &RulePayload {
                    priority: 40,
                    timeout: 1,
                    is_permanent: true,
                    device_id: "device:s2".to_string(),
                    table_id: crate::catalog::FORWARD.table_id.to_string(),
                    treatment: Default::default(),
                    selector: Selector::default(),
                },
            )
            .await
            .unwrap();
        let s = RuleSession::new(shared, DeviceId::new("device:s1"));
        assert!(s.list_rules(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_duplicates() {
        let s = session().with_policy(AmbiguityPolicy::RejectAmbiguous);
        for _ in 0..2 {
            s.install_rule("forward", &ingress(1), &ActionOptions::output(2), &RuleOptions::default())
                .await
                .unwrap();
        }
        let err = s.delete_rule("forward", &ingress(1)).await.unwrap_err();
        assert!(matches!(err, RuleError::ResolutionAmbiguous { .. }));
        assert_eq!(s.api().flows().len(), 2);
    }
}
