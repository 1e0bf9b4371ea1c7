//! Rule payload assembly
//!
//! Pure transformation from an intent, an action selection and rule options
//! into the controller's rule-creation body. Nothing here touches the network.

use crate::catalog::ActionSelection;
use crate::device::DeviceId;
use crate::options::{RuleIntent, RuleOptions};
use crate::wire::{
    Instruction, MatchEntry, RulePayload, Selector, SelectorCriterion, Treatment,
    ACTION_SUBTYPE, PROTOCOL_INDEPENDENT, TERNARY,
};

/// Build the creation payload for `intent` on `device`.
///
/// An intent without criteria is legal and matches everything in its table.
/// Timeout and permanence are both carried; the controller decides which one
/// applies.
pub fn build(
    device: &DeviceId,
    intent: &RuleIntent,
    action: &ActionSelection,
    options: &RuleOptions,
) -> RulePayload {
    let matches = intent
        .criteria()
        .iter()
        .map(|c| MatchEntry {
            field: c.field().pipeline_field().to_string(),
            match_kind: TERNARY.to_string(),
            value: c.value_hex(),
            mask: Some(c.mask_hex()),
        })
        .collect();

    RulePayload {
        priority: options.priority,
        timeout: options.timeout,
        is_permanent: options.permanent,
        device_id: device.to_string(),
        table_id: intent.table().table_id.to_string(),
        treatment: Treatment {
            instructions: vec![Instruction {
                kind: PROTOCOL_INDEPENDENT.to_string(),
                subtype: ACTION_SUBTYPE.to_string(),
                action_id: action.action_id.clone(),
                action_params: action.params.clone(),
            }],
        },
        selector: Selector {
            criteria: vec![SelectorCriterion {
                kind: PROTOCOL_INDEPENDENT.to_string(),
                matches,
                extra: Default::default(),
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FORWARD, FXPT_FORMAT};
    use crate::options::{ActionOptions, MatchOptions};
    use serde_json::json;

    #[test]
    fn test_forward_payload_shape() {
        let device = DeviceId::new("device:s1bmv2");
        let intent = RuleIntent::from_options(
            &FORWARD,
            &MatchOptions::new()
                .ingress_port(1)
                .eth_src("00:00:00:00:00:1A")
                .eth_type(0x800)
                .ipv4_src("10.0.0.1"),
        )
        .unwrap();
        let action = FORWARD.select_action(&ActionOptions::output(3)).unwrap();
        let payload = build(&device, &intent, &action, &RuleOptions::permanent(400));

        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            v,
            json!({
                "priority": 400,
                "timeout": 1,
                "isPermanent": true,
                "deviceId": "device:s1bmv2",
                "tableId": "IngressPipeImpl.forward_control.forward_table",
                "treatment": {
                    "instructions": [{
                        "type": "PROTOCOL_INDEPENDENT",
                        "subtype": "ACTION",
                        "actionId": "IngressPipeImpl.forward_control.set_output_port",
                        "actionParams": { "port_num": "3" }
                    }]
                },
                "selector": {
                    "criteria": [{
                        "type": "PROTOCOL_INDEPENDENT",
                        "matches": [
                            { "field": "standard_metadata.ingress_port", "match": "ternary", "value": "01", "mask": "ff" },
                            { "field": "hdr.ethernet.src_addr", "match": "ternary", "value": "00000000001a", "mask": "ffffffffffff" },
                            { "field": "hdr.ethernet.ether_type", "match": "ternary", "value": "0800", "mask": "ffff" },
                            { "field": "hdr.ipv4.src_addr", "match": "ternary", "value": "0a000001", "mask": "ffffffff" }
                        ]
                    }]
                }
            })
        );
    }

    #[test]
    fn test_empty_criteria_on_format_table() {
        let device = DeviceId::new("device:s1");
        let intent = RuleIntent::new(&FXPT_FORMAT, vec![]).unwrap();
        let action = FXPT_FORMAT.select_action(&ActionOptions::output(9)).unwrap();
        let payload = build(&device, &intent, &action, &RuleOptions::default());

        assert_eq!(payload.selector.criteria.len(), 1);
        assert!(payload.selector.criteria[0].matches.is_empty());
        assert_eq!(
            payload.treatment.instructions[0].action_id,
            "EgressPipeImpl.fxpt_format_control.shift_fields"
        );
        assert!(payload.treatment.instructions[0].action_params.is_empty());
        assert!(!payload.is_permanent);
        assert_eq!(payload.timeout, 1);
    }
}
