//! Pipeline table and action catalog
//!
//! Static description of the tables the client can program. Each entry names
//! the table's fully qualified identifier, the actions it carries and the
//! action used when the caller asks for nothing more specific. Adding a table
//! or an action means adding an entry here.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RuleError};
use crate::options::ActionOptions;

/// Actions a pipeline table can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// Forward out of a given port.
    SetOutputPort,
    NoOp,
    Drop,
    /// Fixed-point format shift of the classifier fields.
    ShiftFields,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetOutputPort => write!(f, "set_output_port"),
            Self::NoOp => write!(f, "noop"),
            Self::Drop => write!(f, "drop"),
            Self::ShiftFields => write!(f, "shift_fields"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "set_output_port" | "output" | "forward" => Ok(Self::SetOutputPort),
            "noop" | "no_op" => Ok(Self::NoOp),
            "drop" => Ok(Self::Drop),
            "shift_fields" | "shift" => Ok(Self::ShiftFields),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

/// One action a table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub kind: ActionKind,
    /// Fully qualified action identifier.
    pub action_id: &'static str,
    /// Name of the action's single parameter, if it takes one.
    pub param: Option<&'static str>,
}

/// Immutable catalog entry for one pipeline table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// Short name callers use (`forward`, `fxpt_format`).
    pub name: &'static str,
    /// Fully qualified table identifier.
    pub table_id: &'static str,
    pub actions: &'static [ActionSpec],
    /// Action selected when the options ask for nothing the table supports.
    pub default_action: ActionKind,
}

/// Ingress forwarding table.
pub static FORWARD: TableSpec = TableSpec {
    name: "forward",
    table_id: "IngressPipeImpl.forward_control.forward_table",
    actions: &[
        ActionSpec {
            kind: ActionKind::SetOutputPort,
            action_id: "IngressPipeImpl.forward_control.set_output_port",
            param: Some("port_num"),
        },
        ActionSpec {
            kind: ActionKind::NoOp,
            action_id: "IngressPipeImpl.forward_control.noop",
            param: None,
        },
        ActionSpec {
            kind: ActionKind::Drop,
            action_id: "IngressPipeImpl.forward_control.drop",
            param: None,
        },
    ],
    default_action: ActionKind::Drop,
};

/// Egress fixed-point format shift table.
pub static FXPT_FORMAT: TableSpec = TableSpec {
    name: "fxpt_format",
    table_id: "EgressPipeImpl.fxpt_format_control.fxpt_format_table",
    actions: &[ActionSpec {
        kind: ActionKind::ShiftFields,
        action_id: "EgressPipeImpl.fxpt_format_control.shift_fields",
        param: None,
    }],
    default_action: ActionKind::ShiftFields,
};

/// Every table the client knows about.
pub static TABLES: &[&TableSpec] = &[&FORWARD, &FXPT_FORMAT];

/// A resolved action instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSelection {
    pub kind: ActionKind,
    pub action_id: String,
    pub params: BTreeMap<String, String>,
}

/// Resolve a table by its short name.
pub fn resolve_table(name: &str) -> Result<&'static TableSpec> {
    TABLES
        .iter()
        .copied()
        .find(|t| t.name == name)
        .ok_or_else(|| RuleError::UnknownTable {
            name: name.to_string(),
            known: known_tables(),
        })
}

/// Resolve the identifier of `action` on `table`.
pub fn resolve_action(table: &TableSpec, action: ActionKind) -> Result<&'static str> {
    table.action(action).map(|a| a.action_id)
}

fn known_tables() -> String {
    TABLES.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
}

impl TableSpec {
    pub fn action(&self, kind: ActionKind) -> Result<&'static ActionSpec> {
        self.actions
            .iter()
            .find(|a| a.kind == kind)
            .ok_or_else(|| RuleError::UnknownAction {
                table: self.name.to_string(),
                action: kind,
            })
    }

    pub fn supports(&self, kind: ActionKind) -> bool {
        self.actions.iter().any(|a| a.kind == kind)
    }

    /// Choose the action for a set of caller options.
    ///
    /// An output port wins when the table can forward, then an explicit
    /// no-op, then the table's default. Options the table cannot honour are
    /// ignored.
    pub fn select_action(&self, options: &ActionOptions) -> Result<ActionSelection> {
        if let Some(port) = options.output_port {
            if self.supports(ActionKind::SetOutputPort) {
                return self.with_param(ActionKind::SetOutputPort, format!("{:x}", port));
            }
        }
        if options.no_op && self.supports(ActionKind::NoOp) {
            return self.selection(ActionKind::NoOp);
        }
        self.selection(self.default_action)
    }

    /// Select a specific action by kind.
    ///
    /// Fails with `UnknownAction` when the table does not carry it or when it
    /// needs a parameter.
    pub fn selection(&self, kind: ActionKind) -> Result<ActionSelection> {
        let spec = self.action(kind)?;
        if spec.param.is_some() {
            return Err(RuleError::UnknownAction {
                table: self.name.to_string(),
                action: kind,
            });
        }
        Ok(ActionSelection {
            kind,
            action_id: spec.action_id.to_string(),
            params: BTreeMap::new(),
        })
    }

    fn with_param(&self, kind: ActionKind, value: String) -> Result<ActionSelection> {
        let spec = self.action(kind)?;
        let mut params = BTreeMap::new();
        if let Some(name) = spec.param {
            params.insert(name.to_string(), value);
        }
        Ok(ActionSelection {
            kind,
            action_id: spec.action_id.to_string(),
            params,
        })
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.table_id)
    }
}
