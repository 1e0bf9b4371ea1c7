//! Rule-control error types
//!
//! Local errors are raised before anything is sent to the controller.
//! Controller errors carry the HTTP status and response body verbatim,
//! together with the table, device and fields involved.

use thiserror::Error;

use crate::catalog::ActionKind;
use crate::field::FieldKind;

/// Errors raised while building, installing, resolving or removing rules
#[derive(Error, Debug)]
pub enum RuleError {
    // ========================================================================
    // Local (pre-flight) Errors
    // ========================================================================
    #[error("Invalid address for {field}: {value:?}")]
    InvalidAddress { field: FieldKind, value: String },

    #[error("Invalid value for {field}: {value:?} ({reason})")]
    InvalidValue {
        field: FieldKind,
        value: String,
        reason: String,
    },

    #[error("Duplicate criterion for {0}")]
    DuplicateField(FieldKind),

    #[error("Unknown table '{name}' (known tables: {known})")]
    UnknownTable { name: String, known: String },

    #[error("Table '{table}' has no action '{action}'")]
    UnknownAction { table: String, action: ActionKind },

    // ========================================================================
    // Controller Errors
    // ========================================================================
    #[error("Controller rejected rule for table {table} on {device}: HTTP {status} - {body}")]
    Install {
        status: u16,
        body: String,
        table: String,
        device: String,
    },

    #[error("Controller rejected delete of flow {flow_id} on {device}: HTTP {status} - {body}")]
    Delete {
        status: u16,
        body: String,
        flow_id: String,
        device: String,
    },

    #[error("Controller failed to list flows: HTTP {status} - {body}")]
    Listing { status: u16, body: String },

    #[error(
        "{} flows in table {table} on {device} match [{fields}]: {}",
        .ids.len(),
        .ids.join(", ")
    )]
    ResolutionAmbiguous {
        table: String,
        device: String,
        fields: String,
        ids: Vec<String>,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed controller response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    ClientSetup(#[source] reqwest::Error),
}

/// Result type alias using RuleError
pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// Returns true if the error was raised before contacting the controller
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RuleError::InvalidAddress { .. }
                | RuleError::InvalidValue { .. }
                | RuleError::DuplicateField(_)
                | RuleError::UnknownTable { .. }
                | RuleError::UnknownAction { .. }
        )
    }

    /// HTTP status returned by the controller, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RuleError::Install { status, .. }
            | RuleError::Delete { status, .. }
            | RuleError::Listing { status, .. } => Some(*status),
            RuleError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get a helpful suggestion for resolving this error
    pub fn suggestion(&self) -> &'static str {
        match self {
            RuleError::InvalidAddress { .. } => {
                "Use dotted-quad IPv4 (10.0.0.1) or colon-separated MAC (00:00:00:00:00:1a)"
            }
            RuleError::InvalidValue { .. } => "Check the value fits the field width",
            RuleError::DuplicateField(_) => "Give each match field at most once",
            RuleError::UnknownTable { .. } => "Use one of the known table names",
            RuleError::UnknownAction { .. } => "Pick an action the table supports",
            RuleError::Install { status: 401, .. }
            | RuleError::Delete { status: 401, .. }
            | RuleError::Listing { status: 401, .. } => "Check the controller credentials",
            RuleError::Install { .. } => {
                "Check the device is connected and the pipeline is loaded on it"
            }
            RuleError::Delete { .. } => "The flow may have been removed concurrently; list flows",
            RuleError::ResolutionAmbiguous { .. } => {
                "Remove the duplicate rules by id or use first-match resolution"
            }
            RuleError::Transport { .. } => "Check the controller URL and that it is running",
            _ => "Check controller logs for more details",
        }
    }
}
