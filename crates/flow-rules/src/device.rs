//! Target device identifier

use std::fmt;

use serde::{Deserialize, Serialize};

/// Device the session programs, e.g. `device:s1bmv2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Append the switch-type suffix (`device:s1` + `bmv2` = `device:s1bmv2`).
    pub fn with_switch_type(self, switch_type: &str) -> Self {
        Self(format!("{}{}", self.0, switch_type))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_type_suffix() {
        let id = DeviceId::new("device:s1").with_switch_type("bmv2");
        assert_eq!(id.as_str(), "device:s1bmv2");
        assert_eq!(id.to_string(), "device:s1bmv2");
    }
}
