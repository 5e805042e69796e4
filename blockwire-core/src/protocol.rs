//! Blockwire wire protocol: block kind tags, fixed routes and defaults.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address services bind to when none is configured.
pub const EXTENSION_DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Port 0 lets the OS pick a free port.
pub const EXTENSION_DEFAULT_PORT: u16 = 0;

pub const POLL_PATH: &str = "/poll";
pub const RESET_ALL_PATH: &str = "/reset_all";
pub const CROSSDOMAIN_PATH: &str = "/crossdomain.xml";

/// Poll line carrying one drained requester result.
pub const RESULT_LINE: &str = "_result";
/// Poll line listing every outstanding busy token.
pub const BUSY_LINE: &str = "_busy";

/// Block kinds. Serialised in kebab-case for configuration (`waiter-command`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Sensor,
    Boolean,
    Command,
    WaiterCommand,
    Hat,
    Requester,
    Reporter,
}

impl BlockKind {
    /// One-character tag used as the first element of a block spec.
    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Sensor | BlockKind::Reporter => "r",
            BlockKind::Boolean => "b",
            BlockKind::Command => " ",
            BlockKind::WaiterCommand => "w",
            BlockKind::Hat => "h",
            BlockKind::Requester => "R",
        }
    }

    /// Command-family kinds carry default argument literals and run the definition check.
    pub fn is_command(self) -> bool {
        matches!(self, BlockKind::Command | BlockKind::WaiterCommand)
    }

    /// Kinds whose value shows up in `/poll`.
    pub fn is_readable(self) -> bool {
        !self.is_command()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Sensor => "sensor",
            BlockKind::Boolean => "boolean",
            BlockKind::Command => "command",
            BlockKind::WaiterCommand => "waiter-command",
            BlockKind::Hat => "hat",
            BlockKind::Requester => "requester",
            BlockKind::Reporter => "reporter",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-domain policy served at `/crossdomain.xml`.
pub fn crossdomain_policy(port: u16) -> String {
    format!(
        "<cross-domain-policy>\n<allow-access-from domain=\"*\" to-ports=\"{}\"/>\n</cross-domain-policy>",
        port
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        assert_eq!(BlockKind::Sensor.tag(), "r");
        assert_eq!(BlockKind::Reporter.tag(), "r");
        assert_eq!(BlockKind::Boolean.tag(), "b");
        assert_eq!(BlockKind::Command.tag(), " ");
        assert_eq!(BlockKind::WaiterCommand.tag(), "w");
        assert_eq!(BlockKind::Hat.tag(), "h");
        assert_eq!(BlockKind::Requester.tag(), "R");
    }

    #[test]
    fn kind_serde_kebab_case() {
        let k: BlockKind = serde_json::from_str("\"waiter-command\"").unwrap();
        assert_eq!(k, BlockKind::WaiterCommand);
        assert_eq!(serde_json::to_string(&BlockKind::Hat).unwrap(), "\"hat\"");
        assert_eq!(BlockKind::WaiterCommand.to_string(), "waiter-command");
    }

    #[test]
    fn policy_mentions_port() {
        assert!(crossdomain_policy(4321).contains("to-ports=\"4321\""));
    }
}
