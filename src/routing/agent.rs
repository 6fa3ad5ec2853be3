//! Agent classification.
//!
//! # Responsibilities
//! - Parse the `agent` query parameter
//! - Normalize it onto the closed [`AgentTag`] set
//!
//! # Design Decisions
//! - Case-insensitive match
//! - First `agent` parameter wins when repeated
//! - Unknown or missing values fall back to the default tag (never an error)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller role used to group telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTag {
    #[default]
    Manager,
    Coder,
    Tester,
}

impl AgentTag {
    pub const ALL: [AgentTag; 3] = [AgentTag::Manager, AgentTag::Coder, AgentTag::Tester];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTag::Manager => "manager",
            AgentTag::Coder => "coder",
            AgentTag::Tester => "tester",
        }
    }
}

impl fmt::Display for AgentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a value is not one of the known agent tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent `{0}` (expected manager, coder or tester)")]
pub struct UnknownAgent(pub String);

impl FromStr for AgentTag {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownAgent(s.to_string()))
    }
}

/// Derive the agent tag from a raw query string (without the leading `?`).
pub fn classify(query: Option<&str>) -> AgentTag {
    let Some(query) = query else {
        return AgentTag::default();
    };

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "agent")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(classify(Some("agent=CODER")), AgentTag::Coder);
        assert_eq!(classify(Some("agent=coder")), AgentTag::Coder);
        assert_eq!(classify(Some("agent=coder&x=1")), AgentTag::Coder);
        assert_eq!(classify(Some("x=1&agent=Tester")), AgentTag::Tester);
    }

    #[test]
    fn classify_falls_back_to_default() {
        assert_eq!(classify(Some("agent=unknown")), AgentTag::Manager);
        assert_eq!(classify(Some("")), AgentTag::Manager);
        assert_eq!(classify(Some("agents=coder")), AgentTag::Manager);
        assert_eq!(classify(None), AgentTag::Manager);
    }

    #[test]
    fn first_agent_parameter_wins() {
        assert_eq!(classify(Some("agent=tester&agent=coder")), AgentTag::Tester);
    }

    #[test]
    fn parse_is_strict() {
        assert_eq!("Manager".parse::<AgentTag>(), Ok(AgentTag::Manager));
        assert!("boss".parse::<AgentTag>().is_err());
    }
}
