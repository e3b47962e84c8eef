//! Pull request webhook actions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Action carried by a pull request webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrAction {
    /// The pull request was opened.
    Opened,
    /// New commits were pushed to the head branch.
    Synchronize,
    /// The pull request was closed, merged or not.
    Closed,
    /// The pull request was reopened.
    Reopened,
    /// Any other action, kept verbatim.
    Other(String),
}

impl PrAction {
    /// Parses a webhook action string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "opened" => Self::Opened,
            "synchronize" => Self::Synchronize,
            "closed" => Self::Closed,
            "reopened" => Self::Reopened,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the webhook spelling of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Synchronize => "synchronize",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::Other(value) => value,
        }
    }

    /// Returns whether the action should (re)deploy a preview.
    #[must_use]
    pub const fn triggers_deploy(&self) -> bool {
        matches!(self, Self::Opened | Self::Synchronize | Self::Reopened)
    }

    /// Returns whether the action is one the system tracks at all.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for PrAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl Serialize for PrAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PrAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
