//! Controller-reported application health.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a controller application as reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationHealth {
    /// All resources are healthy.
    Healthy,
    /// Resources are still rolling out.
    Progressing,
    /// At least one resource is degraded.
    Degraded,
    /// The application is paused.
    Suspended,
    /// The controller has no such application, or resources are absent.
    Missing,
    /// Health could not be determined.
    Unknown,
}

/// How the reconciliation workflow treats a health observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Converged healthy.
    Ready,
    /// Converged unhealthy.
    Failed,
    /// Not converged yet; observe again later.
    Pending,
}

impl ApplicationHealth {
    /// Parses the controller's `status.health.status` string.
    ///
    /// Unrecognized values map to [`ApplicationHealth::Unknown`].
    #[must_use]
    pub fn from_controller(value: &str) -> Self {
        match value {
            "Healthy" => Self::Healthy,
            "Progressing" => Self::Progressing,
            "Degraded" => Self::Degraded,
            "Suspended" => Self::Suspended,
            "Missing" => Self::Missing,
            _ => Self::Unknown,
        }
    }

    /// Returns the controller's spelling of this health value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Progressing => "Progressing",
            Self::Degraded => "Degraded",
            Self::Suspended => "Suspended",
            Self::Missing => "Missing",
            Self::Unknown => "Unknown",
        }
    }

    /// Classifies this observation.
    ///
    /// `unknown_is_failure` selects whether `Unknown` collapses into failure
    /// or is observed again.
    #[must_use]
    pub const fn verdict(self, unknown_is_failure: bool) -> HealthVerdict {
        match self {
            Self::Healthy => HealthVerdict::Ready,
            Self::Degraded => HealthVerdict::Failed,
            Self::Unknown if unknown_is_failure => HealthVerdict::Failed,
            Self::Progressing | Self::Suspended | Self::Missing | Self::Unknown => {
                HealthVerdict::Pending
            }
        }
    }
}

impl fmt::Display for ApplicationHealth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
