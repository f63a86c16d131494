//! Named session presets fixing timeouts and network allowances.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Session preset for a transport.
///
/// Only [`SessionProfile::NoBackground`] is a foreground profile. Foreground
/// calls fail fast when the network is gone; background calls wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionProfile {
    /// Foreground calls that must not hang.
    #[default]
    NoBackground,
    /// Small background transfers.
    LightBackground,
    /// Medium background transfers.
    AverageBackground,
    /// Large background transfers.
    TimeConsumingBackground,
    /// Large background transfers restricted to unmetered networks.
    TimeConsumingBackgroundNoCellular,
}

impl SessionProfile {
    /// All presets.
    pub const ALL: [Self; 5] = [
        Self::NoBackground,
        Self::LightBackground,
        Self::AverageBackground,
        Self::TimeConsumingBackground,
        Self::TimeConsumingBackgroundNoCellular,
    ];

    /// Maximum idle time between packets.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(match self {
            Self::NoBackground => MINUTE,
            Self::LightBackground => 15 * MINUTE,
            Self::AverageBackground => 30 * MINUTE,
            Self::TimeConsumingBackground | Self::TimeConsumingBackgroundNoCellular => HOUR,
        })
    }

    /// Maximum lifetime of a whole task.
    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(match self {
            Self::NoBackground => 7 * DAY,
            Self::LightBackground => 30 * MINUTE,
            Self::AverageBackground => HOUR,
            Self::TimeConsumingBackground | Self::TimeConsumingBackgroundNoCellular => 3 * HOUR,
        })
    }

    /// Returns true for the foreground preset.
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::NoBackground)
    }

    /// Whether tasks wait for a network path instead of failing.
    pub fn waits_for_connectivity(&self) -> bool {
        !self.is_foreground()
    }

    /// Whether cellular interfaces may be used.
    pub fn allows_cellular(&self) -> bool {
        !matches!(self, Self::TimeConsumingBackgroundNoCellular)
    }

    /// Whether expensive (metered) paths may be used.
    pub fn allows_expensive(&self) -> bool {
        self.allows_cellular()
    }

    /// Whether constrained (low data mode) paths may be used.
    pub fn allows_constrained(&self) -> bool {
        self.allows_cellular()
    }

    /// Stable name, as accepted by [`str::parse`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoBackground => "no-background",
            Self::LightBackground => "light-background",
            Self::AverageBackground => "average-background",
            Self::TimeConsumingBackground => "time-consuming-background",
            Self::TimeConsumingBackgroundNoCellular => "time-consuming-background-no-cellular",
        }
    }
}

impl fmt::Display for SessionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SessionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|profile| profile.name() == normalized)
            .ok_or_else(|| format!("unknown session profile: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_no_background_is_foreground() {
        for profile in SessionProfile::ALL {
            assert_eq!(
                profile.is_foreground(),
                profile == SessionProfile::NoBackground
            );
        }
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(
            SessionProfile::LightBackground.resource_timeout(),
            Duration::from_secs(1800)
        );
        assert_eq!(
            SessionProfile::AverageBackground.request_timeout(),
            Duration::from_secs(1800)
        );
        assert_eq!(
            SessionProfile::TimeConsumingBackground.resource_timeout(),
            Duration::from_secs(3 * 3600)
        );
        for profile in SessionProfile::ALL {
            assert!(profile.request_timeout() <= profile.resource_timeout());
        }
    }

    #[test]
    fn test_no_cellular_allowances() {
        let profile = SessionProfile::TimeConsumingBackgroundNoCellular;
        assert!(!profile.allows_cellular());
        assert!(!profile.allows_expensive());
        assert!(!profile.allows_constrained());
        assert!(SessionProfile::TimeConsumingBackground.allows_cellular());
    }

    #[test]
    fn test_parse_names() {
        for profile in SessionProfile::ALL {
            assert_eq!(profile.name().parse::<SessionProfile>().unwrap(), profile);
        }
        assert_eq!(
            "Light_Background".parse::<SessionProfile>().unwrap(),
            SessionProfile::LightBackground
        );
        assert!("turbo".parse::<SessionProfile>().is_err());
    }
}
