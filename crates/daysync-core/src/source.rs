//! Source identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The closed set of external sources the engine knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Sleep tracker nights.
    Sleep,
    /// Fitness tracker activities.
    Workout,
    /// Smart scale measurements.
    BodyMeasurement,
    /// Game-session telemetry, one row per game per day.
    GameSession,
    /// Source-control commits.
    Commit,
}

impl SourceKind {
    /// Every source, in "run all" order.
    pub const ALL: [SourceKind; 5] = [
        Self::Sleep,
        Self::Workout,
        Self::BodyMeasurement,
        Self::GameSession,
        Self::Commit,
    ];

    /// Returns the config key for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Workout => "workout",
            Self::BodyMeasurement => "body_measurement",
            Self::GameSession => "game_session",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownSource(s.to_string()))
    }
}
