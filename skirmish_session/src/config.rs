// Data-driven session configuration.
//
// `SessionConfig` holds every tunable the coordinator reads: the team table,
// the quorum, phase durations, and the draft and balancing policy switches.
// It is loaded once from JSON at startup and never mutated afterwards; the
// coordinator takes it by value. Missing fields fall back to `Default`, so a
// config file only needs to name what it changes.
//
// The timing constants and tie-break switches here are the canonical ones;
// nothing in the session logic hard-codes a duration.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use skirmish_protocol::{HeroId, TeamId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A spawn location handed to the world loader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub yaw_degrees: f32,
}

/// One team's fixed parameters for the session lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub team_id: TeamId,
    pub display_name: String,
    pub max_players: usize,
    #[serde(default)]
    pub spawn_points: Vec<Pose>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session_name: String,
    pub teams: Vec<TeamConfig>,
    /// Connected, team-assigned players needed to start or keep a draft.
    pub min_players: usize,
    pub draft_duration_secs: f64,
    /// Upper bound on the early-completion countdown once everyone is ready.
    pub completion_grace_secs: f64,
    pub result_display_secs: f64,
    pub enforce_unique_picks: bool,
    /// Among the smallest teams, prefer the one with the lowest mean rating.
    pub skill_balancing: bool,
    pub keep_parties_together: bool,
    /// Rating assumed for players who report none.
    pub default_skill_rating: f64,
    /// Last-resort hero when the catalog has never been reachable.
    pub fallback_hero: HeroId,
    /// Fixed seed for the draft PRNG; `None` seeds from the clock.
    pub rng_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_name: "skirmish".into(),
            teams: vec![
                TeamConfig {
                    team_id: TeamId(1),
                    display_name: "Dawn".into(),
                    max_players: 5,
                    spawn_points: Vec::new(),
                },
                TeamConfig {
                    team_id: TeamId(2),
                    display_name: "Dusk".into(),
                    max_players: 5,
                    spawn_points: Vec::new(),
                },
            ],
            min_players: 2,
            draft_duration_secs: 30.0,
            completion_grace_secs: 3.0,
            result_display_secs: 10.0,
            enforce_unique_picks: true,
            skill_balancing: true,
            keep_parties_together: true,
            default_skill_rating: 1000.0,
            fallback_hero: HeroId::from("default_hero"),
            rng_seed: None,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.teams.is_empty() {
            return Err(ConfigError::Invalid("at least one team is required".into()));
        }
        let mut seen = BTreeSet::new();
        for team in &self.teams {
            if !seen.insert(team.team_id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate team id {}",
                    team.team_id
                )));
            }
            if team.max_players == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} has max_players = 0",
                    team.team_id
                )));
            }
        }
        if self.min_players < 2 {
            return Err(ConfigError::Invalid("min_players must be at least 2".into()));
        }
        for (name, secs) in [
            ("draft_duration_secs", self.draft_duration_secs),
            ("completion_grace_secs", self.completion_grace_secs),
            ("result_display_secs", self.result_display_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {secs}"
                )));
            }
        }
        if self.fallback_hero.as_str().is_empty() {
            return Err(ConfigError::Invalid("fallback_hero must not be empty".into()));
        }
        Ok(())
    }

    pub fn team(&self, team_id: TeamId) -> Option<&TeamConfig> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }
}
