//! Tunables for the team registry, the order executor and the command state machine.
//!
//! Configuration is read from a TOML document. Every section and field is
//! optional and falls back to the defaults below.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// Root configuration for command mode.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Team registry and formation parameters.
    pub teams: TeamConfig,
    /// Order translation parameters.
    pub executor: ExecutorConfig,
    /// Selection and state machine parameters.
    pub selection: SelectionConfig,
}

impl CommandConfig {
    /// Parses and validates a configuration document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the configuration stored at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Rejects values that would make spacing, timing or grid layout degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let teams = &self.teams;
        positive("teams.default_formation_radius", teams.default_formation_radius)?;
        positive("teams.min_spacing", teams.min_spacing)?;
        positive("teams.sample_radius", teams.sample_radius)?;
        positive("teams.max_formation_radius", teams.max_formation_radius)?;
        interval("teams.staged_merge_delay_seconds", teams.staged_merge_delay_seconds)?;
        interval("teams.maintenance_interval_seconds", teams.maintenance_interval_seconds)?;
        non_negative("teams.base_spacing", teams.base_spacing)?;
        non_negative("teams.spacing_growth", teams.spacing_growth)?;
        non_negative("teams.radius_buffer", teams.radius_buffer)?;
        non_negative("teams.ring_scale_growth", teams.ring_scale_growth)?;
        non_negative("teams.min_staging_radius", teams.min_staging_radius)?;
        non_negative("teams.move_arrive_threshold", teams.move_arrive_threshold)?;
        if teams.merge_radius_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "teams.merge_radius_multiplier",
                "must be at least 1.0",
            ));
        }
        if teams.min_slots_per_ring == 0 {
            return Err(ConfigError::invalid(
                "teams.min_slots_per_ring",
                "must be at least 1",
            ));
        }

        let executor = &self.executor;
        if executor.formation_columns == 0 {
            return Err(ConfigError::invalid(
                "executor.formation_columns",
                "must be at least 1",
            ));
        }
        positive("executor.formation_spacing", executor.formation_spacing)?;
        positive("executor.sample_radius", executor.sample_radius)?;
        interval("executor.follow_refresh_seconds", executor.follow_refresh_seconds)?;
        positive("executor.join_arrive_threshold", executor.join_arrive_threshold)?;
        non_negative("executor.arrive_epsilon", executor.arrive_epsilon)?;
        non_negative("executor.retarget_distance", executor.retarget_distance)?;

        let selection = &self.selection;
        non_negative("selection.busy_buffer", selection.busy_buffer)?;
        interval("selection.hint_seconds", selection.hint_seconds)?;
        non_negative("selection.hint_debounce_seconds", selection.hint_debounce_seconds)?;
        representable("selection.hint_debounce_seconds", selection.hint_debounce_seconds)?;
        Ok(())
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be a positive number"))
    }
}

fn interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    positive(field, value)?;
    representable(field, value)
}

fn representable(field: &'static str, value: f32) -> Result<(), ConfigError> {
    Duration::try_from_secs_f32(value)
        .map(|_| ())
        .map_err(|_| ConfigError::invalid(field, "is too large for a duration"))
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must not be negative"))
    }
}

/// Team registry and formation parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    /// Formation radius assigned to newly created teams.
    pub default_formation_radius: f32,
    /// Lower bound for slot spacing.
    pub min_spacing: f32,
    /// Spacing before the member-count growth term is added.
    pub base_spacing: f32,
    /// Spacing added per square root of the member count.
    pub spacing_growth: f32,
    /// Clearance added on top of a member's diameter when widening spacing.
    pub radius_buffer: f32,
    /// Growth of the first ring's radius per square root of the member count.
    pub ring_scale_growth: f32,
    /// Minimum number of slots generated on every ring.
    pub min_slots_per_ring: usize,
    /// Search radius used when snapping slots onto the traversable surface.
    pub sample_radius: f32,
    /// Factor applied to the formation radius when two teams merge.
    pub merge_radius_multiplier: f32,
    /// Upper bound for the formation radius after merges.
    pub max_formation_radius: f32,
    /// Lower bound for the staging ring radius during a staged merge.
    pub min_staging_radius: f32,
    /// Factor applied to the base radius when computing the staging ring.
    pub staging_multiplier: f32,
    /// Spacing multiples added to the base radius when computing the staging ring.
    pub staging_spacing_factor: f32,
    /// Delay between the staging and final phases of a staged merge.
    pub staged_merge_delay_seconds: f32,
    /// Interval between maintenance passes.
    pub maintenance_interval_seconds: f32,
    /// Anchor distance from a team's move target at which the target is cleared.
    pub move_arrive_threshold: f32,
}

impl TeamConfig {
    /// Delay between the staging and final phases of a staged merge.
    #[must_use]
    pub fn staged_merge_delay(&self) -> Duration {
        seconds(self.staged_merge_delay_seconds)
    }

    /// Interval between maintenance passes.
    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        seconds(self.maintenance_interval_seconds)
    }
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            default_formation_radius: 2.0,
            min_spacing: 1.5,
            base_spacing: 1.25,
            spacing_growth: 0.35,
            radius_buffer: 0.35,
            ring_scale_growth: 0.1,
            min_slots_per_ring: 6,
            sample_radius: 2.0,
            merge_radius_multiplier: 1.25,
            max_formation_radius: 8.0,
            min_staging_radius: 3.0,
            staging_multiplier: 1.6,
            staging_spacing_factor: 1.0,
            staged_merge_delay_seconds: 0.6,
            maintenance_interval_seconds: 0.5,
            move_arrive_threshold: 1.0,
        }
    }
}

/// Order translation parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Whether selecting one team member pulls the whole team into an order.
    pub expand_to_whole_team: bool,
    /// Whether multi-unit orders spread agents over a grid formation.
    pub use_formation: bool,
    /// Whether agents are ordered by identifier before slots are assigned.
    pub sort_by_identity: bool,
    /// Number of columns in the grid formation.
    pub formation_columns: usize,
    /// Distance between neighbouring grid slots.
    pub formation_spacing: f32,
    /// Search radius used when snapping grid slots onto the traversable surface.
    pub sample_radius: f32,
    /// Interval between follow destination refreshes.
    pub follow_refresh_seconds: f32,
    /// Distance at which a join leader counts as arrived.
    pub join_arrive_threshold: f32,
    /// Slack added to the agent's stop distance for join arrival.
    pub arrive_epsilon: f32,
    /// Target displacement that causes the join leader to be re-routed.
    pub retarget_distance: f32,
}

impl ExecutorConfig {
    /// Interval between follow destination refreshes.
    #[must_use]
    pub fn follow_refresh_interval(&self) -> Duration {
        seconds(self.follow_refresh_seconds)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            expand_to_whole_team: true,
            use_formation: true,
            sort_by_identity: true,
            formation_columns: 4,
            formation_spacing: 2.0,
            sample_radius: 2.0,
            follow_refresh_seconds: 0.25,
            join_arrive_threshold: 1.5,
            arrive_epsilon: 0.1,
            retarget_distance: 0.25,
        }
    }
}

/// Selection and state machine parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Whether additive clicks extend the selection instead of replacing it.
    pub multi_select: bool,
    /// Whether confirming a destination clears the selection.
    pub clear_selection_on_confirm: bool,
    /// Whether enemy units may be selected.
    pub allow_enemy: bool,
    /// Whether boss units may be selected.
    pub allow_boss: bool,
    /// Slack added to the stop distance in the busy check.
    pub busy_buffer: f32,
    /// How long hints stay visible.
    pub hint_seconds: f32,
    /// Window in which an identical hint is not repeated.
    pub hint_debounce_seconds: f32,
}

impl SelectionConfig {
    /// How long hints stay visible.
    #[must_use]
    pub fn hint_duration(&self) -> Duration {
        seconds(self.hint_seconds)
    }

    /// Window in which an identical hint is not repeated.
    #[must_use]
    pub fn hint_debounce(&self) -> Duration {
        seconds(self.hint_debounce_seconds)
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            multi_select: true,
            clear_selection_on_confirm: false,
            allow_enemy: false,
            allow_boss: false,
            busy_buffer: 0.5,
            hint_seconds: 2.0,
            hint_debounce_seconds: 0.75,
        }
    }
}

fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read command config from {path:?}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The configuration document is not valid TOML for the expected schema.
    #[error("failed to parse command config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field holds a value outside its permitted range.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Description of the constraint that failed.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}
