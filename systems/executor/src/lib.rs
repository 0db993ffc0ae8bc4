#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Order translation for the squad command engine.
//!
//! The [`CommandExecutor`] turns confirmed [`Intent`] values into travel
//! commands: grid moves, follow routines refreshed on a fixed interval, and the
//! join travel routine that hands off to the [`TeamManager`] on arrival.

use std::{collections::BTreeSet, time::Duration};

use squad_command_core::{
    push_unique, Command, Event, ExecutorConfig, Intent, MarkerKey, Navigation, RoutineTable,
    TeamId, UnitId, UnitView, Vec3,
};
use squad_command_system_teams::TeamManager;
use thiserror::Error;
use tracing::{debug, info, warn};

const SPLIT_HINT: &str = "Splitting a team is not available yet";
const SPLIT_HINT_DURATION: Duration = Duration::from_secs(2);

/// Orders the executor accepts but cannot carry out.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Split orders are recognised but have no implementation.
    #[error("splitting {units} unit(s) off their team is not implemented")]
    SplitNotImplemented {
        /// Number of units the split was requested for.
        units: usize,
    },
}

#[derive(Clone, Copy, Debug)]
struct FollowRoutine {
    target: UnitId,
    offset: Vec3,
    until_refresh: Duration,
}

#[derive(Clone, Copy, Debug)]
struct JoinRoutine {
    leader: UnitId,
    target: UnitId,
    last_issued: Vec3,
}

/// Translates player orders into per-unit travel commands.
#[derive(Debug)]
pub struct CommandExecutor {
    config: ExecutorConfig,
    enabled: bool,
    follows: RoutineTable<UnitId, FollowRoutine>,
    join: Option<JoinRoutine>,
}

impl CommandExecutor {
    /// Creates an enabled executor with no routines running.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            enabled: true,
            follows: RoutineTable::new(),
            join: None,
        }
    }

    /// Parameters the executor was created with.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Reports whether the executor currently reacts to intents.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of follow routines currently running.
    #[must_use]
    pub fn follow_count(&self) -> usize {
        self.follows.len()
    }

    /// Unit the agent is following, if any.
    #[must_use]
    pub fn follow_target(&self, unit: UnitId) -> Option<UnitId> {
        self.follows.get(unit).map(|routine| routine.target)
    }

    /// Leader and target of the join travel routine in flight.
    #[must_use]
    pub fn join_in_flight(&self) -> Option<(UnitId, UnitId)> {
        self.join.map(|routine| (routine.leader, routine.target))
    }

    /// Enables or disables the executor.
    ///
    /// Disabling stops every follow routine and the join travel routine, and
    /// clears the join-route marker of the leader that was travelling.
    pub fn set_enabled(&mut self, enabled: bool, out: &mut Vec<Command>) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            let stopped = self.follows.cancel_all();
            for (agent, _) in &stopped {
                out.push(Command::StopUnit { unit: *agent });
            }
            if let Some(routine) = self.join {
                out.push(Command::StopUnit {
                    unit: routine.leader,
                });
            }
            self.end_join(out);
            info!(follows = stopped.len(), "executor disabled");
        } else {
            info!("executor enabled");
        }
    }

    /// Consumes intents and world events, advancing the running routines.
    pub fn handle(
        &mut self,
        intents: &[Intent],
        events: &[Event],
        units: &UnitView,
        navigation: &impl Navigation,
        teams: &mut TeamManager,
        out: &mut Vec<Command>,
    ) {
        if !self.enabled {
            return;
        }

        let mut dt = Duration::ZERO;
        for event in events {
            match event {
                Event::TimeAdvanced { dt: step } => dt = dt.saturating_add(*step),
                Event::UnitArrived { unit, .. } => out.push(Command::ClearMarker {
                    key: MarkerKey::Unit(*unit),
                }),
                Event::UnitDestroyed { unit } => self.forget_unit(*unit, out),
                _ => {}
            }
        }

        for intent in intents {
            match intent {
                Intent::MoveRequested { selection, point } => {
                    self.execute_move_order(selection, *point, units, navigation, teams, out);
                }
                Intent::FollowRequested { selection, target } => {
                    self.execute_follow_order(selection, *target, units, navigation, teams, out);
                }
                Intent::AddRequested { selection, target } => {
                    if let Some(leader) = selection.first() {
                        self.start_join(*leader, *target, units, navigation, teams, out);
                    }
                }
                Intent::SplitRequested { selection } => {
                    if let Err(error) = self.execute_split(selection, out) {
                        debug!(%error, "split order rejected");
                    }
                }
                Intent::SelectionChanged { .. } => {}
            }
        }

        if !dt.is_zero() {
            self.advance_follows(dt, units, navigation, out);
            self.advance_join(units, navigation, teams, out);
        }
    }

    /// Sends the selection, expanded to whole teams, towards `point`.
    ///
    /// A single agent, or any selection when formation is disabled, travels
    /// straight to `point`; otherwise each agent receives a grid offset that is
    /// snapped onto the traversable surface.
    pub fn execute_move_order(
        &mut self,
        selection: &[UnitId],
        point: Vec3,
        units: &UnitView,
        navigation: &impl Navigation,
        teams: &mut TeamManager,
        out: &mut Vec<Command>,
    ) {
        let agents = self.expand_selection(selection, units, teams);
        if agents.is_empty() {
            debug!("move order has no live agents");
            return;
        }

        self.release_agents(&agents, units, out);

        let straight = self.travels_straight(agents.len());
        let offsets = self.offsets_for(agents.len());
        let mut issued = 0_usize;
        for (agent, offset) in agents.iter().zip(offsets) {
            if !has_agent(units, *agent) {
                debug!(unit = agent.get(), "move skipped, no agent");
                continue;
            }
            let destination = if straight {
                point
            } else {
                navigation
                    .sample_traversable(point + offset, self.config.sample_radius)
                    .unwrap_or(point)
            };
            out.push(Command::SetDestination {
                unit: *agent,
                destination,
            });
            issued += 1;
        }

        for team in touched_teams(&agents, teams) {
            if teams.set_move_target(team, point) {
                out.push(Command::PlaceMarker {
                    key: MarkerKey::Team(team),
                    point,
                });
            }
        }

        debug!(agents = agents.len(), issued, x = point.x, z = point.z, "move order issued");
    }

    /// Makes the selection, expanded to whole teams, trail `target`.
    ///
    /// Each agent runs its own follow routine that re-targets the leader's
    /// current position plus a grid offset on a fixed interval. Starting a
    /// follow replaces any follow the agent was already running.
    pub fn execute_follow_order(
        &mut self,
        selection: &[UnitId],
        target: UnitId,
        units: &UnitView,
        navigation: &impl Navigation,
        teams: &mut TeamManager,
        out: &mut Vec<Command>,
    ) {
        if !units.is_live(target) {
            debug!(target = target.get(), "follow target is not live");
            return;
        }
        let mut agents = self.expand_selection(selection, units, teams);
        agents.retain(|agent| *agent != target);
        if agents.is_empty() {
            debug!(target = target.get(), "follow order has no live agents");
            return;
        }

        self.release_agents(&agents, units, out);
        for team in touched_teams(&agents, teams) {
            teams.clear_move_target(team, out);
        }

        let offsets = self.offsets_for(agents.len());
        for (agent, offset) in agents.iter().zip(offsets) {
            if !has_agent(units, *agent) {
                debug!(unit = agent.get(), "follow skipped, no agent");
                continue;
            }
            let routine = FollowRoutine {
                target,
                offset,
                until_refresh: self.config.follow_refresh_interval(),
            };
            let (generation, replaced) = self.follows.start(*agent, routine);
            if replaced.is_some() {
                debug!(
                    unit = agent.get(),
                    generation = generation.get(),
                    "follow routine replaced"
                );
            }
            self.issue_follow(*agent, routine, units, navigation, out);
        }

        debug!(
            agents = agents.len(),
            target = target.get(),
            "follow order issued"
        );
    }

    /// Rejects a split order with an explicit not-implemented signal.
    ///
    /// A hint is shown so the player is not misled into expecting a split.
    pub fn execute_split(
        &self,
        selection: &[UnitId],
        out: &mut Vec<Command>,
    ) -> Result<(), OrderError> {
        warn!(units = selection.len(), "split order is not implemented");
        out.push(Command::ShowHint {
            message: SPLIT_HINT.to_owned(),
            duration: SPLIT_HINT_DURATION,
        });
        Err(OrderError::SplitNotImplemented {
            units: selection.len(),
        })
    }

    /// Starts the join travel routine moving `leader` to `target`.
    ///
    /// Any join already in flight is abandoned first. A leader without an
    /// agent is placed at the target and joined immediately.
    pub fn start_join(
        &mut self,
        leader: UnitId,
        target: UnitId,
        units: &UnitView,
        navigation: &impl Navigation,
        teams: &mut TeamManager,
        out: &mut Vec<Command>,
    ) {
        if leader == target {
            debug!(unit = leader.get(), "join with self ignored");
            return;
        }
        let (Some(snapshot), Some(target_position)) = (units.get(leader), units.position(target))
        else {
            debug!(leader = leader.get(), target = target.get(), "join participant missing");
            return;
        };
        if !snapshot.active {
            debug!(leader = leader.get(), "join leader is inactive");
            return;
        }

        self.end_join(out);
        if self.follows.cancel(leader).is_some() {
            debug!(unit = leader.get(), "follow cancelled by join");
        }
        if let Some(team) = teams.team_of(leader).map(|team| team.id()) {
            teams.clear_move_target(team, out);
        }
        out.push(Command::SetJoinRoute {
            unit: leader,
            in_route: true,
        });

        if snapshot.agent.is_none() {
            debug!(leader = leader.get(), target = target.get(), "join leader snapped to target");
            out.push(Command::PlaceUnit {
                unit: leader,
                position: target_position,
            });
            let _ = teams.join_units(leader, target, units, navigation, out);
            out.push(Command::SetJoinRoute {
                unit: leader,
                in_route: false,
            });
            return;
        }

        out.push(Command::SetDestination {
            unit: leader,
            destination: target_position,
        });
        self.join = Some(JoinRoutine {
            leader,
            target,
            last_issued: target_position,
        });
        debug!(leader = leader.get(), target = target.get(), "join travel started");
    }

    fn advance_follows(
        &mut self,
        dt: Duration,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        let interval = self.config.follow_refresh_interval();
        for agent in self.follows.keys() {
            let Some(routine) = self.follows.get_mut(agent) else {
                continue;
            };
            if !units.contains(agent) || !units.is_live(routine.target) {
                let target = routine.target;
                let _ = self.follows.cancel(agent);
                if units.contains(agent) {
                    out.push(Command::StopUnit { unit: agent });
                }
                debug!(unit = agent.get(), target = target.get(), "follow ended");
                continue;
            }

            routine.until_refresh = routine.until_refresh.saturating_sub(dt);
            if !routine.until_refresh.is_zero() {
                continue;
            }
            routine.until_refresh = interval;
            let routine = *routine;
            self.issue_follow(agent, routine, units, navigation, out);
        }
    }

    fn issue_follow(
        &self,
        agent: UnitId,
        routine: FollowRoutine,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        let Some(anchor) = units.position(routine.target) else {
            return;
        };
        let point = anchor + routine.offset;
        let destination = navigation
            .sample_traversable(point, self.config.sample_radius)
            .unwrap_or(anchor);
        out.push(Command::SetDestination {
            unit: agent,
            destination,
        });
    }

    fn advance_join(
        &mut self,
        units: &UnitView,
        navigation: &impl Navigation,
        teams: &mut TeamManager,
        out: &mut Vec<Command>,
    ) {
        let Some(mut routine) = self.join else {
            return;
        };
        let (Some(leader), Some(target)) = (units.get(routine.leader), units.get(routine.target))
        else {
            debug!(leader = routine.leader.get(), "join participant gone");
            self.end_join(out);
            return;
        };

        let stop_distance = leader.agent.map_or(0.0, |agent| agent.stop_distance);
        let threshold = self
            .config
            .join_arrive_threshold
            .max(stop_distance + self.config.arrive_epsilon);
        if leader.position.distance(target.position) <= threshold {
            self.end_join(out);
            let team = teams.join_units(routine.leader, routine.target, units, navigation, out);
            info!(
                leader = routine.leader.get(),
                target = routine.target.get(),
                team = team.map(|team| team.get()),
                "join completed"
            );
            return;
        }

        if target.position.distance(routine.last_issued) > self.config.retarget_distance {
            routine.last_issued = target.position;
            out.push(Command::SetDestination {
                unit: routine.leader,
                destination: target.position,
            });
            self.join = Some(routine);
        }
    }

    fn end_join(&mut self, out: &mut Vec<Command>) {
        if let Some(routine) = self.join.take() {
            out.push(Command::SetJoinRoute {
                unit: routine.leader,
                in_route: false,
            });
        }
    }

    fn forget_unit(&mut self, unit: UnitId, out: &mut Vec<Command>) {
        if self.follows.cancel(unit).is_some() {
            debug!(unit = unit.get(), "follow ended, agent destroyed");
        }
        if self
            .join
            .map_or(false, |routine| routine.leader == unit || routine.target == unit)
        {
            debug!(unit = unit.get(), "join abandoned, participant destroyed");
            self.end_join(out);
        }
    }

    /// Cancels routines on the agents and stops their patrols so the manual
    /// order takes precedence.
    fn release_agents(&mut self, agents: &[UnitId], units: &UnitView, out: &mut Vec<Command>) {
        for agent in agents {
            if self.follows.cancel(*agent).is_some() {
                debug!(unit = agent.get(), "follow superseded");
            }
            if self.join.map_or(false, |routine| routine.leader == *agent) {
                debug!(unit = agent.get(), "join superseded");
                self.end_join(out);
            }
            if units.get(*agent).map_or(false, |snapshot| snapshot.patrolling) {
                out.push(Command::SetPatrolling {
                    unit: *agent,
                    patrolling: false,
                });
            }
        }
    }

    fn expand_selection(
        &self,
        selection: &[UnitId],
        units: &UnitView,
        teams: &TeamManager,
    ) -> Vec<UnitId> {
        let mut agents = Vec::new();
        for unit in selection {
            if !units.is_live(*unit) {
                continue;
            }
            let team = teams
                .team_of(*unit)
                .filter(|_| self.config.expand_to_whole_team);
            match team {
                Some(team) => {
                    for member in team.members() {
                        if units.is_live(*member) {
                            let _ = push_unique(&mut agents, *member);
                        }
                    }
                }
                None => {
                    let _ = push_unique(&mut agents, *unit);
                }
            }
        }
        if self.config.sort_by_identity {
            agents.sort();
        }
        agents
    }

    fn travels_straight(&self, count: usize) -> bool {
        count <= 1 || !self.config.use_formation
    }

    fn offsets_for(&self, count: usize) -> Vec<Vec3> {
        if self.travels_straight(count) {
            return vec![Vec3::ZERO; count];
        }
        grid_offsets(count, self.config.formation_columns, self.config.formation_spacing)
    }
}

fn has_agent(units: &UnitView, unit: UnitId) -> bool {
    units
        .get(unit)
        .map_or(false, |snapshot| snapshot.agent.is_some())
}

fn touched_teams(agents: &[UnitId], teams: &TeamManager) -> BTreeSet<TeamId> {
    agents
        .iter()
        .filter_map(|agent| teams.team_of(*agent).map(|team| team.id()))
        .collect()
}

/// Rectangular grid offsets centred on the origin, filled row by row.
fn grid_offsets(count: usize, columns: usize, spacing: f32) -> Vec<Vec3> {
    let columns = columns.clamp(1, count.max(1));
    let rows = (count + columns - 1) / columns;
    let half_width = (columns as f32 - 1.0) * 0.5;
    let half_depth = (rows as f32 - 1.0) * 0.5;
    (0..count)
        .map(|index| {
            let column = (index % columns) as f32;
            let row = (index / columns) as f32;
            Vec3::new(
                (column - half_width) * spacing,
                0.0,
                (row - half_depth) * spacing,
            )
        })
        .collect()
}
