#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Team registry and formation engine.
//!
//! The [`TeamManager`] owns every [`Team`], merges units into teams when join
//! orders complete, lays members out in ring formations around the team's
//! anchor, and keeps teams coherent as members die or go inactive. It reads
//! the world through [`UnitView`] snapshots and the [`Navigation`] capability
//! and answers with command batches.

pub mod formation;

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use squad_command_core::{
    push_unique, Command, Event, MarkerKey, Navigation, RoutineTable, TeamConfig, TeamId, UnitId,
    UnitView, Vec3,
};
use tracing::{debug, info};

/// Named group of units that move and hold formation together.
#[derive(Clone, Debug, PartialEq)]
pub struct Team {
    id: TeamId,
    members: Vec<UnitId>,
    anchor: UnitId,
    formation_radius: f32,
    move_target: Option<Vec3>,
}

impl Team {
    fn new(id: TeamId, first: UnitId, anchor: UnitId, formation_radius: f32) -> Self {
        Self {
            id,
            members: vec![first, anchor],
            anchor,
            formation_radius,
            move_target: None,
        }
    }

    /// Identifier allocated by the registry.
    #[must_use]
    pub const fn id(&self) -> TeamId {
        self.id
    }

    /// Members in join order, without duplicates.
    #[must_use]
    pub fn members(&self) -> &[UnitId] {
        &self.members
    }

    /// Member the formation is laid out around.
    #[must_use]
    pub const fn anchor(&self) -> UnitId {
        self.anchor
    }

    /// Base radius of the innermost formation ring.
    #[must_use]
    pub const fn formation_radius(&self) -> f32 {
        self.formation_radius
    }

    /// Destination of the team's last move order, until it arrives.
    #[must_use]
    pub const fn move_target(&self) -> Option<Vec3> {
        self.move_target
    }

    /// Reports whether `unit` belongs to the team.
    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        self.members.contains(&unit)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Reports whether the team has no members left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Slot assigned to a single member by a formation plan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotAssignment {
    /// Member receiving the slot.
    pub unit: UnitId,
    /// Index into [`FormationPlan::slots`].
    pub slot: usize,
    /// Slot position snapped onto the traversable surface.
    pub destination: Vec3,
}

/// Formation computed around a team's anchor.
#[derive(Clone, Debug, PartialEq)]
pub struct FormationPlan {
    /// Team the plan was computed for.
    pub team: TeamId,
    /// Member the rings are centred on.
    pub anchor: UnitId,
    /// Position of the anchor when the plan was computed.
    pub anchor_position: Vec3,
    /// Distance between neighbouring slots.
    pub spacing: f32,
    /// Radius of the innermost ring.
    pub first_ring_radius: f32,
    /// Raw ring slots before surface snapping.
    pub slots: Vec<Vec3>,
    /// Slot claimed by every non-anchor member, in identifier order.
    pub assignments: Vec<SlotAssignment>,
}

#[derive(Clone, Copy, Debug)]
struct StagedMerge {
    remaining: Duration,
}

/// Registry of every team plus the formation and maintenance routines.
#[derive(Debug)]
pub struct TeamManager {
    config: TeamConfig,
    teams: BTreeMap<TeamId, Team>,
    next_team_id: u32,
    staged_merges: RoutineTable<TeamId, StagedMerge>,
    since_maintenance: Duration,
}

impl TeamManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: TeamConfig) -> Self {
        Self {
            config,
            teams: BTreeMap::new(),
            next_team_id: 0,
            staged_merges: RoutineTable::new(),
            since_maintenance: Duration::ZERO,
        }
    }

    /// Parameters the registry was created with.
    #[must_use]
    pub const fn config(&self) -> &TeamConfig {
        &self.config
    }

    /// Team the unit currently belongs to.
    #[must_use]
    pub fn team_of(&self, unit: UnitId) -> Option<&Team> {
        self.teams.values().find(|team| team.contains(unit))
    }

    /// Looks up a team by identifier.
    #[must_use]
    pub fn team(&self, team: TeamId) -> Option<&Team> {
        self.teams.get(&team)
    }

    /// Iterator over every team in identifier order.
    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    /// Number of registered teams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    /// Reports whether no team is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Reports whether a staged merge is in flight for the team.
    #[must_use]
    pub fn staged_merge_in_flight(&self, team: TeamId) -> bool {
        self.staged_merges.contains(team)
    }

    /// Creates a team from two live, unteamed units, anchored on `b`.
    ///
    /// No formation is applied. Returns `None` when the preconditions fail.
    pub fn create_team(&mut self, a: UnitId, b: UnitId, units: &UnitView) -> Option<TeamId> {
        if a == b || !units.contains(a) || !units.contains(b) {
            return None;
        }
        if self.team_of(a).is_some() || self.team_of(b).is_some() {
            return None;
        }

        let id = TeamId::new(self.next_team_id);
        self.next_team_id = self.next_team_id.saturating_add(1);
        let _ = self.teams.insert(
            id,
            Team::new(id, a, b, self.config.default_formation_radius),
        );
        info!(team = id.get(), a = a.get(), b = b.get(), "team created");
        self.debug_assert_invariants();
        Some(id)
    }

    /// Joins `leader` with `target`, creating, extending or merging teams.
    ///
    /// Returns the team both units belong to afterwards, or `None` for a
    /// self-join or a unit that is not alive.
    pub fn join_units(
        &mut self,
        leader: UnitId,
        target: UnitId,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) -> Option<TeamId> {
        if leader == target || !units.contains(leader) || !units.contains(target) {
            return None;
        }

        let leader_team = self.team_of(leader).map(Team::id);
        let target_team = self.team_of(target).map(Team::id);

        let joined = match (leader_team, target_team) {
            (Some(ours), Some(theirs)) if ours == theirs => {
                debug!(team = ours.get(), anchor = target.get(), "join within team moves anchor");
                if let Some(team) = self.teams.get_mut(&ours) {
                    team.anchor = target;
                }
                self.apply_formation_around_anchor(ours, units, navigation, out);
                ours
            }
            (None, None) => {
                let created = self.create_team(leader, target, units)?;
                self.apply_formation_around_anchor(created, units, navigation, out);
                created
            }
            (Some(ours), None) => {
                self.add_member(ours, target);
                debug!(team = ours.get(), unit = target.get(), "target added to leader's team");
                self.apply_formation_around_anchor(ours, units, navigation, out);
                ours
            }
            (None, Some(theirs)) => {
                self.add_member(theirs, leader);
                debug!(team = theirs.get(), unit = leader.get(), "leader added to target's team");
                self.apply_formation_around_anchor(theirs, units, navigation, out);
                theirs
            }
            (Some(ours), Some(theirs)) => {
                self.merge(ours, theirs, target, out);
                self.apply_formation_after_merge(ours, units, navigation, out);
                ours
            }
        };

        self.disable_patrols(joined, units, out);
        self.debug_assert_invariants();
        Some(joined)
    }

    fn add_member(&mut self, team: TeamId, unit: UnitId) {
        if let Some(team) = self.teams.get_mut(&team) {
            let _ = push_unique(&mut team.members, unit);
        }
    }

    fn merge(&mut self, into: TeamId, from: TeamId, anchor: UnitId, out: &mut Vec<Command>) {
        let Some(absorbed) = self.teams.remove(&from) else {
            return;
        };
        let _ = self.staged_merges.cancel(from);
        out.push(Command::ClearMarker {
            key: MarkerKey::Team(from),
        });

        let multiplier = self.config.merge_radius_multiplier;
        let max_radius = self.config.max_formation_radius;
        let Some(team) = self.teams.get_mut(&into) else {
            return;
        };
        for unit in absorbed.members {
            let _ = push_unique(&mut team.members, unit);
        }
        team.anchor = anchor;
        team.formation_radius = (team.formation_radius * multiplier).min(max_radius);
        if team.move_target.take().is_some() {
            out.push(Command::ClearMarker {
                key: MarkerKey::Team(into),
            });
        }
        info!(
            team = into.get(),
            absorbed = from.get(),
            members = team.members.len(),
            radius = team.formation_radius,
            "teams merged"
        );
    }

    fn disable_patrols(&self, team: TeamId, units: &UnitView, out: &mut Vec<Command>) {
        let Some(team) = self.teams.get(&team) else {
            return;
        };
        for unit in &team.members {
            if units.get(*unit).map_or(false, |snapshot| snapshot.patrolling) {
                out.push(Command::SetPatrolling {
                    unit: *unit,
                    patrolling: false,
                });
            }
        }
    }

    /// Records the destination of a move order issued to the team.
    pub fn set_move_target(&mut self, team: TeamId, point: Vec3) -> bool {
        match self.teams.get_mut(&team) {
            Some(team) => {
                team.move_target = Some(point);
                true
            }
            None => false,
        }
    }

    /// Forgets the team's pending move target and removes its marker.
    pub fn clear_move_target(&mut self, team: TeamId, out: &mut Vec<Command>) {
        if let Some(entry) = self.teams.get_mut(&team) {
            if entry.move_target.take().is_some() {
                out.push(Command::ClearMarker {
                    key: MarkerKey::Team(team),
                });
            }
        }
    }

    /// Computes ring slots around the anchor and matches members to them.
    ///
    /// Members are visited in identifier order and each claims the nearest
    /// free slot, so repeated plans for an unchanged team are identical.
    /// Returns `None` when the team or its anchor is gone.
    #[must_use]
    pub fn plan_formation(
        &self,
        team: TeamId,
        units: &UnitView,
        navigation: &impl Navigation,
    ) -> Option<FormationPlan> {
        let team = self.teams.get(&team)?;
        let anchor = units.get(team.anchor)?;

        let mut followers: Vec<_> = team
            .members
            .iter()
            .filter(|unit| **unit != team.anchor)
            .filter_map(|unit| units.get(*unit))
            .collect();
        followers.sort_by_key(|snapshot| snapshot.id);

        let member_count = team.members.len();
        let max_radius = team
            .members
            .iter()
            .filter_map(|unit| units.get(*unit))
            .map(|snapshot| snapshot.radius)
            .fold(0.0_f32, f32::max);
        let spacing = formation::slot_spacing(&self.config, member_count, max_radius);
        let first_ring_radius = formation::first_ring_radius(
            &self.config,
            team.formation_radius,
            spacing,
            member_count,
        );
        let slots = formation::ring_slots(
            anchor.position,
            followers.len(),
            first_ring_radius,
            spacing,
            self.config.min_slots_per_ring,
        );

        let positions: Vec<Vec3> = followers.iter().map(|snapshot| snapshot.position).collect();
        let assignments: Vec<SlotAssignment> = followers
            .iter()
            .zip(formation::assign_nearest(&positions, &slots))
            .filter_map(|(snapshot, slot)| {
                let slot = slot?;
                let destination = navigation
                    .sample_traversable(slots[slot], self.config.sample_radius)
                    .unwrap_or(anchor.position);
                Some(SlotAssignment {
                    unit: snapshot.id,
                    slot,
                    destination,
                })
            })
            .collect();

        Some(FormationPlan {
            team: team.id,
            anchor: anchor.id,
            anchor_position: anchor.position,
            spacing,
            first_ring_radius,
            slots,
            assignments,
        })
    }

    /// Sends every non-anchor member to its slot in the ring formation.
    ///
    /// Members without a spatial agent are skipped.
    pub fn apply_formation_around_anchor(
        &self,
        team: TeamId,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        let Some(plan) = self.plan_formation(team, units, navigation) else {
            return;
        };
        debug!(
            team = team.get(),
            anchor = plan.anchor.get(),
            slots = plan.slots.len(),
            spacing = plan.spacing,
            "formation applied"
        );
        for assignment in &plan.assignments {
            let has_agent = units
                .get(assignment.unit)
                .map_or(false, |snapshot| snapshot.agent.is_some());
            if !has_agent {
                debug!(unit = assignment.unit.get(), "formation slot skipped, no agent");
                continue;
            }
            out.push(Command::SetDestination {
                unit: assignment.unit,
                destination: assignment.destination,
            });
        }
    }

    /// Runs the two-phase formation used after a team merge.
    ///
    /// Members are first sent to a staging ring wider than the final
    /// formation; once the staging delay elapses the regular ring formation
    /// overrides those destinations. A new staged merge for the same team
    /// replaces the one in flight.
    pub fn apply_formation_after_merge(
        &mut self,
        team: TeamId,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        let Some(entry) = self.teams.get(&team) else {
            return;
        };
        let Some(anchor) = units.get(entry.anchor) else {
            return;
        };

        let mut followers: Vec<_> = entry
            .members
            .iter()
            .filter(|unit| **unit != entry.anchor)
            .filter_map(|unit| units.get(*unit))
            .collect();
        followers.sort_by_key(|snapshot| snapshot.id);

        let member_count = entry.members.len();
        let max_radius = followers
            .iter()
            .map(|snapshot| snapshot.radius)
            .fold(anchor.radius, f32::max);
        let spacing = formation::slot_spacing(&self.config, member_count, max_radius);
        let base_radius = formation::first_ring_radius(
            &self.config,
            entry.formation_radius,
            spacing,
            member_count,
        );
        let radius = formation::staging_radius(&self.config, base_radius, spacing);
        let points = formation::staging_points(
            anchor.position,
            followers.len(),
            radius,
            formation::team_phase(team),
        );

        for (snapshot, point) in followers.iter().zip(points) {
            if snapshot.agent.is_none() {
                continue;
            }
            let destination = navigation
                .sample_traversable(point, self.config.sample_radius)
                .unwrap_or(anchor.position);
            out.push(Command::SetDestination {
                unit: snapshot.id,
                destination,
            });
        }

        let (generation, superseded) = self.staged_merges.start(
            team,
            StagedMerge {
                remaining: self.config.staged_merge_delay(),
            },
        );
        debug!(
            team = team.get(),
            generation = generation.get(),
            staging_radius = radius,
            replaced = superseded.is_some(),
            "staged merge started"
        );
    }

    /// Consumes world events, advancing staged merges and periodic maintenance.
    pub fn handle(
        &mut self,
        events: &[Event],
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        let dt = events
            .iter()
            .filter_map(|event| match event {
                Event::TimeAdvanced { dt } => Some(*dt),
                _ => None,
            })
            .fold(Duration::ZERO, |total, dt| total.saturating_add(dt));
        if dt.is_zero() {
            return;
        }

        self.advance_staged_merges(dt, units, navigation, out);

        self.since_maintenance = self.since_maintenance.saturating_add(dt);
        let interval = self.config.maintenance_interval();
        if self.since_maintenance >= interval {
            self.since_maintenance = Duration::ZERO;
            self.run_maintenance(units, navigation, out);
        }
    }

    fn advance_staged_merges(
        &mut self,
        dt: Duration,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        for team in self.staged_merges.keys() {
            let due = match self.staged_merges.get_mut(team) {
                Some(merge) => {
                    merge.remaining = merge.remaining.saturating_sub(dt);
                    merge.remaining.is_zero()
                }
                None => false,
            };
            if !due {
                continue;
            }
            let _ = self.staged_merges.cancel(team);
            debug!(team = team.get(), "staged merge settling into formation");
            self.apply_formation_around_anchor(team, units, navigation, out);
        }
    }

    /// Prunes dead or inactive members, removes empty teams, promotes a new
    /// anchor where needed and clears move targets the team has reached.
    pub fn run_maintenance(
        &mut self,
        units: &UnitView,
        navigation: &impl Navigation,
        out: &mut Vec<Command>,
    ) {
        let mut dissolved = Vec::new();
        let mut reanchored = Vec::new();
        let arrive_threshold = self.config.move_arrive_threshold;

        for team in self.teams.values_mut() {
            team.members.retain(|unit| units.is_live(*unit));

            let Some(first) = team.members.first().copied() else {
                dissolved.push(team.id);
                continue;
            };

            if !team.members.contains(&team.anchor) {
                info!(
                    team = team.id.get(),
                    previous = team.anchor.get(),
                    anchor = first.get(),
                    "anchor succession"
                );
                team.anchor = first;
                reanchored.push(team.id);
            }

            if let (Some(target), Some(anchor)) = (team.move_target, units.get(team.anchor)) {
                if anchor.position.distance(target) <= arrive_threshold {
                    team.move_target = None;
                    out.push(Command::ClearMarker {
                        key: MarkerKey::Team(team.id),
                    });
                }
            }
        }

        for team in dissolved {
            let _ = self.teams.remove(&team);
            let _ = self.staged_merges.cancel(team);
            out.push(Command::ClearMarker {
                key: MarkerKey::Team(team),
            });
            info!(team = team.get(), "team dissolved");
        }

        for team in reanchored {
            self.apply_formation_around_anchor(team, units, navigation, out);
        }

        self.debug_assert_invariants();
    }

    /// Reports whether membership is exclusive and every anchor is a member.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let mut seen = BTreeSet::new();
        for team in self.teams.values() {
            if team.members.is_empty() || !team.members.contains(&team.anchor) {
                return false;
            }
            for unit in &team.members {
                if !seen.insert(*unit) {
                    return false;
                }
            }
        }
        true
    }

    fn debug_assert_invariants(&self) {
        debug_assert!(self.invariants_hold(), "team registry invariants violated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_command_core::{Faction, UnitSnapshot};

    fn view(ids: &[u32]) -> UnitView {
        UnitView::from_snapshots(
            ids.iter()
                .map(|id| UnitSnapshot {
                    id: UnitId::new(*id),
                    position: Vec3::new(*id as f32, 0.0, 0.0),
                    faction: Faction::Ally,
                    radius: 0.5,
                    active: true,
                    patrolling: false,
                    in_join_route: false,
                    agent: None,
                })
                .collect(),
        )
    }

    #[test]
    fn create_team_anchors_on_second_unit() {
        let mut manager = TeamManager::new(TeamConfig::default());
        let units = view(&[1, 2]);
        let team = manager
            .create_team(UnitId::new(1), UnitId::new(2), &units)
            .expect("team created");

        let team = manager.team(team).expect("team registered");
        assert_eq!(team.members(), [UnitId::new(1), UnitId::new(2)]);
        assert_eq!(team.anchor(), UnitId::new(2));
    }

    #[test]
    fn create_team_rejects_self_and_teamed_units() {
        let mut manager = TeamManager::new(TeamConfig::default());
        let units = view(&[1, 2, 3]);
        assert!(manager.create_team(UnitId::new(1), UnitId::new(1), &units).is_none());
        assert!(manager.create_team(UnitId::new(1), UnitId::new(2), &units).is_some());
        assert!(manager.create_team(UnitId::new(2), UnitId::new(3), &units).is_none());
        assert!(manager.create_team(UnitId::new(3), UnitId::new(9), &units).is_none());
    }

    #[test]
    fn team_ids_are_never_reused() {
        let mut manager = TeamManager::new(TeamConfig::default());
        let units = view(&[1, 2]);
        let first = manager
            .create_team(UnitId::new(1), UnitId::new(2), &units)
            .expect("team created");

        let mut out = Vec::new();
        manager.run_maintenance(&view(&[]), &|point: Vec3, _: f32| Some(point), &mut out);
        assert!(manager.is_empty());
        assert_eq!(out, vec![Command::ClearMarker { key: MarkerKey::Team(first) }]);

        let second = manager
            .create_team(UnitId::new(1), UnitId::new(2), &units)
            .expect("team recreated");
        assert!(second > first);
    }
}
