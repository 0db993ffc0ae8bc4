#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the squad command engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the command systems. Adapters and systems submit
//! [`Command`] values describing desired mutations, the world executes those
//! commands via its `apply` entry point, and then broadcasts [`Event`] values
//! for systems to react to. The command state machine additionally emits
//! [`Intent`] values that the order executor consumes. Systems read the world
//! exclusively through immutable [`UnitView`] snapshots and the [`Navigation`]
//! capability, and respond with new command batches.

use std::time::Duration;

pub use glam::{Vec2, Vec3};

pub mod config;
pub mod routine;

pub use config::{CommandConfig, ConfigError, ExecutorConfig, SelectionConfig, TeamConfig};
pub use routine::{Generation, RoutineTable};

/// Unique identifier assigned to a unit by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a team by the team registry.
///
/// Identifiers are allocated monotonically and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamId(u32);

impl TeamId {
    /// Creates a new team identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Allegiance of a unit relative to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Faction {
    /// Units controlled by the player.
    Ally,
    /// Hostile rank-and-file units.
    Enemy,
    /// Hostile boss units.
    Boss,
}

/// Movement parameters of a unit's spatial agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentSpec {
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Distance from the destination at which the agent considers itself arrived.
    pub stop_distance: f32,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            speed: 4.0,
            stop_distance: 0.1,
        }
    }
}

/// Blueprint used by the world when spawning a unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitSpec {
    /// Initial position of the unit.
    pub position: Vec3,
    /// Allegiance of the unit.
    pub faction: Faction,
    /// Physical radius of the unit's footprint.
    pub radius: f32,
    /// Spatial agent attached to the unit, if it can travel on its own.
    pub agent: Option<AgentSpec>,
    /// Whether the unit starts out running its idle patrol behaviour.
    pub patrolling: bool,
}

impl UnitSpec {
    /// Describes an allied unit with a default agent at the provided position.
    #[must_use]
    pub fn ally(position: Vec3) -> Self {
        Self {
            position,
            faction: Faction::Ally,
            radius: 0.5,
            agent: Some(AgentSpec::default()),
            patrolling: false,
        }
    }

    /// Overrides the unit's faction.
    #[must_use]
    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.faction = faction;
        self
    }

    /// Overrides the unit's agent parameters.
    #[must_use]
    pub fn with_agent(mut self, agent: AgentSpec) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Removes the unit's spatial agent.
    #[must_use]
    pub fn without_agent(mut self) -> Self {
        self.agent = None;
        self
    }

    /// Overrides the unit's footprint radius.
    #[must_use]
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Marks the unit as running its patrol behaviour.
    #[must_use]
    pub fn patrolling(mut self) -> Self {
        self.patrolling = true;
        self
    }
}

/// Axis-aligned rectangle on the ground plane, `x` mapping to world X and `y` to world Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundRect {
    min: Vec2,
    max: Vec2,
}

impl GroundRect {
    /// Creates a rectangle from two opposite corners.
    #[must_use]
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a square centred on the origin.
    #[must_use]
    pub fn centered(half_extent: f32) -> Self {
        Self::from_corners(Vec2::splat(-half_extent), Vec2::splat(half_extent))
    }

    /// Lower corner of the rectangle.
    #[must_use]
    pub const fn min(&self) -> Vec2 {
        self.min
    }

    /// Upper corner of the rectangle.
    #[must_use]
    pub const fn max(&self) -> Vec2 {
        self.max
    }

    /// Reports whether the ground projection of `point` lies inside the rectangle.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

/// Walkable area that spatial agents can path across.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    bounds: GroundRect,
    obstacles: Vec<GroundRect>,
}

impl Surface {
    /// Creates an obstacle-free surface covering the provided bounds.
    #[must_use]
    pub fn new(bounds: GroundRect) -> Self {
        Self {
            bounds,
            obstacles: Vec::new(),
        }
    }

    /// Adds a non-walkable region to the surface.
    #[must_use]
    pub fn with_obstacle(mut self, obstacle: GroundRect) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    /// Outer bounds of the walkable area.
    #[must_use]
    pub const fn bounds(&self) -> GroundRect {
        self.bounds
    }

    /// Regions carved out of the walkable area.
    #[must_use]
    pub fn obstacles(&self) -> &[GroundRect] {
        &self.obstacles
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(GroundRect::centered(100.0))
    }
}

/// Identifies a destination marker shown to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerKey {
    /// Marker attached to a single unit's destination.
    Unit(UnitId),
    /// Marker attached to a team's pending move target.
    Team(TeamId),
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Replaces the traversable surface.
    ConfigureSurface {
        /// Walkable area used for travel and nearest-point sampling.
        surface: Surface,
    },
    /// Requests that a new unit be created.
    SpawnUnit {
        /// Blueprint describing the unit.
        spec: UnitSpec,
    },
    /// Removes a unit from the world.
    DestroyUnit {
        /// Unit being destroyed.
        unit: UnitId,
    },
    /// Toggles whether a unit is currently commandable.
    SetUnitActive {
        /// Unit whose activation flag changes.
        unit: UnitId,
        /// New activation state.
        active: bool,
    },
    /// Starts or stops a unit's idle patrol behaviour.
    SetPatrolling {
        /// Unit whose patrol behaviour changes.
        unit: UnitId,
        /// Whether the patrol should run.
        patrolling: bool,
    },
    /// Issues a travel destination to a unit's agent, superseding any prior one.
    SetDestination {
        /// Unit receiving the destination.
        unit: UnitId,
        /// Point the agent should travel to.
        destination: Vec3,
    },
    /// Stops a unit's current travel order.
    StopUnit {
        /// Unit whose order is cancelled.
        unit: UnitId,
    },
    /// Teleports a unit to the provided position, cancelling any travel.
    PlaceUnit {
        /// Unit being moved.
        unit: UnitId,
        /// New position of the unit.
        position: Vec3,
    },
    /// Sets or clears the marker flagging a unit as travelling to a join target.
    SetJoinRoute {
        /// Unit whose marker changes.
        unit: UnitId,
        /// Whether the unit is en route to a join.
        in_route: bool,
    },
    /// Shows a short-lived hint to the player.
    ShowHint {
        /// Human-readable hint text.
        message: String,
        /// How long the hint stays visible.
        duration: Duration,
    },
    /// Places or moves a destination marker.
    PlaceMarker {
        /// Owner of the marker.
        key: MarkerKey,
        /// Point the marker is displayed at.
        point: Vec3,
    },
    /// Removes a destination marker.
    ClearMarker {
        /// Owner of the marker.
        key: MarkerKey,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that a unit was created.
    UnitSpawned {
        /// Identifier assigned to the unit.
        unit: UnitId,
        /// Position the unit occupies after spawning.
        position: Vec3,
    },
    /// Confirms that a unit was removed from the world.
    UnitDestroyed {
        /// Identifier of the destroyed unit.
        unit: UnitId,
    },
    /// Reports that a unit's agent reached its destination.
    UnitArrived {
        /// Identifier of the unit that arrived.
        unit: UnitId,
        /// Position the unit stopped at.
        position: Vec3,
    },
    /// Reports a change to a unit's activation flag.
    UnitActivationChanged {
        /// Identifier of the affected unit.
        unit: UnitId,
        /// New activation state.
        active: bool,
    },
}

/// Intents emitted by the command state machine for the executor and UI layers.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    /// The current selection changed.
    SelectionChanged {
        /// Selection after the change, primary unit first.
        selection: Vec<UnitId>,
    },
    /// The player confirmed a ground destination for the selection.
    MoveRequested {
        /// Units the order applies to.
        selection: Vec<UnitId>,
        /// Confirmed destination.
        point: Vec3,
    },
    /// The player asked the selection to follow a unit.
    FollowRequested {
        /// Units the order applies to.
        selection: Vec<UnitId>,
        /// Unit to follow.
        target: UnitId,
    },
    /// The player confirmed a join target while join was armed.
    AddRequested {
        /// Units the order applies to; the first entry is the join source.
        selection: Vec<UnitId>,
        /// Unit the join source should rendezvous with.
        target: UnitId,
    },
    /// The player asked the selection to split off its team.
    SplitRequested {
        /// Units the order applies to.
        selection: Vec<UnitId>,
    },
}

/// Result of the adapter's screen-to-world raycast for a pointer click.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerHit {
    /// The click landed on a unit.
    Unit(UnitId),
    /// The click landed on the ground at the provided point.
    Ground(Vec3),
    /// The click hit nothing selectable.
    Nothing,
}

/// Read-only state of a unit's spatial agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentSnapshot {
    /// Destination currently being travelled to.
    pub destination: Option<Vec3>,
    /// Whether a path request is still being resolved.
    pub path_pending: bool,
    /// Remaining travel distance to the destination.
    pub remaining_distance: f32,
    /// Distance at which the agent considers itself arrived.
    pub stop_distance: f32,
    /// Travel speed in world units per second.
    pub speed: f32,
}

impl AgentSnapshot {
    /// Reports whether the agent currently holds a path.
    #[must_use]
    pub const fn has_path(&self) -> bool {
        self.destination.is_some()
    }

    /// Reports whether the agent is busy executing a travel order.
    ///
    /// An agent is busy while it has a pending or active path whose remaining
    /// distance exceeds `stop_distance + buffer`. A remaining distance exactly
    /// at the threshold is not busy.
    #[must_use]
    pub fn is_busy(&self, buffer: f32) -> bool {
        (self.path_pending || self.has_path())
            && self.remaining_distance > self.stop_distance + buffer
    }
}

/// Immutable representation of a single unit's state used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitSnapshot {
    /// Identifier allocated to the unit by the world.
    pub id: UnitId,
    /// Current position of the unit.
    pub position: Vec3,
    /// Allegiance of the unit.
    pub faction: Faction,
    /// Physical footprint radius.
    pub radius: f32,
    /// Whether the unit is currently commandable.
    pub active: bool,
    /// Whether the unit is running its patrol behaviour.
    pub patrolling: bool,
    /// Whether the unit is travelling to a join target.
    pub in_join_route: bool,
    /// Spatial agent state, absent when the unit cannot travel on its own.
    pub agent: Option<AgentSnapshot>,
}

impl UnitSnapshot {
    /// Reports whether the unit is busy executing a move order.
    ///
    /// Units without an agent are never busy.
    #[must_use]
    pub fn is_busy(&self, buffer: f32) -> bool {
        self.agent.map_or(false, |agent| agent.is_busy(buffer))
    }
}

/// Read-only snapshot of every live unit, ordered by identifier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitView {
    snapshots: Vec<UnitSnapshot>,
}

impl UnitView {
    /// Creates a new view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<UnitSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots.dedup_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured unit snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitSnapshot> {
        self.snapshots.iter()
    }

    /// Looks up the snapshot of a live unit.
    #[must_use]
    pub fn get(&self, unit: UnitId) -> Option<&UnitSnapshot> {
        self.snapshots
            .binary_search_by_key(&unit, |snapshot| snapshot.id)
            .ok()
            .and_then(|index| self.snapshots.get(index))
    }

    /// Reports whether the unit is alive.
    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        self.get(unit).is_some()
    }

    /// Reports whether the unit is alive and commandable.
    #[must_use]
    pub fn is_live(&self, unit: UnitId) -> bool {
        self.get(unit).map_or(false, |snapshot| snapshot.active)
    }

    /// Current position of a live unit.
    #[must_use]
    pub fn position(&self, unit: UnitId) -> Option<Vec3> {
        self.get(unit).map(|snapshot| snapshot.position)
    }

    /// Number of live units captured by the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view captured no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Capability that snaps points onto the traversable surface.
pub trait Navigation {
    /// Returns the walkable point nearest to `point`, or `None` when no walkable
    /// point lies within `max_distance`.
    fn sample_traversable(&self, point: Vec3, max_distance: f32) -> Option<Vec3>;
}

impl<F> Navigation for F
where
    F: Fn(Vec3, f32) -> Option<Vec3>,
{
    fn sample_traversable(&self, point: Vec3, max_distance: f32) -> Option<Vec3> {
        self(point, max_distance)
    }
}

/// Appends `unit` to `units` unless it is already present, preserving order.
///
/// Returns whether the unit was added.
pub fn push_unique(units: &mut Vec<UnitId>, unit: UnitId) -> bool {
    if units.contains(&unit) {
        return false;
    }
    units.push(unit);
    true
}

#[cfg(test)]
mod tests {
    use super::{push_unique, AgentSnapshot, GroundRect, UnitId, UnitSnapshot, UnitView, Vec2, Vec3};
    use crate::Faction;

    fn agent(remaining_distance: f32) -> AgentSnapshot {
        AgentSnapshot {
            destination: Some(Vec3::ZERO),
            path_pending: false,
            remaining_distance,
            stop_distance: 0.5,
            speed: 4.0,
        }
    }

    fn snapshot(id: u32) -> UnitSnapshot {
        UnitSnapshot {
            id: UnitId::new(id),
            position: Vec3::new(id as f32, 0.0, 0.0),
            faction: Faction::Ally,
            radius: 0.5,
            active: true,
            patrolling: false,
            in_join_route: false,
            agent: None,
        }
    }

    #[test]
    fn busy_boundary_is_exclusive() {
        assert!(!agent(1.0).is_busy(0.5));
        assert!(agent(2.0).is_busy(0.5));
    }

    #[test]
    fn idle_agent_is_never_busy() {
        let idle = AgentSnapshot {
            destination: None,
            path_pending: false,
            remaining_distance: 50.0,
            stop_distance: 0.5,
            speed: 4.0,
        };
        assert!(!idle.is_busy(0.5));
    }

    #[test]
    fn pending_path_counts_as_busy() {
        let pending = AgentSnapshot {
            destination: None,
            path_pending: true,
            remaining_distance: 10.0,
            stop_distance: 0.5,
            speed: 4.0,
        };
        assert!(pending.is_busy(0.5));
    }

    #[test]
    fn unit_view_orders_and_finds_snapshots() {
        let view = UnitView::from_snapshots(vec![snapshot(3), snapshot(1), snapshot(2)]);
        let ids: Vec<u32> = view.iter().map(|unit| unit.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(view.position(UnitId::new(2)), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert!(view.get(UnitId::new(9)).is_none());
    }

    #[test]
    fn push_unique_rejects_duplicates() {
        let mut units = vec![UnitId::new(1)];
        assert!(!push_unique(&mut units, UnitId::new(1)));
        assert!(push_unique(&mut units, UnitId::new(2)));
        assert_eq!(units, vec![UnitId::new(1), UnitId::new(2)]);
    }

    #[test]
    fn ground_rect_normalises_corners() {
        let rect = GroundRect::from_corners(Vec2::new(4.0, -1.0), Vec2::new(-2.0, 3.0));
        assert_eq!(rect.min(), Vec2::new(-2.0, -1.0));
        assert_eq!(rect.max(), Vec2::new(4.0, 3.0));
        assert!(rect.contains(Vec2::new(0.0, 0.0)));
        assert!(!rect.contains(Vec2::new(5.0, 0.0)));
    }
}
