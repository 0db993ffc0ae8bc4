//! Authoritative unit state and spatial agent simulation.

use std::{collections::BTreeMap, time::Duration};

use squad_command_core::{
    AgentSnapshot, AgentSpec, Faction, UnitId, UnitSnapshot, UnitSpec, Vec2, Vec3,
};

/// Travel state of a unit's spatial agent.
#[derive(Clone, Debug)]
pub(crate) struct AgentState {
    spec: AgentSpec,
    destination: Option<Vec3>,
    path_pending: bool,
}

impl AgentState {
    fn new(spec: AgentSpec) -> Self {
        Self {
            spec,
            destination: None,
            path_pending: false,
        }
    }
}

/// Unit stored inside the world.
#[derive(Clone, Debug)]
pub(crate) struct UnitState {
    id: UnitId,
    position: Vec3,
    faction: Faction,
    radius: f32,
    active: bool,
    patrolling: bool,
    in_join_route: bool,
    agent: Option<AgentState>,
}

impl UnitState {
    fn from_spec(id: UnitId, spec: UnitSpec) -> Self {
        Self {
            id,
            position: spec.position,
            faction: spec.faction,
            radius: spec.radius,
            active: true,
            patrolling: spec.patrolling,
            in_join_route: false,
            agent: spec.agent.map(AgentState::new),
        }
    }

    pub(crate) fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            position: self.position,
            faction: self.faction,
            radius: self.radius,
            active: self.active,
            patrolling: self.patrolling,
            in_join_route: self.in_join_route,
            agent: self.agent.as_ref().map(|agent| AgentSnapshot {
                destination: agent.destination,
                path_pending: agent.path_pending,
                remaining_distance: agent
                    .destination
                    .map_or(0.0, |destination| planar_distance(self.position, destination)),
                stop_distance: agent.spec.stop_distance,
                speed: agent.spec.speed,
            }),
        }
    }

    /// Issues a new destination, superseding the previous one.
    ///
    /// Returns `false` when the unit has no agent.
    pub(crate) fn set_destination(&mut self, destination: Vec3) -> bool {
        match self.agent.as_mut() {
            Some(agent) => {
                agent.destination = Some(destination);
                agent.path_pending = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(agent) = self.agent.as_mut() {
            agent.destination = None;
            agent.path_pending = false;
        }
    }

    pub(crate) fn place(&mut self, position: Vec3) {
        self.position = position;
        self.stop();
    }

    pub(crate) fn set_active(&mut self, active: bool) -> bool {
        let changed = self.active != active;
        self.active = active;
        changed
    }

    pub(crate) fn set_patrolling(&mut self, patrolling: bool) {
        self.patrolling = patrolling;
    }

    pub(crate) fn set_in_join_route(&mut self, in_route: bool) {
        self.in_join_route = in_route;
    }

    /// Moves the unit toward its destination, returning the arrival position.
    fn advance(&mut self, dt: Duration) -> Option<Vec3> {
        let agent = self.agent.as_mut()?;
        agent.path_pending = false;
        let destination = agent.destination?;

        let remaining = planar_distance(self.position, destination);
        if remaining > agent.spec.stop_distance {
            let step = (agent.spec.speed * dt.as_secs_f32()).min(remaining);
            let delta = destination - self.position;
            let direction = Vec3::new(delta.x, 0.0, delta.z).normalize_or_zero();
            self.position += direction * step;
            self.position.y = destination.y;
        }

        if planar_distance(self.position, destination) <= agent.spec.stop_distance {
            agent.destination = None;
            return Some(self.position);
        }
        None
    }
}

/// Registry that stores units and manages identifier allocation.
#[derive(Debug)]
pub(crate) struct UnitRegistry {
    entries: BTreeMap<UnitId, UnitState>,
    next_unit_id: u32,
}

impl UnitRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_unit_id: 0,
        }
    }

    pub(crate) fn spawn(&mut self, spec: UnitSpec) -> UnitId {
        let id = UnitId::new(self.next_unit_id);
        self.next_unit_id = self.next_unit_id.saturating_add(1);
        let _ = self.entries.insert(id, UnitState::from_spec(id, spec));
        id
    }

    pub(crate) fn remove(&mut self, unit: UnitId) -> bool {
        self.entries.remove(&unit).is_some()
    }

    pub(crate) fn get(&self, unit: UnitId) -> Option<&UnitState> {
        self.entries.get(&unit)
    }

    pub(crate) fn get_mut(&mut self, unit: UnitId) -> Option<&mut UnitState> {
        self.entries.get_mut(&unit)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &UnitState> {
        self.entries.values()
    }

    /// Advances every agent and reports arrivals in identifier order.
    pub(crate) fn advance(&mut self, dt: Duration) -> Vec<(UnitId, Vec3)> {
        self.entries
            .values_mut()
            .filter_map(|unit| unit.advance(dt).map(|position| (unit.id, position)))
            .collect()
    }
}

/// Distance between two points projected onto the ground plane.
pub(crate) fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    Vec2::new(a.x, a.z).distance(Vec2::new(b.x, b.z))
}
