#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Single owning context for command mode.
//!
//! A [`Session`] constructs the world, the team registry, the order executor
//! and the command state machine once, and threads them through each other
//! by reference. Player input is routed to the state machine, resulting
//! intents reach the executor in the same call, and [`Session::tick`] runs
//! the per-frame pipeline.

use std::time::Duration;

use squad_command_core::{
    Command, CommandConfig, Event, Intent, PointerHit, Surface, TeamId, UnitId, UnitSpec,
    UnitView, Vec3,
};
use squad_command_system_command_state::{CommandState, CommandStateMachine};
use squad_command_system_executor::CommandExecutor;
use squad_command_system_teams::TeamManager;
use squad_command_world::{self as world, query, World};
use tracing::{debug, trace};

/// Owns the world and every command system.
#[derive(Debug)]
pub struct Session {
    world: World,
    teams: TeamManager,
    executor: CommandExecutor,
    state: CommandStateMachine,
    pending_events: Vec<Event>,
    intent_log: Vec<Intent>,
}

impl Session {
    /// Creates a session over the default traversable surface.
    #[must_use]
    pub fn new(config: CommandConfig) -> Self {
        Self::with_surface(config, Surface::default())
    }

    /// Creates a session over the provided traversable surface.
    #[must_use]
    pub fn with_surface(config: CommandConfig, surface: Surface) -> Self {
        let CommandConfig {
            teams,
            executor,
            selection,
        } = config;
        Self {
            world: World::with_surface(surface),
            teams: TeamManager::new(teams),
            executor: CommandExecutor::new(executor),
            state: CommandStateMachine::new(selection),
            pending_events: Vec::new(),
            intent_log: Vec::new(),
        }
    }

    /// Authoritative world state.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Team registry.
    #[must_use]
    pub const fn teams(&self) -> &TeamManager {
        &self.teams
    }

    /// Order executor.
    #[must_use]
    pub const fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Command state machine.
    #[must_use]
    pub const fn state_machine(&self) -> &CommandStateMachine {
        &self.state
    }

    /// Current command state.
    #[must_use]
    pub const fn command_state(&self) -> CommandState {
        self.state.current_state()
    }

    /// Snapshot of every unit.
    #[must_use]
    pub fn units(&self) -> UnitView {
        query::unit_view(&self.world)
    }

    /// Drains every intent emitted since the last call, oldest first.
    pub fn take_intents(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.intent_log)
    }

    /// Spawns a unit, returning the identifier the world assigned.
    pub fn spawn_unit(&mut self, spec: UnitSpec) -> Option<UnitId> {
        let mut events = Vec::new();
        world::apply(&mut self.world, Command::SpawnUnit { spec }, &mut events);
        let unit = events.iter().find_map(|event| match event {
            Event::UnitSpawned { unit, .. } => Some(*unit),
            _ => None,
        });
        self.pending_events.extend(events);
        unit
    }

    /// Removes a unit from the world and lets every system react.
    pub fn destroy_unit(&mut self, unit: UnitId) {
        self.apply_all(vec![Command::DestroyUnit { unit }]);
        self.step(Vec::new());
    }

    /// Changes whether a unit can take orders and lets every system react.
    pub fn set_unit_active(&mut self, unit: UnitId, active: bool) {
        self.apply_all(vec![Command::SetUnitActive { unit, active }]);
        self.step(Vec::new());
    }

    /// Issues a raw world command, for collaborators outside command mode.
    pub fn apply_command(&mut self, command: Command) {
        self.apply_all(vec![command]);
    }

    /// Joins two units directly through the team registry.
    pub fn join_units(&mut self, leader: UnitId, target: UnitId) -> Option<TeamId> {
        let units = query::unit_view(&self.world);
        let navigation = query::navigation(&self.world);
        let mut commands = Vec::new();
        let team = self
            .teams
            .join_units(leader, target, &units, &navigation, &mut commands);
        self.apply_all(commands);
        team
    }

    /// Turns command mode on or off.
    pub fn set_command_mode(&mut self, active: bool) {
        let mut intents = Vec::new();
        self.state.set_command_mode(active, &mut intents);
        self.step(intents);
    }

    /// Routes a pointer raycast result through the state machine.
    pub fn click(&mut self, hit: PointerHit, additive: bool) {
        let units = query::unit_view(&self.world);
        let mut intents = Vec::new();
        let mut commands = Vec::new();
        self.state
            .handle_click(hit, additive, &units, &mut intents, &mut commands);
        self.apply_all(commands);
        self.step(intents);
    }

    /// Selection request coming from a UI widget.
    pub fn select_from_ui(&mut self, candidates: &[UnitId]) -> bool {
        let units = query::unit_view(&self.world);
        let mut intents = Vec::new();
        let mut commands = Vec::new();
        let selected =
            self.state
                .try_set_selection_from_ui(candidates, &units, &mut intents, &mut commands);
        self.apply_all(commands);
        self.step(intents);
        selected
    }

    /// Arms a move order for the current selection.
    pub fn arm_move(&mut self) -> bool {
        let mut commands = Vec::new();
        let armed = self.state.arm_move_from_current_selection(&mut commands);
        self.apply_all(commands);
        armed
    }

    /// Arms a join order for the primary selected unit.
    pub fn arm_join(&mut self) -> bool {
        let mut commands = Vec::new();
        let armed = self.state.arm_join_from_current_selection(&mut commands);
        self.apply_all(commands);
        armed
    }

    /// Disarms a pending join order.
    pub fn cancel_join(&mut self) {
        self.state.cancel_join();
    }

    /// Drops the selection and any armed order.
    pub fn clear_selection(&mut self) {
        let mut intents = Vec::new();
        self.state.clear_selection(&mut intents);
        self.step(intents);
    }

    /// Confirms a ground destination for the armed move order.
    pub fn submit_move_target(&mut self, point: Vec3) -> bool {
        let mut intents = Vec::new();
        let mut commands = Vec::new();
        let submitted = self
            .state
            .submit_move_target(point, &mut intents, &mut commands);
        self.apply_all(commands);
        self.step(intents);
        submitted
    }

    /// Asks for the selection to split off its team.
    pub fn request_split(&mut self) -> bool {
        let mut intents = Vec::new();
        let mut commands = Vec::new();
        let requested = self.state.request_split(&mut intents, &mut commands);
        self.apply_all(commands);
        self.step(intents);
        requested
    }

    /// Enables or disables the order executor.
    pub fn set_executor_enabled(&mut self, enabled: bool) {
        if self.executor.is_enabled() == enabled {
            return;
        }
        let mut commands = Vec::new();
        self.executor.set_enabled(enabled, &mut commands);
        self.apply_all(commands);
    }

    /// Advances the simulation by `dt` and runs every system once.
    pub fn tick(&mut self, dt: Duration) {
        self.apply_all(vec![Command::Tick { dt }]);
        self.step(Vec::new());
        trace!(tick = query::tick_index(&self.world), "session ticked");
    }

    fn step(&mut self, mut intents: Vec<Intent>) {
        let events = std::mem::take(&mut self.pending_events);
        self.state.handle_events(&events, &mut intents);

        let units = query::unit_view(&self.world);
        let navigation = query::navigation(&self.world);
        let mut commands = Vec::new();
        self.teams
            .handle(&events, &units, &navigation, &mut commands);
        self.executor.handle(
            &intents,
            &events,
            &units,
            &navigation,
            &mut self.teams,
            &mut commands,
        );
        if !intents.is_empty() {
            debug!(intents = intents.len(), commands = commands.len(), "intents dispatched");
        }

        self.intent_log.extend(intents);
        self.apply_all(commands);
    }

    fn apply_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            world::apply(&mut self.world, command, &mut self.pending_events);
        }
    }
}
