#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the squad command engine.
//!
//! The world stands in for every collaborator the command core treats as
//! external: the unit roster and its activation flags, patrol behaviour,
//! join-route markers, spatial agents travelling across the traversable
//! surface, destination markers and the hint channel. It is mutated only
//! through [`apply`] and read only through the [`query`] module.

mod navigation;
mod presentation;
mod units;

use std::time::Duration;

use squad_command_core::{Command, Event, MarkerKey, Surface};

pub use presentation::Hint;

use self::{presentation::Presentation, units::UnitRegistry};

/// Represents the authoritative world state.
#[derive(Debug)]
pub struct World {
    surface: Surface,
    units: UnitRegistry,
    presentation: Presentation,
    tick_index: u64,
    elapsed: Duration,
}

impl World {
    /// Creates an empty world with the default traversable surface.
    #[must_use]
    pub fn new() -> Self {
        Self::with_surface(Surface::default())
    }

    /// Creates an empty world covering the provided surface.
    #[must_use]
    pub fn with_surface(surface: Surface) -> Self {
        Self {
            surface,
            units: UnitRegistry::new(),
            presentation: Presentation::default(),
            tick_index: 0,
            elapsed: Duration::ZERO,
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
///
/// Commands that reference unknown units are ignored.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => {
            world.tick_index = world.tick_index.saturating_add(1);
            world.elapsed = world.elapsed.saturating_add(dt);
            out_events.push(Event::TimeAdvanced { dt });

            for (unit, position) in world.units.advance(dt) {
                out_events.push(Event::UnitArrived { unit, position });
            }
            world.presentation.expire(dt);
        }
        Command::ConfigureSurface { surface } => {
            world.surface = surface;
        }
        Command::SpawnUnit { spec } => {
            let unit = world.units.spawn(spec);
            out_events.push(Event::UnitSpawned {
                unit,
                position: spec.position,
            });
        }
        Command::DestroyUnit { unit } => {
            if world.units.remove(unit) {
                world.presentation.forget_unit(unit);
                out_events.push(Event::UnitDestroyed { unit });
            }
        }
        Command::SetUnitActive { unit, active } => {
            if let Some(state) = world.units.get_mut(unit) {
                if state.set_active(active) {
                    out_events.push(Event::UnitActivationChanged { unit, active });
                }
            }
        }
        Command::SetPatrolling { unit, patrolling } => {
            if let Some(state) = world.units.get_mut(unit) {
                state.set_patrolling(patrolling);
            }
        }
        Command::SetDestination { unit, destination } => {
            if let Some(state) = world.units.get_mut(unit) {
                let _ = state.set_destination(destination);
            }
        }
        Command::StopUnit { unit } => {
            if let Some(state) = world.units.get_mut(unit) {
                state.stop();
            }
        }
        Command::PlaceUnit { unit, position } => {
            if let Some(state) = world.units.get_mut(unit) {
                state.place(position);
            }
        }
        Command::SetJoinRoute { unit, in_route } => {
            if let Some(state) = world.units.get_mut(unit) {
                state.set_in_join_route(in_route);
            }
        }
        Command::ShowHint { message, duration } => {
            world.presentation.show_hint(message, duration);
        }
        Command::PlaceMarker { key, point } => {
            if marker_owner_exists(world, key) {
                world.presentation.place_marker(key, point);
            }
        }
        Command::ClearMarker { key } => {
            world.presentation.clear_marker(key);
        }
    }
}

fn marker_owner_exists(world: &World, key: MarkerKey) -> bool {
    match key {
        MarkerKey::Unit(unit) => world.units.get(unit).is_some(),
        MarkerKey::Team(_) => true,
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::{collections::BTreeMap, time::Duration};

    use squad_command_core::{
        MarkerKey, Navigation, Surface, UnitId, UnitSnapshot, UnitView, Vec2, Vec3,
    };

    use super::{navigation, Hint, World};

    /// Captures a read-only view of every unit in the world.
    #[must_use]
    pub fn unit_view(world: &World) -> UnitView {
        UnitView::from_snapshots(world.units.iter().map(|unit| unit.snapshot()).collect())
    }

    /// Captures the state of a single unit.
    #[must_use]
    pub fn unit(world: &World, unit: UnitId) -> Option<UnitSnapshot> {
        world.units.get(unit).map(|state| state.snapshot())
    }

    /// Exposes nearest-point sampling over the traversable surface.
    #[must_use]
    pub fn navigation(world: &World) -> NavigationView<'_> {
        NavigationView {
            surface: &world.surface,
        }
    }

    /// Provides read-only access to the traversable surface.
    #[must_use]
    pub fn surface(world: &World) -> &Surface {
        &world.surface
    }

    /// Destination markers currently displayed, keyed by owner.
    #[must_use]
    pub fn markers(world: &World) -> &BTreeMap<MarkerKey, Vec3> {
        world.presentation.markers()
    }

    /// Position of a single destination marker.
    #[must_use]
    pub fn marker(world: &World, key: MarkerKey) -> Option<Vec3> {
        world.presentation.markers().get(&key).copied()
    }

    /// Hints currently visible to the player.
    #[must_use]
    pub fn hints(world: &World) -> &[Hint] {
        world.presentation.hints()
    }

    /// Every hint message shown since the world was created, oldest first.
    #[must_use]
    pub fn hint_history(world: &World) -> &[String] {
        world.presentation.history()
    }

    /// Number of ticks processed so far.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Simulated time elapsed so far.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.elapsed
    }

    /// Read-only view over the traversable surface.
    #[derive(Clone, Copy, Debug)]
    pub struct NavigationView<'a> {
        surface: &'a Surface,
    }

    impl NavigationView<'_> {
        /// Reports whether the ground projection of `point` is walkable.
        #[must_use]
        pub fn is_walkable(&self, point: Vec3) -> bool {
            navigation::is_walkable(self.surface, Vec2::new(point.x, point.z))
        }
    }

    impl Navigation for NavigationView<'_> {
        fn sample_traversable(&self, point: Vec3, max_distance: f32) -> Option<Vec3> {
            navigation::sample_nearest(self.surface, point, max_distance)
        }
    }
}
