#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command mode state machine and selection gatekeeper.
//!
//! The [`CommandStateMachine`] decides which units may be selected, tracks the
//! armed order, and converts confirmed clicks into [`Intent`] values for the
//! order executor. Rejected input never fails: it produces a debounced hint
//! and leaves the state untouched.

use std::{collections::BTreeMap, time::Duration};

use squad_command_core::{
    push_unique, Command, Event, Faction, Intent, MarkerKey, PointerHit, SelectionConfig,
    UnitId, UnitSnapshot, UnitView, Vec3,
};
use tracing::{debug, trace};

/// States of the command mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandState {
    /// Command mode is off.
    Inactive,
    /// Command mode is on and waiting for a unit to be picked.
    AwaitSelection,
    /// At least one eligible unit is selected.
    UnitSelected,
    /// A move order is armed and waits for a destination.
    MoveTargeting,
    /// A join order is armed and waits for a target unit.
    AddTargeting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Hint {
    UnitMissing,
    UnitInactive,
    UnitInJoinRoute,
    UnitBusy,
    FactionNotAllowed,
    NothingSelected,
    JoinSelf,
    JoinNeedsUnit,
    JoinTargetInvalid,
    FollowSelf,
    FollowTargetInvalid,
}

impl Hint {
    const fn message(self) -> &'static str {
        match self {
            Self::UnitMissing => "That unit is no longer available",
            Self::UnitInactive => "That unit cannot take orders right now",
            Self::UnitInJoinRoute => "That unit is on its way to join a team",
            Self::UnitBusy => "That unit is still carrying out a move order",
            Self::FactionNotAllowed => "Only allied units can be commanded",
            Self::NothingSelected => "Select a unit first",
            Self::JoinSelf => "A unit cannot join itself",
            Self::JoinNeedsUnit => "Pick a unit to join",
            Self::JoinTargetInvalid => "That unit cannot be joined",
            Self::FollowSelf => "A unit cannot follow itself",
            Self::FollowTargetInvalid => "That unit cannot be followed",
        }
    }
}

/// Selection state machine driving the command mode.
#[derive(Debug)]
pub struct CommandStateMachine {
    config: SelectionConfig,
    state: CommandState,
    selection: Vec<UnitId>,
    join_source: Option<UnitId>,
    clock: Duration,
    hints_shown: BTreeMap<Hint, Duration>,
}

impl CommandStateMachine {
    /// Creates a state machine with command mode off.
    #[must_use]
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            state: CommandState::Inactive,
            selection: Vec::new(),
            join_source: None,
            clock: Duration::ZERO,
            hints_shown: BTreeMap::new(),
        }
    }

    /// Parameters the state machine was created with.
    #[must_use]
    pub const fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub const fn current_state(&self) -> CommandState {
        self.state
    }

    /// Selected units, primary first.
    #[must_use]
    pub fn current_selection(&self) -> &[UnitId] {
        &self.selection
    }

    /// First selected unit.
    #[must_use]
    pub fn primary_selected(&self) -> Option<UnitId> {
        self.selection.first().copied()
    }

    /// Reports whether a join order is armed.
    #[must_use]
    pub const fn join_armed(&self) -> bool {
        matches!(self.state, CommandState::AddTargeting)
    }

    /// Unit that will travel to the join target once one is confirmed.
    #[must_use]
    pub const fn join_source(&self) -> Option<UnitId> {
        self.join_source
    }

    /// Turns command mode on or off.
    ///
    /// Turning it off from any state drops the selection and any armed order.
    pub fn set_command_mode(&mut self, active: bool, intents: &mut Vec<Intent>) {
        match (active, self.state) {
            (true, CommandState::Inactive) => self.transition(CommandState::AwaitSelection),
            (false, CommandState::Inactive) | (true, _) => {}
            (false, _) => {
                self.join_source = None;
                self.replace_selection(Vec::new(), intents);
                self.transition(CommandState::Inactive);
            }
        }
    }

    /// Routes a pointer raycast result to the operation the current state expects.
    pub fn handle_click(
        &mut self,
        hit: PointerHit,
        additive: bool,
        units: &UnitView,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) {
        match (self.state, hit) {
            (CommandState::Inactive, _) => {}
            (CommandState::AwaitSelection | CommandState::UnitSelected, PointerHit::Unit(unit)) => {
                let _ = self.select_unit(unit, additive, units, intents, out);
            }
            (CommandState::AwaitSelection | CommandState::UnitSelected, _) => {
                self.clear_selection(intents);
            }
            (CommandState::MoveTargeting, PointerHit::Ground(point)) => {
                let _ = self.submit_move_target(point, intents, out);
            }
            (CommandState::MoveTargeting, PointerHit::Unit(unit)) => {
                let _ = self.submit_follow_target(unit, units, intents, out);
            }
            (CommandState::MoveTargeting, PointerHit::Nothing) => {
                self.clear_selection(intents);
            }
            (CommandState::AddTargeting, PointerHit::Unit(unit)) => {
                let _ = self.submit_add_target(unit, units, intents, out);
            }
            (CommandState::AddTargeting, PointerHit::Ground(_)) => {
                self.show_hint(Hint::JoinNeedsUnit, out);
            }
            (CommandState::AddTargeting, PointerHit::Nothing) => self.cancel_join(),
        }
    }

    /// Selects a unit after running the eligibility filters.
    ///
    /// With `additive` set and multi-select enabled the unit is appended to the
    /// selection; otherwise it replaces it. Returns whether the unit is now
    /// selected.
    pub fn select_unit(
        &mut self,
        unit: UnitId,
        additive: bool,
        units: &UnitView,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        if !self.accepts_selection() {
            return false;
        }
        if let Err(hint) = self.check_eligible(unit, units, false) {
            trace!(unit = unit.get(), reason = hint.message(), "selection rejected");
            self.show_hint(hint, out);
            return false;
        }

        let mut selection = if additive && self.config.multi_select {
            self.selection.clone()
        } else {
            Vec::new()
        };
        let _ = push_unique(&mut selection, unit);
        self.replace_selection(selection, intents);
        self.transition(CommandState::UnitSelected);
        true
    }

    /// Replaces the selection with every eligible unit of `candidates`.
    ///
    /// Ineligible candidates are dropped with a hint. Returns whether any
    /// unit was selected.
    pub fn set_selection(
        &mut self,
        candidates: &[UnitId],
        units: &UnitView,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        self.apply_selection(candidates, units, false, intents, out)
    }

    /// Selection request coming from UI widgets such as a team roster.
    ///
    /// Multi-unit selections skip the busy and join-route filters so a team
    /// that is already moving can be redirected at once.
    pub fn try_set_selection_from_ui(
        &mut self,
        candidates: &[UnitId],
        units: &UnitView,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        let relaxed = candidates.len() > 1;
        self.apply_selection(candidates, units, relaxed, intents, out)
    }

    fn apply_selection(
        &mut self,
        candidates: &[UnitId],
        units: &UnitView,
        relaxed: bool,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        if !self.accepts_selection() {
            return false;
        }

        let mut selection = Vec::new();
        for unit in candidates {
            match self.check_eligible(*unit, units, relaxed) {
                Ok(()) => {
                    let _ = push_unique(&mut selection, *unit);
                }
                Err(hint) => {
                    trace!(unit = unit.get(), reason = hint.message(), "selection rejected");
                    self.show_hint(hint, out);
                }
            }
        }
        if !self.config.multi_select {
            selection.truncate(1);
        }
        if selection.is_empty() {
            return false;
        }

        self.replace_selection(selection, intents);
        self.transition(CommandState::UnitSelected);
        true
    }

    /// Arms a move order for the current selection.
    pub fn arm_move_from_current_selection(&mut self, out: &mut Vec<Command>) -> bool {
        if !self.has_idle_selection() {
            self.show_hint(Hint::NothingSelected, out);
            return false;
        }
        self.transition(CommandState::MoveTargeting);
        true
    }

    /// Arms a join order with the primary selected unit as the join source.
    pub fn arm_join_from_current_selection(&mut self, out: &mut Vec<Command>) -> bool {
        if !self.has_idle_selection() {
            self.show_hint(Hint::NothingSelected, out);
            return false;
        }
        self.join_source = self.primary_selected();
        self.transition(CommandState::AddTargeting);
        true
    }

    /// Disarms a pending join order.
    pub fn cancel_join(&mut self) {
        if !self.join_armed() {
            return;
        }
        self.join_source = None;
        self.settle();
    }

    /// Drops the selection and any armed order.
    pub fn clear_selection(&mut self, intents: &mut Vec<Intent>) {
        if self.state == CommandState::Inactive {
            return;
        }
        self.join_source = None;
        self.replace_selection(Vec::new(), intents);
        self.transition(CommandState::AwaitSelection);
    }

    /// Confirms the destination of the armed move order.
    ///
    /// Emits [`Intent::MoveRequested`] and places a destination marker for
    /// every selected unit.
    pub fn submit_move_target(
        &mut self,
        point: Vec3,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        if self.state != CommandState::MoveTargeting {
            return false;
        }

        for unit in &self.selection {
            out.push(Command::PlaceMarker {
                key: MarkerKey::Unit(*unit),
                point,
            });
        }
        intents.push(Intent::MoveRequested {
            selection: self.selection.clone(),
            point,
        });
        debug!(units = self.selection.len(), x = point.x, z = point.z, "move confirmed");
        self.finish_order(intents);
        true
    }

    /// Confirms a unit to follow for the armed move order.
    pub fn submit_follow_target(
        &mut self,
        target: UnitId,
        units: &UnitView,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        if self.state != CommandState::MoveTargeting {
            return false;
        }
        if !units.is_live(target) {
            self.show_hint(Hint::FollowTargetInvalid, out);
            return false;
        }
        if self.selection.iter().all(|unit| *unit == target) {
            self.show_hint(Hint::FollowSelf, out);
            return false;
        }

        intents.push(Intent::FollowRequested {
            selection: self.selection.clone(),
            target,
        });
        debug!(units = self.selection.len(), target = target.get(), "follow confirmed");
        self.finish_order(intents);
        true
    }

    /// Confirms the join target while a join order is armed.
    ///
    /// Emits [`Intent::AddRequested`] with the join source first.
    pub fn submit_add_target(
        &mut self,
        target: UnitId,
        units: &UnitView,
        intents: &mut Vec<Intent>,
        out: &mut Vec<Command>,
    ) -> bool {
        if !self.join_armed() {
            return false;
        }
        let Some(source) = self.join_source else {
            self.cancel_join();
            return false;
        };
        if target == source {
            self.show_hint(Hint::JoinSelf, out);
            return false;
        }
        let joinable = units
            .get(target)
            .map_or(false, |snapshot| snapshot.active && snapshot.faction == Faction::Ally);
        if !joinable {
            self.show_hint(Hint::JoinTargetInvalid, out);
            return false;
        }

        let mut selection = vec![source];
        for unit in &self.selection {
            let _ = push_unique(&mut selection, *unit);
        }
        intents.push(Intent::AddRequested { selection, target });
        debug!(source = source.get(), target = target.get(), "join confirmed");

        self.join_source = None;
        self.settle();
        true
    }

    /// Asks for the selection to split off its team.
    pub fn request_split(&mut self, intents: &mut Vec<Intent>, out: &mut Vec<Command>) -> bool {
        if !self.has_idle_selection() {
            self.show_hint(Hint::NothingSelected, out);
            return false;
        }
        intents.push(Intent::SplitRequested {
            selection: self.selection.clone(),
        });
        true
    }

    /// Consumes world events: advances the hint clock and drops destroyed or
    /// deactivated units from the selection.
    pub fn handle_events(&mut self, events: &[Event], intents: &mut Vec<Intent>) {
        let mut lost = Vec::new();
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => self.clock = self.clock.saturating_add(*dt),
                Event::UnitDestroyed { unit }
                | Event::UnitActivationChanged {
                    unit,
                    active: false,
                } => lost.push(*unit),
                _ => {}
            }
        }
        if lost.is_empty() || self.state == CommandState::Inactive {
            return;
        }

        if self.join_source.map_or(false, |source| lost.contains(&source)) {
            debug!("join source lost, join disarmed");
            self.join_source = None;
            if self.join_armed() {
                self.transition(CommandState::UnitSelected);
            }
        }

        let remaining: Vec<UnitId> = self
            .selection
            .iter()
            .copied()
            .filter(|unit| !lost.contains(unit))
            .collect();
        if remaining.len() != self.selection.len() {
            self.replace_selection(remaining, intents);
        }
        if self.selection.is_empty() && self.state != CommandState::AwaitSelection {
            self.join_source = None;
            self.transition(CommandState::AwaitSelection);
        }
    }

    fn finish_order(&mut self, intents: &mut Vec<Intent>) {
        if self.config.clear_selection_on_confirm {
            self.replace_selection(Vec::new(), intents);
        }
        self.transition(CommandState::AwaitSelection);
    }

    fn settle(&mut self) {
        if self.selection.is_empty() {
            self.transition(CommandState::AwaitSelection);
        } else {
            self.transition(CommandState::UnitSelected);
        }
    }

    fn accepts_selection(&self) -> bool {
        matches!(
            self.state,
            CommandState::AwaitSelection | CommandState::UnitSelected
        )
    }

    fn has_idle_selection(&self) -> bool {
        self.accepts_selection() && !self.selection.is_empty()
    }

    fn check_eligible(&self, unit: UnitId, units: &UnitView, relaxed: bool) -> Result<(), Hint> {
        let snapshot = units.get(unit).ok_or(Hint::UnitMissing)?;
        if !snapshot.active {
            return Err(Hint::UnitInactive);
        }
        if !relaxed && snapshot.in_join_route {
            return Err(Hint::UnitInJoinRoute);
        }
        if !relaxed && !snapshot.patrolling && snapshot.is_busy(self.config.busy_buffer) {
            return Err(Hint::UnitBusy);
        }
        if !self.faction_allowed(snapshot) {
            return Err(Hint::FactionNotAllowed);
        }
        Ok(())
    }

    fn faction_allowed(&self, snapshot: &UnitSnapshot) -> bool {
        match snapshot.faction {
            Faction::Ally => true,
            Faction::Enemy => self.config.allow_enemy,
            Faction::Boss => self.config.allow_boss,
        }
    }

    fn replace_selection(&mut self, selection: Vec<UnitId>, intents: &mut Vec<Intent>) {
        if selection == self.selection {
            return;
        }
        self.selection = selection;
        intents.push(Intent::SelectionChanged {
            selection: self.selection.clone(),
        });
    }

    fn transition(&mut self, next: CommandState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "command state changed");
            self.state = next;
        }
    }

    fn show_hint(&mut self, hint: Hint, out: &mut Vec<Command>) {
        if let Some(shown_at) = self.hints_shown.get(&hint) {
            if self.clock.saturating_sub(*shown_at) < self.config.hint_debounce() {
                trace!(hint = hint.message(), "hint debounced");
                return;
            }
        }
        let _ = self.hints_shown.insert(hint, self.clock);
        out.push(Command::ShowHint {
            message: hint.message().to_owned(),
            duration: self.config.hint_duration(),
        });
    }
}
