use std::time::Duration;

use squad_command_core::{
    Command, Event, Faction, Intent, MarkerKey, PointerHit, SelectionConfig, UnitId, UnitSpec,
    Vec3,
};
use squad_command_system_command_state::{CommandState, CommandStateMachine};
use squad_command_world::{self as world, query, World};

struct Harness {
    world: World,
    machine: CommandStateMachine,
    intents: Vec<Intent>,
    commands: Vec<Command>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SelectionConfig::default())
    }

    fn with_config(config: SelectionConfig) -> Self {
        let mut harness = Self {
            world: World::new(),
            machine: CommandStateMachine::new(config),
            intents: Vec::new(),
            commands: Vec::new(),
        };
        harness.machine.set_command_mode(true, &mut harness.intents);
        harness
    }

    fn spawn(&mut self, spec: UnitSpec) -> UnitId {
        let mut events = Vec::new();
        world::apply(&mut self.world, Command::SpawnUnit { spec }, &mut events);
        match events.as_slice() {
            [Event::UnitSpawned { unit, .. }] => *unit,
            other => panic!("unexpected spawn events: {other:?}"),
        }
    }

    fn spawn_at(&mut self, x: f32, z: f32) -> UnitId {
        self.spawn(UnitSpec::ally(Vec3::new(x, 0.0, z)))
    }

    fn apply(&mut self, command: Command) -> Vec<Event> {
        let mut events = Vec::new();
        world::apply(&mut self.world, command, &mut events);
        events
    }

    fn click(&mut self, hit: PointerHit) {
        self.click_with(hit, false);
    }

    fn click_with(&mut self, hit: PointerHit, additive: bool) {
        let units = query::unit_view(&self.world);
        self.machine
            .handle_click(hit, additive, &units, &mut self.intents, &mut self.commands);
    }

    fn select_from_ui(&mut self, candidates: &[UnitId]) -> bool {
        let units = query::unit_view(&self.world);
        self.machine.try_set_selection_from_ui(
            candidates,
            &units,
            &mut self.intents,
            &mut self.commands,
        )
    }

    fn set_selection(&mut self, candidates: &[UnitId]) -> bool {
        let units = query::unit_view(&self.world);
        self.machine
            .set_selection(candidates, &units, &mut self.intents, &mut self.commands)
    }

    fn hints(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::ShowHint { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    fn take_intents(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.intents)
    }
}

#[test]
fn clicking_an_ally_selects_it() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);

    harness.click(PointerHit::Unit(unit));

    assert_eq!(harness.machine.current_state(), CommandState::UnitSelected);
    assert_eq!(harness.machine.primary_selected(), Some(unit));
    assert_eq!(
        harness.take_intents(),
        vec![Intent::SelectionChanged {
            selection: vec![unit]
        }]
    );
}

#[test]
fn clicks_are_ignored_while_command_mode_is_off() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    harness.machine.set_command_mode(false, &mut harness.intents);

    harness.click(PointerHit::Unit(unit));

    assert_eq!(harness.machine.current_state(), CommandState::Inactive);
    assert!(harness.machine.current_selection().is_empty());
}

#[test]
fn inactive_units_are_rejected_with_a_hint() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    let _ = harness.apply(Command::SetUnitActive {
        unit,
        active: false,
    });

    harness.click(PointerHit::Unit(unit));

    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
    assert_eq!(harness.hints().len(), 1);
}

#[test]
fn units_en_route_to_a_join_are_rejected() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    let _ = harness.apply(Command::SetJoinRoute {
        unit,
        in_route: true,
    });

    harness.click(PointerHit::Unit(unit));

    assert!(harness.machine.current_selection().is_empty());
    assert_eq!(harness.hints().len(), 1);
}

#[test]
fn busy_units_are_rejected_unless_patrolling() {
    let mut harness = Harness::new();
    let busy = harness.spawn_at(0.0, 0.0);
    let patroller = harness.spawn(UnitSpec::ally(Vec3::new(0.0, 0.0, 3.0)).patrolling());
    for unit in [busy, patroller] {
        let _ = harness.apply(Command::SetDestination {
            unit,
            destination: Vec3::new(30.0, 0.0, 0.0),
        });
    }

    harness.click(PointerHit::Unit(busy));
    assert!(harness.machine.current_selection().is_empty());

    harness.click(PointerHit::Unit(patroller));
    assert_eq!(harness.machine.current_selection(), [patroller]);
}

#[test]
fn repeated_rejections_are_debounced() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    let _ = harness.apply(Command::SetUnitActive {
        unit,
        active: false,
    });

    harness.click(PointerHit::Unit(unit));
    harness.click(PointerHit::Unit(unit));
    assert_eq!(harness.hints().len(), 1);

    harness.machine.handle_events(
        &[Event::TimeAdvanced {
            dt: Duration::from_secs(1),
        }],
        &mut harness.intents,
    );
    harness.click(PointerHit::Unit(unit));
    assert_eq!(harness.hints().len(), 2);
}

#[test]
fn hostile_units_need_explicit_permission() {
    let mut harness = Harness::new();
    let enemy = harness.spawn(UnitSpec::ally(Vec3::ZERO).with_faction(Faction::Enemy));
    harness.click(PointerHit::Unit(enemy));
    assert!(harness.machine.current_selection().is_empty());

    let mut config = SelectionConfig::default();
    config.allow_enemy = true;
    let mut permissive = Harness::with_config(config);
    let enemy = permissive.spawn(UnitSpec::ally(Vec3::ZERO).with_faction(Faction::Enemy));
    let boss = permissive.spawn(UnitSpec::ally(Vec3::ONE).with_faction(Faction::Boss));
    permissive.click(PointerHit::Unit(enemy));
    assert_eq!(permissive.machine.current_selection(), [enemy]);
    permissive.click(PointerHit::Unit(boss));
    assert_eq!(permissive.machine.current_selection(), [enemy]);
}

#[test]
fn additive_clicks_extend_the_selection() {
    let mut harness = Harness::new();
    let a = harness.spawn_at(0.0, 0.0);
    let b = harness.spawn_at(2.0, 0.0);
    let c = harness.spawn_at(4.0, 0.0);

    harness.click(PointerHit::Unit(a));
    harness.click_with(PointerHit::Unit(b), true);
    assert_eq!(harness.machine.current_selection(), [a, b]);

    harness.click(PointerHit::Unit(c));
    assert_eq!(harness.machine.current_selection(), [c]);
}

#[test]
fn single_select_mode_replaces_the_selection() {
    let mut config = SelectionConfig::default();
    config.multi_select = false;
    let mut harness = Harness::with_config(config);
    let a = harness.spawn_at(0.0, 0.0);
    let b = harness.spawn_at(2.0, 0.0);

    harness.click(PointerHit::Unit(a));
    harness.click_with(PointerHit::Unit(b), true);
    assert_eq!(harness.machine.current_selection(), [b]);
}

#[test]
fn ui_team_selection_bypasses_busy_checks() {
    let mut harness = Harness::new();
    let a = harness.spawn_at(0.0, 0.0);
    let b = harness.spawn_at(2.0, 0.0);
    let _ = harness.apply(Command::SetDestination {
        unit: a,
        destination: Vec3::new(30.0, 0.0, 0.0),
    });
    let _ = harness.apply(Command::SetJoinRoute {
        unit: b,
        in_route: true,
    });

    assert!(!harness.select_from_ui(&[a]));
    assert!(harness.select_from_ui(&[a, b]));
    assert_eq!(harness.machine.current_selection(), [a, b]);
    assert_eq!(harness.machine.current_state(), CommandState::UnitSelected);
}

#[test]
fn direct_selection_keeps_every_filter() {
    let mut harness = Harness::new();
    let busy = harness.spawn_at(0.0, 0.0);
    let routed = harness.spawn_at(2.0, 0.0);
    let idle = harness.spawn_at(4.0, 0.0);
    let _ = harness.apply(Command::SetDestination {
        unit: busy,
        destination: Vec3::new(30.0, 0.0, 0.0),
    });
    let _ = harness.apply(Command::SetJoinRoute {
        unit: routed,
        in_route: true,
    });

    assert!(harness.set_selection(&[busy, routed, idle]));
    assert_eq!(harness.machine.current_selection(), [idle]);
    assert_eq!(harness.machine.current_state(), CommandState::UnitSelected);
    assert_eq!(harness.hints().len(), 2);
}

#[test]
fn direct_selection_keeps_one_unit_without_multi_select() {
    let mut config = SelectionConfig::default();
    config.multi_select = false;
    let mut harness = Harness::with_config(config);
    let a = harness.spawn_at(0.0, 0.0);
    let b = harness.spawn_at(2.0, 0.0);

    assert!(harness.set_selection(&[b, a]));
    assert_eq!(harness.machine.current_selection(), [b]);
    assert!(harness.hints().is_empty());
}

#[test]
fn arming_without_a_selection_shows_a_hint() {
    let mut harness = Harness::new();

    assert!(!harness.machine.arm_move_from_current_selection(&mut harness.commands));
    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
    assert_eq!(harness.hints().len(), 1);
}

#[test]
fn confirming_a_ground_point_requests_a_move() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    harness.click(PointerHit::Unit(unit));
    assert!(harness.machine.arm_move_from_current_selection(&mut harness.commands));
    assert_eq!(harness.machine.current_state(), CommandState::MoveTargeting);
    let _ = harness.take_intents();

    let point = Vec3::new(10.0, 0.0, 10.0);
    harness.click(PointerHit::Ground(point));

    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
    assert_eq!(
        harness.take_intents(),
        vec![Intent::MoveRequested {
            selection: vec![unit],
            point
        }]
    );
    assert!(harness.commands.contains(&Command::PlaceMarker {
        key: MarkerKey::Unit(unit),
        point
    }));
    assert_eq!(harness.machine.current_selection(), [unit]);
}

#[test]
fn confirming_can_clear_the_selection() {
    let mut config = SelectionConfig::default();
    config.clear_selection_on_confirm = true;
    let mut harness = Harness::with_config(config);
    let unit = harness.spawn_at(0.0, 0.0);
    harness.click(PointerHit::Unit(unit));
    let _ = harness.machine.arm_move_from_current_selection(&mut harness.commands);

    harness.click(PointerHit::Ground(Vec3::new(5.0, 0.0, 0.0)));

    assert!(harness.machine.current_selection().is_empty());
    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
}

#[test]
fn clicking_a_unit_while_targeting_requests_a_follow() {
    let mut harness = Harness::new();
    let follower = harness.spawn_at(0.0, 0.0);
    let leader = harness.spawn_at(5.0, 0.0);
    harness.click(PointerHit::Unit(follower));
    let _ = harness.machine.arm_move_from_current_selection(&mut harness.commands);
    let _ = harness.take_intents();

    harness.click(PointerHit::Unit(leader));

    assert_eq!(
        harness.take_intents(),
        vec![Intent::FollowRequested {
            selection: vec![follower],
            target: leader
        }]
    );
    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
}

#[test]
fn clicking_nothing_while_targeting_cancels_the_move() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    harness.click(PointerHit::Unit(unit));
    let _ = harness.machine.arm_move_from_current_selection(&mut harness.commands);

    harness.click(PointerHit::Nothing);

    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
    assert!(harness.machine.current_selection().is_empty());
}

#[test]
fn join_confirmation_emits_an_add_request() {
    let mut harness = Harness::new();
    let source = harness.spawn_at(0.0, 0.0);
    let target = harness.spawn_at(5.0, 0.0);
    harness.click(PointerHit::Unit(source));
    assert!(harness.machine.arm_join_from_current_selection(&mut harness.commands));
    assert!(harness.machine.join_armed());
    assert_eq!(harness.machine.join_source(), Some(source));
    let _ = harness.take_intents();

    harness.click(PointerHit::Unit(target));

    assert_eq!(
        harness.take_intents(),
        vec![Intent::AddRequested {
            selection: vec![source],
            target
        }]
    );
    assert!(!harness.machine.join_armed());
    assert!(harness.machine.join_source().is_none());
    assert_eq!(harness.machine.current_state(), CommandState::UnitSelected);
}

#[test]
fn invalid_join_targets_leave_the_join_armed() {
    let mut harness = Harness::new();
    let source = harness.spawn_at(0.0, 0.0);
    let enemy = harness.spawn(UnitSpec::ally(Vec3::ONE).with_faction(Faction::Enemy));
    harness.click(PointerHit::Unit(source));
    let _ = harness.machine.arm_join_from_current_selection(&mut harness.commands);
    let _ = harness.take_intents();

    harness.click(PointerHit::Unit(source));
    harness.click(PointerHit::Unit(enemy));
    harness.click(PointerHit::Ground(Vec3::new(3.0, 0.0, 3.0)));

    assert!(harness.take_intents().is_empty());
    assert_eq!(harness.machine.current_state(), CommandState::AddTargeting);
    assert_eq!(harness.hints().len(), 3);

    harness.click(PointerHit::Nothing);
    assert_eq!(harness.machine.current_state(), CommandState::UnitSelected);
    assert_eq!(harness.machine.current_selection(), [source]);
}

#[test]
fn empty_click_clears_the_selection() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    harness.click(PointerHit::Unit(unit));
    let _ = harness.take_intents();

    harness.click(PointerHit::Ground(Vec3::new(1.0, 0.0, 1.0)));

    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
    assert_eq!(
        harness.take_intents(),
        vec![Intent::SelectionChanged { selection: vec![] }]
    );
}

#[test]
fn leaving_command_mode_drops_everything() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    harness.click(PointerHit::Unit(unit));
    let _ = harness.machine.arm_join_from_current_selection(&mut harness.commands);

    harness.machine.set_command_mode(false, &mut harness.intents);

    assert_eq!(harness.machine.current_state(), CommandState::Inactive);
    assert!(harness.machine.current_selection().is_empty());
    assert!(!harness.machine.join_armed());
    assert!(harness.machine.join_source().is_none());
}

#[test]
fn lost_units_are_pruned_from_the_selection() {
    let mut harness = Harness::new();
    let a = harness.spawn_at(0.0, 0.0);
    let b = harness.spawn_at(2.0, 0.0);
    harness.click(PointerHit::Unit(a));
    harness.click_with(PointerHit::Unit(b), true);
    let _ = harness.take_intents();

    let events = harness.apply(Command::DestroyUnit { unit: a });
    harness.machine.handle_events(&events, &mut harness.intents);
    assert_eq!(
        harness.take_intents(),
        vec![Intent::SelectionChanged { selection: vec![b] }]
    );
    assert_eq!(harness.machine.current_state(), CommandState::UnitSelected);

    let events = harness.apply(Command::SetUnitActive {
        unit: b,
        active: false,
    });
    harness.machine.handle_events(&events, &mut harness.intents);
    assert!(harness.machine.current_selection().is_empty());
    assert_eq!(harness.machine.current_state(), CommandState::AwaitSelection);
}

#[test]
fn split_requests_carry_the_selection() {
    let mut harness = Harness::new();
    let unit = harness.spawn_at(0.0, 0.0);
    harness.click(PointerHit::Unit(unit));
    let _ = harness.take_intents();

    assert!(harness
        .machine
        .request_split(&mut harness.intents, &mut harness.commands));
    assert_eq!(
        harness.take_intents(),
        vec![Intent::SplitRequested {
            selection: vec![unit]
        }]
    );
}
