use std::{collections::BTreeSet, time::Duration};

use squad_command_core::{
    CommandConfig, Intent, PointerHit, UnitId, UnitSpec, UnitView, Vec3,
};
use squad_command_session::Session;
use squad_command_system_command_state::CommandState;
use squad_command_system_teams::Team;
use squad_command_world::query;

const FRAME: Duration = Duration::from_millis(100);

fn session() -> Session {
    let mut session = Session::new(CommandConfig::default());
    session.set_command_mode(true);
    session
}

fn spawn(session: &mut Session, x: f32, z: f32) -> UnitId {
    session
        .spawn_unit(UnitSpec::ally(Vec3::new(x, 0.0, z)))
        .expect("unit spawned")
}

fn run(session: &mut Session, frames: usize) {
    for _ in 0..frames {
        session.tick(FRAME);
    }
}

fn destination(session: &Session, unit: UnitId) -> Option<Vec3> {
    query::unit(session.world(), unit)
        .and_then(|snapshot| snapshot.agent)
        .and_then(|agent| agent.destination)
}

fn members(session: &Session, unit: UnitId) -> BTreeSet<UnitId> {
    session
        .teams()
        .team_of(unit)
        .map(|team| team.members().iter().copied().collect())
        .unwrap_or_default()
}

#[test]
fn move_order_sends_the_selected_unit_to_the_clicked_point() {
    let mut session = session();
    let unit = spawn(&mut session, 0.0, 0.0);

    session.click(PointerHit::Unit(unit), false);
    assert_eq!(session.command_state(), CommandState::UnitSelected);
    assert!(session.arm_move());
    session.click(PointerHit::Ground(Vec3::new(10.0, 0.0, 10.0)), false);

    assert_eq!(session.command_state(), CommandState::AwaitSelection);
    assert_eq!(destination(&session, unit), Some(Vec3::new(10.0, 0.0, 10.0)));
}

#[test]
fn join_order_creates_a_team_anchored_on_the_clicked_unit() {
    let mut session = session();
    let first = spawn(&mut session, 0.0, 0.0);
    let second = spawn(&mut session, 5.0, 0.0);

    session.click(PointerHit::Unit(first), false);
    assert!(session.arm_join());
    session.click(PointerHit::Unit(second), false);
    run(&mut session, 30);

    let team = session.teams().team_of(first).expect("team created");
    assert_eq!(members(&session, first), BTreeSet::from([first, second]));
    assert_eq!(team.anchor(), second);
    assert!(session.executor().join_in_flight().is_none());
}

#[test]
fn cross_team_join_merges_into_one_spread_out_team() {
    let mut session = session();
    let a = spawn(&mut session, 0.0, 0.0);
    let b = spawn(&mut session, 2.0, 0.0);
    let c = spawn(&mut session, 10.0, 0.0);
    let d = spawn(&mut session, 12.0, 0.0);
    let kept = session.join_units(a, b).expect("team A");
    let absorbed = session.join_units(c, d).expect("team B");
    run(&mut session, 20);

    session.click(PointerHit::Unit(a), false);
    assert!(session.arm_join());
    session.click(PointerHit::Unit(c), false);
    run(&mut session, 100);

    assert_eq!(session.teams().len(), 1);
    assert!(session.teams().team(absorbed).is_none());
    let team = session.teams().team(kept).expect("merged team");
    assert_eq!(team.anchor(), c);
    assert_eq!(members(&session, a), BTreeSet::from([a, b, c, d]));
    assert!(!session.teams().staged_merge_in_flight(kept));

    let units = session.units();
    let positions: Vec<Vec3> = [a, b, c, d]
        .iter()
        .map(|unit| units.position(*unit).expect("alive"))
        .collect();
    for (index, first) in positions.iter().enumerate() {
        for second in &positions[index + 1..] {
            assert!(
                first.distance(*second) > 1.0,
                "members overlap at {first:?} and {second:?}"
            );
        }
    }
}

#[test]
fn repeated_follow_orders_keep_a_single_routine() {
    let mut session = session();
    let follower = spawn(&mut session, 0.0, 0.0);
    let leader = spawn(&mut session, 6.0, 0.0);

    session.click(PointerHit::Unit(follower), false);
    assert!(session.arm_move());
    session.click(PointerHit::Unit(leader), false);
    run(&mut session, 1);

    assert!(session.arm_move(), "selection is kept after confirming");
    session.click(PointerHit::Unit(leader), false);
    run(&mut session, 1);

    assert_eq!(session.executor().follow_count(), 1);
    assert_eq!(session.executor().follow_target(follower), Some(leader));
}

#[test]
fn destroyed_units_leave_the_selection() {
    let mut session = session();
    let unit = spawn(&mut session, 0.0, 0.0);
    session.click(PointerHit::Unit(unit), false);
    let _ = session.take_intents();

    session.destroy_unit(unit);

    assert!(session.state_machine().current_selection().is_empty());
    assert_eq!(session.command_state(), CommandState::AwaitSelection);
    assert_eq!(
        session.take_intents(),
        vec![Intent::SelectionChanged { selection: vec![] }]
    );
}

#[test]
fn split_is_refused_with_a_hint() {
    let mut session = session();
    let unit = spawn(&mut session, 0.0, 0.0);
    session.click(PointerHit::Unit(unit), false);

    assert!(session.request_split());
    assert_eq!(query::hint_history(session.world()).len(), 1);
    assert!(session.teams().is_empty());
}

#[test]
fn team_move_target_is_cleared_on_arrival() {
    let mut config = CommandConfig::default();
    config.teams.move_arrive_threshold = 1.5;
    let mut session = Session::new(config);
    session.set_command_mode(true);
    let a = spawn(&mut session, 0.0, 0.0);
    let b = spawn(&mut session, 2.0, 0.0);
    let team = session.join_units(a, b).expect("team");
    run(&mut session, 10);

    session.click(PointerHit::Unit(a), false);
    assert!(session.arm_move());
    session.click(PointerHit::Ground(Vec3::new(8.0, 0.0, 0.0)), false);
    assert_eq!(
        session.teams().team(team).expect("team").move_target(),
        Some(Vec3::new(8.0, 0.0, 0.0))
    );

    run(&mut session, 40);
    assert!(session.teams().team(team).expect("team").move_target().is_none());
    assert!(query::markers(session.world()).is_empty());
}

fn scripted_run() -> (UnitView, Vec<Team>) {
    let mut session = session();
    let units: Vec<UnitId> = (0..6)
        .map(|index| spawn(&mut session, index as f32 * 3.0, (index % 2) as f32 * 2.0))
        .collect();
    let _ = session.join_units(units[0], units[1]);
    let _ = session.join_units(units[2], units[3]);
    run(&mut session, 5);

    session.click(PointerHit::Unit(units[0]), false);
    let _ = session.arm_join();
    session.click(PointerHit::Unit(units[2]), false);
    run(&mut session, 10);

    session.click(PointerHit::Unit(units[4]), false);
    session.click(PointerHit::Unit(units[5]), true);
    let _ = session.arm_move();
    session.click(PointerHit::Ground(Vec3::new(-10.0, 0.0, 6.0)), false);
    run(&mut session, 30);

    (session.units(), session.teams().teams().cloned().collect())
}

#[test]
fn identical_scripts_replay_identically() {
    let first = scripted_run();
    let second = scripted_run();
    assert_eq!(first, second);
}
