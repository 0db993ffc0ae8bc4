//! Scripted sessions exercising each kind of order.

use std::{fmt, time::Duration};

use anyhow::{bail, ensure, Context, Result};
use clap::ValueEnum;
use squad_command_core::{CommandConfig, PointerHit, UnitId, UnitSpec, UnitView, Vec3};
use squad_command_session::Session;
use squad_command_system_command_state::CommandState;
use squad_command_system_teams::Team;
use squad_command_world::query;
use tracing::{debug, info};

/// Frame length used to let scripted set-up settle before orders are given.
const SETUP_FRAME: Duration = Duration::from_millis(100);
const SETUP_FRAMES: usize = 15;

/// Scripted scenario selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ScenarioKind {
    /// A team and a loner receive a move order.
    Move,
    /// A unit joins another and forms a team.
    Join,
    /// Two teams merge through a cross-team join.
    Merge,
    /// Two units follow a moving leader.
    Follow,
    /// Every scenario in turn.
    All,
}

impl ScenarioKind {
    /// Individual scenarios this selection stands for.
    pub(crate) fn expand(self) -> Vec<Self> {
        match self {
            Self::All => vec![Self::Move, Self::Join, Self::Merge, Self::Follow],
            single => vec![single],
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Join => "join",
            Self::Merge => "merge",
            Self::Follow => "follow",
            Self::All => "all",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State captured at the end of a scenario.
#[derive(Debug)]
pub(crate) struct Report {
    scenario: ScenarioKind,
    elapsed: Duration,
    state: CommandState,
    teams: Vec<Team>,
    units: UnitView,
    hints: Vec<String>,
}

impl Report {
    fn capture(scenario: ScenarioKind, session: &Session) -> Self {
        Self {
            scenario,
            elapsed: query::elapsed(session.world()),
            state: session.command_state(),
            teams: session.teams().teams().cloned().collect(),
            units: session.units(),
            hints: query::hint_history(session.world()).to_vec(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario {} after {:.2}s, state {:?}",
            self.scenario,
            self.elapsed.as_secs_f32(),
            self.state
        )?;
        for team in &self.teams {
            let members: Vec<u32> = team.members().iter().map(UnitId::get).collect();
            writeln!(
                f,
                "  team {}: anchor {}, members {:?}, radius {:.2}",
                team.id().get(),
                team.anchor().get(),
                members,
                team.formation_radius()
            )?;
        }
        for unit in self.units.iter() {
            writeln!(
                f,
                "  unit {}: ({:.2}, {:.2}){}",
                unit.id.get(),
                unit.position.x,
                unit.position.z,
                if unit.active { "" } else { " inactive" }
            )?;
        }
        for hint in &self.hints {
            writeln!(f, "  hint: {hint}")?;
        }
        Ok(())
    }
}

/// Runs a single scenario for `ticks` frames of `dt` after its scripted input.
pub(crate) fn run(
    kind: ScenarioKind,
    config: &CommandConfig,
    ticks: u32,
    dt: Duration,
) -> Result<Report> {
    let mut session = Session::new(config.clone());
    session.set_command_mode(true);

    match kind {
        ScenarioKind::Move => script_move(&mut session)?,
        ScenarioKind::Join => script_join(&mut session)?,
        ScenarioKind::Merge => script_merge(&mut session)?,
        ScenarioKind::Follow => script_follow(&mut session)?,
        ScenarioKind::All => bail!("`all` must be expanded into individual scenarios"),
    }

    for _ in 0..ticks {
        session.tick(dt);
    }

    let report = Report::capture(kind, &session);
    info!(
        scenario = %kind,
        teams = report.teams.len(),
        units = report.units.len(),
        "scenario finished"
    );
    Ok(report)
}

fn spawn(session: &mut Session, x: f32, z: f32) -> Result<UnitId> {
    session
        .spawn_unit(UnitSpec::ally(Vec3::new(x, 0.0, z)))
        .context("world refused to spawn a unit")
}

fn settle(session: &mut Session) {
    for _ in 0..SETUP_FRAMES {
        session.tick(SETUP_FRAME);
    }
}

fn script_move(session: &mut Session) -> Result<()> {
    let first = spawn(session, 0.0, 0.0)?;
    let second = spawn(session, 2.0, 0.0)?;
    let loner = spawn(session, 4.0, 0.0)?;
    let _ = spawn(session, 0.0, 3.0)?;
    let _ = session
        .join_units(first, second)
        .context("initial team could not be formed")?;
    settle(session);

    session.click(PointerHit::Unit(first), false);
    session.click(PointerHit::Unit(loner), true);
    ensure!(session.arm_move(), "move order could not be armed");
    session.click(PointerHit::Ground(Vec3::new(12.0, 0.0, 8.0)), false);
    debug!(intents = session.take_intents().len(), "move scripted");
    Ok(())
}

fn script_join(session: &mut Session) -> Result<()> {
    let source = spawn(session, 0.0, 0.0)?;
    let target = spawn(session, 6.0, 0.0)?;

    session.click(PointerHit::Unit(source), false);
    ensure!(session.arm_join(), "join order could not be armed");
    session.click(PointerHit::Unit(target), false);
    debug!(intents = session.take_intents().len(), "join scripted");
    Ok(())
}

fn script_merge(session: &mut Session) -> Result<()> {
    let a = spawn(session, 0.0, 0.0)?;
    let b = spawn(session, 2.0, 0.0)?;
    let c = spawn(session, 10.0, 0.0)?;
    let d = spawn(session, 12.0, 0.0)?;
    let _ = session.join_units(a, b).context("first team could not be formed")?;
    let _ = session.join_units(c, d).context("second team could not be formed")?;
    settle(session);

    session.click(PointerHit::Unit(a), false);
    ensure!(session.arm_join(), "join order could not be armed");
    session.click(PointerHit::Unit(c), false);
    debug!(intents = session.take_intents().len(), "merge scripted");
    Ok(())
}

fn script_follow(session: &mut Session) -> Result<()> {
    let leader = spawn(session, 0.0, 0.0)?;
    let left = spawn(session, -4.0, -2.0)?;
    let right = spawn(session, -4.0, 2.0)?;

    session.click(PointerHit::Unit(leader), false);
    ensure!(session.arm_move(), "leader move could not be armed");
    session.click(PointerHit::Ground(Vec3::new(15.0, 0.0, 0.0)), false);

    ensure!(
        session.select_from_ui(&[left, right]),
        "followers could not be selected"
    );
    ensure!(session.arm_move(), "follow order could not be armed");
    session.click(PointerHit::Unit(leader), false);
    debug!(intents = session.take_intents().len(), "follow scripted");
    Ok(())
}
