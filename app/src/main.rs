//! Closed-loop demo: a simulated unicycle driven to a goal by the tracker.
//!
//! Usage: `mpc_tracker_app [params.toml] [map.json] [cycles] [goal_x goal_y goal_theta]`

mod logger;

use color_eyre::{Result, eyre::eyre};
use log::{LevelFilter, info, warn};
use mpc_tracker::{
    AlmSolver, CycleParams, DynamicsModel, ExitStatus, MapData, MpcTracker, Reference, State64, config,
};

const DEFAULT_PARAMS: &str = "app/params/tracker.toml";
const DEFAULT_MAP: &str = "app/data/map.json";
const DEFAULT_CYCLES: usize = 100;
const GOAL_TOLERANCE: f64 = 0.1;

// Start and goal share the heading of the line between them
const START: [f64; 3] = [0.5, 0.5, 0.62];
const GOAL: [f64; 3] = [4.0, 3.0, 0.62];

fn main() -> Result<()> {
    color_eyre::install()?;
    logger::logger_init(LevelFilter::Info)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let params_path = args.first().map(String::as_str).unwrap_or(DEFAULT_PARAMS);
    let map_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_MAP);
    let cycles = match args.get(2) {
        Some(n) => n.parse()?,
        None => DEFAULT_CYCLES,
    };
    let goal = match args.get(3..6) {
        Some(g) => State64::new(g[0].parse()?, g[1].parse()?, g[2].parse()?),
        None => State64::new(GOAL[0], GOAL[1], GOAL[2]),
    };

    let cycles_used = drive(params_path, map_path, goal, cycles)?;
    info!("Goal reached after {cycles_used} cycles");
    Ok(())
}

/// Runs the closed loop from `START` until the robot is within `GOAL_TOLERANCE` of `goal`.
/// Returns the number of cycles it took.
fn drive(params_path: &str, map_path: &str, goal: State64, cycles: usize) -> Result<usize> {
    let params = config::load(params_path)?;
    info!("Loaded tracker parameters from {params_path}");
    let map = MapData::load(map_path)?;
    let workspace = map.workspace()?;
    info!("Loaded map from {map_path}: {} obstacles, workspace {workspace:?}", map.obstacle_list.len());

    let model = DynamicsModel::new(params.mpc.ts, params.mpc.integrator);
    let solver = AlmSolver::new(params.mpc.solver.clone());
    let mut tracker = MpcTracker::new(params.mpc, params.robot, workspace, solver)?;

    let mut cycle = CycleParams::new(State64::new(START[0], START[1], START[2]), Reference::State(goal));
    info!("Driving from {:?} to {goal:?}", cycle.x0);

    for k in 0..cycles {
        let output = tracker.run(&cycle, &map.obstacle_list)?;
        let control = output.first_control();
        info!(
            "[{k:3}] x = ({:6.3}, {:6.3}, {:6.3}), u = ({:5.3}, {:6.3}), cost {:9.4}, {:?} in {:?}",
            cycle.x0.x, cycle.x0.y, cycle.x0.theta, control.v, control.w, output.cost, output.status, output.solve_time
        );
        if output.status != ExitStatus::Success {
            warn!("Applying the first control of a {:?} solution", output.status);
        }

        cycle.x0 = model.step(&cycle.x0, &control);
        cycle.last_control = control;

        if (cycle.x0.x - goal.x).hypot(cycle.x0.y - goal.y) < GOAL_TOLERANCE {
            return Ok(k + 1);
        }
    }

    Err(eyre!("Goal not reached after {cycles} cycles, final state {:?}", cycle.x0))
}
