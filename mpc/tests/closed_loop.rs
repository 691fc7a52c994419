use std::time::Duration;

use approx::assert_abs_diff_eq;
use mpc_tracker::{
    AlmSolver, Control64, CycleOutput, CycleParams, DynamicsModel, ExitStatus, MpcConfig, MpcTracker, NlpProblem,
    NlpSolver, Obstacle, Reference, RobotSpec, Solution, State64, Workspace,
};

const TOL: f64 = 1e-3;

fn robot() -> RobotSpec {
    RobotSpec { lin_vel_min: 0.0, lin_vel_max: 1.0, ang_vel_max: 1.0 }
}

fn tracker(config: &MpcConfig, workspace: Workspace) -> MpcTracker<AlmSolver> {
    MpcTracker::new(config.clone(), robot(), workspace, AlmSolver::new(config.solver.clone())).unwrap()
}

fn check_prediction(config: &MpcConfig, x0: State64, output: &CycleOutput) {
    let model = DynamicsModel::new(config.ts, config.integrator);
    let robot = robot();

    assert_eq!(output.states.len(), config.n_hor + 1);
    assert_eq!(output.controls.len(), config.n_hor);
    assert_eq!(output.states[0], x0);
    for s in &output.states {
        assert!(s.theta.abs() <= config.heading_bound + 1e-9);
    }

    for (i, c) in output.controls.iter().enumerate() {
        assert!(c.v >= robot.lin_vel_min - 1e-9 && c.v <= robot.lin_vel_max + 1e-9);
        assert!(c.w.abs() <= robot.ang_vel_max + 1e-9);

        let predicted = model.step(&output.states[i], c);
        let next = output.states[i + 1];
        assert_abs_diff_eq!(predicted.x, next.x, epsilon = TOL);
        assert_abs_diff_eq!(predicted.y, next.y, epsilon = TOL);
        assert_abs_diff_eq!(predicted.theta, next.theta, epsilon = TOL);
    }
}

#[test]
fn drives_towards_reference_with_decreasing_cost() {
    let config = MpcConfig::new(10, 0.1);
    let model = DynamicsModel::new(config.ts, config.integrator);
    let mut tracker = tracker(&config, Workspace::unbounded());
    let mut params = CycleParams::new(State64::new(0.0, 0.0, 0.0), Reference::State(State64::new(5.0, 0.0, 0.0)));

    let mut previous_cost = f64::INFINITY;
    for _ in 0..5 {
        let output = tracker.run(&params, &[]).unwrap();

        assert_eq!(output.status, ExitStatus::Success);
        assert!(output.cost < previous_cost, "cost {} did not drop below {previous_cost}", output.cost);
        assert!(output.first_control().v >= 0.0);
        check_prediction(&config, params.x0, &output);

        assert_eq!(output.next_warm_start.len(), tracker.layout().len());
        assert_eq!(tracker.warm_start(), output.next_warm_start.as_slice());

        let sum: f64 = tracker.individual_costs(&params, &output).unwrap().iter().map(|(_, v)| v).sum();
        assert_abs_diff_eq!(sum, output.cost, epsilon = 1e-9);

        // Apply the first control to the simulated robot
        let applied = output.first_control();
        params.x0 = model.step(&params.x0, &applied);
        params.last_control = applied;
        previous_cost = output.cost;
    }

    assert!(params.x0.x > 0.2);
    assert_abs_diff_eq!(params.x0.y, 0.0, epsilon = TOL);
}

#[test]
fn obstacle_covering_the_start_is_not_a_success() {
    let mut config = MpcConfig::new(10, 0.1);
    config.solver.max_outer_iterations = 10;
    let mut tracker = tracker(&config, Workspace::unbounded());
    let params = CycleParams::new(State64::new(0.0, 0.0, 0.0), Reference::State(State64::new(5.0, 0.0, 0.0)));
    let obstacles = [Obstacle::rectangle([-0.5, -0.5], [0.5, 0.5])];

    let output = tracker.run(&params, &obstacles).unwrap();
    assert_eq!(output.status, ExitStatus::Infeasible);
    assert_eq!(output.states[0], params.x0);
    // The warm start is still handed on
    assert_eq!(output.next_warm_start.len(), tracker.layout().len());
}

#[test]
fn stops_in_front_of_a_wall() {
    let mut config = MpcConfig::new(10, 0.1);
    config.obstacle_margin = 0.1;
    let mut tracker = tracker(&config, Workspace::unbounded());
    let params = CycleParams::new(State64::new(0.0, 0.0, 0.0), Reference::State(State64::new(5.0, 0.0, 0.0)));
    let wall = Obstacle::rectangle([0.6, -2.0], [0.8, 2.0]);

    let output = tracker.run(&params, std::slice::from_ref(&wall)).unwrap();
    assert_eq!(output.status, ExitStatus::Success);
    check_prediction(&config, params.x0, &output);
    for s in &output.states {
        assert!(s.x <= 0.5 + TOL, "node at x = {} inside the wall margin", s.x);
        assert!(wall.penetration([s.x, s.y], config.obstacle_margin) <= TOL);
    }
}

#[test]
fn keeps_clear_of_a_circle_ahead() {
    let mut config = MpcConfig::new(10, 0.1);
    config.obstacle_margin = 0.05;
    let mut tracker = tracker(&config, Workspace::unbounded());
    let params = CycleParams::new(State64::new(0.0, 0.0, 0.0), Reference::State(State64::new(5.0, 0.0, 0.0)));
    let circle = Obstacle::Circle { center: [0.8, 0.0], radius: 0.2 };

    let output = tracker.run(&params, std::slice::from_ref(&circle)).unwrap();
    assert_eq!(output.status, ExitStatus::Success);
    check_prediction(&config, params.x0, &output);
    for s in &output.states {
        assert!(circle.penetration([s.x, s.y], config.obstacle_margin) <= TOL);
    }
}

#[test]
fn heading_stays_within_a_tight_bound() {
    let mut config = MpcConfig::new(10, 0.1);
    config.heading_bound = 0.3;
    let mut tracker = tracker(&config, Workspace::unbounded());
    // Reference to the side would need a quarter turn
    let params = CycleParams::new(State64::new(0.0, 0.0, 0.0), Reference::State(State64::new(0.0, 3.0, 0.0)));

    let output = tracker.run(&params, &[]).unwrap();
    assert_ne!(output.status, ExitStatus::Infeasible);
    for s in &output.states {
        assert!(s.theta.abs() <= 0.3 + 1e-9);
    }
}

#[test]
fn stays_inside_the_workspace() {
    let config = MpcConfig::new(10, 0.1);
    let workspace = Workspace { x_min: -10.0, x_max: 0.4, y_min: -10.0, y_max: 10.0 };
    let mut tracker = tracker(&config, workspace);
    let params = CycleParams::new(State64::new(0.0, 0.0, 0.0), Reference::State(State64::new(5.0, 0.0, 0.0)));

    let output = tracker.run(&params, &[]).unwrap();
    assert_ne!(output.status, ExitStatus::Infeasible);
    for s in &output.states {
        assert!(s.x <= 0.4 + 1e-9);
        assert!(workspace.contains([s.x, s.y]));
    }
}

#[test]
fn rejects_seed_of_wrong_length() {
    let config = MpcConfig::new(10, 0.1);
    assert!(tracker(&config, Workspace::unbounded()).with_warm_start(vec![0.0; 7]).is_err());
}

/// Returns a fixed decision vector and status, and records the seeds it was given.
struct ScriptedSolver {
    status: ExitStatus,
    seeds: Vec<Vec<f64>>,
}

impl NlpSolver for ScriptedSolver {
    fn solve(&mut self, problem: &NlpProblem<'_>, warm_start: &[f64]) -> Solution {
        self.seeds.push(warm_start.to_vec());
        let layout = problem.transcription.layout();
        let variables: Vec<f64> = (0..layout.len()).map(|k| k as f64).collect();
        Solution {
            cost: problem.cost.total(&variables),
            variables,
            status: self.status,
            solve_time: Duration::from_millis(3),
        }
    }
}

#[test]
fn backend_status_and_seed_are_threaded_through() {
    let config = MpcConfig::new(2, 0.1);
    let solver = ScriptedSolver { status: ExitStatus::MaxIterations, seeds: Vec::new() };
    let mut tracker = MpcTracker::new(config, robot(), Workspace::unbounded(), solver).unwrap();
    let params = CycleParams::new(State64::default(), Reference::State(State64::new(1.0, 0.0, 0.0)));

    let first = tracker.run(&params, &[]).unwrap();
    assert_eq!(first.status, ExitStatus::MaxIterations);
    assert_eq!(first.solve_time, Duration::from_millis(3));
    // [s0, c0, s1, c1, s2] with z[k] = k
    assert_eq!(first.states[1], State64::new(5.0, 6.0, 7.0));
    assert_eq!(first.controls[1], Control64::new(8.0, 9.0));
    assert_eq!(first.flat_controls(), vec![3.0, 4.0, 8.0, 9.0]);

    let second = tracker.run(&params, &[]).unwrap();
    assert_eq!(second.status, ExitStatus::MaxIterations);

    let expected_seed: Vec<f64> = (5..13).chain(8..13).map(|k| k as f64).collect();
    assert_eq!(first.next_warm_start, expected_seed);
    let seeds = &tracker.solver().seeds;
    assert_eq!(seeds.len(), 2);
    assert_eq!(seeds[0], vec![0.0; 13]);
    assert_eq!(seeds[1], expected_seed);
    assert_eq!(tracker.warm_start(), second.next_warm_start.as_slice());
}
