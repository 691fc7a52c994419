//! Objective of the horizon problem as a registry of named, pure cost terms.

use crate::config::CostWeights;
use crate::error::MpcError;
use crate::layout::VariableLayout;
use crate::model::{Control64, NS, NU, State64};

/// Target the robot tracks over the horizon.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    State(State64),
    /// Node `i` tracks entry `min(i, len - 1)`.
    Trajectory(Vec<State64>),
}

impl Reference {
    pub fn at(&self, i: usize) -> State64 {
        match self {
            Reference::State(s) => *s,
            Reference::Trajectory(t) => t[i.min(t.len() - 1)],
        }
    }

    fn check(&self) -> Result<(), MpcError> {
        match self {
            Reference::Trajectory(t) if t.is_empty() => Err(MpcError::EmptyReference),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CostTerm {
    ReferenceTracking,
    TerminalTracking,
    ControlEffort,
    ControlRate,
}

impl CostTerm {
    pub const ALL: [CostTerm; 4] = [
        CostTerm::ReferenceTracking,
        CostTerm::TerminalTracking,
        CostTerm::ControlEffort,
        CostTerm::ControlRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CostTerm::ReferenceTracking => "ref_state",
            CostTerm::TerminalTracking => "terminal",
            CostTerm::ControlEffort => "control_effort",
            CostTerm::ControlRate => "control_rate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Builds and evaluates the objective for one cycle. Holds no solver state; the same
/// assembler can be evaluated any number of times on any decision vector.
#[derive(Debug, Clone)]
pub struct CostAssembler {
    layout: VariableLayout,
    q: [f64; NS],
    qn: [f64; NS],
    r: [f64; NU],
    rd: [f64; NU],
    references: Vec<State64>, // per node, N+1 entries
    last_control: Control64,  // control applied before this horizon
}

impl CostAssembler {
    pub fn new(
        layout: VariableLayout,
        weights: &CostWeights,
        reference: &Reference,
        last_control: Control64,
    ) -> Result<Self, MpcError> {
        MpcError::check_len("state dimension", NS, layout.ns())?;
        MpcError::check_len("control dimension", NU, layout.nu())?;
        reference.check()?;

        Ok(Self {
            layout,
            q: weight_array("stage state weights", &weights.q)?,
            qn: weight_array("terminal state weights", &weights.qn)?,
            r: weight_array("control effort weights", &weights.r)?,
            rd: weight_array("control rate weights", &weights.rd)?,
            references: (0..=layout.n_hor()).map(|i| reference.at(i)).collect(),
            last_control,
        })
    }

    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    pub fn total(&self, z: &[f64]) -> f64 {
        CostTerm::ALL.iter().map(|t| self.evaluate(*t, z)).sum()
    }

    /// Value of a single term on a realized decision vector.
    pub fn evaluate(&self, term: CostTerm, z: &[f64]) -> f64 {
        let layout = &self.layout;
        let n = layout.n_hor();
        match term {
            CostTerm::ReferenceTracking => (0..n)
                .map(|i| weighted_sq(&self.q, layout.state(z, i), &self.ref_slice(i)))
                .sum(),
            CostTerm::TerminalTracking => weighted_sq(&self.qn, layout.state(z, n), &self.ref_slice(n)),
            CostTerm::ControlEffort => (0..n)
                .map(|i| weighted_sq(&self.r, layout.control(z, i), &[0.0; NU]))
                .sum(),
            CostTerm::ControlRate => (0..n)
                .map(|i| weighted_sq(&self.rd, layout.control(z, i), &self.previous_control(z, i)))
                .sum(),
        }
    }

    pub fn evaluate_named(&self, name: &str, z: &[f64]) -> Option<f64> {
        CostTerm::from_name(name).map(|t| self.evaluate(t, z))
    }

    pub fn breakdown(&self, z: &[f64]) -> Vec<(&'static str, f64)> {
        CostTerm::ALL.iter().map(|t| (t.name(), self.evaluate(*t, z))).collect()
    }

    /// Gradient of [`total`](Self::total), written into `grad`.
    pub fn gradient(&self, z: &[f64], grad: &mut [f64]) {
        let layout = &self.layout;
        let n = layout.n_hor();
        grad.iter_mut().for_each(|g| *g = 0.0);

        for i in 0..n {
            let target = self.ref_slice(i);
            let state = layout.state(z, i);
            for (k, g) in layout.state_mut(grad, i).iter_mut().enumerate() {
                *g += 2.0 * self.q[k] * (state[k] - target[k]);
            }
        }

        let target = self.ref_slice(n);
        let state = layout.state(z, n);
        for (k, g) in layout.state_mut(grad, n).iter_mut().enumerate() {
            *g += 2.0 * self.qn[k] * (state[k] - target[k]);
        }

        for i in 0..n {
            let control = layout.control(z, i);
            let prev = self.previous_control(z, i);
            let mut rate = [0.0; NU];
            for k in 0..NU {
                rate[k] = 2.0 * self.rd[k] * (control[k] - prev[k]);
            }
            for (k, g) in layout.control_mut(grad, i).iter_mut().enumerate() {
                *g += 2.0 * self.r[k] * control[k] + rate[k];
            }
            // The rate term also depends on the preceding interval
            if i > 0 {
                for (k, g) in layout.control_mut(grad, i - 1).iter_mut().enumerate() {
                    *g -= rate[k];
                }
            }
        }
    }

    fn ref_slice(&self, i: usize) -> [f64; NS] {
        let r = self.references[i];
        [r.x, r.y, r.theta]
    }

    fn previous_control(&self, z: &[f64], i: usize) -> [f64; NU] {
        if i == 0 {
            [self.last_control.v, self.last_control.w]
        } else {
            let c = self.layout.control(z, i - 1);
            [c[0], c[1]]
        }
    }
}

fn weight_array<const N: usize>(what: &'static str, w: &[f64]) -> Result<[f64; N], MpcError> {
    w.try_into()
        .map_err(|_| MpcError::DimensionMismatch { what, expected: N, found: w.len() })
}

fn weighted_sq(w: &[f64], a: &[f64], b: &[f64]) -> f64 {
    w.iter().zip(a).zip(b).map(|((w, a), b)| w * (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assembler(n_hor: usize, reference: Reference) -> CostAssembler {
        let layout = VariableLayout::new(3, 2, n_hor).unwrap();
        CostAssembler::new(layout, &CostWeights::default(), &reference, Control64::new(0.2, -0.1)).unwrap()
    }

    fn sample_z(layout: &VariableLayout) -> Vec<f64> {
        (0..layout.len()).map(|k| (0.37 * k as f64).sin()).collect()
    }

    #[test]
    fn breakdown_sums_to_total() {
        let cost = assembler(5, Reference::State(State64::new(2.0, -1.0, 0.5)));
        let z = sample_z(cost.layout());
        let breakdown = cost.breakdown(&z);

        assert_eq!(
            breakdown.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            vec!["ref_state", "terminal", "control_effort", "control_rate"]
        );
        let sum: f64 = breakdown.iter().map(|(_, v)| v).sum();
        assert_relative_eq!(sum, cost.total(&z), epsilon = 1e-12);
        assert_eq!(cost.evaluate_named("terminal", &z), Some(breakdown[1].1));
        assert_eq!(cost.evaluate_named("nope", &z), None);
    }

    #[test]
    fn standing_on_the_reference_costs_only_the_rate_from_last_control() {
        let target = State64::new(1.0, 1.0, 0.0);
        let cost = assembler(4, Reference::State(target));
        let layout = *cost.layout();
        let mut z = vec![0.0; layout.len()];
        for i in 0..=layout.n_hor() {
            layout.state_mut(&mut z, i).copy_from_slice(&[1.0, 1.0, 0.0]);
        }

        assert_eq!(cost.evaluate(CostTerm::ReferenceTracking, &z), 0.0);
        assert_eq!(cost.evaluate(CostTerm::TerminalTracking, &z), 0.0);
        assert_eq!(cost.evaluate(CostTerm::ControlEffort, &z), 0.0);
        // rd = [0.1, 0.1], last control = (0.2, -0.1)
        assert_relative_eq!(cost.evaluate(CostTerm::ControlRate, &z), 0.1 * (0.04 + 0.01), epsilon = 1e-15);
    }

    #[test]
    fn trajectory_reference_holds_its_last_entry() {
        let reference = Reference::Trajectory(vec![State64::new(0.0, 0.0, 0.0), State64::new(1.0, 0.0, 0.0)]);
        assert_eq!(reference.at(0), State64::new(0.0, 0.0, 0.0));
        assert_eq!(reference.at(7), State64::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let reference = Reference::Trajectory(
            (0..4).map(|i| State64::new(0.5 * i as f64, 0.1, 0.2)).collect(),
        );
        let cost = assembler(6, reference);
        let z = sample_z(cost.layout());
        let mut grad = vec![0.0; z.len()];
        cost.gradient(&z, &mut grad);

        let h = 1e-6;
        for j in 0..z.len() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[j] += h;
            zm[j] -= h;
            let fd = (cost.total(&zp) - cost.total(&zm)) / (2.0 * h);
            assert_relative_eq!(grad[j], fd, epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_bad_weights_and_empty_reference() {
        let layout = VariableLayout::new(3, 2, 3).unwrap();
        let mut weights = CostWeights::default();
        weights.r = vec![1.0];
        assert!(matches!(
            CostAssembler::new(layout, &weights, &Reference::State(State64::default()), Control64::default()),
            Err(MpcError::DimensionMismatch { what: "control effort weights", expected: 2, found: 1 })
        ));
        assert!(matches!(
            CostAssembler::new(layout, &CostWeights::default(), &Reference::Trajectory(vec![]), Control64::default()),
            Err(MpcError::EmptyReference)
        ));
    }
}
