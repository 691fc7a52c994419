//! Decision-variable layout of the multiple-shooting problem.
//!
//! The flat vector is ordered `[s0, c0, s1, c1, ..., s_N]`. Every component that reads
//! or writes the vector goes through [`VariableLayout`].

use std::ops::Range;

use named_vec_ops::NamedVecOps;

use crate::error::MpcError;
use crate::model::{Control64, State64};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VariableLayout {
    ns: usize,
    nu: usize,
    n_hor: usize,
}

impl VariableLayout {
    pub fn new(ns: usize, nu: usize, n_hor: usize) -> Result<Self, MpcError> {
        if n_hor == 0 {
            return Err(MpcError::InvalidHorizon(n_hor));
        }
        if ns == 0 {
            return Err(MpcError::DimensionMismatch { what: "state dimension", expected: 1, found: 0 });
        }
        if nu == 0 {
            return Err(MpcError::DimensionMismatch { what: "control dimension", expected: 1, found: 0 });
        }
        Ok(Self { ns, nu, n_hor })
    }

    pub fn ns(&self) -> usize {
        self.ns
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    pub fn n_hor(&self) -> usize {
        self.n_hor
    }

    /// Length of one state node plus its control interval.
    pub fn stride(&self) -> usize {
        self.ns + self.nu
    }

    pub fn len(&self) -> usize {
        self.n_hor * self.stride() + self.ns
    }

    /// Index range of state node `i`, `0 <= i <= N`.
    pub fn node(&self, i: usize) -> Range<usize> {
        debug_assert!(i <= self.n_hor, "node {i} outside horizon {}", self.n_hor);
        let start = i * self.stride();
        start..start + self.ns
    }

    /// Index range of control interval `i`, `0 <= i < N`.
    pub fn interval(&self, i: usize) -> Range<usize> {
        debug_assert!(i < self.n_hor, "interval {i} outside horizon {}", self.n_hor);
        let start = i * self.stride() + self.ns;
        start..start + self.nu
    }

    pub fn state<'a>(&self, z: &'a [f64], i: usize) -> &'a [f64] {
        &z[self.node(i)]
    }

    pub fn state_mut<'a>(&self, z: &'a mut [f64], i: usize) -> &'a mut [f64] {
        &mut z[self.node(i)]
    }

    pub fn control<'a>(&self, z: &'a [f64], i: usize) -> &'a [f64] {
        &z[self.interval(i)]
    }

    pub fn control_mut<'a>(&self, z: &'a mut [f64], i: usize) -> &'a mut [f64] {
        &mut z[self.interval(i)]
    }

    /// Packs `N+1` states and `N` controls, each given as a contiguous block, into the
    /// flat ordering.
    pub fn interleave(&self, states: &[f64], controls: &[f64]) -> Result<Vec<f64>, MpcError> {
        MpcError::check_len("state sequence", (self.n_hor + 1) * self.ns, states.len())?;
        MpcError::check_len("control sequence", self.n_hor * self.nu, controls.len())?;

        let mut z = Vec::with_capacity(self.len());
        for i in 0..self.n_hor {
            z.extend_from_slice(&states[i * self.ns..(i + 1) * self.ns]);
            z.extend_from_slice(&controls[i * self.nu..(i + 1) * self.nu]);
        }
        z.extend_from_slice(&states[self.n_hor * self.ns..]);
        Ok(z)
    }

    // The typed accessors below assume the unicycle dimensions, which the transcription
    // enforces before any vector of this layout is produced.

    pub fn typed_state(&self, z: &[f64], i: usize) -> State64 {
        State64::from_slice(self.state(z, i))
    }

    pub fn typed_control(&self, z: &[f64], i: usize) -> Control64 {
        Control64::from_slice(self.control(z, i))
    }

    pub fn states(&self, z: &[f64]) -> Vec<State64> {
        (0..=self.n_hor).map(|i| self.typed_state(z, i)).collect()
    }

    pub fn controls(&self, z: &[f64]) -> Vec<Control64> {
        (0..self.n_hor).map(|i| self.typed_control(z, i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_follow_interleaved_order() {
        let layout = VariableLayout::new(3, 2, 4).unwrap();
        assert_eq!(layout.stride(), 5);
        assert_eq!(layout.len(), 23);
        assert_eq!(layout.node(0), 0..3);
        assert_eq!(layout.interval(0), 3..5);
        assert_eq!(layout.node(1), 5..8);
        assert_eq!(layout.interval(3), 18..20);
        assert_eq!(layout.node(4), 20..23);
    }

    #[test]
    fn interleave_and_extract_agree() {
        let layout = VariableLayout::new(3, 2, 2).unwrap();
        let states = [0.0, 1.0, 2.0, 10.0, 11.0, 12.0, 20.0, 21.0, 22.0];
        let controls = [0.5, 0.6, 1.5, 1.6];
        let z = layout.interleave(&states, &controls).unwrap();

        assert_eq!(
            z,
            vec![0.0, 1.0, 2.0, 0.5, 0.6, 10.0, 11.0, 12.0, 1.5, 1.6, 20.0, 21.0, 22.0]
        );
        assert_eq!(layout.typed_state(&z, 2), State64::new(20.0, 21.0, 22.0));
        assert_eq!(layout.controls(&z), vec![Control64::new(0.5, 0.6), Control64::new(1.5, 1.6)]);
    }

    #[test]
    fn interleave_rejects_wrong_lengths() {
        let layout = VariableLayout::new(3, 2, 2).unwrap();
        assert!(matches!(
            layout.interleave(&[0.0; 8], &[0.0; 4]),
            Err(MpcError::DimensionMismatch { what: "state sequence", expected: 9, found: 8 })
        ));
    }

    #[test]
    fn zero_horizon_is_rejected() {
        assert!(matches!(VariableLayout::new(3, 2, 0), Err(MpcError::InvalidHorizon(0))));
    }
}
