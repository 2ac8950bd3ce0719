use crate::error::{DynamicsError, Result};
use crate::solvers::RK4;
use crate::traits::{DynamicalSystem, Steppable};
use serde::Serialize;

/// Time series produced by [`integrate`]: `times[k]` pairs with `states[k]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub dimension: usize,
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn last_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }

    /// Values of component `index` over time.
    pub fn component(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.dimension {
            return None;
        }
        Some(self.states.iter().map(|s| s[index]).collect())
    }
}

/// Adapts a closure `f(t, x, out)` into a [`DynamicalSystem`].
pub struct FnSystem<F> {
    dimension: usize,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    pub fn new(dimension: usize, f: F) -> Self {
        Self { dimension, f }
    }
}

impl<F> DynamicalSystem<f64> for FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        (self.f)(t, x, out)
    }
}

/// Integrates `system` from `(t0, x0)` to `tn` with `steps` fixed RK4 steps.
///
/// Returns `steps + 1` samples; sample `k` is at exactly `t0 + k*h`, with
/// `h = (tn - t0) / steps`, and the last one at `tn`. `tn < t0` integrates
/// backwards in time.
pub fn integrate<S: DynamicalSystem<f64>>(
    system: &S,
    x0: &[f64],
    t0: f64,
    tn: f64,
    steps: usize,
) -> Result<Trajectory> {
    if steps == 0 {
        return Err(DynamicsError::InvalidStepCount(steps));
    }
    let dim = system.dimension();
    if x0.len() != dim {
        return Err(DynamicsError::DimensionMismatch {
            expected: dim,
            found: x0.len(),
        });
    }
    if !t0.is_finite() || !tn.is_finite() {
        return Err(DynamicsError::InvalidInput(format!(
            "integration bounds must be finite, got [{t0}, {tn}]"
        )));
    }
    if tn == t0 {
        return Err(DynamicsError::InvalidInput(
            "integration interval is empty (t0 == tn)".to_string(),
        ));
    }
    if let Some(bad) = x0.iter().position(|v| !v.is_finite()) {
        return Err(DynamicsError::InvalidInput(format!(
            "initial state component {bad} is not finite"
        )));
    }

    let h = (tn - t0) / steps as f64;
    let mut solver = RK4::new(dim);
    let mut state = x0.to_vec();
    let mut times = Vec::with_capacity(steps + 1);
    let mut states = Vec::with_capacity(steps + 1);
    times.push(t0);
    states.push(state.clone());

    for k in 1..=steps {
        let mut t = times[k - 1];
        solver.step(system, &mut t, &mut state, h);
        let time = if k == steps { tn } else { t0 + k as f64 * h };
        if state.iter().any(|v| !v.is_finite()) {
            log::warn!("trajectory diverged at step {k} (t = {time})");
            return Err(DynamicsError::NumericalOverflow { step: k, time });
        }
        times.push(time);
        states.push(state.clone());
    }

    Ok(Trajectory {
        dimension: dim,
        times,
        states,
    })
}

/// Integrates one trajectory per initial state. Failures are reported per
/// trajectory and do not stop the others.
pub fn integrate_many<S: DynamicalSystem<f64>>(
    system: &S,
    initial_states: &[Vec<f64>],
    t0: f64,
    tn: f64,
    steps: usize,
) -> Vec<Result<Trajectory>> {
    initial_states
        .iter()
        .map(|x0| integrate(system, x0, t0, tn, steps))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        match result {
            Ok(value) => panic!("expected error containing '{needle}', got Ok({value:?})"),
            Err(err) => {
                let message = err.to_string();
                assert!(
                    message.contains(needle),
                    "expected error containing '{needle}', got '{message}'"
                );
            }
        }
    }

    #[test]
    fn exponential_decay_is_accurate() {
        let system = FnSystem::new(1, |_t, x: &[f64], out: &mut [f64]| out[0] = -x[0]);
        let trajectory = integrate(&system, &[1.0], 0.0, 1.0, 1000).expect("integrates");
        assert_eq!(trajectory.len(), 1001);
        let end = trajectory.last_state().expect("non-empty")[0];
        assert!((end - (-1.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn zero_field_keeps_the_initial_state_exactly() {
        let system = FnSystem::new(2, |_t, _x: &[f64], out: &mut [f64]| out.fill(0.0));
        let trajectory = integrate(&system, &[0.3, -7.25], 0.0, 5.0, 17).expect("integrates");
        for state in &trajectory.states {
            assert_eq!(state, &vec![0.3, -7.25]);
        }
    }

    #[test]
    fn sample_times_are_exact_multiples_of_the_step() {
        let system = FnSystem::new(1, |t, _x: &[f64], out: &mut [f64]| out[0] = t);
        let trajectory = integrate(&system, &[0.0], 0.0, 1.0, 10).expect("integrates");
        let h = 1.0 / 10.0;
        for (k, t) in trajectory.times.iter().enumerate() {
            assert_eq!(*t, k as f64 * h);
        }
        assert_eq!(trajectory.times[10], 1.0);
        // x' = t integrates exactly with RK4.
        assert_abs_diff_eq!(trajectory.states[10][0], 0.5, epsilon = 1e-14);
        assert_eq!(trajectory.component(0).map(|c| c.len()), Some(11));
        assert_eq!(trajectory.component(1), None);
    }

    #[test]
    fn backward_integration_is_supported() {
        let system = FnSystem::new(1, |_t, x: &[f64], out: &mut [f64]| out[0] = -x[0]);
        let trajectory = integrate(&system, &[1.0], 1.0, 0.0, 1000).expect("integrates");
        assert!(trajectory.times.windows(2).all(|w| w[1] < w[0]));
        let end = trajectory.last_state().expect("non-empty")[0];
        assert_abs_diff_eq!(end, 1.0f64.exp(), epsilon = 1e-6);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let system = FnSystem::new(1, |_t, x: &[f64], out: &mut [f64]| out[0] = x[0]);
        assert_err_contains(integrate(&system, &[1.0], 0.0, 1.0, 0), "Step count");
        assert_err_contains(integrate(&system, &[1.0, 2.0], 0.0, 1.0, 5), "Dimension mismatch");
        assert_err_contains(integrate(&system, &[1.0], 0.0, 0.0, 5), "t0 == tn");
        assert_err_contains(integrate(&system, &[f64::NAN], 0.0, 1.0, 5), "not finite");
        assert_err_contains(integrate(&system, &[1.0], 0.0, f64::INFINITY, 5), "finite");
    }

    #[test]
    fn blow_up_is_reported_with_step_and_time() {
        let system = FnSystem::new(1, |_t, x: &[f64], out: &mut [f64]| out[0] = x[0] * x[0]);
        let err = integrate(&system, &[1.0], 0.0, 2.0, 200).expect_err("finite-time blow-up");
        match err {
            DynamicsError::NumericalOverflow { step, time } => {
                assert!(step > 0 && step <= 200);
                assert!(time > 0.9 && time <= 2.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn many_trajectories_fail_independently() {
        let system = FnSystem::new(1, |_t, x: &[f64], out: &mut [f64]| out[0] = x[0] * x[0]);
        let results = integrate_many(&system, &[vec![-1.0], vec![1.0], vec![0.0, 1.0]], 0.0, 2.0, 200);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DynamicsError::NumericalOverflow { .. })));
        assert!(matches!(results[2], Err(DynamicsError::DimensionMismatch { .. })));
    }
}
