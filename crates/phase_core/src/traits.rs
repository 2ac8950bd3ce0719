use crate::error::Result;
use crate::settings::SolveLimits;
use crate::symbolic::{Expr, SolveOutcome};
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A continuous-time vector field dx/dt = f(t, x).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// Symbolic capability required by the analysis pipeline.
///
/// `substitute` and `differentiate` return simplified expressions.
pub trait ComputerAlgebra {
    fn simplify(&self, expr: &Expr) -> Expr;

    fn substitute(&self, expr: &Expr, symbol: &str, value: &Expr) -> Expr;

    fn differentiate(&self, expr: &Expr, symbol: &str) -> Expr;

    /// Solves `equations[i] = 0` for `unknowns`; any other symbol is a parameter.
    fn solve(
        &self,
        equations: &[Expr],
        unknowns: &[String],
        limits: &SolveLimits,
    ) -> Result<SolveOutcome>;
}
