//! Built-in computer algebra: expression tree, parser, canonical
//! simplification, differentiation and equation solving.

mod diff;
mod expr;
mod parse;
mod poly;
mod solve;

pub use diff::differentiate;
pub use expr::{Expr, Func};
pub use parse::parse;
pub use poly::simplify;
pub use solve::{solve, Assignment, SolveOutcome};

use crate::error::Result;
use crate::settings::SolveLimits;
use crate::traits::ComputerAlgebra;

/// The in-crate [`ComputerAlgebra`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAlgebra;

impl ComputerAlgebra for NativeAlgebra {
    fn simplify(&self, expr: &Expr) -> Expr {
        simplify(expr)
    }

    fn substitute(&self, expr: &Expr, symbol: &str, value: &Expr) -> Expr {
        simplify(&expr.substitute(symbol, value))
    }

    fn differentiate(&self, expr: &Expr, symbol: &str) -> Expr {
        differentiate(expr, symbol)
    }

    fn solve(
        &self,
        equations: &[Expr],
        unknowns: &[String],
        limits: &SolveLimits,
    ) -> Result<SolveOutcome> {
        solve(equations, unknowns, limits)
    }
}
