//! Branching solver for systems of nonlinear equations `f_i(x) = 0`.
//!
//! Each branch normalizes its equations to the canonical polynomial form and
//! applies the first strategy that fits: factor splitting, linear
//! elimination, closed-form or companion-matrix polynomial roots, and
//! inversion of a single transcendental atom. Work is bounded by
//! [`SolveLimits`] rather than wall-clock time.

use super::expr::{Expr, Func};
use super::poly::{complex_pow, simplify, Monomial, Poly};
use crate::equilibrium::{complex_eigenvalues, SCHUR_MAX_ITERATIONS};
use crate::error::{DynamicsError, Result};
use crate::settings::SolveLimits;
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

/// Constant equations at or below this magnitude count as satisfied.
const RESIDUAL_TOLERANCE: f64 = 1e-9;
/// Relative size below which a root's real or imaginary part is snapped to 0.
const ROOT_CLEANUP: f64 = 1e-10;
const NEWTON_POLISH_STEPS: usize = 4;
/// Largest integer degree whose roots are enumerated in closed form.
const MAX_CLOSED_FORM_DEGREE: usize = 64;

/// One value per unknown, keyed by unknown name.
pub type Assignment = BTreeMap<String, Expr>;

/// Shape of a successful solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SolveOutcome {
    /// Exactly one assignment. Unknowns the equations leave undetermined map
    /// to themselves.
    UniqueAssignment(Assignment),
    /// Several distinct assignments, in the order they were found.
    MultipleSolutions(Vec<Assignment>),
}

impl SolveOutcome {
    pub fn len(&self) -> usize {
        match self {
            SolveOutcome::UniqueAssignment(_) => 1,
            SolveOutcome::MultipleSolutions(all) => all.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_solutions(self) -> Vec<Assignment> {
        match self {
            SolveOutcome::UniqueAssignment(single) => vec![single],
            SolveOutcome::MultipleSolutions(all) => all,
        }
    }
}

/// Solves `equations[i] = 0` for `unknowns`.
///
/// Every other free symbol is treated as a parameter with a generic value.
/// Fails with `UnsolvableSystem` when no solution exists or an equation cannot
/// be isolated, and with `SolveBudgetExceeded` when `limits` are hit.
pub fn solve(equations: &[Expr], unknowns: &[String], limits: &SolveLimits) -> Result<SolveOutcome> {
    let mut solver = Solver {
        unknowns,
        originals: equations,
        limits: *limits,
        steps: 0,
        solutions: Vec::new(),
        seen: BTreeSet::new(),
    };
    solver.explore(equations.to_vec(), Assignment::new())?;
    log::trace!(
        "solver finished after {} steps with {} solutions",
        solver.steps,
        solver.solutions.len()
    );

    let mut solutions = solver.solutions;
    match solutions.len() {
        0 => Err(DynamicsError::UnsolvableSystem(
            "the equations have no solution".to_string(),
        )),
        1 => Ok(SolveOutcome::UniqueAssignment(solutions.remove(0))),
        _ => Ok(SolveOutcome::MultipleSolutions(solutions)),
    }
}

enum Step {
    /// Explore one branch per replacement of equation `index`.
    Branch { index: usize, replacements: Vec<Expr> },
    /// Drop equation `index` and explore one branch per value of `var`.
    Substitute { index: usize, var: String, values: Vec<Expr> },
}

struct Solver<'a> {
    unknowns: &'a [String],
    originals: &'a [Expr],
    limits: SolveLimits,
    steps: usize,
    solutions: Vec<Assignment>,
    seen: BTreeSet<String>,
}

impl<'a> Solver<'a> {
    fn explore(&mut self, equations: Vec<Expr>, assignment: Assignment) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(DynamicsError::SolveBudgetExceeded {
                limit: self.limits.max_steps,
                unit: "steps",
            });
        }

        let polys = match self.normalize(&equations) {
            Some(polys) => polys,
            None => {
                log::trace!("branch is inconsistent, dropping it");
                return Ok(());
            }
        };
        if polys.is_empty() {
            return self.record(assignment);
        }
        let exprs: Vec<Expr> = polys.iter().map(Poly::to_expr).collect();

        match self.plan(&polys, &exprs)? {
            Step::Branch { index, replacements } => {
                for replacement in replacements {
                    log::trace!("branch: {} -> {} = 0", exprs[index], replacement);
                    let mut next = exprs.clone();
                    next[index] = replacement;
                    self.explore(next, assignment.clone())?;
                }
            }
            Step::Substitute { index, var, values } => {
                for value in values {
                    self.eliminate(&exprs, index, &var, value, &assignment)?;
                }
            }
        }
        Ok(())
    }

    /// Canonical forms of the non-trivial equations with denominators
    /// cleared, or `None` when the branch is inconsistent.
    fn normalize(&self, equations: &[Expr]) -> Option<Vec<Poly>> {
        let mut out = Vec::with_capacity(equations.len());
        for equation in equations {
            let poly = Poly::from_expr(equation);
            if let Some(value) = poly.as_constant() {
                if value.norm() <= RESIDUAL_TOLERANCE {
                    continue;
                }
                return None;
            }
            if self.unknown_atoms(&poly).is_empty() {
                // Only parameters left: generically nonzero.
                return None;
            }
            out.push(self.clear_denominators(poly));
        }
        Some(out)
    }

    fn unknown_atoms(&self, poly: &Poly) -> Vec<String> {
        poly.atom_keys_where(|atom| atom.contains_any(self.unknowns))
    }

    fn clear_denominators(&self, poly: Poly) -> Poly {
        let mut factor = Monomial::new();
        for key in self.unknown_atoms(&poly) {
            let (min, _) = poly.exponent_range(&key);
            if min < 0 {
                factor.insert(key, -min);
            }
        }
        if factor.is_empty() {
            poly
        } else {
            poly.mul_monomial(&factor)
        }
    }

    fn plan(&self, polys: &[Poly], exprs: &[Expr]) -> Result<Step> {
        if let Some(step) = self.plan_factor(polys) {
            return Ok(step);
        }
        if let Some(step) = self.plan_linear(polys, |c| c.is_number()) {
            return Ok(step);
        }
        if let Some(step) = self.plan_linear(polys, |c| !c.contains_any(self.unknowns)) {
            return Ok(step);
        }
        if let Some(step) = self.plan_univariate(polys)? {
            return Ok(step);
        }
        if let Some(step) = self.plan_inversion(polys)? {
            return Ok(step);
        }
        if let Some(step) = self.plan_linear(polys, |_| true) {
            return Ok(step);
        }
        Err(DynamicsError::UnsolvableSystem(format!(
            "cannot isolate an unknown in {} = 0",
            exprs[0]
        )))
    }

    /// Splits `u^k * rest = 0` into `u = 0` and `rest = 0`.
    fn plan_factor(&self, polys: &[Poly]) -> Option<Step> {
        for (index, poly) in polys.iter().enumerate() {
            let factors: Vec<(String, i64)> = self
                .unknown_atoms(poly)
                .into_iter()
                .filter_map(|key| {
                    let (min, _) = poly.exponent_range(&key);
                    (min > 0).then_some((key, min))
                })
                .collect();
            if factors.is_empty() {
                continue;
            }
            let divisor: Monomial = factors.iter().map(|(k, e)| (k.clone(), -e)).collect();
            let rest = poly.mul_monomial(&divisor);
            let atom_of = |key: &str| {
                poly.atoms
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| Expr::symbol(key))
            };

            match rest.as_constant() {
                Some(c) if factors.len() == 1 => {
                    let (key, exp) = &factors[0];
                    if *exp == 1 && c == Complex64::new(1.0, 0.0) {
                        continue;
                    }
                    return Some(Step::Branch {
                        index,
                        replacements: vec![atom_of(key)],
                    });
                }
                constant => {
                    let mut replacements: Vec<Expr> =
                        factors.iter().map(|(key, _)| atom_of(key)).collect();
                    if constant.is_none() {
                        replacements.push(rest.to_expr());
                    }
                    return Some(Step::Branch { index, replacements });
                }
            }
        }
        None
    }

    fn plan_linear(&self, polys: &[Poly], accept: impl Fn(&Expr) -> bool) -> Option<Step> {
        for (index, poly) in polys.iter().enumerate() {
            for var in self.unknowns {
                if let Some((c1, c0)) = linear_coefficients(poly, var) {
                    if accept(&c1) {
                        return Some(Step::Substitute {
                            index,
                            var: var.clone(),
                            values: vec![-c0 / c1],
                        });
                    }
                }
            }
        }
        None
    }

    /// An equation that is a polynomial in a single unknown.
    fn plan_univariate(&self, polys: &[Poly]) -> Result<Option<Step>> {
        for (index, poly) in polys.iter().enumerate() {
            let atoms = self.unknown_atoms(poly);
            let [key] = atoms.as_slice() else {
                continue;
            };
            if !self.unknowns.contains(key) {
                continue;
            }
            let Some(coeffs) = dense_coefficients(poly, key) else {
                continue;
            };
            if let Some(roots) = polynomial_roots(&coeffs, &self.limits)? {
                return Ok(Some(Step::Substitute {
                    index,
                    var: key.clone(),
                    values: roots,
                }));
            }
        }
        Ok(None)
    }

    /// An equation that is a polynomial in one non-symbol atom `g(u)`.
    fn plan_inversion(&self, polys: &[Poly]) -> Result<Option<Step>> {
        for (index, poly) in polys.iter().enumerate() {
            let atoms = self.unknown_atoms(poly);
            let [key] = atoms.as_slice() else {
                continue;
            };
            let Some(atom) = poly.atoms.get(key) else {
                continue;
            };
            let Some(coeffs) = dense_coefficients(poly, key) else {
                continue;
            };
            let Some(roots) = polynomial_roots(&coeffs, &self.limits)? else {
                continue;
            };
            let mut replacements = Vec::new();
            let mut supported = true;
            for root in &roots {
                match self.invert(atom, root) {
                    Some(equations) => replacements.extend(equations),
                    None => {
                        supported = false;
                        break;
                    }
                }
            }
            if supported {
                if replacements.is_empty() {
                    // Every root was outside the atom's range: no solution here.
                    replacements.push(Expr::one());
                }
                return Ok(Some(Step::Branch { index, replacements }));
            }
        }
        Ok(None)
    }

    /// Equations `u - value = 0` equivalent to `atom = root`, or `None` when
    /// the atom kind cannot be inverted.
    fn invert(&self, atom: &Expr, root: &Expr) -> Option<Vec<Expr>> {
        let root = simplify(root);
        let values: Vec<(Expr, Expr)> = match atom {
            Expr::Call(func, u) => {
                let u = (**u).clone();
                let values = match func {
                    Func::Sin => {
                        let principal = Expr::call(Func::Asin, root.clone());
                        vec![principal.clone(), Expr::real(PI) - principal]
                    }
                    Func::Cos => {
                        let principal = Expr::call(Func::Acos, root.clone());
                        vec![principal.clone(), -principal]
                    }
                    Func::Tan => vec![Expr::call(Func::Atan, root.clone())],
                    Func::Exp if root.is_zero() => vec![],
                    Func::Exp => vec![Expr::call(Func::Ln, root.clone())],
                    Func::Ln => vec![Expr::call(Func::Exp, root.clone())],
                    Func::Asin => vec![Expr::call(Func::Sin, root.clone())],
                    Func::Acos => vec![Expr::call(Func::Cos, root.clone())],
                    Func::Atan => vec![Expr::call(Func::Tan, root.clone())],
                    Func::Sinh | Func::Cosh | Func::Tanh => return None,
                };
                values.into_iter().map(|v| (u.clone(), v)).collect()
            }
            Expr::Pow(base, exp) if !exp.contains_any(self.unknowns) => {
                let p = exp.as_real()?;
                if p == 0.0 {
                    return None;
                }
                root_values(&root, p)
                    .into_iter()
                    .map(|v| ((**base).clone(), v))
                    .collect()
            }
            Expr::Pow(base, exp) if !base.contains_any(self.unknowns) => {
                if root.is_zero() {
                    vec![]
                } else {
                    let value = Expr::call(Func::Ln, root.clone())
                        / Expr::call(Func::Ln, (**base).clone());
                    vec![((**exp).clone(), value)]
                }
            }
            // A sum kept whole because of a large integer power.
            Expr::Add(_) => vec![(atom.clone(), root)],
            _ => return None,
        };
        Some(values.into_iter().map(|(u, v)| u - v).collect())
    }

    fn eliminate(
        &mut self,
        exprs: &[Expr],
        index: usize,
        var: &str,
        value: Expr,
        assignment: &Assignment,
    ) -> Result<()> {
        let value = simplify(&value);
        log::trace!("eliminate: {var} = {value}");
        let mut next_assignment: Assignment = assignment
            .iter()
            .map(|(name, v)| (name.clone(), v.substitute(var, &value)))
            .collect();
        next_assignment.insert(var.to_string(), value.clone());
        let next: Vec<Expr> = exprs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, e)| e.substitute(var, &value))
            .collect();
        self.explore(next, next_assignment)
    }

    fn record(&mut self, assignment: Assignment) -> Result<()> {
        let solution: Assignment = self
            .unknowns
            .iter()
            .map(|name| {
                let value = assignment
                    .get(name)
                    .map(simplify)
                    .unwrap_or_else(|| Expr::symbol(name));
                (name.clone(), value)
            })
            .collect();

        // Clearing denominators can introduce points where the system is undefined.
        for equation in self.originals {
            let residual = simplify(&equation.substitute_all(&solution));
            if let Some(value) = residual.as_number() {
                if !(value.re.is_finite() && value.im.is_finite()) {
                    log::trace!("rejecting candidate where {equation} is undefined");
                    return Ok(());
                }
            }
        }

        let key = self
            .unknowns
            .iter()
            .map(|name| solution.get(name).map(ToString::to_string).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ");
        if !self.seen.insert(key) {
            return Ok(());
        }
        self.solutions.push(solution);
        if self.solutions.len() > self.limits.max_solutions {
            return Err(DynamicsError::SolveBudgetExceeded {
                limit: self.limits.max_solutions,
                unit: "solutions",
            });
        }
        Ok(())
    }
}

/// `(c1, c0)` when `poly = c1*var + c0` with neither coefficient containing `var`.
fn linear_coefficients(poly: &Poly, var: &str) -> Option<(Expr, Expr)> {
    if !poly.uses_atom(var) {
        return None;
    }
    let (min, max) = poly.exponent_range(var);
    if min < 0 || max != 1 {
        return None;
    }
    let coeffs = poly.coefficients_in(var);
    let c1 = coeffs.get(&1)?.to_expr();
    let c0 = coeffs.get(&0).map(Poly::to_expr).unwrap_or_else(Expr::zero);
    if c1.contains_symbol(var) || c0.contains_symbol(var) {
        return None;
    }
    Some((c1, c0))
}

/// Coefficients of `poly` as a polynomial in atom `key`, lowest degree first.
fn dense_coefficients(poly: &Poly, key: &str) -> Option<Vec<Expr>> {
    let (min, max) = poly.exponent_range(key);
    if min < 0 || max < 1 {
        return None;
    }
    let sparse = poly.coefficients_in(key);
    let mut dense = vec![Expr::zero(); max as usize + 1];
    for (exp, coeff) in sparse {
        dense[exp as usize] = coeff.to_expr();
    }
    Some(dense)
}

/// Roots of `sum coeffs[k] * t^k`. Degree 1 and 2 accept symbolic
/// coefficients; higher degrees need real numeric coefficients and at most
/// `limits.max_solutions` roots.
fn polynomial_roots(coeffs: &[Expr], limits: &SolveLimits) -> Result<Option<Vec<Expr>>> {
    let Some(degree) = coeffs.len().checked_sub(1) else {
        return Ok(None);
    };
    match degree {
        0 => Ok(None),
        1 => Ok(Some(vec![simplify(&(-coeffs[0].clone() / coeffs[1].clone()))])),
        2 => Ok(Some(quadratic_roots(&coeffs[2], &coeffs[1], &coeffs[0]))),
        _ => {
            let Some(real) = coeffs.iter().map(Expr::as_real).collect::<Option<Vec<f64>>>() else {
                return Ok(None);
            };
            if degree > limits.max_solutions {
                return Err(DynamicsError::SolveBudgetExceeded {
                    limit: limits.max_solutions,
                    unit: "solutions",
                });
            }
            // a*t^n + c: closed-form n-th roots.
            if degree <= MAX_CLOSED_FORM_DEGREE && real[1..degree].iter().all(|c| *c == 0.0) {
                let root = Expr::real(-real[0] / real[degree]);
                return Ok(Some(root_values(&root, degree as f64)));
            }
            let roots = companion_roots(&real)?;
            Ok(Some(roots.into_iter().map(Expr::Num).collect()))
        }
    }
}

/// Quadratic formula with the principal square root, minus root first.
fn quadratic_roots(a: &Expr, b: &Expr, c: &Expr) -> Vec<Expr> {
    if let (Some(a), Some(b), Some(c)) = (a.as_number(), b.as_number(), c.as_number()) {
        let s = (b * b - 4.0 * a * c).sqrt();
        return [(-b - s) / (2.0 * a), (-b + s) / (2.0 * a)]
            .into_iter()
            .map(|z| Expr::Num(clean_root(z)))
            .collect();
    }
    let discriminant = simplify(&(b.clone().powi(2) - Expr::real(4.0) * a.clone() * c.clone()));
    let s = discriminant.sqrt();
    let two_a = Expr::real(2.0) * a.clone();
    vec![
        simplify(&((-b.clone() - s.clone()) / two_a.clone())),
        simplify(&((-b.clone() + s) / two_a)),
    ]
}

/// Values of `u` with `u^p = root`. Integer `p` with a numeric root gives
/// all `p` complex roots; otherwise only the principal one, verified when
/// numeric.
fn root_values(root: &Expr, p: f64) -> Vec<Expr> {
    let Some(r) = root.as_number() else {
        return vec![root.clone().pow(Expr::real(1.0 / p))];
    };
    if p == p.trunc() && p > 0.0 && p <= MAX_CLOSED_FORM_DEGREE as f64 {
        let n = p as usize;
        let magnitude = r.norm().powf(1.0 / p);
        let phase = r.arg();
        let mut roots: Vec<Complex64> = (0..n)
            .map(|k| {
                Complex64::from_polar(magnitude, (phase + 2.0 * PI * k as f64) / p)
            })
            .map(clean_root)
            .collect();
        sort_roots(&mut roots);
        return roots.into_iter().map(Expr::Num).collect();
    }
    let candidate = complex_pow(r, Complex64::new(1.0 / p, 0.0));
    let back = complex_pow(candidate, Complex64::new(p, 0.0));
    if (back - r).norm() <= RESIDUAL_TOLERANCE * r.norm().max(1.0) {
        vec![Expr::Num(clean_root(candidate))]
    } else {
        vec![]
    }
}

fn companion_roots(coeffs: &[f64]) -> Result<Vec<Complex64>> {
    let n = coeffs.len() - 1;
    let lead = coeffs[n];
    let mut companion = DMatrix::<f64>::zeros(n, n);
    for i in 1..n {
        companion[(i, i - 1)] = 1.0;
    }
    for (i, c) in coeffs.iter().take(n).enumerate() {
        companion[(i, n - 1)] = -c / lead;
    }
    let eigenvalues =
        complex_eigenvalues(companion).ok_or(DynamicsError::SolveBudgetExceeded {
            limit: SCHUR_MAX_ITERATIONS,
            unit: "eigenvalue iterations",
        })?;
    let mut roots: Vec<Complex64> = eigenvalues
        .into_iter()
        .map(|z| clean_root(polish(coeffs, z)))
        .collect();
    sort_roots(&mut roots);
    Ok(roots)
}

fn horner(coeffs: &[f64], z: Complex64) -> (Complex64, Complex64) {
    let mut p = Complex64::new(0.0, 0.0);
    let mut dp = Complex64::new(0.0, 0.0);
    for c in coeffs.iter().rev() {
        dp = dp * z + p;
        p = p * z + c;
    }
    (p, dp)
}

fn polish(coeffs: &[f64], mut z: Complex64) -> Complex64 {
    for _ in 0..NEWTON_POLISH_STEPS {
        let (p, dp) = horner(coeffs, z);
        if dp.norm() == 0.0 {
            break;
        }
        let next = z - p / dp;
        if !(next.re.is_finite() && next.im.is_finite()) {
            break;
        }
        z = next;
    }
    z
}

fn clean_root(mut z: Complex64) -> Complex64 {
    let scale = z.norm().max(1.0);
    if z.im.abs() <= ROOT_CLEANUP * scale {
        z.im = 0.0;
    }
    if z.re.abs() <= ROOT_CLEANUP * scale {
        z.re = 0.0;
    }
    if (z.re - z.re.round()).abs() <= 1e-12 * scale {
        z.re = z.re.round();
    }
    if (z.im - z.im.round()).abs() <= 1e-12 * scale {
        z.im = z.im.round();
    }
    z
}

/// Real roots first, then by real part, then by imaginary part.
fn sort_roots(roots: &mut [Complex64]) {
    roots.sort_by(|a, b| {
        (a.im != 0.0)
            .cmp(&(b.im != 0.0))
            .then(a.re.total_cmp(&b.re))
            .then(a.im.total_cmp(&b.im))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::parse;
    use approx::assert_abs_diff_eq;

    fn system(equations: &[&str]) -> Vec<Expr> {
        equations
            .iter()
            .map(|e| parse(e).expect("equation should parse"))
            .collect()
    }

    fn names(vars: &[&str]) -> Vec<String> {
        vars.iter().map(|v| v.to_string()).collect()
    }

    fn real_points(outcome: SolveOutcome, vars: &[&str]) -> Vec<Vec<f64>> {
        outcome
            .into_solutions()
            .iter()
            .map(|s| {
                vars.iter()
                    .map(|v| s[*v].as_real().expect("real numeric value"))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn linear_system_has_unique_origin() {
        let outcome = solve(
            &system(&["4*x + 3*y", "2*x + y"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        match outcome {
            SolveOutcome::UniqueAssignment(a) => {
                assert!(a["x"].is_zero() && a["y"].is_zero(), "got {a:?}");
            }
            other => panic!("expected a unique assignment, got {other:?}"),
        }
    }

    #[test]
    fn factorable_system_returns_every_branch() {
        let outcome = solve(
            &system(&["x*(3 - x - 2*y)", "y*(2 - x - y)"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let mut points = real_points(outcome, &["x", "y"]);
        points.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        assert_eq!(
            points,
            vec![vec![0.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0], vec![3.0, 0.0]]
        );
    }

    #[test]
    fn underdetermined_system_leaves_free_variable() {
        let outcome = solve(
            &system(&["x - y", "2*x - 2*y"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let SolveOutcome::UniqueAssignment(a) = outcome else {
            panic!("expected a unique assignment");
        };
        assert_eq!(a["x"], Expr::symbol("y"));
        assert_eq!(a["y"], Expr::symbol("y"));
    }

    #[test]
    fn quadratic_gives_complex_roots() {
        let outcome = solve(
            &system(&["x^2 + 1", "y"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let xs: Vec<Complex64> = outcome
            .into_solutions()
            .iter()
            .map(|s| s["x"].as_number().expect("numeric"))
            .collect();
        assert_eq!(xs, vec![Complex64::new(0.0, -1.0), Complex64::new(0.0, 1.0)]);
    }

    #[test]
    fn parametric_linear_system() {
        let outcome = solve(
            &system(&["a - b*x", "y - x"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let SolveOutcome::UniqueAssignment(a) = outcome else {
            panic!("expected a unique assignment");
        };
        assert_eq!(a["x"].to_string(), "a/b");
        assert_eq!(a["y"].to_string(), "a/b");
    }

    #[test]
    fn cubic_uses_companion_matrix() {
        let outcome = solve(
            &system(&["x^3 - 6*x^2 + 11*x - 6"]),
            &names(&["x"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let points = real_points(outcome, &["x"]);
        assert_eq!(points, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn binomials_have_every_root_in_closed_form() {
        let outcome = solve(&system(&["x^6 - 1"]), &names(&["x"]), &SolveLimits::default())
            .expect("solvable");
        let roots: Vec<Complex64> = outcome
            .into_solutions()
            .iter()
            .map(|s| s["x"].as_number().expect("numeric"))
            .collect();
        assert_eq!(roots.len(), 6);
        assert_eq!(roots[0], Complex64::new(-1.0, 0.0));
        assert_eq!(roots[1], Complex64::new(1.0, 0.0));
        for root in &roots {
            assert_abs_diff_eq!((root.powi(6) - 1.0).norm(), 0.0, epsilon = 1e-12);
        }

        let outcome = solve(&system(&["x^8 - 2"]), &names(&["x"]), &SolveLimits::default())
            .expect("solvable");
        assert_eq!(outcome.len(), 8);
    }

    #[test]
    fn cyclic_companion_matrix_returns() {
        // x^6 - 1 without the closed form.
        match companion_roots(&[-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]) {
            Ok(roots) => assert_eq!(roots.len(), 6),
            Err(err) => assert!(matches!(
                err,
                DynamicsError::SolveBudgetExceeded { unit: "eigenvalue iterations", .. }
            )),
        }
    }

    #[test]
    fn polynomial_degree_is_checked_against_the_solution_cap() {
        let limits = SolveLimits {
            max_steps: 10_000,
            max_solutions: 4,
        };
        let err = solve(&system(&["x^6 - x - 1"]), &names(&["x"]), &limits)
            .expect_err("six roots exceed the cap");
        assert_eq!(
            err,
            DynamicsError::SolveBudgetExceeded {
                limit: 4,
                unit: "solutions"
            }
        );
    }

    #[test]
    fn sine_atom_is_inverted() {
        let outcome = solve(
            &system(&["y", "-sin(x)"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let points = real_points(outcome, &["x", "y"]);
        assert_eq!(points.len(), 2);
        assert_abs_diff_eq!(points[0][0], 0.0);
        assert_abs_diff_eq!(points[1][0], PI, epsilon = 1e-15);
    }

    #[test]
    fn exponential_and_root_atoms() {
        let outcome = solve(&system(&["exp(x) - 2"]), &names(&["x"]), &SolveLimits::default())
            .expect("solvable");
        let points = real_points(outcome, &["x"]);
        assert_abs_diff_eq!(points[0][0], 2f64.ln(), epsilon = 1e-14);

        let outcome = solve(&system(&["sqrt(x) - 3"]), &names(&["x"]), &SolveLimits::default())
            .expect("solvable");
        assert_eq!(real_points(outcome, &["x"]), vec![vec![9.0]]);

        let err = solve(&system(&["sqrt(x) + 3"]), &names(&["x"]), &SolveLimits::default())
            .expect_err("no real principal root");
        assert!(matches!(err, DynamicsError::UnsolvableSystem(_)));
    }

    #[test]
    fn rejects_points_where_the_system_is_undefined() {
        let outcome = solve(
            &system(&["(x^2 - 1)/(x - 1)"]),
            &names(&["x"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        assert_eq!(real_points(outcome, &["x"]), vec![vec![-1.0]]);
    }

    #[test]
    fn inconsistent_and_transcendental_systems_fail() {
        let err = solve(&system(&["1", "x"]), &names(&["x"]), &SolveLimits::default())
            .expect_err("inconsistent");
        assert!(matches!(err, DynamicsError::UnsolvableSystem(_)));

        let err = solve(&system(&["x - cos(x)"]), &names(&["x"]), &SolveLimits::default())
            .expect_err("not isolatable");
        match err {
            DynamicsError::UnsolvableSystem(message) => assert!(message.contains("cos(x)")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn budget_is_enforced() {
        let limits = SolveLimits {
            max_steps: 2,
            max_solutions: 64,
        };
        let err = solve(
            &system(&["x*(3 - x - 2*y)", "y*(2 - x - y)"]),
            &names(&["x", "y"]),
            &limits,
        )
        .expect_err("budget too small");
        assert_eq!(
            err,
            DynamicsError::SolveBudgetExceeded {
                limit: 2,
                unit: "steps"
            }
        );

        let limits = SolveLimits {
            max_steps: 10_000,
            max_solutions: 1,
        };
        let err = solve(&system(&["x^2 - 1"]), &names(&["x"]), &limits)
            .expect_err("too many solutions");
        assert!(matches!(
            err,
            DynamicsError::SolveBudgetExceeded { unit: "solutions", .. }
        ));
    }
}
