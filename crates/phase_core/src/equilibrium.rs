use crate::error::{DynamicsError, Result};
use crate::settings::SolveLimits;
use crate::symbolic::{Expr, SolveOutcome};
use crate::traits::ComputerAlgebra;
use nalgebra::{DMatrix, Schur};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Equilibria of a system as a d×k matrix: column k is equilibrium k, row i
/// is state variable i.
///
/// Entries stay symbolic. A column with free symbols describes a family of
/// fixed points (a free state variable maps to itself) or depends on unbound
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquilibriumMatrix {
    variables: Vec<String>,
    columns: Vec<Vec<Expr>>,
}

impl EquilibriumMatrix {
    /// Builds a matrix from explicit columns; each column must have one entry
    /// per variable.
    pub fn from_columns(variables: Vec<String>, columns: Vec<Vec<Expr>>) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|c| c.len() != variables.len()) {
            return Err(DynamicsError::DimensionMismatch {
                expected: variables.len(),
                found: bad.len(),
            });
        }
        Ok(Self { variables, columns })
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of rows (state variables).
    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    /// Number of columns (equilibria).
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Vec<Expr>] {
        &self.columns
    }

    pub fn column(&self, k: usize) -> Option<&[Expr]> {
        self.columns.get(k).map(Vec::as_slice)
    }

    pub fn entry(&self, row: usize, k: usize) -> Option<&Expr> {
        self.columns.get(k).and_then(|column| column.get(row))
    }

    /// Column `k` as `variable -> value`.
    pub fn assignment(&self, k: usize) -> Option<BTreeMap<String, Expr>> {
        let column = self.columns.get(k)?;
        Some(
            self.variables
                .iter()
                .cloned()
                .zip(column.iter().cloned())
                .collect(),
        )
    }

    /// Column `k` as complex numbers, when every entry is numeric.
    pub fn numeric_column(&self, k: usize) -> Option<Vec<Complex64>> {
        self.columns.get(k)?.iter().map(Expr::as_number).collect()
    }

    /// Column `k` as real numbers, when every entry is numeric with a zero
    /// imaginary part.
    pub fn real_column(&self, k: usize) -> Option<Vec<f64>> {
        self.columns.get(k)?.iter().map(Expr::as_real).collect()
    }

    /// Entries rendered as strings, row-major (`rows[i][k]`).
    pub fn to_string_rows(&self) -> Vec<Vec<String>> {
        (0..self.dimension())
            .map(|i| self.columns.iter().map(|c| c[i].to_string()).collect())
            .collect()
    }
}

/// Solves `fields = 0` for `variables` and normalizes the outcome into an
/// [`EquilibriumMatrix`], one simplified column per distinct solution in the
/// order found.
pub fn solve_equilibria<A: ComputerAlgebra>(
    algebra: &A,
    fields: &[Expr],
    variables: &[String],
    limits: &SolveLimits,
) -> Result<EquilibriumMatrix> {
    if fields.len() != variables.len() {
        return Err(DynamicsError::DimensionMismatch {
            expected: variables.len(),
            found: fields.len(),
        });
    }

    let outcome = algebra.solve(fields, variables, limits)?;
    let assignments = match outcome {
        SolveOutcome::UniqueAssignment(single) => {
            log::debug!("equilibrium solver returned a single assignment");
            vec![single]
        }
        SolveOutcome::MultipleSolutions(all) => {
            log::debug!("equilibrium solver returned {} solutions", all.len());
            all
        }
    };

    let mut seen = BTreeSet::new();
    let mut columns = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column: Vec<Expr> = variables
            .iter()
            .map(|name| match assignment.get(name) {
                Some(value) => algebra.simplify(value),
                None => Expr::symbol(name),
            })
            .collect();
        let key = column
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if seen.insert(key) {
            columns.push(column);
        }
    }

    if columns.is_empty() {
        return Err(DynamicsError::UnsolvableSystem(
            "the equations have no solution".to_string(),
        ));
    }

    let matrix = EquilibriumMatrix {
        variables: variables.to_vec(),
        columns,
    };
    log::info!("found {} equilibria", matrix.len());
    for (k, row) in matrix.columns.iter().enumerate() {
        log::debug!(
            "equilibrium {k}: ({})",
            row.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
    }
    Ok(matrix)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex64> for ComplexNumber {
    fn from(value: Complex64) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

/// Iteration cap of the Schur decomposition behind every eigenvalue query.
pub(crate) const SCHUR_MAX_ITERATIONS: usize = 10_000;

/// Eigenvalues of a real square matrix, or `None` when the Schur iteration
/// does not converge within [`SCHUR_MAX_ITERATIONS`].
pub(crate) fn complex_eigenvalues(matrix: DMatrix<f64>) -> Option<Vec<Complex64>> {
    let schur = Schur::try_new(matrix, f64::EPSILON, SCHUR_MAX_ITERATIONS)?;
    Some(schur.complex_eigenvalues().iter().copied().collect())
}

/// Eigenvalues of a real square matrix given in row-major order, sorted by
/// real part then imaginary part.
pub fn jacobian_eigenvalues(dim: usize, jacobian: &[f64]) -> Option<Vec<ComplexNumber>> {
    if jacobian.len() != dim * dim || dim == 0 {
        return None;
    }
    let matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let Some(mut values) = complex_eigenvalues(matrix) else {
        log::debug!("eigenvalue iteration did not converge for a {dim}x{dim} jacobian");
        return None;
    };
    values.sort_by(|a, b| a.re.total_cmp(&b.re).then(a.im.total_cmp(&b.im)));
    Some(values.into_iter().map(ComplexNumber::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{parse, NativeAlgebra};
    use approx::assert_relative_eq;

    fn fields(list: &[&str]) -> Vec<Expr> {
        list.iter().map(|e| parse(e).expect("parse")).collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nonsingular_linear_system_has_only_the_origin() {
        let matrix = solve_equilibria(
            &NativeAlgebra,
            &fields(&["4*x + 3*y", "2*x + y"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.real_column(0), Some(vec![0.0, 0.0]));
    }

    #[test]
    fn competing_species_have_four_equilibria_in_branch_order() {
        let matrix = solve_equilibria(
            &NativeAlgebra,
            &fields(&["x*(3 - x - 2*y)", "y*(2 - x - y)"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let columns: Vec<Vec<f64>> = (0..matrix.len())
            .map(|k| matrix.real_column(k).expect("real"))
            .collect();
        assert_eq!(
            columns,
            vec![
                vec![0.0, 0.0],
                vec![0.0, 2.0],
                vec![3.0, 0.0],
                vec![1.0, 1.0]
            ]
        );
        assert_eq!(matrix.to_string_rows()[0], vec!["0", "0", "3", "1"]);
    }

    #[test]
    fn line_of_fixed_points_keeps_the_free_variable() {
        let matrix = solve_equilibria(
            &NativeAlgebra,
            &fields(&["x - y", "x - y"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        assert_eq!(matrix.len(), 1);
        assert_eq!(
            matrix.column(0),
            Some(&[Expr::symbol("y"), Expr::symbol("y")][..])
        );
        assert_eq!(matrix.numeric_column(0), None);
    }

    #[test]
    fn parametric_equilibrium_stays_symbolic() {
        let matrix = solve_equilibria(
            &NativeAlgebra,
            &fields(&["a - b*x", "y - x"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect("solvable");
        let assignment = matrix.assignment(0).expect("column");
        assert_eq!(assignment["x"].to_string(), "a/b");
        assert_eq!(assignment["y"].to_string(), "a/b");
    }

    #[test]
    fn no_equilibrium_is_an_error() {
        let err = solve_equilibria(
            &NativeAlgebra,
            &fields(&["1", "y"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect_err("no fixed point");
        assert!(matches!(err, DynamicsError::UnsolvableSystem(_)));

        let err = solve_equilibria(
            &NativeAlgebra,
            &fields(&["x"]),
            &names(&["x", "y"]),
            &SolveLimits::default(),
        )
        .expect_err("mismatch");
        assert_eq!(
            err,
            DynamicsError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn eigenvalues_of_triangular_and_rotation_matrices() {
        let values = jacobian_eigenvalues(2, &[-1.0, 5.0, 0.0, -3.0]).expect("eigenvalues");
        assert_relative_eq!(values[0].re, -3.0, epsilon = 1e-12);
        assert_relative_eq!(values[1].re, -1.0, epsilon = 1e-12);
        assert_eq!(values[0].im, 0.0);

        let values = jacobian_eigenvalues(2, &[0.0, 1.0, -4.0, 0.0]).expect("eigenvalues");
        let mut imaginary: Vec<f64> = values.iter().map(|v| v.im).collect();
        imaginary.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(imaginary[0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(imaginary[1], 2.0, epsilon = 1e-12);
        assert!(values.iter().all(|v| v.re.abs() < 1e-12));

        assert_eq!(jacobian_eigenvalues(2, &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn cyclic_permutation_terminates() {
        let dim = 6;
        let mut entries = vec![0.0; dim * dim];
        for i in 0..dim {
            entries[i * dim + (i + 1) % dim] = 1.0;
        }
        // Must return whether or not the iteration converges.
        if let Some(values) = jacobian_eigenvalues(dim, &entries) {
            assert_eq!(values.len(), dim);
            for value in values {
                assert_relative_eq!(value.re.hypot(value.im), 1.0, epsilon = 1e-8);
            }
        }
    }
}
