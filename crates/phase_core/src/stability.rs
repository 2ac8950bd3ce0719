//! Linear stability of equilibria from the trace and determinant of the
//! Jacobian.

use crate::equilibrium::{jacobian_eigenvalues, ComplexNumber, EquilibriumMatrix};
use crate::error::{DynamicsError, Result};
use crate::settings::{AnalysisSettings, ComplexPolicy};
use crate::symbolic::Expr;
use crate::traits::ComputerAlgebra;
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Refinement {
    /// τ² − 4Δ > 0
    Nodes,
    /// τ² − 4Δ < 0
    Spiral,
    /// τ² − 4Δ = 0
    StarOrDegenerateNodes,
}

impl Refinement {
    fn suffix(self) -> &'static str {
        match self {
            Refinement::Nodes => " nodes",
            Refinement::Spiral => " spiral",
            Refinement::StarOrDegenerateNodes => " star/degenerate nodes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityClass {
    SaddlePoint,
    Stable(Refinement),
    Unstable(Refinement),
    NeutrallyStable(Refinement),
    LineOfFixedPoints,
}

impl StabilityClass {
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilityClass::SaddlePoint => write!(f, "saddle point"),
            StabilityClass::Stable(r) => write!(f, "stable{}", r.suffix()),
            StabilityClass::Unstable(r) => write!(f, "unstable{}", r.suffix()),
            StabilityClass::NeutrallyStable(r) => write!(f, "neutrally stable{}", r.suffix()),
            StabilityClass::LineOfFixedPoints => write!(f, "line of fixed points"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "class")]
pub enum ClassificationStatus {
    Classified(StabilityClass),
    /// Δ has a nonzero imaginary part, or an earlier equilibrium did under
    /// [`ComplexPolicy::StopAtFirst`].
    ComplexValued,
    /// The sign of Δ, or of τ when Δ > 0, depends on unbound symbols.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityRecord {
    pub index: usize,
    pub point: Vec<Expr>,
    /// Jacobian at the point, row-major.
    pub jacobian: Vec<Vec<Expr>>,
    pub trace: Expr,
    pub determinant: Expr,
    pub status: ClassificationStatus,
    /// False when the determinant is complex-valued.
    pub valid: bool,
    /// Present when the Jacobian at the point is fully numeric and real and
    /// the eigenvalue iteration converged.
    pub eigenvalues: Option<Vec<ComplexNumber>>,
}

impl StabilityRecord {
    pub fn classification(&self) -> Result<StabilityClass> {
        match self.status {
            ClassificationStatus::Classified(class) => Ok(class),
            ClassificationStatus::ComplexValued => Err(DynamicsError::ComplexEquilibrium {
                index: self.index,
                determinant: self.determinant.to_string(),
            }),
            ClassificationStatus::Indeterminate => {
                let symbols = self
                    .determinant
                    .free_symbols()
                    .into_iter()
                    .chain(self.trace.free_symbols())
                    .collect::<std::collections::BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(DynamicsError::UnboundSymbol(symbols))
            }
        }
    }

    pub fn label(&self) -> String {
        match self.status {
            ClassificationStatus::Classified(class) => class.label(),
            ClassificationStatus::ComplexValued => "complex-valued equilibrium".to_string(),
            ClassificationStatus::Indeterminate => "indeterminate".to_string(),
        }
    }
}

/// Classifies every equilibrium column of `equilibria`, preserving order.
pub fn analyze<A: ComputerAlgebra>(
    algebra: &A,
    jacobian: &[Vec<Expr>],
    equilibria: &EquilibriumMatrix,
    settings: &AnalysisSettings,
    policy: ComplexPolicy,
) -> Vec<StabilityRecord> {
    let variables = equilibria.variables();
    let mut complex_seen = false;
    let mut records = Vec::with_capacity(equilibria.len());

    for (index, point) in equilibria.columns().iter().enumerate() {
        let at_point: Vec<Vec<Expr>> = jacobian
            .iter()
            .map(|row| {
                row.iter()
                    .map(|entry| {
                        // One variable at a time, in variable order.
                        variables
                            .iter()
                            .zip(point)
                            .fold(entry.clone(), |e, (var, value)| {
                                algebra.substitute(&e, var, value)
                            })
                    })
                    .collect()
            })
            .collect();

        let trace = algebra.simplify(&Expr::Add(
            at_point
                .iter()
                .enumerate()
                .filter_map(|(i, row)| row.get(i).cloned())
                .collect(),
        ));
        let determinant = determinant(algebra, &at_point);
        let complex = is_complex(&determinant, settings.imaginary_tolerance);

        let status = if complex {
            log::warn!(
                "equilibrium {index} has a complex-valued Jacobian determinant ({determinant})"
            );
            complex_seen = true;
            ClassificationStatus::ComplexValued
        } else if complex_seen && policy == ComplexPolicy::StopAtFirst {
            ClassificationStatus::ComplexValued
        } else {
            classify(&trace, &determinant, settings.zero_tolerance)
        };
        let valid = !complex;

        let eigenvalues = real_entries(&at_point)
            .and_then(|entries| jacobian_eigenvalues(at_point.len(), &entries));

        let record = StabilityRecord {
            index,
            point: point.clone(),
            jacobian: at_point,
            trace,
            determinant,
            status,
            valid,
            eigenvalues,
        };
        log::debug!(
            "equilibrium {index}: tau = {}, det = {}, {}",
            record.trace,
            record.determinant,
            record.label()
        );
        records.push(record);
    }
    records
}

fn classify(trace: &Expr, determinant: &Expr, tol: f64) -> ClassificationStatus {
    let Some(det) = determinant.as_real() else {
        return ClassificationStatus::Indeterminate;
    };
    if det < -tol {
        return ClassificationStatus::Classified(StabilityClass::SaddlePoint);
    }
    if det.abs() <= tol {
        return ClassificationStatus::Classified(StabilityClass::LineOfFixedPoints);
    }
    let Some(tau) = trace.as_real() else {
        return ClassificationStatus::Indeterminate;
    };

    let discriminant = tau * tau - 4.0 * det;
    let scale = 1.0 + tau * tau + 4.0 * det.abs();
    let refinement = if discriminant > tol * scale {
        Refinement::Nodes
    } else if discriminant < -tol * scale {
        Refinement::Spiral
    } else {
        Refinement::StarOrDegenerateNodes
    };
    let class = if tau < -tol {
        StabilityClass::Stable(refinement)
    } else if tau > tol {
        StabilityClass::Unstable(refinement)
    } else {
        StabilityClass::NeutrallyStable(refinement)
    };
    ClassificationStatus::Classified(class)
}

/// Whether `expr` is a number with an imaginary part above `tol`, or a
/// symbolic expression carrying a complex constant.
fn is_complex(expr: &Expr, tol: f64) -> bool {
    match expr {
        Expr::Num(value) => value.im.abs() > tol * value.re.abs().max(1.0),
        Expr::Sym(_) => false,
        Expr::Add(items) | Expr::Mul(items) => items.iter().any(|e| is_complex(e, tol)),
        Expr::Pow(base, exp) => is_complex(base, tol) || is_complex(exp, tol),
        Expr::Call(_, arg) => is_complex(arg, tol),
    }
}

fn real_entries(matrix: &[Vec<Expr>]) -> Option<Vec<f64>> {
    matrix
        .iter()
        .flat_map(|row| row.iter())
        .map(Expr::as_real)
        .collect()
}

/// LU determinant when every entry is numeric, cofactor expansion otherwise.
fn determinant<A: ComputerAlgebra>(algebra: &A, matrix: &[Vec<Expr>]) -> Expr {
    let n = matrix.len();
    let numeric: Option<Vec<Complex64>> = matrix
        .iter()
        .flat_map(|row| row.iter())
        .map(Expr::as_number)
        .collect();
    if let Some(values) = numeric {
        if values.len() == n * n {
            let det = DMatrix::from_row_slice(n, n, &values).determinant();
            return algebra.simplify(&Expr::Num(det));
        }
    }
    algebra.simplify(&cofactor_expansion(matrix))
}

fn cofactor_expansion(matrix: &[Vec<Expr>]) -> Expr {
    match matrix.len() {
        0 => Expr::one(),
        1 => matrix[0][0].clone(),
        2 => {
            matrix[0][0].clone() * matrix[1][1].clone()
                - matrix[0][1].clone() * matrix[1][0].clone()
        }
        n => {
            let mut terms = Vec::with_capacity(n);
            for (j, pivot) in matrix[0].iter().enumerate() {
                if pivot.as_number() == Some(Complex64::new(0.0, 0.0)) {
                    continue;
                }
                let minor: Vec<Vec<Expr>> = matrix[1..]
                    .iter()
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .filter(|(c, _)| *c != j)
                            .map(|(_, e)| e.clone())
                            .collect()
                    })
                    .collect();
                let term = pivot.clone() * cofactor_expansion(&minor);
                terms.push(if j % 2 == 0 { term } else { -term });
            }
            Expr::Add(terms)
        }
    }
}
