//! Error taxonomy for the analysis engine.
//!
//! Construction and solve failures are surfaced to the caller as
//! [`DynamicsError`] values. Per-node sampling failures never reach this type:
//! the sampler records them as undefined nodes and keeps going.

use thiserror::Error;

/// Result type alias using [`DynamicsError`].
pub type Result<T> = std::result::Result<T, DynamicsError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DynamicsError {
    // ============ Model construction ============
    #[error("Dimension mismatch: expected {expected} entries, got {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("System must have at least one state variable.")]
    EmptySystem,

    #[error("Duplicate state variable '{0}'.")]
    DuplicateVariable(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    // ============ Equilibria ============
    #[error("Unsolvable system: {0}")]
    UnsolvableSystem(String),

    #[error("Equilibrium search exceeded its budget of {limit} {unit}.")]
    SolveBudgetExceeded { limit: usize, unit: &'static str },

    #[error("Equilibrium {index} has a complex-valued Jacobian determinant ({determinant}).")]
    ComplexEquilibrium { index: usize, determinant: String },

    // ============ Numeric evaluation ============
    #[error("Unbound symbol '{0}': bind it as a parameter before numeric evaluation.")]
    UnboundSymbol(String),

    #[error("Expression has a complex coefficient and cannot be evaluated numerically: {0}")]
    ComplexCoefficient(String),

    #[error(
        "State variables outside the sampled axes must be bound: the model has {dimension} \
         state variables, pass a frozen state."
    )]
    UnboundState { dimension: usize },

    #[error("Step count must be at least 1, got {0}.")]
    InvalidStepCount(usize),

    #[error("Non-finite state encountered at step {step} (t = {time}).")]
    NumericalOverflow { step: usize, time: f64 },

    #[error("Vector field is undefined at ({x}, {y}).")]
    SingularFieldSample { x: f64, y: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
