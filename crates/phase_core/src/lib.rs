//! The `phase_core` crate provides the analysis engine behind the phase plane tool.
//! Systems are given symbolically; equilibria and their linear stability are derived
//! symbolically, while trajectories and vector fields are evaluated numerically.
//!
//! Key components:
//! - **Symbolic**: expression parser, simplifier, differentiation and equation solver behind the `ComputerAlgebra` trait.
//! - **Model**: `SystemModel`, which caches the Jacobian and equilibria of a vector field.
//! - **Stability**: trace/determinant classification of each equilibrium.
//! - **Equation Engine**: A custom bytecode VM for evaluating the vector field efficiently.
//! - **Trajectory / Vector Field**: fixed-step RK4 integration and grid sampling for phase portraits.

pub mod equation_engine;
pub mod equilibrium;
pub mod error;
pub mod model;
pub mod settings;
pub mod solvers;
pub mod stability;
pub mod symbolic;
pub mod traits;
pub mod trajectory;
pub mod vector_field;

pub use error::{DynamicsError, Result};
pub use model::SystemModel;
pub use settings::{AnalysisSettings, ComplexPolicy, SolveLimits};
