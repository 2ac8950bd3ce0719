use serde::{Deserialize, Serialize};

/// What to do with the equilibria that follow a complex-valued one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexPolicy {
    /// Mark the first complex-valued equilibrium and every later one as
    /// complex-valued without classifying them.
    StopAtFirst,
    /// Classify every equilibrium on its own.
    Independent,
}

impl Default for ComplexPolicy {
    fn default() -> Self {
        ComplexPolicy::StopAtFirst
    }
}

/// Work budget for the symbolic equation solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveLimits {
    /// Maximum number of solver branch visits.
    pub max_steps: usize,
    /// Maximum number of distinct solutions kept.
    pub max_solutions: usize,
}

impl Default for SolveLimits {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_solutions: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Values with magnitude at or below this are treated as zero when
    /// comparing trace, determinant and discriminant.
    pub zero_tolerance: f64,
    /// Imaginary parts at or below this magnitude are ignored.
    pub imaginary_tolerance: f64,
    pub complex_policy: ComplexPolicy,
    pub solve_limits: SolveLimits,
    pub field_resolution: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            zero_tolerance: 1e-12,
            imaginary_tolerance: 1e-12,
            complex_policy: ComplexPolicy::default(),
            solve_limits: SolveLimits::default(),
            field_resolution: 50,
        }
    }
}
