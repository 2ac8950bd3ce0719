//! The symbolic system under study and the analyses derived from it.

use crate::equation_engine::EquationSystem;
use crate::equilibrium::{solve_equilibria, EquilibriumMatrix};
use crate::error::{DynamicsError, Result};
use crate::settings::{AnalysisSettings, ComplexPolicy};
use crate::stability::{analyze, StabilityRecord};
use crate::symbolic::{parse, Expr, NativeAlgebra};
use crate::traits::ComputerAlgebra;
use crate::trajectory::{integrate, Trajectory};
use crate::vector_field::{
    equilibrium_markers, sample_vector_field, EquilibriumMarker, FieldAxes, FieldGrid, FieldRect,
};
use std::collections::{BTreeMap, BTreeSet};

/// A vector field `dx/dt = F(x)` given symbolically.
///
/// The Jacobian and the equilibrium outcome are computed once, at
/// construction. A failed equilibrium search is kept and returned by every
/// later call to [`SystemModel::equilibria`]; integration and field sampling
/// stay available.
#[derive(Debug, Clone)]
pub struct SystemModel<A: ComputerAlgebra = NativeAlgebra> {
    fields: Vec<Expr>,
    variables: Vec<String>,
    jacobian: Vec<Vec<Expr>>,
    equilibria: Result<EquilibriumMatrix>,
    settings: AnalysisSettings,
    algebra: A,
}

impl SystemModel<NativeAlgebra> {
    pub fn new(fields: Vec<Expr>, variables: Vec<String>) -> Result<Self> {
        Self::with_settings(fields, variables, AnalysisSettings::default())
    }

    pub fn with_settings(
        fields: Vec<Expr>,
        variables: Vec<String>,
        settings: AnalysisSettings,
    ) -> Result<Self> {
        Self::with_algebra(NativeAlgebra, fields, variables, settings)
    }

    /// Parses each equation and builds a model with default settings.
    pub fn parse<S: AsRef<str>>(equations: &[S], variables: &[S]) -> Result<Self> {
        let fields = equations
            .iter()
            .map(|eq| parse(eq.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let variables = variables
            .iter()
            .map(|name| name.as_ref().trim().to_string())
            .collect();
        Self::new(fields, variables)
    }
}

impl<A: ComputerAlgebra> SystemModel<A> {
    pub fn with_algebra(
        algebra: A,
        fields: Vec<Expr>,
        variables: Vec<String>,
        settings: AnalysisSettings,
    ) -> Result<Self> {
        validate_variables(&fields, &variables)?;

        let fields: Vec<Expr> = fields.iter().map(|f| algebra.simplify(f)).collect();
        let jacobian: Vec<Vec<Expr>> = fields
            .iter()
            .map(|field| {
                variables
                    .iter()
                    .map(|var| algebra.differentiate(field, var))
                    .collect()
            })
            .collect();
        for (i, row) in jacobian.iter().enumerate() {
            log::debug!(
                "jacobian row {i}: [{}]",
                row.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }

        let equilibria = solve_equilibria(&algebra, &fields, &variables, &settings.solve_limits);
        if let Err(err) = &equilibria {
            log::warn!("equilibrium search failed: {err}");
        }

        Ok(Self {
            fields,
            variables,
            jacobian,
            equilibria,
            settings,
            algebra,
        })
    }

    pub fn fields(&self) -> &[Expr] {
        &self.fields
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn algebra(&self) -> &A {
        &self.algebra
    }

    /// `jacobian()[i][j]` is ∂F_i/∂x_j, simplified.
    pub fn jacobian(&self) -> &[Vec<Expr>] {
        &self.jacobian
    }

    /// Free symbols of F that are not state variables, sorted by name.
    pub fn parameters(&self) -> Vec<String> {
        let state: BTreeSet<&str> = self.variables.iter().map(String::as_str).collect();
        self.fields
            .iter()
            .flat_map(Expr::free_symbols)
            .filter(|name| !state.contains(name.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn equilibria(&self) -> Result<&EquilibriumMatrix> {
        self.equilibria.as_ref().map_err(Clone::clone)
    }

    /// Classifies every equilibrium with the configured [`ComplexPolicy`].
    pub fn stability_analysis(&self) -> Result<Vec<StabilityRecord>> {
        self.stability_analysis_with(self.settings.complex_policy)
    }

    pub fn stability_analysis_with(&self, policy: ComplexPolicy) -> Result<Vec<StabilityRecord>> {
        let equilibria = self.equilibria()?;
        let records = analyze(
            &self.algebra,
            &self.jacobian,
            equilibria,
            &self.settings,
            policy,
        );
        for record in &records {
            log::info!("equilibrium {}: {}", record.index, record.label());
        }
        Ok(records)
    }

    /// Compiles F for numeric evaluation with `bindings` as runtime
    /// parameters. Every other free symbol must be a state variable.
    pub fn numeric_system(&self, bindings: &[(String, f64)]) -> Result<EquationSystem<f64>> {
        let mut names = Vec::with_capacity(bindings.len());
        let mut values = Vec::with_capacity(bindings.len());
        for (name, value) in bindings {
            if self.variables.contains(name) {
                return Err(DynamicsError::InvalidParameter {
                    name: name.clone(),
                    message: "is a state variable".to_string(),
                });
            }
            if names.contains(name) {
                return Err(DynamicsError::InvalidParameter {
                    name: name.clone(),
                    message: "is bound more than once".to_string(),
                });
            }
            names.push(name.clone());
            values.push(*value);
        }
        EquationSystem::compile(&self.fields, &self.variables, &names, values)
    }

    pub fn integrate(
        &self,
        bindings: &[(String, f64)],
        x0: &[f64],
        t0: f64,
        tn: f64,
        steps: usize,
    ) -> Result<Trajectory> {
        let system = self.numeric_system(bindings)?;
        integrate(&system, x0, t0, tn, steps)
    }

    /// Samples the field at the configured resolution. Without a
    /// `frozen_state`, only 2-dimensional models can be sampled.
    pub fn sample_field(
        &self,
        bindings: &[(String, f64)],
        axes: FieldAxes,
        rect: FieldRect,
        frozen_state: Option<&[f64]>,
    ) -> Result<FieldGrid> {
        let dim = self.dimension();
        let zeros;
        let frozen = match frozen_state {
            Some(state) => state,
            None if dim <= 2 => {
                zeros = vec![0.0; dim];
                &zeros
            }
            None => return Err(DynamicsError::UnboundState { dimension: dim }),
        };
        let system = self.numeric_system(bindings)?;
        sample_vector_field(&system, axes, rect, self.settings.field_resolution, frozen)
    }

    pub fn equilibrium_markers(&self, axes: FieldAxes) -> Result<Vec<EquilibriumMarker>> {
        equilibrium_markers(self.equilibria()?, axes)
    }
}

impl<A: ComputerAlgebra + Clone> SystemModel<A> {
    /// A new model with parameter symbols replaced by `mapping`.
    pub fn substitute_parameters(&self, mapping: &BTreeMap<String, Expr>) -> Result<Self> {
        if let Some(name) = mapping.keys().find(|name| self.variables.contains(name)) {
            return Err(DynamicsError::InvalidParameter {
                name: name.clone(),
                message: "is a state variable".to_string(),
            });
        }
        let fields = self
            .fields
            .iter()
            .map(|field| field.substitute_all(mapping))
            .collect();
        Self::with_algebra(
            self.algebra.clone(),
            fields,
            self.variables.clone(),
            self.settings,
        )
    }
}

fn validate_variables(fields: &[Expr], variables: &[String]) -> Result<()> {
    if variables.is_empty() && fields.is_empty() {
        return Err(DynamicsError::EmptySystem);
    }
    if fields.len() != variables.len() {
        return Err(DynamicsError::DimensionMismatch {
            expected: variables.len(),
            found: fields.len(),
        });
    }
    let mut seen = BTreeSet::new();
    for name in variables {
        if name.is_empty() {
            return Err(DynamicsError::InvalidInput(
                "state variable names must be non-empty".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(DynamicsError::DuplicateVariable(name.clone()));
        }
    }
    Ok(())
}
