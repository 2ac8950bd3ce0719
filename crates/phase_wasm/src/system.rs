//! Browser-facing wrapper around [`SystemModel`].

use anyhow::{bail, Context};
use phase_core::equilibrium::ComplexNumber;
use phase_core::settings::AnalysisSettings;
use phase_core::symbolic::Expr;
use phase_core::trajectory::Trajectory;
use phase_core::vector_field::{EquilibriumMarker, FieldAxes, FieldGrid, FieldRect};
use phase_core::{DynamicsError, SystemModel};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::collections::BTreeMap;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmPhaseSystem {
    pub(crate) model: SystemModel,
}

/// One row of the stability table shown next to the phase portrait.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct StabilityRow {
    pub index: usize,
    pub point: Vec<String>,
    pub label: String,
    pub trace: String,
    pub determinant: String,
    pub valid: bool,
    pub eigenvalues: Option<Vec<ComplexNumber>>,
}

fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

fn serialize<T: Serialize>(value: &T, what: &str) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Failed to serialize {what}: {e}")))
}

impl WasmPhaseSystem {
    /// Parses the equations and binds every named parameter to its value.
    pub(crate) fn build(
        equations: &[String],
        var_names: &[String],
        param_names: &[String],
        param_values: &[f64],
        settings: AnalysisSettings,
    ) -> anyhow::Result<Self> {
        if param_names.len() != param_values.len() {
            bail!(
                "Parameter names ({}) and values ({}) must have the same length.",
                param_names.len(),
                param_values.len()
            );
        }
        let variables: Vec<String> = var_names.iter().map(|v| v.trim().to_string()).collect();
        let mut mapping = BTreeMap::new();
        for (name, &value) in param_names.iter().zip(param_values) {
            let name = name.trim().to_string();
            if variables.contains(&name) {
                return Err(DynamicsError::InvalidParameter {
                    name,
                    message: "is a state variable".to_string(),
                })
                .context("Failed to bind parameters");
            }
            mapping.insert(name, Expr::real(value));
        }

        let fields = equations
            .iter()
            .enumerate()
            .map(|(i, eq)| {
                let field = phase_core::symbolic::parse(eq)
                    .with_context(|| format!("equation {}", i + 1))?;
                Ok(field.substitute_all(&mapping))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let model = SystemModel::with_settings(fields, variables, settings)
            .context("Failed to build system")?;
        Ok(Self { model })
    }

    pub(crate) fn jacobian_strings(&self) -> Vec<Vec<String>> {
        self.model
            .jacobian()
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect()
    }

    pub(crate) fn equilibrium_strings(&self) -> anyhow::Result<Vec<Vec<String>>> {
        let matrix = self.model.equilibria().context("Failed to find equilibria")?;
        Ok(matrix.to_string_rows())
    }

    pub(crate) fn stability_rows(&self) -> anyhow::Result<Vec<StabilityRow>> {
        let records = self
            .model
            .stability_analysis()
            .context("Failed to classify equilibria")?;
        Ok(records
            .into_iter()
            .map(|record| StabilityRow {
                index: record.index,
                point: record.point.iter().map(ToString::to_string).collect(),
                label: record.label(),
                trace: record.trace.to_string(),
                determinant: record.determinant.to_string(),
                valid: record.valid,
                eigenvalues: record.eigenvalues,
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn field(
        &self,
        x_index: usize,
        y_index: usize,
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        frozen_state: Option<&[f64]>,
        stride: usize,
    ) -> anyhow::Result<FieldGrid> {
        let axes = FieldAxes { x_index, y_index };
        let rect = FieldRect {
            xmin,
            xmax,
            ymin,
            ymax,
        };
        let grid = self
            .model
            .sample_field(&[], axes, rect, frozen_state)
            .context("Failed to sample vector field")?;
        Ok(if stride > 1 { grid.thinned(stride) } else { grid })
    }

    pub(crate) fn markers(&self, x_index: usize, y_index: usize) -> anyhow::Result<Vec<EquilibriumMarker>> {
        self.model
            .equilibrium_markers(FieldAxes { x_index, y_index })
            .context("Failed to project equilibria")
    }

    pub(crate) fn trajectory(
        &self,
        x0: &[f64],
        t0: f64,
        tn: f64,
        steps: usize,
    ) -> anyhow::Result<Trajectory> {
        self.model
            .integrate(&[], x0, t0, tn, steps)
            .context("Failed to integrate trajectory")
    }
}

#[wasm_bindgen]
impl WasmPhaseSystem {
    /// `settings` may be `undefined`/`null` for defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        equations: Vec<String>,
        var_names: Vec<String>,
        param_names: Vec<String>,
        param_values: Vec<f64>,
        settings: JsValue,
    ) -> Result<WasmPhaseSystem, JsValue> {
        console_error_panic_hook::set_once();

        let settings: AnalysisSettings = if settings.is_undefined() || settings.is_null() {
            AnalysisSettings::default()
        } else {
            from_value(settings)
                .map_err(|e| JsValue::from_str(&format!("Invalid analysis settings: {}", e)))?
        };
        Self::build(&equations, &var_names, &param_names, &param_values, settings)
            .map_err(js_error)
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    /// Jacobian entries as strings, row-major.
    pub fn jacobian(&self) -> Result<JsValue, JsValue> {
        serialize(&self.jacobian_strings(), "Jacobian")
    }

    /// Symbols left unbound after parameter substitution.
    pub fn parameters(&self) -> Vec<String> {
        self.model.parameters()
    }

    /// Equilibrium matrix as strings: `rows[i][k]` is variable i of
    /// equilibrium k.
    pub fn equilibria(&self) -> Result<JsValue, JsValue> {
        let rows = self.equilibrium_strings().map_err(js_error)?;
        serialize(&rows, "equilibria")
    }

    pub fn stability_table(&self) -> Result<JsValue, JsValue> {
        let rows = self.stability_rows().map_err(js_error)?;
        serialize(&rows, "stability table")
    }

    /// Samples the field at the configured resolution, keeping every
    /// `stride`-th arrow (0 or 1 keeps all).
    #[allow(clippy::too_many_arguments)]
    pub fn sample_field(
        &self,
        x_index: usize,
        y_index: usize,
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        frozen_state: Option<Vec<f64>>,
        stride: usize,
    ) -> Result<JsValue, JsValue> {
        let grid = self
            .field(
                x_index,
                y_index,
                xmin,
                xmax,
                ymin,
                ymax,
                frozen_state.as_deref(),
                stride,
            )
            .map_err(js_error)?;
        serialize(&grid, "vector field")
    }

    pub fn equilibrium_markers(&self, x_index: usize, y_index: usize) -> Result<JsValue, JsValue> {
        let markers = self.markers(x_index, y_index).map_err(js_error)?;
        serialize(&markers, "equilibrium markers")
    }

    pub fn integrate(&self, x0: Vec<f64>, t0: f64, tn: f64, steps: usize) -> Result<JsValue, JsValue> {
        let trajectory = self.trajectory(&x0, t0, tn, steps).map_err(js_error)?;
        serialize(&trajectory, "trajectory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn default_system() -> WasmPhaseSystem {
        WasmPhaseSystem::build(
            &strings(&["a*x + b*y", "c*x + d*y"]),
            &strings(&["x", "y"]),
            &strings(&["a", "b", "c", "d"]),
            &[4.0, 3.0, 2.0, 1.0],
            AnalysisSettings::default(),
        )
        .expect("system should build")
    }

    #[test]
    fn default_form_values_give_a_saddle() {
        let system = default_system();
        assert!(system.model.parameters().is_empty());
        assert_eq!(
            system.jacobian_strings(),
            vec![vec!["4", "3"], vec!["2", "1"]]
        );
        let rows = system.stability_rows().expect("table");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].point, vec!["0", "0"]);
        assert_eq!(rows[0].label, "saddle point");
        assert_eq!(rows[0].determinant, "-2");
        assert!(rows[0].valid);
        assert_eq!(rows[0].eigenvalues.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn mismatched_parameter_lists_are_rejected() {
        let result = WasmPhaseSystem::build(
            &strings(&["a*x", "y"]),
            &strings(&["x", "y"]),
            &strings(&["a", "b"]),
            &[1.0],
            AnalysisSettings::default(),
        );
        let message = format!("{:#}", result.err().expect("should fail"));
        assert!(message.contains("must have the same length"));
    }

    #[test]
    fn parameters_are_bound_before_the_model_is_built() {
        let system = WasmPhaseSystem::build(
            &strings(&["y", "-b*x - a*y"]),
            &strings(&["x", "y"]),
            &strings(&["a", " b"]),
            &[0.15, 0.25],
            AnalysisSettings::default(),
        )
        .expect("system should build");
        assert!(system.model.parameters().is_empty());
        let symbols: Vec<String> = system.model.fields()[1].free_symbols().into_iter().collect();
        assert_eq!(symbols, vec!["x", "y"]);
        let rows = system.stability_rows().expect("table");
        assert_eq!(rows[0].label, "stable spiral");
    }

    #[test]
    fn binding_a_state_variable_is_rejected() {
        let result = WasmPhaseSystem::build(
            &strings(&["y", "-x"]),
            &strings(&["x", "y"]),
            &strings(&["x"]),
            &[1.0],
            AnalysisSettings::default(),
        );
        let message = format!("{:#}", result.err().expect("should fail"));
        assert!(message.contains("is a state variable"), "got '{message}'");
    }

    #[test]
    fn parse_errors_name_the_equation() {
        let result = WasmPhaseSystem::build(
            &strings(&["y", "-x +"]),
            &strings(&["x", "y"]),
            &[],
            &[],
            AnalysisSettings::default(),
        );
        let message = format!("{:#}", result.err().expect("should fail"));
        assert!(message.starts_with("equation 2"), "got '{message}'");
    }

    #[test]
    fn field_and_trajectory_use_bound_parameters() {
        let system = default_system();
        let grid = system
            .field(0, 1, -1.0, 1.0, -1.0, 1.0, None, 3)
            .expect("field");
        assert_eq!(grid.resolution, 17);
        // At (-1, -1): u = 4x + 3y = -7, v = 2x + y = -3.
        assert_eq!(grid.vector(0, 0), Some((-7.0, -3.0)));

        let trajectory = system.trajectory(&[0.0, 0.0], 0.0, 1.0, 10).expect("trajectory");
        assert_eq!(trajectory.len(), 11);
        assert_eq!(trajectory.last_state(), Some(&[0.0, 0.0][..]));

        let markers = system.markers(0, 1).expect("markers");
        assert_eq!(markers.len(), 1);
        assert_eq!((markers[0].x, markers[0].y), (0.0, 0.0));
    }

    #[test]
    fn unsolvable_system_reports_context() {
        let system = WasmPhaseSystem::build(
            &strings(&["1", "y"]),
            &strings(&["x", "y"]),
            &[],
            &[],
            AnalysisSettings::default(),
        )
        .expect("builds");
        let message = format!("{:#}", system.stability_rows().err().expect("no equilibria"));
        assert!(message.starts_with("Failed to classify equilibria"));
        assert!(message.contains("Unsolvable system"));
    }

    #[wasm_bindgen_test]
    fn constructor_accepts_missing_settings() {
        let system = WasmPhaseSystem::new(
            strings(&["y", "-sin(x)"]),
            strings(&["x", "y"]),
            Vec::new(),
            Vec::new(),
            JsValue::UNDEFINED,
        )
        .expect("system");
        assert_eq!(system.dimension(), 2);
        assert!(system.stability_table().is_ok());
        assert!(system.sample_field(0, 1, -10.0, 10.0, -10.0, 10.0, None, 3).is_ok());
    }

    #[wasm_bindgen_test]
    fn constructor_reports_errors_as_strings() {
        let result = WasmPhaseSystem::new(
            strings(&["x", "y"]),
            strings(&["x"]),
            Vec::new(),
            Vec::new(),
            JsValue::NULL,
        );
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Dimension mismatch"), "got '{message}'");
    }

    #[wasm_bindgen_test]
    fn settings_are_read_from_a_js_object() {
        let settings = AnalysisSettings {
            field_resolution: 5,
            ..AnalysisSettings::default()
        };
        let system = WasmPhaseSystem::new(
            strings(&["y", "-x"]),
            strings(&["x", "y"]),
            Vec::new(),
            Vec::new(),
            to_value(&settings).expect("settings"),
        )
        .expect("system");
        let grid = system
            .field(0, 1, -1.0, 1.0, -1.0, 1.0, None, 1)
            .expect("field");
        assert_eq!(grid.resolution, 5);
    }
}
