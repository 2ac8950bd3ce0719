use crate::equilibrium::EquilibriumMatrix;
use crate::error::{DynamicsError, Result};
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};

/// Sampling rectangle in the plane of the two selected state variables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldRect {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Default for FieldRect {
    fn default() -> Self {
        Self {
            xmin: -10.0,
            xmax: 10.0,
            ymin: -10.0,
            ymax: 10.0,
        }
    }
}

/// State-variable indices plotted on the horizontal and vertical axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAxes {
    pub x_index: usize,
    pub y_index: usize,
}

impl Default for FieldAxes {
    fn default() -> Self {
        Self {
            x_index: 0,
            y_index: 1,
        }
    }
}

/// Vector components sampled on a regular grid.
///
/// `u` and `v` are row-major with `resolution` rows and columns: entry
/// `row * resolution + col` belongs to the node `(xs[col], ys[row])`.
/// Nodes where the field is undefined hold `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldGrid {
    pub rect: FieldRect,
    pub resolution: usize,
    pub axes: FieldAxes,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub u: Vec<Option<f64>>,
    pub v: Vec<Option<f64>>,
}

impl FieldGrid {
    /// Coordinates of the node at `(row, col)`.
    pub fn node(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        Some((*self.xs.get(col)?, *self.ys.get(row)?))
    }

    /// The sampled vector at `(row, col)`, if defined.
    pub fn vector(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        if row >= self.resolution || col >= self.resolution {
            return None;
        }
        let idx = row * self.resolution + col;
        Some((self.u[idx]?, self.v[idx]?))
    }

    pub fn undefined_count(&self) -> usize {
        self.u
            .iter()
            .zip(&self.v)
            .filter(|(u, v)| u.is_none() || v.is_none())
            .count()
    }

    /// Every `stride`-th row and column, starting at the first node.
    pub fn thinned(&self, stride: usize) -> FieldGrid {
        let stride = stride.max(1);
        let keep: Vec<usize> = (0..self.resolution).step_by(stride).collect();
        let mut u = Vec::with_capacity(keep.len() * keep.len());
        let mut v = Vec::with_capacity(keep.len() * keep.len());
        for &row in &keep {
            for &col in &keep {
                let idx = row * self.resolution + col;
                u.push(self.u[idx]);
                v.push(self.v[idx]);
            }
        }
        FieldGrid {
            rect: self.rect,
            resolution: keep.len(),
            axes: self.axes,
            xs: keep.iter().map(|&c| self.xs[c]).collect(),
            ys: keep.iter().map(|&r| self.ys[r]).collect(),
            u,
            v,
        }
    }
}

/// Projection of a real equilibrium onto the sampled plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquilibriumMarker {
    pub index: usize,
    pub x: f64,
    pub y: f64,
}

fn linspace(min: f64, max: f64, samples: usize) -> Vec<f64> {
    let denom = (samples - 1) as f64;
    (0..samples)
        .map(|k| {
            if k + 1 == samples {
                max
            } else {
                min + (max - min) * (k as f64 / denom)
            }
        })
        .collect()
}

fn validate_axes(axes: FieldAxes, dim: usize) -> Result<()> {
    for index in [axes.x_index, axes.y_index] {
        if index >= dim {
            return Err(DynamicsError::InvalidInput(format!(
                "Axis variable index {index} out of range."
            )));
        }
    }
    if axes.x_index == axes.y_index {
        return Err(DynamicsError::InvalidInput(
            "Axis variable indices must be unique.".to_string(),
        ));
    }
    Ok(())
}

/// Samples components `axes.x_index` and `axes.y_index` of `system` on a
/// `resolution` x `resolution` grid over `rect`. Every other state component
/// is taken from `frozen_state`.
pub fn sample_vector_field<S: DynamicalSystem<f64>>(
    system: &S,
    axes: FieldAxes,
    rect: FieldRect,
    resolution: usize,
    frozen_state: &[f64],
) -> Result<FieldGrid> {
    let dim = system.dimension();
    if dim < 2 {
        return Err(DynamicsError::InvalidInput(
            "Vector field sampling needs at least 2 state variables.".to_string(),
        ));
    }
    if frozen_state.len() != dim {
        return Err(DynamicsError::DimensionMismatch {
            expected: dim,
            found: frozen_state.len(),
        });
    }
    validate_axes(axes, dim)?;
    let bounds = [rect.xmin, rect.xmax, rect.ymin, rect.ymax];
    if bounds.iter().any(|b| !b.is_finite()) || rect.xmax <= rect.xmin || rect.ymax <= rect.ymin
    {
        return Err(DynamicsError::InvalidInput(
            "Each axis range must be finite with max > min.".to_string(),
        ));
    }
    if resolution < 2 {
        return Err(DynamicsError::InvalidInput(
            "Each axis needs at least 2 samples.".to_string(),
        ));
    }

    let xs = linspace(rect.xmin, rect.xmax, resolution);
    let ys = linspace(rect.ymin, rect.ymax, resolution);
    let mut u = Vec::with_capacity(resolution * resolution);
    let mut v = Vec::with_capacity(resolution * resolution);
    let mut state = frozen_state.to_vec();
    let mut out = vec![0.0; dim];

    for &y in &ys {
        for &x in &xs {
            state[axes.x_index] = x;
            state[axes.y_index] = y;
            match evaluate_node(system, axes, &state, &mut out, x, y) {
                Ok((du, dv)) => {
                    u.push(Some(du));
                    v.push(Some(dv));
                }
                Err(err) => {
                    log::trace!("{err}");
                    u.push(None);
                    v.push(None);
                }
            }
        }
    }

    let grid = FieldGrid {
        rect,
        resolution,
        axes,
        xs,
        ys,
        u,
        v,
    };
    let undefined = grid.undefined_count();
    if undefined > 0 {
        log::debug!("vector field undefined at {undefined} of {} nodes", resolution * resolution);
    }
    Ok(grid)
}

fn evaluate_node<S: DynamicalSystem<f64>>(
    system: &S,
    axes: FieldAxes,
    state: &[f64],
    out: &mut [f64],
    x: f64,
    y: f64,
) -> Result<(f64, f64)> {
    system.apply(0.0, state, out);
    let (du, dv) = (out[axes.x_index], out[axes.y_index]);
    if du.is_finite() && dv.is_finite() {
        Ok((du, dv))
    } else {
        Err(DynamicsError::SingularFieldSample { x, y })
    }
}

/// Real, fully numeric equilibria projected onto the `(x_index, y_index)`
/// plane. Complex or symbolic columns are skipped.
pub fn equilibrium_markers(
    matrix: &EquilibriumMatrix,
    axes: FieldAxes,
) -> Result<Vec<EquilibriumMarker>> {
    validate_axes(axes, matrix.dimension())?;
    Ok((0..matrix.len())
        .filter_map(|k| {
            let column = matrix.real_column(k)?;
            Some(EquilibriumMarker {
                index: k,
                x: column[axes.x_index],
                y: column[axes.y_index],
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::EquationSystem;
    use crate::symbolic::{parse, Expr};

    fn build_system_for_test(equations: &[&str], var_names: &[&str]) -> EquationSystem<f64> {
        let fields: Vec<Expr> = equations
            .iter()
            .map(|eq| parse(eq).expect("equation should parse"))
            .collect();
        let vars: Vec<String> = var_names.iter().map(|s| s.to_string()).collect();
        EquationSystem::compile(&fields, &vars, &[], Vec::new()).expect("compiles")
    }

    fn unit_rect() -> FieldRect {
        FieldRect {
            xmin: -1.0,
            xmax: 1.0,
            ymin: -1.0,
            ymax: 1.0,
        }
    }

    #[test]
    fn grid_includes_exact_corners() {
        let system = build_system_for_test(&["y", "-x"], &["x", "y"]);
        let grid = sample_vector_field(&system, FieldAxes::default(), unit_rect(), 3, &[0.0, 0.0])
            .expect("sampled");
        assert_eq!(grid.xs, vec![-1.0, 0.0, 1.0]);
        assert_eq!(grid.ys, vec![-1.0, 0.0, 1.0]);
        assert_eq!(grid.node(0, 0), Some((-1.0, -1.0)));
        assert_eq!(grid.node(2, 0), Some((-1.0, 1.0)));
        assert_eq!(grid.node(0, 2), Some((1.0, -1.0)));
        assert_eq!(grid.node(2, 2), Some((1.0, 1.0)));
        // Row = y index, column = x index.
        assert_eq!(grid.vector(2, 0), Some((1.0, 1.0)));
        assert_eq!(grid.vector(0, 2), Some((-1.0, -1.0)));
    }

    #[test]
    fn endpoints_are_exact_for_awkward_bounds() {
        let system = build_system_for_test(&["y", "-x"], &["x", "y"]);
        let rect = FieldRect {
            xmin: -0.3,
            xmax: 0.7,
            ymin: 0.1,
            ymax: 0.2,
        };
        let grid = sample_vector_field(&system, FieldAxes::default(), rect, 7, &[0.0, 0.0])
            .expect("sampled");
        assert_eq!(grid.xs.first(), Some(&-0.3));
        assert_eq!(grid.xs.last(), Some(&0.7));
        assert_eq!(grid.ys.first(), Some(&0.1));
        assert_eq!(grid.ys.last(), Some(&0.2));
        assert_eq!(grid.u.len(), 49);
    }

    #[test]
    fn singular_nodes_are_recorded_and_sampling_continues() {
        let system = build_system_for_test(&["1/x", "y"], &["x", "y"]);
        let grid = sample_vector_field(&system, FieldAxes::default(), unit_rect(), 3, &[0.0, 0.0])
            .expect("sampled");
        assert_eq!(grid.undefined_count(), 3);
        assert_eq!(grid.vector(1, 1), None);
        assert_eq!(grid.vector(1, 2), Some((1.0, 0.0)));
    }

    #[test]
    fn frozen_coordinates_feed_the_other_components() {
        let system = build_system_for_test(&["z", "x", "y"], &["x", "y", "z"]);
        let axes = FieldAxes {
            x_index: 2,
            y_index: 0,
        };
        let grid = sample_vector_field(&system, axes, unit_rect(), 2, &[0.0, 5.0, 0.0])
            .expect("sampled");
        // u = dz/dt = y (frozen at 5), v = dx/dt = z (the horizontal coordinate).
        assert_eq!(grid.vector(0, 0), Some((5.0, -1.0)));
        assert_eq!(grid.vector(1, 1), Some((5.0, 1.0)));
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let system = build_system_for_test(&["y", "-x"], &["x", "y"]);
        let axes = FieldAxes::default();
        let frozen = [0.0, 0.0];
        let bad_rect = FieldRect {
            xmax: -2.0,
            ..unit_rect()
        };
        assert!(sample_vector_field(&system, axes, unit_rect(), 1, &frozen).is_err());
        assert!(sample_vector_field(&system, axes, bad_rect, 5, &frozen).is_err());
        assert!(sample_vector_field(&system, axes, unit_rect(), 5, &[0.0]).is_err());
        let same = FieldAxes {
            x_index: 1,
            y_index: 1,
        };
        assert!(sample_vector_field(&system, same, unit_rect(), 5, &frozen).is_err());
        let out_of_range = FieldAxes {
            x_index: 0,
            y_index: 2,
        };
        assert!(sample_vector_field(&system, out_of_range, unit_rect(), 5, &frozen).is_err());
    }

    #[test]
    fn thinning_keeps_every_third_arrow() {
        let system = build_system_for_test(&["y", "-x"], &["x", "y"]);
        let grid = sample_vector_field(&system, FieldAxes::default(), FieldRect::default(), 50, &[0.0, 0.0])
            .expect("sampled");
        let thin = grid.thinned(3);
        assert_eq!(thin.resolution, 17);
        assert_eq!(thin.u.len(), 17 * 17);
        assert_eq!(thin.xs[1], grid.xs[3]);
        assert_eq!(thin.vector(1, 1), grid.vector(3, 3));
    }

    #[test]
    fn markers_skip_complex_and_symbolic_columns() {
        let matrix = EquilibriumMatrix::from_columns(
            vec!["x".to_string(), "y".to_string()],
            vec![
                vec![Expr::real(1.0), Expr::real(2.0)],
                vec![Expr::complex(0.0, 1.0), Expr::zero()],
                vec![Expr::symbol("y"), Expr::symbol("y")],
                vec![Expr::real(-3.0), Expr::real(0.5)],
            ],
        )
        .expect("matrix");
        let markers = equilibrium_markers(&matrix, FieldAxes::default()).expect("markers");
        assert_eq!(
            markers,
            vec![
                EquilibriumMarker {
                    index: 0,
                    x: 1.0,
                    y: 2.0
                },
                EquilibriumMarker {
                    index: 3,
                    x: -3.0,
                    y: 0.5
                },
            ]
        );
    }
}
