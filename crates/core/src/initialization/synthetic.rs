//! Synthetic column provider
//!
//! Builds a small set of template columns (surface temperature, moisture and
//! convective activity vary between templates) and tiles them across the grid.
//! An optional seeded perturbation makes every column distinct while staying
//! reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use super::StateProvider;
use crate::core_types::schema::{ElementType, STATE_SCHEMA};
use crate::core_types::{Field, StateBundle};
use crate::error::CloudscResult;
use crate::field_spec;
use crate::grid::ComputationalGrid;

// Tetens saturation over water
const ES0: f64 = 611.21;
const ES_A: f64 = 17.502;
const ES_B: f64 = 32.19;
const T_TRIPLE: f64 = 273.16;
const EPS: f64 = 0.621981;

/// Dry-adiabatic lapse exponent `R Gamma / g` of the standard atmosphere
const LAPSE_EXPONENT: f64 = 0.190263;
const T_STRATOSPHERE: f64 = 216.65;
const P_SURFACE: f64 = 101_325.0;

/// One template column, keyed by state field name
#[derive(Debug, Clone)]
struct TemplateColumn {
    floats: FxHashMap<&'static str, Vec<f64>>,
    convection_on: bool,
    convection_type: i32,
}

/// Physically plausible multi-level columns without input files
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticColumns {
    templates: usize,
    perturbation: f64,
    seed: u64,
}

impl Default for SyntheticColumns {
    fn default() -> Self {
        Self {
            templates: 4,
            perturbation: 0.0,
            seed: 0,
        }
    }
}

impl SyntheticColumns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct template columns (at least 1)
    #[must_use]
    pub fn with_templates(mut self, templates: usize) -> Self {
        self.templates = templates.max(1);
        self
    }

    /// Scale every prognostic value by `1 + amplitude * u`, `u` uniform in `[-1, 1]`
    #[must_use]
    pub fn with_perturbation(mut self, amplitude: f64, seed: u64) -> Self {
        self.perturbation = amplitude.abs();
        self.seed = seed;
        self
    }

    fn template(j: usize, nz: usize) -> TemplateColumn {
        let convective = j % 2 == 1;
        let t_surface = 300.0 - 8.0 * j as f64;
        let rh_surface = 0.85 - 0.05 * (j % 3) as f64;

        let aph: Vec<f64> = (0..=nz)
            .map(|k| P_SURFACE * (k as f64 / nz as f64).powf(1.3))
            .collect();
        let ap: Vec<f64> = (0..nz).map(|k| 0.5 * (aph[k] + aph[k + 1])).collect();

        let mut floats: FxHashMap<&'static str, Vec<f64>> = FxHashMap::default();
        let mut level = |name: &'static str, f: &dyn Fn(usize, f64, f64) -> f64| {
            let values = (0..nz)
                .map(|k| {
                    let sigma = ap[k] / P_SURFACE;
                    let t = (t_surface * sigma.powf(LAPSE_EXPONENT)).max(T_STRATOSPHERE);
                    f(k, sigma, t)
                })
                .collect();
            floats.insert(name, values);
        };

        let in_cloud = |sigma: f64| (0.55..0.8).contains(&sigma);
        let qsat = |t: f64, p: f64| {
            let es = ES0 * (ES_A * (t - T_TRIPLE) / (t - ES_B)).exp();
            (EPS * es / p).min(0.5)
        };

        level("f_t", &|_, _, t| t);
        level("f_ap", &|k, _, _| ap[k]);
        level("f_qv", &|k, sigma, t| {
            if sigma < 0.15 {
                3.0e-6
            } else {
                let rh = if in_cloud(sigma) { 1.0 } else { rh_surface * sigma };
                (rh * qsat(t, ap[k])).min(0.02)
            }
        });
        level("f_a", &|_, sigma, _| if in_cloud(sigma) { 0.6 } else { 0.0 });
        level("f_ql", &|_, sigma, t| {
            if in_cloud(sigma) && t > 250.0 {
                1.0e-4
            } else {
                0.0
            }
        });
        level("f_qi", &|_, sigma, t| {
            if in_cloud(sigma) && t < T_TRIPLE {
                5.0e-5
            } else {
                0.0
            }
        });
        level("f_qr", &|_, sigma, t| {
            if sigma >= 0.55 && t > T_TRIPLE {
                2.0e-5
            } else {
                0.0
            }
        });
        level("f_qs", &|_, sigma, t| {
            if sigma >= 0.4 && t <= T_TRIPLE {
                1.0e-5
            } else {
                0.0
            }
        });
        level("f_w", &|_, sigma, _| if in_cloud(sigma) { -0.5 } else { 0.05 });
        level("f_hrlw", &|_, _, _| -2.0e-5);
        level("f_hrsw", &|_, _, _| 1.0e-5);
        level("f_ccn", &|_, _, _| 100.0);
        level("f_nice", &|_, _, _| 50.0);
        level("f_re_ice", &|_, _, _| 30.0);
        level("f_tnd_tmp_t", &|_, _, _| 1.0e-5);
        level("f_tnd_tmp_qv", &|_, _, _| -1.0e-8);
        level("f_vfl", &|_, sigma, _| if in_cloud(sigma) { 1.0e-9 } else { 0.0 });
        level("f_vfi", &|_, sigma, _| if in_cloud(sigma) { 5.0e-10 } else { 0.0 });
        level("f_lu", &|_, sigma, _| {
            if convective && sigma > 0.5 {
                1.0e-4
            } else {
                0.0
            }
        });
        level("f_lude", &|_, sigma, _| {
            if convective && (0.5..0.7).contains(&sigma) {
                5.0e-6
            } else {
                0.0
            }
        });
        level("f_mfu", &|_, sigma, _| if convective && sigma > 0.3 { 0.05 } else { 0.0 });
        level("f_mfd", &|_, sigma, _| if convective && sigma > 0.6 { -0.02 } else { 0.0 });

        floats.insert("f_aph", aph);
        floats.insert("f_lsm", vec![if j % 2 == 0 { 0.0 } else { 1.0 }]);

        TemplateColumn {
            floats,
            convection_on: convective,
            convection_type: i32::from(convective),
        }
    }

    fn perturb(&self, state: &mut StateBundle) {
        if self.perturbation == 0.0 {
            return;
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let amp = self.perturbation;
        for i in 0..state.t.columns() {
            for k in 0..state.t.levels() {
                let mut scale = || 1.0 + amp * rng.random_range(-1.0..=1.0);
                state.t.set(i, k, state.t.get(i, k) * (1.0 + 0.01 * (scale() - 1.0)));
                state.a.set(i, k, (state.a.get(i, k) * scale()).clamp(0.0, 1.0));
                for field in [
                    &mut state.qv,
                    &mut state.ql,
                    &mut state.qi,
                    &mut state.qr,
                    &mut state.qs,
                ] {
                    let value = (field.get(i, k) * scale()).max(0.0);
                    field.set(i, k, value);
                }
            }
        }
    }
}

/// Row-major `(nx, nk)` array repeating `templates` across the columns
///
/// Template `j` fills columns `j, j + m, j + 2m, ...`. Templates longer than `nk` are
/// truncated, shorter ones leave the remaining levels at zero.
fn tile(templates: &[&[f64]], nx: usize, nk: usize) -> Vec<f64> {
    let mut data = vec![0.0; nx * nk];
    for (i, column) in data.chunks_mut(nk).enumerate() {
        let template = templates[i % templates.len()];
        let depth = nk.min(template.len());
        column[..depth].copy_from_slice(&template[..depth]);
    }
    data
}

impl StateProvider for SyntheticColumns {
    fn state(&self, grid: &ComputationalGrid) -> CloudscResult<StateBundle> {
        let nz = grid.nz();
        let templates: Vec<TemplateColumn> =
            (0..self.templates).map(|j| Self::template(j, nz)).collect();
        let mut state = StateBundle::zeros(grid);

        for spec in STATE_SCHEMA
            .iter()
            .filter(|spec| spec.element == ElementType::Float)
        {
            let columns: Vec<&[f64]> = templates
                .iter()
                .filter_map(|template| template.floats.get(spec.name).map(Vec::as_slice))
                .collect();
            if columns.is_empty() {
                continue;
            }
            let (nx, ny, nk) = grid.shape(spec.placement);
            let shape = [nx, ny, nk];
            let data = tile(&columns, nx, nk);
            state.load(grid, spec.name, &shape[..spec.placement.rank()], data)?;
        }

        let m = templates.len();
        state.convection_on = Field::from_fn(
            grid,
            field_spec!(STATE_SCHEMA, "b_convection_on"),
            |i, _| templates[i % m].convection_on,
        );
        state.convection_type = Field::from_fn(
            grid,
            field_spec!(STATE_SCHEMA, "i_convection_type"),
            |i, _| templates[i % m].convection_type,
        );

        self.perturb(&mut state);
        Ok(state)
    }
}
