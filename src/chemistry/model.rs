//! The chemistry model: per-cell reaction-rate evaluation and sub-cycled
//! integration over the (optionally reduced) mechanism.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Deserialize;

use super::network::ReactionNetwork;
use super::ode::{integrate, ReducedSystem, SubCycleControls, SubCycleStats};
use super::reduction::{
    create_reduction_method, CellReduction, ReductionConfig, ReductionMethod, ReductionScratch,
};
use crate::discretization::mesh::Mesh;
use crate::error::{ChemistryError, ConfigError, TopologyError};
use crate::field::VolField;

fn default_initial_chemical_dt() -> f64 {
    1e-7
}
fn default_max_chemical_dt() -> f64 {
    1.0
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChemistryConfig {
    /// Starting sub-step for cells with no integration history.
    #[serde(default = "default_initial_chemical_dt")]
    pub initial_chemical_dt: f64,
    /// Cap on the characteristic chemical time fed back to time-step
    /// control.
    #[serde(default = "default_max_chemical_dt")]
    pub max_chemical_dt: f64,
    pub reduction: ReductionConfig,
    #[serde(default)]
    pub ode: SubCycleControls,
}

/// Accumulated reduction/integration diagnostics, exposed as plain
/// numeric series for the logging collaborator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReductionStats {
    pub sum_active: u64,
    pub samples: u64,
    pub reduce_time: Duration,
    pub integrate_time: Duration,
}

impl ReductionStats {
    pub fn mean_active_species(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum_active as f64 / self.samples as f64
    }
}

struct CellOutcome {
    cell: usize,
    c_new: Vec<f64>,
    stats: SubCycleStats,
    n_active: usize,
    reduce_time: Duration,
    integrate_time: Duration,
}

/// Reaction-rate evaluation and composition integration over every cell.
///
/// `correct` refreshes the instantaneous net production/consumption rate
/// fields and the heat release; `solve` advances the composition through
/// the stiff sub-cycler and returns the achieved characteristic chemical
/// time for the caller's time-step control.
pub struct ChemistryModel {
    network: Arc<ReactionNetwork>,
    method: Box<dyn ReductionMethod>,
    ode_controls: SubCycleControls,
    initial_chemical_dt: f64,
    max_chemical_dt: f64,

    /// Molar concentration per species, kmol/m^3.
    pub concentrations: Vec<VolField<f64>>,
    pub temperature: VolField<f64>,
    pub pressure: VolField<f64>,

    /// Net mass production rate per species, kg/(m^3 s).
    rr: Vec<Vec<f64>>,
    /// Heat release, W/m^3.
    qdot: Vec<f64>,
    /// Per-cell latest integration step estimate.
    delta_t_chem: Vec<f64>,
    /// Per-cell active species count from the last reduction.
    n_active: Vec<usize>,

    stats: ReductionStats,
}

impl ChemistryModel {
    pub fn new(
        config: &ChemistryConfig,
        network: Arc<ReactionNetwork>,
        mesh: &Mesh,
        concentrations: Vec<VolField<f64>>,
        temperature: VolField<f64>,
        pressure: VolField<f64>,
    ) -> Result<Self, ConfigError> {
        if concentrations.len() != network.n_species() {
            return Err(ConfigError::BadValue {
                context: "chemistry".to_string(),
                key: "concentrations".to_string(),
                reason: format!(
                    "{} fields for {} species",
                    concentrations.len(),
                    network.n_species()
                ),
            });
        }
        if config.initial_chemical_dt <= 0.0 || config.max_chemical_dt <= 0.0 {
            return Err(ConfigError::BadValue {
                context: "chemistry".to_string(),
                key: "initialChemicalDt".to_string(),
                reason: "chemical time steps must be positive".to_string(),
            });
        }

        let method = create_reduction_method(&config.reduction, &network)?;
        log::info!(
            "chemistry model: {} species, {} reactions, reduction '{}'",
            network.n_species(),
            network.n_reactions(),
            config.reduction.method
        );

        let n_cells = mesh.n_cells();
        Ok(Self {
            method,
            ode_controls: config.ode,
            initial_chemical_dt: config.initial_chemical_dt,
            max_chemical_dt: config.max_chemical_dt,
            concentrations,
            temperature,
            pressure,
            rr: vec![vec![0.0; n_cells]; network.n_species()],
            qdot: vec![0.0; n_cells],
            delta_t_chem: vec![config.initial_chemical_dt; n_cells],
            n_active: vec![network.n_species(); n_cells],
            stats: ReductionStats::default(),
            network,
        })
    }

    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    /// Net mass production rate of one species, kg/(m^3 s).
    pub fn rr(&self, specie: usize) -> &[f64] {
        &self.rr[specie]
    }

    /// Heat release field, W/m^3.
    pub fn qdot(&self) -> &[f64] {
        &self.qdot
    }

    /// Latest per-cell integration step estimates.
    pub fn delta_t_chem(&self) -> &[f64] {
        &self.delta_t_chem
    }

    /// Per-cell active species counts from the last `solve`.
    pub fn n_active_species(&self) -> &[usize] {
        &self.n_active
    }

    pub fn reduction_stats(&self) -> &ReductionStats {
        &self.stats
    }

    fn validate(&self, mesh: &Mesh) -> Result<(), TopologyError> {
        for field in &self.concentrations {
            field.validate(mesh)?;
        }
        self.temperature.validate(mesh)?;
        self.pressure.validate(mesh)?;
        mesh.check_cell_array("qdot", self.qdot.len())?;
        Ok(())
    }

    /// Evaluate instantaneous reaction rates at the current state:
    /// refreshes the per-species mass source fields and the heat release.
    pub fn correct(&mut self, mesh: &Mesh) -> Result<(), TopologyError> {
        self.validate(mesh)?;
        let ns = self.network.n_species();
        let mut c = vec![0.0; ns];
        let mut molar_rates = vec![0.0; ns];

        for cell in 0..mesh.n_cells() {
            for (i, field) in self.concentrations.iter().enumerate() {
                c[i] = field.internal[cell];
            }
            let p = self.pressure.internal[cell];
            let temp = self.temperature.internal[cell];

            self.network
                .net_rates(p, temp, cell, |i| c[i], |_| true, &mut molar_rates);

            let mut q = 0.0;
            for (i, specie) in self.network.species().iter().enumerate() {
                let mass_rate = molar_rates[i] * specie.molar_mass;
                self.rr[i][cell] = mass_rate;
                q -= mass_rate * specie.h_formation;
            }
            self.qdot[cell] = q;
        }
        Ok(())
    }

    /// Mass production rate of one species by one reaction alone,
    /// kg/(m^3 s) per cell; a diagnostic accessor.
    pub fn reaction_rate_of(&self, reaction: usize, specie: usize, mesh: &Mesh) -> Vec<f64> {
        let ns = self.network.n_species();
        let mut c = vec![0.0; ns];
        let mut out = vec![0.0; mesh.n_cells()];
        let r = &self.network.reactions()[reaction];
        let w_i = self.network.species()[specie].molar_mass;

        for cell in 0..mesh.n_cells() {
            for (i, field) in self.concentrations.iter().enumerate() {
                c[i] = field.internal[cell];
            }
            let w: f64 = r.omega(
                self.pressure.internal[cell],
                self.temperature.internal[cell],
                cell,
                |i| c[i],
            );
            let mut nu = 0.0;
            for sc in &r.lhs {
                if sc.index == specie {
                    nu -= sc.stoich;
                }
            }
            for sc in &r.rhs {
                if sc.index == specie {
                    nu += sc.stoich;
                }
            }
            out[cell] = nu * w * w_i;
        }
        out
    }

    /// Integrate the composition over `dt` cell by cell: reduce the
    /// mechanism, sub-cycle the reduced system, and turn the integrated
    /// change into the per-species mass source fields. The concentration
    /// fields themselves are left to the transport equations that consume
    /// those sources. Returns the achieved characteristic chemical time
    /// (smallest stable sub-step over the mesh, capped by
    /// `maxChemicalDt`).
    pub fn solve(&mut self, mesh: &Mesh, dt: f64) -> Result<f64, ChemistryError> {
        self.validate(mesh)?;

        let network: &ReactionNetwork = &self.network;
        let method = self.method.as_ref();
        let controls = &self.ode_controls;
        let concentrations = &self.concentrations;
        let temperature = &self.temperature;
        let pressure = &self.pressure;
        let delta_t_chem = &self.delta_t_chem;

        let outcomes: Result<Vec<CellOutcome>, ChemistryError> = (0..mesh.n_cells())
            .into_par_iter()
            .map_init(
                || {
                    (
                        ReductionScratch::new(network),
                        CellReduction::sized(network),
                        vec![0.0; network.n_species()],
                    )
                },
                |(scratch, reduction, c), cell| {
                    for (i, field) in concentrations.iter().enumerate() {
                        c[i] = field.internal[cell];
                    }
                    let p = pressure.internal[cell];
                    let temp = temperature.internal[cell];

                    let reduce_start = Instant::now();
                    method.reduce(network, p, temp, c, cell, scratch, reduction);
                    let reduce_time = reduce_start.elapsed();

                    let sys = ReducedSystem {
                        network,
                        reduction,
                        p,
                        temp,
                        cell,
                    };
                    let mut sc = reduction.c_reduced.clone();
                    let integrate_start = Instant::now();
                    let stats = integrate(
                        &sys,
                        &mut sc,
                        dt,
                        delta_t_chem[cell].min(dt),
                        controls,
                    )?;
                    let integrate_time = integrate_start.elapsed();

                    // scatter: inactive species keep their composition
                    let mut c_new = c.clone();
                    for (j, &i) in reduction.reduced_to_full.iter().enumerate() {
                        c_new[i] = sc[j];
                    }

                    Ok(CellOutcome {
                        cell,
                        c_new,
                        stats,
                        n_active: reduction.n_active,
                        reduce_time,
                        integrate_time,
                    })
                },
            )
            .collect();
        let outcomes = outcomes?;

        let mut min_dt = self.max_chemical_dt;
        for outcome in outcomes {
            let cell = outcome.cell;
            let mut q = 0.0;
            for (i, specie) in self.network.species().iter().enumerate() {
                let c_old = self.concentrations[i].internal[cell];
                let c_new = outcome.c_new[i];
                let mass_rate = (c_new - c_old) / dt * specie.molar_mass;
                self.rr[i][cell] = mass_rate;
                q -= mass_rate * specie.h_formation;
            }
            self.qdot[cell] = q;

            let achieved = outcome.stats.min_step.min(self.max_chemical_dt);
            self.delta_t_chem[cell] = achieved.max(self.ode_controls.dt_min);
            self.n_active[cell] = outcome.n_active;
            min_dt = min_dt.min(achieved);

            self.stats.sum_active += outcome.n_active as u64;
            self.stats.samples += 1;
            self.stats.reduce_time += outcome.reduce_time;
            self.stats.integrate_time += outcome.integrate_time;
        }

        Ok(min_dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::network::{Reaction, Specie, SpecieCoeff};
    use crate::chemistry::rates::{ArrheniusRate, RateLaw};
    use crate::discretization::generator::line_mesh;

    fn reversible_network() -> Arc<ReactionNetwork> {
        Arc::new(
            ReactionNetwork::new(
                vec![
                    Specie {
                        name: "A".to_string(),
                        molar_mass: 30.0,
                        h_formation: 0.0,
                    },
                    Specie {
                        name: "B".to_string(),
                        molar_mass: 30.0,
                        h_formation: -2.0e6,
                    },
                ],
                vec![Reaction {
                    lhs: vec![SpecieCoeff {
                        index: 0,
                        stoich: 1.0,
                        exponent: 1.0,
                    }],
                    rhs: vec![SpecieCoeff {
                        index: 1,
                        stoich: 1.0,
                        exponent: 1.0,
                    }],
                    forward: RateLaw::Arrhenius(ArrheniusRate::new(100.0, 0.0, 0.0)),
                    reverse: Some(RateLaw::Arrhenius(ArrheniusRate::new(25.0, 0.0, 0.0))),
                }],
            )
            .unwrap(),
        )
    }

    fn model_on(mesh: &Mesh, method: &str) -> ChemistryModel {
        let network = reversible_network();
        let config = ChemistryConfig {
            initial_chemical_dt: 1e-5,
            max_chemical_dt: 1.0,
            reduction: ReductionConfig {
                method: method.to_string(),
                tolerance: 1e-3,
                initial_set: vec!["A".to_string()],
            },
            ode: SubCycleControls::default(),
        };
        let a = VolField::new("A", mesh, 1.0);
        let b = VolField::new("B", mesh, 0.0);
        let t = VolField::new("T", mesh, 1000.0);
        let p = VolField::new("p", mesh, 1e5);
        ChemistryModel::new(&config, network, mesh, vec![a, b], t, p).unwrap()
    }

    #[test]
    fn solve_reports_rates_that_reach_equilibrium() {
        let mesh = line_mesh(1.0, 4);
        let mut model = model_on(&mesh, "pathFluxAnalysis");

        let dt = 1.0;
        let achieved = model.solve(&mesh, dt).unwrap();
        assert!(achieved > 0.0);

        // kf/kr = 4, so the integrated change implies cB/cA -> 4; the
        // molar mass cancels out of the implied concentrations
        let w = 30.0;
        for cell in 0..4 {
            let a = model.concentrations[0].internal[cell] + model.rr(0)[cell] / w * dt;
            let b = model.concentrations[1].internal[cell] + model.rr(1)[cell] / w * dt;
            assert!((a + b - 1.0).abs() < 1e-6);
            assert!((b / a - 4.0).abs() < 1e-2, "b/a = {}", b / a);
        }
        assert_eq!(model.n_active_species()[0], 2);
    }

    #[test]
    fn correct_reports_instantaneous_rates_and_heat_release() {
        let mesh = line_mesh(1.0, 2);
        let mut model = model_on(&mesh, "none");
        model.correct(&mesh).unwrap();

        // net molar rate = kf * cA = 100, mass rate = 100 * 30
        assert!((model.rr(1)[0] - 3000.0).abs() < 1e-9);
        assert!((model.rr(0)[0] + 3000.0).abs() < 1e-9);
        // exothermic: B carries negative formation enthalpy
        assert!(model.qdot()[0] > 0.0);
    }

    #[test]
    fn characteristic_time_is_capped_and_positive() {
        let mesh = line_mesh(1.0, 2);
        let mut model = model_on(&mesh, "none");
        let achieved = model.solve(&mesh, 1e-3).unwrap();
        assert!(achieved > 0.0);
        assert!(achieved <= 1.0);
    }
}
