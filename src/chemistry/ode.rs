//! Adaptive sub-cycled integration of the reduced chemical system.
//!
//! Semi-implicit (linearized backward-Euler) steps with a step-doubling
//! error estimate: each trial interval is taken once at `dt` and again as
//! two halves, and the discrepancy drives acceptance and the next step
//! size. A step producing a negative concentration or an error above
//! tolerance is rejected and retried at half the size; falling below the
//! minimum-step floor is a stiff-integration failure surfaced to the
//! caller, never silently clamped.

use nalgebra::{DMatrix, DVector, Dyn, U1};
use num_dual::{Derivative, DualDVec64};
use serde::Deserialize;

use super::network::ReactionNetwork;
use super::reduction::CellReduction;
use super::VSMALL;
use crate::error::ChemistryError;

fn default_rel_tol() -> f64 {
    1e-4
}
fn default_abs_tol() -> f64 {
    1e-12
}
fn default_dt_min() -> f64 {
    1e-14
}
fn default_max_growth() -> f64 {
    2.0
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubCycleControls {
    pub rel_tol: f64,
    pub abs_tol: f64,
    /// Absolute floor on the sub-step; undershooting it is fatal.
    pub dt_min: f64,
    /// Cap on step growth after an accepted step.
    pub max_growth: f64,
}

impl Default for SubCycleControls {
    fn default() -> Self {
        Self {
            rel_tol: default_rel_tol(),
            abs_tol: default_abs_tol(),
            dt_min: default_dt_min(),
            max_growth: default_max_growth(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SubCycleStats {
    /// Smallest accepted sub-step: the characteristic chemical time.
    pub min_step: f64,
    pub steps: usize,
    pub rejects: usize,
}

/// The reduced chemical ODE for one cell: rates and Jacobian over the
/// active species at fixed temperature and pressure.
pub struct ReducedSystem<'a> {
    pub network: &'a ReactionNetwork,
    pub reduction: &'a CellReduction,
    pub p: f64,
    pub temp: f64,
    pub cell: usize,
}

impl ReducedSystem<'_> {
    pub fn n(&self) -> usize {
        self.reduction.n_active
    }

    /// `dc/dt` over the reduced composition. Disabled reactions are
    /// skipped; a pruned species referenced only through a rate law (not
    /// stoichiometry) reads as zero concentration.
    pub fn dcdt(&self, c: &[DualDVec64], out: &mut [DualDVec64]) {
        let map = &self.reduction.full_to_reduced;
        let disabled = &self.reduction.reactions_disabled;
        let c_of = |i: usize| {
            let j = map[i];
            if j < 0 {
                DualDVec64::from_re(0.0)
            } else {
                c[j as usize].clone()
            }
        };
        let mut full_rates = vec![DualDVec64::from_re(0.0); self.network.n_species()];
        self.network.net_rates(
            self.p,
            self.temp,
            self.cell,
            c_of,
            |ri| !disabled[ri],
            &mut full_rates,
        );
        for (j, &i) in self.reduction.reduced_to_full.iter().enumerate() {
            out[j] = full_rates[i].clone();
        }
    }

    /// One linearized backward-Euler step: solve `(I - h J) delta = h w`
    /// and return `c + delta`. `None` when the linearization is singular.
    fn step(&self, c: &[f64], h: f64) -> Option<Vec<f64>> {
        let n = self.n();
        if n == 0 {
            return Some(Vec::new());
        }

        // seed one dual direction per active species
        let duals: Vec<DualDVec64> = (0..n)
            .map(|j| DualDVec64::new(c[j], Derivative::derivative_generic(Dyn(n), U1, j)))
            .collect();
        let mut rate = vec![DualDVec64::from_re(0.0); n];
        self.dcdt(&duals, &mut rate);

        let mut m = DMatrix::<f64>::identity(n, n);
        let mut b = DVector::<f64>::zeros(n);
        for i in 0..n {
            b[i] = h * rate[i].re;
            let eps = rate[i].eps.clone().unwrap_generic(Dyn(n), U1);
            for j in 0..n {
                m[(i, j)] -= h * eps[(j, 0)];
            }
        }

        let delta = m.lu().solve(&b)?;
        Some((0..n).map(|j| c[j] + delta[j]).collect())
    }
}

/// Advance the active entries of `c` (`[c_active.., T, p]`) over
/// `interval`, starting from the sub-step `dt_start`. Returns the step
/// statistics; the smallest accepted step feeds time-step control.
pub fn integrate(
    sys: &ReducedSystem,
    c: &mut [f64],
    interval: f64,
    dt_start: f64,
    controls: &SubCycleControls,
) -> Result<SubCycleStats, ChemistryError> {
    let n = sys.n();
    let mut stats = SubCycleStats {
        min_step: interval,
        steps: 0,
        rejects: 0,
    };
    if n == 0 || interval <= 0.0 {
        return Ok(stats);
    }

    let mut t = 0.0;
    let mut dt = dt_start.clamp(controls.dt_min, interval);

    while t < interval * (1.0 - 1e-12) {
        dt = dt.min(interval - t);

        let attempt = sys
            .step(&c[..n], dt)
            .and_then(|full| {
                let h1 = sys.step(&c[..n], 0.5 * dt)?;
                let h2 = sys.step(&h1, 0.5 * dt)?;
                Some((full, h2))
            })
            .filter(|(full, half)| {
                full.iter().chain(half.iter()).all(|v| v.is_finite())
            });

        let accepted = attempt.and_then(|(full, mut half)| {
            // physical realizability: no negative concentration survives a
            // sub-step; machine-noise negatives snap to zero
            for v in &mut half {
                if *v < 0.0 {
                    if *v > -VSMALL {
                        *v = 0.0;
                    } else {
                        return None;
                    }
                }
            }

            let mut err: f64 = 0.0;
            for j in 0..n {
                let scale = controls.abs_tol + controls.rel_tol * half[j].abs().max(c[j].abs());
                err = err.max((full[j] - half[j]).abs() / scale);
            }
            if err > 1.0 {
                return None;
            }
            Some((half, err))
        });

        match accepted {
            Some((next, err)) => {
                c[..n].copy_from_slice(&next);
                t += dt;
                stats.steps += 1;
                stats.min_step = stats.min_step.min(dt);

                let growth = if err > 0.0 {
                    (0.9 / err.sqrt()).clamp(0.3, controls.max_growth)
                } else {
                    controls.max_growth
                };
                dt *= growth;
            }
            None => {
                stats.rejects += 1;
                dt *= 0.5;
                if dt < controls.dt_min {
                    return Err(ChemistryError::StepUnderflow {
                        cell: sys.cell,
                        t,
                        dt,
                        dt_min: controls.dt_min,
                    });
                }
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::network::{Reaction, ReactionNetwork, Specie, SpecieCoeff};
    use crate::chemistry::rates::{ArrheniusRate, RateLaw};
    use crate::chemistry::reduction::{
        CellReduction, NoReduction, ReductionMethod, ReductionScratch,
    };

    fn decay_network(k: f64) -> ReactionNetwork {
        // A -> B at constant rate k
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
                    h_formation: 0.0,
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
                forward: RateLaw::Arrhenius(ArrheniusRate::new(k, 0.0, 0.0)),
                reverse: None,
            }],
        )
        .unwrap()
    }

    fn full_reduction(network: &ReactionNetwork, c: &[f64]) -> CellReduction {
        let mut scratch = ReductionScratch::new(network);
        let mut out = CellReduction::sized(network);
        NoReduction.reduce(network, 1e5, 1000.0, c, 0, &mut scratch, &mut out);
        out
    }

    #[test]
    fn first_order_decay_matches_analytic_solution() {
        let k = 50.0;
        let network = decay_network(k);
        let c0 = [1.0, 0.0];
        let reduction = full_reduction(&network, &c0);
        let sys = ReducedSystem {
            network: &network,
            reduction: &reduction,
            p: 1e5,
            temp: 1000.0,
            cell: 0,
        };

        let mut c = reduction.c_reduced.clone();
        let controls = SubCycleControls {
            rel_tol: 1e-6,
            ..Default::default()
        };
        let dt = 0.05;
        let stats = integrate(&sys, &mut c, dt, 1e-4, &controls).unwrap();

        let exact = (-k * dt).exp();
        assert!((c[0] - exact).abs() < 1e-3, "c_A = {}, exact = {exact}", c[0]);
        // isomerization conserves moles
        assert!((c[0] + c[1] - 1.0).abs() < 1e-9);
        assert!(stats.min_step <= dt);
        assert!(stats.steps > 1);
    }

    #[test]
    fn composition_stays_non_negative_for_stiff_decay() {
        let network = decay_network(1e6);
        let c0 = [1e-3, 0.0];
        let reduction = full_reduction(&network, &c0);
        let sys = ReducedSystem {
            network: &network,
            reduction: &reduction,
            p: 1e5,
            temp: 1000.0,
            cell: 0,
        };

        let mut c = reduction.c_reduced.clone();
        integrate(&sys, &mut c, 1e-2, 1e-3, &SubCycleControls::default()).unwrap();
        assert!(c[0] >= 0.0);
        assert!(c[1] >= 0.0);
        assert!(c[0] < 1e-6);
    }

    #[test]
    fn min_step_reports_the_smallest_accepted_step() {
        let network = decay_network(1e4);
        let c0 = [1.0, 0.0];
        let reduction = full_reduction(&network, &c0);
        let sys = ReducedSystem {
            network: &network,
            reduction: &reduction,
            p: 1e5,
            temp: 1000.0,
            cell: 0,
        };

        let mut c = reduction.c_reduced.clone();
        let interval = 1e-3;
        let stats = integrate(&sys, &mut c, interval, interval, &SubCycleControls::default())
            .unwrap();
        // the stiff start forces sub-steps well below the macro interval
        assert!(stats.min_step < interval);
    }
}
