//! Reaction rate laws.
//!
//! Every law is a pure function of `(p, T, c)` (plus an optional per-cell
//! surface-area-to-volume parameter) returning a scalar rate constant,
//! with an analytic temperature derivative for implicit integration.
//! Coefficient-array validation happens at construction, never per
//! evaluation.

use std::f64::consts::PI;

use num_dual::DualNum;

use super::{R_GAS, ROOT_SMALL};
use crate::error::ConfigError;

/// The closed set of rate laws selectable per reaction.
pub enum RateLaw {
    Arrhenius(ArrheniusRate),
    FluxLimitedLangmuirHinshelwood(FluxLimitedLangmuirHinshelwood),
}

impl RateLaw {
    /// Rate constant at `(p, T, c)`; generic over the numeric type so the
    /// composition sensitivity of composition-dependent laws is carried
    /// by dual numbers.
    pub fn k<T, F>(&self, p: f64, temp: f64, cell: usize, c_of: F) -> T
    where
        T: DualNum<f64>,
        F: Fn(usize) -> T + Copy,
    {
        match self {
            RateLaw::Arrhenius(r) => T::from(r.k(temp)),
            RateLaw::FluxLimitedLangmuirHinshelwood(r) => r.k(p, temp, cell, c_of),
        }
    }

    /// Analytic `dk/dT`.
    pub fn ddt(&self, p: f64, temp: f64, cell: usize, c: &[f64]) -> f64 {
        match self {
            RateLaw::Arrhenius(r) => r.ddt(temp),
            RateLaw::FluxLimitedLangmuirHinshelwood(r) => r.ddt(p, temp, cell, c),
        }
    }

    pub(crate) fn check_species_range(&self, ns: usize, reaction: usize) -> Result<(), ConfigError> {
        if let RateLaw::FluxLimitedLangmuirHinshelwood(r) = self {
            for &i in &r.adsorbed {
                if i >= ns {
                    return Err(ConfigError::BadValue {
                        context: format!("reaction {reaction}"),
                        key: "adsorbed species".to_string(),
                        reason: format!("index {i} out of range ({ns} species)"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Generalized power-law Arrhenius form `A T^beta exp(-Ta/T)`.
#[derive(Clone, Copy, Debug)]
pub struct ArrheniusRate {
    pub a: f64,
    pub beta: f64,
    pub ta: f64,
}

impl ArrheniusRate {
    pub fn new(a: f64, beta: f64, ta: f64) -> Self {
        Self { a, beta, ta }
    }

    pub fn k(&self, temp: f64) -> f64 {
        let mut k = self.a;
        if self.beta != 0.0 {
            k *= temp.powf(self.beta);
        }
        if self.ta != 0.0 {
            k *= (-self.ta / temp).exp();
        }
        k
    }

    pub fn ddt(&self, temp: f64) -> f64 {
        self.k(temp) * (self.beta + self.ta / temp) / temp
    }
}

/// Per-cell surface-area-to-volume parameter of a surface reaction:
/// uniform, or a field sampled at the cell.
#[derive(Clone, Debug)]
pub enum AreaPerVolume {
    Uniform(f64),
    PerCell(Vec<f64>),
}

impl AreaPerVolume {
    fn at(&self, cell: usize) -> f64 {
        match self {
            AreaPerVolume::Uniform(av) => *av,
            AreaPerVolume::PerCell(field) => field[cell],
        }
    }
}

/// Langmuir-Hinshelwood kinetics with optional flux limiting: the kinetic
/// numerator over an adsorption denominator, capped by each reactant's
/// mass-transfer availability bound. The effective rate is the minimum of
/// the kinetic rate and every per-reactant limit: never negative, never
/// above availability.
pub struct FluxLimitedLangmuirHinshelwood {
    /// Reactant indices followed by any additional adsorbable species.
    pub(crate) adsorbed: Vec<usize>,
    n_reactants: usize,
    /// Denominator offset.
    a: f64,
    /// Pre-exponential factors: entry 0 for the numerator, then one per
    /// adsorbed species.
    pre_exp: Vec<f64>,
    /// Activation temperatures, same layout as `pre_exp`.
    t_act: Vec<f64>,
    /// Temperature exponents, same layout.
    beta: Vec<f64>,
    /// Adsorption exponents: entry 0 is the denominator power.
    m: Vec<f64>,
    /// Reactant stoichiometries, for the flux limit.
    stoich: Vec<f64>,
    /// Reactant concentration exponents, for the flux limit.
    exponents: Vec<f64>,
    /// Sticking coefficients; empty disables flux limiting.
    sticking: Vec<f64>,
    /// Reactant molar masses, kg/kmol.
    molar_mass: Vec<f64>,
    limited: bool,
    area_per_volume: AreaPerVolume,
}

pub struct LangmuirHinshelwoodCoeffs {
    pub reactants: Vec<(usize, f64, f64)>,
    pub additional_adsorbable: Vec<usize>,
    pub a: f64,
    pub pre_exp: Vec<f64>,
    pub t_act: Vec<f64>,
    pub beta: Vec<f64>,
    pub m: Vec<f64>,
    /// `Some((sticking, molar_mass, area_per_volume))` enables the flux
    /// limit.
    pub flux_limit: Option<(Vec<f64>, Vec<f64>, AreaPerVolume)>,
}

impl FluxLimitedLangmuirHinshelwood {
    /// Validates every coefficient array against the declared number of
    /// participating species; a mismatch is a fatal configuration error.
    pub fn new(context: &str, coeffs: LangmuirHinshelwoodCoeffs) -> Result<Self, ConfigError> {
        let n_reactants = coeffs.reactants.len();
        let n_coeffs = 1 + n_reactants + coeffs.additional_adsorbable.len();

        let check = |key: &str, len: usize, expected: usize| -> Result<(), ConfigError> {
            if len != expected {
                return Err(ConfigError::CoefficientCount {
                    context: context.to_string(),
                    key: key.to_string(),
                    expected,
                    actual: len,
                });
            }
            Ok(())
        };

        check("A", coeffs.pre_exp.len(), n_coeffs)?;
        check("Ta", coeffs.t_act.len(), n_coeffs)?;
        check("beta", coeffs.beta.len(), n_coeffs)?;
        check("m", coeffs.m.len(), n_coeffs)?;

        let (limited, sticking, molar_mass, area_per_volume) = match coeffs.flux_limit {
            Some((s, w, av)) => {
                check("s", s.len(), n_reactants)?;
                check("W", w.len(), n_reactants)?;
                (true, s, w, av)
            }
            None => (false, Vec::new(), Vec::new(), AreaPerVolume::Uniform(0.0)),
        };

        let mut adsorbed: Vec<usize> = coeffs.reactants.iter().map(|&(i, _, _)| i).collect();
        adsorbed.extend(&coeffs.additional_adsorbable);

        Ok(Self {
            adsorbed,
            n_reactants,
            a: coeffs.a,
            pre_exp: coeffs.pre_exp,
            t_act: coeffs.t_act,
            beta: coeffs.beta,
            m: coeffs.m,
            stoich: coeffs.reactants.iter().map(|&(_, nu, _)| nu).collect(),
            exponents: coeffs.reactants.iter().map(|&(_, _, e)| e).collect(),
            sticking,
            molar_mass,
            limited,
            area_per_volume,
        })
    }

    pub fn k<T, F>(&self, _p: f64, temp: f64, cell: usize, c_of: F) -> T
    where
        T: DualNum<f64>,
        F: Fn(usize) -> T + Copy,
    {
        let mut sum_kc = T::from(0.0);
        for (i, &si) in self.adsorbed.iter().enumerate() {
            let ip1 = i + 1;
            let kc = c_of(si).powf(self.m[ip1])
                * (self.pre_exp[ip1]
                    * temp.powf(self.beta[ip1])
                    * (-self.t_act[ip1] / temp).exp());
            sum_kc = sum_kc + kc;
        }

        let k0 = self.pre_exp[0] * temp.powf(self.beta[0]) * (-self.t_act[0] / temp).exp();
        let mut r = (sum_kc + self.a).powf(-self.m[0]) * k0;

        if self.limited {
            let mut rc = T::from(1.0);
            for i in 0..self.n_reactants {
                rc = rc * c_of(self.adsorbed[i]).powf(self.exponents[i]);
            }

            if rc.re() > ROOT_SMALL {
                let av = self.area_per_volume.at(cell);
                for i in 0..self.n_reactants {
                    let bound = c_of(self.adsorbed[i]) / rc.clone()
                        * (av * self.sticking[i] / self.stoich[i]
                            * (R_GAS * temp / (2.0 * PI * self.molar_mass[i])).sqrt());
                    if bound.re() < r.re() {
                        r = bound;
                    }
                }
            }
        }

        r
    }

    /// Analytic `dk/dT`, switching to the limiting branch's derivative
    /// when a flux bound is the active minimum.
    pub fn ddt(&self, _p: f64, temp: f64, cell: usize, c: &[f64]) -> f64 {
        let mut sum_kc = 0.0;
        let mut sum_beta_kc = 0.0;
        for (i, &si) in self.adsorbed.iter().enumerate() {
            let ip1 = i + 1;
            let kc = self.pre_exp[ip1]
                * temp.powf(self.beta[ip1])
                * (-self.t_act[ip1] / temp).exp()
                * c[si].powf(self.m[ip1]);
            sum_kc += kc;
            sum_beta_kc += (self.beta[ip1] + self.t_act[ip1] / temp) * kc;
        }

        let ta_by_t0 = self.t_act[0] / temp;
        let k0 = self.pre_exp[0] * temp.powf(self.beta[0]) * (-ta_by_t0).exp();

        let mut ddt = ((self.beta[0] + ta_by_t0) * k0
            - self.m[0] * k0 * sum_beta_kc / (self.a + sum_kc))
            / ((self.a + sum_kc).powf(self.m[0]) * temp);

        if self.limited {
            let mut rc = 1.0;
            for i in 0..self.n_reactants {
                rc *= c[self.adsorbed[i]].powf(self.exponents[i]);
            }

            let mut r = k0 / (self.a + sum_kc).powf(self.m[0]);

            if rc > ROOT_SMALL {
                let av = self.area_per_volume.at(cell);
                let mut limiting = None;

                for i in 0..self.n_reactants {
                    let rl = (av * self.sticking[i] * c[self.adsorbed[i]]
                        / (self.stoich[i] * rc))
                        * (R_GAS * temp / (2.0 * PI * self.molar_mass[i])).sqrt();
                    if rl < r {
                        limiting = Some(i);
                        r = rl;
                    }
                }

                if let Some(l) = limiting {
                    ddt = (av * self.sticking[l] * c[self.adsorbed[l]]
                        / (self.stoich[l] * rc))
                        * 0.5
                        * (R_GAS / (2.0 * PI * self.molar_mass[l] * temp)).sqrt();
                }
            }
        }

        ddt
    }
}
