use num_dual::DualNum;

use super::rates::RateLaw;
use crate::error::ConfigError;

/// One chemical species and the thermophysical data the core needs from
/// it.
#[derive(Clone, Debug)]
pub struct Specie {
    pub name: String,
    /// kg/kmol
    pub molar_mass: f64,
    /// Enthalpy of formation, J/kg.
    pub h_formation: f64,
}

/// Participation of one species in one reaction side.
#[derive(Clone, Copy, Debug)]
pub struct SpecieCoeff {
    pub index: usize,
    pub stoich: f64,
    /// Concentration exponent in the rate law (usually the stoichiometry
    /// for elementary reactions).
    pub exponent: f64,
}

/// A single reaction: `lhs -> rhs` with a forward rate law and an
/// optional explicit reverse law.
pub struct Reaction {
    pub lhs: Vec<SpecieCoeff>,
    pub rhs: Vec<SpecieCoeff>,
    pub forward: RateLaw,
    pub reverse: Option<RateLaw>,
}

impl Reaction {
    /// Net molar rate of progress at `(p, T, c)`. Generic over the
    /// numeric type so concentration sensitivities come out of the same
    /// code path via dual numbers; `c_of` maps a species index to its
    /// concentration.
    pub fn omega<T, F>(&self, p: f64, temp: f64, cell: usize, c_of: F) -> T
    where
        T: DualNum<f64>,
        F: Fn(usize) -> T + Copy,
    {
        let kf: T = self.forward.k(p, temp, cell, c_of);
        let mut wf = kf;
        for sc in &self.lhs {
            wf = wf * c_of(sc.index).powf(sc.exponent);
        }

        match &self.reverse {
            None => wf,
            Some(rev) => {
                let kr: T = rev.k(p, temp, cell, c_of);
                let mut wr = kr;
                for sc in &self.rhs {
                    wr = wr * c_of(sc.index).powf(sc.exponent);
                }
                wf - wr
            }
        }
    }

    /// Temperature derivative of the net rate of progress, from the rate
    /// laws' analytic `ddt`.
    pub fn domega_dt(&self, p: f64, temp: f64, cell: usize, c: &[f64]) -> f64 {
        let mut prod_f = 1.0;
        for sc in &self.lhs {
            prod_f *= c[sc.index].powf(sc.exponent);
        }
        let mut d = self.forward.ddt(p, temp, cell, c) * prod_f;
        if let Some(rev) = &self.reverse {
            let mut prod_r = 1.0;
            for sc in &self.rhs {
                prod_r *= c[sc.index].powf(sc.exponent);
            }
            d -= rev.ddt(p, temp, cell, c) * prod_r;
        }
        d
    }
}

/// The immutable species/reaction network: fixed-size arrays built once
/// from configuration.
pub struct ReactionNetwork {
    species: Vec<Specie>,
    reactions: Vec<Reaction>,
}

impl ReactionNetwork {
    pub fn new(species: Vec<Specie>, reactions: Vec<Reaction>) -> Result<Self, ConfigError> {
        let ns = species.len();
        for (ri, reaction) in reactions.iter().enumerate() {
            for sc in reaction.lhs.iter().chain(&reaction.rhs) {
                if sc.index >= ns {
                    return Err(ConfigError::BadValue {
                        context: format!("reaction {ri}"),
                        key: "species index".to_string(),
                        reason: format!("index {} out of range ({ns} species)", sc.index),
                    });
                }
            }
            reaction.forward.check_species_range(ns, ri)?;
            if let Some(rev) = &reaction.reverse {
                rev.check_species_range(ns, ri)?;
            }
        }
        Ok(Self { species, reactions })
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn species(&self) -> &[Specie] {
        &self.species
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s.name == name)
    }

    /// Net molar production rate of every species at `(p, T, c)`,
    /// kmol/(m^3 s), restricted to reactions the `enabled` mask allows.
    pub fn net_rates<T, F>(&self, p: f64, temp: f64, cell: usize, c_of: F, enabled: impl Fn(usize) -> bool, out: &mut [T])
    where
        T: DualNum<f64>,
        F: Fn(usize) -> T + Copy,
    {
        for o in out.iter_mut() {
            *o = T::from(0.0);
        }
        for (ri, reaction) in self.reactions.iter().enumerate() {
            if !enabled(ri) {
                continue;
            }
            let w: T = reaction.omega(p, temp, cell, c_of);
            for sc in &reaction.lhs {
                out[sc.index] = out[sc.index].clone() - w.clone() * sc.stoich;
            }
            for sc in &reaction.rhs {
                out[sc.index] = out[sc.index].clone() + w.clone() * sc.stoich;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::rates::{ArrheniusRate, RateLaw};

    fn two_species() -> Vec<Specie> {
        vec![
            Specie {
                name: "A".to_string(),
                molar_mass: 28.0,
                h_formation: 0.0,
            },
            Specie {
                name: "B".to_string(),
                molar_mass: 28.0,
                h_formation: -1.0e6,
            },
        ]
    }

    fn a_to_b(kf: f64, kr: f64) -> Reaction {
        Reaction {
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
            forward: RateLaw::Arrhenius(ArrheniusRate::new(kf, 0.0, 0.0)),
            reverse: Some(RateLaw::Arrhenius(ArrheniusRate::new(kr, 0.0, 0.0))),
        }
    }

    #[test]
    fn reversible_rate_balances_at_equilibrium() {
        let network = ReactionNetwork::new(two_species(), vec![a_to_b(2.0, 1.0)]).unwrap();
        // kf*cA == kr*cB at cA = 1, cB = 2
        let c = [1.0, 2.0];
        let w: f64 = network.reactions()[0].omega(1e5, 300.0, 0, |i| c[i]);
        assert!(w.abs() < 1e-12);
    }

    #[test]
    fn out_of_range_species_index_is_fatal() {
        let bad = Reaction {
            lhs: vec![SpecieCoeff {
                index: 5,
                stoich: 1.0,
                exponent: 1.0,
            }],
            rhs: vec![],
            forward: RateLaw::Arrhenius(ArrheniusRate::new(1.0, 0.0, 0.0)),
            reverse: None,
        };
        assert!(ReactionNetwork::new(two_species(), vec![bad]).is_err());
    }

    #[test]
    fn net_rates_conserve_mass_for_isomerization() {
        let network = ReactionNetwork::new(two_species(), vec![a_to_b(3.0, 0.0)]).unwrap();
        let c = [2.0, 0.0];
        let mut rates = [0.0_f64; 2];
        network.net_rates(1e5, 300.0, 0, |i| c[i], |_| true, &mut rates);
        assert!((rates[0] + rates[1]).abs() < 1e-12);
        assert!((rates[1] - 6.0).abs() < 1e-12);
    }
}
