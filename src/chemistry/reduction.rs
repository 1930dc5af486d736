//! Mechanism reduction: per-cell pruning of the active species/reaction
//! subset from the instantaneous composition.
//!
//! The path-flux analysis builds a sparse species-interaction graph from
//! the net reaction rates, propagates coupling strength over two
//! generations, and breadth-first activates species reachable from the
//! configured search-initiation set above a strength tolerance. The
//! traversal uses an explicit FIFO queue with visited flags, so the
//! resulting active set is reproducible for identical `(p, T, c)`.

use std::collections::VecDeque;

use serde::Deserialize;

use super::network::ReactionNetwork;
use super::VSMALL;
use crate::error::ConfigError;

fn default_tolerance() -> f64 {
    1e-3
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReductionConfig {
    /// "pathFluxAnalysis" or "none".
    pub method: String,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Species names seeding the reachability search.
    #[serde(default)]
    pub initial_set: Vec<String>,
}

/// Construct the configured reduction method against a network.
pub fn create_reduction_method(
    config: &ReductionConfig,
    network: &ReactionNetwork,
) -> Result<Box<dyn ReductionMethod>, ConfigError> {
    match config.method.as_str() {
        "none" => Ok(Box::new(NoReduction)),
        "pathFluxAnalysis" => Ok(Box::new(Pfa::new(
            config.tolerance,
            &config.initial_set,
            network,
        )?)),
        other => Err(ConfigError::UnknownType {
            context: "reduction".to_string(),
            type_name: other.to_string(),
        }),
    }
}

/// The per-cell output of a reduction call: the active mask, the
/// compacted index mapping in both directions, the reduced composition
/// vector (active species then temperature and pressure), and the
/// disabled-reaction flags.
pub struct CellReduction {
    pub active: Vec<bool>,
    pub n_active: usize,
    /// Full species index -> reduced index, -1 when inactive.
    pub full_to_reduced: Vec<i32>,
    /// Reduced index -> full species index.
    pub reduced_to_full: Vec<usize>,
    /// `[c_active.., T, p]`, length `n_active + 2`.
    pub c_reduced: Vec<f64>,
    pub reactions_disabled: Vec<bool>,
}

impl CellReduction {
    pub fn sized(network: &ReactionNetwork) -> Self {
        let ns = network.n_species();
        Self {
            active: vec![false; ns],
            n_active: 0,
            full_to_reduced: vec![-1; ns],
            reduced_to_full: Vec::with_capacity(ns),
            c_reduced: Vec::with_capacity(ns + 2),
            reactions_disabled: vec![false; network.n_reactions()],
        }
    }

    /// Fill the compacted maps and reduced composition from the active
    /// mask.
    fn compact(&mut self, c: &[f64], temp: f64, p: f64) {
        self.reduced_to_full.clear();
        self.c_reduced.clear();
        for (i, &is_active) in self.active.iter().enumerate() {
            if is_active {
                self.full_to_reduced[i] = self.reduced_to_full.len() as i32;
                self.reduced_to_full.push(i);
                self.c_reduced.push(c[i]);
            } else {
                self.full_to_reduced[i] = -1;
            }
        }
        self.n_active = self.reduced_to_full.len();
        self.c_reduced.push(temp);
        self.c_reduced.push(p);
    }

    /// Flag every reaction that references an inactive species.
    fn flag_disabled(&mut self, network: &ReactionNetwork) {
        for (ri, reaction) in network.reactions().iter().enumerate() {
            self.reactions_disabled[ri] = reaction
                .lhs
                .iter()
                .chain(&reaction.rhs)
                .any(|sc| !self.active[sc.index]);
        }
    }
}

pub trait ReductionMethod: Send + Sync {
    /// Whether this method actually prunes anything.
    fn active(&self) -> bool {
        true
    }

    fn tolerance(&self) -> f64;

    /// Recompute the active set for one cell at `(p, T, c)`.
    fn reduce(
        &self,
        network: &ReactionNetwork,
        p: f64,
        temp: f64,
        c: &[f64],
        cell: usize,
        scratch: &mut ReductionScratch,
        out: &mut CellReduction,
    );
}

/// Keeps every species active; the reduced system is the full system.
pub struct NoReduction;

impl ReductionMethod for NoReduction {
    fn active(&self) -> bool {
        false
    }

    fn tolerance(&self) -> f64 {
        0.0
    }

    fn reduce(
        &self,
        _network: &ReactionNetwork,
        p: f64,
        temp: f64,
        c: &[f64],
        _cell: usize,
        _scratch: &mut ReductionScratch,
        out: &mut CellReduction,
    ) {
        out.active.fill(true);
        out.compact(c, temp, p);
        out.reactions_disabled.fill(false);
    }
}

/// Reusable workspace for one reduction call, sized once to the species
/// count and reset per cell so the hot loop does not allocate.
pub struct ReductionScratch {
    ns: usize,
    // first-generation pair storage: slot maps plus production and
    // consumption accumulators, realized (A,B) pairs only
    rab_pos: Vec<i32>,
    rab_other: Vec<usize>,
    pab: Vec<f64>,
    cab: Vec<f64>,
    nb_init: Vec<usize>,
    // per-species production/consumption totals
    pa: Vec<f64>,
    ca: Vec<f64>,
    // second-generation mirrors
    rab_pos2: Vec<i32>,
    rab_other2: Vec<usize>,
    pab2: Vec<f64>,
    cab2: Vec<f64>,
    nb_init2: Vec<usize>,
    // per-reaction species accumulation
    wa: Vec<f64>,
    wa_id: Vec<usize>,
    participates: Vec<bool>,
    used: VecDeque<usize>,
    queue: VecDeque<usize>,
}

impl ReductionScratch {
    pub fn new(network: &ReactionNetwork) -> Self {
        let ns = network.n_species();
        Self {
            ns,
            rab_pos: vec![-1; ns * ns],
            rab_other: vec![0; ns * ns],
            pab: vec![0.0; ns * ns],
            cab: vec![0.0; ns * ns],
            nb_init: vec![0; ns],
            pa: vec![0.0; ns],
            ca: vec![0.0; ns],
            rab_pos2: vec![-1; ns * ns],
            rab_other2: vec![0; ns * ns],
            pab2: vec![0.0; ns * ns],
            cab2: vec![0.0; ns * ns],
            nb_init2: vec![0; ns],
            wa: Vec::with_capacity(ns),
            wa_id: Vec::with_capacity(ns),
            participates: vec![false; ns],
            used: VecDeque::with_capacity(ns),
            queue: VecDeque::with_capacity(ns),
        }
    }

    fn reset(&mut self) {
        self.rab_pos.fill(-1);
        self.pab.fill(0.0);
        self.cab.fill(0.0);
        self.nb_init.fill(0);
        self.pa.fill(0.0);
        self.ca.fill(0.0);
        self.rab_pos2.fill(-1);
        self.pab2.fill(0.0);
        self.cab2.fill(0.0);
        self.nb_init2.fill(0);
        self.participates.fill(false);
        self.used.clear();
        self.queue.clear();
    }
}

/// Path-flux-analysis reduction.
pub struct Pfa {
    tolerance: f64,
    search_init_set: Vec<usize>,
}

impl Pfa {
    pub fn new(
        tolerance: f64,
        initial_set: &[String],
        network: &ReactionNetwork,
    ) -> Result<Self, ConfigError> {
        if initial_set.is_empty() {
            return Err(ConfigError::MissingKey {
                context: "reduction".to_string(),
                key: "initialSet".to_string(),
            });
        }
        let mut search_init_set = Vec::with_capacity(initial_set.len());
        for name in initial_set {
            let index =
                network
                    .species_index(name)
                    .ok_or_else(|| ConfigError::UnknownSpecies {
                        context: "reduction".to_string(),
                        name: name.clone(),
                    })?;
            search_init_set.push(index);
        }
        Ok(Self {
            tolerance,
            search_init_set,
        })
    }
}

impl ReductionMethod for Pfa {
    fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn reduce(
        &self,
        network: &ReactionNetwork,
        p: f64,
        temp: f64,
        c: &[f64],
        cell: usize,
        s: &mut ReductionScratch,
        out: &mut CellReduction,
    ) {
        let ns = s.ns;
        s.reset();

        // First generation: distribute every reaction's signed net rate
        // over its participating species pairs, splitting production and
        // consumption.
        for reaction in network.reactions() {
            let omega: f64 = reaction.omega(p, temp, cell, |i| c[i]);

            s.wa.clear();
            s.wa_id.clear();
            for sc in &reaction.lhs {
                // vAi = v'' - v', so the left side contributes -v'
                merge_contribution(&mut s.wa, &mut s.wa_id, sc.index, -sc.stoich * omega);
            }
            for sc in &reaction.rhs {
                merge_contribution(&mut s.wa, &mut s.wa_id, sc.index, sc.stoich * omega);
            }

            for id in 0..s.wa_id.len() {
                let cur_id = s.wa_id[id];
                let cur_wa = s.wa[id];

                for sc in reaction.lhs.iter().chain(&reaction.rhs) {
                    s.used.push_back(sc.index);
                    s.participates[sc.index] = true;
                }
                // self-interaction is excluded by definition
                s.participates[cur_id] = false;

                while let Some(other) = s.used.pop_front() {
                    if !s.participates[other] {
                        continue;
                    }
                    s.participates[other] = false;

                    let pos = cur_id * ns + other;
                    let slot = if s.rab_pos[pos] == -1 {
                        let slot = s.nb_init[cur_id];
                        s.rab_pos[pos] = slot as i32;
                        s.rab_other[cur_id * ns + slot] = other;
                        s.nb_init[cur_id] += 1;
                        slot
                    } else {
                        s.rab_pos[pos] as usize
                    };
                    if cur_wa > 0.0 {
                        s.pab[cur_id * ns + slot] += cur_wa;
                    } else {
                        s.cab[cur_id * ns + slot] += -cur_wa;
                    }
                }

                // totals accumulate once per (reaction, species), after the
                // pair sweep, so species on both sides are counted right
                if cur_wa > 0.0 {
                    s.pa[cur_id] += cur_wa;
                } else {
                    s.ca[cur_id] += -cur_wa;
                }
            }
        }

        // Second generation: propagate strength A -> ri -> B, attenuated
        // by ri's own throughput; contributions from different
        // intermediates merge additively. A species with zero production
        // and consumption contributes no outgoing paths.
        for a in 0..ns {
            for i in 0..s.nb_init[a] {
                let ri = s.rab_other[a * ns + i];
                let max_pa_ca = s.pa[ri].max(s.ca[ri]);
                if max_pa_ca <= VSMALL {
                    continue;
                }
                for j in 0..s.nb_init[ri] {
                    let b = s.rab_other[ri * ns + j];
                    if b == a {
                        continue;
                    }
                    let pos = a * ns + b;
                    let slot = if s.rab_pos2[pos] == -1 {
                        let slot = s.nb_init2[a];
                        s.rab_pos2[pos] = slot as i32;
                        s.rab_other2[a * ns + slot] = b;
                        s.nb_init2[a] += 1;
                        slot
                    } else {
                        s.rab_pos2[pos] as usize
                    };
                    s.pab2[a * ns + slot] += s.pab[a * ns + i] * s.pab[ri * ns + j] / max_pa_ca;
                    s.cab2[a * ns + slot] += s.cab[a * ns + i] * s.cab[ri * ns + j] / max_pa_ca;
                }
            }
        }

        // Breadth-first activation from the search initiation set. Queue
        // plus visited flags: membership of the result cannot depend on
        // the order strengths happen to be examined in.
        out.active.fill(false);
        let mut n_active = 0;
        for &q in &self.search_init_set {
            if !out.active[q] {
                out.active[q] = true;
                n_active += 1;
                s.queue.push_back(q);
            }
        }

        while let Some(u) = s.queue.pop_front() {
            let den = s.pa[u].max(s.ca[u]);
            if den == 0.0 {
                continue;
            }

            // first-generation links, aggregated with any second-generation
            // strength for the same pair
            for v in 0..s.nb_init[u] {
                let other = s.rab_other[u * ns + v];
                let mut r_ab = (s.pab[u * ns + v] + s.cab[u * ns + v]) / den;
                let pos2 = s.rab_pos2[u * ns + other];
                if pos2 != -1 {
                    let slot2 = pos2 as usize;
                    r_ab += (s.pab2[u * ns + slot2] + s.cab2[u * ns + slot2]) / den;
                }
                if r_ab >= self.tolerance && !out.active[other] {
                    s.queue.push_back(other);
                    out.active[other] = true;
                    n_active += 1;
                }
            }

            // second-generation-only links, for pairs without a direct one
            for v in 0..s.nb_init2[u] {
                let other = s.rab_other2[u * ns + v];
                let r_ab = (s.pab2[u * ns + v] + s.cab2[u * ns + v]) / den;
                if r_ab >= self.tolerance && !out.active[other] {
                    s.queue.push_back(other);
                    out.active[other] = true;
                    n_active += 1;
                }
            }
        }

        out.flag_disabled(network);
        out.compact(c, temp, p);
        debug_assert_eq!(out.n_active, n_active);
    }
}

fn merge_contribution(wa: &mut Vec<f64>, wa_id: &mut Vec<usize>, index: usize, value: f64) {
    for (id, &existing) in wa_id.iter().enumerate() {
        if existing == index {
            wa[id] += value;
            return;
        }
    }
    wa.push(value);
    wa_id.push(index);
}
