//! Verification of the path-flux-analysis mechanism reduction: initiation
//! set membership, tolerance limits, disabled-reaction consistency, and
//! reproducibility.

use fvreact::chemistry::{
    ArrheniusRate, CellReduction, Pfa, RateLaw, Reaction, ReactionNetwork, ReductionScratch,
    Specie, SpecieCoeff,
};
use fvreact::chemistry::reduction::ReductionMethod;

fn specie(name: &str) -> Specie {
    Specie {
        name: name.to_string(),
        molar_mass: 30.0,
        h_formation: 0.0,
    }
}

fn coeff(index: usize) -> SpecieCoeff {
    SpecieCoeff {
        index,
        stoich: 1.0,
        exponent: 1.0,
    }
}

fn arrhenius(a: f64) -> RateLaw {
    RateLaw::Arrhenius(ArrheniusRate::new(a, 0.0, 0.0))
}

/// A <-> B
fn reversible_ab() -> ReactionNetwork {
    ReactionNetwork::new(
        vec![specie("A"), specie("B")],
        vec![Reaction {
            lhs: vec![coeff(0)],
            rhs: vec![coeff(1)],
            forward: arrhenius(10.0),
            reverse: Some(arrhenius(2.0)),
        }],
    )
    .unwrap()
}

/// A -> B -> C, with a bystander D never produced or consumed.
fn chain_abc_with_bystander() -> ReactionNetwork {
    ReactionNetwork::new(
        vec![specie("A"), specie("B"), specie("C"), specie("D")],
        vec![
            Reaction {
                lhs: vec![coeff(0)],
                rhs: vec![coeff(1)],
                forward: arrhenius(100.0),
                reverse: None,
            },
            Reaction {
                lhs: vec![coeff(1)],
                rhs: vec![coeff(2)],
                forward: arrhenius(50.0),
                reverse: None,
            },
        ],
    )
    .unwrap()
}

fn reduce(network: &ReactionNetwork, tolerance: f64, init: &[&str], c: &[f64]) -> CellReduction {
    let init: Vec<String> = init.iter().map(|s| s.to_string()).collect();
    let pfa = Pfa::new(tolerance, &init, network).unwrap();
    let mut scratch = ReductionScratch::new(network);
    let mut out = CellReduction::sized(network);
    pfa.reduce(network, 1e5, 1000.0, c, 0, &mut scratch, &mut out);
    out
}

#[test]
fn initiation_species_are_always_active() {
    let network = reversible_ab();
    for tolerance in [0.0, 0.5, 1.0, f64::INFINITY] {
        let out = reduce(&network, tolerance, &["A"], &[1.0, 0.0]);
        assert!(out.active[0], "tolerance {tolerance}: A must stay active");
        assert!(out.n_active >= 1);
    }
}

#[test]
fn zero_tolerance_activates_both_sides_of_a_reversible_reaction() {
    let network = reversible_ab();
    let out = reduce(&network, 0.0, &["A"], &[1.0, 0.0]);
    assert!(out.active[0] && out.active[1]);
    assert_eq!(out.n_active, 2);
    assert!(!out.reactions_disabled[0]);
    // compacted mapping is consistent both ways
    assert_eq!(out.reduced_to_full.len(), 2);
    for (reduced, &full) in out.reduced_to_full.iter().enumerate() {
        assert_eq!(out.full_to_reduced[full], reduced as i32);
    }
    // reduced composition carries T and p behind the species entries
    assert_eq!(out.c_reduced.len(), 4);
    assert_eq!(out.c_reduced[2], 1000.0);
    assert_eq!(out.c_reduced[3], 1e5);
}

#[test]
fn unreachable_tolerance_leaves_only_the_initiation_set() {
    // A's single-partner coupling strength is exactly 1, so any tolerance
    // strictly above it prunes B and disables the reaction
    let network = reversible_ab();
    for tolerance in [1.0 + 1e-12, f64::INFINITY] {
        let out = reduce(&network, tolerance, &["A"], &[1.0, 0.0]);
        assert!(out.active[0]);
        assert!(!out.active[1]);
        assert_eq!(out.n_active, 1);
        assert!(out.reactions_disabled[0]);
    }
}

#[test]
fn disabled_flags_track_active_membership_exactly() {
    let network = chain_abc_with_bystander();
    let c = [1.0, 0.5, 0.1, 0.3];

    let out = reduce(&network, 0.0, &["A"], &c);
    // every species on a reachable nonzero path is active
    assert!(out.active[0] && out.active[1] && out.active[2]);
    // the bystander has no path flux
    assert!(!out.active[3]);
    for (ri, reaction) in network.reactions().iter().enumerate() {
        let all_active = reaction
            .lhs
            .iter()
            .chain(&reaction.rhs)
            .all(|sc| out.active[sc.index]);
        assert_eq!(out.reactions_disabled[ri], !all_active);
    }
    assert!(!out.reactions_disabled[0]);
    assert!(!out.reactions_disabled[1]);
}

#[test]
fn second_generation_paths_reach_through_intermediates() {
    let network = chain_abc_with_bystander();
    // B consumed fast relative to production: C reachable from A both by
    // breadth-first chaining and by the direct two-generation path
    let out = reduce(&network, 1e-3, &["A"], &[1.0, 0.2, 0.0, 0.0]);
    assert!(out.active[2], "C must be reached through B");
}

#[test]
fn reduction_is_reproducible_for_identical_state() {
    let network = chain_abc_with_bystander();
    let c = [0.8, 0.4, 0.2, 0.1];

    let a = reduce(&network, 1e-2, &["A"], &c);
    let b = reduce(&network, 1e-2, &["A"], &c);
    assert_eq!(a.active, b.active);
    assert_eq!(a.n_active, b.n_active);
    assert_eq!(a.reduced_to_full, b.reduced_to_full);
    assert_eq!(a.reactions_disabled, b.reactions_disabled);
}

#[test]
fn scratch_reuse_does_not_leak_state_between_cells() {
    let network = chain_abc_with_bystander();
    let pfa = Pfa::new(1e-3, &["A".to_string()], &network).unwrap();
    let mut scratch = ReductionScratch::new(&network);
    let mut out = CellReduction::sized(&network);

    // a cell where everything is reachable...
    pfa.reduce(&network, 1e5, 1000.0, &[1.0, 0.5, 0.2, 0.0], 0, &mut scratch, &mut out);
    assert_eq!(out.n_active, 3);

    // ...then a cell with no A left: nothing flows out of the
    // initiation set beyond what its own throughput supports
    pfa.reduce(&network, 1e5, 1000.0, &[0.0, 0.0, 0.0, 0.0], 1, &mut scratch, &mut out);
    assert!(out.active[0]);
    assert_eq!(out.n_active, 1);
    assert!(out.reactions_disabled.iter().all(|&d| d));
}

#[test]
fn unknown_initiation_species_is_a_configuration_error() {
    let network = reversible_ab();
    assert!(Pfa::new(1e-3, &["Z".to_string()], &network).is_err());
    assert!(Pfa::new(1e-3, &[], &network).is_err());
}
