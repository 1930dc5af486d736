//! Verification of equation-matrix assembly: stencil values, additive
//! accumulation, relaxation, boundary injection, and the solve glue.

use fvreact::discretization::generator::{create_voronoi_mesh, line_mesh};
use fvreact::field::{PatchCondition, SurfaceField, VolField};
use fvreact::fvm;
use fvreact::fvm::SolverControls;

#[test]
fn three_cell_diffusion_stencil() {
    // uniform spacing h, diffusivity d: interior diagonal 2d/h^2,
    // boundary-adjacent d/h^2 before injection, off-diagonals -d/h^2
    let h = 0.1;
    let d = 2.5;
    let mesh = line_mesh(3.0 * h, 3);
    let t = VolField::new("T", &mesh, 0.0);

    let eqn = fvm::diffusion(d, &t, &mesh);

    let g = d / (h * h);
    assert!((eqn.diag[0] - g).abs() < 1e-10 * g);
    assert!((eqn.diag[1] - 2.0 * g).abs() < 1e-10 * g);
    assert!((eqn.diag[2] - g).abs() < 1e-10 * g);
    for slot in 0..2 {
        assert!((eqn.upper[slot] + g).abs() < 1e-10 * g);
        assert!((eqn.lower[slot] + g).abs() < 1e-10 * g);
    }
}

#[test]
fn accumulation_is_order_independent() {
    let mesh = line_mesh(1.0, 8);
    let mut t = VolField::new("T", &mesh, 1.0);
    for c in 0..8 {
        t.internal[c] = (c as f64).sin() + 2.0;
    }
    let mut phi = SurfaceField::new("phi", &mesh, 0.0);
    for (slot, v) in phi.internal.iter_mut().enumerate() {
        *v = 0.1 * (slot as f64 - 3.0);
    }
    let src = vec![0.7; 8];

    let a = fvm::ddt(&t, 0.01, &mesh)
        + fvm::diffusion(1.5, &t, &mesh)
        + fvm::div(&phi, &t, &mesh)
        + fvm::su(&src, "T", &mesh);
    let b = fvm::su(&src, "T", &mesh)
        + fvm::div(&phi, &t, &mesh)
        + fvm::ddt(&t, 0.01, &mesh)
        + fvm::diffusion(1.5, &t, &mesh);

    for c in 0..8 {
        assert!((a.diag[c] - b.diag[c]).abs() < 1e-12);
        assert!((a.source[c] - b.source[c]).abs() < 1e-12);
    }
    for slot in 0..mesh.n_internal_faces() {
        assert!((a.upper[slot] - b.upper[slot]).abs() < 1e-12);
        assert!((a.lower[slot] - b.lower[slot]).abs() < 1e-12);
    }
    assert_eq!(a.symmetric(), b.symmetric());
    assert!(!a.symmetric());
}

#[test]
fn combined_matrix_equals_sum_of_standalone_contributions() {
    let mesh = line_mesh(1.0, 5);
    let t = VolField::new("T", &mesh, 3.0);

    let ddt = fvm::ddt(&t, 0.1, &mesh);
    let diff = fvm::diffusion(0.5, &t, &mesh);
    let combined = fvm::ddt(&t, 0.1, &mesh) + fvm::diffusion(0.5, &t, &mesh);

    for c in 0..5 {
        assert!((combined.diag[c] - (ddt.diag[c] + diff.diag[c])).abs() < 1e-14);
        assert!((combined.source[c] - (ddt.source[c] + diff.source[c])).abs() < 1e-14);
    }
    for slot in 0..mesh.n_internal_faces() {
        assert!((combined.upper[slot] - (ddt.upper[slot] + diff.upper[slot])).abs() < 1e-14);
    }
}

#[test]
fn relaxation_at_unity_is_identity() {
    let mesh = line_mesh(1.0, 4);
    let t = VolField::new("T", &mesh, 2.0);
    let psi_prev = vec![1.3; 4];

    let reference = fvm::ddt(&t, 0.1, &mesh) + fvm::diffusion(1.0, &t, &mesh);
    let mut relaxed = fvm::ddt(&t, 0.1, &mesh) + fvm::diffusion(1.0, &t, &mesh);
    relaxed.relax(1.0, &psi_prev);

    assert_eq!(reference.diag, relaxed.diag);
    assert_eq!(reference.source, relaxed.source);
    assert_eq!(reference.upper, relaxed.upper);
    assert_eq!(reference.lower, relaxed.lower);
}

#[test]
fn relaxation_preserves_the_fixed_point() {
    let mesh = line_mesh(1.0, 6);
    let mut t = VolField::new("T", &mesh, 0.0)
        .with_condition(&mesh, "left", PatchCondition::FixedValue(1.0))
        .with_condition(&mesh, "right", PatchCondition::FixedValue(4.0));
    t.correct_boundary(&mesh);

    // pick a solution, manufacture its source, then check that the
    // relaxed system still has it as the fixed point
    let psi_star: Vec<f64> = (0..6).map(|c| 1.0 + 0.5 * c as f64).collect();

    let mut eqn = fvm::diffusion(1.0, &t, &mesh) + fvm::sp(&vec![-2.0; 6], "T", &mesh);
    eqn.inject_boundary_conditions(&mesh);
    let ax = eqn.a_mul(&mesh, &psi_star);
    for c in 0..6 {
        eqn.source[c] = ax[c];
    }

    eqn.relax(0.6, &psi_star);
    let residual = eqn.residual(&mesh, &psi_star);
    for (c, r) in residual.iter().enumerate() {
        assert!(r.abs() < 1e-12, "cell {c}: residual {r}");
    }
}

#[test]
fn fixed_value_bc_solves_to_linear_profile() {
    // steady diffusion between two fixed-value ends is linear in x
    let n = 20;
    let mesh = line_mesh(1.0, n);
    let mut t = VolField::new("T", &mesh, 0.0)
        .with_condition(&mesh, "left", PatchCondition::FixedValue(0.0))
        .with_condition(&mesh, "right", PatchCondition::FixedValue(1.0));
    t.correct_boundary(&mesh);

    let mut eqn = fvm::diffusion(1.0, &t, &mesh);
    eqn.solve(
        &mesh,
        &mut t,
        SolverControls {
            tolerance: 1e-12,
            max_iterations: 500,
        },
    )
    .unwrap();

    for (c, cell) in mesh.cells.iter().enumerate() {
        let exact = cell.centroid[0];
        assert!(
            (t.internal[c] - exact).abs() < 1e-6,
            "cell {c}: T = {}, exact = {exact}",
            t.internal[c]
        );
    }
}

#[test]
fn solve_runs_on_an_unstructured_voronoi_mesh() {
    // same steady problem, but on a 2-D Voronoi mesh: the solution must
    // stay within the boundary-value bounds
    let generators =
        fvreact::discretization::generator::regular_2d_generators([1.0, 1.0], 6, 6);
    let mesh = create_voronoi_mesh(&generators, [1.0, 1.0, 0.2], |centroid, normal| {
        if normal[0] < -0.9 {
            "left".to_string()
        } else if normal[0] > 0.9 {
            "right".to_string()
        } else {
            let _ = centroid;
            "walls".to_string()
        }
    });

    let mut t = VolField::new("T", &mesh, 0.5)
        .with_condition(&mesh, "left", PatchCondition::FixedValue(0.0))
        .with_condition(&mesh, "right", PatchCondition::FixedValue(1.0));
    t.correct_boundary(&mesh);

    let mut eqn = fvm::diffusion(1.0, &t, &mesh);
    eqn.solve(&mesh, &mut t, SolverControls::default()).unwrap();

    for (c, &v) in t.internal.iter().enumerate() {
        assert!(
            (-1e-8..=1.0 + 1e-8).contains(&v),
            "cell {c}: T = {v} outside boundary bounds"
        );
    }
}

#[test]
fn stale_matrix_is_rejected_by_solve() {
    let old_mesh = line_mesh(1.0, 4);
    let t_old = VolField::new("T", &old_mesh, 0.0);
    let mut eqn = fvm::diffusion(1.0, &t_old, &old_mesh);

    let new_mesh = line_mesh(1.0, 4);
    let mut t_new = VolField::new("T", &new_mesh, 0.0);
    assert!(eqn
        .solve(&new_mesh, &mut t_new, SolverControls::default())
        .is_err());
}
