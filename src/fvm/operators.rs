//! Implicit discretization operators.
//!
//! Each operator returns an [`FvMatrix`] holding its contribution to the
//! equation `A psi = b`, coefficients per unit cell volume. Operators for
//! one field over one mesh combine with `+`/`-` in any order.

use crate::discretization::mesh::Mesh;
use crate::field::{FieldValue, PatchCondition, SurfaceField, VolField};
use crate::fvm::matrix::FvMatrix;

/// First-order implicit time derivative `d(psi)/dt` with the old-time
/// field on the right-hand side.
pub fn ddt<T: FieldValue>(psi_old: &VolField<T>, dt: f64, mesh: &Mesh) -> FvMatrix<T> {
    let mut m = FvMatrix::new(mesh, &psi_old.name);
    let rdt = 1.0 / dt;
    for c in 0..mesh.n_cells() {
        m.diag[c] += rdt;
        m.source[c] = m.source[c] + psi_old.internal[c] * rdt;
    }
    m
}

/// Diffusion term `-div(gamma grad(psi))` with a uniform diffusivity.
///
/// On a uniform 1-D mesh of spacing `h` this produces the familiar
/// `2 gamma / h^2` diagonal and `-gamma / h^2` off-diagonals for interior
/// cells; boundary conditions stay in the patch coefficient arrays until
/// injection.
pub fn diffusion<T: FieldValue>(gamma: f64, psi: &VolField<T>, mesh: &Mesh) -> FvMatrix<T> {
    diffusion_faces(&SurfaceField::new("gamma", mesh, gamma), psi, mesh)
}

/// Diffusion with a per-face diffusivity.
pub fn diffusion_faces<T: FieldValue>(
    gamma: &SurfaceField,
    psi: &VolField<T>,
    mesh: &Mesh,
) -> FvMatrix<T> {
    let mut m = FvMatrix::new(mesh, &psi.name);

    for (slot, face_id, owner, neigh) in mesh.internal_faces() {
        let g = gamma.internal[slot] * mesh.faces[face_id].area / mesh.delta(face_id);
        m.diag[owner] += g / mesh.cells[owner].volume;
        m.upper[slot] -= g / mesh.cells[owner].volume;
        m.diag[neigh] += g / mesh.cells[neigh].volume;
        m.lower[slot] -= g / mesh.cells[neigh].volume;
    }

    for (pi, patch) in mesh.patches.iter().enumerate() {
        for (j, &fi) in patch.face_ids.iter().enumerate() {
            let face = &mesh.faces[fi];
            let vol = mesh.cells[face.owner].volume;
            let g = gamma.boundary[pi][j] * face.area / mesh.delta(fi);
            match psi.boundary[pi].condition {
                PatchCondition::FixedValue(vb) => {
                    m.internal_coeffs[pi][j] += g / vol;
                    m.boundary_coeffs[pi][j] = m.boundary_coeffs[pi][j] + vb * (g / vol);
                }
                PatchCondition::ZeroGradient => {}
                PatchCondition::FixedGradient(grad) => {
                    let flux = grad * (gamma.boundary[pi][j] * face.area / vol);
                    m.boundary_coeffs[pi][j] = m.boundary_coeffs[pi][j] + flux;
                }
            }
        }
    }

    m
}

/// Convection term `div(phi psi)` with upwind interpolation; `phi` is the
/// volumetric flux through each face, positive owner-to-neighbour.
pub fn div<T: FieldValue>(phi: &SurfaceField, psi: &VolField<T>, mesh: &Mesh) -> FvMatrix<T> {
    let mut m = FvMatrix::new(mesh, &psi.name);
    m.set_asymmetric();

    for (slot, _, owner, neigh) in mesh.internal_faces() {
        let f = phi.internal[slot];
        let vol_o = mesh.cells[owner].volume;
        let vol_n = mesh.cells[neigh].volume;
        // upwind: the face value is the upstream cell value
        m.diag[owner] += f.max(0.0) / vol_o;
        m.upper[slot] += f.min(0.0) / vol_o;
        m.diag[neigh] += -f.min(0.0) / vol_n;
        m.lower[slot] += -f.max(0.0) / vol_n;
    }

    for (pi, patch) in mesh.patches.iter().enumerate() {
        for (j, &fi) in patch.face_ids.iter().enumerate() {
            let f = phi.boundary[pi][j];
            let vol = mesh.cells[mesh.faces[fi].owner].volume;
            if f >= 0.0 {
                // outflow carries the interior value
                m.internal_coeffs[pi][j] += f / vol;
            } else {
                // inflow carries the current patch value
                let vb = psi.boundary[pi].values[j];
                m.boundary_coeffs[pi][j] = m.boundary_coeffs[pi][j] - vb * (f / vol);
            }
        }
    }

    m
}

/// Explicit source: adds `s` to the right-hand side, per unit volume.
pub fn su<T: FieldValue>(s: &[T], name: &str, mesh: &Mesh) -> FvMatrix<T> {
    let mut m = FvMatrix::new(mesh, name);
    for (c, &v) in s.iter().enumerate() {
        m.source[c] = m.source[c] + v;
    }
    m
}

/// Implicit source `sp * psi` on the right-hand side, folded into the
/// diagonal with opposite sign. Negative `sp` (a sink) strengthens the
/// diagonal.
pub fn sp<T: FieldValue>(sp: &[f64], name: &str, mesh: &Mesh) -> FvMatrix<T> {
    let mut m = FvMatrix::new(mesh, name);
    for (c, &v) in sp.iter().enumerate() {
        m.diag[c] -= v;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::line_mesh;
    use crate::field::VolField;

    #[test]
    fn upwind_div_row_sums_vanish_for_uniform_flux() {
        // constant flux through a closed 1-D run: convection must not
        // create or destroy the transported quantity in interior cells
        let mesh = line_mesh(1.0, 5);
        let psi = VolField::new("s", &mesh, 1.0);
        let mut phi = SurfaceField::new("phi", &mesh, 0.3);
        // outflow right, inflow left
        phi.boundary[mesh.patch_index("left").unwrap()][0] = -0.3;
        phi.boundary[mesh.patch_index("right").unwrap()][0] = 0.3;

        let mut m = div(&phi, &psi, &mesh);
        m.inject_boundary_conditions(&mesh);
        let ones = vec![1.0; 5];
        let y = m.a_mul(&mesh, &ones);
        let b = &m.source;
        for c in 0..5 {
            assert!(
                (y[c] - b[c]).abs() < 1e-12,
                "cell {c}: A*1 = {}, b = {}",
                y[c],
                b[c]
            );
        }
    }

    #[test]
    fn ddt_recovers_old_time_value() {
        let mesh = line_mesh(1.0, 3);
        let mut t = VolField::new("T", &mesh, 2.5);
        t.internal[1] = 4.0;
        let m = ddt(&t, 0.1, &mesh);
        for c in 0..3 {
            assert!((m.diag[c] - 10.0).abs() < 1e-12);
            assert!((m.source[c] - t.internal[c] * 10.0).abs() < 1e-12);
        }
    }
}
