use std::ops::{Add, Mul, Neg, Sub};

use crate::discretization::mesh::Mesh;
use crate::error::TopologyError;
use crate::field::FieldValue;

/// The discrete linear(ized) system for one transport equation, in the
/// mesh's LDU addressing: one diagonal coefficient per cell, one upper and
/// one lower coefficient per internal face, a source per cell, and per-patch
/// coefficient pairs awaiting boundary injection.
///
/// The system reads `A psi = b` with coefficients normalized per unit cell
/// volume. Contributions from discretization operators accumulate through
/// `+`/`-`; the result is independent of the order the operators are
/// combined in.
pub struct FvMatrix<T: FieldValue> {
    pub field_name: String,
    pub diag: Vec<f64>,
    pub source: Vec<T>,
    /// Owner-row coefficient of the neighbour unknown, per internal face.
    pub upper: Vec<f64>,
    /// Neighbour-row coefficient of the owner unknown, per internal face.
    pub lower: Vec<f64>,
    /// Per-patch addend to the owner diagonal, folded in by
    /// [`FvMatrix::inject_boundary_conditions`].
    pub internal_coeffs: Vec<Vec<f64>>,
    /// Per-patch addend to the owner source, folded in likewise.
    pub boundary_coeffs: Vec<Vec<T>>,
    symmetric: bool,
    injected: bool,
    mesh_version: u64,
}

impl<T: FieldValue> FvMatrix<T> {
    pub fn new(mesh: &Mesh, field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            diag: vec![0.0; mesh.n_cells()],
            source: vec![T::zero(); mesh.n_cells()],
            upper: vec![0.0; mesh.n_internal_faces()],
            lower: vec![0.0; mesh.n_internal_faces()],
            internal_coeffs: mesh
                .patches
                .iter()
                .map(|p| vec![0.0; p.face_ids.len()])
                .collect(),
            boundary_coeffs: mesh
                .patches
                .iter()
                .map(|p| vec![T::zero(); p.face_ids.len()])
                .collect(),
            symmetric: true,
            injected: false,
            mesh_version: mesh.version(),
        }
    }

    pub fn symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn set_asymmetric(&mut self) {
        self.symmetric = false;
    }

    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    pub fn injected(&self) -> bool {
        self.injected
    }

    /// Validate coefficient array sizing against the mesh. A mismatch means
    /// the matrix was built against different topology; fatal.
    pub fn validate(&self, mesh: &Mesh) -> Result<(), TopologyError> {
        if self.mesh_version != mesh.version() {
            return Err(TopologyError::StaleSelection {
                name: self.field_name.clone(),
                cached: self.mesh_version,
                current: mesh.version(),
            });
        }
        mesh.check_cell_array(&self.field_name, self.diag.len())?;
        mesh.check_face_array(&self.field_name, self.upper.len())?;
        mesh.check_face_array(&self.field_name, self.lower.len())?;
        Ok(())
    }

    fn check_compatible(&self, other: &Self) {
        assert_eq!(
            self.mesh_version, other.mesh_version,
            "combining matrices for '{}' built on different meshes",
            self.field_name
        );
        assert!(
            !self.injected && !other.injected,
            "combining matrices for '{}' after boundary injection",
            self.field_name
        );
    }

    /// Fold the per-patch coefficient pairs into diagonal and source.
    /// Kept separate from operator assembly so the pre-injection matrix is
    /// observable; calling twice would double-count and is a logic error.
    pub fn inject_boundary_conditions(&mut self, mesh: &Mesh) {
        assert!(
            !self.injected,
            "boundary coefficients for '{}' already injected",
            self.field_name
        );
        self.injected = true;
        for (pi, patch) in mesh.patches.iter().enumerate() {
            for (j, &fi) in patch.face_ids.iter().enumerate() {
                let owner = mesh.faces[fi].owner;
                self.diag[owner] += self.internal_coeffs[pi][j];
                self.source[owner] = self.source[owner] + self.boundary_coeffs[pi][j];
            }
        }
    }

    /// Residual `b - A psi`, for diagnostics and convergence reporting.
    pub fn residual(&self, mesh: &Mesh, psi: &[T]) -> Vec<T> {
        let ax = self.a_mul(mesh, psi);
        self.source
            .iter()
            .zip(ax)
            .map(|(&b, ax)| b - ax)
            .collect()
    }

    /// Matrix-vector product over the LDU structure.
    pub fn a_mul(&self, mesh: &Mesh, psi: &[T]) -> Vec<T> {
        let mut y: Vec<T> = self
            .diag
            .iter()
            .zip(psi)
            .map(|(&d, &p)| p * d)
            .collect();
        for (slot, _, owner, neigh) in mesh.internal_faces() {
            y[owner] = y[owner] + psi[neigh] * self.upper[slot];
            y[neigh] = y[neigh] + psi[owner] * self.lower[slot];
        }
        y
    }

    /// Under-relax the system: divides the diagonal by `alpha` and
    /// compensates the source with the previous solution so the converged
    /// fixed point is unchanged. `alpha == 1` leaves the matrix untouched.
    pub fn relax(&mut self, alpha: f64, psi_prev: &[T]) {
        assert!(alpha > 0.0 && alpha <= 1.0, "relaxation factor {alpha}");
        if alpha == 1.0 {
            return;
        }
        for c in 0..self.diag.len() {
            let d = self.diag[c];
            let d_relaxed = d / alpha;
            self.diag[c] = d_relaxed;
            self.source[c] = self.source[c] + psi_prev[c] * (d_relaxed - d);
        }
    }

    /// Overwrite the rows of `cells` so the solution there is exactly
    /// `values`: unit diagonal, zero off-diagonals, source set to the
    /// target. Must run after every additive contribution for those cells;
    /// pending patch coefficients for the touched rows are cleared so a
    /// later injection cannot resurrect them.
    pub fn set_values(&mut self, mesh: &Mesh, cells: &[usize], values: &[T]) {
        assert_eq!(cells.len(), values.len(), "set_values arity mismatch");
        for (&c, &v) in cells.iter().zip(values) {
            self.diag[c] = 1.0;
            self.source[c] = v;
            for &fi in &mesh.cells[c].face_ids {
                if let Some(slot) = mesh.internal_slot(fi) {
                    if mesh.faces[fi].owner == c {
                        self.upper[slot] = 0.0;
                    } else {
                        self.lower[slot] = 0.0;
                    }
                } else if let Some((pi, j)) = mesh.boundary_slot(fi) {
                    self.internal_coeffs[pi][j] = 0.0;
                    self.boundary_coeffs[pi][j] = T::zero();
                }
            }
        }
        self.symmetric = false;
    }
}

impl<T: FieldValue> Add for FvMatrix<T> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.check_compatible(&rhs);
        for (a, b) in self.diag.iter_mut().zip(rhs.diag) {
            *a += b;
        }
        for (a, b) in self.source.iter_mut().zip(rhs.source) {
            *a = *a + b;
        }
        for (a, b) in self.upper.iter_mut().zip(rhs.upper) {
            *a += b;
        }
        for (a, b) in self.lower.iter_mut().zip(rhs.lower) {
            *a += b;
        }
        for (pa, pb) in self.internal_coeffs.iter_mut().zip(rhs.internal_coeffs) {
            for (a, b) in pa.iter_mut().zip(pb) {
                *a += b;
            }
        }
        for (pa, pb) in self.boundary_coeffs.iter_mut().zip(rhs.boundary_coeffs) {
            for (a, b) in pa.iter_mut().zip(pb) {
                *a = *a + b;
            }
        }
        self.symmetric = self.symmetric && rhs.symmetric;
        self
    }
}

impl<T: FieldValue> Sub for FvMatrix<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl<T: FieldValue> Neg for FvMatrix<T> {
    type Output = Self;

    fn neg(mut self) -> Self {
        for a in &mut self.diag {
            *a = -*a;
        }
        for a in &mut self.source {
            *a = -*a;
        }
        for a in &mut self.upper {
            *a = -*a;
        }
        for a in &mut self.lower {
            *a = -*a;
        }
        for p in &mut self.internal_coeffs {
            for a in p {
                *a = -*a;
            }
        }
        for p in &mut self.boundary_coeffs {
            for a in p {
                *a = -*a;
            }
        }
        self
    }
}

impl<T: FieldValue> Mul<f64> for FvMatrix<T> {
    type Output = Self;

    fn mul(mut self, s: f64) -> Self {
        for a in &mut self.diag {
            *a *= s;
        }
        for a in &mut self.source {
            *a = *a * s;
        }
        for a in &mut self.upper {
            *a *= s;
        }
        for a in &mut self.lower {
            *a *= s;
        }
        for p in &mut self.internal_coeffs {
            for a in p {
                *a *= s;
            }
        }
        for p in &mut self.boundary_coeffs {
            for a in p {
                *a = *a * s;
            }
        }
        self
    }
}
