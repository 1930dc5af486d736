//! Glue between assembled equation matrices and the external linear
//! solver. The LDU coefficients are flattened into CSR, Jacobi row scaling
//! is applied to improve conditioning, and the system is handed to a
//! BiCGStab Krylov solve.

use std::sync::Arc;

use kryst::solver::LinearSolver;
use kryst::{
    parallel::{NoComm, UniverseComm},
    preconditioner::PcSide,
};

use crate::discretization::mesh::Mesh;
use crate::error::SolveError;
use crate::field::VolField;
use crate::fvm::matrix::FvMatrix;

#[derive(Clone, Copy, Debug)]
pub struct SolverControls {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 1000,
        }
    }
}

pub struct SolvePerformance {
    pub initial_residual: f64,
    pub final_residual: f64,
}

impl FvMatrix<f64> {
    /// Solve `A psi = b` in place. Injects pending boundary coefficients
    /// if the caller has not already done so.
    pub fn solve(
        &mut self,
        mesh: &Mesh,
        psi: &mut VolField<f64>,
        controls: SolverControls,
    ) -> Result<SolvePerformance, SolveError> {
        self.validate(mesh)?;
        psi.validate(mesh)?;
        if !self.injected() {
            self.inject_boundary_conditions(mesh);
        }

        let n = mesh.n_cells();
        let initial_residual = norm2(&self.residual(mesh, &psi.internal));

        let (indptr, indices, data) = self.to_csr(mesh);

        // Jacobi row scaling, as favoured by the Krylov solver
        let d: Vec<f64> = (0..n)
            .map(|row| {
                let diag = self.diag[row];
                if diag.abs() < 1e-12 {
                    1.0
                } else {
                    diag
                }
            })
            .collect();

        let mut scaled = data.clone();
        for row in 0..n {
            for idx in indptr[row]..indptr[row + 1] {
                scaled[idx] /= d[row];
            }
        }
        let b: Vec<f64> = (0..n).map(|row| self.source[row] / d[row]).collect();

        if !b.iter().all(|x| x.is_finite()) {
            return Err(SolveError::NonFinite {
                field: self.field_name.clone(),
            });
        }

        let jacobian = kryst::matrix::sparse::CsrMatrix::from_csr(n, n, indptr, indices, scaled);
        let op = kryst::matrix::op::CsrOp::new(Arc::new(jacobian));

        let mut solver =
            kryst::solver::bicgstab::BiCgStabSolver::new(controls.tolerance, controls.max_iterations);
        let mut workspace = kryst::context::ksp_context::Workspace::new(n);
        solver.setup_workspace(&mut workspace);

        let mut x = vec![0.0_f64; n];
        let result = solver.solve(
            &op,
            None,
            &b,
            &mut x,
            PcSide::Left,
            &UniverseComm::NoComm(NoComm {}),
            None,
            Some(&mut workspace),
        );

        if let Err(e) = result {
            return Err(SolveError::LinearSolveFailed {
                field: self.field_name.clone(),
                reason: format!("{e:?}"),
            });
        }
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolveError::NonFinite {
                field: self.field_name.clone(),
            });
        }

        psi.internal.copy_from_slice(&x);
        psi.correct_boundary(mesh);

        let final_residual = norm2(&self.residual(mesh, &psi.internal));
        if final_residual > initial_residual && initial_residual > 0.0 {
            log::warn!(
                "solve for '{}' diverged: residual {initial_residual:.3e} -> {final_residual:.3e}",
                self.field_name
            );
        }
        Ok(SolvePerformance {
            initial_residual,
            final_residual,
        })
    }

    /// Flatten the LDU coefficients into CSR arrays, rows sorted by column.
    pub fn to_csr(&self, mesh: &Mesh) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let n = mesh.n_cells();
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);

        let mut row: Vec<(usize, f64)> = Vec::with_capacity(8);
        for c in 0..n {
            row.clear();
            row.push((c, self.diag[c]));
            for &fi in &mesh.cells[c].face_ids {
                let Some(slot) = mesh.internal_slot(fi) else {
                    continue;
                };
                let face = &mesh.faces[fi];
                if face.owner == c {
                    row.push((face.neighbour.unwrap(), self.upper[slot]));
                } else {
                    row.push((face.owner, self.lower[slot]));
                }
            }
            row.sort_unstable_by_key(|&(col, _)| col);
            for &(col, val) in &row {
                indices.push(col);
                data.push(val);
            }
            indptr.push(indices.len());
        }

        (indptr, indices, data)
    }
}

fn norm2(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
