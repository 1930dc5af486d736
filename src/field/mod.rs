use std::ops::{Add, Div, Mul, Neg, Sub};

use nalgebra::{Matrix3, Vector3};

use crate::discretization::mesh::Mesh;
use crate::error::TopologyError;

/// Numeric rank of a field value: scalar, vector, and so on.
pub trait FieldValue:
    Copy
    + Default
    + PartialEq
    + std::fmt::Debug
    + num_traits::Zero
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + Send
    + Sync
    + 'static
{
    fn mag(&self) -> f64;
}

impl FieldValue for f64 {
    fn mag(&self) -> f64 {
        self.abs()
    }
}

impl FieldValue for Vector3<f64> {
    fn mag(&self) -> f64 {
        self.norm()
    }
}

impl FieldValue for Matrix3<f64> {
    fn mag(&self) -> f64 {
        self.norm()
    }
}

/// Boundary condition attached to one patch of a [`VolField`].
#[derive(Clone, Copy, Debug)]
pub enum PatchCondition<T: FieldValue> {
    FixedValue(T),
    FixedGradient(T),
    ZeroGradient,
}

/// Per-patch boundary values of a field.
#[derive(Clone)]
pub struct PatchField<T: FieldValue> {
    pub condition: PatchCondition<T>,
    pub values: Vec<T>,
}

/// A per-cell quantity with boundary-patch values.
///
/// The internal array is dense over cell indices; each boundary array
/// matches its patch's face count. On a topology change the field must be
/// rebuilt against the new mesh, never resized in place.
#[derive(Clone)]
pub struct VolField<T: FieldValue> {
    pub name: String,
    pub internal: Vec<T>,
    pub boundary: Vec<PatchField<T>>,
    mesh_version: u64,
}

impl<T: FieldValue> VolField<T> {
    pub fn new(name: impl Into<String>, mesh: &Mesh, value: T) -> Self {
        let boundary = mesh
            .patches
            .iter()
            .map(|p| PatchField {
                condition: PatchCondition::ZeroGradient,
                values: vec![value; p.face_ids.len()],
            })
            .collect();
        Self {
            name: name.into(),
            internal: vec![value; mesh.n_cells()],
            boundary,
            mesh_version: mesh.version(),
        }
    }

    /// Set the condition on a named patch. Panics on an unknown patch name;
    /// patch names come from case setup and a typo is a setup defect.
    pub fn with_condition(mut self, mesh: &Mesh, patch: &str, condition: PatchCondition<T>) -> Self {
        let pi = mesh
            .patch_index(patch)
            .unwrap_or_else(|| panic!("field '{}': unknown patch '{}'", self.name, patch));
        self.boundary[pi].condition = condition;
        self
    }

    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    /// Validate sizing against the mesh the field claims to live on.
    pub fn validate(&self, mesh: &Mesh) -> Result<(), TopologyError> {
        if self.internal.len() != mesh.n_cells() {
            return Err(TopologyError::InternalSize {
                name: self.name.clone(),
                expected: mesh.n_cells(),
                actual: self.internal.len(),
            });
        }
        for (pi, (patch, bf)) in mesh.patches.iter().zip(&self.boundary).enumerate() {
            if bf.values.len() != patch.face_ids.len() {
                return Err(TopologyError::BoundarySize {
                    name: self.name.clone(),
                    patch: pi,
                    expected: patch.face_ids.len(),
                    actual: bf.values.len(),
                });
            }
        }
        Ok(())
    }

    /// Re-evaluate boundary values from the internal field and each patch
    /// condition (ghost-value evaluation at the face).
    pub fn correct_boundary(&mut self, mesh: &Mesh) {
        for (pi, patch) in mesh.patches.iter().enumerate() {
            let condition = self.boundary[pi].condition;
            for (j, &face_id) in patch.face_ids.iter().enumerate() {
                let owner = mesh.faces[face_id].owner;
                let value = match condition {
                    PatchCondition::FixedValue(v) => v,
                    PatchCondition::ZeroGradient => self.internal[owner],
                    PatchCondition::FixedGradient(g) => {
                        self.internal[owner] + g * mesh.delta(face_id)
                    }
                };
                self.boundary[pi].values[j] = value;
            }
        }
    }

    /// Under-relax towards `prev`: `self = prev + alpha (self - prev)`.
    pub fn relax(&mut self, prev: &[T], alpha: f64) {
        if alpha >= 1.0 {
            return;
        }
        for (v, &p) in self.internal.iter_mut().zip(prev) {
            *v = p + (*v - p) * alpha;
        }
    }

    /// Largest magnitude change against a previous state.
    pub fn max_change(&self, prev: &[T]) -> f64 {
        self.internal
            .iter()
            .zip(prev)
            .map(|(v, &p)| (*v - p).mag())
            .fold(0.0, f64::max)
    }
}

/// A per-face scalar quantity, e.g. a convective volumetric flux. Internal
/// values are indexed by internal-face slot, boundary values per patch.
#[derive(Clone)]
pub struct SurfaceField {
    pub name: String,
    pub internal: Vec<f64>,
    pub boundary: Vec<Vec<f64>>,
}

impl SurfaceField {
    pub fn new(name: impl Into<String>, mesh: &Mesh, value: f64) -> Self {
        Self {
            name: name.into(),
            internal: vec![value; mesh.n_internal_faces()],
            boundary: mesh
                .patches
                .iter()
                .map(|p| vec![value; p.face_ids.len()])
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::line_mesh;

    #[test]
    fn boundary_correction_follows_condition() {
        let mesh = line_mesh(1.0, 4);
        let mut t = VolField::new("T", &mesh, 300.0)
            .with_condition(&mesh, "left", PatchCondition::FixedValue(400.0))
            .with_condition(&mesh, "right", PatchCondition::FixedGradient(100.0));
        t.internal[3] = 350.0;
        t.correct_boundary(&mesh);

        let left = mesh.patch_index("left").unwrap();
        let right = mesh.patch_index("right").unwrap();
        assert_eq!(t.boundary[left].values[0], 400.0);
        // half-cell distance to the end face
        assert!((t.boundary[right].values[0] - (350.0 + 100.0 * 0.125)).abs() < 1e-12);
    }

    #[test]
    fn validate_catches_stale_sizing() {
        let mesh = line_mesh(1.0, 4);
        let mut t = VolField::new("T", &mesh, 0.0);
        assert!(t.validate(&mesh).is_ok());
        t.internal.pop();
        assert!(matches!(
            t.validate(&mesh),
            Err(TopologyError::InternalSize { .. })
        ));
    }

    #[test]
    fn relax_is_identity_at_one() {
        let mesh = line_mesh(1.0, 3);
        let mut t = VolField::new("T", &mesh, 1.0);
        let prev = vec![0.0; 3];
        t.relax(&prev, 1.0);
        assert_eq!(t.internal, vec![1.0; 3]);
        t.relax(&prev, 0.5);
        assert_eq!(t.internal, vec![0.5; 3]);
    }
}
