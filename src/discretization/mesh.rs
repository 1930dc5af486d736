use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TopologyError;

static MESH_VERSION: AtomicU64 = AtomicU64::new(0);

/// The complete computational grid: cells, faces, boundary patches.
///
/// Faces carry owner/neighbour addressing; a face with no neighbour is a
/// boundary face and belongs to exactly one patch. The mesh is immutable
/// after construction: a topology change means building a new mesh, and
/// every mesh gets a unique `version` so dependent caches can detect
/// staleness instead of silently using stale addressing.
pub struct Mesh {
    pub cells: Vec<Cell>,
    pub faces: Vec<Face>,
    pub patches: Vec<Patch>,
    pub zones: Vec<CellZone>,
    /// Global face indices of internal faces, in off-diagonal storage order.
    internal_faces: Vec<usize>,
    /// Maps a global face index to its internal-face slot, -1 for boundary.
    internal_slot: Vec<i32>,
    /// Maps a boundary face index to (patch, local face), -1 for internal.
    patch_of_face: Vec<i32>,
    patch_local: Vec<u32>,
    version: u64,
}

/// A single control volume.
pub struct Cell {
    pub id: usize,
    pub volume: f64,
    pub centroid: [f64; 3],
    pub face_ids: Vec<usize>,
}

/// An interface between two cells, or between a cell and the boundary.
/// The normal points out of the owner cell.
pub struct Face {
    pub area: f64,
    pub normal: [f64; 3],
    pub owner: usize,
    /// `None` marks a boundary face.
    pub neighbour: Option<usize>,
    pub centroid: [f64; 3],
}

/// A named group of boundary faces.
pub struct Patch {
    pub name: String,
    pub face_ids: Vec<usize>,
}

/// A named cell subset usable by source/constraint selection.
pub struct CellZone {
    pub name: String,
    pub cells: Vec<usize>,
}

/// Floor on centroid distances, guards degenerate face geometry.
pub const MIN_DISTANCE: f64 = 1e-14;

impl Mesh {
    pub fn new(cells: Vec<Cell>, faces: Vec<Face>, patches: Vec<Patch>) -> Self {
        let n_cells = cells.len();
        for (i, face) in faces.iter().enumerate() {
            assert!(
                face.owner < n_cells,
                "face {i}: owner {} out of range ({n_cells} cells)",
                face.owner
            );
            if let Some(n) = face.neighbour {
                assert!(n < n_cells, "face {i}: neighbour {n} out of range");
            }
        }

        let mut internal_faces = Vec::new();
        let mut internal_slot = vec![-1_i32; faces.len()];
        for (i, face) in faces.iter().enumerate() {
            if face.neighbour.is_some() {
                internal_slot[i] = internal_faces.len() as i32;
                internal_faces.push(i);
            }
        }

        let mut patch_of_face = vec![-1_i32; faces.len()];
        let mut patch_local = vec![0_u32; faces.len()];
        for (pi, patch) in patches.iter().enumerate() {
            for (j, &fi) in patch.face_ids.iter().enumerate() {
                assert!(
                    faces[fi].neighbour.is_none(),
                    "patch '{}' references internal face {fi}",
                    patch.name
                );
                patch_of_face[fi] = pi as i32;
                patch_local[fi] = j as u32;
            }
        }

        Self {
            cells,
            faces,
            patches,
            zones: Vec::new(),
            internal_faces,
            internal_slot,
            patch_of_face,
            patch_local,
            version: MESH_VERSION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Patch and patch-local index of a boundary face, `None` for internal
    /// faces or boundary faces outside any patch.
    pub fn boundary_slot(&self, face_id: usize) -> Option<(usize, usize)> {
        let p = self.patch_of_face[face_id];
        (p >= 0).then(|| (p as usize, self.patch_local[face_id] as usize))
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn n_internal_faces(&self) -> usize {
        self.internal_faces.len()
    }

    /// Unique identity of this topology, for staleness checks.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Internal faces in off-diagonal storage order, as
    /// `(slot, face_id, owner, neighbour)`.
    pub fn internal_faces(&self) -> impl Iterator<Item = (usize, usize, usize, usize)> + '_ {
        self.internal_faces.iter().enumerate().map(|(slot, &fi)| {
            let face = &self.faces[fi];
            (slot, fi, face.owner, face.neighbour.unwrap())
        })
    }

    /// Off-diagonal slot for a global face index, `None` for boundary faces.
    pub fn internal_slot(&self, face_id: usize) -> Option<usize> {
        let s = self.internal_slot[face_id];
        (s >= 0).then_some(s as usize)
    }

    /// Owner-to-neighbour centroid distance for an internal face, or
    /// owner-to-face-centroid distance for a boundary face, clamped away
    /// from zero.
    pub fn delta(&self, face_id: usize) -> f64 {
        let face = &self.faces[face_id];
        let a = self.cells[face.owner].centroid;
        let b = match face.neighbour {
            Some(n) => self.cells[n].centroid,
            None => face.centroid,
        };
        distance(a, b).max(MIN_DISTANCE)
    }

    pub fn patch_index(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }

    pub fn zone(&self, name: &str) -> Option<&CellZone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Register a cell zone from a centroid predicate. Zones are case
    /// setup data; they do not change face addressing.
    pub fn add_zone(&mut self, name: impl Into<String>, pred: impl Fn(&[f64; 3]) -> bool) {
        let cells = self
            .cells
            .iter()
            .filter(|c| pred(&c.centroid))
            .map(|c| c.id)
            .collect();
        self.zones.push(CellZone {
            name: name.into(),
            cells,
        });
    }

    /// Check a per-cell array against the cell count.
    pub fn check_cell_array(&self, name: &str, len: usize) -> Result<(), TopologyError> {
        if len != self.n_cells() {
            return Err(TopologyError::InternalSize {
                name: name.to_string(),
                expected: self.n_cells(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Check a per-internal-face array against the internal face count.
    pub fn check_face_array(&self, name: &str, len: usize) -> Result<(), TopologyError> {
        if len != self.n_internal_faces() {
            return Err(TopologyError::MatrixSize {
                name: name.to_string(),
                what: "off-diagonal",
                expected: self.n_internal_faces(),
                actual: len,
            });
        }
        Ok(())
    }
}

#[inline]
pub fn distance(p1: [f64; 3], p2: [f64; 3]) -> f64 {
    (0..=2).map(|i| (p2[i] - p1[i]).powi(2)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::line_mesh;

    #[test]
    fn line_mesh_addressing() {
        let mesh = line_mesh(1.0, 4);
        assert_eq!(mesh.n_cells(), 4);
        assert_eq!(mesh.n_internal_faces(), 3);
        assert_eq!(mesh.patches.len(), 2);
        for (slot, face_id, owner, neigh) in mesh.internal_faces() {
            assert_eq!(neigh, owner + 1);
            assert!(slot < mesh.n_internal_faces());
            assert_eq!(mesh.internal_slot(face_id), Some(slot));
        }
    }

    #[test]
    fn zone_from_predicate() {
        let mut mesh = line_mesh(1.0, 10);
        mesh.add_zone("rightHalf", |c| c[0] > 0.5);
        assert_eq!(mesh.zone("rightHalf").unwrap().cells.len(), 5);
        assert!(mesh.zone("missing").is_none());
    }

    #[test]
    fn versions_are_unique() {
        let a = line_mesh(1.0, 2);
        let b = line_mesh(1.0, 2);
        assert_ne!(a.version(), b.version());
    }
}
