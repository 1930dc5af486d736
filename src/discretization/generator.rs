use super::mesh::{Cell, Face, Mesh, Patch};
use glam::DVec3;
use meshless_voronoi::{Dimensionality, Voronoi};
use std::collections::BTreeMap;

/// Build the raw Voronoi diagram using the external library.
pub fn build_voronoi(generators: &[DVec3], width: [f64; 3]) -> Voronoi {
    Voronoi::build(
        generators,
        [-width[0] / 2.0, -width[1] / 2.0, -width[2] / 2.0].into(),
        width.into(),
        Dimensionality::ThreeD,
        false,
    )
}

/// Convert a `Voronoi` diagram into the library's [`Mesh`] representation.
/// Boundary faces are grouped into patches by the `labeler` closure, called
/// with each boundary face's centroid and outward normal.
pub fn parse_voronoi(
    voronoi: &Voronoi,
    labeler: impl Fn(&[f64; 3], &[f64; 3]) -> String,
) -> Mesh {
    let mut cells = Vec::new();
    let mut faces = Vec::new();

    for (cell_id, cell) in voronoi.cells().into_iter().enumerate() {
        cells.push(Cell {
            id: cell_id,
            volume: cell.volume(),
            centroid: cell.centroid().to_array(),
            face_ids: cell.face_indices(voronoi).to_vec(),
        });
    }

    // BTreeMap keeps patch ordering independent of boundary-face ordering.
    let mut patch_faces: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for face in voronoi.faces().into_iter() {
        let centroid = face.centroid().to_array();
        let normal = face.normal().to_array();
        let face_id = faces.len();
        let neighbour = face.right();
        if neighbour.is_none() {
            let label = labeler(&centroid, &normal);
            patch_faces.entry(label).or_default().push(face_id);
        }
        faces.push(Face {
            area: face.area(),
            normal,
            owner: face.left(),
            neighbour,
            centroid,
        });
    }

    let patches = patch_faces
        .into_iter()
        .map(|(name, face_ids)| Patch { name, face_ids })
        .collect();

    Mesh::new(cells, faces, patches)
}

/// Convenience wrapper that builds and immediately parses a Voronoi mesh.
pub fn create_voronoi_mesh(
    generators: &[DVec3],
    width: [f64; 3],
    labeler: impl Fn(&[f64; 3], &[f64; 3]) -> String,
) -> Mesh {
    let voronoi = build_voronoi(generators, width);
    parse_voronoi(&voronoi, labeler)
}

/// A uniform 1-D mesh of `n` cells over `[0, length]` with unit cross
/// section. Patches "left" and "right" hold the two end faces.
pub fn line_mesh(length: f64, n: usize) -> Mesh {
    assert!(n > 0, "line mesh needs at least one cell");
    let h = length / n as f64;

    let mut cells = Vec::with_capacity(n);
    let mut faces = Vec::with_capacity(n + 1);

    // internal faces first keeps the off-diagonal order aligned with cells
    for i in 0..n - 1 {
        faces.push(Face {
            area: 1.0,
            normal: [1.0, 0.0, 0.0],
            owner: i,
            neighbour: Some(i + 1),
            centroid: [(i + 1) as f64 * h, 0.0, 0.0],
        });
    }
    let left_face = faces.len();
    faces.push(Face {
        area: 1.0,
        normal: [-1.0, 0.0, 0.0],
        owner: 0,
        neighbour: None,
        centroid: [0.0, 0.0, 0.0],
    });
    let right_face = faces.len();
    faces.push(Face {
        area: 1.0,
        normal: [1.0, 0.0, 0.0],
        owner: n - 1,
        neighbour: None,
        centroid: [length, 0.0, 0.0],
    });

    for i in 0..n {
        let mut face_ids = Vec::new();
        if i > 0 {
            face_ids.push(i - 1);
        }
        if i < n - 1 {
            face_ids.push(i);
        }
        if i == 0 {
            face_ids.push(left_face);
        }
        if i == n - 1 {
            face_ids.push(right_face);
        }
        cells.push(Cell {
            id: i,
            volume: h,
            centroid: [(i as f64 + 0.5) * h, 0.0, 0.0],
            face_ids,
        });
    }

    let patches = vec![
        Patch {
            name: "left".to_string(),
            face_ids: vec![left_face],
        },
        Patch {
            name: "right".to_string(),
            face_ids: vec![right_face],
        },
    ];

    Mesh::new(cells, faces, patches)
}

/// A regular grid of generator points for Voronoi test meshes, centered
/// on the origin for [`build_voronoi`].
pub fn regular_2d_generators(width: [f64; 2], nx: usize, ny: usize) -> Vec<DVec3> {
    let dx = width[0] / nx as f64;
    let dy = width[1] / ny as f64;

    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let x = (i as f64 + 0.5) * dx - width[0] / 2.0;
            let y = (j as f64 + 0.5) * dy - width[1] / 2.0;
            points.push(DVec3::new(x, y, 0.0));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_mesh_geometry() {
        let mesh = line_mesh(1.0, 3);
        let h = 1.0 / 3.0;
        for cell in &mesh.cells {
            assert!((cell.volume - h).abs() < 1e-12);
        }
        for (_, face_id, owner, neigh) in mesh.internal_faces() {
            assert!((mesh.delta(face_id) - h).abs() < 1e-12);
            assert_eq!(neigh, owner + 1);
            assert!((mesh.faces[face_id].area - 1.0).abs() < 1e-12);
        }
    }
}
