use serde::Deserialize;

use crate::discretization::mesh::Mesh;
use crate::error::{ConfigError, TopologyError};

/// How a source or constraint picks the cells it acts on.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "selectionMode", rename_all = "camelCase")]
pub enum SelectionConfig {
    All,
    CellSet {
        cells: Vec<usize>,
    },
    #[serde(rename_all = "camelCase")]
    CellZone {
        cell_zone: String,
    },
}

/// A cell selection resolved against one mesh. Resolution is a pure
/// function of mesh and configuration; the resolved list is cached with
/// the mesh version it was computed for and must be re-resolved after a
/// topology change.
pub struct CellSelection {
    config: SelectionConfig,
    context: String,
    cells: Vec<usize>,
    total_volume: f64,
    mesh_version: u64,
}

impl CellSelection {
    pub fn resolve(
        config: SelectionConfig,
        mesh: &Mesh,
        context: &str,
    ) -> Result<Self, ConfigError> {
        let mut selection = Self {
            config,
            context: context.to_string(),
            cells: Vec::new(),
            total_volume: 0.0,
            mesh_version: 0,
        };
        selection.update(mesh)?;
        Ok(selection)
    }

    /// Recompute the resolved cell list for (new) mesh topology.
    pub fn update(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        self.cells = match &self.config {
            SelectionConfig::All => (0..mesh.n_cells()).collect(),
            SelectionConfig::CellSet { cells } => {
                for &c in cells {
                    if c >= mesh.n_cells() {
                        return Err(ConfigError::BadValue {
                            context: self.context.clone(),
                            key: "cells".to_string(),
                            reason: format!("cell {c} out of range ({} cells)", mesh.n_cells()),
                        });
                    }
                }
                cells.clone()
            }
            SelectionConfig::CellZone { cell_zone } => mesh
                .zone(cell_zone)
                .ok_or_else(|| ConfigError::UnknownZone {
                    context: self.context.clone(),
                    zone: cell_zone.clone(),
                })?
                .cells
                .clone(),
        };
        self.total_volume = self.cells.iter().map(|&c| mesh.cells[c].volume).sum();
        self.mesh_version = mesh.version();
        Ok(())
    }

    /// The resolved cells, guarded against stale topology.
    pub fn cells(&self, mesh: &Mesh) -> Result<&[usize], TopologyError> {
        if self.mesh_version != mesh.version() {
            return Err(TopologyError::StaleSelection {
                name: self.context.clone(),
                cached: self.mesh_version,
                current: mesh.version(),
            });
        }
        Ok(&self.cells)
    }

    /// Total volume of the selected cells, same staleness guard.
    pub fn volume(&self, mesh: &Mesh) -> Result<f64, TopologyError> {
        self.cells(mesh)?;
        Ok(self.total_volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::line_mesh;

    #[test]
    fn all_selects_every_cell() {
        let mesh = line_mesh(1.0, 6);
        let sel = CellSelection::resolve(SelectionConfig::All, &mesh, "test").unwrap();
        assert_eq!(sel.cells(&mesh).unwrap().len(), 6);
        assert!((sel.volume(&mesh).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zone_selection_resolves_and_detects_staleness() {
        let mut mesh = line_mesh(1.0, 10);
        mesh.add_zone("hot", |c| c[0] < 0.3);
        let sel = CellSelection::resolve(
            SelectionConfig::CellZone {
                cell_zone: "hot".to_string(),
            },
            &mesh,
            "heater",
        )
        .unwrap();
        assert_eq!(sel.cells(&mesh).unwrap(), &[0, 1, 2]);

        let rebuilt = line_mesh(1.0, 10);
        assert!(matches!(
            sel.cells(&rebuilt),
            Err(TopologyError::StaleSelection { .. })
        ));
    }

    #[test]
    fn out_of_range_cell_set_is_fatal() {
        let mesh = line_mesh(1.0, 4);
        let err = CellSelection::resolve(
            SelectionConfig::CellSet { cells: vec![1, 9] },
            &mesh,
            "src",
        );
        assert!(matches!(err, Err(ConfigError::BadValue { .. })));
    }
}
