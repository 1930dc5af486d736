use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;

use super::cell_set::{CellSelection, SelectionConfig};
use super::{FvConstraint, TimeFunction};
use crate::discretization::mesh::Mesh;
use crate::error::{ConfigError, RegistryError};
use crate::field::VolField;
use crate::fvm::matrix::FvMatrix;

fn parse<T: for<'de> Deserialize<'de>>(
    name: &str,
    value: &serde_json::Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(value.clone()).map_err(|e| ConfigError::BadValue {
        context: name.to_string(),
        key: "<entry>".to_string(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixedValueConstraintConfig {
    #[serde(flatten)]
    selection: SelectionConfig,
    field_values: BTreeMap<String, TimeFunction>,
}

/// Pins field values inside a region: the constrained rows are replaced
/// wholesale (unit diagonal, cleared off-diagonals, source set to the
/// target), so no additive source can leak into them.
pub struct FixedValueConstraint {
    name: String,
    fields: Vec<String>,
    selection: CellSelection,
    values: BTreeMap<String, TimeFunction>,
}

impl FixedValueConstraint {
    pub fn from_config(
        name: &str,
        value: &serde_json::Value,
        mesh: &Mesh,
    ) -> Result<Self, ConfigError> {
        let config: FixedValueConstraintConfig = parse(name, value)?;
        if config.field_values.is_empty() {
            return Err(ConfigError::MissingKey {
                context: name.to_string(),
                key: "fieldValues".to_string(),
            });
        }
        for f in config.field_values.values() {
            f.validate(name)?;
        }
        Ok(Self {
            name: name.to_string(),
            fields: config.field_values.keys().cloned().collect(),
            selection: CellSelection::resolve(config.selection, mesh, name)?,
            values: config.field_values,
        })
    }
}

impl FvConstraint for FixedValueConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn constrained_fields(&self) -> &[String] {
        &self.fields
    }

    fn constrain(
        &self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<bool, RegistryError> {
        let Some(value) = self.values.get(&eqn.field_name) else {
            return Ok(false);
        };
        let cells = self.selection.cells(mesh)?;
        let target = vec![value.value(time); cells.len()];
        eqn.set_values(mesh, cells, &target);
        Ok(true)
    }

    fn constrain_field(
        &self,
        _field: &mut VolField<f64>,
        _mesh: &Mesh,
    ) -> Result<bool, RegistryError> {
        // acts through the equation rows only
        Ok(false)
    }

    fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        self.selection.update(mesh)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LimitBoundsConfig {
    field: String,
    #[serde(flatten)]
    selection: SelectionConfig,
    min: f64,
    max: f64,
}

/// Clips a solved field into `[min, max]` over a region, after the
/// linear solve. The limitTemperature-style realizability guard.
pub struct LimitBounds {
    name: String,
    fields: [String; 1],
    selection: CellSelection,
    min: f64,
    max: f64,
}

impl LimitBounds {
    pub fn from_config(
        name: &str,
        value: &serde_json::Value,
        mesh: &Mesh,
    ) -> Result<Self, ConfigError> {
        let config: LimitBoundsConfig = parse(name, value)?;
        if config.min > config.max {
            return Err(ConfigError::BadValue {
                context: name.to_string(),
                key: "min".to_string(),
                reason: format!("min {} exceeds max {}", config.min, config.max),
            });
        }
        Ok(Self {
            name: name.to_string(),
            fields: [config.field],
            selection: CellSelection::resolve(config.selection, mesh, name)?,
            min: config.min,
            max: config.max,
        })
    }
}

impl FvConstraint for LimitBounds {
    fn name(&self) -> &str {
        &self.name
    }

    fn constrained_fields(&self) -> &[String] {
        &self.fields
    }

    fn constrain(
        &self,
        _eqn: &mut FvMatrix<f64>,
        _mesh: &Mesh,
        _time: f64,
    ) -> Result<bool, RegistryError> {
        // acts on the solved field only
        Ok(false)
    }

    fn constrain_field(
        &self,
        field: &mut VolField<f64>,
        mesh: &Mesh,
    ) -> Result<bool, RegistryError> {
        if field.name != self.fields[0] {
            return Ok(false);
        }
        let mut clipped = 0_usize;
        for &c in self.selection.cells(mesh)? {
            let v = field.internal[c];
            let bounded = v.clamp(self.min, self.max);
            if bounded != v {
                field.internal[c] = bounded;
                clipped += 1;
            }
        }
        if clipped > 0 {
            debug!(
                "{}: clipped {clipped} cells of '{}' into [{}, {}]",
                self.name, self.fields[0], self.min, self.max
            );
        }
        Ok(true)
    }

    fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        self.selection.update(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::line_mesh;
    use crate::fvm;

    #[test]
    fn fixed_value_overwrites_rows_after_sources() {
        let mesh = line_mesh(1.0, 3);
        let t = VolField::new("T", &mesh, 0.0);

        let config = serde_json::json!({
            "type": "fixedValueConstraint",
            "selectionMode": "cellSet",
            "cells": [1],
            "fieldValues": { "T": { "type": "constant", "value": 7.0 } }
        });
        let constraint = FixedValueConstraint::from_config("pin", &config, &mesh).unwrap();

        let mut eqn = fvm::diffusion(1.0, &t, &mesh);
        // additive source on the same cell must leave no residue
        eqn.source[1] += 123.0;
        assert!(constraint.constrain(&mut eqn, &mesh, 0.0).unwrap());

        assert_eq!(eqn.diag[1], 1.0);
        assert_eq!(eqn.source[1], 7.0);
        for (slot, _, owner, neigh) in mesh.internal_faces() {
            if owner == 1 {
                assert_eq!(eqn.upper[slot], 0.0);
            }
            if neigh == 1 {
                assert_eq!(eqn.lower[slot], 0.0);
            }
        }
    }

    #[test]
    fn limit_bounds_clips_only_inside_selection() {
        let mesh = line_mesh(1.0, 4);
        let config = serde_json::json!({
            "type": "limitBounds",
            "field": "T",
            "selectionMode": "cellSet",
            "cells": [0, 1],
            "min": 0.0,
            "max": 1.0
        });
        let constraint = LimitBounds::from_config("limitT", &config, &mesh).unwrap();

        let mut t = VolField::new("T", &mesh, 5.0);
        constraint.constrain_field(&mut t, &mesh).unwrap();
        assert_eq!(t.internal, vec![1.0, 1.0, 5.0, 5.0]);
    }
}
