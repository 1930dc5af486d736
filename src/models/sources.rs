use serde::Deserialize;

use super::cell_set::{CellSelection, SelectionConfig};
use super::{FvModel, TimeFunction};
use crate::discretization::mesh::Mesh;
use crate::error::{ConfigError, RegistryError};
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
struct SemiImplicitSourceConfig {
    field: String,
    #[serde(flatten)]
    selection: SelectionConfig,
    #[serde(default)]
    su: Option<TimeFunction>,
    #[serde(default)]
    sp: Option<TimeFunction>,
}

/// Explicit-plus-implicit volumetric source on a cell subset:
/// contributes `su + sp * psi` to the right-hand side of the configured
/// field's equation.
pub struct SemiImplicitSource {
    name: String,
    fields: [String; 1],
    selection: CellSelection,
    su: Option<TimeFunction>,
    sp: Option<TimeFunction>,
}

impl SemiImplicitSource {
    pub fn from_config(
        name: &str,
        value: &serde_json::Value,
        mesh: &Mesh,
    ) -> Result<Self, ConfigError> {
        let config: SemiImplicitSourceConfig = parse(name, value)?;
        if config.su.is_none() && config.sp.is_none() {
            return Err(ConfigError::MissingKey {
                context: name.to_string(),
                key: "su/sp".to_string(),
            });
        }
        if let Some(f) = &config.su {
            f.validate(name)?;
        }
        if let Some(f) = &config.sp {
            f.validate(name)?;
        }
        Ok(Self {
            name: name.to_string(),
            fields: [config.field],
            selection: CellSelection::resolve(config.selection, mesh, name)?,
            su: config.su,
            sp: config.sp,
        })
    }
}

impl FvModel for SemiImplicitSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_fields(&self) -> &[String] {
        &self.fields
    }

    fn add_sup(
        &self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<bool, RegistryError> {
        if eqn.field_name != self.fields[0] {
            return Ok(false);
        }
        let su = self.su.as_ref().map_or(0.0, |f| f.value(time));
        let sp = self.sp.as_ref().map_or(0.0, |f| f.value(time));
        for &c in self.selection.cells(mesh)? {
            eqn.source[c] += su;
            eqn.diag[c] -= sp;
        }
        Ok(true)
    }

    fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        self.selection.update(mesh)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MassSourceConfig {
    fields: Vec<String>,
    #[serde(flatten)]
    selection: SelectionConfig,
    rate: TimeFunction,
}

/// Injects a total rate uniformly over a cell subset: each declared
/// field's equation receives `rate / V_set` per unit volume.
pub struct MassSource {
    name: String,
    fields: Vec<String>,
    selection: CellSelection,
    rate: TimeFunction,
}

impl MassSource {
    pub fn from_config(
        name: &str,
        value: &serde_json::Value,
        mesh: &Mesh,
    ) -> Result<Self, ConfigError> {
        let config: MassSourceConfig = parse(name, value)?;
        if config.fields.is_empty() {
            return Err(ConfigError::MissingKey {
                context: name.to_string(),
                key: "fields".to_string(),
            });
        }
        config.rate.validate(name)?;
        Ok(Self {
            name: name.to_string(),
            fields: config.fields,
            selection: CellSelection::resolve(config.selection, mesh, name)?,
            rate: config.rate,
        })
    }
}

impl FvModel for MassSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_fields(&self) -> &[String] {
        &self.fields
    }

    fn add_sup(
        &self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<bool, RegistryError> {
        if !self.fields.iter().any(|f| *f == eqn.field_name) {
            return Ok(false);
        }
        let volume = self.selection.volume(mesh)?;
        let density = self.rate.value(time) / volume;
        for &c in self.selection.cells(mesh)? {
            eqn.source[c] += density;
        }
        Ok(true)
    }

    fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        self.selection.update(mesh)
    }
}
