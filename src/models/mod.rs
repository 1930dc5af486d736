//! User-configured source terms and constraints.
//!
//! Sources add to an equation's right-hand side (optionally with an
//! implicit part); constraints overwrite rows or clip solved fields.
//! Both are registered per run from configuration and applied exactly
//! once per assembly pass: the registries track applications and treat
//! a double or missing application as a contract violation.

pub mod cell_set;
pub mod constraints;
pub mod sources;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;

use crate::discretization::mesh::Mesh;
use crate::error::{ConfigError, RegistryError};
use crate::field::VolField;
use crate::fvm::matrix::FvMatrix;

pub use cell_set::{CellSelection, SelectionConfig};

/// A scalar value that may vary in time: the evaluation rule of a
/// configured source entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimeFunction {
    Constant { value: f64 },
    /// Piecewise-linear in time, clamped at both ends.
    Table { values: Vec<(f64, f64)> },
}

impl TimeFunction {
    pub fn validate(&self, context: &str) -> Result<(), ConfigError> {
        if let TimeFunction::Table { values } = self {
            if values.is_empty() {
                return Err(ConfigError::BadValue {
                    context: context.to_string(),
                    key: "values".to_string(),
                    reason: "empty table".to_string(),
                });
            }
            if values.windows(2).any(|w| w[1].0 <= w[0].0) {
                return Err(ConfigError::BadValue {
                    context: context.to_string(),
                    key: "values".to_string(),
                    reason: "table times must be strictly increasing".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn value(&self, t: f64) -> f64 {
        match self {
            TimeFunction::Constant { value } => *value,
            TimeFunction::Table { values } => {
                if t <= values[0].0 {
                    return values[0].1;
                }
                if t >= values[values.len() - 1].0 {
                    return values[values.len() - 1].1;
                }
                let i = values.partition_point(|&(ti, _)| ti <= t) - 1;
                let (t0, v0) = values[i];
                let (t1, v1) = values[i + 1];
                v0 + (v1 - v0) * (t - t0) / (t1 - t0)
            }
        }
    }
}

/// An additive source term scoped to a cell subset.
pub trait FvModel: Send + Sync {
    fn name(&self) -> &str;

    /// Fields this model contributes to.
    fn source_fields(&self) -> &[String];

    /// Add the model's contribution to an equation for one of its fields.
    /// Returns whether the model acted on this equation.
    fn add_sup(
        &self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<bool, RegistryError>;

    /// Re-resolve cell selections after a topology change.
    fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError>;
}

/// A constraint: a row overwrite on an equation and/or a clip on the
/// solved field.
pub trait FvConstraint: Send + Sync {
    fn name(&self) -> &str;

    fn constrained_fields(&self) -> &[String];

    fn constrain(
        &self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<bool, RegistryError>;

    fn constrain_field(
        &self,
        field: &mut VolField<f64>,
        mesh: &Mesh,
    ) -> Result<bool, RegistryError>;

    fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError>;
}

/// The active set of configured sources, with per-pass application
/// tracking.
#[derive(Default)]
pub struct FvModels {
    entries: Vec<Box<dyn FvModel>>,
    applied: HashSet<(String, String)>,
    pass_open: bool,
}

impl FvModels {
    pub fn push(&mut self, model: Box<dyn FvModel>) {
        self.entries.push(model);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open a fresh assembly pass, clearing the application-tracking set.
    pub fn begin_pass(&mut self) {
        self.applied.clear();
        self.pass_open = true;
    }

    /// Apply every source declared for this equation's field.
    pub fn add_sup(
        &mut self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<(), RegistryError> {
        if !self.pass_open {
            return Err(RegistryError::NoOpenPass {
                field: eqn.field_name.clone(),
            });
        }
        for entry in &self.entries {
            if entry.add_sup(eqn, mesh, time)? {
                let key = (entry.name().to_string(), eqn.field_name.clone());
                if !self.applied.insert(key) {
                    return Err(RegistryError::DoubleApplied {
                        name: entry.name().to_string(),
                        field: eqn.field_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Close the pass, checking that every declared source entered the
    /// equation it was configured to modify.
    pub fn finish_pass(&mut self) -> Result<(), RegistryError> {
        self.pass_open = false;
        for entry in &self.entries {
            for field in entry.source_fields() {
                let key = (entry.name().to_string(), field.clone());
                if !self.applied.contains(&key) {
                    return Err(RegistryError::NotApplied {
                        name: entry.name().to_string(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        for entry in &mut self.entries {
            entry.update_mesh(mesh)?;
        }
        Ok(())
    }
}

/// The active set of configured constraints, with per-pass tracking over
/// both the equation and the field application paths.
#[derive(Default)]
pub struct FvConstraints {
    entries: Vec<Box<dyn FvConstraint>>,
    applied: HashSet<(String, String)>,
    pass_open: bool,
}

impl FvConstraints {
    pub fn push(&mut self, constraint: Box<dyn FvConstraint>) {
        self.entries.push(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn begin_pass(&mut self) {
        self.applied.clear();
        self.pass_open = true;
    }

    /// Returns true if any constraint declares the given field.
    pub fn constrains_field(&self, field: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.constrained_fields().iter().any(|f| f == field))
    }

    /// Apply row-overwrite constraints to an equation. Must run after all
    /// additive sources for the field.
    pub fn constrain(
        &mut self,
        eqn: &mut FvMatrix<f64>,
        mesh: &Mesh,
        time: f64,
    ) -> Result<(), RegistryError> {
        if !self.pass_open {
            return Err(RegistryError::NoOpenPass {
                field: eqn.field_name.clone(),
            });
        }
        for entry in &self.entries {
            if entry.constrain(eqn, mesh, time)? {
                Self::record(&mut self.applied, entry.name(), &eqn.field_name)?;
            }
        }
        Ok(())
    }

    /// Apply value-clipping constraints to a solved field.
    pub fn constrain_field(
        &mut self,
        field: &mut VolField<f64>,
        mesh: &Mesh,
    ) -> Result<(), RegistryError> {
        if !self.pass_open {
            return Err(RegistryError::NoOpenPass {
                field: field.name.clone(),
            });
        }
        let name = field.name.clone();
        for entry in &self.entries {
            if entry.constrain_field(field, mesh)? {
                Self::record(&mut self.applied, entry.name(), &name)?;
            }
        }
        Ok(())
    }

    fn record(
        applied: &mut HashSet<(String, String)>,
        name: &str,
        field: &str,
    ) -> Result<(), RegistryError> {
        if !applied.insert((name.to_string(), field.to_string())) {
            return Err(RegistryError::DoubleApplied {
                name: name.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    pub fn finish_pass(&mut self) -> Result<(), RegistryError> {
        self.pass_open = false;
        for entry in &self.entries {
            for field in entry.constrained_fields() {
                if !self.applied.contains(&(entry.name().to_string(), field.clone())) {
                    return Err(RegistryError::NotApplied {
                        name: entry.name().to_string(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn update_mesh(&mut self, mesh: &Mesh) -> Result<(), ConfigError> {
        for entry in &mut self.entries {
            entry.update_mesh(mesh)?;
        }
        Ok(())
    }
}

type ModelBuilder =
    Box<dyn Fn(&str, &serde_json::Value, &Mesh) -> Result<Box<dyn FvModel>, ConfigError> + Send + Sync>;
type ConstraintBuilder = Box<
    dyn Fn(&str, &serde_json::Value, &Mesh) -> Result<Box<dyn FvConstraint>, ConfigError>
        + Send
        + Sync,
>;

/// Maps configuration type names to constructor closures. Built per
/// process (or per test case); there is no global registration state.
pub struct ModelRegistry {
    models: HashMap<String, ModelBuilder>,
    constraints: HashMap<String, ConstraintBuilder>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            constraints: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in model set.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register_model("semiImplicitSource", |name, value, mesh| {
            let model = sources::SemiImplicitSource::from_config(name, value, mesh)?;
            Ok(Box::new(model) as Box<dyn FvModel>)
        });
        reg.register_model("massSource", |name, value, mesh| {
            let model = sources::MassSource::from_config(name, value, mesh)?;
            Ok(Box::new(model) as Box<dyn FvModel>)
        });
        reg.register_constraint("fixedValueConstraint", |name, value, mesh| {
            let constraint = constraints::FixedValueConstraint::from_config(name, value, mesh)?;
            Ok(Box::new(constraint) as Box<dyn FvConstraint>)
        });
        reg.register_constraint("limitBounds", |name, value, mesh| {
            let constraint = constraints::LimitBounds::from_config(name, value, mesh)?;
            Ok(Box::new(constraint) as Box<dyn FvConstraint>)
        });
        reg
    }

    pub fn register_model(
        &mut self,
        type_name: &str,
        builder: impl Fn(&str, &serde_json::Value, &Mesh) -> Result<Box<dyn FvModel>, ConfigError>
            + Send
            + Sync
            + 'static,
    ) {
        self.models.insert(type_name.to_string(), Box::new(builder));
    }

    pub fn register_constraint(
        &mut self,
        type_name: &str,
        builder: impl Fn(&str, &serde_json::Value, &Mesh) -> Result<Box<dyn FvConstraint>, ConfigError>
            + Send
            + Sync
            + 'static,
    ) {
        self.constraints
            .insert(type_name.to_string(), Box::new(builder));
    }

    /// Build the model and constraint sets from a configuration
    /// dictionary: `{ entryName: { "type": ..., ... }, ... }`. Entries are
    /// instantiated in name order so construction is deterministic.
    pub fn build(
        &self,
        config: &serde_json::Value,
        mesh: &Mesh,
    ) -> Result<(FvModels, FvConstraints), ConfigError> {
        let mut models = FvModels::default();
        let mut constraints = FvConstraints::default();

        let Some(entries) = config.as_object() else {
            return Err(ConfigError::BadValue {
                context: "fvModels".to_string(),
                key: "<root>".to_string(),
                reason: "expected a dictionary of named entries".to_string(),
            });
        };

        let sorted: BTreeMap<_, _> = entries.iter().collect();
        for (name, value) in sorted {
            let type_name = value
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| ConfigError::MissingKey {
                    context: name.clone(),
                    key: "type".to_string(),
                })?;

            if let Some(builder) = self.models.get(type_name) {
                models.push(builder(name, value, mesh)?);
            } else if let Some(builder) = self.constraints.get(type_name) {
                constraints.push(builder(name, value, mesh)?);
            } else {
                return Err(ConfigError::UnknownType {
                    context: name.clone(),
                    type_name: type_name.to_string(),
                });
            }
        }

        Ok((models, constraints))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_interpolates_and_clamps() {
        let f = TimeFunction::Table {
            values: vec![(0.0, 1.0), (1.0, 3.0), (2.0, 3.0)],
        };
        f.validate("test").unwrap();
        assert_eq!(f.value(-1.0), 1.0);
        assert!((f.value(0.5) - 2.0).abs() < 1e-12);
        assert_eq!(f.value(5.0), 3.0);
    }

    #[test]
    fn non_monotonic_table_is_rejected() {
        let f = TimeFunction::Table {
            values: vec![(0.0, 1.0), (0.0, 2.0)],
        };
        assert!(f.validate("test").is_err());
    }
}
