use thiserror::Error;

/// Errors raised while constructing models from configuration.
/// These are never retried; a malformed case setup aborts the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required entry '{key}' in '{context}'")]
    MissingKey { context: String, key: String },

    #[error("entry '{key}' in '{context}': {reason}")]
    BadValue {
        context: String,
        key: String,
        reason: String,
    },

    #[error("unknown type '{type_name}' for '{context}'")]
    UnknownType { context: String, type_name: String },

    #[error("unknown species '{name}' in '{context}'")]
    UnknownSpecies { context: String, name: String },

    #[error("unknown cell zone '{zone}' in '{context}'")]
    UnknownZone { context: String, zone: String },

    #[error("'{context}': expected {expected} {key} coefficients, got {actual}")]
    CoefficientCount {
        context: String,
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Sizing mismatches between a field or matrix and the current mesh.
/// These signal a missed topology-change rebuild and are always fatal.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("field '{name}': internal size {actual} does not match cell count {expected}")]
    InternalSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("field '{name}', patch {patch}: boundary size {actual} does not match patch face count {expected}")]
    BoundarySize {
        name: String,
        patch: usize,
        expected: usize,
        actual: usize,
    },

    #[error("matrix for '{name}': {what} size {actual} does not match mesh ({expected})")]
    MatrixSize {
        name: String,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("selection for '{name}' resolved against mesh version {cached}, current is {current}")]
    StaleSelection {
        name: String,
        cached: u64,
        current: u64,
    },
}

/// Failures of the linear-solve glue around the external solver.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("linear solve for '{field}' failed: {reason}")]
    LinearSolveFailed { field: String, reason: String },

    #[error("linear solve for '{field}' produced non-finite values")]
    NonFinite { field: String },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Contract violations in the source/constraint registries, detected by the
/// per-pass application tracking set.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("'{name}' applied twice to field '{field}' in one assembly pass")]
    DoubleApplied { name: String, field: String },

    #[error("'{name}' declares field '{field}' but was never applied this pass")]
    NotApplied { name: String, field: String },

    #[error("apply called on field '{field}' outside an open assembly pass")]
    NoOpenPass { field: String },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Failures of the chemistry integration after local retries are exhausted.
#[derive(Debug, Error)]
pub enum ChemistryError {
    #[error(
        "stiff integration failure in cell {cell}: sub-step {dt:.3e} fell below floor {dt_min:.3e} at t = {t:.3e}"
    )]
    StepUnderflow {
        cell: usize,
        t: f64,
        dt: f64,
        dt_min: f64,
    },

    #[error("non-finite reaction rate in cell {cell} (T = {temperature:.3e})")]
    NonFiniteRate { cell: usize, temperature: f64 },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}
