//! Finite-volume equation assembly with reduced-mechanism chemistry.
//!
//! The crate provides the discretization/solve core of a reacting-flow
//! toolbox: fields over unstructured polyhedral meshes, additive
//! assembly of sparse equation matrices from implicit operators,
//! user-configured source/constraint registries, and a chemistry model
//! that prunes the active mechanism per cell (path-flux analysis) before
//! sub-cycling the stiff composition ODE.

pub mod chemistry;
pub mod discretization;
pub mod error;
pub mod field;
pub mod fvm;
pub mod models;
pub mod processing;
