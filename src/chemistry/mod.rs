//! Per-cell reaction-rate evaluation, mechanism reduction, and stiff
//! sub-cycled integration over a species/reaction network.

pub mod model;
pub mod network;
pub mod ode;
pub mod rates;
pub mod reduction;

pub use model::{ChemistryConfig, ChemistryModel, ReductionStats};
pub use network::{Reaction, ReactionNetwork, Specie, SpecieCoeff};
pub use ode::{SubCycleControls, SubCycleStats};
pub use rates::{ArrheniusRate, FluxLimitedLangmuirHinshelwood, RateLaw};
pub use reduction::{CellReduction, NoReduction, Pfa, ReductionConfig, ReductionScratch};

/// Universal gas constant, J/(kmol K).
pub const R_GAS: f64 = 8314.46261815324;

pub const SMALL: f64 = 1e-15;
pub const ROOT_SMALL: f64 = 3.162_277_660_168_379_5e-8;
pub const VSMALL: f64 = 1e-300;
