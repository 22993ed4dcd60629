//! Monte Carlo SEIR-HCD epidemic forecasts.

pub mod aggregate;
pub mod compartments;
pub mod config;
pub mod ensemble;
pub mod environment;
pub mod error;
pub mod integrator;
pub mod output;
pub mod parameters;
pub mod reproduction;
pub mod sampler;

pub use config::EnsembleConfig;
pub use ensemble::{Ensemble, EnsembleOutput};
pub use error::{SeirhcdError, SeirhcdResult};
