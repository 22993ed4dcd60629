use thiserror::Error;

pub type SeirhcdResult<T> = Result<T, SeirhcdError>;

#[derive(Debug, Error)]
pub enum SeirhcdError {
    /// Unrecoverable configuration, rejected before any run executes.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid prior '{name}': {message}")]
    Prior { name: String, message: String },

    #[error("run {run_index}: integration failed: {message}")]
    Integration { run_index: usize, message: String },

    #[error("run {run_index}: non-finite state on day {day}")]
    NonFiniteState { run_index: usize, day: usize },

    /// The observed snapshot, scaled up for ascertainment, leaves a
    /// compartment negative.
    #[error("initial {compartment} fraction {value} is negative")]
    InvalidInitialState { compartment: &'static str, value: f64 },

    #[error("cannot aggregate an ensemble with no completed runs")]
    EmptyEnsemble,

    #[error("series lengths differ: expected {expected}, found {found}")]
    RaggedSeries { expected: usize, found: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
