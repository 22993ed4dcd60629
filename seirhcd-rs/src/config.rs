use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SeirhcdError, SeirhcdResult},
    sampler::Priors,
};

/// Everything an ensemble needs, fixed before the first run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub n_runs: usize,
    pub model_days: usize,
    pub seed: u64,
    pub parallel: bool,
    pub log_level: String,
    pub features: FeatureFlags,
    pub ifr_bounds: IfrBounds,
    /// Critical-care beds; capacity as a population fraction is `icu_beds / N`.
    pub icu_beds: f64,
    pub snapshot: ObservedSnapshot,
    pub priors: Priors,
    pub solver: SolverTolerance,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        EnsembleConfig {
            n_runs: 1000,
            model_days: 200,
            seed: 0,
            parallel: false,
            log_level: "info".to_string(),
            features: FeatureFlags::default(),
            ifr_bounds: IfrBounds::default(),
            icu_beds: 40.0,
            snapshot: ObservedSnapshot::default(),
            priors: Priors::default(),
            solver: SolverTolerance::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub icu_overwhelm: bool,
    pub death_reactive_rt: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            icu_overwhelm: true,
            death_reactive_rt: true,
        }
    }
}

/// Open interval of plausible infection fatality ratios, in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IfrBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for IfrBounds {
    fn default() -> Self {
        IfrBounds {
            lower: 0.0,
            upper: 10.0,
        }
    }
}

impl IfrBounds {
    pub fn contains(&self, ifr: f64) -> bool {
        self.lower < ifr && ifr < self.upper
    }
}

/// Observed counts (head-counts, not fractions) used to seed initial conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservedSnapshot {
    pub population: f64,
    pub active: f64,
    pub cumulative: f64,
    pub hospitalized: f64,
    pub critical: f64,
    pub dead: f64,
}

impl Default for ObservedSnapshot {
    fn default() -> Self {
        ObservedSnapshot {
            population: 1_000_000.0,
            active: 300.0,
            cumulative: 1_000.0,
            hospitalized: 40.0,
            critical: 8.0,
            dead: 10.0,
        }
    }
}

/// Dopri5 tolerances.
///
/// The ICU-overwhelm draw makes the right-hand side noisy, and that noise does
/// not shrink with the step size, so very tight tolerances drive the step
/// size towards underflow while the ICU is overwhelmed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverTolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for SolverTolerance {
    fn default() -> Self {
        SolverTolerance {
            rtol: 1.0e-3,
            atol: 1.0e-6,
        }
    }
}

impl EnsembleConfig {
    pub fn from_toml_str(raw: &str) -> SeirhcdResult<Self> {
        let config: EnsembleConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn icu_capacity(&self) -> f64 {
        self.icu_beds / self.snapshot.population
    }

    pub fn log_level_filter(&self) -> SeirhcdResult<LevelFilter> {
        self.log_level.parse().map_err(|_| {
            SeirhcdError::Config(format!(
                "log_level '{}' is not one of off, error, warn, info, debug, trace",
                self.log_level
            ))
        })
    }

    pub fn validate(&self) -> SeirhcdResult<()> {
        let snapshot = &self.snapshot;
        ensure(
            snapshot.population.is_finite() && snapshot.population > 0.0,
            "population must be positive",
        )?;
        ensure(self.n_runs > 0, "n_runs must be at least 1")?;
        ensure(self.model_days > 0, "model_days must be at least 1")?;
        ensure(
            self.ifr_bounds.lower < self.ifr_bounds.upper,
            "ifr_bounds must be a non-empty open interval",
        )?;
        ensure(
            self.icu_beds.is_finite() && self.icu_beds >= 0.0,
            "icu_beds must be non-negative",
        )?;
        let counts = [
            snapshot.active,
            snapshot.cumulative,
            snapshot.hospitalized,
            snapshot.critical,
            snapshot.dead,
        ];
        ensure(
            counts.iter().all(|c| c.is_finite() && *c >= 0.0),
            "observed counts must be non-negative",
        )?;
        ensure(
            self.solver.rtol > 0.0 && self.solver.atol > 0.0,
            "solver tolerances must be positive",
        )?;
        self.log_level_filter()?;
        self.priors.validate()
    }
}

fn ensure(condition: bool, message: &str) -> SeirhcdResult<()> {
    if condition {
        Ok(())
    } else {
        Err(SeirhcdError::Config(message.to_string()))
    }
}
