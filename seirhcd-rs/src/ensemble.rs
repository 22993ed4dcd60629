use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::{
    compartments::{Compartment, IcuOverwhelm, cumulative_cases},
    config::{EnsembleConfig, IfrBounds},
    error::{SeirhcdError, SeirhcdResult},
    integrator::{FallbackTally, SeirHcdSystem, Trajectory, integrate},
    parameters::ParameterSet,
    reproduction::{DeathCap, ReproductionNumber, TransmissionPolicy},
    sampler::ParameterSampler,
};

/// Seed of the isolated random stream for `run_index`.
///
/// Streams depend only on the master seed and the run index, so sequential
/// and parallel ensembles draw identical numbers for every run.
pub fn stream_seed(seed: u64, run_index: usize) -> u64 {
    seed.wrapping_add((run_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub value: f64,
    pub day: usize,
}

impl Peak {
    fn of(series: &[f64]) -> Peak {
        series
            .iter()
            .enumerate()
            .fold(Peak { value: f64::NEG_INFINITY, day: 0 }, |peak, (day, &value)| {
                if value > peak.value { Peak { value, day } } else { peak }
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDiagnostics {
    pub rt_below_range: u64,
    pub rt_unmatched: u64,
    pub rhs_evaluations: u64,
    pub breakpoints_ascending: bool,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_index: usize,
    pub parameters: ParameterSet,
    pub trajectory: Trajectory,
    /// Effective R on each day, after the death-reactive cap.
    pub realized_rt: Vec<f64>,
    /// Infection fatality ratio in percent: `100 * D / (I + R + H + C + D)` on the last day.
    pub ifr: f64,
    /// Recovered fraction on the last day.
    pub attack_rate: f64,
    pub peak_hospitalized: Peak,
    pub peak_critical: Peak,
    pub diagnostics: RunDiagnostics,
}

impl RunResult {
    /// Derive the per-run scalars from an integrated trajectory.
    pub fn derive(
        run_index: usize,
        parameters: ParameterSet,
        trajectory: Trajectory,
        policy: &TransmissionPolicy,
        diagnostics: RunDiagnostics,
    ) -> SeirhcdResult<RunResult> {
        if let Some(day) = trajectory.first_non_finite_day() {
            return Err(SeirhcdError::NonFiniteState { run_index, day });
        }
        let last = trajectory.last().ok_or_else(|| SeirhcdError::Integration {
            run_index,
            message: "empty trajectory".to_string(),
        })?;
        let ifr = 100.0 * last[Compartment::Dead.index()] / cumulative_cases(last);
        let attack_rate = last[Compartment::Recovered.index()];
        let realized_rt = trajectory
            .states
            .iter()
            .enumerate()
            .map(|(day, y)| policy.effective(day as f64, y[Compartment::Dead.index()]).value)
            .collect();
        let peak_hospitalized = Peak::of(&trajectory.series(Compartment::Hospitalized));
        let peak_critical = Peak::of(&trajectory.series(Compartment::Critical));

        Ok(RunResult {
            run_index,
            parameters,
            trajectory,
            realized_rt,
            ifr,
            attack_rate,
            peak_hospitalized,
            peak_critical,
            diagnostics,
        })
    }
}

#[derive(Debug)]
pub struct RunFailure {
    pub run_index: usize,
    pub error: SeirhcdError,
}

/// Append-only collections of every completed run.
///
/// Every completed run contributes its trajectory, realized R(t), attack rate
/// and peaks. Only runs whose IFR lies inside the acceptance interval
/// contribute to `ifr`. Failed runs contribute to nothing but `failures`.
#[derive(Debug, Default)]
pub struct EnsembleOutput {
    pub trajectories: Vec<Trajectory>,
    pub realized_rt: Vec<Vec<f64>>,
    pub parameters: Vec<ParameterSet>,
    pub ifr: Vec<f64>,
    pub attack_rate: Vec<f64>,
    pub peak_hospitalized: Vec<f64>,
    pub peak_critical: Vec<f64>,
    /// Completed runs whose IFR fell outside the acceptance interval.
    pub rejected_runs: Vec<usize>,
    pub failures: Vec<RunFailure>,
}

impl EnsembleOutput {
    pub fn collect(&mut self, run: RunResult, bounds: &IfrBounds) {
        if bounds.contains(run.ifr) {
            self.ifr.push(run.ifr);
        } else {
            self.rejected_runs.push(run.run_index);
        }
        self.attack_rate.push(run.attack_rate);
        self.peak_hospitalized.push(run.peak_hospitalized.value);
        self.peak_critical.push(run.peak_critical.value);
        self.realized_rt.push(run.realized_rt);
        self.parameters.push(run.parameters);
        self.trajectories.push(run.trajectory);
    }

    pub fn record_failure(&mut self, failure: RunFailure) {
        self.failures.push(failure);
    }

    pub fn completed(&self) -> usize {
        self.trajectories.len()
    }

    pub fn accepted(&self) -> usize {
        self.ifr.len()
    }
}

pub struct Ensemble {
    config: EnsembleConfig,
    sampler: ParameterSampler,
    icu: Option<IcuOverwhelm>,
    death_cap: Option<DeathCap>,
}

impl Ensemble {
    /// Validate `config` and prepare the shared, read-only run inputs.
    pub fn new(config: EnsembleConfig) -> SeirhcdResult<Self> {
        config.validate()?;
        let sampler = ParameterSampler::new(config.priors.clone(), config.snapshot);
        let icu = if config.features.icu_overwhelm {
            Some(IcuOverwhelm::new(config.icu_capacity())?)
        } else {
            None
        };
        let death_cap = config.features.death_reactive_rt.then(DeathCap::default);
        Ok(Ensemble {
            config,
            sampler,
            icu,
            death_cap,
        })
    }

    pub fn policy(&self, parameters: &ParameterSet) -> TransmissionPolicy {
        TransmissionPolicy {
            rt: ReproductionNumber::Scheduled(parameters.schedule.clone()),
            death_cap: self.death_cap.clone(),
            population: self.config.snapshot.population,
        }
    }

    /// Execute every run, then fold the outcomes in run order.
    pub fn run(&self) -> EnsembleOutput {
        let config = &self.config;
        log::info!(
            "Running {} runs over {} days (seed {}, icu_overwhelm {}, death_reactive_rt {})",
            config.n_runs,
            config.model_days,
            config.seed,
            config.features.icu_overwhelm,
            config.features.death_reactive_rt
        );

        let outcomes: Vec<SeirhcdResult<RunResult>> = if config.parallel {
            (0..config.n_runs)
                .into_par_iter()
                .map(|run_index| self.run_single(run_index))
                .collect()
        } else {
            (0..config.n_runs)
                .map(|run_index| self.run_single(run_index))
                .collect()
        };

        let mut output = EnsembleOutput::default();
        for (run_index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(run) => output.collect(run, &config.ifr_bounds),
                Err(error) => {
                    log::warn!("Discarding run {run_index}: {error}");
                    output.record_failure(RunFailure { run_index, error });
                }
            }
        }

        log::info!(
            "Ensemble finished: {} completed, {} accepted, {} rejected by IFR, {} failed",
            output.completed(),
            output.accepted(),
            output.rejected_runs.len(),
            output.failures.len()
        );
        output
    }

    /// One run on its own random stream.
    pub fn run_single(&self, run_index: usize) -> SeirhcdResult<RunResult> {
        let mut rng = StdRng::seed_from_u64(stream_seed(self.config.seed, run_index));
        let parameters = self.sampler.sample(&mut rng)?;
        self.simulate(run_index, parameters, &mut rng)
    }

    /// Integrate a given parameter set and derive its metrics.
    pub fn simulate(
        &self,
        run_index: usize,
        parameters: ParameterSet,
        rng: &mut StdRng,
    ) -> SeirhcdResult<RunResult> {
        let breakpoints_ascending = parameters.schedule.is_ascending();
        if !breakpoints_ascending {
            log::warn!(
                "Run {run_index}: breakpoints out of order {:?}",
                parameters.schedule.days
            );
        }

        let policy = self.policy(&parameters);
        let tally = FallbackTally::default();
        let system = SeirHcdSystem::new(&parameters, &policy, self.icu.as_ref(), rng, &tally);
        let trajectory = integrate(
            system,
            parameters.initial_state,
            self.config.model_days,
            self.config.solver,
        )
        .map_err(|message| SeirhcdError::Integration { run_index, message })?;

        let fallbacks = tally.below_range() + tally.unmatched();
        if fallbacks > 0 {
            log::warn!(
                "Run {run_index}: R(t) fell back to R_0 for {fallbacks} of {} evaluations \
                 ({} below range, {} unmatched)",
                tally.evaluations(),
                tally.below_range(),
                tally.unmatched()
            );
        }
        let diagnostics = RunDiagnostics {
            rt_below_range: tally.below_range(),
            rt_unmatched: tally.unmatched(),
            rhs_evaluations: tally.evaluations(),
            breakpoints_ascending,
        };

        let run = RunResult::derive(run_index, parameters, trajectory, &policy, diagnostics)?;
        log::debug!(
            "Run {run_index}: IFR {:.3}%, attack rate {:.4}, peak H {:.3e} on day {}",
            run.ifr,
            run.attack_rate,
            run.peak_hospitalized.value,
            run.peak_hospitalized.day
        );
        Ok(run)
    }
}
