use rand::{Rng, distr::Distribution};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::{
    compartments::{Compartment, State},
    config::ObservedSnapshot,
    error::{SeirhcdError, SeirhcdResult},
    parameters::ParameterSet,
    reproduction::{BreakpointSchedule, N_BREAKPOINTS},
};

/// Normal prior clamped to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mean: f64,
    pub sd: f64,
    pub min: f64,
    #[serde(default = "unbounded")]
    pub max: f64,
}

fn unbounded() -> f64 {
    f64::INFINITY
}

impl NormalPrior {
    pub const fn new(mean: f64, sd: f64, min: f64, max: f64) -> Self {
        NormalPrior { mean, sd, min, max }
    }

    pub const fn floored(mean: f64, sd: f64, min: f64) -> Self {
        NormalPrior::new(mean, sd, min, f64::INFINITY)
    }

    fn validate(&self, name: &str) -> SeirhcdResult<()> {
        let invalid = |message: &str| SeirhcdError::Prior {
            name: name.to_string(),
            message: message.to_string(),
        };
        if !self.mean.is_finite() {
            return Err(invalid("mean must be finite"));
        }
        if !self.sd.is_finite() || self.sd < 0.0 {
            return Err(invalid("sd must be finite and non-negative"));
        }
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(invalid("min must not exceed max"));
        }
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SeirhcdResult<f64> {
        let normal = Normal::new(self.mean, self.sd).map_err(|e| SeirhcdError::Prior {
            name: format!("N({}, {})", self.mean, self.sd),
            message: e.to_string(),
        })?;
        Ok(normal.sample(rng).clamp(self.min, self.max))
    }
}

/// One intervention tier: when it starts and how it rescales the previous R.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterventionPrior {
    /// Breakpoint day prior; draws are rounded to whole days. `None` pins the
    /// breakpoint at `fixed_day`.
    pub day: Option<NormalPrior>,
    #[serde(default)]
    pub fixed_day: f64,
    /// Multiplier applied to the previous tier's R.
    pub multiplier: NormalPrior,
    /// Scenario floor for this tier's R.
    pub floor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    pub t_inc: NormalPrior,
    pub t_inf: NormalPrior,
    pub t_hosp: NormalPrior,
    pub t_crit: NormalPrior,
    pub frac_asymptomatic: NormalPrior,
    /// Mild share of symptomatic infections.
    pub frac_mild_symptomatic: NormalPrior,
    pub frac_crit: NormalPrior,
    pub frac_fatal: NormalPrior,
    /// Detected share of symptomatic infections.
    pub frac_detected: NormalPrior,
    pub r0: NormalPrior,
    pub interventions: [InterventionPrior; N_BREAKPOINTS],
}

impl Default for Priors {
    fn default() -> Self {
        Priors {
            t_inc: NormalPrior::floored(5.1, 0.86, 1.0),
            t_inf: NormalPrior::floored(3.3, 0.72, 1.0),
            t_hosp: NormalPrior::floored(11.0, 3.0, 4.0),
            t_crit: NormalPrior::floored(10.0, 3.0, 4.0),
            frac_asymptomatic: NormalPrior::new(0.5, 0.1, 0.2, 0.8),
            frac_mild_symptomatic: NormalPrior::new(0.8, 0.05, 0.6, 0.95),
            frac_crit: NormalPrior::new(0.3, 0.1, 0.1, 0.6),
            frac_fatal: NormalPrior::new(0.4, 0.1, 0.2, 0.8),
            frac_detected: NormalPrior::new(0.5, 0.15, 0.1, 1.0),
            r0: NormalPrior::floored(2.8, 0.3, 1.5),
            interventions: [
                // Sentinel before day 0: every simulated time lands in a tier.
                InterventionPrior {
                    day: None,
                    fixed_day: -1.0,
                    multiplier: NormalPrior::floored(1.0, 0.05, 0.0),
                    floor: 1.2,
                },
                InterventionPrior {
                    day: Some(NormalPrior::floored(10.0, 2.0, 1.0)),
                    fixed_day: 0.0,
                    multiplier: NormalPrior::floored(0.5, 0.1, 0.0),
                    floor: 0.6,
                },
                InterventionPrior {
                    day: Some(NormalPrior::floored(45.0, 5.0, 1.0)),
                    fixed_day: 0.0,
                    multiplier: NormalPrior::floored(1.3, 0.15, 0.0),
                    floor: 0.8,
                },
                InterventionPrior {
                    day: Some(NormalPrior::floored(75.0, 5.0, 1.0)),
                    fixed_day: 0.0,
                    multiplier: NormalPrior::floored(1.15, 0.1, 0.0),
                    floor: 0.9,
                },
                InterventionPrior {
                    day: Some(NormalPrior::floored(110.0, 7.0, 1.0)),
                    fixed_day: 0.0,
                    multiplier: NormalPrior::floored(1.1, 0.1, 0.0),
                    floor: 1.0,
                },
            ],
        }
    }
}

impl Priors {
    pub fn validate(&self) -> SeirhcdResult<()> {
        let named = [
            ("t_inc", &self.t_inc),
            ("t_inf", &self.t_inf),
            ("t_hosp", &self.t_hosp),
            ("t_crit", &self.t_crit),
            ("frac_asymptomatic", &self.frac_asymptomatic),
            ("frac_mild_symptomatic", &self.frac_mild_symptomatic),
            ("frac_crit", &self.frac_crit),
            ("frac_fatal", &self.frac_fatal),
            ("frac_detected", &self.frac_detected),
            ("r0", &self.r0),
        ];
        for (name, prior) in named {
            prior.validate(name)?;
        }
        for (i, intervention) in self.interventions.iter().enumerate() {
            if let Some(day) = &intervention.day {
                day.validate(&format!("interventions[{i}].day"))?;
            }
            intervention
                .multiplier
                .validate(&format!("interventions[{i}].multiplier"))?;
            if !intervention.floor.is_finite() || intervention.floor < 0.0 {
                return Err(SeirhcdError::Prior {
                    name: format!("interventions[{i}].floor"),
                    message: "floor must be finite and non-negative".to_string(),
                });
            }
        }
        // Timings divide the rates, and the detected share divides the seed.
        for (name, prior) in [
            ("t_inc", &self.t_inc),
            ("t_inf", &self.t_inf),
            ("t_hosp", &self.t_hosp),
            ("t_crit", &self.t_crit),
            ("frac_detected", &self.frac_detected),
        ] {
            if prior.min <= 0.0 {
                return Err(SeirhcdError::Prior {
                    name: name.to_string(),
                    message: "min must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Draws one [`ParameterSet`] per call from a fixed set of priors.
#[derive(Debug, Clone)]
pub struct ParameterSampler {
    priors: Priors,
    snapshot: ObservedSnapshot,
}

impl ParameterSampler {
    pub fn new(priors: Priors, snapshot: ObservedSnapshot) -> Self {
        ParameterSampler { priors, snapshot }
    }

    /// Draw order is fixed, so a given stream always yields the same set.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SeirhcdResult<ParameterSet> {
        let priors = &self.priors;
        let t_inc = priors.t_inc.sample(rng)?;
        let t_inf = priors.t_inf.sample(rng)?;
        let t_hosp = priors.t_hosp.sample(rng)?;
        let t_crit = priors.t_crit.sample(rng)?;

        let frac_asymptomatic = priors.frac_asymptomatic.sample(rng)?;
        let frac_mild_symptomatic = priors.frac_mild_symptomatic.sample(rng)?;
        let frac_mild_total = frac_asymptomatic + (1.0 - frac_asymptomatic) * frac_mild_symptomatic;
        let frac_crit = priors.frac_crit.sample(rng)?;
        let frac_fatal = priors.frac_fatal.sample(rng)?;
        let frac_detected = priors.frac_detected.sample(rng)?;

        let schedule = self.sample_schedule(rng)?;
        let initial_state = self.initial_state(frac_asymptomatic, frac_detected)?;

        Ok(ParameterSet {
            t_inc,
            t_inf,
            t_hosp,
            t_crit,
            frac_mild_total,
            frac_crit,
            frac_fatal,
            frac_asymptomatic,
            frac_detected,
            schedule,
            initial_state,
        })
    }

    /// Random-walk tiers: each R is the previous tier's R times a fresh
    /// multiplier, floored independently.
    fn sample_schedule<R: Rng + ?Sized>(&self, rng: &mut R) -> SeirhcdResult<BreakpointSchedule> {
        let mut days = [0.0; N_BREAKPOINTS];
        let mut tiers = [0.0; N_BREAKPOINTS + 1];
        tiers[0] = self.priors.r0.sample(rng)?;
        for (i, intervention) in self.priors.interventions.iter().enumerate() {
            days[i] = match &intervention.day {
                Some(prior) => prior.sample(rng)?.round(),
                None => intervention.fixed_day,
            };
            let multiplier = intervention.multiplier.sample(rng)?.max(0.0);
            tiers[i + 1] = (tiers[i] * multiplier).max(intervention.floor);
        }
        Ok(BreakpointSchedule { days, tiers })
    }

    /// Seed compartments from observed counts, scaling tested cases up by the
    /// undetected share (asymptomatic plus unascertained symptomatic).
    fn initial_state(&self, frac_asymptomatic: f64, frac_detected: f64) -> SeirhcdResult<State> {
        let snapshot = &self.snapshot;
        let n = snapshot.population;
        let ascertainment = (1.0 - frac_asymptomatic) * frac_detected;

        let infectious = snapshot.active / ascertainment / n;
        let exposed = infectious;
        let resolved = (snapshot.cumulative
            - snapshot.active
            - snapshot.hospitalized
            - snapshot.critical
            - snapshot.dead)
            .max(0.0);
        let recovered = resolved / ascertainment / n;
        let hospitalized = snapshot.hospitalized / n;
        let critical = snapshot.critical / n;
        let dead = snapshot.dead / n;

        let mut state = State::zeros();
        state[Compartment::Exposed.index()] = exposed;
        state[Compartment::Infectious.index()] = infectious;
        state[Compartment::Recovered.index()] = recovered;
        state[Compartment::Hospitalized.index()] = hospitalized;
        state[Compartment::Critical.index()] = critical;
        state[Compartment::Dead.index()] = dead;
        state[Compartment::Susceptible.index()] = 1.0 - state.sum();

        match Compartment::ALL.into_iter().find(|c| state[c.index()] < 0.0) {
            Some(compartment) => Err(SeirhcdError::InvalidInitialState {
                compartment: compartment.name(),
                value: state[compartment.index()],
            }),
            None => Ok(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{SeedableRng, rngs::StdRng};

    fn sampler() -> ParameterSampler {
        ParameterSampler::new(Priors::default(), ObservedSnapshot::default())
    }

    #[test]
    fn test_same_stream_same_draw() {
        let sampler = sampler();
        let a = sampler.sample(&mut StdRng::seed_from_u64(42)).unwrap();
        let b = sampler.sample(&mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_draws_respect_clamps() {
        let sampler = sampler();
        let priors = Priors::default();
        let mut rng = StdRng::seed_from_u64(8675309);
        for _ in 0..2000 {
            let params = sampler.sample(&mut rng).unwrap();
            assert!(params.t_inc >= priors.t_inc.min);
            assert!(params.t_inf >= priors.t_inf.min);
            assert!(params.t_hosp >= priors.t_hosp.min);
            assert!(params.t_crit >= priors.t_crit.min);
            assert!((0.0..=1.0).contains(&params.frac_mild_total));
            assert!((0.1..=0.6).contains(&params.frac_crit));
            assert!((0.2..=0.8).contains(&params.frac_fatal));
            for (tier, intervention) in params.schedule.tiers[1..].iter().zip(&priors.interventions) {
                assert!(*tier >= intervention.floor);
            }
            assert_eq!(params.schedule.days[0], -1.0);
            for day in &params.schedule.days[1..] {
                assert_eq!(day.fract(), 0.0);
            }
        }
    }

    #[test]
    fn test_initial_state_sums_to_one() {
        let params = sampler().sample(&mut StdRng::seed_from_u64(3)).unwrap();
        assert_abs_diff_eq!(params.initial_state.sum(), 1.0, epsilon = 1e-15);
        assert!(params.initial_state.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_initial_state_scales_for_ascertainment() {
        let sampler = sampler();
        let state = sampler.initial_state(0.5, 0.5).unwrap();
        // 300 active cases at 25% ascertainment in a population of one million.
        assert_abs_diff_eq!(state[Compartment::Infectious.index()], 1200.0 / 1e6, epsilon = 1e-15);
        assert_abs_diff_eq!(state[Compartment::Recovered.index()], 642.0 * 4.0 / 1e6, epsilon = 1e-15);
        assert_abs_diff_eq!(state[Compartment::Dead.index()], 1e-5, epsilon = 1e-18);
    }

    #[test]
    fn test_oversized_snapshot_is_rejected() {
        let snapshot = ObservedSnapshot {
            active: 20_000.0,
            cumulative: 30_000.0,
            ..Default::default()
        };
        let sampler = ParameterSampler::new(Priors::default(), snapshot);
        // 4% ascertainment scales 20k active cases past the whole population.
        assert!(matches!(
            sampler.initial_state(0.5, 0.08),
            Err(SeirhcdError::InvalidInitialState {
                compartment: "susceptible",
                ..
            })
        ));
        let state = sampler.initial_state(0.2, 1.0).unwrap();
        assert!(state.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_degenerate_prior_pins_value() {
        let mut priors = Priors::default();
        priors.r0 = NormalPrior::floored(2.0, 0.0, 0.0);
        for intervention in priors.interventions.iter_mut() {
            intervention.multiplier = NormalPrior::floored(0.5, 0.0, 0.0);
            intervention.floor = 0.3;
        }
        let sampler = ParameterSampler::new(priors, ObservedSnapshot::default());
        let params = sampler.sample(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(params.schedule.tiers, [2.0, 1.0, 0.5, 0.3, 0.3, 0.3]);
    }

    #[test]
    fn test_validate_rejects_negative_sd() {
        let mut priors = Priors::default();
        priors.t_inf.sd = -1.0;
        assert!(matches!(priors.validate(), Err(SeirhcdError::Prior { .. })));
    }

    #[test]
    fn test_validate_rejects_non_positive_timing_floor() {
        let mut priors = Priors::default();
        priors.t_hosp.min = 0.0;
        assert!(priors.validate().is_err());
    }
}
