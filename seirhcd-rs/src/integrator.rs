use std::cell::{Cell, RefCell};

use ode_solvers::{System, dopri5::Dopri5};
use rand::Rng;

use crate::{
    compartments::{Compartment, IcuOverwhelm, State, derivatives},
    config::SolverTolerance,
    parameters::ParameterSet,
    reproduction::{Fallback, TransmissionPolicy},
};

/// State at each whole day, `states[d]` is day `d`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub states: Vec<State>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn last(&self) -> Option<&State> {
        self.states.last()
    }

    pub fn series(&self, compartment: Compartment) -> Vec<f64> {
        self.states.iter().map(|y| y[compartment.index()]).collect()
    }

    pub fn map<F: Fn(&State) -> f64>(&self, f: F) -> Vec<f64> {
        self.states.iter().map(f).collect()
    }

    /// Largest deviation of the compartment total from one.
    pub fn conservation_error(&self) -> f64 {
        self.states
            .iter()
            .map(|y| (y.sum() - 1.0).abs())
            .fold(0.0, f64::max)
    }

    /// First day holding a non-finite value, if any.
    pub fn first_non_finite_day(&self) -> Option<usize> {
        self.states
            .iter()
            .position(|y| y.iter().any(|v| !v.is_finite()))
    }
}

/// Counts of R(t) lookups that fell back to the default value.
#[derive(Debug, Default)]
pub struct FallbackTally {
    below_range: Cell<u64>,
    unmatched: Cell<u64>,
    evaluations: Cell<u64>,
}

impl FallbackTally {
    fn record(&self, fallback: Option<Fallback>) {
        self.evaluations.set(self.evaluations.get() + 1);
        match fallback {
            Some(Fallback::BelowRange) => self.below_range.set(self.below_range.get() + 1),
            Some(Fallback::Unmatched) => self.unmatched.set(self.unmatched.get() + 1),
            None => {}
        }
    }

    pub fn below_range(&self) -> u64 {
        self.below_range.get()
    }

    pub fn unmatched(&self) -> u64 {
        self.unmatched.get()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.get()
    }
}

/// The SEIR-HCD right-hand side as seen by the solver.
///
/// The solver calls `system` through `&self`, so the random stream used for
/// ICU-overwhelm draws sits behind a `RefCell`.
pub struct SeirHcdSystem<'a, R> {
    params: &'a ParameterSet,
    policy: &'a TransmissionPolicy,
    icu: Option<&'a IcuOverwhelm>,
    rng: RefCell<&'a mut R>,
    tally: &'a FallbackTally,
}

impl<'a, R: Rng> SeirHcdSystem<'a, R> {
    pub fn new(
        params: &'a ParameterSet,
        policy: &'a TransmissionPolicy,
        icu: Option<&'a IcuOverwhelm>,
        rng: &'a mut R,
        tally: &'a FallbackTally,
    ) -> Self {
        SeirHcdSystem {
            params,
            policy,
            icu,
            rng: RefCell::new(rng),
            tally,
        }
    }
}

impl<R: Rng> System<f64, State> for SeirHcdSystem<'_, R> {
    fn system(&self, t: f64, y: &State, dy: &mut State) {
        let rt = self.policy.effective(t, y[Compartment::Dead.index()]);
        self.tally.record(rt.fallback);
        let mut rng = self.rng.borrow_mut();
        *dy = derivatives(y, rt.value, self.params, self.icu, &mut **rng);
    }
}

/// Integrate `system` from `initial` over days `[0, model_days - 1]`.
///
/// Returns the solver's message on failure; callers attach the run context.
pub fn integrate<F>(
    system: F,
    initial: State,
    model_days: usize,
    tolerance: SolverTolerance,
) -> Result<Trajectory, String>
where
    F: System<f64, State>,
{
    if model_days < 2 {
        return Ok(Trajectory {
            states: vec![initial; model_days],
        });
    }
    let horizon = model_days.saturating_sub(1) as f64;
    let mut stepper = Dopri5::new(
        system,
        0.0,
        horizon,
        1.0,
        initial,
        tolerance.rtol,
        tolerance.atol,
    );
    let stats = stepper.integrate().map_err(|e| format!("{e:?}"))?;
    log::trace!("solver stats: {stats}");

    let states: Vec<State> = stepper.y_out().iter().take(model_days).cloned().collect();
    if states.len() < model_days {
        return Err(format!(
            "solver produced {} of {} daily states",
            states.len(),
            model_days
        ));
    }
    Ok(Trajectory { states })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compartments::tests::parameter_set,
        reproduction::{DeathCap, ReproductionNumber},
    };
    use rand::{SeedableRng, rngs::StdRng};

    fn initial() -> State {
        State::from_column_slice(&[0.998, 0.001, 0.001, 0.0, 0.0, 0.0, 0.0])
    }

    const TIGHT: SolverTolerance = SolverTolerance {
        rtol: 1e-9,
        atol: 1e-12,
    };

    fn run(
        params: &ParameterSet,
        policy: &TransmissionPolicy,
        icu: Option<&IcuOverwhelm>,
        seed: u64,
        tolerance: SolverTolerance,
    ) -> Trajectory {
        let mut rng = StdRng::seed_from_u64(seed);
        let tally = FallbackTally::default();
        let system = SeirHcdSystem::new(params, policy, icu, &mut rng, &tally);
        integrate(system, params.initial_state, 120, tolerance).unwrap()
    }

    fn scheduled_policy(params: &ParameterSet) -> TransmissionPolicy {
        TransmissionPolicy {
            rt: ReproductionNumber::Scheduled(params.schedule.clone()),
            death_cap: Some(DeathCap::default()),
            population: 1e6,
        }
    }

    #[test]
    fn test_daily_grid() {
        let params = parameter_set(initial());
        let trajectory = run(&params, &scheduled_policy(&params), None, 0, TIGHT);
        assert_eq!(trajectory.len(), 120);
        assert!((trajectory.states[0] - initial()).amax() < 1e-15);
    }

    #[test]
    fn test_conservation() {
        let params = parameter_set(initial());
        let trajectory = run(&params, &scheduled_policy(&params), None, 0, SolverTolerance::default());
        assert!(trajectory.conservation_error() < 1e-9);
        assert_eq!(trajectory.first_non_finite_day(), None);
    }

    #[test]
    fn test_reproducible() {
        let params = parameter_set(initial());
        let policy = scheduled_policy(&params);
        let icu = IcuOverwhelm::new(40.0 / 1e6).unwrap();
        let a = run(&params, &policy, Some(&icu), 11, SolverTolerance::default());
        let b = run(&params, &policy, Some(&icu), 11, SolverTolerance::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_overwhelm_noise_conserves_loosely() {
        let params = parameter_set(initial());
        let icu = IcuOverwhelm::new(1e-6).unwrap();
        let trajectory = run(&params, &scheduled_policy(&params), Some(&icu), 5, SolverTolerance::default());
        assert!(trajectory.conservation_error() < 1e-6);
    }

    #[test]
    fn test_cumulative_cases_non_decreasing() {
        let params = parameter_set(initial());
        let trajectory = run(&params, &scheduled_policy(&params), None, 0, TIGHT);
        let cases = trajectory.map(crate::compartments::cumulative_cases);
        for pair in cases.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-9);
        }
        assert!(cases.iter().all(|c| *c <= 1.0 + 1e-9));
    }

    #[test]
    fn test_constant_r_below_one_dies_out() {
        let params = parameter_set(initial());
        let policy = TransmissionPolicy {
            rt: ReproductionNumber::Constant(0.5),
            death_cap: None,
            population: 1e6,
        };
        let trajectory = run(&params, &policy, None, 0, TIGHT);
        let infectious = trajectory.series(Compartment::Infectious);
        assert!(infectious[119] < infectious[0]);
        assert!(trajectory.states[119][0] > 0.99);
    }

    #[test]
    fn test_single_day_horizon() {
        let params = parameter_set(initial());
        let policy = scheduled_policy(&params);
        let mut rng = StdRng::seed_from_u64(0);
        let tally = FallbackTally::default();
        let system = SeirHcdSystem::new(&params, &policy, None, &mut rng, &tally);
        let trajectory = integrate(system, initial(), 1, TIGHT).unwrap();
        assert_eq!(trajectory.states, vec![initial()]);
        assert_eq!(tally.evaluations(), 0);
    }

    #[test]
    fn test_fallback_tally() {
        let tally = FallbackTally::default();
        tally.record(None);
        tally.record(Some(Fallback::BelowRange));
        tally.record(Some(Fallback::Unmatched));
        assert_eq!(tally.evaluations(), 3);
        assert_eq!(tally.below_range(), 1);
        assert_eq!(tally.unmatched(), 1);
    }
}
