use nalgebra::SVector;
use rand::{Rng, distr::Distribution};
use rand_distr::Normal;

use crate::{
    error::{SeirhcdError, SeirhcdResult},
    parameters::ParameterSet,
};

pub type State = SVector<f64, 7>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compartment {
    Susceptible,
    Exposed,
    Infectious,
    Recovered,
    Hospitalized,
    Critical,
    Dead,
}

impl Compartment {
    pub const ALL: [Compartment; 7] = [
        Compartment::Susceptible,
        Compartment::Exposed,
        Compartment::Infectious,
        Compartment::Recovered,
        Compartment::Hospitalized,
        Compartment::Critical,
        Compartment::Dead,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Compartment::Susceptible => "susceptible",
            Compartment::Exposed => "exposed",
            Compartment::Infectious => "infectious",
            Compartment::Recovered => "recovered",
            Compartment::Hospitalized => "hospitalized",
            Compartment::Critical => "critical",
            Compartment::Dead => "dead",
        }
    }
}

/// Everyone who has left S and E: `I + R + H + C + D`.
pub fn cumulative_cases(state: &State) -> f64 {
    [
        Compartment::Infectious,
        Compartment::Recovered,
        Compartment::Hospitalized,
        Compartment::Critical,
        Compartment::Dead,
    ]
    .iter()
    .map(|c| state[c.index()])
    .sum()
}

/// Raised fatality for the share of critical patients beyond ICU capacity.
#[derive(Debug, Clone)]
pub struct IcuOverwhelm {
    /// ICU capacity as a population fraction.
    pub capacity: f64,
    untreated_fatality: Normal<f64>,
    max_fatality: f64,
}

impl IcuOverwhelm {
    pub fn new(capacity: f64) -> SeirhcdResult<Self> {
        let untreated_fatality = Normal::new(0.75, 0.10).map_err(|e| SeirhcdError::Prior {
            name: "untreated_fatality".to_string(),
            message: e.to_string(),
        })?;
        Ok(IcuOverwhelm {
            capacity,
            untreated_fatality,
            max_fatality: 0.95,
        })
    }

    /// Fatality fraction for the current critical load.
    ///
    /// Below capacity this is `frac_fatal`. Above it the overflow share gets a
    /// fresh untreated-fatality draw on every call, so the ODE right-hand side
    /// is stochastic while the ICU is overwhelmed.
    pub fn fatality<R: Rng + ?Sized>(&self, critical: f64, frac_fatal: f64, rng: &mut R) -> f64 {
        if critical <= self.capacity {
            return frac_fatal;
        }
        let untreated = self.untreated_fatality.sample(rng).min(self.max_fatality);
        (self.capacity / critical) * frac_fatal + ((critical - self.capacity) / critical) * untreated
    }
}

/// Instantaneous rates of change for all seven compartments at effective R `r`.
///
/// The adjusted fatality fraction is used for both the death flow and the
/// step-down flow back to H, so the derivatives sum to zero within a single
/// evaluation. Across solver stages each evaluation draws its own fatality
/// while overwhelmed, which makes the trajectory noisy but still conservative
/// up to solver error.
pub fn derivatives<R: Rng + ?Sized>(
    state: &State,
    r: f64,
    params: &ParameterSet,
    icu: Option<&IcuOverwhelm>,
    rng: &mut R,
) -> State {
    let s = state[Compartment::Susceptible.index()];
    let e = state[Compartment::Exposed.index()];
    let i = state[Compartment::Infectious.index()];
    let h = state[Compartment::Hospitalized.index()];
    let c = state[Compartment::Critical.index()];

    let frac_fatal = match icu {
        Some(icu) => icu.fatality(c, params.frac_fatal, rng),
        None => params.frac_fatal,
    };

    let infection = (r / params.t_inf) * i * s;
    let onset = e / params.t_inc;
    let removal = i / params.t_inf;
    let discharge = h / params.t_hosp;
    let critical_exit = c / params.t_crit;

    let mut dy = State::zeros();
    dy[Compartment::Susceptible.index()] = -infection;
    dy[Compartment::Exposed.index()] = infection - onset;
    dy[Compartment::Infectious.index()] = onset - removal;
    dy[Compartment::Hospitalized.index()] = (1.0 - params.frac_mild_total) * removal
        + (1.0 - frac_fatal) * critical_exit
        - discharge;
    dy[Compartment::Critical.index()] = params.frac_crit * discharge - critical_exit;
    dy[Compartment::Recovered.index()] =
        params.frac_mild_total * removal + (1.0 - params.frac_crit) * discharge;
    dy[Compartment::Dead.index()] = frac_fatal * critical_exit;
    dy
}
