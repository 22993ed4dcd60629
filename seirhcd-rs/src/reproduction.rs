pub const N_BREAKPOINTS: usize = 5;

/// Step schedule over intervention breakpoints `t_1..t_5`.
///
/// `tiers` holds `[R_0, R_t1, R_t2, R_t3, R_t4, R_t5]`. A time in
/// `(t_i, t_{i+1}]` maps to `R_ti`, a time past `t_5` maps to `R_t5`, and
/// anything else falls back to `R_0` with a [`Fallback`] flag.
///
/// Breakpoint days are sampled independently and their ordering is not
/// enforced. With out-of-order days the branches are still tried in schedule
/// order and the first match wins; see [`BreakpointSchedule::is_ascending`].
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointSchedule {
    pub days: [f64; N_BREAKPOINTS],
    pub tiers: [f64; N_BREAKPOINTS + 1],
}

/// Why a schedule lookup returned the fallback value instead of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// `t <= t_1`.
    BelowRange,
    /// No branch matched. The branches cover every finite `t > t_1` whatever
    /// the breakpoint order, so only a NaN time lands here.
    Unmatched,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtEvaluation {
    pub value: f64,
    pub fallback: Option<Fallback>,
}

impl RtEvaluation {
    fn tier(value: f64) -> Self {
        RtEvaluation {
            value,
            fallback: None,
        }
    }
}

impl BreakpointSchedule {
    pub fn fallback_value(&self) -> f64 {
        self.tiers[0]
    }

    pub fn is_ascending(&self) -> bool {
        self.days.windows(2).all(|w| w[0] < w[1])
    }

    pub fn evaluate(&self, t: f64) -> RtEvaluation {
        let days = &self.days;
        if t <= days[0] {
            return RtEvaluation {
                value: self.fallback_value(),
                fallback: Some(Fallback::BelowRange),
            };
        }
        for i in 0..N_BREAKPOINTS - 1 {
            if days[i] < t && t <= days[i + 1] {
                return RtEvaluation::tier(self.tiers[i + 1]);
            }
        }
        if t > days[N_BREAKPOINTS - 1] {
            return RtEvaluation::tier(self.tiers[N_BREAKPOINTS]);
        }
        RtEvaluation {
            value: self.fallback_value(),
            fallback: Some(Fallback::Unmatched),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReproductionNumber {
    Constant(f64),
    Scheduled(BreakpointSchedule),
}

impl ReproductionNumber {
    pub fn evaluate(&self, t: f64) -> RtEvaluation {
        match self {
            ReproductionNumber::Constant(value) => RtEvaluation::tier(*value),
            ReproductionNumber::Scheduled(schedule) => schedule.evaluate(t),
        }
    }
}

/// Maximum permissible R as a function of cumulative deaths (head-count).
///
/// The curve is tabulated at 100 evenly spaced death counts from 100 to
/// 50,000 with caps falling linearly from 3.0 to 1.2. Lookups return the cap
/// of the nearest tabulated death count (ties go to the lower count): the
/// result is a step function and is deliberately not interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct DeathCap {
    deaths: Vec<f64>,
    caps: Vec<f64>,
}

impl Default for DeathCap {
    fn default() -> Self {
        DeathCap::tabulated(100.0, 50_000.0, 3.0, 1.2, 100)
    }
}

impl DeathCap {
    pub fn tabulated(
        min_deaths: f64,
        max_deaths: f64,
        max_cap: f64,
        min_cap: f64,
        samples: usize,
    ) -> Self {
        DeathCap {
            deaths: linspace(min_deaths, max_deaths, samples),
            caps: linspace(max_cap, min_cap, samples),
        }
    }

    pub fn cap(&self, deaths: f64) -> f64 {
        self.caps[self.nearest_index(deaths)]
    }

    fn nearest_index(&self, deaths: f64) -> usize {
        let upper = self.deaths.partition_point(|&d| d < deaths);
        if upper == 0 {
            return 0;
        }
        if upper == self.deaths.len() {
            return upper - 1;
        }
        let lower = upper - 1;
        if deaths - self.deaths[lower] <= self.deaths[upper] - deaths {
            lower
        } else {
            upper
        }
    }
}

fn linspace(start: f64, end: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = samples - 1;
            (0..samples)
                .map(|i| {
                    if i == last {
                        end
                    } else {
                        start + (end - start) * i as f64 / last as f64
                    }
                })
                .collect()
        }
    }
}

/// Scheduled R(t) plus the optional death-reactive cap.
#[derive(Debug, Clone)]
pub struct TransmissionPolicy {
    pub rt: ReproductionNumber,
    pub death_cap: Option<DeathCap>,
    pub population: f64,
}

impl TransmissionPolicy {
    /// Effective R at time `t` given the dead compartment as a population fraction.
    pub fn effective(&self, t: f64, dead_fraction: f64) -> RtEvaluation {
        let scheduled = self.rt.evaluate(t);
        match &self.death_cap {
            Some(cap) => RtEvaluation {
                value: scheduled
                    .value
                    .min(cap.cap(dead_fraction * self.population)),
                ..scheduled
            },
            None => scheduled,
        }
    }
}
