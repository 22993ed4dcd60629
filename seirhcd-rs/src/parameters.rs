use crate::{compartments::State, reproduction::BreakpointSchedule};

/// One coherent draw of every per-run quantity. Never mutated after sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    /// Incubation period, days.
    pub t_inc: f64,
    /// Infectious period, days.
    pub t_inf: f64,
    /// Hospital dwell before recovery or escalation, days.
    pub t_hosp: f64,
    /// Critical-care dwell before death or step-down, days.
    pub t_crit: f64,
    /// Infections that never need hospital care (asymptomatic plus mild).
    pub frac_mild_total: f64,
    /// Hospitalised patients who become critical.
    pub frac_crit: f64,
    /// Critical patients who die under normal care.
    pub frac_fatal: f64,
    pub frac_asymptomatic: f64,
    /// Share of symptomatic infections that are detected by testing.
    pub frac_detected: f64,
    pub schedule: BreakpointSchedule,
    pub initial_state: State,
}
