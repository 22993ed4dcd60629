use crate::{
    compartments::{Compartment, cumulative_cases},
    ensemble::EnsembleOutput,
    error::{SeirhcdError, SeirhcdResult},
    integrator::Trajectory,
};

/// Percentile of already sorted values, `p` in `[0, 100]`, interpolated
/// linearly at rank `p / 100 * (n - 1)`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let weight = rank - lower as f64;
            if weight == 0.0 {
                sorted[lower]
            } else {
                sorted[lower] + weight * (sorted[upper] - sorted[lower])
            }
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Per-day median, mean and the 68% and 95% central bands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bands {
    pub median: Vec<f64>,
    pub mean: Vec<f64>,
    pub p2_5: Vec<f64>,
    pub p16: Vec<f64>,
    pub p84: Vec<f64>,
    pub p97_5: Vec<f64>,
}

impl Bands {
    /// Bands across `series`, one series per run, all of equal length.
    pub fn from_series(series: &[Vec<f64>]) -> SeirhcdResult<Bands> {
        let first = series.first().ok_or(SeirhcdError::EmptyEnsemble)?;
        let days = first.len();
        if let Some(ragged) = series.iter().find(|s| s.len() != days) {
            return Err(SeirhcdError::RaggedSeries {
                expected: days,
                found: ragged.len(),
            });
        }

        let mut bands = Bands::default();
        for day in 0..days {
            let column: Vec<f64> = series.iter().map(|s| s[day]).collect();
            let column = sorted(&column);
            bands.median.push(percentile(&column, 50.0));
            bands.mean.push(mean(&column));
            bands.p2_5.push(percentile(&column, 2.5));
            bands.p16.push(percentile(&column, 16.0));
            bands.p84.push(percentile(&column, 84.0));
            bands.p97_5.push(percentile(&column, 97.5));
        }
        Ok(bands)
    }

    pub fn len(&self) -> usize {
        self.median.len()
    }

    pub fn is_empty(&self) -> bool {
        self.median.is_empty()
    }
}

pub fn compartment_bands(trajectories: &[Trajectory], compartment: Compartment) -> SeirhcdResult<Bands> {
    let series: Vec<Vec<f64>> = trajectories.iter().map(|t| t.series(compartment)).collect();
    Bands::from_series(&series)
}

pub fn cumulative_case_bands(trajectories: &[Trajectory]) -> SeirhcdResult<Bands> {
    let series: Vec<Vec<f64>> = trajectories.iter().map(|t| t.map(cumulative_cases)).collect();
    Bands::from_series(&series)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p2_5: f64,
    pub p97_5: f64,
}

impl ScalarSummary {
    /// `None` for an empty list.
    pub fn of(values: &[f64]) -> Option<ScalarSummary> {
        if values.is_empty() {
            return None;
        }
        let sorted = sorted(values);
        Some(ScalarSummary {
            count: sorted.len(),
            mean: mean(&sorted),
            median: percentile(&sorted, 50.0),
            p2_5: percentile(&sorted, 2.5),
            p97_5: percentile(&sorted, 97.5),
        })
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleSummary {
    pub hospitalized: Bands,
    pub critical: Bands,
    pub dead: Bands,
    pub cumulative_cases: Bands,
    pub realized_rt: Bands,
    /// Over accepted runs only; `None` when every run was rejected.
    pub ifr: Option<ScalarSummary>,
    /// Over every completed run.
    pub attack_rate: ScalarSummary,
    pub peak_hospitalized: ScalarSummary,
    pub peak_critical: ScalarSummary,
    pub completed: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Summarise a finished ensemble. Fails only when no run completed.
pub fn summarize(output: &EnsembleOutput) -> SeirhcdResult<EnsembleSummary> {
    let trajectories = &output.trajectories;
    let scalar = |values: &[f64]| ScalarSummary::of(values).ok_or(SeirhcdError::EmptyEnsemble);
    Ok(EnsembleSummary {
        hospitalized: compartment_bands(trajectories, Compartment::Hospitalized)?,
        critical: compartment_bands(trajectories, Compartment::Critical)?,
        dead: compartment_bands(trajectories, Compartment::Dead)?,
        cumulative_cases: cumulative_case_bands(trajectories)?,
        realized_rt: Bands::from_series(&output.realized_rt)?,
        ifr: ScalarSummary::of(&output.ifr),
        attack_rate: scalar(&output.attack_rate)?,
        peak_hospitalized: scalar(&output.peak_hospitalized)?,
        peak_critical: scalar(&output.peak_critical)?,
        completed: output.completed(),
        accepted: output.accepted(),
        rejected: output.rejected_runs.len(),
        failed: output.failures.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartments::State;
    use approx::assert_abs_diff_eq;

    fn constant_runs() -> Vec<Vec<f64>> {
        vec![vec![0.1; 4], vec![0.3; 4], vec![0.2; 4]]
    }

    #[test]
    fn test_bands_of_constant_runs() {
        let bands = Bands::from_series(&constant_runs()).unwrap();
        assert_eq!(bands.len(), 4);
        for day in 0..4 {
            assert_eq!(bands.median[day], 0.2);
            assert_abs_diff_eq!(bands.mean[day], 0.2, epsilon = 1e-15);
            assert_abs_diff_eq!(bands.p16[day], 0.132, epsilon = 1e-15);
            assert_abs_diff_eq!(bands.p84[day], 0.268, epsilon = 1e-15);
            assert_abs_diff_eq!(bands.p2_5[day], 0.105, epsilon = 1e-15);
            assert_abs_diff_eq!(bands.p97_5[day], 0.295, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_percentile_edges() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert_eq!(percentile(&values, 50.0), 2.5);
        assert_eq!(percentile(&[7.0], 16.0), 7.0);
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_bands_reject_empty_and_ragged() {
        assert!(matches!(Bands::from_series(&[]), Err(SeirhcdError::EmptyEnsemble)));
        let ragged = vec![vec![0.1; 3], vec![0.1; 2]];
        assert!(matches!(
            Bands::from_series(&ragged),
            Err(SeirhcdError::RaggedSeries { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_scalar_summary() {
        assert_eq!(ScalarSummary::of(&[]), None);
        let summary = ScalarSummary::of(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.median, 2.0);
        assert_eq!(summary.mean, 2.0);
    }

    #[test]
    fn test_compartment_bands() {
        let trajectories: Vec<Trajectory> = [0.1, 0.2, 0.3]
            .iter()
            .map(|h| Trajectory {
                states: vec![State::from_column_slice(&[1.0 - h, 0.0, 0.0, 0.0, *h, 0.0, 0.0]); 3],
            })
            .collect();
        let hospitalized = compartment_bands(&trajectories, Compartment::Hospitalized).unwrap();
        assert_eq!(hospitalized.median, vec![0.2; 3]);
        let cases = cumulative_case_bands(&trajectories).unwrap();
        assert_eq!(cases.median, vec![0.2; 3]);
    }

    #[test]
    fn test_summarize_empty_ensemble() {
        let output = EnsembleOutput::default();
        assert!(matches!(summarize(&output), Err(SeirhcdError::EmptyEnsemble)));
    }
}
