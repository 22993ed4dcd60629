use crate::aggregate::{Bands, EnsembleSummary, ScalarSummary};

pub const BAND_HEADERS: [&str; 8] = ["day", "series", "median", "mean", "p2_5", "p16", "p84", "p97_5"];

pub const SCALAR_HEADERS: [&str; 6] = ["metric", "count", "mean", "median", "p2_5", "p97_5"];

/// One row per (series, day). Compartment series are population fractions.
pub fn band_rows(summary: &EnsembleSummary) -> Vec<Vec<String>> {
    let series: [(&str, &Bands); 5] = [
        ("hospitalized", &summary.hospitalized),
        ("critical", &summary.critical),
        ("dead", &summary.dead),
        ("cumulative_cases", &summary.cumulative_cases),
        ("realized_rt", &summary.realized_rt),
    ];
    series
        .iter()
        .flat_map(|(name, bands)| {
            (0..bands.len()).map(move |day| {
                vec![
                    day.to_string(),
                    name.to_string(),
                    bands.median[day].to_string(),
                    bands.mean[day].to_string(),
                    bands.p2_5[day].to_string(),
                    bands.p16[day].to_string(),
                    bands.p84[day].to_string(),
                    bands.p97_5[day].to_string(),
                ]
            })
        })
        .collect()
}

pub fn scalar_rows(summary: &EnsembleSummary) -> Vec<Vec<String>> {
    let mut rows = vec![
        scalar_row("ifr", summary.ifr.as_ref()),
        scalar_row("attack_rate", Some(&summary.attack_rate)),
        scalar_row("peak_hospitalized", Some(&summary.peak_hospitalized)),
        scalar_row("peak_critical", Some(&summary.peak_critical)),
    ];
    for (metric, count) in [
        ("runs_completed", summary.completed),
        ("runs_accepted", summary.accepted),
        ("runs_rejected", summary.rejected),
        ("runs_failed", summary.failed),
    ] {
        let mut row = vec![metric.to_string(), count.to_string()];
        row.resize(SCALAR_HEADERS.len(), String::new());
        rows.push(row);
    }
    rows
}

fn scalar_row(metric: &str, summary: Option<&ScalarSummary>) -> Vec<String> {
    match summary {
        Some(s) => vec![
            metric.to_string(),
            s.count.to_string(),
            s.mean.to_string(),
            s.median.to_string(),
            s.p2_5.to_string(),
            s.p97_5.to_string(),
        ],
        None => {
            let mut row = vec![metric.to_string(), "0".to_string()];
            row.resize(SCALAR_HEADERS.len(), String::new());
            row
        }
    }
}
