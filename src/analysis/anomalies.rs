use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::statistics::percentile_sorted;
use crate::utils::error::CondensateError;

pub const Z_SCORE_THRESHOLD: f64 = 3.0;
pub const IQR_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyMethod {
    ZScore,
    Iqr,
}

impl FromStr for AnomalyMethod {
    type Err = CondensateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zscore" | "z-score" => Ok(AnomalyMethod::ZScore),
            "iqr" => Ok(AnomalyMethod::Iqr),
            other => Err(CondensateError::ParseError(format!(
                "Unknown anomaly method '{}' (expected zscore or iqr)",
                other
            ))),
        }
    }
}

/// Indices into `values` of the points flagged as outliers. Non-finite values
/// are never flagged and do not take part in the fit.
pub fn detect_anomalies(values: &[f64], method: AnomalyMethod) -> Vec<usize> {
    let clean: Vec<(usize, f64)> = values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();
    if clean.len() < 3 {
        return Vec::new();
    }

    match method {
        AnomalyMethod::ZScore => {
            let n = clean.len() as f64;
            let mean = clean.iter().map(|(_, v)| v).sum::<f64>() / n;
            let std = (clean.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            if std == 0.0 {
                return Vec::new();
            }
            clean
                .into_iter()
                .filter(|(_, v)| ((v - mean) / std).abs() > Z_SCORE_THRESHOLD)
                .map(|(i, _)| i)
                .collect()
        }
        AnomalyMethod::Iqr => {
            let mut sorted: Vec<f64> = clean.iter().map(|(_, v)| *v).collect();
            sorted.sort_by(f64::total_cmp);
            let (Some(q1), Some(q3)) = (percentile_sorted(&sorted, 25.0), percentile_sorted(&sorted, 75.0)) else {
                return Vec::new();
            };
            let iqr = q3 - q1;
            let (lower, upper) = (q1 - IQR_MULTIPLIER * iqr, q3 + IQR_MULTIPLIER * iqr);
            clean
                .into_iter()
                .filter(|(_, v)| *v < lower || *v > upper)
                .map(|(i, _)| i)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zscore_flags_single_spike() {
        let mut values = vec![100.0; 20];
        values[7] = 101.0;
        values[12] = 500.0;
        assert_eq!(detect_anomalies(&values, AnomalyMethod::ZScore), vec![12]);
    }

    #[test]
    fn iqr_uses_fences_and_keeps_original_indices() {
        // q1 = 2.25, q3 = 4.75, fences at -1.5 and 8.5
        let values = [1.0, f64::NAN, 2.0, 3.0, 4.0, 5.0, 50.0];
        assert_eq!(detect_anomalies(&values, AnomalyMethod::Iqr), vec![6]);
    }

    #[test]
    fn short_or_flat_series_have_no_anomalies() {
        assert!(detect_anomalies(&[1.0, 1000.0], AnomalyMethod::ZScore).is_empty());
        assert!(detect_anomalies(&[5.0, 5.0, 5.0, 5.0], AnomalyMethod::ZScore).is_empty());
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("IQR".parse::<AnomalyMethod>().unwrap(), AnomalyMethod::Iqr);
        assert!("isolation".parse::<AnomalyMethod>().is_err());
    }
}
