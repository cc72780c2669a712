use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::statistics::Statistics;
use super::trend::{analyze_trend, TrendAnalysis, DEFAULT_WINDOW};
use crate::devices::reading::Reading;
use crate::storage::history::History;
use crate::utils::error::CondensateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// In µS/cm regardless of the unit the meter reported.
    Conductivity,
    Temperature,
}

impl Metric {
    pub fn series(&self, readings: &[Reading]) -> (Vec<NaiveDateTime>, Vec<f64>) {
        readings
            .iter()
            .filter_map(|r| match self {
                Metric::Conductivity => Some((r.timestamp, r.micro_siemens())),
                Metric::Temperature => r.temperature.map(|t| (r.timestamp, t)),
            })
            .unzip()
    }

    pub fn unit_label(&self) -> &'static str {
        match self {
            Metric::Conductivity => "uS/cm",
            Metric::Temperature => "°C",
        }
    }
}

impl FromStr for Metric {
    type Err = CondensateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conductivity" | "cond" => Ok(Metric::Conductivity),
            "temperature" | "temp" => Ok(Metric::Temperature),
            other => Err(CondensateError::ParseError(format!("Unknown metric '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub statistics: Statistics,
    pub trend: TrendAnalysis,
}

pub fn summarize(date: NaiveDate, readings: &[Reading], metric: Metric) -> Option<DaySummary> {
    let (timestamps, values) = metric.series(readings);
    if values.is_empty() {
        return None;
    }
    Some(DaySummary {
        date,
        statistics: Statistics::from_values(&values),
        trend: analyze_trend(&timestamps, &values, DEFAULT_WINDOW),
    })
}

/// Per-date statistics and trend. Dates without data are left out.
pub fn compare_days(history: &History, dates: &[NaiveDate], metric: Metric) -> Result<Vec<DaySummary>, CondensateError> {
    let mut summaries = Vec::with_capacity(dates.len());
    for date in dates {
        let readings = history.for_date(*date)?;
        match summarize(*date, &readings, metric) {
            Some(summary) => summaries.push(summary),
            None => debug!("No {:?} data for {}", metric, date),
        }
    }
    Ok(summaries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMethod {
    Correlation,
    Euclidean,
}

impl FromStr for SimilarityMethod {
    type Err = CondensateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "correlation" => Ok(SimilarityMethod::Correlation),
            "euclidean" => Ok(SimilarityMethod::Euclidean),
            other => Err(CondensateError::ParseError(format!("Unknown similarity method '{}'", other))),
        }
    }
}

/// Ranks other days by how closely their series follows `target`'s,
/// comparing the first `min(len)` points. Scores are in 0..=1, highest first.
pub fn similar_days(
    history: &History,
    target: NaiveDate,
    metric: Metric,
    method: SimilarityMethod,
    top_n: usize,
) -> Result<Vec<(NaiveDate, f64)>, CondensateError> {
    let (_, target_values) = metric.series(&history.for_date(target)?);
    if target_values.is_empty() {
        return Ok(Vec::new());
    }

    let mut scores = Vec::new();
    for date in history.available_dates()? {
        if date == target {
            continue;
        }
        let (_, values) = metric.series(&history.for_date(date)?);
        let len = target_values.len().min(values.len());
        let (a, b) = (&target_values[..len], &values[..len]);

        let score = match method {
            SimilarityMethod::Correlation => {
                if len < 2 {
                    continue;
                }
                match pearson(a, b) {
                    Some(r) => (r + 1.0) / 2.0,
                    None => continue,
                }
            }
            SimilarityMethod::Euclidean => {
                let distance = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt();
                1.0 / (1.0 + distance)
            }
        };
        scores.push((date, score));
    }

    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores.truncate(top_n);
    Ok(scores)
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

/// Readings strictly above `threshold` µS/cm.
pub fn threshold_exceedances(readings: &[Reading], threshold: f64) -> Vec<&Reading> {
    readings.iter().filter(|r| r.micro_siemens() > threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::reading::{parse_date, parse_timestamp, ConductivityUnit};
    use std::fs;
    use tempfile::tempdir;

    fn reading(ts: &str, value: f64, unit: ConductivityUnit, temp: Option<f64>) -> Reading {
        Reading::new(parse_timestamp(ts).unwrap(), value, unit, temp, "HACH Sension7")
    }

    #[test]
    fn exceedances_compare_in_micro_siemens() {
        let readings = vec![
            reading("2024-06-01 08:00:00", 450.0, ConductivityUnit::MicroSiemensPerCm, None),
            reading("2024-06-01 09:00:00", 0.6, ConductivityUnit::MilliSiemensPerCm, None),
            reading("2024-06-01 10:00:00", 500.0, ConductivityUnit::MicroSiemensPerCm, None),
        ];
        let over = threshold_exceedances(&readings, 500.0);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].conductivity, 0.6);
    }

    #[test]
    fn temperature_series_skips_missing_values() {
        let readings = vec![
            reading("2024-06-01 08:00:00", 1.0, ConductivityUnit::MicroSiemensPerCm, Some(20.0)),
            reading("2024-06-01 09:00:00", 2.0, ConductivityUnit::MicroSiemensPerCm, None),
        ];
        let (ts, values) = Metric::Temperature.series(&readings);
        assert_eq!(ts.len(), 1);
        assert_eq!(values, vec![20.0]);
    }

    fn history_with_days() -> (tempfile::TempDir, History) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("condensate.csv"),
            "Timestamp,Conductivity,Unit,Temperature,Device\n\
             2024-06-01 08:00:00,100,uS/cm,20,Mock\n\
             2024-06-01 09:00:00,200,uS/cm,21,Mock\n\
             2024-06-01 10:00:00,300,uS/cm,22,Mock\n\
             2024-06-02 08:00:00,110,uS/cm,20,Mock\n\
             2024-06-02 09:00:00,210,uS/cm,21,Mock\n\
             2024-06-02 10:00:00,310,uS/cm,22,Mock\n\
             2024-06-03 08:00:00,300,uS/cm,20,Mock\n\
             2024-06-03 09:00:00,200,uS/cm,21,Mock\n\
             2024-06-03 10:00:00,100,uS/cm,22,Mock\n",
        )
        .unwrap();
        let history = History::new(vec![dir.path().to_path_buf()], "condensate").unwrap();
        (dir, history)
    }

    #[test]
    fn compares_requested_days_only() {
        let (_dir, history) = history_with_days();
        let dates = [parse_date("2024-06-01").unwrap(), parse_date("2024-07-01").unwrap()];
        let summaries = compare_days(&history, &dates, Metric::Conductivity).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].statistics.mean, Some(200.0));
    }

    #[test]
    fn correlated_day_ranks_first() {
        let (_dir, history) = history_with_days();
        let ranked = similar_days(
            &history,
            parse_date("2024-06-01").unwrap(),
            Metric::Conductivity,
            SimilarityMethod::Correlation,
            5,
        )
        .unwrap();
        assert_eq!(ranked[0].0, parse_date("2024-06-02").unwrap());
        assert!((ranked[0].1 - 1.0).abs() < 1e-9);
        assert!(ranked[1].1.abs() < 1e-9);
    }
}
