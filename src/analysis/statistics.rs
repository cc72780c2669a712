use serde::Serialize;

/// Descriptive statistics over a series. Every metric is `None` for an empty series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Population standard deviation.
    pub std: Option<f64>,
    pub percentile_25: Option<f64>,
    pub median: Option<f64>,
    pub percentile_75: Option<f64>,
    pub percentile_95: Option<f64>,
    pub skewness: Option<f64>,
    /// Excess kurtosis (0 for a normal distribution).
    pub kurtosis: Option<f64>,
    pub range: Option<f64>,
}

impl Statistics {
    /// Non-finite values are ignored.
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        if n == 0 {
            return Self::empty();
        }

        let count = n as f64;
        let mean = sorted.iter().sum::<f64>() / count;
        let m2 = central_moment(&sorted, mean, 2);
        let m3 = central_moment(&sorted, mean, 3);
        let m4 = central_moment(&sorted, mean, 4);
        let (min, max) = (sorted[0], sorted[n - 1]);

        let (skewness, kurtosis) = if m2 > 0.0 {
            (Some(m3 / m2.powf(1.5)), Some(m4 / (m2 * m2) - 3.0))
        } else {
            (None, None)
        };

        Self {
            count: n,
            min: Some(min),
            max: Some(max),
            mean: Some(mean),
            std: Some(m2.sqrt()),
            percentile_25: percentile_sorted(&sorted, 25.0),
            median: percentile_sorted(&sorted, 50.0),
            percentile_75: percentile_sorted(&sorted, 75.0),
            percentile_95: percentile_sorted(&sorted, 95.0),
            skewness,
            kurtosis,
            range: Some(max - min),
        }
    }

    fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            mean: None,
            std: None,
            percentile_25: None,
            median: None,
            percentile_75: None,
            percentile_95: None,
            skewness: None,
            kurtosis: None,
            range: None,
        }
    }

    /// `(label, value)` pairs in display order, values rendered to two decimals.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        let fmt = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v));
        vec![
            ("Count", self.count.to_string()),
            ("Minimum", fmt(self.min)),
            ("Maximum", fmt(self.max)),
            ("Mean", fmt(self.mean)),
            ("Std. deviation", fmt(self.std)),
            ("25th percentile", fmt(self.percentile_25)),
            ("Median", fmt(self.median)),
            ("75th percentile", fmt(self.percentile_75)),
            ("95th percentile", fmt(self.percentile_95)),
            ("Skewness", fmt(self.skewness)),
            ("Kurtosis", fmt(self.kurtosis)),
            ("Range", fmt(self.range)),
        ]
    }
}

fn central_moment(values: &[f64], mean: f64, order: i32) -> f64 {
    values.iter().map(|v| (v - mean).powi(order)).sum::<f64>() / values.len() as f64
}

/// Linear interpolation between closest ranks. `sorted` must be ascending.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}
