use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

pub const DEFAULT_WINDOW: usize = 5;
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TrendDirection::Increasing => "increasing ↑",
            TrendDirection::Decreasing => "decreasing ↓",
            TrendDirection::Stable => "no significant trend",
            TrendDirection::InsufficientData => "insufficient data",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// r² when the slope is significant, otherwise 0.
    pub strength: f64,
    pub moving_average: Vec<f64>,
    /// Change per second.
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
}

impl TrendAnalysis {
    fn insufficient(moving_average: Vec<f64>) -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            strength: 0.0,
            moving_average,
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            p_value: 1.0,
        }
    }
}

/// Centred moving average plus a least-squares fit of value against seconds
/// since the first timestamp. A slope counts as a trend when its two-sided
/// p-value is below 0.05.
pub fn analyze_trend(timestamps: &[NaiveDateTime], values: &[f64], window: usize) -> TrendAnalysis {
    if values.len() < 3 {
        return TrendAnalysis::insufficient(Vec::new());
    }

    let moving_average = centred_moving_average(values, window);

    let xs: Vec<f64> = match timestamps.first() {
        Some(base) if timestamps.len() == values.len() => timestamps
            .iter()
            .map(|t| (*t - *base).num_milliseconds() as f64 / 1000.0)
            .collect(),
        _ => (0..values.len()).map(|i| i as f64).collect(),
    };
    let points: Vec<(f64, f64)> = xs
        .into_iter()
        .zip(values.iter().copied())
        .filter(|(_, y)| y.is_finite())
        .collect();

    let Some(fit) = linear_regression(&points) else {
        return TrendAnalysis::insufficient(moving_average);
    };

    let significant = fit.p_value < SIGNIFICANCE_LEVEL;
    let direction = match (significant, fit.slope > 0.0) {
        (true, true) => TrendDirection::Increasing,
        (true, false) => TrendDirection::Decreasing,
        (false, _) => TrendDirection::Stable,
    };

    TrendAnalysis {
        direction,
        strength: if significant { fit.r_squared } else { 0.0 },
        moving_average,
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared,
        p_value: fit.p_value,
    }
}

pub fn centred_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window.max(1) / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            let finite: Vec<f64> = values[start..end].iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                f64::NAN
            } else {
                finite.iter().sum::<f64>() / finite.len() as f64
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
}

/// Ordinary least squares. `None` with fewer than two points or no spread in x.
pub fn linear_regression(points: &[(f64, f64)]) -> Option<LinearFit> {
    let n = points.len();
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / nf;
    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    let syy: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    let sxy: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();

    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r = if syy == 0.0 { 0.0 } else { (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0) };
    let r_squared = r * r;

    let df = nf - 2.0;
    let p_value = if r_squared >= 1.0 {
        0.0
    } else if df <= 0.0 {
        1.0
    } else {
        let t_sq = r_squared * df / (1.0 - r_squared);
        regularized_incomplete_beta(df / 2.0, 0.5, df / (df + t_sq))
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
        p_value,
    })
}

/// Lanczos approximation (g = 7, n = 9).
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + G + 0.5;
    let sum = COEF
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEF[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// I_x(a, b), evaluated with the continued fraction on whichever side converges.
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 300;
    const EPSILON: f64 = 3e-14;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::reading::parse_timestamp;
    use chrono::Duration;

    fn hourly(n: usize) -> Vec<NaiveDateTime> {
        let start = parse_timestamp("2024-06-01 00:00:00").unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    #[test]
    fn perfect_line_is_a_significant_increase() {
        let trend = analyze_trend(&hourly(4), &[10.0, 20.0, 30.0, 40.0], DEFAULT_WINDOW);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.slope - 10.0 / 3600.0).abs() < 1e-12);
        assert!((trend.r_squared - 1.0).abs() < 1e-12);
        assert!(trend.p_value < 1e-9);
        assert_eq!(trend.moving_average, vec![20.0, 25.0, 25.0, 30.0]);
    }

    #[test]
    fn noisy_flat_series_is_stable() {
        let values = [100.0, 104.0, 98.0, 103.0, 99.0, 101.0, 97.0, 102.0];
        let trend = analyze_trend(&hourly(values.len()), &values, DEFAULT_WINDOW);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.strength, 0.0);
        assert!(trend.p_value > SIGNIFICANCE_LEVEL);
    }

    #[test]
    fn too_few_points() {
        let trend = analyze_trend(&hourly(2), &[1.0, 2.0], DEFAULT_WINDOW);
        assert_eq!(trend.direction, TrendDirection::InsufficientData);
        assert_eq!(trend.p_value, 1.0);
    }

    #[test]
    fn p_value_matches_t_distribution() {
        // One degree of freedom: P(|T| > 1) = 0.5
        assert!((regularized_incomplete_beta(0.5, 0.5, 0.5) - 0.5).abs() < 1e-9);
        // r = 0.8, n = 5 gives p ~= 0.104
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let fit = linear_regression(&x.iter().copied().zip([1.0, 3.0, 2.0, 5.0, 4.0]).collect::<Vec<_>>()).unwrap();
        assert!((fit.r_squared - 0.64).abs() < 1e-9);
        assert!((fit.p_value - 0.1040).abs() < 1e-3);
    }
}
