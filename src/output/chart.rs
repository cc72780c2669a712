use crate::devices::reading::Reading;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const MARKER: char = '^';

/// One-line chart of `values` squeezed into at most `width` columns.
/// Each column shows the largest value in its bucket. When any column is
/// above `threshold` a second line marks it with `^`.
pub fn render_sparkline(values: &[f64], width: usize, threshold: f64) -> String {
    let columns = bucket_maxima(values, width);
    if columns.is_empty() {
        return String::new();
    }

    let min = columns.iter().copied().fold(f64::INFINITY, f64::min);
    let max = columns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    let line: String = columns
        .iter()
        .map(|v| {
            if span <= 0.0 {
                LEVELS[0]
            } else {
                let level = ((v - min) / span * (LEVELS.len() - 1) as f64).round() as usize;
                LEVELS[level.min(LEVELS.len() - 1)]
            }
        })
        .collect();

    if !columns.iter().any(|v| *v > threshold) {
        return line;
    }

    let markers: String = columns
        .iter()
        .map(|v| if *v > threshold { MARKER } else { ' ' })
        .collect();
    format!("{}\n{}", line, markers.trim_end())
}

/// Sparkline with value and time labels, the console stand-in for the plot view.
pub fn render_reading_chart(readings: &[Reading], width: usize, threshold: f64, show_grid: bool) -> String {
    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return "(no data)".to_string();
    };
    let values: Vec<f64> = readings.iter().map(Reading::micro_siemens).collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);

    let spark = render_sparkline(&values, width, threshold);
    let columns = spark.lines().next().map_or(0, |l| l.chars().count());

    let mut output = format!("{:.1} uS/cm\n", max);
    if show_grid {
        output.push_str(&"┈".repeat(columns));
        output.push('\n');
    }
    output.push_str(&spark);
    output.push('\n');
    if show_grid {
        output.push_str(&"┈".repeat(columns));
        output.push('\n');
    }
    output.push_str(&format!("{:.1} uS/cm\n", min));
    output.push_str(&format!(
        "{} → {} ({} readings, threshold {:.1})",
        first.timestamp.format("%H:%M"),
        last.timestamp.format("%H:%M"),
        readings.len(),
        threshold
    ));
    output
}

fn bucket_maxima(values: &[f64], width: usize) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || width == 0 {
        return Vec::new();
    }
    if finite.len() <= width {
        return finite;
    }

    (0..width)
        .map(|col| {
            let start = col * finite.len() / width;
            let end = ((col + 1) * finite.len() / width).max(start + 1);
            finite[start..end].iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_between_min_and_max() {
        assert_eq!(render_sparkline(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 80, 100.0), "▁▂▃▄▅▆▇█");
    }

    #[test]
    fn marks_columns_over_threshold() {
        let chart = render_sparkline(&[100.0, 600.0, 200.0, 700.0, 100.0], 80, 500.0);
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], " ^ ^");
    }

    #[test]
    fn squeezes_long_series_keeping_peaks() {
        let mut values = vec![1.0; 100];
        values[57] = 50.0;
        let chart = render_sparkline(&values, 10, 1000.0);
        assert_eq!(chart.chars().count(), 10);
        assert_eq!(chart.chars().nth(5), Some('█'));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(render_sparkline(&[], 10, 1.0), "");
    }
}
