pub mod anomalies;
pub mod comparison;
pub mod statistics;
pub mod trend;

pub use anomalies::{detect_anomalies, AnomalyMethod};
pub use comparison::{compare_days, similar_days, summarize, threshold_exceedances, DaySummary, Metric, SimilarityMethod};
pub use statistics::Statistics;
pub use trend::{analyze_trend, TrendAnalysis, TrendDirection};
