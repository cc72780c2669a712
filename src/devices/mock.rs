use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use super::reading::{ConductivityUnit, Reading};
use super::traits::ReadingSource;
use crate::utils::error::CondensateError;

pub const MOCK_SOURCE: &str = "Mock";

pub const MIN_MOCK_VALUE: f64 = 100.0;
pub const MAX_MOCK_VALUE: f64 = 500.0;
pub const MIN_MOCK_TEMP: f64 = 20.0;
pub const MAX_MOCK_TEMP: f64 = 30.0;
pub const SPIKE_PROBABILITY: f64 = 0.05;
/// Longest back-fill accepted, about ten years.
pub const MAX_HISTORY_DAYS: u32 = 3650;

/// Stand-in meter for running without hardware.
pub struct MockMeter {
    rng: Mutex<StdRng>,
}

impl MockMeter {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn sample_at(&self, timestamp: NaiveDateTime) -> Result<Reading, CondensateError> {
        let mut rng = self.rng.lock().map_err(|_| CondensateError::LockError)?;
        let value = rng.gen_range(MIN_MOCK_VALUE..MAX_MOCK_VALUE);
        let temperature = rng.gen_range(MIN_MOCK_TEMP..MAX_MOCK_TEMP);
        Ok(Reading::new(
            timestamp,
            value,
            ConductivityUnit::MicroSiemensPerCm,
            Some(temperature),
            MOCK_SOURCE,
        ))
    }

    /// Back-fills `days` of history ending now: one point roughly every two hours,
    /// mostly in the lower 60% of the range with occasional spikes.
    pub fn generate_history(&self, days: u32) -> Result<Vec<Reading>, CondensateError> {
        self.generate_history_until(Local::now().naive_local(), days)
    }

    pub fn generate_history_until(
        &self,
        end_time: NaiveDateTime,
        days: u32,
    ) -> Result<Vec<Reading>, CondensateError> {
        info!("🧪 Generating {} days of mock historical data", days);

        if days > MAX_HISTORY_DAYS {
            return Err(CondensateError::ParseError(format!(
                "cannot generate {} days of history (at most {})",
                days, MAX_HISTORY_DAYS
            )));
        }
        let mut current = end_time
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| CondensateError::ParseError(format!("{} days before {} is out of range", days, end_time)))?;
        let mut rng = self.rng.lock().map_err(|_| CondensateError::LockError)?;
        let mut readings = Vec::new();

        while current < end_time {
            let mut value = rng.gen_range(MIN_MOCK_VALUE..MAX_MOCK_VALUE * 0.6);
            if rng.gen_bool(SPIKE_PROBABILITY) {
                value = rng.gen_range(MAX_MOCK_VALUE * 0.7..MAX_MOCK_VALUE);
            }
            let temperature = rng.gen_range(MIN_MOCK_TEMP..MAX_MOCK_TEMP);

            current = current
                + Duration::hours(2)
                + Duration::minutes(rng.gen_range(0..60))
                + Duration::seconds(rng.gen_range(0..60));
            if current >= end_time {
                break;
            }

            readings.push(Reading::new(
                current,
                value,
                ConductivityUnit::MicroSiemensPerCm,
                Some(temperature),
                MOCK_SOURCE,
            ));
        }

        info!("✅ Generated {} mock historical readings", readings.len());
        Ok(readings)
    }
}

impl Default for MockMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingSource for MockMeter {
    fn source_name(&self) -> &str {
        MOCK_SOURCE
    }

    fn is_mock(&self) -> bool {
        true
    }

    async fn next_reading(&self) -> Result<Option<Reading>, CondensateError> {
        self.sample_at(Local::now().naive_local()).map(Some)
    }
}
