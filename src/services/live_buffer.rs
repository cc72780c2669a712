use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::devices::reading::Reading;

pub type SharedBuffer = Arc<Mutex<LiveBuffer>>;

/// Most recent readings, oldest first. Pushing past capacity drops the oldest.
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn shared(capacity: usize) -> SharedBuffer {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    pub fn push(&mut self, reading: Reading) {
        while self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn extend<I: IntoIterator<Item = Reading>>(&mut self, readings: I) {
        for reading in readings {
            self.push(reading);
        }
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }

    /// Conductivity values in µS/cm, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.readings.iter().map(Reading::micro_siemens).collect()
    }

    pub fn exceedances(&self, threshold: f64) -> Vec<Reading> {
        self.readings
            .iter()
            .filter(|r| r.micro_siemens() > threshold)
            .cloned()
            .collect()
    }

    /// Readings whose µS/cm value lies within the inclusive bounds that are set.
    pub fn filtered(&self, min: Option<f64>, max: Option<f64>) -> Vec<Reading> {
        self.readings
            .iter()
            .filter(|r| {
                let v = r.micro_siemens();
                min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
            })
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
