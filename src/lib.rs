//! Conductivity meter logger
//!
//! Reads HACH Sension7, Oakton CON150 and Milwaukee MW301 meters over a serial
//! line (or simulates one), appends every reading to daily CSV logs with
//! directory fallback, and serves the readings to the console, an HTTP API and
//! a WebSocket live feed. Logged history can be browsed, exported and analysed.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod devices;
pub mod output;
pub mod serial;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use devices::{ConductivityMeter, ConductivityUnit, MockMeter, Reading, ReadingSource};
pub use output::{ConsoleFormatter, CsvFormatter, DataSender, JsonFormatter, ReadingFormatter};
pub use services::{DataService, LiveBuffer};
pub use storage::{CsvLogger, History};
pub use utils::error::CondensateError;

#[cfg(feature = "sqlite")]
pub use storage::{DatabaseStats, SqliteManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
