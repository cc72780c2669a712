pub mod csv_logger;
pub mod export;
pub mod history;
pub mod sink;

#[cfg(feature = "sqlite")]
pub mod migrations;
#[cfg(feature = "sqlite")]
pub mod sqlite_manager;

pub use csv_logger::CsvLogger;
pub use export::{export, ExportFormat};
pub use history::History;
pub use sink::{FallbackLevel, ReadingSink, WriteOutcome};

#[cfg(feature = "sqlite")]
pub use sqlite_manager::{DatabaseStats, SqliteManager};
