pub mod chart;
pub mod formatters;
pub mod senders;

pub use chart::{render_reading_chart, render_sparkline};
pub use formatters::{formatter_for, ConsoleFormatter, CsvFormatter, JsonFormatter, ReadingFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender};
