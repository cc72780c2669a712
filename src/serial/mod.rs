pub mod line_source;
pub mod meter_source;
pub mod ports;

pub use line_source::{LineSource, SerialLineSource};
pub use meter_source::SerialMeterSource;
pub use ports::{available_ports, probe, PortDescription};
