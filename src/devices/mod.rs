pub mod con150;
pub mod mock;
pub mod mw301;
mod patterns;
pub mod reading;
pub mod registry;
pub mod sension7;
pub mod traits;

pub use con150::Con150Adapter;
pub use mock::MockMeter;
pub use mw301::Mw301Adapter;
pub use reading::{ConductivityUnit, ParsedSample, Reading};
pub use registry::{adapter_for, available_models};
pub use sension7::Sension7Adapter;
pub use traits::{ConductivityMeter, ReadingSource};
