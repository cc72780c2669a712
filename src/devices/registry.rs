use log::warn;

use super::con150::{Con150Adapter, CON150_MODEL};
use super::mw301::{Mw301Adapter, MW301_MODEL};
use super::sension7::{Sension7Adapter, SENSION7_MODEL};
use super::traits::ConductivityMeter;

pub const DEFAULT_MODEL: &str = SENSION7_MODEL;

pub fn available_models() -> [&'static str; 3] {
    [SENSION7_MODEL, CON150_MODEL, MW301_MODEL]
}

/// Looks up the adapter for a model name. Unknown names fall back to the Sension7 adapter.
pub fn adapter_for(model: &str) -> Box<dyn ConductivityMeter> {
    match model.trim() {
        SENSION7_MODEL => Box::new(Sension7Adapter),
        CON150_MODEL => Box::new(Con150Adapter),
        MW301_MODEL => Box::new(Mw301Adapter),
        other => {
            warn!("⚠️  Unknown meter model '{}', using {} adapter", other, DEFAULT_MODEL);
            Box::new(Sension7Adapter)
        }
    }
}

pub fn is_known_model(model: &str) -> bool {
    available_models().iter().any(|m| *m == model.trim())
}
