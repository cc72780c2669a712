use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::devices::reading::Reading;
use crate::utils::error::CondensateError;

/// Which write location ended up holding a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FallbackLevel {
    Configured,
    Home,
    Temp,
}

impl fmt::Display for FallbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackLevel::Configured => f.write_str("configured"),
            FallbackLevel::Home => f.write_str("home"),
            FallbackLevel::Temp => f.write_str("temp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub level: FallbackLevel,
}

#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn record(&self, reading: &Reading) -> Result<WriteOutcome, CondensateError>;
    fn sink_type(&self) -> &str;
    fn destination(&self) -> &str;
}
