use async_trait::async_trait;
use log::{debug, error};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::utils::error::CondensateError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), CondensateError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), CondensateError> {
        if !data.is_empty() {
            println!("{}", data);
        }
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends each formatted reading as a line of a text file.
pub struct FileSender {
    file_path: String,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), CondensateError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| {
                error!("❌ Failed to open file {}: {}", self.file_path, e);
                e
            })?;

        writeln!(file, "{}", data)?;
        debug!("📝 {} bytes written to {}", data.len(), self.file_path);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}
