use async_trait::async_trait;
use log::{debug, error};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::utils::error::ModbusError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), ModbusError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends each payload as a line to a file.
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
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        debug!("📝 Appending {} bytes to {}", data.len(), self.file_path);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .map_err(|e| {
                error!("❌ Failed to open file {}: {}", self.file_path, e);
                ModbusError::CommunicationError(format!("File open error: {}", e))
            })?;

        file.write_all(format!("{}\n", data).as_bytes())
            .await
            .map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                ModbusError::CommunicationError(format!("File write error: {}", e))
            })?;
        file.flush().await?;
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}
