//! Append-only text logs of webhook traffic.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::{AppError, WebhookJournal, WebhookResponse};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Journal file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    /// Raw inbound payloads
    pub raw_input_path: PathBuf,
    /// JSON responses sent back for each delivery
    pub outcome_path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            raw_input_path: PathBuf::from("raw_input.log"),
            outcome_path: PathBuf::from("webhook.log"),
        }
    }
}

impl JournalConfig {
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();
        Self {
            raw_input_path: env::var("RAW_INPUT_LOG")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.raw_input_path),
            outcome_path: env::var("OUTCOME_LOG")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.outcome_path),
        }
    }
}

/// [`WebhookJournal`] appending lines to two local files
pub struct FileJournal {
    config: JournalConfig,
    // Serializes appends so concurrent deliveries never interleave within a line
    write_lock: Mutex<()>,
}

impl FileJournal {
    pub fn new(config: JournalConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, path: &Path, line: String) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to open {}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to flush {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl WebhookJournal for FileJournal {
    async fn record_payload(&self, raw: &str) -> Result<(), AppError> {
        let line = format!("{} - {}\n", Utc::now().format(TIMESTAMP_FORMAT), raw);
        self.append(&self.config.raw_input_path, line).await
    }

    async fn record_outcome(&self, outcome: &WebhookResponse) -> Result<(), AppError> {
        let json = serde_json::to_string(outcome)
            .map_err(|e| AppError::Internal(format!("Failed to serialize outcome: {}", e)))?;
        let line = format!("[{}] - {}\n", Utc::now().format(TIMESTAMP_FORMAT), json);
        self.append(&self.config.outcome_path, line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationError;

    fn temp_config() -> (PathBuf, JournalConfig) {
        let dir = std::env::temp_dir().join(format!("journal-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = JournalConfig {
            raw_input_path: dir.join("raw_input.log"),
            outcome_path: dir.join("webhook.log"),
        };
        (dir, config)
    }

    #[tokio::test]
    async fn test_payload_lines_are_appended() {
        let (dir, config) = temp_config();
        let journal = FileJournal::new(config.clone());

        journal.record_payload("data%5BFIELDS%5D%5BID%5D=42").await.unwrap();
        journal.record_payload("second").await.unwrap();

        let contents = std::fs::read_to_string(&config.raw_input_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - data%5BFIELDS%5D%5BID%5D=42"));
        // "YYYY-MM-DD HH:MM:SS - "
        assert_eq!(&lines[0][4..5], "-");
        assert_eq!(&lines[0][19..22], " - ");
        assert!(lines[1].ends_with(" - second"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_outcome_line_format() {
        let (dir, config) = temp_config();
        let journal = FileJournal::new(config.clone());
        let outcome =
            WebhookResponse::invalid_webhook(ValidationError::MissingField("data[FIELDS][ID]".into()));

        journal.record_outcome(&outcome).await.unwrap();

        let contents = std::fs::read_to_string(&config.outcome_path).unwrap();
        let line = contents.lines().next().unwrap();
        assert!(line.starts_with('['));
        assert_eq!(&line[20..24], "] - ");
        let json: serde_json::Value = serde_json::from_str(&line[24..]).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["step"], "parse_webhook");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_default_paths() {
        let config = JournalConfig::default();
        assert_eq!(config.raw_input_path, PathBuf::from("raw_input.log"));
        assert_eq!(config.outcome_path, PathBuf::from("webhook.log"));
    }
}
