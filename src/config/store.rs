use std::path::Path;

use super::SessionConfig;
use crate::error::{AppError, Result};

/// Load a session configuration from a JSON file
///
/// Missing fields fall back to `SessionConfig::default()`. The result is not
/// validated here because command line overrides are applied afterwards.
pub async fn load_config(path: &Path) -> Result<SessionConfig> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;

    let config: SessionConfig = serde_json::from_str(&raw)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkStrategy;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"page_url":"https://example.com/play.html","hold_secs":0,"sink":{{"mode":"display"}}}}"#
        )
        .unwrap();

        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.page_url, "https://example.com/play.html");
        assert_eq!(config.hold_timeout(), None);
        assert_eq!(config.sink, SinkStrategy::Display);
        assert_eq!(config.connect_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = load_config(Path::new("/nonexistent/rtc-player.json")).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let result = load_config(file.path()).await;
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }
}
