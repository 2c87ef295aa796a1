//! Run settings, assembled by the binary and passed down explicitly.

use crate::error::CrawlerError;
use crate::error::Result;
use crate::job::store::JobFormat;
use crate::notify::NotificationSink;
use crate::notify::WebhookNotifier;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding the `*.ini` and `*.json` job files.
    pub jobs_dir: PathBuf,
    /// DuckDB database file receiving the tables.
    pub database: PathBuf,
    /// Forces the job file format instead of guessing from the extension.
    pub format: Option<JobFormat>,
    /// Character set values are re-encoded with before insertion.
    pub charset: String,
    /// Chat webhook receiving the run summary.
    pub webhook: Option<String>,
    pub log_file: Option<PathBuf>,
    /// Download timeout in seconds, unlimited when absent.
    pub timeout: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            jobs_dir: PathBuf::from("jobs"),
            database: PathBuf::from("crawler.duckdb"),
            format: None,
            charset: "utf-8".to_owned(),
            webhook: None,
            log_file: None,
            timeout: None,
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Settings> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn notification_sink(&self) -> Result<NotificationSink> {
        match self.webhook.as_deref().map(str::trim).filter(|webhook| !webhook.is_empty()) {
            Some(webhook) => {
                let url = Url::parse(webhook)
                    .map_err(|error| CrawlerError::WithContextError(format!("Invalid webhook '{webhook}': {error}")))?;
                Ok(NotificationSink::Active(WebhookNotifier::new(url)?))
            }
            None => Ok(NotificationSink::Noop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_partial_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crawler.json");
        fs::write(&path, r#"{"database": "stat.duckdb", "format": "ini", "charset": "windows-1251"}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.database, PathBuf::from("stat.duckdb"));
        assert_eq!(settings.format, Some(JobFormat::Ini));
        assert_eq!(settings.charset, "windows-1251");
        assert_eq!(settings.jobs_dir, PathBuf::from("jobs"));
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn test_reject_unknown_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crawler.json");
        fs::write(&path, r#"{"databse": "typo.duckdb"}"#).unwrap();
        assert!(matches!(Settings::load(&path), Err(CrawlerError::JsonError(_))));
    }

    #[test]
    fn test_notification_sink_selection() {
        let mut settings = Settings::default();
        assert!(matches!(settings.notification_sink().unwrap(), NotificationSink::Noop));

        settings.webhook = Some("  ".to_owned());
        assert!(matches!(settings.notification_sink().unwrap(), NotificationSink::Noop));

        settings.webhook = Some("https://chat.example/hooks/abc".to_owned());
        assert!(matches!(settings.notification_sink().unwrap(), NotificationSink::Active(_)));

        settings.webhook = Some("not a url".to_owned());
        assert!(settings.notification_sink().is_err());
    }
}
