use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{FilterOptions, Tag, ACCEPTED_EXTENSIONS, SOFT_SIZE_LIMIT_BYTES};
use tracing::warn;

use crate::upload::{CommitPolicy, UploadConfig};

pub const SETTINGS_FILE: &str = "doctable.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub upload_progress_step: u8,
    pub upload_tick_interval_ms: u64,
    pub upload_settle_delay_ms: u64,
    pub upload_commit: CommitPolicy,
    pub upload_soft_limit_bytes: u64,
    pub accepted_extensions: Vec<String>,
    pub notification_timeout_ms: u64,
    pub sync_settle_delay_ms: u64,
    pub default_tags: Vec<Tag>,
    pub default_brand: String,
    pub default_category: Option<String>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_progress_step: 5,
            upload_tick_interval_ms: 300,
            upload_settle_delay_ms: 500,
            upload_commit: CommitPolicy::OnComplete,
            upload_soft_limit_bytes: SOFT_SIZE_LIMIT_BYTES,
            accepted_extensions: ACCEPTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            notification_timeout_ms: 6000,
            sync_settle_delay_ms: 1500,
            default_tags: vec![Tag::new("Year", "2025"), Tag::new("Team", "Medical")],
            default_brand: "HAL".into(),
            default_category: Some("Medical".into()),
            log_level: "info".into(),
        }
    }
}

impl Settings {
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            progress_step: self.upload_progress_step.max(1),
            tick_interval: Duration::from_millis(self.upload_tick_interval_ms),
            settle_delay: Duration::from_millis(self.upload_settle_delay_ms),
            commit: self.upload_commit,
        }
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn sync_settle_delay(&self) -> Duration {
        Duration::from_millis(self.sync_settle_delay_ms)
    }

    pub fn default_filter(&self) -> FilterOptions {
        FilterOptions::new(self.default_brand.clone(), self.default_category.clone())
    }

    /// Applies one `key = value` override. Unknown keys and unparsable values
    /// are reported and leave the current value in place.
    fn apply(&mut self, key: &str, raw: &str) {
        let raw = raw.trim();
        let applied = match key {
            "upload_progress_step" => parse_into(raw, &mut self.upload_progress_step),
            "upload_tick_interval_ms" => parse_into(raw, &mut self.upload_tick_interval_ms),
            "upload_settle_delay_ms" => parse_into(raw, &mut self.upload_settle_delay_ms),
            "upload_soft_limit_bytes" => parse_into(raw, &mut self.upload_soft_limit_bytes),
            "notification_timeout_ms" => parse_into(raw, &mut self.notification_timeout_ms),
            "sync_settle_delay_ms" => parse_into(raw, &mut self.sync_settle_delay_ms),
            "upload_commit" => match raw {
                "on_complete" => {
                    self.upload_commit = CommitPolicy::OnComplete;
                    true
                }
                "on_submit" => {
                    self.upload_commit = CommitPolicy::OnSubmit;
                    true
                }
                _ => false,
            },
            "accepted_extensions" => {
                self.accepted_extensions = split_list(raw)
                    .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                    .collect();
                true
            }
            "default_tags" => match parse_tags(raw) {
                Some(tags) => {
                    self.default_tags = tags;
                    true
                }
                None => false,
            },
            "default_brand" => {
                self.default_brand = raw.to_string();
                true
            }
            "default_category" => {
                self.default_category = (!raw.is_empty()).then(|| raw.to_string());
                true
            }
            "log_level" => {
                self.log_level = raw.to_string();
                true
            }
            _ => {
                warn!(key, "ignoring unknown setting");
                return;
            }
        };
        if !applied {
            warn!(key, value = raw, "ignoring invalid setting value");
        }
    }
}

fn parse_into<T: std::str::FromStr>(raw: &str, slot: &mut T) -> bool {
    match raw.parse::<T>() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => false,
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// `"Year:2025, Team:Medical"` into tags.
fn parse_tags(raw: &str) -> Option<Vec<Tag>> {
    split_list(raw)
        .map(|pair| {
            let (label, value) = pair.split_once(':')?;
            let label = label.trim();
            (!label.is_empty()).then(|| Tag::new(label, value.trim()))
        })
        .collect()
}

/// Flat `key = value` pairs from a TOML file; arrays of strings are joined
/// with commas so they go through the same parser as environment values.
pub fn read_settings_file(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let table: toml::Table = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;

    let mut pairs = Vec::with_capacity(table.len());
    for (key, value) in table {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str())
                .collect::<Vec<_>>()
                .join(","),
            other => {
                warn!(%key, value = %other, "ignoring unsupported setting type");
                continue;
            }
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// Defaults, then the settings file if present, then `APP__*` variables from `env`.
pub fn load_settings_from<F>(path: &Path, env: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    if path.exists() {
        match read_settings_file(path) {
            Ok(pairs) => {
                for (key, value) in pairs {
                    settings.apply(&key, &value);
                }
            }
            Err(error) => warn!(%error, "using default settings"),
        }
    }

    const KEYS: &[&str] = &[
        "upload_progress_step",
        "upload_tick_interval_ms",
        "upload_settle_delay_ms",
        "upload_commit",
        "upload_soft_limit_bytes",
        "accepted_extensions",
        "notification_timeout_ms",
        "sync_settle_delay_ms",
        "default_tags",
        "default_brand",
        "default_category",
        "log_level",
    ];
    for key in KEYS {
        let var = format!("APP__{}", key.to_ascii_uppercase());
        if let Some(value) = env(&var) {
            settings.apply(key, &value);
        }
    }

    settings
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings_from(&dir.path().join("absent.toml"), no_env);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.upload_config(), UploadConfig::default());
        assert_eq!(
            settings.default_filter(),
            FilterOptions::new("HAL", Some("Medical".into()))
        );
    }

    #[test]
    fn file_values_then_env_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            r#"
upload_progress_step = 10
upload_tick_interval_ms = 50
upload_commit = "on_submit"
accepted_extensions = ["pdf", ".CSV"]
default_tags = "Brand:HAL, Category:Medical"
default_category = ""
"#,
        )
        .expect("write settings");

        let env: HashMap<&str, &str> = HashMap::from([
            ("APP__UPLOAD_PROGRESS_STEP", "20"),
            ("APP__NOTIFICATION_TIMEOUT_MS", "not-a-number"),
        ]);
        let settings = load_settings_from(&path, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.upload_progress_step, 20);
        assert_eq!(settings.upload_tick_interval_ms, 50);
        assert_eq!(settings.upload_commit, CommitPolicy::OnSubmit);
        assert_eq!(settings.accepted_extensions, vec!["pdf", "csv"]);
        assert_eq!(
            settings.default_tags,
            vec![Tag::new("Brand", "HAL"), Tag::new("Category", "Medical")]
        );
        assert_eq!(settings.default_category, None);
        assert_eq!(settings.notification_timeout_ms, 6000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "upload_progress_step = [[[").expect("write settings");
        assert_eq!(load_settings_from(&path, no_env), Settings::default());
    }

    #[test]
    fn zero_step_is_clamped() {
        let env = |key: &str| (key == "APP__UPLOAD_PROGRESS_STEP").then(|| "0".to_string());
        let settings = load_settings_from(Path::new("does-not-exist.toml"), env);
        assert_eq!(settings.upload_config().progress_step, 1);
    }

    #[test]
    fn tag_lists_without_separator_are_rejected() {
        assert_eq!(parse_tags("Year"), None);
        assert_eq!(parse_tags(""), Some(Vec::new()));
    }
}
