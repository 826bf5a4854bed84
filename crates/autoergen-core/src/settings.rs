//! Generation and diagram settings, stored as `settings.json` in the data
//! directory and overridable from the environment.
//!
//! | Env Var                    | Field          |
//! |----------------------------|----------------|
//! | `AUTOERGEN_PROVIDER`       | `provider`     |
//! | `AUTOERGEN_MODEL`          | `model`        |
//! | `AUTOERGEN_API_KEY`        | `apiKey`       |
//! | `GEMINI_API_KEY`           | `apiKey`       |
//! | `GOOGLE_API_KEY`           | `apiKey`       |
//! | `AUTOERGEN_TEMPERATURE`    | `temperature`  |
//! | `AUTOERGEN_CACHE_TTL_SECS` | `cacheTtlSecs` |
//! | `AUTOERGEN_GRAPHVIZ`       | `graphvizPath` |

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagram::DiagramStyle;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Seconds an identical prompt is served from cache; 0 disables caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub diagram: DiagramStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphviz_path: Option<String>,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            cache_ttl_secs: default_cache_ttl_secs(),
            diagram: DiagramStyle::default(),
            graphviz_path: None,
        }
    }
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join("settings.json")
}

impl Settings {
    /// Read `settings.json` from `dir`; a missing file yields defaults.
    pub fn read(dir: &Path) -> Result<Self, SettingsError> {
        let path = settings_path(dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write(&self, dir: &Path) -> Result<(), SettingsError> {
        fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        let tmp = dir.join(".settings.json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, settings_path(dir))?;
        Ok(())
    }

    /// Load settings the way the binaries do: `.env`, then the file, then
    /// environment overrides, then validation.
    pub fn load(dir: &Path) -> Result<Self, SettingsError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to read .env");
            }
        }
        let mut settings = Self::read(dir)?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("AUTOERGEN_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = get("AUTOERGEN_MODEL") {
            self.model = model;
        }
        if let Some(key) = get("AUTOERGEN_API_KEY")
            .or_else(|| get("GEMINI_API_KEY"))
            .or_else(|| get("GOOGLE_API_KEY"))
        {
            self.api_key = key;
        }
        if let Some(raw) = get("AUTOERGEN_TEMPERATURE") {
            self.temperature = raw.trim().parse().map_err(|e| SettingsError::Invalid {
                key: "AUTOERGEN_TEMPERATURE",
                message: format!("{raw:?}: {e}"),
            })?;
        }
        if let Some(raw) = get("AUTOERGEN_CACHE_TTL_SECS") {
            self.cache_ttl_secs = raw.trim().parse().map_err(|e| SettingsError::Invalid {
                key: "AUTOERGEN_CACHE_TTL_SECS",
                message: format!("{raw:?}: {e}"),
            })?;
        }
        if let Some(path) = get("AUTOERGEN_GRAPHVIZ") {
            self.graphviz_path = Some(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(SettingsError::Invalid {
                key: "temperature",
                message: format!("{} is outside [0, 1]", self.temperature),
            });
        }
        if self.provider.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "provider",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Whether enough is set to reach a provider. Ollama runs locally without a key.
    pub fn ai_configured(&self) -> bool {
        !self.provider.is_empty()
            && !self.model.is_empty()
            && (self.provider == "ollama" || !self.api_key.is_empty())
    }

    /// JSON view for display with the API key masked.
    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": self.provider,
            "model": self.model,
            "hasKey": !self.api_key.is_empty(),
            "configured": self.ai_configured(),
            "temperature": self.temperature,
            "cacheTtlSecs": self.cache_ttl_secs,
            "diagram": self.diagram,
            "graphvizPath": self.graphviz_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::Layout;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::read(dir.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.model = "gpt-4o-mini".into();
        settings.provider = "openai".into();
        settings.diagram.layout = Layout::TopToBottom;
        settings.write(dir.path()).unwrap();

        let read = Settings::read(dir.path()).unwrap();
        assert_eq!(read, settings);
        let raw = fs::read_to_string(settings_path(dir.path())).unwrap();
        assert!(raw.contains("\"cacheTtlSecs\""));
        assert!(raw.contains("\"topToBottom\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(settings_path(dir.path()), r#"{"provider":"ollama","model":"llama3"}"#).unwrap();
        let settings = Settings::read(dir.path()).unwrap();
        assert_eq!(settings.provider, "ollama");
        assert_eq!(settings.temperature, 0.2);
        assert!(settings.ai_configured());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup(&[
                ("GEMINI_API_KEY", "gem-key"),
                ("AUTOERGEN_TEMPERATURE", "0"),
                ("AUTOERGEN_CACHE_TTL_SECS", "60"),
            ]))
            .unwrap();
        assert_eq!(settings.api_key, "gem-key");
        assert_eq!(settings.temperature, 0.0);
        assert_eq!(settings.cache_ttl_secs, 60);
    }

    #[test]
    fn test_autoergen_key_takes_precedence() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup(&[
                ("AUTOERGEN_API_KEY", "primary"),
                ("GOOGLE_API_KEY", "fallback"),
            ]))
            .unwrap();
        assert_eq!(settings.api_key, "primary");
    }

    #[test]
    fn test_bad_temperature_override() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(lookup(&[("AUTOERGEN_TEMPERATURE", "warm")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "AUTOERGEN_TEMPERATURE", .. }));
    }

    #[test]
    fn test_temperature_out_of_range() {
        let settings = Settings {
            temperature: 1.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_masked_hides_key() {
        let settings = Settings {
            api_key: "secret".into(),
            ..Settings::default()
        };
        let masked = settings.masked();
        assert_eq!(masked["hasKey"], true);
        assert!(!masked.to_string().contains("secret"));
    }
}
