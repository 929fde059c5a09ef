use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Must be a vision-capable model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional API key stored in config.toml (falls back to env var DESKPILOT_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// Config key wins; DESKPILOT_API_KEY is the fallback.
    pub fn resolve_api_key(&self) -> PilotResult<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var("DESKPILOT_API_KEY").map_err(|_| {
            PilotError::Config(
                "no API key: set llm.api_key in config.toml or the DESKPILOT_API_KEY env var"
                    .into(),
            )
        })
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// The destructive-text blocklist on `write` actions. Best-effort, not a sandbox.
    #[serde(default = "default_true")]
    pub enable_write_filter: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enable_write_filter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on model-call iterations per run. 0 disables the cap.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Where per-session screenshots are written. Defaults under the user data dir.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            screenshot_dir: None,
        }
    }
}

impl SessionConfig {
    /// `~/.local/share/deskpilot/screenshots` (platform equivalent), falling back
    /// to `./screenshots` when no data dir is available.
    pub fn resolve_screenshot_dir(&self) -> PathBuf {
        if let Some(dir) = &self.screenshot_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("deskpilot").join("screenshots"))
            .unwrap_or_else(|| PathBuf::from("screenshots"))
    }
}

fn default_max_iterations() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(PilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Loads config.toml; a missing file yields the built-in defaults.
pub fn load_config() -> PilotResult<AppConfig> {
    let path = match resolve_config_path() {
        Ok(p) => p,
        Err(e) => {
            tracing::info!(reason = %e, "no config file, using defaults");
            return Ok(AppConfig::default());
        }
    };
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), model = %config.llm.model, "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.session.max_iterations, 30);
        assert!(config.safety.enable_write_filter);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            model = "gpt-4o-mini"

            [session]
            max_iterations = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(
            config.llm.api_base,
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(config.session.max_iterations, 5);
    }
}
