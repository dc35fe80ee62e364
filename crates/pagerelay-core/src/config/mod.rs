use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Instruction used when the operator has not configured one.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly support assistant answering people who message this Facebook Page.
Replies must be SHORT, HUMAN, and CASUAL (Facebook Messenger style), 1-2 sentences.
If you don't know the answer, say so and offer to pass the question on to the team.";

/// Root configuration for pagerelay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct Config {
    pub server: ServerConfig,
    pub facebook: FacebookConfig,
    pub completion: CompletionConfig,
    pub http: HttpClientConfig,
}

impl Config {
    /// Resolve the system instruction: file contents win over the inline text.
    pub fn system_instruction(&self) -> Result<String, ConfigError> {
        match &self.completion.system_instruction_file {
            Some(path) => {
                let path = expand_home(path);
                let text = std::fs::read_to_string(&path).map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        ConfigError::NotFound(path.clone())
                    } else {
                        ConfigError::Io { path: path.clone(), source }
                    }
                })?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "system instruction file {} is empty",
                        path.display()
                    )));
                }
                Ok(text.to_string())
            }
            None => Ok(self.completion.system_instruction.clone()),
        }
    }

    /// Socket address the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Missing secrets are warnings, not errors: the server still starts and
    /// the gap shows up per message, the same way the platform would see it.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.facebook.page_access_token.is_empty() {
            warnings.push("FB_PAGE_ACCESS_TOKEN not set; replies cannot be delivered".to_string());
        }
        if self.facebook.verify_token.is_empty() {
            warnings.push("FB_VERIFY_TOKEN not set; webhook verification will always fail".to_string());
        }
        if self.completion.api_key.is_empty() {
            warnings.push("API_KEY not set; completions will fail".to_string());
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            warnings.push(format!(
                "temperature {} is outside 0.0..=2.0",
                self.completion.temperature
            ));
        }
        warnings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Serve the HTML status page on `GET /`.
    pub status_page: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            status_page: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacebookConfig {
    pub page_access_token: String,
    pub verify_token: String,
    pub graph_api_base: String,
    pub graph_api_version: String,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_access_token: String::new(),
            verify_token: String::new(),
            graph_api_base: "https://graph.facebook.com".to_string(),
            graph_api_version: "v22.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub system_instruction: String,
    pub system_instruction_file: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: "gemini-3-pro-preview".to_string(),
            temperature: 0.7,
            max_tokens: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            system_instruction_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

// ====== Config loading ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `PAGERELAY_CONFIG` env var - full JSON config
/// 2. Config file (`config_path` or `~/.pagerelay/config.json`)
/// 3. Individual env vars, merged on top of the file
pub fn load_config_from_env(config_path: Option<&Path>) -> Config {
    if let Ok(json) = std::env::var("PAGERELAY_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse PAGERELAY_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(config_path);
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Overlay individual variables onto `cfg`. `lookup` is `std::env::var` in
/// production and a map in tests.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    // Server
    if let Some(v) = get("PORT") {
        match v.parse() {
            Ok(port) => cfg.server.port = port,
            Err(_) => tracing::warn!("Ignoring invalid PORT: {}", v),
        }
    }
    if let Some(v) = get("HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = get("PAGERELAY_STATUS_PAGE") {
        cfg.server.status_page = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }

    // Facebook
    if let Some(v) = get("FB_PAGE_ACCESS_TOKEN") {
        cfg.facebook.page_access_token = v;
    }
    if let Some(v) = get("FB_VERIFY_TOKEN") {
        cfg.facebook.verify_token = v;
    }
    if let Some(v) = get("GRAPH_API_BASE") {
        cfg.facebook.graph_api_base = v;
    }

    // Completion
    if let Some(v) = ["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .find_map(|k| get(*k))
    {
        cfg.completion.api_key = v;
    }
    if let Some(v) = get("GEMINI_API_BASE") {
        cfg.completion.api_base = Some(v);
    }
    if let Some(v) = get("PAGERELAY_MODEL") {
        cfg.completion.model = v;
    }
    if let Some(v) = get("PAGERELAY_TEMPERATURE") {
        match v.parse() {
            Ok(t) => cfg.completion.temperature = t,
            Err(_) => tracing::warn!("Ignoring invalid PAGERELAY_TEMPERATURE: {}", v),
        }
    }
    if let Some(v) = get("SYSTEM_INSTRUCTION") {
        cfg.completion.system_instruction = v;
    }
    if let Some(v) = get("SYSTEM_INSTRUCTION_FILE") {
        cfg.completion.system_instruction_file = Some(v);
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pagerelay")
        .join("config.json")
}

/// Load configuration from file, or defaults when the file is absent or broken.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 3000);
        assert!(cfg.server.status_page);
        assert_eq!(cfg.completion.model, "gemini-3-pro-preview");
        assert_eq!(cfg.completion.temperature, 0.7);
        assert_eq!(cfg.completion.max_tokens, None);
        assert_eq!(cfg.facebook.graph_api_version, "v22.0");
        assert!(cfg.facebook.page_access_token.is_empty());
        assert_eq!(cfg.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_config_camelcase_compat() {
        let json = r#"{
            "server": { "port": 8080, "statusPage": false },
            "facebook": { "pageAccessToken": "EAAG", "verifyToken": "my_secret_token" },
            "completion": { "apiKey": "AIza", "maxTokens": 256 }
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert!(!cfg.server.status_page);
        assert_eq!(cfg.facebook.page_access_token, "EAAG");
        assert_eq!(cfg.facebook.verify_token, "my_secret_token");
        assert_eq!(cfg.completion.api_key, "AIza");
        assert_eq!(cfg.completion.max_tokens, Some(256));
        // Untouched sections keep their defaults
        assert_eq!(cfg.completion.model, "gemini-3-pro-preview");
        assert_eq!(cfg.server.host, "0.0.0.0");
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        apply_env_overrides(
            &mut cfg,
            lookup_from(&[
                ("PORT", "4000"),
                ("FB_PAGE_ACCESS_TOKEN", "page-token"),
                ("FB_VERIFY_TOKEN", "verify-me"),
                ("API_KEY", "gem-key"),
                ("PAGERELAY_STATUS_PAGE", "off"),
                ("PAGERELAY_TEMPERATURE", "0.3"),
            ]),
        );
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.facebook.page_access_token, "page-token");
        assert_eq!(cfg.facebook.verify_token, "verify-me");
        assert_eq!(cfg.completion.api_key, "gem-key");
        assert!(!cfg.server.status_page);
        assert_eq!(cfg.completion.temperature, 0.3);
    }

    #[test]
    fn test_env_api_key_fallbacks() {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, lookup_from(&[("GOOGLE_API_KEY", "google")]));
        assert_eq!(cfg.completion.api_key, "google");

        let mut cfg = Config::default();
        apply_env_overrides(
            &mut cfg,
            lookup_from(&[("API_KEY", "primary"), ("GEMINI_API_KEY", "secondary")]),
        );
        assert_eq!(cfg.completion.api_key, "primary");
    }

    #[test]
    fn test_env_invalid_values_ignored() {
        let mut cfg = Config::default();
        apply_env_overrides(
            &mut cfg,
            lookup_from(&[("PORT", "not-a-port"), ("PAGERELAY_TEMPERATURE", "warm")]),
        );
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.completion.temperature, 0.7);
    }

    #[test]
    fn test_validate_reports_missing_secrets() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3);

        let mut cfg = Config::default();
        cfg.facebook.page_access_token = "a".into();
        cfg.facebook.verify_token = "b".into();
        cfg.completion.api_key = "c".into();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn test_system_instruction_inline() {
        let mut cfg = Config::default();
        cfg.completion.system_instruction = "Answer in French.".into();
        assert_eq!(cfg.system_instruction().unwrap(), "Answer in French.");
    }

    #[test]
    fn test_system_instruction_file_overrides_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prompt.txt");
        std::fs::write(&path, "  Night shift persona.\n").unwrap();

        let mut cfg = Config::default();
        cfg.completion.system_instruction_file = Some(path.to_string_lossy().into_owned());
        assert_eq!(cfg.system_instruction().unwrap(), "Night shift persona.");
    }

    #[test]
    fn test_system_instruction_file_missing() {
        let mut cfg = Config::default();
        cfg.completion.system_instruction_file =
            Some("/tmp/nonexistent_pagerelay_prompt.txt".into());
        assert!(matches!(
            cfg.system_instruction(),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"completion": {"model": "gemini-2.5-flash"}}"#).unwrap();

        let cfg = load_config(Some(&path));
        assert_eq!(cfg.completion.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_load_config_missing_file() {
        let path = Path::new("/tmp/nonexistent_pagerelay_test.json");
        let cfg = load_config(Some(path));
        assert_eq!(cfg.completion.model, "gemini-3-pro-preview");
    }
}
