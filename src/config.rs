//! Configuration management for Honyaku.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Honyaku";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Upper bound for configured waits, in seconds.
pub const MAX_WAIT_SEC: f64 = 3600.0;

/// Token in the user prompt template that is replaced with the page text.
pub const TEXT_TOKEN: &str = "{text}";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model endpoint configuration.
    pub api: ApiConfig,

    /// Translation behavior settings.
    pub translation: TranslationConfig,

    /// LLM prompts.
    pub prompts: PromptsConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// API configuration for the model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Model identifier.
    pub model: String,

    /// Optional API key. Local servers usually need none.
    pub key: String,

    /// Per-request timeout in seconds. `0` disables the timeout.
    pub request_timeout_sec: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "translategemma".to_string(),
            key: String::new(),
            request_timeout_sec: 600,
        }
    }
}

impl ApiConfig {
    /// Checks whether an API key should be sent.
    pub fn has_key(&self) -> bool {
        !self.key.trim().is_empty()
    }
}

/// Translation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Number of attempts per page before it is marked failed.
    pub max_retries: u32,

    /// Backoff unit in seconds; attempt `n` waits `2^n` units.
    pub backoff_unit_sec: f64,

    /// Pause after each page in seconds.
    pub delay_between_pages_sec: f64,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling cutoff.
    pub top_p: f32,

    /// Maximum tokens generated per page.
    pub max_tokens: u32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit_sec: 1.0,
            delay_between_pages_sec: 0.5,
            temperature: 0.3,
            top_p: 0.9,
            max_tokens: 4096,
        }
    }
}

/// LLM prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// System prompt sent with every page.
    pub system: String,

    /// User prompt template; `{text}` is replaced with the protected page.
    pub user_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: r#"당신은 전문 게임 디자인 서적 번역가입니다.

## 번역 지침:
1. 영어를 자연스럽고 정확한 한국어로 번역하세요
2. 게임 디자인 전문 용어는 적절하게 번역하되, 널리 알려진 용어는 영문 병기 가능
3. 고유명사(인명, 게임명, 회사명)는 원문 그대로 유지
4. 마크다운 문법(헤더, 리스트 등)은 그대로 유지
5. __PRESERVED_로 시작하는 플레이스홀더는 절대 번역하지 말고 그대로 유지
6. 문장 구조를 한국어에 맞게 자연스럽게 조정

## 주의사항:
- 원문의 의미를 정확하게 전달
- 불필요한 설명 추가 금지
- 번역 결과만 출력 (부가 설명 없이)"#
                .to_string(),
            user_template: "다음 영어 텍스트를 한국어로 번역하세요:\n\n{text}\n\n번역 결과:"
                .to_string(),
        }
    }
}

/// File path configuration.
///
/// Relative paths are resolved against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Source markdown document.
    pub input: PathBuf,

    /// Merged translation output.
    pub output: PathBuf,

    /// Job state file.
    pub state_file: PathBuf,

    /// Output of sample mode.
    pub sample_output: PathBuf,

    /// State file of sample mode (deleted at the start of every sample run).
    pub sample_state_file: PathBuf,

    /// mdBook source directory written by the chapter splitter.
    pub book_src: PathBuf,

    /// Directory of `chapter<N>.md` files for the static site.
    pub chapters_dir: PathBuf,

    /// Static site entry page.
    pub index_html: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("book.md"),
            output: PathBuf::from("book_ko.md"),
            state_file: PathBuf::from("translation_state.json"),
            sample_output: PathBuf::from("sample_ko.md"),
            sample_state_file: PathBuf::from("sample_state.json"),
            book_src: PathBuf::from("src"),
            chapters_dir: PathBuf::from("translate"),
            index_html: PathBuf::from("index.html"),
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingValue("api.base_url".to_string()));
        }

        if self.api.model.trim().is_empty() {
            return Err(ConfigError::MissingValue("api.model".to_string()));
        }

        if self.translation.max_retries == 0 {
            return Err(invalid("translation.max_retries", "must be greater than 0"));
        }

        if !(0.0..=MAX_WAIT_SEC).contains(&self.translation.backoff_unit_sec) {
            return Err(invalid(
                "translation.backoff_unit_sec",
                "must be between 0 and 3600 seconds",
            ));
        }

        if !(0.0..=MAX_WAIT_SEC).contains(&self.translation.delay_between_pages_sec) {
            return Err(invalid(
                "translation.delay_between_pages_sec",
                "must be between 0 and 3600 seconds",
            ));
        }

        if !(0.0..=2.0).contains(&self.translation.temperature) {
            return Err(invalid("translation.temperature", "must be between 0 and 2"));
        }

        if !(0.0..=1.0).contains(&self.translation.top_p) {
            return Err(invalid("translation.top_p", "must be between 0 and 1"));
        }

        if !self.prompts.user_template.contains(TEXT_TOKEN) {
            return Err(invalid(
                "prompts.user_template",
                "must contain the {text} token",
            ));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
