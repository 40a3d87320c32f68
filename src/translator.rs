//! Page translation through an OpenAI-compatible chat API.
//!
//! Protects markdown before sending a page to the model, retries failed
//! calls with exponential backoff, and checks that every placeholder came
//! back intact before restoring the original markdown.

use crate::config::{
    ApiConfig, Config, MAX_WAIT_SEC, PromptsConfig, TEXT_TOKEN, TranslationConfig,
};
use crate::console::Console;
use crate::error::TranslationError;
use crate::protector::{self, Protected};
use crate::utils::check_response_status;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// System and user prompt for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

/// A model that turns a prompt into text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Model identifier, for reporting.
    fn model(&self) -> &str;

    /// Runs one completion. Implementations do not retry.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, TranslationError>;
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Content of the message.
    pub content: String,
}

/// Request body for the chat completions API.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

/// A single choice in a streaming chunk.
#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

/// Delta content in a streaming response.
#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Streaming chunk from the API.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<Choice>,
}

/// Error payload some servers send inside the event stream.
#[derive(Debug, Deserialize)]
struct StreamError {
    error: StreamErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamErrorBody {
    Detailed { message: String },
    Plain(String),
}

/// One parsed server-sent-event line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    /// Text to append to the response.
    Content(String),
    /// The `[DONE]` terminator.
    Done,
    /// Comments, keep-alives and chunks without text.
    Ignored,
}

/// Parses one line of a chat completions event stream.
fn parse_sse_line(line: &str) -> Result<SseLine, TranslationError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Ignored);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Ignored);
    }

    if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
        let content: String = chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.and_then(|delta| delta.content))
            .collect();
        return Ok(if content.is_empty() {
            SseLine::Ignored
        } else {
            SseLine::Content(content)
        });
    }

    if let Ok(err) = serde_json::from_str::<StreamError>(data) {
        let message = match err.error {
            StreamErrorBody::Detailed { message } => message,
            StreamErrorBody::Plain(message) => message,
        };
        return Err(TranslationError::ApiError(message));
    }

    tracing::debug!(data, "Skipping unrecognised stream line");
    Ok(SseLine::Ignored)
}

/// Splits a chat completions byte stream into parsed event lines.
///
/// Bytes are buffered until a newline, so events and multi-byte characters
/// split across network chunks are decoded whole. Everything after `[DONE]`
/// is ignored.
#[derive(Debug, Default)]
struct SseReader {
    pending: Vec<u8>,
    done: bool,
}

impl SseReader {
    /// Feeds one network chunk and returns the complete lines it finished.
    /// `Ignored` lines are dropped.
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseLine>, TranslationError> {
        let mut lines = Vec::new();
        if self.done {
            return Ok(lines);
        }

        self.pending.extend_from_slice(bytes);
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            match Self::parse(&raw)? {
                SseLine::Ignored => {}
                SseLine::Done => {
                    self.done = true;
                    self.pending.clear();
                    lines.push(SseLine::Done);
                    break;
                }
                line => lines.push(line),
            }
        }

        Ok(lines)
    }

    /// Parses a final event that arrived without a trailing newline.
    fn finish(&mut self) -> Result<Option<SseLine>, TranslationError> {
        if self.done || self.pending.is_empty() {
            return Ok(None);
        }

        let raw = std::mem::take(&mut self.pending);
        Ok(match Self::parse(&raw)? {
            SseLine::Ignored => None,
            line => Some(line),
        })
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn parse(raw: &[u8]) -> Result<SseLine, TranslationError> {
        let line = std::str::from_utf8(raw).map_err(|e| {
            TranslationError::ParseError(format!("invalid UTF-8 in stream: {}", e))
        })?;
        parse_sse_line(line.trim_end())
    }
}

/// Backend that streams from `<base_url>/chat/completions`.
pub struct ChatCompletionsBackend {
    /// HTTP client for API requests.
    client: Client,
    /// API configuration.
    api_config: ApiConfig,
    /// Sampling settings.
    translation_config: TranslationConfig,
    /// Whether to draw a live progress line while streaming.
    live_progress: bool,
    /// Console for output.
    console: Console,
}

impl ChatCompletionsBackend {
    /// Create a backend from API and sampling configuration.
    pub fn new(
        api_config: ApiConfig,
        translation_config: TranslationConfig,
    ) -> Result<Self, TranslationError> {
        let mut builder = Client::builder();
        if api_config.request_timeout_sec > 0 {
            builder = builder.timeout(Duration::from_secs(api_config.request_timeout_sec));
        }

        Ok(Self {
            client: builder.build()?,
            api_config,
            translation_config,
            live_progress: std::io::stdout().is_terminal(),
            console: Console::new(),
        })
    }

    /// Display progress during streaming.
    fn display_progress(&self, response: &str, elapsed: Duration) {
        let char_count = response.chars().count();
        let speed = if elapsed.as_secs_f64() > 0.0 {
            char_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        // Last 50 chars, newlines flattened
        let tail: Vec<char> = response.chars().rev().take(50).collect();
        let preview: String = tail
            .into_iter()
            .rev()
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();

        self.console.progress_update(&format!(
            "Progress: {} chars at {}. {}",
            self.console.count(char_count),
            self.console.speed(speed),
            self.console.muted(&format!("{}...", preview))
        ));
    }
}

#[async_trait]
impl ModelBackend for ChatCompletionsBackend {
    fn model(&self) -> &str {
        &self.api_config.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, TranslationError> {
        let request = ChatRequest {
            model: &self.api_config.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            stream: true,
            temperature: self.translation_config.temperature,
            top_p: self.translation_config.top_p,
            max_tokens: self.translation_config.max_tokens,
        };

        let url = format!(
            "{}/chat/completions",
            self.api_config.base_url.trim_end_matches('/')
        );
        let mut builder = self.client.post(&url).json(&request);
        if self.api_config.has_key() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_config.key));
        }

        let response = check_response_status(builder.send().await?).await?;

        let mut full_response = String::new();
        let mut reader = SseReader::default();
        let start_time = Instant::now();
        let mut last_update = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            for line in reader.push(&chunk?)? {
                if let SseLine::Content(text) = line {
                    full_response.push_str(&text);
                }
            }

            if reader.is_done() {
                break;
            }

            if self.live_progress && last_update.elapsed() >= Duration::from_secs(1) {
                self.display_progress(&full_response, start_time.elapsed());
                last_update = Instant::now();
            }
        }

        if let Some(SseLine::Content(text)) = reader.finish()? {
            full_response.push_str(&text);
        }

        if self.live_progress {
            self.console.clear_line();
        }

        let trimmed = full_response.trim();
        if trimmed.is_empty() {
            return Err(TranslationError::EmptyResponse);
        }

        Ok(trimmed.to_string())
    }
}

/// Translator for markdown pages.
pub struct Translator {
    /// Model backend.
    backend: Arc<dyn ModelBackend>,
    /// Retry and pacing settings.
    translation_config: TranslationConfig,
    /// Prompts sent with each page.
    prompts: PromptsConfig,
    /// Console for output.
    console: Console,
}

impl Translator {
    /// Create a new Translator over any backend.
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        translation_config: TranslationConfig,
        prompts: PromptsConfig,
    ) -> Self {
        Self {
            backend,
            translation_config,
            prompts,
            console: Console::new(),
        }
    }

    /// Create a Translator that talks to the configured chat completions API.
    pub fn from_config(config: &Config) -> Result<Self, TranslationError> {
        if !config.prompts.user_template.contains(TEXT_TOKEN) {
            return Err(TranslationError::InvalidConfig(
                "prompts.user_template has no {text} token".to_string(),
            ));
        }

        let backend =
            ChatCompletionsBackend::new(config.api.clone(), config.translation.clone())?;
        Ok(Self::new(
            Arc::new(backend),
            config.translation.clone(),
            config.prompts.clone(),
        ))
    }

    /// Model identifier of the backend.
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Translate one page of markdown.
    ///
    /// Retries up to `max_retries` attempts; after failed attempt `n` waits
    /// `2^n` backoff units. The error of the last attempt is returned once
    /// attempts run out.
    pub async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let protected = protector::protect(text);
        let prompt = self.build_prompt(&protected);
        let max_retries = self.translation_config.max_retries;
        let mut last_error: Option<TranslationError> = None;

        for attempt in 0..max_retries {
            match self.attempt(&protected, &prompt).await {
                Ok(translated) => return Ok(translated),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Translation attempt failed");
                    if attempt + 1 < max_retries {
                        let delay = self.backoff_delay(attempt);
                        self.console.warning(&format!(
                            "Translation failed ({}), retrying in {:?} (attempt {}/{})",
                            e,
                            delay,
                            attempt + 2,
                            max_retries
                        ));
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(TranslationError::RetriesExhausted {
            attempts: max_retries,
        }))
    }

    /// One call to the backend, with placeholder validation and restoration.
    async fn attempt(
        &self,
        protected: &Protected,
        prompt: &ChatPrompt,
    ) -> Result<String, TranslationError> {
        let raw = self.backend.complete(prompt).await?;
        protected.verify(&raw)?;
        Ok(protected.restore(&raw))
    }

    /// Build the prompt for a protected page.
    fn build_prompt(&self, protected: &Protected) -> ChatPrompt {
        ChatPrompt {
            system: self.prompts.system.clone(),
            user: self.prompts.user_template.replace(TEXT_TOKEN, &protected.text),
        }
    }

    /// Delay after failed attempt `attempt` (0-based), capped at one hour.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let units = 2u64.saturating_pow(attempt) as f64;
        let secs = units * self.translation_config.backoff_unit_sec.max(0.0);
        Duration::try_from_secs_f64(secs.min(MAX_WAIT_SEC)).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays scripted outcomes and records prompts.
    #[derive(Default)]
    pub struct ScriptedBackend {
        outcomes: Mutex<VecDeque<Result<String, TranslationError>>>,
        prompts: Mutex<Vec<ChatPrompt>>,
        echo: bool,
    }

    impl ScriptedBackend {
        /// Replays `outcomes` in order; fails once they run out.
        pub fn new(outcomes: Vec<Result<String, TranslationError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Self::default()
            }
        }

        /// Answers every call with the protected text prefixed by `[ko] `.
        pub fn echo() -> Self {
            Self {
                echo: true,
                ..Self::default()
            }
        }

        /// Prompts received so far.
        pub fn prompts(&self) -> Vec<ChatPrompt> {
            self.prompts.lock().unwrap().clone()
        }

        /// Number of calls so far.
        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &ChatPrompt) -> Result<String, TranslationError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            if self.echo {
                let body = prompt
                    .user
                    .strip_prefix("Translate:\n")
                    .unwrap_or(&prompt.user);
                return Ok(format!("[ko] {}", body));
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TranslationError::ApiError("script exhausted".into())))
        }
    }

    /// Settings without any waiting.
    pub fn instant_config() -> TranslationConfig {
        TranslationConfig {
            backoff_unit_sec: 0.0,
            delay_between_pages_sec: 0.0,
            ..TranslationConfig::default()
        }
    }

    /// Prompts whose user message is `Translate:\n{text}`.
    pub fn plain_prompts() -> PromptsConfig {
        PromptsConfig {
            system: "Translate to Korean.".to_string(),
            user_template: "Translate:\n{text}".to_string(),
        }
    }

    /// Translator over `backend` with instant retries.
    pub fn translator(backend: Arc<ScriptedBackend>) -> Translator {
        Translator::new(backend, instant_config(), plain_prompts())
    }
}
