//! Reasoning traces from an OpenAI-compatible chat completion API.
//!
//! Every input record with a `text` field is sent to a reasoning model; the
//! reasoning it returns is stored next to the original text. Processing is
//! resumable: records already present in the output file are not requested
//! again.

use std::io::Write;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PunktError, Result};
use crate::pool::ordered_map;
use crate::record::{append_output, recover_lines, write_record, Record, RecordReader};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant";

pub const ERROR_NO_RESPONSE: &str = "ERROR: Failed to get response from API";
pub const ERROR_MISSING_REASONING: &str = "ERROR: reasoning_content missing";

/// Which part of the assistant message carries the reasoning.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningField {
    ReasoningContent,
    Content,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[value(name = "deepinfra")]
    DeepInfra,
    #[value(name = "deepseek")]
    DeepSeek,
}

impl Provider {
    pub fn base_url(self) -> &'static str {
        match self {
            Provider::DeepInfra => "https://api.deepinfra.com/v1/openai",
            Provider::DeepSeek => "https://api.deepseek.com",
        }
    }

    pub fn model(self) -> &'static str {
        match self {
            Provider::DeepInfra => "deepseek-ai/DeepSeek-R1",
            Provider::DeepSeek => "deepseek-reasoner",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Provider::DeepInfra => "DEEP_INFRA",
            Provider::DeepSeek => "DeepSeekApi",
        }
    }

    pub fn reasoning_field(self) -> ReasoningField {
        match self {
            Provider::DeepInfra => ReasoningField::ReasoningContent,
            Provider::DeepSeek => ReasoningField::Content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub reasoning_field: ReasoningField,
    pub workers: usize,
    pub retries: usize,
    pub timeout: Duration,
    pub retry_backoff: Duration,
}

impl FetchConfig {
    /// Preset for `provider`, the key is read from the provider's environment variable.
    pub fn for_provider(provider: Provider) -> Result<Self> {
        let env = provider.api_key_env();
        let api_key = std::env::var(env).map_err(|_| PunktError::MissingEnv(env.to_string()))?;
        Ok(Self {
            base_url: provider.base_url().to_string(),
            model: provider.model().to_string(),
            api_key,
            reasoning_field: provider.reasoning_field(),
            workers: 4,
            retries: 2,
            timeout: Duration::from_secs(600),
            retry_backoff: Duration::from_secs(2),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PunktError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(PunktError::InvalidConfig(format!(
                "base url {:?} is not an http(s) url",
                self.base_url
            )));
        }
        if self.model.is_empty() {
            return Err(PunktError::InvalidConfig("model must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl AssistantMessage {
    pub fn reasoning(&self, field: ReasoningField) -> Option<&str> {
        let value = match field {
            ReasoningField::ReasoningContent => self.reasoning_content.as_deref(),
            ReasoningField::Content => self.content.as_deref(),
        };
        value.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Anything that can answer a chat prompt.
pub trait ChatBackend: Sync {
    fn complete(&self, system: &str, user: &str) -> Result<AssistantMessage>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

pub struct ChatClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retries: usize,
    retry_backoff: Duration,
}

impl ChatClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retries: config.retries,
            retry_backoff: config.retry_backoff,
        })
    }

    fn request(&self, system: &str, user: &str) -> Result<AssistantMessage> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(PunktError::Api {
                service: "chat completion",
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let response: ChatResponse = response.json()?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .unwrap_or_default())
    }
}

/// Transport failures, rate limiting and server errors.
pub fn is_retryable(err: &PunktError) -> bool {
    match err {
        PunktError::Http(_) => true,
        PunktError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

impl ChatBackend for ChatClient {
    fn complete(&self, system: &str, user: &str) -> Result<AssistantMessage> {
        let mut attempt = 0;
        loop {
            match self.request(system, user) {
                Ok(message) => return Ok(message),
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    attempt += 1;
                    warn!("Chat completion failed ({err}), retry {attempt}/{}", self.retries);
                    thread::sleep(self.retry_backoff * attempt as u32);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Renders a `str.format`-style template with a single `{text}` placeholder.
/// `{{` and `}}` produce literal braces.
pub fn render_template(template: &str, text: &str) -> String {
    let mut result = String::with_capacity(template.len() + text.len());
    let mut rest = template;

    while let Some(i) = rest.find(['{', '}'].as_slice()) {
        result.push_str(&rest[..i]);
        let tail = &rest[i..];

        if tail.starts_with("{{") {
            result.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            result.push('}');
            rest = &tail[2..];
        } else if tail.starts_with("{text}") {
            result.push_str(text);
            rest = &tail["{text}".len()..];
        } else {
            result.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    result.push_str(rest);
    result
}

/// `data/paragraphs.jsonl` becomes `data/paragraphs_processed.jsonl`.
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_processed.jsonl"))
}

/// Asks `backend` for the reasoning behind `text`, failures become `ERROR:` sentinels.
pub fn fetch_reasoning<B: ChatBackend + ?Sized>(
    backend: &B,
    template: &str,
    text: &str,
    field: ReasoningField,
) -> String {
    let prompt = render_template(template, text);
    match backend.complete(SYSTEM_PROMPT, &prompt) {
        Ok(message) => match message.reasoning(field) {
            Some(reasoning) => reasoning.to_string(),
            None => {
                warn!("Response did not contain reasoning: {message:?}");
                ERROR_MISSING_REASONING.to_string()
            }
        },
        Err(err) => {
            warn!("API error: {err}");
            ERROR_NO_RESPONSE.to_string()
        }
    }
}

/// Moves `text` to `original_text` and `text_result`, adding `reasoning`.
/// Records without a string `text` are returned untouched.
pub fn enrich_record<B: ChatBackend + ?Sized>(
    backend: &B,
    template: &str,
    field: ReasoningField,
    record: Record,
) -> Record {
    let Some(text) = record.get("text").and_then(Value::as_str).map(str::to_owned) else {
        debug!("Passing through record without 'text' field");
        return record;
    };

    let reasoning = fetch_reasoning(backend, template, &text, field);

    let mut enriched: Record = record.into_iter().filter(|(k, _)| k != "text").collect();
    enriched.insert("reasoning".to_string(), Value::String(reasoning));
    enriched.insert("text_result".to_string(), Value::String(text.clone()));
    enriched.insert("original_text".to_string(), Value::String(text));
    enriched
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FetchStats {
    pub resumed_from: usize,
    pub written: usize,
    pub failed: usize,
}

/// Processes `input` into `output`, skipping records `output` already contains.
/// A partial last line or unfinished zstd frame from a killed run is discarded first.
pub fn process_file<B: ChatBackend + ?Sized>(
    backend: &B,
    input: &Path,
    output: &Path,
    template: &str,
    field: ReasoningField,
    workers: usize,
    progress: &ProgressBar,
) -> Result<FetchStats> {
    let done = recover_lines(output)?;
    let mut stats = FetchStats {
        resumed_from: done,
        ..FetchStats::default()
    };
    if done > 0 {
        info!("Resuming after {done} records already in {}", output.display());
    }
    progress.inc(done as u64);

    let records = RecordReader::open(input)?.skip(done);
    let mut writer = append_output(output)?;

    ordered_map(
        records,
        workers,
        |record| enrich_record(backend, template, field, record),
        |record| {
            let failed = record
                .get("reasoning")
                .and_then(Value::as_str)
                .map_or(false, |r| r.starts_with("ERROR"));
            if failed {
                stats.failed += 1;
            }

            write_record(&mut writer, &record)?;
            // flush per record so an interrupted run can resume exactly
            writer.flush()?;
            stats.written += 1;
            progress.inc(1);
            Ok(ControlFlow::Continue(()))
        },
    )?;

    Ok(stats)
}
