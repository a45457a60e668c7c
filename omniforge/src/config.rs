//! Runtime configuration from `OMNIFORGE_*` environment variables.

use std::env;

use crate::error::{Error, Result};

/// Parse the boolean grammar accepted by every boolean env var.
///
/// Truthy: `true`, `True`, `TRUE`, `1`, `yes`, `Yes`.
/// Falsy: `false`, `False`, `FALSE`, `0`, `no`, `No`.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "true" | "True" | "TRUE" | "1" | "yes" | "Yes" => Ok(true),
        "false" | "False" | "FALSE" | "0" | "no" | "No" => Ok(false),
        other => Err(Error::Configuration(format!(
            "invalid boolean value '{other}'"
        ))),
    }
}

fn read(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_u64(name: &str, default: u64) -> Result<u64> {
    match read(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Configuration(format!("{name} must be an integer, got '{raw}'"))),
    }
}

fn read_u32(name: &str, default: u32) -> Result<u32> {
    read_u64(name, u64::from(default)).map(|v| v as u32)
}

fn read_bool(name: &str, default: bool) -> Result<bool> {
    match read(name) {
        None => Ok(default),
        Some(raw) => {
            parse_bool(&raw).map_err(|_| {
                Error::Configuration(format!("{name} must be a boolean, got '{raw}'"))
            })
        }
    }
}

fn read_list(name: &str) -> Vec<String> {
    read(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// LLM-layer settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Default model for reasoning calls.
    pub default_model: String,
    /// Fallback models, in preference order.
    pub fallback_models: Vec<String>,
    /// Provider request timeout.
    pub timeout_ms: u64,
    /// Provider retry budget.
    pub max_retries: u32,
    /// Approved model patterns seeded into governance.
    pub approved_models: Vec<String>,
    /// Whether the response cache is enabled.
    pub cache_enabled: bool,
    /// Response cache TTL.
    pub cache_ttl_seconds: u64,
}

/// Credentials for the supported providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
    /// Anthropic API key.
    pub anthropic_api_key: Option<String>,
    /// Groq API key.
    pub groq_api_key: Option<String>,
    /// OpenRouter API key.
    pub openrouter_api_key: Option<String>,
    /// Azure OpenAI API key.
    pub azure_openai_api_key: Option<String>,
    /// Azure OpenAI endpoint base URL.
    pub azure_openai_api_base: Option<String>,
    /// Azure OpenAI API version.
    pub azure_openai_api_version: Option<String>,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Default tenant when none is supplied by the caller.
    pub tenant_id: Option<String>,
    /// LLM-layer settings.
    pub llm: LlmConfig,
    /// Provider credentials.
    pub providers: ProviderConfig,
}

impl RuntimeConfig {
    /// Load the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tenant_id: read("OMNIFORGE_TENANT_ID"),
            llm: LlmConfig {
                default_model: read("OMNIFORGE_LLM_DEFAULT_MODEL")
                    .unwrap_or_else(|| "claude-sonnet-4".into()),
                fallback_models: read_list("OMNIFORGE_LLM_FALLBACK_MODELS"),
                timeout_ms: read_u64("OMNIFORGE_LLM_TIMEOUT_MS", 60_000)?,
                max_retries: read_u32("OMNIFORGE_LLM_MAX_RETRIES", 3)?,
                approved_models: read_list("OMNIFORGE_LLM_APPROVED_MODELS"),
                cache_enabled: read_bool("OMNIFORGE_LLM_CACHE_ENABLED", false)?,
                cache_ttl_seconds: read_u64("OMNIFORGE_LLM_CACHE_TTL_SECONDS", 300)?,
            },
            providers: ProviderConfig {
                openai_api_key: read("OMNIFORGE_OPENAI_API_KEY"),
                anthropic_api_key: read("OMNIFORGE_ANTHROPIC_API_KEY"),
                groq_api_key: read("OMNIFORGE_GROQ_API_KEY"),
                openrouter_api_key: read("OMNIFORGE_OPENROUTER_API_KEY"),
                azure_openai_api_key: read("OMNIFORGE_AZURE_OPENAI_API_KEY"),
                azure_openai_api_base: read("OMNIFORGE_AZURE_OPENAI_API_BASE"),
                azure_openai_api_version: read("OMNIFORGE_AZURE_OPENAI_API_VERSION"),
            },
        })
    }
}
