use crate::search::parse_field_specs;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_VERSION: &str = "2024-05-01-preview";
const DEFAULT_DEPLOYMENT: &str = "gpt-4o";
const DEFAULT_PROMPT_KEYS: &str = "summary";
const DEFAULT_REQUEST_QUEUE: &str = "openai_queue";
const DEFAULT_RESULTS_QUEUE: &str = "openai_results_queue";
const DEFAULT_PROMPT: &str = "You are a JSON formatter for extracting information out of a single chat conversation.\n\n\
Summarize the conversation, key: summary\n\
Is the customer satisfied with the agent interaction (Yes or No), key: satisfied\n\n\
Answer in JSON machine-readable format, using the keys from above.\n\
Pretty print the JSON and make sure that it is properly closed at the end and do not generate any other content.";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration shared by the HTTP host and the queue worker.
///
/// Loaded once at process start; components receive the settings slice they need at
/// construction time and never read the environment themselves.
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue names and transport credentials.
    pub queue: QueueSettings,
    /// Generation backend settings, present when `OPENAI_API_BASE` is set.
    pub completion: Option<CompletionSettings>,
    /// Search index settings, present when a search service or endpoint is set.
    pub search: Option<SearchSettings>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Which backend call shape the completion client uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionMode {
    /// Single prompt string (input followed by the instruction).
    Completion,
    /// System/user message exchange.
    Chat,
}

impl FromStr for CompletionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            _ => Ok(Self::Completion),
        }
    }
}

/// Generation backend endpoint and default sampling parameters.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    /// Base URL of the backend resource.
    pub endpoint: String,
    /// Key sent in the `api-key` header.
    pub api_key: String,
    /// Backend API version query parameter.
    pub api_version: String,
    /// Model deployment name.
    pub deployment: String,
    /// Call shape used for every request.
    pub mode: CompletionMode,
    /// Instruction sent with every request unless overridden per call.
    pub system_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Frequency penalty.
    pub frequency_penalty: f32,
    /// Presence penalty.
    pub presence_penalty: f32,
}

/// Search index endpoint and the typed field schema populated from enrichment output.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Base URL of the search service.
    pub endpoint: String,
    /// Target index name.
    pub index_name: String,
    /// Admin key sent in the `api-key` header.
    pub api_key: String,
    /// Search REST API version.
    pub api_version: String,
    /// Comma-separated `key:type:extra` field specs.
    pub prompt_keys: String,
}

/// Queue transport settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Service Bus connection string.
    pub connection_string: String,
    /// Queue receiving enrichment requests.
    pub request_queue: String,
    /// Queue receiving enrichment results.
    pub results_queue: String,
    /// Optional delivery delay applied to request messages.
    pub enqueue_delay: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Self {
            queue: QueueSettings {
                connection_string: vars.required("AzureServiceBusConnectionString")?,
                request_queue: vars
                    .optional("ENRICHMENT_REQUEST_QUEUE")
                    .unwrap_or_else(|| DEFAULT_REQUEST_QUEUE.to_string()),
                results_queue: vars
                    .optional("ENRICHMENT_RESULTS_QUEUE")
                    .unwrap_or_else(|| DEFAULT_RESULTS_QUEUE.to_string()),
                enqueue_delay: vars
                    .parsed::<u64>("ENRICHMENT_ENQUEUE_DELAY_SECS")?
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            },
            completion: load_completion(&vars)?,
            search: load_search(&vars)?,
            server_port: vars.parsed("SERVER_PORT")?,
        })
    }

    /// Generation backend settings, or an error naming the missing variable.
    pub fn completion(&self) -> Result<&CompletionSettings, ConfigError> {
        self.completion
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVariable("OPENAI_API_BASE".into()))
    }

    /// Search index settings, or an error naming the missing variable.
    pub fn search(&self) -> Result<&SearchSettings, ConfigError> {
        self.search
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVariable("AZURE_SEARCH_SERVICE_NAME".into()))
    }
}

fn load_completion<F>(vars: &Vars<F>) -> Result<Option<CompletionSettings>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(endpoint) = vars.optional("OPENAI_API_BASE") else {
        return Ok(None);
    };

    Ok(Some(CompletionSettings {
        endpoint,
        api_key: vars.required("OPENAI_API_KEY")?,
        api_version: vars
            .optional("OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        deployment: vars
            .optional("OPENAI_DEPLOYMENT_NAME")
            .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
        mode: vars
            .optional("OPENAI_MODEL_TYPE")
            .and_then(|value| value.parse().ok())
            .unwrap_or(CompletionMode::Completion),
        system_prompt: vars
            .optional("OPENAI_PROMPT")
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        temperature: vars.parsed("OPENAI_TEMPERATURE")?.unwrap_or(0.7),
        max_tokens: vars.parsed("OPENAI_MAX_TOKENS")?.unwrap_or(800),
        top_p: vars.parsed("OPENAI_TOP_P")?.unwrap_or(0.95),
        frequency_penalty: vars.parsed("OPENAI_FREQUENCY_PENALTY")?.unwrap_or(0.0),
        presence_penalty: vars.parsed("OPENAI_PRESENCE_PENALTY")?.unwrap_or(0.0),
    }))
}

fn load_search<F>(vars: &Vars<F>) -> Result<Option<SearchSettings>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let endpoint = match (
        vars.optional("AZURE_SEARCH_ENDPOINT"),
        vars.optional("AZURE_SEARCH_SERVICE_NAME"),
    ) {
        (Some(endpoint), _) => endpoint,
        (None, Some(service)) => format!("https://{service}.search.windows.net"),
        (None, None) => return Ok(None),
    };

    let prompt_keys = vars
        .optional("OPENAI_PROMPT_KEYS")
        .unwrap_or_else(|| DEFAULT_PROMPT_KEYS.to_string());
    parse_field_specs(&prompt_keys)
        .map_err(|error| ConfigError::InvalidValue(format!("OPENAI_PROMPT_KEYS ({error})")))?;

    Ok(Some(SearchSettings {
        endpoint,
        index_name: vars.required("AZURE_SEARCH_INDEX_NAME")?,
        api_key: vars.required("AZURE_SEARCH_API_KEY")?,
        api_version: vars.required("AZURE_SEARCH_API_VERSION")?,
        prompt_keys,
    }))
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        request_queue = %config.queue.request_queue,
        results_queue = %config.queue.results_queue,
        completion_mode = ?config.completion.as_ref().map(|settings| settings.mode),
        search_index = ?config.search.as_ref().map(|settings| settings.index_name.as_str()),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
