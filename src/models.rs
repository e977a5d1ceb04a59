/// Context length used for any model id missing from [`MODEL_MAX_TOKENS`].
pub const FALLBACK_MAX_TOKENS: usize = 128_000;

/// Upper bound on the response budget sent with a completion request.
///
/// Historical default of the completions API. Kept for compatibility; it is
/// not derived from any model's real limit and should be revisited.
pub const RESPONSE_TOKEN_CEILING: usize = 4096;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Supported models and their maximum context length.
/// Add a model here to make it selectable in the dropdown.
pub const MODEL_MAX_TOKENS: &[(&str, usize)] = &[
    // GPT-4o
    ("gpt-4o", 128_000),
    ("gpt-4o-2024-05-13", 128_000),
    // GPT-4o mini
    ("gpt-4o-mini", 128_000),
    ("gpt-4o-mini-2024-07-18", 128_000),
    // GPT-4 Turbo and GPT-4
    ("gpt-4-turbo", 128_000),
    ("gpt-4-turbo-2024-04-09", 128_000),
    ("gpt-4-turbo-preview", 128_000),
    ("gpt-4-0125-preview", 4096),
    ("gpt-4-1106-preview", 4096),
    ("gpt-4", 8192),
    ("gpt-4-0613", 8192),
    ("gpt-4-0314", 8192),
    // GPT-4-32k
    ("gpt-4-32k", 32_768),
    ("gpt-4-32k-0613", 32_768),
    ("gpt-4-32k-0314", 32_768),
    // GPT-3.5 Turbo
    ("gpt-3.5-turbo-0125", 16_385),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-3.5-turbo-1106", 16_385),
    ("gpt-3.5-turbo-instruct", 4096),
    ("gpt-3.5-turbo-16k", 16_385),
    ("gpt-3.5-turbo-0613", 4096),
    ("gpt-3.5-turbo-16k-0613", 16_385),
    ("gpt-3.5-turbo-0301", 4096),
];

const CHAT_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-0613",
    "gpt-3.5-turbo-1106",
    "gpt-3.5-turbo-16k",
    "gpt-3.5-turbo-instruct",
    "gpt-3.5-turbo-16k-0613",
    "gpt-4",
    "gpt-4-0613",
    "gpt-4-0314",
];

/// A model the app can send prompts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelProfile {
    pub id: String,
    pub max_context_length: usize,
    pub chat: bool,
}

impl ModelProfile {
    pub fn new(id: impl Into<String>, max_context_length: usize, chat: bool) -> Self {
        Self {
            id: id.into(),
            max_context_length,
            chat,
        }
    }

    /// `min(max_context_length, RESPONSE_TOKEN_CEILING)`.
    pub fn response_token_cap(&self) -> usize {
        self.max_context_length.min(RESPONSE_TOKEN_CEILING)
    }
}

pub fn max_tokens_for(id: &str) -> usize {
    MODEL_MAX_TOKENS
        .iter()
        .find(|(name, _)| *name == id)
        .map(|&(_, max)| max)
        .unwrap_or(FALLBACK_MAX_TOKENS)
}

pub fn is_chat_model(id: &str) -> bool {
    CHAT_MODELS.contains(&id)
}

pub fn is_known(id: &str) -> bool {
    MODEL_MAX_TOKENS.iter().any(|(name, _)| *name == id)
}

/// Looks up a model by id. Unknown ids get [`FALLBACK_MAX_TOKENS`].
pub fn profile(id: &str) -> ModelProfile {
    ModelProfile::new(id, max_tokens_for(id), is_chat_model(id))
}

/// All registered model ids, sorted.
pub fn known_ids() -> Vec<String> {
    let mut ids: Vec<String> = MODEL_MAX_TOKENS
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    ids.sort();
    ids
}

/// Keeps only the ids present in the registry, sorted and deduplicated.
pub fn filter_available<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut models: Vec<String> = ids
        .into_iter()
        .filter(|id| is_known(id.as_ref()))
        .map(|id| id.as_ref().to_string())
        .collect();
    models.sort();
    models.dedup();
    models
}
