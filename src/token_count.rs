// src/token_count.rs

use crate::models::ModelProfile;
use once_cell::sync::Lazy;
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;

/// Overhead charged for every message record.
const TOKENS_PER_MESSAGE: usize = 4;
/// Overhead charged once per request for the reply primer.
const TOKENS_PER_REPLY: usize = 2;

/// BPE schemes the counter knows how to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    O200kBase,
    Cl100kBase,
    P50kBase,
    P50kEdit,
    R50kBase,
}

impl Encoding {
    /// Generic GPT-family encoding used when a model is not recognized.
    pub const FALLBACK: Encoding = Encoding::Cl100kBase;

    pub fn name(self) -> &'static str {
        match self {
            Encoding::O200kBase => "o200k_base",
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::P50kBase => "p50k_base",
            Encoding::P50kEdit => "p50k_edit",
            Encoding::R50kBase => "r50k_base",
        }
    }

    fn bpe(self) -> Option<&'static CoreBPE> {
        match self {
            Encoding::O200kBase => O200K.as_ref(),
            Encoding::Cl100kBase => CL100K.as_ref(),
            Encoding::P50kBase => P50K.as_ref(),
            Encoding::P50kEdit => P50K_EDIT.as_ref(),
            Encoding::R50kBase => R50K.as_ref(),
        }
    }

    /// Number of tokens `text` encodes to, without special-token handling.
    pub fn encoded_len(self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.bpe() {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            // ~4 chars per token when the table could not be built
            None => text.chars().count().div_ceil(4),
        }
    }
}

fn load<E: std::fmt::Display>(encoding: Encoding, built: Result<CoreBPE, E>) -> Option<CoreBPE> {
    match built {
        Ok(bpe) => Some(bpe),
        Err(err) => {
            tracing::warn!(
                encoding = encoding.name(),
                "failed to build tokenizer, using length estimate: {err}"
            );
            None
        }
    }
}

static O200K: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load(Encoding::O200kBase, tiktoken_rs::o200k_base()));
static CL100K: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load(Encoding::Cl100kBase, tiktoken_rs::cl100k_base()));
static P50K: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load(Encoding::P50kBase, tiktoken_rs::p50k_base()));
static P50K_EDIT: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load(Encoding::P50kEdit, tiktoken_rs::p50k_edit()));
static R50K: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load(Encoding::R50kBase, tiktoken_rs::r50k_base()));

/// Picks the encoding for a model id, falling back to [`Encoding::FALLBACK`].
pub fn resolve_encoding(model_id: &str) -> Encoding {
    match get_tokenizer(model_id) {
        Some(Tokenizer::O200kBase) => Encoding::O200kBase,
        Some(Tokenizer::Cl100kBase) => Encoding::Cl100kBase,
        Some(Tokenizer::P50kBase) => Encoding::P50kBase,
        Some(Tokenizer::P50kEdit) => Encoding::P50kEdit,
        Some(Tokenizer::R50kBase) | Some(Tokenizer::Gpt2) => Encoding::R50kBase,
        _ => Encoding::FALLBACK,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat message as seen by the counter. Absent fields cost nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Option<Role>,
    pub content: String,
    pub name: Option<String>,
}

impl ChatMessage {
    /// A record carrying only content, used to count bare text.
    pub fn content_only(content: impl Into<String>) -> Self {
        Self {
            role: None,
            content: content.into(),
            name: None,
        }
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: content.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Token count of a message list in the chat-completions framing.
pub fn count_message_tokens(messages: &[ChatMessage], model: &ModelProfile) -> usize {
    let encoding = resolve_encoding(&model.id);
    let mut num_tokens = 0;
    for message in messages {
        num_tokens += TOKENS_PER_MESSAGE;
        if let Some(role) = message.role {
            num_tokens += encoding.encoded_len(role.as_str());
        }
        num_tokens += encoding.encoded_len(&message.content);
        if let Some(name) = &message.name {
            // a named participant replaces the role token
            num_tokens += encoding.encoded_len(name);
            num_tokens = num_tokens.saturating_sub(1);
        }
    }
    num_tokens + TOKENS_PER_REPLY
}

/// Token count of `text` sent as a single content-only message.
pub fn count_tokens(text: &str, model: &ModelProfile) -> usize {
    count_message_tokens(&[ChatMessage::content_only(text)], model)
}
