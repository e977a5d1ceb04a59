use crate::config::Timeouts;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{ChatCompletionRequestSystemMessageArgs, CreateChatCompletionRequestArgs};
use async_openai::Client;
use std::io;
use std::sync::mpsc;
use thiserror::Error;
use tokio::runtime::Runtime;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key set")]
    MissingApiKey,

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(#[from] OpenAIError),

    #[error("response contained no message")]
    EmptyResponse,
}

/// An approved prompt ready to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: usize,
}

pub enum RemoteUpdate {
    Completed {
        model: String,
        result: Result<String, CompletionError>,
    },
    Models(Result<Vec<String>, CompletionError>),
}

/// Blocking wrapper around the OpenAI client. Build it on a worker thread.
pub struct CompletionClient {
    client: Client<OpenAIConfig>,
    runtime: Runtime,
}

impl CompletionClient {
    pub fn new(api_key: &str, timeouts: Timeouts) -> Result<Self, CompletionError> {
        if api_key.trim().is_empty() {
            return Err(CompletionError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.read)
            .build()?;
        let config = OpenAIConfig::new().with_api_key(api_key.trim());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            runtime,
        })
    }

    /// Ids of every model the account can use.
    pub fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let response = self.runtime.block_on(self.client.models().list())?;
        Ok(response.data.into_iter().map(|model| model.id).collect())
    }

    /// Sends the prompt as a single system message and returns the reply text.
    #[allow(deprecated)]
    pub fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let max_tokens = u32::try_from(request.max_tokens).unwrap_or(u32::MAX);
        let body = CreateChatCompletionRequestArgs::default()
            .model(request.model.as_str())
            .messages([ChatCompletionRequestSystemMessageArgs::default()
                .content(request.prompt.as_str())
                .build()?
                .into()])
            .max_tokens(max_tokens)
            .build()?;
        let response = self.runtime.block_on(self.client.chat().create(body))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}

/// Runs remote calls off the UI thread and hands results back over a channel.
pub struct Remote {
    pub remote_update_rx: mpsc::Receiver<RemoteUpdate>,
    pub remote_update_tx: mpsc::Sender<RemoteUpdate>,
}

impl Default for Remote {
    fn default() -> Self {
        let (remote_tx, remote_rx) = mpsc::channel();
        Self {
            remote_update_rx: remote_rx,
            remote_update_tx: remote_tx,
        }
    }
}

impl Remote {
    pub fn spawn_completion(&self, api_key: String, timeouts: Timeouts, request: CompletionRequest) {
        let tx = self.remote_update_tx.clone();
        std::thread::spawn(move || {
            tracing::info!(model = %request.model, max_tokens = request.max_tokens, "sending prompt");
            let result = CompletionClient::new(&api_key, timeouts)
                .and_then(|client| client.complete(&request));
            let _ = tx.send(RemoteUpdate::Completed {
                model: request.model,
                result,
            });
        });
    }

    pub fn spawn_model_refresh(&self, api_key: String, timeouts: Timeouts) {
        let tx = self.remote_update_tx.clone();
        std::thread::spawn(move || {
            let result =
                CompletionClient::new(&api_key, timeouts).and_then(|client| client.list_models());
            let _ = tx.send(RemoteUpdate::Models(result));
        });
    }
}
