//! Text generation backends: the model that turns a prompt into output text.

pub mod huggingface;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod ollama;

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use huggingface::HuggingFace;
pub use ollama::Ollama;

pub const DEFAULT_MODEL: &str = "google/flan-t5-base";
pub const DEFAULT_HF_ENDPOINT: &str = "https://router.huggingface.co/hf-inference/models";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("model returned no candidates")]
    EmptyResponse,
    #[error("unexpected response format: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    /// Whether a second attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Timeout(_) => true,
            GenerationError::EmptyResponse
            | GenerationError::Decode(_)
            | GenerationError::Other(_) => false,
        }
    }
}

/// A text-to-text model invoked once per document.
pub trait TextGenerator: Send + Sync {
    /// The model or service name used in logs.
    fn name(&self) -> &str;

    /// Generate candidates for `prompt`, producing at most `max_length` tokens.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        max_length: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, GenerationError>> + Send + 'a>>;
}

/// Which inference service to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    #[default]
    HuggingFace,
    Ollama,
}

impl GeneratorKind {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            GeneratorKind::HuggingFace => DEFAULT_HF_ENDPOINT,
            GeneratorKind::Ollama => DEFAULT_OLLAMA_ENDPOINT,
        }
    }
}

impl FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(GeneratorKind::HuggingFace),
            "ollama" => Ok(GeneratorKind::Ollama),
            other => Err(format!(
                "unknown backend {:?} (expected huggingface or ollama)",
                other
            )),
        }
    }
}

/// Settings needed to construct a [`TextGenerator`].
#[derive(Clone, Default)]
pub struct GeneratorConfig {
    pub kind: GeneratorKind,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Build the generator once; it is shared read-only by every document.
pub fn build_generator(config: &GeneratorConfig) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let endpoint = config
        .endpoint
        .clone()
        .unwrap_or_else(|| config.kind.default_endpoint().to_string());
    let client = reqwest::Client::builder()
        .user_agent(concat!("finrecord/", env!("CARGO_PKG_VERSION")))
        .build()?;

    tracing::info!(backend = ?config.kind, %model, %endpoint, "using text generator");

    Ok(match config.kind {
        GeneratorKind::HuggingFace => Arc::new(HuggingFace::new(
            client,
            endpoint,
            model,
            config.api_token.clone(),
        )),
        GeneratorKind::Ollama => Arc::new(Ollama::new(client, endpoint, model)),
    })
}

/// Read an error body for diagnostics, capped so a large HTML page does not
/// flood the logs.
pub(crate) async fn error_body(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    let text = text.trim();
    match text.char_indices().nth(300) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
