//! Local Ollama server (`/api/generate`, non-streaming).

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::{GenerationError, TextGenerator, error_body};

pub struct Ollama {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl Ollama {
    pub fn new(client: reqwest::Client, base_url: String, model: String) -> Self {
        Self {
            client,
            base_url,
            model,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl TextGenerator for Ollama {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        max_length: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
            let body = GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict: max_length,
                },
            };

            let resp = self.client.post(&url).json(&body).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(GenerationError::Status {
                    status: status.as_u16(),
                    body: error_body(resp).await,
                });
            }

            let data: GenerateResponse = resp
                .json()
                .await
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
            Ok(vec![data.response])
        })
    }
}
