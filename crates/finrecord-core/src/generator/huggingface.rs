//! Hugging Face Inference API (text2text-generation task).
//!
//! Request:  `POST <endpoint>/<model>` with `{"inputs": ..., "parameters": {"max_length": n}}`
//! Response: `[{"generated_text": "..."}]`

use std::future::Future;
use std::pin::Pin;

use super::{GenerationError, TextGenerator, error_body};

pub struct HuggingFace {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_token: Option<String>,
}

impl HuggingFace {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        model: String,
        api_token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            model,
            api_token,
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.model)
    }
}

/// Request body for one prompt.
fn request_body(prompt: &str, max_length: u32) -> serde_json::Value {
    serde_json::json!({
        "inputs": prompt,
        "parameters": { "max_length": max_length },
        "options": { "wait_for_model": true },
    })
}

/// Pull the generated strings out of an inference response.
///
/// The API returns a list of candidates; some deployments return a single
/// object instead. The first candidate must carry `generated_text`; a
/// malformed first entry is an error rather than a reason to skip ahead.
fn candidates_from_value(data: &serde_json::Value) -> Result<Vec<String>, GenerationError> {
    let items: Vec<&serde_json::Value> = match data {
        serde_json::Value::Array(arr) => arr.iter().collect(),
        serde_json::Value::Object(_) => vec![data],
        other => {
            return Err(GenerationError::Decode(format!(
                "expected list of candidates, got {}",
                other
            )));
        }
    };

    let Some(first) = items.first() else {
        return Err(GenerationError::EmptyResponse);
    };
    match first["generated_text"].as_str() {
        Some(text) => Ok(vec![text.to_string()]),
        None => match first["error"].as_str() {
            Some(err) => Err(GenerationError::Decode(err.to_string())),
            None => Err(GenerationError::Decode(format!(
                "candidate has no generated_text: {}",
                first
            ))),
        },
    }
}

impl TextGenerator for HuggingFace {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        max_length: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let mut req = self
                .client
                .post(self.url())
                .json(&request_body(prompt, max_length));
            if let Some(ref token) = self.api_token {
                req = req.bearer_auth(token);
            }

            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(GenerationError::Status {
                    status: status.as_u16(),
                    body: error_body(resp).await,
                });
            }

            let data: serde_json::Value = resp.json().await?;
            candidates_from_value(&data)
        })
    }
}
