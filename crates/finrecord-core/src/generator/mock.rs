//! Mock text generator for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{GenerationError, TextGenerator};

/// A configurable mock response for [`MockGenerator`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this text as the only candidate.
    Text(String),
    /// Return an empty candidate list.
    Empty,
    /// Simulate a 503 from the inference service (retryable).
    Unavailable,
    /// Simulate a non-retryable failure.
    Error(String),
}

impl MockResponse {
    pub fn text(s: impl Into<String>) -> Self {
        MockResponse::Text(s.into())
    }
}

/// A hand-rolled mock implementing [`TextGenerator`] for tests.
///
/// Supports:
/// - A fixed response (used for every call), **or**
/// - A sequence of responses (one per call, repeating the last if exhausted).
/// - Optional per-call latency.
/// - Call counting, plus capture of each prompt and `max_length`.
pub struct MockGenerator {
    /// Pending responses, stored reversed so `pop()` yields the next one.
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    max_lengths: Mutex<Vec<u32>>,
}

impl MockGenerator {
    /// Create a mock that always returns `response`.
    pub fn new(response: MockResponse) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            max_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<MockResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        let fallback = responses[responses.len() - 1].clone();
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            fallback,
            delay: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            max_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Set simulated inference latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `generate()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// The `max_length` passed to every call, in call order.
    pub fn max_lengths(&self) -> Vec<u32> {
        self.max_lengths.lock().unwrap().clone()
    }

    fn next_response(&self) -> MockResponse {
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        max_length: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, GenerationError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.max_lengths.lock().unwrap().push(max_length);
        let response = self.next_response();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }

            match response {
                MockResponse::Text(text) => Ok(vec![text]),
                MockResponse::Empty => Ok(vec![]),
                MockResponse::Unavailable => Err(GenerationError::Status {
                    status: 503,
                    body: "Service Unavailable".into(),
                }),
                MockResponse::Error(msg) => Err(GenerationError::Other(msg)),
            }
        })
    }
}
