//! Mock transport for testing
//!
//! Replays a scripted sequence of responses and records every call, so tests
//! can verify retry behavior without network access. Once the script is used
//! up the transport succeeds with a generated id, unless it was built to fail
//! permanently.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::TransportError;
use crate::transport::PublishTransport;

/// Configuration for mock transport behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Responses returned in order, one per call
    pub script: Arc<Mutex<VecDeque<Result<String, TransportError>>>>,

    /// Error returned on every call after the script is exhausted
    pub persistent_error: Option<TransportError>,

    /// Delay before answering (simulates network latency)
    pub delay: Duration,

    pub post_call_count: Arc<Mutex<usize>>,

    /// Texts received, in call order
    pub posted_content: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            persistent_error: None,
            delay: Duration::from_millis(0),
            post_call_count: Arc::new(Mutex::new(0)),
            posted_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock transport for testing
pub struct MockTransport {
    config: MockConfig,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Always succeeds with a generated id
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Replays `responses`, then succeeds
    pub fn scripted(name: &str, responses: Vec<Result<String, TransportError>>) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            script: Arc::new(Mutex::new(responses.into())),
            ..Default::default()
        })
    }

    /// Fails every call with `error`
    pub fn always_failing(name: &str, error: TransportError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            persistent_error: Some(error),
            ..Default::default()
        })
    }

    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    pub fn posted_content(&self) -> Vec<String> {
        self.config.posted_content.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishTransport for MockTransport {
    async fn post(&self, text: &str) -> Result<String, TransportError> {
        *self.config.post_call_count.lock().unwrap() += 1;
        self.config
            .posted_content
            .lock()
            .unwrap()
            .push(text.to_string());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let scripted = self.config.script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => match &self.config.persistent_error {
                Some(error) => Err(error.clone()),
                None => Ok(format!("{}-{}", self.config.name, uuid::Uuid::new_v4())),
            },
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}
