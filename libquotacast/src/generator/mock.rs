//! Mock generator for testing

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{QuotacastError, Result};
use crate::generator::ContentGenerator;
use crate::types::ContentCandidate;

/// Returns a fixed candidate, or fails, and counts calls
#[derive(Clone)]
pub struct MockGenerator {
    response: std::result::Result<ContentCandidate, String>,
    call_count: Arc<Mutex<usize>>,
}

impl MockGenerator {
    pub fn returning(candidate: ContentCandidate) -> Self {
        Self {
            response: Ok(candidate),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self) -> Result<ContentCandidate> {
        *self.call_count.lock().unwrap() += 1;
        self.response
            .clone()
            .map_err(QuotacastError::Generator)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
