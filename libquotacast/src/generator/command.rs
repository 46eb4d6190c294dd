//! Generator that delegates text writing to an external command
//!
//! The command runs through `sh -c` with `QUOTACAST_TOPIC` and
//! `QUOTACAST_PROMPT` set; its trimmed stdout becomes the base text.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{QuotacastError, Result};
use crate::generator::{compose, pick_hashtags, ContentGenerator, TopicCatalog};
use crate::types::ContentCandidate;

pub struct CommandGenerator {
    command: String,
    catalog: TopicCatalog,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>, catalog: TopicCatalog) -> Self {
        Self {
            command: command.into(),
            catalog,
        }
    }
}

#[async_trait]
impl ContentGenerator for CommandGenerator {
    async fn generate(&self) -> Result<ContentCandidate> {
        let (topic, hashtags) = {
            let mut rng = rand::thread_rng();
            let topic = self
                .catalog
                .choose(&mut rng)
                .cloned()
                .ok_or_else(|| QuotacastError::Generator("topic catalog is empty".to_string()))?;
            let hashtags = pick_hashtags(&topic, &mut rng);
            (topic, hashtags)
        };
        info!(topic = %topic.name, "Selected topic");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("QUOTACAST_TOPIC", &topic.name)
            .env("QUOTACAST_PROMPT", &topic.prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| QuotacastError::Generator(format!("failed to spawn generator: {}", e)))?;

        if !output.status.success() {
            return Err(QuotacastError::Generator(format!(
                "generator exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let text = text.trim();
        if text.is_empty() {
            return Err(QuotacastError::Generator(
                "generator produced no text".to_string(),
            ));
        }

        let candidate = compose(text, &topic, hashtags);
        debug!(score = candidate.score, length = candidate.length, "Composed candidate");
        Ok(candidate)
    }

    fn name(&self) -> &str {
        "command"
    }
}
