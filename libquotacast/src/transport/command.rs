//! Transport that delegates to an external command
//!
//! The final text is written to the command's stdin. On success the command
//! prints the external post id on stdout. Failures are classified as:
//!
//! - exit code 2: `Forbidden` (authentication / permission problem)
//! - stderr mentioning "rate limit" or "too many requests": `RateLimited`
//! - any other non-zero exit: `Posting`
//! - the command could not be spawned: `Network`

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::PublishTransport;

pub const FORBIDDEN_EXIT_CODE: i32 = 2;

pub struct CommandTransport {
    command: String,
}

impl CommandTransport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Map a finished command to a transport result
fn classify(code: Option<i32>, stdout: &str, stderr: &str) -> Result<String, TransportError> {
    let stderr = stderr.trim();

    if code == Some(0) {
        let id = stdout.trim();
        return if id.is_empty() {
            Err(TransportError::Posting(
                "command succeeded but printed no post id".to_string(),
            ))
        } else {
            Ok(id.to_string())
        };
    }

    if code == Some(FORBIDDEN_EXIT_CODE) {
        return Err(TransportError::Forbidden(stderr.to_string()));
    }

    let lowered = stderr.to_lowercase();
    if lowered.contains("rate limit") || lowered.contains("too many requests") {
        return Err(TransportError::RateLimited(stderr.to_string()));
    }

    Err(TransportError::Posting(match code {
        Some(code) => format!("command exited with status {}: {}", code, stderr),
        None => format!("command terminated by signal: {}", stderr),
    }))
}

#[async_trait]
impl PublishTransport for CommandTransport {
    async fn post(&self, text: &str) -> Result<String, TransportError> {
        debug!(command = %self.command, "Running transport command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Network(format!("failed to spawn transport: {}", e)))?;

        // A command that exits without reading stdin closes the pipe early
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(TransportError::Network(format!(
                        "failed to write content: {}",
                        e
                    )));
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TransportError::Network(format!("transport did not finish: {}", e)))?;

        classify(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    fn name(&self) -> &str {
        "command"
    }
}
