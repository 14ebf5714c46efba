//! Agent subprocess plumbing shared by the command-backed ports.
//!
//! A request is one JSON document written to the agent's stdin:
//!
//! ```json
//! {"operation": "propose_plan", "instructions": "...", "payload": {...}}
//! ```
//!
//! The agent answers with a JSON object on stdout, either bare or wrapped in
//! the `{"type": "result", "result": "..."}` envelope that
//! `claude --output-format json` prints.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::FoundryConfig;
use crate::errors::CollaboratorError;

/// A parsed agent reply plus the tokens the agent reported for it.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub body: Value,
    pub tokens: u64,
}

impl AgentReply {
    pub fn parse<T: DeserializeOwned>(self, operation: &str) -> Result<(T, u64), CollaboratorError> {
        let value = serde_json::from_value(self.body)
            .map_err(|e| CollaboratorError::malformed(operation, e.to_string()))?;
        Ok((value, self.tokens))
    }
}

/// How to launch the agent.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl AgentCommand {
    pub fn from_config(config: &FoundryConfig) -> Self {
        Self {
            program: config.agent_command(),
            args: config.toml.agent.args.clone(),
            working_dir: config.project_dir.clone(),
            timeout: Duration::from_secs(config.toml.agent.timeout_secs),
        }
    }

    /// Send one request and parse the reply.
    pub async fn invoke(
        &self,
        operation: &str,
        payload: Value,
    ) -> Result<AgentReply, CollaboratorError> {
        let request = json!({
            "operation": operation,
            "instructions": instructions_for(operation),
            "payload": payload,
        });
        let input = serde_json::to_string(&request)
            .map_err(|e| CollaboratorError::malformed(operation, e.to_string()))?;

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&self.working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CollaboratorError::unavailable(
                    operation,
                    format!("failed to spawn '{}': {e}", self.program),
                )
            })?;

        debug!(
            operation,
            pid = child.id().unwrap_or(0),
            bytes = input.len(),
            "Agent process spawned"
        );

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| CollaboratorError::unavailable(operation, e.to_string()))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| CollaboratorError::unavailable(operation, e.to_string()))?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CollaboratorError::unavailable(operation, e.to_string())),
            Err(_) => {
                return Err(CollaboratorError::unavailable(
                    operation,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        debug!(
            operation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            exit = output.status.code().unwrap_or(-1),
            "Agent process finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::unavailable(
                operation,
                format!(
                    "agent exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail(&stderr, 400)
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_reply(operation, &stdout)
    }
}

/// Parse agent stdout into a reply.
pub fn parse_reply(operation: &str, stdout: &str) -> Result<AgentReply, CollaboratorError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(CollaboratorError::malformed(operation, "empty response"));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && let Some(envelope) = value.as_object()
        && envelope.get("type").and_then(Value::as_str) == Some("result")
    {
        if envelope.get("is_error").and_then(Value::as_bool) == Some(true) {
            let message = envelope
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or("agent reported an error");
            return Err(CollaboratorError::unavailable(operation, message));
        }
        let inner = envelope
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| CollaboratorError::malformed(operation, "result envelope has no text"))?;
        let body = extract_json(inner)
            .ok_or_else(|| CollaboratorError::malformed(operation, "no JSON in result text"))?;
        return Ok(AgentReply {
            body,
            tokens: envelope_tokens(envelope.get("usage")),
        });
    }

    let body = extract_json(trimmed)
        .ok_or_else(|| CollaboratorError::malformed(operation, "no JSON object in output"))?;
    Ok(AgentReply { body, tokens: 0 })
}

/// Find a JSON value in free text: the whole text, a fenced block, or the
/// outermost `{...}` span.
fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after[body_start..].find("```")
            && let Ok(value) = serde_json::from_str(after[body_start..body_start + end].trim())
        {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn envelope_tokens(usage: Option<&Value>) -> u64 {
    let Some(usage) = usage else { return 0 };
    ["input_tokens", "output_tokens"]
        .iter()
        .filter_map(|k| usage.get(k).and_then(Value::as_u64))
        .sum()
}

fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("...{skipped}")
}

fn instructions_for(operation: &str) -> &'static str {
    match operation {
        "draft_spec" => {
            "Read payload.problem. Reply with only a JSON object: {\"title\", \"understanding\", \
             \"questions\": [{\"id\", \"question\", \"why\", \"options\"}], \
             \"decisions\": [{\"topic\", \"decision\"}]}."
        }
        "finalize_spec" => {
            "Combine payload.draft with payload.answers (keyed by question id). Reply with only \
             a JSON object: {\"title\", \"summary\", \"details\"}."
        }
        "decompose" => {
            "Split payload.spec into tasks. Reply with only a JSON object: {\"tasks\": [{\"id\", \
             \"title\", \"description\", \"dependencies\": [task ids], \"effort_estimate\", \
             \"tags\"}]}. Dependencies must reference ids in the same list."
        }
        "propose_plan" => {
            "Plan payload.task within payload.context. Reply with only a JSON object: \
             {\"steps\": [{\"id\", \"action\", \"description\"}], \"confidence\": 0..1, \
             \"entropy\": 0..1, \"estimated_cost\": tokens, \"assumptions\"}."
        }
        "critique" => {
            "Review payload.plan. Reply with only a JSON object: {\"perspective\", \"issues\", \
             \"suggestions\"}."
        }
        "synthesize" => {
            "Revise payload.plan using payload.critiques. Reply with only a JSON plan object \
             in the same shape, with updated confidence and entropy."
        }
        "diagnose" => {
            "Explain why payload.execution failed for payload.plan. Reply with only a JSON \
             object: {\"summary\", \"category\", \"needs_human\": bool, \"modified_plan\"}."
        }
        "extract_skill" => {
            "Generalize payload.solution for payload.task into a reusable skill. Reply with \
             only a JSON object: {\"id\", \"name\", \"description\", \"tags\", \"pattern\", \
             \"example\"}."
        }
        "execute" => {
            "Carry out payload.plan in the working directory. Reply with only a JSON object: \
             {\"success\": bool, \"logs\", \"error_pattern_matches\"}."
        }
        _ => "Reply with only a JSON object.",
    }
}
