//! Experiment dispatch: hand a parameter vector to the control system.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bec_types::{ParameterVector, TrialError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// The command sent for one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub run_id: Uuid,
    pub trial: usize,
    /// Parameter name -> value.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub sent_at: DateTime<Utc>,
}

impl DispatchRequest {
    pub fn new(run_id: Uuid, trial: usize, params: &ParameterVector) -> Self {
        Self {
            run_id,
            trial,
            parameters: params.to_record(),
            sent_at: Utc::now(),
        }
    }

    fn to_json(&self) -> Result<Vec<u8>, TrialError> {
        serde_json::to_vec_pretty(self).map_err(|e| TrialError::DispatchFailed {
            message: format!("could not serialize request: {e}"),
        })
    }
}

/// Fire-and-forget transmission to the external sequencer.
///
/// `Ok` only means the command was handed over; whether it produced a usable
/// measurement is decided downstream.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), TrialError>;

    fn name(&self) -> &str;
}

/// Logs the parameter mapping and nothing else.
#[derive(Debug, Clone, Default)]
pub struct TraceDispatcher;

#[async_trait]
impl Dispatcher for TraceDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), TrialError> {
        info!(
            trial = request.trial,
            parameters = %serde_json::Value::Object(request.parameters.clone()),
            "sending parameters to sequencer"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "trace"
    }
}

/// Writes each request as JSON to a file watched by the sequencer.
///
/// The file is written next to its destination and renamed into place, so a
/// watcher never reads a partial request.
#[derive(Debug, Clone)]
pub struct JsonFileDispatcher {
    path: PathBuf,
}

impl JsonFileDispatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Dispatcher for JsonFileDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), TrialError> {
        let body = request.to_json()?;
        let staging = self.staging_path();
        let fail = |stage: &str, e: std::io::Error| TrialError::DispatchFailed {
            message: format!("{stage} {}: {e}", self.path.display()),
        };

        tokio::fs::write(&staging, &body)
            .await
            .map_err(|e| fail("could not write", e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| fail("could not publish", e))?;

        debug!(trial = request.trial, path = %self.path.display(), "request written");
        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// Runs an external program per trial with the JSON request on stdin.
/// The program is killed if the dispatch is dropped before it exits.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    program: String,
    args: Vec<String>,
}

impl CommandDispatcher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Dispatcher for CommandDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), TrialError> {
        let body = request.to_json()?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrialError::DispatchFailed {
                message: format!("failed to spawn {}: {e}", self.program),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&body)
                .await
                .map_err(|e| TrialError::DispatchFailed {
                    message: format!("failed to write to {} stdin: {e}", self.program),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TrialError::DispatchFailed {
                message: format!("failed to wait for {}: {e}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrialError::DispatchFailed {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        debug!(trial = request.trial, program = %self.program, "request delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "command"
    }
}
