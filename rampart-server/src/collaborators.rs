//! File and command backed collaborators.
//!
//! - [`SnapshotFeatureSource`] reads a JSON feature snapshot that an upstream
//!   feature job rewrites in place.
//! - [`JsonLinesDataSource`] reads labeled samples, one JSON object per line.
//! - [`CommandTrainer`] and [`CommandValidator`] run an external program per
//!   request. The request is written to the program's stdin as JSON; the
//!   program prints its JSON result between `RESULTS_START` and
//!   `RESULTS_END` lines. Anything else it prints is ignored.
//!
//! Files are re-read on every call so the envelope always sees the latest
//! data without a restart.

use async_trait::async_trait;
use rampart_core::types::{ModelRef, Symbol, Timestamp, ValidationReport};
use rampart_drift::FeatureMap;
use rampart_trainer::{
    CollaboratorError, Collaborators, FeatureSource, LabeledSample, ModelTrainer, ModelValidator,
    TrainingDataSource, TrainingParams,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{CollaboratorConfig, CommandConfig};

/// Line that opens a command's result block.
pub const RESULTS_START: &str = "RESULTS_START";
/// Line that closes a command's result block.
pub const RESULTS_END: &str = "RESULTS_END";

/// Builds the collaborator set described by `config`.
#[must_use]
pub fn from_config(config: &CollaboratorConfig) -> Collaborators {
    Collaborators {
        features: Arc::new(SnapshotFeatureSource::new(&config.feature_snapshot)),
        data: Arc::new(JsonLinesDataSource::new(&config.samples)),
        trainer: Arc::new(CommandTrainer::new(config.trainer.clone())),
        validator: Arc::new(CommandValidator::new(config.validator.clone())),
    }
}

#[derive(Debug, Deserialize)]
struct SymbolSnapshot {
    features: FeatureMap,
    performance: f64,
}

/// Feature source backed by a JSON snapshot file.
///
/// ```json
/// {"BTC-USDT": {"features": {"volatility": 0.021}, "performance": 1.3}}
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotFeatureSource {
    path: PathBuf,
}

impl SnapshotFeatureSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn lookup(
        &self,
        operation: &str,
        symbol: &Symbol,
    ) -> Result<SymbolSnapshot, CollaboratorError> {
        let content = read_file(operation, &self.path).await?;
        let mut snapshot: HashMap<String, SymbolSnapshot> = serde_json::from_str(&content)
            .map_err(|e| CollaboratorError::invalid_response(operation, e.to_string()))?;
        snapshot.remove(symbol.as_str()).ok_or_else(|| {
            CollaboratorError::failed(
                operation,
                format!("{symbol} missing from {}", self.path.display()),
            )
        })
    }
}

#[async_trait]
impl FeatureSource for SnapshotFeatureSource {
    async fn features(&self, symbol: &Symbol) -> Result<FeatureMap, CollaboratorError> {
        Ok(self.lookup("features", symbol).await?.features)
    }

    async fn performance(&self, symbol: &Symbol) -> Result<f64, CollaboratorError> {
        Ok(self.lookup("performance", symbol).await?.performance)
    }
}

/// Training data source backed by a JSON-lines file of [`LabeledSample`]s.
#[derive(Debug, Clone)]
pub struct JsonLinesDataSource {
    path: PathBuf,
}

impl JsonLinesDataSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrainingDataSource for JsonLinesDataSource {
    async fn collect_recent(
        &self,
        symbols: &[Symbol],
        since: Timestamp,
    ) -> Result<Vec<LabeledSample>, CollaboratorError> {
        let content = read_file("collect_recent", &self.path).await?;
        let mut samples = parse_samples(&content)?;
        samples.retain(|s| s.timestamp >= since && symbols.contains(&s.symbol));
        samples.sort_by_key(|s| s.timestamp);
        debug!(
            path = %self.path.display(),
            samples = samples.len(),
            %since,
            "Collected samples"
        );
        Ok(samples)
    }
}

fn parse_samples(content: &str) -> Result<Vec<LabeledSample>, CollaboratorError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                CollaboratorError::invalid_response("collect_recent", format!("line {}: {e}", i + 1))
            })
        })
        .collect()
}

async fn read_file(operation: &str, path: &Path) -> Result<String, CollaboratorError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CollaboratorError::failed(operation, format!("{}: {e}", path.display())))
}

#[derive(Serialize)]
struct TrainRequest<'a> {
    run_id: String,
    generation: u64,
    base_model: Option<&'a ModelRef>,
    samples: &'a [LabeledSample],
}

#[derive(Deserialize)]
struct TrainResponse {
    model: ModelRef,
}

/// Trains candidates by running an external program.
///
/// The program receives `{"run_id", "generation", "base_model", "samples"}`
/// and must answer `{"model": "<reference>"}`.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    command: CommandConfig,
}

impl CommandTrainer {
    /// Creates a trainer running `command`.
    #[must_use]
    pub fn new(command: CommandConfig) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ModelTrainer for CommandTrainer {
    async fn train(
        &self,
        samples: &[LabeledSample],
        params: &TrainingParams,
    ) -> Result<ModelRef, CollaboratorError> {
        let request = TrainRequest {
            run_id: params.run_id.to_string(),
            generation: params.generation,
            base_model: params.base_model.as_ref(),
            samples,
        };
        let response: TrainResponse = run_command("train", &self.command, &request).await?;
        Ok(response.model)
    }
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    candidate: &'a ModelRef,
}

/// Validates candidates by running an external program.
///
/// The program receives `{"candidate": "<reference>"}` and must answer
/// `{"approved", "confidence", "performance_estimate"}`.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    command: CommandConfig,
}

impl CommandValidator {
    /// Creates a validator running `command`.
    #[must_use]
    pub fn new(command: CommandConfig) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ModelValidator for CommandValidator {
    async fn validate(&self, candidate: &ModelRef) -> Result<ValidationReport, CollaboratorError> {
        run_command("validate", &self.command, &ValidateRequest { candidate }).await
    }
}

/// Runs `command`, feeds it `request` and parses the marked result block.
///
/// The child is killed if the returned future is dropped, so the trainer's
/// timeouts also stop the process.
async fn run_command<Req, Resp>(
    operation: &str,
    command: &CommandConfig,
    request: &Req,
) -> Result<Resp, CollaboratorError>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_vec(request)
        .map_err(|e| CollaboratorError::failed(operation, format!("encode request: {e}")))?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        CollaboratorError::failed(operation, format!("spawn {}: {e}", command.program))
    })?;

    // stdin is fed while stdout and stderr drain; a child that logs before
    // reading its whole request would otherwise block on a full pipe.
    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin
            && let Err(e) = stdin.write_all(&payload).await
        {
            warn!(operation, error = %e, "Command closed stdin before reading the request");
        }
    };
    let ((), output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(|e| CollaboratorError::failed(operation, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CollaboratorError::failed(
            operation,
            format!("{} exited with {}: {}", command.program, output.status, stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let block = extract_results(&stdout).ok_or_else(|| {
        CollaboratorError::invalid_response(
            operation,
            format!("no {RESULTS_START}/{RESULTS_END} block in output"),
        )
    })?;
    serde_json::from_str(&block)
        .map_err(|e| CollaboratorError::invalid_response(operation, e.to_string()))
}

/// Returns the text between the last complete pair of marker lines.
fn extract_results(output: &str) -> Option<String> {
    let mut block: Option<Vec<&str>> = None;
    let mut result = None;
    for line in output.lines() {
        match line.trim() {
            RESULTS_START => block = Some(Vec::new()),
            RESULTS_END => {
                if let Some(lines) = block.take() {
                    result = Some(lines.join("\n"));
                }
            }
            _ => {
                if let Some(lines) = block.as_mut() {
                    lines.push(line);
                }
            }
        }
    }
    result
}
