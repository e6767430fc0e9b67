//! Model download through the Hugging Face CLI
//!
//! The hub CLI does the transfer and resume handling. This module builds its
//! command line, runs it as a single background child with output sent to a
//! log file, and supervises it until it exits, times out, or is cancelled.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{DownloadConfig, HelperConfig};
use crate::error::{Error, Result};
use crate::model::info::ModelVariant;
use crate::token::HfToken;

const LOG_FILE_NAME: &str = "model_download.log";

/// A fully resolved hub CLI invocation
#[derive(Clone)]
pub struct DownloadPlan {
    pub variant: ModelVariant,
    pub program: String,
    pub args: Vec<String>,
    pub local_dir: PathBuf,
    pub log_file: PathBuf,
}

impl DownloadPlan {
    /// Command line with any token value masked
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push("***".to_string());
                mask_next = false;
            } else {
                mask_next = arg == "--token";
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

impl fmt::Debug for DownloadPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadPlan")
            .field("variant", &self.variant)
            .field("command", &self.display_command())
            .field("local_dir", &self.local_dir)
            .field("log_file", &self.log_file)
            .finish()
    }
}

/// How a supervised download ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { elapsed: Duration },
    /// Non-zero exit; `code` is `None` when the CLI died from a signal
    Failed { code: Option<i32>, log_file: PathBuf },
    TimedOut { elapsed: Duration },
    Cancelled,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Completed { .. })
    }
}

/// Receives progress from the supervision loop
pub trait DownloadObserver {
    fn started(&mut self, _plan: &DownloadPlan) {}
    fn tick(&mut self, _elapsed: Duration) {}
    fn finished(&mut self, _outcome: &DownloadOutcome) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl DownloadObserver for NoopObserver {}

/// Builds and runs hub CLI downloads for catalog models
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    models_dir: PathBuf,
    logs_dir: PathBuf,
    settings: DownloadConfig,
}

impl ModelDownloader {
    pub fn new(config: &HelperConfig) -> Self {
        Self {
            models_dir: config.models_dir(),
            logs_dir: config.logs_dir(),
            settings: config.download.clone(),
        }
    }

    pub fn settings(&self) -> &DownloadConfig {
        &self.settings
    }

    /// Get the local directory a model downloads into
    pub fn model_path(&self, variant: ModelVariant) -> PathBuf {
        variant.local_dir(&self.models_dir)
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir.join(LOG_FILE_NAME)
    }

    /// Weight files already on disk, if every expected file is present
    pub fn existing_weights(&self, variant: ModelVariant) -> Option<Vec<PathBuf>> {
        let files = variant.expected_files(&self.models_dir);
        if !files.is_empty() && files.iter().all(|f| f.is_file()) {
            Some(files)
        } else {
            None
        }
    }

    pub fn is_downloaded(&self, variant: ModelVariant) -> bool {
        self.existing_weights(variant).is_some()
    }

    /// Build the hub CLI command for `variant`
    pub fn plan(&self, variant: ModelVariant, token: Option<&HfToken>) -> DownloadPlan {
        let local_dir = self.model_path(variant);
        let mut args = vec![
            "download".to_string(),
            variant.repo_id().to_string(),
            "--local-dir".to_string(),
            local_dir.to_string_lossy().to_string(),
        ];
        args.extend(variant.hub_files().iter().map(|f| f.to_string()));
        if let Some(token) = token {
            args.push("--token".to_string());
            args.push(token.secret().to_string());
        }

        DownloadPlan {
            variant,
            program: self.settings.hub_cli.clone(),
            args,
            local_dir,
            log_file: self.log_file(),
        }
    }

    /// Run `plan` with the configured timeout and poll interval
    pub async fn download<F>(
        &self,
        plan: &DownloadPlan,
        observer: &mut dyn DownloadObserver,
        cancel: F,
    ) -> Result<DownloadOutcome>
    where
        F: Future<Output = ()>,
    {
        supervise(
            plan,
            self.settings.timeout(),
            self.settings.poll_interval(),
            observer,
            cancel,
        )
        .await
    }
}

/// Spawn the download and wait for it to exit, hit `timeout`, or be cancelled.
/// The child is killed and reaped on timeout and cancel.
pub async fn supervise<F>(
    plan: &DownloadPlan,
    timeout: Duration,
    poll_interval: Duration,
    observer: &mut dyn DownloadObserver,
    cancel: F,
) -> Result<DownloadOutcome>
where
    F: Future<Output = ()>,
{
    std::fs::create_dir_all(&plan.local_dir)?;
    if let Some(parent) = plan.log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log = std::fs::File::create(&plan.log_file)?;
    let log_err = log.try_clone()?;

    info!("Starting download: {}", plan.display_command());
    debug!("Download log: {:?}", plan.log_file);

    let mut child = Command::new(&plan.program)
        .args(&plan.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::DownloadError(format!("Failed to start {}: {}", plan.program, e)))?;

    observer.started(plan);

    let started = Instant::now();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    tokio::pin!(cancel);

    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + poll_interval,
        poll_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        // Cancel wins when Ctrl-C also made the hub CLI exit.
        tokio::select! {
            biased;
            _ = &mut cancel => {
                info!("Download cancelled");
                terminate(&mut child).await;
                break DownloadOutcome::Cancelled;
            }
            status = child.wait() => {
                let status = status?;
                let elapsed = started.elapsed();
                if status.success() {
                    info!("Download finished in {:?}", elapsed);
                    break DownloadOutcome::Completed { elapsed };
                }
                warn!("Download exited with {}", status);
                break DownloadOutcome::Failed {
                    code: status.code(),
                    log_file: plan.log_file.clone(),
                };
            }
            _ = &mut deadline => {
                let elapsed = started.elapsed();
                warn!("Download timed out after {:?}, killing", elapsed);
                terminate(&mut child).await;
                break DownloadOutcome::TimedOut { elapsed };
            }
            _ = ticker.tick() => {
                observer.tick(started.elapsed());
            }
        }
    };

    observer.finished(&outcome);
    Ok(outcome)
}

async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill download process: {}", e);
    }
}
