//! Training launch: dependency upgrades, then the engine or a bundled script

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::HelperConfig;
use crate::error::{Error, Result};
use crate::model::ModelVariant;
use crate::token::{HfToken, TOKEN_ENV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Best-effort package upgrade; failure is only logged
    Upgrade,
    Train,
}

/// One process the launcher runs, in the engine checkout
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchStep {
    pub kind: StepKind,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

impl LaunchStep {
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl std::fmt::Debug for LaunchStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| {
                if k == TOKEN_ENV {
                    format!("{k}=***")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        f.debug_struct("LaunchStep")
            .field("kind", &self.kind)
            .field("command", &self.display_command())
            .field("env", &env)
            .field("cwd", &self.cwd)
            .finish()
    }
}

/// Ordered steps that start training for one model
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub variant: ModelVariant,
    pub diffusion_pipe_dir: PathBuf,
    /// Bundled launcher, when the model has one
    pub script: Option<PathBuf>,
    pub steps: Vec<LaunchStep>,
    /// Pause shown before starting models that initialise slowly
    pub slow_init_wait: Option<Duration>,
}

impl LaunchPlan {
    pub fn for_variant(
        variant: ModelVariant,
        config: &HelperConfig,
        token: Option<&HfToken>,
    ) -> Self {
        let launch = &config.launch;
        let cwd = config.diffusion_pipe_dir();
        let mut steps = Vec::new();

        if launch.upgrade_dependencies {
            for spec in &launch.pip_upgrades {
                let mut args = vec!["install".to_string()];
                args.extend(spec.split_whitespace().map(str::to_string));
                args.push("-q".to_string());
                steps.push(LaunchStep {
                    kind: StepKind::Upgrade,
                    program: launch.pip.clone(),
                    args,
                    env: Vec::new(),
                    cwd: cwd.clone(),
                });
            }
        }

        let mut env = Vec::new();
        if launch.disable_nccl_p2p {
            env.push(("NCCL_P2P_DISABLE".to_string(), "1".to_string()));
        }
        if launch.disable_nccl_ib {
            env.push(("NCCL_IB_DISABLE".to_string(), "1".to_string()));
        }
        if let Some(token) = token {
            env.push((TOKEN_ENV.to_string(), token.secret().to_string()));
        }

        let script = variant
            .training_script()
            .map(|s| config.training_scripts_dir().join(s));

        let train = match &script {
            Some(script) => LaunchStep {
                kind: StepKind::Train,
                program: launch.bash.clone(),
                args: vec![script.to_string_lossy().to_string()],
                env,
                cwd: cwd.clone(),
            },
            None => LaunchStep {
                kind: StepKind::Train,
                program: launch.deepspeed.clone(),
                args: vec![
                    format!("--num_gpus={}", launch.num_gpus),
                    "train.py".to_string(),
                    "--deepspeed".to_string(),
                    "--config".to_string(),
                    format!("examples/{}", variant.toml_file()),
                ],
                env,
                cwd: cwd.clone(),
            },
        };
        steps.push(train);

        Self {
            variant,
            diffusion_pipe_dir: cwd,
            script,
            steps,
            slow_init_wait: variant.slow_init().then(|| launch.slow_init_wait()),
        }
    }

    /// Fail early when the engine checkout or launcher script is missing
    pub fn check(&self) -> Result<()> {
        if !self.diffusion_pipe_dir.is_dir() {
            return Err(Error::SetupMissing(self.diffusion_pipe_dir.clone()));
        }
        if let Some(script) = &self.script {
            if !script.is_file() {
                return Err(Error::ScriptNotFound(script.clone()));
            }
        }
        Ok(())
    }

    pub fn training_step(&self) -> Option<&LaunchStep> {
        self.steps.iter().find(|s| s.kind == StepKind::Train)
    }
}

/// Receives launcher progress for display
pub trait LaunchObserver {
    fn step_started(&mut self, _step: &LaunchStep) {}
    fn step_failed(&mut self, _step: &LaunchStep, _code: Option<i32>) {}
    fn upgrades_done(&mut self) {}
    fn slow_init(&mut self, _wait: Duration) {}
    fn training_started(&mut self) {}
}

impl LaunchObserver for () {}

/// How a launch ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Completed,
    /// `cancel` resolved first; the running step was killed
    Cancelled,
}

/// Run every step of `plan`. Upgrade failures are logged and skipped; the
/// training step's exit status decides the result. The running step is
/// killed and reaped when `cancel` resolves.
pub async fn run_plan<F>(
    plan: &LaunchPlan,
    observer: &mut dyn LaunchObserver,
    cancel: F,
) -> Result<LaunchOutcome>
where
    F: Future<Output = ()>,
{
    plan.check()?;
    tokio::pin!(cancel);

    let mut ran_upgrades = false;
    for step in &plan.steps {
        if step.kind == StepKind::Train {
            if ran_upgrades {
                observer.upgrades_done();
            }
            if let Some(wait) = plan.slow_init_wait {
                observer.slow_init(wait);
                tokio::select! {
                    biased;
                    _ = cancel.as_mut() => return Ok(LaunchOutcome::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            observer.training_started();
        }

        observer.step_started(step);
        info!("Running {}", step.display_command());
        let status = match run_step(step, cancel.as_mut()).await {
            Ok(Some(status)) => Ok(status),
            Ok(None) => return Ok(LaunchOutcome::Cancelled),
            Err(e) => Err(e),
        };

        match (step.kind, status) {
            (StepKind::Upgrade, Ok(status)) => {
                ran_upgrades = true;
                if !status.success() {
                    warn!("{} exited with {}", step.display_command(), status);
                    observer.step_failed(step, status.code());
                }
            }
            (StepKind::Upgrade, Err(e)) => {
                ran_upgrades = true;
                warn!("{}", e);
                observer.step_failed(step, None);
            }
            (StepKind::Train, Ok(status)) => {
                if !status.success() {
                    return Err(Error::TrainingFailed {
                        code: status.code(),
                    });
                }
                info!("Training finished for {}", plan.variant);
            }
            (StepKind::Train, Err(e)) => return Err(e),
        }
    }
    Ok(LaunchOutcome::Completed)
}

/// Wait for `step` to exit, or kill it when `cancel` fires first (`None`)
async fn run_step<F>(step: &LaunchStep, cancel: Pin<&mut F>) -> Result<Option<ExitStatus>>
where
    F: Future<Output = ()>,
{
    let mut child = step.command().spawn().map_err(|e| {
        Error::LaunchError(format!("Failed to start {}: {}", step.program, e))
    })?;

    tokio::select! {
        biased;
        _ = cancel => {
            info!("Cancelling {}", step.display_command());
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", step.program, e);
            }
            Ok(None)
        }
        status = child.wait() => Ok(Some(status?)),
    }
}
