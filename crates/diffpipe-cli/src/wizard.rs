//! Interactive flow: pick a model, check inputs, download, train

use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

use diffpipe_core::model::{inspect_safetensors, probe_repo_async};
use diffpipe_core::preflight::check_tools;
use diffpipe_core::token::token_from_env;
use diffpipe_core::training::{LaunchOutcome, LaunchPlan, StepKind};
use diffpipe_core::{
    prepare_configs, resolve_token, run_plan, validate_dataset, CaptionMode, DatasetReport,
    DownloadOutcome, HelperConfig, HfToken, ModelDownloader, ModelVariant, TokenSource,
};

use crate::error::CliError;
use crate::prompt::{PromptResult, Prompter};
use crate::ui::{Column, Ui};

/// Answers supplied up front instead of through prompts
#[derive(Debug, Clone, Default)]
pub struct WizardOptions {
    pub model: Option<ModelVariant>,
    pub caption: Option<CaptionMode>,
    pub skip_download: bool,
    pub dry_run: bool,
    /// Value of HUGGING_FACE_TOKEN at startup
    pub env_token: Option<String>,
}

/// How far a run got
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    Trained(ModelVariant),
    DryRun(ModelVariant),
}

pub struct Wizard<P> {
    config: HelperConfig,
    options: WizardOptions,
    prompter: P,
    ui: Ui,
}

impl<P: Prompter> Wizard<P> {
    pub fn new(config: HelperConfig, options: WizardOptions, prompter: P, ui: Ui) -> Self {
        Self {
            config,
            options,
            prompter,
            ui,
        }
    }

    pub fn ui_mut(&mut self) -> &mut Ui {
        &mut self.ui
    }

    /// Run the whole flow. `cancel` resolves on Ctrl-C.
    pub async fn run<F, C>(&mut self, cancel: F) -> Result<WizardOutcome, CliError>
    where
        F: Fn() -> C,
        C: Future<Output = ()>,
    {
        self.welcome()?;

        let variant = self.select_model()?;
        self.ui.blank()?;
        self.ui
            .success(format!("Selected: {}", variant.display_name()))?;
        self.report_missing_tools(variant)?;

        let token = self.token(variant)?;
        let caption = self.caption_mode()?;
        let report = self.validate(variant, caption)?;
        self.summary(variant, caption)?;

        if !self
            .prompter
            .confirm("Start training with this configuration?", true)?
        {
            return Err(CliError::Cancelled);
        }

        self.prepare(variant, &report)?;
        self.download(variant, token.as_ref(), cancel()).await?;
        self.launch(variant, token.as_ref(), cancel()).await
    }

    fn welcome(&mut self) -> PromptResult<()> {
        self.ui.clear()?;
        self.ui.panel(&[
            "Diffusion Pipe Helper - Interactive Training".to_string(),
            format!("Volume: {}", self.config.network_volume.display()),
        ])?;
        self.ui.blank()?;
        Ok(())
    }

    fn select_model(&mut self) -> PromptResult<ModelVariant> {
        if let Some(variant) = self.options.model {
            return Ok(variant);
        }

        let rows: Vec<Vec<String>> = ModelVariant::all()
            .iter()
            .map(|v| {
                vec![
                    v.menu_index().to_string(),
                    v.display_name().to_string(),
                    v.kind().to_string(),
                ]
            })
            .collect();
        self.ui.table(
            Some("Select Model to Train"),
            &[
                Column::new("#", 3),
                Column::new("Model", 30),
                Column::new("Type", 10),
            ],
            &rows,
        )?;
        self.ui.blank()?;

        let choices: Vec<String> = (1..=ModelVariant::all().len()).map(|i| i.to_string()).collect();
        let choices: Vec<&str> = choices.iter().map(String::as_str).collect();
        let answer = self.prompter.choose("Enter your choice", &choices, "1")?;
        Ok(answer.parse::<ModelVariant>()?)
    }

    fn report_missing_tools(&mut self, variant: ModelVariant) -> PromptResult<()> {
        for tool in check_tools(&self.config, variant) {
            if !tool.is_available() {
                warn!("{} not found on PATH", tool.name);
                self.ui.warn(format!(
                    "{} not found on PATH (needed for {})",
                    tool.name, tool.purpose
                ))?;
            }
        }
        Ok(())
    }

    fn token(&mut self, variant: ModelVariant) -> PromptResult<Option<HfToken>> {
        let env_token = self.options.env_token.as_deref();
        if variant.requires_token() && token_from_env(env_token).is_none() {
            self.ui.blank()?;
            self.ui.warn("Hugging Face token required for this model")?;
            self.ui
                .line("Get your token from: https://huggingface.co/settings/tokens")?;
            self.ui.blank()?;
        }

        let prompter = &mut self.prompter;
        let mut prompt_error = None;
        let token = resolve_token(variant, env_token, || {
            Ok(prompter
                .secret("Enter your Hugging Face token")
                .unwrap_or_else(|e| {
                    prompt_error = Some(e);
                    String::new()
                }))
        });
        if let Some(e) = prompt_error {
            return Err(e);
        }

        let token = match token {
            Err(diffpipe_core::Error::MissingToken(name)) => {
                self.ui.error("Token cannot be empty. Exiting.")?;
                return Err(diffpipe_core::Error::MissingToken(name).into());
            }
            other => other?,
        };

        match token.as_ref().map(|t| &t.source) {
            Some(TokenSource::Environment) => self.ui.success("Hugging Face token already set")?,
            Some(TokenSource::Prompt) => self.ui.success("Token set successfully")?,
            None => {}
        }
        Ok(token)
    }

    fn caption_mode(&mut self) -> PromptResult<CaptionMode> {
        if let Some(mode) = self.options.caption {
            return Ok(mode);
        }

        self.ui.blank()?;
        self.ui.panel(&[
            "Dataset Captioning".to_string(),
            String::new(),
            "Do you want to auto-caption your dataset?".to_string(),
        ])?;
        self.ui.blank()?;

        let rows: Vec<Vec<String>> = CaptionMode::all()
            .iter()
            .map(|m| vec![m.menu_index().to_string(), m.description().to_string()])
            .collect();
        self.ui
            .table(None, &[Column::new("", 1), Column::new("", 1)], &rows)?;
        self.ui.blank()?;

        let answer = self
            .prompter
            .choose("Enter your choice", &["1", "2", "3", "4"], "4")?;
        Ok(answer.parse::<CaptionMode>()?)
    }

    fn validate(&mut self, variant: ModelVariant, caption: CaptionMode) -> PromptResult<DatasetReport> {
        self.ui.blank()?;
        self.ui.panel(&["Dataset Validation".to_string()])?;
        self.ui.blank()?;

        let report = validate_dataset(caption, variant.kind(), &self.config)?;
        for found in &report.found {
            self.ui.success(found.summary())?;
        }

        if !report.is_clean() {
            self.ui.blank()?;
            for issue in &report.issues {
                self.ui.warn(issue.to_string())?;
            }
            self.ui.blank()?;
            if !self.prompter.confirm("Continue anyway?", false)? {
                return Err(CliError::Cancelled);
            }
        }
        self.ui.blank()?;
        Ok(report)
    }

    fn summary(&mut self, variant: ModelVariant, caption: CaptionMode) -> PromptResult<()> {
        self.ui.panel(&[
            "Configuration Summary".to_string(),
            String::new(),
            format!("Model: {}", variant.display_name()),
            format!("Type: {}", variant.kind()),
            format!("Caption Mode: {}", caption),
            format!("Config: {}", variant.toml_file()),
        ])?;
        self.ui.blank()?;
        Ok(())
    }

    fn prepare(&mut self, variant: ModelVariant, report: &DatasetReport) -> PromptResult<()> {
        let dataset_dirs: Vec<PathBuf> = report.dataset_dirs();
        if self.options.dry_run {
            self.ui.line(format!(
                "Would update paths in {}",
                self.config.toml_dir().join(variant.toml_file()).display()
            ))?;
            return Ok(());
        }

        let prepared = prepare_configs(variant, &self.config, &dataset_dirs)?;
        if prepared.rewrites > 0 {
            self.ui.success(format!(
                "Updated {} path(s) in training configuration",
                prepared.rewrites
            ))?;
        }
        Ok(())
    }

    async fn download<C>(
        &mut self,
        variant: ModelVariant,
        token: Option<&HfToken>,
        cancel: C,
    ) -> PromptResult<()>
    where
        C: Future<Output = ()>,
    {
        let downloader = ModelDownloader::new(&self.config);
        let plan = downloader.plan(variant, token);

        self.ui.blank()?;
        self.ui.panel(&[
            format!("Downloading {}", variant.display_name()),
            format!("From: {}", variant.repo_id()),
            format!("To: {}", plan.local_dir.display()),
        ])?;
        self.ui.blank()?;

        if self.options.skip_download {
            self.ui.line("Skipping download (--skip-download)")?;
            return Ok(());
        }

        if let Some(existing) = downloader.existing_weights(variant) {
            if let Some(first) = existing.first() {
                self.ui
                    .warn(format!("Model already exists at: {}", first.display()))?;
            }
            if self.prompter.confirm("Skip download?", true)? {
                self.ui.success("Using existing model")?;
                return Ok(());
            }
        }

        if self.options.dry_run {
            self.ui.line(format!("$ {}", plan.display_command()))?;
            return Ok(());
        }

        if downloader.settings().verify_access {
            let access = probe_repo_async(variant, token.cloned()).await?;
            for missing in &access.missing_files {
                self.ui
                    .warn(format!("{} does not list {}", access.repo_id, missing))?;
            }
        }

        self.ui.line("Starting download in background...")?;
        self.ui
            .line(format!("To monitor: tail -f {}", plan.log_file.display()))?;
        self.ui.blank()?;

        let mut spinner = self.ui.download_spinner();
        let outcome = downloader.download(&plan, &mut spinner, cancel).await?;

        match outcome {
            DownloadOutcome::Completed { elapsed } => {
                info!("Downloaded {} in {:?}", variant, elapsed);
                self.ui.success("Download complete!")?;
            }
            DownloadOutcome::Failed { code, log_file } => {
                let code = code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                self.ui.error(format!("Download failed with exit code {code}"))?;
                self.ui.warn(format!("Check log: {}", log_file.display()))?;
                return Err(CliError::DownloadFailed(format!("exit code {code}")));
            }
            DownloadOutcome::TimedOut { elapsed } => {
                let hours = elapsed.as_secs_f64() / 3600.0;
                self.ui
                    .error(format!("Download timed out after {hours:.1} hours!"))?;
                return Err(CliError::DownloadFailed("timed out".to_string()));
            }
            DownloadOutcome::Cancelled => return Err(CliError::Cancelled),
        }

        if downloader.settings().verify_weights {
            let mut verified = 0;
            for file in variant.expected_files(&self.config.models_dir()) {
                if !file.is_file() {
                    self.ui
                        .warn(format!("Expected weights not found: {}", file.display()))?;
                    continue;
                }
                let header = inspect_safetensors(&file)?;
                info!("{:?}: {} tensors", file, header.tensor_count);
                verified += 1;
            }
            if verified > 0 {
                self.ui.success(format!("Verified {verified} weight file(s)"))?;
            }
        }
        Ok(())
    }

    async fn launch<C>(
        &mut self,
        variant: ModelVariant,
        token: Option<&HfToken>,
        cancel: C,
    ) -> Result<WizardOutcome, CliError>
    where
        C: Future<Output = ()>,
    {
        self.ui.blank()?;
        self.ui.panel(&[
            format!("Starting Training: {}", variant.display_name()),
            format!("Configuration: {}", variant.toml_file()),
        ])?;
        self.ui.blank()?;

        let plan = LaunchPlan::for_variant(variant, &self.config, token);

        if self.options.dry_run {
            for step in &plan.steps {
                self.ui.line(format!(
                    "$ (cd {} && {})",
                    step.cwd.display(),
                    step.display_command()
                ))?;
            }
            return Ok(WizardOutcome::DryRun(variant));
        }

        if let Err(e) = plan.check() {
            self.ui.error(e.to_string())?;
            return Err(e.into());
        }

        if plan.steps.iter().any(|s| s.kind == StepKind::Upgrade) {
            self.ui.line("Upgrading dependencies...")?;
        }
        match run_plan(&plan, &mut self.ui, cancel).await? {
            LaunchOutcome::Completed => {}
            LaunchOutcome::Cancelled => return Err(CliError::Cancelled),
        }

        self.ui.blank()?;
        self.ui.success("Training completed!")?;
        Ok(WizardOutcome::Trained(variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::LinePrompter;
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    /// Writer whose contents stay readable after the Ui takes ownership
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn wizard(
        volume: &std::path::Path,
        options: WizardOptions,
        input: &str,
    ) -> (Wizard<LinePrompter<Cursor<Vec<u8>>, Vec<u8>>>, SharedBuf) {
        let out = SharedBuf::default();
        let config = HelperConfig {
            network_volume: volume.to_path_buf(),
            ..Default::default()
        };
        let prompter = LinePrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
        let ui = Ui::with_writer(Box::new(out.clone()));
        (Wizard::new(config, options, prompter, ui), out)
    }

    fn never() -> impl Future<Output = ()> {
        std::future::pending()
    }

    fn dataset(volume: &std::path::Path) {
        let images = volume.join("image_dataset_here");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("a.png"), b"png").unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_prints_plans() {
        let tmp = tempfile::tempdir().unwrap();
        dataset(tmp.path());
        let options = WizardOptions {
            dry_run: true,
            ..Default::default()
        };
        // model 2 (SDXL), default caption mode, confirm start
        let (mut w, out) = wizard(tmp.path(), options, "2\n\ny\n");

        let outcome = w.run(never).await.unwrap();
        assert_eq!(outcome, WizardOutcome::DryRun(ModelVariant::Sdxl));

        let text = out.text();
        assert!(text.contains("Select Model to Train"));
        assert!(text.contains("✓ Selected: SDXL"));
        assert!(text.contains("✓ Found 1 images"));
        assert!(text.contains("Caption Mode: skip"));
        assert!(text.contains("huggingface-cli download timoshishi/sdXL_v10VAEFix"));
        assert!(text.contains("start_sdxl_training.sh"));
    }

    #[tokio::test]
    async fn test_declining_dataset_warning_cancels() {
        let tmp = tempfile::tempdir().unwrap();
        let options = WizardOptions {
            model: Some(ModelVariant::Wan13),
            caption: Some(CaptionMode::Videos),
            ..Default::default()
        };
        let (mut w, out) = wizard(tmp.path(), options, "\n");

        let result = w.run(never).await;
        assert!(matches!(result, Err(CliError::Cancelled)));
        assert!(out.text().contains("Video dataset folder not found"));
    }

    #[tokio::test]
    async fn test_declining_summary_cancels() {
        let tmp = tempfile::tempdir().unwrap();
        dataset(tmp.path());
        let options = WizardOptions {
            model: Some(ModelVariant::Qwen),
            caption: Some(CaptionMode::Images),
            ..Default::default()
        };
        let (mut w, _) = wizard(tmp.path(), options, "n\n");
        assert!(matches!(w.run(never).await, Err(CliError::Cancelled)));
    }

    #[tokio::test]
    async fn test_gated_model_with_empty_token_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let options = WizardOptions {
            model: Some(ModelVariant::Flux),
            env_token: Some("token_here".to_string()),
            ..Default::default()
        };
        let (mut w, out) = wizard(tmp.path(), options, "\n");

        let result = w.run(never).await;
        assert!(matches!(
            result,
            Err(CliError::Core(diffpipe_core::Error::MissingToken(_)))
        ));
        assert!(out.text().contains("Hugging Face token required"));
    }

    #[tokio::test]
    async fn test_existing_weights_skip_download_then_missing_setup() {
        let tmp = tempfile::tempdir().unwrap();
        dataset(tmp.path());
        let config = HelperConfig {
            network_volume: tmp.path().to_path_buf(),
            ..Default::default()
        };
        std::fs::create_dir_all(config.toml_dir()).unwrap();
        std::fs::write(config.toml_dir().join("sdxl.toml"), "epochs = 1\n").unwrap();
        for file in ModelVariant::Sdxl.expected_files(&config.models_dir()) {
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, b"w").unwrap();
        }
        let options = WizardOptions {
            model: Some(ModelVariant::Sdxl),
            caption: Some(CaptionMode::Skip),
            ..Default::default()
        };
        // confirm start, accept "Skip download?"
        let (mut w, out) = wizard(tmp.path(), options, "y\n\n");

        let result = w.run(never).await;
        // diffusion_pipe exists (holds examples/) but the launcher script does not
        assert!(matches!(
            result,
            Err(CliError::Core(diffpipe_core::Error::ScriptNotFound(_)))
        ));
        let text = out.text();
        assert!(text.contains("Model already exists at:"));
        assert!(text.contains("✓ Using existing model"));
    }

    fn launch_ready(volume: &std::path::Path, script: &str) -> HelperConfig {
        let mut config = HelperConfig {
            network_volume: volume.to_path_buf(),
            ..Default::default()
        };
        config.launch.bash = "sh".to_string();
        config.launch.upgrade_dependencies = false;
        std::fs::create_dir_all(config.diffusion_pipe_dir()).unwrap();
        std::fs::create_dir_all(config.training_scripts_dir()).unwrap();
        let script_path = config
            .training_scripts_dir()
            .join(ModelVariant::Sdxl.training_script().unwrap());
        std::fs::write(script_path, script).unwrap();
        config
    }

    #[tokio::test]
    async fn test_cancelled_launch_stops_training() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("marker");
        let config = launch_ready(tmp.path(), &format!("sleep 1; touch {}\n", marker.display()));
        let (mut w, out) = wizard(tmp.path(), WizardOptions::default(), "");
        w.config = config;

        let result = w
            .launch(
                ModelVariant::Sdxl,
                None,
                tokio::time::sleep(std::time::Duration::from_millis(200)),
            )
            .await;
        assert!(matches!(result, Err(CliError::Cancelled)));

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
        assert!(!out.text().contains("Training completed!"));
    }

    #[tokio::test]
    async fn test_launch_without_upgrades_skips_upgrade_notice() {
        let tmp = tempfile::tempdir().unwrap();
        let config = launch_ready(tmp.path(), "exit 0\n");
        let (mut w, out) = wizard(tmp.path(), WizardOptions::default(), "");
        w.config = config;

        let outcome = w.launch(ModelVariant::Sdxl, None, never()).await.unwrap();
        assert_eq!(outcome, WizardOutcome::Trained(ModelVariant::Sdxl));
        let text = out.text();
        assert!(!text.contains("Upgrading dependencies..."));
        assert!(text.contains("✓ Training completed!"));
    }
}
