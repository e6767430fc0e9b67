//! Diffusion Pipe Helper - interactive training launcher

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod error;
mod prompt;
mod ui;
mod wizard;

use cli::Args;
use diffpipe_core::token::TOKEN_ENV;
use diffpipe_core::HelperConfig;
use error::CliError;
use prompt::{AutoPrompter, LinePrompter, Prompter};
use ui::Ui;
use wizard::{Wizard, WizardOptions, WizardOutcome};

fn load_config(args: &Args) -> anyhow::Result<HelperConfig> {
    let mut config = HelperConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(volume) = &args.network_volume {
        config.network_volume = volume.clone();
    }
    if let Some(dataset) = &args.dataset {
        config.image_dataset_dir = Some(dataset.clone());
        config.video_dataset_dir = Some(dataset.clone());
    }
    Ok(config)
}

async fn run_wizard<P: Prompter>(wizard: &mut Wizard<P>) -> anyhow::Result<WizardOutcome> {
    let outcome = wizard
        .run(|| async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(outcome)
}

/// Print a failed run and pick the exit code. A user cancel exits cleanly.
fn report(ui: &mut Ui, e: &anyhow::Error) -> ExitCode {
    let cli = e.downcast_ref::<CliError>();
    let _ = ui.blank();
    if let Some(CliError::Cancelled) = cli {
        let _ = ui.warn("Cancelled by user");
    } else {
        error!("{:#}", e);
        let _ = ui.error(format!("Error: {e:#}"));
        if let Some(hint) = cli.and_then(|c| c.hint()) {
            let _ = ui.warn(hint);
        }
    }
    cli.map_or(ExitCode::FAILURE, |c| c.exit_code())
}

async fn run<P: Prompter>(mut wizard: Wizard<P>) -> ExitCode {
    match run_wizard(&mut wizard).await {
        Ok(outcome) => {
            debug!("Finished: {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => report(wizard.ui_mut(), &e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so the wizard owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => return report(&mut Ui::stdout(), &e),
    };
    info!("Network volume: {:?}", config.network_volume);

    let options = WizardOptions {
        model: args.model,
        caption: args.caption,
        skip_download: args.skip_download,
        dry_run: args.dry_run,
        env_token: std::env::var(TOKEN_ENV).ok(),
    };

    if args.yes {
        run(Wizard::new(config, options, AutoPrompter, Ui::stdout())).await
    } else {
        run(Wizard::new(config, options, LinePrompter::stdio(), Ui::stdout())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cancel_reports_success() {
        let mut ui = Ui::with_writer(Box::new(std::io::sink()));
        let err = anyhow::Error::from(CliError::Cancelled);
        assert_eq!(report(&mut ui, &err), ExitCode::SUCCESS);
    }

    #[test]
    fn test_wrapped_errors_fail() {
        let mut ui = Ui::with_writer(Box::new(std::io::sink()));

        let setup = anyhow::Error::from(CliError::from(diffpipe_core::Error::SetupMissing(
            PathBuf::from("/x"),
        )))
        .context("Launch failed");
        assert_eq!(report(&mut ui, &setup), ExitCode::FAILURE);

        let config = anyhow::Error::from(diffpipe_core::Error::ConfigError("bad".into()))
            .context("Failed to load configuration");
        assert_eq!(report(&mut ui, &config), ExitCode::FAILURE);
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("absent.toml").to_string_lossy().to_string();
        let args = Args::try_parse_from(["diffpipe-helper", "--config", missing.as_str()]).unwrap();
        let err = load_config(&args).unwrap_err();
        assert!(format!("{err:#}").starts_with("Failed to load configuration"));
    }
}
