//! Diffpipe Core - orchestration for diffusion-pipe training runs
//!
//! This crate drives the external tools that do the real work: the Hugging
//! Face CLI fetches weights, diffusion-pipe trains, and the bundled shell
//! launchers wire the two together. It provides:
//! - the catalog of supported models and where their files live
//! - dataset folder checks
//! - a supervised, time-limited background download
//! - path substitution in the engine's TOML files
//! - launch planning and execution
//!
//! # Example
//!
//! ```ignore
//! use diffpipe_core::{HelperConfig, ModelDownloader, ModelVariant, NoopObserver};
//!
//! let config = HelperConfig::load(None)?;
//! let downloader = ModelDownloader::new(&config);
//! let plan = downloader.plan(ModelVariant::Sdxl, None);
//! let cancel = async {
//!     let _ = tokio::signal::ctrl_c().await;
//! };
//! let outcome = downloader.download(&plan, &mut NoopObserver, cancel).await?;
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod preflight;
pub mod token;
pub mod training;

pub use config::{DownloadConfig, HelperConfig, LaunchConfig};
pub use dataset::{validate_dataset, CaptionMode, DatasetIssue, DatasetReport};
pub use error::{Error, Result};
pub use model::{
    DownloadObserver, DownloadOutcome, DownloadPlan, ModelDownloader, ModelKind, ModelVariant,
    NoopObserver,
};
pub use token::{resolve_token, HfToken, TokenSource};
pub use training::{
    prepare_configs, run_plan, LaunchObserver, LaunchOutcome, LaunchPlan, PreparedConfigs,
};
