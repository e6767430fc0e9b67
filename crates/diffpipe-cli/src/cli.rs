//! Command-line arguments

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use diffpipe_core::{CaptionMode, ModelVariant};

/// Interactive training launcher for diffusion-pipe
#[derive(Debug, Clone, Parser)]
#[command(name = "diffpipe-helper", author, version, about)]
pub struct Args {
    /// Model to train, by key (e.g. `flux`, `wan14b_t2v`) or menu number
    #[arg(short, long)]
    pub model: Option<ModelVariant>,

    /// Captioning choice: images, videos, both or skip
    #[arg(short, long)]
    pub caption: Option<CaptionMode>,

    /// Answer every question with its default and confirm every prompt
    #[arg(short, long, default_value_t = false)]
    pub yes: bool,

    /// Use whatever weights are already on disk
    #[arg(long, default_value_t = false)]
    pub skip_download: bool,

    /// Print the download and launch commands without running anything
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Persistent volume root, overriding NETWORK_VOLUME
    #[arg(long)]
    pub network_volume: Option<PathBuf>,

    /// Dataset folder to use instead of the volume's image_dataset_here
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log filter used when RUST_LOG is not set
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "diffpipe_cli=info,diffpipe_core=info",
            1 => "diffpipe_cli=debug,diffpipe_core=debug",
            _ => "diffpipe_cli=trace,diffpipe_core=trace",
        }
    }
}
