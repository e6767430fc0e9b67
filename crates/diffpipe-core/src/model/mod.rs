//! Model catalog, download and verification

mod download;
pub mod hub;
mod info;
pub mod weights;

pub use download::{
    supervise, DownloadObserver, DownloadOutcome, DownloadPlan, ModelDownloader, NoopObserver,
};
pub use hub::{probe_repo, probe_repo_async, RepoAccess};
pub use info::{ModelKind, ModelVariant};
pub use weights::{inspect_safetensors, WeightsHeader};
