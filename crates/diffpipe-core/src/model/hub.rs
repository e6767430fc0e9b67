//! Repository access probe against the Hugging Face Hub API

use hf_hub::api::sync::ApiBuilder;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::info::ModelVariant;
use crate::token::HfToken;

/// What the hub reported for a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoAccess {
    pub repo_id: String,
    pub revision: String,
    pub file_count: usize,
    /// Requested files the repository does not list
    pub missing_files: Vec<String>,
}

impl RepoAccess {
    pub fn is_complete(&self) -> bool {
        self.missing_files.is_empty()
    }
}

/// Compare the repository listing against the files a variant requests
pub fn missing_files(variant: ModelVariant, listed: &[String]) -> Vec<String> {
    variant
        .hub_files()
        .iter()
        .filter(|wanted| !listed.iter().any(|f| f == *wanted))
        .map(|f| f.to_string())
        .collect()
}

/// Fetch repository metadata with `token`. Gated repos fail here quickly
/// instead of partway through a multi-hour download.
pub fn probe_repo(variant: ModelVariant, token: Option<&HfToken>) -> Result<RepoAccess> {
    let api = ApiBuilder::new()
        .with_progress(false)
        .with_token(token.map(|t| t.secret().to_string()))
        .build()?;

    debug!("Querying hub metadata for {}", variant.repo_id());
    let info = api.model(variant.repo_id().to_string()).info()?;

    let listed: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
    let access = RepoAccess {
        repo_id: variant.repo_id().to_string(),
        revision: info.sha,
        file_count: listed.len(),
        missing_files: missing_files(variant, &listed),
    };
    info!(
        "{} is reachable ({} files at {})",
        access.repo_id, access.file_count, access.revision
    );
    Ok(access)
}

/// Async wrapper running the blocking hub client off the runtime threads
pub async fn probe_repo_async(
    variant: ModelVariant,
    token: Option<HfToken>,
) -> Result<RepoAccess> {
    tokio::task::spawn_blocking(move || probe_repo(variant, token.as_ref()))
        .await
        .map_err(|e| Error::HfHubError(e.to_string()))?
}
