//! Check that the external tools a run needs are installed

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::HelperConfig;
use crate::model::ModelVariant;

/// An external program and where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    pub purpose: &'static str,
    pub location: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.location.is_some()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve `program` the way a shell would: paths are checked directly,
/// bare names are searched in `search_path`.
pub fn find_program(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let search_path = search_path?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

/// Tools needed to download and train `variant`
pub fn required_tools(config: &HelperConfig, variant: ModelVariant) -> Vec<(String, &'static str)> {
    let mut tools = vec![(config.download.hub_cli.clone(), "model download")];
    if config.launch.upgrade_dependencies {
        tools.push((config.launch.pip.clone(), "dependency upgrades"));
    }
    if variant.training_script().is_some() {
        tools.push((config.launch.bash.clone(), "training launcher"));
    } else {
        tools.push((config.launch.deepspeed.clone(), "training launcher"));
    }
    tools
}

/// Look up every tool the run needs on `PATH`
pub fn check_tools(config: &HelperConfig, variant: ModelVariant) -> Vec<ToolStatus> {
    let path = std::env::var_os("PATH");
    check_tools_in(config, variant, path.as_deref())
}

pub fn check_tools_in(
    config: &HelperConfig,
    variant: ModelVariant,
    search_path: Option<&OsStr>,
) -> Vec<ToolStatus> {
    required_tools(config, variant)
        .into_iter()
        .map(|(name, purpose)| {
            let location = find_program(&name, search_path);
            debug!("{} ({}): {:?}", name, purpose, location);
            ToolStatus {
                name,
                purpose,
                location,
            }
        })
        .collect()
}
