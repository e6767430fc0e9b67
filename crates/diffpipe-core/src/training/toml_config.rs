//! Path substitution in the engine's TOML configuration files
//!
//! The engine owns the schema. Only string values that are paths under a
//! known root, plus the `path` of each `[[directory]]` dataset entry, are
//! touched.

use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, info};

use crate::config::{HelperConfig, DEFAULT_NETWORK_VOLUME};
use crate::error::{Error, Result};
use crate::model::ModelVariant;

/// Rewrite every string equal to `from` or below `from/` so it points under
/// `to`. Returns the number of values changed.
pub fn rebase_paths(value: &mut Value, from: &Path, to: &Path) -> usize {
    match roots(from, to) {
        Some((from, to)) => rebase_value(value, &from, &to),
        None => 0,
    }
}

/// Normalised roots, or `None` when there is nothing to rewrite
fn roots(from: &Path, to: &Path) -> Option<(PathBuf, PathBuf)> {
    let from: PathBuf = from.components().collect();
    let to: PathBuf = to.components().collect();
    (!from.as_os_str().is_empty() && from != to).then_some((from, to))
}

fn rebase_value(value: &mut Value, from: &Path, to: &Path) -> usize {
    match value {
        Value::String(s) => match rebased(s, from, to) {
            Some(new) => {
                *s = new;
                1
            }
            None => 0,
        },
        Value::Array(items) => items.iter_mut().map(|v| rebase_value(v, from, to)).sum(),
        Value::Table(table) => rebase_table(table, from, to),
        _ => 0,
    }
}

fn rebase_table(table: &mut Table, from: &Path, to: &Path) -> usize {
    table
        .iter_mut()
        .map(|(_, v)| rebase_value(v, from, to))
        .sum()
}

fn rebased(s: &str, from: &Path, to: &Path) -> Option<String> {
    let path = Path::new(s);
    // Already rewritten on an earlier run when `to` lies below `from`.
    if to.starts_with(from) && path.starts_with(to) {
        return None;
    }
    let rest = path.strip_prefix(from).ok()?;
    let new = if rest.as_os_str().is_empty() {
        to.to_path_buf()
    } else {
        to.join(rest)
    };
    Some(new.to_string_lossy().into_owned())
}

/// Point the `[[directory]]` entries of a dataset config at `dirs`, in order.
/// Entries beyond `dirs` keep their paths and no entries are added.
pub fn set_dataset_directories(table: &mut Table, dirs: &[PathBuf]) -> usize {
    let Some(Value::Array(entries)) = table.get_mut("directory") else {
        return 0;
    };
    let mut changed = 0;
    for (entry, dir) in entries.iter_mut().zip(dirs) {
        if let Value::Table(entry) = entry {
            let new = Value::String(dir.to_string_lossy().to_string());
            if entry.get("path") != Some(&new) {
                entry.insert("path".to_string(), new);
                changed += 1;
            }
        }
    }
    changed
}

/// A TOML file loaded as an untyped table
#[derive(Debug, Clone)]
pub struct TomlFile {
    pub path: PathBuf,
    pub table: Table,
}

impl TomlFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let table: Table = toml::from_str(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    /// Write through a sibling temp file so readers never see a partial file
    pub fn save(&self) -> Result<()> {
        let text = toml::to_string_pretty(&self.table)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn rebase(&mut self, from: &Path, to: &Path) -> usize {
        match roots(from, to) {
            Some((from, to)) => rebase_table(&mut self.table, &from, &to),
            None => 0,
        }
    }

    /// Dataset config referenced by a training config. Relative paths are
    /// resolved against `base`, the engine's working directory.
    pub fn dataset_file(&self, base: &Path) -> Option<PathBuf> {
        let raw = self.table.get("dataset")?.as_str()?;
        let path = PathBuf::from(raw);
        Some(if path.is_absolute() {
            path
        } else {
            base.join(path)
        })
    }
}

/// Files touched while preparing a training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedConfigs {
    pub training_toml: PathBuf,
    pub dataset_toml: Option<PathBuf>,
    pub rewrites: usize,
}

/// Adjust the variant's training config, and the dataset config it points to,
/// for the configured volume and dataset folders.
pub fn prepare_configs(
    variant: ModelVariant,
    config: &HelperConfig,
    dataset_dirs: &[PathBuf],
) -> Result<PreparedConfigs> {
    let training_path = config.toml_dir().join(variant.toml_file());
    if !training_path.is_file() {
        return Err(Error::ConfigError(format!(
            "Training config not found: {}",
            training_path.display()
        )));
    }

    let from = Path::new(DEFAULT_NETWORK_VOLUME);
    let to = config.network_volume.as_path();
    let mut rewrites = 0;

    let mut training = TomlFile::load(&training_path)?;
    let training_changes = training.rebase(from, to);
    if training_changes > 0 {
        training.save()?;
        info!(
            "Rewrote {} path(s) in {}",
            training_changes,
            training_path.display()
        );
    }
    rewrites += training_changes;

    let dataset_toml = training.dataset_file(&config.diffusion_pipe_dir());
    if let Some(dataset_path) = &dataset_toml {
        if dataset_path.is_file() {
            let mut dataset = TomlFile::load(dataset_path)?;
            let changes = dataset.rebase(from, to)
                + set_dataset_directories(&mut dataset.table, dataset_dirs);
            if changes > 0 {
                dataset.save()?;
                info!("Rewrote {} path(s) in {}", changes, dataset_path.display());
            }
            rewrites += changes;
        } else {
            debug!("Dataset config {:?} does not exist, leaving it alone", dataset_path);
        }
    }

    Ok(PreparedConfigs {
        training_toml: training_path,
        dataset_toml,
        rewrites,
    })
}
