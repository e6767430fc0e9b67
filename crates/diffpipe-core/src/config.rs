//! Configuration types for the diffusion-pipe helper

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

/// Environment variable naming the persistent volume
pub const NETWORK_VOLUME_ENV: &str = "NETWORK_VOLUME";

/// Root the bundled TOML files are written against
pub const DEFAULT_NETWORK_VOLUME: &str = "/workspace";

/// Main helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Persistent volume holding models, datasets and the engine checkout
    #[serde(default = "default_network_volume")]
    pub network_volume: PathBuf,

    /// Override for the image dataset directory
    #[serde(default)]
    pub image_dataset_dir: Option<PathBuf>,

    /// Override for the video dataset directory
    #[serde(default)]
    pub video_dataset_dir: Option<PathBuf>,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub launch: LaunchConfig,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            network_volume: default_network_volume(),
            image_dataset_dir: None,
            video_dataset_dir: None,
            download: DownloadConfig::default(),
            launch: LaunchConfig::default(),
        }
    }
}

impl HelperConfig {
    /// Load configuration from an optional file, `DIFFPIPE__*` variables and
    /// `NETWORK_VOLUME`, in increasing priority.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.map(Path::to_path_buf).or_else(default_config_file);

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            debug!("Reading configuration from {:?}", file);
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Toml)
                    .required(path.is_some()),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("DIFFPIPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: HelperConfig = settings.try_deserialize()?;
        if let Some(volume) = std::env::var_os(NETWORK_VOLUME_ENV).filter(|v| !v.is_empty()) {
            config.network_volume = PathBuf::from(volume);
        }
        Ok(config)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.network_volume.join("diffusion-pipe-working-folder")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.network_volume.join("models")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.network_volume.join("logs")
    }

    /// Checkout of the training engine
    pub fn diffusion_pipe_dir(&self) -> PathBuf {
        self.working_dir().join("diffusion_pipe")
    }

    pub fn training_scripts_dir(&self) -> PathBuf {
        self.working_dir().join("training_scripts")
    }

    /// Directory holding the per-model training TOML files
    pub fn toml_dir(&self) -> PathBuf {
        self.diffusion_pipe_dir().join("examples")
    }

    pub fn image_dataset_dir(&self) -> PathBuf {
        self.image_dataset_dir
            .clone()
            .unwrap_or_else(|| self.network_volume.join("image_dataset_here"))
    }

    pub fn video_dataset_dir(&self) -> PathBuf {
        self.video_dataset_dir
            .clone()
            .unwrap_or_else(|| self.network_volume.join("video_dataset_here"))
    }
}

/// Model download supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Hub CLI executable
    #[serde(default = "default_hub_cli")]
    pub hub_cli: String,

    /// Kill the download after this many seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds between checks on the download process
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Query repository metadata before starting the download
    #[serde(default)]
    pub verify_access: bool,

    /// Parse safetensors headers after the download completes
    #[serde(default = "default_true")]
    pub verify_weights: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            hub_cli: default_hub_cli(),
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            verify_access: false,
            verify_weights: true,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Training launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    #[serde(default = "default_pip")]
    pub pip: String,

    #[serde(default = "default_deepspeed")]
    pub deepspeed: String,

    #[serde(default = "default_bash")]
    pub bash: String,

    /// GPUs handed to deepspeed for inline launches
    #[serde(default = "default_num_gpus")]
    pub num_gpus: u32,

    #[serde(default = "default_true")]
    pub disable_nccl_p2p: bool,

    #[serde(default = "default_true")]
    pub disable_nccl_ib: bool,

    /// Pause before starting models with slow initialisation
    #[serde(default = "default_slow_init_wait_secs")]
    pub slow_init_wait_secs: u64,

    #[serde(default = "default_true")]
    pub upgrade_dependencies: bool,

    /// Arguments to `pip install`, one upgrade per entry
    #[serde(default = "default_pip_upgrades")]
    pub pip_upgrades: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            pip: default_pip(),
            deepspeed: default_deepspeed(),
            bash: default_bash(),
            num_gpus: default_num_gpus(),
            disable_nccl_p2p: true,
            disable_nccl_ib: true,
            slow_init_wait_secs: default_slow_init_wait_secs(),
            upgrade_dependencies: true,
            pip_upgrades: default_pip_upgrades(),
        }
    }
}

impl LaunchConfig {
    pub fn slow_init_wait(&self) -> Duration {
        Duration::from_secs(self.slow_init_wait_secs)
    }
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("diffpipe-helper").join("config.toml"))
}

fn default_network_volume() -> PathBuf {
    PathBuf::from(DEFAULT_NETWORK_VOLUME)
}

fn default_hub_cli() -> String {
    "huggingface-cli".to_string()
}

fn default_timeout_secs() -> u64 {
    3 * 60 * 60
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_pip() -> String {
    "pip".to_string()
}

fn default_deepspeed() -> String {
    "deepspeed".to_string()
}

fn default_bash() -> String {
    "bash".to_string()
}

fn default_num_gpus() -> u32 {
    1
}

fn default_slow_init_wait_secs() -> u64 {
    10
}

fn default_pip_upgrades() -> Vec<String> {
    vec![
        "transformers -U".to_string(),
        "--upgrade peft>=0.17.0".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let config = HelperConfig {
            network_volume: PathBuf::from("/vol"),
            ..Default::default()
        };
        assert_eq!(
            config.diffusion_pipe_dir(),
            PathBuf::from("/vol/diffusion-pipe-working-folder/diffusion_pipe")
        );
        assert_eq!(
            config.toml_dir(),
            PathBuf::from("/vol/diffusion-pipe-working-folder/diffusion_pipe/examples")
        );
        assert_eq!(config.image_dataset_dir(), PathBuf::from("/vol/image_dataset_here"));
        assert_eq!(config.logs_dir(), PathBuf::from("/vol/logs"));
    }

    #[test]
    fn test_defaults() {
        let config = HelperConfig::default();
        assert_eq!(config.network_volume, PathBuf::from("/workspace"));
        assert_eq!(config.download.timeout(), Duration::from_secs(10800));
        assert_eq!(config.download.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.launch.num_gpus, 1);
        assert_eq!(config.launch.pip_upgrades.len(), 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: HelperConfig = toml::from_str(
            r#"
            network_volume = "/data"

            [download]
            timeout_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.network_volume, PathBuf::from("/data"));
        assert_eq!(config.download.timeout_secs, 60);
        assert_eq!(config.download.hub_cli, "huggingface-cli");
        assert!(config.launch.disable_nccl_ib);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let download = DownloadConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(download.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.toml");
        std::fs::write(
            &path,
            "[launch]\nnum_gpus = 4\nupgrade_dependencies = false\n",
        )
        .unwrap();

        let _env = EnvGuard::set(&[]);
        let config = HelperConfig::load(Some(&path)).unwrap();
        assert_eq!(config.launch.num_gpus, 4);
        assert!(!config.launch.upgrade_dependencies);
    }

    /// Sets environment variables for one test and restores them on drop.
    /// Holds a lock so env-dependent tests do not interleave.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<std::ffi::OsString>)>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    impl EnvGuard {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|(k, v)| {
                    let old = std::env::var_os(k);
                    std::env::set_var(k, v);
                    (*k, old)
                })
                .collect();
            Self { saved, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, old) in &self.saved {
                match old {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn test_load_layers_file_env_and_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.toml");
        std::fs::write(
            &path,
            "network_volume = \"/from-file\"\n[download]\ntimeout_secs = 60\npoll_interval_secs = 7\n",
        )
        .unwrap();

        {
            let _env = EnvGuard::set(&[("DIFFPIPE__DOWNLOAD__TIMEOUT_SECS", "120")]);
            let config = HelperConfig::load(Some(&path)).unwrap();
            assert_eq!(config.download.timeout_secs, 120);
            assert_eq!(config.download.poll_interval_secs, 7);
        }

        let _env = EnvGuard::set(&[
            ("DIFFPIPE__DOWNLOAD__TIMEOUT_SECS", "120"),
            ("DIFFPIPE__NETWORK_VOLUME", "/from-env"),
            (NETWORK_VOLUME_ENV, "/from-volume-var"),
        ]);
        let config = HelperConfig::load(Some(&path)).unwrap();
        assert_eq!(config.network_volume, PathBuf::from("/from-volume-var"));
        assert_eq!(config.download.timeout_secs, 120);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _env = EnvGuard::set(&[]);
        let result = HelperConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }
}
