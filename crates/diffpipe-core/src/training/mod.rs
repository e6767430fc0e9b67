//! Preparing and starting a training run

pub mod launcher;
pub mod toml_config;

pub use launcher::{run_plan, LaunchObserver, LaunchOutcome, LaunchPlan, LaunchStep, StepKind};
pub use toml_config::{prepare_configs, PreparedConfigs, TomlFile};
