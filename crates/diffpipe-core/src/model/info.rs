//! Catalog of the models the helper knows how to fetch and train

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// What kind of dataset a model trains on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Image,
    Video,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Image => write!(f, "Image"),
            ModelKind::Video => write!(f, "Video"),
        }
    }
}

/// Supported training targets, in menu order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    Flux,
    Sdxl,
    Wan13,
    Wan14bT2v,
    Wan14bI2v,
    Qwen,
    ZImageTurbo,
}

impl ModelVariant {
    /// Get all variants in menu order
    pub fn all() -> &'static [ModelVariant] {
        &[
            ModelVariant::Flux,
            ModelVariant::Sdxl,
            ModelVariant::Wan13,
            ModelVariant::Wan14bT2v,
            ModelVariant::Wan14bI2v,
            ModelVariant::Qwen,
            ModelVariant::ZImageTurbo,
        ]
    }

    /// Look up a variant by its 1-based menu position
    pub fn from_menu_index(index: usize) -> Result<Self> {
        index
            .checked_sub(1)
            .and_then(|i| Self::all().get(i).copied())
            .ok_or_else(|| Error::InvalidChoice(format!("model #{index}")))
    }

    /// 1-based menu position
    pub fn menu_index(&self) -> usize {
        Self::all()
            .iter()
            .position(|v| v == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Stable identifier, also accepted on the command line
    pub fn key(&self) -> &'static str {
        match self {
            ModelVariant::Flux => "flux",
            ModelVariant::Sdxl => "sdxl",
            ModelVariant::Wan13 => "wan13",
            ModelVariant::Wan14bT2v => "wan14b_t2v",
            ModelVariant::Wan14bI2v => "wan14b_i2v",
            ModelVariant::Qwen => "qwen",
            ModelVariant::ZImageTurbo => "z_image_turbo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelVariant::Flux => "Flux",
            ModelVariant::Sdxl => "SDXL",
            ModelVariant::Wan13 => "Wan 1.3B",
            ModelVariant::Wan14bT2v => "Wan 14B Text-To-Video",
            ModelVariant::Wan14bI2v => "Wan 14B Image-To-Video",
            ModelVariant::Qwen => "Qwen Image",
            ModelVariant::ZImageTurbo => "Z Image Turbo",
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelVariant::Wan13 | ModelVariant::Wan14bT2v | ModelVariant::Wan14bI2v => {
                ModelKind::Video
            }
            _ => ModelKind::Image,
        }
    }

    /// HuggingFace repository ID
    pub fn repo_id(&self) -> &'static str {
        match self {
            ModelVariant::Flux => "black-forest-labs/FLUX.1-dev",
            ModelVariant::Sdxl => "timoshishi/sdXL_v10VAEFix",
            ModelVariant::Wan13 => "Wan-AI/Wan2.1-T2V-1.3B",
            ModelVariant::Wan14bT2v => "Wan-AI/Wan2.1-T2V-14B",
            ModelVariant::Wan14bI2v => "Wan-AI/Wan2.1-I2V-14B-480P",
            ModelVariant::Qwen => "Qwen/Qwen-Image",
            ModelVariant::ZImageTurbo => "Comfy-Org/z_image_turbo",
        }
    }

    /// Files to request from the hub. Empty means the whole repository.
    pub fn hub_files(&self) -> &'static [&'static str] {
        match self {
            ModelVariant::Sdxl => &["sdXL_v10VAEFix.safetensors"],
            ModelVariant::ZImageTurbo => &[
                "split_files/diffusion_models/z_image_turbo_bf16.safetensors",
                "split_files/text_encoders/qwen_3_4b.safetensors",
                "split_files/vae/ae.safetensors",
            ],
            _ => &[],
        }
    }

    /// Directory under the models root that receives the download
    fn local_subdir(&self) -> &'static str {
        match self {
            ModelVariant::Flux => "flux",
            ModelVariant::Sdxl => "",
            ModelVariant::Wan13 => "Wan/Wan2.1-T2V-1.3B",
            ModelVariant::Wan14bT2v => "Wan/Wan2.1-T2V-14B",
            ModelVariant::Wan14bI2v => "Wan/Wan2.1-I2V-14B-480P",
            ModelVariant::Qwen => "Qwen-Image",
            ModelVariant::ZImageTurbo => "z_image",
        }
    }

    pub fn local_dir(&self, models_root: &Path) -> PathBuf {
        match self.local_subdir() {
            "" => models_root.to_path_buf(),
            sub => models_root.join(sub),
        }
    }

    /// Training config file name inside the engine's examples directory
    pub fn toml_file(&self) -> &'static str {
        match self {
            ModelVariant::Flux => "flux.toml",
            ModelVariant::Sdxl => "sdxl.toml",
            ModelVariant::Wan13 => "wan13_video.toml",
            ModelVariant::Wan14bT2v => "wan14b_t2v.toml",
            ModelVariant::Wan14bI2v => "wan14b_i2v.toml",
            ModelVariant::Qwen => "qwen_toml.toml",
            ModelVariant::ZImageTurbo => "z_image_toml.toml",
        }
    }

    /// Bundled launcher script, or `None` when training is started directly
    pub fn training_script(&self) -> Option<&'static str> {
        match self {
            ModelVariant::Flux => Some("start_flux_training.sh"),
            ModelVariant::Sdxl => Some("start_sdxl_training.sh"),
            ModelVariant::Wan13 => Some("start_wan_t2v_13b_training.sh"),
            ModelVariant::Wan14bT2v => Some("start_wan_t2v_14b_training.sh"),
            ModelVariant::Wan14bI2v => Some("start_wan_i2v_480p_training.sh"),
            ModelVariant::Qwen | ModelVariant::ZImageTurbo => None,
        }
    }

    /// Gated repositories need a token
    pub fn requires_token(&self) -> bool {
        matches!(self, ModelVariant::Flux)
    }

    /// Primary weight file used to detect an earlier download
    pub fn model_file(&self) -> Option<&'static str> {
        match self {
            ModelVariant::Flux => Some("flux1-dev.safetensors"),
            ModelVariant::Sdxl => Some("sdXL_v10VAEFix.safetensors"),
            ModelVariant::Wan13 | ModelVariant::Wan14bT2v | ModelVariant::Wan14bI2v => {
                Some("diffusion_pytorch_model.safetensors")
            }
            ModelVariant::Qwen => Some("model.safetensors"),
            ModelVariant::ZImageTurbo => None,
        }
    }

    /// Weight files expected on disk after a successful download
    pub fn expected_files(&self, models_root: &Path) -> Vec<PathBuf> {
        let dir = self.local_dir(models_root);
        match self.model_file() {
            Some(file) => vec![dir.join(file)],
            None => self.hub_files().iter().map(|f| dir.join(f)).collect(),
        }
    }

    /// Model initialisation is slow enough to look like a hang
    pub fn slow_init(&self) -> bool {
        matches!(self, ModelVariant::Qwen | ModelVariant::ZImageTurbo)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        if let Ok(index) = needle.parse::<usize>() {
            return Self::from_menu_index(index);
        }
        Self::all()
            .iter()
            .copied()
            .find(|v| v.key() == needle)
            .ok_or(Error::UnknownModel(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_order_round_trips() {
        for (i, variant) in ModelVariant::all().iter().enumerate() {
            assert_eq!(variant.menu_index(), i + 1);
            assert_eq!(ModelVariant::from_menu_index(i + 1).unwrap(), *variant);
        }
        assert!(ModelVariant::from_menu_index(0).is_err());
        assert!(ModelVariant::from_menu_index(8).is_err());
    }

    #[test]
    fn test_parse_key_or_index() {
        assert_eq!("flux".parse::<ModelVariant>().unwrap(), ModelVariant::Flux);
        assert_eq!(" Z_IMAGE_TURBO ".parse::<ModelVariant>().unwrap(), ModelVariant::ZImageTurbo);
        assert_eq!("5".parse::<ModelVariant>().unwrap(), ModelVariant::Wan14bI2v);
        assert!(matches!(
            "stable-cascade".parse::<ModelVariant>(),
            Err(Error::UnknownModel(_))
        ));
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = ModelVariant::all().iter().map(|v| v.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ModelVariant::all().len());
    }

    #[test]
    fn test_local_dirs() {
        let root = Path::new("/workspace/models");
        assert_eq!(ModelVariant::Sdxl.local_dir(root), root);
        assert_eq!(
            ModelVariant::Wan14bI2v.local_dir(root),
            root.join("Wan/Wan2.1-I2V-14B-480P")
        );
    }

    #[test]
    fn test_inline_launch_models_are_slow_init() {
        for variant in ModelVariant::all() {
            assert_eq!(variant.training_script().is_none(), variant.slow_init());
        }
    }

    #[test]
    fn test_multi_file_expected_files() {
        let root = Path::new("/m");
        let files = ModelVariant::ZImageTurbo.expected_files(root);
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.starts_with("/m/z_image")));
        assert_eq!(
            ModelVariant::Flux.expected_files(root),
            vec![PathBuf::from("/m/flux/flux1-dev.safetensors")]
        );
    }

    #[test]
    fn test_only_flux_needs_token() {
        let gated: Vec<_> = ModelVariant::all()
            .iter()
            .filter(|v| v.requires_token())
            .collect();
        assert_eq!(gated, vec![&ModelVariant::Flux]);
    }
}
