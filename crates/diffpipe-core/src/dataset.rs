//! Dataset folder checks before training

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::config::HelperConfig;
use crate::error::{Error, Result};
use crate::model::ModelKind;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Which media the user wants auto-captioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionMode {
    Images,
    Videos,
    Both,
    #[default]
    Skip,
}

impl CaptionMode {
    pub fn all() -> &'static [CaptionMode] {
        &[
            CaptionMode::Images,
            CaptionMode::Videos,
            CaptionMode::Both,
            CaptionMode::Skip,
        ]
    }

    pub fn from_menu_index(index: usize) -> Result<Self> {
        index
            .checked_sub(1)
            .and_then(|i| Self::all().get(i).copied())
            .ok_or_else(|| Error::InvalidChoice(format!("caption option #{index}")))
    }

    pub fn menu_index(&self) -> usize {
        Self::all()
            .iter()
            .position(|m| m == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn description(&self) -> &'static str {
        match self {
            CaptionMode::Images => "Caption images only",
            CaptionMode::Videos => "Caption videos only",
            CaptionMode::Both => "Caption both images and videos",
            CaptionMode::Skip => "Skip captioning",
        }
    }
}

impl fmt::Display for CaptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptionMode::Images => "images",
            CaptionMode::Videos => "videos",
            CaptionMode::Both => "both",
            CaptionMode::Skip => "skip",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CaptionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        if let Ok(index) = needle.parse::<usize>() {
            return Self::from_menu_index(index);
        }
        Self::all()
            .iter()
            .copied()
            .find(|m| m.to_string() == needle)
            .ok_or(Error::InvalidChoice(needle))
    }
}

/// Media type counted in a dataset folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => IMAGE_EXTENSIONS,
            MediaKind::Video => VIDEO_EXTENSIONS,
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "Image",
            MediaKind::Video => "Video",
        }
    }
}

/// A problem found in a dataset folder. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetIssue {
    MissingFolder { kind: MediaKind, path: PathBuf },
    Empty { kind: MediaKind, path: PathBuf },
}

impl fmt::Display for DatasetIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetIssue::MissingFolder { kind, path } => {
                write!(f, "{} dataset folder not found: {}", kind.label(), path.display())
            }
            DatasetIssue::Empty { kind, path } => {
                write!(f, "No {} found in: {}", kind.plural(), path.display())
            }
        }
    }
}

/// Media found in one dataset folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderCount {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub count: usize,
}

impl FolderCount {
    pub fn summary(&self) -> String {
        format!("Found {} {}", self.count, self.kind.plural())
    }
}

/// Outcome of checking the dataset folders
#[derive(Debug, Clone, Default)]
pub struct DatasetReport {
    pub found: Vec<FolderCount>,
    pub issues: Vec<DatasetIssue>,
}

impl DatasetReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Folders that hold at least one usable file
    pub fn dataset_dirs(&self) -> Vec<PathBuf> {
        self.found.iter().map(|f| f.path.clone()).collect()
    }
}

/// Count files in `dir` whose extension matches `kind`, case-insensitively.
/// Not recursive; subdirectories are ignored.
pub fn count_media(dir: &Path, kind: MediaKind) -> Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| kind.extensions().contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if matches {
            count += 1;
        }
    }
    Ok(count)
}

/// Folders to inspect for a caption mode and model kind
fn folders_to_check(
    mode: CaptionMode,
    model_kind: ModelKind,
    image_dir: &Path,
    video_dir: &Path,
) -> Vec<(MediaKind, PathBuf)> {
    match mode {
        CaptionMode::Images => vec![(MediaKind::Image, image_dir.to_path_buf())],
        CaptionMode::Videos => vec![(MediaKind::Video, video_dir.to_path_buf())],
        CaptionMode::Both => vec![
            (MediaKind::Image, image_dir.to_path_buf()),
            (MediaKind::Video, video_dir.to_path_buf()),
        ],
        CaptionMode::Skip => match model_kind {
            ModelKind::Image => vec![(MediaKind::Image, image_dir.to_path_buf())],
            // Video models also train on still images.
            ModelKind::Video if !video_dir.exists() && image_dir.exists() => {
                vec![(MediaKind::Image, image_dir.to_path_buf())]
            }
            ModelKind::Video => vec![(MediaKind::Video, video_dir.to_path_buf())],
        },
    }
}

/// Check the dataset folders implied by `mode` and the model kind
pub fn validate_dataset(
    mode: CaptionMode,
    model_kind: ModelKind,
    config: &HelperConfig,
) -> Result<DatasetReport> {
    validate_dirs(
        mode,
        model_kind,
        &config.image_dataset_dir(),
        &config.video_dataset_dir(),
    )
}

pub fn validate_dirs(
    mode: CaptionMode,
    model_kind: ModelKind,
    image_dir: &Path,
    video_dir: &Path,
) -> Result<DatasetReport> {
    let mut report = DatasetReport::default();

    for (kind, path) in folders_to_check(mode, model_kind, image_dir, video_dir) {
        if !path.is_dir() {
            report.issues.push(DatasetIssue::MissingFolder { kind, path });
            continue;
        }
        let count = count_media(&path, kind)?;
        debug!("{:?}: {} {}", path, count, kind.plural());
        if count == 0 {
            report.issues.push(DatasetIssue::Empty { kind, path });
        } else {
            report.found.push(FolderCount { kind, path, count });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_caption_mode_menu() {
        assert_eq!(CaptionMode::from_menu_index(4).unwrap(), CaptionMode::Skip);
        assert_eq!("both".parse::<CaptionMode>().unwrap(), CaptionMode::Both);
        assert_eq!("1".parse::<CaptionMode>().unwrap(), CaptionMode::Images);
        assert!("5".parse::<CaptionMode>().is_err());
        assert_eq!(CaptionMode::default(), CaptionMode::Skip);
    }

    #[test]
    fn test_counts_by_extension_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.JPG");
        touch(tmp.path(), "b.png");
        touch(tmp.path(), "b.txt");
        touch(tmp.path(), "clip.mov");
        fs::create_dir(tmp.path().join("nested.png")).unwrap();

        assert_eq!(count_media(tmp.path(), MediaKind::Image).unwrap(), 2);
        assert_eq!(count_media(tmp.path(), MediaKind::Video).unwrap(), 1);
    }

    #[test]
    fn test_missing_and_empty_folders_are_issues() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        let videos = tmp.path().join("videos");
        fs::create_dir(&images).unwrap();
        touch(&images, "only_captions.txt");

        let report = validate_dirs(CaptionMode::Both, ModelKind::Image, &images, &videos).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.issues.len(), 2);
        assert!(matches!(report.issues[0], DatasetIssue::Empty { kind: MediaKind::Image, .. }));
        assert!(matches!(
            report.issues[1],
            DatasetIssue::MissingFolder { kind: MediaKind::Video, .. }
        ));
        assert_eq!(
            report.issues[1].to_string(),
            format!("Video dataset folder not found: {}", videos.display())
        );
    }

    #[test]
    fn test_skip_checks_folder_for_model_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        let videos = tmp.path().join("videos");
        fs::create_dir(&images).unwrap();
        touch(&images, "1.jpeg");

        let report = validate_dirs(CaptionMode::Skip, ModelKind::Image, &images, &videos).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.found[0].summary(), "Found 1 images");

        // Video model without a video folder falls back to the image folder.
        let report = validate_dirs(CaptionMode::Skip, ModelKind::Video, &images, &videos).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.dataset_dirs(), vec![images.clone()]);

        fs::create_dir(&videos).unwrap();
        let report = validate_dirs(CaptionMode::Skip, ModelKind::Video, &images, &videos).unwrap();
        assert!(matches!(report.issues[0], DatasetIssue::Empty { kind: MediaKind::Video, .. }));
    }
}
