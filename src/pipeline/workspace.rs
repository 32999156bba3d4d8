use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;

// @module: Working directory layout

static SCENE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^scene_(\d{3,})\.[A-Za-z0-9]+$").unwrap());

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCENES_FILE: &str = "scenes.json";
pub const SUBTITLES_FILE: &str = "subtitles.srt";
pub const IMAGE_EXTENSION: &str = "png";
pub const DEFAULT_VIDEO_FILE: &str = "output.mp4";

/// Working directory of one pipeline run.
///
/// Per-scene artifacts are named `scene_{index:03}.{ext}` so that a plain
/// lexicographic sort matches scene order.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Use `root`, creating it if needed
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        FileManager::ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scene_file_name(index: usize, extension: &str) -> String {
        format!("scene_{:03}.{}", index, extension.trim_start_matches('.'))
    }

    pub fn audio_path(&self, index: usize, extension: &str) -> PathBuf {
        self.root.join(Self::scene_file_name(index, extension))
    }

    pub fn image_path(&self, index: usize) -> PathBuf {
        self.root.join(Self::scene_file_name(index, IMAGE_EXTENSION))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn scenes_path(&self) -> PathBuf {
        self.root.join(SCENES_FILE)
    }

    pub fn subtitles_path(&self) -> PathBuf {
        self.root.join(SUBTITLES_FILE)
    }

    pub fn default_video_path(&self) -> PathBuf {
        self.root.join(DEFAULT_VIDEO_FILE)
    }

    /// Resolve a manifest-relative file name
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Manifest-relative name of a path inside the working directory
    pub fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    pub fn exists(&self, file: &str) -> bool {
        FileManager::file_exists(self.resolve(file))
    }

    /// Scene artifacts whose index is at or beyond `scene_count`
    pub fn orphaned_scene_files(&self, scene_count: usize, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut orphans = Vec::new();
        for extension in extensions {
            for path in FileManager::find_files(&self.root, extension)? {
                let index = path
                    .file_name()
                    .and_then(|name| SCENE_FILE.captures(&name.to_string_lossy()).map(|c| c[1].to_string()))
                    .and_then(|digits| digits.parse::<usize>().ok());
                if matches!(index, Some(i) if i >= scene_count) {
                    orphans.push(path);
                }
            }
        }
        orphans.sort();
        Ok(orphans)
    }
}
