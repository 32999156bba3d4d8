use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::scene::InputFormat;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }

    // @generates: Final video path next to the input, or inside output_dir
    pub fn generate_output_path<P1: AsRef<Path>>(
        input_file: P1,
        output_dir: Option<&Path>,
        extension: &str,
    ) -> PathBuf {
        let input_file = input_file.as_ref();
        let stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let file_name = format!("{}.{}", stem, extension.trim_start_matches('.'));

        match output_dir {
            Some(dir) => dir.join(file_name),
            None => input_file.with_file_name(file_name),
        }
    }

    /// Find files with a specific extension directly inside a directory
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let wanted = extension.trim_start_matches('.');
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).min_depth(1).max_depth(1) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            let matches = path
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
                .unwrap_or(false);
            if path.is_file() && matches {
                result.push(path.to_path_buf());
            }
        }

        result.sort();
        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file, replacing it in one step.
    ///
    /// The content goes to a temporary file in the same directory which is
    /// then renamed over the target, so readers never see a partial file.
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;
        tmp.write_all(content)
            .with_context(|| format!("Failed to write temporary file for {:?}", path))?;
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("Failed to move file into place: {:?}", path))?;
        Ok(())
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        Self::write_atomic(path, content.as_bytes())
    }

    /// Guess the input format from the file extension.
    ///
    /// Markdown files are storyboards, text files are plain prose. Anything
    /// else is left to content detection.
    pub fn detect_input_format<P: AsRef<Path>>(path: P) -> Option<InputFormat> {
        let ext = path.as_ref().extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(InputFormat::Storyboard),
            "txt" | "text" => Some(InputFormat::PlainText),
            _ => None,
        }
    }
}
