//! Server-side folder picker: the UI walks the filesystem through this
//! instead of a native dialog, which a headless server cannot open.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::scan::is_image;

#[derive(Debug, Serialize)]
pub struct Listing {
    pub path: String,
    pub parent: Option<String>,
    pub directories: Vec<String>,
    /// Images directly inside `path` (not recursive).
    pub image_count: usize,
}

/// Directory to show when the UI has not picked one yet.
pub fn default_start() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}

/// List visible subdirectories of `path`, sorted by name.
pub fn list_directory(path: &Path) -> Result<Listing> {
    let path = path
        .canonicalize()
        .with_context(|| format!("resolving path {}", path.display()))?;
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }

    let mut directories = Vec::new();
    let mut image_count = 0;
    let entries =
        std::fs::read_dir(&path).with_context(|| format!("reading {}", path.display()))?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            directories.push(name);
        } else if file_type.is_file() && is_image(&entry.path()) {
            image_count += 1;
        }
    }
    directories.sort_by_key(|d| d.to_lowercase());

    Ok(Listing {
        parent: path.parent().map(|p| p.display().to_string()),
        path: path.display().to_string(),
        directories,
        image_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_visible_subdirectories_and_counts_images() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir(root.join("Zebras")).unwrap();
        std::fs::create_dir(root.join("apples")).unwrap();
        std::fs::create_dir(root.join(".hidden")).unwrap();
        std::fs::write(root.join("one.png"), b"").unwrap();
        std::fs::write(root.join("two.JPG"), b"").unwrap();
        std::fs::write(root.join("notes.md"), b"").unwrap();
        std::fs::write(root.join("apples/deep.png"), b"").unwrap();

        let listing = list_directory(root).unwrap();
        assert_eq!(listing.directories, vec!["apples", "Zebras"]);
        assert_eq!(listing.image_count, 2);
        assert_eq!(
            listing.parent.as_deref(),
            root.canonicalize().unwrap().parent().map(|p| p.display().to_string()).as_deref()
        );
    }

    #[test]
    fn rejects_files_and_missing_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.png");
        std::fs::write(&file, b"").unwrap();
        assert!(list_directory(&file).is_err());
        assert!(list_directory(&tmp.path().join("missing")).is_err());
    }
}
