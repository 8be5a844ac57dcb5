use anyhow::Result;
use ignore::{DirEntry, WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

pub struct WalkConfig {
    pub max_threads: usize,
    /// Max file size in bytes to consider (skip huge files)
    pub max_file_size: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_threads: 2,
            max_file_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff"];

/// Recursively collect image files under `root`, sorted by path.
///
/// The walk runs on `max_threads` threads. Ignore files are not honoured (an
/// image folder is not a repository), but hidden entries are skipped, which
/// also keeps our own `.constellate` directory out of the scan.
pub fn walk_images(root: &Path, config: &WalkConfig) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel::<Result<PathBuf, ignore::Error>>();
    let max_file_size = config.max_file_size;

    WalkBuilder::new(root)
        .threads(config.max_threads)
        .standard_filters(false)
        .hidden(true)
        .build_parallel()
        .run(|| {
            let tx = tx.clone();
            Box::new(move |entry: Result<DirEntry, ignore::Error>| {
                match entry {
                    Ok(entry) => {
                        if wanted(&entry, max_file_size) {
                            let _ = tx.send(Ok(entry.into_path()));
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                    }
                }
                WalkState::Continue
            })
        });
    drop(tx);

    let mut files = rx.into_iter().collect::<Result<Vec<_>, _>>()?;
    files.sort();
    Ok(files)
}

fn wanted(entry: &DirEntry, max_file_size: u64) -> bool {
    if !entry.file_type().is_some_and(|ft| ft.is_file()) || !is_image(entry.path()) {
        return false;
    }
    entry.metadata().map_or(true, |meta| meta.len() <= max_file_size)
}

/// Whether the extension is one we try to decode.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// MIME type for a data URI. Unknown extensions are served as JPEG.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        _ => "image/jpeg",
    }
}
