//! Folder → embeddings → 2-D layout → neighbour links.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embed::{self, Embedding, ImageEmbedder, ModelKind, ModelRegistry};
use crate::reduce::{self, Connection};
use crate::scan::{self, WalkConfig};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct MapRequest {
    pub folder_path: String,
    pub model: ModelKind,
}

/// One line of the loading stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Progress { value: u8, message: String },
    Result { data: Exploration },
    Error { message: String },
}

impl Event {
    pub fn progress(value: u8, message: impl Into<String>) -> Self {
        Event::Progress {
            value,
            message: message.into(),
        }
    }

    /// Serialise as a single NDJSON line, newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
        });
        line.push('\n');
        line
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub filename: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exploration {
    pub points: Vec<Point>,
    pub connections: Vec<Connection>,
    pub total_images: usize,
    pub folder_path: String,
    pub model: ModelKind,
}

/// Everything a run needs besides the request itself.
pub struct MapContext {
    pub registry: Arc<ModelRegistry>,
    pub walk: WalkConfig,
    /// Where the embedding cache lives; None disables caching.
    pub cache_dir: Option<PathBuf>,
    pub neighbors: usize,
}

impl MapContext {
    pub fn from_config(config: &Config, root: &Path, registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            walk: WalkConfig {
                max_threads: config.effective_threads(),
                max_file_size: config.resources.max_file_size,
            },
            cache_dir: config
                .storage
                .cache_enabled
                .then(|| config.storage_dir(root)),
            neighbors: config.map.neighbors,
        }
    }
}

/// Run the whole mapping pipeline, reporting progress through `on_event`.
///
/// Images that fail to decode or embed are skipped. The run fails with
/// "Invalid folder path", "No images found" or "Not enough valid images"
/// when there is nothing to lay out; the caller turns errors into events.
pub fn map_folder(
    request: &MapRequest,
    ctx: &MapContext,
    on_event: &mut dyn FnMut(Event),
) -> Result<Exploration> {
    let root = Path::new(&request.folder_path);
    if request.folder_path.trim().is_empty() || !root.is_dir() {
        bail!("Invalid folder path");
    }

    let started = Instant::now();
    let files = scan::walk_images(root, &ctx.walk)?;
    if files.is_empty() {
        bail!("No images found");
    }
    let total = files.len();
    info!(folder = %root.display(), images = total, model = %request.model, "mapping folder");
    on_event(Event::progress(0, format!("Found {total} images")));

    on_event(Event::progress(5, format!("Loading model {}...", request.model)));
    let embedder = ctx.registry.get(request.model)?;
    let cache = ctx.cache_dir.as_deref().and_then(|dir| match Store::open(dir) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("embedding cache unavailable, continuing without it: {e:#}");
            None
        }
    });

    let mut embeddings: Vec<Embedding> = Vec::with_capacity(total);
    let mut valid_paths: Vec<PathBuf> = Vec::with_capacity(total);
    let mut cache_hits = 0usize;

    for (i, path) in files.iter().enumerate() {
        if i % 2 == 0 || i == total - 1 {
            on_event(Event::progress(
                progress_value(i, total),
                format!("Processing {} ({}/{total})...", file_name(path), i + 1),
            ));
        }

        match embed_file(path, embedder.as_ref(), cache.as_ref()) {
            Ok((embedding, from_cache)) => {
                cache_hits += from_cache as usize;
                embeddings.push(embedding);
                valid_paths.push(path.clone());
            }
            Err(e) => warn!(path = %path.display(), "skipping image: {e:#}"),
        }
    }
    debug!(embedded = embeddings.len(), cache_hits, "embedding pass done");

    if embeddings.len() < 2 {
        bail!("Not enough valid images");
    }

    on_event(Event::progress(90, "Applying dimensionality reduction..."));
    let projection = reduce::pca(&embeddings, 2)?;
    debug!(ratio = ?projection.explained_variance_ratio, "explained variance");

    on_event(Event::progress(95, "Finding neighbors..."));
    let neighbors = reduce::nearest_neighbors(&projection.coords, ctx.neighbors);
    let connections = reduce::connections(&neighbors);

    let points: Vec<Point> = valid_paths
        .iter()
        .zip(&projection.coords)
        .enumerate()
        .map(|(id, (path, coord))| Point {
            id,
            x: coord[0],
            y: coord[1],
            filename: file_name(path),
            path: path.display().to_string(),
        })
        .collect();

    info!(
        images = points.len(),
        skipped = total - points.len(),
        cache_hits,
        links = connections.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "folder mapped"
    );

    Ok(Exploration {
        total_images: points.len(),
        points,
        connections,
        folder_path: request.folder_path.clone(),
        model: request.model,
    })
}

/// Embedding progress occupies 10..90 of the bar.
fn progress_value(index: usize, total: usize) -> u8 {
    (10 + index * 80 / total.max(1)) as u8
}

/// Embed one file, consulting the cache first. Returns whether it was a hit.
fn embed_file(
    path: &Path,
    embedder: &dyn ImageEmbedder,
    cache: Option<&Store>,
) -> Result<(Embedding, bool)> {
    let Some(store) = cache else {
        let image = embed::load_rgb(path)?;
        return Ok((embedder.embed(&image)?, false));
    };

    let hash = scan::hash_file(path)?;
    if let Some(hit) = store.get_embedding(&hash, embedder.model_name())? {
        return Ok((hit, true));
    }

    let image = embed::load_rgb(path)?;
    let embedding = embedder.embed(&image)?;
    if let Err(e) = store.put_embedding(&hash, embedder.model_name(), &embedding) {
        warn!(path = %path.display(), "could not cache embedding: {e:#}");
    }
    Ok((embedding, false))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::FakeLoader;
    use crate::samples;
    use std::sync::atomic::Ordering;

    struct Harness {
        ctx: MapContext,
        embeds: Arc<std::sync::atomic::AtomicUsize>,
        _cache: tempfile::TempDir,
    }

    fn harness(neighbors: usize) -> Harness {
        let loader = FakeLoader::new();
        let embeds = Arc::clone(&loader.embeds);
        let cache = tempfile::tempdir().unwrap();
        Harness {
            ctx: MapContext {
                registry: Arc::new(ModelRegistry::new(loader)),
                walk: WalkConfig::default(),
                cache_dir: Some(cache.path().to_path_buf()),
                neighbors,
            },
            embeds,
            _cache: cache,
        }
    }

    fn request(folder: &Path) -> MapRequest {
        MapRequest {
            folder_path: folder.display().to_string(),
            model: ModelKind::ResNet,
        }
    }

    fn run(req: &MapRequest, ctx: &MapContext) -> (Result<Exploration>, Vec<Event>) {
        let mut events = Vec::new();
        let result = map_folder(req, ctx, &mut |e| events.push(e));
        (result, events)
    }

    fn progress_values(events: &[Event]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Progress { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn maps_a_generated_folder() {
        let images = tempfile::tempdir().unwrap();
        samples::generate(images.path(), 3, 7).unwrap();
        let h = harness(4);

        let (result, events) = run(&request(images.path()), &h.ctx);
        let exploration = result.unwrap();

        assert_eq!(exploration.total_images, 9);
        assert_eq!(exploration.points.len(), 9);
        assert_eq!(exploration.connections.len(), 9 * 4);
        assert!(exploration.points.iter().enumerate().all(|(i, p)| p.id == i));
        assert!(exploration.points.iter().all(|p| p.filename.ends_with(".png")));
        assert!(exploration
            .connections
            .iter()
            .all(|c| c.source != c.target && c.target < 9));

        let values = progress_values(&events);
        assert_eq!(&values[..2], &[0, 5]);
        assert_eq!(&values[values.len() - 2..], &[90, 95]);
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        // Even indices 0,2,4,6,8 of nine images.
        assert_eq!(values.len(), 2 + 5 + 2);
        match &events[0] {
            Event::Progress { message, .. } => assert_eq!(message, "Found 9 images"),
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[test]
    fn second_run_is_served_from_cache() {
        let images = tempfile::tempdir().unwrap();
        samples::generate(images.path(), 2, 1).unwrap();
        let h = harness(10);

        run(&request(images.path()), &h.ctx).0.unwrap();
        assert_eq!(h.embeds.load(Ordering::SeqCst), 6);

        let again = run(&request(images.path()), &h.ctx).0.unwrap();
        assert_eq!(h.embeds.load(Ordering::SeqCst), 6);
        assert_eq!(again.total_images, 6);
        // Five neighbours each once k is clamped to n - 1.
        assert_eq!(again.connections.len(), 6 * 5);
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let images = tempfile::tempdir().unwrap();
        samples::generate(images.path(), 1, 3).unwrap();
        std::fs::write(images.path().join("zz_corrupt.png"), b"garbage").unwrap();
        let mut h = harness(10);
        h.ctx.cache_dir = None;

        let exploration = run(&request(images.path()), &h.ctx).0.unwrap();
        assert_eq!(exploration.total_images, 3);
        assert!(exploration.points.iter().all(|p| p.filename != "zz_corrupt.png"));
    }

    #[test]
    fn failure_messages() {
        let h = harness(10);

        let missing = MapRequest {
            folder_path: "/definitely/not/here".into(),
            model: ModelKind::Clip,
        };
        let (result, events) = run(&missing, &h.ctx);
        assert_eq!(result.unwrap_err().to_string(), "Invalid folder path");
        assert!(events.is_empty());

        let empty = tempfile::tempdir().unwrap();
        std::fs::write(empty.path().join("readme.txt"), "no pictures").unwrap();
        let (result, _) = run(&request(empty.path()), &h.ctx);
        assert_eq!(result.unwrap_err().to_string(), "No images found");

        let single = tempfile::tempdir().unwrap();
        image::RgbImage::new(8, 8).save(single.path().join("only.png")).unwrap();
        std::fs::write(single.path().join("bad.jpg"), b"nope").unwrap();
        let (result, _) = run(&request(single.path()), &h.ctx);
        assert_eq!(result.unwrap_err().to_string(), "Not enough valid images");
    }

    #[test]
    fn model_load_failure_is_reported() {
        let images = tempfile::tempdir().unwrap();
        samples::generate(images.path(), 1, 3).unwrap();
        let ctx = MapContext {
            registry: Arc::new(ModelRegistry::new(FakeLoader::failing())),
            walk: WalkConfig::default(),
            cache_dir: None,
            neighbors: 10,
        };
        let (result, events) = run(&request(images.path()), &ctx);
        assert!(format!("{:#}", result.unwrap_err()).contains("loading model resnet"));
        assert_eq!(progress_values(&events), vec![0, 5]);
    }

    #[test]
    fn progress_formula() {
        assert_eq!(progress_value(0, 60), 10);
        assert_eq!(progress_value(59, 60), 88);
        assert_eq!(progress_value(1, 2), 50);
    }

    #[test]
    fn events_serialize_as_tagged_lines() {
        let line = Event::progress(42, "Working").to_line();
        assert_eq!(line, "{\"type\":\"progress\",\"value\":42,\"message\":\"Working\"}\n");

        let line = Event::Error {
            message: "No images found".into(),
        }
        .to_line();
        let v: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["message"], "No images found");
    }
}
