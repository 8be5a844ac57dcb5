use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::convert::Infallible;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use super::api::*;
use super::browse;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::embed::ModelKind;
use crate::export::{self, EXPORT_FILENAME};
use crate::pipeline::{self, Event, MapRequest};
use crate::scan::mime_type;
use crate::store::{CacheStats, Store};

const INDEX_HTML: &str = include_str!("../../static/index.html");
const APP_JS: &str = include_str!("../../static/app.js");

/// Events buffered between the pipeline thread and the HTTP body.
const STREAM_BUFFER: usize = 64;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APP_JS)
}

pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let loaded = state.registry.loaded();
    Json(ModelsResponse {
        models: ModelKind::ALL
            .iter()
            .map(|&kind| ModelInfo {
                name: kind,
                dimensions: kind.dimensions(),
                loaded: loaded.contains(&kind),
            })
            .collect(),
        default_model: state.config.embed.model,
    })
}

pub async fn browse(Json(req): Json<BrowseRequest>) -> ApiResult<Json<browse::Listing>> {
    let path = match req.path.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => browse::default_start(),
    };
    let listing = tokio::task::spawn_blocking(move || browse::list_directory(&path))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    Ok(Json(listing))
}

/// Stream the mapping run as NDJSON. The pipeline runs on a blocking thread;
/// every outcome, including failure, ends the stream with one final event.
pub async fn load_images(
    State(state): State<AppState>,
    Json(req): Json<LoadImagesRequest>,
) -> Response {
    let request = MapRequest {
        folder_path: req.folder_path.unwrap_or_default(),
        model: req
            .model
            .as_deref()
            .map(ModelKind::parse_lenient)
            .unwrap_or(state.config.embed.model),
    };
    let ctx = state.map_context();
    let session = state.session.clone();
    let (tx, rx) = mpsc::channel::<Event>(STREAM_BUFFER);

    tokio::task::spawn_blocking(move || {
        // A closed channel means the client went away; the run still
        // finishes so its embeddings land in the cache.
        let mut send = |event: Event| {
            let _ = tx.blocking_send(event);
        };
        match pipeline::map_folder(&request, &ctx, &mut send) {
            Ok(exploration) => {
                session.publish(exploration.clone());
                send(Event::Result { data: exploration });
            }
            Err(e) => {
                error!(folder = %request.folder_path, "load failed: {e:#}");
                send(Event::Error {
                    message: format!("{e:#}"),
                });
            }
        }
    });

    let body = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.to_line()));
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response()
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<usize>,
) -> ApiResult<Json<ImageResponse>> {
    let path = state
        .session
        .image_path(id)
        .ok_or_else(|| ApiError::bad_request("Invalid image ID"))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("reading {}: {e}", path.display())))?;

    Ok(Json(ImageResponse {
        image: format!("data:{};base64,{}", mime_type(&path), STANDARD.encode(bytes)),
        filename: path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }))
}

pub async fn export_labels(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Json<ExportResponse> {
    let rows = export::label_rows(&state.session.image_paths(), &req.polygons);
    info!(rows = rows.len(), polygons = req.polygons.len(), "exporting labels");
    Json(ExportResponse {
        csv: export::to_csv(&rows),
        filename: EXPORT_FILENAME.to_string(),
    })
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let storage_dir = state.config.storage_dir(&state.root);
    let cache = tokio::task::spawn_blocking(move || -> anyhow::Result<CacheStats> {
        match Store::open_if_exists(&storage_dir)? {
            Some(store) => store.stats(&storage_dir),
            None => Ok(CacheStats::empty()),
        }
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    let exploration = state.session.current().map(|e| ExplorationSummary {
        folder_path: e.folder_path,
        model: e.model,
        total_images: e.total_images,
        connections: e.connections.len(),
    });

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").into(),
        cache,
        loaded_models: state.registry.loaded(),
        exploration,
    }))
}
