//! Request and response bodies for the JSON API.

use serde::{Deserialize, Serialize};

use crate::embed::ModelKind;
use crate::export::Polygon;
use crate::store::CacheStats;

#[derive(Debug, Default, Deserialize)]
pub struct LoadImagesRequest {
    #[serde(default)]
    pub folder_path: Option<String>,
    /// Free-form model name; unknown names fall back to ResNet.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    /// `data:<mime>;base64,<bytes>`
    pub image: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub polygons: Vec<Polygon>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub csv: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseRequest {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: ModelKind,
    pub dimensions: usize,
    pub loaded: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    #[serde(rename = "default")]
    pub default_model: ModelKind,
}

#[derive(Debug, Serialize)]
pub struct ExplorationSummary {
    pub folder_path: String,
    pub model: ModelKind,
    pub total_images: usize,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub cache: CacheStats,
    pub loaded_models: Vec<ModelKind>,
    pub exploration: Option<ExplorationSummary>,
}
