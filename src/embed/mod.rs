pub mod clip;
pub mod preprocess;
pub mod registry;
pub mod resnet;
pub mod siglip;

use anyhow::{Context, Result};
use candle_core::Device;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

pub use registry::{HubLoader, ModelLoader, ModelRegistry};

pub type Embedding = Vec<f32>;

pub trait ImageEmbedder: Send + Sync {
    fn embed(&self, image: &RgbImage) -> Result<Embedding>;
    fn dimensions(&self) -> usize;
    /// Stable identifier, also used as the cache key's model component.
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[value(name = "resnet")]
    ResNet,
    #[value(name = "clip")]
    Clip,
    #[value(name = "siglip")]
    SigLip,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::ResNet, ModelKind::Clip, ModelKind::SigLip];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::ResNet => "resnet",
            ModelKind::Clip => "clip",
            ModelKind::SigLip => "siglip",
        }
    }

    /// Parse a model name coming from the UI. Anything unrecognised maps to
    /// ResNet rather than failing the request.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "clip" => ModelKind::Clip,
            "siglip" => ModelKind::SigLip,
            _ => ModelKind::ResNet,
        }
    }

    /// Identifier of the concrete checkpoint; keys the embedding cache.
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelKind::ResNet => "resnet50",
            ModelKind::Clip => "clip-vit-base-patch32",
            ModelKind::SigLip => "siglip-base-patch16-224",
        }
    }

    /// Width of the feature vector each backbone produces.
    pub fn dimensions(&self) -> usize {
        match self {
            ModelKind::ResNet => 2048,
            ModelKind::Clip => 512,
            ModelKind::SigLip => 768,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda,
}

impl DevicePreference {
    pub fn resolve(&self) -> Result<Device> {
        let device = match self {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto => Device::cuda_if_available(0)?,
            DevicePreference::Cuda => {
                Device::new_cuda(0).context("CUDA requested but no usable GPU was found")?
            }
        };
        info!(
            device = if device.is_cuda() { "cuda" } else { "cpu" },
            "using device"
        );
        Ok(device)
    }
}

/// Decode an image file and convert it to 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    // Sniff the header: files in the wild often carry the wrong extension.
    let image = image::ImageReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(image.to_rgb8())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parse_falls_back_to_resnet() {
        assert_eq!(ModelKind::parse_lenient("clip"), ModelKind::Clip);
        assert_eq!(ModelKind::parse_lenient(" SigLIP "), ModelKind::SigLip);
        assert_eq!(ModelKind::parse_lenient("resnet"), ModelKind::ResNet);
        assert_eq!(ModelKind::parse_lenient("dinov2"), ModelKind::ResNet);
        assert_eq!(ModelKind::parse_lenient(""), ModelKind::ResNet);
    }

    #[test]
    fn serde_names_match_display() {
        for kind in ModelKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn cpu_preference_resolves_to_cpu() {
        let device = DevicePreference::Cpu.resolve().unwrap();
        assert!(!device.is_cuda());
    }

    #[test]
    fn load_rgb_converts_and_reports_bad_files() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("gray.png");
        image::GrayImage::from_pixel(4, 3, image::Luma([128])).save(&good).unwrap();
        let rgb = load_rgb(&good).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(0, 0).0, [128, 128, 128]);

        let bad = tmp.path().join("broken.png");
        std::fs::write(&bad, b"definitely not a png").unwrap();
        let err = load_rgb(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("broken.png"));
    }
}
