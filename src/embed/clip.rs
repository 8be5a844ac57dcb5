use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::RgbImage;

use super::preprocess::Preprocess;
use super::{Embedding, ImageEmbedder, ModelKind};

const REPO: &str = "openai/clip-vit-base-patch32";
// The main branch only ships pytorch_model.bin; this ref carries safetensors.
const REVISION: &str = "refs/pr/15";
const WEIGHTS: &str = "model.safetensors";

pub struct ClipEmbedder {
    model: ClipModel,
    device: Device,
    preprocess: Preprocess,
}

impl ClipEmbedder {
    pub fn load(api: &Api, device: &Device) -> Result<Self> {
        let repo = api.repo(Repo::with_revision(
            REPO.to_string(),
            RepoType::Model,
            REVISION.to_string(),
        ));
        let weights = repo
            .get(WEIGHTS)
            .with_context(|| format!("fetching {REPO}/{WEIGHTS}"))?;
        let config = ClipConfig::vit_base_patch32();
        // SAFETY: see ResNetEmbedder::load.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };
        let model = ClipModel::new(vb, &config)?;
        Ok(Self {
            model,
            device: device.clone(),
            preprocess: Preprocess::clip(),
        })
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn embed(&self, image: &RgbImage) -> Result<Embedding> {
        let pixel_values = self.preprocess.tensor(image, &self.device)?;
        let features = self.model.get_image_features(&pixel_values)?;
        Ok(features.flatten_all()?.to_vec1::<f32>()?)
    }

    fn dimensions(&self) -> usize {
        ModelKind::Clip.dimensions()
    }

    fn model_name(&self) -> &str {
        ModelKind::Clip.model_id()
    }
}
