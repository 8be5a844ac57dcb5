use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::siglip;
use hf_hub::api::sync::Api;
use image::RgbImage;

use super::preprocess::Preprocess;
use super::{Embedding, ImageEmbedder, ModelKind};

const REPO: &str = "google/siglip-base-patch16-224";
const WEIGHTS: &str = "model.safetensors";

pub struct SigLipEmbedder {
    model: siglip::Model,
    device: Device,
    preprocess: Preprocess,
}

impl SigLipEmbedder {
    pub fn load(api: &Api, device: &Device) -> Result<Self> {
        let weights = api
            .model(REPO.to_string())
            .get(WEIGHTS)
            .with_context(|| format!("fetching {REPO}/{WEIGHTS}"))?;
        let config = siglip::Config::base_patch16_224();
        // SAFETY: see ResNetEmbedder::load.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };
        let model = siglip::Model::new(&config, vb)?;
        Ok(Self {
            model,
            device: device.clone(),
            preprocess: Preprocess::siglip(),
        })
    }
}

impl ImageEmbedder for SigLipEmbedder {
    fn embed(&self, image: &RgbImage) -> Result<Embedding> {
        let pixel_values = self.preprocess.tensor(image, &self.device)?;
        let features = self.model.get_image_features(&pixel_values)?;
        Ok(features.flatten_all()?.to_vec1::<f32>()?)
    }

    fn dimensions(&self) -> usize {
        ModelKind::SigLip.dimensions()
    }

    fn model_name(&self) -> &str {
        ModelKind::SigLip.model_id()
    }
}
