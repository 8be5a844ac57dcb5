use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use hf_hub::api::sync::Api;
use image::RgbImage;

use super::preprocess::Preprocess;
use super::{Embedding, ImageEmbedder, ModelKind};

const REPO: &str = "lmz/candle-resnet";
const WEIGHTS: &str = "resnet50.safetensors";

/// ResNet-50 with the classifier head removed: the output is the
/// global-average-pooled 2048-d feature.
pub struct ResNetEmbedder {
    model: Func<'static>,
    device: Device,
    preprocess: Preprocess,
}

impl ResNetEmbedder {
    pub fn load(api: &Api, device: &Device) -> Result<Self> {
        let weights = api
            .model(REPO.to_string())
            .get(WEIGHTS)
            .with_context(|| format!("fetching {REPO}/{WEIGHTS}"))?;
        // SAFETY: the file is a downloaded safetensors blob in the hub cache,
        // not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };
        let model = resnet::resnet50_no_final_layer(vb)?;
        Ok(Self {
            model,
            device: device.clone(),
            preprocess: Preprocess::resnet(),
        })
    }
}

impl ImageEmbedder for ResNetEmbedder {
    fn embed(&self, image: &RgbImage) -> Result<Embedding> {
        let input = self.preprocess.tensor(image, &self.device)?;
        let features = input.apply(&self.model)?;
        Ok(features.flatten_all()?.to_vec1::<f32>()?)
    }

    fn dimensions(&self) -> usize {
        ModelKind::ResNet.dimensions()
    }

    fn model_name(&self) -> &str {
        ModelKind::ResNet.model_id()
    }
}
