use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Instant;
use tracing::{debug, info};

use super::clip::ClipEmbedder;
use super::resnet::ResNetEmbedder;
use super::siglip::SigLipEmbedder;
use super::{DevicePreference, ImageEmbedder, ModelKind};

/// Builds a ready-to-use embedder for a model kind.
pub trait ModelLoader: Send + Sync {
    fn load(&self, kind: ModelKind) -> Result<Arc<dyn ImageEmbedder>>;
}

/// Downloads weights from the Hugging Face hub (or reuses the local hub
/// cache) and instantiates the candle model.
pub struct HubLoader {
    device: DevicePreference,
}

impl HubLoader {
    pub fn new(device: DevicePreference) -> Self {
        Self { device }
    }
}

impl ModelLoader for HubLoader {
    fn load(&self, kind: ModelKind) -> Result<Arc<dyn ImageEmbedder>> {
        let device = self.device.resolve()?;
        let api = Api::new().context("initialising Hugging Face hub client")?;
        let model: Arc<dyn ImageEmbedder> = match kind {
            ModelKind::ResNet => Arc::new(ResNetEmbedder::load(&api, &device)?),
            ModelKind::Clip => Arc::new(ClipEmbedder::load(&api, &device)?),
            ModelKind::SigLip => Arc::new(SigLipEmbedder::load(&api, &device)?),
        };
        Ok(model)
    }
}

/// One kind's model, empty until its first successful load.
type Slot = Arc<Mutex<Option<Arc<dyn ImageEmbedder>>>>;

/// Process-wide model cache. Each kind is loaded at most once; later
/// requests share the same instance.
pub struct ModelRegistry {
    loader: Box<dyn ModelLoader>,
    slots: Mutex<HashMap<ModelKind, Slot>>,
}

impl ModelRegistry {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(device: DevicePreference) -> Self {
        Self::new(HubLoader::new(device))
    }

    /// Return the cached model, loading it on first use. Only the kind's own
    /// slot stays locked during the load, so concurrent callers never load
    /// the same weights twice while other kinds stay available.
    pub fn get(&self, kind: ModelKind) -> Result<Arc<dyn ImageEmbedder>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(kind).or_default())
        };
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = current.as_ref() {
            debug!(model = %kind, "model cache hit");
            return Ok(Arc::clone(model));
        }

        info!(model = %kind, "loading model");
        let started = Instant::now();
        let model = self
            .loader
            .load(kind)
            .with_context(|| format!("loading model {kind}"))?;
        info!(
            model = %kind,
            dimensions = model.dimensions(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model ready"
        );
        *current = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Kinds currently resident in memory. Never waits: a kind whose load
    /// is still running counts as not loaded.
    pub fn loaded(&self) -> Vec<ModelKind> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut kinds: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| match slot.try_lock() {
                Ok(model) => model.is_some(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
                Err(TryLockError::WouldBlock) => false,
            })
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
