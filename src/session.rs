use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::pipeline::Exploration;

/// The most recent exploration, shared between the loading stream and the
/// endpoints that look images up by point id.
#[derive(Default)]
pub struct Session {
    current: RwLock<Option<Exploration>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was loaded before.
    pub fn publish(&self, exploration: Exploration) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(exploration);
    }

    pub fn current(&self) -> Option<Exploration> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn image_path(&self, id: usize) -> Option<PathBuf> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current
            .as_ref()
            .and_then(|e| e.points.get(id))
            .map(|p| PathBuf::from(&p.path))
    }

    /// Image paths in point-id order; empty before the first load.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current
            .as_ref()
            .map(|e| e.points.iter().map(|p| PathBuf::from(&p.path)).collect())
            .unwrap_or_default()
    }
}
