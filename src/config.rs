use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embed::{DevicePreference, ModelKind};

const STORAGE_DIR: &str = ".constellate";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub resources: ResourceConfig,
    pub embed: EmbedConfig,
    pub map: MapConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the embedding cache lives (default: .constellate inside the config root)
    pub path: Option<PathBuf>,
    /// Reuse embeddings for unchanged files across runs
    pub cache_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Max threads for directory walking (0 = half available cores)
    pub max_threads: usize,
    /// Files larger than this are not considered images worth decoding
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub model: ModelKind,
    pub device: DevicePreference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Neighbour links drawn per point, not counting the point itself
    pub neighbors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            cache_enabled: true,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            max_threads: (num_cpus / 2).max(1),
            max_file_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::ResNet,
            device: DevicePreference::Auto,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { neighbors: 10 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

impl Config {
    /// Load config from a .constellate/config.toml file, falling back to defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(STORAGE_DIR).join("config.toml");
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading config from {}", config_path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("parsing config from {}", config_path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the actual storage directory path.
    pub fn storage_dir(&self, root: &Path) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| root.join(STORAGE_DIR))
    }

    /// Effective thread count, resolving 0 to a sensible default.
    pub fn effective_threads(&self) -> usize {
        if self.resources.max_threads == 0 {
            let num_cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            (num_cpus / 2).max(1)
        } else {
            self.resources.max_threads
        }
    }

    /// Write current config to disk (for `constellate init`).
    pub fn save(&self, root: &Path) -> Result<PathBuf> {
        let dir = root.join(STORAGE_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating storage dir {}", dir.display()))?;
        let config_path = dir.join("config.toml");
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("writing config to {}", config_path.display()))?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.map.neighbors, 10);
        assert_eq!(config.embed.model, ModelKind::ResNet);
        assert!(config.storage.cache_enabled);
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.embed.model = ModelKind::Clip;
        config.server.port = 8080;
        let path = config.save(tmp.path()).unwrap();
        assert!(path.ends_with(".constellate/config.toml"));

        let loaded = Config::load(tmp.path()).unwrap();
        assert_eq!(loaded.embed.model, ModelKind::Clip);
        assert_eq!(loaded.server.port, 8080);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(STORAGE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[embed]\nmodel = \"siglip\"\n").unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.embed.model, ModelKind::SigLip);
        assert_eq!(config.embed.device, DevicePreference::Auto);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn bad_toml_mentions_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(STORAGE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[map\nneighbors = ").unwrap();

        let err = Config::load(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn explicit_storage_path_wins() {
        let mut config = Config::default();
        assert_eq!(
            config.storage_dir(Path::new("/data")),
            PathBuf::from("/data/.constellate")
        );
        config.storage.path = Some(PathBuf::from("/var/cache/constellate"));
        assert_eq!(
            config.storage_dir(Path::new("/data")),
            PathBuf::from("/var/cache/constellate")
        );
    }

    #[test]
    fn zero_threads_resolves() {
        let mut config = Config::default();
        config.resources.max_threads = 0;
        assert!(config.effective_threads() >= 1);
        config.resources.max_threads = 3;
        assert_eq!(config.effective_threads(), 3);
    }
}
