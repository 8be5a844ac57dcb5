use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use constellate::config::Config;
use constellate::embed::{ModelKind, ModelRegistry};
use constellate::pipeline::{self, Event, MapContext, MapRequest};
use constellate::samples::{self, DEFAULT_PER_SHAPE};
use constellate::server::{self, AppState};
use constellate::store::{CacheStats, Store};

#[derive(Parser)]
#[command(name = "constellate", version, about = "Map a folder of images by visual similarity")]
struct Cli {
    /// Directory holding .constellate/ (config and embedding cache)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web UI
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Model preselected in the UI
        #[arg(long, value_enum)]
        model: Option<ModelKind>,
    },
    /// Map a folder without the UI and print the exploration as JSON
    Map {
        /// Folder to scan recursively for images
        folder: PathBuf,
        #[arg(long, value_enum)]
        model: Option<ModelKind>,
        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show embedding cache statistics
    Status,
    /// Write a default .constellate/config.toml
    Init,
    /// Delete cached embeddings
    CacheClear {
        /// Only drop entries for this model
        #[arg(long, value_enum)]
        model: Option<ModelKind>,
    },
    /// Generate coloured circles, squares and triangles for trying the map out
    Samples {
        /// Output directory, created if missing
        dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PER_SHAPE)]
        per_shape: usize,
        /// Fixed seed for reproducible colours
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("constellate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = cli.root;

    match cli.command {
        Commands::Serve { host, port, model } => {
            let mut config = Config::load(&root)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(model) = model {
                config.embed.model = model;
            }
            let registry = ModelRegistry::hub(config.embed.device);
            let state = AppState::new(config, root, registry);

            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            runtime.block_on(server::serve(state))
        }
        Commands::Map {
            folder,
            model,
            output,
        } => {
            let config = Config::load(&root)?;
            map(&config, &root, &folder, model.unwrap_or(config.embed.model), output.as_deref())
        }
        Commands::Status => {
            let config = Config::load(&root)?;
            let dir = config.storage_dir(&root);
            let stats = match Store::open_if_exists(&dir)? {
                Some(store) => store.stats(&dir)?,
                None => CacheStats::empty(),
            };
            print_status(&dir, &stats);
            Ok(())
        }
        Commands::Init => {
            let path = Config::default().save(&root)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::CacheClear { model } => {
            let config = Config::load(&root)?;
            let dir = config.storage_dir(&root);
            let removed = match Store::open_if_exists(&dir)? {
                Some(store) => store.clear(model.map(|m| m.model_id()))?,
                None => 0,
            };
            println!("Removed {removed} cached embeddings");
            Ok(())
        }
        Commands::Samples {
            dir,
            per_shape,
            seed,
        } => {
            let seed = seed.unwrap_or_else(rand::random);
            let written = samples::generate(&dir, per_shape, seed)?;
            println!(
                "Generated {} images in {} (seed {seed})",
                written.len(),
                dir.display()
            );
            Ok(())
        }
    }
}

fn map(
    config: &Config,
    root: &Path,
    folder: &Path,
    model: ModelKind,
    output: Option<&Path>,
) -> Result<()> {
    let ctx = MapContext::from_config(config, root, Arc::new(ModelRegistry::hub(config.embed.device)));
    let request = MapRequest {
        folder_path: folder.display().to_string(),
        model,
    };

    let mut report = |event: Event| {
        if let Event::Progress { value, message } = event {
            eprintln!("[{value:>3}%] {message}");
        }
    };
    let exploration = pipeline::map_folder(&request, &ctx, &mut report)?;

    let json = serde_json::to_string_pretty(&exploration)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "Mapped {} images, wrote {}",
                exploration.total_images,
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn print_status(dir: &Path, stats: &CacheStats) {
    println!("constellate status");
    println!("  cache:   {}", dir.display());
    println!("  entries: {}", stats.entries);
    println!("  size:    {:.1} MB", stats.db_size_bytes as f64 / (1024.0 * 1024.0));
    for (model, count) in &stats.models {
        println!("    {model:<28} {count}");
    }
}
