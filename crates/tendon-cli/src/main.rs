//! Tendon - Main entry point
//!
//! Loads a robot description from a parameter store, assembles its scene
//! subtree and prints the resulting tree.

mod config;
mod tree;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tendon_client::{FileParamStore, HttpParamStore, LoaderConfig, ModelLoader, ParamStore};
use tendon_scene::{SceneNode, StandardMeshLoader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{Config, StoreKind};

#[derive(Parser, Debug)]
#[command(name = "tendon")]
#[command(about = "Load a robot description and print its scene tree")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tendon.toml")]
    config: PathBuf,

    /// Parameter holding the robot description
    #[arg(short, long)]
    param: Option<String>,

    /// Load the model without attaching it to the scene root
    #[arg(long)]
    hidden: bool,

    /// Print the tree as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write a default configuration file and exit
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the tree, logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Tendon v{}", env!("CARGO_PKG_VERSION"));

    if args.init {
        config::save_default_config(&args.config)?;
        println!("Wrote {}", args.config.display());
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;
    if let Some(param) = args.param {
        config.model.param = param;
    }
    if args.hidden {
        config.model.hidden = true;
    }

    info!(
        store = ?config.store.kind,
        param = %config.model.param,
        path = %config.model.path,
        "Configuration loaded"
    );

    let loader = ModelLoader::new(loader_config(&config)?);
    let model = match loader.loaded().await {
        Ok(model) => model,
        Err(e) => anyhow::bail!("Could not load '{}': {}", config.model.param, e),
    };

    let wait = Duration::from_secs(config.meshes.timeout_secs);
    match tokio::time::timeout(wait, loader.meshes_settled()).await {
        Ok(Some(progress)) => info!(
            loaded = progress.loaded,
            failed = progress.failed,
            "Meshes settled"
        ),
        Ok(None) => {}
        Err(_) => warn!(timeout_secs = config.meshes.timeout_secs, "Gave up waiting for meshes"),
    }

    // A hidden model is not under the root, so print it on its own
    let printed = if loader.is_attached() {
        loader.root().clone()
    } else {
        model
    };
    let snapshot = printed.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", tree::format_tree(&snapshot));
    }

    Ok(())
}

fn loader_config(config: &Config) -> Result<LoaderConfig> {
    let timeout = Duration::from_secs(config.store.timeout_secs);
    let store: Arc<dyn ParamStore> = match config.store.kind {
        StoreKind::Http => Arc::new(
            HttpParamStore::new(config.store.url.clone(), timeout)
                .context("Failed to create HTTP parameter store")?,
        ),
        StoreKind::File => Arc::new(FileParamStore::new(&config.store.dir)),
    };

    let meshes =
        StandardMeshLoader::with_timeout(Duration::from_secs(config.meshes.http_timeout_secs))
            .context("Failed to create mesh loader")?;

    let mut loader = LoaderConfig::new(store)
        .with_param(config.model.param.clone())
        .hidden(config.model.hidden)
        .with_path(config.model.path.clone())
        .with_frame_prefix(config.model.frame_prefix.clone())
        .with_root(SceneNode::new("scene"))
        .with_mesh_loader(Arc::new(meshes));
    if let Some(color) = config.model.color {
        loader = loader.with_color(color);
    }
    Ok(loader)
}
