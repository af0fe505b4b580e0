//! folio-server: manuscript publishing service
//!
//! Startup order: configuration, tracing, root folder and database, external
//! service clients, then the HTTP server with graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use folio_common::config::{
    default_config_path, resolve_api_key, resolve_root_folder, RootLayout, TomlConfig,
    ROOT_FOLDER_ENV,
};
use folio_common::db::init_database;
use folio_server::identity::HttpIdentityProvider;
use folio_server::services::{HttpImageGenerator, HttpSpeechSynthesizer, PandocConverter};
use folio_server::storage::AssetStore;
use folio_server::{build_router, AppState, ServerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for folio-server
#[derive(Parser, Debug)]
#[command(name = "folio-server")]
#[command(about = "Manuscript publishing service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "FOLIO_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and generated assets
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(short, long, env = "FOLIO_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = TomlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("folio_server={level},folio_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Folio server (folio-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if config_path.exists() {
        info!("Config file: {}", config_path.display());
    } else {
        warn!("Config file not found at {}, using defaults", config_path.display());
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    let layout = RootLayout::new(root_folder);
    layout
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", layout.root.display());

    let db_path = layout.database_path();
    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready: {}", db_path.display());
            pool
        }
        Err(e) => {
            error!("Failed to open database {}: {}", db_path.display(), e);
            return Err(e.into());
        }
    };

    let assets_dir = layout.assets_dir();
    std::fs::create_dir_all(&assets_dir).context("Failed to create asset directory")?;

    if config.identity.url.trim().is_empty() {
        warn!("[identity] url not configured; authenticated endpoints will fail");
    }
    let identity = HttpIdentityProvider::new(
        config.identity.url.clone(),
        resolve_api_key("FOLIO_IDENTITY_API_KEY", config.identity.api_key.as_deref()),
    )
    .context("Failed to create identity client")?;

    let image_key = resolve_api_key("FOLIO_IMAGE_API_KEY", config.image_api.api_key.as_deref());
    if image_key.is_none() {
        warn!("Image API key not configured; image generation disabled");
    }
    let images = HttpImageGenerator::new(
        config.image_api.url.clone(),
        image_key,
        config.image_api.model.clone(),
    )
    .context("Failed to create image API client")?;

    let speech_key = resolve_api_key("FOLIO_SPEECH_API_KEY", config.speech_api.api_key.as_deref());
    if speech_key.is_none() {
        warn!("Speech API key not configured; narration disabled");
    }
    let speech = HttpSpeechSynthesizer::new(
        config.speech_api.url.clone(),
        speech_key,
        config.speech_api.model.clone(),
        config.speech_api.voice.clone(),
    )
    .context("Failed to create speech API client")?;

    let state = AppState {
        db: pool,
        identity: Arc::new(identity),
        images: Arc::new(images),
        speech: Arc::new(speech),
        converter: Arc::new(PandocConverter::new(config.export.pandoc_path.clone())),
        store: AssetStore::new(assets_dir),
        settings: ServerSettings {
            public_base_url: config.public_base_url.clone(),
            images_per_archive: config.export.images_per_archive,
        },
    };
    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = format!("{}:{}", config.bind_addr, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("folio-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
