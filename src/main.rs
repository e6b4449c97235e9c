//! Farm Records Daemon
//!
//! Serves the field, crop record, detection and analytics API.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! farm-records
//!
//! # Start with custom config
//! farm-records --config /path/to/config.toml
//!
//! # Load a mandal/village/crop catalog snapshot at startup
//! farm-records --catalog-seed catalog.json
//!
//! # Refuse field deletion while crop records exist
//! farm-records --field-delete-policy refuse
//! ```

use clap::Parser;
use farm_records::db::catalog::CatalogSeed;
use farm_records::services::events::spawn_logging_listener;
use farm_records::services::DetectionConfig;
use farm_records::{
    Config, FieldDeletePolicy, HttpClassifier, HttpServer, LocalImageStore, RecordsDb, Services,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "farm-records")]
#[command(about = "Field and crop record lifecycle service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "FARM_RECORDS_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long)]
    http_port: Option<u16>,

    /// Disease classification endpoint
    #[arg(long, env = "CLASSIFIER_URL")]
    classifier_url: Option<String>,

    /// Secret for signing image URLs
    #[arg(long, env = "IMAGE_URL_SECRET", hide_env_values = true)]
    url_signing_secret: Option<String>,

    /// Catalog snapshot (JSON) to load at startup
    #[arg(long)]
    catalog_seed: Option<PathBuf>,

    /// What deleting a field does to its unverified crop records
    #[arg(long, value_parser = parse_delete_policy)]
    field_delete_policy: Option<FieldDeletePolicy>,
}

fn parse_delete_policy(s: &str) -> Result<FieldDeletePolicy, String> {
    match s {
        "cascade" => Ok(FieldDeletePolicy::Cascade),
        "refuse" => Ok(FieldDeletePolicy::Refuse),
        other => Err(format!("expected 'cascade' or 'refuse', got '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("farm_records=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(url) = args.classifier_url {
        config.classifier_url = url;
    }
    if let Some(secret) = args.url_signing_secret {
        config.url_signing_secret = secret;
    }
    if let Some(seed) = args.catalog_seed {
        config.catalog_seed = Some(seed);
    }
    if let Some(policy) = args.field_delete_policy {
        config.field_delete_policy = policy;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        field_delete_policy = ?config.field_delete_policy,
        enforce_crop_area = config.enforce_crop_area,
        "Starting farm-records"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    if config.uses_default_signing_secret() {
        error!(
            path = %config_path.display(),
            "url_signing_secret is still the placeholder; set it or IMAGE_URL_SECRET"
        );
        return Err("refusing to sign image URLs with the placeholder secret".into());
    }

    let db = Arc::new(RecordsDb::open_file(&config.database_path(), config.busy_timeout())?);

    let images = Arc::new(
        LocalImageStore::new(
            config.images_dir(),
            &config.image_base_url,
            &config.url_signing_secret,
        )
        .await?,
    );
    let classifier = Arc::new(HttpClassifier::new(
        config.classifier_url.clone(),
        config.classifier_timeout(),
    )?);

    let services = Arc::new(Services::new(
        db.clone(),
        config.lifecycle_policy(),
        images.clone(),
        classifier,
        DetectionConfig {
            classify_timeout: config.classifier_timeout(),
            image_url_ttl: config.image_url_ttl(),
        },
    ));

    if let Some(seed_path) = &config.catalog_seed {
        let seed = CatalogSeed::load(seed_path)?;
        services.catalog.apply_seed(&seed)?;
    }

    let listener = spawn_logging_listener(services.events.clone());

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(services.clone(), images, db.clone(), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    // Run HTTP server with graceful shutdown
    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    // Print stats before exit
    if let Ok(stats) = db.stats() {
        info!(
            fields = stats.field_count,
            crop_records = stats.crop_record_count,
            predictions = stats.prediction_count,
            "Final record stats"
        );
    }

    Ok(())
}
