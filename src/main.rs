//! Moldkeeper - maintenance state service for injection molds

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moldkeeper::{
    config::{Args, LogFormat},
    db::{MemoryStore, MongoStore, Store},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("moldkeeper={},info", args.log_level).into());
    match args.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let policy = args.maintenance_policy()?;

    info!("======================================");
    info!("  Moldkeeper - mold maintenance state");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Tiers: {}", policy.tiers.len());
    for tier in &policy.tiers {
        info!("  {} ({}): every {} shots", tier.id, tier.name, tier.shot_threshold);
    }
    info!(
        "Thresholds: due {}bps, critical {}bps, calendar window {}d",
        policy.due_bps, policy.critical_bps, policy.calendar_window_days
    );
    info!("Strict checklist submission: {}", policy.require_complete_checklist);
    info!("Session issuance requires credential: {}", args.session_requires_credential);
    info!("======================================");

    let store: Arc<dyn Store> = match &args.mongodb_uri {
        Some(uri) => match MongoStore::connect(uri, &args.mongodb_db).await {
            Ok(store) => {
                info!("MongoDB connected successfully ({})", args.mongodb_db);
                Arc::new(store)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using memory store): {}", e);
                    Arc::new(MemoryStore::new())
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        },
        None => {
            warn!("MONGODB_URI not set, records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::with_store(args, store)?;
    server::run(Arc::new(state)).await?;

    info!("Moldkeeper stopped");
    Ok(())
}
