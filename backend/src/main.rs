use std::sync::Arc;
use backend::{
    build_rocket,
    config::{Config, StorageTarget},
    postgres::PgStore,
    routes::AppState,
    service::VotingService,
    store::{MemoryStore, VoteStore},
};
use shared::CANDIDATES;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

async fn open_store(config: &Config) -> Result<Arc<dyn VoteStore>, Box<dyn std::error::Error>> {
    match &config.storage {
        StorageTarget::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageTarget::Postgres(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            info!("📋 Migrations complete");
            Ok(Arc::new(store))
        }
    }
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting Iron Throne vote server");

    let config = Config::load()?;
    let store = open_store(&config).await?;

    let service = VotingService::new(store);
    let tallies = service.bootstrap(&CANDIDATES).await?;
    info!("🏰 {} candidates ready", tallies.len());

    let audit = service.audit().await?;
    if audit.is_conserved() {
        info!("🗳️ {} votes from {} voters on record", audit.total_cast, audit.voters);
    } else {
        warn!(
            "Tallies ({}) and voter totals ({}) disagree",
            audit.total_tallied, audit.total_cast
        );
    }

    let identity = config.identity.resolver();
    info!("🪪 Voter identity policy: {}", identity.name());

    let state = AppState::new(service, identity, config.admin_secret.as_deref());
    let _ = build_rocket(state, &config.allowed_origin).launch().await?;

    Ok(())
}
