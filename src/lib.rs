mod address;
mod cache;
mod config;
mod db;
mod errors;
mod geocode;
mod keyer;
mod pipeline;
mod server;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use address::{CanonicalKey, Coordinates, ItemResult, RawAddressRecord, ValidatedAddress};
pub use cache::{GeocodeCache, InMemoryGeocodeCache};
pub use config::{AppConfig, PublicAppConfig, DEFAULT_GEOCODE_ENDPOINT};
pub use db::{bootstrap, DatabaseContext};
pub use errors::{AppError, AppResult, ValidationError};
pub use geocode::{GeocodeClient, GoogleGeocodeClient};
pub use keyer::{canonical_key, REQUIRED_FIELDS};
pub use pipeline::{BatchStats, ValidationOrchestrator};
pub use server::{parse_batch, rocket_instance, validate_body, Reply, VALIDATE_PATH};
pub use store::{address_hash, Persister, SqlitePersister};

pub struct AppState {
    config: AppConfig,
    db_path: PathBuf,
    orchestrator: Arc<ValidationOrchestrator>,
}

impl AppState {
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        let DatabaseContext { connection, path } =
            bootstrap(&config.database_dir, &config.database_file_name)?;
        let persister = SqlitePersister::new(Arc::new(Mutex::new(connection)));
        let geocoder = GoogleGeocodeClient::new(&config)?;
        let orchestrator = ValidationOrchestrator::new(
            Arc::new(InMemoryGeocodeCache::new()),
            Arc::new(geocoder),
            Arc::new(persister),
        );

        Ok(Self {
            config,
            db_path: path,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn orchestrator(&self) -> Arc<ValidationOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rocket(&self) -> AppResult<rocket::Rocket<rocket::Build>> {
        rocket_instance(self.orchestrator(), &self.config)
    }

    pub async fn serve(&self) -> AppResult<()> {
        info!(
            target: "http",
            address = %self.config.listen_address(),
            "listening for address validation requests"
        );
        self.rocket()?
            .launch()
            .await
            .map_err(|err| AppError::Server(err.to_string()))?;
        Ok(())
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,address_validator=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    let state = AppState::initialize(config)?;
    info!(
        db_path = %state.db_path().display(),
        config = ?state.config().public_profile(),
        "address validator starting"
    );
    state.serve().await?;
    Ok(())
}
