use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::address::ValidatedAddress;
use crate::db::now_timestamp;
use crate::errors::AppResult;
use crate::keyer::{ADDRESS_LINE_ONE, CITY, STATE, ZIP_CODE};

/// Durable sink for resolved addresses. Saves are not idempotent.
#[async_trait]
pub trait Persister: Send + Sync {
    async fn save(&self, address: &ValidatedAddress) -> AppResult<()>;
}

/// Content hash over the serialized address, sensitive to field order.
pub fn address_hash(address: &ValidatedAddress) -> AppResult<String> {
    let serialized = serde_json::to_string(address)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(STANDARD_NO_PAD.encode(hasher.finalize()))
}

pub struct SqlitePersister {
    db: Arc<Mutex<Connection>>,
}

impl SqlitePersister {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Persister for SqlitePersister {
    async fn save(&self, address: &ValidatedAddress) -> AppResult<()> {
        let hash = address_hash(address)?;
        {
            let conn = self.db.lock();
            conn.execute(
                "INSERT INTO validated_addresses
                    (address_hash, address_line_one, state, city, zip_code, lat, lng, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    hash.as_str(),
                    address.field_text(ADDRESS_LINE_ONE),
                    address.field_text(STATE),
                    address.field_text(CITY),
                    address.field_text(ZIP_CODE),
                    address.latitude,
                    address.longitude,
                    now_timestamp(),
                ),
            )?;
        }

        trace!(target: "store", address_hash = %hash, "validated address persisted");
        Ok(())
    }
}
