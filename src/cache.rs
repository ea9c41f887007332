use std::collections::HashMap;

use parking_lot::RwLock;

use crate::address::{CanonicalKey, ValidatedAddress};

/// Fast path in front of the durable store. Entries live for the process.
pub trait GeocodeCache: Send + Sync {
    fn get(&self, key: &CanonicalKey) -> Option<ValidatedAddress>;
    fn put(&self, key: CanonicalKey, value: ValidatedAddress);
}

#[derive(Default)]
pub struct InMemoryGeocodeCache {
    entries: RwLock<HashMap<CanonicalKey, ValidatedAddress>>,
}

impl InMemoryGeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl GeocodeCache for InMemoryGeocodeCache {
    fn get(&self, key: &CanonicalKey) -> Option<ValidatedAddress> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: CanonicalKey, value: ValidatedAddress) {
        self.entries.write().insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::address::{Coordinates, RawAddressRecord};

    use super::*;

    #[test]
    fn stores_and_returns_entries() {
        let cache = InMemoryGeocodeCache::new();
        let key = CanonicalKey::new("1 Main St, Springfield, IL, 62701".into());
        assert!(cache.get(&key).is_none());

        let address = ValidatedAddress::new(
            RawAddressRecord::from_value(json!({ "address_line_one": "1 Main St" })),
            Coordinates { lat: 39.8, lng: -89.6 },
        );
        cache.put(key.clone(), address.clone());

        assert_eq!(cache.get(&key), Some(address));
        assert_eq!(cache.len(), 1);
    }
}
