//! Product snapshot cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use common::ProductId;
use domain::Product;

struct Entry {
    product: Product,
    cached_at: Instant,
}

/// TTL-bounded cache of product snapshots used on the hold hot path.
///
/// Invalidation must happen after the authoritative mutation commits, never
/// before, so a concurrent reader cannot re-populate a stale value into the
/// window.
#[derive(Clone)]
pub struct ProductSnapshotCache {
    entries: Arc<RwLock<HashMap<ProductId, Entry>>>,
    ttl: Duration,
}

impl ProductSnapshotCache {
    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached snapshot if it is still fresh.
    pub fn get(&self, id: ProductId) -> Option<Product> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&id)
            .filter(|e| e.cached_at.elapsed() < self.ttl)
            .map(|e| e.product.clone())
    }

    /// Stores a snapshot.
    pub fn put(&self, product: Product) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            product.id,
            Entry {
                product,
                cached_at: Instant::now(),
            },
        );
    }

    /// Forgets the snapshot for a product.
    pub fn invalidate(&self, id: ProductId) {
        self.entries.write().unwrap().remove(&id);
    }
}

impl Default for ProductSnapshotCache {
    fn default() -> Self {
        // matches the product read path's cache window
        Self::new(Duration::from_secs(3600))
    }
}
