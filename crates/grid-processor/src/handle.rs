//! Loaded datasets and the swappable handle queries run against.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{hash_path, ChunkCache, ChunkKey, ChunkPayload};
use crate::catalog::DatasetCatalog;
use crate::config::GridProcessorConfig;
use crate::descriptor::DatasetDescriptor;
use crate::error::{GridProcessorError, Result};
use crate::source::{ChunkSource, ZarrChunkSource};

/// One loaded store: its catalog, chunk source and chunk cache.
pub struct Dataset {
    catalog: DatasetCatalog,
    source: Arc<dyn ChunkSource>,
    cache: Arc<ChunkCache>,
    store_id: u64,
}

impl Dataset {
    pub fn new(
        descriptor: DatasetDescriptor,
        source: Arc<dyn ChunkSource>,
        cache: Arc<ChunkCache>,
        store_id: u64,
    ) -> Self {
        Self {
            catalog: DatasetCatalog::new(Arc::new(descriptor)),
            source,
            cache,
            store_id,
        }
    }

    /// Open a Zarr store with a fresh chunk cache sized from `config`.
    pub fn open(path: &Path, config: &GridProcessorConfig) -> Result<Self> {
        config.validate().map_err(GridProcessorError::ConfigError)?;

        let (descriptor, source) = ZarrChunkSource::open(path, config)?;
        let cache = Arc::new(ChunkCache::from_config(config));
        let store_id = hash_path(&path.to_string_lossy());

        Ok(Self::new(descriptor, Arc::new(source), cache, store_id))
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    pub fn store_id(&self) -> u64 {
        self.store_id
    }

    /// Fetch one chunk of a field through the cache.
    pub async fn chunk(&self, field: usize, chunk: [u64; 3]) -> Result<Arc<ChunkPayload>> {
        let key = ChunkKey::new(self.store_id, field as u32, chunk);
        self.cache
            .get_or_load(key, || self.source.read_chunk(field, chunk))
            .await
            .map_err(|e| {
                warn!(
                    collection = %self.catalog.id(),
                    field,
                    chunk = ?chunk,
                    error = %e,
                    "Chunk load failed"
                );
                e
            })
    }
}

/// Shared pointer to the active dataset.
///
/// Queries take a [`snapshot`](Self::snapshot) and keep it for their whole
/// run; [`swap`](Self::swap) only affects queries that start afterwards.
#[derive(Clone)]
pub struct DatasetHandle {
    current: Arc<RwLock<Arc<Dataset>>>,
}

impl DatasetHandle {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(dataset))),
        }
    }

    /// The dataset active right now.
    pub async fn snapshot(&self) -> Arc<Dataset> {
        self.current.read().await.clone()
    }

    /// Replace the active dataset, returning the previous one.
    pub async fn swap(&self, dataset: Dataset) -> Arc<Dataset> {
        let next = Arc::new(dataset);
        let previous = std::mem::replace(&mut *self.current.write().await, next.clone());

        info!(
            from = %previous.catalog().id(),
            to = %next.catalog().id(),
            "Swapped active dataset"
        );

        previous
    }
}
