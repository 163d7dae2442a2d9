//! Configuration for the grid processor.

use serde::{Deserialize, Serialize};

/// Configuration for the grid processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridProcessorConfig {
    /// Memory budget for the chunk cache in megabytes.
    pub chunk_cache_size_mb: usize,

    /// Upper bound on cached chunks regardless of their size.
    pub chunk_cache_max_entries: usize,

    /// Name of the 1-D latitude array in the store.
    pub lat_array: String,

    /// Name of the 1-D longitude array in the store.
    pub lon_array: String,

    /// Name of the 1-D time array in the store.
    pub time_array: String,

    /// File name of the collection manifest at the store root.
    pub manifest_name: String,
}

impl Default for GridProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_cache_size_mb: 1024,
            chunk_cache_max_entries: 4096,
            lat_array: "lat".to_string(),
            lon_array: "lon".to_string(),
            time_array: "time".to_string(),
            manifest_name: "edr_manifest.json".to_string(),
        }
    }
}

impl GridProcessorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CHUNK_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.chunk_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("CHUNK_CACHE_MAX_ENTRIES") {
            if let Ok(entries) = val.parse() {
                config.chunk_cache_max_entries = entries;
            }
        }

        if let Ok(val) = std::env::var("EDR_LAT_NAME") {
            config.lat_array = val;
        }

        if let Ok(val) = std::env::var("EDR_LON_NAME") {
            config.lon_array = val;
        }

        if let Ok(val) = std::env::var("EDR_TIME_NAME") {
            config.time_array = val;
        }

        if let Ok(val) = std::env::var("EDR_MANIFEST_NAME") {
            config.manifest_name = val;
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_cache_size_mb == 0 {
            return Err("chunk_cache_size_mb must be > 0".to_string());
        }

        if self.chunk_cache_max_entries == 0 {
            return Err("chunk_cache_max_entries must be > 0".to_string());
        }

        let names = [&self.lat_array, &self.lon_array, &self.time_array];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("coordinate array names must not be empty".to_string());
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err("coordinate array names must be distinct".to_string());
        }

        if self.manifest_name.trim().is_empty() {
            return Err("manifest_name must not be empty".to_string());
        }

        Ok(())
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }
}
