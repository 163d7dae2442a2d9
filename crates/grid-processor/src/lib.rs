//! Gridded EDR query core over chunked Zarr V3 stores.
//!
//! This crate answers OGC EDR position and area queries against a
//! lat × lon × time dataset stored as chunked Zarr arrays. It provides:
//!
//! - **Index lookups**: binary search on monotonic axes, no payload access
//! - **Partial reads**: only the chunks intersecting a query are fetched
//! - **Efficient caching**: shared LRU cache of decompressed chunks with
//!   single-flight loading
//! - **Atomic dataset switch**: queries run against a snapshot
//!
//! # Architecture
//!
//! ```text
//! QueryService::area(params)
//!      │
//!      ├─► Parse coords / datetime (edr-protocol)
//!      │
//!      ├─► DatasetCatalog: resolve time × lat × lon index box
//!      │
//!      ├─► ChunkCache::get_or_load for each intersecting chunk
//!      │         │
//!      │         ├─► Cache hit: shared payload
//!      │         │
//!      │         └─► Cache miss: ChunkSource::read_chunk (spawn_blocking)
//!      │
//!      ├─► FieldBlock: stitch chunks, sample cells
//!      │
//!      └─► assemble → ordered FeatureRecords
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{GridProcessorConfig, QueryParams, QueryService};
//!
//! let service = QueryService::open(Path::new("/data/waves.zarr"), &GridProcessorConfig::default())?;
//! let records = service
//!     .area(&QueryParams::new("-70,40,-60,45").with_parameter("swh"))
//!     .await?;
//! ```

pub mod assemble;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod handle;
pub mod service;
pub mod source;
pub mod testdata;

// Re-export commonly used types at crate root
pub use assemble::{assemble, FieldBlock, IndexBox};
pub use cache::{CacheStats, ChunkCache, ChunkKey, ChunkPayload};
pub use catalog::{CellRange, DatasetCatalog, GridCell};
pub use config::GridProcessorConfig;
pub use descriptor::{Axis, AxisOrder, DatasetDescriptor, FieldDescriptor, FieldUnit, Manifest, TimeAxis};
pub use engine::{Query, QueryEngine, QueryResult, SampleRecord};
pub use error::{GridProcessorError, Result};
pub use handle::{Dataset, DatasetHandle};
pub use service::{QueryParams, QueryService};
pub use source::{ChunkSource, ZarrChunkSource};
