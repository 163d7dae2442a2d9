//! High-level EDR query service.
//!
//! `QueryService` is the entry point for an HTTP layer: it takes the raw
//! `coords`, `datetime` and `parameter-name` values of a position or area
//! request, parses all of them before touching data, and runs the query
//! against a snapshot of the active dataset.
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_processor::{GridProcessorConfig, QueryParams, QueryService};
//!
//! let service = QueryService::open(Path::new("/data/waves.zarr"), &GridProcessorConfig::from_env())?;
//!
//! let params = QueryParams::new("POINT(-60 45)").with_datetime("2024-01-01T00:00:00Z");
//! let records = service.position(&params).await?;
//! let geojson = EdrFeatureCollection::from(records);
//! ```

use std::path::Path;
use std::sync::Arc;

use edr_protocol::{
    Collection, EdrError, FeatureRecord, Geometry, GeometryParseError, TemporalSelection,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assemble::assemble;
use crate::cache::CacheStats;
use crate::config::GridProcessorConfig;
use crate::engine::{Query, QueryEngine};
use crate::handle::{Dataset, DatasetHandle};

/// Raw query parameters of a position or area request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub coords: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(
        rename = "parameter-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parameter_name: Option<String>,
}

impl QueryParams {
    pub fn new(coords: impl Into<String>) -> Self {
        Self {
            coords: coords.into(),
            ..Default::default()
        }
    }

    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>) -> Self {
        self.parameter_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Position,
    Area,
}

/// Position and area queries over the active dataset.
#[derive(Clone)]
pub struct QueryService {
    handle: DatasetHandle,
}

impl QueryService {
    pub fn new(handle: DatasetHandle) -> Self {
        Self { handle }
    }

    /// Open a Zarr store and serve it.
    pub fn open(path: &Path, config: &GridProcessorConfig) -> Result<Self, EdrError> {
        Ok(Self::new(DatasetHandle::new(Dataset::open(path, config)?)))
    }

    /// Handle used to swap the served dataset.
    pub fn handle(&self) -> &DatasetHandle {
        &self.handle
    }

    /// Fail with `CollectionNotFound` unless `id` names the active dataset.
    pub async fn check_collection(&self, id: &str) -> Result<(), EdrError> {
        let dataset = self.handle.snapshot().await;
        if dataset.catalog().id() == id {
            Ok(())
        } else {
            Err(EdrError::CollectionNotFound(id.to_string()))
        }
    }

    /// Collection metadata for the active dataset.
    pub async fn collection(&self, base_url: &str) -> Collection {
        self.handle.snapshot().await.catalog().collection(base_url)
    }

    /// Chunk cache statistics for the active dataset.
    pub async fn cache_stats(&self) -> CacheStats {
        self.handle.snapshot().await.cache().stats().await
    }

    /// Sample at the grid cell nearest to a point.
    pub async fn position(&self, params: &QueryParams) -> Result<Vec<FeatureRecord>, EdrError> {
        self.run(QueryKind::Position, params).await
    }

    /// Sample every cell inside a polygon or bbox.
    pub async fn area(&self, params: &QueryParams) -> Result<Vec<FeatureRecord>, EdrError> {
        self.run(QueryKind::Area, params).await
    }

    async fn run(&self, kind: QueryKind, params: &QueryParams) -> Result<Vec<FeatureRecord>, EdrError> {
        let dataset = self.handle.snapshot().await;
        let convention = dataset.catalog().descriptor().convention();

        let geometry = Geometry::parse(&params.coords, convention)?;
        match (kind, geometry.is_point()) {
            (QueryKind::Position, false) => {
                return Err(GeometryParseError::InvalidWkt(format!(
                    "position query needs a point, got '{}'",
                    params.coords
                ))
                .into());
            }
            (QueryKind::Area, true) => {
                return Err(GeometryParseError::InvalidWkt(format!(
                    "area query needs a polygon or bbox, got '{}'",
                    params.coords
                ))
                .into());
            }
            _ => {}
        }

        let temporal = TemporalSelection::parse(params.datetime.as_deref())?;

        let mut query = Query::new(geometry, temporal);
        if let Some(name) = &params.parameter_name {
            query = query.with_field(name.as_str());
        }

        let engine = QueryEngine::new(Arc::clone(&dataset));
        let result = engine.execute(&query).await?;
        let records = assemble(&result);

        debug!(
            collection = %dataset.catalog().id(),
            kind = ?kind,
            coords = %params.coords,
            records = records.len(),
            "Query complete"
        );

        Ok(records)
    }
}
