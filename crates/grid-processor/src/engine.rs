//! Position and area query execution.
//!
//! A query resolves to one index box (time × lat × lon), which is always
//! contiguous because every axis is monotonic. The chunks intersecting that
//! box are fetched through the cache, stitched per field, and sampled cell by
//! cell. General polygons additionally test each cell center.

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edr_protocol::{Geometry, TemporalSelection};
use futures::future::try_join_all;
use tracing::debug;

use crate::assemble::{FieldBlock, IndexBox};
use crate::catalog::{CellRange, DatasetCatalog, GridCell};
use crate::error::{GridProcessorError, Result};
use crate::handle::Dataset;

/// A parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub geometry: Geometry,
    pub temporal: TemporalSelection,
    /// Restrict output to one field.
    pub field_filter: Option<String>,
}

impl Query {
    pub fn new(geometry: Geometry, temporal: TemporalSelection) -> Self {
        Self {
            geometry,
            temporal,
            field_filter: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.field_filter = Some(name.into());
        self
    }
}

/// One sampled cell at one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub time_index: usize,
    pub cell: GridCell,
    pub lon: f64,
    pub lat: f64,
    pub time: DateTime<Utc>,
    /// One value per selected field; `None` for missing samples.
    pub values: Vec<Option<f32>>,
}

/// Samples for a query plus what is needed to order them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Selected field names in declared order.
    pub fields: Vec<String>,
    /// Length of the longitude axis.
    pub n_lon: usize,
    pub samples: Vec<SampleRecord>,
}

impl QueryResult {
    fn empty(fields: Vec<String>, n_lon: usize) -> Self {
        Self {
            fields,
            n_lon,
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Executes queries against one dataset snapshot.
pub struct QueryEngine {
    dataset: Arc<Dataset>,
}

impl QueryEngine {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    fn catalog(&self) -> &DatasetCatalog {
        self.dataset.catalog()
    }

    /// Run a query: Point geometries sample one cell, others an area.
    pub async fn execute(&self, query: &Query) -> Result<QueryResult> {
        let catalog = self.catalog();
        let fields = catalog.select_fields(query.field_filter.as_deref())?;
        let names: Vec<String> = fields
            .iter()
            .map(|&i| catalog.fields()[i].name.clone())
            .collect();
        let n_lon = catalog.descriptor().lon().len();

        let Some(time) = self.resolve_time(&query.temporal)? else {
            debug!(collection = %catalog.id(), "Interval outside time axis");
            return Ok(QueryResult::empty(names, n_lon));
        };
        let Some(cells) = self.resolve_cells(&query.geometry)? else {
            debug!(collection = %catalog.id(), "Area outside spatial extent");
            return Ok(QueryResult::empty(names, n_lon));
        };

        let index_box = IndexBox::new(time, cells.lat.clone(), cells.lon.clone());
        let plans: Vec<(usize, Vec<[u64; 3]>)> = fields
            .iter()
            .map(|&f| (f, index_box.chunks(catalog.fields()[f].chunk_shape)))
            .collect();

        debug!(
            collection = %catalog.id(),
            time = ?index_box.time,
            lat = ?index_box.lat,
            lon = ?index_box.lon,
            fields = fields.len(),
            chunks = plans.iter().map(|(_, c)| c.len()).sum::<usize>(),
            "Resolved query index box"
        );

        if index_box.is_empty() {
            return Ok(QueryResult::empty(names, n_lon));
        }

        let blocks = try_join_all(
            plans
                .iter()
                .map(|(field, chunks)| self.fetch_block(*field, chunks, &index_box)),
        )
        .await?;

        let samples = self.sample(query, &fields, &blocks, &index_box, &cells);

        Ok(QueryResult {
            fields: names,
            n_lon,
            samples,
        })
    }

    /// Time indices for a selection; `None` when an interval misses the axis.
    fn resolve_time(&self, temporal: &TemporalSelection) -> Result<Option<Range<usize>>> {
        let catalog = self.catalog();
        match temporal {
            TemporalSelection::Instant(t) => {
                let index = catalog.nearest_time(t)?;
                Ok(Some(index..index + 1))
            }
            TemporalSelection::Interval { start, end } => {
                match catalog.time_range(start, end) {
                    Ok(range) => Ok(Some(range)),
                    Err(GridProcessorError::OutOfBounds { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            TemporalSelection::All => Ok(Some(0..catalog.descriptor().time().len())),
        }
    }

    /// Cells for a geometry; `None` when an area misses the grid.
    fn resolve_cells(&self, geometry: &Geometry) -> Result<Option<CellRange>> {
        let catalog = self.catalog();
        match geometry {
            Geometry::Point { lon, lat } => {
                let cell = catalog.nearest_cell(*lon, *lat)?;
                Ok(Some(CellRange {
                    lat: cell.lat_index..cell.lat_index + 1,
                    lon: cell.lon_index..cell.lon_index + 1,
                }))
            }
            Geometry::Polygon { .. } | Geometry::BBox { .. } => {
                let bounds = geometry.bounds();
                match catalog.covering_cells(
                    (bounds.min_lon, bounds.max_lon),
                    (bounds.min_lat, bounds.max_lat),
                ) {
                    Ok(cells) => Ok(Some(cells)),
                    Err(GridProcessorError::OutOfBounds { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn fetch_block(
        &self,
        field: usize,
        chunks: &[[u64; 3]],
        index_box: &IndexBox,
    ) -> Result<FieldBlock> {
        let descriptor = &self.catalog().fields()[field];

        let payloads = try_join_all(chunks.iter().map(|&coords| async move {
            let payload = self.dataset.chunk(field, coords).await?;
            Ok::<_, GridProcessorError>((coords, payload))
        }))
        .await?;

        Ok(FieldBlock::from_chunks(
            index_box.clone(),
            descriptor.chunk_shape,
            &payloads,
            descriptor.fill_value,
        ))
    }

    fn sample(
        &self,
        query: &Query,
        fields: &[usize],
        blocks: &[FieldBlock],
        index_box: &IndexBox,
        cells: &CellRange,
    ) -> Vec<SampleRecord> {
        let descriptor = self.catalog().descriptor();
        let lats = descriptor.lat().values();
        let lons = descriptor.lon().values();
        let instants = descriptor.time().instants();

        // Axis-aligned areas keep the whole subgrid
        let polygon = match &query.geometry {
            Geometry::Polygon { .. } if !query.geometry.is_rectangular() => Some(&query.geometry),
            _ => None,
        };

        let mut samples = Vec::with_capacity(index_box.len());
        for time_index in index_box.time.clone() {
            for cell in cells.cells() {
                let lon = lons[cell.lon_index];
                let lat = lats[cell.lat_index];

                if polygon.is_some_and(|p| !p.contains(lon, lat)) {
                    continue;
                }

                let values = fields
                    .iter()
                    .zip(blocks)
                    .map(|(&field, block)| {
                        let descriptor = &descriptor.fields()[field];
                        block
                            .get(time_index, cell.lat_index, cell.lon_index)
                            .filter(|&v| !descriptor.is_missing(v))
                    })
                    .collect();

                samples.push(SampleRecord {
                    time_index,
                    cell,
                    lon,
                    lat,
                    time: instants[time_index],
                    values,
                });
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ChunkCache, ChunkPayload};
    use crate::descriptor::{Axis, DatasetDescriptor, FieldDescriptor, Manifest, TimeAxis};
    use crate::source::ChunkSource;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use edr_protocol::LongitudeConvention;

    /// In-memory source: value = 1000 * t + 10 * y + x, with (t=0, y=0, x=0) missing.
    struct PatternSource {
        shape: [u64; 3],
        chunk: [u64; 3],
    }

    #[async_trait]
    impl ChunkSource for PatternSource {
        async fn read_chunk(&self, field: usize, chunk: [u64; 3]) -> Result<ChunkPayload> {
            let start: Vec<u64> = (0..3).map(|a| chunk[a] * self.chunk[a]).collect();
            let extent: Vec<usize> = (0..3)
                .map(|a| self.chunk[a].min(self.shape[a] - start[a]) as usize)
                .collect();

            let mut data = Vec::new();
            for t in 0..extent[0] {
                for y in 0..extent[1] {
                    for x in 0..extent[2] {
                        let (t, y, x) = (
                            start[0] as usize + t,
                            start[1] as usize + y,
                            start[2] as usize + x,
                        );
                        let value = if (t, y, x) == (0, 0, 0) {
                            -9999.0
                        } else {
                            (1000 * t + 10 * y + x + 100_000 * field) as f32
                        };
                        data.push(value);
                    }
                }
            }
            Ok(ChunkPayload::new([extent[0], extent[1], extent[2]], data))
        }
    }

    /// 2 time steps, lat 0..=4, lon 10..=15, chunks of 1 x 2 x 4.
    fn engine() -> QueryEngine {
        let chunk = [1, 2, 4];
        let mut swh = FieldDescriptor::new("swh", chunk);
        swh.fill_value = -9999.0;
        let mut perpw = FieldDescriptor::new("perpw", chunk);
        perpw.fill_value = -9999.0;

        let descriptor = DatasetDescriptor::new(
            Manifest {
                id: "waves".to_string(),
                title: "Waves".to_string(),
                description: None,
                fields: vec!["swh".to_string(), "perpw".to_string()],
            },
            vec![swh, perpw],
            Axis::new("lat", (0..5).map(f64::from).collect()).unwrap(),
            Axis::new("lon", (10..16).map(f64::from).collect()).unwrap(),
            TimeAxis::from_cf("time", &[0, 1], "hours since 2024-01-01T00:00:00Z").unwrap(),
        )
        .unwrap();

        let source = PatternSource {
            shape: descriptor.shape(),
            chunk,
        };
        let dataset = Dataset::new(
            descriptor,
            Arc::new(source),
            Arc::new(ChunkCache::new(1024 * 1024, 64)),
            1,
        );
        QueryEngine::new(Arc::new(dataset))
    }

    fn parse(coords: &str) -> Geometry {
        Geometry::parse(coords, LongitudeConvention::Signed).unwrap()
    }

    #[tokio::test]
    async fn test_position_all_times() {
        let engine = engine();
        let query = Query::new(parse("POINT(13.2 2.9)"), TemporalSelection::All);

        let result = engine.execute(&query).await.unwrap();
        assert_eq!(result.fields, vec!["swh", "perpw"]);
        assert_eq!(result.len(), 2);

        let first = &result.samples[0];
        assert_eq!(first.cell, GridCell { lat_index: 3, lon_index: 3 });
        assert_eq!((first.lon, first.lat), (13.0, 3.0));
        assert_eq!(first.values, vec![Some(33.0), Some(100_033.0)]);
        assert_eq!(result.samples[1].values[0], Some(1033.0));
    }

    #[tokio::test]
    async fn test_position_instant_and_filter() {
        let engine = engine();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 40, 0).unwrap();
        let query = Query::new(parse("10,0"), TemporalSelection::Instant(t)).with_field("perpw");

        let result = engine.execute(&query).await.unwrap();
        assert_eq!(result.fields, vec!["perpw"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.samples[0].time_index, 1);
        assert_eq!(result.samples[0].values, vec![Some(101_000.0)]);
    }

    #[tokio::test]
    async fn test_missing_values_become_none() {
        let engine = engine();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = Query::new(parse("POINT(10 0)"), TemporalSelection::Instant(t));

        let result = engine.execute(&query).await.unwrap();
        assert_eq!(result.samples[0].values, vec![None, None]);
    }

    #[tokio::test]
    async fn test_instant_outside_axis_is_out_of_bounds() {
        let engine = engine();
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let query = Query::new(parse("POINT(10 0)"), TemporalSelection::Instant(t));

        assert!(matches!(
            engine.execute(&query).await,
            Err(GridProcessorError::OutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn test_disjoint_interval_is_empty() {
        let engine = engine();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let query = Query::new(
            parse("POINT(10 0)"),
            TemporalSelection::Interval { start, end },
        );

        let result = engine.execute(&query).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.fields.len(), 2);
    }

    #[tokio::test]
    async fn test_point_outside_grid_is_out_of_bounds() {
        let engine = engine();
        let query = Query::new(parse("POINT(40 2)"), TemporalSelection::All);
        assert!(matches!(
            engine.execute(&query).await,
            Err(GridProcessorError::OutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn test_bbox_across_chunks() {
        let engine = engine();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let query = Query::new(parse("12.5,0.5,14.5,2.5"), TemporalSelection::Instant(t))
            .with_field("swh");

        let result = engine.execute(&query).await.unwrap();
        let values: Vec<_> = result.samples.iter().map(|s| s.values[0]).collect();
        // lat 1..=2, lon 13..=14 at t = 1
        assert_eq!(
            values,
            vec![Some(1013.0), Some(1014.0), Some(1023.0), Some(1024.0)]
        );
    }

    #[tokio::test]
    async fn test_area_outside_extent_is_empty() {
        let engine = engine();
        let query = Query::new(parse("50,50,60,60"), TemporalSelection::All);
        assert!(engine.execute(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_polygon_filters_cell_centers() {
        let engine = engine();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Triangle with vertices on cell centers; edges count as inside
        let query = Query::new(
            parse("POLYGON((10 0, 12 0, 10 2, 10 0))"),
            TemporalSelection::Instant(t),
        )
        .with_field("swh");

        let result = engine.execute(&query).await.unwrap();
        let cells: Vec<_> = result
            .samples
            .iter()
            .map(|s| (s.cell.lat_index, s.cell.lon_index))
            .collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (2, 0)]);
    }

    #[tokio::test]
    async fn test_unknown_field() {
        let engine = engine();
        let query = Query::new(parse("POINT(10 0)"), TemporalSelection::All).with_field("hs");
        assert!(matches!(
            engine.execute(&query).await,
            Err(GridProcessorError::FieldNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_repeat_query_served_from_cache() {
        let engine = engine();
        let query = Query::new(parse("10,0,15,4"), TemporalSelection::All);

        engine.execute(&query).await.unwrap();
        let loads = engine.dataset.cache().stats().await.loads;
        engine.execute(&query).await.unwrap();

        let stats = engine.dataset.cache().stats().await;
        assert_eq!(stats.loads, loads);
        assert!(stats.hits >= loads);
    }
}
