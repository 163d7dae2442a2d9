//! Concurrent queries, single-flight chunk loads and dataset swaps.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use edr_protocol::{EdrError, Geometry, LongitudeConvention, TemporalSelection};
use grid_processor::testdata::{wave_store, write_store, StoreSpec};
use grid_processor::{
    ChunkCache, ChunkPayload, ChunkSource, Dataset, DatasetHandle, GridProcessorConfig,
    GridProcessorError, Query, QueryEngine, QueryParams, QueryService, ZarrChunkSource,
};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

/// Wraps a source, counting reads per chunk and optionally failing or stalling.
struct InstrumentedSource {
    inner: ZarrChunkSource,
    reads: Mutex<HashMap<(usize, [u64; 3]), usize>>,
    delay: Duration,
    fail_next: AtomicBool,
}

impl InstrumentedSource {
    fn new(inner: ZarrChunkSource, delay: Duration) -> Self {
        Self {
            inner,
            reads: Mutex::new(HashMap::new()),
            delay,
            fail_next: AtomicBool::new(false),
        }
    }

    fn reads(&self) -> HashMap<(usize, [u64; 3]), usize> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChunkSource for InstrumentedSource {
    async fn read_chunk(&self, field: usize, chunk: [u64; 3]) -> grid_processor::Result<ChunkPayload> {
        *self.reads.lock().unwrap().entry((field, chunk)).or_insert(0) += 1;
        tokio::time::sleep(self.delay).await;

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GridProcessorError::read_failed("injected decompression failure"));
        }
        self.inner.read_chunk(field, chunk).await
    }
}

fn write(spec: &StoreSpec) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_store(dir.path(), spec).unwrap();
    dir
}

fn instrumented(path: &Path, delay: Duration) -> (Dataset, Arc<InstrumentedSource>) {
    let (descriptor, inner) = ZarrChunkSource::open(path, &GridProcessorConfig::default()).unwrap();
    let source = Arc::new(InstrumentedSource::new(inner, delay));
    let dataset = Dataset::new(
        descriptor,
        source.clone(),
        Arc::new(ChunkCache::new(16 * 1024 * 1024, 1024)),
        1,
    );
    (dataset, source)
}

fn waves() -> StoreSpec {
    wave_store(vec![10.0, 11.0, 12.0], vec![20.0, 21.0, 22.0])
}

fn shifted(mut spec: StoreSpec, id: &str, offset: f32) -> StoreSpec {
    spec.id = id.to_string();
    for value in spec.fields[0].values.iter_mut() {
        *value += offset;
    }
    spec
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_decompress_each_chunk_once() {
    let dir = write(&waves());
    let (dataset, source) = instrumented(dir.path(), Duration::from_millis(30));
    let service = QueryService::new(DatasetHandle::new(dataset));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.area(&QueryParams::new("20,10,22,12")).await })
        })
        .collect();

    let mut results = Vec::new();
    for task in futures::future::join_all(tasks).await {
        results.push(task.unwrap().unwrap());
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].len(), 18);

    let reads = source.reads();
    assert_eq!(reads.len(), 16);
    assert!(reads.values().all(|&n| n == 1), "chunk read more than once: {:?}", reads);
    assert_eq!(service.cache_stats().await.loads, 16);
}

#[tokio::test]
async fn test_failed_load_is_retried_by_next_query() {
    let dir = write(&waves());
    let (dataset, source) = instrumented(dir.path(), Duration::ZERO);
    let service = QueryService::new(DatasetHandle::new(dataset));
    let params = QueryParams::new("POINT(20 10)").with_datetime("2024-01-01T00:00:00Z");

    source.fail_next.store(true, Ordering::SeqCst);
    let err = assert_err!(service.position(&params).await);
    assert!(matches!(err, EdrError::StoreUnavailable(ref msg) if msg.contains("injected")));
    assert_eq!(err.status_code(), 503);

    let records = assert_ok!(service.position(&params).await);
    assert_eq!(records[0].value("swh"), Some(Some(0.0)));
}

#[tokio::test]
async fn test_swap_replaces_dataset_for_new_queries() {
    let old_dir = write(&waves());
    let new_dir = write(&shifted(waves(), "waves-v2", 0.25));

    let service = QueryService::open(old_dir.path(), &GridProcessorConfig::default()).unwrap();
    let params = QueryParams::new("POINT(21 11)")
        .with_datetime("2024-01-01T00:00:00Z")
        .with_parameter("swh");

    let before = assert_ok!(service.position(&params).await);
    assert_eq!(before[0].value("swh"), Some(Some(11.0)));

    let replacement = Dataset::open(new_dir.path(), &GridProcessorConfig::default()).unwrap();
    let previous = service.handle().swap(replacement).await;
    assert_eq!(previous.catalog().id(), "waves");

    let after = assert_ok!(service.position(&params).await);
    assert_eq!(after[0].value("swh"), Some(Some(11.25)));

    assert!(service.check_collection("waves-v2").await.is_ok());
    assert!(matches!(
        service.check_collection("waves").await,
        Err(EdrError::CollectionNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_query_keeps_its_snapshot() {
    let old_dir = write(&waves());
    let new_dir = write(&shifted(waves(), "waves-v2", 0.25));

    let (slow, _source) = instrumented(old_dir.path(), Duration::from_millis(200));
    let handle = DatasetHandle::new(slow);

    let snapshot = handle.snapshot().await;
    let in_flight = tokio::spawn(async move {
        let geometry = Geometry::parse("POINT(21 11)", LongitudeConvention::Signed).unwrap();
        let query = Query::new(geometry, TemporalSelection::All).with_field("swh");
        QueryEngine::new(snapshot).execute(&query).await
    });

    // Let the query start loading, then switch datasets underneath it
    tokio::time::sleep(Duration::from_millis(50)).await;
    let replacement = Dataset::open(new_dir.path(), &GridProcessorConfig::default()).unwrap();
    handle.swap(replacement).await;

    let result = in_flight.await.unwrap().unwrap();
    let values: Vec<_> = result.samples.iter().map(|s| s.values[0]).collect();
    assert_eq!(values, vec![Some(11.0), Some(1011.0)]);

    let current = handle.snapshot().await;
    assert_eq!(current.catalog().id(), "waves-v2");
}
