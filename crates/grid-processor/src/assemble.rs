//! Chunk assembly and result ordering.
//!
//! [`FieldBlock`] stitches the chunks that intersect a query's index box into
//! one contiguous buffer so chunk boundaries never reach the engine.
//! [`assemble`] turns engine samples into ordered [`FeatureRecord`]s.

use std::ops::Range;
use std::sync::Arc;

use edr_protocol::FeatureRecord;

use crate::cache::ChunkPayload;
use crate::engine::QueryResult;

/// A time × lat × lon block of array indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBox {
    pub time: Range<usize>,
    pub lat: Range<usize>,
    pub lon: Range<usize>,
}

impl IndexBox {
    pub fn new(time: Range<usize>, lat: Range<usize>, lon: Range<usize>) -> Self {
        Self { time, lat, lon }
    }

    /// Shape `[t, y, x]` of the block.
    pub fn shape(&self) -> [usize; 3] {
        [self.time.len(), self.lat.len(), self.lon.len()]
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ranges(&self) -> [&Range<usize>; 3] {
        [&self.time, &self.lat, &self.lon]
    }

    /// Chunk-grid coordinates of every chunk intersecting the block.
    pub fn chunks(&self, chunk_shape: [u64; 3]) -> Vec<[u64; 3]> {
        if self.is_empty() {
            return Vec::new();
        }

        let span = |range: &Range<usize>, size: u64| {
            let size = size as usize;
            (range.start / size) as u64..=((range.end - 1) / size) as u64
        };
        let [t, y, x] = self.ranges();

        let mut chunks = Vec::new();
        for ct in span(t, chunk_shape[0]) {
            for cy in span(y, chunk_shape[1]) {
                for cx in span(x, chunk_shape[2]) {
                    chunks.push([ct, cy, cx]);
                }
            }
        }
        chunks
    }
}

/// One field's values over an index box, assembled from its chunks.
#[derive(Debug, Clone)]
pub struct FieldBlock {
    index_box: IndexBox,
    data: Vec<f32>,
}

impl FieldBlock {
    /// Copy the overlapping part of each chunk into a contiguous buffer.
    ///
    /// Positions no chunk covers hold `fill_value`.
    pub fn from_chunks(
        index_box: IndexBox,
        chunk_shape: [u64; 3],
        chunks: &[([u64; 3], Arc<ChunkPayload>)],
        fill_value: f32,
    ) -> Self {
        let [out_t, out_y, out_x] = index_box.shape();
        let mut data = vec![fill_value; out_t * out_y * out_x];

        for (coords, payload) in chunks {
            // Chunk origin in array indices
            let origin = [
                coords[0] as usize * chunk_shape[0] as usize,
                coords[1] as usize * chunk_shape[1] as usize,
                coords[2] as usize * chunk_shape[2] as usize,
            ];

            let mut overlap = [0..0, 0..0, 0..0];
            for (axis, range) in index_box.ranges().into_iter().enumerate() {
                let start = range.start.max(origin[axis]);
                let end = range.end.min(origin[axis] + payload.shape[axis]);
                overlap[axis] = start..end.max(start);
            }
            if overlap.iter().any(|r| r.is_empty()) {
                continue;
            }

            for t in overlap[0].clone() {
                for y in overlap[1].clone() {
                    let out_row = ((t - index_box.time.start) * out_y + (y - index_box.lat.start))
                        * out_x;
                    for x in overlap[2].clone() {
                        if let Some(value) =
                            payload.get(t - origin[0], y - origin[1], x - origin[2])
                        {
                            data[out_row + (x - index_box.lon.start)] = value;
                        }
                    }
                }
            }
        }

        Self { index_box, data }
    }

    pub fn index_box(&self) -> &IndexBox {
        &self.index_box
    }

    /// Value at absolute array indices, if inside the block.
    pub fn get(&self, t: usize, lat: usize, lon: usize) -> Option<f32> {
        let b = &self.index_box;
        if !b.time.contains(&t) || !b.lat.contains(&lat) || !b.lon.contains(&lon) {
            return None;
        }
        let [_, ny, nx] = b.shape();
        let offset = ((t - b.time.start) * ny + (lat - b.lat.start)) * nx + (lon - b.lon.start);
        self.data.get(offset).copied()
    }
}

/// Order samples into feature records.
///
/// Records sort by time index, then by `lat_index * n_lon + lon_index`;
/// values follow the declared field order and keep explicit nulls.
pub fn assemble(result: &QueryResult) -> Vec<FeatureRecord> {
    let mut samples: Vec<_> = result.samples.iter().collect();
    samples.sort_by_key(|s| {
        (
            s.time_index,
            s.cell.lat_index * result.n_lon + s.cell.lon_index,
        )
    });

    samples
        .into_iter()
        .map(|sample| FeatureRecord {
            datetime: sample.time,
            lon: sample.lon,
            lat: sample.lat,
            values: result
                .fields
                .iter()
                .cloned()
                .zip(sample.values.iter().copied())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GridCell;
    use crate::engine::SampleRecord;
    use chrono::{TimeZone, Utc};

    fn chunk(shape: [usize; 3], base: f32) -> Arc<ChunkPayload> {
        let n: usize = shape.iter().product();
        Arc::new(ChunkPayload::new(
            shape,
            (0..n).map(|i| base + i as f32).collect(),
        ))
    }

    #[test]
    fn test_chunks_for_box() {
        let b = IndexBox::new(0..1, 1..3, 3..5);
        assert_eq!(b.chunks([1, 2, 2]), vec![[0, 0, 1], [0, 0, 2], [0, 1, 1], [0, 1, 2]]);

        let empty = IndexBox::new(0..0, 0..4, 0..4);
        assert!(empty.chunks([1, 2, 2]).is_empty());
    }

    #[test]
    fn test_block_spans_chunk_boundaries() {
        // 1 x 4 x 4 array in 2 x 2 chunks; value = 100 * chunk + local offset
        let shape = [1, 2, 2];
        let chunks = vec![
            ([0, 0, 0], chunk(shape, 0.0)),
            ([0, 0, 1], chunk(shape, 100.0)),
            ([0, 1, 0], chunk(shape, 200.0)),
            ([0, 1, 1], chunk(shape, 300.0)),
        ];

        let block = FieldBlock::from_chunks(IndexBox::new(0..1, 1..3, 1..3), [1, 2, 2], &chunks, f32::NAN);

        // (y=1, x=1) is chunk (0,0) local (1,1)
        assert_eq!(block.get(0, 1, 1), Some(3.0));
        // (y=1, x=2) is chunk (0,1) local (1,0)
        assert_eq!(block.get(0, 1, 2), Some(102.0));
        // (y=2, x=1) is chunk (1,0) local (0,1)
        assert_eq!(block.get(0, 2, 1), Some(201.0));
        // (y=2, x=2) is chunk (1,1) local (0,0)
        assert_eq!(block.get(0, 2, 2), Some(300.0));
        assert_eq!(block.get(0, 0, 0), None);
    }

    #[test]
    fn test_block_trimmed_edge_chunk() {
        // 1 x 3 x 3 array in 2 x 2 chunks; the last chunk is 1 x 1
        let chunks = vec![([0, 1, 1], chunk([1, 1, 1], 42.0))];
        let block = FieldBlock::from_chunks(IndexBox::new(0..1, 2..3, 2..3), [1, 2, 2], &chunks, -1.0);
        assert_eq!(block.get(0, 2, 2), Some(42.0));
    }

    #[test]
    fn test_uncovered_positions_hold_fill() {
        let block = FieldBlock::from_chunks(IndexBox::new(0..1, 0..2, 0..2), [1, 2, 2], &[], -9.0);
        assert_eq!(block.get(0, 1, 1), Some(-9.0));
    }

    #[test]
    fn test_assemble_orders_records() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let sample = |time_index: usize, lat_index: usize, lon_index: usize, time| SampleRecord {
            time_index,
            cell: GridCell {
                lat_index,
                lon_index,
            },
            lon: lon_index as f64,
            lat: lat_index as f64,
            time,
            values: vec![Some(time_index as f32), None],
        };

        let result = QueryResult {
            fields: vec!["swh".to_string(), "perpw".to_string()],
            n_lon: 3,
            samples: vec![
                sample(1, 0, 0, t1),
                sample(0, 1, 0, t0),
                sample(0, 0, 2, t0),
            ],
        };

        let records = assemble(&result);
        let order: Vec<_> = records.iter().map(|r| (r.datetime, r.lat, r.lon)).collect();
        assert_eq!(order, vec![(t0, 0.0, 2.0), (t0, 1.0, 0.0), (t1, 0.0, 0.0)]);

        assert_eq!(records[2].field_names().collect::<Vec<_>>(), vec!["swh", "perpw"]);
        assert_eq!(records[2].value("swh"), Some(Some(1.0)));
        assert_eq!(records[2].value("perpw"), Some(None));
    }
}
