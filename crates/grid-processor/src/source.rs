//! Chunk sources: where decompressed field chunks come from.
//!
//! The engine only sees the [`ChunkSource`] trait. [`ZarrChunkSource`] reads a
//! Zarr V3 store on the local filesystem through `zarrs`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use edr_protocol::Visualization;
use serde_json::{Map, Value};
use tracing::{debug, info};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::cache::ChunkPayload;
use crate::config::GridProcessorConfig;
use crate::descriptor::{Axis, DatasetDescriptor, FieldDescriptor, FieldUnit, Manifest, TimeAxis};
use crate::error::{GridProcessorError, Result};

/// Source of decompressed field chunks.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Read one chunk of a field, trimmed to the array edge.
    ///
    /// `chunk` holds chunk-grid coordinates `[t, y, x]`.
    async fn read_chunk(&self, field: usize, chunk: [u64; 3]) -> Result<ChunkPayload>;
}

/// Chunk source backed by a Zarr V3 store on disk.
pub struct ZarrChunkSource {
    arrays: Vec<Arc<Array<FilesystemStore>>>,
    chunk_shapes: Vec<[u64; 3]>,
    shape: [u64; 3],
}

impl ZarrChunkSource {
    /// Open a store, returning its descriptor and a source for its chunks.
    pub fn open(path: &Path, config: &GridProcessorConfig) -> Result<(DatasetDescriptor, Self)> {
        let manifest = read_manifest(path, &config.manifest_name)?;

        let store = Arc::new(FilesystemStore::new(path).map_err(|e| {
            GridProcessorError::open_failed(format!("{}: {}", path.display(), e))
        })?);

        let lat = Axis::new(
            config.lat_array.as_str(),
            read_float_axis(&open_array(&store, &config.lat_array)?)?,
        )?;
        let lon = Axis::new(
            config.lon_array.as_str(),
            read_float_axis(&open_array(&store, &config.lon_array)?)?,
        )?;

        let time_array = open_array(&store, &config.time_array)?;
        let units = time_array
            .attributes()
            .get("units")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GridProcessorError::invalid_metadata(format!(
                    "time array '{}' has no units attribute",
                    config.time_array
                ))
            })?
            .to_string();
        let time = TimeAxis::from_cf(
            config.time_array.as_str(),
            &read_int_axis(&time_array)?,
            &units,
        )?;

        let shape = [time.len() as u64, lat.len() as u64, lon.len() as u64];

        let mut arrays = Vec::with_capacity(manifest.fields.len());
        let mut fields = Vec::with_capacity(manifest.fields.len());
        for name in &manifest.fields {
            let array = open_array(&store, name)?;

            if array.shape() != shape.as_slice() {
                return Err(GridProcessorError::invalid_metadata(format!(
                    "field '{}' has shape {:?}, expected {:?}",
                    name,
                    array.shape(),
                    shape
                )));
            }
            if !matches!(array.data_type(), DataType::Float32) {
                return Err(GridProcessorError::invalid_metadata(format!(
                    "field '{}' is {:?}, expected float32",
                    name,
                    array.data_type()
                )));
            }

            let chunk_shape = array
                .chunk_grid()
                .chunk_shape(&[0, 0, 0], array.shape())
                .map_err(|e| GridProcessorError::invalid_metadata(e.to_string()))?
                .ok_or_else(|| GridProcessorError::invalid_metadata("missing chunk shape"))?;
            let chunk_shape = [
                chunk_shape[0].get(),
                chunk_shape[1].get(),
                chunk_shape[2].get(),
            ];

            let fill_value = array
                .fill_value()
                .as_ne_bytes()
                .try_into()
                .map(f32::from_ne_bytes)
                .unwrap_or(f32::NAN);

            fields.push(describe_field(
                name,
                array.attributes(),
                fill_value,
                chunk_shape,
            ));
            arrays.push(Arc::new(array));
        }

        let chunk_shapes = fields.iter().map(|f| f.chunk_shape).collect();
        let descriptor = DatasetDescriptor::new(manifest, fields, lat, lon, time)?;

        info!(
            store = %path.display(),
            collection = %descriptor.id,
            fields = descriptor.fields().len(),
            shape = ?shape,
            "Opened Zarr store"
        );

        Ok((
            descriptor,
            Self {
                arrays,
                chunk_shapes,
                shape,
            },
        ))
    }
}

#[async_trait]
impl ChunkSource for ZarrChunkSource {
    async fn read_chunk(&self, field: usize, chunk: [u64; 3]) -> Result<ChunkPayload> {
        let array = self.arrays.get(field).cloned().ok_or_else(|| {
            GridProcessorError::read_failed(format!("no field at index {}", field))
        })?;
        let chunk_shape = self.chunk_shapes[field];

        // Actual chunk bounds (may be partial at edges)
        let mut start = [0u64; 3];
        let mut extent = [0u64; 3];
        for axis in 0..3 {
            start[axis] = chunk[axis] * chunk_shape[axis];
            if start[axis] >= self.shape[axis] {
                return Err(GridProcessorError::read_failed(format!(
                    "chunk {:?} is outside the chunk grid",
                    chunk
                )));
            }
            extent[axis] = chunk_shape[axis].min(self.shape[axis] - start[axis]);
        }

        debug!(field, chunk = ?chunk, "Reading chunk");

        let data = tokio::task::spawn_blocking(move || {
            let subset = ArraySubset::new_with_start_shape(start.to_vec(), extent.to_vec())
                .map_err(|e| GridProcessorError::read_failed(e.to_string()))?;
            array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(|e| {
                    GridProcessorError::read_failed(format!("chunk {:?}: {}", chunk, e))
                })
        })
        .await
        .map_err(|e| GridProcessorError::read_failed(e.to_string()))??;

        Ok(ChunkPayload::new(
            [extent[0] as usize, extent[1] as usize, extent[2] as usize],
            data,
        ))
    }
}

fn read_manifest(path: &Path, name: &str) -> Result<Manifest> {
    let manifest_path = path.join(name);
    let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
        GridProcessorError::open_failed(format!("{}: {}", manifest_path.display(), e))
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn open_array(store: &Arc<FilesystemStore>, name: &str) -> Result<Array<FilesystemStore>> {
    Array::open(store.clone(), &format!("/{}", name))
        .map_err(|e| GridProcessorError::open_failed(format!("array '{}': {}", name, e)))
}

fn whole_array(array: &Array<FilesystemStore>) -> Result<ArraySubset> {
    if array.shape().len() != 1 {
        return Err(GridProcessorError::invalid_metadata(format!(
            "coordinate array must be 1-D, found shape {:?}",
            array.shape()
        )));
    }
    Ok(ArraySubset::new_with_shape(array.shape().to_vec()))
}

fn read_float_axis(array: &Array<FilesystemStore>) -> Result<Vec<f64>> {
    let subset = whole_array(array)?;
    let read_err = |e: zarrs::array::ArrayError| GridProcessorError::read_failed(e.to_string());

    match array.data_type() {
        DataType::Float64 => array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(read_err),
        DataType::Float32 => Ok(array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(read_err)?
            .into_iter()
            .map(widen_coordinate)
            .collect()),
        other => Err(GridProcessorError::invalid_metadata(format!(
            "coordinate array has unsupported type {:?}",
            other
        ))),
    }
}

/// Widen an f32 coordinate to the f64 of its shortest decimal form, so
/// `0.7f32` compares equal to a requested `0.7`.
fn widen_coordinate(v: f32) -> f64 {
    v.to_string().parse().unwrap_or_else(|_| f64::from(v))
}

fn read_int_axis(array: &Array<FilesystemStore>) -> Result<Vec<i64>> {
    let subset = whole_array(array)?;
    let read_err = |e: zarrs::array::ArrayError| GridProcessorError::read_failed(e.to_string());

    match array.data_type() {
        DataType::Int64 => array
            .retrieve_array_subset_elements::<i64>(&subset)
            .map_err(read_err),
        DataType::Int32 => Ok(array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map_err(read_err)?
            .into_iter()
            .map(i64::from)
            .collect()),
        other => Err(GridProcessorError::invalid_metadata(format!(
            "time array has unsupported type {:?}",
            other
        ))),
    }
}

/// Build a field descriptor from Zarr array attributes.
pub(crate) fn describe_field(
    name: &str,
    attrs: &Map<String, Value>,
    fill_value: f32,
    chunk_shape: [u64; 3],
) -> FieldDescriptor {
    let text = |key: &str| attrs.get(key).and_then(Value::as_str).map(str::to_string);

    let unit = text("units").map(|symbol| FieldUnit {
        label: text("unit_label").unwrap_or_else(|| symbol.clone()),
        symbol,
    });

    let typical_range = attrs
        .get("typical_range")
        .and_then(Value::as_array)
        .and_then(|range| match range.as_slice() {
            [lo, hi] => Some((lo.as_f64()? as f32, hi.as_f64()? as f32)),
            _ => None,
        });

    let display_name = text("display_name");
    let color_map = text("color_map");
    let visualization = if display_name.is_some() || color_map.is_some() {
        Some(Visualization {
            display_name,
            color_map,
        })
    } else {
        None
    };

    FieldDescriptor {
        name: name.to_string(),
        long_name: text("long_name"),
        description: text("description"),
        unit,
        typical_range,
        visualization,
        fill_value,
        chunk_shape,
    }
}
