//! Test data generation utilities.
//!
//! Writes small Zarr V3 stores in the layout [`ZarrChunkSource`] reads:
//! 1-D `lat`/`lon` (float64, or float32 on request) and `time` (int64 with
//! CF units) arrays, one float32 `[time, lat, lon]` array per field, and the
//! collection manifest.
//!
//! [`ZarrChunkSource`]: crate::source::ZarrChunkSource

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::config::GridProcessorConfig;
use crate::descriptor::Manifest;

/// One field of a fixture store.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    /// Row-major `[time, lat, lon]` values.
    pub values: Vec<f32>,
    pub chunk_shape: [u64; 3],
    pub fill_value: f32,
    pub attributes: Map<String, Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, values: Vec<f32>, chunk_shape: [u64; 3]) -> Self {
        Self {
            name: name.into(),
            values,
            chunk_shape,
            fill_value: f32::NAN,
            attributes: Map::new(),
        }
    }

    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// A fixture store: axes, fields and manifest entries.
#[derive(Debug, Clone)]
pub struct StoreSpec {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub time_offsets: Vec<i64>,
    pub time_units: String,
    pub fields: Vec<FieldSpec>,
    /// Store `lat`/`lon` as float32.
    pub f32_axes: bool,
}

impl StoreSpec {
    pub fn new(id: impl Into<String>, lat: Vec<f64>, lon: Vec<f64>, time_offsets: Vec<i64>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            description: None,
            lat,
            lon,
            time_offsets,
            time_units: "hours since 2024-01-01T00:00:00Z".to_string(),
            fields: Vec::new(),
            f32_axes: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_time_units(mut self, units: impl Into<String>) -> Self {
        self.time_units = units.into();
        self
    }

    pub fn with_f32_axes(mut self) -> Self {
        self.f32_axes = true;
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Shape `[time, lat, lon]` shared by every field.
    pub fn shape(&self) -> [usize; 3] {
        [self.time_offsets.len(), self.lat.len(), self.lon.len()]
    }
}

/// Create values where `v(t, y, x) = 1000 * t + 10 * y + x`.
/// The pattern makes it easy to verify data integrity after reads.
pub fn pattern_values(shape: [usize; 3]) -> Vec<f32> {
    let [nt, ny, nx] = shape;
    let mut data = Vec::with_capacity(nt * ny * nx);
    for t in 0..nt {
        for y in 0..ny {
            for x in 0..nx {
                data.push((1000 * t + 10 * y + x) as f32);
            }
        }
    }
    data
}

/// Write a fixture store using the default array and manifest names.
pub fn write_store(path: &Path, spec: &StoreSpec) -> Result<(), Box<dyn std::error::Error>> {
    write_store_with_config(path, spec, &GridProcessorConfig::default())
}

/// Write a fixture store using the array and manifest names from `config`.
pub fn write_store_with_config(
    path: &Path,
    spec: &StoreSpec,
    config: &GridProcessorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(path)?;
    let store = Arc::new(FilesystemStore::new(path)?);

    write_coordinate(&store, &config.lat_array, &spec.lat, "degrees_north", spec.f32_axes)?;
    write_coordinate(&store, &config.lon_array, &spec.lon, "degrees_east", spec.f32_axes)?;
    write_array(
        &store,
        &config.time_array,
        &[spec.time_offsets.len() as u64],
        &[spec.time_offsets.len() as u64],
        DataType::Int64,
        FillValue::from(0i64),
        json_map(json!({ "units": spec.time_units })),
        &spec.time_offsets,
    )?;

    let [nt, ny, nx] = spec.shape();
    for field in &spec.fields {
        if field.values.len() != nt * ny * nx {
            return Err(format!(
                "field '{}' has {} values, expected {}",
                field.name,
                field.values.len(),
                nt * ny * nx
            )
            .into());
        }
        write_array(
            &store,
            &field.name,
            &[nt as u64, ny as u64, nx as u64],
            &field.chunk_shape,
            DataType::Float32,
            FillValue::from(field.fill_value),
            field.attributes.clone(),
            &field.values,
        )?;
    }

    let manifest = Manifest {
        id: spec.id.clone(),
        title: spec.title.clone(),
        description: spec.description.clone(),
        fields: spec.fields.iter().map(|f| f.name.clone()).collect(),
    };
    std::fs::write(
        path.join(&config.manifest_name),
        serde_json::to_string_pretty(&manifest)?,
    )?;

    Ok(())
}

/// A 2 × 3 × 3 wave store with `swh` (metres, NaN fill) and `perpw`
/// (seconds, -9999 fill), chunked `[1, 2, 2]`.
///
/// `swh` follows [`pattern_values`]; `perpw` is `swh + 0.5` except at
/// `(t=1, lat=1, lon=1)`, which holds the fill value.
pub fn wave_store(lat: Vec<f64>, lon: Vec<f64>) -> StoreSpec {
    let shape = [2, lat.len(), lon.len()];
    let swh = pattern_values(shape);

    let mut perpw: Vec<f32> = swh.iter().map(|v| v + 0.5).collect();
    let planted = (lat.len() + 1) * lon.len() + 1;
    if let Some(v) = perpw.get_mut(planted) {
        *v = -9999.0;
    }

    StoreSpec::new("waves", lat, lon, vec![0, 3])
        .with_title("Global wave model")
        .with_field(
            FieldSpec::new("swh", swh, [1, 2, 2])
                .with_attribute("units", json!("m"))
                .with_attribute("long_name", json!("Significant height of combined waves"))
                .with_attribute("display_name", json!("Wave height"))
                .with_attribute("typical_range", json!([0.0, 15.0]))
                .with_attribute("color_map", json!("viridis")),
        )
        .with_field(
            FieldSpec::new("perpw", perpw, [1, 2, 2])
                .with_fill_value(-9999.0)
                .with_attribute("units", json!("s"))
                .with_attribute("long_name", json!("Primary wave mean period")),
        )
}

fn write_coordinate(
    store: &Arc<FilesystemStore>,
    name: &str,
    values: &[f64],
    units: &str,
    as_f32: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let shape = [values.len() as u64];
    let attributes = json_map(json!({ "units": units }));
    if as_f32 {
        let narrowed: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        write_array(
            store,
            name,
            &shape,
            &shape,
            DataType::Float32,
            FillValue::from(f32::NAN),
            attributes,
            &narrowed,
        )
    } else {
        write_array(
            store,
            name,
            &shape,
            &shape,
            DataType::Float64,
            FillValue::from(f64::NAN),
            attributes,
            values,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn write_array<T: Element>(
    store: &Arc<FilesystemStore>,
    name: &str,
    shape: &[u64],
    chunk_shape: &[u64],
    data_type: DataType,
    fill_value: FillValue,
    attributes: Map<String, Value>,
    data: &[T],
) -> Result<(), Box<dyn std::error::Error>> {
    let array = ArrayBuilder::new(
        shape.to_vec(),
        data_type,
        chunk_shape.to_vec().try_into()?,
        fill_value,
    )
    .attributes(attributes)
    .build(store.clone(), &format!("/{}", name))?;

    array.store_metadata()?;

    let subset = ArraySubset::new_with_shape(shape.to_vec());
    array.store_array_subset_elements(&subset, data)?;

    Ok(())
}

fn json_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
