//! Read-only index and metadata lookups over a dataset descriptor.

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edr_protocol::temporal::format_instant;
use edr_protocol::{
    BoundingBox, Collection, DataQueries, Extent, Parameter, TemporalExtent, Unit,
};

use crate::descriptor::{Axis, DatasetDescriptor, FieldDescriptor};
use crate::error::{GridProcessorError, Result};

/// A single grid cell by axis index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub lat_index: usize,
    pub lon_index: usize,
}

/// A rectangular block of cells, given as half-open index ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub lat: Range<usize>,
    pub lon: Range<usize>,
}

impl CellRange {
    pub fn is_empty(&self) -> bool {
        self.lat.is_empty() || self.lon.is_empty()
    }

    /// Number of cells in the block.
    pub fn len(&self) -> usize {
        self.lat.len() * self.lon.len()
    }

    /// Cells in row-major order (latitude index outer).
    pub fn cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        self.lat.clone().flat_map(move |lat_index| {
            self.lon.clone().map(move |lon_index| GridCell {
                lat_index,
                lon_index,
            })
        })
    }
}

/// Catalog over one loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    descriptor: Arc<DatasetDescriptor>,
}

impl DatasetCatalog {
    pub fn new(descriptor: Arc<DatasetDescriptor>) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    /// Collection id.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Field descriptors in declared order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        self.descriptor.fields()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields().iter().map(|f| f.name.clone()).collect()
    }

    /// Indices of the fields a query asks for: one named field, or all of them.
    pub fn select_fields(&self, filter: Option<&str>) -> Result<Vec<usize>> {
        match filter {
            None => Ok((0..self.fields().len()).collect()),
            Some(name) => self
                .field_index(name)
                .map(|index| vec![index])
                .ok_or_else(|| GridProcessorError::FieldNotFound {
                    name: name.to_string(),
                    available: self.field_names(),
                }),
        }
    }

    /// Bounding box of the longitude and latitude axes.
    pub fn spatial_extent(&self) -> BoundingBox {
        let lat = self.descriptor.lat();
        let lon = self.descriptor.lon();
        BoundingBox::new(lon.min(), lat.min(), lon.max(), lat.max())
    }

    /// First and last time step.
    pub fn temporal_extent(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let time = self.descriptor.time();
        (time.first(), time.last())
    }

    /// Cell nearest to a location. Ties resolve to the lower index.
    pub fn nearest_cell(&self, lon: f64, lat: f64) -> Result<GridCell> {
        let lat_axis = self.descriptor.lat();
        let lon_axis = self.descriptor.lon();

        match (lat_axis.nearest(lat), lon_axis.nearest(lon)) {
            (Some(lat_index), Some(lon_index)) => Ok(GridCell {
                lat_index,
                lon_index,
            }),
            _ => Err(GridProcessorError::out_of_bounds(
                format!("point ({} {})", lon, lat),
                self.spatial_range(),
            )),
        }
    }

    /// Cells whose coordinates lie within inclusive lon/lat ranges.
    ///
    /// Partial overlap is clipped to the grid. A request inside the extent
    /// that falls between samples yields an empty range.
    pub fn covering_cells(&self, lon_range: (f64, f64), lat_range: (f64, f64)) -> Result<CellRange> {
        let lat = covering(self.descriptor.lat(), lat_range);
        let lon = covering(self.descriptor.lon(), lon_range);

        match (lat, lon) {
            (Some(lat), Some(lon)) => Ok(CellRange { lat, lon }),
            _ => Err(GridProcessorError::out_of_bounds(
                format!(
                    "area lon [{}, {}], lat [{}, {}]",
                    lon_range.0, lon_range.1, lat_range.0, lat_range.1
                ),
                self.spatial_range(),
            )),
        }
    }

    /// Time step nearest to an instant. Ties resolve to the earlier step.
    pub fn nearest_time(&self, t: &DateTime<Utc>) -> Result<usize> {
        self.descriptor
            .time()
            .nearest(t)
            .ok_or_else(|| {
                GridProcessorError::out_of_bounds(
                    format!("datetime {}", format_instant(t)),
                    self.time_span(),
                )
            })
    }

    /// Time steps within the inclusive interval.
    pub fn time_range(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<Range<usize>> {
        self.descriptor
            .time()
            .covering(start, end)
            .ok_or_else(|| {
                GridProcessorError::out_of_bounds(
                    format!("interval {}/{}", format_instant(start), format_instant(end)),
                    self.time_span(),
                )
            })
    }

    /// Collection extent: bbox, temporal interval and every time value.
    pub fn extent(&self) -> Extent {
        let (start, end) = self.temporal_extent();
        let values = self
            .descriptor
            .time()
            .instants()
            .iter()
            .map(format_instant)
            .collect();

        Extent::with_spatial(self.spatial_extent(), None).with_temporal(
            TemporalExtent::new(Some(format_instant(&start)), Some(format_instant(&end)))
                .with_values(values),
        )
    }

    /// Parameter metadata in declared field order.
    pub fn parameters(&self) -> Vec<(String, Parameter)> {
        self.fields()
            .iter()
            .map(|field| (field.name.clone(), parameter_for(field)))
            .collect()
    }

    /// Collection document with position and area query descriptions.
    pub fn collection(&self, base_url: &str) -> Collection {
        let descriptor = &self.descriptor;

        let mut collection = Collection::new(descriptor.id.as_str())
            .with_title(descriptor.title.as_str())
            .with_extent(self.extent())
            .with_data_queries(
                DataQueries::with_position(base_url, &descriptor.id)
                    .with_area(base_url, &descriptor.id),
            )
            .with_crs(vec!["CRS:84".to_string()])
            .with_output_formats(vec!["GeoJSON".to_string()])
            .with_parameters(self.parameters());

        if let Some(description) = &descriptor.description {
            collection = collection.with_description(description.as_str());
        }

        collection.build_links(base_url);
        collection
    }

    fn spatial_range(&self) -> String {
        let bbox = self.spatial_extent();
        format!(
            "lon [{}, {}], lat [{}, {}]",
            bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat
        )
    }

    fn time_span(&self) -> String {
        let (start, end) = self.temporal_extent();
        format!("{}/{}", format_instant(&start), format_instant(&end))
    }
}

fn covering(axis: &Axis, (lo, hi): (f64, f64)) -> Option<Range<usize>> {
    axis.covering(lo.min(hi), lo.max(hi))
}

fn parameter_for(field: &FieldDescriptor) -> Parameter {
    let mut parameter = Parameter::new(field.name.as_str(), field.label());

    if let Some(description) = &field.description {
        parameter = parameter.with_description(description.as_str());
    }
    if let Some(unit) = &field.unit {
        parameter = if unit.label == unit.symbol {
            parameter.with_unit(Unit::from_units_attr(&unit.symbol))
        } else {
            parameter.with_unit(Unit::new(unit.label.as_str(), unit.symbol.as_str()))
        };
    }
    if let Some((min, max)) = field.typical_range {
        parameter = parameter.with_typical_range(min, max);
    }
    if let Some(visualization) = &field.visualization {
        parameter = parameter.with_visualization(visualization.clone());
    }

    parameter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldUnit, Manifest, TimeAxis};
    use chrono::TimeZone;

    fn catalog(lat: Vec<f64>, lon: Vec<f64>) -> DatasetCatalog {
        let mut swh = crate::descriptor::FieldDescriptor::new("swh", [1, 2, 2]);
        swh.long_name = Some("Significant wave height".to_string());
        swh.unit = Some(FieldUnit {
            label: "m".to_string(),
            symbol: "m".to_string(),
        });
        swh.typical_range = Some((0.0, 10.0));
        let perpw = crate::descriptor::FieldDescriptor::new("perpw", [1, 2, 2]);

        let descriptor = DatasetDescriptor::new(
            Manifest {
                id: "waves".to_string(),
                title: "Wave model".to_string(),
                description: Some("Hindcast".to_string()),
                fields: vec!["swh".to_string(), "perpw".to_string()],
            },
            vec![swh, perpw],
            Axis::new("lat", lat).unwrap(),
            Axis::new("lon", lon).unwrap(),
            TimeAxis::from_cf("time", &[0, 3, 6], "hours since 2024-01-01T00:00:00Z").unwrap(),
        )
        .unwrap();

        DatasetCatalog::new(Arc::new(descriptor))
    }

    fn simple() -> DatasetCatalog {
        catalog(vec![10.0, 11.0, 12.0], vec![20.0, 21.0, 22.0, 23.0])
    }

    #[test]
    fn test_field_lookup() {
        let c = simple();
        assert_eq!(c.field_names(), vec!["swh", "perpw"]);
        assert_eq!(c.field_index("perpw"), Some(1));
        assert!(c.field("missing").is_none());
        assert_eq!(c.select_fields(None).unwrap(), vec![0, 1]);
        assert_eq!(c.select_fields(Some("perpw")).unwrap(), vec![1]);

        match c.select_fields(Some("hs")) {
            Err(GridProcessorError::FieldNotFound { name, available }) => {
                assert_eq!(name, "hs");
                assert_eq!(available, vec!["swh", "perpw"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_extents() {
        let c = simple();
        assert_eq!(c.spatial_extent(), BoundingBox::new(20.0, 10.0, 23.0, 12.0));
        let (start, end) = c.temporal_extent();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_nearest_cell() {
        let c = simple();
        assert_eq!(
            c.nearest_cell(21.4, 11.6).unwrap(),
            GridCell {
                lat_index: 2,
                lon_index: 1
            }
        );
        // Midway between samples resolves to the lower index
        assert_eq!(
            c.nearest_cell(20.5, 10.5).unwrap(),
            GridCell {
                lat_index: 0,
                lon_index: 0
            }
        );
        assert!(matches!(
            c.nearest_cell(30.0, 11.0),
            Err(GridProcessorError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_covering_cells() {
        let c = simple();

        let range = c.covering_cells((20.5, 22.5), (10.0, 11.0)).unwrap();
        assert_eq!(range.lon, 1..3);
        assert_eq!(range.lat, 0..2);
        assert_eq!(range.len(), 4);

        // Partial overlap is clipped
        let range = c.covering_cells((22.5, 40.0), (0.0, 10.0)).unwrap();
        assert_eq!(range.lon, 3..4);
        assert_eq!(range.lat, 0..1);

        // Inside the extent but between samples
        let range = c.covering_cells((21.2, 21.8), (10.0, 12.0)).unwrap();
        assert!(range.is_empty());

        assert!(c.covering_cells((50.0, 60.0), (10.0, 12.0)).is_err());
    }

    #[test]
    fn test_descending_latitude() {
        let c = catalog(vec![12.0, 11.0, 10.0], vec![20.0, 21.0]);
        assert_eq!(c.nearest_cell(20.0, 12.0).unwrap().lat_index, 0);
        assert_eq!(c.nearest_cell(20.0, 10.2).unwrap().lat_index, 2);

        let range = c.covering_cells((20.0, 21.0), (10.5, 12.0)).unwrap();
        assert_eq!(range.lat, 0..2);
    }

    #[test]
    fn test_time_resolution() {
        let c = simple();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap();
        assert_eq!(c.nearest_time(&t).unwrap(), 1);

        let late = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(c.nearest_time(&late).is_err());

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        assert_eq!(c.time_range(&start, &late).unwrap(), 1..3);
        assert!(c.time_range(&late, &late).is_err());
    }

    #[test]
    fn test_collection_metadata() {
        let c = simple();
        let collection = c.collection("http://localhost:8083/edr");

        assert_eq!(collection.id, "waves");
        let params = collection.parameter_names.as_ref().unwrap();
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["swh", "perpw"]);
        let swh = params.get("swh").unwrap();
        assert_eq!(swh.typical_range, Some([0.0, 10.0]));

        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["extent"]["spatial"]["bbox"][0][0], 20.0);
        assert_eq!(
            json["extent"]["temporal"]["interval"][0][1],
            "2024-01-01T06:00:00Z"
        );
        assert_eq!(json["extent"]["temporal"]["values"].as_array().unwrap().len(), 3);
        assert!(json["data_queries"]["position"].is_object());
        assert!(json["data_queries"]["area"].is_object());
        assert_eq!(json["crs"], serde_json::json!(["CRS:84"]));
        assert_eq!(json["output_formats"], serde_json::json!(["GeoJSON"]));
    }
}
