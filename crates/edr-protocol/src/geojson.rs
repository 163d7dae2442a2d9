//! EDR GeoJSON types for query responses.
//!
//! Position and area queries answer with an `EDR GeoJSON FeatureCollection`:
//! one Point feature per sampled cell and time step.
//!
//! See: <https://www.opengis.net/spec/ogcapi-edr-1/1.1/req/edr-geojson>

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::feature::FeatureRecord;
use crate::temporal::format_instant;

/// A GeoJSON FeatureCollection for EDR responses.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EdrFeatureCollection {
    /// Always `"FeatureCollection"`.
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<EdrFeature>,
}

impl EdrFeatureCollection {
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<EdrFeature>) -> Self {
        self.features.extend(features);
        self
    }
}

impl Default for EdrFeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&[FeatureRecord]> for EdrFeatureCollection {
    fn from(records: &[FeatureRecord]) -> Self {
        EdrFeatureCollection::new().with_features(records.iter().map(EdrFeature::from).collect())
    }
}

impl From<Vec<FeatureRecord>> for EdrFeatureCollection {
    fn from(records: Vec<FeatureRecord>) -> Self {
        EdrFeatureCollection::from(records.as_slice())
    }
}

/// One sampled cell at one time step.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EdrFeature {
    /// Always `"Feature"`.
    #[serde(rename = "type")]
    pub type_: String,

    pub geometry: EdrGeometry,

    pub properties: EdrProperties,
}

impl EdrFeature {
    /// A feature at a grid cell center, with empty properties.
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            type_: "Feature".to_string(),
            geometry: EdrGeometry::point(lon, lat),
            properties: EdrProperties::new(),
        }
    }

    pub fn with_properties(mut self, properties: EdrProperties) -> Self {
        self.properties = properties;
        self
    }
}

impl From<&FeatureRecord> for EdrFeature {
    fn from(record: &FeatureRecord) -> Self {
        let properties = record.values.iter().fold(
            EdrProperties::new().with_datetime(format_instant(&record.datetime)),
            |props, (name, value)| props.with_parameter(name, *value),
        );
        EdrFeature::point(record.lon, record.lat).with_properties(properties)
    }
}

/// Feature geometry. Samples are always cell centers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum EdrGeometry {
    Point {
        /// `[lon, lat]`
        coordinates: [f64; 2],
    },
}

impl EdrGeometry {
    pub fn point(lon: f64, lat: f64) -> Self {
        EdrGeometry::Point {
            coordinates: [lon, lat],
        }
    }
}

/// Properties for an EDR GeoJSON feature.
///
/// Serialized flat: `datetime` first, then each parameter in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdrProperties {
    /// Datetime of the sample.
    pub datetime: Option<String>,

    /// Parameter values, nulls kept.
    pub parameters: Vec<(String, Option<f32>)>,
}

impl EdrProperties {
    /// Create new empty properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the datetime.
    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    /// Add a parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: Option<f32>) -> Self {
        self.parameters.push((name.into(), value));
        self
    }
}

impl Serialize for EdrProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.parameters.len()))?;
        if let Some(datetime) = &self.datetime {
            map.serialize_entry("datetime", datetime)?;
        }
        for (name, value) in &self.parameters {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
