//! Links and extents shared by collection documents.

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

const CRS84: &str = "CRS:84";
const GREGORIAN_TRS: &str = "TIMECRS[\"DateTime\",TDATUM[\"Gregorian Calendar\"],CS[TemporalDateTime,1],AXIS[\"Time (T)\",future]]";

/// A hyperlink to a related resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub href: String,

    /// Relation: `self`, `root` or `data`.
    pub rel: String,

    /// Media type of the target.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: rel.into(),
            type_: None,
            title: None,
        }
    }

    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = Some(type_.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Where and when a collection has data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialExtent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalExtent>,
}

impl Extent {
    /// Extent covering one bounding box, in `crs` or CRS:84.
    pub fn with_spatial(bbox: BoundingBox, crs: Option<String>) -> Self {
        Self {
            spatial: Some(SpatialExtent {
                bbox: vec![bbox.to_array().to_vec()],
                crs: crs.unwrap_or_else(default_crs),
            }),
            temporal: None,
        }
    }

    pub fn with_temporal(mut self, temporal: TemporalExtent) -> Self {
        self.temporal = Some(temporal);
        self
    }
}

/// Bounding boxes as `[west, south, east, north]` in the store's longitude convention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialExtent {
    pub bbox: Vec<Vec<f64>>,

    #[serde(default = "default_crs")]
    pub crs: String,
}

fn default_crs() -> String {
    CRS84.to_string()
}

/// First and last time step, plus every step when the axis is enumerated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalExtent {
    /// `[start, end]` pairs; `null` marks an open end.
    pub interval: Vec<Vec<Option<String>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,

    #[serde(default = "default_trs")]
    pub trs: String,
}

fn default_trs() -> String {
    GREGORIAN_TRS.to_string()
}

impl TemporalExtent {
    pub fn new(start: Option<String>, end: Option<String>) -> Self {
        Self {
            interval: vec![vec![start, end]],
            values: None,
            trs: default_trs(),
        }
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = Some(values);
        self
    }
}
