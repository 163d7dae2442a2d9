//! OGC API - Environmental Data Retrieval (EDR) Protocol
//!
//! Storage-agnostic types for answering EDR position and area queries:
//! coordinate and datetime parsing, the error taxonomy, flat feature
//! records with their GeoJSON form, and collection metadata.
//!
//! # Example
//!
//! ```rust
//! use edr_protocol::{Geometry, LongitudeConvention, TemporalSelection};
//!
//! let point = Geometry::parse("POINT(-60 45)", LongitudeConvention::ZeroTo360).unwrap();
//! assert_eq!(point, Geometry::Point { lon: 300.0, lat: 45.0 });
//!
//! let all = TemporalSelection::parse(None).unwrap();
//! assert_eq!(all, TemporalSelection::All);
//! ```

pub mod collections;
pub mod errors;
pub mod feature;
pub mod geojson;
pub mod geometry;
pub mod parameters;
pub mod responses;
pub mod temporal;
pub mod types;

// Re-export commonly used types
pub use collections::{Collection, DataQueries, ParameterNames};
pub use errors::EdrError;
pub use feature::FeatureRecord;
pub use geojson::{EdrFeature, EdrFeatureCollection};
pub use geometry::{BoundingBox, Geometry, GeometryParseError, LongitudeConvention};
pub use parameters::{Parameter, Unit, Visualization};
pub use responses::ExceptionResponse;
pub use temporal::{DateTimeParseError, TemporalSelection};
pub use types::{Extent, Link, SpatialExtent, TemporalExtent};

/// Media types used in EDR responses
pub mod media_types {
    /// GeoJSON media type
    pub const GEO_JSON: &str = "application/geo+json";
    /// JSON media type
    pub const JSON: &str = "application/json";
}
