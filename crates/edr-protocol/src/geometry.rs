//! Geometry parsing for EDR `coords` parameters.
//!
//! Position and area queries describe their footprint as text. This module
//! turns that text into a typed [`Geometry`], validating ranges and
//! normalizing longitudes to the convention of the dataset being queried.
//!
//! Accepted forms:
//! - `POINT(lon lat)` / `POINT (lon lat)`
//! - `lon,lat`
//! - `POLYGON((lon1 lat1, lon2 lat2, lon3 lat3, lon1 lat1))`
//! - `minlon,minlat,maxlon,maxlat`

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used for boundary tests in degrees.
const EDGE_EPSILON: f64 = 1e-9;

/// Errors that can occur when parsing coordinates.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryParseError {
    /// Text does not match any accepted grammar.
    #[error("Invalid WKT format: {0}")]
    InvalidWkt(String),

    /// A component is not a finite number.
    #[error("Invalid coordinate value: {0}")]
    InvalidCoordinate(String),

    /// Coordinate out of valid range.
    #[error("Coordinate out of range: {0}")]
    OutOfRange(String),

    /// Polygon ring with too few distinct vertices.
    #[error("Degenerate polygon: {0}")]
    DegenerateRing(String),

    /// Geometry spans the longitude seam of the dataset.
    #[error("Geometry crosses the dataset longitude seam: {0}")]
    CrossesSeam(String),
}

/// Longitude convention used by a dataset's longitude axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LongitudeConvention {
    /// Longitudes in [-180, 180].
    #[default]
    Signed,
    /// Longitudes in [0, 360).
    ZeroTo360,
}

impl LongitudeConvention {
    /// Derive the convention from the largest longitude on an axis.
    pub fn from_axis_max(max_lon: f64) -> Self {
        if max_lon > 180.0 {
            Self::ZeroTo360
        } else {
            Self::Signed
        }
    }

    /// Map a longitude in [-180, 360) onto this convention.
    pub fn normalize(self, lon: f64) -> f64 {
        match self {
            Self::Signed if lon > 180.0 => lon - 360.0,
            Self::ZeroTo360 if lon < 0.0 => lon + 360.0,
            _ => lon,
        }
    }

    /// Full longitude range covered by this convention.
    pub fn full_range(self) -> (f64, f64) {
        match self {
            Self::Signed => (-180.0, 180.0),
            Self::ZeroTo360 => (0.0, 360.0),
        }
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Check if this bounding box intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lon < other.min_lon
            || self.min_lon > other.max_lon
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }

    /// Check if a point is contained within this bounding box (edges included).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// As `[west, south, east, north]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Parsed query geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A single position.
    Point { lon: f64, lat: f64 },

    /// A polygon exterior ring. The closing vertex is implicit and not stored.
    Polygon { ring: Vec<(f64, f64)> },

    /// An axis-aligned box.
    BBox {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
}

impl Geometry {
    /// Parse a `coords` string and normalize its longitudes to `convention`.
    pub fn parse(
        coords: &str,
        convention: LongitudeConvention,
    ) -> Result<Self, GeometryParseError> {
        Self::parse_raw(coords)?.normalized(convention)
    }

    fn parse_raw(coords: &str) -> Result<Self, GeometryParseError> {
        let coords = coords.trim();

        if let Some(body) = strip_keyword(coords, "POINT") {
            let (lon, lat) = Self::parse_wkt_point(body)?;
            return Ok(Geometry::Point { lon, lat });
        }

        if let Some(body) = strip_keyword(coords, "POLYGON") {
            let ring = Self::parse_wkt_polygon(body)?;
            return Ok(Geometry::Polygon { ring });
        }

        if coords.contains(',') {
            return Self::parse_simple(coords);
        }

        Err(GeometryParseError::InvalidWkt(format!(
            "'{}': expected POINT(lon lat), POLYGON((lon lat, ...)), lon,lat or minlon,minlat,maxlon,maxlat",
            coords
        )))
    }

    /// Parse the parenthesized body following the `POINT` keyword.
    fn parse_wkt_point(body: &str) -> Result<(f64, f64), GeometryParseError> {
        let inner = strip_parens(body.trim()).ok_or_else(|| {
            GeometryParseError::InvalidWkt(format!("POINT{}: expected POINT(lon lat)", body))
        })?;
        if inner.contains(['(', ')']) {
            return Err(GeometryParseError::InvalidWkt(format!(
                "POINT{}: nested parentheses",
                body
            )));
        }
        parse_pair(inner)
    }

    /// Parse the doubly parenthesized body following the `POLYGON` keyword.
    fn parse_wkt_polygon(body: &str) -> Result<Vec<(f64, f64)>, GeometryParseError> {
        let malformed = || {
            GeometryParseError::InvalidWkt(format!(
                "POLYGON{}: expected POLYGON((lon lat, lon lat, ...))",
                body
            ))
        };

        let outer = strip_parens(body.trim()).ok_or_else(malformed)?;
        let inner = strip_parens(outer.trim()).ok_or_else(malformed)?;
        if inner.contains(['(', ')']) {
            return Err(GeometryParseError::InvalidWkt(format!(
                "POLYGON{}: interior rings are not supported",
                body
            )));
        }

        let mut ring = inner
            .split(',')
            .map(parse_pair)
            .collect::<Result<Vec<_>, _>>()?;

        // Store the ring open; the closing vertex is implied.
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }

        let mut distinct = ring.clone();
        distinct.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(GeometryParseError::DegenerateRing(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }

        Ok(ring)
    }

    /// Parse the bare comma forms `lon,lat` and `minlon,minlat,maxlon,maxlat`.
    fn parse_simple(coords: &str) -> Result<Self, GeometryParseError> {
        let parts: Vec<&str> = coords.split(',').collect();
        let values = parts
            .iter()
            .map(|p| parse_number(p))
            .collect::<Result<Vec<f64>, _>>();

        match parts.len() {
            2 => {
                let values = values?;
                validate_coordinates(values[0], values[1])?;
                Ok(Geometry::Point {
                    lon: values[0],
                    lat: values[1],
                })
            }
            4 => {
                let values = values?;
                let (min_lon, min_lat, max_lon, max_lat) =
                    (values[0], values[1], values[2], values[3]);
                validate_coordinates(min_lon, min_lat)?;
                validate_coordinates(max_lon, max_lat)?;

                if min_lat > max_lat {
                    return Err(GeometryParseError::OutOfRange(format!(
                        "bbox minlat {} is greater than maxlat {}",
                        min_lat, max_lat
                    )));
                }
                if min_lon > max_lon {
                    return Err(GeometryParseError::OutOfRange(format!(
                        "bbox minlon {} is greater than maxlon {}",
                        min_lon, max_lon
                    )));
                }

                Ok(Geometry::BBox {
                    min_lon,
                    min_lat,
                    max_lon,
                    max_lat,
                })
            }
            n => Err(GeometryParseError::InvalidWkt(format!(
                "'{}': expected 2 (lon,lat) or 4 (bbox) values, got {}",
                coords, n
            ))),
        }
    }

    /// Rewrite every longitude into `convention`.
    fn normalized(self, convention: LongitudeConvention) -> Result<Self, GeometryParseError> {
        match self {
            Geometry::Point { lon, lat } => Ok(Geometry::Point {
                lon: convention.normalize(lon),
                lat,
            }),
            Geometry::BBox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => {
                let (min_lon, max_lon) = if max_lon - min_lon >= 360.0 {
                    convention.full_range()
                } else {
                    let (west, east) = (convention.normalize(min_lon), convention.normalize(max_lon));
                    if west > east {
                        return Err(GeometryParseError::CrossesSeam(format!(
                            "bbox {},{},{},{}",
                            min_lon, min_lat, max_lon, max_lat
                        )));
                    }
                    (west, east)
                };
                Ok(Geometry::BBox {
                    min_lon,
                    min_lat,
                    max_lon,
                    max_lat,
                })
            }
            Geometry::Polygon { ring } => {
                // Vertices either all move onto the convention or none do
                let shifts: Vec<f64> = ring
                    .iter()
                    .map(|&(lon, _)| convention.normalize(lon) - lon)
                    .collect();
                let first = shifts.first().copied().unwrap_or(0.0);
                if shifts.iter().any(|d| (d - first).abs() > EDGE_EPSILON) {
                    return Err(GeometryParseError::CrossesSeam(format!(
                        "polygon spanning {:.3} degrees of longitude",
                        lon_span(&ring)
                    )));
                }
                Ok(Geometry::Polygon {
                    ring: ring.into_iter().map(|(lon, lat)| (lon + first, lat)).collect(),
                })
            }
        }
    }

    /// Bounding box of the geometry. A point yields a zero-area box.
    pub fn bounds(&self) -> BoundingBox {
        match self {
            Geometry::Point { lon, lat } => BoundingBox::new(*lon, *lat, *lon, *lat),
            Geometry::BBox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => BoundingBox::new(*min_lon, *min_lat, *max_lon, *max_lat),
            Geometry::Polygon { ring } => {
                let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
                for &(lon, lat) in ring {
                    bbox.min_lon = bbox.min_lon.min(lon);
                    bbox.max_lon = bbox.max_lon.max(lon);
                    bbox.min_lat = bbox.min_lat.min(lat);
                    bbox.max_lat = bbox.max_lat.max(lat);
                }
                bbox
            }
        }
    }

    /// True for bboxes and for polygons that are axis-aligned rectangles.
    pub fn is_rectangular(&self) -> bool {
        match self {
            Geometry::Point { .. } => false,
            Geometry::BBox { .. } => true,
            Geometry::Polygon { ring } => {
                if ring.len() != 4 {
                    return false;
                }
                (0..4).all(|i| {
                    let (a, b) = (ring[i], ring[(i + 1) % 4]);
                    let vertical = a.0 == b.0 && a.1 != b.1;
                    let horizontal = a.1 == b.1 && a.0 != b.0;
                    vertical != horizontal
                }) && ring[0].0 != ring[2].0
                    && ring[0].1 != ring[2].1
            }
        }
    }

    /// Whether a position lies inside the geometry (boundary inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        match self {
            Geometry::Point {
                lon: p_lon,
                lat: p_lat,
            } => (lon - p_lon).abs() <= EDGE_EPSILON && (lat - p_lat).abs() <= EDGE_EPSILON,
            Geometry::BBox { .. } => self.bounds().contains(lon, lat),
            Geometry::Polygon { ring } => ring_contains(ring, lon, lat),
        }
    }

    /// Whether this is a point geometry.
    pub fn is_point(&self) -> bool {
        matches!(self, Geometry::Point { .. })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point { lon, lat } => write!(f, "POINT({} {})", lon, lat),
            Geometry::BBox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => write!(f, "{},{},{},{}", min_lon, min_lat, max_lon, max_lat),
            Geometry::Polygon { ring } => {
                write!(f, "POLYGON((")?;
                for (i, (lon, lat)) in ring.iter().chain(ring.first()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", lon, lat)?;
                }
                write!(f, "))")
            }
        }
    }
}

/// Ray casting point-in-polygon test. Points on an edge or vertex count as inside.
pub fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if on_segment((lon, lat), (xj, yj), (xi, yi)) {
            return true;
        }

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > EDGE_EPSILON {
        return false;
    }
    p.0 >= a.0.min(b.0) - EDGE_EPSILON
        && p.0 <= a.0.max(b.0) + EDGE_EPSILON
        && p.1 >= a.1.min(b.1) - EDGE_EPSILON
        && p.1 <= a.1.max(b.1) + EDGE_EPSILON
}

fn lon_span(ring: &[(f64, f64)]) -> f64 {
    let (min, max) = ring
        .iter()
        .fold((f64::MAX, f64::MIN), |(min, max), &(lon, _)| {
            (min.min(lon), max.max(lon))
        });
    max - min
}

/// Case-insensitive keyword prefix match.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let head = s.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(&s[keyword.len()..])
    } else {
        None
    }
}

/// Strip one pair of enclosing parentheses.
fn strip_parens(s: &str) -> Option<&str> {
    s.strip_prefix('(')?.strip_suffix(')')
}

/// Parse a whitespace separated `lon lat` pair.
fn parse_pair(pair: &str) -> Result<(f64, f64), GeometryParseError> {
    let pair = pair.trim();
    let parts: Vec<&str> = pair.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(GeometryParseError::InvalidWkt(format!(
            "expected 'lon lat', got '{}'",
            pair
        )));
    }

    let lon = parse_number(parts[0])?;
    let lat = parse_number(parts[1])?;
    validate_coordinates(lon, lat)?;

    Ok((lon, lat))
}

fn parse_number(s: &str) -> Result<f64, GeometryParseError> {
    let s = s.trim();
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(GeometryParseError::InvalidCoordinate(s.to_string())),
    }
}

fn validate_coordinates(lon: f64, lat: f64) -> Result<(), GeometryParseError> {
    if !(-180.0..360.0).contains(&lon) {
        return Err(GeometryParseError::OutOfRange(format!(
            "Longitude {} is out of range [-180, 360)",
            lon
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeometryParseError::OutOfRange(format!(
            "Latitude {} is out of range [-90, 90]",
            lat
        )));
    }

    Ok(())
}
