//! Immutable description of a loaded dataset.
//!
//! A [`DatasetDescriptor`] holds everything the catalog needs to answer
//! metadata and index questions without touching chunk payloads: the
//! collection identity, the ordered field schema and the three coordinate
//! axes. Constructors validate the invariants once, at load time.

use std::collections::HashSet;
use std::ops::Range;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use edr_protocol::{LongitudeConvention, Visualization};
use serde::{Deserialize, Serialize};

use crate::error::{GridProcessorError, Result};

/// Names that collide with the fixed keys of a feature record.
const RESERVED_FIELD_NAMES: [&str; 3] = ["datetime", "lon", "lat"];

/// Direction of a strictly monotonic axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    Ascending,
    Descending,
}

/// A strictly monotonic 1-D coordinate axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    name: String,
    values: Vec<f64>,
    order: AxisOrder,
}

impl Axis {
    /// Build an axis, rejecting empty, non-finite or non-monotonic values.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();

        if values.is_empty() {
            return Err(GridProcessorError::invalid_metadata(format!(
                "axis '{}' is empty",
                name
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(GridProcessorError::invalid_metadata(format!(
                "axis '{}' contains non-finite value {}",
                name, bad
            )));
        }

        let order = if values.len() < 2 || values[1] > values[0] {
            AxisOrder::Ascending
        } else {
            AxisOrder::Descending
        };

        let monotonic = values.windows(2).all(|w| match order {
            AxisOrder::Ascending => w[1] > w[0],
            AxisOrder::Descending => w[1] < w[0],
        });
        if !monotonic {
            return Err(GridProcessorError::invalid_metadata(format!(
                "axis '{}' is not strictly monotonic",
                name
            )));
        }

        Ok(Self {
            name,
            values,
            order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn order(&self) -> AxisOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Smallest value on the axis.
    pub fn min(&self) -> f64 {
        match self.order {
            AxisOrder::Ascending => self.values[0],
            AxisOrder::Descending => self.values[self.values.len() - 1],
        }
    }

    /// Largest value on the axis.
    pub fn max(&self) -> f64 {
        match self.order {
            AxisOrder::Ascending => self.values[self.values.len() - 1],
            AxisOrder::Descending => self.values[0],
        }
    }

    /// Whether `v` lies within `[min, max]`.
    pub fn spans(&self, v: f64) -> bool {
        v >= self.min() && v <= self.max()
    }

    /// Index of the sample nearest to `v`; ties resolve to the lower index.
    ///
    /// Returns `None` when `v` is outside `[min, max]`.
    pub fn nearest(&self, v: f64) -> Option<usize> {
        if !self.spans(v) {
            return None;
        }

        // First index at or past `v` in axis order.
        let upper = match self.order {
            AxisOrder::Ascending => self.values.partition_point(|&x| x < v),
            AxisOrder::Descending => self.values.partition_point(|&x| x > v),
        };

        if upper == 0 {
            return Some(0);
        }
        if upper == self.values.len() {
            return Some(self.values.len() - 1);
        }

        let below = (self.values[upper - 1] - v).abs();
        let above = (self.values[upper] - v).abs();
        Some(if below <= above { upper - 1 } else { upper })
    }

    /// Index range of samples with `lo <= value <= hi`.
    ///
    /// Returns `None` when `[lo, hi]` does not intersect `[min, max]`; an
    /// intersecting interval that falls between two samples gives an empty range.
    pub fn covering(&self, lo: f64, hi: f64) -> Option<Range<usize>> {
        if hi < self.min() || lo > self.max() {
            return None;
        }

        let (start, end) = match self.order {
            AxisOrder::Ascending => (
                self.values.partition_point(|&x| x < lo),
                self.values.partition_point(|&x| x <= hi),
            ),
            AxisOrder::Descending => (
                self.values.partition_point(|&x| x > hi),
                self.values.partition_point(|&x| x >= lo),
            ),
        };

        Some(start..end.max(start))
    }
}

/// The time axis: strictly increasing UTC instants.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    instants: Vec<DateTime<Utc>>,
    seconds: Axis,
}

impl TimeAxis {
    /// Build a time axis from instants, which must be strictly increasing.
    pub fn new(name: impl Into<String>, instants: Vec<DateTime<Utc>>) -> Result<Self> {
        let name = name.into();
        if instants.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GridProcessorError::invalid_metadata(format!(
                "time axis '{}' is not strictly increasing",
                name
            )));
        }
        let seconds = Axis::new(name, instants.iter().map(epoch_seconds).collect())?;
        Ok(Self { instants, seconds })
    }

    /// Build a time axis from CF-style offsets and a `units` attribute.
    pub fn from_cf(name: impl Into<String>, offsets: &[i64], units: &str) -> Result<Self> {
        let (step, epoch) = parse_cf_time_units(units)?;
        let instants = offsets
            .iter()
            .map(|&n| {
                n.checked_mul(step)
                    .and_then(Duration::try_seconds)
                    .and_then(|d| epoch.checked_add_signed(d))
                    .ok_or_else(|| {
                        GridProcessorError::invalid_metadata(format!(
                            "time offset {} {} overflows",
                            n, units
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, instants)
    }

    pub fn instants(&self) -> &[DateTime<Utc>] {
        &self.instants
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    pub fn first(&self) -> DateTime<Utc> {
        self.instants[0]
    }

    pub fn last(&self) -> DateTime<Utc> {
        self.instants[self.instants.len() - 1]
    }

    /// Index of the time step nearest to `t`; ties resolve to the earlier step.
    pub fn nearest(&self, t: &DateTime<Utc>) -> Option<usize> {
        self.seconds.nearest(epoch_seconds(t))
    }

    /// Index range of time steps within `[start, end]`.
    pub fn covering(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Option<Range<usize>> {
        self.seconds
            .covering(epoch_seconds(start), epoch_seconds(end))
    }
}

fn epoch_seconds(t: &DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9
}

/// Parse `"<seconds|minutes|hours|days> since <instant>"`.
///
/// Returns the unit length in seconds and the epoch. Instants without an
/// offset are taken as UTC.
pub fn parse_cf_time_units(units: &str) -> Result<(i64, DateTime<Utc>)> {
    let invalid = || {
        GridProcessorError::invalid_metadata(format!(
            "unsupported time units '{}': expected '<unit> since <instant>'",
            units
        ))
    };

    let (unit, epoch) = units.trim().split_once(" since ").ok_or_else(invalid)?;

    let step = match unit.trim().to_lowercase().as_str() {
        "seconds" | "second" | "s" => 1,
        "minutes" | "minute" | "min" => 60,
        "hours" | "hour" | "h" => 3600,
        "days" | "day" | "d" => 86_400,
        _ => return Err(invalid()),
    };

    let epoch = epoch.trim();
    let epoch = DateTime::parse_from_rfc3339(epoch)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(epoch, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(epoch, "%Y-%m-%dT%H:%M:%S"))
                .map(|naive| naive.and_utc())
        })
        .or_else(|_| {
            NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
                .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        })
        .map_err(|_| invalid())?;

    Ok((step, epoch))
}

/// Unit of a field: a label and a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUnit {
    pub label: String,
    pub symbol: String,
}

/// Schema of one scalar field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub long_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<FieldUnit>,
    pub typical_range: Option<(f32, f32)>,
    pub visualization: Option<Visualization>,
    /// Sentinel that marks a missing sample.
    pub fill_value: f32,
    /// Chunk shape as `[time, lat, lon]`.
    pub chunk_shape: [u64; 3],
}

impl FieldDescriptor {
    /// Create a field with no descriptive metadata and a NaN sentinel.
    pub fn new(name: impl Into<String>, chunk_shape: [u64; 3]) -> Self {
        Self {
            name: name.into(),
            long_name: None,
            description: None,
            unit: None,
            typical_range: None,
            visualization: None,
            fill_value: f32::NAN,
            chunk_shape,
        }
    }

    /// Whether a stored value is missing.
    pub fn is_missing(&self, value: f32) -> bool {
        !value.is_finite() || value == self.fill_value
    }

    /// Human readable label, falling back to the field name.
    pub fn label(&self) -> &str {
        self.visualization
            .as_ref()
            .and_then(|v| v.display_name.as_deref())
            .or(self.long_name.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Collection manifest stored at the store root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Field names in declared order.
    pub fields: Vec<String>,
}

/// Everything known about a dataset apart from its chunk payloads.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    fields: Vec<FieldDescriptor>,
    lat: Axis,
    lon: Axis,
    time: TimeAxis,
    convention: LongitudeConvention,
}

impl DatasetDescriptor {
    /// Assemble and validate a descriptor.
    pub fn new(
        manifest: Manifest,
        fields: Vec<FieldDescriptor>,
        lat: Axis,
        lon: Axis,
        time: TimeAxis,
    ) -> Result<Self> {
        if fields.is_empty() {
            return Err(GridProcessorError::invalid_metadata(format!(
                "dataset '{}' declares no fields",
                manifest.id
            )));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                return Err(GridProcessorError::invalid_metadata(format!(
                    "field name '{}' is reserved",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(GridProcessorError::invalid_metadata(format!(
                    "field '{}' declared twice",
                    field.name
                )));
            }
            if field.chunk_shape.contains(&0) {
                return Err(GridProcessorError::invalid_metadata(format!(
                    "field '{}' has a zero chunk dimension",
                    field.name
                )));
            }
        }

        if lat.min() < -90.0 || lat.max() > 90.0 {
            return Err(GridProcessorError::invalid_metadata(format!(
                "latitude axis [{}, {}] exceeds [-90, 90]",
                lat.min(),
                lat.max()
            )));
        }
        if lon.min() < -180.0 || lon.max() > 360.0 {
            return Err(GridProcessorError::invalid_metadata(format!(
                "longitude axis [{}, {}] exceeds [-180, 360]",
                lon.min(),
                lon.max()
            )));
        }

        let convention = LongitudeConvention::from_axis_max(lon.max());

        Ok(Self {
            id: manifest.id,
            title: manifest.title,
            description: manifest.description,
            fields,
            lat,
            lon,
            time,
            convention,
        })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn lat(&self) -> &Axis {
        &self.lat
    }

    pub fn lon(&self) -> &Axis {
        &self.lon
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    /// Longitude convention of the store.
    pub fn convention(&self) -> LongitudeConvention {
        self.convention
    }

    /// Array shape shared by every field, `[time, lat, lon]`.
    pub fn shape(&self) -> [u64; 3] {
        [
            self.time.len() as u64,
            self.lat.len() as u64,
            self.lon.len() as u64,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn axis(values: &[f64]) -> Axis {
        Axis::new("a", values.to_vec()).unwrap()
    }

    #[test]
    fn test_axis_rejects_non_monotonic() {
        assert!(Axis::new("lat", vec![0.0, 1.0, 1.0]).is_err());
        assert!(Axis::new("lat", vec![0.0, 2.0, 1.0]).is_err());
        assert!(Axis::new("lat", vec![]).is_err());
        assert!(Axis::new("lat", vec![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_nearest_ascending_ties_to_lower() {
        let a = axis(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(a.nearest(0.0), Some(0));
        assert_eq!(a.nearest(1.4), Some(1));
        assert_eq!(a.nearest(1.5), Some(1));
        assert_eq!(a.nearest(1.6), Some(2));
        assert_eq!(a.nearest(3.0), Some(3));
        assert_eq!(a.nearest(3.1), None);
        assert_eq!(a.nearest(-0.1), None);
    }

    #[test]
    fn test_nearest_descending_ties_to_lower() {
        let a = axis(&[90.0, 45.0, 0.0, -45.0, -90.0]);
        assert_eq!(a.order(), AxisOrder::Descending);
        assert_eq!(a.nearest(90.0), Some(0));
        assert_eq!(a.nearest(67.5), Some(0));
        assert_eq!(a.nearest(60.0), Some(1));
        assert_eq!(a.nearest(-90.0), Some(4));
        assert_eq!(a.min(), -90.0);
        assert_eq!(a.max(), 90.0);
    }

    #[test]
    fn test_covering_ascending() {
        let a = axis(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(a.covering(0.5, 2.5), Some(1..3));
        assert_eq!(a.covering(1.0, 2.0), Some(1..3));
        assert_eq!(a.covering(-5.0, 0.0), Some(0..1));
        assert_eq!(a.covering(1.2, 1.8), Some(2..2));
        assert_eq!(a.covering(3.5, 4.0), None);
    }

    #[test]
    fn test_covering_descending() {
        let a = axis(&[3.0, 2.0, 1.0, 0.0]);
        assert_eq!(a.covering(0.5, 2.5), Some(1..3));
        assert_eq!(a.covering(-1.0, 10.0), Some(0..4));
        assert_eq!(a.covering(1.2, 1.8).map(|r| r.is_empty()), Some(true));
        assert_eq!(a.covering(-3.0, -1.0), None);
    }

    #[test]
    fn test_parse_cf_time_units() {
        let (step, epoch) = parse_cf_time_units("hours since 2024-01-01T00:00:00Z").unwrap();
        assert_eq!(step, 3600);
        assert_eq!(epoch, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let (step, epoch) = parse_cf_time_units("days since 1970-01-01").unwrap();
        assert_eq!(step, 86_400);
        assert_eq!(epoch.timestamp(), 0);

        assert!(parse_cf_time_units("fortnights since 2024-01-01").is_err());
        assert!(parse_cf_time_units("hours").is_err());
    }

    #[test]
    fn test_time_axis_from_cf() {
        let axis = TimeAxis::from_cf("time", &[0, 3, 6], "hours since 2024-01-01 00:00:00").unwrap();
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.last(), Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());

        let t = Utc.with_ymd_and_hms(2024, 1, 1, 1, 30, 0).unwrap();
        assert_eq!(axis.nearest(&t), Some(0));
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 1, 31, 0).unwrap();
        assert_eq!(axis.nearest(&t), Some(1));

        assert!(TimeAxis::from_cf("time", &[0, 0], "hours since 2024-01-01").is_err());
    }

    #[test]
    fn test_descriptor_rejects_reserved_and_duplicate_names() {
        let manifest = Manifest {
            id: "t".to_string(),
            title: "t".to_string(),
            description: None,
            fields: vec![],
        };
        let time = TimeAxis::from_cf("time", &[0], "hours since 2024-01-01").unwrap();
        let build = |fields: Vec<FieldDescriptor>| {
            DatasetDescriptor::new(manifest.clone(), fields, axis(&[0.0, 1.0]), axis(&[0.0, 1.0]), time.clone())
        };

        assert!(build(vec![FieldDescriptor::new("lat", [1, 1, 1])]).is_err());
        assert!(build(vec![
            FieldDescriptor::new("swh", [1, 1, 1]),
            FieldDescriptor::new("swh", [1, 1, 1])
        ])
        .is_err());
        assert!(build(vec![]).is_err());
        assert!(build(vec![FieldDescriptor::new("swh", [1, 0, 1])]).is_err());
        assert!(build(vec![FieldDescriptor::new("swh", [1, 1, 1])]).is_ok());
    }

    #[test]
    fn test_convention_derived_from_lon_axis() {
        let manifest = Manifest {
            id: "t".to_string(),
            title: "t".to_string(),
            description: None,
            fields: vec!["swh".to_string()],
        };
        let time = TimeAxis::from_cf("time", &[0], "hours since 2024-01-01").unwrap();
        let d = DatasetDescriptor::new(
            manifest,
            vec![FieldDescriptor::new("swh", [1, 2, 2])],
            axis(&[-10.0, 0.0, 10.0]),
            axis(&[0.0, 120.0, 240.0, 359.5]),
            time,
        )
        .unwrap();
        assert_eq!(d.convention(), LongitudeConvention::ZeroTo360);
        assert_eq!(d.shape(), [1, 3, 4]);
    }

    #[test]
    fn test_field_missing_values() {
        let mut f = FieldDescriptor::new("swh", [1, 1, 1]);
        assert!(f.is_missing(f32::NAN));
        assert!(!f.is_missing(1.0));
        f.fill_value = -9999.0;
        assert!(f.is_missing(-9999.0));
        assert!(f.is_missing(f32::INFINITY));
    }
}
