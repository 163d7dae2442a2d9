//! Flat feature records produced by data queries.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::temporal::format_instant;

/// One sampled location at one time step.
///
/// Serializes as a flat object: `datetime`, `lon`, `lat`, then one entry per
/// field in declared order. Missing values are explicit `null`s.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub datetime: DateTime<Utc>,
    pub lon: f64,
    pub lat: f64,
    pub values: Vec<(String, Option<f32>)>,
}

impl FeatureRecord {
    /// Value of a named field. `None` when the field is absent, `Some(None)` when null.
    pub fn value(&self, field: &str) -> Option<Option<f32>> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| *v)
    }

    /// Field names in output order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for FeatureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.values.len()))?;
        map.serialize_entry("datetime", &format_instant(&self.datetime))?;
        map.serialize_entry("lon", &self.lon)?;
        map.serialize_entry("lat", &self.lat)?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> FeatureRecord {
        FeatureRecord {
            datetime: Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
            lon: -60.0,
            lat: 45.0,
            values: vec![
                ("swh".to_string(), Some(2.5)),
                ("perpw".to_string(), None),
                ("dirpw".to_string(), Some(270.0)),
            ],
        }
    }

    #[test]
    fn test_serialized_key_order() {
        let json = serde_json::to_string(&record()).unwrap();
        assert_eq!(
            json,
            r#"{"datetime":"2024-01-01T06:00:00Z","lon":-60.0,"lat":45.0,"swh":2.5,"perpw":null,"dirpw":270.0}"#
        );
    }

    #[test]
    fn test_value_lookup() {
        let r = record();
        assert_eq!(r.value("swh"), Some(Some(2.5)));
        assert_eq!(r.value("perpw"), Some(None));
        assert_eq!(r.value("salinity"), None);
        assert_eq!(r.field_names().collect::<Vec<_>>(), vec!["swh", "perpw", "dirpw"]);
    }
}
