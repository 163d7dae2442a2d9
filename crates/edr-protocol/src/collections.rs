//! EDR Collection types.
//!
//! A collection describes one gridded dataset: its extent, the parameters it
//! serves and the data queries it answers.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::parameters::Parameter;
use crate::types::{Extent, Link};

/// An EDR collection representing a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    /// Unique identifier for the collection.
    pub id: String,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Detailed description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Links to related resources.
    pub links: Vec<Link>,

    /// Spatial and temporal extent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,

    /// Available query types and their links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_queries: Option<DataQueries>,

    /// Coordinate reference systems supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<Vec<String>>,

    /// Output formats supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_formats: Option<Vec<String>>,

    /// Parameters available in this collection, in declared order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_names: Option<ParameterNames>,
}

impl Collection {
    /// Create a new collection with required fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            links: Vec::new(),
            extent: None,
            data_queries: None,
            crs: None,
            output_formats: None,
            parameter_names: None,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the extent.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Set the data queries.
    pub fn with_data_queries(mut self, queries: DataQueries) -> Self {
        self.data_queries = Some(queries);
        self
    }

    /// Set supported CRS.
    pub fn with_crs(mut self, crs: Vec<String>) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Set output formats.
    pub fn with_output_formats(mut self, formats: Vec<String>) -> Self {
        self.output_formats = Some(formats);
        self
    }

    /// Set parameters.
    pub fn with_parameters(mut self, params: Vec<(String, Parameter)>) -> Self {
        self.parameter_names = Some(ParameterNames(params));
        self
    }

    /// Build standard links for a collection.
    pub fn build_links(&mut self, base_url: &str) {
        let collection_url = format!("{}/collections/{}", base_url, self.id);
        self.links = vec![
            Link::new(&collection_url, "self").with_type("application/json"),
            Link::new(base_url, "root").with_type("application/json"),
        ];
    }
}

/// Parameters keyed by name, serialized as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterNames(pub Vec<(String, Parameter)>);

impl ParameterNames {
    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    /// Parameter names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ParameterNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, param) in &self.0 {
            map.serialize_entry(name, param)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterNames {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ParameterNames;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, param)) = access.next_entry::<String, Parameter>()? {
                    entries.push((name, param));
                }
                Ok(ParameterNames(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Supported data query types for a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DataQueries {
    /// Position query (point sampling).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<QueryDescription>,

    /// Area query (polygon or bbox sampling).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<QueryDescription>,
}

impl DataQueries {
    /// Create a new DataQueries with position query enabled.
    pub fn with_position(base_url: &str, collection_id: &str) -> Self {
        Self {
            position: Some(QueryDescription::new(base_url, collection_id, "position")),
            ..Default::default()
        }
    }

    /// Add area query support.
    pub fn with_area(mut self, base_url: &str, collection_id: &str) -> Self {
        self.area = Some(QueryDescription::new(base_url, collection_id, "area"));
        self
    }
}

/// Description of a query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDescription {
    /// Link to the query endpoint.
    pub link: Link,

    /// Variables specific to this query type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<QueryVariables>,
}

impl QueryDescription {
    fn new(base_url: &str, collection_id: &str, query_type: &str) -> Self {
        let mut title = query_type.to_string();
        if let Some(first) = title.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        Self {
            link: Link::new(
                format!("{}/collections/{}/{}", base_url, collection_id, query_type),
                "data",
            )
            .with_type(crate::media_types::GEO_JSON)
            .with_title(format!("{} query", title)),
            variables: Some(QueryVariables {
                query_type: query_type.to_string(),
                output_formats: vec!["GeoJSON".to_string()],
            }),
        }
    }
}

/// Variables advertised for a query type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryVariables {
    /// The query type name (`position`, `area`).
    pub query_type: String,

    /// Formats the query can return.
    pub output_formats: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_builder() {
        let collection = Collection::new("gfswave")
            .with_title("GFS Wave Model Forecast")
            .with_description("Global wave forecast data");

        assert_eq!(collection.id, "gfswave");
        assert_eq!(collection.title, Some("GFS Wave Model Forecast".to_string()));
        assert_eq!(
            collection.description,
            Some("Global wave forecast data".to_string())
        );
    }

    #[test]
    fn test_collection_build_links() {
        let mut collection = Collection::new("gfswave");
        collection.build_links("http://localhost:8000/edr");

        assert_eq!(collection.links.len(), 2);
        assert!(collection
            .links
            .iter()
            .any(|l| l.rel == "self" && l.href == "http://localhost:8000/edr/collections/gfswave"));
    }

    #[test]
    fn test_data_queries() {
        let queries = DataQueries::with_position("http://localhost:8000", "gfswave")
            .with_area("http://localhost:8000", "gfswave");

        let position = queries.position.as_ref().unwrap();
        assert_eq!(position.link.href, "http://localhost:8000/collections/gfswave/position");
        assert_eq!(position.link.title.as_deref(), Some("Position query"));
        assert_eq!(
            queries.area.as_ref().unwrap().variables.as_ref().unwrap().query_type,
            "area"
        );
    }

    #[test]
    fn test_parameter_names_preserve_order() {
        let collection = Collection::new("gfswave").with_parameters(vec![
            ("swh".to_string(), Parameter::new("swh", "Significant Wave Height")),
            ("perpw".to_string(), Parameter::new("perpw", "Primary Wave Period")),
            ("dirpw".to_string(), Parameter::new("dirpw", "Primary Wave Direction")),
        ]);

        let json = serde_json::to_string(&collection).unwrap();
        let swh = json.find("\"swh\"").unwrap();
        let perpw = json.find("\"perpw\"").unwrap();
        let dirpw = json.find("\"dirpw\"").unwrap();
        assert!(swh < perpw && perpw < dirpw);

        let back: Collection = serde_json::from_str(&json).unwrap();
        let names: Vec<&str> = back.parameter_names.as_ref().unwrap().names().collect();
        assert_eq!(names, vec!["swh", "perpw", "dirpw"]);
    }

    #[test]
    fn test_parameter_names_lookup() {
        let params = ParameterNames(vec![("swh".to_string(), Parameter::new("swh", "Height"))]);
        assert!(params.get("swh").is_some());
        assert!(params.get("perpw").is_none());
        assert_eq!(params.len(), 1);
    }
}
