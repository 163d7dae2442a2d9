//! Parameter metadata advertised in `parameter_names`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One queryable field of a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    /// Always `"Parameter"`.
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,

    #[serde(rename = "observedProperty")]
    pub observed_property: ObservedProperty,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,

    /// `[min, max]` the values usually fall in.
    #[serde(rename = "typicalRange", skip_serializing_if = "Option::is_none")]
    pub typical_range: Option<[f32; 2]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Visualization>,
}

impl Parameter {
    /// A parameter whose observed property carries the same label.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            type_: "Parameter".to_string(),
            id: Some(id.into()),
            observed_property: ObservedProperty {
                label: Some(I18nString::english(&label)),
                description: None,
            },
            label: Some(label),
            description: None,
            unit: None,
            typical_range: None,
            visualization: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(I18nString::english(&desc.into()));
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_typical_range(mut self, min: f32, max: f32) -> Self {
        self.typical_range = Some([min, max]);
        self
    }

    pub fn with_visualization(mut self, visualization: Visualization) -> Self {
        self.visualization = Some(visualization);
        self
    }
}

/// Display hints read from field attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Visualization {
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Color map name, e.g. `viridis`.
    #[serde(rename = "colorMap", skip_serializing_if = "Option::is_none")]
    pub color_map: Option<String>,
}

/// Text that is either a bare string or keyed by language code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum I18nString {
    Simple(String),
    Localized(HashMap<String, String>),
}

impl I18nString {
    pub fn english(s: &str) -> Self {
        I18nString::Localized(HashMap::from([("en".to_string(), s.to_string())]))
    }

    /// English text if present, otherwise any translation.
    pub fn text(&self) -> &str {
        match self {
            I18nString::Simple(s) => s,
            I18nString::Localized(map) => map
                .get("en")
                .or_else(|| map.values().next())
                .map(String::as_str)
                .unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedProperty {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<I18nString>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
}

/// Unit of measurement; `symbol` is a plain string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<I18nString>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Unit {
    pub fn new(label: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            label: Some(I18nString::english(&label.into())),
            symbol: Some(symbol.into()),
        }
    }

    /// Map a CF `units` attribute to a labelled unit. Unknown symbols pass
    /// through without a label.
    pub fn from_units_attr(units: &str) -> Self {
        match units.trim() {
            "m" | "meters" | "metres" => Self::new("Meters", "m"),
            "s" | "seconds" => Self::new("Seconds", "s"),
            "degrees" | "deg" | "degree_true" | "°" => Self::new("Degrees", "degrees"),
            "K" => Self::new("Kelvin", "K"),
            "m/s" | "m s-1" => Self::new("Meters per second", "m/s"),
            other => Self {
                label: None,
                symbol: Some(other.to_string()),
            },
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }
}
