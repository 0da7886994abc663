use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the synthetic `"lat,lon"` point field.
pub const POINT_FIELD: &str = "lat_long";

#[derive(Debug, Clone, Serialize, Deserialize, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub enum FacetValue {
    String(String),
    Int(i64),
}

impl FacetValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FacetValue::Int(i) => Some(*i as f64),
            FacetValue::String(s) => s.parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FacetValue::Int(i) => Some(*i),
            FacetValue::String(s) => s.parse().ok(),
        }
    }
}

impl std::fmt::Display for FacetValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacetValue::String(s) => f.write_str(s),
            FacetValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for FacetValue {
    fn from(value: &str) -> Self {
        FacetValue::String(value.to_string())
    }
}

impl From<String> for FacetValue {
    fn from(value: String) -> Self {
        FacetValue::String(value)
    }
}

impl From<i64> for FacetValue {
    fn from(value: i64) -> Self {
        FacetValue::Int(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Facet buckets for this value; lists contribute one bucket per element.
    pub fn facet_values(&self) -> Vec<FacetValue> {
        match self {
            FieldValue::Str(s) => vec![FacetValue::String(s.clone())],
            FieldValue::Int(i) => vec![FacetValue::Int(*i)],
            FieldValue::Float(f) => vec![FacetValue::String(f.to_string())],
            FieldValue::Bool(b) => vec![FacetValue::String(b.to_string())],
            FieldValue::List(items) => items.iter().flat_map(|i| i.facet_values()).collect(),
        }
    }

    pub fn matches(&self, value: &FacetValue) -> bool {
        match (self, value) {
            (FieldValue::List(items), _) => items.iter().any(|i| i.matches(value)),
            (FieldValue::Str(s), FacetValue::String(v)) => s.eq_ignore_ascii_case(v),
            (FieldValue::Int(i), FacetValue::Int(v)) => i == v,
            (FieldValue::Float(f), v) => v.as_f64().is_some_and(|v| v == *f),
            (FieldValue::Int(i), FacetValue::String(v)) => v.parse::<i64>().is_ok_and(|v| v == *i),
            (FieldValue::Str(s), FacetValue::Int(v)) => s.parse::<i64>().is_ok_and(|s| s == *v),
            (FieldValue::Bool(b), FacetValue::String(v)) => v.parse::<bool>().is_ok_and(|v| v == *b),
            (FieldValue::Bool(_), FacetValue::Int(_)) => false,
        }
    }

    /// Text form used for output rows and free-text matching.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::List(items) => items.iter().map(|i| i.to_text()).collect::<Vec<_>>().join("|"),
        }
    }
}

/// One occurrence record as returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Document {
    pub id: String,
    pub data_source_id: String,
    pub scientific_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sensitive_latitude: Option<f64>,
    pub sensitive_longitude: Option<f64>,
    pub year: Option<i64>,
    pub extra: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: impl Into<String>, data_source_id: impl Into<String>) -> Self {
        Self { id: id.into(), data_source_id: data_source_id.into(), ..Default::default() }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.set(&field.into(), value);
        self
    }

    /// Resolves typed fields first, then the extension map.
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(FieldValue::Str(self.id.clone())),
            "data_resource_uid" | "data_source_id" => Some(FieldValue::Str(self.data_source_id.clone())),
            "scientific_name" => self.scientific_name.clone().map(FieldValue::Str),
            "latitude" => self.latitude.map(FieldValue::Float),
            "longitude" => self.longitude.map(FieldValue::Float),
            "sensitive_latitude" => self.sensitive_latitude.map(FieldValue::Float),
            "sensitive_longitude" => self.sensitive_longitude.map(FieldValue::Float),
            "year" => self.year.map(FieldValue::Int),
            POINT_FIELD => match (self.latitude, self.longitude) {
                (Some(lat), Some(lon)) => Some(FieldValue::Str(format!("{},{}", lat, lon))),
                _ => None,
            },
            _ => self.extra.get(field).cloned(),
        }
    }

    pub fn set(&mut self, field: &str, value: FieldValue) {
        match field {
            "id" => self.id = value.to_text(),
            "data_resource_uid" | "data_source_id" => self.data_source_id = value.to_text(),
            "scientific_name" => self.scientific_name = Some(value.to_text()),
            "latitude" => self.latitude = value.as_f64(),
            "longitude" => self.longitude = value.as_f64(),
            "sensitive_latitude" => self.sensitive_latitude = value.as_f64(),
            "sensitive_longitude" => self.sensitive_longitude = value.as_f64(),
            "year" => self.year = value.as_f64().map(|y| y as i64),
            _ => {
                self.extra.insert(field.to_string(), value);
            }
        }
    }

    pub fn clear(&mut self, field: &str) {
        match field {
            "scientific_name" => self.scientific_name = None,
            "latitude" => self.latitude = None,
            "longitude" => self.longitude = None,
            "sensitive_latitude" => self.sensitive_latitude = None,
            "sensitive_longitude" => self.sensitive_longitude = None,
            "year" => self.year = None,
            _ => {
                self.extra.remove(field);
            }
        }
    }

    pub fn has_sensitive_coordinates(&self) -> bool {
        self.sensitive_latitude.is_some() && self.sensitive_longitude.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResultPage {
    pub documents: Vec<Document>,
    pub total: u64,
    pub facets: Vec<FacetResult>,
}

impl ResultPage {
    pub fn facet(&self, field: &str) -> Option<&FacetResult> {
        self.facets.iter().find(|f| f.facet_field == field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FacetResult {
    pub facet_field: String,
    pub facet_values: Vec<FacetItem>,
}

impl FacetResult {
    pub fn new(facet_field: impl Into<String>) -> Self {
        Self { facet_field: facet_field.into(), facet_values: Vec::new() }
    }

    pub fn total_count(&self) -> u64 {
        self.facet_values.iter().map(|v| v.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetItem {
    pub display_string: String,
    pub original_value: FacetValue,
    pub count: u64,
}

impl FacetItem {
    pub fn new(original_value: FacetValue, count: u64) -> Self {
        Self { display_string: original_value.to_string(), original_value, count }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total_records: u64,
    pub start: u64,
    pub page_size: u64,
    pub query: String,
    pub occurrences: Vec<Document>,
    pub facet_results: Vec<FacetResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatsItem {
    pub field: String,
    /// Facet value this row is restricted to, when grouped.
    pub facet_value: Option<FacetValue>,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointType {
    Point1,
    Point01,
    Point001,
    Point0001,
}

impl PointType {
    pub fn decimal_places(&self) -> u32 {
        match self {
            PointType::Point1 => 0,
            PointType::Point01 => 1,
            PointType::Point001 => 2,
            PointType::Point0001 => 3,
        }
    }

    pub fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.decimal_places() as i32);
        (value * scale).round() / scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrencePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutlierStats {
    pub record_id: String,
    pub layer_id: String,
    pub record_layer_value: f64,
    pub sample_size: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_resolves_typed_extension_and_point_fields() {
        let doc = Document { latitude: Some(-33.8), longitude: Some(151.2), ..Document::new("r1", "dr1") }
            .with_field("genus", FieldValue::Str("Macropus".to_string()))
            .with_field("year", FieldValue::Int(1998));
        assert_eq!(doc.year, Some(1998));
        assert_eq!(doc.get("data_resource_uid"), Some(FieldValue::Str("dr1".to_string())));
        assert_eq!(doc.get("genus"), Some(FieldValue::Str("Macropus".to_string())));
        assert_eq!(doc.get(POINT_FIELD), Some(FieldValue::Str("-33.8,151.2".to_string())));
        assert_eq!(doc.get("state"), None);
    }

    #[test]
    fn list_values_match_any_element() {
        let value = FieldValue::List(vec![FieldValue::Str("NSW".to_string()), FieldValue::Int(3)]);
        assert!(value.matches(&FacetValue::from("nsw")));
        assert!(value.matches(&FacetValue::Int(3)));
        assert!(!value.matches(&FacetValue::from("VIC")));
        assert_eq!(value.facet_values().len(), 2);
    }

    #[test]
    fn point_precision_rounds() {
        assert_eq!(PointType::Point1.round(151.26), 151.0);
        assert_eq!(PointType::Point001.round(-33.8671), -33.87);
    }
}
