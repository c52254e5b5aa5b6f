//! Builders for the `POST /search` body and the STAC query-extension
//! predicates.
//!
//! Nothing here validates a filter: an inverted bbox or a malformed datetime
//! is sent as written and the API's rejection is what the caller gets back.

use geojson::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stac::Bbox;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub use stac_api::{Direction, Search, Sortby};

/// Chainable setters for the search fields the workflow uses.
pub trait SearchBuilder: Sized {
    fn collections<S: AsRef<str>>(self, collections: &[S]) -> Self;

    /// `[west, south, east, north]`
    fn bbox(self, west: f64, south: f64, east: f64, north: f64) -> Self;

    fn intersects(self, geometry: Geometry) -> Self;

    /// An RFC 3339 instant or an interval such as `2020-12-01/2020-12-31`.
    fn datetime(self, datetime: &str) -> Self;

    /// Adds a predicate on an item property. Repeated calls on the same
    /// property replace the earlier predicate.
    fn query(self, property: &str, predicate: Predicate) -> Self;

    /// Page size requested from the API.
    fn limit(self, limit: u64) -> Self;

    fn sortby(self, field: &str, direction: Direction) -> Self;
}

impl SearchBuilder for Search {
    fn collections<S: AsRef<str>>(mut self, collections: &[S]) -> Self {
        self.collections = Some(collections.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.items.bbox = Some(Bbox::new(west, south, east, north));
        self
    }

    fn intersects(mut self, geometry: Geometry) -> Self {
        self.intersects = Some(geometry);
        self
    }

    fn datetime(mut self, datetime: &str) -> Self {
        self.items.datetime = Some(datetime.to_string());
        self
    }

    fn query(mut self, property: &str, predicate: Predicate) -> Self {
        self.items
            .query
            .get_or_insert_with(Map::new)
            .insert(property.to_string(), predicate.into());
        self
    }

    fn limit(mut self, limit: u64) -> Self {
        self.items.limit = Some(limit);
        self
    }

    fn sortby(mut self, field: &str, direction: Direction) -> Self {
        self.items.sortby.get_or_insert_with(Vec::new).push(Sortby {
            field: field.to_string(),
            direction,
        });
        self
    }
}

/// Builds a GeoJSON polygon from a single exterior ring of `[lon, lat]`
/// positions, closing the ring if the caller did not.
pub fn polygon(ring: &[[f64; 2]]) -> Geometry {
    let mut ring: Vec<Vec<f64>> = ring.iter().map(|p| p.to_vec()).collect();
    if let (Some(first), Some(last)) = (ring.first().cloned(), ring.last()) {
        if &first != last {
            ring.push(first);
        }
    }
    Geometry::new(geojson::Value::Polygon(vec![ring]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "neq")]
    Neq,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lte")]
    Lte,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gte")]
    Gte,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "in")]
    In,
}

/// A set of comparisons on one property, e.g. `{"lt": 20}`. Every comparison
/// must hold for a value to match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate(pub BTreeMap<Operator, Value>);

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, op: Operator, value: impl Into<Value>) -> Self {
        self.0.insert(op, value.into());
        self
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Self::new().with(Operator::Eq, value)
    }

    pub fn neq(value: impl Into<Value>) -> Self {
        Self::new().with(Operator::Neq, value)
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::new().with(Operator::Lt, value)
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::new().with(Operator::Lte, value)
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::new().with(Operator::Gt, value)
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::new().with(Operator::Gte, value)
    }

    pub fn one_of(values: Vec<Value>) -> Self {
        Self::new().with(Operator::In, Value::Array(values))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a predicate back out of a search's `query` map. Operators this
    /// crate does not know make the whole entry unreadable.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Evaluates the predicate against a property value locally.
    pub fn matches(&self, value: &Value) -> bool {
        self.0.iter().all(|(op, operand)| compare(*op, value, operand))
    }
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::StartsWith => "startsWith",
            Operator::In => "in",
        }
    }
}

impl From<Predicate> for Value {
    fn from(predicate: Predicate) -> Self {
        Value::Object(
            predicate
                .0
                .into_iter()
                .map(|(op, operand)| (op.as_str().to_string(), operand))
                .collect(),
        )
    }
}

fn compare(op: Operator, value: &Value, operand: &Value) -> bool {
    match op {
        Operator::Eq => ordering(value, operand) == Some(Ordering::Equal),
        Operator::Neq => ordering(value, operand) != Some(Ordering::Equal),
        Operator::Lt => ordering(value, operand) == Some(Ordering::Less),
        Operator::Lte => matches!(
            ordering(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => ordering(value, operand) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            ordering(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::StartsWith => match (value.as_str(), operand.as_str()) {
            (Some(v), Some(prefix)) => v.starts_with(prefix),
            _ => false,
        },
        Operator::In => operand
            .as_array()
            .map(|candidates| {
                candidates
                    .iter()
                    .any(|c| ordering(value, c) == Some(Ordering::Equal))
            })
            .unwrap_or(false),
    }
}

/// Numbers compare numerically, strings lexically (which orders RFC 3339
/// timestamps correctly), anything else only by equality.
fn ordering(value: &Value, operand: &Value) -> Option<Ordering> {
    match (value, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_search_serializes_to_empty_object() {
        let json = serde_json::to_value(Search::new()).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_builder_body() {
        let search = Search::new()
            .collections(&["sentinel-2-l2a"])
            .bbox(-122.2751, 47.5469, -121.9613, 47.7458)
            .datetime("2020-12-01/2020-12-31")
            .query("eo:cloud_cover", Predicate::lt(20))
            .limit(50)
            .sortby("properties.eo:cloud_cover", Direction::Ascending);

        let json = serde_json::to_value(&search).unwrap();
        assert_eq!(json["collections"], json!(["sentinel-2-l2a"]));
        assert_eq!(json["bbox"], json!([-122.2751, 47.5469, -121.9613, 47.7458]));
        assert_eq!(json["datetime"], "2020-12-01/2020-12-31");
        assert_eq!(json["query"], json!({"eo:cloud_cover": {"lt": 20}}));
        assert_eq!(json["limit"], 50);
        assert_eq!(
            json["sortby"],
            json!([{"field": "properties.eo:cloud_cover", "direction": "asc"}])
        );
        assert!(json.get("intersects").is_none());
    }

    #[test]
    fn test_inverted_bbox_is_sent_as_written() {
        let search = Search::new().bbox(-121.9, 47.5, -122.2, 47.7);
        let json = serde_json::to_value(&search).unwrap();
        assert_eq!(json["bbox"], json!([-121.9, 47.5, -122.2, 47.7]));
    }

    #[test]
    fn test_query_replaces_earlier_predicate() {
        let search = Search::new()
            .query("eo:cloud_cover", Predicate::lt(50))
            .query("eo:cloud_cover", Predicate::lt(20));
        let query = search.items.query.as_ref().unwrap();
        assert_eq!(query.len(), 1);
        assert_eq!(
            Predicate::from_value(&query["eo:cloud_cover"]),
            Some(Predicate::lt(20))
        );
    }

    #[test]
    fn test_polygon_closes_ring() {
        let geometry = polygon(&[
            [-148.56, 60.80],
            [-147.44, 60.80],
            [-147.44, 61.18],
            [-148.56, 61.18],
        ]);
        let json = serde_json::to_value(&geometry).unwrap();
        let ring = json["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        assert_eq!(json["type"], "Polygon");

        let search = Search::new().intersects(geometry);
        assert_eq!(serde_json::to_value(&search).unwrap()["intersects"]["type"], "Polygon");
    }

    #[test]
    fn test_operator_names_match_wire_form() {
        let predicate = Predicate::new()
            .with(Operator::StartsWith, "S2")
            .with(Operator::Gte, 3);
        let value = Value::from(predicate.clone());
        assert_eq!(value, json!({"gte": 3, "startsWith": "S2"}));
        assert_eq!(serde_json::to_value(&predicate).unwrap(), value);
        assert!(Predicate::from_value(&json!({"lessThan": 3})).is_none());
    }

    #[test]
    fn test_predicate_roundtrips_query_extension_shape() {
        let predicate: Predicate =
            serde_json::from_value(json!({"gte": 10, "lt": 20})).unwrap();
        assert!(predicate.matches(&json!(10)));
        assert!(predicate.matches(&json!(19.9)));
        assert!(!predicate.matches(&json!(20)));
        assert!(!predicate.matches(&json!(9)));
    }

    #[test]
    fn test_predicate_strings_and_sets() {
        assert!(Predicate::eq("IW").matches(&json!("IW")));
        assert!(Predicate::neq("IW").matches(&json!("EW")));
        assert!(Predicate::one_of(vec![json!("IW"), json!("EW")]).matches(&json!("EW")));
        assert!(!Predicate::one_of(vec![json!("IW")]).matches(&json!("SM")));
        assert!(Predicate::new()
            .with(Operator::StartsWith, "S2")
            .matches(&json!("S2B_MSIL2A")));
        assert!(Predicate::lt("2021-01-01T00:00:00Z").matches(&json!("2020-12-06T19:07:49Z")));
    }

    #[test]
    fn test_predicate_never_matches_mismatched_types() {
        assert!(!Predicate::lt(20).matches(&json!("10")));
        assert!(!Predicate::lt(20).matches(&Value::Null));
    }
}
