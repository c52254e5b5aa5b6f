//! In-memory inspection of materialized search results.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use stac::{Asset, Item, ItemCollection};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::search::{Direction, Predicate};

/// Property lookups by the names a STAC query uses.
pub trait ItemExt {
    /// The value of a property, including the typed datetime fields.
    fn property(&self, name: &str) -> Option<Value>;

    fn property_f64(&self, name: &str) -> Option<f64> {
        self.property(name)?.as_f64()
    }

    /// The nominal acquisition time. Items with a datetime range and a null
    /// `datetime` fall back to `start_datetime`.
    fn datetime(&self) -> Option<DateTime<Utc>>;

    fn cloud_cover(&self) -> Option<f64> {
        self.property_f64("eo:cloud_cover")
    }

    fn asset(&self, name: &str) -> Option<&Asset>;
}

impl ItemExt for Item {
    fn property(&self, name: &str) -> Option<Value> {
        let typed = match name {
            "datetime" => self.properties.datetime,
            "start_datetime" => self.properties.start_datetime,
            "end_datetime" => self.properties.end_datetime,
            _ => return self.properties.additional_fields.get(name).cloned(),
        };
        typed.map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
    }

    fn datetime(&self) -> Option<DateTime<Utc>> {
        self.properties.datetime.or(self.properties.start_datetime)
    }

    fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }
}

/// A finite, fully loaded set of items. Iterating it never goes back to the
/// server, so it can be walked any number of times.
#[derive(Debug, Clone, Default)]
pub struct ItemSet {
    items: Vec<Item>,
}

impl ItemSet {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// The item with the smallest numeric value of `property`; the first one
    /// wins a tie. Items without the property are ignored.
    pub fn min_by_property(&self, property: &str) -> Option<&Item> {
        self.items
            .iter()
            .filter_map(|item| Some((item, item.property_f64(property)?)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(item, _)| item)
    }

    pub fn max_by_property(&self, property: &str) -> Option<&Item> {
        self.items
            .iter()
            .filter_map(|item| Some((item, item.property_f64(property)?)))
            .rev()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(item, _)| item)
    }

    /// Stable sort on a property; items lacking it go last in either direction.
    pub fn sort_by_property(&mut self, property: &str, direction: Direction) {
        self.items.sort_by(|a, b| {
            match (a.property(property), b.property(property)) {
                (Some(x), Some(y)) => {
                    let ord = compare_values(&x, &y);
                    match direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                }
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
    }

    /// Items whose `property` satisfies `predicate`. An item without the
    /// property never matches.
    pub fn filter(&self, property: &str, predicate: &Predicate) -> ItemSet {
        let items = self
            .items
            .iter()
            .filter(|item| {
                item.property(property)
                    .map(|v| predicate.matches(&v))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        ItemSet::new(items)
    }

    pub fn retain_with_asset(&mut self, asset: &str) {
        self.items.retain(|i| i.assets.contains_key(asset));
    }

    pub fn collections(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter_map(|i| i.collection.clone())
            .collect()
    }

    pub fn distinct_datetimes(&self) -> BTreeSet<DateTime<Utc>> {
        self.items.iter().filter_map(ItemExt::datetime).collect()
    }

    /// A plain-text table with `id`, `datetime` and the requested property
    /// columns, one row per item.
    pub fn table(&self, columns: &[&str]) -> String {
        let mut header = vec!["id".to_string(), "datetime".to_string()];
        header.extend(columns.iter().map(|c| c.to_string()));

        let rows: Vec<Vec<String>> = self
            .items
            .iter()
            .map(|item| {
                let mut row = vec![
                    item.id.clone(),
                    item.datetime()
                        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ];
                row.extend(columns.iter().map(|c| cell(item.property(c).as_ref())));
                row
            })
            .collect();

        let widths: Vec<usize> = (0..header.len())
            .map(|col| {
                rows.iter()
                    .map(|r| r[col].len())
                    .chain(std::iter::once(header[col].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        for row in std::iter::once(&header).chain(rows.iter()) {
            let line = row
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{value:<width$}"))
                .collect::<Vec<_>>()
                .join("  ");
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }

    pub fn to_item_collection(&self) -> ItemCollection {
        ItemCollection::from(self.items.clone())
    }

    /// Writes the set as a GeoJSON FeatureCollection for viewing in a GIS.
    pub fn write_geojson<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_item_collection())?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl From<ItemCollection> for ItemSet {
    fn from(page: ItemCollection) -> Self {
        ItemSet::new(page.items)
    }
}

impl IntoIterator for ItemSet {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ItemSet {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.2}"),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}
