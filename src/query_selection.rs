use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::search::{polygon, Operator, Predicate, Search, SearchBuilder};

/// A saved query: where to search, what to filter on and which assets to
/// load from the matches.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct QuerySelection {
    pub id: String,
    pub catalog: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    docs: Option<String>,
    #[serde(default)]
    pub collections: Vec<String>,
    /// `[west, south, east, north]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// Exterior ring of an area of interest, `[lon, lat]` pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    query: Vec<QueryTerm>,
    #[serde(default)]
    assets: Vec<AssetSelection>,
}

/// One comparison, e.g. `eo:cloud_cover lt 20`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct QueryTerm {
    pub property: String,
    pub op: Operator,
    pub value: Value,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AssetSelection {
    pub id: String,
    pub name: String,
    load: bool,
}

impl QuerySelection {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let selection: Self = toml::from_str(&content)?;
        Ok(selection)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let selection: Self = toml::from_str(&table.to_string())?;
        Ok(selection)
    }

    /// The search request this selection describes. Terms on the same
    /// property are combined into one predicate.
    pub fn to_search(&self) -> Search {
        let mut search = Search::new();
        if !self.collections.is_empty() {
            search = search.collections(self.collections.as_slice());
        }
        if let Some([west, south, east, north]) = self.bbox {
            search = search.bbox(west, south, east, north);
        }
        if let Some(ring) = &self.intersects {
            search = search.intersects(polygon(ring));
        }
        if let Some(datetime) = &self.datetime {
            search = search.datetime(datetime);
        }
        let mut predicates: BTreeMap<&str, Predicate> = BTreeMap::new();
        for term in &self.query {
            let predicate = predicates.remove(term.property.as_str()).unwrap_or_default();
            predicates.insert(&term.property, predicate.with(term.op, term.value.clone()));
        }
        for (property, predicate) in predicates {
            search = search.query(property, predicate);
        }
        search.ids(self.ids_to_fetch())
    }

    pub fn assets_to_load(&self) -> Option<Vec<AssetSelection>> {
        let to_load = self
            .assets
            .iter()
            .filter(|a| a.load)
            .cloned()
            .collect::<Vec<_>>();
        if to_load.is_empty() {
            return None;
        }
        Some(to_load)
    }

    /// Asset keys to load, failing when none is selected.
    pub fn asset_keys(&self) -> Result<Vec<String>> {
        let assets = self
            .assets_to_load()
            .ok_or(anyhow!("No assets selected for loading in '{}'", self.id))?;
        Ok(assets.into_iter().map(|a| a.id).collect())
    }

    /// Ids with duplicates removed, in their original order.
    pub fn ids_to_fetch(&self) -> Option<Vec<String>> {
        if self.ids.is_empty() {
            return None;
        }
        let mut seen = HashSet::new();
        let ids = self
            .ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        Some(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{element84, planetary_computer};
    use serde_json::json;

    fn planetary_computer_template() -> QuerySelection {
        QuerySelection::from_template(&planetary_computer::sentinel_2_l2a::query_selection_toml())
            .unwrap()
    }

    #[test]
    fn test_template() {
        let selection = planetary_computer_template();
        assert_eq!(selection.id, "planetary-computer.sentinel-2-l2a");
        assert_eq!(selection.assets.len(), 4);
        assert_eq!(selection.bbox, Some([-122.2751, 47.5469, -121.9613, 47.7458]));

        let selection =
            QuerySelection::from_template(&element84::sentinel_2_c1_l2a::query_selection_toml())
                .unwrap();
        assert_eq!(selection.collections, vec!["sentinel-2-c1-l2a"]);
        assert!(selection.ids_to_fetch().is_none());
    }

    #[test]
    fn test_write_and_read_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query_selection.toml");
        planetary_computer_template().write(&path).unwrap();

        let selection = QuerySelection::read(&path).unwrap();
        assert_eq!(selection.id, "planetary-computer.sentinel-2-l2a");
        assert_eq!(selection.assets.len(), 4);
        assert_eq!(selection.query[0].op, Operator::Lt);
    }

    #[test]
    fn test_ids_deduplicated_in_order() {
        let ids = planetary_computer_template().ids_to_fetch().unwrap();
        assert_eq!(
            ids,
            vec![
                "S2B_MSIL2A_20201206T190749_R013_T10TET_20201207T190022",
                "S2A_MSIL2A_20201211T190811_R013_T10TET_20201212T060914",
            ]
        );
    }

    #[test]
    fn test_assets_to_load() {
        let selection = planetary_computer_template();
        assert_eq!(selection.asset_keys().unwrap(), vec!["B04", "B08"]);

        let mut none = selection.clone();
        none.assets.iter_mut().for_each(|a| a.load = false);
        assert!(none.assets_to_load().is_none());
        assert!(none.asset_keys().is_err());
    }

    #[test]
    fn test_to_search() {
        let mut selection = planetary_computer_template();
        selection.query.push(QueryTerm {
            property: "eo:cloud_cover".into(),
            op: Operator::Gte,
            value: json!(1),
        });
        selection.intersects = Some(vec![[-122.3, 47.5], [-122.0, 47.5], [-122.0, 47.8]]);

        let body = serde_json::to_value(selection.to_search()).unwrap();
        assert_eq!(body["collections"], json!(["sentinel-2-l2a"]));
        assert_eq!(body["datetime"], json!("2020-12-01/2020-12-31"));
        assert_eq!(body["query"]["eo:cloud_cover"], json!({"gte": 1, "lt": 20}));
        assert_eq!(body["ids"].as_array().unwrap().len(), 2);
        assert_eq!(body["intersects"]["coordinates"][0].as_array().unwrap().len(), 4);
    }
}
