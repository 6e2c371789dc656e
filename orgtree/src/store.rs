//! Lookup of `id:` link targets to the files that define them.

use crate::config::FileReader;
use crate::error::OrgError;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};

/// Resolves node identifiers to file paths.
pub trait IdStore: Send + Sync {
    /// `Ok(None)` when the id is unknown to the store.
    fn lookup(&self, id: &str) -> Result<Option<String>, OrgError>;
}

/// Id index loaded from a JSON file.
///
/// Accepts either an object (`{"id": "file"}`) or an array of rows
/// (`[{"id": .., "file": ..}]`), the shape of an exported `nodes` table.
#[derive(Debug, Clone, Default)]
pub struct JsonIdStore {
    files: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Index {
    Map(HashMap<String, String>),
    Rows(Vec<IndexRow>),
}

#[derive(Deserialize)]
struct IndexRow {
    id: String,
    file: String,
}

impl JsonIdStore {
    pub fn open(path: &Path, reader: &dyn FileReader) -> Result<Self, OrgError> {
        let bytes = reader.read(path).map_err(|err| OrgError::io(path, &err))?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, OrgError> {
        let index: Index =
            serde_json::from_slice(bytes).map_err(|err| OrgError::Store(err.to_string()))?;
        let files = match index {
            Index::Map(files) => files,
            Index::Rows(rows) => rows.into_iter().map(|r| (r.id, r.file)).collect(),
        };
        Ok(Self { files })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JsonIdStore {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IdStore for JsonIdStore {
    fn lookup(&self, id: &str) -> Result<Option<String>, OrgError> {
        // exported roam tables keep ids and paths as quoted strings
        let file = self
            .files
            .get(id)
            .or_else(|| self.files.get(&format!("{id:?}")));
        Ok(file.map(|f| f.trim_matches('"').to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_object_and_row_layouts() {
        let map = JsonIdStore::from_json(br#"{"abc": "/notes/a.org"}"#).expect("map");
        assert_eq!(map.lookup("abc").expect("lookup").as_deref(), Some("/notes/a.org"));

        let rows = JsonIdStore::from_json(br#"[{"id": "\"xyz\"", "file": "\"/notes/x.org\""}]"#)
            .expect("rows");
        assert_eq!(rows.lookup("xyz").expect("lookup").as_deref(), Some("/notes/x.org"));
        assert_eq!(rows.lookup("nope").expect("lookup"), None);
    }

    #[test]
    fn malformed_index_is_a_store_error() {
        assert!(matches!(
            JsonIdStore::from_json(b"not json"),
            Err(OrgError::Store(_))
        ));
    }
}
