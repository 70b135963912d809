use std::collections::BTreeMap;

use super::StagedFile;
use crate::core::{Result, UploadError};

/// The staging tree handed over by the transport layer.
///
/// Leaves are either plain scalars or staged file descriptors; inner nodes
/// are ordered lists or keyed maps of arbitrary depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedValue {
    Scalar(String),
    File(StagedFile),
    List(Vec<StagedValue>),
    Map(BTreeMap<String, StagedValue>),
}

impl Default for StagedValue {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl StagedValue {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::File(_))
    }

    pub fn as_file(&self) -> Option<&StagedFile> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    /// Inserts `value` under `key`, turning a non-map node into an empty map
    /// first.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StagedValue>) -> &mut Self {
        if !matches!(self, Self::Map(_)) {
            *self = Self::default();
        }
        if let Self::Map(entries) = self {
            entries.insert(key.into(), value.into());
        }
        self
    }

    /// Builder form of [`StagedValue::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StagedValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<StagedValue> {
        match self {
            Self::Map(entries) => entries.remove(key),
            _ => None,
        }
    }

    /// Lifts a transport JSON payload into a staging tree.
    ///
    /// Objects carrying both `tmp_name` and `name` are descriptors; every
    /// other object is a keyed map.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Self::from_json_at(value, "$")
    }

    fn from_json_at(value: &serde_json::Value, location: &str) -> Result<Self> {
        use serde_json::Value as Json;

        match value {
            Json::Object(fields) if fields.contains_key("tmp_name") && fields.contains_key("name") => {
                let file: StagedFile = serde_json::from_value(value.clone()).map_err(|e| {
                    UploadError::MalformedDescriptor(location.to_string(), e.to_string())
                })?;
                Ok(Self::File(file))
            }
            Json::Object(fields) => {
                let mut entries = BTreeMap::new();
                for (key, child) in fields {
                    let child_location = format!("{}.{}", location, key);
                    entries.insert(key.clone(), Self::from_json_at(child, &child_location)?);
                }
                Ok(Self::Map(entries))
            }
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, child)| Self::from_json_at(child, &format!("{}[{}]", location, i)))
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            Json::String(s) => Ok(Self::Scalar(s.clone())),
            Json::Null => Ok(Self::Scalar(String::new())),
            other => Ok(Self::Scalar(other.to_string())),
        }
    }
}

impl From<StagedFile> for StagedValue {
    fn from(file: StagedFile) -> Self {
        Self::File(file)
    }
}

impl From<Vec<StagedFile>> for StagedValue {
    fn from(files: Vec<StagedFile>) -> Self {
        Self::List(files.into_iter().map(Self::File).collect())
    }
}

impl From<&str> for StagedValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for StagedValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_nested() {
        let payload = json!({
            "article": {
                "files": [
                    {"tmp_name": "/tmp/a", "name": "a.txt", "size": 1, "type": "text/plain", "error": 0},
                    {"tmp_name": "/tmp/b", "name": "b.txt", "size": 2, "type": "text/plain", "error": 0}
                ]
            },
            "title": "Test"
        });

        let tree = StagedValue::from_json(&payload).unwrap();
        let StagedValue::Map(root) = &tree else {
            panic!("root should be a map");
        };
        assert_eq!(root.get("title"), Some(&StagedValue::Scalar("Test".into())));

        let StagedValue::Map(article) = &root["article"] else {
            panic!("article should be a map");
        };
        let StagedValue::List(files) = &article["files"] else {
            panic!("files should be a list");
        };
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].as_file().unwrap().filename, "b.txt");
    }

    #[test]
    fn test_from_json_rejects_malformed_descriptor() {
        let payload = json!({"image": {"tmp_name": "/tmp/a", "name": "a.txt", "size": "big"}});
        let err = StagedValue::from_json(&payload).unwrap_err();
        assert!(matches!(err, UploadError::MalformedDescriptor(ref at, _) if at == "$.image"));
    }

    #[test]
    fn test_insert_replaces_leaf_with_map() {
        let mut value = StagedValue::Scalar("x".into());
        value.insert("first", "data");
        assert!(!value.is_leaf());
        assert_eq!(value.remove("first"), Some(StagedValue::Scalar("data".into())));
    }
}
