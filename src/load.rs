use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use serde_yaml_with_quirks::DeserializingQuirks;
use thiserror::Error;
use walkdir::WalkDir;

use crate::resource::Resource;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml_with_quirks::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

/// Reads every manifest under the given files or directories, in file
/// name order, flattening list objects into their items
pub fn load_paths(paths: &[PathBuf]) -> Result<Vec<Resource>> {
    let mut out = Vec::new();
    for path in paths {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.path().extension().and_then(|s| s.to_str()) {
                Some("yaml") | Some("yml") => load_yaml(entry.path(), &mut out)?,
                Some("json") => load_json(entry.path(), &mut out)?,
                _ => {}
            }
        }
    }
    Ok(out)
}

fn load_yaml(path: &Path, out: &mut Vec<Resource>) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    for document in serde_yaml_with_quirks::Deserializer::from_str_with_quirks(
        &contents,
        DeserializingQuirks { old_octals: true },
    ) {
        push_flattened(Value::deserialize(document)?, out);
    }
    Ok(())
}

fn load_json(path: &Path, out: &mut Vec<Resource>) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    push_flattened(serde_json::from_str(&contents)?, out);
    Ok(())
}

/// List objects are unwrapped into their items, everything else is taken
/// as one manifest. Checking for an `items` field is enough to recognize
/// a list:
/// https://github.com/kubernetes/apimachinery/blob/master/pkg/apis/meta/v1/unstructured/unstructured.go#L54
fn push_flattened(value: Value, out: &mut Vec<Resource>) {
    match value {
        // empty yaml documents deserialize to null
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_flattened(item, out);
            }
        }
        Value::Object(mut object) if object.contains_key("items") => {
            if let Some(Value::Array(items)) = object.remove("items") {
                for item in items {
                    push_flattened(item, out);
                }
            }
        }
        value => out.push(Resource::new(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_are_flattened() {
        let mut out = Vec::new();
        push_flattened(
            json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": [
                    {
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": { "name": "a" },
                    },
                    {
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": { "name": "b" },
                    },
                ],
            }),
            &mut out,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name().unwrap(), "a");
        assert_eq!(out[1].name().unwrap(), "b");
    }

    #[test]
    fn null_documents_are_skipped() {
        let mut out = Vec::new();
        push_flattened(json!(null), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn plain_objects_pass_through() {
        let mut out = Vec::new();
        push_flattened(
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": "cfg" },
            }),
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind().unwrap(), "ConfigMap");
    }
}
