use std::fmt::{self, Display};

use overlay::OverlayExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A manifest lacks a field required to identify it
#[derive(Error, Debug, PartialEq)]
#[error("missing required field: {0}")]
pub struct MissingField(pub &'static str);

/// Represents object runtime type as served by the api server
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceKind {
    // apps/v1
    pub api_version: String,
    // Deployment
    pub kind: String,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.api_version, self.kind)
    }
}

/// Represents object identity. The api version is deliberately not part of
/// it: the same object can be served through multiple api groups, and all
/// of those aliases must collapse onto one identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)?;
        if let Some(ns) = &self.namespace {
            write!(f, "@{}", ns)?;
        }
        Ok(())
    }
}

/// Single api object manifest, kept in its wire representation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Value);

impl Resource {
    pub fn new(value: Value) -> Self {
        Resource(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn api_version(&self) -> Result<&str, MissingField> {
        self.0
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or(MissingField("apiVersion"))
    }

    pub fn kind(&self) -> Result<&str, MissingField> {
        self.0
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(MissingField("kind"))
    }

    pub fn name(&self) -> Result<&str, MissingField> {
        self.0
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or(MissingField("metadata.name"))
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.get("metadata")?.get("namespace")?.as_str()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0.get("metadata")?.get("labels")?.get(key)?.as_str()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.0.get("metadata")?.get("annotations")?.get(key)?.as_str()
    }

    pub fn resource_kind(&self) -> Result<ResourceKind, MissingField> {
        Ok(ResourceKind {
            api_version: self.api_version()?.to_owned(),
            kind: self.kind()?.to_owned(),
        })
    }

    pub fn id(&self) -> Result<ResourceId, MissingField> {
        Ok(ResourceId {
            kind: self.kind()?.to_owned(),
            name: self.name()?.to_owned(),
            namespace: self.namespace().map(str::to_owned),
        })
    }

    /// Returns a copy of this resource with `overlay`'s fields layered on
    /// top of it
    pub fn merge(&self, overlay: &Resource) -> Resource {
        Resource(self.0.overlay(&overlay.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity() {
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cfg", "namespace": "default" },
        }));
        let id = resource.id().unwrap();
        assert_eq!(
            id,
            ResourceId {
                kind: "ConfigMap".to_owned(),
                name: "cfg".to_owned(),
                namespace: Some("default".to_owned()),
            }
        );
        assert_eq!(id.to_string(), "ConfigMap:cfg@default");
    }

    #[test]
    fn identity_ignores_api_version() {
        let v1beta1 = Resource::new(json!({
            "apiVersion": "networking.k8s.io/v1beta1",
            "kind": "Ingress",
            "metadata": { "name": "web", "namespace": "prod" },
        }));
        let v1 = Resource::new(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": { "name": "web", "namespace": "prod" },
        }));
        assert_eq!(v1beta1.id().unwrap(), v1.id().unwrap());
    }

    #[test]
    fn cluster_scoped_identity() {
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": "prod" },
        }));
        let id = resource.id().unwrap();
        assert_eq!(id.namespace, None);
        assert_eq!(id.to_string(), "Namespace:prod");
    }

    #[test]
    fn missing_name_fails() {
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {},
        }));
        assert_eq!(resource.id().unwrap_err(), MissingField("metadata.name"));
    }

    #[test]
    fn labels_and_annotations() {
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "cfg",
                "labels": { "app": "web" },
                "annotations": { "note": "hello" },
            },
        }));
        assert_eq!(resource.label("app"), Some("web"));
        assert_eq!(resource.label("missing"), None);
        assert_eq!(resource.annotation("note"), Some("hello"));

        let bare = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cfg" },
        }));
        assert_eq!(bare.label("app"), None);
        assert_eq!(bare.annotation("note"), None);
    }
}
