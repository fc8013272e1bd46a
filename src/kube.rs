use std::collections::BTreeMap;

use async_trait::async_trait;
use http::Request;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIGroup;
use kube::api::DeleteParams;
use serde::Deserialize;
use serde_json::Value;

use crate::client::{Client, Error, Result};
use crate::resource::{Resource, ResourceKind};

/// Server-side metadata of one discovered kind
#[derive(Clone, Debug)]
pub struct KindInfo {
    pub plural: String,
    pub namespaced: bool,
}

pub type Discovery = BTreeMap<ResourceKind, KindInfo>;

/// Object list with items kept in their wire representation. List items
/// omit apiVersion/kind, those are implied by the endpoint and stamped
/// back by the caller.
#[derive(Debug, Deserialize)]
struct AnyObjectList {
    items: Vec<Value>,
}

/// List all kinds the server serves, with the metadata needed to route
/// object requests
pub async fn discover(client: &kube::Client) -> Result<Discovery> {
    let mut out = BTreeMap::new();

    for version in client.list_core_api_versions().await?.versions {
        for resource in client.list_core_api_resources(&version).await?.resources {
            // subresources are not objects
            if resource.name.contains('/') {
                continue;
            }
            out.insert(
                ResourceKind {
                    api_version: version.clone(),
                    kind: resource.kind,
                },
                KindInfo {
                    plural: resource.name,
                    namespaced: resource.namespaced,
                },
            );
        }
    }

    for group in client.list_api_groups().await?.groups {
        for version in group.versions {
            for resource in client
                .list_api_group_resources(&version.group_version)
                .await?
                .resources
            {
                if resource.name.contains('/') {
                    continue;
                }
                out.insert(
                    ResourceKind {
                        api_version: version.group_version.clone(),
                        kind: resource.kind,
                    },
                    KindInfo {
                        plural: resource.name,
                        namespaced: resource.namespaced,
                    },
                );
            }
        }
    }

    Ok(out)
}

fn collection_url(types: &Discovery, namespace: &str, resource: &Resource) -> Result<String> {
    let kind = resource.resource_kind()?;
    let info = types
        .get(&kind)
        .ok_or_else(|| Error::UnknownKind(kind.clone()))?;

    let ns_prefix = resource
        .namespace()
        .map(str::to_owned)
        .or_else(|| {
            if info.namespaced {
                Some(namespace.to_owned())
            } else {
                None
            }
        })
        .map(|ns| format!("namespaces/{}/", ns))
        .unwrap_or_default();

    Ok(format!(
        "/{prefix}/{group_version}/{ns_prefix}{plural}",
        prefix = if kind.api_version.contains('/') {
            "apis"
        } else {
            "api"
        },
        group_version = kind.api_version,
        ns_prefix = ns_prefix,
        plural = info.plural,
    ))
}

fn object_url(types: &Discovery, namespace: &str, resource: &Resource) -> Result<String> {
    Ok(format!(
        "{}/{}",
        collection_url(types, namespace, resource)?,
        resource.name()?,
    ))
}

fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

fn stamp_endpoint_kind(mut item: Value, api_version: &str, kind: &str) -> Resource {
    item["apiVersion"] = Value::String(api_version.to_owned());
    item["kind"] = Value::String(kind.to_owned());
    Resource::new(item)
}

/// Api server client with discovery info resolved once up-front
pub struct KubeApi {
    client: kube::Client,
    types: Discovery,
    namespace: String,
}

impl KubeApi {
    /// Connects using the ambient kubeconfig and discovers served kinds
    pub async fn connect(namespace: impl Into<String>) -> Result<Self> {
        let client = kube::Client::try_default().await?;
        let types = discover(&client).await?;
        Ok(KubeApi {
            client,
            types,
            namespace: namespace.into(),
        })
    }

    pub fn new(client: kube::Client, types: Discovery, namespace: impl Into<String>) -> Self {
        KubeApi {
            client,
            types,
            namespace: namespace.into(),
        }
    }
}

async fn list_group_labeled(
    client: kube::Client,
    group: APIGroup,
    label_selector: String,
) -> Result<Vec<Resource>> {
    let mut out = Vec::new();
    let version = group
        .preferred_version
        .as_ref()
        .unwrap_or_else(|| group.versions.last().unwrap());

    for api_resource in client
        .list_api_group_resources(&version.group_version)
        .await?
        .resources
    {
        if api_resource.name.contains('/') {
            continue;
        }
        let request = Request::get(format!(
            "/apis/{}/{}?labelSelector={}",
            version.group_version, api_resource.name, label_selector,
        ))
        .body(vec![])?;

        match client.request::<AnyObjectList>(request).await {
            Ok(list) => {
                for item in list.items {
                    out.push(stamp_endpoint_kind(
                        item,
                        &version.group_version,
                        &api_resource.kind,
                    ));
                }
            }
            Err(_)
                if group.name == "authentication.k8s.io"
                    || group.name == "authorization.k8s.io" => {}
            Err(_) => {
                log::warn!(
                    "no access, assuming there should be no {} {} deployed",
                    group.name,
                    api_resource.name
                );
            }
        }
    }
    Ok(out)
}

#[async_trait]
impl Client for KubeApi {
    async fn get_resources(&self, resources: &[Resource]) -> Result<Vec<Option<Resource>>> {
        let mut out = Vec::with_capacity(resources.len());
        for resource in resources {
            let request = Request::get(object_url(&self.types, &self.namespace, resource)?)
                .header("Accept", "application/json")
                .body(vec![])?;
            let found = match self.client.request::<Value>(request).await {
                Ok(value) => Some(Resource::new(value)),
                Err(kube::Error::Api(ref response)) if response.code == 404 => None,
                Err(e) => return Err(e.into()),
            };
            out.push(found);
        }
        Ok(out)
    }

    async fn list_resources(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Resource>> {
        let label_selector = selector_string(selector);
        let mut out = Vec::new();

        for version in self.client.list_core_api_versions().await?.versions {
            for api_resource in self.client.list_core_api_resources(&version).await?.resources {
                if api_resource.name.contains('/') {
                    continue;
                }
                let request = Request::get(format!(
                    "/api/{}/{}?labelSelector={}",
                    version, api_resource.name, label_selector,
                ))
                .body(vec![])?;

                match self.client.request::<AnyObjectList>(request).await {
                    Ok(list) => {
                        for item in list.items {
                            out.push(stamp_endpoint_kind(item, &version, &api_resource.kind));
                        }
                    }
                    Err(_) if version == "v1" && api_resource.name == "bindings" => {}
                    Err(_) => {
                        log::warn!(
                            "no access, assuming there should be no {} {} deployed",
                            version,
                            api_resource.name
                        );
                    }
                }
            }
        }

        // groups are independent, sweep them in parallel
        let groups = self.client.list_api_groups().await?.groups;
        let tasks = groups.into_iter().map(|group| {
            list_group_labeled(self.client.clone(), group, label_selector.clone())
        });
        for found in futures::future::join_all(tasks).await {
            out.extend(found?);
        }

        Ok(out)
    }

    async fn create_resource(&self, resource: &Resource) -> Result<Resource> {
        let request = Request::post(collection_url(&self.types, &self.namespace, resource)?)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(resource.as_value())?)?;
        let created: Value = self.client.request(request).await?;
        Ok(Resource::new(created))
    }

    async fn update_resource(&self, resource: &Resource) -> Result<Resource> {
        let request = Request::put(object_url(&self.types, &self.namespace, resource)?)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(resource.as_value())?)?;
        let updated: Value = self.client.request(request).await?;
        Ok(Resource::new(updated))
    }

    async fn delete_resource(&self, resource: &Resource) -> Result<()> {
        let params = serde_json::to_vec(&DeleteParams {
            grace_period_seconds: Some(0),
            ..Default::default()
        })?;
        let request = Request::delete(object_url(&self.types, &self.namespace, resource)?)
            .header("Accept", "application/json")
            .body(params)?;
        let _result: Value = self.client.request(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn types() -> Discovery {
        let mut out = BTreeMap::new();
        out.insert(
            ResourceKind {
                api_version: "v1".to_owned(),
                kind: "ConfigMap".to_owned(),
            },
            KindInfo {
                plural: "configmaps".to_owned(),
                namespaced: true,
            },
        );
        out.insert(
            ResourceKind {
                api_version: "v1".to_owned(),
                kind: "Namespace".to_owned(),
            },
            KindInfo {
                plural: "namespaces".to_owned(),
                namespaced: false,
            },
        );
        out.insert(
            ResourceKind {
                api_version: "apps/v1".to_owned(),
                kind: "Deployment".to_owned(),
            },
            KindInfo {
                plural: "deployments".to_owned(),
                namespaced: true,
            },
        );
        out
    }

    #[test]
    fn core_object_url() {
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cfg", "namespace": "prod" },
        }));
        assert_eq!(
            object_url(&types(), "default", &resource).unwrap(),
            "/api/v1/namespaces/prod/configmaps/cfg"
        );
    }

    #[test]
    fn group_object_url_with_fallback_namespace() {
        let resource = Resource::new(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "app" },
        }));
        assert_eq!(
            object_url(&types(), "default", &resource).unwrap(),
            "/apis/apps/v1/namespaces/default/deployments/app"
        );
    }

    #[test]
    fn cluster_scoped_url_has_no_namespace() {
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": "prod" },
        }));
        assert_eq!(
            object_url(&types(), "default", &resource).unwrap(),
            "/api/v1/namespaces/prod"
        );
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let resource = Resource::new(json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": { "name": "w" },
        }));
        match collection_url(&types(), "default", &resource) {
            Err(Error::UnknownKind(kind)) => {
                assert_eq!(kind.to_string(), "example.com/v1 Widget")
            }
            other => panic!("expected unknown kind, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn selector_rendering() {
        let mut selector = BTreeMap::new();
        selector.insert("a".to_owned(), "1".to_owned());
        selector.insert("b".to_owned(), "2".to_owned());
        assert_eq!(selector_string(&selector), "a=1,b=2");
    }

    #[test]
    fn listed_items_get_endpoint_kind() {
        let listed = stamp_endpoint_kind(
            json!({ "metadata": { "name": "cfg", "namespace": "prod" } }),
            "v1",
            "ConfigMap",
        );
        assert_eq!(listed.api_version().unwrap(), "v1");
        assert_eq!(listed.kind().unwrap(), "ConfigMap");
        assert_eq!(listed.id().unwrap().to_string(), "ConfigMap:cfg@prod");
    }
}
