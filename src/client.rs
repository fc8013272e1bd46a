use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::resource::{MissingField, Resource, ResourceKind};

#[derive(Error, Debug)]
pub enum Error {
    /// Object does not exist on the server. This is the only condition
    /// callers handle specially: pruning swallows it on delete, the same
    /// object may already be gone through another api group alias.
    #[error("object not found")]
    NotFound,
    #[error("unknown object kind: {0}")]
    UnknownKind(ResourceKind),
    #[error("malformed resource: {0}")]
    Malformed(#[from] MissingField),
    #[error("kube error: {0}")]
    Kube(kube::Error),
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => Error::NotFound,
            err => Error::Kube(err),
        }
    }
}

/// Abstract api server operations consumed by the reconciler.
///
/// The production implementation goes over the wire ([`crate::KubeApi`]),
/// tests substitute an in-memory fake.
#[async_trait]
pub trait Client: Send + Sync {
    /// Current server state of every given resource, positionally aligned
    /// with the request. `None` means the object does not exist yet.
    async fn get_resources(&self, resources: &[Resource]) -> Result<Vec<Option<Resource>>>;

    /// All live resources matching the label selector. Server-side
    /// filtering is best-effort, callers re-validate the labels.
    async fn list_resources(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Resource>>;

    /// Returns the created object in its server representation
    async fn create_resource(&self, resource: &Resource) -> Result<Resource>;

    /// Returns the updated object in its server representation
    async fn update_resource(&self, resource: &Resource) -> Result<Resource>;

    async fn delete_resource(&self, resource: &Resource) -> Result<()>;
}
