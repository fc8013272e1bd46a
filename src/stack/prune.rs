use std::collections::BTreeMap;

use crate::client::{self, Client};
use crate::resource::Resource;

use super::{Error, Result, Stack, CHECKSUM_ANNOTATION, STACK_LABEL};

/// Kinds pruning never touches. Endpoints copies Service labels without
/// ever receiving the checksum annotation, so its instances cannot be
/// told apart from stack-owned ones; EndpointSlice listing ignores label
/// selectors on some server versions and would return the full set.
const IGNORED_KINDS: &[(&str, &str)] = &[
    ("v1", "Endpoints"),
    ("discovery.k8s.io/v1beta1", "EndpointSlice"),
    ("discovery.k8s.io/v1", "EndpointSlice"),
];

fn is_ignored(resource: &Resource) -> bool {
    match (resource.api_version(), resource.kind()) {
        (Ok(api_version), Ok(kind)) => IGNORED_KINDS.contains(&(api_version, kind)),
        _ => false,
    }
}

impl Stack {
    /// Deletes every live resource carrying this stack's ownership label.
    /// With `keep_resources` set, resources recorded in the keep-set
    /// under the same checksum survive; without it this is a full
    /// teardown.
    pub(crate) async fn prune(&self, client: &impl Client, keep_resources: bool) -> Result<()> {
        let mut selector = BTreeMap::new();
        selector.insert(STACK_LABEL.to_owned(), self.name.clone());
        let found = client.list_resources(&selector).await?;

        for resource in found {
            if is_ignored(&resource) {
                continue;
            }
            // the server-side selector is not authoritative, some listing
            // endpoints ignore it
            if resource.label(STACK_LABEL) != Some(self.name.as_str()) {
                continue;
            }
            let id = resource.id()?;
            if keep_resources {
                let checksum = resource.annotation(CHECKSUM_ANNOTATION).unwrap_or_default();
                if self.keep.get(&id).map(String::as_str) == Some(checksum) {
                    continue;
                }
            }
            log::warn!("pruning {}", id);
            match client.delete_resource(&resource).await {
                Ok(()) => {}
                Err(client::Error::NotFound) => {
                    // an alias of the same object was already deleted
                    // through another api group
                    log::debug!("{} is already gone", id);
                }
                Err(source) => {
                    return Err(Error::Operation {
                        operation: "delete",
                        id,
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}
