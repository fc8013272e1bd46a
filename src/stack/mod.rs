mod prune;

use std::collections::BTreeMap;
use std::fmt::Write;

use rand::RngCore;
use serde_json::json;
use thiserror::Error;

use crate::client::{self, Client};
use crate::resource::{MissingField, Resource, ResourceId};

/// Label marking a resource as belonging to a stack. The value is the
/// stack name.
pub const STACK_LABEL: &str = "tsumiki.dev/stack";
/// Annotation recording which reconciliation session last wrote a
/// resource. Not a content hash, it changes every session.
pub const CHECKSUM_ANNOTATION: &str = "tsumiki.dev/stack-checksum";

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed resource: {0}")]
    Malformed(#[from] MissingField),
    #[error("client error: {0}")]
    Client(#[from] client::Error),
    #[error("{operation} {id} failed: {source}")]
    Operation {
        operation: &'static str,
        id: ResourceId,
        source: client::Error,
    },
}
pub type Result<T> = std::result::Result<T, Error>;

/// Named set of desired resources, reconciled against the cluster as one
/// unit.
///
/// The session checksum and the keep-set live only as long as the value
/// itself. The durable state is what gets written to the server: the
/// ownership label and the checksum annotation.
pub struct Stack {
    name: String,
    resources: Vec<Resource>,
    checksum: Option<String>,
    // identity -> checksum recorded for it this session, consulted by
    // pruning to know what to preserve
    keep: BTreeMap<ResourceId, String>,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut token = String::with_capacity(bytes.len() * 2);
    for byte in &bytes {
        write!(token, "{:02x}", byte).unwrap();
    }
    token
}

/// Ownership metadata stamped onto every managed resource. The checksum
/// annotation is optional so the equivalence check can build a candidate
/// that leaves server-side annotations untouched.
fn ownership_overlay(stack: &str, checksum: Option<&str>) -> Resource {
    let mut overlay = json!({
        "metadata": {
            "labels": { (STACK_LABEL): stack },
        },
    });
    if let Some(checksum) = checksum {
        overlay["metadata"]["annotations"] = json!({ (CHECKSUM_ANNOTATION): checksum });
    }
    Resource::new(overlay)
}

/// Stamps a desired resource for writing. With `base` given the desired
/// fields are layered onto the live object first, so server-managed
/// fields the manifest does not mention survive the write.
fn prepare(stack: &str, checksum: &str, desired: &Resource, base: Option<&Resource>) -> Resource {
    let resource = match base {
        Some(live) => live.merge(desired),
        None => desired.clone(),
    };
    resource.merge(&ownership_overlay(stack, Some(checksum)))
}

/// What the live object would look like if the manifest were applied on
/// top of it. Annotations are deliberately excluded from the overlay so a
/// stale checksum annotation alone never forces an update. If the result
/// equals the live object there is nothing to write.
fn keep_candidate(stack: &str, server: &Resource, desired: &Resource) -> Resource {
    server.merge(desired).merge(&ownership_overlay(stack, None))
}

impl Stack {
    pub fn new(name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Stack {
            name: name.into(),
            resources,
            checksum: None,
            keep: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session token stamped into every resource written during this run.
    /// Generated on first use, stable for the lifetime of the value.
    pub fn checksum(&mut self) -> &str {
        self.checksum.get_or_insert_with(generate_token)
    }

    /// Converges the cluster to the desired resource set: creates what is
    /// missing, updates what drifted, leaves the rest alone. Returns the
    /// server representation of every resource in manifest order. With
    /// `prune` set, resources carrying this stack's label which were not
    /// part of this pass are deleted afterwards.
    ///
    /// Not transactional: an error aborts the pass and leaves already
    /// written resources in place. Re-running converges, every decision
    /// is recomputed from live state.
    pub async fn apply(&mut self, client: &impl Client, prune: bool) -> Result<Vec<Resource>> {
        let ids = self
            .resources
            .iter()
            .map(Resource::id)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let server_state = client.get_resources(&self.resources).await?;

        let checksum = self.checksum().to_owned();
        let mut outcomes = Vec::with_capacity(self.resources.len());
        for ((desired, id), server) in self.resources.iter().zip(ids).zip(server_state) {
            let outcome = match server {
                None => {
                    let prepared = prepare(&self.name, &checksum, desired, None);
                    let created = client
                        .create_resource(&prepared)
                        .await
                        .map_err(|source| Error::Operation {
                            operation: "create",
                            id: id.clone(),
                            source,
                        })?;
                    log::info!("created {} ({})", id, checksum);
                    created
                }
                Some(live) => {
                    let candidate = keep_candidate(&self.name, &live, desired);
                    if candidate == live {
                        log::info!(
                            "kept {} ({})",
                            id,
                            candidate.annotation(CHECKSUM_ANNOTATION).unwrap_or("-")
                        );
                        candidate
                    } else {
                        let prepared = prepare(&self.name, &checksum, desired, Some(&live));
                        let updated = client
                            .update_resource(&prepared)
                            .await
                            .map_err(|source| Error::Operation {
                                operation: "update",
                                id: id.clone(),
                                source,
                            })?;
                        log::info!("updated {} ({})", id, checksum);
                        updated
                    }
                }
            };
            // key on the server-side identity, it carries the actual
            // namespace even when the manifest left it implicit
            let recorded = outcome
                .annotation(CHECKSUM_ANNOTATION)
                .unwrap_or_default()
                .to_owned();
            self.keep.insert(outcome.id()?, recorded);
            outcomes.push(outcome);
        }

        if prune {
            self.prune(client, true).await?;
        }
        Ok(outcomes)
    }

    /// Removes every resource belonging to this stack from the cluster
    pub async fn delete(&self, client: &impl Client) -> Result<()> {
        self.prune(client, false).await
    }
}
