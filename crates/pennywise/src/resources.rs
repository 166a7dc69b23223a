//! Resource records handed to consumers
//!
//! Downstream consumers (cost estimation, reports) only care about resources. [ResourceSet]
//! is the flattened, serializable view of a [Resolution]: the provider in use and one record
//! per resource instance, in block order.
//!
//! The attribute key `usage` is reserved for usage data that consumers attach to records
//! themselves.
use crate::block::BlockKind;
use crate::resolver::Resolution;
use crate::value::Record;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResourceRecord {
    /// Instance address, e.g. `aws_instance.web["a"]`
    pub address: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub attributes: Record,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResourceSet {
    pub provider: Option<String>,
    pub resources: Vec<ResourceRecord>,
}

impl ResourceSet {
    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources
            .iter()
            .find(|resource| resource.address == address)
    }
}

/// Collects every resource instance of `resolution`
///
/// The provider is the label of the first `provider` block. Without one it is guessed from
/// the first resource type (`aws_instance` -> `aws`).
pub fn extract_resources(resolution: &Resolution) -> ResourceSet {
    let resources: Vec<ResourceRecord> = resolution
        .resources()
        .map(|instance| {
            let label = |index: usize| instance.labels.get(index).cloned().unwrap_or_default();
            ResourceRecord {
                address: instance.address.clone(),
                resource_type: label(0),
                name: label(1),
                attributes: instance.attributes.clone(),
            }
        })
        .collect();

    let provider = resolution
        .instances
        .values()
        .find(|instance| instance.kind == BlockKind::Provider)
        .and_then(|instance| instance.labels.first().cloned())
        .or_else(|| {
            resources.first().and_then(|resource| {
                resource
                    .resource_type
                    .split_once('_')
                    .map(|(prefix, _)| prefix.to_string())
            })
        });

    ResourceSet {
        provider,
        resources,
    }
}
