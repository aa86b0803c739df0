//! Provisioning provider interface
//!
//! The vSphere provider does the real work: resolving platform objects by
//! name and creating the virtual machine. This module defines the seam the
//! instance code talks to, plus the request it hands over.

pub mod inventory;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::InstanceError;

/// Kinds of platform object that can be looked up by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Datacenter,
    Cluster,
    Datastore,
    Template,
    Network,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Datacenter => write!(f, "datacenter"),
            ObjectKind::Cluster => write!(f, "cluster"),
            ObjectKind::Datastore => write!(f, "datastore"),
            ObjectKind::Template => write!(f, "template"),
            ObjectKind::Network => write!(f, "network"),
        }
    }
}

/// A resolved platform object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformObject {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl PlatformObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// A string attribute, if present
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// One disk in a create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDescriptor {
    pub label: String,
    /// Size in GiB
    pub size: u32,
    pub unit_number: u32,
    pub eagerly_scrub: bool,
    pub thin_provisioned: bool,
}

/// One network interface in a create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub network_id: String,
}

/// Clone-from-template directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSpec {
    pub template_uuid: String,
}

/// Everything the provider needs to create one virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVmRequest {
    pub name: String,
    pub resource_pool_id: String,
    pub datastore_id: String,
    pub num_cpus: u32,
    /// Memory in MiB
    pub memory: u32,
    pub disks: Vec<DiskDescriptor>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub clone: CloneSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    pub extra_config: BTreeMap<String, String>,
    pub enable_disk_uuid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_guest_net_timeout: Option<u32>,
}

/// Result of a successful create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedVm {
    pub id: String,
    pub default_ip_address: Option<String>,
}

/// Trait for provisioning providers
///
/// Implementations wrap a real infrastructure API. Retries, idempotency and
/// state tracking are the provider's business, not the caller's.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of this provider (e.g., "vSphere", "Inventory")
    fn name(&self) -> &'static str;

    /// Look up a platform object by name
    ///
    /// Everything except datacenters is scoped to `datacenter_id`. Returns
    /// `Ok(None)` when no such object exists.
    async fn lookup(
        &self,
        kind: ObjectKind,
        name: &str,
        datacenter_id: Option<&str>,
    ) -> Result<Option<PlatformObject>, InstanceError>;

    /// Create a virtual machine
    async fn create_virtual_machine(
        &self,
        request: &CreateVmRequest,
    ) -> Result<CreatedVm, InstanceError>;
}

/// Look up an object that must exist
pub async fn require(
    provider: &dyn Provider,
    kind: ObjectKind,
    name: &str,
    datacenter_id: Option<&str>,
) -> Result<PlatformObject, InstanceError> {
    tracing::debug!("Looking up {} '{}' via {}", kind, name, provider.name());
    provider
        .lookup(kind, name, datacenter_id)
        .await?
        .ok_or_else(|| InstanceError::not_found(kind, name))
}
