//! Inventory provider
//!
//! Answers lookups from a YAML snapshot of the platform so requests can be
//! planned offline. It cannot create machines.
//!
//! ```yaml
//! datacenters:
//!   Datacenter:
//!     id: datacenter-1
//!     clusters:
//!       dell-cluster-1:
//!         id: domain-c8
//!         attributes:
//!           resource_pool_id: resgroup-9
//!     datastores:
//!       nfs_default_1: { id: datastore-11 }
//!     templates:
//!       rocky-9-template:
//!         id: 4223a1b2-template
//!         attributes: { guest_id: rhel9_64Guest, firmware: efi }
//!     networks:
//!       vm-lan-1: { id: network-13 }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::{CreateVmRequest, CreatedVm, ObjectKind, PlatformObject, Provider};
use crate::InstanceError;

/// Platform snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub datacenters: BTreeMap<String, DatacenterInventory>,
}

/// Objects scoped to one datacenter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatacenterInventory {
    pub id: String,
    pub attributes: Map<String, Value>,
    pub clusters: BTreeMap<String, PlatformObject>,
    pub datastores: BTreeMap<String, PlatformObject>,
    pub templates: BTreeMap<String, PlatformObject>,
    pub networks: BTreeMap<String, PlatformObject>,
}

impl DatacenterInventory {
    fn objects(&self, kind: ObjectKind) -> Option<&BTreeMap<String, PlatformObject>> {
        match kind {
            ObjectKind::Datacenter => None,
            ObjectKind::Cluster => Some(&self.clusters),
            ObjectKind::Datastore => Some(&self.datastores),
            ObjectKind::Template => Some(&self.templates),
            ObjectKind::Network => Some(&self.networks),
        }
    }
}

/// Read-only provider backed by an `Inventory`
pub struct InventoryProvider {
    inventory: Inventory,
}

impl InventoryProvider {
    pub fn new(inventory: Inventory) -> Self {
        Self { inventory }
    }

    /// Parse an inventory from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, InstanceError> {
        Ok(Self::new(serde_yaml::from_str(yaml)?))
    }

    /// Load an inventory file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InstanceError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| InstanceError::missing_file(path, e))?;
        debug!("Loaded inventory from {}", path.display());
        Self::from_yaml(&content)
    }

    fn datacenter_by_id(&self, id: &str) -> Option<&DatacenterInventory> {
        self.inventory.datacenters.values().find(|dc| dc.id == id)
    }
}

#[async_trait]
impl Provider for InventoryProvider {
    fn name(&self) -> &'static str {
        "Inventory"
    }

    async fn lookup(
        &self,
        kind: ObjectKind,
        name: &str,
        datacenter_id: Option<&str>,
    ) -> Result<Option<PlatformObject>, InstanceError> {
        if kind == ObjectKind::Datacenter {
            return Ok(self.inventory.datacenters.get(name).map(|dc| PlatformObject {
                id: dc.id.clone(),
                attributes: dc.attributes.clone(),
            }));
        }

        let found = datacenter_id
            .and_then(|id| self.datacenter_by_id(id))
            .and_then(|dc| dc.objects(kind))
            .and_then(|objects| objects.get(name))
            .cloned();
        Ok(found)
    }

    async fn create_virtual_machine(
        &self,
        request: &CreateVmRequest,
    ) -> Result<CreatedVm, InstanceError> {
        Err(InstanceError::CreateFailed(format!(
            "inventory provider cannot create '{}'",
            request.name
        )))
    }
}
