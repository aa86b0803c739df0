//! Mock provider for testing
//!
//! Provides a configurable in-memory provider that records every call.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{CreateVmRequest, CreatedVm, ObjectKind, PlatformObject, Provider};
use crate::InstanceError;

/// Mock provider for testing
///
/// # Example
/// ```
/// use vsphere_instance_rs::provider::mock::MockProvider;
/// use vsphere_instance_rs::provider::{ObjectKind, PlatformObject};
///
/// let mock = MockProvider::new()
///     .with_object(ObjectKind::Datacenter, "Datacenter", PlatformObject::new("datacenter-1"))
///     .with_ip_address("10.0.1.11");
/// ```
pub struct MockProvider {
    objects: HashMap<(ObjectKind, String), PlatformObject>,
    ip_address: Option<String>,
    create_error: Option<String>,
    lookups: Mutex<Vec<(ObjectKind, String)>>,
    requests: Mutex<Vec<CreateVmRequest>>,
}

impl MockProvider {
    /// Create an empty mock provider
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            ip_address: None,
            create_error: None,
            lookups: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock provider that knows the default datacenter, cluster,
    /// datastore, template and network names
    pub fn with_defaults() -> Self {
        use crate::config::{
            DEFAULT_CLUSTER, DEFAULT_DATACENTER, DEFAULT_DATASTORE, DEFAULT_NETWORK,
            DEFAULT_TEMPLATE,
        };

        Self::new()
            .with_object(
                ObjectKind::Datacenter,
                DEFAULT_DATACENTER,
                PlatformObject::new("datacenter-1"),
            )
            .with_object(
                ObjectKind::Cluster,
                DEFAULT_CLUSTER,
                PlatformObject::new("domain-c8").with_attribute("resource_pool_id", "resgroup-9"),
            )
            .with_object(
                ObjectKind::Datastore,
                DEFAULT_DATASTORE,
                PlatformObject::new("datastore-11"),
            )
            .with_object(
                ObjectKind::Template,
                DEFAULT_TEMPLATE,
                PlatformObject::new("4223a1b2-template")
                    .with_attribute("guest_id", "rhel9_64Guest")
                    .with_attribute("firmware", "efi"),
            )
            .with_object(
                ObjectKind::Network,
                DEFAULT_NETWORK,
                PlatformObject::new("network-13"),
            )
    }

    /// Register an object returned by lookups
    pub fn with_object(
        mut self,
        kind: ObjectKind,
        name: impl Into<String>,
        object: PlatformObject,
    ) -> Self {
        self.objects.insert((kind, name.into()), object);
        self
    }

    /// Set the IP address reported for created VMs
    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Configure create calls to fail
    pub fn with_create_error(mut self, error: &str) -> Self {
        self.create_error = Some(error.to_string());
        self
    }

    /// Lookups performed so far, in order
    pub async fn lookups(&self) -> Vec<(ObjectKind, String)> {
        self.lookups.lock().await.clone()
    }

    /// Create requests received so far, in order
    pub async fn requests(&self) -> Vec<CreateVmRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn lookup(
        &self,
        kind: ObjectKind,
        name: &str,
        _datacenter_id: Option<&str>,
    ) -> Result<Option<PlatformObject>, InstanceError> {
        self.lookups.lock().await.push((kind, name.to_string()));
        Ok(self.objects.get(&(kind, name.to_string())).cloned())
    }

    async fn create_virtual_machine(
        &self,
        request: &CreateVmRequest,
    ) -> Result<CreatedVm, InstanceError> {
        self.requests.lock().await.push(request.clone());

        if let Some(error) = &self.create_error {
            return Err(InstanceError::CreateFailed(error.clone()));
        }

        Ok(CreatedVm {
            id: format!("vm-{}", request.name),
            default_ip_address: self.ip_address.clone(),
        })
    }
}
