//! Instance planning and creation
//!
//! Ties the pieces together: normalize the arguments, resolve platform
//! objects, render guestinfo and hand a single create request to the
//! provider.

use crate::InstanceError;
use crate::config::{
    DiskArgs, DiskSource, DiskSpec, InstanceArgs, InstanceConfig, Normalizer,
    normalize::normalize_disks,
};
use crate::guestinfo::{self, GuestConfig};
use crate::provider::{
    CloneSpec, CreateVmRequest, DiskDescriptor, NetworkInterface, ObjectKind, PlatformObject,
    Provider, require,
};
use crate::template::TemplateRenderer;
use tracing::{info, warn};

/// Platform objects an instance depends on
#[derive(Debug, Clone)]
pub struct ResolvedPlatform {
    pub datacenter: PlatformObject,
    pub cluster: PlatformObject,
    pub datastore: PlatformObject,
    pub template: PlatformObject,
    /// One per configured network, in order
    pub networks: Vec<PlatformObject>,
}

impl ResolvedPlatform {
    /// Resource pool to place the VM in
    ///
    /// Clusters report their root pool as `resource_pool_id`; the cluster id
    /// itself is used when the attribute is missing.
    pub fn resource_pool_id(&self) -> &str {
        self.cluster
            .attribute_str("resource_pool_id")
            .unwrap_or(self.cluster.id.as_str())
    }

    /// Disk layout of the template VM
    pub fn template_disks(&self) -> Result<Vec<DiskSpec>, InstanceError> {
        let disks = match self.template.attributes.get("disks") {
            Some(value) => serde_json::from_value::<Vec<DiskArgs>>(value.clone())?,
            None => Vec::new(),
        };
        if disks.is_empty() {
            return Err(InstanceError::Config(format!(
                "template '{}' reports no disks to inherit",
                self.template.id
            )));
        }
        normalize_disks(disks)
    }
}

/// Look up every platform object the instance needs
///
/// The datacenter is resolved first since everything else is scoped to it.
/// The first missing object aborts the lookup.
pub async fn resolve_platform(
    provider: &dyn Provider,
    config: &InstanceConfig,
) -> Result<ResolvedPlatform, InstanceError> {
    let datacenter = require(provider, ObjectKind::Datacenter, &config.datacenter, None).await?;
    let dc_id = Some(datacenter.id.as_str());

    let cluster = require(provider, ObjectKind::Cluster, &config.cluster, dc_id).await?;
    let datastore = require(provider, ObjectKind::Datastore, &config.datastore, dc_id).await?;
    let template = require(provider, ObjectKind::Template, &config.template, dc_id).await?;

    let mut networks = Vec::with_capacity(config.networks.len());
    for network in &config.networks {
        networks.push(require(provider, ObjectKind::Network, &network.name, dc_id).await?);
    }

    Ok(ResolvedPlatform {
        datacenter,
        cluster,
        datastore,
        template,
        networks,
    })
}

/// Map disks 1:1 onto provider disk descriptors
pub fn disk_descriptors(disks: &[DiskSpec]) -> Vec<DiskDescriptor> {
    disks
        .iter()
        .map(|disk| DiskDescriptor {
            label: disk.label.clone(),
            size: disk.size,
            unit_number: disk.unit_number,
            eagerly_scrub: disk.eagerly_scrub,
            thin_provisioned: disk.thin_provisioned,
        })
        .collect()
}

/// Everything decided before the create call
#[derive(Debug, Clone)]
pub struct InstancePlan {
    pub config: InstanceConfig,
    pub platform: ResolvedPlatform,
    /// Disks after template inheritance
    pub disks: Vec<DiskSpec>,
    pub guest: GuestConfig,
    pub request: CreateVmRequest,
}

/// Build the create request for an instance without creating it
pub async fn plan_instance(
    provider: &dyn Provider,
    renderer: &TemplateRenderer,
    normalizer: &Normalizer,
    name: &str,
    args: InstanceArgs,
) -> Result<InstancePlan, InstanceError> {
    // Key and override files are checked before the provider is touched
    let config = normalizer.normalize(args).await?;
    let platform = resolve_platform(provider, &config).await?;

    let disks = match &config.disks {
        DiskSource::Explicit(disks) => disks.clone(),
        DiskSource::Template => platform.template_disks()?,
    };

    let guest = guestinfo::build(
        renderer,
        name,
        &config.ssh_keys,
        &config.networks,
        &disks,
        config.userdata_file.as_deref(),
        config.extra_config.as_ref(),
    )
    .await?;

    let request = CreateVmRequest {
        name: name.to_string(),
        resource_pool_id: platform.resource_pool_id().to_string(),
        datastore_id: platform.datastore.id.clone(),
        num_cpus: config.cpus,
        memory: config.memory,
        disks: disk_descriptors(&disks),
        network_interfaces: platform
            .networks
            .iter()
            .map(|net| NetworkInterface {
                network_id: net.id.clone(),
            })
            .collect(),
        clone: CloneSpec {
            template_uuid: platform.template.id.clone(),
        },
        guest_id: platform.template.attribute_str("guest_id").map(str::to_string),
        firmware: platform.template.attribute_str("firmware").map(str::to_string),
        extra_config: guest.extra_config.clone(),
        enable_disk_uuid: config.enable_disk_uuid,
        wait_for_guest_net_timeout: config.wait_for_guest_net_timeout,
    };

    Ok(InstancePlan {
        config,
        platform,
        disks,
        guest,
        request,
    })
}

/// Render guest configuration without talking to a provider
///
/// Template-inherited disks need a template lookup, so they are rejected
/// here.
pub async fn render_guest_config(
    renderer: &TemplateRenderer,
    normalizer: &Normalizer,
    name: &str,
    args: InstanceArgs,
) -> Result<GuestConfig, InstanceError> {
    let config = normalizer.normalize(args).await?;
    let disks = match &config.disks {
        DiskSource::Explicit(disks) => disks.clone(),
        DiskSource::Template => {
            return Err(InstanceError::Config(
                "template disks can only be resolved against a provider".to_string(),
            ));
        }
    };

    guestinfo::build(
        renderer,
        name,
        &config.ssh_keys,
        &config.networks,
        &disks,
        config.userdata_file.as_deref(),
        config.extra_config.as_ref(),
    )
    .await
}

/// A created virtual machine
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub id: String,
    /// Address the guest reported once networking came up
    pub default_ip_address: Option<String>,
    pub plan: InstancePlan,
}

impl Instance {
    /// Plan and create an instance using the built-in templates
    pub async fn create(
        provider: &dyn Provider,
        name: &str,
        args: InstanceArgs,
    ) -> Result<Self, InstanceError> {
        Self::create_with(
            provider,
            &TemplateRenderer::new(),
            &Normalizer::new(),
            name,
            args,
        )
        .await
    }

    /// Plan and create an instance
    pub async fn create_with(
        provider: &dyn Provider,
        renderer: &TemplateRenderer,
        normalizer: &Normalizer,
        name: &str,
        args: InstanceArgs,
    ) -> Result<Self, InstanceError> {
        let plan = plan_instance(provider, renderer, normalizer, name, args).await?;

        info!("Creating instance {} via {}", name, provider.name());
        let created = provider.create_virtual_machine(&plan.request).await?;

        match &created.default_ip_address {
            Some(ip) => info!("Instance {} ({}) is at {}", name, created.id, ip),
            None => warn!("Instance {} ({}) reported no IP address", name, created.id),
        }

        Ok(Self {
            name: name.to_string(),
            id: created.id,
            default_ip_address: created.default_ip_address,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkArgs;
    use crate::provider::mock::MockProvider;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 ops@example";

    fn args() -> InstanceArgs {
        InstanceArgs::default().with_ssh_keys([KEY])
    }

    #[tokio::test]
    async fn test_resolve_platform_order() {
        let mock = MockProvider::with_defaults();
        let config = Normalizer::new().normalize(args()).await.unwrap();

        let platform = resolve_platform(&mock, &config).await.unwrap();
        assert_eq!(platform.resource_pool_id(), "resgroup-9");
        assert_eq!(platform.networks.len(), 1);

        let kinds: Vec<_> = mock.lookups().await.into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                ObjectKind::Datacenter,
                ObjectKind::Cluster,
                ObjectKind::Datastore,
                ObjectKind::Template,
                ObjectKind::Network
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_stops_at_first_missing() {
        let mock = MockProvider::with_defaults();
        let config = Normalizer::new()
            .normalize(args().with_template("no-such-template"))
            .await
            .unwrap();

        let result = resolve_platform(&mock, &config).await;
        match result {
            Err(InstanceError::LookupNotFound { kind, name }) => {
                assert_eq!(kind, ObjectKind::Template);
                assert_eq!(name, "no-such-template");
            }
            other => panic!("Expected LookupNotFound, got {:?}", other),
        }
        assert_eq!(mock.lookups().await.len(), 4);
    }

    #[test]
    fn test_resource_pool_falls_back_to_cluster() {
        let platform = ResolvedPlatform {
            datacenter: PlatformObject::new("dc"),
            cluster: PlatformObject::new("domain-c1"),
            datastore: PlatformObject::new("ds"),
            template: PlatformObject::new("tmpl"),
            networks: Vec::new(),
        };
        assert_eq!(platform.resource_pool_id(), "domain-c1");
        assert!(platform.template_disks().is_err());
    }

    #[tokio::test]
    async fn test_plan_inherits_template_disks() {
        let template = PlatformObject::new("tmpl-1").with_attribute(
            "disks",
            serde_json::json!([
                { "label": "disk0", "size": 40, "thin_provisioned": false },
                { "label": "disk1", "size": 100 }
            ]),
        );
        let mock = MockProvider::with_defaults().with_object(
            ObjectKind::Template,
            "rocky-9-template",
            template,
        );
        let mut instance_args = args();
        instance_args.inherit_template_disks = true;

        let plan = plan_instance(
            &mock,
            &TemplateRenderer::new(),
            &Normalizer::new(),
            "vm-1",
            instance_args,
        )
        .await
        .unwrap();

        assert_eq!(plan.request.disks.len(), 2);
        assert_eq!(plan.request.disks[0].label, "disk0");
        assert!(!plan.request.disks[0].thin_provisioned);
        assert_eq!(plan.request.disks[1].unit_number, 1);
        assert_eq!(plan.request.clone.template_uuid, "tmpl-1");
        assert!(mock.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_propagates_failure() {
        let mock = MockProvider::with_defaults().with_create_error("insufficient capacity");
        let result = Instance::create(&mock, "vm-1", args()).await;

        match result {
            Err(InstanceError::CreateFailed(message)) => {
                assert_eq!(message, "insufficient capacity");
            }
            other => panic!("Expected CreateFailed, got {:?}", other),
        }
        assert_eq!(mock.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_reports_ip() {
        let mock = MockProvider::with_defaults().with_ip_address("10.0.1.11");
        let instance_args = args().with_networks(vec![NetworkArgs::with_address("10.0.1.11")]);

        let instance = Instance::create(&mock, "vm-1", instance_args).await.unwrap();
        assert_eq!(instance.id, "vm-vm-1");
        assert_eq!(instance.default_ip_address.as_deref(), Some("10.0.1.11"));
        assert_eq!(instance.plan.request.guest_id.as_deref(), Some("rhel9_64Guest"));
        assert_eq!(instance.plan.request.firmware.as_deref(), Some("efi"));
    }

    #[tokio::test]
    async fn test_render_guest_config_offline() {
        let guest = render_guest_config(&TemplateRenderer::new(), &Normalizer::new(), "vm-1", args())
            .await
            .unwrap();
        let documents = guest.documents.unwrap();
        assert!(documents.metadata.contains("local-hostname: \"vm-1\""));
        assert!(documents.userdata.starts_with("#cloud-config\n"));
        assert_eq!(guest.extra_config.len(), 4);

        let mut template_args = args();
        template_args.inherit_template_disks = true;
        let result =
            render_guest_config(&TemplateRenderer::new(), &Normalizer::new(), "vm-1", template_args)
                .await;
        assert!(matches!(result, Err(InstanceError::Config(_))));
    }
}
