//! Template context building
//!
//! Typed contexts for the metadata and userdata templates, built from the
//! normalized instance description.

use crate::config::{Addressing, DiskSpec, NetworkSpec};
use serde::Serialize;

/// Context for `metadata.yaml.j2`
#[derive(Debug, Clone, Serialize)]
pub struct MetadataContext {
    pub instance_id: String,
    pub hostname: String,
    pub public_keys: Vec<String>,
    pub networks: Vec<NetworkContext>,
}

/// One entry of the `ethernets` map
#[derive(Debug, Clone, Serialize)]
pub struct NetworkContext {
    pub interface: String,
    pub dhcp: bool,
    pub addresses: Vec<String>,
    pub gateway: Option<String>,
    pub nameservers: Vec<String>,
}

/// Context for `userdata.yaml.j2`
#[derive(Debug, Clone, Serialize)]
pub struct UserdataContext {
    /// Every disk, including unmounted ones. The built-in template only
    /// walks `mounted_disks`; this is for custom templates.
    pub disks: Vec<DiskContext>,
    /// Disks with a mount point, in unit order
    pub mounted_disks: Vec<DiskContext>,
}

/// One disk as seen by the userdata template
///
/// `size` and `unit_number` are not used by the built-in template and are
/// exposed for templates supplied with `--template-dir`.
#[derive(Debug, Clone, Serialize)]
pub struct DiskContext {
    pub label: String,
    /// Filesystem label: the disk label cut to the xfs limit
    pub fs_label: String,
    pub size: u32,
    pub unit_number: u32,
    pub device: String,
    pub mount_point: Option<String>,
}

/// Longest label `mkfs.xfs` accepts
pub const XFS_LABEL_MAX: usize = 12;

impl MetadataContext {
    pub fn new(name: &str, ssh_keys: &[String], networks: &[NetworkSpec]) -> Self {
        Self {
            instance_id: name.to_string(),
            hostname: name.to_string(),
            public_keys: ssh_keys.to_vec(),
            networks: networks.iter().map(NetworkContext::from).collect(),
        }
    }
}

impl From<&NetworkSpec> for NetworkContext {
    fn from(spec: &NetworkSpec) -> Self {
        match &spec.addressing {
            Addressing::Dhcp => Self {
                interface: spec.interface.clone(),
                dhcp: true,
                addresses: Vec::new(),
                gateway: None,
                nameservers: Vec::new(),
            },
            Addressing::Static(s) => Self {
                interface: spec.interface.clone(),
                dhcp: false,
                addresses: vec![s.cidr()],
                gateway: Some(s.gateway.to_string()),
                nameservers: s.nameservers.iter().map(ToString::to_string).collect(),
            },
        }
    }
}

impl UserdataContext {
    pub fn new(disks: &[DiskSpec]) -> Self {
        let disks: Vec<DiskContext> = disks.iter().map(DiskContext::from).collect();
        let mounted_disks = disks
            .iter()
            .filter(|d| d.mount_point.is_some())
            .cloned()
            .collect();

        Self {
            disks,
            mounted_disks,
        }
    }
}

impl From<&DiskSpec> for DiskContext {
    fn from(disk: &DiskSpec) -> Self {
        Self {
            label: disk.label.clone(),
            fs_label: disk.label.chars().take(XFS_LABEL_MAX).collect(),
            size: disk.size,
            unit_number: disk.unit_number,
            device: disk.device(),
            mount_point: disk.mount_point.clone(),
        }
    }
}
