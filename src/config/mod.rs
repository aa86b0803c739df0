//! Instance arguments and their normalization
//!
//! `InstanceArgs` is the caller-facing, partially-defaulted description of a
//! virtual machine. It can be built in code or parsed from YAML; every field
//! has an explicit default so a file may specify any subset of them.

pub mod loader;
pub mod normalize;
pub mod ssh_keys;

pub use loader::load_instance_args;
pub use normalize::{
    Addressing, DiskSource, DiskSpec, InstanceConfig, NetworkSpec, Normalizer, StaticAddress,
};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_DATACENTER: &str = "Datacenter";
pub const DEFAULT_CLUSTER: &str = "dell-cluster-1";
pub const DEFAULT_DATASTORE: &str = "nfs_default_1";
pub const DEFAULT_TEMPLATE: &str = "rocky-9-template";
pub const DEFAULT_SSH_KEY: &str = "~/.ssh/id_ed25519.pub";
pub const DEFAULT_NETWORK: &str = "vm-lan-1";
pub const DEFAULT_INTERFACE: &str = "ens192";
pub const DEFAULT_DISK_LABEL: &str = "root";
/// Root disk size in GiB
pub const DEFAULT_DISK_SIZE: u32 = 20;

/// Literal address value selecting DHCP
pub const DHCP: &str = "dhcp";

/// Arguments for one virtual machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceArgs {
    pub datacenter: String,
    pub cluster: String,
    pub datastore: String,
    /// Name of the template VM to clone from
    pub template: String,
    pub cpus: u32,
    /// Memory in MiB
    pub memory: u32,
    /// Disk layout; `None` means a single root disk (or the template's
    /// layout when `inherit_template_disks` is set)
    pub disks: Option<DiskLayout>,
    /// Use the template's disk layout when no disks are given
    pub inherit_template_disks: bool,
    /// Inline public keys or paths to public key files
    pub ssh_keys: Vec<String>,
    pub networks: Vec<NetworkArgs>,
    pub enable_disk_uuid: bool,
    /// YAML file merged on top of the generated userdata
    pub userdata_file: Option<PathBuf>,
    /// Replaces the generated guestinfo bag entirely
    pub extra_config: Option<BTreeMap<String, String>>,
    /// Minutes to wait for guest networking, passed to the provider
    pub wait_for_guest_net_timeout: Option<u32>,
}

impl Default for InstanceArgs {
    fn default() -> Self {
        Self {
            datacenter: DEFAULT_DATACENTER.to_string(),
            cluster: DEFAULT_CLUSTER.to_string(),
            datastore: DEFAULT_DATASTORE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            cpus: 1,
            memory: 1024,
            disks: None,
            inherit_template_disks: false,
            ssh_keys: vec![DEFAULT_SSH_KEY.to_string()],
            networks: vec![NetworkArgs::default()],
            enable_disk_uuid: true,
            userdata_file: None,
            extra_config: None,
            wait_for_guest_net_timeout: None,
        }
    }
}

impl InstanceArgs {
    /// Parse instance arguments from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Set CPU count and memory (MiB)
    pub fn with_resources(mut self, cpus: u32, memory: u32) -> Self {
        self.cpus = cpus;
        self.memory = memory;
        self
    }

    /// Set the template to clone from
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set the disk list
    pub fn with_disks(mut self, disks: Vec<DiskArgs>) -> Self {
        self.disks = Some(DiskLayout::Specs(disks));
        self
    }

    /// Set the networks
    pub fn with_networks(mut self, networks: Vec<NetworkArgs>) -> Self {
        self.networks = networks;
        self
    }

    /// Set the ssh key sources
    pub fn with_ssh_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ssh_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the userdata override file
    pub fn with_userdata_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.userdata_file = Some(path.into());
        self
    }

    /// Replace the generated guestinfo with a custom map
    pub fn with_extra_config(mut self, extra_config: BTreeMap<String, String>) -> Self {
        self.extra_config = Some(extra_config);
        self
    }
}

/// One disk as given by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskArgs {
    pub label: String,
    /// Size in GiB
    pub size: u32,
    pub eagerly_scrub: bool,
    pub thin_provisioned: bool,
    pub mount_point: Option<String>,
}

impl Default for DiskArgs {
    fn default() -> Self {
        Self {
            label: DEFAULT_DISK_LABEL.to_string(),
            size: DEFAULT_DISK_SIZE,
            eagerly_scrub: false,
            thin_provisioned: true,
            mount_point: None,
        }
    }
}

impl DiskArgs {
    /// A thin-provisioned disk with no mount point
    pub fn new(label: impl Into<String>, size: u32) -> Self {
        Self {
            label: label.into(),
            size,
            ..Default::default()
        }
    }

    /// Mount the disk's filesystem at `path` in the guest
    pub fn mounted_at(mut self, path: impl Into<String>) -> Self {
        self.mount_point = Some(path.into());
        self
    }
}

/// Disks as either a list of specs or a compact `label: size` mapping
///
/// ```yaml
/// disks:
///   root: 20
///   data: 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiskLayout {
    Specs(Vec<DiskArgs>),
    Sizes(DiskSizes),
}

impl DiskLayout {
    /// Expand into disk arguments, preserving input order
    pub fn into_disks(self) -> Vec<DiskArgs> {
        match self {
            DiskLayout::Specs(disks) => disks,
            DiskLayout::Sizes(sizes) => sizes
                .0
                .into_iter()
                .map(|(label, size)| DiskArgs::new(label, size))
                .collect(),
        }
    }
}

/// Ordered `label → size` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskSizes(pub Vec<(String, u32)>);

impl Serialize for DiskSizes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, size) in &self.0 {
            map.serialize_entry(label, size)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DiskSizes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizesVisitor;

        impl<'de> Visitor<'de> for SizesVisitor {
            type Value = DiskSizes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of disk label to size in GiB")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DiskSizes, A::Error> {
                let mut sizes = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, size)) = access.next_entry::<String, u32>()? {
                    sizes.push((label, size));
                }
                Ok(DiskSizes(sizes))
            }
        }

        deserializer.deserialize_map(SizesVisitor)
    }
}

/// One network interface as given by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkArgs {
    /// Logical network (port group) name
    pub name: String,
    /// Interface name inside the guest
    pub interface: String,
    /// IPv4 address, optionally with `/prefix`, or `dhcp`
    pub ip_address: String,
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
}

impl Default for NetworkArgs {
    fn default() -> Self {
        Self {
            name: DEFAULT_NETWORK.to_string(),
            interface: DEFAULT_INTERFACE.to_string(),
            ip_address: DHCP.to_string(),
            gateway: None,
            dns_servers: Vec::new(),
        }
    }
}

impl NetworkArgs {
    /// A static address on the default network
    pub fn with_address(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            ..Default::default()
        }
    }
}
