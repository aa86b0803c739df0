//! Config normalization
//!
//! Turns `InstanceArgs` into a fully-specified `InstanceConfig`: ssh keys are
//! read, disks get unit numbers, and networks get their gateway and
//! nameservers filled in.

use super::{DHCP, DiskArgs, InstanceArgs, NetworkArgs, ssh_keys};
use crate::InstanceError;
use crate::network::{DEFAULT_PREFIX_LEN, FALLBACK_NAMESERVERS, default_gateway, parse_cidr};
use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// A virtual disk with its position on the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub label: String,
    /// Size in GiB
    pub size: u32,
    pub eagerly_scrub: bool,
    pub thin_provisioned: bool,
    pub mount_point: Option<String>,
    pub unit_number: u32,
}

impl DiskSpec {
    /// Guest block device name for this disk (`sda`, `sdb`, ...)
    pub fn device(&self) -> String {
        let mut n = self.unit_number as usize;
        let mut letters = Vec::new();
        loop {
            letters.push(b'a' + (n % 26) as u8);
            if n < 26 {
                break;
            }
            n = n / 26 - 1;
        }
        letters.reverse();
        format!("sd{}", String::from_utf8_lossy(&letters))
    }
}

/// Where the instance's disks come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskSource {
    Explicit(Vec<DiskSpec>),
    /// Copy the template VM's disk layout
    Template,
}

/// A virtual NIC with resolved guest addressing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub interface: String,
    pub addressing: Addressing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Dhcp,
    Static(StaticAddress),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
    pub nameservers: Vec<IpAddr>,
}

impl StaticAddress {
    /// Address in `a.b.c.d/len` form
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_len)
    }
}

/// Fully-specified request for one virtual machine
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub datacenter: String,
    pub cluster: String,
    pub datastore: String,
    pub template: String,
    pub cpus: u32,
    pub memory: u32,
    pub disks: DiskSource,
    /// Public keys, already read from their files
    pub ssh_keys: Vec<String>,
    pub networks: Vec<NetworkSpec>,
    pub enable_disk_uuid: bool,
    pub userdata_file: Option<PathBuf>,
    pub extra_config: Option<BTreeMap<String, String>>,
    pub wait_for_guest_net_timeout: Option<u32>,
}

/// Applies defaults and resolves file references in `InstanceArgs`
#[derive(Debug, Clone)]
pub struct Normalizer {
    home: Option<PathBuf>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Expand `~` using `$HOME`
    pub fn new() -> Self {
        Self {
            home: std::env::var_os("HOME").map(PathBuf::from),
        }
    }

    /// Expand `~` using a custom home directory (useful for testing)
    pub fn with_home(home: impl AsRef<Path>) -> Self {
        Self {
            home: Some(home.as_ref().to_path_buf()),
        }
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Normalize instance arguments
    ///
    /// Reads ssh key files and checks the userdata override exists; nothing
    /// else touches the filesystem.
    pub async fn normalize(&self, args: InstanceArgs) -> Result<InstanceConfig, InstanceError> {
        validate_positive("cpus", args.cpus)?;
        validate_positive("memory", args.memory)?;
        if let Some(timeout) = args.wait_for_guest_net_timeout {
            validate_positive("wait_for_guest_net_timeout", timeout)?;
        }

        let ssh_keys = ssh_keys::resolve_ssh_keys(&args.ssh_keys, self.home()).await?;
        debug!("Resolved {} ssh keys", ssh_keys.len());

        let disks = match args.disks.map(|d| d.into_disks()) {
            Some(disks) if !disks.is_empty() => DiskSource::Explicit(normalize_disks(disks)?),
            _ if args.inherit_template_disks => DiskSource::Template,
            _ => DiskSource::Explicit(normalize_disks(vec![DiskArgs::default()])?),
        };

        let networks = if args.networks.is_empty() {
            vec![normalize_network(&NetworkArgs::default())?]
        } else {
            args.networks
                .iter()
                .map(normalize_network)
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut interfaces = HashSet::new();
        for net in &networks {
            if !interfaces.insert(net.interface.as_str()) {
                return Err(InstanceError::Config(format!(
                    "duplicate guest interface '{}'",
                    net.interface
                )));
            }
        }

        let userdata_file = match args.userdata_file {
            Some(path) => Some(self.check_userdata_file(&path).await?),
            None => None,
        };

        info!(
            "Normalized instance: {} cpus, {} MiB, {} networks",
            args.cpus,
            args.memory,
            networks.len()
        );

        Ok(InstanceConfig {
            datacenter: args.datacenter,
            cluster: args.cluster,
            datastore: args.datastore,
            template: args.template,
            cpus: args.cpus,
            memory: args.memory,
            disks,
            ssh_keys,
            networks,
            enable_disk_uuid: args.enable_disk_uuid,
            userdata_file,
            extra_config: args.extra_config,
            wait_for_guest_net_timeout: args.wait_for_guest_net_timeout,
        })
    }

    async fn check_userdata_file(&self, path: &Path) -> Result<PathBuf, InstanceError> {
        let expanded = ssh_keys::expand_home(&path.to_string_lossy(), self.home());
        fs::metadata(&expanded)
            .await
            .map_err(|e| InstanceError::missing_file(&expanded, e))?;
        Ok(expanded)
    }
}

fn validate_positive(field: &str, value: u32) -> Result<(), InstanceError> {
    if value == 0 {
        return Err(InstanceError::Config(format!("{} must be positive", field)));
    }
    Ok(())
}

/// Assign unit numbers by position and validate labels and sizes
pub fn normalize_disks(disks: Vec<DiskArgs>) -> Result<Vec<DiskSpec>, InstanceError> {
    let mut labels = HashSet::new();

    disks
        .into_iter()
        .enumerate()
        .map(|(idx, disk)| {
            if disk.size == 0 {
                return Err(InstanceError::Config(format!(
                    "disk '{}' must have a positive size",
                    disk.label
                )));
            }
            if !labels.insert(disk.label.clone()) {
                return Err(InstanceError::Config(format!(
                    "duplicate disk label '{}'",
                    disk.label
                )));
            }

            Ok(DiskSpec {
                label: disk.label,
                size: disk.size,
                eagerly_scrub: disk.eagerly_scrub,
                thin_provisioned: disk.thin_provisioned,
                mount_point: disk.mount_point.filter(|m| !m.is_empty()),
                unit_number: idx as u32,
            })
        })
        .collect()
}

/// Resolve DHCP or static addressing for one network
pub fn normalize_network(args: &NetworkArgs) -> Result<NetworkSpec, InstanceError> {
    let ip = args.ip_address.trim();

    let addressing = if ip.is_empty() || ip.eq_ignore_ascii_case(DHCP) {
        Addressing::Dhcp
    } else {
        let (address, prefix_len) = parse_cidr(ip, DEFAULT_PREFIX_LEN)?;

        let gateway = match args.gateway.as_deref().map(str::trim) {
            Some(gw) if !gw.is_empty() => gw.parse::<Ipv4Addr>().map_err(|e| {
                InstanceError::Config(format!("invalid gateway '{}': {}", gw, e))
            })?,
            _ => default_gateway(address),
        };

        let nameservers = if args.dns_servers.is_empty() {
            FALLBACK_NAMESERVERS.iter().map(|ns| IpAddr::V4(*ns)).collect()
        } else {
            args.dns_servers
                .iter()
                .map(|ns| {
                    ns.trim().parse::<IpAddr>().map_err(|e| {
                        InstanceError::Config(format!("invalid dns server '{}': {}", ns, e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Addressing::Static(StaticAddress {
            address,
            prefix_len,
            gateway,
            nameservers,
        })
    };

    Ok(NetworkSpec {
        name: args.name.clone(),
        interface: args.interface.clone(),
        addressing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiskLayout, DiskSizes};
    use tempfile::TempDir;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 test@example";

    fn args_with_inline_key() -> InstanceArgs {
        InstanceArgs::default().with_ssh_keys([KEY])
    }

    #[test]
    fn test_unit_numbers_follow_position() {
        let disks = normalize_disks(vec![
            DiskArgs::new("root", 20),
            DiskArgs::new("logs", 50),
            DiskArgs::new("data", 500),
        ])
        .unwrap();
        let units: Vec<_> = disks.iter().map(|d| d.unit_number).collect();
        assert_eq!(units, vec![0, 1, 2]);

        let reordered = normalize_disks(vec![
            DiskArgs::new("data", 500),
            DiskArgs::new("root", 20),
            DiskArgs::new("logs", 50),
        ])
        .unwrap();
        assert_eq!(reordered[0].label, "data");
        assert_eq!(reordered[0].unit_number, 0);
        assert_eq!(reordered[1].label, "root");
        assert_eq!(reordered[1].unit_number, 1);
    }

    #[test]
    fn test_duplicate_disk_label() {
        let result = normalize_disks(vec![DiskArgs::new("root", 20), DiskArgs::new("root", 30)]);
        assert!(matches!(result, Err(InstanceError::Config(_))));
    }

    #[test]
    fn test_zero_size_disk() {
        let result = normalize_disks(vec![DiskArgs::new("root", 0)]);
        assert!(matches!(result, Err(InstanceError::Config(_))));
    }

    #[test]
    fn test_device_names() {
        let mut disk = normalize_disks(vec![DiskArgs::new("root", 20)]).unwrap().remove(0);
        assert_eq!(disk.device(), "sda");
        disk.unit_number = 2;
        assert_eq!(disk.device(), "sdc");
        disk.unit_number = 25;
        assert_eq!(disk.device(), "sdz");
        disk.unit_number = 26;
        assert_eq!(disk.device(), "sdaa");
    }

    #[test]
    fn test_static_network_derives_gateway() {
        let spec = normalize_network(&NetworkArgs::with_address("10.0.1.11")).unwrap();
        match spec.addressing {
            Addressing::Static(s) => {
                assert_eq!(s.gateway, Ipv4Addr::new(10, 0, 1, 1));
                assert_eq!(s.cidr(), "10.0.1.11/24");
                assert_eq!(
                    s.nameservers,
                    vec![
                        "8.8.8.8".parse::<IpAddr>().unwrap(),
                        "8.8.4.4".parse::<IpAddr>().unwrap()
                    ]
                );
            }
            Addressing::Dhcp => panic!("Expected static addressing"),
        }
    }

    #[test]
    fn test_static_network_explicit_values() {
        let args = NetworkArgs {
            ip_address: "192.168.10.20/16".to_string(),
            gateway: Some("192.168.0.254".to_string()),
            dns_servers: vec!["192.168.0.53".to_string()],
            ..Default::default()
        };
        let spec = normalize_network(&args).unwrap();
        let Addressing::Static(s) = spec.addressing else {
            panic!("Expected static addressing");
        };
        assert_eq!(s.prefix_len, 16);
        assert_eq!(s.gateway, Ipv4Addr::new(192, 168, 0, 254));
        assert_eq!(s.nameservers, vec!["192.168.0.53".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_dhcp_ignores_gateway() {
        let args = NetworkArgs {
            gateway: Some("10.0.0.1".to_string()),
            dns_servers: vec!["1.1.1.1".to_string()],
            ..Default::default()
        };
        let spec = normalize_network(&args).unwrap();
        assert_eq!(spec.addressing, Addressing::Dhcp);
    }

    #[test]
    fn test_invalid_address() {
        let result = normalize_network(&NetworkArgs::with_address("not-an-ip"));
        assert!(matches!(result, Err(InstanceError::Config(_))));
    }

    #[tokio::test]
    async fn test_normalize_defaults() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".ssh")).await.unwrap();
        fs::write(temp.path().join(".ssh/id_ed25519.pub"), KEY)
            .await
            .unwrap();

        let config = Normalizer::with_home(temp.path())
            .normalize(InstanceArgs::default())
            .await
            .unwrap();

        assert_eq!(config.ssh_keys, vec![KEY]);
        let DiskSource::Explicit(disks) = &config.disks else {
            panic!("Expected explicit disks");
        };
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].label, "root");
        assert_eq!(disks[0].size, 20);
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].name, "vm-lan-1");
        assert_eq!(config.networks[0].addressing, Addressing::Dhcp);
    }

    #[tokio::test]
    async fn test_normalize_missing_default_key() {
        let temp = TempDir::new().unwrap();
        let result = Normalizer::with_home(temp.path())
            .normalize(InstanceArgs::default())
            .await;

        match result {
            Err(InstanceError::MissingFile { path, .. }) => {
                assert_eq!(path, temp.path().join(".ssh/id_ed25519.pub"));
            }
            other => panic!("Expected MissingFile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_normalize_empty_lists_use_defaults() {
        let mut args = args_with_inline_key().with_networks(Vec::new());
        args.disks = Some(DiskLayout::Specs(Vec::new()));

        let config = Normalizer::new().normalize(args).await.unwrap();
        assert!(matches!(&config.disks, DiskSource::Explicit(d) if d.len() == 1));
        assert_eq!(config.networks.len(), 1);
    }

    #[tokio::test]
    async fn test_normalize_disk_mapping() {
        let mut args = args_with_inline_key();
        args.disks = Some(DiskLayout::Sizes(DiskSizes(vec![
            ("root".to_string(), 20),
            ("data".to_string(), 100),
        ])));

        let config = Normalizer::new().normalize(args).await.unwrap();
        let DiskSource::Explicit(disks) = config.disks else {
            panic!("Expected explicit disks");
        };
        assert_eq!(disks[1].label, "data");
        assert_eq!(disks[1].unit_number, 1);
        assert!(disks[1].thin_provisioned);
    }

    #[tokio::test]
    async fn test_normalize_inherit_template_disks() {
        let mut args = args_with_inline_key();
        args.inherit_template_disks = true;

        let config = Normalizer::new().normalize(args).await.unwrap();
        assert_eq!(config.disks, DiskSource::Template);
    }

    #[tokio::test]
    async fn test_normalize_duplicate_interface() {
        let args = args_with_inline_key()
            .with_networks(vec![NetworkArgs::default(), NetworkArgs::with_address("10.0.1.11")]);
        let result = Normalizer::new().normalize(args).await;
        assert!(matches!(result, Err(InstanceError::Config(_))));
    }

    #[tokio::test]
    async fn test_normalize_rejects_zero_cpus() {
        let args = args_with_inline_key().with_resources(0, 1024);
        let result = Normalizer::new().normalize(args).await;
        assert!(matches!(result, Err(InstanceError::Config(_))));
    }

    #[tokio::test]
    async fn test_normalize_missing_userdata_file() {
        let args = args_with_inline_key().with_userdata_file("/nonexistent/userdata.yaml");
        let result = Normalizer::new().normalize(args).await;
        assert!(matches!(result, Err(InstanceError::MissingFile { .. })));
    }
}
