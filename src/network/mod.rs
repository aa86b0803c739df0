//! Network configuration module
//!
//! Address helpers and the cloud-init network config v2 model carried in
//! the metadata document.

use crate::InstanceError;
use crate::config::{Addressing, NetworkSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Prefix length used when a static address has none
pub const DEFAULT_PREFIX_LEN: u8 = 24;

/// Nameservers for static interfaces without an explicit list
pub const FALLBACK_NAMESERVERS: [Ipv4Addr; 2] =
    [Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)];

/// Gateway for an address: same first three octets, host `.1`
pub fn default_gateway(address: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = address.octets();
    Ipv4Addr::new(a, b, c, 1)
}

/// Parse `a.b.c.d` or `a.b.c.d/len`
pub fn parse_cidr(value: &str, default_prefix: u8) -> Result<(Ipv4Addr, u8), InstanceError> {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => {
            let prefix = prefix
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= 32)
                .ok_or_else(|| {
                    InstanceError::Config(format!("invalid prefix length in '{}'", value))
                })?;
            (addr, prefix)
        }
        None => (value, default_prefix),
    };

    let addr = addr
        .parse::<Ipv4Addr>()
        .map_err(|e| InstanceError::Config(format!("invalid address '{}': {}", value, e)))?;

    Ok((addr, prefix))
}

/// Network configuration (v2 format)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub version: u8,
    #[serde(default)]
    pub ethernets: BTreeMap<String, EthernetConfig>,
}

/// Ethernet interface configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp4: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<NameserverConfig>,
}

/// Nameserver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameserverConfig {
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl From<&NetworkSpec> for EthernetConfig {
    fn from(spec: &NetworkSpec) -> Self {
        match &spec.addressing {
            Addressing::Dhcp => EthernetConfig {
                dhcp4: Some(true),
                ..Default::default()
            },
            Addressing::Static(s) => EthernetConfig {
                dhcp4: None,
                addresses: vec![s.cidr()],
                gateway4: Some(s.gateway.to_string()),
                nameservers: Some(NameserverConfig {
                    addresses: s.nameservers.iter().map(ToString::to_string).collect(),
                }),
            },
        }
    }
}

impl NetworkConfig {
    /// Build the v2 config for a set of NICs, keyed by guest interface
    pub fn from_specs(specs: &[NetworkSpec]) -> Self {
        Self {
            version: 2,
            ethernets: specs
                .iter()
                .map(|spec| (spec.interface.clone(), EthernetConfig::from(spec)))
                .collect(),
        }
    }

    /// Parse network config from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
