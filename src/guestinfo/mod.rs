//! Guestinfo generation
//!
//! Builds the cloud-init metadata and userdata documents for an instance
//! and packs them into the `guestinfo.*` extra-config keys read by the
//! VMware datasource inside the guest.

pub mod merge;
pub mod metadata;
pub mod userdata;

pub use metadata::{MetadataDocument, generate_metadata};
pub use userdata::{CLOUD_CONFIG_HEADER, generate_userdata};

use crate::InstanceError;
use crate::config::{DiskSpec, NetworkSpec};
use crate::template::TemplateRenderer;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub const METADATA_KEY: &str = "guestinfo.metadata";
pub const METADATA_ENCODING_KEY: &str = "guestinfo.metadata.encoding";
pub const USERDATA_KEY: &str = "guestinfo.userdata";
pub const USERDATA_ENCODING_KEY: &str = "guestinfo.userdata.encoding";
pub const BASE64_ENCODING: &str = "base64";

/// The two rendered cloud-init documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestDocuments {
    pub metadata: String,
    pub userdata: String,
}

/// Rendered guest configuration for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestConfig {
    /// `None` when a custom extra-config map was supplied
    pub documents: Option<GuestDocuments>,
    pub extra_config: BTreeMap<String, String>,
}

impl GuestConfig {
    /// Use a caller-supplied extra-config map verbatim
    pub fn custom(extra_config: BTreeMap<String, String>) -> Self {
        Self {
            documents: None,
            extra_config,
        }
    }

    /// Encode rendered documents into the guestinfo bag
    pub fn from_documents(documents: GuestDocuments) -> Self {
        let extra_config = encode_extra_config(&documents);
        Self {
            documents: Some(documents),
            extra_config,
        }
    }
}

/// Base64-encode both documents into the four guestinfo keys
pub fn encode_extra_config(documents: &GuestDocuments) -> BTreeMap<String, String> {
    BTreeMap::from([
        (METADATA_KEY.to_string(), STANDARD.encode(&documents.metadata)),
        (METADATA_ENCODING_KEY.to_string(), BASE64_ENCODING.to_string()),
        (USERDATA_KEY.to_string(), STANDARD.encode(&documents.userdata)),
        (USERDATA_ENCODING_KEY.to_string(), BASE64_ENCODING.to_string()),
    ])
}

/// Decode one base64 guestinfo value back to text
pub fn decode_value(value: &str) -> Result<String, InstanceError> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| InstanceError::Config(format!("invalid base64 guestinfo value: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| InstanceError::Config(format!("guestinfo value is not UTF-8: {}", e)))
}

/// Render metadata and userdata for an instance
pub async fn build_documents(
    renderer: &TemplateRenderer,
    name: &str,
    ssh_keys: &[String],
    networks: &[NetworkSpec],
    disks: &[DiskSpec],
    userdata_override: Option<&Path>,
) -> Result<GuestDocuments, InstanceError> {
    if name.trim().is_empty() {
        return Err(InstanceError::Config("instance name is empty".to_string()));
    }

    let metadata = generate_metadata(renderer, name, ssh_keys, networks)?;
    debug!("Rendered metadata ({} bytes)", metadata.len());

    let userdata = generate_userdata(renderer, disks, userdata_override).await?;
    debug!("Rendered userdata ({} bytes)", userdata.len());

    Ok(GuestDocuments { metadata, userdata })
}

/// Build the guest configuration for an instance
///
/// A custom extra-config map short-circuits rendering entirely.
pub async fn build(
    renderer: &TemplateRenderer,
    name: &str,
    ssh_keys: &[String],
    networks: &[NetworkSpec],
    disks: &[DiskSpec],
    userdata_override: Option<&Path>,
    custom_extra_config: Option<&BTreeMap<String, String>>,
) -> Result<GuestConfig, InstanceError> {
    if let Some(custom) = custom_extra_config {
        info!("Using custom extra config with {} keys", custom.len());
        return Ok(GuestConfig::custom(custom.clone()));
    }

    let documents =
        build_documents(renderer, name, ssh_keys, networks, disks, userdata_override).await?;
    Ok(GuestConfig::from_documents(documents))
}
