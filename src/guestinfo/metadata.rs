//! Metadata document generation

use crate::InstanceError;
use crate::config::NetworkSpec;
use crate::network::NetworkConfig;
use crate::template::{MetadataContext, TemplateRenderer};
use serde::Deserialize;

/// Parsed form of a rendered metadata document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataDocument {
    pub instance_id: String,
    pub local_hostname: String,
    pub public_keys: Vec<String>,
    pub network: NetworkConfig,
}

impl MetadataDocument {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Render the metadata document for an instance
///
/// The rendered text is parsed back and compared against the inputs, so a
/// template that produces invalid YAML or drops a field fails here rather
/// than in the guest.
pub fn generate_metadata(
    renderer: &TemplateRenderer,
    name: &str,
    ssh_keys: &[String],
    networks: &[NetworkSpec],
) -> Result<String, InstanceError> {
    let context = MetadataContext::new(name, ssh_keys, networks);
    let rendered = renderer.render_metadata(&context)?;

    let document = MetadataDocument::from_yaml(&rendered).map_err(|e| {
        InstanceError::TemplateRender(format!("metadata is not valid YAML: {}", e))
    })?;
    check_document(&document, name, ssh_keys, networks)?;

    Ok(rendered)
}

fn check_document(
    document: &MetadataDocument,
    name: &str,
    ssh_keys: &[String],
    networks: &[NetworkSpec],
) -> Result<(), InstanceError> {
    if document.instance_id != name || document.local_hostname != name {
        return Err(InstanceError::TemplateRender(format!(
            "metadata identity does not match instance name '{}'",
            name
        )));
    }
    if document.public_keys != ssh_keys {
        return Err(InstanceError::TemplateRender(
            "metadata public-keys do not match the configured keys".to_string(),
        ));
    }
    if document.network != NetworkConfig::from_specs(networks) {
        return Err(InstanceError::TemplateRender(
            "metadata network does not match the configured networks".to_string(),
        ));
    }
    Ok(())
}
