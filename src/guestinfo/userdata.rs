//! Userdata document generation

use super::merge::{as_mapping, shallow_merge};
use crate::InstanceError;
use crate::config::DiskSpec;
use crate::template::{TemplateRenderer, UserdataContext};
use serde_yaml::Mapping;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Header cloud-init requires to treat userdata as cloud-config
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Render the generated userdata mapping for a disk layout
pub fn generate_base_userdata(
    renderer: &TemplateRenderer,
    disks: &[DiskSpec],
) -> Result<Mapping, InstanceError> {
    let rendered = renderer.render_userdata(&UserdataContext::new(disks))?;

    let value: serde_yaml::Value = serde_yaml::from_str(&rendered).map_err(|e| {
        InstanceError::TemplateRender(format!("userdata is not valid YAML: {}", e))
    })?;

    as_mapping(value).ok_or_else(|| {
        InstanceError::TemplateRender("userdata template must produce a mapping".to_string())
    })
}

/// Parse a userdata override document
pub fn parse_override(path: &Path, content: &str) -> Result<Mapping, InstanceError> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| InstanceError::override_parse(path, e.to_string()))?;

    as_mapping(value)
        .ok_or_else(|| InstanceError::override_parse(path, "top level must be a mapping"))
}

/// Read and parse a userdata override file
pub async fn load_override(path: &Path) -> Result<Mapping, InstanceError> {
    debug!("Loading userdata override {}", path.display());
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| InstanceError::missing_file(path, e))?;
    parse_override(path, &content)
}

/// Serialize a userdata mapping as a cloud-config document
pub fn to_cloud_config(userdata: &Mapping) -> Result<String, InstanceError> {
    let body = serde_yaml::to_string(userdata)?;
    Ok(format!("{}\n{}", CLOUD_CONFIG_HEADER, body))
}

/// Render userdata, apply the override (if any) and serialize it
pub async fn generate_userdata(
    renderer: &TemplateRenderer,
    disks: &[DiskSpec],
    override_file: Option<&Path>,
) -> Result<String, InstanceError> {
    let mut userdata = generate_base_userdata(renderer, disks)?;

    if let Some(path) = override_file {
        let overlay = load_override(path).await?;
        info!(
            "Merging {} top-level keys from {}",
            overlay.len(),
            path.display()
        );
        userdata = shallow_merge(userdata, overlay);
    }

    to_cloud_config(&userdata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiskArgs;
    use crate::config::normalize::normalize_disks;
    use serde_yaml::Value;
    use tempfile::TempDir;

    fn scenario_disks() -> Vec<DiskSpec> {
        normalize_disks(vec![
            DiskArgs::new("root", 20),
            DiskArgs::new("logs", 50).mounted_at("/var/log"),
            DiskArgs::new("data", 500).mounted_at("/var/data"),
        ])
        .unwrap()
    }

    fn parse(userdata: &str) -> Mapping {
        let body = userdata.strip_prefix("#cloud-config\n").unwrap();
        serde_yaml::from_str(body).unwrap()
    }

    #[test]
    fn test_base_userdata_for_mounted_disks() {
        let base = generate_base_userdata(&TemplateRenderer::new(), &scenario_disks()).unwrap();

        let disk_setup = base["disk_setup"].as_mapping().unwrap();
        assert_eq!(disk_setup.len(), 2);
        assert!(disk_setup.contains_key("/dev/sdb"));
        assert!(disk_setup.contains_key("/dev/sdc"));

        let fs_setup = base["fs_setup"].as_sequence().unwrap();
        assert_eq!(fs_setup[0]["device"], Value::from("/dev/sdb"));
        assert_eq!(fs_setup[0]["filesystem"], Value::from("xfs"));
        assert_eq!(fs_setup[0]["label"], Value::from("logs"));
        assert_eq!(fs_setup[1]["label"], Value::from("data"));

        let mounts = base["mounts"].as_sequence().unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0][0], Value::from("/dev/sdb1"));
        assert_eq!(mounts[0][1], Value::from("/var/log"));
        assert_eq!(mounts[1][1], Value::from("/var/data"));
    }

    #[test]
    fn test_fs_label_cut_to_xfs_limit() {
        let disks = normalize_disks(vec![
            DiskArgs::new("root", 20),
            DiskArgs::new("application-logs", 50).mounted_at("/var/log/app"),
        ])
        .unwrap();
        let base = generate_base_userdata(&TemplateRenderer::new(), &disks).unwrap();

        let fs_setup = base["fs_setup"].as_sequence().unwrap();
        assert_eq!(fs_setup[0]["label"], Value::from("application-"));
    }

    #[test]
    fn test_base_userdata_without_mounts_is_empty() {
        let disks = normalize_disks(vec![DiskArgs::default()]).unwrap();
        let base = generate_base_userdata(&TemplateRenderer::new(), &disks).unwrap();
        assert!(base.is_empty());
    }

    #[tokio::test]
    async fn test_generate_userdata_has_header() {
        let userdata = generate_userdata(&TemplateRenderer::new(), &scenario_disks(), None)
            .await
            .unwrap();
        assert!(userdata.starts_with("#cloud-config\n"));
        assert!(parse(&userdata).contains_key("mounts"));
    }

    #[tokio::test]
    async fn test_generate_userdata_with_override() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("userdata.yaml");
        fs::write(
            &path,
            "#cloud-config\ntimezone: UTC\nmounts: []\npackages:\n  - htop\n",
        )
        .await
        .unwrap();

        let userdata = generate_userdata(&TemplateRenderer::new(), &scenario_disks(), Some(&path))
            .await
            .unwrap();
        let merged = parse(&userdata);

        assert_eq!(merged["timezone"], Value::from("UTC"));
        assert_eq!(merged["mounts"], Value::Sequence(Vec::new()));
        assert_eq!(merged["fs_setup"].as_sequence().unwrap().len(), 2);
        assert_eq!(merged["packages"][0], Value::from("htop"));
    }

    #[tokio::test]
    async fn test_override_not_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("userdata.yaml");
        fs::write(&path, "timezone: [UTC\n").await.unwrap();

        let result = generate_userdata(&TemplateRenderer::new(), &scenario_disks(), Some(&path)).await;
        assert!(matches!(result, Err(InstanceError::OverrideParse { .. })));
    }

    #[test]
    fn test_override_not_a_mapping() {
        let result = parse_override(Path::new("userdata.yaml"), "- one\n- two\n");
        assert!(matches!(result, Err(InstanceError::OverrideParse { .. })));
    }

    #[tokio::test]
    async fn test_override_missing() {
        let result = load_override(Path::new("/nonexistent/userdata.yaml")).await;
        assert!(matches!(result, Err(InstanceError::MissingFile { .. })));
    }

    #[test]
    fn test_empty_override_is_noop() {
        let overlay = parse_override(Path::new("userdata.yaml"), "").unwrap();
        assert!(overlay.is_empty());
    }
}
