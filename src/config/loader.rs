//! Instance file loader
//!
//! Loads `InstanceArgs` from a YAML file. Relative paths inside the file
//! (ssh key files and the userdata override) are resolved against the
//! file's own directory.

use super::InstanceArgs;
use crate::InstanceError;
use crate::config::ssh_keys::is_key_shaped;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Load instance arguments from a YAML file
pub async fn load_instance_args(path: impl AsRef<Path>) -> Result<InstanceArgs, InstanceError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| InstanceError::missing_file(path, e))?;

    let args = InstanceArgs::from_yaml(&content)?;
    debug!("Loaded instance arguments from {}", path.display());

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(relative_to(args, base))
}

/// Resolve relative file references against `base`
pub fn relative_to(mut args: InstanceArgs, base: &Path) -> InstanceArgs {
    args.ssh_keys = args
        .ssh_keys
        .into_iter()
        .map(|entry| {
            if is_key_shaped(&entry) || !is_relative_path(&entry) {
                entry
            } else {
                base.join(&entry).to_string_lossy().into_owned()
            }
        })
        .collect();

    args.userdata_file = args.userdata_file.map(|file| {
        if is_relative_path(&file.to_string_lossy()) {
            base.join(file)
        } else {
            file
        }
    });

    args
}

fn is_relative_path(entry: &str) -> bool {
    !entry.starts_with('~') && PathBuf::from(entry).is_relative()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_instance_args() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("instance.yaml");

        fs::write(
            &path,
            "cpus: 4\nssh_keys:\n  - ./id_ed25519.pub\n  - ~/.ssh/other.pub\nuserdata_file: userdata.yaml\n",
        )
        .await
        .unwrap();

        let args = load_instance_args(&path).await.unwrap();
        assert_eq!(args.cpus, 4);
        assert_eq!(
            PathBuf::from(&args.ssh_keys[0]),
            temp.path().join("./id_ed25519.pub")
        );
        assert_eq!(args.ssh_keys[1], "~/.ssh/other.pub");
        assert_eq!(args.userdata_file, Some(temp.path().join("userdata.yaml")));
    }

    #[tokio::test]
    async fn test_load_instance_args_not_exists() {
        let result = load_instance_args("/nonexistent/instance.yaml").await;
        assert!(matches!(result, Err(InstanceError::MissingFile { .. })));
    }

    #[tokio::test]
    async fn test_load_instance_args_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("instance.yaml");
        fs::write(&path, "cpus: [four\n").await.unwrap();

        let result = load_instance_args(&path).await;
        assert!(matches!(result, Err(InstanceError::Yaml(_))));
    }

    #[test]
    fn test_relative_to_keeps_inline_keys() {
        let args = InstanceArgs::default().with_ssh_keys(["ssh-ed25519 AAAA inline", "/abs/key.pub"]);
        let args = relative_to(args, Path::new("/etc/instances"));
        assert_eq!(args.ssh_keys, vec!["ssh-ed25519 AAAA inline", "/abs/key.pub"]);
    }
}
