//! SSH public key resolution
//!
//! Each configured entry is either a path to a public key file or the key
//! itself. Paths win when they exist; entries that look like a key are used
//! literally; anything else is a key file that could not be read.

use crate::InstanceError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Prefixes of OpenSSH public key algorithm names
const KEY_PREFIXES: &[&str] = &["ssh-", "ecdsa-sha2-", "sk-ssh-", "sk-ecdsa-"];

/// Expand a leading `~` to the given home directory
pub fn expand_home(entry: &str, home: Option<&Path>) -> PathBuf {
    match (entry, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (_, Some(home)) if entry.starts_with("~/") => home.join(&entry[2..]),
        _ => PathBuf::from(entry),
    }
}

/// Whether an entry is an inline public key rather than a path
pub fn is_key_shaped(entry: &str) -> bool {
    entry
        .split_whitespace()
        .next()
        .is_some_and(|algo| KEY_PREFIXES.iter().any(|p| algo.starts_with(p)))
}

/// Resolve one entry into the keys it provides
///
/// A key file contributes every non-blank, non-comment line.
pub async fn resolve_ssh_key(entry: &str, home: Option<&Path>) -> Result<Vec<String>, InstanceError> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Err(InstanceError::Config("empty ssh key entry".to_string()));
    }

    let path = expand_home(entry, home);
    match fs::metadata(&path).await {
        Ok(_) => {
            debug!("Reading ssh key file {}", path.display());
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| InstanceError::missing_file(&path, e))?;

            let keys: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect();

            if keys.is_empty() {
                return Err(InstanceError::Config(format!(
                    "ssh key file {} contains no keys",
                    path.display()
                )));
            }
            Ok(keys)
        }
        Err(_) if is_key_shaped(entry) => {
            debug!("Using inline ssh key");
            Ok(vec![entry.to_string()])
        }
        Err(e) => Err(InstanceError::missing_file(path, e)),
    }
}

/// Resolve all entries, preserving order
pub async fn resolve_ssh_keys(
    entries: &[String],
    home: Option<&Path>,
) -> Result<Vec<String>, InstanceError> {
    let mut keys = Vec::with_capacity(entries.len());
    for entry in entries {
        keys.extend(resolve_ssh_key(entry, home).await?);
    }
    Ok(keys)
}
