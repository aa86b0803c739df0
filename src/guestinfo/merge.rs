//! Userdata override merging
//!
//! The override document is merged on top of the generated userdata at the
//! top level only: an override key replaces the generated value wholesale
//! (lists are not concatenated, mappings are not merged recursively), and
//! keys the generated document lacks are appended in override order.

use serde_yaml::{Mapping, Value};
use tracing::debug;

/// Shallow-merge `overlay` onto `base`, last writer wins per top-level key
pub fn shallow_merge(base: Mapping, overlay: Mapping) -> Mapping {
    let mut result = base;

    for (key, value) in overlay {
        if result.contains_key(&key) {
            debug!("Userdata override replaces key {:?}", key);
        }
        // Existing keys keep their position
        result.insert(key, value);
    }

    result
}

/// Interpret a parsed YAML document as a top-level mapping
///
/// An empty document is an empty mapping. Anything else that is not a
/// mapping is rejected.
pub fn as_mapping(value: Value) -> Option<Mapping> {
    match value {
        Value::Mapping(map) => Some(map),
        Value::Null => Some(Mapping::new()),
        _ => None,
    }
}
