//! Jinja2-compatible template rendering
//!
//! Metadata and userdata are rendered from two template assets shipped in
//! `templates/`. They are compiled in, and a directory holding files of the
//! same names can override either one.
//!
//! Rendering is strict: a template referring to a variable the context does
//! not provide fails instead of printing an empty string.

pub mod context;

pub use context::{MetadataContext, UserdataContext};

use crate::InstanceError;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

pub const METADATA_TEMPLATE: &str = "metadata.yaml.j2";
pub const USERDATA_TEMPLATE: &str = "userdata.yaml.j2";

const BUILTIN_METADATA: &str = include_str!("../../templates/metadata.yaml.j2");
const BUILTIN_USERDATA: &str = include_str!("../../templates/userdata.yaml.j2");

/// Quote a string as a YAML double-quoted scalar
fn quote(value: String) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("quote", quote);
    env
}

/// Renders the metadata and userdata templates
pub struct TemplateRenderer {
    env: Environment<'static>,
    /// Compile errors of built-in templates, reported when they are rendered
    compile_errors: BTreeMap<&'static str, String>,
}

impl TemplateRenderer {
    /// Create a renderer using the built-in templates
    pub fn new() -> Self {
        Self::with_builtins(BUILTIN_METADATA, BUILTIN_USERDATA)
    }

    fn with_builtins(metadata: &'static str, userdata: &'static str) -> Self {
        let mut env = environment();
        let mut compile_errors = BTreeMap::new();
        for (name, source) in [(METADATA_TEMPLATE, metadata), (USERDATA_TEMPLATE, userdata)] {
            if let Err(e) = env.add_template(name, source) {
                warn!("Built-in template {} does not compile: {}", name, e);
                compile_errors.insert(name, e.to_string());
            }
        }
        Self {
            env,
            compile_errors,
        }
    }

    /// Create a renderer from template sources
    pub fn from_sources(metadata: &str, userdata: &str) -> Result<Self, InstanceError> {
        let mut env = environment();
        env.add_template_owned(METADATA_TEMPLATE, metadata.to_string())?;
        env.add_template_owned(USERDATA_TEMPLATE, userdata.to_string())?;
        Ok(Self {
            env,
            compile_errors: BTreeMap::new(),
        })
    }

    /// Create a renderer that prefers templates found in `dir`
    ///
    /// Templates missing from the directory fall back to the built-in ones.
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<Self, InstanceError> {
        let dir = dir.as_ref();
        let metadata = read_override(dir, METADATA_TEMPLATE).await?;
        let userdata = read_override(dir, USERDATA_TEMPLATE).await?;

        Self::from_sources(
            metadata.as_deref().unwrap_or(BUILTIN_METADATA),
            userdata.as_deref().unwrap_or(BUILTIN_USERDATA),
        )
    }

    /// Render a named template with a typed context
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String, InstanceError> {
        debug!("Rendering template {}", name);
        if let Some(error) = self.compile_errors.get(name) {
            return Err(InstanceError::TemplateRender(format!(
                "built-in template {} does not compile: {}",
                name, error
            )));
        }
        let tmpl = self.env.get_template(name)?;
        Ok(tmpl.render(context)?)
    }

    /// Render the metadata template
    pub fn render_metadata(&self, context: &MetadataContext) -> Result<String, InstanceError> {
        self.render(METADATA_TEMPLATE, context)
    }

    /// Render the userdata template
    pub fn render_userdata(&self, context: &UserdataContext) -> Result<String, InstanceError> {
        self.render(USERDATA_TEMPLATE, context)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_override(dir: &Path, name: &str) -> Result<Option<String>, InstanceError> {
    let path = dir.join(name);
    if fs::metadata(&path).await.is_err() {
        return Ok(None);
    }
    debug!("Using template override {}", path.display());
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| InstanceError::missing_file(&path, e))?;
    Ok(Some(content))
}
