//! vsphere-instance-rs library
//!
//! Builds single-VM provisioning requests for a vSphere-style provider:
//! instance arguments are normalized, platform objects are looked up by
//! name, cloud-init metadata and userdata are rendered and base64-encoded
//! into `guestinfo.*` extra config, and one create call is issued.
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **Fail Early**: Local files are checked before the provider is called
//! - **Deterministic**: Same arguments always render the same documents
//! - **Provider Agnostic**: The platform API sits behind the `Provider` trait

pub mod config;
pub mod guestinfo;
pub mod instance;
pub mod network;
pub mod provider;
pub mod template;

mod error;

pub use config::{DiskArgs, InstanceArgs, InstanceConfig, NetworkArgs, Normalizer};
pub use error::InstanceError;
pub use guestinfo::{GuestConfig, GuestDocuments};
pub use instance::{Instance, InstancePlan, plan_instance};
pub use provider::{CreateVmRequest, ObjectKind, PlatformObject, Provider};
pub use template::TemplateRenderer;
