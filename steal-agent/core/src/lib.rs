#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod namespace;
pub mod patch;
pub mod steal;

pub use self::namespace::NamespacePolicy;
pub use json_patch::Patch;
pub use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
