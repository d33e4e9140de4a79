//! Generic machinery behind every capability contract
//!
//! This library provides:
//! - Resource: the operations shared by every instance
//! - ResourceCollection: per-API lookup of instances by name
//! - ApiRegistry: the process-wide table of capability contracts
//! - DoCommand helpers for the untyped escape hatch

pub mod collection;
pub mod command;
pub mod error;
pub mod registry;
pub mod resource;

pub use collection::ResourceCollection;
pub use error::{invocation_status, ResourceError, Result};
pub use registry::{ApiRegistration, ApiRegistry};
pub use resource::Resource;
