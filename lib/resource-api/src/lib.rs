//! Naming and payload types shared by every capability contract
//!
//! This library defines:
//! - ApiId: the identifier of a capability contract (`rdk:service:lerobot`)
//! - Name: the routing key of one instance, including federation hops
//! - Extra: the open-ended key/value payload carried alongside calls
//! - DoCommand wire messages shared by all services

pub mod api;
pub mod common;
pub mod error;
pub mod extra;
pub mod name;

pub use api::{ApiId, NAMESPACE_RDK};
pub use common::{DoCommandRequest, DoCommandResponse};
pub use error::{ParseError, Result};
pub use extra::Extra;
pub use name::Name;
