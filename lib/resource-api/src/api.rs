//! API identifiers for capability contracts

use crate::{ParseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace used by the built-in services and components
pub const NAMESPACE_RDK: &str = "rdk";

const TYPE_SERVICE: &str = "service";
const TYPE_COMPONENT: &str = "component";

/// ApiId names a capability contract independently of any instance.
///
/// The text form is `namespace:type:subtype`, e.g. `rdk:service:lerobot`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiId {
    namespace: String,
    type_name: String,
    subtype: String,
}

impl ApiId {
    /// Create an API identifier from its three parts
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        subtype: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            subtype: subtype.into(),
        }
    }

    /// A service API in the `rdk` namespace
    pub fn service(subtype: impl Into<String>) -> Self {
        Self::new(NAMESPACE_RDK, TYPE_SERVICE, subtype)
    }

    /// A component API in the `rdk` namespace
    pub fn component(subtype: impl Into<String>) -> Self {
        Self::new(NAMESPACE_RDK, TYPE_COMPONENT, subtype)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn is_service(&self) -> bool {
        self.type_name == TYPE_SERVICE
    }

    pub fn is_component(&self) -> bool {
        self.type_name == TYPE_COMPONENT
    }

    fn valid_part(part: &str) -> bool {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.type_name, self.subtype)
    }
}

impl FromStr for ApiId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [namespace, type_name, subtype]
                if [namespace, type_name, subtype].iter().all(|p| Self::valid_part(p)) =>
            {
                Ok(Self::new(*namespace, *type_name, *subtype))
            }
            _ => Err(ParseError::InvalidApi(s.to_string())),
        }
    }
}

impl TryFrom<String> for ApiId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ApiId> for String {
    fn from(api: ApiId) -> Self {
        api.to_string()
    }
}
