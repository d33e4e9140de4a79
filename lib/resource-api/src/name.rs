//! Resource names used as routing keys

use crate::{ApiId, ParseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const REMOTE_SEP: char = ':';
const API_SEP: char = '/';

/// Name identifies one instance of a capability contract.
///
/// Remote prefixes are kept in traversal order: `a:b:arm` is the `arm`
/// instance on system `b`, reached through system `a`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name {
    api: ApiId,
    remote: Vec<String>,
    name: String,
}

impl Name {
    /// Create a name from an API and a short name.
    ///
    /// A short name of the form `a:b:arm` is split into its remote prefixes.
    pub fn new(api: ApiId, short_name: &str) -> Self {
        let mut parts: Vec<String> = short_name.split(REMOTE_SEP).map(str::to_string).collect();
        // split always yields at least one element
        let name = parts.pop().unwrap_or_default();
        Self {
            api,
            remote: parts,
            name,
        }
    }

    /// Parse a short name within an API, rejecting empty segments
    pub fn parse_short(api: ApiId, short_name: &str) -> Result<Self> {
        let name = Self::new(api, short_name);
        name.validate()?;
        Ok(name)
    }

    pub fn api(&self) -> &ApiId {
        &self.api
    }

    /// The unqualified instance name on the system that owns it
    pub fn local_name(&self) -> &str {
        &self.name
    }

    /// Remote prefixes in traversal order
    pub fn remote_path(&self) -> &[String] {
        &self.remote
    }

    pub fn is_remote(&self) -> bool {
        !self.remote.is_empty()
    }

    /// Qualify this name with one more hop in front.
    ///
    /// An empty remote name leaves the name unchanged.
    pub fn prepend_remote(&self, remote: &str) -> Self {
        if remote.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        next.remote.insert(0, remote.to_string());
        next
    }

    /// Strip the outermost hop, the one consumed by crossing a connection
    pub fn pop_remote(&self) -> Self {
        let mut next = self.clone();
        if !next.remote.is_empty() {
            next.remote.remove(0);
        }
        next
    }

    /// The `remote:...:name` form carried on the wire
    pub fn short_name(&self) -> String {
        if self.remote.is_empty() {
            return self.name.clone();
        }
        let mut out = self.remote.join(":");
        out.push(REMOTE_SEP);
        out.push_str(&self.name);
        out
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.remote.iter().any(String::is_empty) {
            return Err(ParseError::InvalidName(self.to_string()));
        }
        if self.name.contains(API_SEP) {
            return Err(ParseError::InvalidName(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.api, API_SEP, self.short_name())
    }
}

impl FromStr for Name {
    type Err = ParseError;

    /// Parse the fully-qualified form `namespace:type:subtype/remote:name`
    fn from_str(s: &str) -> Result<Self> {
        let (api, short) = s
            .split_once(API_SEP)
            .ok_or_else(|| ParseError::InvalidName(s.to_string()))?;
        Self::parse_short(api.parse()?, short)
    }
}

impl TryFrom<String> for Name {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.to_string()
    }
}
