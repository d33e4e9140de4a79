//! Wire messages shared by every service

use crate::Extra;
use serde::{Deserialize, Serialize};

/// Request for the open-ended command escape hatch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoCommandRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Extra>,
}

/// Whatever map the target instance produced
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoCommandResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Extra>,
}
