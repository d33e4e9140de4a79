//! Wire messages of `lerobot.v1.LeRobotService`
//!
//! Every request carries the routing `name`. Absent fields decode to their
//! defaults and an absent `extra` means no extras.

use resource_api::Extra;
use serde::{Deserialize, Serialize};

pub use resource_api::{DoCommandRequest, DoCommandResponse};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRecordingRequest {
    pub name: String,
    pub dataset_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRecordingResponse {
    pub session_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopRecordingRequest {
    pub name: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopRecordingResponse {
    pub duration_s: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordEpisodeRequest {
    pub name: String,
    pub dataset_name: String,
    pub episode_index: i32,
    /// `RecordingSource` as a small integer
    pub source: i32,
    pub warmup_time_s: i32,
    pub episode_time_s: i32,
    pub reset_time_s: i32,
    pub fps: i32,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordEpisodeResponse {
    pub num_frames: i32,
    pub actual_duration_s: f32,
    pub episode_path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayEpisodeRequest {
    pub name: String,
    pub dataset_name: String,
    pub episode_index: i32,
    pub fps: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayEpisodeResponse {
    pub num_frames_replayed: i32,
    pub duration_s: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartTeleoperationRequest {
    pub name: String,
    pub teleop_device_type: String,
    pub fps: i32,
    pub display_cameras: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartTeleoperationResponse {
    pub session_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopTeleoperationRequest {
    pub name: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopTeleoperationResponse {
    pub duration_s: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicyRequest {
    pub name: String,
    pub policy_repo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicyResponse {
    pub policy_id: String,
    pub policy_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicyEpisodeRequest {
    pub name: String,
    pub policy_id: String,
    pub max_steps: i32,
    pub fps: i32,
    pub record_to_dataset: bool,
    pub dataset_name: String,
    pub episode_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicyEpisodeResponse {
    pub num_steps: i32,
    pub duration_s: f32,
    pub success: bool,
    pub episode_path: String,
}
