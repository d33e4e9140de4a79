//! LeRobot service: robot learning and teleoperation
//!
//! This library provides:
//! - LeRobot: the capability contract (recording, replay, teleoperation,
//!   policy execution)
//! - LeRobotServer: the dispatcher mounted on the shared endpoint
//! - LeRobotClient: the proxy that implements the contract over a connection
//! - FakeLeRobot: an in-memory model for local testing
//! - InjectedLeRobot: a double with per-operation overrides (`inject` feature)

pub mod client;
pub mod fake;
#[cfg(any(test, feature = "inject"))]
pub mod inject;
pub mod proto;
pub mod server;

pub use client::LeRobotClient;
pub use fake::FakeLeRobot;
pub use server::LeRobotServer;

use async_trait::async_trait;
use resource_api::{ApiId, Extra, Name};
use resource_core::{ApiRegistration, ApiRegistry, Resource};
use resource_rpc::CallContext;

/// Subtype of the LeRobot API, `rdk:service:lerobot`
pub const SUBTYPE_NAME: &str = "lerobot";

pub fn api() -> ApiId {
    ApiId::service(SUBTYPE_NAME)
}

/// The LeRobot name for a short name such as `lerobot1` or `remote:lerobot1`
pub fn named(name: &str) -> Name {
    Name::new(api(), name)
}

/// Where the frames of a recorded episode come from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecordingSource {
    #[default]
    Unspecified,
    Teleoperation,
    Policy,
}

impl RecordingSource {
    /// Unknown values decode to `Unspecified`
    pub fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::Teleoperation,
            2 => Self::Policy,
            _ => Self::Unspecified,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::Teleoperation => 1,
            Self::Policy => 2,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordEpisodeRequest {
    pub dataset_name: String,
    pub episode_index: i32,
    pub source: RecordingSource,
    pub warmup_time_s: i32,
    pub episode_time_s: i32,
    pub reset_time_s: i32,
    pub fps: i32,
    pub tags: Vec<String>,
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordEpisodeResponse {
    pub num_frames: i32,
    pub actual_duration_s: f32,
    pub episode_path: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplayEpisodeRequest {
    pub dataset_name: String,
    pub episode_index: i32,
    pub fps: i32,
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplayEpisodeResponse {
    pub num_frames_replayed: i32,
    pub duration_s: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartTeleoperationRequest {
    pub teleop_device_type: String,
    pub fps: i32,
    pub display_cameras: bool,
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadPolicyRequest {
    /// HuggingFace repo id or local path
    pub policy_repo_id: String,
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadPolicyResponse {
    pub policy_id: String,
    pub policy_type: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunPolicyEpisodeRequest {
    pub policy_id: String,
    pub max_steps: i32,
    pub fps: i32,
    pub record_to_dataset: bool,
    pub dataset_name: String,
    pub episode_index: i32,
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunPolicyEpisodeResponse {
    pub num_steps: i32,
    pub duration_s: f32,
    pub success: bool,
    pub episode_path: String,
}

/// LeRobot is the capability contract for robot learning and
/// teleoperation.
///
/// Long-running activities are Start/Stop pairs keyed by a session id.
#[async_trait]
pub trait LeRobot: Resource {
    /// Begin recording into `dataset_name`; returns the session id
    async fn start_recording(
        &self,
        ctx: &CallContext,
        dataset_name: &str,
        extra: Extra,
    ) -> anyhow::Result<String>;

    /// End a recording session; returns its duration in seconds
    async fn stop_recording(
        &self,
        ctx: &CallContext,
        session_id: &str,
        extra: Extra,
    ) -> anyhow::Result<f32>;

    async fn record_episode(
        &self,
        ctx: &CallContext,
        req: RecordEpisodeRequest,
    ) -> anyhow::Result<RecordEpisodeResponse>;

    /// Play back a previously recorded episode
    async fn replay_episode(
        &self,
        ctx: &CallContext,
        req: ReplayEpisodeRequest,
    ) -> anyhow::Result<ReplayEpisodeResponse>;

    /// Begin teleoperation; returns the session id
    async fn start_teleoperation(
        &self,
        ctx: &CallContext,
        req: StartTeleoperationRequest,
    ) -> anyhow::Result<String>;

    /// End a teleoperation session; returns its duration in seconds
    async fn stop_teleoperation(
        &self,
        ctx: &CallContext,
        session_id: &str,
        extra: Extra,
    ) -> anyhow::Result<f32>;

    async fn load_policy(
        &self,
        ctx: &CallContext,
        req: LoadPolicyRequest,
    ) -> anyhow::Result<LoadPolicyResponse>;

    /// Execute a loaded policy for one episode
    async fn run_policy_episode(
        &self,
        ctx: &CallContext,
        req: RunPolicyEpisodeRequest,
    ) -> anyhow::Result<RunPolicyEpisodeResponse>;
}

/// The registration record for the LeRobot API
pub fn registration() -> ApiRegistration<dyn LeRobot> {
    ApiRegistration {
        descriptor: &server::SERVICE,
        server: server::new_rpc_service,
        client: client::new_client_from_conn,
    }
}

/// Register the LeRobot API; fails if it is already registered
pub fn register(registry: &ApiRegistry) -> resource_core::Result<()> {
    registry.register(api(), registration())
}
