//! Client proxy for `lerobot.v1.LeRobotService`

use crate::server::SERVICE;
use crate::{
    proto, LeRobot, LoadPolicyRequest, LoadPolicyResponse, RecordEpisodeRequest,
    RecordEpisodeResponse, ReplayEpisodeRequest, ReplayEpisodeResponse, RunPolicyEpisodeRequest,
    RunPolicyEpisodeResponse, StartTeleoperationRequest,
};
use anyhow::Result;
use async_trait::async_trait;
use resource_api::{extra, Extra, Name};
use resource_core::command;
use resource_core::Resource;
use resource_rpc::{CallContext, ClientConn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, debug_span, Instrument, Span};

/// LeRobotClient implements the LeRobot contract by calling a remote
/// endpoint.
///
/// Its name carries one more remote prefix than the name it was built
/// for; the request names it sends carry one fewer, so each hop peels off
/// exactly the prefix naming the system on the far end.
pub struct LeRobotClient {
    name: Name,
    wire_name: String,
    conn: ClientConn,
    span: Span,
}

/// Client constructor used by the API registration
pub fn new_client_from_conn(conn: ClientConn, remote: &str, name: Name) -> Arc<dyn LeRobot> {
    Arc::new(LeRobotClient::new(conn, remote, name))
}

impl LeRobotClient {
    pub fn new(conn: ClientConn, remote: &str, name: Name) -> Self {
        let name = name.prepend_remote(remote);
        let wire_name = name.pop_remote().short_name();
        let span = debug_span!("lerobot_client", name = %name, remote = conn.addr());
        Self {
            name,
            wire_name,
            conn,
            span,
        }
    }

    /// The name sent in requests over this connection
    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    async fn invoke<Req, Resp>(&self, ctx: &CallContext, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!(method, "Calling {}", self.wire_name);
        let resp = self
            .conn
            .invoke(ctx, SERVICE.name, method, req)
            .instrument(self.span.clone())
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl Resource for LeRobotClient {
    fn name(&self) -> Name {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CallContext, cmd: Extra) -> Result<Extra> {
        command::do_command_from_client(&self.conn, ctx, SERVICE.name, &self.wire_name, cmd)
            .instrument(self.span.clone())
            .await
    }

    /// The connection belongs to whoever dialed it
    async fn close(&self, _ctx: &CallContext) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LeRobot for LeRobotClient {
    async fn start_recording(
        &self,
        ctx: &CallContext,
        dataset_name: &str,
        extra: Extra,
    ) -> Result<String> {
        let req = proto::StartRecordingRequest {
            name: self.wire_name.clone(),
            dataset_name: dataset_name.to_string(),
            extra: extra::to_wire(extra),
        };
        let resp: proto::StartRecordingResponse = self.invoke(ctx, "StartRecording", &req).await?;
        Ok(resp.session_id)
    }

    async fn stop_recording(&self, ctx: &CallContext, session_id: &str, extra: Extra) -> Result<f32> {
        let req = proto::StopRecordingRequest {
            name: self.wire_name.clone(),
            session_id: session_id.to_string(),
            extra: extra::to_wire(extra),
        };
        let resp: proto::StopRecordingResponse = self.invoke(ctx, "StopRecording", &req).await?;
        Ok(resp.duration_s)
    }

    async fn record_episode(
        &self,
        ctx: &CallContext,
        req: RecordEpisodeRequest,
    ) -> Result<RecordEpisodeResponse> {
        let req = proto::RecordEpisodeRequest {
            name: self.wire_name.clone(),
            dataset_name: req.dataset_name,
            episode_index: req.episode_index,
            source: req.source.to_wire(),
            warmup_time_s: req.warmup_time_s,
            episode_time_s: req.episode_time_s,
            reset_time_s: req.reset_time_s,
            fps: req.fps,
            tags: req.tags,
            extra: extra::to_wire(req.extra),
        };
        let resp: proto::RecordEpisodeResponse = self.invoke(ctx, "RecordEpisode", &req).await?;
        Ok(RecordEpisodeResponse {
            num_frames: resp.num_frames,
            actual_duration_s: resp.actual_duration_s,
            episode_path: resp.episode_path,
        })
    }

    async fn replay_episode(
        &self,
        ctx: &CallContext,
        req: ReplayEpisodeRequest,
    ) -> Result<ReplayEpisodeResponse> {
        let req = proto::ReplayEpisodeRequest {
            name: self.wire_name.clone(),
            dataset_name: req.dataset_name,
            episode_index: req.episode_index,
            fps: req.fps,
            extra: extra::to_wire(req.extra),
        };
        let resp: proto::ReplayEpisodeResponse = self.invoke(ctx, "ReplayEpisode", &req).await?;
        Ok(ReplayEpisodeResponse {
            num_frames_replayed: resp.num_frames_replayed,
            duration_s: resp.duration_s,
        })
    }

    async fn start_teleoperation(
        &self,
        ctx: &CallContext,
        req: StartTeleoperationRequest,
    ) -> Result<String> {
        let req = proto::StartTeleoperationRequest {
            name: self.wire_name.clone(),
            teleop_device_type: req.teleop_device_type,
            fps: req.fps,
            display_cameras: req.display_cameras,
            extra: extra::to_wire(req.extra),
        };
        let resp: proto::StartTeleoperationResponse =
            self.invoke(ctx, "StartTeleoperation", &req).await?;
        Ok(resp.session_id)
    }

    async fn stop_teleoperation(
        &self,
        ctx: &CallContext,
        session_id: &str,
        extra: Extra,
    ) -> Result<f32> {
        let req = proto::StopTeleoperationRequest {
            name: self.wire_name.clone(),
            session_id: session_id.to_string(),
            extra: extra::to_wire(extra),
        };
        let resp: proto::StopTeleoperationResponse =
            self.invoke(ctx, "StopTeleoperation", &req).await?;
        Ok(resp.duration_s)
    }

    async fn load_policy(&self, ctx: &CallContext, req: LoadPolicyRequest) -> Result<LoadPolicyResponse> {
        let req = proto::LoadPolicyRequest {
            name: self.wire_name.clone(),
            policy_repo_id: req.policy_repo_id,
            extra: extra::to_wire(req.extra),
        };
        let resp: proto::LoadPolicyResponse = self.invoke(ctx, "LoadPolicy", &req).await?;
        Ok(LoadPolicyResponse {
            policy_id: resp.policy_id,
            policy_type: resp.policy_type,
        })
    }

    async fn run_policy_episode(
        &self,
        ctx: &CallContext,
        req: RunPolicyEpisodeRequest,
    ) -> Result<RunPolicyEpisodeResponse> {
        let req = proto::RunPolicyEpisodeRequest {
            name: self.wire_name.clone(),
            policy_id: req.policy_id,
            max_steps: req.max_steps,
            fps: req.fps,
            record_to_dataset: req.record_to_dataset,
            dataset_name: req.dataset_name,
            episode_index: req.episode_index,
            extra: extra::to_wire(req.extra),
        };
        let resp: proto::RunPolicyEpisodeResponse =
            self.invoke(ctx, "RunPolicyEpisode", &req).await?;
        Ok(RunPolicyEpisodeResponse {
            num_steps: resp.num_steps,
            duration_s: resp.duration_s,
            success: resp.success,
            episode_path: resp.episode_path,
        })
    }
}
