//! Dispatcher for `lerobot.v1.LeRobotService`

use crate::{proto, LeRobot, RecordingSource};
use resource_api::extra;
use resource_core::command::{self, DO_COMMAND};
use resource_core::{invocation_status, ResourceCollection};
use resource_rpc::{codec, Bytes, CallContext, MethodDescriptor, RpcService, ServiceDescriptor, Status};
use std::sync::Arc;
use tracing::debug;

pub static SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: "lerobot.v1.LeRobotService",
    methods: &[
        MethodDescriptor::new("StartRecording"),
        MethodDescriptor::new("StopRecording"),
        MethodDescriptor::new("RecordEpisode"),
        MethodDescriptor::new("ReplayEpisode"),
        MethodDescriptor::new("StartTeleoperation"),
        MethodDescriptor::new("StopTeleoperation"),
        MethodDescriptor::new("LoadPolicy"),
        MethodDescriptor::new("RunPolicyEpisode"),
        DO_COMMAND,
    ],
};

/// Routes LeRobot calls to the instances of a collection.
///
/// Every method resolves the target by the request's name, converts the
/// wire request, invokes the instance and converts its result back.
pub struct LeRobotServer {
    coll: Arc<ResourceCollection<dyn LeRobot>>,
}

/// Server constructor used by the API registration
pub fn new_rpc_service(coll: Arc<ResourceCollection<dyn LeRobot>>) -> Arc<dyn RpcService> {
    Arc::new(LeRobotServer::new(coll))
}

impl LeRobotServer {
    pub fn new(coll: Arc<ResourceCollection<dyn LeRobot>>) -> Self {
        Self { coll }
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn LeRobot>, Status> {
        self.coll.resource(name).map_err(|e| {
            debug!(name, "LeRobot not found");
            Status::from(e)
        })
    }

    pub async fn start_recording(
        &self,
        ctx: &CallContext,
        req: proto::StartRecordingRequest,
    ) -> Result<proto::StartRecordingResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let session_id = svc
            .start_recording(ctx, &req.dataset_name, extra::from_wire(req.extra))
            .await
            .map_err(invocation_status)?;
        Ok(proto::StartRecordingResponse { session_id })
    }

    pub async fn stop_recording(
        &self,
        ctx: &CallContext,
        req: proto::StopRecordingRequest,
    ) -> Result<proto::StopRecordingResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let duration_s = svc
            .stop_recording(ctx, &req.session_id, extra::from_wire(req.extra))
            .await
            .map_err(invocation_status)?;
        Ok(proto::StopRecordingResponse { duration_s })
    }

    pub async fn record_episode(
        &self,
        ctx: &CallContext,
        req: proto::RecordEpisodeRequest,
    ) -> Result<proto::RecordEpisodeResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let resp = svc
            .record_episode(
                ctx,
                crate::RecordEpisodeRequest {
                    dataset_name: req.dataset_name,
                    episode_index: req.episode_index,
                    source: RecordingSource::from_wire(req.source),
                    warmup_time_s: req.warmup_time_s,
                    episode_time_s: req.episode_time_s,
                    reset_time_s: req.reset_time_s,
                    fps: req.fps,
                    tags: req.tags,
                    extra: extra::from_wire(req.extra),
                },
            )
            .await
            .map_err(invocation_status)?;
        Ok(proto::RecordEpisodeResponse {
            num_frames: resp.num_frames,
            actual_duration_s: resp.actual_duration_s,
            episode_path: resp.episode_path,
        })
    }

    pub async fn replay_episode(
        &self,
        ctx: &CallContext,
        req: proto::ReplayEpisodeRequest,
    ) -> Result<proto::ReplayEpisodeResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let resp = svc
            .replay_episode(
                ctx,
                crate::ReplayEpisodeRequest {
                    dataset_name: req.dataset_name,
                    episode_index: req.episode_index,
                    fps: req.fps,
                    extra: extra::from_wire(req.extra),
                },
            )
            .await
            .map_err(invocation_status)?;
        Ok(proto::ReplayEpisodeResponse {
            num_frames_replayed: resp.num_frames_replayed,
            duration_s: resp.duration_s,
        })
    }

    pub async fn start_teleoperation(
        &self,
        ctx: &CallContext,
        req: proto::StartTeleoperationRequest,
    ) -> Result<proto::StartTeleoperationResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let session_id = svc
            .start_teleoperation(
                ctx,
                crate::StartTeleoperationRequest {
                    teleop_device_type: req.teleop_device_type,
                    fps: req.fps,
                    display_cameras: req.display_cameras,
                    extra: extra::from_wire(req.extra),
                },
            )
            .await
            .map_err(invocation_status)?;
        Ok(proto::StartTeleoperationResponse { session_id })
    }

    pub async fn stop_teleoperation(
        &self,
        ctx: &CallContext,
        req: proto::StopTeleoperationRequest,
    ) -> Result<proto::StopTeleoperationResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let duration_s = svc
            .stop_teleoperation(ctx, &req.session_id, extra::from_wire(req.extra))
            .await
            .map_err(invocation_status)?;
        Ok(proto::StopTeleoperationResponse { duration_s })
    }

    pub async fn load_policy(
        &self,
        ctx: &CallContext,
        req: proto::LoadPolicyRequest,
    ) -> Result<proto::LoadPolicyResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let resp = svc
            .load_policy(
                ctx,
                crate::LoadPolicyRequest {
                    policy_repo_id: req.policy_repo_id,
                    extra: extra::from_wire(req.extra),
                },
            )
            .await
            .map_err(invocation_status)?;
        Ok(proto::LoadPolicyResponse {
            policy_id: resp.policy_id,
            policy_type: resp.policy_type,
        })
    }

    pub async fn run_policy_episode(
        &self,
        ctx: &CallContext,
        req: proto::RunPolicyEpisodeRequest,
    ) -> Result<proto::RunPolicyEpisodeResponse, Status> {
        let svc = self.resolve(&req.name)?;
        let resp = svc
            .run_policy_episode(
                ctx,
                crate::RunPolicyEpisodeRequest {
                    policy_id: req.policy_id,
                    max_steps: req.max_steps,
                    fps: req.fps,
                    record_to_dataset: req.record_to_dataset,
                    dataset_name: req.dataset_name,
                    episode_index: req.episode_index,
                    extra: extra::from_wire(req.extra),
                },
            )
            .await
            .map_err(invocation_status)?;
        Ok(proto::RunPolicyEpisodeResponse {
            num_steps: resp.num_steps,
            duration_s: resp.duration_s,
            success: resp.success,
            episode_path: resp.episode_path,
        })
    }

    pub async fn do_command(
        &self,
        ctx: &CallContext,
        req: proto::DoCommandRequest,
    ) -> Result<proto::DoCommandResponse, Status> {
        command::do_command_from_server(&self.coll, ctx, req).await
    }
}

#[async_trait::async_trait]
impl RpcService for LeRobotServer {
    fn descriptor(&self) -> &'static ServiceDescriptor {
        &SERVICE
    }

    async fn call(&self, ctx: &CallContext, method: &str, payload: Bytes) -> Result<Bytes, Status> {
        match method {
            "StartRecording" => codec::unary(&payload, |req| self.start_recording(ctx, req)).await,
            "StopRecording" => codec::unary(&payload, |req| self.stop_recording(ctx, req)).await,
            "RecordEpisode" => codec::unary(&payload, |req| self.record_episode(ctx, req)).await,
            "ReplayEpisode" => codec::unary(&payload, |req| self.replay_episode(ctx, req)).await,
            "StartTeleoperation" => {
                codec::unary(&payload, |req| self.start_teleoperation(ctx, req)).await
            }
            "StopTeleoperation" => {
                codec::unary(&payload, |req| self.stop_teleoperation(ctx, req)).await
            }
            "LoadPolicy" => codec::unary(&payload, |req| self.load_policy(ctx, req)).await,
            "RunPolicyEpisode" => {
                codec::unary(&payload, |req| self.run_policy_episode(ctx, req)).await
            }
            "DoCommand" => codec::unary(&payload, |req| self.do_command(ctx, req)).await,
            other => Err(Status::unimplemented(format!(
                "unknown method {} for service {}",
                other, SERVICE.name
            ))),
        }
    }
}
