//! In-memory LeRobot model
//!
//! Sessions are tracked by id and report wall-clock durations. Episodes
//! are not captured; frame counts are derived from fps and episode length.

use crate::{
    named, LeRobot, LoadPolicyRequest, LoadPolicyResponse, RecordEpisodeRequest,
    RecordEpisodeResponse, ReplayEpisodeRequest, ReplayEpisodeResponse, RunPolicyEpisodeRequest,
    RunPolicyEpisodeResponse, StartTeleoperationRequest,
};
use anyhow::{anyhow, bail, ensure, Result};
use async_trait::async_trait;
use resource_api::extra::Value;
use resource_api::{Extra, Name};
use resource_core::Resource;
use resource_rpc::CallContext;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_FPS: i32 = 30;
const DEFAULT_MAX_STEPS: i32 = 300;
const DEFAULT_DATASET_ROOT: &str = "/tmp/lerobot/datasets";
const DEFAULT_POLICY_TYPE: &str = "act";

struct Session {
    target: String,
    started: Instant,
}

#[derive(Default)]
struct State {
    recordings: HashMap<String, Session>,
    teleoperations: HashMap<String, Session>,
    /// policy id -> policy type
    policies: HashMap<String, String>,
    /// (dataset, episode index) -> (frames, fps)
    episodes: HashMap<(String, i32), (i32, i32)>,
}

/// FakeLeRobot answers every operation from memory
pub struct FakeLeRobot {
    name: Name,
    dataset_root: String,
    policy_type: String,
    state: Mutex<State>,
}

impl FakeLeRobot {
    /// Build from configuration attributes. Recognized keys are
    /// `dataset_root` and `policy_type`.
    pub fn new(name: &str, attributes: &Extra) -> Self {
        let attr = |key: &str, default: &str| {
            attributes
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };
        Self {
            name: named(name),
            dataset_root: attr("dataset_root", DEFAULT_DATASET_ROOT),
            policy_type: attr("policy_type", DEFAULT_POLICY_TYPE),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn episode_path(&self, dataset: &str, index: i32) -> String {
        format!("{}/{}/episode_{:06}", self.dataset_root, dataset, index)
    }

    fn live(ctx: &CallContext) -> Result<()> {
        match ctx.err() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn fps_or_default(fps: i32) -> i32 {
    if fps > 0 {
        fps
    } else {
        DEFAULT_FPS
    }
}

#[async_trait]
impl Resource for FakeLeRobot {
    fn name(&self) -> Name {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CallContext, cmd: Extra) -> Result<Extra> {
        Self::live(ctx)?;
        match cmd.get("command").and_then(Value::as_str) {
            Some("status") => {
                let state = self.state();
                let mut result = Extra::new();
                result.insert("active_recordings".into(), state.recordings.len().into());
                result.insert(
                    "active_teleoperations".into(),
                    state.teleoperations.len().into(),
                );
                result.insert("loaded_policies".into(), state.policies.len().into());
                result.insert("recorded_episodes".into(), state.episodes.len().into());
                Ok(result)
            }
            Some(other) => bail!("unsupported command {:?}", other),
            None => bail!("missing \"command\" key"),
        }
    }

    async fn close(&self, _ctx: &CallContext) -> Result<()> {
        let mut state = self.state();
        if !state.recordings.is_empty() || !state.teleoperations.is_empty() {
            info!(
                name = %self.name,
                recordings = state.recordings.len(),
                teleoperations = state.teleoperations.len(),
                "Dropping open sessions on close"
            );
        }
        state.recordings.clear();
        state.teleoperations.clear();
        Ok(())
    }
}

#[async_trait]
impl LeRobot for FakeLeRobot {
    async fn start_recording(
        &self,
        ctx: &CallContext,
        dataset_name: &str,
        _extra: Extra,
    ) -> Result<String> {
        Self::live(ctx)?;
        ensure!(!dataset_name.is_empty(), "dataset name is required");

        let session_id = Uuid::new_v4().to_string();
        self.state().recordings.insert(
            session_id.clone(),
            Session {
                target: dataset_name.to_string(),
                started: Instant::now(),
            },
        );
        info!(name = %self.name, session_id = %session_id, dataset = dataset_name, "Recording started");
        Ok(session_id)
    }

    async fn stop_recording(&self, ctx: &CallContext, session_id: &str, _extra: Extra) -> Result<f32> {
        Self::live(ctx)?;
        let session = self
            .state()
            .recordings
            .remove(session_id)
            .ok_or_else(|| anyhow!("unknown recording session {:?}", session_id))?;
        let duration = session.started.elapsed().as_secs_f32();
        info!(name = %self.name, session_id, dataset = %session.target, duration, "Recording stopped");
        Ok(duration)
    }

    async fn record_episode(
        &self,
        ctx: &CallContext,
        req: RecordEpisodeRequest,
    ) -> Result<RecordEpisodeResponse> {
        Self::live(ctx)?;
        ensure!(!req.dataset_name.is_empty(), "dataset name is required");
        ensure!(req.episode_time_s >= 0, "episode time must not be negative");

        let fps = fps_or_default(req.fps);
        let num_frames = fps.checked_mul(req.episode_time_s).ok_or_else(|| {
            anyhow!("episode too long: {} s at {} fps", req.episode_time_s, fps)
        })?;
        self.state()
            .episodes
            .insert((req.dataset_name.clone(), req.episode_index), (num_frames, fps));

        debug!(
            name = %self.name,
            dataset = %req.dataset_name,
            episode = req.episode_index,
            source = ?req.source,
            num_frames,
            "Episode recorded"
        );
        Ok(RecordEpisodeResponse {
            num_frames,
            actual_duration_s: req.episode_time_s as f32,
            episode_path: self.episode_path(&req.dataset_name, req.episode_index),
        })
    }

    async fn replay_episode(
        &self,
        ctx: &CallContext,
        req: ReplayEpisodeRequest,
    ) -> Result<ReplayEpisodeResponse> {
        Self::live(ctx)?;
        let (frames, recorded_fps) = self
            .state()
            .episodes
            .get(&(req.dataset_name.clone(), req.episode_index))
            .copied()
            .ok_or_else(|| {
                anyhow!(
                    "episode {} of dataset {:?} not found",
                    req.episode_index,
                    req.dataset_name
                )
            })?;
        let fps = if req.fps > 0 { req.fps } else { recorded_fps };
        Ok(ReplayEpisodeResponse {
            num_frames_replayed: frames,
            duration_s: frames as f32 / fps as f32,
        })
    }

    async fn start_teleoperation(
        &self,
        ctx: &CallContext,
        req: StartTeleoperationRequest,
    ) -> Result<String> {
        Self::live(ctx)?;
        ensure!(
            !req.teleop_device_type.is_empty(),
            "teleoperation device type is required"
        );

        let session_id = Uuid::new_v4().to_string();
        self.state().teleoperations.insert(
            session_id.clone(),
            Session {
                target: req.teleop_device_type.clone(),
                started: Instant::now(),
            },
        );
        info!(
            name = %self.name,
            session_id = %session_id,
            device = %req.teleop_device_type,
            fps = fps_or_default(req.fps),
            "Teleoperation started"
        );
        Ok(session_id)
    }

    async fn stop_teleoperation(
        &self,
        ctx: &CallContext,
        session_id: &str,
        _extra: Extra,
    ) -> Result<f32> {
        Self::live(ctx)?;
        let session = self
            .state()
            .teleoperations
            .remove(session_id)
            .ok_or_else(|| anyhow!("unknown teleoperation session {:?}", session_id))?;
        let duration = session.started.elapsed().as_secs_f32();
        info!(name = %self.name, session_id, device = %session.target, duration, "Teleoperation stopped");
        Ok(duration)
    }

    async fn load_policy(&self, ctx: &CallContext, req: LoadPolicyRequest) -> Result<LoadPolicyResponse> {
        Self::live(ctx)?;
        ensure!(!req.policy_repo_id.is_empty(), "policy repo id is required");

        let policy_type = req
            .extra
            .get("policy_type")
            .and_then(Value::as_str)
            .unwrap_or(&self.policy_type)
            .to_string();
        let policy_id = Uuid::new_v4().to_string();
        self.state()
            .policies
            .insert(policy_id.clone(), policy_type.clone());

        info!(name = %self.name, policy_id = %policy_id, repo = %req.policy_repo_id, policy_type = %policy_type, "Policy loaded");
        Ok(LoadPolicyResponse {
            policy_id,
            policy_type,
        })
    }

    async fn run_policy_episode(
        &self,
        ctx: &CallContext,
        req: RunPolicyEpisodeRequest,
    ) -> Result<RunPolicyEpisodeResponse> {
        Self::live(ctx)?;
        if !self.state().policies.contains_key(&req.policy_id) {
            bail!("policy {:?} is not loaded", req.policy_id);
        }
        if req.record_to_dataset {
            ensure!(
                !req.dataset_name.is_empty(),
                "dataset name is required when recording"
            );
        }

        let fps = fps_or_default(req.fps);
        let num_steps = if req.max_steps > 0 {
            req.max_steps
        } else {
            DEFAULT_MAX_STEPS
        };

        let episode_path = if req.record_to_dataset {
            self.state()
                .episodes
                .insert((req.dataset_name.clone(), req.episode_index), (num_steps, fps));
            self.episode_path(&req.dataset_name, req.episode_index)
        } else {
            String::new()
        };

        Ok(RunPolicyEpisodeResponse {
            num_steps,
            duration_s: num_steps as f32 / fps as f32,
            success: true,
            episode_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fake() -> FakeLeRobot {
        FakeLeRobot::new("lerobot1", &Extra::new())
    }

    #[tokio::test]
    async fn test_recording_session() {
        let robot = fake();
        let ctx = CallContext::background();

        let session_id = robot.start_recording(&ctx, "pick-place", Extra::new()).await.unwrap();
        assert!(Uuid::parse_str(&session_id).is_ok());

        let duration = robot.stop_recording(&ctx, &session_id, Extra::new()).await.unwrap();
        assert!(duration >= 0.0);

        // a session can only be stopped once
        assert!(robot.stop_recording(&ctx, &session_id, Extra::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_teleoperation_sessions_are_separate() {
        let robot = fake();
        let ctx = CallContext::background();

        let recording = robot.start_recording(&ctx, "d", Extra::new()).await.unwrap();
        let teleop = robot
            .start_teleoperation(
                &ctx,
                StartTeleoperationRequest {
                    teleop_device_type: "so100_leader".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_ne!(recording, teleop);

        assert!(robot.stop_teleoperation(&ctx, &recording, Extra::new()).await.is_err());
        robot.stop_teleoperation(&ctx, &teleop, Extra::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_episode_frame_overflow_is_error() {
        let robot = FakeLeRobot::new("lerobot1", &Extra::new());
        let ctx = CallContext::background();

        let err = robot
            .record_episode(
                &ctx,
                RecordEpisodeRequest {
                    dataset_name: "d".to_string(),
                    fps: 100_000,
                    episode_time_s: 100_000,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("episode too long"));
        // nothing was stored for the rejected episode
        assert!(robot
            .replay_episode(
                &ctx,
                ReplayEpisodeRequest {
                    dataset_name: "d".to_string(),
                    ..Default::default()
                },
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_record_then_replay() {
        let robot = FakeLeRobot::new(
            "lerobot1",
            json!({"dataset_root": "/data"}).as_object().unwrap(),
        );
        let ctx = CallContext::background();

        let recorded = robot
            .record_episode(
                &ctx,
                RecordEpisodeRequest {
                    dataset_name: "pick-place".to_string(),
                    episode_index: 3,
                    episode_time_s: 10,
                    fps: 30,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(recorded.num_frames, 300);
        assert_eq!(recorded.actual_duration_s, 10.0);
        assert_eq!(recorded.episode_path, "/data/pick-place/episode_000003");

        let replayed = robot
            .replay_episode(
                &ctx,
                ReplayEpisodeRequest {
                    dataset_name: "pick-place".to_string(),
                    episode_index: 3,
                    fps: 60,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(replayed.num_frames_replayed, 300);
        assert_eq!(replayed.duration_s, 5.0);

        let missing = robot
            .replay_episode(
                &ctx,
                ReplayEpisodeRequest {
                    dataset_name: "pick-place".to_string(),
                    episode_index: 4,
                    ..Default::default()
                },
            )
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_policy_episode() {
        let robot = fake();
        let ctx = CallContext::background();

        let unknown = robot
            .run_policy_episode(
                &ctx,
                RunPolicyEpisodeRequest {
                    policy_id: "nope".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(unknown.is_err());

        let policy = robot
            .load_policy(
                &ctx,
                LoadPolicyRequest {
                    policy_repo_id: "lerobot/act_so100_test".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(policy.policy_type, "act");

        let resp = robot
            .run_policy_episode(
                &ctx,
                RunPolicyEpisodeRequest {
                    policy_id: policy.policy_id,
                    max_steps: 200,
                    fps: 10,
                    record_to_dataset: true,
                    dataset_name: "eval".to_string(),
                    episode_index: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.num_steps, 200);
        assert_eq!(resp.duration_s, 20.0);
        assert!(resp.success);
        assert_eq!(resp.episode_path, "/tmp/lerobot/datasets/eval/episode_000000");
    }

    #[tokio::test]
    async fn test_status_command() {
        let robot = fake();
        let ctx = CallContext::background();
        robot.start_recording(&ctx, "d", Extra::new()).await.unwrap();

        let status = robot
            .do_command(&ctx, json!({"command": "status"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(status.get("active_recordings"), Some(&json!(1)));
        assert_eq!(status.get("loaded_policies"), Some(&json!(0)));

        let err = robot
            .do_command(&ctx, json!({"command": "dance"}).as_object().cloned().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dance"));
    }

    #[tokio::test]
    async fn test_close_drops_sessions() {
        let robot = fake();
        let ctx = CallContext::background();
        let session_id = robot.start_recording(&ctx, "d", Extra::new()).await.unwrap();

        robot.close(&ctx).await.unwrap();
        robot.close(&ctx).await.unwrap();
        assert!(robot.stop_recording(&ctx, &session_id, Extra::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_canceled_context_is_refused() {
        let robot = fake();
        let ctx = CallContext::background();
        ctx.cancel();
        assert!(robot.start_recording(&ctx, "d", Extra::new()).await.is_err());
    }
}
