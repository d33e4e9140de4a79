//! LeRobot double with per-operation overrides
//!
//! Each operation runs its override when one is set. Without one it
//! succeeds with the zero value: an empty session id, a zero duration, a
//! default response, an empty command result.

use crate::{
    named, LeRobot, LoadPolicyRequest, LoadPolicyResponse, RecordEpisodeRequest,
    RecordEpisodeResponse, ReplayEpisodeRequest, ReplayEpisodeResponse, RunPolicyEpisodeRequest,
    RunPolicyEpisodeResponse, StartTeleoperationRequest,
};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use resource_api::{Extra, Name};
use resource_core::Resource;
use resource_rpc::CallContext;
use std::future::Future;

type Override<Args, T> = Box<dyn Fn(CallContext, Args) -> BoxFuture<'static, Result<T>> + Send + Sync>;
type SessionOverride<T> =
    Box<dyn Fn(CallContext, String, Extra) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Injectable LeRobot.
///
/// Overrides are set with the `on_*` builders before the double is put in
/// a collection.
pub struct InjectedLeRobot {
    name: Name,
    pub start_recording: Option<SessionOverride<String>>,
    pub stop_recording: Option<SessionOverride<f32>>,
    pub record_episode: Option<Override<RecordEpisodeRequest, RecordEpisodeResponse>>,
    pub replay_episode: Option<Override<ReplayEpisodeRequest, ReplayEpisodeResponse>>,
    pub start_teleoperation: Option<Override<StartTeleoperationRequest, String>>,
    pub stop_teleoperation: Option<SessionOverride<f32>>,
    pub load_policy: Option<Override<LoadPolicyRequest, LoadPolicyResponse>>,
    pub run_policy_episode: Option<Override<RunPolicyEpisodeRequest, RunPolicyEpisodeResponse>>,
    pub do_command: Option<Override<Extra, Extra>>,
    pub close: Option<Box<dyn Fn(CallContext) -> BoxFuture<'static, Result<()>> + Send + Sync>>,
}

fn session_override<T, F, Fut>(f: F) -> Option<SessionOverride<T>>
where
    F: Fn(CallContext, String, Extra) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Some(Box::new(move |ctx, id, extra| f(ctx, id, extra).boxed()))
}

fn request_override<Args, T, F, Fut>(f: F) -> Option<Override<Args, T>>
where
    F: Fn(CallContext, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Some(Box::new(move |ctx, args| f(ctx, args).boxed()))
}

impl InjectedLeRobot {
    pub fn new(name: &str) -> Self {
        Self {
            name: named(name),
            start_recording: None,
            stop_recording: None,
            record_episode: None,
            replay_episode: None,
            start_teleoperation: None,
            stop_teleoperation: None,
            load_policy: None,
            run_policy_episode: None,
            do_command: None,
            close: None,
        }
    }

    pub fn on_start_recording<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, String, Extra) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.start_recording = session_override(f);
        self
    }

    pub fn on_stop_recording<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, String, Extra) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<f32>> + Send + 'static,
    {
        self.stop_recording = session_override(f);
        self
    }

    pub fn on_record_episode<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, RecordEpisodeRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RecordEpisodeResponse>> + Send + 'static,
    {
        self.record_episode = request_override(f);
        self
    }

    pub fn on_replay_episode<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, ReplayEpisodeRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReplayEpisodeResponse>> + Send + 'static,
    {
        self.replay_episode = request_override(f);
        self
    }

    pub fn on_start_teleoperation<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, StartTeleoperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.start_teleoperation = request_override(f);
        self
    }

    pub fn on_stop_teleoperation<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, String, Extra) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<f32>> + Send + 'static,
    {
        self.stop_teleoperation = session_override(f);
        self
    }

    pub fn on_load_policy<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, LoadPolicyRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<LoadPolicyResponse>> + Send + 'static,
    {
        self.load_policy = request_override(f);
        self
    }

    pub fn on_run_policy_episode<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, RunPolicyEpisodeRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RunPolicyEpisodeResponse>> + Send + 'static,
    {
        self.run_policy_episode = request_override(f);
        self
    }

    pub fn on_do_command<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext, Extra) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Extra>> + Send + 'static,
    {
        self.do_command = request_override(f);
        self
    }

    pub fn on_close<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.close = Some(Box::new(move |ctx| f(ctx).boxed()));
        self
    }
}

#[async_trait]
impl Resource for InjectedLeRobot {
    fn name(&self) -> Name {
        self.name.clone()
    }

    async fn do_command(&self, ctx: &CallContext, cmd: Extra) -> Result<Extra> {
        match &self.do_command {
            Some(f) => f(ctx.clone(), cmd).await,
            None => Ok(Extra::new()),
        }
    }

    async fn close(&self, ctx: &CallContext) -> Result<()> {
        match &self.close {
            Some(f) => f(ctx.clone()).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LeRobot for InjectedLeRobot {
    async fn start_recording(
        &self,
        ctx: &CallContext,
        dataset_name: &str,
        extra: Extra,
    ) -> Result<String> {
        match &self.start_recording {
            Some(f) => f(ctx.clone(), dataset_name.to_string(), extra).await,
            None => Ok(String::new()),
        }
    }

    async fn stop_recording(&self, ctx: &CallContext, session_id: &str, extra: Extra) -> Result<f32> {
        match &self.stop_recording {
            Some(f) => f(ctx.clone(), session_id.to_string(), extra).await,
            None => Ok(0.0),
        }
    }

    async fn record_episode(
        &self,
        ctx: &CallContext,
        req: RecordEpisodeRequest,
    ) -> Result<RecordEpisodeResponse> {
        match &self.record_episode {
            Some(f) => f(ctx.clone(), req).await,
            None => Ok(RecordEpisodeResponse::default()),
        }
    }

    async fn replay_episode(
        &self,
        ctx: &CallContext,
        req: ReplayEpisodeRequest,
    ) -> Result<ReplayEpisodeResponse> {
        match &self.replay_episode {
            Some(f) => f(ctx.clone(), req).await,
            None => Ok(ReplayEpisodeResponse::default()),
        }
    }

    async fn start_teleoperation(
        &self,
        ctx: &CallContext,
        req: StartTeleoperationRequest,
    ) -> Result<String> {
        match &self.start_teleoperation {
            Some(f) => f(ctx.clone(), req).await,
            None => Ok(String::new()),
        }
    }

    async fn stop_teleoperation(
        &self,
        ctx: &CallContext,
        session_id: &str,
        extra: Extra,
    ) -> Result<f32> {
        match &self.stop_teleoperation {
            Some(f) => f(ctx.clone(), session_id.to_string(), extra).await,
            None => Ok(0.0),
        }
    }

    async fn load_policy(&self, ctx: &CallContext, req: LoadPolicyRequest) -> Result<LoadPolicyResponse> {
        match &self.load_policy {
            Some(f) => f(ctx.clone(), req).await,
            None => Ok(LoadPolicyResponse::default()),
        }
    }

    async fn run_policy_episode(
        &self,
        ctx: &CallContext,
        req: RunPolicyEpisodeRequest,
    ) -> Result<RunPolicyEpisodeResponse> {
        match &self.run_policy_episode {
            Some(f) => f(ctx.clone(), req).await,
            None => Ok(RunPolicyEpisodeResponse::default()),
        }
    }
}
