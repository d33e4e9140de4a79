//! Operations every instance supports regardless of its contract

use async_trait::async_trait;
use resource_api::{Extra, Name};
use resource_rpc::{CallContext, Status};

/// A named instance of some capability contract.
///
/// Contracts extend this trait with their own operations. Both concrete
/// implementations and client proxies implement it.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    fn name(&self) -> Name;

    /// Untyped escape hatch for operations outside the contract
    async fn do_command(&self, _ctx: &CallContext, _cmd: Extra) -> anyhow::Result<Extra> {
        Err(Status::unimplemented(format!("do_command not supported by {}", self.name())).into())
    }

    /// Release whatever the instance holds. Must be idempotent.
    async fn close(&self, _ctx: &CallContext) -> anyhow::Result<()> {
        Ok(())
    }
}
