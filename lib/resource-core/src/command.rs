//! The DoCommand escape hatch, shared by every contract

use crate::{invocation_status, Resource, ResourceCollection};
use resource_api::{extra, DoCommandRequest, DoCommandResponse, Extra};
use resource_rpc::{CallContext, ClientConn, MethodDescriptor, Status};
use tracing::debug;

pub const DO_COMMAND: MethodDescriptor = MethodDescriptor::new("DoCommand");

/// Resolve the target and hand it the command map unmodified
pub async fn do_command_from_server<S>(
    collection: &ResourceCollection<S>,
    ctx: &CallContext,
    req: DoCommandRequest,
) -> Result<DoCommandResponse, Status>
where
    S: ?Sized + Resource,
{
    let resource = collection.resource(&req.name)?;
    let result = resource
        .do_command(ctx, extra::from_wire(req.command))
        .await
        .map_err(invocation_status)?;
    Ok(DoCommandResponse {
        result: Some(result),
    })
}

/// Issue a DoCommand call to `name` on the far side of `conn`
pub async fn do_command_from_client(
    conn: &ClientConn,
    ctx: &CallContext,
    service: &str,
    name: &str,
    cmd: Extra,
) -> anyhow::Result<Extra> {
    debug!(name, "DoCommand");
    let req = DoCommandRequest {
        name: name.to_string(),
        command: Some(cmd),
    };
    let resp: DoCommandResponse = conn.invoke(ctx, service, DO_COMMAND.name, &req).await?;
    Ok(extra::from_wire(resp.result))
}
