//! RPC transport for named services
//!
//! Every service shares one endpoint. Requests travel as `POST
//! /{service}/{method}` over HTTP/2 connections with JSON bodies; failures
//! travel as a JSON [`Status`]. Nothing above [`codec`] depends on that
//! encoding.

pub mod codec;
pub mod conn;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod interceptor;
pub mod metrics;
pub mod server;
pub mod status;
pub mod trace;

pub use hyper::body::Bytes;

pub use conn::ClientConn;
pub use context::CallContext;
pub use descriptor::{MethodDescriptor, ServiceDescriptor};
pub use error::{ContextError, Result, RpcError, ServerError, TransportError};
pub use interceptor::{CallInfo, Interceptor, InterceptorChain, LoggingInterceptor};
pub use metrics::{MetricsCollector, MetricsInterceptor};
pub use server::{RpcServer, RpcService};
pub use status::{Code, Status};
pub use trace::TraceInterceptor;

/// Header carrying the caller's remaining deadline in milliseconds
pub const TIMEOUT_HEADER: &str = "x-rpc-timeout-ms";

/// W3C trace context header
pub const TRACEPARENT_HEADER: &str = "traceparent";
