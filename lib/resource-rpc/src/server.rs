//! The shared endpoint that hosts every registered service

use crate::codec;
use crate::interceptor::{CallInfo, InterceptorChain};
use crate::trace::new_trace_parent;
use crate::{
    CallContext, Code, ServerError, ServiceDescriptor, Status, TIMEOUT_HEADER, TRACEPARENT_HEADER,
};
use arc_swap::ArcSwap;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A service mounted on the shared endpoint.
///
/// `call` receives the raw request payload for one of the methods in
/// `descriptor()` and answers with an encoded response or a status.
#[async_trait::async_trait]
pub trait RpcService: Send + Sync + 'static {
    fn descriptor(&self) -> &'static ServiceDescriptor;

    async fn call(&self, ctx: &CallContext, method: &str, payload: Bytes)
        -> Result<Bytes, Status>;
}

type ServiceMap = HashMap<&'static str, Arc<dyn RpcService>>;

/// Routes incoming calls to registered services by name.
///
/// Lookups read a snapshot; registration swaps in a new one.
pub struct RpcServer {
    services: ArcSwap<ServiceMap>,
    write_lock: Mutex<()>,
    interceptors: InterceptorChain,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::with_interceptors(InterceptorChain::new())
    }

    pub fn with_interceptors(interceptors: InterceptorChain) -> Self {
        Self {
            services: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
            interceptors,
        }
    }

    /// Mount a service. Each service name may be mounted once.
    pub fn register_service(&self, service: Arc<dyn RpcService>) -> Result<(), ServerError> {
        let name = service.descriptor().name;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.services.load();
        if current.contains_key(name) {
            return Err(ServerError::DuplicateService(name.to_string()));
        }
        let mut next = (**current).clone();
        next.insert(name, service);
        self.services.store(Arc::new(next));

        info!("Registered RPC service {}", name);
        Ok(())
    }

    /// Names of every mounted service, sorted
    pub fn service_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.load().keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Route one call through the interceptors to its service
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        let info = CallInfo::new(service, method, ctx.trace_parent());
        self.interceptors.on_call(&info).await;

        let result = self.route(ctx, service, method, payload).await;

        let code = match &result {
            Ok(_) => Code::Ok,
            Err(status) => {
                self.interceptors.on_error(&info, status).await;
                status.code
            }
        };
        self.interceptors.on_complete(&info, code).await;
        result
    }

    async fn route(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        let target = self
            .services
            .load()
            .get(service)
            .cloned()
            .ok_or_else(|| Status::unimplemented(format!("unknown service {}", service)))?;

        if target.descriptor().method(method).is_none() {
            return Err(Status::unimplemented(format!(
                "unknown method {} for service {}",
                method, service
            )));
        }

        if let Some(e) = ctx.err() {
            return Err(e.into());
        }
        tokio::select! {
            biased;
            e = ctx.done() => Err(e.into()),
            res = target.call(ctx, method, payload) => res,
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();

        if parts.method != Method::POST {
            return Ok(status_response(
                &Status::unimplemented(format!("HTTP method {} not supported", parts.method)),
                StatusCode::METHOD_NOT_ALLOWED,
            ));
        }

        let path = parts.uri.path().trim_start_matches('/');
        let Some((service, method)) = path.split_once('/') else {
            let status = Status::unimplemented(format!("malformed call path /{}", path));
            return Ok(status_response(&status, status.code.http_status()));
        };

        let mut ctx = CallContext::background();
        if let Some(ms) = parts
            .headers
            .get(TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            ctx = ctx.with_timeout(Duration::from_millis(ms));
        }
        let trace_parent = parts
            .headers
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(new_trace_parent);
        let ctx = ctx.with_trace_parent(trace_parent);

        // the call is abandoned if the caller resets the stream
        let _cancel_on_drop = ctx.token().clone().drop_guard();

        let payload = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let status = Status::internal(format!("failed to read request body: {}", e));
                return Ok(status_response(&status, status.code.http_status()));
            }
        };

        let response = match self.dispatch(&ctx, service, method, payload).await {
            Ok(bytes) => {
                let mut resp = Response::new(Full::new(bytes));
                resp.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(codec::CONTENT_TYPE));
                resp
            }
            Err(status) => status_response(&status, status.code.http_status()),
        };
        Ok(response)
    }

    /// Accept connections until `shutdown` fires, then drain open
    /// connections gracefully.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        info!("RPC endpoint listening on {}", local_addr);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Error accepting RPC connection: {}", e);
                        continue;
                    }
                },
            };
            stream.set_nodelay(true).ok();

            let server = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle(req).await }
                });

                let conn = http2::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service);
                let mut conn = std::pin::pin!(conn);
                let mut draining = false;

                loop {
                    tokio::select! {
                        res = conn.as_mut() => {
                            if let Err(e) = res {
                                debug!("Error serving RPC connection from {}: {}", peer_addr, e);
                            }
                            break;
                        }
                        _ = shutdown.cancelled(), if !draining => {
                            draining = true;
                            conn.as_mut().graceful_shutdown();
                        }
                    }
                }
            });
        }

        info!("RPC endpoint on {} stopped", local_addr);
        Ok(())
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

fn status_response(status: &Status, http: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(codec::encode_status(status)));
    *resp.status_mut() = http;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(codec::CONTENT_TYPE));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientConn, MethodDescriptor, RpcError, TransportError};
    use serde::{Deserialize, Serialize};

    const ECHO: ServiceDescriptor = ServiceDescriptor {
        name: "test.v1.EchoService",
        methods: &[
            MethodDescriptor::new("Echo"),
            MethodDescriptor::new("Fail"),
            MethodDescriptor::new("Stall"),
            MethodDescriptor::new("Trace"),
        ],
    };

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Message {
        text: String,
    }

    struct Echo;

    #[async_trait::async_trait]
    impl RpcService for Echo {
        fn descriptor(&self) -> &'static ServiceDescriptor {
            &ECHO
        }

        async fn call(
            &self,
            ctx: &CallContext,
            method: &str,
            payload: Bytes,
        ) -> Result<Bytes, Status> {
            match method {
                "Echo" => codec::unary(&payload, |m: Message| async move { Ok(m) }).await,
                "Fail" => Err(Status::unknown("test failed")),
                "Stall" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    codec::encode(&Message::default())
                }
                "Trace" => codec::encode(&Message {
                    text: ctx.trace_parent().unwrap_or_default().to_string(),
                }),
                other => Err(Status::unimplemented(other.to_string())),
            }
        }
    }

    async fn start() -> (Arc<RpcServer>, String, CancellationToken) {
        let server = Arc::new(RpcServer::new());
        server.register_service(Arc::new(Echo)).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.clone().serve(listener, shutdown.clone()));
        (server, addr, shutdown)
    }

    fn message(text: &str) -> Message {
        Message {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let server = RpcServer::new();
        server.register_service(Arc::new(Echo)).unwrap();
        let err = server.register_service(Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, ServerError::DuplicateService(name) if name == ECHO.name));
        assert_eq!(server.service_names(), vec![ECHO.name]);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_service_and_method() {
        let server = RpcServer::new();
        server.register_service(Arc::new(Echo)).unwrap();
        let ctx = CallContext::background();

        let err = server
            .dispatch(&ctx, "nope.v1.Nope", "Echo", Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Unimplemented);

        let err = server
            .dispatch(&ctx, ECHO.name, "Missing", Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_dispatch_honors_cancellation() {
        let server = Arc::new(RpcServer::new());
        server.register_service(Arc::new(Echo)).unwrap();
        let ctx = CallContext::background();

        let task = {
            let server = server.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { server.dispatch(&ctx, ECHO.name, "Stall", Bytes::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.code, Code::Canceled);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_server, addr, shutdown) = start().await;
        let ctx = CallContext::background();
        let conn = ClientConn::dial(&ctx, &addr).await.unwrap();

        let resp: Message = conn
            .invoke(&ctx, ECHO.name, "Echo", &message("hello"))
            .await
            .unwrap();
        assert_eq!(resp.text, "hello");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_remote_status_is_returned() {
        let (_server, addr, shutdown) = start().await;
        let ctx = CallContext::background();
        let conn = ClientConn::dial(&ctx, &addr).await.unwrap();

        let err = conn
            .invoke::<_, Message>(&ctx, ECHO.name, "Fail", &Message::default())
            .await
            .unwrap_err();
        let status = err.status().unwrap();
        assert_eq!(status.code, Code::Unknown);
        assert!(status.message.contains("test failed"));

        let err = conn
            .invoke::<_, Message>(&ctx, "nope.v1.Nope", "Echo", &Message::default())
            .await
            .unwrap_err();
        assert_eq!(err.status().unwrap().code, Code::Unimplemented);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_trace_parent_crosses_the_wire() {
        let (_server, addr, shutdown) = start().await;
        let ctx = CallContext::background()
            .with_trace_parent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");
        let conn = ClientConn::dial(&ctx, &addr).await.unwrap();

        let resp: Message = conn
            .invoke(&ctx, ECHO.name, "Trace", &Message::default())
            .await
            .unwrap();
        assert_eq!(
            resp.text,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_deadline_ends_remote_call() {
        let (_server, addr, shutdown) = start().await;
        let conn = ClientConn::dial(&CallContext::background(), &addr)
            .await
            .unwrap();

        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let err = conn
            .invoke::<_, Message>(&ctx, ECHO.name, "Stall", &Message::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, RpcError::DeadlineExceeded)
                || err.status().map(|s| s.code) == Some(Code::DeadlineExceeded),
            "unexpected error: {:?}",
            err
        );

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_cancel_ends_outstanding_call() {
        let (_server, addr, shutdown) = start().await;
        let conn = ClientConn::dial(&CallContext::background(), &addr)
            .await
            .unwrap();

        let ctx = CallContext::background();
        let task = {
            let conn = conn.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                conn.invoke::<_, Message>(&ctx, ECHO.name, "Stall", &Message::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        assert!(task.await.unwrap().unwrap_err().is_canceled());

        // the connection survives an abandoned call
        let resp: Message = conn
            .invoke(&CallContext::background(), ECHO.name, "Echo", &message("again"))
            .await
            .unwrap();
        assert_eq!(resp.text, "again");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_closed_connection_fails_calls() {
        let (_server, addr, shutdown) = start().await;
        let ctx = CallContext::background();
        let conn = ClientConn::dial(&ctx, &addr).await.unwrap();

        conn.close();
        conn.close();
        assert!(conn.is_closed());

        let err = conn
            .invoke::<_, Message>(&ctx, ECHO.name, "Echo", &message("late"))
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Transport(TransportError::ConnectionClosed));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_call() {
        let (_server, addr, shutdown) = start().await;
        let conn = ClientConn::dial(&CallContext::background(), &addr)
            .await
            .unwrap();

        let task = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.invoke::<_, Message>(
                    &CallContext::background(),
                    ECHO.name,
                    "Stall",
                    &Message::default(),
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();

        assert!(task.await.unwrap().unwrap_err().is_transport());
        shutdown.cancel();
    }
}
