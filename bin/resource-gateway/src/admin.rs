//! Health and metrics listener

use http_body_util::Full;
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use resource_rpc::MetricsCollector;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Serve `/healthz` and `/metrics` until `shutdown` fires
pub async fn serve(listener: TcpListener, metrics: MetricsCollector, shutdown: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!("Admin endpoint listening on http://{}", addr);
    }

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Admin accept failed: {}", e);
                    continue;
                }
            },
        };

        let metrics = metrics.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = respond(req.method(), req.uri().path(), &metrics);
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Admin connection from {} ended: {}", remote_addr, e);
            }
        });
    }

    info!("Admin endpoint stopped");
}

fn respond(method: &Method, path: &str, metrics: &MetricsCollector) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/healthz") => text(StatusCode::OK, "OK\n".to_string()),
        (&Method::GET, "/metrics") => match metrics.gather() {
            Ok(body) => {
                let mut response = text(StatusCode::OK, body);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE));
                response
            }
            Err(e) => {
                error!("Failed to gather metrics: {:#}", e);
                text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to gather metrics\n".to_string(),
                )
            }
        },
        _ => text(StatusCode::NOT_FOUND, "Not Found\n".to_string()),
    }
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
