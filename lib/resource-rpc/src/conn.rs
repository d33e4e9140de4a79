//! Client connections to a shared RPC endpoint

use crate::codec;
use crate::{
    CallContext, Result, RpcError, TransportError, TIMEOUT_HEADER, TRACEPARENT_HEADER,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http2;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One multiplexed connection to a remote endpoint.
///
/// Cheap to clone; every proxy built over the same remote shares it.
/// Closing it fails all outstanding and future calls with a transport
/// error.
#[derive(Clone)]
pub struct ClientConn {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    sender: http2::SendRequest<Full<Bytes>>,
    closed: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl ClientConn {
    /// Connect to `addr` (`host:port`), giving up when `ctx` ends
    pub async fn dial(ctx: &CallContext, addr: &str) -> Result<Self> {
        if let Some(e) = ctx.err() {
            return Err(e.into());
        }
        tokio::select! {
            biased;
            e = ctx.done() => Err(e.into()),
            conn = Self::connect(addr) => conn,
        }
    }

    async fn connect(addr: &str) -> Result<Self> {
        let connect_error = |reason: String| TransportError::Connect {
            addr: addr.to_string(),
            reason,
        };

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        stream.set_nodelay(true).ok();

        let (sender, connection) = http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        let closed = CancellationToken::new();
        let driver_closed = closed.clone();
        let driver_addr = addr.to_string();
        tokio::spawn(async move {
            tokio::select! {
                res = connection => {
                    if let Err(e) = res {
                        debug!("Connection to {} ended: {}", driver_addr, e);
                    }
                }
                _ = driver_closed.cancelled() => {}
            }
            driver_closed.cancel();
            debug!("Connection to {} closed", driver_addr);
        });

        info!("Connected to remote endpoint {}", addr);
        Ok(Self {
            inner: Arc::new(Inner {
                addr: addr.to_string(),
                sender,
                closed,
            }),
        })
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            debug!("Closing connection to {}", self.inner.addr);
            self.inner.closed.cancel();
        }
    }

    /// Invoke `service/method` on the remote endpoint.
    ///
    /// The context's remaining time and trace parent travel with the
    /// request. When the context ends first the outstanding exchange is
    /// abandoned, which resets the stream on the remote side.
    pub async fn invoke<Req, Resp>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        if let Some(e) = ctx.err() {
            return Err(e.into());
        }
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed.into());
        }

        let body = serde_json::to_vec(request).map_err(|e| RpcError::Encode(e.to_string()))?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{}/{}/{}", self.inner.addr, service, method))
            .header(CONTENT_TYPE, codec::CONTENT_TYPE);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.header(TIMEOUT_HEADER, remaining.as_millis().max(1).to_string());
        }
        if let Some(trace_parent) = ctx.trace_parent() {
            builder = builder.header(TRACEPARENT_HEADER, trace_parent);
        }
        let req = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| RpcError::Encode(e.to_string()))?;

        let mut sender = self.inner.sender.clone();
        let exchange = async move {
            sender.ready().await.map_err(transport_error)?;
            let resp = sender.send_request(req).await.map_err(transport_error)?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(transport_error)?
                .to_bytes();
            Ok::<_, TransportError>((status, body))
        };

        let (status, body) = tokio::select! {
            biased;
            e = ctx.done() => return Err(e.into()),
            _ = self.inner.closed.cancelled() => {
                return Err(TransportError::ConnectionClosed.into())
            }
            exchanged = exchange => exchanged?,
        };

        if status.is_success() {
            serde_json::from_slice(&body).map_err(|e| RpcError::Decode(e.to_string()))
        } else {
            Err(RpcError::Status(codec::decode_status(status, &body)?))
        }
    }
}

impl std::fmt::Debug for ClientConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConn")
            .field("addr", &self.inner.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn transport_error(e: hyper::Error) -> TransportError {
    if e.is_closed() || e.is_canceled() {
        TransportError::ConnectionClosed
    } else {
        TransportError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_with_canceled_context() {
        let ctx = CallContext::background();
        ctx.cancel();
        let err = ClientConn::dial(&ctx, "127.0.0.1:1").await.unwrap_err();
        assert!(err.is_canceled());
    }

    #[tokio::test]
    async fn test_dial_refused_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = ClientConn::dial(&CallContext::background(), &addr)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Transport(TransportError::Connect { .. })
        ));
    }
}
