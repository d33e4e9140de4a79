//! JSON payload encoding for requests, responses and statuses

use crate::{Status, TransportError};
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

pub const CONTENT_TYPE: &str = "application/json";

/// Encode a response message on the dispatch side
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, Status> {
    serde_json::to_vec(msg)
        .map(Bytes::from)
        .map_err(|e| Status::internal(format!("failed to encode response: {}", e)))
}

/// Decode a request message on the dispatch side.
///
/// An empty body is the all-default message.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, Status> {
    let payload = if payload.is_empty() { b"{}".as_slice() } else { payload };
    serde_json::from_slice(payload)
        .map_err(|e| Status::invalid_argument(format!("failed to decode request: {}", e)))
}

/// Decode a request, run the handler, encode its response
pub async fn unary<Req, Resp, F, Fut>(payload: &[u8], handler: F) -> Result<Bytes, Status>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Resp, Status>>,
{
    let request = decode(payload)?;
    let response = handler(request).await?;
    encode(&response)
}

pub fn encode_status(status: &Status) -> Bytes {
    // a struct of a string and a unit enum always serializes
    Bytes::from(serde_json::to_vec(status).unwrap_or_default())
}

/// Decode the status body of a failed exchange
pub fn decode_status(http: StatusCode, body: &[u8]) -> Result<Status, TransportError> {
    serde_json::from_slice(body).map_err(|_| {
        TransportError::Protocol(format!(
            "HTTP {} without a status body ({} bytes)",
            http,
            body.len()
        ))
    })
}
