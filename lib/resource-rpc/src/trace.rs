//! W3C trace-context propagation for dispatched calls

use crate::interceptor::{CallInfo, Interceptor};
use crate::{Code, Status};
use anyhow::Result;
use std::fmt::Write;
use tracing::{error, info};

/// Trace interceptor: logs call start, completion and errors with the
/// trace id taken from the incoming `traceparent`.
pub struct TraceInterceptor {
    /// Service name for traces
    pub service_name: String,
}

impl TraceInterceptor {
    pub fn new() -> Self {
        Self {
            service_name: "resource-gateway".to_string(),
        }
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl Default for TraceInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a `version-trace_id-span_id-trace_flags` header value
pub fn parse_trace_parent(value: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() >= 4 && !parts[1].is_empty() && !parts[2].is_empty() {
        Some((parts[1].to_string(), parts[2].to_string(), parts[3].to_string()))
    } else {
        None
    }
}

pub fn format_trace_parent(trace_id: &str, span_id: &str, trace_flags: &str) -> String {
    format!("00-{}-{}-{}", trace_id, span_id, trace_flags)
}

/// A new sampled trace context for calls that arrive without one
pub fn new_trace_parent() -> String {
    format_trace_parent(&generate_trace_id(), &generate_span_id(), "01")
}

/// Random 16 hex digits
pub fn generate_span_id() -> String {
    random_hex(8)
}

/// Random 32 hex digits
pub fn generate_trace_id() -> String {
    random_hex(16)
}

fn random_hex(bytes: usize) -> String {
    let mut id = String::with_capacity(bytes * 2);
    for _ in 0..bytes {
        write!(&mut id, "{:02x}", rand::random::<u8>()).ok();
    }
    id
}

#[async_trait::async_trait]
impl Interceptor for TraceInterceptor {
    fn name(&self) -> &'static str {
        "TraceInterceptor"
    }

    async fn on_call(&self, info: &CallInfo) -> Result<()> {
        let trace_id = info
            .trace_parent
            .as_deref()
            .and_then(parse_trace_parent)
            .map(|(trace_id, _, _)| trace_id)
            .unwrap_or_else(generate_trace_id);
        info.set_metadata("trace_id", trace_id.clone());

        info!(
            trace_id = %trace_id,
            service = %self.service_name,
            method = %info.full_method(),
            "Call started"
        );
        Ok(())
    }

    async fn on_complete(&self, info: &CallInfo, code: Code) -> Result<()> {
        let trace_id = info.get_metadata("trace_id").unwrap_or_default();
        info!(
            trace_id = %trace_id,
            code = %code,
            method = %info.full_method(),
            duration_ms = info.elapsed().as_millis() as u64,
            "Call completed"
        );
        Ok(())
    }

    async fn on_error(&self, info: &CallInfo, status: &Status) -> Result<()> {
        let trace_id = info.get_metadata("trace_id").unwrap_or_default();
        error!(
            trace_id = %trace_id,
            error = %status,
            method = %info.full_method(),
            "Call error"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace_parent() {
        let parsed = parse_trace_parent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");
        assert_eq!(
            parsed,
            Some((
                "4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
                "00f067aa0ba902b7".to_string(),
                "01".to_string()
            ))
        );
        assert_eq!(parse_trace_parent("garbage"), None);
    }

    #[test]
    fn test_generated_ids() {
        assert_eq!(generate_trace_id().len(), 32);
        assert_eq!(generate_span_id().len(), 16);
        assert!(parse_trace_parent(&new_trace_parent()).is_some());
    }

    #[tokio::test]
    async fn test_on_call_keeps_incoming_trace_id() {
        let info = CallInfo::new(
            "svc",
            "Method",
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        TraceInterceptor::new().on_call(&info).await.unwrap();
        assert_eq!(
            info.get_metadata("trace_id").as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
    }

    #[tokio::test]
    async fn test_on_call_generates_trace_id() {
        let info = CallInfo::new("svc", "Method", None);
        let interceptor = TraceInterceptor::with_service_name("edge-gateway");
        assert_eq!(interceptor.service_name, "edge-gateway");
        interceptor.on_call(&info).await.unwrap();
        assert_eq!(info.get_metadata("trace_id").map(|t| t.len()), Some(32));
    }
}
